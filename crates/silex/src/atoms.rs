//! Interned atoms: stable 32-bit handles for strings and symbols.
//!
//! An [`Atom`] is either a *tagged integer* (top bit set, representing the
//! canonical decimal string of an unsigned integer) or an index into the
//! runtime's [`AtomTable`]. The table deduplicates string content with an
//! open-chained hash (buckets store the first entry index, chain links live
//! in the entries themselves), refcounts every non-predefined entry, and
//! doubles its bucket array once the live count reaches twice the bucket
//! count.
//!
//! A fixed prefix of the table is loaded at creation time with the
//! predefined atoms: the keywords (whose order is shared with the keyword
//! token kinds), engine-internal names like `<with>` or `new.target`, and
//! well-known symbol descriptions. Predefined atoms are constants: they are
//! never refcounted and never freed.

use strum::{EnumCount, EnumIter, EnumString, FromRepr, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{Exception, ParseResult},
    numbers::canonical_u32,
    strings::JsString,
};

/// Maximum number of table-indexed atoms.
pub const MAX_ATOMS: u32 = (1 << 30) - 1;

/// Largest value representable as a tagged integer atom.
const MAX_TAGGED_INT: u32 = (1 << 31) - 1;

const TAG_INT: u32 = 1 << 31;

/// Minimum bucket count of the atom hash.
const MIN_HASH_SIZE: u32 = 256;

/// End-of-chain / empty-bucket marker (atom 0 is the sentinel and is never
/// chained, so 0 is free to mean "none").
const NO_ATOM: u32 = 0;

const NO_FREE: u32 = u32::MAX;

/// An interned string or symbol handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    /// The non-atom sentinel.
    pub const NULL: Self = Self(0);

    /// The tagged atom for an unsigned integer `n <= 2^31 - 1`.
    ///
    /// Returns `None` for values that do not fit the tag; those intern as
    /// ordinary strings.
    #[must_use]
    pub fn from_u32(n: u32) -> Option<Self> {
        (n <= MAX_TAGGED_INT).then_some(Self(n | TAG_INT))
    }

    /// True for tagged integer atoms.
    #[must_use]
    pub fn is_tagged_int(self) -> bool {
        self.0 & TAG_INT != 0
    }

    /// The integer value of a tagged atom.
    #[must_use]
    pub fn tagged_value(self) -> u32 {
        self.0 & !TAG_INT
    }

    /// The raw 32-bit representation (stored little-endian in bytecode).
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuilds an atom from its raw representation.
    #[must_use]
    pub fn from_raw(v: u32) -> Self {
        Self(v)
    }

    /// True for predefined atoms and tagged integers, which are never
    /// refcounted.
    #[must_use]
    pub fn is_const(self) -> bool {
        self.is_tagged_int() || self.0 < PREDEF_END
    }
}

impl From<PredefAtom> for Atom {
    fn from(p: PredefAtom) -> Self {
        Self(p as u32)
    }
}

impl PartialEq<PredefAtom> for Atom {
    fn eq(&self, other: &PredefAtom) -> bool {
        self.0 == *other as u32
    }
}

/// Atom classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomKind {
    /// Interned string (deduplicated by content).
    String,
    /// Registered symbol (deduplicated by description).
    GlobalSymbol,
    /// Anonymous symbol (every creation is fresh).
    Symbol,
    /// Private-name symbol (every creation is fresh).
    Private,
}

impl AtomKind {
    /// Hash seed; also stored in the hash field of unhashed (symbol) entries
    /// as a discriminator.
    fn seed(self) -> u32 {
        match self {
            Self::String => 1,
            Self::GlobalSymbol => 2,
            Self::Symbol => 3,
            Self::Private => 4,
        }
    }

    /// Whether entries of this kind are content-deduplicated via the hash.
    fn is_hashed(self) -> bool {
        matches!(self, Self::String | Self::GlobalSymbol)
    }
}

/// Predefined atoms, in table order starting at index 1.
///
/// The keyword prefix `null..=await` is order-aligned with the keyword token
/// kinds: the scanner derives the token of a reserved word directly from its
/// atom index. Spellings come from the strum serialization of each variant.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter, EnumString, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PredefAtom {
    Null = 1,
    False,
    True,
    If,
    Else,
    Return,
    Var,
    This,
    Delete,
    Void,
    Typeof,
    New,
    In,
    Instanceof,
    Do,
    While,
    For,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    Throw,
    Try,
    Catch,
    Finally,
    Function,
    Debugger,
    With,
    Class,
    Const,
    Enum,
    Export,
    Extends,
    Import,
    Super,
    Implements,
    Interface,
    Let,
    Package,
    Private,
    Protected,
    Public,
    Static,
    Yield,
    Await,

    // contextual identifiers
    Of,
    As,
    From,
    Get,
    Set,
    Async,
    Target,
    Meta,
    Raw,
    Arguments,
    Eval,
    Undefined,
    Length,
    Name,
    Message,
    Stack,
    #[strum(serialize = "fileName")]
    FileName,
    #[strum(serialize = "lineNumber")]
    LineNumber,
    Prototype,
    Constructor,
    Concat,
    Done,
    Value,
    Next,
    #[strum(serialize = "__proto__")]
    Proto,
    #[strum(serialize = "")]
    Empty,

    // engine-internal names
    #[strum(serialize = "<default>")]
    SpecialDefault,
    #[strum(serialize = "<ret>")]
    SpecialRet,
    #[strum(serialize = "<var>")]
    SpecialVar,
    #[strum(serialize = "<arg_var>")]
    SpecialArgVar,
    #[strum(serialize = "<with>")]
    SpecialWith,
    #[strum(serialize = "<eval>")]
    SpecialEval,
    #[strum(serialize = "*")]
    SpecialStar,
    #[strum(serialize = "new.target")]
    NewTarget,
    #[strum(serialize = "this.active_func")]
    ThisActiveFunc,
    #[strum(serialize = "<home_object>")]
    HomeObject,
    #[strum(serialize = "<class_fields_init>")]
    ClassFieldsInit,
    #[strum(serialize = "<brand>")]
    Brand,
    #[strum(serialize = "<computed_field>")]
    ComputedField,
    #[strum(serialize = "<static_computed_field>")]
    StaticComputedField,
    #[strum(serialize = "#constructor")]
    HashConstructor,

    // well-known symbol descriptions
    #[strum(serialize = "Symbol.iterator")]
    SymbolIterator,
    #[strum(serialize = "Symbol.asyncIterator")]
    SymbolAsyncIterator,
}

impl PredefAtom {
    /// First always-reserved keyword.
    pub const FIRST_KEYWORD: Self = Self::Null;
    /// Last always-reserved keyword.
    pub const LAST_KEYWORD: Self = Self::Super;
    /// Last additionally-reserved keyword in strict mode.
    pub const LAST_STRICT_KEYWORD: Self = Self::Static;

    /// The atom handle of this predefined entry.
    #[must_use]
    pub fn atom(self) -> Atom {
        Atom(self as u32)
    }

    fn kind(self) -> AtomKind {
        match self {
            Self::SymbolIterator | Self::SymbolAsyncIterator => AtomKind::Symbol,
            _ => AtomKind::String,
        }
    }
}

/// One past the last predefined atom index.
pub(crate) const PREDEF_END: u32 = PredefAtom::COUNT as u32 + 1;

/// A live table entry.
#[derive(Debug)]
struct AtomEntry {
    str: JsString,
    kind: AtomKind,
    /// Content hash for hashed kinds; kind discriminator for symbols.
    hash: u32,
    /// Next entry in the same bucket chain (`NO_ATOM` terminates).
    hash_next: u32,
    ref_count: u32,
}

#[derive(Debug)]
enum Slot {
    Live(AtomEntry),
    /// Free-list node threading unused slots (`NO_FREE` terminates).
    Free { next: u32 },
}

/// The interning table.
#[derive(Debug)]
pub struct AtomTable {
    atoms: Vec<Slot>,
    /// Bucket array; `hash[h]` is the first entry index of the chain.
    hash: Vec<u32>,
    /// Always a power of two.
    hash_size: u32,
    /// Live entries, predefined included.
    count: u32,
    free_first: u32,
    max_atoms: u32,
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomTable {
    /// Creates a table pre-loaded with the predefined atoms.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            atoms: Vec::with_capacity(PREDEF_END as usize),
            hash: vec![NO_ATOM; MIN_HASH_SIZE as usize],
            hash_size: MIN_HASH_SIZE,
            count: 0,
            free_first: NO_FREE,
            max_atoms: MAX_ATOMS,
        };
        // slot 0: sentinel wide empty string, never hashed, never freed
        table.atoms.push(Slot::Live(AtomEntry {
            str: JsString::empty_wide(),
            kind: AtomKind::String,
            hash: 0,
            hash_next: NO_ATOM,
            ref_count: 1,
        }));
        table.count = 1;
        for p in PredefAtom::iter() {
            let spelling: &'static str = p.into();
            let kind = p.kind();
            let str = JsString::from_utf8(spelling);
            let idx = table.atoms.len() as u32;
            debug_assert_eq!(idx, p as u32);
            let hash;
            let hash_next;
            if kind.is_hashed() {
                hash = str.hash(kind.seed());
                let bucket = (hash & (table.hash_size - 1)) as usize;
                hash_next = table.hash[bucket];
                table.hash[bucket] = idx;
            } else {
                hash = kind.seed();
                hash_next = NO_ATOM;
            }
            table.atoms.push(Slot::Live(AtomEntry { str, kind, hash, hash_next, ref_count: 1 }));
            table.count += 1;
        }
        table
    }

    /// Caps the number of live atoms (used by resource limits).
    pub fn set_max_atoms(&mut self, max: u32) {
        self.max_atoms = max.min(MAX_ATOMS);
    }

    /// Number of live atoms, predefined included.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Current bucket count.
    #[must_use]
    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    fn entry(&self, idx: u32) -> &AtomEntry {
        match &self.atoms[idx as usize] {
            Slot::Live(e) => e,
            Slot::Free { .. } => panic!("atom {idx} is not live"),
        }
    }

    fn entry_mut(&mut self, idx: u32) -> &mut AtomEntry {
        match &mut self.atoms[idx as usize] {
            Slot::Live(e) => e,
            Slot::Free { .. } => panic!("atom {idx} is not live"),
        }
    }

    /// Interns UTF-8 text as a string atom.
    pub fn new_atom_str(&mut self, s: &str) -> ParseResult<Atom> {
        self.new_atom(JsString::from_utf8(s), AtomKind::String)
    }

    /// Interns a string (or creates a symbol) of the given kind.
    ///
    /// String kinds deduplicate by content; symbol kinds always allocate a
    /// fresh entry. A string that spells a canonical integer small enough
    /// for the tag returns the tagged integer atom instead of a table entry.
    pub fn new_atom(&mut self, str: JsString, kind: AtomKind) -> ParseResult<Atom> {
        if kind == AtomKind::String {
            if let Some(n) = canonical_u32(&str) {
                if let Some(atom) = Atom::from_u32(n) {
                    return Ok(atom);
                }
            }
        }
        if kind.is_hashed() {
            let h = str.hash(kind.seed());
            let bucket = (h & (self.hash_size - 1)) as usize;
            let mut idx = self.hash[bucket];
            while idx != NO_ATOM {
                let e = self.entry(idx);
                if e.hash == h && e.kind == kind && e.str == str {
                    let atom = Atom(idx);
                    if !atom.is_const() {
                        self.entry_mut(idx).ref_count += 1;
                    }
                    return Ok(atom);
                }
                idx = self.entry(idx).hash_next;
            }
            let idx = self.alloc_entry()?;
            // alloc_entry may have resized; recompute the bucket
            let bucket = (h & (self.hash_size - 1)) as usize;
            let hash_next = self.hash[bucket];
            self.hash[bucket] = idx;
            self.atoms[idx as usize] = Slot::Live(AtomEntry { str, kind, hash: h, hash_next, ref_count: 1 });
            Ok(Atom(idx))
        } else {
            let idx = self.alloc_entry()?;
            self.atoms[idx as usize] =
                Slot::Live(AtomEntry { str, kind, hash: kind.seed(), hash_next: NO_ATOM, ref_count: 1 });
            Ok(Atom(idx))
        }
    }

    /// Reserves a slot (from the free list or by growing), resizing the
    /// bucket array first when the load threshold is reached.
    fn alloc_entry(&mut self) -> ParseResult<u32> {
        if self.count >= self.resize_threshold() {
            self.resize();
        }
        if self.count >= self.max_atoms {
            return Err(Exception::internal("too many atoms"));
        }
        self.count += 1;
        if self.free_first != NO_FREE {
            let idx = self.free_first;
            let Slot::Free { next } = self.atoms[idx as usize] else {
                unreachable!("free list points at a live atom");
            };
            self.free_first = next;
            Ok(idx)
        } else {
            let idx = self.atoms.len() as u32;
            self.atoms.push(Slot::Free { next: NO_FREE });
            Ok(idx)
        }
    }

    fn resize_threshold(&self) -> u32 {
        self.hash_size * 2
    }

    /// Doubles the bucket array and rehashes every hashed entry.
    fn resize(&mut self) {
        let new_size = self.hash_size * 2;
        let mask = new_size - 1;
        let mut hash = vec![NO_ATOM; new_size as usize];
        for idx in 1..self.atoms.len() as u32 {
            if let Slot::Live(e) = &self.atoms[idx as usize] {
                if e.kind.is_hashed() {
                    let bucket = (e.hash & mask) as usize;
                    let prev = hash[bucket];
                    hash[bucket] = idx;
                    self.entry_mut(idx).hash_next = prev;
                }
            }
        }
        self.hash = hash;
        self.hash_size = new_size;
    }

    /// Increments the refcount (no-op for constants). Returns the atom for
    /// chaining, mirroring how ownership transfers are written at call
    /// sites.
    pub fn ref_atom(&mut self, atom: Atom) -> Atom {
        if !atom.is_const() && atom != Atom::NULL {
            self.entry_mut(atom.0).ref_count += 1;
        }
        atom
    }

    /// Decrements the refcount, freeing the entry when it reaches zero.
    /// No-op for constants.
    pub fn unref_atom(&mut self, atom: Atom) {
        if atom.is_const() || atom == Atom::NULL {
            return;
        }
        let e = self.entry_mut(atom.0);
        debug_assert!(e.ref_count > 0, "unref of dead atom");
        e.ref_count -= 1;
        if e.ref_count == 0 {
            self.free_entry(atom.0);
        }
    }

    /// Unlinks an entry from its bucket chain and threads the slot onto the
    /// free list.
    fn free_entry(&mut self, idx: u32) {
        let (kind, hash, hash_next) = {
            let e = self.entry(idx);
            (e.kind, e.hash, e.hash_next)
        };
        if kind.is_hashed() {
            let bucket = (hash & (self.hash_size - 1)) as usize;
            if self.hash[bucket] == idx {
                self.hash[bucket] = hash_next;
            } else {
                let mut i = self.hash[bucket];
                loop {
                    let next = self.entry(i).hash_next;
                    debug_assert_ne!(next, NO_ATOM, "atom missing from its chain");
                    if next == idx {
                        self.entry_mut(i).hash_next = hash_next;
                        break;
                    }
                    i = next;
                }
            }
        }
        self.atoms[idx as usize] = Slot::Free { next: self.free_first };
        self.free_first = idx;
        self.count -= 1;
    }

    /// The kind of an atom (tagged integers classify as strings).
    #[must_use]
    pub fn kind(&self, atom: Atom) -> AtomKind {
        if atom.is_tagged_int() { AtomKind::String } else { self.entry(atom.0).kind }
    }

    /// Materializes the string form: a fresh decimal rendering for tagged
    /// integers, a copy of the stored string otherwise.
    #[must_use]
    pub fn to_js_string(&self, atom: Atom) -> JsString {
        if atom.is_tagged_int() {
            JsString::from_utf8(&atom.tagged_value().to_string())
        } else {
            self.entry(atom.0).str.clone()
        }
    }

    /// Borrows the stored string of a table atom.
    ///
    /// # Panics
    ///
    /// Panics on tagged integer atoms, which have no stored string.
    #[must_use]
    pub fn str(&self, atom: Atom) -> &JsString {
        assert!(!atom.is_tagged_int(), "tagged atoms have no stored string");
        &self.entry(atom.0).str
    }

    /// Debug-only UTF-8 rendering (lossy for unpaired surrogates).
    #[must_use]
    pub fn get_str(&self, atom: Atom) -> String {
        if atom.is_tagged_int() {
            atom.tagged_value().to_string()
        } else {
            self.entry(atom.0).str.to_string()
        }
    }

    /// Returns the array index an atom denotes, if any.
    #[must_use]
    pub fn array_index(&self, atom: Atom) -> Option<u32> {
        if atom.is_tagged_int() {
            Some(atom.tagged_value())
        } else {
            let e = self.entry(atom.0);
            if e.kind == AtomKind::String { canonical_u32(&e.str) } else { None }
        }
    }

    /// Interns `<name><suffix>`; used for synthesized names.
    pub fn concat_str(&mut self, name: Atom, suffix: &str) -> ParseResult<Atom> {
        let base = self.to_js_string(name);
        let joined = base.concat(&JsString::from_utf8(suffix));
        self.new_atom(joined, AtomKind::String)
    }

    /// Interns `<name><n>`; used for synthesized names.
    pub fn concat_num(&mut self, name: Atom, n: u32) -> ParseResult<Atom> {
        self.concat_str(name, &n.to_string())
    }

    /// Iterates live atoms with their content and kind.
    pub fn iter(&self) -> impl Iterator<Item = (Atom, &JsString, AtomKind)> {
        self.atoms.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Live(e) => Some((Atom(i as u32), &e.str, e.kind)),
            Slot::Free { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_atom() {
        let mut t = AtomTable::new();
        let a = t.new_atom_str("foo").unwrap();
        let b = t.new_atom_str("foo").unwrap();
        assert_eq!(a, b);
        let c = t.new_atom_str("bar").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn keywords_are_predefined_constants() {
        let mut t = AtomTable::new();
        let a = t.new_atom_str("while").unwrap();
        assert_eq!(a, PredefAtom::While);
        assert!(a.is_const());
        let before = t.count();
        t.unref_atom(a);
        assert_eq!(t.count(), before);
    }

    #[test]
    fn canonical_integers_are_tagged() {
        let mut t = AtomTable::new();
        let a = t.new_atom_str("42").unwrap();
        assert!(a.is_tagged_int());
        assert_eq!(a.tagged_value(), 42);
        assert_eq!(t.get_str(a), "42");
        assert_eq!(t.array_index(a), Some(42));
        // non-canonical forms intern as strings
        let b = t.new_atom_str("042").unwrap();
        assert!(!b.is_tagged_int());
    }

    #[test]
    fn symbols_never_deduplicate() {
        let mut t = AtomTable::new();
        let d = JsString::from_utf8("desc");
        let a = t.new_atom(d.clone(), AtomKind::Symbol).unwrap();
        let b = t.new_atom(d, AtomKind::Symbol).unwrap();
        assert_ne!(a, b);
        assert_eq!(t.kind(a), AtomKind::Symbol);
    }

    #[test]
    fn refcount_balance_restores_count() {
        let mut t = AtomTable::new();
        let base = t.count();
        let a = t.new_atom_str("alpha").unwrap();
        let b = t.new_atom_str("beta").unwrap();
        let a2 = t.new_atom_str("alpha").unwrap();
        assert_eq!(a, a2);
        assert_eq!(t.count(), base + 2);
        t.unref_atom(a);
        t.unref_atom(a2);
        t.unref_atom(b);
        assert_eq!(t.count(), base);
        // freed slots are reused
        let c = t.new_atom_str("gamma").unwrap();
        assert!(!c.is_const());
        t.unref_atom(c);
        assert_eq!(t.count(), base);
    }

    #[test]
    fn string_and_symbol_kinds_do_not_collide() {
        let mut t = AtomTable::new();
        let s = t.new_atom(JsString::from_utf8("x"), AtomKind::String).unwrap();
        let g = t.new_atom(JsString::from_utf8("x"), AtomKind::GlobalSymbol).unwrap();
        assert_ne!(s, g);
    }

    #[test]
    fn resize_preserves_mappings() {
        let mut t = AtomTable::new();
        let initial_hash_size = t.hash_size();
        let mut atoms = Vec::new();
        for i in 0..2048 {
            let name = format!("var_{i}_x");
            atoms.push((name.clone(), t.new_atom_str(&name).unwrap()));
        }
        assert!(t.hash_size() > initial_hash_size);
        for (name, atom) in &atoms {
            assert_eq!(t.new_atom_str(name).unwrap(), *atom);
            // balance the extra ref taken by the lookup above
            t.unref_atom(*atom);
        }
        for (_, atom) in atoms {
            t.unref_atom(atom);
        }
    }

    #[test]
    fn atom_to_string_round_trips() {
        let mut t = AtomTable::new();
        let a = t.new_atom_str("hello").unwrap();
        assert_eq!(t.to_js_string(a), JsString::from_utf8("hello"));
        let n = t.new_atom_str("4294967295").unwrap();
        assert!(!n.is_tagged_int(), "2^32-1 exceeds the tag range");
        assert_eq!(t.array_index(n), Some(u32::MAX));
        t.unref_atom(a);
        t.unref_atom(n);
    }
}
