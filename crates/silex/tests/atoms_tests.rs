//! Atom-table properties exercised through the public context API.

use silex::{Atom, AtomKind, Context, JsString};

#[test]
fn interning_is_content_addressed() {
    let mut ctx = Context::new();
    let atoms = ctx.atoms_mut();
    let a = atoms.new_atom_str("payload").unwrap();
    let b = atoms.new_atom_str("payload").unwrap();
    let c = atoms.new_atom_str("payloae").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    atoms.unref_atom(a);
    atoms.unref_atom(b);
    atoms.unref_atom(c);
}

#[test]
fn tagged_integer_atoms_round_trip() {
    let mut ctx = Context::new();
    let atoms = ctx.atoms_mut();
    for n in [0u32, 1, 9, 10, 4096, 2_147_483_647] {
        let atom = atoms.new_atom_str(&n.to_string()).unwrap();
        assert!(atom.is_tagged_int(), "{n} should use the tag");
        assert_eq!(atom.tagged_value(), n);
        assert_eq!(atoms.to_js_string(atom), JsString::from_utf8(&n.to_string()));
    }
    // 2^31 exceeds the tag but is still an array index
    let big = atoms.new_atom_str("2147483648").unwrap();
    assert!(!big.is_tagged_int());
    assert_eq!(atoms.array_index(big), Some(2_147_483_648));
    atoms.unref_atom(big);
}

#[test]
fn balanced_refcounts_restore_count() {
    let mut ctx = Context::new();
    let atoms = ctx.atoms_mut();
    let base = atoms.count();
    let mut handles = Vec::new();
    for i in 0..100 {
        handles.push(atoms.new_atom_str(&format!("name_{i}")).unwrap());
    }
    // re-interning bumps the count not at all, only refcounts
    assert_eq!(atoms.count(), base + 100);
    for (i, &h) in handles.iter().enumerate() {
        let again = atoms.new_atom_str(&format!("name_{i}")).unwrap();
        assert_eq!(again, h);
        atoms.unref_atom(again);
    }
    assert_eq!(atoms.count(), base + 100);
    for h in handles {
        atoms.unref_atom(h);
    }
    assert_eq!(atoms.count(), base);
}

#[test]
fn symbols_are_fresh_and_sticky_atoms_are_constant() {
    let mut ctx = Context::new();
    let atoms = ctx.atoms_mut();
    let s1 = atoms.new_atom(JsString::from_utf8("tag"), AtomKind::Symbol).unwrap();
    let s2 = atoms.new_atom(JsString::from_utf8("tag"), AtomKind::Symbol).unwrap();
    assert_ne!(s1, s2);
    assert_eq!(atoms.kind(s1), AtomKind::Symbol);
    atoms.unref_atom(s1);
    atoms.unref_atom(s2);

    let kw = atoms.new_atom_str("function").unwrap();
    assert!(kw.is_const());
    let count = atoms.count();
    atoms.unref_atom(kw);
    atoms.unref_atom(kw);
    assert_eq!(atoms.count(), count, "predefined atoms ignore refcounting");
}

#[test]
fn resize_keeps_all_mappings() {
    let mut ctx = Context::new();
    let atoms = ctx.atoms_mut();
    let start_size = atoms.hash_size();
    let mut pairs = Vec::new();
    for i in 0..(start_size * 3) {
        let name = format!("k{i}_value");
        pairs.push((name.clone(), atoms.new_atom_str(&name).unwrap()));
    }
    assert!(atoms.hash_size() > start_size, "the table doubled at least once");
    for (name, atom) in &pairs {
        let again = atoms.new_atom_str(name).unwrap();
        assert_eq!(again, *atom, "mapping for {name} survived the resize");
        atoms.unref_atom(again);
    }
    for (_, atom) in pairs {
        atoms.unref_atom(atom);
    }
}

#[test]
fn null_atom_is_inert() {
    let mut ctx = Context::new();
    let atoms = ctx.atoms_mut();
    let count = atoms.count();
    atoms.unref_atom(Atom::NULL);
    atoms.ref_atom(Atom::NULL);
    assert_eq!(atoms.count(), count);
}
