//! The scanner's token model.
//!
//! A [`Token`] is a kind plus the payload the kind needs: the parsed value
//! for numbers, the decoded string and terminator for strings and template
//! parts, raw body/flags text for regexps, and the interned atom for
//! identifiers, keywords and private names. The parser owns exactly one
//! token at a time; [`Token::free`] releases the payload's atom reference
//! before the next token is produced.

use crate::atoms::{Atom, AtomTable, PredefAtom};
use crate::strings::JsString;

/// Token kinds.
///
/// The keyword block mirrors the predefined-atom order, so the scanner maps
/// a reserved word's atom directly to its token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // literals and names
    Number,
    String,
    Template,
    Regexp,
    Ident,
    PrivateName,
    Eof,
    /// Produced when the scanner fails; the error itself travels on the
    /// error channel.
    Error,
    /// A byte that starts no token; the parser reports it as unexpected.
    Unknown,

    // punctuators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Colon,
    Comma,
    Dot,
    Question,
    QuestionDot,
    DoubleQuestion,
    DoubleQuestionAssign,
    Assign,
    Arrow,
    Ellipsis,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    StrictEq,
    Neq,
    StrictNeq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    Inc,
    Dec,
    Shl,
    Sar,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Not,
    LAnd,
    LOr,
    MulAssign,
    DivAssign,
    ModAssign,
    PlusAssign,
    MinusAssign,
    ShlAssign,
    SarAssign,
    ShrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
    PowAssign,
    LAndAssign,
    LOrAssign,

    // keywords (same order as the predefined atoms)
    Null,
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
    /// Contextual; only materialized by `skip_parens_token` when
    /// disambiguating `for (... of ...)`.
    Of,
}

impl TokenKind {
    /// Maps a keyword atom to its token kind.
    #[must_use]
    pub fn from_keyword_atom(atom: Atom) -> Option<Self> {
        use PredefAtom as P;
        if atom.is_tagged_int() {
            return None;
        }
        let p = P::from_repr(atom.raw())?;
        Some(match p {
            P::Null => Self::Null,
            P::False => Self::False,
            P::True => Self::True,
            P::If => Self::If,
            P::Else => Self::Else,
            P::Return => Self::Return,
            P::Var => Self::Var,
            P::This => Self::This,
            P::Delete => Self::Delete,
            P::Void => Self::Void,
            P::Typeof => Self::Typeof,
            P::New => Self::New,
            P::In => Self::In,
            P::Instanceof => Self::Instanceof,
            P::Do => Self::Do,
            P::While => Self::While,
            P::For => Self::For,
            P::Break => Self::Break,
            P::Continue => Self::Continue,
            P::Switch => Self::Switch,
            P::Case => Self::Case,
            P::Default => Self::Default,
            P::Throw => Self::Throw,
            P::Try => Self::Try,
            P::Catch => Self::Catch,
            P::Finally => Self::Finally,
            P::Function => Self::Function,
            P::Debugger => Self::Debugger,
            P::With => Self::With,
            P::Class => Self::Class,
            P::Const => Self::Const,
            P::Enum => Self::Enum,
            P::Export => Self::Export,
            P::Extends => Self::Extends,
            P::Import => Self::Import,
            P::Super => Self::Super,
            P::Implements => Self::Implements,
            P::Interface => Self::Interface,
            P::Let => Self::Let,
            P::Package => Self::Package,
            P::Private => Self::Private,
            P::Protected => Self::Protected,
            P::Public => Self::Public,
            P::Static => Self::Static,
            P::Yield => Self::Yield,
            P::Await => Self::Await,
            _ => return None,
        })
    }

    /// True for any keyword token.
    #[must_use]
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::False
                | Self::True
                | Self::If
                | Self::Else
                | Self::Return
                | Self::Var
                | Self::This
                | Self::Delete
                | Self::Void
                | Self::Typeof
                | Self::New
                | Self::In
                | Self::Instanceof
                | Self::Do
                | Self::While
                | Self::For
                | Self::Break
                | Self::Continue
                | Self::Switch
                | Self::Case
                | Self::Default
                | Self::Throw
                | Self::Try
                | Self::Catch
                | Self::Finally
                | Self::Function
                | Self::Debugger
                | Self::With
                | Self::Class
                | Self::Const
                | Self::Enum
                | Self::Export
                | Self::Extends
                | Self::Import
                | Self::Super
                | Self::Implements
                | Self::Interface
                | Self::Let
                | Self::Package
                | Self::Private
                | Self::Protected
                | Self::Public
                | Self::Static
                | Self::Yield
                | Self::Await
                | Self::Of
        )
    }

    /// True for identifier-like tokens, keywords included.
    #[must_use]
    pub fn is_ident_like(self) -> bool {
        self == Self::Ident || self.is_keyword()
    }
}

/// A token payload.
#[derive(Debug)]
pub enum TokenData {
    None,
    /// The literal's already-parsed value.
    Number(f64),
    /// Decoded string value; `sep` is `'`, `"` or `` ` `` (the latter also
    /// used for template parts, where `{` marks a part that an expression
    /// follows).
    Str { value: JsString, sep: u8 },
    /// Raw regexp body and flags, captured bit-faithfully.
    Regexp { body: JsString, flags: JsString },
    /// Identifier, keyword or private name.
    Ident { atom: Atom, has_escape: bool, is_reserved: bool },
}

/// One scanned token.
#[derive(Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line of the token start.
    pub line_num: u32,
    /// Byte offset of the token start in the source.
    pub start: usize,
    pub data: TokenData,
}

impl Token {
    /// The pre-scan placeholder token.
    #[must_use]
    pub fn start_of_input() -> Self {
        Self { kind: TokenKind::Eof, line_num: 1, start: 0, data: TokenData::None }
    }

    /// Releases the payload's atom reference. String payloads are owned and
    /// drop with the token.
    pub fn free(&mut self, atoms: &mut AtomTable) {
        if let TokenData::Ident { atom, .. } = self.data {
            atoms.unref_atom(atom);
        }
        self.data = TokenData::None;
    }

    /// The identifier atom; `Atom::NULL` for non-identifier tokens.
    #[must_use]
    pub fn ident_atom(&self) -> Atom {
        match self.data {
            TokenData::Ident { atom, .. } => atom,
            _ => Atom::NULL,
        }
    }

    /// Whether the identifier was spelled with a `\u` escape.
    #[must_use]
    pub fn ident_has_escape(&self) -> bool {
        match self.data {
            TokenData::Ident { has_escape, .. } => has_escape,
            _ => false,
        }
    }

    /// Whether the identifier is a reserved word spelled with an escape.
    #[must_use]
    pub fn ident_is_reserved(&self) -> bool {
        match self.data {
            TokenData::Ident { is_reserved, .. } => is_reserved,
            _ => false,
        }
    }

    /// The numeric payload.
    ///
    /// # Panics
    ///
    /// Panics when the token is not a number.
    #[must_use]
    pub fn number(&self) -> f64 {
        match self.data {
            TokenData::Number(v) => v,
            _ => panic!("token has no numeric payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_atoms_map_to_tokens() {
        assert_eq!(TokenKind::from_keyword_atom(PredefAtom::While.atom()), Some(TokenKind::While));
        assert_eq!(TokenKind::from_keyword_atom(PredefAtom::Await.atom()), Some(TokenKind::Await));
        assert_eq!(TokenKind::from_keyword_atom(PredefAtom::Length.atom()), None);
        assert_eq!(TokenKind::from_keyword_atom(Atom::from_u32(3).unwrap()), None);
    }

    #[test]
    fn freeing_clears_payload() {
        let mut atoms = AtomTable::new();
        let a = atoms.new_atom_str("alpha").unwrap();
        let before = atoms.count();
        let mut tok = Token {
            kind: TokenKind::Ident,
            line_num: 1,
            start: 0,
            data: TokenData::Ident { atom: a, has_escape: false, is_reserved: false },
        };
        tok.free(&mut atoms);
        assert_eq!(atoms.count(), before - 1);
        assert!(matches!(tok.data, TokenData::None));
    }
}
