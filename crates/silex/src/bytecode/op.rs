//! Opcode definitions and the opcode-info table.
//!
//! Every opcode has a fixed byte size determined by its operand format;
//! multi-byte operands are little-endian. The `scope_*` family plus
//! `enter_scope`/`leave_scope`/`push_brand` are *placeholder* opcodes: they
//! carry an atom and a scope id instead of a slot number and are rewritten
//! by the resolver. They must never survive into resolved bytecode.

use strum::{FromRepr, IntoStaticStr};

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFmt {
    /// No operand.
    None,
    /// One u8.
    U8,
    /// One u16.
    U16,
    /// Two u16s.
    U16U16,
    /// One u32 (also used for i32 immediates and cpool indexes).
    U32,
    /// A label index (u32).
    Label,
    /// An atom (u32).
    Atom,
    /// Atom + u8.
    AtomU8,
    /// Atom + u16.
    AtomU16,
    /// Atom + label + u8.
    AtomLabelU8,
    /// Atom + label + u16.
    AtomLabelU16,
}

impl OpFmt {
    /// Operand size in bytes (opcode byte excluded).
    #[must_use]
    pub fn operand_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U16U16 => 4,
            Self::U32 | Self::Label | Self::Atom => 4,
            Self::AtomU8 => 5,
            Self::AtomU16 => 6,
            Self::AtomLabelU8 => 9,
            Self::AtomLabelU16 => 10,
        }
    }

    /// True when the first operand is an atom (always at offset 1).
    #[must_use]
    pub fn has_atom(self) -> bool {
        matches!(
            self,
            Self::Atom | Self::AtomU8 | Self::AtomU16 | Self::AtomLabelU8 | Self::AtomLabelU16
        )
    }

    /// Byte offset of the label operand relative to the opcode, if any.
    #[must_use]
    pub fn label_offset(self) -> Option<usize> {
        match self {
            Self::Label => Some(1),
            Self::AtomLabelU8 | Self::AtomLabelU16 => Some(5),
            _ => None,
        }
    }
}

/// Bytecode operations emitted by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    // control
    Nop,
    Label,
    Goto,
    IfTrue,
    IfFalse,
    Catch,
    Gosub,
    Ret,
    Return,
    ReturnUndef,
    ReturnAsync,
    Throw,
    ThrowError,
    LineNum,

    // stack
    PushConst,
    FClosure,
    PushAtomValue,
    PushI32,
    PushTrue,
    PushFalse,
    PushThis,
    Null,
    Undefined,
    Dup,
    Dup1,
    Dup2,
    Dup3,
    Drop,
    Nip,
    Nip1,
    Swap,
    Swap2,
    Perm3,
    Perm4,
    Perm5,
    Rot3L,
    Rot3R,
    Rot4L,
    Rot5L,
    Insert2,
    Insert3,
    Insert4,

    // placeholder variable access (resolved away by the second pass)
    ScopeGetVarUndef,
    ScopeGetVar,
    ScopePutVar,
    ScopeDeleteVar,
    ScopeMakeRef,
    ScopeGetRef,
    ScopePutVarInit,
    ScopeGetPrivateField,
    ScopeGetPrivateField2,
    ScopePutPrivateField,
    EnterScope,
    LeaveScope,
    /// Brand placeholder in a fields initializer; resolved to `push_true`
    /// or `push_false` from the class's `has_brand` flag.
    PushBrand,

    // resolved variable access
    GetLoc,
    PutLoc,
    GetLocCheck,
    PutLocCheck,
    PutLocCheckInit,
    GetArg,
    PutArg,
    GetVarRef,
    PutVarRef,
    GetVarRefCheck,
    PutVarRefCheck,
    PutVarRefCheckInit,
    GetVarUndef,
    GetVar,
    PutVar,
    PutVarInit,
    PutVarStrict,
    CheckVar,
    DeleteVar,
    MakeVarRef,
    MakeLocRef,
    MakeArgRef,
    MakeVarRefRef,
    GetRefValue,
    PutRefValue,
    CloseLoc,
    SetLocUninitialized,
    /// Collects the arguments from index `u16` on into a fresh array.
    Rest,

    // with-scope specializations
    WithGetVar,
    WithPutVar,
    WithDeleteVar,
    WithMakeRef,
    WithGetRef,

    // hoisted globals
    CheckDefineVar,
    DefineVar,
    DefineFunc,

    // properties
    GetField,
    GetField2,
    PutField,
    GetArrayEl,
    GetArrayEl2,
    PutArrayEl,
    GetSuperValue,
    PutSuperValue,
    GetSuper,
    DefineField,
    DefineArrayEl,
    DefineMethod,
    DefineMethodComputed,
    DefineClass,
    DefineClassComputed,
    DefinePrivateField,
    GetPrivateField,
    GetPrivateField2,
    PutPrivateField,
    PrivateSymbol,
    SetName,
    SetNameComputed,
    SetClassName,
    SetProto,
    SetHomeObject,
    AddBrand,
    CheckBrand,

    // calls
    Call,
    CallMethod,
    CallConstructor,
    Apply,
    ApplyEval,
    Eval,
    Regexp,
    Import,
    CheckCtor,
    CheckCtorReturn,
    SpecialObject,

    // object and array literals
    Object,
    ArrayFrom,
    Append,
    CopyDataProperties,

    // iteration
    ForInStart,
    ForInNext,
    ForOfStart,
    ForOfNext,
    ForAwaitOfStart,
    IteratorNext,
    IteratorCall,
    IteratorCheckObject,
    IteratorGetValueDone,
    IteratorClose,
    IteratorCloseReturn,

    // arithmetic and comparison
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    MathMod,
    Pow,
    Shl,
    Sar,
    Shr,
    And,
    Or,
    Xor,
    Not,
    LNot,
    Neg,
    Plus,
    Inc,
    Dec,
    PostInc,
    PostDec,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    In,
    InstanceOf,
    TypeOf,
    Delete,
    IsUndefinedOrNull,
    ToPropkey,
    ToPropkey2,
    ToObject,

    // async and generators
    Await,
    Yield,
    YieldStar,
    AsyncYieldStar,
    InitialYield,
}

impl Opcode {
    /// Operand format.
    #[must_use]
    pub fn fmt(self) -> OpFmt {
        use Opcode as O;
        match self {
            O::Label | O::Goto | O::IfTrue | O::IfFalse | O::Catch | O::Gosub => OpFmt::Label,
            O::ThrowError | O::CheckDefineVar | O::DefineVar | O::DefineFunc | O::DefineMethod | O::DefineClass
            | O::DefineClassComputed => OpFmt::AtomU8,
            O::LineNum | O::PushConst | O::FClosure | O::PushI32 | O::SetClassName => OpFmt::U32,
            O::PushAtomValue
            | O::GetVarUndef
            | O::GetVar
            | O::PutVar
            | O::PutVarInit
            | O::PutVarStrict
            | O::CheckVar
            | O::DeleteVar
            | O::MakeVarRef
            | O::GetField
            | O::GetField2
            | O::PutField
            | O::DefineField
            | O::PrivateSymbol
            | O::SetName => OpFmt::Atom,
            O::ScopeGetVarUndef
            | O::ScopeGetVar
            | O::ScopePutVar
            | O::ScopeDeleteVar
            | O::ScopeGetRef
            | O::ScopePutVarInit
            | O::ScopeGetPrivateField
            | O::ScopeGetPrivateField2
            | O::ScopePutPrivateField
            | O::MakeLocRef
            | O::MakeArgRef
            | O::MakeVarRefRef => OpFmt::AtomU16,
            O::ScopeMakeRef => OpFmt::AtomLabelU16,
            O::WithGetVar | O::WithPutVar | O::WithDeleteVar | O::WithMakeRef | O::WithGetRef => OpFmt::AtomLabelU8,
            O::EnterScope
            | O::LeaveScope
            | O::GetLoc
            | O::PutLoc
            | O::GetLocCheck
            | O::PutLocCheck
            | O::PutLocCheckInit
            | O::GetArg
            | O::PutArg
            | O::GetVarRef
            | O::PutVarRef
            | O::GetVarRefCheck
            | O::PutVarRefCheck
            | O::PutVarRefCheckInit
            | O::CloseLoc
            | O::SetLocUninitialized
            | O::Rest
            | O::Call
            | O::CallMethod
            | O::CallConstructor
            | O::Apply
            | O::ApplyEval
            | O::ArrayFrom => OpFmt::U16,
            O::Eval => OpFmt::U16U16,
            O::DefineMethodComputed
            | O::SpecialObject
            | O::CopyDataProperties
            | O::ForOfNext
            | O::IteratorCall => OpFmt::U8,
            _ => OpFmt::None,
        }
    }

    /// Total instruction size in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        1 + self.fmt().operand_len()
    }

    /// Opcode name as written in dumps (`get_loc`, `scope_get_var`, ...).
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// True for placeholders that the resolver must rewrite.
    #[must_use]
    pub fn is_scope_placeholder(self) -> bool {
        use Opcode as O;
        matches!(
            self,
            O::ScopeGetVarUndef
                | O::ScopeGetVar
                | O::ScopePutVar
                | O::ScopeDeleteVar
                | O::ScopeMakeRef
                | O::ScopeGetRef
                | O::ScopePutVarInit
                | O::ScopeGetPrivateField
                | O::ScopeGetPrivateField2
                | O::ScopePutPrivateField
                | O::EnterScope
                | O::LeaveScope
                | O::PushBrand
        )
    }

    /// True for opcodes after which straight-line code is unreachable.
    #[must_use]
    pub fn ends_flow(self) -> bool {
        use Opcode as O;
        matches!(
            self,
            O::Goto | O::Return | O::ReturnUndef | O::ReturnAsync | O::Throw | O::ThrowError | O::Ret
        )
    }
}

/// Operand of `throw_error`, selecting the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum ThrowCode {
    /// Write to a constant binding.
    VarReadOnly,
    /// Lexical redeclaration detected at hoisting time.
    VarRedeclared,
    /// Use of an uninitialized lexical binding.
    VarUninitialized,
    /// `delete super.x`.
    DeleteSuper,
    /// Abrupt termination of an iterator.
    IteratorThrow,
}

/// Operand of `special_object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum SpecialObject {
    Arguments,
    MappedArguments,
    ThisFunc,
    NewTarget,
    HomeObject,
    VarObject,
    ImportMeta,
}

/// `define_method` flag: plain method.
pub const DEFINE_METHOD_METHOD: u8 = 0;
/// `define_method` flag: getter.
pub const DEFINE_METHOD_GETTER: u8 = 1;
/// `define_method` flag: setter.
pub const DEFINE_METHOD_SETTER: u8 = 2;
/// `define_method` flag bit: property is enumerable.
pub const DEFINE_METHOD_ENUMERABLE: u8 = 4;

/// `define_class` flag bit: the class has an `extends` clause.
pub const DEFINE_CLASS_HAS_HERITAGE: u8 = 1;

/// Property flag bits shared with `define_var`.
pub const PROP_CONFIGURABLE: u8 = 1 << 0;
/// Property flag bits shared with `define_var`.
pub const PROP_WRITABLE: u8 = 1 << 1;
/// `define_var` flag bit: lexical (`let`/`const`) global definition.
pub const DEFINE_GLOBAL_LEX_VAR: u8 = 1 << 7;
/// `check_define_var` flag bit: the definition is a function declaration.
pub const DEFINE_GLOBAL_FUNC_VAR: u8 = 1 << 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_formats() {
        assert_eq!(Opcode::Nop.size(), 1);
        assert_eq!(Opcode::GetLoc.size(), 3);
        assert_eq!(Opcode::Goto.size(), 5);
        assert_eq!(Opcode::GetField.size(), 5);
        assert_eq!(Opcode::ThrowError.size(), 6);
        assert_eq!(Opcode::ScopeGetVar.size(), 7);
        assert_eq!(Opcode::Eval.size(), 5);
        assert_eq!(Opcode::WithGetVar.size(), 10);
        assert_eq!(Opcode::ScopeMakeRef.size(), 11);
    }

    #[test]
    fn round_trips_through_repr() {
        let op = Opcode::ScopePutVarInit;
        assert_eq!(Opcode::from_repr(op as u8), Some(op));
        assert_eq!(op.name(), "scope_put_var_init");
    }

    #[test]
    fn placeholders_are_flagged() {
        assert!(Opcode::ScopeGetVar.is_scope_placeholder());
        assert!(Opcode::PushBrand.is_scope_placeholder());
        assert!(!Opcode::GetLoc.is_scope_placeholder());
    }
}
