//! Bytecode representation for the front end.
//!
//! - `op` - opcode definitions and the opcode-info table
//! - `emitter` - append-only emission into the active function, labels and
//!   the last-opcode peephole cursor

pub use op::{
    DEFINE_CLASS_HAS_HERITAGE, DEFINE_GLOBAL_FUNC_VAR, DEFINE_GLOBAL_LEX_VAR, DEFINE_METHOD_ENUMERABLE,
    DEFINE_METHOD_GETTER, DEFINE_METHOD_METHOD, DEFINE_METHOD_SETTER, OpFmt, Opcode, PROP_CONFIGURABLE,
    PROP_WRITABLE, SpecialObject, ThrowCode,
};

mod emitter;
mod op;
