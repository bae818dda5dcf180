//! A QuickJS-style ECMAScript front end: scanner, recursive-descent
//! parser, bytecode emitter and a second-pass scope resolver, together
//! with the interned atom/string subsystem they sit on.
//!
//! Compilation is a two-step pipeline. [`Context::parse_script`] runs the
//! scanner and parser, producing a [`FuncTree`] whose bytecode still
//! contains `scope_*` placeholder opcodes carrying `(atom, scope id)`
//! pairs. [`Context::resolve_variables`] rewrites every placeholder into
//! concrete local/argument/closure/global accesses, instantiates hoisted
//! definitions and re-anchors labels. The resulting tree is what an
//! interpreter (out of scope here) would execute.

#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is bounds-checked by table limits")]
#![expect(clippy::cast_sign_loss, reason = "slot indexes are validated non-negative before casting")]
#![expect(clippy::cast_possible_wrap, reason = "bytecode operands reinterpret bit patterns on purpose")]
#![expect(clippy::struct_excessive_bools, reason = "compilation state mirrors the per-function flag set")]
#![expect(clippy::fn_params_excessive_bools, reason = "parse entry points take the grammar's flag set")]

pub mod atoms;
pub mod backtrace;
mod bytecode;
pub mod dump;
mod error;
mod function;
mod lexer;
mod numbers;
mod parser;
pub mod pc2line;
mod resolver;
mod resource;
mod runtime;
mod strings;
mod token;

pub use crate::{
    bytecode::{OpFmt, Opcode, SpecialObject, ThrowCode},
    error::{ExcKind, Exception, ParseResult},
    function::{
        ClosureVar, ConstEntry, EvalType, ExportEntry, ExportKind, FuncDef, FuncId, FuncKind, FuncTree, FuncType,
        GlobalVar, ImportEntry, JsMode, LabelSlot, ModuleDef, ReqModuleEntry, Scope, StarExportEntry, VarDef,
        VarKind,
    },
    numbers::{NumberFlags, canonical_u32, number_to_string, parse_number_literal},
    parser::ParseFlags,
    resource::{InterruptHandler, MAX_LOCAL_VARS, ResourceLimits},
    runtime::Context,
    strings::{JsString, StringBuffer},
    token::{Token, TokenData, TokenKind},
};
pub use crate::atoms::{Atom, AtomKind, AtomTable, PredefAtom};
