//! Stack-string rendering.
//!
//! A parse error carries a single `    at <file>:<line>` frame. For
//! compiled functions, the host interpreter walks its own stack and hands
//! the `(function, pc)` pairs here; each frame renders as
//! `    at <func> (<file>:<line>)` with the line recovered from the
//! function's pc2line stream. A function compiled with the backtrace
//! barrier truncates the walk.

use std::fmt::Write;

use crate::{
    atoms::{Atom, AtomTable},
    function::{FuncId, FuncTree},
    pc2line,
};

/// One frame of a host-provided stack, innermost first.
#[derive(Debug, Clone, Copy)]
pub struct StackFrame {
    pub func: FuncId,
    /// Byte offset of the current instruction in the function's bytecode.
    pub pc: u32,
}

/// Renders the `stack` string for a chain of frames.
///
/// When `error_filename` is given, an extra first level carries the parse
/// position (used for errors raised before any frame exists).
#[must_use]
pub fn build_backtrace(
    atoms: &AtomTable,
    tree: &FuncTree,
    frames: &[StackFrame],
    error_filename: Option<(&str, u32)>,
) -> String {
    let mut out = String::new();
    if let Some((filename, line_num)) = error_filename {
        let _ = writeln!(out, "    at {filename}:{line_num}");
    }
    for frame in frames {
        let fd = tree.get(frame.func);
        let name = if fd.func_name == Atom::NULL {
            "<anonymous>".to_owned()
        } else {
            let s = atoms.get_str(fd.func_name);
            if s.is_empty() { "<anonymous>".to_owned() } else { s }
        };
        let _ = write!(out, "    at {name}");
        if fd.filename != Atom::NULL {
            let file = atoms.get_str(fd.filename);
            let line = pc2line::find_line_num(&fd.pc2line, fd.line_num, frame.pc);
            let _ = write!(out, " ({file}:{line})");
        }
        out.push('\n');
        // stop at a barrier-compiled function
        if fd.backtrace_barrier {
            break;
        }
    }
    out
}
