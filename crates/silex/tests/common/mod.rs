//! Shared helpers for the integration suites: instruction decoding and
//! subsequence matching over compiled bytecode.

use silex::{FuncDef, FuncTree, OpFmt, Opcode};

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insn {
    pub pos: usize,
    pub op: Opcode,
    /// First non-atom numeric operand (slot index, label, argc...), if any.
    pub operand: Option<u32>,
    /// Atom operand (raw), if any.
    pub atom: Option<u32>,
}

/// Decodes a function's bytecode into instructions.
///
/// Panics on an invalid opcode byte, which counts as a test failure.
pub fn decode(fd: &FuncDef) -> Vec<Insn> {
    let mut out = Vec::new();
    let buf = &fd.byte_code;
    let mut pos = 0;
    while pos < buf.len() {
        let op = Opcode::from_repr(buf[pos]).unwrap_or_else(|| panic!("invalid opcode {:#04x} at {pos}", buf[pos]));
        let (operand, atom) = match op.fmt() {
            OpFmt::None => (None, None),
            OpFmt::U8 => (Some(u32::from(buf[pos + 1])), None),
            OpFmt::U16 | OpFmt::U16U16 => (Some(u32::from(fd.get_u16(pos + 1))), None),
            OpFmt::U32 | OpFmt::Label => (Some(fd.get_u32(pos + 1)), None),
            OpFmt::Atom => (None, Some(fd.get_u32(pos + 1))),
            OpFmt::AtomU8 => (Some(u32::from(buf[pos + 5])), Some(fd.get_u32(pos + 1))),
            OpFmt::AtomU16 => (Some(u32::from(fd.get_u16(pos + 5))), Some(fd.get_u32(pos + 1))),
            OpFmt::AtomLabelU8 => (Some(fd.get_u32(pos + 5)), Some(fd.get_u32(pos + 1))),
            OpFmt::AtomLabelU16 => (Some(fd.get_u32(pos + 5)), Some(fd.get_u32(pos + 1))),
        };
        out.push(Insn { pos, op, operand, atom });
        pos += op.size();
    }
    out
}

/// True when `needle` occurs as a (not necessarily contiguous) subsequence
/// of the function's opcodes.
pub fn has_op_subsequence(fd: &FuncDef, needle: &[Opcode]) -> bool {
    let mut it = needle.iter();
    let mut want = it.next();
    for insn in decode(fd) {
        if Some(&insn.op) == want {
            want = it.next();
            if want.is_none() {
                return true;
            }
        }
    }
    want.is_none()
}

/// Asserts that no placeholder opcode survived resolution anywhere in the
/// tree.
pub fn assert_fully_resolved(tree: &FuncTree) {
    for id in tree.post_order() {
        let fd = tree.get(id);
        for insn in decode(fd) {
            assert!(
                !insn.op.is_scope_placeholder(),
                "placeholder {:?} at {} survived resolution",
                insn.op,
                insn.pos
            );
        }
    }
}
