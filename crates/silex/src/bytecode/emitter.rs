//! Bytecode emission primitives.
//!
//! Everything appends into the active function's byte buffer. A `line_num`
//! marker is inserted automatically whenever the source line of the last
//! consumed token has changed. `last_opcode_pos` is the peephole cursor:
//! it remembers where the previous opcode starts so a few emission sites
//! can inspect or retroactively rewrite it, and it is invalidated wherever
//! a rewrite across the boundary would be unsound.

use smallvec::SmallVec;

use crate::{
    atoms::Atom,
    bytecode::Opcode,
    function::{ConstEntry, FuncDef, LabelSlot},
    parser::Parser,
    strings::JsString,
};

impl FuncDef {
    /// Allocates a fresh label slot.
    pub fn new_label_fd(&mut self) -> i32 {
        self.label_slots.push(LabelSlot { ref_count: 0, pos: -1, pos2: -1, relocs: SmallVec::new() });
        (self.label_slots.len() - 1) as i32
    }

    /// Adjusts a label's reference count.
    pub fn update_label(&mut self, label: i32, delta: i32) -> i32 {
        let ls = &mut self.label_slots[label as usize];
        ls.ref_count += delta;
        debug_assert!(ls.ref_count >= 0, "label {label} over-released");
        ls.ref_count
    }

    /// The opcode the peephole cursor points at, if the cursor is valid.
    #[must_use]
    pub fn get_prev_opcode(&self) -> Option<Opcode> {
        if self.last_opcode_pos < 0 { None } else { Some(self.opcode_at(self.last_opcode_pos as usize)) }
    }
}

impl Parser<'_, '_> {
    /// Emits one opcode, inserting a `line_num` marker when the current
    /// token line differs from the last emitted one. Uses the line of the
    /// last *consumed* token, not the look-ahead.
    pub(crate) fn emit_op(&mut self, op: Opcode) {
        let last_line_num = self.last_line_num;
        let fd = self.fd();
        if fd.last_opcode_line_num != last_line_num {
            fd.byte_code.push(Opcode::LineNum as u8);
            fd.byte_code.extend_from_slice(&last_line_num.to_le_bytes());
            fd.last_opcode_line_num = last_line_num;
        }
        fd.last_opcode_pos = fd.byte_code.len() as i32;
        fd.byte_code.push(op as u8);
    }

    pub(crate) fn emit_u8(&mut self, v: u8) {
        self.fd().byte_code.push(v);
    }

    pub(crate) fn emit_u16(&mut self, v: u16) {
        self.fd().byte_code.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn emit_u32(&mut self, v: u32) {
        self.fd().byte_code.extend_from_slice(&v.to_le_bytes());
    }

    /// Emits an atom operand, taking a new reference that the bytecode
    /// buffer owns from here on.
    pub(crate) fn emit_atom(&mut self, atom: Atom) {
        let atom = self.ctx.atoms.ref_atom(atom);
        self.emit_u32(atom.raw());
    }

    /// Allocates a fresh label in the active function.
    pub(crate) fn new_label(&mut self) -> i32 {
        self.fd().new_label_fd()
    }

    /// Emits the `label` opcode and records the label's byte position.
    /// Returns the label for chaining.
    pub(crate) fn emit_label(&mut self, label: i32) -> i32 {
        if label < 0 {
            return -1;
        }
        self.emit_op(Opcode::Label);
        self.emit_u32(label as u32);
        let fd = self.fd();
        fd.label_slots[label as usize].pos = fd.byte_code.len() as i32;
        // no rewrite may reach back across a join point
        fd.last_opcode_pos = -1;
        label
    }

    /// True when the next instruction is reachable; used to drop trivially
    /// dead jumps at emission time.
    pub(crate) fn is_live_code(&self) -> bool {
        !matches!(
            self.fd_ref().get_prev_opcode(),
            Some(
                Opcode::Return
                    | Opcode::ReturnUndef
                    | Opcode::ReturnAsync
                    | Opcode::Throw
                    | Opcode::ThrowError
                    | Opcode::Goto
            )
        )
    }

    /// Emits a goto-like opcode (allocating the label when `label < 0`),
    /// bumps the target's reference count and records the operand position
    /// in the relocation chain. Emits nothing in dead code.
    pub(crate) fn emit_goto(&mut self, op: Opcode, label: i32) -> i32 {
        if !self.is_live_code() {
            return label;
        }
        let label = if label < 0 { self.new_label() } else { label };
        self.emit_op(op);
        let fd = self.fd();
        let operand_pos = fd.byte_code.len() as u32;
        fd.byte_code.extend_from_slice(&(label as u32).to_le_bytes());
        let ls = &mut fd.label_slots[label as usize];
        ls.ref_count += 1;
        ls.relocs.push(operand_pos);
        fd.jump_size += 1;
        label
    }

    /// Pushes a string constant: as an atom value when `as_atom` is set and
    /// the string interns to a non-tagged atom, through the constant pool
    /// otherwise.
    pub(crate) fn emit_push_const_str(&mut self, value: JsString, as_atom: bool) -> crate::error::ParseResult<()> {
        if as_atom {
            let atom = self.ctx.atoms.new_atom(value.clone(), crate::atoms::AtomKind::String)?;
            if !atom.is_tagged_int() {
                self.emit_op(Opcode::PushAtomValue);
                // the freshly interned reference transfers to the bytecode
                self.emit_u32(atom.raw());
                return Ok(());
            }
            self.ctx.atoms.unref_atom(atom);
        }
        let idx = self.fd().cpool_add(ConstEntry::Str(value));
        self.emit_op(Opcode::PushConst);
        self.emit_u32(idx);
        Ok(())
    }

    /// Pushes a number: `push_i32` for exact 32-bit integers, a pool
    /// constant otherwise.
    pub(crate) fn emit_number(&mut self, v: f64) {
        let as_i32 = v as i32;
        if f64::from(as_i32) == v && (as_i32 != 0 || v.is_sign_positive()) {
            self.emit_op(Opcode::PushI32);
            self.emit_u32(as_i32 as u32);
        } else {
            let idx = self.fd().cpool_add(ConstEntry::Num(v));
            self.emit_op(Opcode::PushConst);
            self.emit_u32(idx);
        }
    }

    /// Opens a lexical scope: allocates the scope record, links it to the
    /// current scope and emits `enter_scope`. Returns the new scope index.
    pub(crate) fn push_scope(&mut self) -> usize {
        let fd = self.fd();
        let scope = fd.scopes.len();
        let parent = fd.scope_level as i32;
        let first = fd.scope_first;
        fd.scopes.push(crate::function::Scope { parent, first });
        fd.scope_level = scope;
        self.emit_op(Opcode::EnterScope);
        self.emit_u16(scope as u16);
        self.fd().last_opcode_pos = -1;
        scope
    }

    /// Closes the current scope: emits `leave_scope` and restores the
    /// parent scope's variable chain head.
    pub(crate) fn pop_scope(&mut self) {
        let scope = self.fd_ref().scope_level;
        self.emit_op(Opcode::LeaveScope);
        self.emit_u16(scope as u16);
        let fd = self.fd();
        fd.scope_level = fd.scopes[scope].parent as usize;
        fd.scope_first = fd.first_lexical_var(fd.scope_level as i32);
        fd.last_opcode_pos = -1;
    }

    /// Emits `leave_scope` for every scope from `scope` (exclusive) down to
    /// `scope_stop`, without changing the parser's current scope. Used when
    /// a jump leaves nested scopes.
    pub(crate) fn close_scopes(&mut self, mut scope: i32, scope_stop: i32) {
        while scope > scope_stop {
            self.emit_op(Opcode::LeaveScope);
            self.emit_u16(scope as u16);
            scope = self.fd_ref().scopes[scope as usize].parent;
        }
        self.fd().last_opcode_pos = -1;
    }
}

impl FuncDef {
    /// Head of the variable chain visible at `scope` (walking parents until
    /// a scope with declarations is found).
    #[must_use]
    pub fn first_lexical_var(&self, mut scope: i32) -> i32 {
        while scope >= 0 {
            let idx = self.scopes[scope as usize].first;
            if idx >= 0 {
                return idx;
            }
            scope = self.scopes[scope as usize].parent;
        }
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{EvalType, JsMode};

    #[test]
    fn labels_start_unanchored() {
        let mut fd =
            FuncDef::new(None, JsMode::empty(), 0, false, EvalType::Global, false, Atom::NULL, 1);
        let l = fd.new_label_fd();
        assert_eq!(l, 0);
        let ls = &fd.label_slots[0];
        assert_eq!((ls.ref_count, ls.pos, ls.pos2), (0, -1, -1));
        assert!(ls.relocs.is_empty());
    }
}
