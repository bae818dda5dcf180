//! Second pass: variable resolution.
//!
//! The parser emits placeholder opcodes carrying `(atom, scope id)`; this
//! pass rewrites them into concrete accesses against local slots,
//! arguments, closure variables or globals, working on one sealed
//! `FuncDef` at a time in post-order (children first, so captured
//! variables are already marked when the parent expands its
//! `leave_scope`s). The output is a fresh byte buffer that replaces the
//! input on success; labels are re-anchored through `pos2` and
//! straight-line code after unconditional control flow is dropped.

use crate::{
    atoms::{Atom, AtomTable, PredefAtom},
    bytecode::{
        DEFINE_GLOBAL_FUNC_VAR, DEFINE_GLOBAL_LEX_VAR, Opcode as Op, PROP_CONFIGURABLE, PROP_WRITABLE, ThrowCode,
    },
    error::{Exception, ParseResult},
    function::{EvalType, FuncDef, FuncTree, JsMode, VarKind, ARGUMENT_VAR_OFFSET, ARG_SCOPE_END},
    pc2line,
    runtime::Context,
};

/// Resolves every function of the tree, children before parents.
pub(crate) fn resolve_variables(ctx: &mut Context, mut tree: FuncTree) -> ParseResult<FuncTree> {
    for id in tree.post_order() {
        if let Err(e) = resolve_function(ctx, &mut tree.funcs, id.index()) {
            tree.free(&mut ctx.atoms);
            return Err(e);
        }
    }
    Ok(tree)
}

fn get_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn get_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

fn put_u16_at(buf: &mut [u8], pos: usize, v: u16) {
    buf[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32_at(buf: &mut [u8], pos: usize, v: u32) {
    buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

fn emit(bc: &mut Vec<u8>, op: Op) {
    bc.push(op as u8);
}

fn emit_u16(bc: &mut Vec<u8>, v: u16) {
    bc.extend_from_slice(&v.to_le_bytes());
}

fn emit_u32(bc: &mut Vec<u8>, v: u32) {
    bc.extend_from_slice(&v.to_le_bytes());
}

/// Emits an atom operand, taking a reference owned by the output buffer.
fn emit_atom(atoms: &mut AtomTable, bc: &mut Vec<u8>, atom: Atom) {
    atoms.ref_atom(atom);
    emit_u32(bc, atom.raw());
}

fn opcode_at(buf: &[u8], pos: usize) -> Op {
    Op::from_repr(buf[pos]).expect("invalid opcode byte in bytecode")
}

/// The with-scope specialization of a placeholder opcode.
fn with_op_for(op: Op) -> Op {
    match op {
        Op::ScopeGetVarUndef | Op::ScopeGetVar => Op::WithGetVar,
        Op::ScopePutVar => Op::WithPutVar,
        Op::ScopeDeleteVar => Op::WithDeleteVar,
        Op::ScopeMakeRef => Op::WithMakeRef,
        Op::ScopeGetRef => Op::WithGetRef,
        _ => unreachable!("no with specialization for {op:?}"),
    }
}

/// Matcher over the parse-time buffer that skips `line_num` markers.
struct CodeContext<'a> {
    buf: &'a [u8],
    /// Position after the matched sequence.
    pos: usize,
    /// Last `line_num` value crossed, or `-1`.
    line_num: i64,
    /// Label operand of the last matched goto-like opcode.
    label: i32,
    /// The opcode matched for an `Either` pattern element.
    op: Op,
}

enum Pat {
    One(Op),
    Either(Op, Op),
}

impl<'a> CodeContext<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, line_num: -1, label: -1, op: Op::Nop }
    }

    /// True when the instructions starting at `pos` (ignoring `line_num`)
    /// match `pattern`; captures position, line, label and matched opcode.
    fn matches(&mut self, mut pos: usize, pattern: &[Pat]) -> bool {
        self.line_num = -1;
        for pat in pattern {
            loop {
                if pos >= self.buf.len() {
                    return false;
                }
                let op = opcode_at(self.buf, pos);
                if op == Op::LineNum {
                    self.line_num = i64::from(get_u32(self.buf, pos + 1));
                    pos += op.size();
                } else {
                    break;
                }
            }
            let op = opcode_at(self.buf, pos);
            let ok = match pat {
                Pat::One(p) => op == *p,
                Pat::Either(a, b) => op == *a || op == *b,
            };
            if !ok {
                return false;
            }
            if op.fmt().label_offset() == Some(1) {
                self.label = get_u32(self.buf, pos + 1) as i32;
            }
            self.op = op;
            pos += op.size();
        }
        self.pos = pos;
        true
    }
}

/// Follows label/goto chains to the position of the first effective
/// instruction a label leads to.
fn get_label_pos(fd: &FuncDef, bc_buf: &[u8], mut label: i32) -> usize {
    let mut pos = 0;
    for _ in 0..20 {
        pos = fd.label_slots[label as usize].pos as usize;
        loop {
            match opcode_at(bc_buf, pos) {
                Op::LineNum | Op::Label => {
                    pos += 5;
                }
                Op::Goto => {
                    label = get_u32(bc_buf, pos + 1) as i32;
                    break;
                }
                _ => return pos,
            }
        }
    }
    pos
}

/// Skips unreachable instructions after unconditional control flow,
/// releasing the atom references they carry, until a referenced label.
fn skip_dead_code(
    fd: &mut FuncDef,
    atoms: &mut AtomTable,
    bc_buf: &[u8],
    mut pos: usize,
    line: &mut i64,
) -> usize {
    while pos < bc_buf.len() {
        let op = opcode_at(bc_buf, pos);
        let len = op.size();
        if op == Op::LineNum {
            *line = i64::from(get_u32(bc_buf, pos + 1));
        } else if op == Op::Label {
            let label = get_u32(bc_buf, pos + 1) as i32;
            if fd.update_label(label, 0) > 0 {
                break;
            }
        } else if op.fmt().has_atom() {
            atoms.unref_atom(Atom::from_raw(get_u32(bc_buf, pos + 1)));
        }
        pos += len;
    }
    pos
}

/// Marks every variable visible from `scope_level` as captured, so a
/// direct `eval` in that scope sees them as closure cells.
fn mark_eval_captured_variables(fd: &mut FuncDef, scope_level: usize) {
    let mut idx = fd.scopes[scope_level].first;
    while idx >= 0 {
        let vd = &mut fd.vars[idx as usize];
        vd.is_captured = true;
        idx = vd.scope_next;
    }
}

/// Lazily materializes `this`/`new.target`/`<home_object>`/
/// `this.active_func` slots on the function owning the binding.
fn resolve_pseudo_var(funcs: &mut [FuncDef], atoms: &mut AtomTable, fidx: usize, var_name: Atom) -> i32 {
    let fd = &mut funcs[fidx];
    if !fd.has_this_binding {
        return -1;
    }
    if var_name == PredefAtom::HomeObject {
        if fd.home_object_var_idx < 0 {
            fd.home_object_var_idx = i32::from(fd.add_var(atoms, var_name));
        }
        fd.home_object_var_idx
    } else if var_name == PredefAtom::ThisActiveFunc {
        if fd.this_active_func_var_idx < 0 {
            fd.this_active_func_var_idx = i32::from(fd.add_var(atoms, var_name));
        }
        fd.this_active_func_var_idx
    } else if var_name == PredefAtom::NewTarget {
        if fd.new_target_var_idx < 0 {
            fd.new_target_var_idx = i32::from(fd.add_var(atoms, var_name));
        }
        fd.new_target_var_idx
    } else if var_name == PredefAtom::This {
        if fd.this_var_idx < 0 {
            let idx = fd.add_var(atoms, var_name);
            if fd.is_derived_class_constructor {
                // triggers the 'uninitialized' checks until super() runs
                fd.vars[idx as usize].is_lexical = true;
            }
            fd.this_var_idx = i32::from(idx);
        }
        fd.this_var_idx
    } else {
        -1
    }
}

/// Creates (or reuses) the chain of closure-variable entries from `s` up
/// to the function `fd` defining the binding. `is_local` is true when
/// `var_idx` indexes `fd`'s own locals/arguments rather than its closure
/// list.
#[expect(clippy::too_many_arguments, reason = "mirrors the resolution state it threads")]
fn get_closure_var2(
    ctx_limit: usize,
    funcs: &mut [FuncDef],
    atoms: &mut AtomTable,
    s: usize,
    fd: usize,
    is_local: bool,
    is_arg: bool,
    var_idx: u16,
    var_name: Atom,
    is_const: bool,
    is_lexical: bool,
    kind: VarKind,
) -> ParseResult<u16> {
    let mut var_idx = var_idx;
    let mut is_local = is_local;
    let parent = funcs[s].parent.expect("closure access implies a parent").index();
    if fd != parent {
        var_idx = get_closure_var2(
            ctx_limit, funcs, atoms, parent, fd, is_local, is_arg, var_idx, var_name, is_const, is_lexical, kind,
        )?;
        is_local = false;
    }
    let sfd = &mut funcs[s];
    for (i, cv) in sfd.closure_vars.iter().enumerate() {
        if cv.var_idx == var_idx && cv.is_arg == is_arg && cv.is_local == is_local {
            return Ok(i as u16);
        }
    }
    if sfd.closure_vars.len() >= ctx_limit {
        return Err(Exception::internal("too many closure variables"));
    }
    Ok(sfd.add_closure_var(atoms, is_local, is_arg, var_idx, var_name, is_const, is_lexical, kind) as u16)
}

#[expect(clippy::too_many_arguments, reason = "mirrors the resolution state it threads")]
fn get_closure_var(
    ctx_limit: usize,
    funcs: &mut [FuncDef],
    atoms: &mut AtomTable,
    s: usize,
    fd: usize,
    is_arg: bool,
    var_idx: u16,
    var_name: Atom,
    is_const: bool,
    is_lexical: bool,
    kind: VarKind,
) -> ParseResult<u16> {
    get_closure_var2(ctx_limit, funcs, atoms, s, fd, true, is_arg, var_idx, var_name, is_const, is_lexical, kind)
}

/// Emits the runtime membership test against a with-object or variable
/// object: when the name is found there, control transfers to the shared
/// done label.
fn var_object_test(
    atoms: &mut AtomTable,
    fd: &mut FuncDef,
    var_name: Atom,
    op: Op,
    bc: &mut Vec<u8>,
    label_done: &mut i32,
    is_with: bool,
) {
    emit(bc, with_op_for(op));
    emit_atom(atoms, bc, var_name);
    if *label_done < 0 {
        *label_done = fd.new_label_fd();
    }
    emit_u32(bc, *label_done as u32);
    bc.push(u8::from(is_with));
    fd.update_label(*label_done, 1);
    fd.jump_size += 1;
}

/// True when the two instructions at the label anchor are one of the
/// `put_lvalue` shapes that can fuse with a direct store.
fn can_opt_put_ref_value(bc_buf: &[u8], pos: usize) -> bool {
    if pos + 1 >= bc_buf.len() {
        return false;
    }
    let opcode = opcode_at(bc_buf, pos);
    opcode_at(bc_buf, pos + 1) == Op::PutRefValue
        && matches!(opcode, Op::Insert3 | Op::Perm4 | Op::Nop | Op::Rot3L)
}

/// Fuses a `scope_make_ref .. put_ref_value` pair into a direct local or
/// closure store: the reference get/put becomes plain accesses, and the
/// label region in the (not yet copied) input buffer is patched into the
/// store instruction padded with nops.
#[expect(clippy::too_many_arguments, reason = "patches two buffers plus label state")]
fn optimize_scope_make_ref(
    fd: &mut FuncDef,
    bc: &mut Vec<u8>,
    bc_buf: &mut [u8],
    label: i32,
    mut pos_next: usize,
    get_op: Op,
    put_op: Op,
    var_idx: u16,
) -> usize {
    if opcode_at(bc_buf, pos_next) == Op::GetRefValue {
        emit(bc, get_op);
        emit_u16(bc, var_idx);
        pos_next += 1;
    }
    let label_pos = fd.label_slots[label as usize].pos as usize;
    let mut pos = label_pos - 5;
    debug_assert_eq!(opcode_at(bc_buf, pos), Op::Label);
    // the label anchors an instruction pair: insert3/perm4/rot3l/nop
    // followed by put_ref_value
    let end_pos = label_pos + 2;
    if opcode_at(bc_buf, label_pos) == Op::Insert3 {
        bc_buf[pos] = Op::Dup as u8;
        pos += 1;
    }
    bc_buf[pos] = put_op as u8;
    put_u16_at(bc_buf, pos + 1, var_idx);
    pos += 3;
    while pos < end_pos {
        bc_buf[pos] = Op::Nop as u8;
        pos += 1;
    }
    pos_next
}

/// Global-store variant of the make-ref fusion; strict mode checks the
/// binding exists before evaluating the right-hand side.
fn optimize_scope_make_global_ref(
    atoms: &mut AtomTable,
    fd: &mut FuncDef,
    bc: &mut Vec<u8>,
    bc_buf: &mut [u8],
    label: i32,
    mut pos_next: usize,
    var_name: Atom,
) -> usize {
    let is_strict = fd.js_mode.contains(JsMode::STRICT);
    if is_strict {
        emit(bc, Op::CheckVar);
        emit_atom(atoms, bc, var_name);
    }
    if opcode_at(bc_buf, pos_next) == Op::GetRefValue {
        emit(bc, Op::GetVar);
        emit_atom(atoms, bc, var_name);
        pos_next += 1;
    }
    let label_pos = fd.label_slots[label as usize].pos as usize;
    let mut pos = label_pos - 5;
    debug_assert_eq!(opcode_at(bc_buf, pos), Op::Label);
    let end_pos = label_pos + 2;
    let op = opcode_at(bc_buf, label_pos);
    if is_strict {
        if op != Op::Nop {
            let replacement = match op {
                Op::Insert3 => Op::Insert2,
                Op::Perm4 => Op::Perm3,
                Op::Rot3L => Op::Swap,
                _ => unreachable!("unexpected lvalue shape"),
            };
            bc_buf[pos] = replacement as u8;
            pos += 1;
        }
    } else if op == Op::Insert3 {
        bc_buf[pos] = Op::Dup as u8;
        pos += 1;
    }
    bc_buf[pos] = if is_strict { Op::PutVarStrict } else { Op::PutVar } as u8;
    atoms.ref_atom(var_name);
    put_u32_at(bc_buf, pos + 1, var_name.raw());
    pos += 5;
    while pos < end_pos {
        bc_buf[pos] = Op::Nop as u8;
        pos += 1;
    }
    pos_next
}

/// Resolution outcome for a local or closure slot.
struct SlotOps {
    get: Op,
    put: Op,
}

/// Resolves one `(var_name, scope_level)` placeholder, appending the
/// replacement opcodes. Returns the position of the next input opcode
/// (the make-ref fusion can consume a following `get_ref_value`).
#[expect(clippy::too_many_arguments, reason = "ports the C resolution state")]
fn resolve_scope_var(
    ctx: &mut Context,
    funcs: &mut [FuncDef],
    cur: usize,
    var_name: Atom,
    scope_level: usize,
    op: Op,
    bc: &mut Vec<u8>,
    bc_buf: &mut [u8],
    label: i32,
    mut pos_next: usize,
) -> ParseResult<usize> {
    let mut label_done = -1i32;

    let is_pseudo_var = var_name == PredefAtom::HomeObject
        || var_name == PredefAtom::ThisActiveFunc
        || var_name == PredefAtom::NewTarget
        || var_name == PredefAtom::This;

    // resolve against the local lexical scopes
    let mut var_idx = -1i32;
    let mut idx = funcs[cur].scopes[scope_level].first;
    while idx >= 0 {
        let (name, is_const, next) = {
            let vd = &funcs[cur].vars[idx as usize];
            (vd.name, vd.is_const, vd.scope_next)
        };
        if name == var_name {
            if (op == Op::ScopePutVar || op == Op::ScopeMakeRef) && is_const {
                emit(bc, Op::ThrowError);
                emit_atom(&mut ctx.atoms, bc, var_name);
                bc.push(ThrowCode::VarReadOnly as u8);
                finish_label(funcs, cur, bc, label_done);
                return Ok(pos_next);
            }
            var_idx = idx;
            break;
        } else if name == PredefAtom::SpecialWith && !is_pseudo_var {
            emit(bc, Op::GetLoc);
            emit_u16(bc, idx as u16);
            var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, true);
        }
        idx = next;
    }
    let mut is_arg_scope = idx == ARG_SCOPE_END;
    if var_idx < 0 {
        // in the argument scope, function-level variables are not visible
        // but pseudo variables are
        if !is_arg_scope {
            var_idx = funcs[cur].find_var(var_name);
        }
        if var_idx < 0 && is_pseudo_var {
            var_idx = resolve_pseudo_var(funcs, &mut ctx.atoms, cur, var_name);
        }
        if var_idx < 0 && var_name == PredefAtom::Arguments && funcs[cur].has_arguments_binding {
            var_idx = i32::from(funcs[cur].add_arguments_var(&mut ctx.atoms));
        }
        if var_idx < 0 && funcs[cur].is_func_expr && var_name == funcs[cur].func_name {
            var_idx = i32::from(funcs[cur].add_func_var(&mut ctx.atoms, var_name));
        }
    }
    if var_idx >= 0 {
        if (op == Op::ScopePutVar || op == Op::ScopeMakeRef)
            && var_idx & ARGUMENT_VAR_OFFSET == 0
            && funcs[cur].vars[var_idx as usize].is_const
        {
            // assigning a function expression's own name in strict mode
            emit(bc, Op::ThrowError);
            emit_atom(&mut ctx.atoms, bc, var_name);
            bc.push(ThrowCode::VarReadOnly as u8);
            finish_label(funcs, cur, bc, label_done);
            return Ok(pos_next);
        }
        match op {
            Op::ScopeMakeRef => {
                if var_idx & ARGUMENT_VAR_OFFSET == 0
                    && funcs[cur].vars[var_idx as usize].kind == VarKind::FunctionName
                {
                    // a dummy object reference for the function-name binding
                    emit(bc, Op::Object);
                    emit(bc, Op::GetLoc);
                    emit_u16(bc, var_idx as u16);
                    emit(bc, Op::DefineField);
                    emit_atom(&mut ctx.atoms, bc, var_name);
                    emit(bc, Op::PushAtomValue);
                    emit_atom(&mut ctx.atoms, bc, var_name);
                } else if label_done == -1 && can_opt_put_ref_value(bc_buf, funcs[cur].label_slots[label as usize].pos as usize)
                {
                    let (slot, ops) = local_slot_ops(&funcs[cur], var_idx);
                    pos_next =
                        optimize_scope_make_ref(&mut funcs[cur], bc, bc_buf, label, pos_next, ops.get, ops.put, slot);
                } else {
                    // a dummy object whose named slot is a live reference
                    // to the local
                    if var_idx & ARGUMENT_VAR_OFFSET != 0 {
                        emit(bc, Op::MakeArgRef);
                        emit_atom(&mut ctx.atoms, bc, var_name);
                        emit_u16(bc, (var_idx & !ARGUMENT_VAR_OFFSET) as u16);
                    } else {
                        emit(bc, Op::MakeLocRef);
                        emit_atom(&mut ctx.atoms, bc, var_name);
                        emit_u16(bc, var_idx as u16);
                    }
                }
            }
            Op::ScopeGetRef
            | Op::ScopeGetVarUndef
            | Op::ScopeGetVar
            | Op::ScopePutVar
            | Op::ScopePutVarInit => {
                if op == Op::ScopeGetRef {
                    emit(bc, Op::Undefined);
                }
                let is_put = op == Op::ScopePutVar || op == Op::ScopePutVarInit;
                if var_idx & ARGUMENT_VAR_OFFSET != 0 {
                    emit(bc, if is_put { Op::PutArg } else { Op::GetArg });
                    emit_u16(bc, (var_idx & !ARGUMENT_VAR_OFFSET) as u16);
                } else {
                    let is_lexical = funcs[cur].vars[var_idx as usize].is_lexical;
                    let chosen = if is_put {
                        if is_lexical {
                            if op == Op::ScopePutVarInit {
                                // single-initialization check; this is also
                                // what makes a second super() throw
                                Op::PutLocCheckInit
                            } else {
                                Op::PutLocCheck
                            }
                        } else {
                            Op::PutLoc
                        }
                    } else if is_lexical {
                        Op::GetLocCheck
                    } else {
                        Op::GetLoc
                    };
                    emit(bc, chosen);
                    emit_u16(bc, var_idx as u16);
                }
            }
            Op::ScopeDeleteVar => {
                emit(bc, Op::PushFalse);
            }
            _ => unreachable!("unexpected scope opcode {op:?}"),
        }
        finish_label(funcs, cur, bc, label_done);
        return Ok(pos_next);
    }

    // the eval variable object of the current function
    if !is_arg_scope && funcs[cur].var_object_idx >= 0 && !is_pseudo_var {
        let vo = funcs[cur].var_object_idx as u16;
        emit(bc, Op::GetLoc);
        emit_u16(bc, vo);
        var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, false);
    }
    if funcs[cur].arg_var_object_idx >= 0 && !is_pseudo_var {
        let vo = funcs[cur].arg_var_object_idx as u16;
        emit(bc, Op::GetLoc);
        emit_u16(bc, vo);
        var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, false);
    }

    // walk the enclosing functions
    let max_closure = ctx.limits.max_closure_vars;
    let mut fd_idx = cur;
    let mut found: Option<(usize, i32)> = None; // (function, var idx)
    while funcs[fd_idx].parent.is_some() {
        let scope = funcs[fd_idx].parent_scope_level as usize;
        fd_idx = funcs[fd_idx].parent.expect("checked above").index();
        let mut idx = funcs[fd_idx].scopes[scope].first;
        while idx >= 0 {
            let (name, is_const, next) = {
                let vd = &funcs[fd_idx].vars[idx as usize];
                (vd.name, vd.is_const, vd.scope_next)
            };
            if name == var_name {
                if (op == Op::ScopePutVar || op == Op::ScopeMakeRef) && is_const {
                    emit(bc, Op::ThrowError);
                    emit_atom(&mut ctx.atoms, bc, var_name);
                    bc.push(ThrowCode::VarReadOnly as u8);
                    finish_label(funcs, cur, bc, label_done);
                    return Ok(pos_next);
                }
                found = Some((fd_idx, idx));
                break;
            } else if name == PredefAtom::SpecialWith && !is_pseudo_var {
                funcs[fd_idx].vars[idx as usize].is_captured = true;
                let cv_idx = get_closure_var(
                    max_closure, funcs, &mut ctx.atoms, cur, fd_idx, false, idx as u16, name, false, false,
                    VarKind::Normal,
                )?;
                emit(bc, Op::GetVarRef);
                emit_u16(bc, cv_idx);
                var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, true);
            }
            idx = next;
        }
        is_arg_scope = idx == ARG_SCOPE_END;
        if found.is_some() {
            break;
        }

        if !is_arg_scope {
            let v = funcs[fd_idx].find_var(var_name);
            if v >= 0 {
                found = Some((fd_idx, v));
                break;
            }
        }
        if is_pseudo_var {
            let v = resolve_pseudo_var(funcs, &mut ctx.atoms, fd_idx, var_name);
            if v >= 0 {
                found = Some((fd_idx, v));
                break;
            }
        }
        if var_name == PredefAtom::Arguments && funcs[fd_idx].has_arguments_binding {
            let v = i32::from(funcs[fd_idx].add_arguments_var(&mut ctx.atoms));
            found = Some((fd_idx, v));
            break;
        }
        if funcs[fd_idx].is_func_expr && funcs[fd_idx].func_name == var_name {
            let v = i32::from(funcs[fd_idx].add_func_var(&mut ctx.atoms, var_name));
            found = Some((fd_idx, v));
            break;
        }

        // eval variable objects of the enclosing function
        if !is_arg_scope && funcs[fd_idx].var_object_idx >= 0 && !is_pseudo_var {
            let vo = funcs[fd_idx].var_object_idx;
            funcs[fd_idx].vars[vo as usize].is_captured = true;
            let vo_name = funcs[fd_idx].vars[vo as usize].name;
            let cv_idx = get_closure_var(
                max_closure, funcs, &mut ctx.atoms, cur, fd_idx, false, vo as u16, vo_name, false, false,
                VarKind::Normal,
            )?;
            emit(bc, Op::GetVarRef);
            emit_u16(bc, cv_idx);
            var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, false);
        }
        if funcs[fd_idx].arg_var_object_idx >= 0 && !is_pseudo_var {
            let vo = funcs[fd_idx].arg_var_object_idx;
            funcs[fd_idx].vars[vo as usize].is_captured = true;
            let vo_name = funcs[fd_idx].vars[vo as usize].name;
            let cv_idx = get_closure_var(
                max_closure, funcs, &mut ctx.atoms, cur, fd_idx, false, vo as u16, vo_name, false, false,
                VarKind::Normal,
            )?;
            emit(bc, Op::GetVarRef);
            emit_u16(bc, cv_idx);
            var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, false);
        }

        if funcs[fd_idx].is_eval {
            break; // necessarily the top-level function
        }
    }

    // the closure of a direct eval (necessarily at the top level) may
    // carry the binding or a variable-object sentinel
    let mut closure_idx: Option<u16> = None;
    if found.is_none() && funcs[fd_idx].is_eval {
        for idx1 in 0..funcs[fd_idx].closure_vars.len() {
            let (cv_name, cv_is_arg, cv_is_const, cv_is_lexical, cv_kind) = {
                let cv = &funcs[fd_idx].closure_vars[idx1];
                (cv.name, cv.is_arg, cv.is_const, cv.is_lexical, cv.kind)
            };
            if cv_name == var_name {
                let idx = if fd_idx == cur {
                    idx1 as u16
                } else {
                    get_closure_var2(
                        max_closure, funcs, &mut ctx.atoms, cur, fd_idx, false, cv_is_arg, idx1 as u16, cv_name,
                        cv_is_const, cv_is_lexical, cv_kind,
                    )?
                };
                closure_idx = Some(idx);
                break;
            } else if (cv_name == PredefAtom::SpecialVar
                || cv_name == PredefAtom::SpecialArgVar
                || cv_name == PredefAtom::SpecialWith)
                && !is_pseudo_var
            {
                let is_with = cv_name == PredefAtom::SpecialWith;
                let idx = if fd_idx == cur {
                    idx1 as u16
                } else {
                    get_closure_var2(
                        max_closure, funcs, &mut ctx.atoms, cur, fd_idx, false, cv_is_arg, idx1 as u16, cv_name,
                        false, false, VarKind::Normal,
                    )?
                };
                emit(bc, Op::GetVarRef);
                emit_u16(bc, idx);
                var_object_test(&mut ctx.atoms, &mut funcs[cur], var_name, op, bc, &mut label_done, is_with);
            }
        }
    }

    if closure_idx.is_none() {
        if let Some((def_fn, def_idx)) = found {
            // synthesize the closure chain down to the definer
            let idx = if def_idx & ARGUMENT_VAR_OFFSET != 0 {
                let arg_idx = (def_idx & !ARGUMENT_VAR_OFFSET) as usize;
                funcs[def_fn].args[arg_idx].is_captured = true;
                get_closure_var(
                    max_closure, funcs, &mut ctx.atoms, cur, def_fn, true, arg_idx as u16, var_name, false, false,
                    VarKind::Normal,
                )?
            } else {
                let (is_const, is_lexical, kind) = {
                    let vd = &funcs[def_fn].vars[def_idx as usize];
                    (vd.is_const, vd.is_lexical, vd.kind)
                };
                funcs[def_fn].vars[def_idx as usize].is_captured = true;
                get_closure_var(
                    max_closure, funcs, &mut ctx.atoms, cur, def_fn, false, def_idx as u16, var_name, is_const,
                    is_lexical, kind,
                )?
            };
            closure_idx = Some(idx);
        }
    }

    if let Some(idx) = closure_idx {
        let cv_is_const = funcs[cur].closure_vars[idx as usize].is_const;
        let cv_is_lexical = funcs[cur].closure_vars[idx as usize].is_lexical;
        let cv_kind = funcs[cur].closure_vars[idx as usize].kind;
        if (op == Op::ScopePutVar || op == Op::ScopeMakeRef) && cv_is_const {
            emit(bc, Op::ThrowError);
            emit_atom(&mut ctx.atoms, bc, var_name);
            bc.push(ThrowCode::VarReadOnly as u8);
            finish_label(funcs, cur, bc, label_done);
            return Ok(pos_next);
        }
        match op {
            Op::ScopeMakeRef => {
                if cv_kind == VarKind::FunctionName {
                    emit(bc, Op::Object);
                    emit(bc, Op::GetVarRef);
                    emit_u16(bc, idx);
                    emit(bc, Op::DefineField);
                    emit_atom(&mut ctx.atoms, bc, var_name);
                    emit(bc, Op::PushAtomValue);
                    emit_atom(&mut ctx.atoms, bc, var_name);
                } else if label_done == -1
                    && can_opt_put_ref_value(bc_buf, funcs[cur].label_slots[label as usize].pos as usize)
                {
                    let ops = if cv_is_lexical {
                        SlotOps { get: Op::GetVarRefCheck, put: Op::PutVarRefCheck }
                    } else {
                        SlotOps { get: Op::GetVarRef, put: Op::PutVarRef }
                    };
                    pos_next =
                        optimize_scope_make_ref(&mut funcs[cur], bc, bc_buf, label, pos_next, ops.get, ops.put, idx);
                } else {
                    emit(bc, Op::MakeVarRefRef);
                    emit_atom(&mut ctx.atoms, bc, var_name);
                    emit_u16(bc, idx);
                }
            }
            Op::ScopeGetRef
            | Op::ScopeGetVarUndef
            | Op::ScopeGetVar
            | Op::ScopePutVar
            | Op::ScopePutVarInit => {
                if op == Op::ScopeGetRef {
                    emit(bc, Op::Undefined);
                }
                let is_put = op == Op::ScopePutVar || op == Op::ScopePutVarInit;
                let chosen = if is_put {
                    if cv_is_lexical {
                        if op == Op::ScopePutVarInit {
                            // single-initialization check, shared with the
                            // second-super() rejection
                            Op::PutVarRefCheckInit
                        } else {
                            Op::PutVarRefCheck
                        }
                    } else {
                        Op::PutVarRef
                    }
                } else if cv_is_lexical {
                    Op::GetVarRefCheck
                } else {
                    Op::GetVarRef
                };
                emit(bc, chosen);
                emit_u16(bc, idx);
            }
            Op::ScopeDeleteVar => {
                emit(bc, Op::PushFalse);
            }
            _ => unreachable!("unexpected scope opcode {op:?}"),
        }
        finish_label(funcs, cur, bc, label_done);
        return Ok(pos_next);
    }

    // global variable access
    match op {
        Op::ScopeMakeRef => {
            if label_done == -1 && can_opt_put_ref_value(bc_buf, funcs[cur].label_slots[label as usize].pos as usize) {
                pos_next =
                    optimize_scope_make_global_ref(&mut ctx.atoms, &mut funcs[cur], bc, bc_buf, label, pos_next, var_name);
            } else {
                emit(bc, Op::MakeVarRef);
                emit_atom(&mut ctx.atoms, bc, var_name);
            }
        }
        Op::ScopeGetRef => {
            emit(bc, Op::Undefined);
            emit(bc, Op::GetVar);
            emit_atom(&mut ctx.atoms, bc, var_name);
        }
        Op::ScopeGetVarUndef => {
            emit(bc, Op::GetVarUndef);
            emit_atom(&mut ctx.atoms, bc, var_name);
        }
        Op::ScopeGetVar => {
            emit(bc, Op::GetVar);
            emit_atom(&mut ctx.atoms, bc, var_name);
        }
        Op::ScopePutVar => {
            emit(bc, Op::PutVar);
            emit_atom(&mut ctx.atoms, bc, var_name);
        }
        Op::ScopePutVarInit => {
            emit(bc, Op::PutVarInit);
            emit_atom(&mut ctx.atoms, bc, var_name);
        }
        Op::ScopeDeleteVar => {
            emit(bc, Op::DeleteVar);
            emit_atom(&mut ctx.atoms, bc, var_name);
        }
        _ => unreachable!("unexpected scope opcode {op:?}"),
    }
    finish_label(funcs, cur, bc, label_done);
    Ok(pos_next)
}

/// Anchors the shared done label of the with/var-object trampolines.
fn finish_label(funcs: &mut [FuncDef], cur: usize, bc: &mut Vec<u8>, label_done: i32) {
    if label_done >= 0 {
        emit(bc, Op::Label);
        emit_u32(bc, label_done as u32);
        funcs[cur].label_slots[label_done as usize].pos2 = bc.len() as i32;
    }
}

/// The get/put pair for a local or argument slot.
fn local_slot_ops(fd: &FuncDef, var_idx: i32) -> (u16, SlotOps) {
    if var_idx & ARGUMENT_VAR_OFFSET != 0 {
        ((var_idx & !ARGUMENT_VAR_OFFSET) as u16, SlotOps { get: Op::GetArg, put: Op::PutArg })
    } else if fd.vars[var_idx as usize].is_lexical {
        (var_idx as u16, SlotOps { get: Op::GetLocCheck, put: Op::PutLocCheck })
    } else {
        (var_idx as u16, SlotOps { get: Op::GetLoc, put: Op::PutLoc })
    }
}

/// Private-name lookup along the visible scope chain; returns the slot,
/// whether it lives in an enclosing function (then already synthesized as
/// a closure variable), and its kind.
fn resolve_scope_private_field1(
    ctx: &mut Context,
    funcs: &mut [FuncDef],
    cur: usize,
    var_name: Atom,
    scope_level: usize,
) -> ParseResult<(u16, bool, VarKind)> {
    let max_closure = ctx.limits.max_closure_vars;
    let mut fd = cur;
    let mut scope = scope_level;
    let mut is_ref = false;
    loop {
        let mut idx = funcs[fd].scopes[scope].first;
        let mut found = -1i32;
        while idx >= 0 {
            let vd = &funcs[fd].vars[idx as usize];
            if vd.name == var_name && vd.kind.is_private() {
                found = idx;
                break;
            }
            idx = vd.scope_next;
        }
        if found >= 0 {
            let kind = funcs[fd].vars[found as usize].kind;
            let slot = if is_ref {
                funcs[fd].vars[found as usize].is_captured = true;
                get_closure_var(
                    max_closure, funcs, &mut ctx.atoms, cur, fd, false, found as u16, var_name, true, true,
                    VarKind::Normal,
                )?
            } else {
                found as u16
            };
            return Ok((slot, is_ref, kind));
        }
        scope = funcs[fd].parent_scope_level as usize;
        match funcs[fd].parent {
            Some(p) => fd = p.index(),
            None => {
                let name = ctx.atoms.get_str(var_name);
                return Err(Exception::syntax(format!("undefined private field '{name}'")));
            }
        }
        is_ref = true;
    }
}

fn get_loc_or_ref(bc: &mut Vec<u8>, is_ref: bool, idx: u16) {
    emit(bc, if is_ref { Op::GetVarRef } else { Op::GetLoc });
    emit_u16(bc, idx);
}

/// Rewrites a private-field placeholder into the concrete symbol load and
/// access sequence, with brand checks for methods and accessors.
fn resolve_scope_private_field(
    ctx: &mut Context,
    funcs: &mut [FuncDef],
    cur: usize,
    var_name: Atom,
    scope_level: usize,
    op: Op,
    bc: &mut Vec<u8>,
) -> ParseResult<()> {
    let (idx, is_ref, kind) = resolve_scope_private_field1(ctx, funcs, cur, var_name, scope_level)?;
    match op {
        Op::ScopeGetPrivateField | Op::ScopeGetPrivateField2 => match kind {
            VarKind::PrivateField => {
                if op == Op::ScopeGetPrivateField2 {
                    emit(bc, Op::Dup);
                }
                get_loc_or_ref(bc, is_ref, idx);
                emit(bc, Op::GetPrivateField);
            }
            VarKind::PrivateMethod => {
                get_loc_or_ref(bc, is_ref, idx);
                emit(bc, Op::CheckBrand);
                if op != Op::ScopeGetPrivateField2 {
                    emit(bc, Op::Nip);
                }
            }
            VarKind::PrivateGetter | VarKind::PrivateGetterSetter => {
                if op == Op::ScopeGetPrivateField2 {
                    emit(bc, Op::Dup);
                }
                get_loc_or_ref(bc, is_ref, idx);
                emit(bc, Op::CheckBrand);
                emit(bc, Op::CallMethod);
                emit_u16(bc, 0);
            }
            VarKind::PrivateSetter => {
                emit(bc, Op::ThrowError);
                emit_atom(&mut ctx.atoms, bc, var_name);
                bc.push(ThrowCode::VarReadOnly as u8);
            }
            _ => unreachable!("private access resolved to a non-private binding"),
        },
        Op::ScopePutPrivateField => match kind {
            VarKind::PrivateField => {
                get_loc_or_ref(bc, is_ref, idx);
                emit(bc, Op::PutPrivateField);
            }
            VarKind::PrivateMethod | VarKind::PrivateGetter => {
                emit(bc, Op::ThrowError);
                emit_atom(&mut ctx.atoms, bc, var_name);
                bc.push(ThrowCode::VarReadOnly as u8);
            }
            VarKind::PrivateSetter | VarKind::PrivateGetterSetter => {
                let setter_name = ctx.atoms.concat_str(var_name, "<set>")?;
                let result = resolve_scope_private_field1(ctx, funcs, cur, setter_name, scope_level);
                ctx.atoms.unref_atom(setter_name);
                let (sidx, sref, skind) = result?;
                debug_assert_eq!(skind, VarKind::PrivateSetter);
                // obj value -- value obj setter
                get_loc_or_ref(bc, sref, sidx);
                emit(bc, Op::Rot3R);
                emit(bc, Op::Swap);
                emit(bc, Op::CheckBrand);
                emit(bc, Op::Rot3L);
                emit(bc, Op::CallMethod);
                emit_u16(bc, 1);
            }
            _ => unreachable!("private access resolved to a non-private binding"),
        },
        _ => unreachable!("not a private-field opcode"),
    }
    Ok(())
}

/// Emits the hoisted definitions at the body-scope entry: function
/// declarations stored in args/vars, then the global `define_var`/
/// `define_func` block (with the module hoisting guard).
fn instantiate_hoisted_definitions(ctx: &mut Context, funcs: &mut [FuncDef], cur: usize, bc: &mut Vec<u8>) {
    // hoisted functions assigned to argument and variable slots
    for i in 0..funcs[cur].args.len() {
        let cpool_idx = funcs[cur].args[i].func_pool_idx;
        if cpool_idx >= 0 {
            emit(bc, Op::FClosure);
            emit_u32(bc, cpool_idx as u32);
            emit(bc, Op::PutArg);
            emit_u16(bc, i as u16);
        }
    }
    for i in 0..funcs[cur].vars.len() {
        let (scope_level, cpool_idx) = (funcs[cur].vars[i].scope_level, funcs[cur].vars[i].func_pool_idx);
        if scope_level == 0 && cpool_idx >= 0 {
            emit(bc, Op::FClosure);
            emit_u32(bc, cpool_idx as u32);
            emit(bc, Op::PutLoc);
            emit_u16(bc, i as u16);
        }
    }

    // module global variables initialize before evaluation so exported
    // functions are visible through cyclic imports: the guard skips the
    // body on the hoisting invocation
    let is_module = funcs[cur].module.is_some();
    let mut label_next = -1;
    if is_module {
        label_next = funcs[cur].new_label_fd();
        emit(bc, Op::PushThis);
        emit(bc, Op::IfFalse);
        emit_u32(bc, label_next as u32);
        funcs[cur].update_label(label_next, 1);
        funcs[cur].jump_size += 1;
    }

    let global_vars = std::mem::take(&mut funcs[cur].global_vars);
    for hf in &global_vars {
        let mut has_closure = 0;
        let mut force_init = hf.force_init;
        let mut closure_ref_idx = 0u16;
        for (idx, cv) in funcs[cur].closure_vars.iter().enumerate() {
            if cv.name == hf.name {
                has_closure = 2;
                force_init = false;
                closure_ref_idx = idx as u16;
                break;
            }
            if cv.name == PredefAtom::SpecialVar || cv.name == PredefAtom::SpecialArgVar {
                emit(bc, Op::GetVarRef);
                emit_u16(bc, idx as u16);
                has_closure = 1;
                force_init = true;
                break;
            }
        }
        let mut defined_as_func = false;
        if has_closure == 0 {
            let mut flags = 0u8;
            if funcs[cur].eval_type != EvalType::Global {
                flags |= PROP_CONFIGURABLE;
            }
            if hf.cpool_idx >= 0 && !hf.is_lexical {
                // global function definitions have dedicated handling
                emit(bc, Op::FClosure);
                emit_u32(bc, hf.cpool_idx as u32);
                emit(bc, Op::DefineFunc);
                emit_atom(&mut ctx.atoms, bc, hf.name);
                bc.push(flags);
                defined_as_func = true;
            } else {
                if hf.is_lexical {
                    flags |= DEFINE_GLOBAL_LEX_VAR;
                    if !hf.is_const {
                        flags |= PROP_WRITABLE;
                    }
                }
                emit(bc, Op::DefineVar);
                emit_atom(&mut ctx.atoms, bc, hf.name);
                bc.push(flags);
            }
        }
        if !defined_as_func && (hf.cpool_idx >= 0 || force_init) {
            if hf.cpool_idx >= 0 {
                emit(bc, Op::FClosure);
                emit_u32(bc, hf.cpool_idx as u32);
                if hf.name == PredefAtom::SpecialDefault {
                    // name the default export function
                    emit(bc, Op::SetName);
                    emit_atom(&mut ctx.atoms, bc, PredefAtom::Default.atom());
                }
            } else {
                emit(bc, Op::Undefined);
            }
            match has_closure {
                2 => {
                    emit(bc, Op::PutVarRef);
                    emit_u16(bc, closure_ref_idx);
                }
                1 => {
                    emit(bc, Op::DefineField);
                    emit_atom(&mut ctx.atoms, bc, hf.name);
                    emit(bc, Op::Drop);
                }
                _ => {
                    emit(bc, Op::PutVar);
                    emit_atom(&mut ctx.atoms, bc, hf.name);
                }
            }
        }
        ctx.atoms.unref_atom(hf.name);
    }

    if is_module {
        emit(bc, Op::ReturnUndef);
        emit(bc, Op::Label);
        emit_u32(bc, label_next as u32);
        funcs[cur].label_slots[label_next as usize].pos2 = bc.len() as i32;
    }
}

/// Rewrites one function's bytecode; see the module docs for the passes.
fn resolve_function(ctx: &mut Context, funcs: &mut [FuncDef], cur: usize) -> ParseResult<()> {
    let mut bc_buf = std::mem::take(&mut funcs[cur].byte_code);
    let bc_len = bc_buf.len();
    let mut bc_out: Vec<u8> = Vec::with_capacity(bc_len + bc_len / 4);

    // pre-pass: emit the redeclaration checks for hoisted globals so they
    // throw before the body runs
    for i in 0..funcs[cur].global_vars.len() {
        let (name, is_lexical, cpool_idx) = {
            let hf = &funcs[cur].global_vars[i];
            (hf.name, hf.is_lexical, hf.cpool_idx)
        };
        let mut skip = false;
        for cv in &funcs[cur].closure_vars {
            if cv.name == name {
                if funcs[cur].eval_type == EvalType::Direct && cv.is_lexical {
                    // a lexical binding redefined as 'var': the error is
                    // deferred to run time for consistency
                    emit(&mut bc_out, Op::ThrowError);
                    emit_atom(&mut ctx.atoms, &mut bc_out, name);
                    bc_out.push(ThrowCode::VarRedeclared as u8);
                }
                skip = true;
                break;
            }
            if cv.name == PredefAtom::SpecialVar || cv.name == PredefAtom::SpecialArgVar {
                skip = true;
                break;
            }
        }
        if skip {
            continue;
        }
        emit(&mut bc_out, Op::CheckDefineVar);
        emit_atom(&mut ctx.atoms, &mut bc_out, name);
        let mut flags = 0u8;
        if is_lexical {
            flags |= DEFINE_GLOBAL_LEX_VAR;
        }
        if cpool_idx >= 0 {
            flags |= DEFINE_GLOBAL_FUNC_VAR;
        }
        bc_out.push(flags);
    }

    let mut pos = 0usize;
    let mut line_num = 0i64;
    let mut result: ParseResult<()> = Ok(());
    while pos < bc_len {
        let op = opcode_at(&bc_buf, pos);
        let len = op.size();
        let mut pos_next = pos + len;
        let mut copy = false;
        match op {
            Op::LineNum => {
                line_num = i64::from(get_u32(&bc_buf, pos + 1));
                funcs[cur].line_number_size += 1;
                copy = true;
            }
            Op::Eval => {
                // convert the scope id operand to the adjusted variable
                // index expected at run time
                let call_argc = get_u16(&bc_buf, pos + 1);
                let scope = get_u16(&bc_buf, pos + 3) as usize;
                mark_eval_captured_variables(&mut funcs[cur], scope);
                emit(&mut bc_out, op);
                emit_u16(&mut bc_out, call_argc);
                emit_u16(&mut bc_out, (funcs[cur].scopes[scope].first + 1) as u16);
            }
            Op::ApplyEval => {
                let scope = get_u16(&bc_buf, pos + 1) as usize;
                mark_eval_captured_variables(&mut funcs[cur], scope);
                emit(&mut bc_out, op);
                emit_u16(&mut bc_out, (funcs[cur].scopes[scope].first + 1) as u16);
            }
            Op::ScopeGetVarUndef
            | Op::ScopeGetVar
            | Op::ScopePutVar
            | Op::ScopeDeleteVar
            | Op::ScopeGetRef
            | Op::ScopePutVarInit => {
                let var_name = Atom::from_raw(get_u32(&bc_buf, pos + 1));
                let scope = get_u16(&bc_buf, pos + 5) as usize;
                match resolve_scope_var(ctx, funcs, cur, var_name, scope, op, &mut bc_out, &mut bc_buf, -1, pos_next)
                {
                    Ok(p) => pos_next = p,
                    Err(e) => {
                        result = Err(e);
                    }
                }
                ctx.atoms.unref_atom(var_name);
            }
            Op::ScopeMakeRef => {
                let var_name = Atom::from_raw(get_u32(&bc_buf, pos + 1));
                let label = get_u32(&bc_buf, pos + 5) as i32;
                let scope = get_u16(&bc_buf, pos + 9) as usize;
                // the label reference always goes away
                funcs[cur].update_label(label, -1);
                match resolve_scope_var(ctx, funcs, cur, var_name, scope, op, &mut bc_out, &mut bc_buf, label, pos_next)
                {
                    Ok(p) => pos_next = p,
                    Err(e) => {
                        result = Err(e);
                    }
                }
                ctx.atoms.unref_atom(var_name);
            }
            Op::ScopeGetPrivateField | Op::ScopeGetPrivateField2 | Op::ScopePutPrivateField => {
                let var_name = Atom::from_raw(get_u32(&bc_buf, pos + 1));
                let scope = get_u16(&bc_buf, pos + 5) as usize;
                if let Err(e) = resolve_scope_private_field(ctx, funcs, cur, var_name, scope, op, &mut bc_out) {
                    result = Err(e);
                }
                ctx.atoms.unref_atom(var_name);
            }
            Op::Gosub => {
                funcs[cur].jump_size += 1;
                // remove calls to empty finalizers
                let label = get_u32(&bc_buf, pos + 1) as i32;
                let anchor = funcs[cur].label_slots[label as usize].pos as usize;
                let mut cc = CodeContext::new(&bc_buf);
                if cc.matches(anchor, &[Pat::One(Op::Ret)]) {
                    funcs[cur].update_label(label, -1);
                } else {
                    copy = true;
                }
            }
            Op::Insert3 => {
                // insert3 (put_array_el | put_ref_value) drop
                //   -> (put_array_el | put_ref_value)
                let mut cc = CodeContext::new(&bc_buf);
                if cc.matches(pos_next, &[Pat::Either(Op::PutArrayEl, Op::PutRefValue), Pat::One(Op::Drop)]) {
                    emit(&mut bc_out, cc.op);
                    pos_next = cc.pos;
                    if cc.line_num >= 0 && cc.line_num != line_num {
                        line_num = cc.line_num;
                        funcs[cur].line_number_size += 1;
                        emit(&mut bc_out, Op::LineNum);
                        emit_u32(&mut bc_out, line_num as u32);
                    }
                } else {
                    copy = true;
                }
            }
            Op::Goto | Op::Return | Op::ReturnUndef | Op::ReturnAsync | Op::Throw | Op::ThrowError | Op::Ret => {
                if op == Op::Goto {
                    funcs[cur].jump_size += 1;
                }
                // copy the terminator, then drop the unreachable tail
                bc_out.extend_from_slice(&bc_buf[pos..pos + len]);
                let mut line = -1i64;
                let p = skip_dead_code(&mut funcs[cur], &mut ctx.atoms, &bc_buf, pos + len, &mut line);
                pos_next = p;
                if p < bc_len && line >= 0 && line_num != line {
                    line_num = line;
                    funcs[cur].line_number_size += 1;
                    emit(&mut bc_out, Op::LineNum);
                    emit_u32(&mut bc_out, line_num as u32);
                }
            }
            Op::Label => {
                let label = get_u32(&bc_buf, pos + 1) as i32;
                funcs[cur].label_slots[label as usize].pos2 = (bc_out.len() + len) as i32;
                copy = true;
            }
            Op::EnterScope => {
                let scope = get_u16(&bc_buf, pos + 1) as usize;
                if scope as i32 == funcs[cur].body_scope {
                    instantiate_hoisted_definitions(ctx, funcs, cur, &mut bc_out);
                }
                let mut scope_idx = funcs[cur].scopes[scope].first;
                while scope_idx >= 0 {
                    let (scope_level, kind, cpool_idx, next) = {
                        let vd = &funcs[cur].vars[scope_idx as usize];
                        (vd.scope_level as usize, vd.kind, vd.func_pool_idx, vd.scope_next)
                    };
                    if scope_level != scope {
                        break;
                    }
                    if scope_idx != funcs[cur].arguments_arg_idx {
                        if kind == VarKind::FunctionDecl || kind == VarKind::NewFunctionDecl {
                            // function declarations initialize at entry
                            emit(&mut bc_out, Op::FClosure);
                            emit_u32(&mut bc_out, cpool_idx as u32);
                            emit(&mut bc_out, Op::PutLoc);
                            emit_u16(&mut bc_out, scope_idx as u16);
                        } else {
                            emit(&mut bc_out, Op::SetLocUninitialized);
                            emit_u16(&mut bc_out, scope_idx as u16);
                        }
                    }
                    scope_idx = next;
                }
            }
            Op::LeaveScope => {
                let scope = get_u16(&bc_buf, pos + 1) as usize;
                let mut scope_idx = funcs[cur].scopes[scope].first;
                while scope_idx >= 0 {
                    let (scope_level, is_captured, next) = {
                        let vd = &funcs[cur].vars[scope_idx as usize];
                        (vd.scope_level as usize, vd.is_captured, vd.scope_next)
                    };
                    if scope_level != scope {
                        break;
                    }
                    if is_captured {
                        emit(&mut bc_out, Op::CloseLoc);
                        emit_u16(&mut bc_out, scope_idx as u16);
                    }
                    scope_idx = next;
                }
            }
            Op::SetName => {
                // dummy set_name markers disappear
                let name = Atom::from_raw(get_u32(&bc_buf, pos + 1));
                if name != Atom::NULL {
                    copy = true;
                }
            }
            Op::IfFalse | Op::IfTrue | Op::Catch => {
                funcs[cur].jump_size += 1;
                copy = true;
            }
            Op::Dup => {
                // dup if_false(l1) drop, l1: if_false(l2) -> if_false(l2)
                // (and the if_true twin)
                let mut cc = CodeContext::new(&bc_buf);
                if cc.matches(pos_next, &[Pat::Either(Op::IfFalse, Op::IfTrue), Pat::One(Op::Drop)]) {
                    let lab0 = cc.label;
                    let mut lab1 = cc.label;
                    let op1 = cc.op;
                    let pos1 = cc.pos;
                    let line1 = cc.line_num;
                    let mut pos2 = get_label_pos(&funcs[cur], &bc_buf, lab1);
                    while cc.matches(pos2, &[Pat::One(Op::Dup), Pat::One(op1), Pat::One(Op::Drop)]) {
                        lab1 = cc.label;
                        pos2 = get_label_pos(&funcs[cur], &bc_buf, lab1);
                    }
                    if cc.matches(pos2, &[Pat::One(op1)]) {
                        funcs[cur].jump_size += 1;
                        funcs[cur].update_label(lab0, -1);
                        funcs[cur].update_label(cc.label, 1);
                        emit(&mut bc_out, op1);
                        emit_u32(&mut bc_out, cc.label as u32);
                        pos_next = pos1;
                        if line1 >= 0 && line1 != line_num {
                            line_num = line1;
                            funcs[cur].line_number_size += 1;
                            emit(&mut bc_out, Op::LineNum);
                            emit_u32(&mut bc_out, line_num as u32);
                        }
                    } else {
                        copy = true;
                    }
                } else {
                    copy = true;
                }
            }
            Op::Nop => {
                // erased code
            }
            Op::SetClassName => {
                // only used while parsing
            }
            Op::PushBrand => {
                // materialize the brand marker from the class parse
                emit(&mut bc_out, if funcs[cur].has_brand { Op::PushTrue } else { Op::PushFalse });
            }
            _ => {
                copy = true;
            }
        }
        if copy {
            bc_out.extend_from_slice(&bc_buf[pos..pos + len]);
        }
        if result.is_err() {
            // keep copying so atom refcounts in the buffer stay balanced
            pos = pos_next;
            while pos < bc_len {
                let op = opcode_at(&bc_buf, pos);
                let len = op.size();
                bc_out.extend_from_slice(&bc_buf[pos..pos + len]);
                pos += len;
            }
            funcs[cur].byte_code = bc_out;
            return result;
        }
        pos = pos_next;
    }

    funcs[cur].byte_code = bc_out;
    build_pc2line(&mut funcs[cur]);
    Ok(())
}

/// Builds the compressed debug line stream from the `line_num` markers of
/// the resolved bytecode.
fn build_pc2line(fd: &mut FuncDef) {
    if fd.js_mode.contains(JsMode::STRIP) {
        fd.pc2line.clear();
        return;
    }
    let mut encoder = pc2line::Pc2LineEncoder::new(fd.line_num);
    let mut pos = 0;
    while pos < fd.byte_code.len() {
        let op = opcode_at(&fd.byte_code, pos);
        if op == Op::LineNum {
            let line = get_u32(&fd.byte_code, pos + 1);
            encoder.add(pos as u32, line);
        }
        pos += op.size();
    }
    fd.pc2line = encoder.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_context_skips_line_markers() {
        let mut buf = Vec::new();
        emit(&mut buf, Op::LineNum);
        emit_u32(&mut buf, 7);
        emit(&mut buf, Op::PutRefValue);
        emit(&mut buf, Op::Drop);
        let mut cc = CodeContext::new(&buf);
        assert!(cc.matches(0, &[Pat::Either(Op::PutArrayEl, Op::PutRefValue), Pat::One(Op::Drop)]));
        assert_eq!(cc.op, Op::PutRefValue);
        assert_eq!(cc.line_num, 7);
        assert_eq!(cc.pos, buf.len());
        assert!(!cc.matches(0, &[Pat::One(Op::Dup)]));
    }

    #[test]
    fn with_specializations_cover_the_placeholder_family() {
        assert_eq!(with_op_for(Op::ScopeGetVar), Op::WithGetVar);
        assert_eq!(with_op_for(Op::ScopeGetVarUndef), Op::WithGetVar);
        assert_eq!(with_op_for(Op::ScopePutVar), Op::WithPutVar);
        assert_eq!(with_op_for(Op::ScopeDeleteVar), Op::WithDeleteVar);
        assert_eq!(with_op_for(Op::ScopeMakeRef), Op::WithMakeRef);
        assert_eq!(with_op_for(Op::ScopeGetRef), Op::WithGetRef);
    }
}
