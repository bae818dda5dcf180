//! Statements, declarations, functions, classes and modules.
//!
//! Control-flow statements thread a stack of `BlockEnv` frames so that
//! `break`/`continue`/`return` can close iterators and trampoline through
//! enclosing `finally` blocks. Loops with a separate increment/next part
//! emit it out of line and splice it before the body afterwards, patching
//! the affected label positions.

use crate::{
    atoms::{Atom, PredefAtom},
    bytecode::{
        DEFINE_METHOD_GETTER, DEFINE_METHOD_METHOD, DEFINE_METHOD_SETTER, DEFINE_CLASS_HAS_HERITAGE, Opcode as Op,
    },
    error::ParseResult,
    function::{
        BlockEnv, EvalType, ExportEntry, ExportKind, FuncDef, FuncId, FuncKind, FuncType, JsMode, VarDeclKind,
        VarKind, ARGUMENT_VAR_OFFSET, GLOBAL_VAR_OFFSET, ConstEntry,
    },
    parser::{
        expr::{PropType, PutLValue, PF_IN_ACCEPTED},
        DECL_MASK_ALL, DECL_MASK_FUNC, DECL_MASK_FUNC_WITH_LABEL, DECL_MASK_OTHER, Parser, PeekToken,
        SKIP_HAS_ELLIPSIS, SKIP_HAS_SEMI, SKIP_HAS_ASSIGNMENT,
    },
    token::{TokenData, TokenKind as Tok},
};

/// Export context of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportFlag {
    None,
    Named,
    Default,
}

/// Per-bucket class-field compilation state (index 0 = instance fields,
/// index 1 = static fields).
struct ClassFieldsDef {
    /// Arena index of the synthetic fields-initializer function, `-1` when
    /// no field has forced its creation yet.
    fields_init_fd: i32,
    computed_fields_count: u32,
    has_brand: bool,
}

impl Parser<'_, '_> {
    /// Defines `name` in the active function according to the declaration
    /// kind, enforcing every redeclaration rule. Returns the variable slot,
    /// [`GLOBAL_VAR_OFFSET`] for a hoisted global, or an argument-tagged
    /// slot.
    pub(crate) fn define_var(&mut self, name: Atom, kind: VarDeclKind) -> ParseResult<i32> {
        match kind {
            VarDeclKind::With => {
                self.check_var_limit()?;
                Ok(i32::from(self.fd_and_atoms(|fd, atoms| fd.add_scope_var(atoms, name, VarKind::Normal))))
            }
            VarDeclKind::Let | VarDeclKind::Const | VarDeclKind::FunctionDecl | VarDeclKind::NewFunctionDecl => {
                let fd = self.fd_ref();
                let idx = fd.find_lexical_decl(name, fd.scope_first, true);
                if idx >= 0 {
                    if idx < GLOBAL_VAR_OFFSET {
                        let vd = &fd.vars[idx as usize];
                        if vd.scope_level as usize == fd.scope_level {
                            // same scope: non-strict function declarations
                            // may redefine each other (Annex B.3.3.4)
                            let annex_b = !fd.js_mode.contains(JsMode::STRICT)
                                && kind == VarDeclKind::FunctionDecl
                                && vd.kind == VarKind::FunctionDecl;
                            if !annex_b {
                                return Err(self.parse_error("invalid redefinition of lexical identifier"));
                            }
                        } else if vd.kind == VarKind::Catch && (vd.scope_level as usize + 2) == fd.scope_level {
                            return Err(self.parse_error("invalid redefinition of lexical identifier"));
                        }
                    } else if fd.scope_level as i32 == fd.body_scope {
                        return Err(self.parse_error("invalid redefinition of lexical identifier"));
                    }
                }
                let fd = self.fd_ref();
                if kind != VarDeclKind::FunctionDecl
                    && kind != VarDeclKind::NewFunctionDecl
                    && fd.scope_level as i32 == fd.body_scope
                    && fd.find_arg(name) >= 0
                {
                    return Err(self.parse_error("invalid redefinition of parameter name"));
                }
                if self.fd_ref().find_var_in_child_scope(name, self.fd_ref().scope_level) >= 0 {
                    return Err(self.parse_error("invalid redefinition of a variable"));
                }
                let fd = self.fd_ref();
                if fd.is_global_var {
                    if let Some(i) = fd.find_global_var(name) {
                        if fd.is_child_scope(i32::from(fd.global_vars[i].scope_level), fd.scope_level as i32) {
                            return Err(self.parse_error("invalid redefinition of global identifier"));
                        }
                    }
                }
                let fd = self.fd_ref();
                if fd.is_eval
                    && (fd.eval_type == EvalType::Global || fd.eval_type == EvalType::Module)
                    && fd.scope_level as i32 == fd.body_scope
                {
                    let is_const = kind == VarDeclKind::Const;
                    let i = self.fd_and_atoms(|fd, atoms| fd.add_global_var(atoms, name));
                    let hf = &mut self.fd().global_vars[i];
                    hf.is_lexical = true;
                    hf.is_const = is_const;
                    Ok(GLOBAL_VAR_OFFSET)
                } else {
                    self.check_var_limit()?;
                    let var_kind = match kind {
                        VarDeclKind::FunctionDecl => VarKind::FunctionDecl,
                        VarDeclKind::NewFunctionDecl => VarKind::NewFunctionDecl,
                        _ => VarKind::Normal,
                    };
                    let idx = self.fd_and_atoms(|fd, atoms| fd.add_scope_var(atoms, name, var_kind));
                    let vd = &mut self.fd().vars[idx as usize];
                    vd.is_lexical = true;
                    vd.is_const = kind == VarDeclKind::Const;
                    Ok(i32::from(idx))
                }
            }
            VarDeclKind::Catch => {
                self.check_var_limit()?;
                Ok(i32::from(self.fd_and_atoms(|fd, atoms| fd.add_scope_var(atoms, name, VarKind::Catch))))
            }
            VarDeclKind::Var => {
                let fd = self.fd_ref();
                if fd.find_lexical_decl(name, fd.scope_first, false) >= 0 {
                    return Err(self.parse_error("invalid redefinition of lexical identifier"));
                }
                let fd = self.fd_ref();
                if fd.is_global_var {
                    if let Some(i) = fd.find_global_var(name) {
                        let hf = &fd.global_vars[i];
                        if hf.is_lexical
                            && hf.scope_level as usize == fd.scope_level
                            && fd.eval_type == EvalType::Module
                        {
                            return Err(self.parse_error("invalid redefinition of lexical identifier"));
                        }
                    }
                    let _ = self.fd_and_atoms(|fd, atoms| fd.add_global_var(atoms, name));
                    Ok(GLOBAL_VAR_OFFSET)
                } else {
                    let idx = fd.find_var(name);
                    if idx >= 0 {
                        return Ok(idx);
                    }
                    self.check_var_limit()?;
                    let idx = self.fd_and_atoms(|fd, atoms| fd.add_var(atoms, name));
                    let fd = self.fd();
                    if name == PredefAtom::Arguments && fd.has_arguments_binding {
                        fd.arguments_var_idx = i32::from(idx);
                    }
                    // remember the declaring scope for child-scope checks
                    fd.vars[idx as usize].scope_next = fd.scope_level as i32;
                    Ok(i32::from(idx))
                }
            }
        }
    }

    fn check_var_limit(&self) -> ParseResult<()> {
        if self.fd_ref().vars.len() >= self.ctx.limits.max_local_vars {
            return Err(crate::error::Exception::internal("too many local variables"));
        }
        Ok(())
    }

    fn check_arg_limit(&self) -> ParseResult<()> {
        if self.fd_ref().args.len() >= self.ctx.limits.max_local_vars {
            return Err(crate::error::Exception::internal("too many arguments"));
        }
        Ok(())
    }

    /// Runs a closure with simultaneous access to the active function and
    /// the atom table (two disjoint borrows the compiler cannot see
    /// through `self`).
    fn fd_and_atoms<R>(&mut self, f: impl FnOnce(&mut FuncDef, &mut crate::atoms::AtomTable) -> R) -> R {
        f(&mut self.funcs[self.cur_func], &mut self.ctx.atoms)
    }

    /// Declaration-statement checks shared by `var`/`let`/`const`/catch
    /// bindings, then `define_var`.
    pub(crate) fn js_define_var(&mut self, name: Atom, tok: Tok) -> ParseResult<()> {
        let fd = self.fd_ref();
        if name == PredefAtom::Yield && fd.func_kind == FuncKind::Generator {
            return Err(self.parse_error("yield is a reserved identifier"));
        }
        if (name == PredefAtom::Arguments || name == PredefAtom::Eval) && fd.js_mode.contains(JsMode::STRICT) {
            return Err(self.parse_error("invalid variable name in strict mode"));
        }
        if (name == PredefAtom::Let || name == PredefAtom::Undefined) && (tok == Tok::Let || tok == Tok::Const) {
            return Err(self.parse_error("invalid lexical variable name"));
        }
        let kind = match tok {
            Tok::Let => VarDeclKind::Let,
            Tok::Const => VarDeclKind::Const,
            Tok::Var => VarDeclKind::Var,
            Tok::Catch => VarDeclKind::Catch,
            _ => unreachable!("invalid declaration token"),
        };
        self.define_var(name, kind)?;
        Ok(())
    }

    /// Collects the remaining iterator values into a fresh array (rest
    /// element of an array pattern).
    fn emit_spread_code(&mut self, depth: i32) {
        // enum_rec xxx -- enum_rec xxx array 0
        self.emit_op(Op::ArrayFrom);
        self.emit_u16(0);
        self.emit_op(Op::PushI32);
        self.emit_u32(0);
        let label_rest_next = self.new_label();
        self.emit_label(label_rest_next);
        self.emit_op(Op::ForOfNext);
        self.emit_u8((2 + depth) as u8);
        let label_rest_done = self.emit_goto(Op::IfTrue, -1);
        // array idx val -- array idx
        self.emit_op(Op::DefineArrayEl);
        self.emit_op(Op::Inc);
        self.emit_goto(Op::Goto, label_rest_next);
        self.emit_label(label_rest_done);
        // enum_rec xxx array idx undef -- enum_rec xxx array
        self.emit_op(Op::Drop);
        self.emit_op(Op::Drop);
    }

    /// Rejects a parameter name that already exists in the argument or
    /// variable tables.
    fn check_duplicate_parameter(&self, name: Atom) -> ParseResult<()> {
        let fd = self.fd_ref();
        if fd.args.iter().any(|vd| vd.name == name) || fd.vars.iter().any(|vd| vd.name == name) {
            return Err(self.parse_error("duplicate parameter names not allowed in this context"));
        }
        Ok(())
    }

    /// Binding identifier inside a destructuring declaration.
    /// The returned atom carries a reference.
    fn parse_destructuring_var(&mut self, is_arg: bool) -> ParseResult<Atom> {
        let strict = self.fd_ref().js_mode.contains(JsMode::STRICT);
        if !(self.token.kind == Tok::Ident && !self.token.ident_is_reserved())
            || (strict
                && (self.token.ident_atom() == PredefAtom::Eval || self.token.ident_atom() == PredefAtom::Arguments))
        {
            return Err(self.parse_error("invalid destructuring target"));
        }
        let name = self.ctx.atoms.ref_atom(self.token.ident_atom());
        if is_arg {
            if let Err(e) = self.check_duplicate_parameter(name) {
                self.ctx.atoms.unref_atom(name);
                return Err(e);
            }
        }
        if let Err(e) = self.next_token() {
            self.ctx.atoms.unref_atom(name);
            return Err(e);
        }
        Ok(name)
    }

    /// Destructuring pattern `[...]` / `{...}`.
    ///
    /// `tok` is `Some(Var | Let | Const | Catch)` for declarations, `None`
    /// for assignment patterns. With `hasval` the value is already on the
    /// stack; otherwise the pattern body runs against the value of a
    /// trailing `= initializer` (and the jump scaffolding is erased when no
    /// initializer follows). Returns whether a top-level initializer was
    /// present.
    pub(crate) fn parse_destructuring_element(
        &mut self,
        tok: Option<Tok>,
        is_arg: bool,
        hasval: bool,
        mut has_ellipsis: bool,
        allow_initializer: bool,
    ) -> ParseResult<bool> {
        self.enter_nesting()?;
        let r = self.parse_destructuring_element_inner(tok, is_arg, hasval, &mut has_ellipsis, allow_initializer);
        self.leave_nesting();
        r
    }

    /// Pre-scan used when the caller could not tell whether the pattern
    /// contains a rest element.
    pub(crate) fn pattern_has_ellipsis(&mut self) -> ParseResult<bool> {
        let mut bits = 0u8;
        self.skip_parens_token(Some(&mut bits), false)?;
        Ok(bits & SKIP_HAS_ELLIPSIS != 0)
    }

    fn parse_destructuring_element_inner(
        &mut self,
        tok: Option<Tok>,
        is_arg: bool,
        hasval: bool,
        has_ellipsis: &mut bool,
        allow_initializer: bool,
    ) -> ParseResult<bool> {
        let is_decl = tok.is_some();
        let is_lexical = matches!(tok, Some(Tok::Const | Tok::Let));

        let label_parse = self.new_label();
        let label_assign = self.new_label();

        let start_addr = self.fd_ref().byte_code.len();
        if hasval {
            // consume the value already on the stack
            self.emit_op(Op::Dup);
            self.emit_op(Op::Undefined);
            self.emit_op(Op::StrictEq);
            self.emit_goto(Op::IfTrue, label_parse);
            self.emit_label(label_assign);
        } else {
            self.emit_goto(Op::Goto, label_parse);
            self.emit_label(label_assign);
            // leave the value on the stack
            self.emit_op(Op::Dup);
        }
        let assign_addr = self.fd_ref().byte_code.len();

        if self.token.kind == Tok::LBrace {
            self.next_token()?;
            // throws when the value cannot be converted to an object
            self.emit_op(Op::ToObject);
            if *has_ellipsis {
                // the exclude list collects already-bound names, kept just
                // below the source object
                self.emit_op(Op::Object);
                self.emit_op(Op::Swap);
            }
            while self.token.kind != Tok::RBrace {
                if self.token.kind == Tok::Ellipsis {
                    if !*has_ellipsis {
                        return Err(crate::error::Exception::internal("unexpected ellipsis token"));
                    }
                    self.next_token()?;
                    let lv;
                    if is_decl {
                        let var_name = self.parse_destructuring_var(is_arg)?;
                        lv = crate::parser::expr::LValue {
                            opcode: Op::ScopeGetVar,
                            scope: self.fd_ref().scope_level as u16,
                            name: var_name,
                            label: -1,
                            depth: 0,
                        };
                    } else {
                        self.parse_postfix_expr(crate::parser::expr::PF_POSTFIX_CALL)?;
                        lv = self.get_lvalue(false, Tok::LBrace)?;
                    }
                    if self.token.kind != Tok::RBrace {
                        self.ctx.atoms.unref_atom(lv.name);
                        return Err(self.parse_error("assignment rest property must be last"));
                    }
                    let depth = lv.depth;
                    self.emit_op(Op::Object); // target
                    self.emit_op(Op::CopyDataProperties);
                    self.emit_u8((((depth + 1) << 2) | ((depth + 2) << 5)) as u8);
                    self.destructuring_set_val(tok, lv, is_lexical)?;
                    break;
                }
                let (prop_type, prop_name) = self.parse_property_name(false, true, false)?;
                let r = self.parse_object_pattern_prop(tok, is_arg, prop_type, prop_name, *has_ellipsis, is_lexical);
                self.ctx.atoms.unref_atom(prop_name);
                match r? {
                    true => continue, // nested pattern consumed its separator
                    false => {}
                }
                if self.token.kind == Tok::RBrace {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
            // drop the source object (and the exclude list)
            self.emit_op(Op::Drop);
            if *has_ellipsis {
                self.emit_op(Op::Drop);
            }
            self.next_token()?;
        } else if self.token.kind == Tok::LBracket {
            self.next_token()?;
            // the block environment is needed in generators in case a
            // 'yield' inside a default value triggers a return
            self.push_break_entry(Atom::NULL, -1, -1, 2);
            self.fd().block_env.last_mut().expect("just pushed").has_iterator = true;
            self.emit_op(Op::ForOfStart);
            let mut has_spread = false;
            while self.token.kind != Tok::RBracket {
                if self.token.kind == Tok::Ellipsis {
                    self.next_token()?;
                    if self.token.kind == Tok::Comma || self.token.kind == Tok::RBracket {
                        return Err(self.parse_error("missing binding pattern..."));
                    }
                    has_spread = true;
                }
                if self.token.kind == Tok::Comma {
                    // hole: skip the value
                    self.emit_op(Op::ForOfNext);
                    self.emit_u8(0);
                    self.emit_op(Op::Drop);
                    self.emit_op(Op::Drop);
                } else if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                    let mut skip_bits = 0u8;
                    let tok1 = self.skip_parens_token(Some(&mut skip_bits), false)?;
                    if matches!(tok1, Tok::Comma | Tok::Assign | Tok::RBracket) {
                        if has_spread {
                            if tok1 == Tok::Assign {
                                return Err(self.parse_error("rest element cannot have a default value"));
                            }
                            self.emit_spread_code(0);
                        } else {
                            self.emit_op(Op::ForOfNext);
                            self.emit_u8(0);
                            self.emit_op(Op::Drop);
                        }
                        self.parse_destructuring_element(tok, is_arg, true, skip_bits & SKIP_HAS_ELLIPSIS != 0, true)?;
                    } else {
                        self.parse_array_pattern_target(tok, is_arg, has_spread)?;
                    }
                } else {
                    self.parse_array_pattern_target(tok, is_arg, has_spread)?;
                }
                if self.token.kind == Tok::RBracket {
                    break;
                }
                if has_spread {
                    return Err(self.parse_error("rest element must be the last one"));
                }
                self.expect(Tok::Comma)?;
            }
            // close the iterator; when completed, the record was already
            // replaced by undefined
            self.emit_op(Op::IteratorClose);
            self.pop_break_entry();
            self.next_token()?;
        } else {
            return Err(self.parse_error("invalid assignment syntax"));
        }

        let has_initializer;
        if self.token.kind == Tok::Assign && allow_initializer {
            let label_done = self.emit_goto(Op::Goto, -1);
            self.next_token()?;
            self.emit_label(label_parse);
            if hasval {
                self.emit_op(Op::Drop);
            }
            self.parse_assign_expr()?;
            self.emit_goto(Op::Goto, label_assign);
            self.emit_label(label_done);
            has_initializer = true;
        } else {
            // `skip_parens_token` can guess wrong about an `=` inside
            if !hasval {
                return Err(self.parse_error("too complicated destructuring expression"));
            }
            // erase the undefined test and release the parse label
            for b in &mut self.fd().byte_code[start_addr..assign_addr] {
                *b = Op::Nop as u8;
            }
            self.fd().update_label(label_parse, -1);
            has_initializer = false;
        }
        Ok(has_initializer)
    }

    /// One `name`, `name: target` or `name: <pattern>` property of an
    /// object pattern. Returns true when a nested pattern already consumed
    /// the separator handling.
    fn parse_object_pattern_prop(
        &mut self,
        tok: Option<Tok>,
        is_arg: bool,
        prop_type: PropType,
        prop_name: Atom,
        has_ellipsis: bool,
        is_lexical: bool,
    ) -> ParseResult<bool> {
        let is_decl = tok.is_some();
        if prop_type == PropType::Ident {
            self.next_token()?;
            if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                let mut skip_bits = 0u8;
                let tok1 = self.skip_parens_token(Some(&mut skip_bits), false)?;
                if matches!(tok1, Tok::Comma | Tok::Assign | Tok::RBrace) {
                    if prop_name == Atom::NULL {
                        // computed property name on the stack
                        if has_ellipsis {
                            self.emit_op(Op::ToPropkey);
                            self.emit_op(Op::Perm3);
                            self.emit_op(Op::Null);
                            self.emit_op(Op::DefineArrayEl);
                            self.emit_op(Op::Perm3);
                        }
                        self.emit_op(Op::GetArrayEl2);
                    } else {
                        if has_ellipsis {
                            self.emit_op(Op::Swap);
                            self.emit_op(Op::Null);
                            self.emit_op(Op::DefineField);
                            self.emit_atom(prop_name);
                            self.emit_op(Op::Swap);
                        }
                        self.emit_op(Op::GetField2);
                        self.emit_atom(prop_name);
                    }
                    self.parse_destructuring_element(tok, is_arg, true, skip_bits & SKIP_HAS_ELLIPSIS != 0, true)?;
                    if self.token.kind == Tok::RBrace {
                        return Ok(true);
                    }
                    self.expect(Tok::Comma)?;
                    return Ok(true);
                }
            }
            let lv;
            if prop_name == Atom::NULL {
                self.emit_op(Op::ToPropkey2);
                if has_ellipsis {
                    self.emit_op(Op::Perm3);
                    self.emit_op(Op::Null);
                    self.emit_op(Op::DefineArrayEl);
                    self.emit_op(Op::Perm3);
                }
                // source prop -- source source prop
                self.emit_op(Op::Dup1);
            } else {
                if has_ellipsis {
                    self.emit_op(Op::Swap);
                    self.emit_op(Op::Null);
                    self.emit_op(Op::DefineField);
                    self.emit_atom(prop_name);
                    self.emit_op(Op::Swap);
                }
                // source -- source source
                self.emit_op(Op::Dup);
            }
            if is_decl {
                let var_name = self.parse_destructuring_var(is_arg)?;
                lv = crate::parser::expr::LValue {
                    opcode: Op::ScopeGetVar,
                    scope: self.fd_ref().scope_level as u16,
                    name: var_name,
                    label: -1,
                    depth: 0,
                };
            } else {
                self.parse_postfix_expr(crate::parser::expr::PF_POSTFIX_CALL)?;
                let got = self.get_lvalue(false, Tok::LBrace)?;
                // swap the ref words and the source below them
                if prop_name == Atom::NULL {
                    match got.depth {
                        0 => {}
                        1 => self.emit_op(Op::Rot3R),
                        2 => self.emit_op(Op::Swap2),
                        3 => {
                            self.emit_op(Op::Rot5L);
                            self.emit_op(Op::Rot5L);
                        }
                        _ => unreachable!(),
                    }
                } else {
                    match got.depth {
                        0 => {}
                        1 => self.emit_op(Op::Swap),
                        2 => self.emit_op(Op::Rot3L),
                        3 => self.emit_op(Op::Rot4L),
                        _ => unreachable!(),
                    }
                }
                lv = got;
            }
            if prop_name == Atom::NULL {
                // source prop -- val
                self.emit_op(Op::GetArrayEl);
            } else {
                // source -- val
                self.emit_op(Op::GetField);
                self.emit_atom(prop_name);
            }
            self.destructuring_set_val(tok, lv, is_lexical)?;
        } else {
            // shorthand `{ x }` / `{ x = def }`; never a computed name
            if is_arg {
                self.check_duplicate_parameter(prop_name)?;
            }
            if self.fd_ref().js_mode.contains(JsMode::STRICT)
                && (prop_name == PredefAtom::Eval || prop_name == PredefAtom::Arguments)
            {
                return Err(self.parse_error("invalid destructuring target"));
            }
            if has_ellipsis {
                self.emit_op(Op::Swap);
                self.emit_op(Op::Null);
                self.emit_op(Op::DefineField);
                self.emit_atom(prop_name);
                self.emit_op(Op::Swap);
            }
            let lv;
            if tok.is_none() || tok == Some(Tok::Var) {
                // go through a reference for `with` semantics
                self.emit_op(Op::Dup);
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopeGetVar);
                self.emit_atom(prop_name);
                self.emit_u16(scope);
                let got = self.get_lvalue(false, Tok::LBrace)?;
                match got.depth {
                    0 => {}
                    1 => self.emit_op(Op::Swap),
                    2 => self.emit_op(Op::Rot3L),
                    3 => self.emit_op(Op::Rot4L),
                    _ => unreachable!(),
                }
                lv = got;
            } else {
                let var_name = self.ctx.atoms.ref_atom(prop_name);
                lv = crate::parser::expr::LValue {
                    opcode: Op::ScopeGetVar,
                    scope: self.fd_ref().scope_level as u16,
                    name: var_name,
                    label: -1,
                    depth: 0,
                };
            }
            // source -- source val
            self.emit_op(Op::GetField2);
            self.emit_atom(prop_name);
            self.destructuring_set_val(tok, lv, is_lexical)?;
        }
        Ok(false)
    }

    /// Defines the binding (for declarations), handles an optional default
    /// value, and stores the value through the lvalue.
    fn destructuring_set_val(
        &mut self,
        tok: Option<Tok>,
        mut lv: crate::parser::expr::LValue,
        is_lexical: bool,
    ) -> ParseResult<()> {
        if let Some(decl_tok) = tok {
            let name = lv.name;
            if let Err(e) = self.js_define_var(name, decl_tok) {
                self.ctx.atoms.unref_atom(name);
                return Err(e);
            }
            lv.scope = self.fd_ref().scope_level as u16;
        }
        if self.token.kind == Tok::Assign {
            // optional default value
            self.emit_op(Op::Dup);
            self.emit_op(Op::Undefined);
            self.emit_op(Op::StrictEq);
            let label_hasval = self.emit_goto(Op::IfFalse, -1);
            if let Err(e) = self.next_token() {
                self.ctx.atoms.unref_atom(lv.name);
                return Err(e);
            }
            self.emit_op(Op::Drop);
            if let Err(e) = self.parse_assign_expr() {
                self.ctx.atoms.unref_atom(lv.name);
                return Err(e);
            }
            if lv.opcode == Op::ScopeGetVar || lv.opcode == Op::GetRefValue {
                self.set_object_name(lv.name);
            }
            self.emit_label(label_hasval);
        }
        self.put_lvalue(lv, PutLValue::NoKeepDepth, is_lexical);
        Ok(())
    }

    /// One element of an array pattern that is a simple target (identifier
    /// or member expression), with optional default.
    fn parse_array_pattern_target(&mut self, tok: Option<Tok>, is_arg: bool, has_spread: bool) -> ParseResult<()> {
        let is_lexical = matches!(tok, Some(Tok::Const | Tok::Let));
        let lv;
        let enum_depth;
        if let Some(decl_tok) = tok {
            let var_name = self.parse_destructuring_var(is_arg)?;
            if let Err(e) = self.js_define_var(var_name, decl_tok) {
                self.ctx.atoms.unref_atom(var_name);
                return Err(e);
            }
            enum_depth = 0;
            lv = crate::parser::expr::LValue {
                opcode: Op::ScopeGetVar,
                scope: self.fd_ref().scope_level as u16,
                name: var_name,
                label: -1,
                depth: 0,
            };
        } else {
            self.parse_postfix_expr(crate::parser::expr::PF_POSTFIX_CALL)?;
            let got = self.get_lvalue(false, Tok::LBracket)?;
            enum_depth = got.depth;
            lv = got;
        }
        if has_spread {
            self.emit_spread_code(enum_depth);
        } else {
            self.emit_op(Op::ForOfNext);
            self.emit_u8(enum_depth as u8);
            self.emit_op(Op::Drop);
        }
        if self.token.kind == Tok::Assign && !has_spread {
            self.emit_op(Op::Dup);
            self.emit_op(Op::Undefined);
            self.emit_op(Op::StrictEq);
            let label_hasval = self.emit_goto(Op::IfFalse, -1);
            if let Err(e) = self.next_token() {
                self.ctx.atoms.unref_atom(lv.name);
                return Err(e);
            }
            self.emit_op(Op::Drop);
            if let Err(e) = self.parse_assign_expr() {
                self.ctx.atoms.unref_atom(lv.name);
                return Err(e);
            }
            if lv.opcode == Op::ScopeGetVar || lv.opcode == Op::GetRefValue {
                self.set_object_name(lv.name);
            }
            self.emit_label(label_hasval);
        }
        self.put_lvalue(lv, PutLValue::NoKeepDepth, is_lexical);
        Ok(())
    }

    // ---- control-flow stack -------------------------------------------

    pub(crate) fn push_break_entry(&mut self, label_name: Atom, label_break: i32, label_cont: i32, drop_count: i32) {
        let scope_level = self.fd_ref().scope_level as u16;
        self.fd().block_env.push(BlockEnv {
            label_name,
            label_break,
            label_cont,
            drop_count,
            label_finally: -1,
            scope_level,
            has_iterator: false,
        });
    }

    pub(crate) fn pop_break_entry(&mut self) {
        self.fd().block_env.pop().expect("unbalanced break entry");
    }

    /// Emits the unwinding for a `break`/`continue`, walking the control
    /// stack outward: leave scopes, close iterators, run `finally`
    /// trampolines, then jump to the target label.
    fn emit_break(&mut self, name: Atom, is_cont: bool) -> ParseResult<()> {
        let mut scope_level = self.fd_ref().scope_level as i32;
        for i in (0..self.fd_ref().block_env.len()).rev() {
            let top = self.fd_ref().block_env[i].clone();
            self.close_scopes(scope_level, i32::from(top.scope_level));
            scope_level = i32::from(top.scope_level);
            if is_cont && top.label_cont != -1 && (name == Atom::NULL || top.label_name == name) {
                // continue stays inside the same block
                self.emit_goto(Op::Goto, top.label_cont);
                return Ok(());
            }
            if !is_cont && top.label_break != -1 && (name == Atom::NULL || top.label_name == name) {
                self.emit_goto(Op::Goto, top.label_break);
                return Ok(());
            }
            let mut i_drop = 0;
            if top.has_iterator {
                self.emit_op(Op::IteratorClose);
                i_drop += 3;
            }
            while i_drop < top.drop_count {
                self.emit_op(Op::Drop);
                i_drop += 1;
            }
            if top.label_finally != -1 {
                // dummy value keeps the stack depth identical
                self.emit_op(Op::Undefined);
                self.emit_goto(Op::Gosub, top.label_finally);
                self.emit_op(Op::Drop);
            }
        }
        if name == Atom::NULL {
            if is_cont {
                Err(self.parse_error("continue must be inside loop"))
            } else {
                Err(self.parse_error("break must be inside loop or switch"))
            }
        } else {
            Err(self.parse_error("break/continue label not found"))
        }
    }

    /// Emits a `return`, unwinding iterators and `finally` blocks first;
    /// derived-class constructors return `this` unless an object was
    /// produced; generators/async terminate with `return_async`.
    pub(crate) fn emit_return(&mut self, mut hasval: bool) -> ParseResult<()> {
        let mut drop_count = 0i32;
        for i in (0..self.fd_ref().block_env.len()).rev() {
            let top = self.fd_ref().block_env[i].clone();
            if top.has_iterator {
                // with 'yield' the exact drop count is unknown, so a
                // dedicated operation finds the catch offset
                if !hasval {
                    self.emit_op(Op::Undefined);
                    hasval = true;
                }
                self.emit_op(Op::IteratorCloseReturn);
                if self.fd_ref().func_kind == FuncKind::AsyncGenerator {
                    self.emit_op(Op::Drop); // catch offset
                    self.emit_op(Op::Drop); // next
                    self.emit_op(Op::GetField2);
                    self.emit_atom(PredefAtom::Return.atom());
                    // stack: iter_obj return_func
                    self.emit_op(Op::Dup);
                    self.emit_op(Op::IsUndefinedOrNull);
                    let label_next = self.emit_goto(Op::IfTrue, -1);
                    self.emit_op(Op::CallMethod);
                    self.emit_u16(0);
                    self.emit_op(Op::IteratorCheckObject);
                    self.emit_op(Op::Await);
                    let label_next2 = self.emit_goto(Op::Goto, -1);
                    self.emit_label(label_next);
                    self.emit_op(Op::Drop);
                    self.emit_label(label_next2);
                    self.emit_op(Op::Drop);
                } else {
                    self.emit_op(Op::IteratorClose);
                }
                drop_count = -3;
            }
            drop_count += top.drop_count;
            if top.label_finally != -1 {
                while drop_count != 0 {
                    // keep the stack top when it holds the return value
                    self.emit_op(if hasval { Op::Nip } else { Op::Drop });
                    drop_count -= 1;
                }
                if !hasval {
                    self.emit_op(Op::Undefined);
                    hasval = true;
                }
                self.emit_goto(Op::Gosub, top.label_finally);
            }
        }
        if self.fd_ref().is_derived_class_constructor {
            // 'this' can be uninitialized; it is only read when the
            // constructor does not return an object
            let mut label_return = -1;
            if hasval {
                self.emit_op(Op::CheckCtorReturn);
                label_return = self.emit_goto(Op::IfFalse, -1);
                self.emit_op(Op::Drop);
            }
            self.emit_op(Op::ScopeGetVar);
            self.emit_atom(PredefAtom::This.atom());
            self.emit_u16(0);
            self.emit_label(label_return);
            self.emit_op(Op::Return);
        } else if self.fd_ref().func_kind != FuncKind::Normal {
            if !hasval {
                self.emit_op(Op::Undefined);
            } else if self.fd_ref().func_kind == FuncKind::AsyncGenerator {
                self.emit_op(Op::Await);
            }
            self.emit_op(Op::ReturnAsync);
        } else {
            self.emit_op(if hasval { Op::Return } else { Op::ReturnUndef });
        }
        Ok(())
    }

    // ---- statements ----------------------------------------------------

    fn parse_statement(&mut self) -> ParseResult<()> {
        self.parse_statement_or_decl(0)
    }

    fn parse_block(&mut self) -> ParseResult<()> {
        self.expect(Tok::LBrace)?;
        if self.token.kind != Tok::RBrace {
            self.push_scope();
            loop {
                self.parse_statement_or_decl(DECL_MASK_ALL)?;
                if self.token.kind == Tok::RBrace {
                    break;
                }
            }
            self.pop_scope();
        }
        self.next_token()
    }

    /// `var`/`let`/`const` declaration list (after the keyword).
    pub(crate) fn parse_var(&mut self, in_accepted: bool, tok: Tok, export_flag: bool) -> ParseResult<()> {
        let parse_flags = if in_accepted { PF_IN_ACCEPTED } else { 0 };
        loop {
            if self.token.kind == Tok::Ident {
                if self.token.ident_is_reserved() {
                    return Err(self.error_reserved_identifier());
                }
                let name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                let r = self.parse_var_binding(name, tok, parse_flags, export_flag);
                self.ctx.atoms.unref_atom(name);
                r?;
            } else if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                let mut skip_bits = 0u8;
                if self.skip_parens_token(Some(&mut skip_bits), false)? == Tok::Assign {
                    self.emit_op(Op::Undefined);
                    self.parse_destructuring_element(Some(tok), false, true, skip_bits & SKIP_HAS_ELLIPSIS != 0, true)?;
                } else {
                    return Err(self.parse_error("variable name expected"));
                }
            } else {
                return Err(self.parse_error("variable name expected"));
            }
            if self.token.kind != Tok::Comma {
                break;
            }
            self.next_token()?;
        }
        Ok(())
    }

    fn parse_var_binding(&mut self, name: Atom, tok: Tok, parse_flags: u8, export_flag: bool) -> ParseResult<()> {
        if name == PredefAtom::Let && (tok == Tok::Let || tok == Tok::Const) {
            return Err(self.parse_error("'let' is not a valid lexical identifier"));
        }
        self.next_token()?;
        self.js_define_var(name, tok)?;
        if export_flag {
            self.add_export_entry(name, name, ExportKind::Local)?;
        }

        if self.token.kind == Tok::Assign {
            self.next_token()?;
            if tok == Tok::Var {
                // must go through a reference for proper `with` semantics
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopeGetVar);
                self.emit_atom(name);
                self.emit_u16(scope);
                let lv = self.get_lvalue(false, Tok::Assign)?;
                let lv_name = lv.name;
                if let Err(e) = self.parse_assign_expr2(parse_flags) {
                    self.ctx.atoms.unref_atom(lv_name);
                    return Err(e);
                }
                self.set_object_name(name);
                self.put_lvalue(lv, PutLValue::NoKeep, false);
            } else {
                self.parse_assign_expr2(parse_flags)?;
                self.set_object_name(name);
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(if tok == Tok::Const || tok == Tok::Let { Op::ScopePutVarInit } else { Op::ScopePutVar });
                self.emit_atom(name);
                self.emit_u16(scope);
            }
        } else {
            if tok == Tok::Const {
                return Err(self.parse_error("missing initializer for const variable"));
            }
            if tok == Tok::Let {
                // initialized to undefined upon entering the scope
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::Undefined);
                self.emit_op(Op::ScopePutVarInit);
                self.emit_atom(name);
                self.emit_u16(scope);
            }
        }
        Ok(())
    }

    /// A `label:` prefix ahead of the current token.
    fn is_label(&self) -> bool {
        self.token.kind == Tok::Ident
            && !self.token.ident_is_reserved()
            && self.peek_token(false) == PeekToken::Char(b':')
    }

    /// `for (... in/of ...)` after the opening parenthesis.
    fn parse_for_in_of(&mut self, label_name: Atom, is_async: bool) -> ParseResult<()> {
        let block_scope_level = self.fd_ref().scope_level;
        let label_cont = self.new_label();
        let label_body = self.new_label();
        let label_break = self.new_label();
        let label_next = self.new_label();

        // scope for the lexical variables declared in the head
        self.push_scope();

        self.push_break_entry(label_name, label_break, label_cont, 1);
        self.fd().block_env.last_mut().expect("just pushed").scope_level = block_scope_level as u16;

        let label_expr = self.emit_goto(Op::Goto, -1);

        let pos_next = self.fd_ref().byte_code.len();
        self.emit_label(label_next);

        let mut tok = self.token.kind;
        if self.is_let(DECL_MASK_OTHER)? {
            tok = Tok::Let;
        }
        let mut var_name = Atom::NULL;
        let mut has_destructuring = false;
        if tok == Tok::Var || tok == Tok::Let || tok == Tok::Const {
            self.next_token()?;
            if !(self.token.kind == Tok::Ident && !self.token.ident_is_reserved()) {
                if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                    let has_ellipsis = self.pattern_has_ellipsis()?;
                    self.parse_destructuring_element(Some(tok), false, true, has_ellipsis, false)?;
                    has_destructuring = true;
                } else {
                    return Err(self.parse_error("variable name expected"));
                }
            } else {
                var_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                if let Err(e) = self.next_token().and_then(|()| self.js_define_var(var_name, tok)) {
                    self.ctx.atoms.unref_atom(var_name);
                    return Err(e);
                }
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(if tok == Tok::Const || tok == Tok::Let { Op::ScopePutVarInit } else { Op::ScopePutVar });
                self.emit_atom(var_name);
                self.emit_u16(scope);
            }
        } else {
            let mut skip_bits = 0u8;
            let tok1 = if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                self.skip_parens_token(Some(&mut skip_bits), false)?
            } else {
                Tok::Eof
            };
            if tok1 == Tok::In || tok1 == Tok::Of {
                self.parse_destructuring_element(None, false, true, skip_bits & SKIP_HAS_ELLIPSIS != 0, true)?;
            } else {
                self.parse_postfix_expr(crate::parser::expr::PF_POSTFIX_CALL)?;
                let lv = self.get_lvalue(false, Tok::For)?;
                self.put_lvalue(lv, PutLValue::NoKeepBottom, false);
            }
        }
        self.emit_goto(Op::Goto, label_body);

        let pos_expr = self.fd_ref().byte_code.len();
        self.emit_label(label_expr);
        let mut has_initializer = false;
        if self.token.kind == Tok::Assign {
            // evaluated before the enumerated object; only legal for
            // non-lexical `var` bindings of a for-in in sloppy mode
            has_initializer = true;
            if let Err(e) = self.next_token().and_then(|()| self.parse_assign_expr2(0)) {
                self.ctx.atoms.unref_atom(var_name);
                return Err(e);
            }
            if var_name != Atom::NULL {
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopePutVar);
                self.emit_atom(var_name);
                self.emit_u16(scope);
            }
        }
        self.ctx.atoms.unref_atom(var_name);

        let is_for_of;
        if self.token_is_pseudo_keyword(PredefAtom::Of) {
            is_for_of = true;
            let be = self.fd().block_env.last_mut().expect("for entry");
            be.has_iterator = true;
            be.drop_count += 2;
            if has_initializer {
                return Err(self.parse_error("a declaration in the head of a for-of loop can't have an initializer"));
            }
        } else if self.token.kind == Tok::In {
            is_for_of = false;
            if is_async {
                return Err(self.parse_error("'for await' loop should be used with 'of'"));
            }
            if has_initializer
                && (tok != Tok::Var || self.fd_ref().js_mode.contains(JsMode::STRICT) || has_destructuring)
            {
                return Err(self.parse_error("a declaration in the head of a for-in loop can't have an initializer"));
            }
        } else {
            return Err(self.parse_error("expected 'of' or 'in' in for control expression"));
        }
        self.next_token()?;
        if is_for_of {
            self.parse_assign_expr()?;
        } else {
            self.parse_expr()?;
        }
        // close the scope after the expression so TDZ values reach closures
        let scope = self.fd_ref().scope_level as i32;
        self.close_scopes(scope, block_scope_level as i32);
        if is_for_of {
            self.emit_op(if is_async { Op::ForAwaitOfStart } else { Op::ForOfStart });
            // on stack: enum_rec
        } else {
            self.emit_op(Op::ForInStart);
            // on stack: enum_obj
        }
        self.emit_goto(Op::Goto, label_cont);

        self.expect(Tok::RParen)?;

        // move the `next` code out of line
        self.splice_loop_chunk(pos_next, pos_expr, label_cont);

        self.emit_label(label_body);
        self.parse_statement()?;

        let scope = self.fd_ref().scope_level as i32;
        self.close_scopes(scope, block_scope_level as i32);

        self.emit_label(label_cont);
        if is_for_of {
            if is_async {
                // call the next method; stack: iter_obj next catch_offset
                self.emit_op(Op::Dup3);
                self.emit_op(Op::Drop);
                self.emit_op(Op::CallMethod);
                self.emit_u16(0);
                self.emit_op(Op::Await);
                self.emit_op(Op::IteratorGetValueDone);
            } else {
                self.emit_op(Op::ForOfNext);
                self.emit_u8(0);
            }
        } else {
            self.emit_op(Op::ForInNext);
        }
        // on stack: enum value done
        self.emit_goto(Op::IfFalse, label_next);
        self.emit_op(Op::Drop);

        self.emit_label(label_break);
        if is_for_of {
            self.emit_op(Op::IteratorClose);
        } else {
            self.emit_op(Op::Drop);
        }
        self.pop_break_entry();
        self.pop_scope();
        Ok(())
    }

    /// Moves the `[chunk_start, chunk_end)` loop-header chunk to the end of
    /// the buffer (nopping out the original) and relocates the labels
    /// anchored inside it. Labels allocated from `first_label` on are the
    /// only candidates.
    fn splice_loop_chunk(&mut self, chunk_start: usize, chunk_end: usize, first_label: i32) {
        let fd = self.fd();
        let chunk: Vec<u8> = fd.byte_code[chunk_start..chunk_end].to_vec();
        let offset = (fd.byte_code.len() - chunk_start) as i32;
        fd.byte_code.extend_from_slice(&chunk);
        for b in &mut fd.byte_code[chunk_start..chunk_end] {
            *b = Op::Nop as u8;
        }
        // the moved part ends with a goto
        fd.last_opcode_pos = fd.byte_code.len() as i32 - 5;
        for i in first_label.max(0) as usize..fd.label_slots.len() {
            let ls = &mut fd.label_slots[i];
            if ls.pos >= chunk_start as i32 && ls.pos < chunk_end as i32 {
                ls.pos += offset;
            }
        }
    }

    fn set_eval_ret_undefined(&mut self) {
        if self.fd_ref().eval_ret_idx >= 0 {
            let idx = self.fd_ref().eval_ret_idx as u16;
            self.emit_op(Op::Undefined);
            self.emit_op(Op::PutLoc);
            self.emit_u16(idx);
        }
    }

    /// One statement or declaration; `decl_mask` restricts which
    /// declaration classes are legal in this position.
    pub(crate) fn parse_statement_or_decl(&mut self, decl_mask: u8) -> ParseResult<()> {
        self.enter_nesting()?;
        let r = self.parse_statement_or_decl_inner(decl_mask);
        self.leave_nesting();
        r
    }

    fn parse_statement_or_decl_inner(&mut self, decl_mask: u8) -> ParseResult<()> {
        // label handling
        let mut label_name = Atom::NULL;
        if self.is_label() {
            label_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
            let r = self.parse_labelled_prefix(label_name, decl_mask);
            match r {
                Ok(true) => {
                    self.ctx.atoms.unref_atom(label_name);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    self.ctx.atoms.unref_atom(label_name);
                    return Err(e);
                }
            }
        }
        let r = self.parse_statement_body(label_name, decl_mask);
        self.ctx.atoms.unref_atom(label_name);
        r
    }

    /// Consumes `label:`; returns true when the labelled statement was
    /// fully handled here (regular statements), false when a loop follows
    /// and the label threads into its break entry.
    fn parse_labelled_prefix(&mut self, label_name: Atom, decl_mask: u8) -> ParseResult<bool> {
        if self.fd_ref().block_env.iter().any(|be| be.label_name == label_name) {
            return Err(self.parse_error("duplicate label name"));
        }
        self.next_token()?;
        self.expect(Tok::Colon)?;
        if !matches!(self.token.kind, Tok::For | Tok::Do | Tok::While) {
            // labelled regular statement
            let label_break = self.new_label();
            self.push_break_entry(label_name, label_break, -1, 0);
            let mask = if !self.fd_ref().js_mode.contains(JsMode::STRICT) && decl_mask & DECL_MASK_FUNC_WITH_LABEL != 0
            {
                DECL_MASK_FUNC | DECL_MASK_FUNC_WITH_LABEL
            } else {
                0
            };
            self.parse_statement_or_decl(mask)?;
            self.emit_label(label_break);
            self.pop_break_entry();
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_statement_body(&mut self, label_name: Atom, decl_mask: u8) -> ParseResult<()> {
        let mut tok = self.token.kind;
        match tok {
            Tok::LBrace => self.parse_block(),
            Tok::Return => {
                if self.fd_ref().is_eval {
                    return Err(self.parse_error("return not in a function"));
                }
                self.next_token()?;
                if self.token.kind != Tok::Semi && self.token.kind != Tok::RBrace && !self.got_lf {
                    self.parse_expr()?;
                    self.emit_return(true)?;
                } else {
                    self.emit_return(false)?;
                }
                self.expect_semi()
            }
            Tok::Throw => {
                self.next_token()?;
                if self.got_lf {
                    return Err(self.parse_error("line terminator not allowed after throw"));
                }
                self.parse_expr()?;
                self.emit_op(Op::Throw);
                self.expect_semi()
            }
            Tok::Let | Tok::Const | Tok::Var => {
                if tok != Tok::Var && decl_mask & DECL_MASK_OTHER == 0 {
                    return Err(self.parse_error("lexical declarations can't appear in single-statement context"));
                }
                self.next_token()?;
                self.parse_var(true, tok, false)?;
                self.expect_semi()
            }
            Tok::If => {
                self.next_token()?;
                // a new scope for `let f; if (1) function f() {}`
                self.push_scope();
                self.set_eval_ret_undefined();
                self.parse_expr_paren()?;
                let mut label1 = self.emit_goto(Op::IfFalse, -1);
                let mask = if self.fd_ref().js_mode.contains(JsMode::STRICT) {
                    0
                } else {
                    DECL_MASK_FUNC // Annex B.3.4
                };
                self.parse_statement_or_decl(mask)?;
                if self.token.kind == Tok::Else {
                    let label2 = self.emit_goto(Op::Goto, -1);
                    self.next_token()?;
                    self.emit_label(label1);
                    self.parse_statement_or_decl(mask)?;
                    label1 = label2;
                }
                self.emit_label(label1);
                self.pop_scope();
                Ok(())
            }
            Tok::While => {
                let label_cont = self.new_label();
                let label_break = self.new_label();
                self.push_break_entry(label_name, label_break, label_cont, 0);
                self.next_token()?;
                self.set_eval_ret_undefined();
                self.emit_label(label_cont);
                self.parse_expr_paren()?;
                self.emit_goto(Op::IfFalse, label_break);
                self.parse_statement()?;
                self.emit_goto(Op::Goto, label_cont);
                self.emit_label(label_break);
                self.pop_break_entry();
                Ok(())
            }
            Tok::Do => {
                let label_cont = self.new_label();
                let label_break = self.new_label();
                let label1 = self.new_label();
                self.push_break_entry(label_name, label_break, label_cont, 0);
                self.next_token()?;
                self.emit_label(label1);
                self.set_eval_ret_undefined();
                self.parse_statement()?;
                self.emit_label(label_cont);
                self.expect(Tok::While)?;
                self.parse_expr_paren()?;
                // insert the semicolon if missing
                if self.token.kind == Tok::Semi {
                    self.next_token()?;
                }
                self.emit_goto(Op::IfTrue, label1);
                self.emit_label(label_break);
                self.pop_break_entry();
                Ok(())
            }
            Tok::For => {
                self.next_token()?;
                self.set_eval_ret_undefined();
                let mut bits = 0u8;
                let mut is_async = false;
                if self.token.kind == Tok::LParen {
                    self.skip_parens_token(Some(&mut bits), false)?;
                } else if self.token.kind == Tok::Await {
                    if !self.fd_ref().func_kind.is_async() {
                        return Err(self.parse_error("for await is only valid in asynchronous functions"));
                    }
                    is_async = true;
                    self.next_token()?;
                }
                self.expect(Tok::LParen)?;
                if bits & SKIP_HAS_SEMI == 0 {
                    return self.parse_for_in_of(label_name, is_async);
                }
                self.parse_c_style_for(label_name)
            }
            Tok::Break | Tok::Continue => {
                let is_cont = tok == Tok::Continue;
                self.next_token()?;
                let label = if !self.got_lf && self.token.kind == Tok::Ident && !self.token.ident_is_reserved() {
                    self.token.ident_atom()
                } else {
                    Atom::NULL
                };
                self.emit_break(label, is_cont)?;
                if label != Atom::NULL {
                    self.next_token()?;
                }
                self.expect_semi()
            }
            Tok::Switch => self.parse_switch(label_name),
            Tok::Try => self.parse_try(),
            Tok::Semi => self.next_token(),
            Tok::With => {
                if self.fd_ref().js_mode.contains(JsMode::STRICT) {
                    return Err(self.parse_error("invalid keyword: with"));
                }
                self.next_token()?;
                self.parse_expr_paren()?;
                self.push_scope();
                let with_idx = self.define_var(PredefAtom::SpecialWith.atom(), VarDeclKind::With)?;
                self.emit_op(Op::ToObject);
                self.emit_op(Op::PutLoc);
                self.emit_u16(with_idx as u16);
                self.set_eval_ret_undefined();
                self.parse_statement()?;
                // popping the scope drops the with-object binding
                self.pop_scope();
                Ok(())
            }
            Tok::Function => {
                // ES6 Annex B.3.2 / B.3.3 semantics
                if decl_mask & DECL_MASK_FUNC == 0 {
                    return Err(self.parse_error("function declarations can't appear in single-statement context"));
                }
                if decl_mask & DECL_MASK_OTHER == 0 && self.peek_token(false) == PeekToken::Char(b'*') {
                    return Err(self.parse_error("function declarations can't appear in single-statement context"));
                }
                self.parse_function_decl(FuncType::Var, FuncKind::Normal, Atom::NULL, self.token.start, self.token.line_num)
            }
            Tok::Ident => {
                if self.token.ident_is_reserved() {
                    return Err(self.error_reserved_identifier());
                }
                // does `let` start a declaration here?
                if self.is_let(decl_mask)? {
                    tok = Tok::Let;
                    if decl_mask & DECL_MASK_OTHER == 0 {
                        return Err(self.parse_error("lexical declarations can't appear in single-statement context"));
                    }
                    self.next_token()?;
                    self.parse_var(true, tok, false)?;
                    return self.expect_semi();
                }
                if self.token_is_pseudo_keyword(PredefAtom::Async) && self.peek_token(true) == PeekToken::Function {
                    if decl_mask & DECL_MASK_OTHER == 0 {
                        return Err(self.parse_error("function declarations can't appear in single-statement context"));
                    }
                    return self.parse_function_decl(
                        FuncType::Var,
                        FuncKind::Normal,
                        Atom::NULL,
                        self.token.start,
                        self.token.line_num,
                    );
                }
                self.parse_expression_statement()
            }
            Tok::Class => {
                if decl_mask & DECL_MASK_OTHER == 0 {
                    return Err(self.parse_error("class declarations can't appear in single-statement context"));
                }
                self.parse_class(false, ExportFlag::None)
            }
            Tok::Debugger => {
                // no debugger support: skip the keyword
                self.next_token()?;
                self.expect_semi()
            }
            Tok::Enum | Tok::Export | Tok::Extends => {
                let name = self.ctx.atoms.get_str(self.token.ident_atom());
                Err(self.parse_error(format!("unsupported keyword: {name}")))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> ParseResult<()> {
        self.parse_expr()?;
        if self.fd_ref().eval_ret_idx >= 0 {
            // store the value so eval() can return it
            let idx = self.fd_ref().eval_ret_idx as u16;
            self.emit_op(Op::PutLoc);
            self.emit_u16(idx);
        } else {
            self.emit_op(Op::Drop);
        }
        self.expect_semi()
    }

    fn parse_c_style_for(&mut self, label_name: Atom) -> ParseResult<()> {
        let block_scope_level = self.fd_ref().scope_level;
        // scope for the lexical variables of the three header expressions
        self.push_scope();
        let mut tok = self.token.kind;
        if tok != Tok::Semi {
            if self.is_let(DECL_MASK_OTHER)? {
                tok = Tok::Let;
            }
            if tok == Tok::Var || tok == Tok::Let || tok == Tok::Const {
                self.next_token()?;
                self.parse_var(false, tok, false)?;
            } else {
                self.parse_expr2(0)?;
                self.emit_op(Op::Drop);
            }
            // close the closures before the first iteration
            let scope = self.fd_ref().scope_level as i32;
            self.close_scopes(scope, block_scope_level as i32);
        }
        self.expect(Tok::Semi)?;

        let mut label_test = self.new_label();
        let mut label_cont = self.new_label();
        let label_body = self.new_label();
        let label_break = self.new_label();

        self.push_break_entry(label_name, label_break, label_cont, 0);

        if self.token.kind == Tok::Semi {
            // no test expression
            label_test = label_body;
        } else {
            self.emit_label(label_test);
            self.parse_expr()?;
            self.emit_goto(Op::IfFalse, label_break);
        }
        self.expect(Tok::Semi)?;

        let mut pos_cont = 0usize;
        let has_incr = self.token.kind != Tok::RParen;
        if has_incr {
            // the increment part runs out of line and is spliced later
            self.emit_goto(Op::Goto, label_body);
            pos_cont = self.fd_ref().byte_code.len();
            self.emit_label(label_cont);
            self.parse_expr()?;
            self.emit_op(Op::Drop);
            if label_test != label_body {
                self.emit_goto(Op::Goto, label_test);
            }
        } else {
            label_cont = label_test;
            self.fd().block_env.last_mut().expect("for entry").label_cont = label_cont;
        }
        self.expect(Tok::RParen)?;

        let pos_body = self.fd_ref().byte_code.len();
        self.emit_label(label_body);
        self.parse_statement()?;

        // close the closures before the next iteration
        let scope = self.fd_ref().scope_level as i32;
        self.close_scopes(scope, block_scope_level as i32);

        if has_incr && label_test != label_body {
            self.splice_loop_chunk(pos_cont, pos_body, label_cont);
        } else {
            self.emit_goto(Op::Goto, label_cont);
        }

        self.emit_label(label_break);
        self.pop_break_entry();
        self.pop_scope();
        Ok(())
    }

    fn parse_switch(&mut self, label_name: Atom) -> ParseResult<()> {
        self.next_token()?;
        self.set_eval_ret_undefined();
        self.parse_expr_paren()?;

        self.push_scope();
        let label_break = self.new_label();
        self.push_break_entry(label_name, label_break, -1, 1);

        self.expect(Tok::LBrace)?;

        let mut default_label_pos = -1i64;
        let mut label_case = -1i32;
        while self.token.kind != Tok::RBrace {
            if self.token.kind == Tok::Case {
                let mut label1 = -1;
                if label_case >= 0 {
                    // skip over the case tests when falling through
                    label1 = self.emit_goto(Op::Goto, -1);
                }
                self.emit_label(label_case);
                label_case = -1;
                loop {
                    // a run of consecutive case clauses
                    self.next_token()?;
                    self.emit_op(Op::Dup);
                    self.parse_expr()?;
                    self.expect(Tok::Colon)?;
                    self.emit_op(Op::StrictEq);
                    if self.token.kind == Tok::Case {
                        label1 = self.emit_goto(Op::IfTrue, label1);
                    } else {
                        label_case = self.emit_goto(Op::IfFalse, -1);
                        self.emit_label(label1);
                        break;
                    }
                }
            } else if self.token.kind == Tok::Default {
                self.next_token()?;
                self.expect(Tok::Colon)?;
                if default_label_pos >= 0 {
                    return Err(self.parse_error("duplicate default"));
                }
                if label_case < 0 {
                    // falling through directly from the switch expression
                    label_case = self.emit_goto(Op::Goto, -1);
                }
                // a dummy label opcode, patched after the switch body (an
                // emit_label here would clobber label 0's anchor)
                self.emit_op(Op::Label);
                self.emit_u32(0);
                default_label_pos = self.fd_ref().byte_code.len() as i64 - 4;
            } else {
                if label_case < 0 {
                    return Err(self.parse_error("invalid switch statement"));
                }
                self.parse_statement_or_decl(DECL_MASK_ALL)?;
            }
        }
        self.expect(Tok::RBrace)?;
        if default_label_pos >= 0 {
            // route the pending default jump into the recorded position
            let pos = default_label_pos as usize;
            self.fd().put_u32(pos, label_case as u32);
            self.fd().label_slots[label_case as usize].pos = pos as i32 + 4;
        } else {
            self.emit_label(label_case);
        }
        self.emit_label(label_break);
        self.emit_op(Op::Drop); // the switch expression

        self.pop_break_entry();
        self.pop_scope();
        Ok(())
    }

    fn parse_try(&mut self) -> ParseResult<()> {
        self.set_eval_ret_undefined();
        self.next_token()?;
        let label_catch = self.new_label();
        let label_catch2 = self.new_label();
        let label_finally = self.new_label();
        let label_end = self.new_label();

        self.emit_goto(Op::Catch, label_catch);

        self.push_break_entry(Atom::NULL, -1, -1, 1);
        self.fd().block_env.last_mut().expect("try entry").label_finally = label_finally;

        self.parse_block()?;
        self.pop_break_entry();

        if self.is_live_code() {
            // drop the catch offset, run finally, continue after the try
            self.emit_op(Op::Drop);
            self.emit_op(Op::Undefined);
            self.emit_goto(Op::Gosub, label_finally);
            self.emit_op(Op::Drop);
            self.emit_goto(Op::Goto, label_end);
        }

        if self.token.kind == Tok::Catch {
            self.next_token()?;
            self.push_scope(); // catch variable
            self.emit_label(label_catch);

            if self.token.kind == Tok::LBrace {
                // optional catch binding
                self.emit_op(Op::Drop); // pop the exception object
            } else {
                self.expect(Tok::LParen)?;
                if !(self.token.kind == Tok::Ident && !self.token.ident_is_reserved()) {
                    if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                        let has_ellipsis = self.pattern_has_ellipsis()?;
                        self.parse_destructuring_element(Some(Tok::Let), false, true, has_ellipsis, true)?;
                    } else {
                        return Err(self.parse_error("identifier expected"));
                    }
                } else {
                    let name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                    if let Err(e) = self.next_token().and_then(|()| self.js_define_var(name, Tok::Catch)) {
                        self.ctx.atoms.unref_atom(name);
                        return Err(e);
                    }
                    // store the exception in the catch variable; the
                    // reference transfers into the bytecode
                    let scope = self.fd_ref().scope_level as u16;
                    self.emit_op(Op::ScopePutVar);
                    self.emit_u32(name.raw());
                    self.emit_u16(scope);
                }
                self.expect(Tok::RParen)?;
            }
            self.emit_goto(Op::Catch, label_catch2);

            self.push_scope(); // catch block
            self.push_break_entry(Atom::NULL, -1, -1, 1);
            self.fd().block_env.last_mut().expect("catch entry").label_finally = label_finally;

            self.parse_block()?;
            self.pop_break_entry();
            self.pop_scope(); // catch block
            self.pop_scope(); // catch variable

            if self.is_live_code() {
                self.emit_op(Op::Drop); // catch2 offset
                self.emit_op(Op::Undefined);
                self.emit_goto(Op::Gosub, label_finally);
                self.emit_op(Op::Drop);
                self.emit_goto(Op::Goto, label_end);
            }
            // exceptions thrown in the catch block still run finally and
            // then rethrow
            self.emit_label(label_catch2);
            self.emit_goto(Op::Gosub, label_finally);
            self.emit_op(Op::Throw);
        } else if self.token.kind == Tok::Finally {
            // finally without catch: run the clause and rethrow
            self.emit_label(label_catch);
            self.emit_goto(Op::Gosub, label_finally);
            self.emit_op(Op::Throw);
        } else {
            return Err(self.parse_error("expecting catch or finally"));
        }
        self.emit_label(label_finally);
        if self.token.kind == Tok::Finally {
            self.next_token()?;
            // on the stack: ret_value gosub_ret_value
            self.push_break_entry(Atom::NULL, -1, -1, 2);

            let mut saved_eval_ret_idx = 0u16;
            let has_eval_ret = self.fd_ref().eval_ret_idx >= 0;
            if has_eval_ret {
                // 'finally' restores eval_ret unless the completion was
                // abnormal
                let ret_atom = PredefAtom::SpecialRet.atom();
                saved_eval_ret_idx = self.fd_and_atoms(|fd, atoms| fd.add_var(atoms, ret_atom));
                let eval_ret = self.fd_ref().eval_ret_idx as u16;
                self.emit_op(Op::GetLoc);
                self.emit_u16(eval_ret);
                self.emit_op(Op::PutLoc);
                self.emit_u16(saved_eval_ret_idx);
                self.set_eval_ret_undefined();
            }

            self.parse_block()?;

            if has_eval_ret {
                let eval_ret = self.fd_ref().eval_ret_idx as u16;
                self.emit_op(Op::GetLoc);
                self.emit_u16(saved_eval_ret_idx);
                self.emit_op(Op::PutLoc);
                self.emit_u16(eval_ret);
            }
            self.pop_break_entry();
        }
        self.emit_op(Op::Ret);
        self.emit_label(label_end);
        Ok(())
    }

    // ---- classes -------------------------------------------------------

    /// Creates the synthetic fields-initializer function for one bucket.
    fn new_class_fields_init_fd(&mut self) -> usize {
        let id = self.new_function_def(false, 0);
        let fd = &mut self.funcs[id];
        fd.func_name = Atom::NULL;
        fd.has_prototype = false;
        fd.has_home_object = true;
        fd.has_arguments_binding = false;
        fd.has_this_binding = true;
        fd.is_derived_class_constructor = false;
        fd.new_target_allowed = true;
        fd.super_call_allowed = false;
        fd.super_allowed = true;
        fd.arguments_allowed = false;
        fd.func_kind = FuncKind::Normal;
        fd.func_type = FuncType::Method;
        id
    }

    /// Starts a fields-initializer function: the brand placeholder plus the
    /// conditional `add_brand` prologue.
    fn emit_class_init_start(&mut self, cf: &mut ClassFieldsDef) -> ParseResult<()> {
        let init_id = self.new_class_fields_init_fd();
        cf.fields_init_fd = init_id as i32;
        let saved = self.cur_func;
        self.cur_func = init_id;

        // two-valued marker; the resolver rewrites it to push_true or
        // push_false depending on whether a private member forced a brand
        self.emit_op(Op::PushBrand);
        let label_add_brand = self.emit_goto(Op::IfFalse, -1);

        self.emit_op(Op::ScopeGetVar);
        self.emit_atom(PredefAtom::This.atom());
        self.emit_u16(0);
        self.emit_op(Op::ScopeGetVar);
        self.emit_atom(PredefAtom::HomeObject.atom());
        self.emit_u16(0);
        self.emit_op(Op::AddBrand);

        self.emit_label(label_add_brand);

        self.cur_func = saved;
        Ok(())
    }

    /// Enables brand tracking for the bucket (creating its initializer on
    /// demand).
    fn add_brand(&mut self, cf: &mut ClassFieldsDef) -> ParseResult<()> {
        if !cf.has_brand {
            if cf.fields_init_fd < 0 {
                self.emit_class_init_start(cf)?;
            }
            self.funcs[cf.fields_init_fd as usize].has_brand = true;
            cf.has_brand = true;
        }
        Ok(())
    }

    /// Finishes a fields-initializer function and emits the closure +
    /// `set_home_object` in the enclosing function.
    fn emit_class_init_end(&mut self, cf: &mut ClassFieldsDef) {
        let init_id = cf.fields_init_fd as usize;
        let saved = self.cur_func;
        self.cur_func = init_id;
        self.emit_op(Op::ReturnUndef);
        self.cur_func = saved;

        let cpool_idx = self.fd().cpool_add(ConstEntry::Func(FuncId(init_id)));
        self.funcs[init_id].parent_cpool_idx = cpool_idx as i32;
        self.emit_op(Op::FClosure);
        self.emit_u32(cpool_idx);
        self.emit_op(Op::SetHomeObject);
    }

    fn add_private_class_field(&mut self, name: Atom, kind: VarKind) -> ParseResult<u16> {
        self.check_var_limit()?;
        let idx = self.fd_and_atoms(|fd, atoms| fd.add_scope_var(atoms, name, kind));
        let vd = &mut self.fd().vars[idx as usize];
        vd.is_lexical = true;
        vd.is_const = true;
        Ok(idx)
    }

    fn find_private_class_field(&self, name: Atom, scope_level: usize) -> i32 {
        let fd = self.fd_ref();
        let mut idx = fd.scopes[scope_level].first;
        while idx != -1 {
            let vd = &fd.vars[idx as usize];
            if vd.scope_level as usize != scope_level {
                break;
            }
            if vd.name == name {
                return idx;
            }
            idx = vd.scope_next;
        }
        -1
    }

    /// Re-parses a synthesized default constructor from a fixed source
    /// string, then restores the scan position.
    fn parse_class_default_ctor(&mut self, has_super: bool) -> ParseResult<usize> {
        let pos = self.get_pos();
        let (text, func_type): (&'static [u8], FuncType) = if has_super {
            // forwards the arguments without evaluating them
            (b"(){super(...arguments);}", FuncType::DerivedClassConstructor)
        } else {
            (b"(){}", FuncType::ClassConstructor)
        };
        let line_num = self.token.line_num;
        let saved_input = self.input;
        let saved_end = self.end;
        self.input = text;
        self.pos = 0;
        self.end = text.len();
        self.next_token()?;
        let ctor = self.parse_function_decl2(func_type, FuncKind::Normal, Atom::NULL, 0, line_num, ExportFlag::None);
        self.input = saved_input;
        self.end = saved_end;
        let ctor = ctor?;
        self.seek_token(pos)?;
        Ok(ctor.expect("constructor parse returns a function"))
    }

    /// `class C extends E { ... }` declaration or expression.
    pub(crate) fn parse_class(&mut self, is_class_expr: bool, export_flag: ExportFlag) -> ParseResult<()> {
        let saved_js_mode = self.fd_ref().js_mode;
        // classes parse and execute in strict mode
        self.fd().js_mode |= JsMode::STRICT;
        let class_start_ptr = self.token.start;
        let result = self.parse_class_inner(is_class_expr, export_flag, class_start_ptr);
        self.fd().js_mode = saved_js_mode;
        result
    }

    fn parse_class_inner(
        &mut self,
        is_class_expr: bool,
        export_flag: ExportFlag,
        class_start_ptr: usize,
    ) -> ParseResult<()> {
        self.next_token()?;
        let mut class_name = Atom::NULL;
        if self.token.kind == Tok::Ident {
            if self.token.ident_is_reserved() {
                return Err(self.error_reserved_identifier());
            }
            class_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
            self.next_token()?;
        } else if !is_class_expr && export_flag != ExportFlag::Default {
            return Err(self.parse_error("class statement requires a name"));
        }
        let class_var_name = if is_class_expr {
            Atom::NULL
        } else if class_name == Atom::NULL {
            PredefAtom::SpecialDefault.atom() // export default
        } else {
            class_name
        };

        self.push_scope();

        let mut class_flags = 0u8;
        if self.token.kind == Tok::Extends {
            class_flags = DEFINE_CLASS_HAS_HERITAGE;
            self.next_token()?;
            self.parse_postfix_expr(crate::parser::expr::PF_POSTFIX_CALL)?;
        } else {
            self.emit_op(Op::Undefined);
        }

        // a 'const' binding for the class name, visible in the body
        if class_name != Atom::NULL {
            self.define_var(class_name, VarDeclKind::Const)?;
        }

        self.expect(Tok::LBrace)?;

        // this scope holds the private names
        self.push_scope();

        self.emit_op(Op::PushConst);
        let ctor_cpool_offset = self.fd_ref().byte_code.len();
        self.emit_u32(0); // patched when the constructor is known

        let class_name1 = if class_name == Atom::NULL {
            if class_var_name != Atom::NULL { PredefAtom::Default.atom() } else { PredefAtom::Empty.atom() }
        } else {
            class_name
        };

        self.emit_op(Op::DefineClass);
        self.emit_atom(class_name1);
        self.emit_u8(class_flags);
        let define_class_offset = self.fd_ref().last_opcode_pos;

        let mut class_fields =
            [ClassFieldsDef { fields_init_fd: -1, computed_fields_count: 0, has_brand: false }, ClassFieldsDef {
                fields_init_fd: -1,
                computed_fields_count: 0,
                has_brand: false,
            }];

        let mut ctor_fd: i32 = -1;
        while self.token.kind != Tok::RBrace {
            if self.token.kind == Tok::Semi {
                self.next_token()?;
                continue;
            }
            let mut is_static = self.token.kind == Tok::Static;
            let mut name = Atom::NULL;
            let mut prop_type: Option<PropType> = None;
            if is_static {
                self.next_token()?;
                // "static" itself can be a field name
                if self.token.kind == Tok::Semi || self.token.kind == Tok::Assign {
                    is_static = false;
                    name = PredefAtom::Static.atom();
                    prop_type = Some(PropType::Ident);
                }
            }
            if is_static {
                self.emit_op(Op::Swap);
            }
            let start_ptr = self.token.start;
            let prop_type = match prop_type {
                Some(t) => t,
                None => {
                    let (t, n) = self.parse_property_name(true, false, true)?;
                    name = n;
                    t
                }
            };
            let is_private = prop_type == PropType::PrivateIdent;
            let prop_type = if is_private { PropType::Ident } else { prop_type };

            let r = self.parse_class_member(
                prop_type,
                is_private,
                is_static,
                name,
                start_ptr,
                class_flags,
                &mut class_fields,
                &mut ctor_fd,
            );
            self.ctx.atoms.unref_atom(name);
            r?;
            if is_static {
                self.emit_op(Op::Swap);
            }
        }

        if self.token.kind != Tok::RBrace {
            return Err(self.parse_error("expecting '}'"));
        }

        if ctor_fd < 0 {
            ctor_fd = self.parse_class_default_ctor(class_flags & DEFINE_CLASS_HAS_HERITAGE != 0)? as i32;
        }
        // patch the constructor's constant pool index
        let ctor_cpool_idx = self.funcs[ctor_fd as usize].parent_cpool_idx as u32;
        self.fd().put_u32(ctor_cpool_offset, ctor_cpool_idx);

        // the class source text lives on the constructor
        if !self.fd_ref().js_mode.contains(JsMode::STRIP) {
            let source = std::str::from_utf8(&self.input[class_start_ptr..self.pos]).unwrap_or("").to_owned();
            self.funcs[ctor_fd as usize].source = Some(source);
        }

        // consume the '}'
        self.next_token()?;

        // expose the instance fields initializer to the constructor
        {
            self.define_var(PredefAtom::ClassFieldsInit.atom(), VarDeclKind::Const)?;
            if class_fields[0].fields_init_fd >= 0 {
                let mut cf = std::mem::replace(&mut class_fields[0], ClassFieldsDef {
                    fields_init_fd: -1,
                    computed_fields_count: 0,
                    has_brand: false,
                });
                self.emit_class_init_end(&mut cf);
            } else {
                self.emit_op(Op::Undefined);
            }
            let scope = self.fd_ref().scope_level as u16;
            self.emit_op(Op::ScopePutVarInit);
            self.emit_atom(PredefAtom::ClassFieldsInit.atom());
            self.emit_u16(scope);
        }

        // drop the prototype
        self.emit_op(Op::Drop);

        // run the static field initializers
        if class_fields[1].fields_init_fd >= 0 {
            let mut cf = std::mem::replace(&mut class_fields[1], ClassFieldsDef {
                fields_init_fd: -1,
                computed_fields_count: 0,
                has_brand: false,
            });
            self.emit_op(Op::Dup);
            self.emit_class_init_end(&mut cf);
            self.emit_op(Op::CallMethod);
            self.emit_u16(0);
            self.emit_op(Op::Drop);
        }

        if class_name != Atom::NULL {
            // the scoped class-name binding is independent from the class
            // statement variable
            let scope = self.fd_ref().scope_level as u16;
            self.emit_op(Op::Dup);
            self.emit_op(Op::ScopePutVarInit);
            self.emit_atom(class_name);
            self.emit_u16(scope);
        }
        self.pop_scope();
        self.pop_scope();

        // the class statement itself has block-level scope
        if class_var_name != Atom::NULL {
            self.define_var(class_var_name, VarDeclKind::Let)?;
            let scope = self.fd_ref().scope_level as u16;
            self.emit_op(Op::ScopePutVarInit);
            self.emit_atom(class_var_name);
            self.emit_u16(scope);
        } else if class_name == Atom::NULL {
            // the name must exist before static initializers run, so
            // set_name cannot be used
            let rel = (self.fd_ref().byte_code.len() as i32 + 1) - define_class_offset;
            self.emit_op(Op::SetClassName);
            self.emit_u32(rel as u32);
        }

        if export_flag != ExportFlag::None {
            let export_name = if export_flag == ExportFlag::Named { class_var_name } else { PredefAtom::Default.atom() };
            self.add_export_entry(class_var_name, export_name, ExportKind::Local)?;
        }

        self.ctx.atoms.unref_atom(class_name);
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "class member state spans the whole declaration")]
    fn parse_class_member(
        &mut self,
        prop_type: PropType,
        is_private: bool,
        is_static: bool,
        name: Atom,
        start_ptr: usize,
        class_flags: u8,
        class_fields: &mut [ClassFieldsDef; 2],
        ctor_fd: &mut i32,
    ) -> ParseResult<()> {
        let bucket = usize::from(is_static);
        if (name == PredefAtom::Constructor && !is_static && prop_type != PropType::Ident)
            || (name == PredefAtom::Prototype && is_static)
            || name == PredefAtom::HashConstructor
        {
            return Err(self.parse_error("invalid method name"));
        }
        if prop_type == PropType::Get || prop_type == PropType::Set {
            let is_set = prop_type == PropType::Set;
            if is_private {
                let idx = self.find_private_class_field(name, self.fd_ref().scope_level);
                if idx >= 0 {
                    let kind = self.fd_ref().vars[idx as usize].kind;
                    let conflicting = matches!(
                        kind,
                        VarKind::PrivateField | VarKind::PrivateMethod | VarKind::PrivateGetterSetter
                    ) || kind == if is_set { VarKind::PrivateSetter } else { VarKind::PrivateGetter };
                    if conflicting {
                        return Err(self.parse_error("private class field is already defined"));
                    }
                    self.fd().vars[idx as usize].kind = VarKind::PrivateGetterSetter;
                } else {
                    let kind = if is_set { VarKind::PrivateSetter } else { VarKind::PrivateGetter };
                    self.add_private_class_field(name, kind)?;
                }
                self.add_brand(&mut class_fields[bucket])?;
            }
            let func_type = if is_set { FuncType::Setter } else { FuncType::Getter };
            let method_fd = self
                .parse_function_decl2(func_type, FuncKind::Normal, Atom::NULL, start_ptr, self.token.line_num, ExportFlag::None)?
                .expect("methods parse to functions");
            if is_private {
                self.funcs[method_fd].need_home_object = true; // brand check
                self.emit_op(Op::SetHomeObject);
                self.emit_op(Op::ScopePutVarInit);
                if is_set {
                    let setter_name = self.ctx.atoms.concat_str(name, "<set>")?;
                    let setter_raw = self.ctx.atoms.ref_atom(setter_name).raw();
                    self.emit_u32(setter_raw);
                    let r = self.add_private_class_field(setter_name, VarKind::PrivateSetter);
                    self.ctx.atoms.unref_atom(setter_name);
                    r?;
                } else {
                    self.emit_atom(name);
                }
                let scope = self.fd_ref().scope_level as u16;
                self.emit_u16(scope);
            } else {
                if name == Atom::NULL {
                    self.emit_op(Op::DefineMethodComputed);
                } else {
                    self.emit_op(Op::DefineMethod);
                    self.emit_atom(name);
                }
                self.emit_u8(if is_set { DEFINE_METHOD_SETTER } else { DEFINE_METHOD_GETTER });
            }
        } else if prop_type == PropType::Ident && self.token.kind != Tok::LParen {
            // class field
            if name == PredefAtom::Constructor || name == PredefAtom::Prototype {
                return Err(self.parse_error("invalid field name"));
            }
            if is_private {
                if self.find_private_class_field(name, self.fd_ref().scope_level) >= 0 {
                    return Err(self.parse_error("private class field is already defined"));
                }
                self.add_private_class_field(name, VarKind::PrivateField)?;
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::PrivateSymbol);
                self.emit_atom(name);
                self.emit_op(Op::ScopePutVarInit);
                self.emit_atom(name);
                self.emit_u16(scope);
            }
            if class_fields[bucket].fields_init_fd < 0 {
                self.emit_class_init_start(&mut class_fields[bucket])?;
            }
            let mut field_var_name = Atom::NULL;
            if name == Atom::NULL {
                // stash the computed key in a fresh constant
                let base = if is_static { PredefAtom::StaticComputedField } else { PredefAtom::ComputedField };
                field_var_name = self.ctx.atoms.concat_num(base.atom(), class_fields[bucket].computed_fields_count)?;
                if let Err(e) = self.define_var(field_var_name, VarDeclKind::Const) {
                    self.ctx.atoms.unref_atom(field_var_name);
                    return Err(e);
                }
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ToPropkey);
                self.emit_op(Op::ScopePutVarInit);
                self.emit_atom(field_var_name);
                self.emit_u16(scope);
            }
            let init_id = class_fields[bucket].fields_init_fd as usize;
            let saved = self.cur_func;
            self.cur_func = init_id;
            self.emit_op(Op::ScopeGetVar);
            self.emit_atom(PredefAtom::This.atom());
            self.emit_u16(0);

            if name == Atom::NULL {
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopeGetVar);
                self.emit_atom(field_var_name);
                self.emit_u16(scope);
                class_fields[bucket].computed_fields_count += 1;
                self.ctx.atoms.unref_atom(field_var_name);
            } else if is_private {
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopeGetVar);
                self.emit_atom(name);
                self.emit_u16(scope);
            }

            let r = (|| -> ParseResult<()> {
                if self.token.kind == Tok::Assign {
                    self.next_token()?;
                    self.parse_assign_expr()?;
                } else {
                    self.emit_op(Op::Undefined);
                }
                Ok(())
            })();
            if let Err(e) = r {
                self.cur_func = saved;
                return Err(e);
            }
            if is_private {
                self.set_object_name_computed();
                self.emit_op(Op::DefinePrivateField);
            } else if name == Atom::NULL {
                self.set_object_name_computed();
                self.emit_op(Op::DefineArrayEl);
                self.emit_op(Op::Drop);
            } else {
                self.set_object_name(name);
                self.emit_op(Op::DefineField);
                self.emit_atom(name);
            }
            self.cur_func = saved;
            self.expect_semi()?;
        } else {
            // method (possibly the constructor)
            let mut func_type = FuncType::Method;
            let func_kind = match prop_type {
                PropType::Star => FuncKind::Generator,
                PropType::Async => FuncKind::Async,
                PropType::AsyncStar => FuncKind::AsyncGenerator,
                _ => FuncKind::Normal,
            };
            if prop_type == PropType::Ident && name == PredefAtom::Constructor && !is_static {
                if *ctor_fd >= 0 {
                    return Err(self.parse_error("property constructor appears more than once"));
                }
                func_type = if class_flags & DEFINE_CLASS_HAS_HERITAGE != 0 {
                    FuncType::DerivedClassConstructor
                } else {
                    FuncType::ClassConstructor
                };
            }
            if is_private {
                self.add_brand(&mut class_fields[bucket])?;
            }
            let method_fd = self
                .parse_function_decl2(func_type, func_kind, Atom::NULL, start_ptr, self.token.line_num, ExportFlag::None)?
                .expect("methods parse to functions");
            if matches!(func_type, FuncType::ClassConstructor | FuncType::DerivedClassConstructor) {
                *ctor_fd = method_fd as i32;
            } else if is_private {
                self.funcs[method_fd].need_home_object = true; // brand check
                if self.find_private_class_field(name, self.fd_ref().scope_level) >= 0 {
                    return Err(self.parse_error("private class field is already defined"));
                }
                self.add_private_class_field(name, VarKind::PrivateMethod)?;
                self.emit_op(Op::SetHomeObject);
                self.emit_op(Op::SetName);
                self.emit_atom(name);
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopePutVarInit);
                self.emit_atom(name);
                self.emit_u16(scope);
            } else {
                if name == Atom::NULL {
                    self.emit_op(Op::DefineMethodComputed);
                } else {
                    self.emit_op(Op::DefineMethod);
                    self.emit_atom(name);
                }
                self.emit_u8(DEFINE_METHOD_METHOD);
            }
        }
        Ok(())
    }

    // ---- functions -----------------------------------------------------

    /// Creates a nested function record linked under the current one.
    fn new_function_def(&mut self, is_func_expr: bool, line_num: u32) -> usize {
        let parent_id = FuncId(self.cur_func);
        let parent = &self.funcs[self.cur_func];
        let filename = self.ctx.atoms.ref_atom(self.filename_atom);
        let fd = FuncDef::new(
            Some(parent_id),
            parent.js_mode,
            parent.scope_level as u16,
            false,
            EvalType::Global,
            is_func_expr,
            filename,
            line_num,
        );
        self.funcs.push(fd);
        let id = self.funcs.len() - 1;
        self.funcs[self.cur_func].children.push(FuncId(id));
        id
    }

    pub(crate) fn parse_function_decl(
        &mut self,
        func_type: FuncType,
        func_kind: FuncKind,
        func_name: Atom,
        start_ptr: usize,
        line_num: u32,
    ) -> ParseResult<()> {
        self.parse_function_decl2(func_type, func_kind, func_name, start_ptr, line_num, ExportFlag::None)?;
        Ok(())
    }

    /// Parses a function of any shape; returns the arena index of the new
    /// function.
    pub(crate) fn parse_function_decl2(
        &mut self,
        mut func_type: FuncType,
        mut func_kind: FuncKind,
        mut func_name: Atom,
        start_ptr: usize,
        line_num: u32,
        export_flag: ExportFlag,
    ) -> ParseResult<Option<usize>> {
        self.enter_nesting()?;
        let r = self.parse_function_decl2_inner(&mut func_type, &mut func_kind, &mut func_name, start_ptr, line_num, export_flag);
        self.leave_nesting();
        r
    }

    fn parse_function_decl2_inner(
        &mut self,
        func_type: &mut FuncType,
        func_kind: &mut FuncKind,
        func_name: &mut Atom,
        start_ptr: usize,
        line_num: u32,
        export_flag: ExportFlag,
    ) -> ParseResult<Option<usize>> {
        let is_expr = !matches!(*func_type, FuncType::Statement | FuncType::Var);

        if matches!(*func_type, FuncType::Statement | FuncType::Var | FuncType::Expr) {
            if *func_kind == FuncKind::Normal
                && self.token_is_pseudo_keyword(PredefAtom::Async)
                && self.peek_token(true) != PeekToken::LineTerminator
            {
                self.next_token()?;
                *func_kind = FuncKind::Async;
            }
            self.next_token()?;
            if self.token.kind == Tok::Star {
                self.next_token()?;
                *func_kind = func_kind.with_generator();
            }

            if self.token.kind == Tok::Ident {
                let atom = self.token.ident_atom();
                if self.token.ident_is_reserved()
                    || (atom == PredefAtom::Yield && *func_type == FuncType::Expr && func_kind.is_generator())
                    || (atom == PredefAtom::Await && *func_type == FuncType::Expr && func_kind.is_async())
                {
                    return Err(self.error_reserved_identifier());
                }
            }
            let strict = self.fd_ref().js_mode.contains(JsMode::STRICT);
            if self.token.kind == Tok::Ident
                || (((self.token.kind == Tok::Yield && !strict) || (self.token.kind == Tok::Await && !self.is_module))
                    && *func_type == FuncType::Expr)
            {
                *func_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                self.next_token()?;
            } else if *func_type != FuncType::Expr && export_flag != ExportFlag::Default {
                return Err(self.parse_error("function name expected"));
            }
        } else if *func_type != FuncType::Arrow {
            *func_name = self.ctx.atoms.ref_atom(*func_name);
        }

        {
            let fd = self.fd_ref();
            if fd.is_eval
                && fd.eval_type == EvalType::Module
                && matches!(*func_type, FuncType::Statement | FuncType::Var)
            {
                if let Some(i) = fd.find_global_var(*func_name) {
                    if fd.global_vars[i].scope_level as usize == fd.scope_level {
                        return Err(self.parse_error("invalid redefinition of global identifier in module code"));
                    }
                }
            }
        }

        let mut create_func_var = false;
        let mut lexical_func_idx = -1i32;
        if *func_type == FuncType::Var {
            let fd = self.fd_ref();
            if !fd.js_mode.contains(JsMode::STRICT)
                && *func_kind == FuncKind::Normal
                && fd.find_lexical_decl(*func_name, fd.scope_first, false) < 0
                && !{
                    let idx = fd.find_var(*func_name);
                    idx >= 0 && idx & ARGUMENT_VAR_OFFSET != 0
                }
                && !(*func_name == PredefAtom::Arguments && fd.has_arguments_binding)
            {
                create_func_var = true;
            }
            // the lexical binding exists up front so the closure can see it
            let fd = self.fd_ref();
            if fd.is_eval
                && (fd.eval_type == EvalType::Global || fd.eval_type == EvalType::Module)
                && fd.scope_level as i32 == fd.body_scope
            {
                // no lexical variable in the global scope (Annex B)
                if let Some(i) = fd.find_global_var(*func_name) {
                    if fd.global_vars[i].scope_level as usize == fd.scope_level {
                        return Err(self.parse_error("invalid redefinition of global identifier"));
                    }
                }
            } else {
                let kind = if *func_kind == FuncKind::Normal {
                    VarDeclKind::FunctionDecl
                } else {
                    VarDeclKind::NewFunctionDecl
                };
                lexical_func_idx = self.define_var(*func_name, kind)?;
            }
        }

        let id = self.new_function_def(is_expr, line_num);
        self.cur_func = id;
        {
            let fd = self.fd();
            fd.func_name = *func_name;
            *func_name = Atom::NULL; // ownership moved into the record
            fd.has_prototype =
                matches!(*func_type, FuncType::Statement | FuncType::Var | FuncType::Expr) && *func_kind == FuncKind::Normal;
            fd.has_home_object = matches!(
                *func_type,
                FuncType::Method | FuncType::Getter | FuncType::Setter | FuncType::ClassConstructor | FuncType::DerivedClassConstructor
            );
            fd.has_arguments_binding = *func_type != FuncType::Arrow;
            fd.has_this_binding = fd.has_arguments_binding;
            fd.is_derived_class_constructor = *func_type == FuncType::DerivedClassConstructor;
        }
        if *func_type == FuncType::Arrow {
            let parent = self.fd_ref().parent.expect("arrow has a parent").index();
            let (nt, sc, sa, aa) = {
                let p = &self.funcs[parent];
                (p.new_target_allowed, p.super_call_allowed, p.super_allowed, p.arguments_allowed)
            };
            let fd = self.fd();
            fd.new_target_allowed = nt;
            fd.super_call_allowed = sc;
            fd.super_allowed = sa;
            fd.arguments_allowed = aa;
        } else {
            let fd = self.fd();
            fd.new_target_allowed = true;
            fd.super_call_allowed = fd.is_derived_class_constructor;
            fd.super_allowed = fd.has_home_object;
            fd.arguments_allowed = true;
        }
        self.fd().func_kind = *func_kind;
        self.fd().func_type = *func_type;

        if matches!(*func_type, FuncType::ClassConstructor | FuncType::DerivedClassConstructor) {
            // throws unless invoked as a constructor
            self.emit_op(Op::CheckCtor);
        }
        if *func_type == FuncType::ClassConstructor {
            self.emit_class_field_init();
        }

        // parameters
        self.fd().has_simple_parameter_list = true;
        self.fd().has_parameter_expressions = false;
        let mut has_opt_arg = false;
        if *func_type == FuncType::Arrow && self.token.kind == Tok::Ident {
            // single-identifier arrow parameter
            if self.token.ident_is_reserved() {
                return Err(self.error_reserved_identifier());
            }
            self.check_arg_limit()?;
            let name = self.token.ident_atom();
            self.fd_and_atoms(|fd, atoms| fd.add_arg(atoms, name));
            self.fd().defined_arg_count = 1;
            // the identifier is consumed by the shared next_token below
        } else {
            if self.token.kind == Tok::LParen {
                // an '=' inside the list means parameter expressions
                let mut skip_bits = 0u8;
                self.skip_parens_token(Some(&mut skip_bits), false)?;
                if skip_bits & SKIP_HAS_ASSIGNMENT != 0 {
                    self.fd().has_parameter_expressions = true;
                }
                self.next_token()?;
            } else {
                self.expect(Tok::LParen)?;
            }

            if self.fd_ref().has_parameter_expressions {
                // the argument scope has no parent; its chain terminates
                // with the dedicated marker so the resolver can tell that
                // function-level variables are not visible from here
                let scope = {
                    let fd = self.fd();
                    fd.scope_first = crate::function::ARG_SCOPE_END;
                    let scope = fd.scopes.len();
                    debug_assert_eq!(scope, crate::function::ARG_SCOPE_INDEX);
                    fd.scopes.push(crate::function::Scope { parent: -1, first: crate::function::ARG_SCOPE_END });
                    fd.scope_level = scope;
                    scope
                };
                self.emit_op(Op::EnterScope);
                self.emit_u16(scope as u16);
                self.fd().last_opcode_pos = -1;
            }

            while self.token.kind != Tok::RParen {
                let mut rest = false;
                if self.token.kind == Tok::Ellipsis {
                    self.fd().has_simple_parameter_list = false;
                    rest = true;
                    self.next_token()?;
                }
                if self.token.kind == Tok::LBracket || self.token.kind == Tok::LBrace {
                    self.fd().has_simple_parameter_list = false;
                    if rest {
                        let idx = self.fd_ref().args.len() as u16;
                        self.emit_op(Op::Rest);
                        self.emit_u16(idx);
                    } else {
                        // unnamed slot for the destructured argument
                        self.check_arg_limit()?;
                        let idx = self.fd_and_atoms(|fd, atoms| fd.add_arg(atoms, Atom::NULL));
                        self.emit_op(Op::GetArg);
                        self.emit_u16(idx);
                    }
                    let pattern_tok = if self.fd_ref().has_parameter_expressions { Tok::Let } else { Tok::Var };
                    let has_ellipsis = self.pattern_has_ellipsis()?;
                    let has_initializer =
                        self.parse_destructuring_element(Some(pattern_tok), true, true, has_ellipsis, true)?;
                    if has_initializer {
                        has_opt_arg = true;
                    }
                    if !has_opt_arg {
                        self.fd().defined_arg_count += 1;
                    }
                } else if self.token.kind == Tok::Ident {
                    if self.token.ident_is_reserved() {
                        return Err(self.error_reserved_identifier());
                    }
                    let name = self.token.ident_atom();
                    if name == PredefAtom::Yield && self.fd_ref().func_kind == FuncKind::Generator {
                        return Err(self.error_reserved_identifier());
                    }
                    if self.fd_ref().has_parameter_expressions {
                        self.define_var(name, VarDeclKind::Let)?;
                    }
                    self.check_arg_limit()?;
                    let idx = self.fd_and_atoms(|fd, atoms| fd.add_arg(atoms, name));
                    self.next_token()?;
                    if rest {
                        self.emit_op(Op::Rest);
                        self.emit_u16(idx);
                        if self.fd_ref().has_parameter_expressions {
                            let scope = self.fd_ref().scope_level as u16;
                            self.emit_op(Op::Dup);
                            self.emit_op(Op::ScopePutVarInit);
                            self.emit_atom(name);
                            self.emit_u16(scope);
                        }
                        self.emit_op(Op::PutArg);
                        self.emit_u16(idx);
                        self.fd().has_simple_parameter_list = false;
                        has_opt_arg = true;
                    } else if self.token.kind == Tok::Assign {
                        self.fd().has_simple_parameter_list = false;
                        has_opt_arg = true;
                        self.next_token()?;

                        let label = self.new_label();
                        self.emit_op(Op::GetArg);
                        self.emit_u16(idx);
                        self.emit_op(Op::Dup);
                        self.emit_op(Op::Undefined);
                        self.emit_op(Op::StrictEq);
                        self.emit_goto(Op::IfFalse, label);
                        self.emit_op(Op::Drop);
                        self.parse_assign_expr()?;
                        self.set_object_name(name);
                        self.emit_op(Op::Dup);
                        self.emit_op(Op::PutArg);
                        self.emit_u16(idx);
                        self.emit_label(label);
                        let scope = self.fd_ref().scope_level as u16;
                        self.emit_op(Op::ScopePutVarInit);
                        self.emit_atom(name);
                        self.emit_u16(scope);
                    } else {
                        if !has_opt_arg {
                            self.fd().defined_arg_count += 1;
                        }
                        if self.fd_ref().has_parameter_expressions {
                            // copy the argument into the argument scope
                            let scope = self.fd_ref().scope_level as u16;
                            self.emit_op(Op::GetArg);
                            self.emit_u16(idx);
                            self.emit_op(Op::ScopePutVarInit);
                            self.emit_atom(name);
                            self.emit_u16(scope);
                        }
                    }
                } else {
                    return Err(self.parse_error("missing formal parameter"));
                }
                if rest && self.token.kind != Tok::RParen {
                    return Err(self.parse_error("expecting ')'"));
                }
                if self.token.kind == Tok::RParen {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
            let argc = self.fd_ref().args.len();
            if (*func_type == FuncType::Getter && argc != 0) || (*func_type == FuncType::Setter && argc != 1) {
                return Err(self.parse_error("invalid number of arguments for getter or setter"));
            }
        }

        if self.fd_ref().has_parameter_expressions {
            // copy the argument-scope variables into the variable scope
            // (FunctionDeclarationInstantiation); plain arguments already
            // exist there
            let scope_level = self.fd_ref().scope_level;
            let mut idx = self.fd_ref().scopes[scope_level].first;
            while idx >= 0 {
                let (name, next, scope_lv) = {
                    let vd = &self.fd_ref().vars[idx as usize];
                    (vd.name, vd.scope_next, vd.scope_level as usize)
                };
                if scope_lv != scope_level {
                    break;
                }
                if self.fd_ref().find_var(name) < 0 {
                    self.check_var_limit()?;
                    self.fd_and_atoms(|fd, atoms| fd.add_var(atoms, name));
                    let scope = self.fd_ref().scope_level as u16;
                    self.emit_op(Op::ScopeGetVar);
                    self.emit_atom(name);
                    self.emit_u16(scope);
                    self.emit_op(Op::ScopePutVar);
                    self.emit_atom(name);
                    self.emit_u16(0);
                }
                idx = next;
            }
            // the argument scope has no parent: leave it without pop_scope
            let scope = self.fd_ref().scope_level as u16;
            self.emit_op(Op::LeaveScope);
            self.emit_u16(scope);
            let fd = self.fd();
            fd.scope_level = 0;
            fd.scope_first = fd.scopes[0].first;
            fd.last_opcode_pos = -1;
        }

        self.next_token()?;

        // generators yield once the parameters are evaluated
        if func_kind.is_generator() {
            self.emit_op(Op::InitialYield);
        }

        // 'yield'/'await' are rejected while parsing defaults
        self.fd().in_function_body = true;
        self.push_scope(); // the body scope
        self.fd().body_scope = self.fd_ref().scope_level as i32;

        if self.token.kind == Tok::Arrow {
            self.next_token()?;
            if self.token.kind != Tok::LBrace {
                // expression-bodied arrow
                self.check_function_names()?;
                self.parse_assign_expr()?;
                self.emit_op(if *func_kind == FuncKind::Normal { Op::Return } else { Op::ReturnAsync });
                if !self.fd_ref().js_mode.contains(JsMode::STRIP) {
                    let end = self.last_pos;
                    let source = std::str::from_utf8(&self.input[start_ptr..end.max(start_ptr)]).unwrap_or("");
                    self.fd().source = Some(source.to_owned());
                }
                return self.finish_function_decl(*func_type, *func_kind, create_func_var, lexical_func_idx, export_flag, is_expr);
            }
        }

        self.expect(Tok::LBrace)?;
        self.parse_directives()?;

        // strict-mode function and argument name checks
        self.check_function_names()?;

        while self.token.kind != Tok::RBrace {
            self.parse_source_element()?;
        }
        if !self.fd_ref().js_mode.contains(JsMode::STRIP) {
            let source = std::str::from_utf8(&self.input[start_ptr..self.pos]).unwrap_or("");
            self.fd().source = Some(source.to_owned());
        }
        self.next_token()?; // consume the '}'

        // implicit return when the body can run off the end
        if self.is_live_code() {
            self.emit_return(false)?;
        }
        self.finish_function_decl(*func_type, *func_kind, create_func_var, lexical_func_idx, export_flag, is_expr)
    }

    /// Strict-mode name checks plus the duplicate-parameter rules.
    fn check_function_names(&self) -> ParseResult<()> {
        let fd = self.fd_ref();
        let func_name = fd.func_name;
        if fd.js_mode.contains(JsMode::STRICT) {
            if !fd.has_simple_parameter_list && fd.has_use_strict {
                return Err(self.parse_error(
                    "\"use strict\" not allowed in function with default or destructuring parameter",
                ));
            }
            if func_name == PredefAtom::Eval || func_name == PredefAtom::Arguments {
                return Err(self.parse_error("invalid function name in strict code"));
            }
            for vd in &fd.args {
                if vd.name == PredefAtom::Eval || vd.name == PredefAtom::Arguments {
                    return Err(self.parse_error("invalid argument name in strict code"));
                }
            }
        }
        if fd.js_mode.contains(JsMode::STRICT)
            || !fd.has_simple_parameter_list
            || (fd.func_type == FuncType::Method && fd.func_kind == FuncKind::Async)
            || fd.func_type == FuncType::Arrow
            || fd.func_type == FuncType::Method
        {
            for (idx, vd) in fd.args.iter().enumerate() {
                let name = vd.name;
                if name != Atom::NULL {
                    let duplicate = fd.args[..idx].iter().any(|a| a.name == name)
                        || fd.vars.iter().any(|v| v.name == name && v.scope_level == 0);
                    if duplicate {
                        return Err(self.parse_error("duplicate argument names not allowed in this context"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Ends the function: restores the parent, installs the function in the
    /// parent's constant pool and emits the binding/closure code matching
    /// the declaration shape.
    fn finish_function_decl(
        &mut self,
        func_type: FuncType,
        _func_kind: FuncKind,
        create_func_var: bool,
        lexical_func_idx: i32,
        export_flag: ExportFlag,
        is_expr: bool,
    ) -> ParseResult<Option<usize>> {
        let id = self.cur_func;
        let parent = self.fd_ref().parent.expect("nested function has a parent").index();
        self.cur_func = parent;

        let func_name = self.funcs[id].func_name;
        let idx = self.fd().cpool_add(ConstEntry::Func(FuncId(id)));
        self.funcs[id].parent_cpool_idx = idx as i32;

        if is_expr {
            // constructors are picked out of the pool by the class code
            if !matches!(func_type, FuncType::ClassConstructor | FuncType::DerivedClassConstructor) {
                self.emit_op(Op::FClosure);
                self.emit_u32(idx);
                if func_name == Atom::NULL {
                    self.emit_op(Op::SetName);
                    self.emit_u32(Atom::NULL.raw());
                }
            }
        } else if func_type == FuncType::Var {
            self.emit_op(Op::FClosure);
            self.emit_u32(idx);
            if create_func_var {
                if self.fd_ref().is_global_var {
                    // the global variable is defined at the start of the
                    // function (Annex B.3.3.4 / B.3.3.5)
                    let strict = self.fd_ref().js_mode.contains(JsMode::STRICT);
                    let i = self.fd_and_atoms(|fd, atoms| fd.add_global_var(atoms, func_name));
                    let hf = &mut self.fd().global_vars[i];
                    hf.scope_level = 0;
                    hf.force_init = strict;
                    // store directly, bypassing the lexical scope
                    self.emit_op(Op::Dup);
                    self.emit_op(Op::ScopePutVar);
                    self.emit_atom(func_name);
                    self.emit_u16(0);
                } else {
                    // bypass the lexical-scope check on purpose
                    let mut func_idx = self.fd_ref().find_var(func_name);
                    if func_idx < 0 {
                        self.check_var_limit()?;
                        func_idx = i32::from(self.fd_and_atoms(|fd, atoms| fd.add_var(atoms, func_name)));
                    }
                    let _ = func_idx;
                    self.emit_op(Op::Dup);
                    self.emit_op(Op::ScopePutVar);
                    self.emit_atom(func_name);
                    self.emit_u16(0);
                }
            }
            if lexical_func_idx >= 0 {
                // the lexical binding initializes at scope entry
                if lexical_func_idx < GLOBAL_VAR_OFFSET {
                    self.fd().vars[lexical_func_idx as usize].func_pool_idx = idx as i32;
                }
                self.emit_op(Op::Drop);
            } else {
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ScopePutVarInit);
                self.emit_atom(func_name);
                self.emit_u16(scope);
            }
        } else {
            // function statement
            if self.fd_ref().is_global_var {
                let func_var_name = if func_name == Atom::NULL { PredefAtom::SpecialDefault.atom() } else { func_name };
                let i = self.fd_and_atoms(|fd, atoms| fd.add_global_var(atoms, func_var_name));
                self.fd().global_vars[i].cpool_idx = idx as i32;
                if export_flag != ExportFlag::None {
                    let export_name =
                        if export_flag == ExportFlag::Named { func_var_name } else { PredefAtom::Default.atom() };
                    self.add_export_entry(func_var_name, export_name, ExportKind::Local)?;
                }
            } else {
                let var_idx = self.define_var(func_name, VarDeclKind::Var)?;
                // the variable is assigned at the top of the function
                if var_idx & ARGUMENT_VAR_OFFSET != 0 {
                    self.fd().args[(var_idx & !ARGUMENT_VAR_OFFSET) as usize].func_pool_idx = idx as i32;
                } else {
                    self.fd().vars[var_idx as usize].func_pool_idx = idx as i32;
                }
            }
        }
        Ok(Some(id))
    }

    // ---- modules -------------------------------------------------------

    fn add_export_entry(&mut self, local_name: Atom, export_name: Atom, kind: ExportKind) -> ParseResult<()> {
        let exists = self
            .fd_ref()
            .module
            .as_ref()
            .is_some_and(|m| m.exports.contains_key(&export_name));
        if exists {
            let name = self.ctx.atoms.get_str(export_name);
            return Err(self.parse_error(format!("duplicate exported name '{name}'")));
        }
        self.ctx.atoms.ref_atom(local_name);
        self.ctx.atoms.ref_atom(export_name);
        let module = self.fd().module.as_mut().expect("exports only parse in modules");
        module.exports.insert(export_name, ExportEntry { local_name, export_name, kind });
        Ok(())
    }

    /// `from "module"`; returns the interned module name.
    fn parse_from_clause(&mut self) -> ParseResult<Atom> {
        if !self.token_is_pseudo_keyword(PredefAtom::From) {
            return Err(self.parse_error("expecting 'from'"));
        }
        self.next_token()?;
        if self.token.kind != Tok::String {
            return Err(self.parse_error("string expected"));
        }
        let TokenData::Str { value, .. } = std::mem::replace(&mut self.token.data, TokenData::None) else {
            unreachable!()
        };
        let module_name = self.ctx.atoms.new_atom(value, crate::atoms::AtomKind::String)?;
        if let Err(e) = self.next_token() {
            self.ctx.atoms.unref_atom(module_name);
            return Err(e);
        }
        Ok(module_name)
    }

    fn add_import(&mut self, local_name: Atom, import_name: Atom) -> ParseResult<()> {
        if local_name == PredefAtom::Arguments || local_name == PredefAtom::Eval {
            return Err(self.parse_error("invalid import binding"));
        }
        if local_name != PredefAtom::Default.atom() && self.fd_ref().find_closure_var(local_name) >= 0 {
            return Err(self.parse_error("duplicate import binding"));
        }
        if self.fd_ref().closure_vars.len() >= self.ctx.limits.max_closure_vars {
            return Err(crate::error::Exception::internal("too many closure variables"));
        }
        let is_local = import_name == PredefAtom::SpecialStar;
        let entry_count = self.fd_ref().module.as_ref().map_or(0, |m| m.imports.len()) as u16;
        let var_idx = self.fd_and_atoms(|fd, atoms| {
            fd.add_closure_var(atoms, is_local, false, entry_count, local_name, true, true, VarKind::Normal)
        }) as u16;
        self.ctx.atoms.ref_atom(import_name);
        let module = self.fd().module.as_mut().expect("imports only parse in modules");
        module.imports.push(crate::function::ImportEntry { import_name, var_idx, req_module_idx: 0 });
        Ok(())
    }

    /// `import ...` statement.
    pub(crate) fn parse_import(&mut self) -> ParseResult<()> {
        self.next_token()?;
        let first_import = self.fd_ref().module.as_ref().map_or(0, |m| m.imports.len());
        let module_name;
        if self.token.kind == Tok::String {
            let TokenData::Str { value, .. } = std::mem::replace(&mut self.token.data, TokenData::None) else {
                unreachable!()
            };
            module_name = self.ctx.atoms.new_atom(value, crate::atoms::AtomKind::String)?;
            if let Err(e) = self.next_token() {
                self.ctx.atoms.unref_atom(module_name);
                return Err(e);
            }
        } else {
            if self.token.kind == Tok::Ident {
                if self.token.ident_is_reserved() {
                    return Err(self.error_reserved_identifier());
                }
                // default import
                let local_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                let r = self.next_token().and_then(|()| self.add_import(local_name, PredefAtom::Default.atom()));
                self.ctx.atoms.unref_atom(local_name);
                r?;
                if self.token.kind == Tok::Comma {
                    self.next_token()?;
                    self.parse_import_clause_tail()?;
                }
            } else {
                self.parse_import_clause_tail()?;
            }
            module_name = self.parse_from_clause()?;
        }
        let idx = self.add_req_module(module_name);
        self.ctx.atoms.unref_atom(module_name);
        {
            let module = self.fd().module.as_mut().expect("imports only parse in modules");
            for i in first_import..module.imports.len() {
                module.imports[i].req_module_idx = idx;
            }
        }
        self.expect_semi()
    }

    fn add_req_module(&mut self, module_name: Atom) -> u32 {
        let fd = &mut self.funcs[self.cur_func];
        let module = fd.module.as_mut().expect("module context");
        module.add_req_module(&mut self.ctx.atoms, module_name)
    }

    /// Namespace (`* as x`) or named (`{ ... }`) import clause.
    fn parse_import_clause_tail(&mut self) -> ParseResult<()> {
        if self.token.kind == Tok::Star {
            self.next_token()?;
            if !self.token_is_pseudo_keyword(PredefAtom::As) {
                return Err(self.parse_error("expecting 'as'"));
            }
            self.next_token()?;
            if !self.token.kind.is_ident_like() || self.token.ident_is_reserved() {
                return Err(self.parse_error("identifier expected"));
            }
            let local_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
            let r = self.next_token().and_then(|()| self.add_import(local_name, PredefAtom::SpecialStar.atom()));
            self.ctx.atoms.unref_atom(local_name);
            r?;
        } else if self.token.kind == Tok::LBrace {
            self.next_token()?;
            while self.token.kind != Tok::RBrace {
                if !self.token.kind.is_ident_like() {
                    return Err(self.parse_error("identifier expected"));
                }
                let import_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                let r = (|| -> ParseResult<()> {
                    self.next_token()?;
                    let local_name;
                    if self.token_is_pseudo_keyword(PredefAtom::As) {
                        self.next_token()?;
                        if !self.token.kind.is_ident_like() {
                            return Err(self.parse_error("identifier expected"));
                        }
                        local_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                        self.next_token()?;
                    } else {
                        local_name = self.ctx.atoms.ref_atom(import_name);
                    }
                    let r = self.add_import(local_name, import_name);
                    self.ctx.atoms.unref_atom(local_name);
                    r
                })();
                self.ctx.atoms.unref_atom(import_name);
                r?;
                if self.token.kind != Tok::Comma {
                    break;
                }
                self.next_token()?;
            }
            self.expect(Tok::RBrace)?;
        }
        Ok(())
    }

    /// `export ...` statement.
    pub(crate) fn parse_export(&mut self) -> ParseResult<()> {
        self.next_token()?;
        let tok = self.token.kind;
        if tok == Tok::Class {
            return self.parse_class(false, ExportFlag::Named);
        }
        if tok == Tok::Function
            || (self.token_is_pseudo_keyword(PredefAtom::Async) && self.peek_token(true) == PeekToken::Function)
        {
            self.parse_function_decl2(
                FuncType::Statement,
                FuncKind::Normal,
                Atom::NULL,
                self.token.start,
                self.token.line_num,
                ExportFlag::Named,
            )?;
            return Ok(());
        }
        self.next_token()?;
        match tok {
            Tok::LBrace => {
                let first_export = self.fd_ref().module.as_ref().map_or(0, |m| m.exports.len());
                while self.token.kind != Tok::RBrace {
                    if !self.token.kind.is_ident_like() {
                        return Err(self.parse_error("identifier expected"));
                    }
                    let local_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                    let r = (|| -> ParseResult<()> {
                        self.next_token()?;
                        let export_name;
                        if self.token_is_pseudo_keyword(PredefAtom::As) {
                            self.next_token()?;
                            if !self.token.kind.is_ident_like() {
                                return Err(self.parse_error("identifier expected"));
                            }
                            export_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                            self.next_token()?;
                        } else {
                            export_name = self.ctx.atoms.ref_atom(local_name);
                        }
                        let r = self.add_export_entry(local_name, export_name, ExportKind::Local);
                        self.ctx.atoms.unref_atom(export_name);
                        r
                    })();
                    self.ctx.atoms.unref_atom(local_name);
                    r?;
                    if self.token.kind != Tok::Comma {
                        break;
                    }
                    self.next_token()?;
                }
                self.expect(Tok::RBrace)?;
                if self.token_is_pseudo_keyword(PredefAtom::From) {
                    let module_name = self.parse_from_clause()?;
                    let idx = self.add_req_module(module_name);
                    self.ctx.atoms.unref_atom(module_name);
                    let module = self.fd().module.as_mut().expect("exports only parse in modules");
                    for i in first_export..module.exports.len() {
                        let (_, e) = module.exports.get_index_mut(i).expect("in range");
                        e.kind = ExportKind::Indirect { req_module_idx: idx };
                    }
                }
            }
            Tok::Star => {
                if self.token_is_pseudo_keyword(PredefAtom::As) {
                    // export * as ns from "mod"
                    self.next_token()?;
                    if !self.token.kind.is_ident_like() {
                        return Err(self.parse_error("identifier expected"));
                    }
                    let export_name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                    let r = (|| -> ParseResult<()> {
                        self.next_token()?;
                        let module_name = self.parse_from_clause()?;
                        let idx = self.add_req_module(module_name);
                        self.ctx.atoms.unref_atom(module_name);
                        self.add_export_entry(
                            PredefAtom::SpecialStar.atom(),
                            export_name,
                            ExportKind::Indirect { req_module_idx: idx },
                        )
                    })();
                    self.ctx.atoms.unref_atom(export_name);
                    r?;
                } else {
                    let module_name = self.parse_from_clause()?;
                    let idx = self.add_req_module(module_name);
                    self.ctx.atoms.unref_atom(module_name);
                    let module = self.fd().module.as_mut().expect("exports only parse in modules");
                    module.star_exports.push(crate::function::StarExportEntry { req_module_idx: idx });
                }
            }
            Tok::Default => {
                if self.token.kind == Tok::Class {
                    return self.parse_class(false, ExportFlag::Default);
                }
                if self.token.kind == Tok::Function
                    || (self.token_is_pseudo_keyword(PredefAtom::Async) && self.peek_token(true) == PeekToken::Function)
                {
                    self.parse_function_decl2(
                        FuncType::Statement,
                        FuncKind::Normal,
                        Atom::NULL,
                        self.token.start,
                        self.token.line_num,
                        ExportFlag::Default,
                    )?;
                    return Ok(());
                }
                self.parse_assign_expr()?;
                // name anonymous functions "default"
                self.set_object_name(PredefAtom::Default.atom());

                // bind the value to the hidden default-export variable
                let local_name = PredefAtom::SpecialDefault.atom();
                self.define_var(local_name, VarDeclKind::Let)?;
                self.emit_op(Op::ScopePutVarInit);
                self.emit_atom(local_name);
                self.emit_u16(0);
                self.add_export_entry(local_name, PredefAtom::Default.atom(), ExportKind::Local)?;
            }
            Tok::Var | Tok::Let | Tok::Const => return self.parse_var(true, tok, true),
            _ => return Err(self.parse_error("invalid export syntax")),
        }
        self.expect_semi()
    }

}
