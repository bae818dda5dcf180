//! Expression parsing.
//!
//! One hand-rolled function per precedence level, lowest binding at the
//! top: comma, assignment (with `yield`), conditional, nullish coalescing,
//! logical, the binary ladder, unary, and the postfix/member/call level.
//! Everything emits bytecode directly through the emitter; assignment
//! targets are recovered by inspecting the last emitted opcode
//! (`get_lvalue`) and rewritten into the matching store shape
//! (`put_lvalue`).

use crate::{
    atoms::{Atom, AtomKind, PredefAtom},
    bytecode::{Opcode as Op, ThrowCode},
    error::ParseResult,
    function::{ConstEntry, FuncKind, FuncType, JsMode},
    parser::{ParsePos, Parser, PeekToken},
    strings::JsString,
    token::{TokenData, TokenKind as Tok},
};

/// `in` is accepted at the relational level (cleared inside `for` headers).
pub(crate) const PF_IN_ACCEPTED: u8 = 1 << 0;
/// A call may follow the postfix expression.
pub(crate) const PF_POSTFIX_CALL: u8 = 1 << 1;
/// An arrow function may start here.
pub(crate) const PF_ARROW_FUNC: u8 = 1 << 2;
/// `**` may follow.
pub(crate) const PF_POW_ALLOWED: u8 = 1 << 3;
/// `**` after an unparenthesized unary operator is a syntax error.
pub(crate) const PF_POW_FORBIDDEN: u8 = 1 << 4;

/// Property classification from [`Parser::parse_property_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropType {
    Ident,
    /// Shorthand `{ x }`.
    Var,
    Get,
    Set,
    /// `*name()`.
    Star,
    /// `async name()`.
    Async,
    /// `async *name()`.
    AsyncStar,
    /// `#name` (classes only).
    PrivateIdent,
}

/// What a store through [`Parser::put_lvalue`] should leave on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PutLValue {
    /// Store and keep nothing (the common assignment statement shape).
    NoKeep,
    /// Like `NoKeep` but the caller already arranged the stack depth.
    NoKeepDepth,
    /// Keep the stored value on top.
    KeepTop,
    /// Keep the value that was under the stored one (postfix `++`).
    KeepSecond,
    /// Store, dropping the target words below the value.
    NoKeepBottom,
}

/// A recovered assignment target.
pub(crate) struct LValue {
    pub opcode: Op,
    pub scope: u16,
    pub name: Atom,
    pub label: i32,
    /// Stack words the target occupies (1 = field, 2 = element/ref, 3 =
    /// super element).
    pub depth: i32,
}

impl Parser<'_, '_> {
    /// `( expr )`.
    pub(crate) fn parse_expr_paren(&mut self) -> ParseResult<()> {
        self.expect(Tok::LParen)?;
        self.parse_expr()?;
        self.expect(Tok::RParen)
    }

    /// Inspects the last emitted opcode to recover an assignment target,
    /// removes it, and (for `keep`) re-emits the form that leaves the
    /// target plus its current value on the stack.
    pub(crate) fn get_lvalue(&mut self, keep: bool, tok: Tok) -> ParseResult<LValue> {
        let fd = self.fd_ref();
        let mut scope = 0u16;
        let mut name = Atom::NULL;
        let mut label = -1i32;
        let depth;
        let mut opcode = match fd.get_prev_opcode() {
            Some(op @ (Op::ScopeGetVar | Op::GetField | Op::ScopeGetPrivateField | Op::GetArrayEl | Op::GetSuperValue)) => op,
            _ => {
                return Err(self.invalid_lvalue_error(tok));
            }
        };
        let last = fd.last_opcode_pos as usize;
        match opcode {
            Op::ScopeGetVar => {
                name = fd.get_atom(last + 1);
                scope = fd.get_u16(last + 5);
                if (name == PredefAtom::Arguments || name == PredefAtom::Eval)
                    && fd.js_mode.contains(JsMode::STRICT)
                {
                    return Err(self.parse_error("invalid lvalue in strict mode"));
                }
                if name == PredefAtom::This || name == PredefAtom::NewTarget {
                    return Err(self.invalid_lvalue_error(tok));
                }
                depth = 2; // will generate OP_get_ref_value
            }
            Op::GetField => {
                name = fd.get_atom(last + 1);
                depth = 1;
            }
            Op::ScopeGetPrivateField => {
                name = fd.get_atom(last + 1);
                scope = fd.get_u16(last + 5);
                depth = 1;
            }
            Op::GetArrayEl => depth = 2,
            Op::GetSuperValue => depth = 3,
            _ => unreachable!(),
        }
        // remove the opcode; its atom operand's reference now belongs to us
        self.fd().truncate_last_opcode();

        if keep {
            match opcode {
                Op::ScopeGetVar => {
                    label = self.new_label();
                    self.emit_op(Op::ScopeMakeRef);
                    self.emit_atom(name);
                    self.emit_u32(label as u32);
                    self.emit_u16(scope);
                    self.fd().update_label(label, 1);
                    self.emit_op(Op::GetRefValue);
                    opcode = Op::GetRefValue;
                }
                Op::GetField => {
                    self.emit_op(Op::GetField2);
                    self.emit_atom(name);
                }
                Op::ScopeGetPrivateField => {
                    self.emit_op(Op::ScopeGetPrivateField2);
                    self.emit_atom(name);
                    self.emit_u16(scope);
                }
                Op::GetArrayEl => {
                    self.emit_op(Op::ToPropkey2);
                    self.emit_op(Op::Dup2);
                    self.emit_op(Op::GetArrayEl);
                }
                Op::GetSuperValue => {
                    self.emit_op(Op::ToPropkey);
                    self.emit_op(Op::Dup3);
                    self.emit_op(Op::GetSuperValue);
                }
                _ => unreachable!(),
            }
        } else {
            match opcode {
                Op::ScopeGetVar => {
                    label = self.new_label();
                    self.emit_op(Op::ScopeMakeRef);
                    self.emit_atom(name);
                    self.emit_u32(label as u32);
                    self.emit_u16(scope);
                    self.fd().update_label(label, 1);
                    opcode = Op::GetRefValue;
                }
                Op::GetArrayEl => self.emit_op(Op::ToPropkey2),
                Op::GetSuperValue => self.emit_op(Op::ToPropkey),
                _ => {}
            }
        }
        Ok(LValue { opcode, scope, name, label, depth })
    }

    fn invalid_lvalue_error(&self, tok: Tok) -> crate::error::Exception {
        match tok {
            Tok::For => self.parse_error("invalid for in/of left hand-side"),
            Tok::Inc | Tok::Dec => self.parse_error("invalid increment/decrement operand"),
            Tok::LBracket | Tok::LBrace => self.parse_error("invalid destructuring target"),
            _ => self.parse_error("invalid assignment left-hand side"),
        }
    }

    /// Emits the store matching a target recovered by `get_lvalue`.
    /// Consumes the name reference carried by the lvalue.
    pub(crate) fn put_lvalue(&mut self, lv: LValue, special: PutLValue, is_let: bool) {
        let LValue { opcode, scope, name, label, .. } = lv;
        match opcode {
            Op::GetField | Op::ScopeGetPrivateField => {
                // depth = 1
                match special {
                    PutLValue::NoKeep | PutLValue::NoKeepDepth => {}
                    PutLValue::KeepTop => self.emit_op(Op::Insert2),
                    PutLValue::KeepSecond => self.emit_op(Op::Perm3),
                    PutLValue::NoKeepBottom => self.emit_op(Op::Swap),
                }
            }
            Op::GetArrayEl | Op::GetRefValue => {
                // depth = 2
                if opcode == Op::GetRefValue {
                    self.ctx.atoms.unref_atom(name);
                    self.emit_label(label);
                }
                match special {
                    // a nop here is the marker the resolver's
                    // make-ref fusion looks for
                    PutLValue::NoKeep => self.emit_op(Op::Nop),
                    PutLValue::NoKeepDepth => {}
                    PutLValue::KeepTop => self.emit_op(Op::Insert3),
                    PutLValue::KeepSecond => self.emit_op(Op::Perm4),
                    PutLValue::NoKeepBottom => self.emit_op(Op::Rot3L),
                }
            }
            Op::GetSuperValue => {
                match special {
                    PutLValue::NoKeep | PutLValue::NoKeepDepth => {}
                    PutLValue::KeepTop => self.emit_op(Op::Insert4),
                    PutLValue::KeepSecond => self.emit_op(Op::Perm5),
                    PutLValue::NoKeepBottom => self.emit_op(Op::Rot4L),
                }
            }
            _ => {}
        }
        match opcode {
            Op::ScopeGetVar => {
                debug_assert!(matches!(special, PutLValue::NoKeep | PutLValue::NoKeepDepth));
                self.emit_op(if is_let { Op::ScopePutVarInit } else { Op::ScopePutVar });
                self.emit_u32(name.raw()); // transfers the name reference
                self.emit_u16(scope);
            }
            Op::GetField => {
                self.emit_op(Op::PutField);
                self.emit_u32(name.raw()); // transfers the name reference
            }
            Op::ScopeGetPrivateField => {
                self.emit_op(Op::ScopePutPrivateField);
                self.emit_u32(name.raw()); // transfers the name reference
                self.emit_u16(scope);
            }
            Op::GetArrayEl => self.emit_op(Op::PutArrayEl),
            Op::GetRefValue => self.emit_op(Op::PutRefValue),
            Op::GetSuperValue => self.emit_op(Op::PutSuperValue),
            _ => unreachable!("invalid lvalue opcode"),
        }
    }

    /// Names an anonymous function/class just assigned to `name` by
    /// patching the trailing `set_name` / `set_class_name`.
    pub(crate) fn set_object_name(&mut self, name: Atom) {
        match self.fd_ref().get_prev_opcode() {
            Some(Op::SetName) => {
                let last = self.fd_ref().last_opcode_pos as usize;
                let old = self.fd_ref().get_atom(last + 1);
                self.fd().truncate_last_opcode();
                self.ctx.atoms.unref_atom(old);
                self.emit_op(Op::SetName);
                self.emit_atom(name);
            }
            Some(Op::SetClassName) => {
                let last = self.fd_ref().last_opcode_pos as usize;
                let offset = self.fd_ref().get_u32(last + 1) as usize;
                let define_class_pos = last + 1 - offset;
                debug_assert!(matches!(
                    self.fd_ref().opcode_at(define_class_pos),
                    Op::DefineClass | Op::DefineClassComputed
                ));
                let old = self.fd_ref().get_atom(define_class_pos + 1);
                self.ctx.atoms.unref_atom(old);
                let name = self.ctx.atoms.ref_atom(name);
                self.fd().put_u32(define_class_pos + 1, name.raw());
                self.fd().last_opcode_pos = -1;
            }
            _ => {}
        }
    }

    /// Computed-name variant of [`Parser::set_object_name`].
    pub(crate) fn set_object_name_computed(&mut self) {
        match self.fd_ref().get_prev_opcode() {
            Some(Op::SetName) => {
                let last = self.fd_ref().last_opcode_pos as usize;
                let old = self.fd_ref().get_atom(last + 1);
                self.fd().truncate_last_opcode();
                self.ctx.atoms.unref_atom(old);
                self.emit_op(Op::SetNameComputed);
            }
            Some(Op::SetClassName) => {
                let last = self.fd_ref().last_opcode_pos as usize;
                let offset = self.fd_ref().get_u32(last + 1) as usize;
                let define_class_pos = last + 1 - offset;
                self.fd().set_opcode(define_class_pos, Op::DefineClassComputed);
                self.fd().last_opcode_pos = -1;
            }
            _ => {}
        }
    }

    /// Parses a property name in an object literal, class body or
    /// destructuring pattern. Returns the classification and leaves the
    /// computed key on the stack when the returned atom is `Atom::NULL`.
    ///
    /// The returned atom carries a reference the caller releases.
    pub(crate) fn parse_property_name(
        &mut self,
        allow_method: bool,
        allow_var: bool,
        allow_private: bool,
    ) -> ParseResult<(PropType, Atom)> {
        let mut prop_type = PropType::Ident;
        let mut pending_name: Option<Atom> = None;
        if allow_method {
            if self.token_is_pseudo_keyword(PredefAtom::Get) || self.token_is_pseudo_keyword(PredefAtom::Set) {
                // get x(), set x()
                let name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                self.next_token()?;
                if matches!(self.token.kind, Tok::Colon | Tok::Comma | Tok::RBrace | Tok::LParen) {
                    pending_name = Some(name);
                } else {
                    prop_type = if name == PredefAtom::Set { PropType::Set } else { PropType::Get };
                    self.ctx.atoms.unref_atom(name);
                }
            } else if self.token.kind == Tok::Star {
                self.next_token()?;
                prop_type = PropType::Star;
            } else if self.token_is_pseudo_keyword(PredefAtom::Async) && self.peek_token(true) != PeekToken::LineTerminator
            {
                let name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                self.next_token()?;
                if matches!(self.token.kind, Tok::Colon | Tok::Comma | Tok::RBrace | Tok::LParen) {
                    pending_name = Some(name);
                } else {
                    self.ctx.atoms.unref_atom(name);
                    if self.token.kind == Tok::Star {
                        self.next_token()?;
                        prop_type = PropType::AsyncStar;
                    } else {
                        prop_type = PropType::Async;
                    }
                }
            }
        }

        let mut is_non_reserved_ident = false;
        let name;
        if let Some(n) = pending_name {
            is_non_reserved_ident = true;
            name = n;
        } else if self.token.kind.is_ident_like() {
            // a shorthand binding can only be a non-reserved identifier
            is_non_reserved_ident = self.token.kind == Tok::Ident && !self.token.ident_is_reserved();
            name = self.ctx.atoms.ref_atom(self.token.ident_atom());
            self.next_token()?;
        } else if self.token.kind == Tok::String {
            let TokenData::Str { value, .. } = std::mem::replace(&mut self.token.data, TokenData::None) else {
                unreachable!()
            };
            name = self.ctx.atoms.new_atom(value, AtomKind::String)?;
            self.next_token()?;
        } else if self.token.kind == Tok::Number {
            let value = self.token.number();
            name = self.ctx.atoms.new_atom_str(&crate::numbers::number_to_string(value))?;
            self.next_token()?;
        } else if self.token.kind == Tok::LBracket {
            self.next_token()?;
            self.parse_expr()?;
            self.expect(Tok::RBracket)?;
            name = Atom::NULL;
        } else if self.token.kind == Tok::PrivateName && allow_private {
            name = self.ctx.atoms.ref_atom(self.token.ident_atom());
            self.next_token()?;
            return Ok((PropType::PrivateIdent, name));
        } else {
            return Err(self.parse_error("invalid property name"));
        }

        if is_non_reserved_ident && prop_type == PropType::Ident && allow_var {
            if !(self.token.kind == Tok::Colon || (self.token.kind == Tok::LParen && allow_method)) {
                prop_type = PropType::Var;
            }
        }
        if prop_type != PropType::Ident && prop_type != PropType::Var && self.token.kind != Tok::LParen {
            self.ctx.atoms.unref_atom(name);
            return Err(self.parse_error("invalid property name"));
        }
        Ok((prop_type, name))
    }

    /// `{ a, b: e, [k]: e, get g() {}, method() {}, ...rest }`.
    fn parse_object_literal(&mut self) -> ParseResult<()> {
        self.next_token()?;
        self.emit_op(Op::Object);
        let mut has_proto = false;
        while self.token.kind != Tok::RBrace {
            let start_ptr = self.token.start;
            let start_line = self.token.line_num;

            if self.token.kind == Tok::Ellipsis {
                self.next_token()?;
                self.parse_assign_expr()?;
                self.emit_op(Op::Null); // dummy exclude list
                self.emit_op(Op::CopyDataProperties);
                self.emit_u8(2 | (1 << 2));
                self.emit_op(Op::Drop); // pop exclude list
                self.emit_op(Op::Drop); // pop source object
            } else {
                let (prop_type, name) = self.parse_property_name(true, true, false)?;
                let result = self.parse_object_property(prop_type, name, start_ptr, start_line, &mut has_proto);
                self.ctx.atoms.unref_atom(name);
                result?;
            }
            if self.token.kind != Tok::Comma {
                break;
            }
            self.next_token()?;
        }
        self.expect(Tok::RBrace)
    }

    fn parse_object_property(
        &mut self,
        prop_type: PropType,
        name: Atom,
        start_ptr: usize,
        start_line: u32,
        has_proto: &mut bool,
    ) -> ParseResult<()> {
        if prop_type == PropType::Var {
            // shorthand for x: x
            let scope = self.fd_ref().scope_level as u16;
            self.emit_op(Op::ScopeGetVar);
            self.emit_atom(name);
            self.emit_u16(scope);
            self.emit_op(Op::DefineField);
            self.emit_atom(name);
        } else if self.token.kind == Tok::LParen {
            let is_getset = matches!(prop_type, PropType::Get | PropType::Set);
            let (func_type, func_kind) = if is_getset {
                (if prop_type == PropType::Get { FuncType::Getter } else { FuncType::Setter }, FuncKind::Normal)
            } else {
                let kind = match prop_type {
                    PropType::Star => FuncKind::Generator,
                    PropType::Async => FuncKind::Async,
                    PropType::AsyncStar => FuncKind::AsyncGenerator,
                    _ => FuncKind::Normal,
                };
                (FuncType::Method, kind)
            };
            self.parse_function_decl(func_type, func_kind, Atom::NULL, start_ptr, start_line)?;
            if name == Atom::NULL {
                self.emit_op(Op::DefineMethodComputed);
            } else {
                self.emit_op(Op::DefineMethod);
                self.emit_atom(name);
            }
            let op_flags = match prop_type {
                PropType::Get => crate::bytecode::DEFINE_METHOD_GETTER,
                PropType::Set => crate::bytecode::DEFINE_METHOD_SETTER,
                _ => crate::bytecode::DEFINE_METHOD_METHOD,
            };
            self.emit_u8(op_flags | crate::bytecode::DEFINE_METHOD_ENUMERABLE);
        } else {
            self.expect(Tok::Colon)?;
            self.parse_assign_expr()?;
            if name == Atom::NULL {
                self.set_object_name_computed();
                self.emit_op(Op::DefineArrayEl);
                self.emit_op(Op::Drop);
            } else if name == PredefAtom::Proto {
                if *has_proto {
                    return Err(self.parse_error("duplicate __proto__ property name"));
                }
                self.emit_op(Op::SetProto);
                *has_proto = true;
            } else {
                self.set_object_name(name);
                self.emit_op(Op::DefineField);
                self.emit_atom(name);
            }
        }
        Ok(())
    }

    /// `[a, , b, ...rest]`.
    fn parse_array_literal(&mut self) -> ParseResult<()> {
        self.next_token()?;
        // small regular arrays are created on the stack
        let mut idx: u32 = 0;
        while self.token.kind != Tok::RBracket && idx < 32 {
            if self.token.kind == Tok::Comma || self.token.kind == Tok::Ellipsis {
                break;
            }
            self.parse_assign_expr()?;
            idx += 1;
            if self.token.kind == Tok::Comma {
                self.next_token()?;
            } else if self.token.kind != Tok::RBracket {
                return self.expect(Tok::RBracket);
            }
        }
        self.emit_op(Op::ArrayFrom);
        self.emit_u16(idx as u16);

        // larger arrays and holes use explicit indices
        let mut need_length = false;
        while self.token.kind != Tok::RBracket && idx < 0x7fff_ffff {
            if self.token.kind == Tok::Ellipsis {
                break;
            }
            need_length = true;
            if self.token.kind != Tok::Comma {
                self.parse_assign_expr()?;
                self.emit_op(Op::DefineField);
                self.emit_u32(Atom::from_u32(idx).expect("array index exceeds the atom tag range").raw());
                need_length = false;
            }
            idx += 1;
            if self.token.kind == Tok::Comma {
                self.next_token()?;
            }
        }
        if self.token.kind == Tok::RBracket {
            if need_length {
                // length is not configurable, define_field cannot set it
                self.emit_op(Op::Dup);
                self.emit_op(Op::PushI32);
                self.emit_u32(idx);
                self.emit_op(Op::PutField);
                self.emit_atom(PredefAtom::Length.atom());
            }
            return self.expect(Tok::RBracket);
        }

        // huge arrays and spread elements keep a dynamic index on the stack
        self.emit_op(Op::PushI32);
        self.emit_u32(idx);
        while self.token.kind != Tok::RBracket {
            if self.token.kind == Tok::Ellipsis {
                self.next_token()?;
                self.parse_assign_expr()?;
                self.emit_op(Op::Append);
            } else {
                need_length = true;
                if self.token.kind != Tok::Comma {
                    self.parse_assign_expr()?;
                    self.emit_op(Op::DefineArrayEl);
                    need_length = false;
                }
                self.emit_op(Op::Inc);
            }
            if self.token.kind != Tok::Comma {
                break;
            }
            self.next_token()?;
        }
        if need_length {
            self.emit_op(Op::Dup1); // array length - array array length
            self.emit_op(Op::PutField);
            self.emit_atom(PredefAtom::Length.atom());
        } else {
            self.emit_op(Op::Drop); // array length - array
        }
        self.expect(Tok::RBracket)
    }

    /// True when the scope chain from `scope_level` outward contains a
    /// `with` statement.
    fn has_with_scope(&self, mut scope_level: usize) -> bool {
        let mut fd = Some(self.cur_func);
        while let Some(f) = fd {
            let func = &self.funcs[f];
            let mut scope_idx = func.scopes[scope_level].first;
            while scope_idx >= 0 {
                let vd = &func.vars[scope_idx as usize];
                if vd.name == PredefAtom::SpecialWith {
                    return true;
                }
                scope_idx = vd.scope_next;
            }
            scope_level = func.parent_scope_level as usize;
            fd = func.parent.map(crate::function::FuncId::index);
        }
        false
    }

    /// Short-circuits an optional chain link: if the value on top is
    /// `undefined` or `null`, drops the pending words and jumps to the
    /// chain's single exit label with `undefined`.
    fn optional_chain_test(&mut self, optional_chaining_label: &mut i32, drop_count: i32) {
        if *optional_chaining_label < 0 {
            *optional_chaining_label = self.new_label();
        }
        self.emit_op(Op::Dup);
        self.emit_op(Op::IsUndefinedOrNull);
        let label_next = self.emit_goto(Op::IfFalse, -1);
        for _ in 0..drop_count {
            self.emit_op(Op::Drop);
        }
        self.emit_op(Op::Undefined);
        self.emit_goto(Op::Goto, *optional_chaining_label);
        self.emit_label(label_next);
    }

    /// Template literal.
    ///
    /// For tagged templates (`call` true), builds the frozen template
    /// object constant (cooked + raw strings), emits it first and leaves
    /// each substitution value on the stack; returns the argument count.
    /// Untagged templates compile into `"part0".concat(v1, "part1", ...)`.
    pub(crate) fn parse_template(&mut self, call: bool) -> ParseResult<u16> {
        let mut cooked_strs: Vec<Option<JsString>> = Vec::new();
        let mut raw_strs: Vec<JsString> = Vec::new();
        let mut template_cpool_idx = 0;
        if call {
            // the template object is filled in as parts arrive
            template_cpool_idx =
                self.fd().cpool_add(ConstEntry::TemplateObject { cooked: Vec::new(), raw: Vec::new() });
            self.emit_op(Op::PushConst);
            self.emit_u32(template_cpool_idx);
        }

        let mut depth: u16 = 0;
        while self.token.kind == Tok::Template {
            let part_start = self.token.start + 1;
            let sep = match &self.token.data {
                TokenData::Str { sep, .. } => *sep,
                _ => unreachable!(),
            };
            if call {
                let TokenData::Str { value, .. } = &self.token.data else { unreachable!() };
                raw_strs.push(value.clone());
                // cook the raw text; invalid escapes yield an undefined
                // cooked entry instead of an error
                let cooked = self.scan_string_literal(b'`', false, part_start).ok().map(|(v, _, _)| v);
                cooked_strs.push(cooked);
            } else {
                let (cooked, _, _) = self.scan_string_literal(b'`', true, part_start)?;
                if !cooked.is_empty() || depth == 0 {
                    let at_start = depth == 0;
                    self.emit_push_const_str(cooked, true)?;
                    if at_start {
                        if sep == b'`' {
                            // single-part template: the string is the value
                            return self.next_token().map(|()| 0);
                        }
                        self.emit_op(Op::GetField2);
                        self.emit_atom(PredefAtom::Concat.atom());
                    }
                    depth += 1;
                }
            }
            if sep == b'`' {
                // template ends here
                if call {
                    self.fd().cpool[template_cpool_idx as usize] =
                        ConstEntry::TemplateObject { cooked: cooked_strs, raw: raw_strs };
                    self.next_token()?;
                    return Ok(depth + 1);
                }
                self.emit_op(Op::CallMethod);
                self.emit_u16(depth - 1);
                self.next_token()?;
                return Ok(0);
            }
            self.next_token()?;
            self.parse_expr()?;
            depth += 1;
            if self.token.kind != Tok::RBrace {
                return Err(self.parse_error("expected '}' after template expression"));
            }
            // resume template scanning after the substitution
            self.token.free(&mut self.ctx.atoms);
            self.got_lf = false;
            self.last_line_num = self.token.line_num;
            self.parse_template_part()?;
        }
        Err(self.parse_error("invalid template literal"))
    }

    /// Primary expression plus the member/call/optional-chain tail.
    pub(crate) fn parse_postfix_expr(&mut self, parse_flags: u8) -> ParseResult<()> {
        #[derive(PartialEq, Clone, Copy)]
        enum CallType {
            Normal,
            New,
            SuperCtor,
            Template,
        }
        let mut call_type = CallType::Normal;
        let mut accept_lparen = parse_flags & PF_POSTFIX_CALL != 0;

        match self.token.kind {
            Tok::Number => {
                let v = self.token.number();
                self.emit_number(v);
                self.next_token()?;
            }
            Tok::Template => {
                self.parse_template(false)?;
            }
            Tok::String => {
                let TokenData::Str { value, .. } = std::mem::replace(&mut self.token.data, TokenData::None) else {
                    unreachable!()
                };
                self.emit_push_const_str(value, true)?;
                self.next_token()?;
            }
            Tok::Slash | Tok::DivAssign => {
                // the previous bytes belong to the literal: rewind and
                // scan it as a regexp
                let tok_len = if self.token.kind == Tok::DivAssign { 2 } else { 1 };
                self.pos -= tok_len;
                self.parse_regexp()?;
                let TokenData::Regexp { body, flags } = std::mem::replace(&mut self.token.data, TokenData::None)
                else {
                    unreachable!()
                };
                // compilation is the interpreter's concern: the literal is
                // carried bit-faithfully through the constant pool
                let idx = self.fd().cpool_add(ConstEntry::Regexp { body, flags });
                self.emit_op(Op::PushConst);
                self.emit_u32(idx);
                self.emit_op(Op::Regexp);
                self.next_token()?;
            }
            Tok::LParen => {
                if parse_flags & PF_ARROW_FUNC != 0 && self.skip_parens_token(None, true)? == Tok::Arrow {
                    self.parse_function_decl(
                        FuncType::Arrow,
                        FuncKind::Normal,
                        Atom::NULL,
                        self.token.start,
                        self.token.line_num,
                    )?;
                } else {
                    self.parse_expr_paren()?;
                }
            }
            Tok::Function => {
                self.parse_function_decl(
                    FuncType::Expr,
                    FuncKind::Normal,
                    Atom::NULL,
                    self.token.start,
                    self.token.line_num,
                )?;
            }
            Tok::Class => {
                self.parse_class(true, crate::parser::stmt::ExportFlag::None)?;
            }
            Tok::Null => {
                self.next_token()?;
                self.emit_op(Op::Null);
            }
            Tok::This => {
                self.next_token()?;
                self.emit_op(Op::ScopeGetVar);
                self.emit_atom(PredefAtom::This.atom());
                self.emit_u16(0);
            }
            Tok::False => {
                self.next_token()?;
                self.emit_op(Op::PushFalse);
            }
            Tok::True => {
                self.next_token()?;
                self.emit_op(Op::PushTrue);
            }
            Tok::Ident => {
                if self.token.ident_is_reserved() {
                    return Err(self.error_reserved_identifier());
                }
                if parse_flags & PF_ARROW_FUNC != 0 && self.peek_token(true) == PeekToken::Arrow {
                    self.parse_function_decl(
                        FuncType::Arrow,
                        FuncKind::Normal,
                        Atom::NULL,
                        self.token.start,
                        self.token.line_num,
                    )?;
                } else if self.token_is_pseudo_keyword(PredefAtom::Async)
                    && self.peek_token(true) != PeekToken::LineTerminator
                {
                    let source_ptr = self.token.start;
                    let source_line = self.token.line_num;
                    self.next_token()?;
                    if self.token.kind == Tok::Function {
                        self.parse_function_decl(FuncType::Expr, FuncKind::Async, Atom::NULL, source_ptr, source_line)?;
                    } else if parse_flags & PF_ARROW_FUNC != 0
                        && ((self.token.kind == Tok::LParen && self.skip_parens_token(None, true)? == Tok::Arrow)
                            || (self.token.kind == Tok::Ident
                                && !self.token.ident_is_reserved()
                                && self.peek_token(true) == PeekToken::Arrow))
                    {
                        self.parse_function_decl(FuncType::Arrow, FuncKind::Async, Atom::NULL, source_ptr, source_line)?;
                    } else {
                        // plain use of the identifier `async`
                        let scope = self.fd_ref().scope_level as u16;
                        self.emit_op(Op::ScopeGetVar);
                        self.emit_atom(PredefAtom::Async.atom());
                        self.emit_u16(scope);
                    }
                } else {
                    if self.token.ident_atom() == PredefAtom::Arguments && !self.fd_ref().arguments_allowed {
                        return Err(self.parse_error("'arguments' identifier is not allowed in class field initializer"));
                    }
                    let name = self.ctx.atoms.ref_atom(self.token.ident_atom());
                    self.next_token()?; // update the line number before emitting
                    let scope = self.fd_ref().scope_level as u16;
                    self.emit_op(Op::ScopeGetVar);
                    self.emit_u32(name.raw()); // reference transfers to the bytecode
                    self.emit_u16(scope);
                }
            }
            Tok::LBrace | Tok::LBracket => {
                let mut skip_bits = 0u8;
                if self.skip_parens_token(Some(&mut skip_bits), false)? == Tok::Assign {
                    self.parse_destructuring_element(
                        None,
                        false,
                        false,
                        skip_bits & crate::parser::SKIP_HAS_ELLIPSIS != 0,
                        true,
                    )?;
                } else if self.token.kind == Tok::LBrace {
                    self.parse_object_literal()?;
                } else {
                    self.parse_array_literal()?;
                }
            }
            Tok::New => {
                self.next_token()?;
                if self.token.kind == Tok::Dot {
                    self.next_token()?;
                    if !self.token_is_pseudo_keyword(PredefAtom::Target) {
                        return Err(self.parse_error("expecting target"));
                    }
                    if !self.fd_ref().new_target_allowed {
                        return Err(self.parse_error("new.target only allowed within functions"));
                    }
                    self.next_token()?;
                    self.emit_op(Op::ScopeGetVar);
                    self.emit_atom(PredefAtom::NewTarget.atom());
                    self.emit_u16(0);
                } else {
                    self.parse_postfix_expr(0)?;
                    accept_lparen = true;
                    if self.token.kind != Tok::LParen {
                        // new with no argument list
                        self.emit_op(Op::Dup);
                        self.emit_op(Op::CallConstructor);
                        self.emit_u16(0);
                    } else {
                        call_type = CallType::New;
                    }
                }
            }
            Tok::Super => {
                self.next_token()?;
                if self.token.kind == Tok::LParen {
                    if !self.fd_ref().super_call_allowed {
                        return Err(self.parse_error("super() is only valid in a derived class constructor"));
                    }
                    call_type = CallType::SuperCtor;
                } else if self.token.kind == Tok::Dot || self.token.kind == Tok::LBracket {
                    if !self.fd_ref().super_allowed {
                        return Err(self.parse_error("'super' is only valid in a method"));
                    }
                    self.emit_op(Op::ScopeGetVar);
                    self.emit_atom(PredefAtom::This.atom());
                    self.emit_u16(0);
                    self.emit_op(Op::ScopeGetVar);
                    self.emit_atom(PredefAtom::HomeObject.atom());
                    self.emit_u16(0);
                    self.emit_op(Op::GetSuper);
                } else {
                    return Err(self.parse_error("invalid use of 'super'"));
                }
            }
            Tok::Import => {
                self.next_token()?;
                if self.token.kind == Tok::Dot {
                    self.next_token()?;
                    if !self.token_is_pseudo_keyword(PredefAtom::Meta) {
                        return Err(self.parse_error("meta expected"));
                    }
                    if !self.is_module {
                        return Err(self.parse_error("import.meta only valid in module code"));
                    }
                    self.next_token()?;
                    self.emit_op(Op::SpecialObject);
                    self.emit_u8(crate::bytecode::SpecialObject::ImportMeta as u8);
                } else {
                    if !accept_lparen {
                        return Err(self.parse_error("invalid use of 'import()'"));
                    }
                    self.expect(Tok::LParen)?;
                    self.parse_assign_expr()?;
                    self.expect(Tok::RParen)?;
                    self.emit_op(Op::Import);
                }
            }
            _ => {
                return Err(self.parse_error("unexpected token in expression"));
            }
        }

        let mut optional_chaining_label = -1i32;
        loop {
            let mut has_optional_chain = false;
            enum Tail {
                Call,
                ArrayAccess,
                Property,
                Template,
                None,
            }
            let tail = if self.token.kind == Tok::QuestionDot {
                self.next_token()?;
                has_optional_chain = true;
                if self.token.kind == Tok::LParen && accept_lparen {
                    Tail::Call
                } else if self.token.kind == Tok::LBracket {
                    Tail::ArrayAccess
                } else {
                    Tail::Property
                }
            } else if self.token.kind == Tok::Template && call_type == CallType::Normal {
                if optional_chaining_label >= 0 {
                    return Err(self.parse_error("template literal cannot appear in an optional chain"));
                }
                call_type = CallType::Template;
                Tail::Template
            } else if self.token.kind == Tok::LParen && accept_lparen {
                Tail::Call
            } else if self.token.kind == Tok::Dot {
                self.next_token()?;
                Tail::Property
            } else if self.token.kind == Tok::LBracket {
                Tail::ArrayAccess
            } else {
                Tail::None
            };

            match tail {
                Tail::Call | Tail::Template => {
                    if matches!(tail, Tail::Call) {
                        self.next_token()?;
                    }
                    // recover the callee shape from the last opcode so
                    // method calls keep their receiver
                    let mut opcode = None;
                    let mut drop_count = 1;
                    if call_type == CallType::Normal || call_type == CallType::Template {
                        let prev = self.fd_ref().get_prev_opcode();
                        let last = self.fd_ref().last_opcode_pos;
                        match prev {
                            Some(Op::GetField) => {
                                self.fd().set_opcode(last as usize, Op::GetField2);
                                opcode = Some(Op::GetField);
                                drop_count = 2;
                            }
                            Some(Op::ScopeGetPrivateField) => {
                                self.fd().set_opcode(last as usize, Op::ScopeGetPrivateField2);
                                opcode = Some(Op::ScopeGetPrivateField);
                                drop_count = 2;
                            }
                            Some(Op::GetArrayEl) => {
                                self.fd().set_opcode(last as usize, Op::GetArrayEl2);
                                opcode = Some(Op::GetArrayEl);
                                drop_count = 2;
                            }
                            Some(Op::ScopeGetVar) => {
                                let name = self.fd_ref().get_atom(last as usize + 1);
                                let scope = self.fd_ref().get_u16(last as usize + 5);
                                if name == PredefAtom::Eval && call_type == CallType::Normal && !has_optional_chain {
                                    opcode = Some(Op::Eval);
                                } else if self.has_with_scope(scope as usize) {
                                    // inside `with`, a call may resolve to a
                                    // method of the context object
                                    self.fd().set_opcode(last as usize, Op::ScopeGetRef);
                                    opcode = Some(Op::ScopeGetRef);
                                }
                                drop_count = 1;
                            }
                            Some(Op::GetSuperValue) => {
                                self.fd().set_opcode(last as usize, Op::GetArrayEl);
                                opcode = Some(Op::GetArrayEl);
                                drop_count = 2;
                            }
                            _ => {}
                        }
                        if has_optional_chain {
                            self.optional_chain_test(&mut optional_chaining_label, drop_count);
                        }
                    }

                    if call_type == CallType::SuperCtor {
                        self.emit_op(Op::ScopeGetVar);
                        self.emit_atom(PredefAtom::ThisActiveFunc.atom());
                        self.emit_u16(0);
                        self.emit_op(Op::GetSuper);
                        self.emit_op(Op::ScopeGetVar);
                        self.emit_atom(PredefAtom::NewTarget.atom());
                        self.emit_u16(0);
                    } else if call_type == CallType::New {
                        self.emit_op(Op::Dup); // new.target = the function
                    }

                    let arg_count;
                    if call_type == CallType::Template {
                        arg_count = self.parse_template(true)?;
                        self.emit_call(opcode, call_type == CallType::SuperCtor, call_type == CallType::New, arg_count)?;
                    } else {
                        let mut count: u32 = 0;
                        while self.token.kind != Tok::RParen {
                            if count >= 65535 {
                                return Err(self.parse_error("Too many call arguments"));
                            }
                            if self.token.kind == Tok::Ellipsis {
                                break;
                            }
                            self.parse_assign_expr()?;
                            count += 1;
                            if self.token.kind == Tok::RParen {
                                break;
                            }
                            self.expect(Tok::Comma)?;
                        }
                        if self.token.kind == Tok::Ellipsis {
                            self.emit_spread_call(opcode, call_type == CallType::SuperCtor, call_type == CallType::New, count)?;
                        } else {
                            self.next_token()?;
                            self.emit_call(opcode, call_type == CallType::SuperCtor, call_type == CallType::New, count as u16)?;
                        }
                    }
                    call_type = CallType::Normal;
                }
                Tail::Property => {
                    if self.token.kind == Tok::PrivateName {
                        if self.fd_ref().get_prev_opcode() == Some(Op::GetSuper) {
                            return Err(self.parse_error("private class field forbidden after super"));
                        }
                        if has_optional_chain {
                            self.optional_chain_test(&mut optional_chaining_label, 1);
                        }
                        let scope = self.fd_ref().scope_level as u16;
                        let atom = self.token.ident_atom();
                        self.emit_op(Op::ScopeGetPrivateField);
                        self.emit_atom(atom);
                        self.emit_u16(scope);
                    } else {
                        if !self.token.kind.is_ident_like() {
                            return Err(self.parse_error("expecting field name"));
                        }
                        if self.fd_ref().get_prev_opcode() == Some(Op::GetSuper) {
                            let name = self.ctx.atoms.to_js_string(self.token.ident_atom());
                            self.emit_push_const_str(name, true)?;
                            self.emit_op(Op::GetSuperValue);
                        } else {
                            if has_optional_chain {
                                self.optional_chain_test(&mut optional_chaining_label, 1);
                            }
                            let atom = self.token.ident_atom();
                            self.emit_op(Op::GetField);
                            self.emit_atom(atom);
                        }
                    }
                    self.next_token()?;
                }
                Tail::ArrayAccess => {
                    let prev_op = self.fd_ref().get_prev_opcode();
                    if has_optional_chain {
                        self.optional_chain_test(&mut optional_chaining_label, 1);
                    }
                    self.next_token()?;
                    self.parse_expr()?;
                    self.expect(Tok::RBracket)?;
                    if prev_op == Some(Op::GetSuper) {
                        self.emit_op(Op::GetSuperValue);
                    } else {
                        self.emit_op(Op::GetArrayEl);
                    }
                }
                Tail::None => break,
            }
        }
        if optional_chaining_label >= 0 {
            self.emit_label(optional_chaining_label);
        }
        Ok(())
    }

    /// Emits the call opcode matching the callee shape.
    fn emit_call(&mut self, opcode: Option<Op>, is_super_ctor: bool, is_new: bool, arg_count: u16) -> ParseResult<()> {
        match opcode {
            Some(Op::GetField | Op::ScopeGetPrivateField | Op::GetArrayEl | Op::ScopeGetRef) => {
                self.emit_op(Op::CallMethod);
                self.emit_u16(arg_count);
            }
            Some(Op::Eval) => {
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::Eval);
                self.emit_u16(arg_count);
                self.emit_u16(scope);
                self.fd().has_eval_call = true;
            }
            _ => {
                if is_super_ctor {
                    self.emit_op(Op::CallConstructor);
                    self.emit_u16(arg_count);
                    self.emit_super_ctor_epilogue()?;
                } else if is_new {
                    self.emit_op(Op::CallConstructor);
                    self.emit_u16(arg_count);
                } else {
                    self.emit_op(Op::Call);
                    self.emit_u16(arg_count);
                }
            }
        }
        Ok(())
    }

    /// Emits the spread-argument call: the remaining arguments collect into
    /// an array that `apply` consumes.
    fn emit_spread_call(&mut self, opcode: Option<Op>, is_super_ctor: bool, is_new: bool, arg_count: u32) -> ParseResult<()> {
        self.emit_op(Op::ArrayFrom);
        self.emit_u16(arg_count as u16);
        self.emit_op(Op::PushI32);
        self.emit_u32(arg_count);

        // on stack: array index
        while self.token.kind != Tok::RParen {
            if self.token.kind == Tok::Ellipsis {
                self.next_token()?;
                self.parse_assign_expr()?;
                self.emit_op(Op::Append);
            } else {
                self.parse_assign_expr()?;
                self.emit_op(Op::DefineArrayEl);
                self.emit_op(Op::Inc);
            }
            if self.token.kind == Tok::RParen {
                break;
            }
            self.expect(Tok::Comma)?;
        }
        self.next_token()?;
        self.emit_op(Op::Drop); // drop the index

        match opcode {
            Some(Op::GetField | Op::ScopeGetPrivateField | Op::GetArrayEl | Op::ScopeGetRef) => {
                // obj func array -> func obj array
                self.emit_op(Op::Perm3);
                self.emit_op(Op::Apply);
                self.emit_u16(u16::from(is_new));
            }
            Some(Op::Eval) => {
                let scope = self.fd_ref().scope_level as u16;
                self.emit_op(Op::ApplyEval);
                self.emit_u16(scope);
                self.fd().has_eval_call = true;
            }
            _ => {
                if is_super_ctor {
                    self.emit_op(Op::Apply);
                    self.emit_u16(1);
                    self.emit_super_ctor_epilogue()?;
                } else if is_new {
                    self.emit_op(Op::Perm3);
                    self.emit_op(Op::Apply);
                    self.emit_u16(1);
                } else {
                    // func array -> func undefined array
                    self.emit_op(Op::Undefined);
                    self.emit_op(Op::Swap);
                    self.emit_op(Op::Apply);
                    self.emit_u16(0);
                }
            }
        }
        Ok(())
    }

    /// After `super(...)`: bind `this` (a second call throws through the
    /// `put_loc_check_init` the resolver emits) and run field initializers.
    fn emit_super_ctor_epilogue(&mut self) -> ParseResult<()> {
        self.emit_op(Op::Dup);
        self.emit_op(Op::ScopePutVarInit);
        self.emit_atom(PredefAtom::This.atom());
        self.emit_u16(0);
        self.emit_class_field_init();
        Ok(())
    }

    /// `delete expr`.
    fn parse_delete(&mut self) -> ParseResult<()> {
        self.next_token()?;
        self.parse_unary(PF_POW_FORBIDDEN)?;
        let prev = self.fd_ref().get_prev_opcode();
        let last = self.fd_ref().last_opcode_pos;
        match prev {
            Some(Op::GetField) => {
                let name = self.fd_ref().get_atom(last as usize + 1);
                self.fd().truncate_last_opcode();
                let str = self.ctx.atoms.to_js_string(name);
                self.ctx.atoms.unref_atom(name);
                self.emit_push_const_str(str, true)?;
                self.emit_op(Op::Delete);
            }
            Some(Op::GetArrayEl) => {
                self.fd().truncate_last_opcode();
                self.emit_op(Op::Delete);
            }
            Some(Op::ScopeGetVar) => {
                let name = self.fd_ref().get_atom(last as usize + 1);
                // 'delete this' is not a reference
                if name == PredefAtom::This || name == PredefAtom::NewTarget {
                    self.emit_op(Op::Drop);
                    self.emit_op(Op::PushTrue);
                } else if self.fd_ref().js_mode.contains(JsMode::STRICT) {
                    return Err(self.parse_error("cannot delete a direct reference in strict mode"));
                } else {
                    self.fd().set_opcode(last as usize, Op::ScopeDeleteVar);
                }
            }
            Some(Op::ScopeGetPrivateField) => {
                return Err(self.parse_error("cannot delete a private class field"));
            }
            Some(Op::GetSuperValue) => {
                self.emit_op(Op::ThrowError);
                self.emit_atom(Atom::NULL);
                self.emit_u8(ThrowCode::DeleteSuper as u8);
            }
            _ => {
                self.emit_op(Op::Drop);
                self.emit_op(Op::PushTrue);
            }
        }
        Ok(())
    }

    /// Unary level: prefix operators, `typeof`/`void`/`delete`, `await`,
    /// increments, and the `**` restriction.
    pub(crate) fn parse_unary(&mut self, mut parse_flags: u8) -> ParseResult<()> {
        self.enter_nesting()?;
        let result = self.parse_unary_inner(&mut parse_flags);
        self.leave_nesting();
        result?;
        if parse_flags & (PF_POW_ALLOWED | PF_POW_FORBIDDEN) != 0 && self.token.kind == Tok::Pow {
            // ES7 makes -2**2 a syntax error rather than guessing
            if parse_flags & PF_POW_FORBIDDEN != 0 {
                return Err(self.parse_error("unparenthesized unary expression can't appear on the left-hand side of '**'"));
            }
            self.next_token()?;
            self.parse_unary(PF_POW_ALLOWED)?;
            self.emit_op(Op::Pow);
        }
        Ok(())
    }

    fn parse_unary_inner(&mut self, parse_flags: &mut u8) -> ParseResult<()> {
        match self.token.kind {
            Tok::Plus | Tok::Minus | Tok::Not | Tok::BitNot | Tok::Void => {
                let op = self.token.kind;
                self.next_token()?;
                self.parse_unary(PF_POW_FORBIDDEN)?;
                match op {
                    Tok::Minus => {
                        // fold the negation into an integer immediate
                        let folded = if self.fd_ref().get_prev_opcode() == Some(Op::PushI32) {
                            let last = self.fd_ref().last_opcode_pos as usize;
                            let v = self.fd_ref().get_u32(last + 1) as i32;
                            if v != 0 && v != i32::MIN {
                                self.fd().put_u32(last + 1, (-v) as u32);
                                true
                            } else {
                                false
                            }
                        } else {
                            false
                        };
                        if !folded {
                            self.emit_op(Op::Neg);
                        }
                    }
                    Tok::Plus => self.emit_op(Op::Plus),
                    Tok::Not => self.emit_op(Op::LNot),
                    Tok::BitNot => self.emit_op(Op::Not),
                    Tok::Void => {
                        self.emit_op(Op::Drop);
                        self.emit_op(Op::Undefined);
                    }
                    _ => unreachable!(),
                }
                *parse_flags = 0;
            }
            Tok::Dec | Tok::Inc => {
                let op = self.token.kind;
                self.next_token()?;
                self.parse_unary(0)?;
                let lv = self.get_lvalue(true, op)?;
                self.emit_op(if op == Tok::Dec { Op::Dec } else { Op::Inc });
                self.put_lvalue(lv, PutLValue::KeepTop, false);
            }
            Tok::Typeof => {
                self.next_token()?;
                self.parse_unary(PF_POW_FORBIDDEN)?;
                // a missing binding must not throw under typeof
                if self.fd_ref().get_prev_opcode() == Some(Op::ScopeGetVar) {
                    let last = self.fd_ref().last_opcode_pos as usize;
                    self.fd().set_opcode(last, Op::ScopeGetVarUndef);
                }
                self.emit_op(Op::TypeOf);
                *parse_flags = 0;
            }
            Tok::Delete => {
                self.parse_delete()?;
                *parse_flags = 0;
            }
            Tok::Await => {
                if !self.fd_ref().func_kind.is_async() {
                    return Err(self.parse_error("unexpected 'await' keyword"));
                }
                if !self.fd_ref().in_function_body {
                    return Err(self.parse_error("await in default expression"));
                }
                self.next_token()?;
                self.parse_unary(PF_POW_FORBIDDEN)?;
                self.emit_op(Op::Await);
                *parse_flags = 0;
            }
            _ => {
                self.parse_postfix_expr((*parse_flags & PF_ARROW_FUNC) | PF_POSTFIX_CALL)?;
                if !self.got_lf && (self.token.kind == Tok::Dec || self.token.kind == Tok::Inc) {
                    let op = self.token.kind;
                    let lv = self.get_lvalue(true, op)?;
                    self.emit_op(if op == Tok::Dec { Op::PostDec } else { Op::PostInc });
                    self.put_lvalue(lv, PutLValue::KeepSecond, false);
                    self.next_token()?;
                }
            }
        }
        Ok(())
    }

    /// Binary ladder, levels 1 (multiplicative) through 8 (bitwise or).
    fn parse_expr_binary(&mut self, level: u8, parse_flags: u8) -> ParseResult<()> {
        if level == 0 {
            return self.parse_unary((parse_flags & PF_ARROW_FUNC) | PF_POW_ALLOWED);
        }
        self.parse_expr_binary(level - 1, parse_flags)?;
        loop {
            let opcode = match (level, self.token.kind) {
                (1, Tok::Star) => Op::Mul,
                (1, Tok::Slash) => Op::Div,
                (1, Tok::Percent) => {
                    if self.fd_ref().js_mode.contains(JsMode::MATH) {
                        Op::MathMod
                    } else {
                        Op::Mod
                    }
                }
                (2, Tok::Plus) => Op::Add,
                (2, Tok::Minus) => Op::Sub,
                (3, Tok::Shl) => Op::Shl,
                (3, Tok::Sar) => Op::Sar,
                (3, Tok::Shr) => Op::Shr,
                (4, Tok::Lt) => Op::Lt,
                (4, Tok::Gt) => Op::Gt,
                (4, Tok::Lte) => Op::Lte,
                (4, Tok::Gte) => Op::Gte,
                (4, Tok::Instanceof) => Op::InstanceOf,
                (4, Tok::In) if parse_flags & PF_IN_ACCEPTED != 0 => Op::In,
                (5, Tok::Eq) => Op::Eq,
                (5, Tok::Neq) => Op::Neq,
                (5, Tok::StrictEq) => Op::StrictEq,
                (5, Tok::StrictNeq) => Op::StrictNeq,
                (6, Tok::BitAnd) => Op::And,
                (7, Tok::BitXor) => Op::Xor,
                (8, Tok::BitOr) => Op::Or,
                _ => return Ok(()),
            };
            self.next_token()?;
            self.parse_expr_binary(level - 1, parse_flags & !PF_ARROW_FUNC)?;
            self.emit_op(opcode);
        }
    }

    /// `&&` / `||` with short-circuit labels.
    fn parse_logical_and_or(&mut self, op: Tok, parse_flags: u8) -> ParseResult<()> {
        if op == Tok::LAnd {
            self.parse_expr_binary(8, parse_flags)?;
        } else {
            self.parse_logical_and_or(Tok::LAnd, parse_flags)?;
        }
        if self.token.kind == op {
            let label1 = self.new_label();
            loop {
                self.next_token()?;
                self.emit_op(Op::Dup);
                self.emit_goto(if op == Tok::LAnd { Op::IfFalse } else { Op::IfTrue }, label1);
                self.emit_op(Op::Drop);
                if op == Tok::LAnd {
                    self.parse_expr_binary(8, parse_flags & !PF_ARROW_FUNC)?;
                } else {
                    self.parse_logical_and_or(Tok::LAnd, parse_flags & !PF_ARROW_FUNC)?;
                }
                if self.token.kind != op {
                    if self.token.kind == Tok::DoubleQuestion {
                        return Err(self.parse_error("cannot mix ?? with && or ||"));
                    }
                    break;
                }
            }
            self.emit_label(label1);
        }
        Ok(())
    }

    /// `??`, not mixable with `&&`/`||`.
    fn parse_coalesce_expr(&mut self, parse_flags: u8) -> ParseResult<()> {
        self.parse_logical_and_or(Tok::LOr, parse_flags)?;
        if self.token.kind == Tok::DoubleQuestion {
            let label1 = self.new_label();
            loop {
                self.next_token()?;
                self.emit_op(Op::Dup);
                self.emit_op(Op::IsUndefinedOrNull);
                self.emit_goto(Op::IfFalse, label1);
                self.emit_op(Op::Drop);
                self.parse_expr_binary(8, parse_flags & !PF_ARROW_FUNC)?;
                if self.token.kind != Tok::DoubleQuestion {
                    break;
                }
            }
            self.emit_label(label1);
        }
        Ok(())
    }

    /// `cond ? a : b`.
    fn parse_cond_expr(&mut self, parse_flags: u8) -> ParseResult<()> {
        self.parse_coalesce_expr(parse_flags)?;
        if self.token.kind == Tok::Question {
            self.next_token()?;
            let label1 = self.emit_goto(Op::IfFalse, -1);
            self.parse_assign_expr()?;
            self.expect(Tok::Colon)?;
            let label2 = self.emit_goto(Op::Goto, -1);
            self.emit_label(label1);
            self.parse_assign_expr2(parse_flags & PF_IN_ACCEPTED)?;
            self.emit_label(label2);
        }
        Ok(())
    }

    /// `yield` / `yield*` inside a generator body.
    fn parse_yield_expr(&mut self, parse_flags: u8) -> ParseResult<()> {
        if !self.fd_ref().func_kind.is_generator() {
            return Err(self.parse_error("unexpected 'yield' keyword"));
        }
        if !self.fd_ref().in_function_body {
            return Err(self.parse_error("yield in default expression"));
        }
        self.next_token()?;
        let mut is_star = false;
        if !matches!(
            self.token.kind,
            Tok::Semi | Tok::RParen | Tok::RBracket | Tok::RBrace | Tok::Comma | Tok::Colon
        ) && !self.got_lf
        {
            if self.token.kind == Tok::Star {
                is_star = true;
                self.next_token()?;
            }
            self.parse_assign_expr2(parse_flags)?;
        } else {
            self.emit_op(Op::Undefined);
        }
        let is_async = self.fd_ref().func_kind == FuncKind::AsyncGenerator;

        if is_star {
            // delegate: drive the inner iterator, forwarding next/throw/
            // return according to the protocol
            let label_loop = self.new_label();
            let label_yield = self.new_label();

            self.emit_op(if is_async { Op::ForAwaitOfStart } else { Op::ForOfStart });
            // remove the catch offset
            self.emit_op(Op::Drop);
            self.emit_op(Op::Undefined);
            self.emit_op(Op::Undefined); // initial value

            self.emit_label(label_loop);
            self.emit_op(Op::IteratorNext);
            if is_async {
                self.emit_op(Op::Await);
            }
            self.emit_op(Op::IteratorCheckObject);
            self.emit_op(Op::GetField2);
            self.emit_atom(PredefAtom::Done.atom());
            let label_next = self.emit_goto(Op::IfTrue, -1); // end of loop
            self.emit_label(label_yield);
            if is_async {
                // async_yield_star takes the value as parameter
                self.emit_op(Op::GetField);
                self.emit_atom(PredefAtom::Value.atom());
                self.emit_op(Op::Await);
                self.emit_op(Op::AsyncYieldStar);
            } else {
                // yield_star takes (value, done) as parameter
                self.emit_op(Op::YieldStar);
            }
            self.emit_op(Op::Dup);
            let label_return = self.emit_goto(Op::IfTrue, -1);
            self.emit_op(Op::Drop);
            self.emit_goto(Op::Goto, label_loop);

            self.emit_label(label_return);
            self.emit_op(Op::PushI32);
            self.emit_u32(2);
            self.emit_op(Op::StrictEq);
            let label_throw = self.emit_goto(Op::IfTrue, -1);

            // return completion forwarded to the inner iterator
            if is_async {
                self.emit_op(Op::Await);
            }
            self.emit_op(Op::IteratorCall);
            self.emit_u8(0);
            let label_return1 = self.emit_goto(Op::IfTrue, -1);
            if is_async {
                self.emit_op(Op::Await);
            }
            self.emit_op(Op::IteratorCheckObject);
            self.emit_op(Op::GetField2);
            self.emit_atom(PredefAtom::Done.atom());
            self.emit_goto(Op::IfFalse, label_yield);
            self.emit_op(Op::GetField);
            self.emit_atom(PredefAtom::Value.atom());

            self.emit_label(label_return1);
            self.emit_op(Op::Nip);
            self.emit_op(Op::Nip);
            self.emit_op(Op::Nip);
            self.emit_return(true)?;

            // throw completion forwarded to the inner iterator
            self.emit_label(label_throw);
            self.emit_op(Op::IteratorCall);
            self.emit_u8(1);
            let label_throw1 = self.emit_goto(Op::IfTrue, -1);
            if is_async {
                self.emit_op(Op::Await);
            }
            self.emit_op(Op::IteratorCheckObject);
            self.emit_op(Op::GetField2);
            self.emit_atom(PredefAtom::Done.atom());
            self.emit_goto(Op::IfFalse, label_yield);
            self.emit_goto(Op::Goto, label_next);
            // the iterator has no throw method: close it and raise
            self.emit_label(label_throw1);
            self.emit_op(Op::IteratorCall);
            self.emit_u8(2);
            let label_throw2 = self.emit_goto(Op::IfTrue, -1);
            if is_async {
                self.emit_op(Op::Await);
            }
            self.emit_label(label_throw2);
            self.emit_op(Op::ThrowError);
            self.emit_atom(Atom::NULL);
            self.emit_u8(ThrowCode::IteratorThrow as u8);

            self.emit_label(label_next);
            self.emit_op(Op::GetField);
            self.emit_atom(PredefAtom::Value.atom());
            self.emit_op(Op::Nip); // keep the value that came with done
            self.emit_op(Op::Nip);
            self.emit_op(Op::Nip);
        } else {
            if is_async {
                self.emit_op(Op::Await);
            }
            self.emit_op(Op::Yield);
            let label_next = self.emit_goto(Op::IfFalse, -1);
            self.emit_return(true)?;
            self.emit_label(label_next);
        }
        Ok(())
    }

    /// Assignment level: plain and compound assignments, logical
    /// assignments, `yield`, and the conditional ladder underneath.
    pub(crate) fn parse_assign_expr2(&mut self, parse_flags: u8) -> ParseResult<()> {
        self.enter_nesting()?;
        let result = self.parse_assign_expr2_inner(parse_flags);
        self.leave_nesting();
        result
    }

    fn parse_assign_expr2_inner(&mut self, parse_flags: u8) -> ParseResult<()> {
        if self.token.kind == Tok::Yield {
            return self.parse_yield_expr(parse_flags);
        }
        // remembered to recognize the `name = function() {}` naming pattern
        let name0 = if self.token.kind == Tok::Ident { self.token.ident_atom() } else { Atom::NULL };

        self.parse_cond_expr(parse_flags | PF_ARROW_FUNC)?;

        let op = self.token.kind;
        if op == Tok::Assign || compound_assign_opcode(op).is_some() {
            self.next_token()?;
            let lv = self.get_lvalue(op != Tok::Assign, op)?;
            let lv_name = lv.name;
            if let Err(e) = self.parse_assign_expr2(parse_flags) {
                self.ctx.atoms.unref_atom(lv_name);
                return Err(e);
            }
            if op == Tok::Assign {
                if lv.opcode == Op::GetRefValue && lv.name == name0 {
                    self.set_object_name(lv.name);
                }
            } else {
                let binop = compound_assign_opcode(op).expect("checked above");
                let binop = if binop == Op::Mod && self.fd_ref().js_mode.contains(JsMode::MATH) {
                    Op::MathMod
                } else {
                    binop
                };
                self.emit_op(binop);
            }
            self.put_lvalue(lv, PutLValue::KeepTop, false);
        } else if matches!(op, Tok::LAndAssign | Tok::LOrAssign | Tok::DoubleQuestionAssign) {
            self.next_token()?;
            let lv = self.get_lvalue(true, op)?;
            let lv_name = lv.name;
            let depth_lvalue = lv.depth;

            self.emit_op(Op::Dup);
            if op == Tok::DoubleQuestionAssign {
                self.emit_op(Op::IsUndefinedOrNull);
            }
            let label1 = self.emit_goto(if op == Tok::LOrAssign { Op::IfTrue } else { Op::IfFalse }, -1);
            self.emit_op(Op::Drop);

            if let Err(e) = self.parse_assign_expr2(parse_flags) {
                self.ctx.atoms.unref_atom(lv_name);
                return Err(e);
            }
            if lv.opcode == Op::GetRefValue && lv.name == name0 {
                self.set_object_name(lv.name);
            }
            match depth_lvalue {
                1 => self.emit_op(Op::Insert2),
                2 => self.emit_op(Op::Insert3),
                3 => self.emit_op(Op::Insert4),
                _ => unreachable!("invalid lvalue depth"),
            }
            // the put_ref_value fusion is disabled here on purpose: the
            // stack still holds depth_lvalue extra words on the skip path
            self.put_lvalue(lv, PutLValue::NoKeepDepth, false);
            let label2 = self.emit_goto(Op::Goto, -1);

            self.emit_label(label1);
            for _ in 0..depth_lvalue {
                self.emit_op(Op::Nip);
            }
            self.emit_label(label2);
        }
        Ok(())
    }

    /// Assignment expression with `in` accepted.
    pub(crate) fn parse_assign_expr(&mut self) -> ParseResult<()> {
        self.parse_assign_expr2(PF_IN_ACCEPTED)
    }

    /// Comma expression.
    pub(crate) fn parse_expr2(&mut self, parse_flags: u8) -> ParseResult<()> {
        let mut comma = false;
        loop {
            self.parse_assign_expr2(parse_flags)?;
            if comma {
                // the last expression must not become an lvalue or a
                // method-call receiver through the peephole cursor
                self.fd().last_opcode_pos = -1;
            }
            if self.token.kind != Tok::Comma {
                break;
            }
            comma = true;
            self.next_token()?;
            self.emit_op(Op::Drop);
        }
        Ok(())
    }

    /// Full expression with `in` accepted.
    pub(crate) fn parse_expr(&mut self) -> ParseResult<()> {
        self.parse_expr2(PF_IN_ACCEPTED)
    }

    /// Emits the class-fields initializer call at the top of a constructor
    /// (and after `super()` in derived constructors).
    pub(crate) fn emit_class_field_init(&mut self) {
        let scope = self.fd_ref().scope_level as u16;
        self.emit_op(Op::ScopeGetVar);
        self.emit_atom(PredefAtom::ClassFieldsInit.atom());
        self.emit_u16(scope);
        // skip the call when no initializer function is defined
        self.emit_op(Op::Dup);
        let label_next = self.emit_goto(Op::IfFalse, -1);
        self.emit_op(Op::ScopeGetVar);
        self.emit_atom(PredefAtom::This.atom());
        self.emit_u16(0);
        self.emit_op(Op::Swap);
        self.emit_op(Op::CallMethod);
        self.emit_u16(0);
        self.emit_label(label_next);
        self.emit_op(Op::Drop);
    }

    /// True when the current token begins a `let` declaration rather than
    /// a `let` identifier expression; scans one token ahead and restores.
    pub(crate) fn is_let(&mut self, decl_mask: u8) -> ParseResult<bool> {
        let mut res = false;
        if self.token_is_pseudo_keyword(PredefAtom::Let) {
            let pos: ParsePos = self.get_pos();
            self.next_token()?;
            if self.token.kind == Tok::LBracket {
                // `let [` is a syntax restriction: it never introduces an
                // ExpressionStatement
                res = true;
            } else if matches!(self.token.kind, Tok::LBrace | Tok::Let | Tok::Yield | Tok::Await)
                || (self.token.kind == Tok::Ident && !self.token.ident_is_reserved())
            {
                // check for possible ASI when not scanning for a declaration
                if self.last_line_num == self.token.line_num || decl_mask & crate::parser::DECL_MASK_OTHER != 0 {
                    res = true;
                }
            }
            self.seek_token(pos)?;
        }
        Ok(res)
    }
}

/// Maps a compound assignment token to its binary opcode.
pub(crate) fn compound_assign_opcode(tok: Tok) -> Option<Op> {
    Some(match tok {
        Tok::MulAssign => Op::Mul,
        Tok::DivAssign => Op::Div,
        Tok::ModAssign => Op::Mod,
        Tok::PlusAssign => Op::Add,
        Tok::MinusAssign => Op::Sub,
        Tok::ShlAssign => Op::Shl,
        Tok::SarAssign => Op::Sar,
        Tok::ShrAssign => Op::Shr,
        Tok::AndAssign => Op::And,
        Tok::XorAssign => Op::Xor,
        Tok::OrAssign => Op::Or,
        Tok::PowAssign => Op::Pow,
        _ => return None,
    })
}
