//! Parser state and entry points.
//!
//! The parser is recursive descent with a single-token look-ahead owned by
//! the state. Bounded extra look-ahead goes through [`Parser::peek_token`]
//! (a minimal re-scan that never touches parser state) and
//! [`Parser::skip_parens_token`] (a full tokenization of one balanced
//! construct, restored afterwards with save/seek of the byte position —
//! tokens themselves are never copied).
//!
//! Expression parsing lives in `expr`, statements and declarations in
//! `stmt`; both are `impl Parser` blocks so the whole front end shares one
//! mutable state, exactly one token of which is live at a time.

mod expr;
mod stmt;

use bitflags::bitflags;

use crate::{
    atoms::{Atom, PredefAtom},
    bytecode::Opcode,
    error::{Exception, ParseResult},
    function::{EvalType, FuncDef, FuncId, FuncTree, JsMode, ModuleDef},
    runtime::Context,
    token::{Token, TokenKind},
};

bitflags! {
    /// Flags accepted by `Context::parse_script`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParseFlags: u32 {
        /// Compile as an ES module.
        const MODULE = 1 << 0;
        /// Compile as eval code (implies the hidden return-value slot).
        const EVAL = 1 << 1;
        /// Eval code running in the scope of a caller.
        const DIRECT_EVAL = 1 << 2;
        /// Force strict mode.
        const STRICT = 1 << 3;
        /// Do not retain source text or debug info.
        const STRIP = 1 << 4;
        /// Truncate backtraces at this frame.
        const BACKTRACE_BARRIER = 1 << 5;
        /// Accept Annex-B HTML comments (`<!--`, `-->`).
        const ALLOW_HTML_COMMENTS = 1 << 6;
    }
}

/// Declaration classes allowed in the current statement position.
pub(crate) const DECL_MASK_FUNC: u8 = 1 << 0;
/// Function declarations behind a label (Annex B).
pub(crate) const DECL_MASK_FUNC_WITH_LABEL: u8 = 1 << 1;
/// `let`/`const`/`class` declarations.
pub(crate) const DECL_MASK_OTHER: u8 = 1 << 2;
pub(crate) const DECL_MASK_ALL: u8 = DECL_MASK_FUNC | DECL_MASK_FUNC_WITH_LABEL | DECL_MASK_OTHER;

/// Saved scan position for bounded look-ahead.
///
/// Restoring re-tokenizes from the byte offset; tokens are never copied.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParsePos {
    pub last_line_num: u32,
    pub line_num: u32,
    pub ptr: usize,
    pub got_lf: bool,
}

/// Result of the lightweight one-token peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeekToken {
    /// A line terminator comes first (only reported when asked).
    LineTerminator,
    Arrow,
    Function,
    In,
    Of,
    Ident,
    Char(u8),
    Eof,
}

/// Bits reported by [`Parser::skip_parens_token`].
pub(crate) const SKIP_HAS_SEMI: u8 = 1 << 0;
pub(crate) const SKIP_HAS_ELLIPSIS: u8 = 1 << 1;
pub(crate) const SKIP_HAS_ASSIGNMENT: u8 = 1 << 2;

/// The parser/scanner state for one compilation.
pub struct Parser<'ctx, 'src> {
    pub(crate) ctx: &'ctx mut Context,
    pub(crate) filename: String,
    /// Interned filename, re-referenced for every nested function record.
    pub(crate) filename_atom: Atom,
    pub(crate) input: &'src [u8],
    /// Scan cursor.
    pub(crate) pos: usize,
    pub(crate) end: usize,
    /// Start of the most recently consumed token's trailing position.
    pub(crate) last_pos: usize,
    pub(crate) line_num: u32,
    /// Line of the previous token (drives `line_num` markers and ASI).
    pub(crate) last_line_num: u32,
    /// Whether a line terminator was crossed before the current token.
    pub(crate) got_lf: bool,
    pub(crate) token: Token,
    pub(crate) funcs: Vec<FuncDef>,
    pub(crate) cur_func: usize,
    pub(crate) is_module: bool,
    pub(crate) allow_html_comments: bool,
    /// JSON-flavored string scanning (stricter escapes); never set by the
    /// script entry points.
    pub(crate) ext_json: bool,
    pub(crate) nesting_level: u32,
}

impl<'ctx, 'src> Parser<'ctx, 'src> {
    pub(crate) fn new(ctx: &'ctx mut Context, source: &'src str, filename: &str, flags: ParseFlags) -> ParseResult<Self> {
        let filename_atom = ctx.atoms.new_atom_str(filename)?;
        let mut js_mode = JsMode::empty();
        if flags.contains(ParseFlags::STRICT) {
            js_mode |= JsMode::STRICT;
        }
        if flags.contains(ParseFlags::STRIP) {
            js_mode |= JsMode::STRIP;
        }
        let is_module = flags.contains(ParseFlags::MODULE);
        if is_module {
            js_mode |= JsMode::STRICT;
        }
        // every unit compiles as eval code; the EVAL flag is implied and
        // DIRECT_EVAL selects the caller-scope resolution rules
        let eval_type = if is_module {
            EvalType::Module
        } else if flags.contains(ParseFlags::DIRECT_EVAL) {
            EvalType::Direct
        } else {
            EvalType::Global
        };
        let mut root = FuncDef::new(None, js_mode, 0, true, eval_type, false, filename_atom, 1);
        root.func_name = PredefAtom::SpecialEval.atom();
        root.backtrace_barrier = flags.contains(ParseFlags::BACKTRACE_BARRIER);
        if is_module {
            root.module = Some(ModuleDef::default());
        }
        Ok(Self {
            ctx,
            filename: filename.to_owned(),
            filename_atom,
            input: source.as_bytes(),
            pos: 0,
            end: source.len(),
            last_pos: 0,
            line_num: 1,
            last_line_num: 1,
            got_lf: false,
            token: Token::start_of_input(),
            funcs: vec![root],
            cur_func: 0,
            is_module,
            allow_html_comments: flags.contains(ParseFlags::ALLOW_HTML_COMMENTS),
            ext_json: false,
            nesting_level: 0,
        })
    }

    /// The active function record.
    #[inline]
    pub(crate) fn fd(&mut self) -> &mut FuncDef {
        &mut self.funcs[self.cur_func]
    }

    /// The active function record, immutably.
    #[inline]
    pub(crate) fn fd_ref(&self) -> &FuncDef {
        &self.funcs[self.cur_func]
    }

    /// Builds a `SyntaxError` at the current scan position, with the
    /// single-frame backtrace a parse error carries.
    pub(crate) fn parse_error(&self, msg: impl Into<String>) -> Exception {
        Exception::syntax(msg).with_location(&self.filename, self.line_num)
    }

    /// "'x' is a reserved identifier" for the current token.
    pub(crate) fn error_reserved_identifier(&self) -> Exception {
        let name = self.ctx.atoms.get_str(self.token.ident_atom());
        self.parse_error(format!("'{name}' is a reserved identifier"))
    }

    /// Consumes the current token if it matches, errors otherwise.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.token.kind != kind {
            return Err(self.parse_error(format!("expecting '{}'", token_kind_str(kind))));
        }
        self.next_token()
    }

    /// Consumes a `;`, or applies Automatic Semicolon Insertion: `}`, end
    /// of input, or a crossed line terminator all substitute for it.
    pub(crate) fn expect_semi(&mut self) -> ParseResult<()> {
        if self.token.kind != TokenKind::Semi {
            if self.token.kind == TokenKind::Eof || self.token.kind == TokenKind::RBrace || self.got_lf {
                return Ok(());
            }
            return Err(self.parse_error("expecting ';'"));
        }
        self.next_token()
    }

    /// True when the current token is the plain identifier `atom` spelled
    /// without escapes.
    pub(crate) fn token_is_pseudo_keyword(&self, atom: PredefAtom) -> bool {
        self.token.kind == TokenKind::Ident && self.token.ident_atom() == atom && !self.token.ident_has_escape()
    }

    /// Saves the scan position of the *current* token.
    pub(crate) fn get_pos(&self) -> ParsePos {
        ParsePos {
            last_line_num: self.last_line_num,
            line_num: self.token.line_num,
            ptr: self.token.start,
            got_lf: self.got_lf,
        }
    }

    /// Restores a saved position and re-tokenizes.
    pub(crate) fn seek_token(&mut self, pos: ParsePos) -> ParseResult<()> {
        self.token.line_num = pos.last_line_num;
        self.line_num = pos.line_num;
        self.pos = pos.ptr;
        self.got_lf = pos.got_lf;
        self.next_token()
    }

    /// Recursion-depth guard; raised at every statement and expression
    /// nesting point.
    pub(crate) fn enter_nesting(&mut self) -> ParseResult<()> {
        self.nesting_level += 1;
        if self.nesting_level > self.ctx.limits.max_nesting_depth {
            return Err(self.parse_error("stack overflow"));
        }
        Ok(())
    }

    pub(crate) fn leave_nesting(&mut self) {
        self.nesting_level -= 1;
    }

    /// Minimal look-ahead: scans one token's worth of bytes without
    /// touching parser state. Recognizes just enough shapes for the
    /// disambiguations that need it (`=>`, `function`, `in`, `of`,
    /// identifiers, single characters).
    pub(crate) fn peek_token(&self, no_line_terminator: bool) -> PeekToken {
        let b = self.input;
        let mut p = self.pos;
        loop {
            if p >= self.end {
                return PeekToken::Eof;
            }
            let c = b[p];
            p += 1;
            match c {
                b'\r' | b'\n' => {
                    if no_line_terminator {
                        return PeekToken::LineTerminator;
                    }
                }
                b' ' | b'\t' | b'\x0b' | b'\x0c' => {}
                b'/' => {
                    if p < self.end && b[p] == b'/' {
                        if no_line_terminator {
                            return PeekToken::LineTerminator;
                        }
                        while p < self.end && b[p] != b'\r' && b[p] != b'\n' {
                            p += 1;
                        }
                    } else if p < self.end && b[p] == b'*' {
                        p += 1;
                        while p + 1 < self.end && !(b[p] == b'*' && b[p + 1] == b'/') {
                            if no_line_terminator && (b[p] == b'\r' || b[p] == b'\n') {
                                return PeekToken::LineTerminator;
                            }
                            p += 1;
                        }
                        p += 2;
                    } else {
                        return PeekToken::Char(b'/');
                    }
                }
                b'=' => {
                    if p < self.end && b[p] == b'>' {
                        return PeekToken::Arrow;
                    }
                    return PeekToken::Char(b'=');
                }
                _ => {
                    if c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80 {
                        let start = p - 1;
                        while p < self.end
                            && (b[p].is_ascii_alphanumeric() || b[p] == b'_' || b[p] == b'$' || b[p] >= 0x80)
                        {
                            p += 1;
                        }
                        return match &b[start..p] {
                            b"function" => PeekToken::Function,
                            b"in" => PeekToken::In,
                            b"of" => PeekToken::Of,
                            _ => PeekToken::Ident,
                        };
                    }
                    return PeekToken::Char(c);
                }
            }
        }
    }

    /// Tokenizes across one balanced `()`/`[]`/`{}`/template construct and
    /// returns the first token after it (`Of` is materialized for the
    /// contextual keyword, `'\n'` — as `TokenKind::Unknown` is never
    /// returned; a line terminator is reported via `None`). Records in
    /// `bits` whether a top-level `;`, `...` or any `=` occurred.
    ///
    /// The scan position is restored before returning.
    pub(crate) fn skip_parens_token(&mut self, pbits: Option<&mut u8>, no_line_terminator: bool) -> ParseResult<TokenKind> {
        let mut state = Vec::with_capacity(16);
        state.push(0u8);
        let saved = self.get_pos();
        let mut last_tok = TokenKind::Eof;
        let mut last_was_regexp_safe = true;
        let mut bits = 0u8;
        let mut tok = TokenKind::Eof;
        'outer: loop {
            match self.token.kind {
                TokenKind::LParen => state.push(b'('),
                TokenKind::LBracket => state.push(b'['),
                TokenKind::LBrace => state.push(b'{'),
                TokenKind::RParen => {
                    if state.pop() != Some(b'(') {
                        break 'outer;
                    }
                }
                TokenKind::RBracket => {
                    if state.pop() != Some(b'[') {
                        break 'outer;
                    }
                }
                TokenKind::RBrace => match state.pop() {
                    Some(b'`') => {
                        // resume template scanning after the `${expr}` hole
                        self.token.free(&mut self.ctx.atoms);
                        self.got_lf = false;
                        self.last_line_num = self.token.line_num;
                        if self.parse_template_part().is_err() {
                            break 'outer;
                        }
                        if let crate::token::TokenData::Str { sep, .. } = self.token.data {
                            if sep != b'`' {
                                state.push(b'`');
                            }
                        }
                    }
                    Some(b'{') => {}
                    _ => break 'outer,
                },
                TokenKind::Template => {
                    if let crate::token::TokenData::Str { sep, .. } = self.token.data {
                        if sep != b'`' {
                            if state.len() >= 256 {
                                break 'outer;
                            }
                            state.push(b'`');
                        }
                    }
                }
                TokenKind::Eof => break 'outer,
                TokenKind::Semi => {
                    if state.len() == 2 {
                        bits |= SKIP_HAS_SEMI;
                    }
                }
                TokenKind::Ellipsis => {
                    if state.len() == 2 {
                        bits |= SKIP_HAS_ELLIPSIS;
                    }
                }
                TokenKind::Assign => bits |= SKIP_HAS_ASSIGNMENT,
                TokenKind::Slash | TokenKind::DivAssign => {
                    if last_was_regexp_safe {
                        let tok_len = if self.token.kind == TokenKind::DivAssign { 2 } else { 1 };
                        self.pos -= tok_len;
                        if self.parse_regexp().is_err() {
                            break 'outer;
                        }
                    }
                }
                _ => {}
            }
            if state.len() > 256 {
                break 'outer;
            }
            // last_tok is only used to recognize regexps
            if self.token.kind == TokenKind::Ident
                && (self.token_is_pseudo_keyword(PredefAtom::Of) || self.token_is_pseudo_keyword(PredefAtom::Yield))
            {
                last_tok = TokenKind::Of;
            } else {
                last_tok = self.token.kind;
            }
            last_was_regexp_safe = is_regexp_allowed(last_tok);
            if self.next_token().is_err() {
                break 'outer;
            }
            if state.len() <= 1 {
                tok = self.token.kind;
                if self.token_is_pseudo_keyword(PredefAtom::Of) {
                    tok = TokenKind::Of;
                }
                if no_line_terminator && self.last_line_num != self.token.line_num {
                    tok = TokenKind::Unknown; // a line terminator intervenes
                }
                break 'outer;
            }
        }
        if let Some(pbits) = pbits {
            *pbits = bits;
        }
        self.seek_token(saved)?;
        Ok(tok)
    }

    /// Parses a directive prologue: consumes leading string-literal
    /// statements and applies `"use strict"` / `"use strip"` (and
    /// recognizes `"use math"` without enabling the extension). The scan
    /// position is rewound to the first prologue token so the directives
    /// re-parse as ordinary expression statements.
    pub(crate) fn parse_directives(&mut self) -> ParseResult<()> {
        if self.token.kind != TokenKind::String {
            return Ok(());
        }
        let saved = self.get_pos();
        while self.token.kind == TokenKind::String {
            // raw source spelling, quotes stripped; escapes keep a
            // directive from matching, as required
            let raw_start = self.token.start + 1;
            let raw_end = self.pos.max(raw_start + 1) - 1;
            let directive = std::str::from_utf8(&self.input[raw_start..raw_end]).unwrap_or("");
            let directive = directive.to_owned();

            self.next_token()?;
            let has_semi = match self.token.kind {
                TokenKind::Semi => {
                    self.next_token()?;
                    true
                }
                TokenKind::RBrace | TokenKind::Eof => true,
                // automatic semicolon insertion before most token kinds
                k if k.is_ident_like()
                    || matches!(
                        k,
                        TokenKind::Number
                            | TokenKind::String
                            | TokenKind::Template
                            | TokenKind::Regexp
                            | TokenKind::Dec
                            | TokenKind::Inc
                    ) =>
                {
                    self.got_lf
                }
                _ => false,
            };
            if !has_semi {
                break;
            }
            match directive.as_str() {
                "use strict" => {
                    self.fd().has_use_strict = true;
                    self.fd().js_mode |= JsMode::STRICT;
                }
                "use strip" => {
                    self.fd().js_mode |= JsMode::STRIP;
                }
                "use math" => {
                    self.fd().js_mode |= JsMode::MATH;
                }
                _ => {}
            }
        }
        self.seek_token(saved)
    }

    /// Top-level program: directives, the hidden eval return slot, then
    /// source elements until end of input.
    pub(crate) fn parse_program(&mut self) -> ParseResult<()> {
        self.next_token()?;
        self.parse_directives()?;

        let fd = self.fd();
        fd.is_global_var = fd.eval_type == EvalType::Global
            || fd.eval_type == EvalType::Module
            || !fd.js_mode.contains(JsMode::STRICT);

        if !self.is_module {
            let ret_atom = PredefAtom::SpecialRet.atom();
            let idx = self.funcs[self.cur_func].add_var(&mut self.ctx.atoms, ret_atom);
            self.fd().eval_ret_idx = i32::from(idx);
        }

        while self.token.kind != TokenKind::Eof {
            self.parse_source_element()?;
        }

        if self.is_module {
            self.emit_op(Opcode::ReturnUndef);
        } else {
            let idx = self.fd_ref().eval_ret_idx as u16;
            self.emit_op(Opcode::GetLoc);
            self.emit_u16(idx);
            self.emit_op(Opcode::Return);
        }
        Ok(())
    }

    /// One top-level or function-body element: function declarations,
    /// module `import`/`export`, or a statement.
    pub(crate) fn parse_source_element(&mut self) -> ParseResult<()> {
        if self.token.kind == TokenKind::Function
            || (self.token_is_pseudo_keyword(PredefAtom::Async) && self.peek_token(true) == PeekToken::Function)
        {
            self.parse_function_decl(
                crate::function::FuncType::Statement,
                crate::function::FuncKind::Normal,
                Atom::NULL,
                self.token.start,
                self.token.line_num,
            )?;
        } else if self.token.kind == TokenKind::Export && self.fd_ref().module.is_some() {
            self.parse_export()?;
        } else if self.token.kind == TokenKind::Import && self.fd_ref().module.is_some() && {
            let t = self.peek_token(false);
            t != PeekToken::Char(b'(') && t != PeekToken::Char(b'.')
        } {
            self.parse_import()?;
        } else {
            self.parse_statement_or_decl(DECL_MASK_ALL)?;
        }
        Ok(())
    }
}

/// True if a `/` after this token starts a regexp literal rather than a
/// division.
pub(crate) fn is_regexp_allowed(tok: TokenKind) -> bool {
    !matches!(
        tok,
        TokenKind::Number
            | TokenKind::String
            | TokenKind::Regexp
            | TokenKind::Dec
            | TokenKind::Inc
            | TokenKind::Null
            | TokenKind::False
            | TokenKind::True
            | TokenKind::This
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::Ident
    )
}

/// Spelling used in "expecting 'x'" messages.
pub(crate) fn token_kind_str(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::Semi => ";",
        TokenKind::Colon => ":",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Assign => "=",
        TokenKind::Arrow => "=>",
        TokenKind::Ident => "identifier",
        TokenKind::In => "in",
        TokenKind::While => "while",
        TokenKind::Catch => "catch",
        TokenKind::Function => "function",
        _ => "token",
    }
}

/// Parses and resolves nothing by itself; the `Context` entry points drive
/// [`Parser::parse_program`] and then hand the tree to the resolver.
pub(crate) fn parse_unit(ctx: &mut Context, source: &str, filename: &str, flags: ParseFlags) -> ParseResult<FuncTree> {
    let mut parser = Parser::new(ctx, source, filename, flags)?;

    // the body scope wraps the whole program so hoisted definitions have an
    // `enter_scope` to instantiate at
    parser.push_scope();
    parser.fd().body_scope = parser.fd_ref().scope_level as i32;

    let result = parser.parse_program();
    parser.token.free(&mut parser.ctx.atoms);
    let funcs = std::mem::take(&mut parser.funcs);
    let mut tree = FuncTree::new(funcs, FuncId(0));
    match result {
        Ok(()) => {
            if !tree.funcs[0].js_mode.contains(JsMode::STRIP) {
                tree.funcs[0].source = Some(source.to_owned());
            }
            Ok(tree)
        }
        Err(e) => {
            tree.free(&mut ctx.atoms);
            Err(e)
        }
    }
}
