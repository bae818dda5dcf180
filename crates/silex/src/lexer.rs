//! The scanner.
//!
//! `next_token` consumes bytes from the UTF-8 source and fills the parser's
//! single look-ahead token. Line terminators (LF, CR, CRLF, U+2028, U+2029)
//! bump `line_num` and set `got_lf`, which is all Automatic Semicolon
//! Insertion ever looks at. Regexp literals are only scanned when the
//! parser rewinds and asks (`parse_regexp`); template literals are scanned
//! one part at a time with the parser running full expression parsing
//! between parts.

use crate::{
    atoms::PredefAtom,
    error::{Exception, ParseResult},
    function::{FuncType, JsMode},
    numbers::{self, NumberFlags},
    parser::Parser,
    strings::{JsString, StringBuffer},
    token::{TokenData, TokenKind},
};

/// U+2028 LINE SEPARATOR.
pub(crate) const CP_LS: u32 = 0x2028;
/// U+2029 PARAGRAPH SEPARATOR.
pub(crate) const CP_PS: u32 = 0x2029;

/// `IdentifierStart`.
pub(crate) fn is_ident_first(c: u32) -> bool {
    if c < 128 {
        return c == u32::from(b'$') || c == u32::from(b'_') || (c as u8).is_ascii_alphabetic();
    }
    char::from_u32(c).is_some_and(unicode_ident::is_xid_start)
}

/// `IdentifierPart` (ZWNJ and ZWJ included).
pub(crate) fn is_ident_next(c: u32) -> bool {
    if c < 128 {
        return c == u32::from(b'$') || c == u32::from(b'_') || (c as u8).is_ascii_alphanumeric();
    }
    c == 0x200C || c == 0x200D || char::from_u32(c).is_some_and(unicode_ident::is_xid_continue)
}

/// Unicode whitespace accepted between tokens (beyond the ASCII set).
fn is_space(c: u32) -> bool {
    matches!(c, 0x00A0 | 0x1680 | 0x2000..=0x200A | 0x202F | 0x205F | 0x3000 | 0xFEFF)
}

/// Decodes one UTF-8 sequence. Returns the code point and the position of
/// the next byte; `None` for an invalid sequence.
pub(crate) fn utf8_decode(buf: &[u8], pos: usize) -> Option<(u32, usize)> {
    let b0 = *buf.get(pos)?;
    if b0 < 0x80 {
        return Some((u32::from(b0), pos + 1));
    }
    let (len, init) = match b0 {
        0xC0..=0xDF => (2, u32::from(b0 & 0x1F)),
        0xE0..=0xEF => (3, u32::from(b0 & 0x0F)),
        0xF0..=0xF7 => (4, u32::from(b0 & 0x07)),
        _ => return None,
    };
    let mut c = init;
    for i in 1..len {
        let b = *buf.get(pos + i)?;
        if b & 0xC0 != 0x80 {
            return None;
        }
        c = (c << 6) | u32::from(b & 0x3F);
    }
    Some((c, pos + len))
}

/// Outcome of scanning the text after a backslash.
pub(crate) enum Escape {
    /// Decoded code point.
    Char(u32),
    /// Malformed escape (`\x1`, `\u{dead beef}` ...).
    Invalid,
    /// Not a recognized escape; the caller drops the backslash.
    NotEscape,
}

/// Parses the escape body starting at `pos` (the byte after the
/// backslash): single-character escapes, `\x`, `\u` / `\u{...}` and legacy
/// octal. Returns the outcome and the next position.
pub(crate) fn parse_escape(buf: &[u8], pos: usize) -> (Escape, usize) {
    let Some(&c) = buf.get(pos) else {
        return (Escape::Invalid, pos);
    };
    let mut p = pos + 1;
    let v = match c {
        b'b' => 0x08,
        b'f' => 0x0C,
        b'n' => 0x0A,
        b'r' => 0x0D,
        b't' => 0x09,
        b'v' => 0x0B,
        b'x' | b'u' => {
            if c == b'u' && buf.get(p) == Some(&b'{') {
                p += 1;
                let mut v: u32 = 0;
                loop {
                    let Some(h) = buf.get(p).and_then(|&b| (b as char).to_digit(16)) else {
                        return (Escape::Invalid, p);
                    };
                    p += 1;
                    v = (v << 4) | h;
                    if v > 0x10_FFFF {
                        return (Escape::Invalid, p);
                    }
                    if buf.get(p) == Some(&b'}') {
                        p += 1;
                        break;
                    }
                }
                v
            } else {
                let n = if c == b'x' { 2 } else { 4 };
                let mut v: u32 = 0;
                for _ in 0..n {
                    let Some(h) = buf.get(p).and_then(|&b| (b as char).to_digit(16)) else {
                        return (Escape::Invalid, p);
                    };
                    p += 1;
                    v = (v << 4) | h;
                }
                v
            }
        }
        b'0'..=b'7' => {
            // legacy octal, at most three digits
            let mut v = u32::from(c - b'0');
            if let Some(&d1) = buf.get(p) {
                if d1.is_ascii_digit() && d1 < b'8' {
                    v = v * 8 + u32::from(d1 - b'0');
                    p += 1;
                    if c <= b'3' {
                        if let Some(&d2) = buf.get(p) {
                            if d2.is_ascii_digit() && d2 < b'8' {
                                v = v * 8 + u32::from(d2 - b'0');
                                p += 1;
                            }
                        }
                    }
                }
            }
            v
        }
        _ => return (Escape::NotEscape, pos),
    };
    (Escape::Char(v), p)
}

impl Parser<'_, '_> {
    fn byte(&self, pos: usize) -> u8 {
        self.input.get(pos).copied().unwrap_or(0)
    }

    /// Scans an identifier whose first decoded character is `c` and whose
    /// remaining bytes start at `self.pos` (already past `c`). Produces the
    /// interned atom (with a `#` prefix for private names).
    fn parse_ident(&mut self, mut c: u32, has_escape: &mut bool, is_private: bool) -> ParseResult<crate::atoms::Atom> {
        let mut text = String::new();
        if is_private {
            text.push('#');
        }
        loop {
            text.push(char::from_u32(c).unwrap_or('\u{FFFD}'));
            let mut p1 = self.pos;
            let c1 = self.byte(p1);
            if c1 == b'\\' && self.byte(p1 + 1) == b'u' {
                let (esc, next) = parse_escape(self.input, p1 + 2);
                match esc {
                    Escape::Char(v) if is_ident_next(v) => {
                        *has_escape = true;
                        c = v;
                        self.pos = next;
                        continue;
                    }
                    _ => break,
                }
            } else if c1 >= 0x80 {
                if let Some((v, next)) = utf8_decode(self.input, p1) {
                    if is_ident_next(v) {
                        c = v;
                        self.pos = next;
                        continue;
                    }
                }
                break;
            } else {
                p1 += 1;
                if is_ident_next(u32::from(c1)) {
                    c = u32::from(c1);
                    self.pos = p1;
                    continue;
                }
                break;
            }
        }
        self.ctx.atoms.new_atom_str(&text)
    }

    /// Scans a string literal body from `start` up to the terminator
    /// `sep` (`'`, `"` or `` ` ``). For templates, also stops at `${` and
    /// reports which terminator ended the part. Line continuations inside
    /// templates do not advance `line_num` here (the raw scan already did).
    ///
    /// Returns `(value, terminator, position_after)`.
    pub(crate) fn scan_string_literal(
        &mut self,
        sep: u8,
        do_throw: bool,
        start: usize,
    ) -> ParseResult<(JsString, u8, usize)> {
        let mut p = start;
        let mut b = StringBuffer::new();
        let strict = self.fd_ref().js_mode.contains(JsMode::STRICT);
        let fail = |s: &Self, msg: &str, do_throw: bool| {
            if do_throw { s.parse_error(msg) } else { Exception::syntax(msg) }
        };
        loop {
            if p >= self.end {
                return Err(fail(self, "unexpected end of string", do_throw));
            }
            let mut c = u32::from(self.byte(p));
            if c < 0x20 {
                if self.ext_json {
                    return Err(fail(self, "invalid character in a JSON string", do_throw));
                }
                if sep == b'`' {
                    if c == 0x0D {
                        if self.byte(p + 1) == b'\n' {
                            p += 1;
                        }
                        c = 0x0A;
                    }
                    // line numbers were counted by the raw template scan
                } else if c == 0x0A || c == 0x0D {
                    return Err(fail(self, "unexpected end of string", do_throw));
                }
            }
            p += 1;
            if c == u32::from(sep) {
                return Ok((b.finish(), sep, p));
            }
            if c == u32::from(b'$') && self.byte(p) == b'{' && sep == b'`' {
                p += 1;
                return Ok((b.finish(), b'{', p));
            }
            if c == u32::from(b'\\') {
                let e = self.byte(p);
                match e {
                    0 if p >= self.end => return Err(fail(self, "unexpected end of string", do_throw)),
                    b'\'' | b'"' | b'\\' => {
                        c = u32::from(e);
                        p += 1;
                    }
                    b'\r' | b'\n' => {
                        // escaped newline sequence is dropped
                        if e == b'\r' && self.byte(p + 1) == b'\n' {
                            p += 1;
                        }
                        p += 1;
                        if sep != b'`' {
                            self.line_num += 1;
                        }
                        continue;
                    }
                    b'0'..=b'9' => {
                        if !strict && sep != b'`' {
                            // legacy octal escapes; \8 and \9 just drop the
                            // backslash here
                            match parse_escape(self.input, p) {
                                (Escape::Char(v), next) => {
                                    c = v;
                                    p = next;
                                }
                                (Escape::Invalid, _) => {
                                    return Err(fail(self, "malformed escape sequence in string literal", do_throw));
                                }
                                (Escape::NotEscape, _) => {
                                    c = u32::from(e);
                                    p += 1;
                                }
                            }
                        } else if e == b'0' && !self.byte(p + 1).is_ascii_digit() {
                            p += 1;
                            c = 0;
                        } else if e >= b'8' || sep == b'`' {
                            // \8 and \9 are invalid in strict mode and in
                            // templates; other octals are invalid in templates
                            return Err(fail(self, "malformed escape sequence in string literal", do_throw));
                        } else {
                            return Err(fail(
                                self,
                                "octal escape sequences are not allowed in strict mode",
                                do_throw,
                            ));
                        }
                    }
                    _ if e >= 0x80 => {
                        let Some((v, next)) = utf8_decode(self.input, p) else {
                            return Err(fail(self, "invalid UTF-8 sequence", do_throw));
                        };
                        p = next;
                        // escaped LS/PS is a line continuation
                        if v == CP_LS || v == CP_PS {
                            continue;
                        }
                        c = v;
                    }
                    _ => match parse_escape(self.input, p) {
                        (Escape::Char(v), next) => {
                            c = v;
                            p = next;
                        }
                        (Escape::Invalid, _) => {
                            return Err(fail(self, "malformed escape sequence in string literal", do_throw));
                        }
                        (Escape::NotEscape, _) => {
                            // drop the backslash, keep the character
                            c = u32::from(e);
                            p += 1;
                        }
                    },
                }
            } else if c >= 0x80 {
                let Some((v, next)) = utf8_decode(self.input, p - 1) else {
                    return Err(fail(self, "invalid UTF-8 sequence", do_throw));
                };
                c = v;
                p = next;
            }
            b.put_char(c);
        }
    }

    /// Scans one raw template part starting at `self.pos` and fills the
    /// current token with it: escapes are kept verbatim, newline sequences
    /// normalize to `\n` and advance `line_num`. The payload terminator is
    /// `` ` `` for a closing part and `{` when an expression follows.
    pub(crate) fn parse_template_part(&mut self) -> ParseResult<()> {
        let mut p = self.pos;
        let mut b = StringBuffer::new();
        let sep;
        loop {
            if p >= self.end {
                return Err(self.parse_error("unexpected end of string"));
            }
            let mut c = u32::from(self.byte(p));
            p += 1;
            if c == u32::from(b'`') {
                sep = b'`';
                break;
            }
            if c == u32::from(b'$') && self.byte(p) == b'{' {
                p += 1;
                sep = b'{';
                break;
            }
            if c == u32::from(b'\\') {
                b.put_code_unit(u16::from(b'\\'));
                if p >= self.end {
                    return Err(self.parse_error("unexpected end of string"));
                }
                c = u32::from(self.byte(p));
                p += 1;
            }
            // newline sequences are normalized as single '\n' bytes
            if c == 0x0D {
                if self.byte(p) == b'\n' {
                    p += 1;
                }
                c = 0x0A;
            }
            if c == 0x0A {
                self.line_num += 1;
            } else if c >= 0x80 {
                let Some((v, next)) = utf8_decode(self.input, p - 1) else {
                    return Err(self.parse_error("invalid UTF-8 sequence"));
                };
                c = v;
                p = next;
            }
            b.put_char(c);
        }
        self.token.kind = TokenKind::Template;
        self.token.data = TokenData::Str { value: b.finish(), sep };
        self.pos = p;
        Ok(())
    }

    /// Scans a regexp literal. `self.pos` must point at the opening `/`
    /// (the parser rewinds one or two bytes when it decides the slash
    /// starts a literal). The body is captured bit-faithfully, tracking
    /// `[...]` class nesting; flags take any identifier-part characters.
    pub(crate) fn parse_regexp(&mut self) -> ParseResult<()> {
        let mut p = self.pos + 1;
        let mut in_class = false;
        let mut body = StringBuffer::new();
        let mut flags = StringBuffer::new();
        loop {
            if p >= self.end {
                return Err(self.parse_error("unexpected end of regexp"));
            }
            let mut c = u32::from(self.byte(p));
            p += 1;
            if c == 0x0A || c == 0x0D {
                return Err(self.parse_error("unexpected line terminator in regexp"));
            } else if c == u32::from(b'/') {
                if !in_class {
                    break;
                }
            } else if c == u32::from(b'[') {
                in_class = true;
            } else if c == u32::from(b']') {
                in_class = false;
            } else if c == u32::from(b'\\') {
                body.put_code_unit(u16::from(b'\\'));
                c = u32::from(self.byte(p));
                p += 1;
                if c == 0x0A || c == 0x0D {
                    return Err(self.parse_error("unexpected line terminator in regexp"));
                } else if c == 0 && p >= self.end {
                    return Err(self.parse_error("unexpected end of regexp"));
                } else if c >= 0x80 {
                    let Some((v, next)) = utf8_decode(self.input, p - 1) else {
                        return Err(self.parse_error("invalid UTF-8 sequence"));
                    };
                    c = v;
                    p = next;
                    if c == CP_LS || c == CP_PS {
                        return Err(self.parse_error("unexpected line terminator in regexp"));
                    }
                }
            } else if c >= 0x80 {
                let Some((v, next)) = utf8_decode(self.input, p - 1) else {
                    return Err(self.parse_error("invalid UTF-8 sequence"));
                };
                c = v;
                p = next;
                if c == CP_LS || c == CP_PS {
                    return Err(self.parse_error("unexpected line terminator in regexp"));
                }
            }
            body.put_char(c);
        }
        loop {
            let mut next = p;
            let c = if self.byte(p) >= 0x80 {
                let Some((v, n)) = utf8_decode(self.input, p) else {
                    return Err(self.parse_error("invalid UTF-8 sequence"));
                };
                next = n;
                v
            } else {
                next += 1;
                u32::from(self.byte(p))
            };
            if !is_ident_next(c) {
                break;
            }
            flags.put_char(c);
            p = next;
        }
        self.token.kind = TokenKind::Regexp;
        self.token.data = TokenData::Regexp { body: body.finish(), flags: flags.finish() };
        self.pos = p;
        Ok(())
    }

    /// Produces the next token.
    ///
    /// Sets `got_lf` to whether any line terminator was crossed since the
    /// previous token, polls the host interrupt hook, and releases the
    /// previous token's payload.
    pub(crate) fn next_token(&mut self) -> ParseResult<()> {
        if self.ctx.poll_interrupts() {
            self.token.kind = TokenKind::Error;
            return Err(Exception::internal("interrupted"));
        }

        self.token.free(&mut self.ctx.atoms);

        let mut p = self.pos;
        self.last_pos = p;
        self.got_lf = false;
        self.last_line_num = self.token.line_num;
        let result = self.next_token_inner(&mut p);
        if result.is_err() {
            self.token.kind = TokenKind::Error;
            self.token.data = TokenData::None;
        }
        result
    }

    fn next_token_inner(&mut self, p: &mut usize) -> ParseResult<()> {
        'redo: loop {
            self.token.line_num = self.line_num;
            self.token.start = *p;
            self.token.data = TokenData::None;
            let c = self.byte(*p);
            match c {
                0 if *p >= self.end => {
                    self.token.kind = TokenKind::Eof;
                }
                b'`' => {
                    self.pos = *p + 1;
                    self.parse_template_part()?;
                    *p = self.pos;
                }
                b'\'' | b'"' => {
                    let (value, sep, next) = self.scan_string_literal(c, true, *p + 1)?;
                    self.token.kind = TokenKind::String;
                    self.token.data = TokenData::Str { value, sep };
                    *p = next;
                }
                b'\r' | b'\n' => {
                    if c == b'\r' && self.byte(*p + 1) == b'\n' {
                        *p += 1;
                    }
                    *p += 1;
                    self.got_lf = true;
                    self.line_num += 1;
                    continue 'redo;
                }
                b'\x0c' | b'\x0b' | b' ' | b'\t' => {
                    *p += 1;
                    continue 'redo;
                }
                b'/' => {
                    if self.byte(*p + 1) == b'*' {
                        // block comment
                        *p += 2;
                        loop {
                            if self.byte(*p) == 0 && *p >= self.end {
                                self.pos = *p;
                                return Err(self.parse_error("unexpected end of comment"));
                            }
                            if self.byte(*p) == b'*' && self.byte(*p + 1) == b'/' {
                                *p += 2;
                                break;
                            }
                            match self.byte(*p) {
                                b'\n' => {
                                    self.line_num += 1;
                                    self.got_lf = true; // considered as LF for ASI
                                    *p += 1;
                                }
                                b'\r' => {
                                    self.got_lf = true; // considered as LF for ASI
                                    *p += 1;
                                }
                                b if b >= 0x80 => match utf8_decode(self.input, *p) {
                                    Some((v, next)) => {
                                        if v == CP_LS || v == CP_PS {
                                            self.got_lf = true;
                                        }
                                        *p = next;
                                    }
                                    None => *p += 1,
                                },
                                _ => *p += 1,
                            }
                        }
                        continue 'redo;
                    } else if self.byte(*p + 1) == b'/' {
                        *p += 2;
                        *p = self.skip_line_comment(*p);
                        continue 'redo;
                    } else if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::DivAssign;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Slash;
                    }
                }
                b'\\' if self.byte(*p + 1) == b'u' => {
                    let (esc, next) = parse_escape(self.input, *p + 2);
                    if let Escape::Char(c1) = esc {
                        if is_ident_first(c1) {
                            self.pos = next;
                            let mut has_escape = true;
                            self.scan_identifier_token(c1, &mut has_escape)?;
                            *p = self.pos;
                        } else {
                            self.token.kind = TokenKind::Unknown;
                            *p += 1;
                        }
                    } else {
                        self.token.kind = TokenKind::Unknown;
                        *p += 1;
                    }
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                    self.pos = *p + 1;
                    let mut has_escape = false;
                    self.scan_identifier_token(u32::from(c), &mut has_escape)?;
                    *p = self.pos;
                }
                b'#' => {
                    // private name
                    *p += 1;
                    let mut p1 = *p;
                    let c1;
                    let b1 = self.byte(p1);
                    if b1 == b'\\' && self.byte(p1 + 1) == b'u' {
                        let (esc, next) = parse_escape(self.input, p1 + 2);
                        match esc {
                            Escape::Char(v) => {
                                c1 = v;
                                p1 = next;
                            }
                            _ => {
                                self.pos = *p;
                                return Err(self.parse_error("invalid first character of private name"));
                            }
                        }
                    } else if b1 >= 0x80 {
                        match utf8_decode(self.input, p1) {
                            Some((v, next)) => {
                                c1 = v;
                                p1 = next;
                            }
                            None => {
                                self.pos = *p;
                                return Err(self.parse_error("invalid first character of private name"));
                            }
                        }
                    } else {
                        c1 = u32::from(b1);
                        p1 += 1;
                    }
                    if !is_ident_first(c1) {
                        self.pos = *p;
                        return Err(self.parse_error("invalid first character of private name"));
                    }
                    self.pos = p1;
                    let mut has_escape = false;
                    let atom = self.parse_ident(c1, &mut has_escape, true)?;
                    self.token.data = TokenData::Ident { atom, has_escape, is_reserved: false };
                    self.token.kind = TokenKind::PrivateName;
                    *p = self.pos;
                }
                b'.' => {
                    if self.byte(*p + 1) == b'.' && self.byte(*p + 2) == b'.' {
                        *p += 3;
                        self.token.kind = TokenKind::Ellipsis;
                    } else if self.byte(*p + 1).is_ascii_digit() {
                        *p = self.scan_number_token(*p)?;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Dot;
                    }
                }
                b'0'..=b'9' => {
                    if c == b'0'
                        && self.byte(*p + 1).is_ascii_digit()
                        && self.fd_ref().js_mode.contains(JsMode::STRICT)
                    {
                        self.pos = *p;
                        return Err(self.parse_error("octal literals are deprecated in strict mode"));
                    }
                    *p = self.scan_number_token(*p)?;
                }
                b'*' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::MulAssign;
                    } else if self.byte(*p + 1) == b'*' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::PowAssign;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::Pow;
                        }
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Star;
                    }
                }
                b'%' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::ModAssign;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Percent;
                    }
                }
                b'+' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::PlusAssign;
                    } else if self.byte(*p + 1) == b'+' {
                        *p += 2;
                        self.token.kind = TokenKind::Inc;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Plus;
                    }
                }
                b'-' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::MinusAssign;
                    } else if self.byte(*p + 1) == b'-' {
                        if self.allow_html_comments
                            && self.byte(*p + 2) == b'>'
                            && self.last_line_num != self.line_num
                        {
                            // Annex B: `-->` at the beginning of a line is a
                            // single-line html comment
                            *p += 3;
                            *p = self.skip_line_comment(*p);
                            continue 'redo;
                        }
                        *p += 2;
                        self.token.kind = TokenKind::Dec;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Minus;
                    }
                }
                b'<' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::Lte;
                    } else if self.byte(*p + 1) == b'<' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::ShlAssign;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::Shl;
                        }
                    } else if self.allow_html_comments
                        && self.byte(*p + 1) == b'!'
                        && self.byte(*p + 2) == b'-'
                        && self.byte(*p + 3) == b'-'
                    {
                        // Annex B: `<!--` single-line html comment
                        *p += 4;
                        *p = self.skip_line_comment(*p);
                        continue 'redo;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Lt;
                    }
                }
                b'>' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::Gte;
                    } else if self.byte(*p + 1) == b'>' {
                        if self.byte(*p + 2) == b'>' {
                            if self.byte(*p + 3) == b'=' {
                                *p += 4;
                                self.token.kind = TokenKind::ShrAssign;
                            } else {
                                *p += 3;
                                self.token.kind = TokenKind::Shr;
                            }
                        } else if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::SarAssign;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::Sar;
                        }
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Gt;
                    }
                }
                b'=' => {
                    if self.byte(*p + 1) == b'=' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::StrictEq;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::Eq;
                        }
                    } else if self.byte(*p + 1) == b'>' {
                        *p += 2;
                        self.token.kind = TokenKind::Arrow;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Assign;
                    }
                }
                b'!' => {
                    if self.byte(*p + 1) == b'=' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::StrictNeq;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::Neq;
                        }
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Not;
                    }
                }
                b'&' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::AndAssign;
                    } else if self.byte(*p + 1) == b'&' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::LAndAssign;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::LAnd;
                        }
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::BitAnd;
                    }
                }
                b'^' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::XorAssign;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::BitXor;
                    }
                }
                b'|' => {
                    if self.byte(*p + 1) == b'=' {
                        *p += 2;
                        self.token.kind = TokenKind::OrAssign;
                    } else if self.byte(*p + 1) == b'|' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::LOrAssign;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::LOr;
                        }
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::BitOr;
                    }
                }
                b'?' => {
                    if self.byte(*p + 1) == b'?' {
                        if self.byte(*p + 2) == b'=' {
                            *p += 3;
                            self.token.kind = TokenKind::DoubleQuestionAssign;
                        } else {
                            *p += 2;
                            self.token.kind = TokenKind::DoubleQuestion;
                        }
                    } else if self.byte(*p + 1) == b'.' && !self.byte(*p + 2).is_ascii_digit() {
                        *p += 2;
                        self.token.kind = TokenKind::QuestionDot;
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Question;
                    }
                }
                b'~' => {
                    *p += 1;
                    self.token.kind = TokenKind::BitNot;
                }
                b'(' => {
                    *p += 1;
                    self.token.kind = TokenKind::LParen;
                }
                b')' => {
                    *p += 1;
                    self.token.kind = TokenKind::RParen;
                }
                b'[' => {
                    *p += 1;
                    self.token.kind = TokenKind::LBracket;
                }
                b']' => {
                    *p += 1;
                    self.token.kind = TokenKind::RBracket;
                }
                b'{' => {
                    *p += 1;
                    self.token.kind = TokenKind::LBrace;
                }
                b'}' => {
                    *p += 1;
                    self.token.kind = TokenKind::RBrace;
                }
                b';' => {
                    *p += 1;
                    self.token.kind = TokenKind::Semi;
                }
                b':' => {
                    *p += 1;
                    self.token.kind = TokenKind::Colon;
                }
                b',' => {
                    *p += 1;
                    self.token.kind = TokenKind::Comma;
                }
                _ => {
                    if c >= 0x80 {
                        match utf8_decode(self.input, *p) {
                            Some((v, next)) => {
                                if v == CP_LS || v == CP_PS {
                                    *p = next;
                                    self.got_lf = true;
                                    self.line_num += 1;
                                    continue 'redo;
                                }
                                if is_space(v) {
                                    *p = next;
                                    continue 'redo;
                                }
                                if is_ident_first(v) {
                                    self.pos = next;
                                    let mut has_escape = false;
                                    self.scan_identifier_token(v, &mut has_escape)?;
                                    *p = self.pos;
                                } else {
                                    self.pos = *p;
                                    return Err(self.parse_error("unexpected character"));
                                }
                            }
                            None => {
                                self.pos = *p;
                                return Err(self.parse_error("unexpected character"));
                            }
                        }
                    } else {
                        *p += 1;
                        self.token.kind = TokenKind::Unknown;
                    }
                }
            }
            break;
        }
        self.pos = *p;
        Ok(())
    }

    /// Skips to the end of a single-line comment (the terminator itself is
    /// left for the main loop to consume).
    fn skip_line_comment(&mut self, mut p: usize) -> usize {
        loop {
            if self.byte(p) == 0 && p >= self.end {
                break;
            }
            match self.byte(p) {
                b'\r' | b'\n' => break,
                b if b >= 0x80 => match utf8_decode(self.input, p) {
                    Some((v, next)) => {
                        if v == CP_LS || v == CP_PS {
                            break;
                        }
                        p = next;
                    }
                    None => p += 1,
                },
                _ => p += 1,
            }
        }
        p
    }

    /// Scans the identifier whose first character (already consumed) is
    /// `c`, then classifies it: contextually reserved words become keyword
    /// tokens, but an escaped spelling is never a keyword — it stays an
    /// identifier marked reserved so the parser can reject it where a
    /// binding is required.
    fn scan_identifier_token(&mut self, c: u32, has_escape: &mut bool) -> ParseResult<()> {
        let atom = self.parse_ident(c, has_escape, false)?;
        let mut is_reserved = false;
        let mut kind = TokenKind::Ident;
        let fd = self.fd_ref();
        let strict = fd.js_mode.contains(JsMode::STRICT);
        let parent_kind = fd.parent.map(|id| self.funcs[id.index()].func_kind);
        let in_arrow_args =
            fd.func_type == FuncType::Arrow && !fd.in_function_body && fd.parent.is_some();
        let yield_is_reserved = atom == PredefAtom::Yield
            && (fd.func_kind.is_generator() || (in_arrow_args && parent_kind.is_some_and(|k| k.is_generator())));
        let await_is_reserved = atom == PredefAtom::Await
            && (self.is_module
                || fd.func_kind.is_async()
                || (in_arrow_args && parent_kind.is_some_and(|k| k.is_async())));
        let raw = atom.raw();
        let reserved = (!atom.is_tagged_int()
            && raw >= PredefAtom::FIRST_KEYWORD as u32
            && (raw <= PredefAtom::LAST_KEYWORD as u32 || (raw <= PredefAtom::LAST_STRICT_KEYWORD as u32 && strict)))
            || yield_is_reserved
            || await_is_reserved;
        if reserved {
            if *has_escape {
                is_reserved = true;
            } else if let Some(k) = TokenKind::from_keyword_atom(atom) {
                kind = k;
            }
        }
        self.token.data = TokenData::Ident { atom, has_escape: *has_escape, is_reserved };
        self.token.kind = kind;
        Ok(())
    }

    /// Scans a numeric literal starting at `p`; rejects an identifier
    /// character immediately after it.
    fn scan_number_token(&mut self, p: usize) -> ParseResult<usize> {
        let strict = self.fd_ref().js_mode.contains(JsMode::STRICT);
        let flags = NumberFlags { legacy_octal: !strict, underscores: true };
        let Some((value, next)) = numbers::parse_number_literal(self.input, p, flags) else {
            self.pos = p;
            return Err(self.parse_error("invalid number literal"));
        };
        // reject `10instanceof Number` and friends
        let after = if self.byte(next) >= 0x80 {
            utf8_decode(self.input, next).map(|(v, _)| v)
        } else {
            Some(u32::from(self.byte(next)))
        };
        if after.is_some_and(is_ident_next) {
            self.pos = next;
            return Err(self.parse_error("invalid number literal"));
        }
        self.token.kind = TokenKind::Number;
        self.token.data = TokenData::Number(value);
        Ok(next)
    }
}
