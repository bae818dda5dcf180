//! Disassembler for token streams and compiled function trees.
//!
//! Used by the CLI and by tests to make compilation results observable
//! without an interpreter. The bytecode listing renders one instruction
//! per line with resolved atom spellings, label targets and constant-pool
//! entries; it works both before resolution (placeholder opcodes visible)
//! and after.

use std::fmt::Write;

use ahash::AHashSet;

use crate::{
    atoms::{Atom, AtomTable},
    bytecode::{OpFmt, Opcode},
    error::ParseResult,
    function::{ConstEntry, ExportKind, FuncDef, FuncTree},
    numbers,
    parser::{ParseFlags, Parser},
    runtime::Context,
    token::{TokenData, TokenKind},
};

/// Renders every function of a tree, parents before children.
#[must_use]
pub fn dump_tree(ctx: &Context, tree: &FuncTree) -> String {
    let mut out = String::new();
    for (i, fd) in tree.funcs.iter().enumerate() {
        dump_function(ctx.atoms(), fd, i, &mut out);
    }
    out
}

fn atom_str(atoms: &AtomTable, atom: Atom) -> String {
    if atom == Atom::NULL { "<null>".to_owned() } else { atoms.get_str(atom) }
}

/// Renders one function: header, variable tables, bytecode and constants.
pub fn dump_function(atoms: &AtomTable, fd: &FuncDef, index: usize, out: &mut String) {
    let name = if fd.func_name == Atom::NULL { "<anonymous>".to_owned() } else { atoms.get_str(fd.func_name) };
    let _ = writeln!(out, "function #{index} {name} [{}:{}]", atom_str(atoms, fd.filename), fd.line_num);
    let _ = writeln!(
        out,
        "  mode={:?} kind={:?} type={:?} args={} vars={} scopes={} closures={}",
        fd.js_mode,
        fd.func_kind,
        fd.func_type,
        fd.args.len(),
        fd.vars.len(),
        fd.scopes.len(),
        fd.closure_vars.len(),
    );
    for (i, vd) in fd.args.iter().enumerate() {
        let _ = writeln!(out, "  arg {i}: {}", atom_str(atoms, vd.name));
    }
    for (i, vd) in fd.vars.iter().enumerate() {
        let mut flags = String::new();
        if vd.is_lexical {
            flags.push_str(" lexical");
        }
        if vd.is_const {
            flags.push_str(" const");
        }
        if vd.is_captured {
            flags.push_str(" captured");
        }
        let _ = writeln!(out, "  var {i}: {} scope={}{flags}", atom_str(atoms, vd.name), vd.scope_level);
    }
    for (i, cv) in fd.closure_vars.iter().enumerate() {
        let _ = writeln!(
            out,
            "  closure {i}: {} {}{}{}",
            atom_str(atoms, cv.name),
            if cv.is_local { "local" } else { "outer" },
            if cv.is_arg { " arg" } else { "" },
            if cv.is_lexical { " lexical" } else { "" },
        );
    }
    for (i, ls) in fd.label_slots.iter().enumerate() {
        if ls.ref_count > 0 || ls.pos2 >= 0 {
            let _ = writeln!(out, "  label L{i}: pos2={} refs={} sites={}", ls.pos2, ls.ref_count, ls.relocs.len());
        }
    }
    if let Some(module) = &fd.module {
        for e in &module.req_modules {
            let _ = writeln!(out, "  require {}", atom_str(atoms, e.module_name));
        }
        for e in &module.imports {
            let _ = writeln!(
                out,
                "  import {} from #{} -> closure {}",
                atom_str(atoms, e.import_name),
                e.req_module_idx,
                e.var_idx
            );
        }
        for e in module.exports.values() {
            match e.kind {
                ExportKind::Local => {
                    let _ = writeln!(
                        out,
                        "  export {} as {}",
                        atom_str(atoms, e.local_name),
                        atom_str(atoms, e.export_name)
                    );
                }
                ExportKind::Indirect { req_module_idx } => {
                    let _ = writeln!(
                        out,
                        "  export {} as {} from #{req_module_idx}",
                        atom_str(atoms, e.local_name),
                        atom_str(atoms, e.export_name)
                    );
                }
            }
        }
        for e in &module.star_exports {
            let _ = writeln!(out, "  export * from #{}", e.req_module_idx);
        }
    }
    dump_bytecode(atoms, fd, out);
    for (i, entry) in fd.cpool.iter().enumerate() {
        let rendered = match entry {
            ConstEntry::Func(id) => format!("function #{}", id.index()),
            ConstEntry::Str(s) => format!("{s:?}", s = s.to_string()),
            ConstEntry::Num(v) => numbers::number_to_string(*v),
            ConstEntry::Regexp { body, flags } => format!("/{body}/{flags}"),
            ConstEntry::TemplateObject { cooked, raw } => {
                format!("template({} parts, {} raw)", cooked.len(), raw.len())
            }
        };
        let _ = writeln!(out, "  const {i}: {rendered}");
    }
    out.push('\n');
}

/// Renders the bytecode listing of one function. Instructions that are
/// anchored label targets are marked with a `>`.
pub fn dump_bytecode(atoms: &AtomTable, fd: &FuncDef, out: &mut String) {
    let targets: AHashSet<usize> =
        fd.label_slots.iter().filter(|ls| ls.pos2 >= 0).map(|ls| ls.pos2 as usize).collect();
    let buf = &fd.byte_code;
    let mut pos = 0;
    while pos < buf.len() {
        let marker = if targets.contains(&pos) { '>' } else { ' ' };
        let Some(op) = Opcode::from_repr(buf[pos]) else {
            let _ = writeln!(out, "{marker} {pos:5}  <invalid {byte:#04x}>", byte = buf[pos]);
            pos += 1;
            continue;
        };
        let _ = write!(out, "{marker} {pos:5}  {}", op.name());
        match op.fmt() {
            OpFmt::None => {}
            OpFmt::U8 => {
                let _ = write!(out, " {}", buf[pos + 1]);
            }
            OpFmt::U16 => {
                let _ = write!(out, " {}", fd.get_u16(pos + 1));
            }
            OpFmt::U16U16 => {
                let _ = write!(out, " {},{}", fd.get_u16(pos + 1), fd.get_u16(pos + 3));
            }
            OpFmt::U32 => {
                if op == Opcode::PushI32 {
                    let _ = write!(out, " {}", fd.get_u32(pos + 1) as i32);
                } else {
                    let _ = write!(out, " {}", fd.get_u32(pos + 1));
                }
            }
            OpFmt::Label => {
                let label = fd.get_u32(pos + 1);
                let _ = write!(out, " L{label}");
                if let Some(ls) = fd.label_slots.get(label as usize) {
                    if ls.pos2 >= 0 {
                        let _ = write!(out, " (-> {})", ls.pos2);
                    }
                }
            }
            OpFmt::Atom => {
                let _ = write!(out, " '{}'", atom_str(atoms, fd.get_atom(pos + 1)));
            }
            OpFmt::AtomU8 => {
                let _ = write!(out, " '{}',{}", atom_str(atoms, fd.get_atom(pos + 1)), buf[pos + 5]);
            }
            OpFmt::AtomU16 => {
                let _ = write!(out, " '{}',{}", atom_str(atoms, fd.get_atom(pos + 1)), fd.get_u16(pos + 5));
            }
            OpFmt::AtomLabelU8 => {
                let _ = write!(
                    out,
                    " '{}',L{},{}",
                    atom_str(atoms, fd.get_atom(pos + 1)),
                    fd.get_u32(pos + 5),
                    buf[pos + 9]
                );
            }
            OpFmt::AtomLabelU16 => {
                let _ = write!(
                    out,
                    " '{}',L{},{}",
                    atom_str(atoms, fd.get_atom(pos + 1)),
                    fd.get_u32(pos + 5),
                    fd.get_u16(pos + 9)
                );
            }
        }
        out.push('\n');
        pos += op.size();
    }
}

/// Tokenizes `source` and renders one line per token, in the shape the
/// scanner debugging dump has always used.
pub fn dump_tokens(ctx: &mut Context, source: &str, filename: &str, flags: ParseFlags) -> ParseResult<String> {
    let mut parser = Parser::new(ctx, source, filename, flags)?;
    let mut out = String::new();
    let mut last_kind = TokenKind::Eof;
    loop {
        parser.next_token()?;
        // a slash in regexp position scans as a literal, the way the
        // parser itself would rewind and ask
        if matches!(parser.token.kind, TokenKind::Slash | TokenKind::DivAssign)
            && crate::parser::is_regexp_allowed(last_kind)
        {
            let tok_len = if parser.token.kind == TokenKind::DivAssign { 2 } else { 1 };
            parser.pos -= tok_len;
            parser.parse_regexp()?;
        }
        last_kind = parser.token.kind;
        let line = parser.token.line_num;
        match (&parser.token.kind, &parser.token.data) {
            (TokenKind::Eof, _) => {
                let _ = writeln!(out, "{line:4}  eof");
                break;
            }
            (TokenKind::Number, TokenData::Number(v)) => {
                let _ = writeln!(out, "{line:4}  number: {}", numbers::number_to_string(*v));
            }
            (TokenKind::String, TokenData::Str { value, .. }) => {
                let _ = writeln!(out, "{line:4}  string: '{value}'");
            }
            (TokenKind::Template, TokenData::Str { value, sep }) => {
                let _ = writeln!(out, "{line:4}  template: `{value}` (sep '{}')", *sep as char);
            }
            (TokenKind::Regexp, TokenData::Regexp { body, flags }) => {
                let _ = writeln!(out, "{line:4}  regexp: '{body}' '{flags}'");
            }
            (TokenKind::PrivateName, TokenData::Ident { atom, .. }) => {
                let _ = writeln!(out, "{line:4}  private: '{}'", parser.ctx.atoms.get_str(*atom));
            }
            (kind, TokenData::Ident { atom, .. }) => {
                let label = if *kind == TokenKind::Ident { "ident" } else { "keyword" };
                let _ = writeln!(out, "{line:4}  {label}: '{}'", parser.ctx.atoms.get_str(*atom));
            }
            (kind, _) => {
                let _ = writeln!(out, "{line:4}  token: {kind:?}");
            }
        }
    }
    parser.token.free(&mut parser.ctx.atoms);
    Ok(out)
}
