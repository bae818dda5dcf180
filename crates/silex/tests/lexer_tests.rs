//! Scanner behavior observed through the token dump and through parse
//! results that depend on scanning (ASI, escapes, literal flavors).

use silex::{Context, ParseFlags, dump};

fn tokens(source: &str) -> String {
    let mut ctx = Context::new();
    dump::dump_tokens(&mut ctx, source, "lex.js", ParseFlags::empty()).expect("tokenizes")
}

fn tokens_err(source: &str) -> silex::Exception {
    let mut ctx = Context::new();
    dump::dump_tokens(&mut ctx, source, "lex.js", ParseFlags::empty()).expect_err("must fail")
}

#[test]
fn identifiers_keywords_and_numbers() {
    let out = tokens("while x 3 0x10 1_000 .5 1e3");
    assert!(out.contains("keyword: 'while'"));
    assert!(out.contains("ident: 'x'"));
    assert!(out.contains("number: 3"));
    assert!(out.contains("number: 16"));
    assert!(out.contains("number: 1000"));
    assert!(out.contains("number: 0.5"));
    assert!(out.contains("eof"));
}

#[test]
fn escaped_keyword_spelling_is_an_identifier() {
    // while spells "while" but must not become the keyword
    let out = tokens("\\u0077hile");
    assert!(out.contains("ident: 'while'"), "got: {out}");
}

#[test]
fn private_names_carry_the_hash() {
    let out = tokens("#field");
    assert!(out.contains("private: '#field'"));
}

#[test]
fn string_escapes_decode() {
    let out = tokens(r#"'a\n\x41B\u{43}'"#);
    assert!(out.contains("string: 'a\nABC'"), "got: {out}");
}

#[test]
fn unknown_escape_drops_the_backslash() {
    let out = tokens(r"'\q'");
    assert!(out.contains("string: 'q'"), "got: {out}");
}

#[test]
fn line_numbers_follow_all_terminator_flavors() {
    let out = tokens("a\nb\r\nc\u{2028}d");
    assert!(out.contains("   1  ident: 'a'"), "got: {out}");
    assert!(out.contains("   2  ident: 'b'"));
    assert!(out.contains("   3  ident: 'c'"));
    assert!(out.contains("   4  ident: 'd'"));
}

#[test]
fn comments_are_skipped_and_count_lines() {
    let out = tokens("a /* x\n y */ b // tail\nc");
    assert!(out.contains("   1  ident: 'a'"));
    assert!(out.contains("   2  ident: 'b'"));
    assert!(out.contains("   3  ident: 'c'"));
}

#[test]
fn unterminated_forms_error() {
    assert!(tokens_err("'abc").message().contains("unexpected end of string"));
    assert!(tokens_err("/* never closed").message().contains("unexpected end of comment"));
    assert!(tokens_err("1px").message().contains("invalid number literal"));
}

#[test]
fn asi_uses_the_line_terminator_flag() {
    let mut ctx = Context::new();
    // newline substitutes for the semicolon
    ctx.compile("a = 1\nb = 2", "asi.js", ParseFlags::empty()).expect("ASI applies");
    // no newline, no semicolon: error
    let err = ctx.parse_script("a = 1 b = 2", "asi.js", ParseFlags::empty()).expect_err("must fail");
    assert!(err.message().contains("expecting ';'"));
    // a restricted production: newline after throw is rejected
    let err = ctx.parse_script("function f() { throw\n1; }", "asi.js", ParseFlags::empty()).expect_err("must fail");
    assert!(err.message().contains("line terminator not allowed after throw"));
}

#[test]
fn html_comments_only_with_the_flag() {
    let mut ctx = Context::new();
    ctx.compile("<!-- hidden\nx = 1", "annexb.js", ParseFlags::ALLOW_HTML_COMMENTS)
        .expect("annex-b comments accepted with the flag");
    ctx.parse_script("<!-- hidden\nx = 1", "annexb.js", ParseFlags::empty())
        .expect_err("html comments rejected by default");
}

#[test]
fn strict_mode_octals_are_rejected() {
    let mut ctx = Context::new();
    let err = ctx.parse_script("'use strict'; x = 0755;", "oct.js", ParseFlags::empty()).expect_err("must fail");
    assert!(err.message().contains("octal literals are deprecated in strict mode"));
    ctx.compile("x = 0755;", "oct.js", ParseFlags::empty()).expect("legacy octal fine in sloppy mode");
}

#[test]
fn regexp_body_is_captured_verbatim() {
    let out = tokens(r"x = /a[/\]b]+\d/giu");
    assert!(out.contains(r"regexp: 'a[/\]b]+\d' 'giu'"), "got: {out}");
}

#[test]
fn interrupt_handler_aborts_tokenizing() {
    let mut ctx = Context::new();
    ctx.set_interrupt_handler(Some(Box::new(|| true)));
    let err = ctx.parse_script("let x = 1;", "int.js", ParseFlags::empty()).expect_err("interrupted");
    assert_eq!(err.kind(), silex::ExcKind::InternalError);
    assert!(err.message().contains("interrupted"));
}
