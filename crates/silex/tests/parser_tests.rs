//! Parser acceptance and rejection coverage: the statement set, the
//! expression ladder, and the parse-time semantic checks.

use silex::{Context, ParseFlags};

fn compile(source: &str) -> Result<(), silex::Exception> {
    let mut ctx = Context::new();
    let tree = ctx.compile(source, "test.js", ParseFlags::empty())?;
    ctx.free_tree(tree);
    Ok(())
}

fn compile_module(source: &str) -> Result<(), silex::Exception> {
    let mut ctx = Context::new();
    let tree = ctx.compile(source, "test.mjs", ParseFlags::MODULE)?;
    ctx.free_tree(tree);
    Ok(())
}

fn error_message(source: &str) -> String {
    compile(source).expect_err("must fail").message().to_owned()
}

#[test]
fn statements_parse() {
    let sources = [
        "var a = 1, b, c = a;",
        "let x = 1; const y = 2; x + y;",
        "if (a) b(); else c();",
        "while (x) { x--; }",
        "do { f(); } while (g());",
        "for (var i = 0; i < 10; i++) f(i);",
        "for (let i = 0;;) { break; }",
        "for (;;) { break; }",
        "for (var k in obj) f(k);",
        "for (const v of list) f(v);",
        "switch (x) { case 1: f(); break; case 2: case 3: g(); break; default: h(); }",
        "switch (x) { default: f(); case 1: g(); }",
        "outer: for (;;) { inner: for (;;) { continue outer; } }",
        "try { f(); } catch (e) { g(e); } finally { h(); }",
        "try { f(); } catch { g(); }",
        "try { f(); } finally { h(); }",
        "try { f(); } catch ({ message, stack: s }) { g(message, s); }",
        "with (o) { f(x); }",
        "debugger;",
        ";;;",
        "lbl: { break lbl; }",
        "function f(a, b = 1, ...rest) { return a + b + rest.length; }",
        "function g() { 'use strict'; return 1; }",
    ];
    for source in sources {
        compile(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    }
}

#[test]
fn expressions_parse() {
    let sources = [
        "x = a ? b : c;",
        "x = a ?? b ?? c;",
        "x = a || b && c | d ^ e & f;",
        "x = a == b !== c;",
        "x = a < b >> 2 << 1 >>> 3;",
        "x = -a * +b / ~c % !d;",
        "x = 2 ** 3 ** 2;",
        "x = (-2) ** 2;",
        "x = typeof a + void b;",
        "x = delete a.b;",
        "x = a++ + --b;",
        "x = a.b.c[d](e, ...f);",
        "x = new C(1, 2);",
        "x = new C;",
        "x = a?.b.c?.();",
        "x = a?.[k];",
        "x = `one ${1 + 2} two ${f()} three`;",
        "x = tag`head ${v} tail`;",
        "x = { a, b: 1, 'c': 2, 3: d, [k]: v, m() {}, get g() { return 1; }, set s(v) {}, ...rest };",
        "x = { __proto__: p, async m() {}, *gen() {}, async *agen() {} };",
        "x = [1, , 2, ...xs, 3];",
        "x = function named() { return named; };",
        "x = (a, b) => a + b;",
        "x = a => a * 2;",
        "x = async (a) => await a;",
        "x = async a => a;",
        "([a, b] = pair); ({ x: c = 3, ...rest } = obj);",
        "x = /ab+c/gi; y = 1 / 2; z = a / b / c;",
        "x = 'a' + \"b\";",
        "f(x = 3);",
        "x &&= 1; x ||= 2; x ??= 3;",
        "x **= 2; x <<= 1; x >>>= 2; x &= 3; x |= 4; x ^= 5; x %= 6;",
    ];
    for source in sources {
        compile(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    }
}

#[test]
fn functions_and_classes_parse() {
    let sources = [
        "function* gen() { yield 1; yield* inner(); }",
        "async function af() { await g(); }",
        "async function* ag() { yield await f(); }",
        "async function f() { for await (const x of g()) h(x); }",
        "class A {}",
        "class B extends A { constructor() { super(); } m() { return super.m(); } }",
        "class C { static s() {} get g() { return 1; } set g(v) {} *i() {} static static2() {} }",
        "class D { f = 1; static sf = 2; [k] = 3; }",
        "class E { #priv; m() { return this.#priv; } set(v) { this.#priv = v; } }",
        "class F { #m() { return 1; } call() { return this.#m(); } }",
        "class G { get #a() { return 1; } set #a(v) {} use() { this.#a = this.#a + 1; } }",
        "x = class extends Y {};",
        "function h() { function nested() {} return nested; }",
        "function counter() { let n = 0; return () => n++; }",
    ];
    for source in sources {
        compile(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    }
}

#[test]
fn modules_parse() {
    let sources = [
        "import d from 'mod'; d();",
        "import * as ns from 'mod'; ns.f();",
        "import { a, b as c } from 'mod'; a(c);",
        "import d, { e } from 'mod'; d(e);",
        "import 'side-effect';",
        "export const x = 1;",
        "export var y = 2;",
        "export function f() {}",
        "export class K {}",
        "export default function () {}",
        "export default 40 + 2;",
        "let a = 1, b = 2; export { a, b as bee };",
        "export { a as aa } from 'mod';",
        "export * from 'mod';",
        "export * as ns from 'mod';",
        "import.meta.url;",
        "f(import('mod'));",
    ];
    for source in sources {
        compile_module(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    }
}

#[test]
fn lexical_redefinitions_are_rejected() {
    assert!(error_message("let x = 1; let x = 2;").contains("redefinition of lexical identifier"));
    assert!(error_message("const x = 1; var x = 2;").contains("redefinition of lexical identifier"));
    assert!(error_message("function f(a) { let a; }").contains("redefinition of parameter name"));
    assert!(error_message("{ let y; var y; }").contains("redefinition"));
}

#[test]
fn single_statement_contexts_reject_declarations() {
    assert!(error_message("if (x) let y = 1;").contains("lexical declarations can't appear in single-statement context"));
    assert!(error_message("if (x) class K {}").contains("class declarations can't appear in single-statement context"));
    assert!(error_message("while (x) const c = 1;").contains("single-statement context"));
}

#[test]
fn const_requires_initializer() {
    assert!(error_message("const c;").contains("missing initializer for const variable"));
}

#[test]
fn strict_mode_restrictions() {
    assert!(error_message("'use strict'; with (o) {}").contains("invalid keyword: with"));
    assert!(error_message("'use strict'; function f(eval) {}").contains("invalid argument name in strict code"));
    assert!(error_message("'use strict'; function f(a, a) {}").contains("duplicate argument names"));
    assert!(error_message("'use strict'; delete x;").contains("cannot delete a direct reference in strict mode"));
    assert!(
        error_message("function f(a = 1) { 'use strict'; }")
            .contains("\"use strict\" not allowed in function with default or destructuring parameter")
    );
    // interface is reserved only in strict mode
    compile("var interface = 1;").expect("sloppy mode accepts future reserved words");
    assert!(compile("'use strict'; var interface = 1;").is_err());
}

#[test]
fn misplaced_keywords_are_rejected() {
    assert!(error_message("function f() { yield 1; }").contains("unexpected 'yield' keyword"));
    assert!(error_message("function f() { await g(); }").contains("expecting ';'"));
    assert!(error_message("x = super.y;").contains("'super' is only valid in a method"));
    assert!(error_message("class C { m() { super(); } }").contains("super() is only valid in a derived class constructor"));
    assert!(error_message("new.target;").contains("new.target only allowed within functions"));
    assert!(error_message("import.meta;").contains("import.meta only valid in module code"));
    assert!(error_message("break;").contains("break must be inside loop or switch"));
    assert!(error_message("continue;").contains("continue must be inside loop"));
    assert!(error_message("for (;;) { continue missing; }").contains("break/continue label not found"));
    assert!(error_message("return 1;").contains("return not in a function"));
}

#[test]
fn invalid_targets_are_rejected() {
    assert!(error_message("1 = 2;").contains("invalid assignment left-hand side"));
    assert!(error_message("this = 2;").contains("invalid assignment left-hand side"));
    assert!(error_message("f() ++;").contains("invalid increment/decrement operand"));
    assert!(error_message("for (1 of x) {}").contains("invalid for in/of left hand-side"));
}

#[test]
fn object_and_chain_restrictions() {
    assert!(error_message("x = { __proto__: a, __proto__: b };").contains("duplicate __proto__ property name"));
    assert!(error_message("x = a || b ?? c;").contains("cannot mix ?? with && or ||"));
    assert!(error_message("x = -a ** 2;").contains("left-hand side of '**'"));
    assert!(error_message("x = a?.b`t`;").contains("template literal cannot appear in an optional chain"));
    assert!(error_message("class C { #x; m() { delete this.#x; } }").contains("cannot delete a private class field"));
    assert!(error_message("class C { m() { return this.#missing; } }").contains("undefined private field"));
    assert!(error_message("class C { #d; #d; }").contains("private class field is already defined"));
    assert!(error_message("class C { constructor() {} constructor() {} }")
        .contains("property constructor appears more than once"));
}

#[test]
fn module_restrictions() {
    let err = {
        let mut ctx = Context::new();
        ctx.compile("export const x = 1; export { y as x };", "m.mjs", ParseFlags::MODULE)
            .expect_err("duplicate export")
    };
    assert!(err.message().contains("duplicate exported name 'x'"));

    let mut ctx = Context::new();
    assert!(
        ctx.compile("import eval from 'mod';", "m.mjs", ParseFlags::MODULE)
            .expect_err("eval import")
            .message()
            .contains("invalid import binding")
    );
    // modules are implicitly strict
    assert!(
        ctx.compile("with (o) {}", "m.mjs", ParseFlags::MODULE)
            .expect_err("with in module")
            .message()
            .contains("invalid keyword: with")
    );
    // export outside a module
    assert!(compile("export const x = 1;").is_err());
}

#[test]
fn destructuring_restrictions() {
    assert!(error_message("let [a, ...r, b] = xs;").contains("rest element must be the last one"));
    assert!(error_message("let [...[a] = 1] = xs;").contains("rest element cannot have a default value"));
    assert!(error_message("let { a, ...r, b } = o;").contains("assignment rest property must be last"));
}

#[test]
fn errors_carry_location_and_stack() {
    let mut ctx = Context::new();
    let err = ctx.parse_script("let a = 1;\nlet a = 2;", "file.js", ParseFlags::empty()).expect_err("must fail");
    assert_eq!(err.kind(), silex::ExcKind::SyntaxError);
    assert_eq!(err.file_name(), Some("file.js"));
    assert_eq!(err.line_number(), Some(2));
    assert_eq!(err.stack(), "    at file.js:2\n");
    assert_eq!(err.to_string(), "SyntaxError: invalid redefinition of lexical identifier\n    at file.js:2");
}

#[test]
fn deep_nesting_hits_the_guard() {
    let limits = silex::ResourceLimits { max_nesting_depth: 64, ..Default::default() };
    let mut ctx = Context::with_limits(limits);
    let source = format!("x = {}1{};", "(".repeat(500), ")".repeat(500));
    let err = ctx.parse_script(&source, "deep.js", ParseFlags::empty()).expect_err("must overflow");
    assert!(err.message().contains("stack overflow"));
}
