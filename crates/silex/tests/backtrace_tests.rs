//! Stack-string rendering over compiled functions.

use silex::backtrace::{StackFrame, build_backtrace};
use silex::{Context, ParseFlags};

#[test]
fn frames_render_with_recovered_lines() {
    let mut ctx = Context::new();
    let source = "function outer() {\n  inner();\n}\nfunction inner() {\n  x();\n}\n";
    let tree = ctx.compile(source, "bt.js", ParseFlags::empty()).expect("compiles");

    let inner = tree
        .post_order()
        .into_iter()
        .find(|&id| ctx.atoms().get_str(tree.get(id).func_name) == "inner")
        .expect("inner exists");
    let outer = tree
        .post_order()
        .into_iter()
        .find(|&id| ctx.atoms().get_str(tree.get(id).func_name) == "outer")
        .expect("outer exists");

    let frames =
        [StackFrame { func: inner, pc: 0 }, StackFrame { func: outer, pc: 0 }, StackFrame { func: tree.root_id(), pc: 0 }];
    let stack = build_backtrace(ctx.atoms(), &tree, &frames, None);
    let lines: Vec<&str> = stack.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("    at inner (bt.js:"), "got: {stack}");
    assert!(lines[1].starts_with("    at outer (bt.js:"), "got: {stack}");
    assert!(lines[2].starts_with("    at <eval> (bt.js:"), "got: {stack}");
    ctx.free_tree(tree);
}

#[test]
fn parse_error_level_comes_first_and_barriers_truncate() {
    let mut ctx = Context::new();
    let tree = ctx
        .compile("f();", "barrier.js", ParseFlags::BACKTRACE_BARRIER)
        .expect("compiles");
    let frames = [StackFrame { func: tree.root_id(), pc: 0 }, StackFrame { func: tree.root_id(), pc: 0 }];
    let stack = build_backtrace(ctx.atoms(), &tree, &frames, Some(("barrier.js", 7)));
    let lines: Vec<&str> = stack.lines().collect();
    assert_eq!(lines[0], "    at barrier.js:7");
    // the barrier stops the walk after the first frame
    assert_eq!(lines.len(), 2, "got: {stack}");
    ctx.free_tree(tree);
}
