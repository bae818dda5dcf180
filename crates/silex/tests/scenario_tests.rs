//! The end-to-end compilation scenarios: source in, specific observable
//! bytecode shapes out.

mod common;

use common::{assert_fully_resolved, decode, has_op_subsequence};
use silex::{Context, Opcode, ParseFlags};

#[test]
fn let_binding_in_direct_eval_uses_checked_slots() {
    // let x = 1; x + 2  (direct eval so the lexical lives in a local slot)
    let mut ctx = Context::new();
    let tree = ctx
        .compile("let x = 1; x + 2", "s1.js", ParseFlags::EVAL | ParseFlags::DIRECT_EVAL)
        .expect("compiles");
    let root = tree.root();
    assert_fully_resolved(&tree);

    let insns = decode(root);
    // the initialization: push_i32 1 ; put_loc_check_init <x>
    let init = insns
        .windows(2)
        .find(|w| w[0].op == Opcode::PushI32 && w[0].operand == Some(1) && w[1].op == Opcode::PutLocCheckInit)
        .expect("checked initialization of the let binding");
    let x_slot = init[1].operand.expect("slot");

    // the read back: get_loc_check <x> ; push_i32 2 ; add ; put_loc <ret>
    let read = insns
        .windows(4)
        .find(|w| {
            w[0].op == Opcode::GetLocCheck
                && w[0].operand == Some(x_slot)
                && w[1].op == Opcode::PushI32
                && w[1].operand == Some(2)
                && w[2].op == Opcode::Add
                && w[3].op == Opcode::PutLoc
        })
        .expect("checked read feeding the addition");
    assert_eq!(read[3].operand, Some(root.eval_ret_idx as u32), "the result lands in the hidden eval slot");
    ctx.free_tree(tree);
}

#[test]
fn lexical_redefinition_is_a_syntax_error() {
    let mut ctx = Context::new();
    let err = ctx.parse_script("let x = 1; let x = 2", "s2.js", ParseFlags::empty()).expect_err("must fail");
    assert_eq!(err.kind(), silex::ExcKind::SyntaxError);
    assert!(err.message().contains("redefinition of lexical identifier"));
}

#[test]
fn private_fields_resolve_through_the_class_scope() {
    let mut ctx = Context::new();
    let source = "class C { #f; get() { return this.#f; } set(v) { this.#f = v; } }";

    // before resolution the accessors carry the placeholder forms
    let tree = ctx.parse_script(source, "s3.js", ParseFlags::empty()).expect("parses");
    let mut saw_get = false;
    let mut saw_put = false;
    for id in tree.post_order() {
        let fd = tree.get(id);
        saw_get |= has_op_subsequence(fd, &[Opcode::ScopeGetPrivateField]);
        saw_put |= has_op_subsequence(fd, &[Opcode::ScopePutPrivateField]);
    }
    assert!(saw_get && saw_put, "accessors reference #f through scope placeholders");
    ctx.free_tree(tree);

    // after resolution they are concrete private-symbol loads and stores
    let tree = ctx.compile(source, "s3.js", ParseFlags::empty()).expect("compiles");
    assert_fully_resolved(&tree);
    let mut saw_sym = false;
    let mut saw_load = false;
    let mut saw_store = false;
    for id in tree.post_order() {
        let fd = tree.get(id);
        saw_sym |= has_op_subsequence(fd, &[Opcode::PrivateSymbol]);
        saw_load |= has_op_subsequence(fd, &[Opcode::GetPrivateField]);
        saw_store |= has_op_subsequence(fd, &[Opcode::PutPrivateField]);
    }
    assert!(saw_sym, "the field declaration creates the private symbol");
    assert!(saw_load && saw_store, "accessors load/store through the resolved symbol");
    ctx.free_tree(tree);
}

#[test]
fn breaking_out_of_for_of_closes_the_iterator() {
    let mut ctx = Context::new();
    let tree = ctx
        .compile("for (const x of [1,2,3]) { if (x === 2) break; }", "s4.js", ParseFlags::empty())
        .expect("compiles");
    let root = tree.root();
    assert!(has_op_subsequence(root, &[Opcode::ForOfStart, Opcode::ForOfNext]));
    // the break jumps to the loop's break label, whose handler closes the
    // iterator
    let insns = decode(root);
    let close = insns.iter().position(|i| i.op == Opcode::IteratorClose).expect("iterator_close present");
    let goto_break = insns
        .iter()
        .find(|i| i.op == Opcode::Goto && {
            let label = i.operand.expect("label") as usize;
            root.label_slots[label].pos2 >= 0 && (root.label_slots[label].pos2 as usize) <= insns[close].pos
        })
        .is_some();
    assert!(goto_break, "a goto reaches the close handler");
    ctx.free_tree(tree);
}

#[test]
fn for_await_of_awaits_each_step() {
    let mut ctx = Context::new();
    let tree = ctx
        .compile("async function* f(g) { for await (const x of g()) yield x; }", "s5.js", ParseFlags::empty())
        .expect("compiles");
    let f = tree
        .post_order()
        .into_iter()
        .map(|id| tree.get(id))
        .find(|fd| ctx.atoms().get_str(fd.func_name) == "f")
        .expect("f exists");
    assert!(has_op_subsequence(f, &[Opcode::ForAwaitOfStart]));
    assert!(
        has_op_subsequence(f, &[Opcode::CallMethod, Opcode::Await, Opcode::IteratorGetValueDone]),
        "each next() result is awaited"
    );
    assert!(has_op_subsequence(f, &[Opcode::Yield]), "yield is legal in the async generator body");
    ctx.free_tree(tree);
}

#[test]
fn optional_chain_joins_at_a_single_label() {
    let mut ctx = Context::new();
    let tree = ctx.compile("a?.b.c?.()", "s6.js", ParseFlags::empty()).expect("compiles");
    let root = tree.root();
    let insns = decode(root);

    let guards: Vec<_> = insns
        .windows(2)
        .filter(|w| w[0].op == Opcode::IsUndefinedOrNull && w[1].op == Opcode::IfFalse)
        .collect();
    assert_eq!(guards.len(), 2, "one guard per optional link");

    // both short-circuit paths jump to the same trailing label
    let exits: Vec<u32> = insns
        .windows(2)
        .filter(|w| w[0].op == Opcode::Undefined && w[1].op == Opcode::Goto)
        .map(|w| w[1].operand.expect("label"))
        .collect();
    assert_eq!(exits.len(), 2);
    assert_eq!(exits[0], exits[1], "the chain short-circuits to one shared exit");
    ctx.free_tree(tree);
}
