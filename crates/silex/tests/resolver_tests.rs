//! Properties of the resolved bytecode: no surviving placeholders, valid
//! label anchors, in-range slots, const-write rejection, closure capture
//! synthesis and hoisted global instantiation.

mod common;

use common::{assert_fully_resolved, decode, has_op_subsequence};
use silex::{Context, FuncTree, Opcode, ParseFlags, ThrowCode};

fn compile(source: &str, flags: ParseFlags) -> (Context, FuncTree) {
    let mut ctx = Context::new();
    let tree = ctx.compile(source, "res.js", flags).expect("compiles");
    (ctx, tree)
}

#[test]
fn no_placeholders_survive() {
    let sources = [
        "let x = 1; x + 2;",
        "function f(a) { let b = a + 1; return function () { return b; }; }",
        "with (o) { f(x); }",
        "class C { #f; get() { return this.#f; } set(v) { this.#f = v; } }",
        "for (const x of xs) { if (x === 2) break; }",
        "try { f(); } catch (e) { g(e); } finally { h(); }",
        "function* g() { yield* inner; }",
    ];
    for source in sources {
        let (mut ctx, tree) = compile(source, ParseFlags::empty());
        assert_fully_resolved(&tree);
        ctx.free_tree(tree);
    }
}

#[test]
fn labels_anchor_inside_the_function() {
    let (mut ctx, tree) = compile(
        "for (let i = 0; i < 3; i++) { if (i === 1) continue; f(i); } while (g()) h();",
        ParseFlags::empty(),
    );
    for id in tree.post_order() {
        let fd = tree.get(id);
        let boundaries: std::collections::HashSet<usize> = decode(fd).iter().map(|i| i.pos).collect();
        for insn in decode(fd) {
            let is_jump = matches!(
                insn.op,
                Opcode::Goto | Opcode::IfTrue | Opcode::IfFalse | Opcode::Catch | Opcode::Gosub | Opcode::Label
            );
            if is_jump {
                let label = insn.operand.expect("label operand") as usize;
                assert!(label < fd.label_slots.len(), "label {label} in range");
                let pos2 = fd.label_slots[label].pos2;
                if insn.op != Opcode::Label {
                    assert!(pos2 >= 0, "referenced label {label} was anchored");
                }
                if pos2 >= 0 {
                    let pos2 = pos2 as usize;
                    assert!(
                        pos2 == fd.byte_code.len() || boundaries.contains(&pos2),
                        "label {label} pos2 {pos2} is an instruction boundary"
                    );
                }
            }
        }
    }
    ctx.free_tree(tree);
}

#[test]
fn slot_operands_are_in_range() {
    let (mut ctx, tree) = compile(
        "function f(a, b) { let c = a; var d = b; { let e = c + d; f(e); } return c; }",
        ParseFlags::empty(),
    );
    for id in tree.post_order() {
        let fd = tree.get(id);
        for insn in decode(fd) {
            match insn.op {
                Opcode::GetLoc
                | Opcode::PutLoc
                | Opcode::GetLocCheck
                | Opcode::PutLocCheck
                | Opcode::PutLocCheckInit
                | Opcode::CloseLoc
                | Opcode::SetLocUninitialized => {
                    let slot = insn.operand.expect("slot operand") as usize;
                    assert!(slot < fd.vars.len(), "{:?} slot {slot} < {}", insn.op, fd.vars.len());
                }
                Opcode::GetArg | Opcode::PutArg => {
                    let slot = insn.operand.expect("slot operand") as usize;
                    assert!(slot < fd.args.len(), "{:?} arg {slot} < {}", insn.op, fd.args.len());
                }
                Opcode::GetVarRef
                | Opcode::PutVarRef
                | Opcode::GetVarRefCheck
                | Opcode::PutVarRefCheck
                | Opcode::PutVarRefCheckInit => {
                    let slot = insn.operand.expect("slot operand") as usize;
                    assert!(slot < fd.closure_vars.len(), "{:?} ref {slot} < {}", insn.op, fd.closure_vars.len());
                }
                _ => {}
            }
        }
    }
    ctx.free_tree(tree);
}

#[test]
fn const_writes_resolve_to_throws() {
    let (mut ctx, tree) = compile("function f() { const c = 1; c = 2; }", ParseFlags::empty());
    let mut found = false;
    for id in tree.post_order() {
        let fd = tree.get(id);
        for insn in decode(fd) {
            if insn.op == Opcode::ThrowError && insn.operand == Some(u32::from(ThrowCode::VarReadOnly as u8)) {
                found = true;
            }
        }
        // after the initializing store, no plain put_loc targets the const
        let insns = decode(fd);
        if let Some(init) = insns.iter().position(|i| i.op == Opcode::PutLocCheckInit) {
            let slot = insns[init].operand;
            assert!(
                !insns[init + 1..].iter().any(|i| i.op == Opcode::PutLoc && i.operand == slot),
                "no direct store to a const after initialization"
            );
        }
    }
    assert!(found, "the write to the const became throw_error(read-only)");
    ctx.free_tree(tree);
}

#[test]
fn captured_variables_become_closure_entries() {
    let (mut ctx, tree) = compile(
        "function outer(a) { let b = a + 1; return function inner() { return a + b; }; }",
        ParseFlags::empty(),
    );
    let inner = tree
        .post_order()
        .into_iter()
        .map(|id| tree.get(id))
        .find(|fd| ctx.atoms().get_str(fd.func_name) == "inner")
        .expect("inner function exists");
    assert_eq!(inner.closure_vars.len(), 2, "a and b are captured");
    assert!(inner.closure_vars.iter().all(|cv| cv.is_local), "both captures refer to outer's own slots");
    assert!(inner.closure_vars.iter().any(|cv| cv.is_arg), "a is an argument capture");
    assert!(has_op_subsequence(inner, &[Opcode::GetVarRef]));

    let outer = tree
        .post_order()
        .into_iter()
        .map(|id| tree.get(id))
        .find(|fd| ctx.atoms().get_str(fd.func_name) == "outer")
        .expect("outer function exists");
    assert!(
        outer.vars.iter().any(|vd| vd.is_captured),
        "the captured local is marked for promotion to a heap cell"
    );
    ctx.free_tree(tree);

    // a capture from a block scope is closed when the block exits
    let (mut ctx, tree) = compile(
        "function fns() { let out; { let b = 1; out = () => b; } return out; }",
        ParseFlags::empty(),
    );
    let f = tree
        .post_order()
        .into_iter()
        .map(|id| tree.get(id))
        .find(|fd| ctx.atoms().get_str(fd.func_name) == "fns")
        .expect("fns exists");
    assert!(has_op_subsequence(f, &[Opcode::CloseLoc]), "leave_scope expanded into close_loc for the capture");
    ctx.free_tree(tree);
}

#[test]
fn hoisted_globals_are_instantiated() {
    let (mut ctx, tree) = compile("var v = 1; function decl() {} let l = 2;", ParseFlags::empty());
    let root = tree.root();
    // the pre-pass check runs before anything else
    assert_eq!(decode(root)[0].op, Opcode::CheckDefineVar);
    assert!(has_op_subsequence(root, &[Opcode::CheckDefineVar, Opcode::DefineVar]));
    assert!(
        has_op_subsequence(root, &[Opcode::FClosure, Opcode::DefineFunc]),
        "function declarations use define_func"
    );
    assert!(root.global_vars.is_empty(), "the hoisted table was consumed");
    ctx.free_tree(tree);
}

#[test]
fn module_hoisting_guard_is_emitted() {
    let mut ctx = Context::new();
    let tree = ctx.compile("export function f() {}\nf();", "m.mjs", ParseFlags::MODULE).expect("compiles");
    let root = tree.root();
    assert!(
        has_op_subsequence(root, &[Opcode::PushThis, Opcode::IfFalse, Opcode::ReturnUndef]),
        "the module body skips the hoisting block on normal evaluation"
    );
    assert!(root.module.is_some());
    ctx.free_tree(tree);
}

#[test]
fn with_scopes_use_membership_trampolines() {
    let (mut ctx, tree) = compile("with (o) { f(x); y = 2; }", ParseFlags::empty());
    let root = tree.root();
    assert!(has_op_subsequence(root, &[Opcode::WithGetVar]), "reads test the with object first");
    assert!(has_op_subsequence(root, &[Opcode::WithMakeRef]), "stores build a reference through the with object");
    assert_fully_resolved(&tree);
    ctx.free_tree(tree);
}

#[test]
fn direct_eval_marks_scope_variables_captured() {
    let (mut ctx, tree) = compile("function f() { let a = 1; eval('a'); return a; }", ParseFlags::empty());
    let f = tree
        .post_order()
        .into_iter()
        .map(|id| tree.get(id))
        .find(|fd| ctx.atoms().get_str(fd.func_name) == "f")
        .expect("f exists");
    assert!(has_op_subsequence(f, &[Opcode::Eval]));
    assert!(f.vars.iter().any(|vd| vd.is_captured && ctx.atoms().get_str(vd.name) == "a"));
    ctx.free_tree(tree);
}

#[test]
fn dead_code_after_return_is_dropped() {
    let (mut ctx, tree) = compile("function f() { return 1; g(); h(); }", ParseFlags::empty());
    let f = tree
        .post_order()
        .into_iter()
        .map(|id| tree.get(id))
        .find(|fd| ctx.atoms().get_str(fd.func_name) == "f")
        .expect("f exists");
    let ops: Vec<Opcode> = decode(f).iter().map(|i| i.op).collect();
    let ret = ops.iter().position(|&o| o == Opcode::Return).expect("return emitted");
    assert!(
        !ops[ret + 1..].contains(&Opcode::GetVar),
        "the unreachable calls disappeared: {ops:?}"
    );
    ctx.free_tree(tree);
}

#[test]
fn dump_renders_resolved_functions() {
    let (mut ctx, tree) = compile("function f(a) { let b = a + 1; return b; }\nf(2);", ParseFlags::empty());
    let out = silex::dump::dump_tree(&ctx, &tree);
    assert!(out.contains("function #0 <eval>"), "got: {out}");
    assert!(out.contains("function #1 f"), "got: {out}");
    assert!(out.contains("get_arg"), "got: {out}");
    assert!(out.contains("put_loc_check_init"), "got: {out}");
    assert!(!out.contains("scope_get_var"), "no placeholders in a resolved dump: {out}");
    ctx.free_tree(tree);
}

#[test]
fn pc2line_streams_are_built() {
    let (mut ctx, tree) = compile("let a = 1;\nlet b = 2;\n\n\nlet c = a + b;\n", ParseFlags::empty());
    let root = tree.root();
    assert!(!root.pc2line.is_empty(), "line transitions were recorded");
    // the last line-bearing instruction is on line 5
    let last = decode(root)
        .iter()
        .filter(|i| i.op == Opcode::LineNum)
        .map(|i| (i.pos, i.operand.unwrap()))
        .next_back()
        .expect("line markers survive resolution");
    assert_eq!(silex::pc2line::find_line_num(&root.pc2line, root.line_num, last.0 as u32 + 5), last.1);
    ctx.free_tree(tree);
}
