//! Per-function compilation state.
//!
//! One parse invocation builds a tree of [`FuncDef`] records, one per
//! script/module/function/arrow/method, stored in an arena and linked by
//! [`FuncId`]. The record carries everything the emitter and the resolver
//! need: argument and variable tables, the lexical scope forest, closure
//! captures, hoisted global definitions, module side-tables, the bytecode
//! buffer with its label slots, the constant pool, and the debug line
//! stream.
//!
//! Cross-function references (closure captures, nested function constants)
//! are ids and slot indexes, never pointers; the resolver fixes them up in a
//! post-order walk over the arena.

use bitflags::bitflags;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    atoms::{Atom, AtomTable},
    bytecode::{OpFmt, Opcode},
    strings::JsString,
};

/// Index of a function record in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub(crate) usize);

impl FuncId {
    /// The arena slot this id names.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

bitflags! {
    /// Inherited compilation mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JsMode: u8 {
        /// `"use strict"` (or an inherently strict context).
        const STRICT = 1 << 0;
        /// `"use strip"`: do not retain source or debug info.
        const STRIP = 1 << 1;
        /// `"use math"` (recognized, but the bignum extension stays off).
        const MATH = 1 << 2;
    }
}

/// Generator/async classification of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Normal,
    Generator,
    Async,
    AsyncGenerator,
}

impl FuncKind {
    /// True for `function*` and `async function*`.
    #[must_use]
    pub fn is_generator(self) -> bool {
        matches!(self, Self::Generator | Self::AsyncGenerator)
    }

    /// True for `async function` and `async function*`.
    #[must_use]
    pub fn is_async(self) -> bool {
        matches!(self, Self::Async | Self::AsyncGenerator)
    }

    /// Combines the generator bit into this kind.
    #[must_use]
    pub fn with_generator(self) -> Self {
        match self {
            Self::Normal | Self::Generator => Self::Generator,
            Self::Async | Self::AsyncGenerator => Self::AsyncGenerator,
        }
    }
}

/// How a function is being parsed, which drives the bindings it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncType {
    /// `function f() {}` statement.
    Statement,
    /// Annex-B function-in-block, declared like a `var`.
    Var,
    /// Function expression.
    Expr,
    /// Arrow function.
    Arrow,
    /// Object/class method.
    Method,
    Getter,
    Setter,
    ClassConstructor,
    DerivedClassConstructor,
}

/// How the compilation unit was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalType {
    Global,
    Module,
    /// `eval()` in the scope of a calling function.
    Direct,
    Indirect,
}

/// Classification of a variable definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Normal,
    /// Lexically scoped function declaration.
    FunctionDecl,
    /// `var`-like function declaration from non-strict direct eval.
    NewFunctionDecl,
    /// Catch clause binding.
    Catch,
    /// Implicit binding holding a function expression's own name.
    FunctionName,
    PrivateField,
    PrivateMethod,
    PrivateGetter,
    PrivateSetter,
    PrivateGetterSetter,
}

impl VarKind {
    /// True for the `#name` binding kinds declared in a class body scope.
    #[must_use]
    pub fn is_private(self) -> bool {
        matches!(
            self,
            Self::PrivateField
                | Self::PrivateMethod
                | Self::PrivateGetter
                | Self::PrivateSetter
                | Self::PrivateGetterSetter
        )
    }
}

/// Kinds accepted by `define_var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarDeclKind {
    Var,
    Let,
    Const,
    FunctionDecl,
    NewFunctionDecl,
    Catch,
    With,
}

/// Bit added to a slot id to mark an argument rather than a local.
pub const ARGUMENT_VAR_OFFSET: i32 = 0x2000_0000;
/// Sentinel slot id for hoisted globals.
pub const GLOBAL_VAR_OFFSET: i32 = 0x4000_0000;
/// Scope index reserved for the argument scope when parameter expressions
/// are present.
pub const ARG_SCOPE_INDEX: usize = 1;
/// `scope_next` sentinel terminating the argument scope chain.
pub const ARG_SCOPE_END: i32 = -2;

/// One argument or local variable.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: Atom,
    /// Scope that declared the variable (0 = the var/arg scope).
    pub scope_level: u16,
    /// Next variable of the same scope (`-1` ends the chain, `-2` marks the
    /// argument scope boundary). For `var`s this temporarily records the
    /// declaring scope until hoisting normalizes it.
    pub scope_next: i32,
    pub kind: VarKind,
    pub is_const: bool,
    pub is_lexical: bool,
    pub is_captured: bool,
    /// Constant-pool slot of the function assigned to this variable at
    /// scope entry, or `-1`.
    pub func_pool_idx: i32,
}

impl VarDef {
    fn new(name: Atom) -> Self {
        Self {
            name,
            scope_level: 0,
            scope_next: -1,
            kind: VarKind::Normal,
            is_const: false,
            is_lexical: false,
            is_captured: false,
            func_pool_idx: -1,
        }
    }
}

/// A captured binding: either an outer local/argument (`is_local`) or a
/// closure variable of the parent (`!is_local`), identified by slot index.
#[derive(Debug, Clone)]
pub struct ClosureVar {
    pub name: Atom,
    pub var_idx: u16,
    pub is_local: bool,
    pub is_arg: bool,
    pub is_const: bool,
    pub is_lexical: bool,
    pub kind: VarKind,
}

/// A hoisted global definition (top-level scripts, eval and modules only).
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: Atom,
    /// Constant-pool slot for function declarations, `-1` otherwise.
    pub cpool_idx: i32,
    pub force_init: bool,
    pub is_lexical: bool,
    pub is_const: bool,
    pub scope_level: u16,
}

/// One lexical scope. Scopes form a forest rooted at scope 0.
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub parent: i32,
    /// First variable declared in the scope (`-1` if none).
    pub first: i32,
}

/// A jump target.
///
/// `pos` is the byte position after the `label` opcode in the parse-time
/// buffer; `pos2` is assigned by the resolver in the rewritten buffer.
/// `ref_count` tracks outstanding references; goto-like emissions record
/// their operand positions in `relocs`.
#[derive(Debug, Clone)]
pub struct LabelSlot {
    pub ref_count: i32,
    pub pos: i32,
    pub pos2: i32,
    pub relocs: SmallVec<[u32; 2]>,
}

/// One frame of the control-flow stack used by `break`/`continue`/`return`
/// emission to unwind iterators and trampoline through `finally` blocks.
#[derive(Debug, Clone)]
pub struct BlockEnv {
    /// Statement label, or `Atom::NULL`.
    pub label_name: Atom,
    pub label_break: i32,
    pub label_cont: i32,
    /// Stack slots to drop when jumping out of this construct.
    pub drop_count: i32,
    /// Label of the `finally` trampoline, or `-1`.
    pub label_finally: i32,
    pub scope_level: u16,
    /// True for `for-of`/`for-await-of`: leaving must close the iterator.
    pub has_iterator: bool,
}

/// A constant-pool entry.
///
/// The pool stores parse-time values only; turning them into runtime
/// objects (function objects, RegExp compilation, sealed template objects)
/// is the interpreter's concern.
#[derive(Debug, Clone)]
pub enum ConstEntry {
    /// A nested function; the child's `parent_cpool_idx` points back here.
    Func(FuncId),
    Str(JsString),
    Num(f64),
    /// Uncompiled regexp literal, captured bit-faithfully.
    Regexp { body: JsString, flags: JsString },
    /// Template object for a tagged template: cooked strings (`None` for
    /// parts with invalid escapes) plus the raw strings.
    TemplateObject { cooked: Vec<Option<JsString>>, raw: Vec<JsString> },
}

/// Module import entry: the closure variable `var_idx` receives the binding
/// named `import_name` from `req_module_idx`.
#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub import_name: Atom,
    pub var_idx: u16,
    pub req_module_idx: u32,
}

/// Payload of an export entry.
#[derive(Debug, Clone)]
pub enum ExportKind {
    /// Export of a local binding.
    Local,
    /// Re-export from another module.
    Indirect { req_module_idx: u32 },
}

/// One `export` declaration result.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub local_name: Atom,
    pub export_name: Atom,
    pub kind: ExportKind,
}

/// A `from "module"` reference.
#[derive(Debug, Clone)]
pub struct ReqModuleEntry {
    pub module_name: Atom,
}

/// `export * from "module"`.
#[derive(Debug, Clone, Copy)]
pub struct StarExportEntry {
    pub req_module_idx: u32,
}

/// Module side-tables, present on the top-level function of a module.
#[derive(Debug, Default)]
pub struct ModuleDef {
    pub req_modules: Vec<ReqModuleEntry>,
    pub imports: Vec<ImportEntry>,
    /// Keyed by export name; insertion order is declaration order.
    pub exports: IndexMap<Atom, ExportEntry>,
    pub star_exports: Vec<StarExportEntry>,
}

impl ModuleDef {
    /// Registers a module request, reusing an existing entry. A new entry
    /// takes its own reference on the name; the caller keeps (and later
    /// releases) its own.
    pub fn add_req_module(&mut self, atoms: &mut AtomTable, module_name: Atom) -> u32 {
        if let Some(i) = self.req_modules.iter().position(|e| e.module_name == module_name) {
            return i as u32;
        }
        atoms.ref_atom(module_name);
        self.req_modules.push(ReqModuleEntry { module_name });
        (self.req_modules.len() - 1) as u32
    }
}

/// Per-function compilation record.
#[derive(Debug)]
pub struct FuncDef {
    // tree structure
    pub parent: Option<FuncId>,
    pub children: Vec<FuncId>,
    /// Slot in the parent's constant pool holding this function.
    pub parent_cpool_idx: i32,
    /// The parent's scope level at the point this function started.
    pub parent_scope_level: u16,

    // identity
    pub func_name: Atom,
    pub filename: Atom,
    pub line_num: u32,
    pub func_kind: FuncKind,
    pub func_type: FuncType,
    pub js_mode: JsMode,

    // flags
    pub is_eval: bool,
    pub eval_type: EvalType,
    pub is_func_expr: bool,
    pub is_global_var: bool,
    pub is_derived_class_constructor: bool,
    pub has_simple_parameter_list: bool,
    pub has_parameter_expressions: bool,
    pub has_use_strict: bool,
    pub has_home_object: bool,
    pub has_prototype: bool,
    pub has_arguments_binding: bool,
    pub has_this_binding: bool,
    pub arguments_allowed: bool,
    pub new_target_allowed: bool,
    pub super_allowed: bool,
    pub super_call_allowed: bool,
    pub in_function_body: bool,
    pub backtrace_barrier: bool,
    /// A direct `eval(...)` call site was seen in this function.
    pub has_eval_call: bool,
    /// The function needs its home object at instantiation (private brand
    /// checks in class methods).
    pub need_home_object: bool,
    /// Set on a fields-initializer function once a private member forces
    /// brand tracking; materializes the `push_brand` placeholder.
    pub has_brand: bool,

    // variables
    pub args: Vec<VarDef>,
    pub vars: Vec<VarDef>,
    pub defined_arg_count: u16,
    pub var_object_idx: i32,
    pub arg_var_object_idx: i32,
    pub arguments_var_idx: i32,
    pub arguments_arg_idx: i32,
    pub func_var_idx: i32,
    pub eval_ret_idx: i32,
    pub this_var_idx: i32,
    pub new_target_var_idx: i32,
    pub this_active_func_var_idx: i32,
    pub home_object_var_idx: i32,

    // scopes
    pub scopes: Vec<Scope>,
    pub scope_level: usize,
    /// Head of the current scope's variable chain.
    pub scope_first: i32,
    pub body_scope: i32,

    // captures and hoisted globals
    pub closure_vars: Vec<ClosureVar>,
    pub global_vars: Vec<GlobalVar>,

    // module side-tables
    pub module: Option<ModuleDef>,

    // emission state
    pub byte_code: Vec<u8>,
    pub last_opcode_pos: i32,
    pub last_opcode_line_num: u32,
    pub jump_size: u32,
    pub label_slots: Vec<LabelSlot>,
    pub line_number_size: u32,
    pub cpool: Vec<ConstEntry>,
    pub block_env: Vec<BlockEnv>,

    // debug info
    pub pc2line: Vec<u8>,
    pub source: Option<String>,
}

impl FuncDef {
    /// Creates an empty record, inheriting `js_mode` and the parent scope
    /// level the way nested parsing requires.
    #[must_use]
    pub fn new(
        parent: Option<FuncId>,
        parent_js_mode: JsMode,
        parent_scope_level: u16,
        is_eval: bool,
        eval_type: EvalType,
        is_func_expr: bool,
        filename: Atom,
        line_num: u32,
    ) -> Self {
        Self {
            parent,
            children: Vec::new(),
            parent_cpool_idx: -1,
            parent_scope_level,
            func_name: Atom::NULL,
            filename,
            line_num,
            func_kind: FuncKind::Normal,
            func_type: FuncType::Statement,
            js_mode: parent_js_mode,
            is_eval,
            eval_type,
            is_func_expr,
            is_global_var: false,
            is_derived_class_constructor: false,
            has_simple_parameter_list: true,
            has_parameter_expressions: false,
            has_use_strict: false,
            has_home_object: false,
            has_prototype: false,
            has_arguments_binding: false,
            has_this_binding: false,
            arguments_allowed: true,
            new_target_allowed: false,
            super_allowed: false,
            super_call_allowed: false,
            in_function_body: false,
            backtrace_barrier: false,
            has_eval_call: false,
            need_home_object: false,
            has_brand: false,
            args: Vec::new(),
            vars: Vec::new(),
            defined_arg_count: 0,
            var_object_idx: -1,
            arg_var_object_idx: -1,
            arguments_var_idx: -1,
            arguments_arg_idx: -1,
            func_var_idx: -1,
            eval_ret_idx: -1,
            this_var_idx: -1,
            new_target_var_idx: -1,
            this_active_func_var_idx: -1,
            home_object_var_idx: -1,
            scopes: vec![Scope { parent: -1, first: -1 }],
            scope_level: 0,
            scope_first: -1,
            body_scope: -1,
            closure_vars: Vec::new(),
            global_vars: Vec::new(),
            module: None,
            byte_code: Vec::new(),
            last_opcode_pos: -1,
            last_opcode_line_num: line_num,
            jump_size: 0,
            label_slots: Vec::new(),
            line_number_size: 0,
            cpool: Vec::new(),
            block_env: Vec::new(),
            pc2line: Vec::new(),
            source: None,
        }
    }

    /// Finds an argument slot by name, searching most recent first.
    /// The returned id carries [`ARGUMENT_VAR_OFFSET`].
    #[must_use]
    pub fn find_arg(&self, name: Atom) -> i32 {
        for i in (0..self.args.len()).rev() {
            if self.args[i].name == name {
                return i as i32 | ARGUMENT_VAR_OFFSET;
            }
        }
        -1
    }

    /// Finds a function-level (`scope_level == 0`) variable or argument.
    #[must_use]
    pub fn find_var(&self, name: Atom) -> i32 {
        for i in (0..self.vars.len()).rev() {
            if self.vars[i].name == name && self.vars[i].scope_level == 0 {
                return i as i32;
            }
        }
        self.find_arg(name)
    }

    /// Finds a declaration of `name` directly in `scope_level`.
    #[must_use]
    pub fn find_var_in_scope(&self, name: Atom, scope_level: usize) -> i32 {
        let mut idx = self.scopes[scope_level].first;
        while idx >= 0 {
            let vd = &self.vars[idx as usize];
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

    /// True if `scope` equals `parent_scope` or sits below it.
    #[must_use]
    pub fn is_child_scope(&self, mut scope: i32, parent_scope: i32) -> bool {
        while scope >= 0 {
            if scope == parent_scope {
                return true;
            }
            scope = self.scopes[scope as usize].parent;
        }
        false
    }

    /// Finds a `var` declared in `scope_level` or one of its child scopes.
    #[must_use]
    pub fn find_var_in_child_scope(&self, name: Atom, scope_level: usize) -> i32 {
        for (i, vd) in self.vars.iter().enumerate() {
            if vd.name == name && vd.scope_level == 0 && self.is_child_scope(vd.scope_next, scope_level as i32) {
                return i as i32;
            }
        }
        -1
    }

    /// Finds a hoisted global by name.
    #[must_use]
    pub fn find_global_var(&self, name: Atom) -> Option<usize> {
        self.global_vars.iter().position(|hf| hf.name == name)
    }

    /// Walks a scope chain (starting at the variable index `scope_idx`)
    /// looking for a lexical declaration of `name`. Returns the variable
    /// index, or [`GLOBAL_VAR_OFFSET`] for a lexical global, or `-1`.
    #[must_use]
    pub fn find_lexical_decl(&self, name: Atom, mut scope_idx: i32, check_catch_var: bool) -> i32 {
        while scope_idx >= 0 {
            let vd = &self.vars[scope_idx as usize];
            if vd.name == name && (vd.is_lexical || (vd.kind == VarKind::Catch && check_catch_var)) {
                return scope_idx;
            }
            scope_idx = vd.scope_next;
        }
        if self.is_eval && self.eval_type == EvalType::Global {
            if let Some(i) = self.find_global_var(name) {
                if self.global_vars[i].is_lexical {
                    return GLOBAL_VAR_OFFSET;
                }
            }
        }
        -1
    }

    /// Appends a plain variable slot. The caller checks the limit.
    pub fn add_var(&mut self, atoms: &mut AtomTable, name: Atom) -> u16 {
        atoms.ref_atom(name);
        self.vars.push(VarDef::new(name));
        (self.vars.len() - 1) as u16
    }

    /// Appends a variable threaded into the current scope chain.
    pub fn add_scope_var(&mut self, atoms: &mut AtomTable, name: Atom, kind: VarKind) -> u16 {
        let idx = self.add_var(atoms, name);
        let vd = &mut self.vars[idx as usize];
        vd.kind = kind;
        vd.scope_level = self.scope_level as u16;
        vd.scope_next = self.scope_first;
        self.scopes[self.scope_level].first = i32::from(idx);
        self.scope_first = i32::from(idx);
        idx
    }

    /// Appends an argument slot.
    pub fn add_arg(&mut self, atoms: &mut AtomTable, name: Atom) -> u16 {
        atoms.ref_atom(name);
        self.args.push(VarDef::new(name));
        (self.args.len() - 1) as u16
    }

    /// Lazily creates the binding holding a function expression's own name.
    pub fn add_func_var(&mut self, atoms: &mut AtomTable, name: Atom) -> u16 {
        if self.func_var_idx >= 0 {
            return self.func_var_idx as u16;
        }
        let idx = self.add_var(atoms, name);
        self.func_var_idx = i32::from(idx);
        self.vars[idx as usize].kind = VarKind::FunctionName;
        if self.js_mode.contains(JsMode::STRICT) {
            self.vars[idx as usize].is_const = true;
        }
        idx
    }

    /// Lazily creates the `arguments` pseudo-variable.
    pub fn add_arguments_var(&mut self, atoms: &mut AtomTable) -> u16 {
        if self.arguments_var_idx >= 0 {
            return self.arguments_var_idx as u16;
        }
        let idx = self.add_var(atoms, crate::atoms::PredefAtom::Arguments.atom());
        self.arguments_var_idx = i32::from(idx);
        idx
    }

    /// Appends a closure-variable entry; the resolver deduplicates by
    /// `(var_idx, is_arg, is_local)` identity before calling this.
    pub fn add_closure_var(
        &mut self,
        atoms: &mut AtomTable,
        is_local: bool,
        is_arg: bool,
        var_idx: u16,
        name: Atom,
        is_const: bool,
        is_lexical: bool,
        kind: VarKind,
    ) -> usize {
        atoms.ref_atom(name);
        self.closure_vars.push(ClosureVar { name, var_idx, is_local, is_arg, is_const, is_lexical, kind });
        self.closure_vars.len() - 1
    }

    /// Finds a closure variable by name.
    #[must_use]
    pub fn find_closure_var(&self, name: Atom) -> i32 {
        for (i, cv) in self.closure_vars.iter().enumerate() {
            if cv.name == name {
                return i as i32;
            }
        }
        -1
    }

    /// Appends a hoisted global definition and returns its index.
    pub fn add_global_var(&mut self, atoms: &mut AtomTable, name: Atom) -> usize {
        atoms.ref_atom(name);
        self.global_vars.push(GlobalVar {
            name,
            cpool_idx: -1,
            force_init: false,
            is_lexical: false,
            is_const: false,
            scope_level: self.scope_level as u16,
        });
        self.global_vars.len() - 1
    }

    /// Appends a constant-pool entry and returns its index.
    pub fn cpool_add(&mut self, entry: ConstEntry) -> u32 {
        self.cpool.push(entry);
        (self.cpool.len() - 1) as u32
    }

    /// The opcode at `pos` in the bytecode buffer.
    ///
    /// # Panics
    ///
    /// Panics on an invalid opcode byte, which indicates emitter corruption.
    #[must_use]
    pub fn opcode_at(&self, pos: usize) -> Opcode {
        Opcode::from_repr(self.byte_code[pos]).expect("invalid opcode byte in bytecode")
    }

    /// Reads a u16 operand.
    #[must_use]
    pub fn get_u16(&self, pos: usize) -> u16 {
        u16::from_le_bytes([self.byte_code[pos], self.byte_code[pos + 1]])
    }

    /// Reads a u32 operand.
    #[must_use]
    pub fn get_u32(&self, pos: usize) -> u32 {
        u32::from_le_bytes([
            self.byte_code[pos],
            self.byte_code[pos + 1],
            self.byte_code[pos + 2],
            self.byte_code[pos + 3],
        ])
    }

    /// Reads an atom operand.
    #[must_use]
    pub fn get_atom(&self, pos: usize) -> Atom {
        Atom::from_raw(self.get_u32(pos))
    }

    /// Overwrites a u32 operand in place.
    pub fn put_u32(&mut self, pos: usize, v: u32) {
        self.byte_code[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Overwrites an opcode byte in place (peephole rewrites).
    pub fn set_opcode(&mut self, pos: usize, op: Opcode) {
        self.byte_code[pos] = op as u8;
    }

    /// Drops the instruction the peephole cursor points at, transferring
    /// ownership of its operands (including any atom) to the caller.
    pub fn truncate_last_opcode(&mut self) {
        debug_assert!(self.last_opcode_pos >= 0);
        self.byte_code.truncate(self.last_opcode_pos as usize);
        self.last_opcode_pos = -1;
    }

    /// Releases every atom reference this record owns: name tables, module
    /// tables, hoisted globals, and the atom operands embedded in the
    /// bytecode.
    pub fn free(&mut self, atoms: &mut AtomTable) {
        atoms.unref_atom(self.func_name);
        atoms.unref_atom(self.filename);
        for vd in self.args.drain(..).chain(self.vars.drain(..)) {
            atoms.unref_atom(vd.name);
        }
        for cv in self.closure_vars.drain(..) {
            atoms.unref_atom(cv.name);
        }
        for hf in self.global_vars.drain(..) {
            atoms.unref_atom(hf.name);
        }
        if let Some(module) = self.module.take() {
            for e in module.req_modules {
                atoms.unref_atom(e.module_name);
            }
            for e in module.imports {
                atoms.unref_atom(e.import_name);
            }
            for (_, e) in module.exports {
                atoms.unref_atom(e.local_name);
                atoms.unref_atom(e.export_name);
            }
        }
        let mut pos = 0;
        while pos < self.byte_code.len() {
            let op = self.opcode_at(pos);
            if op.fmt().has_atom() {
                atoms.unref_atom(self.get_atom(pos + 1));
            }
            pos += op.size();
        }
        self.byte_code.clear();
        self.cpool.clear();
    }

    /// True when the bytecode still contains placeholder opcodes.
    #[must_use]
    pub fn has_scope_placeholders(&self) -> bool {
        let mut pos = 0;
        while pos < self.byte_code.len() {
            let op = self.opcode_at(pos);
            if op.is_scope_placeholder() {
                return true;
            }
            pos += op.size();
        }
        false
    }

    /// Validates an operand layout assumption used across the resolver.
    pub(crate) fn fmt_at(&self, pos: usize) -> OpFmt {
        self.opcode_at(pos).fmt()
    }
}

/// A completed `FuncDef` tree.
///
/// Produced by `parse_script`; consumed (and rewritten in place) by
/// `resolve_variables`. Dropping a tree without calling [`FuncTree::free`]
/// leaks atom references, so the context's entry points always balance it.
#[derive(Debug)]
pub struct FuncTree {
    pub(crate) funcs: Vec<FuncDef>,
    pub(crate) root: FuncId,
}

impl FuncTree {
    pub(crate) fn new(funcs: Vec<FuncDef>, root: FuncId) -> Self {
        Self { funcs, root }
    }

    /// The root (script/module/eval) function.
    #[must_use]
    pub fn root(&self) -> &FuncDef {
        &self.funcs[self.root.0]
    }

    /// The root id.
    #[must_use]
    pub fn root_id(&self) -> FuncId {
        self.root
    }

    /// Borrows a function record.
    #[must_use]
    pub fn get(&self, id: FuncId) -> &FuncDef {
        &self.funcs[id.0]
    }

    /// Mutably borrows a function record.
    #[must_use]
    pub fn get_mut(&mut self, id: FuncId) -> &mut FuncDef {
        &mut self.funcs[id.0]
    }

    /// Number of functions in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// True when the tree holds no functions (never the case for a
    /// successful parse).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Ids in post-order (children before parents), the order the resolver
    /// processes functions in.
    #[must_use]
    pub fn post_order(&self) -> Vec<FuncId> {
        let mut out = Vec::with_capacity(self.funcs.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, visited)) = stack.pop() {
            if visited {
                out.push(id);
            } else {
                stack.push((id, true));
                for &child in self.funcs[id.0].children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        out
    }

    /// Releases every atom reference owned by the tree.
    pub fn free(mut self, atoms: &mut AtomTable) {
        for fd in &mut self.funcs {
            fd.free(atoms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::PredefAtom;

    fn test_fd(atoms: &AtomTable) -> FuncDef {
        let _ = atoms;
        FuncDef::new(None, JsMode::empty(), 0, false, EvalType::Global, false, Atom::NULL, 1)
    }

    #[test]
    fn scope_chain_threads_variables() {
        let mut atoms = AtomTable::new();
        let mut fd = test_fd(&atoms);
        fd.scopes.push(Scope { parent: 0, first: -1 });
        fd.scope_level = 1;
        fd.scope_first = -1;
        let a = fd.add_scope_var(&mut atoms, PredefAtom::Name.atom(), VarKind::Normal);
        let b = fd.add_scope_var(&mut atoms, PredefAtom::Length.atom(), VarKind::Normal);
        assert_eq!(fd.scopes[1].first, i32::from(b));
        assert_eq!(fd.vars[b as usize].scope_next, i32::from(a));
        assert_eq!(fd.vars[a as usize].scope_next, -1);
        assert_eq!(fd.find_var_in_scope(PredefAtom::Name.atom(), 1), i32::from(a));
        assert_eq!(fd.find_var_in_scope(PredefAtom::Stack.atom(), 1), -1);
    }

    #[test]
    fn args_are_tagged_with_offset() {
        let mut atoms = AtomTable::new();
        let mut fd = test_fd(&atoms);
        fd.add_arg(&mut atoms, PredefAtom::Name.atom());
        let found = fd.find_var(PredefAtom::Name.atom());
        assert!(found & ARGUMENT_VAR_OFFSET != 0);
        assert_eq!(found & !ARGUMENT_VAR_OFFSET, 0);
    }

    #[test]
    fn post_order_visits_children_first() {
        let atoms = AtomTable::new();
        let mut funcs = vec![test_fd(&atoms), test_fd(&atoms), test_fd(&atoms)];
        funcs[0].children = vec![FuncId(1), FuncId(2)];
        funcs[1].parent = Some(FuncId(0));
        funcs[2].parent = Some(FuncId(0));
        let tree = FuncTree::new(funcs, FuncId(0));
        let order = tree.post_order();
        assert_eq!(order, vec![FuncId(1), FuncId(2), FuncId(0)]);
    }
}
