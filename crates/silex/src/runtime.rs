//! The runtime context owning the atom table.
//!
//! Everything process-wide the front end needs is the predefined-atom table,
//! loaded once per [`Context`]; all other state lives in the per-parse
//! structures. A context is single-threaded and non-reentrant: one parse or
//! resolve runs at a time.

use crate::{
    atoms::AtomTable,
    error::ParseResult,
    function::FuncTree,
    parser::{ParseFlags, parse_unit},
    resolver::resolve_variables,
    resource::{InterruptHandler, ResourceLimits},
};

/// A front-end compilation context.
pub struct Context {
    pub(crate) atoms: AtomTable,
    pub(crate) limits: ResourceLimits,
    pub(crate) interrupt_handler: Option<InterruptHandler>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("atoms", &self.atoms.count())
            .field("limits", &self.limits)
            .field("interrupt_handler", &self.interrupt_handler.is_some())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    /// Creates a context with explicit limits.
    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Self {
        let mut atoms = AtomTable::new();
        atoms.set_max_atoms(limits.max_atoms);
        Self { atoms, limits, interrupt_handler: None }
    }

    /// Installs (or clears) the host interrupt hook polled at token
    /// boundaries. Returning `true` from the hook aborts the parse with an
    /// uncatchable `InternalError("interrupted")`.
    pub fn set_interrupt_handler(&mut self, handler: Option<InterruptHandler>) {
        self.interrupt_handler = handler;
    }

    /// Polls the interrupt hook.
    pub(crate) fn poll_interrupts(&mut self) -> bool {
        match &mut self.interrupt_handler {
            Some(h) => h(),
            None => false,
        }
    }

    /// The interning table (for inspection and tests).
    #[must_use]
    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    /// Mutable access to the interning table.
    #[must_use]
    pub fn atoms_mut(&mut self) -> &mut AtomTable {
        &mut self.atoms
    }

    /// Parses a script, module or eval unit into a `FuncDef` tree whose
    /// bytecode still contains scope placeholders.
    ///
    /// The first error aborts the whole unit; the partially built tree is
    /// torn down before returning.
    pub fn parse_script(&mut self, source: &str, filename: &str, flags: ParseFlags) -> ParseResult<FuncTree> {
        parse_unit(self, source, filename, flags)
    }

    /// Second pass: rewrites every scope placeholder into concrete
    /// slot/closure/global accesses, instantiates hoisted definitions and
    /// re-anchors labels. On error the tree is torn down.
    pub fn resolve_variables(&mut self, tree: FuncTree) -> ParseResult<FuncTree> {
        resolve_variables(self, tree)
    }

    /// Parse and resolve in one step.
    pub fn compile(&mut self, source: &str, filename: &str, flags: ParseFlags) -> ParseResult<FuncTree> {
        let tree = self.parse_script(source, filename, flags)?;
        self.resolve_variables(tree)
    }

    /// Releases a tree's atom references back to this context.
    pub fn free_tree(&mut self, tree: FuncTree) {
        tree.free(&mut self.atoms);
    }
}
