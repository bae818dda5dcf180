//! Resource limits and the host interrupt hook.
//!
//! The front end is single-threaded and fail-fast; the only cancellation
//! mechanism is a cooperative interrupt callback polled at token boundaries.
//! Limits bound recursion depth and table sizes so hostile input turns into
//! an error instead of unbounded memory or stack use.

/// Maximum number of local variables or closure variables per function.
///
/// Slot indexes are stored on 16 bits in the bytecode.
pub const MAX_LOCAL_VARS: usize = 65535;

/// Maximum nesting depth for the recursive-descent parser.
///
/// This bounds both token-level recursion (template parts re-entering the
/// expression parser) and statement/expression nesting like `((((x))))`.
#[cfg(not(debug_assertions))]
pub const DEFAULT_MAX_NESTING_DEPTH: u32 = 512;
/// In debug builds stack frames are much larger (no inlining, debug info),
/// so the default limit is far lower to fail before the real stack does.
#[cfg(debug_assertions)]
pub const DEFAULT_MAX_NESTING_DEPTH: u32 = 120;

/// Host interrupt callback.
///
/// Returning `true` aborts the current parse with an uncatchable
/// `InternalError("interrupted")`.
pub type InterruptHandler = Box<dyn FnMut() -> bool>;

/// Tunable limits applied while compiling one unit.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// Maximum recursive-descent depth before "stack overflow" is raised.
    pub max_nesting_depth: u32,
    /// Maximum live atoms in the runtime's atom table.
    pub max_atoms: u32,
    /// Maximum locals (and separately, arguments) per function.
    pub max_local_vars: usize,
    /// Maximum closure variables per function.
    pub max_closure_vars: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_atoms: crate::atoms::MAX_ATOMS,
            max_local_vars: MAX_LOCAL_VARS,
            max_closure_vars: MAX_LOCAL_VARS,
        }
    }
}
