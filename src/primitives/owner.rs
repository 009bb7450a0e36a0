// ============================================================================
// ripple-cells - Ownership & Cleanup
// Parent/child disposal cascade and the cleanup-handler lifecycle
// ============================================================================
//
// Computations created while an owner is active join that owner's child
// list and die on the owner's next run or disposal. Cleanups registered
// during a run fire once each: with final = false just before the owner
// re-runs, or with final = true when it is torn down for good.
// ============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::core::constants::DISPOSED;
use crate::core::context::with_context;
use crate::core::types::AnyComputation;
use crate::reactivity::tracking::detach_sources;

// =============================================================================
// CLEANUP REGISTRATION
// =============================================================================

/// Register a cleanup on the computation that owns the current scope.
///
/// The handler runs exactly once: with `false` when the owner is about to
/// re-run, or with `true` when the owner is disposed. Handlers run in
/// reverse registration order. Registering with no enclosing computation is
/// a silent no-op.
///
/// # Example
///
/// ```
/// use ripple_cells::{computation, data, on_cleanup};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let cell = data(1);
/// let released = Rc::new(Cell::new(0));
///
/// let watcher = computation({
///     let cell = cell.clone();
///     let released = released.clone();
///     move || {
///         let value = cell.get();
///         let released = released.clone();
///         on_cleanup(move |_| released.set(released.get() + 1));
///         value
///     }
/// });
///
/// cell.set(2);          // re-run: previous cleanup fires with final = false
/// assert_eq!(released.get(), 1);
///
/// watcher.dispose();    // final cleanup fires with final = true
/// assert_eq!(released.get(), 2);
/// ```
pub fn on_cleanup(f: impl FnOnce(bool) + 'static) {
    if let Some(owner) = with_context(|ctx| ctx.active_owner()).and_then(|w| w.upgrade()) {
        owner.push_cleanup(Box::new(f));
    }
}

// =============================================================================
// CLEANUP EXECUTION
// =============================================================================

/// Run and clear a computation's cleanup list.
///
/// Handlers fire in reverse registration order with the given final flag.
/// A handler's own panic is caught and suppressed so the rest still run;
/// handlers observe no tracking or adoption scope.
pub(crate) fn run_cleanups(computation: &Rc<dyn AnyComputation>, disposed: bool) {
    let cleanups = computation.take_cleanups();
    if cleanups.is_empty() {
        return;
    }

    let _scope = CleanupScope::enter();
    for cleanup in cleanups.into_iter().rev() {
        let _ = catch_unwind(AssertUnwindSafe(|| cleanup(disposed)));
    }
}

/// Clears both context slots while cleanups run, restoring them on exit.
struct CleanupScope {
    prev_computation: Option<Weak<dyn AnyComputation>>,
    prev_owner: Option<Weak<dyn AnyComputation>>,
}

impl CleanupScope {
    fn enter() -> Self {
        let (prev_computation, prev_owner) = with_context(|ctx| {
            (
                ctx.set_active_computation(None),
                ctx.set_active_owner(None),
            )
        });
        Self {
            prev_computation,
            prev_owner,
        }
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        with_context(|ctx| {
            ctx.set_active_computation(self.prev_computation.take());
            ctx.set_active_owner(self.prev_owner.take());
        });
    }
}

// =============================================================================
// DISPOSAL CASCADE
// =============================================================================

/// Tear down a computation and its whole subtree.
///
/// Final cleanups run first, then subscriptions drop, then every child is
/// disposed recursively, and the thunk is released. The memoized value is
/// left in place: reads keep returning it, the node just never updates
/// again.
pub(crate) fn dispose_computation(computation: Rc<dyn AnyComputation>) {
    if computation.state_is(DISPOSED) {
        return;
    }
    // State flips first so reentrant disposal (say, from a cleanup) is a
    // no-op.
    computation.set_state(DISPOSED);

    run_cleanups(&computation, true);
    detach_sources(&computation);

    for child in computation.take_children() {
        dispose_computation(child);
    }

    computation.clear_thunk();
}

// =============================================================================
// TESTS
// =============================================================================
