// ============================================================================
// ripple-cells - A Transactional Fine-Grained Reactive Runtime
// ============================================================================
//
// Mutable data cells, memoized computations over them, and a propagation
// engine that keeps every computation consistent with the committed data:
//
// - Writes stage into a transaction and commit atomically; downstream
//   computations observe all of a transaction's writes at once and re-run
//   at most once per round.
// - Propagation is two-phase: a mark pass invalidates and prunes, an update
//   pass re-runs in order, with an out-of-order resolver repairing reads of
//   not-yet-updated sources so nothing ever observes a mix of old and new
//   values.
// - Computations form an ownership tree: children created during a run are
//   disposed on the owner's next run, cleanups fire before re-runs and on
//   disposal, and disposal cascades through the subtree.
//
// Single-threaded and synchronous: the whole fixed point runs inside the
// outermost `write`/`batch` call, on one thread, with all engine state in a
// thread-local context.
// ============================================================================

pub mod core;
pub mod primitives;
pub mod reactivity;

mod macros;

// Re-export the core surface at the crate root
pub use core::constants;
pub use core::context::{
    clock, in_transaction, is_tracking, max_propagation_rounds, set_max_propagation_rounds,
    with_context, ReactiveContext,
};
pub use core::error::{CycleError, RoundLimitError};
pub use core::types::{
    default_equals, AnyComputation, AnyNode, CleanupFn, DataInner, EqualsFn, SchedulerFn,
    StageOutcome, UpdateFn,
};

// Re-export the primitives
pub use primitives::builder::{defer, orphan, ComputationBuilder};
pub use primitives::computation::{computation, Computation, ComputationInner};
pub use primitives::data::{accumulator, data, data_with_equals, Accumulator, Data};
pub use primitives::owner::on_cleanup;

// Re-export the reactivity functions
pub use reactivity::batching::{batch, sample};
pub use reactivity::tracking::track_read;

// =============================================================================
// TESTS
// =============================================================================
