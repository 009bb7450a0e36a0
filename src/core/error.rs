// ============================================================================
// ripple-cells - Error Types
// Typed failures carried across the transaction abort path
// ============================================================================
//
// A cyclic dependency (or an exceeded round cap) makes forward progress
// impossible, so the engine unwinds to the transaction boundary with one of
// these values as the panic payload. Callers that want to observe the abort
// catch the unwind and downcast; everyone else just sees the propagated
// panic with a readable message.
// ============================================================================

use thiserror::Error;

/// A computation's update, directly or transitively, required its own
/// not-yet-complete result.
///
/// Raised when a read re-enters a node that is `RUNNING` or `SUSPENDED`.
/// The transaction is aborted: commits from earlier rounds are retained,
/// staged writes of the failing round are discarded, and the context slots
/// are restored before the unwind leaves the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cyclic dependency: a computation's update requires its own not-yet-complete result")]
pub struct CycleError;

/// Propagation ran more rounds than the configured cap allows.
///
/// Only raised when a cap has been installed via
/// [`set_max_propagation_rounds`](crate::set_max_propagation_rounds);
/// without one the engine loops to a true fixed point. Abort semantics are
/// identical to [`CycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("propagation exceeded the configured cap of {limit} rounds without reaching a fixed point")]
pub struct RoundLimitError {
    /// The cap that was in force.
    pub limit: u32,
}

// =============================================================================
// TESTS
// =============================================================================
