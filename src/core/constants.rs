// ============================================================================
// ripple-cells - Constants
// Flag bits for node kinds and node states
// ============================================================================

// =============================================================================
// NODE KIND FLAGS
// =============================================================================

/// Node is a data cell (mutable value written by application code)
pub const DATA: u32 = 1 << 0;

/// Node is a computation (re-runnable thunk with a memoized value)
pub const COMPUTATION: u32 = 1 << 1;

/// Data cell composes reducer writes within a transaction
pub const ACCUMULATOR: u32 = 1 << 2;

/// Computation is not adopted (and not disposed) by its creating owner
pub const ORPHAN: u32 = 1 << 3;

/// Computation routes its update step through an attached scheduler
pub const DEFERRED: u32 = 1 << 4;

// =============================================================================
// NODE STATE FLAGS
// =============================================================================
//
// Exactly one state bit is set on a live computation. Data cells stay
// CURRENT for their whole life; their staleness is carried by the pending
// slot instead.
// =============================================================================

/// Value is up to date
pub const CURRENT: u32 = 1 << 8;

/// Invalidated by the mark phase; awaiting re-run
pub const STALE: u32 = 1 << 9;

/// Thunk is executing right now
pub const RUNNING: u32 = 1 << 10;

/// Handed to a scheduler; re-run happens when the scheduler fires
pub const PENDING_UPDATE: u32 = 1 << 11;

/// Run paused while a stale source is brought current underneath it
pub const SUSPENDED: u32 = 1 << 12;

/// Torn down; value is frozen and the node never updates again
pub const DISPOSED: u32 = 1 << 13;

// =============================================================================
// STATE MASK
// =============================================================================

/// Mask clearing every state bit while preserving the kind bits
pub const STATE_MASK: u32 =
    !(CURRENT | STALE | RUNNING | PENDING_UPDATE | SUSPENDED | DISPOSED);

// =============================================================================
// TESTS
// =============================================================================
