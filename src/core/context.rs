// ============================================================================
// ripple-cells - Reactive Context
// Thread-local registry for the executing computation, the adopting owner,
// and the live transaction
// ============================================================================
//
// All process-wide state of the engine lives here, behind a thread_local.
// Every slot is acquired through a scoped setter that returns the previous
// value; callers restore it on every exit path (Drop guards at the call
// sites take care of unwinds).
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::{AnyComputation, AnyNode};

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local state shared by the whole engine.
pub struct ReactiveContext {
    // =========================================================================
    // CONTEXT SLOTS
    // =========================================================================
    /// Computation whose reads are being recorded as subscriptions
    active_computation: RefCell<Option<Weak<dyn AnyComputation>>>,

    /// Computation that adopts newly created children and receives cleanups.
    /// Usually equal to `active_computation`; diverges inside `sample`.
    active_owner: RefCell<Option<Weak<dyn AnyComputation>>>,

    // =========================================================================
    // TRANSACTION STATE
    // =========================================================================
    /// Nesting depth of explicit `batch` calls
    transaction_depth: Cell<u32>,

    /// A propagation driver is on the stack
    in_propagation: Cell<bool>,

    /// The mark phase of the current round is walking the graph
    in_mark_phase: Cell<bool>,

    /// Commit counter; advanced once per propagation round
    clock: Cell<u64>,

    /// Data cells with a staged pending write, in first-staged order
    pending_writes: RefCell<Vec<Rc<dyn AnyNode>>>,

    /// Optional cap on propagation rounds per transaction
    max_rounds: Cell<Option<u32>>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            active_computation: RefCell::new(None),
            active_owner: RefCell::new(None),
            transaction_depth: Cell::new(0),
            in_propagation: Cell::new(false),
            in_mark_phase: Cell::new(false),
            clock: Cell::new(0),
            pending_writes: RefCell::new(Vec::new()),
            max_rounds: Cell::new(None),
        }
    }

    // =========================================================================
    // CONTEXT SLOTS
    // =========================================================================

    /// Set the active computation, returning the previous occupant.
    pub fn set_active_computation(
        &self,
        computation: Option<Weak<dyn AnyComputation>>,
    ) -> Option<Weak<dyn AnyComputation>> {
        self.active_computation.replace(computation)
    }

    /// Get the active computation.
    pub fn active_computation(&self) -> Option<Weak<dyn AnyComputation>> {
        self.active_computation.borrow().clone()
    }

    /// Set the active owner, returning the previous occupant.
    pub fn set_active_owner(
        &self,
        owner: Option<Weak<dyn AnyComputation>>,
    ) -> Option<Weak<dyn AnyComputation>> {
        self.active_owner.replace(owner)
    }

    /// Get the active owner.
    pub fn active_owner(&self) -> Option<Weak<dyn AnyComputation>> {
        self.active_owner.borrow().clone()
    }

    // =========================================================================
    // TRANSACTION STATE
    // =========================================================================

    /// Increment the batch depth, returning the new depth.
    pub fn enter_transaction(&self) -> u32 {
        let depth = self.transaction_depth.get() + 1;
        self.transaction_depth.set(depth);
        depth
    }

    /// Decrement the batch depth, returning the new depth.
    pub fn exit_transaction(&self) -> u32 {
        let depth = self.transaction_depth.get().saturating_sub(1);
        self.transaction_depth.set(depth);
        depth
    }

    /// A transaction is open: an explicit batch is on the stack or a
    /// propagation driver is running.
    pub fn in_transaction(&self) -> bool {
        self.transaction_depth.get() > 0 || self.in_propagation.get()
    }

    /// Set the propagation flag, returning the previous value.
    pub fn set_in_propagation(&self, value: bool) -> bool {
        self.in_propagation.replace(value)
    }

    /// A propagation driver is on the stack.
    pub fn in_propagation(&self) -> bool {
        self.in_propagation.get()
    }

    /// Set the mark-phase flag, returning the previous value.
    pub fn set_in_mark_phase(&self, value: bool) -> bool {
        self.in_mark_phase.replace(value)
    }

    /// The mark phase is walking the graph.
    pub fn in_mark_phase(&self) -> bool {
        self.in_mark_phase.get()
    }

    /// Advance the commit clock, returning the new tick.
    pub fn advance_clock(&self) -> u64 {
        let tick = self.clock.get() + 1;
        self.clock.set(tick);
        tick
    }

    /// Current commit clock tick.
    pub fn clock(&self) -> u64 {
        self.clock.get()
    }

    // =========================================================================
    // PENDING WRITES
    // =========================================================================

    /// Register a data cell that just acquired a pending write.
    ///
    /// Staging dedups at the cell: a cell is registered once per round no
    /// matter how many times it is written.
    pub fn queue_pending_write(&self, node: Rc<dyn AnyNode>) {
        self.pending_writes.borrow_mut().push(node);
    }

    /// Take the whole pending queue, leaving it empty.
    pub fn take_pending_writes(&self) -> Vec<Rc<dyn AnyNode>> {
        self.pending_writes.replace(Vec::new())
    }

    /// Any data cell has a staged write.
    pub fn has_pending_writes(&self) -> bool {
        !self.pending_writes.borrow().is_empty()
    }

    // =========================================================================
    // ROUND CAP
    // =========================================================================

    /// Install or remove the per-transaction round cap.
    pub fn set_max_rounds(&self, cap: Option<u32>) {
        self.max_rounds.set(cap);
    }

    /// Current per-transaction round cap.
    pub fn max_rounds(&self) -> Option<u32> {
        self.max_rounds.get()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// A computation is currently recording its reads.
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.active_computation().is_some())
}

/// A transaction (explicit batch or running propagation) is open.
pub fn in_transaction() -> bool {
    with_context(|ctx| ctx.in_transaction())
}

/// The current commit clock tick.
pub fn clock() -> u64 {
    with_context(|ctx| ctx.clock())
}

/// Cap the number of propagation rounds a single transaction may run.
///
/// There is no cap by default: a transaction loops until no data cell has a
/// pending write. Installing a cap turns a runaway write-inside-computation
/// chain into a transaction abort instead of an endless loop.
pub fn set_max_propagation_rounds(cap: Option<u32>) {
    with_context(|ctx| ctx.set_max_rounds(cap));
}

/// The currently installed propagation round cap, if any.
pub fn max_propagation_rounds() -> Option<u32> {
    with_context(|ctx| ctx.max_rounds())
}

// =============================================================================
// TESTS
// =============================================================================
