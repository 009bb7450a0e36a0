// ============================================================================
// ripple-cells - Update Transaction
// Commit staged writes, mark downstream, re-run what went stale
// ============================================================================
//
// One propagation round:
//
//   1. COMMIT  - every staged pending value becomes the committed value,
//                generations bump, the clock ticks once.
//   2. MARK    - walk dependent edges from the changed cells; each reached
//                CURRENT computation goes STALE, its children are disposed,
//                its cleanups run (final = false), and it joins the update
//                queue. Traversal continues through computations, which are
//                sources to their own readers.
//   3. UPDATE  - drain the queue in mark order; every node still STALE
//                re-runs (or is handed to its scheduler).
//
// Rounds repeat until no cell has a pending write: writes performed inside
// thunks land in the queue for the next round. The whole fixed point runs
// synchronously inside the outermost write or batch.
//
// Queue order is only roughly topological; the resolver repairs it on
// demand: a read that hits a STALE source updates that source recursively
// before returning, so no computation ever observes a mix of pre- and
// post-commit values.
// ============================================================================

use std::panic::panic_any;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::error::{CycleError, RoundLimitError};
use crate::core::types::{AnyComputation, AnyNode, SchedulerFn, UpdateFn};
use crate::primitives::owner::{dispose_computation, run_cleanups};

// =============================================================================
// SUBMIT - entry point for staged writes
// =============================================================================

/// Register a cell that just acquired a pending write and, when no
/// transaction is open, drive propagation to a fixed point before returning.
///
/// With a transaction open (explicit batch, or a write from inside a
/// running thunk) the cell just joins the pending queue; the open driver
/// picks it up in its next round.
pub(crate) fn submit(node: Rc<dyn AnyNode>) {
    let run_now = with_context(|ctx| {
        ctx.queue_pending_write(node);
        !ctx.in_transaction()
    });

    if run_now {
        propagate();
    }
}

// =============================================================================
// PROPAGATE - the fixed-point driver
// =============================================================================

/// Run commit/mark/update rounds until no cell has a pending write.
///
/// Re-entrant calls return immediately: rounds triggered by writes during
/// propagation are absorbed into the driver already on the stack. On unwind
/// (cycle, round cap, thunk panic) the guard discards the staged writes of
/// the failing round; commits from completed rounds are retained.
pub(crate) fn propagate() {
    let start = with_context(|ctx| !ctx.in_propagation() && ctx.has_pending_writes());
    if !start {
        return;
    }

    let guard = PropagationGuard::engage();
    let cap = with_context(|ctx| ctx.max_rounds());
    let mut rounds: u32 = 0;

    loop {
        let pending = with_context(|ctx| ctx.take_pending_writes());
        if pending.is_empty() {
            break;
        }

        rounds += 1;
        if let Some(limit) = cap {
            if rounds > limit {
                warn!(limit, "propagation aborted: round cap exceeded");
                panic_any(RoundLimitError { limit });
            }
        }

        with_context(|ctx| ctx.advance_clock());
        let mut seeds: Vec<Rc<dyn AnyNode>> = Vec::new();
        for node in pending {
            if node.commit_pending() {
                seeds.push(node);
            }
        }
        trace!(round = rounds, changed = seeds.len(), "round committed");

        if seeds.is_empty() {
            continue;
        }

        let queue = mark_phase(seeds);
        trace!(round = rounds, queued = queue.len(), "mark phase complete");
        update_phase(queue);
    }

    guard.disarm();
}

/// Scopes the in-propagation flag; on unwind also discards staged writes.
struct PropagationGuard {
    completed: bool,
}

impl PropagationGuard {
    fn engage() -> Self {
        with_context(|ctx| ctx.set_in_propagation(true));
        Self { completed: false }
    }

    fn disarm(mut self) {
        self.completed = true;
    }
}

impl Drop for PropagationGuard {
    fn drop(&mut self) {
        with_context(|ctx| {
            ctx.set_in_propagation(false);
            ctx.set_in_mark_phase(false);
            if !self.completed {
                for node in ctx.take_pending_writes() {
                    node.discard_pending();
                }
            }
        });
    }
}

// =============================================================================
// MARK PHASE
// =============================================================================

/// Invalidate and prune everything downstream of the committed cells.
///
/// Returns the update queue in traversal order. Non-CURRENT nodes are
/// skipped: STALE and DISPOSED ones are already handled, and a deferred
/// node re-marked while PENDING_UPDATE stays pending (marks are idempotent
/// until its scheduler fires).
fn mark_phase(seeds: Vec<Rc<dyn AnyNode>>) -> Vec<Rc<dyn AnyComputation>> {
    let _mark = MarkGuard::enter();
    let mut queue: Vec<Rc<dyn AnyComputation>> = Vec::new();
    let mut stack: Vec<Rc<dyn AnyNode>> = seeds;

    while let Some(source) = stack.pop() {
        source.prune_dead_dependents();

        // Collect first: marking mutates child lists and edges underneath.
        let mut dependents: Vec<Rc<dyn AnyComputation>> = Vec::new();
        source.for_each_dependent(&mut |dependent| {
            dependents.push(dependent);
            true
        });

        for dependent in dependents {
            if !dependent.state_is(CURRENT) {
                continue;
            }
            dependent.set_state(STALE);

            // Children die before the parent's own cleanups run; both
            // complete strictly before the parent's next run.
            for child in dependent.take_children() {
                dispose_computation(child);
            }
            run_cleanups(&dependent, false);

            queue.push(dependent.clone());
            if let Some(node) = dependent.as_node() {
                stack.push(node);
            }
        }
    }

    queue
}

/// Scopes the in-mark-phase flag.
struct MarkGuard;

impl MarkGuard {
    fn enter() -> Self {
        with_context(|ctx| ctx.set_in_mark_phase(true));
        MarkGuard
    }
}

impl Drop for MarkGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.set_in_mark_phase(false));
    }
}

// =============================================================================
// UPDATE PHASE
// =============================================================================

/// Drain the queue in mark order, re-running every node still STALE.
///
/// Nodes resolved early by an out-of-order read arrive here CURRENT and are
/// skipped, as are nodes disposed between marking and updating.
fn update_phase(queue: Vec<Rc<dyn AnyComputation>>) {
    for node in queue {
        if !node.state_is(STALE) {
            continue;
        }
        match node.scheduler() {
            Some(scheduler) => defer_update(node, scheduler),
            None => node.update(),
        }
    }
}

/// Hand a deferred node's update step to its scheduler.
///
/// The node sits in PENDING_UPDATE until the scheduler invokes the real
/// update; further marks in the meantime are no-ops, and the eventual run
/// observes whatever is committed at that moment. A node disposed while
/// pending makes the real update a no-op.
fn defer_update(node: Rc<dyn AnyComputation>, scheduler: SchedulerFn) {
    node.set_state(PENDING_UPDATE);

    let weak = node.as_weak_computation();
    let real: UpdateFn = Box::new(move || {
        if let Some(node) = weak.upgrade() {
            if node.state_is(PENDING_UPDATE) {
                node.set_state(STALE);
                node.update();
            }
        }
    });

    let replacement = scheduler(real);
    replacement();
}

// =============================================================================
// OUT-OF-ORDER RESOLVER
// =============================================================================

/// Bring a node up to date at read time.
///
/// This is the single place propagation branches on node kind: data cells
/// fall straight through, computations are checked for staleness. A STALE
/// source is updated recursively while the reader (if any) is flagged
/// SUSPENDED; re-entering a RUNNING or SUSPENDED node means the update
/// requires its own result, which aborts the transaction.
pub(crate) fn resolve(node: &Rc<dyn AnyNode>) {
    let computation = match node.as_computation() {
        Some(computation) => computation,
        None => return,
    };

    let flags = computation.flags();
    if flags & DISPOSED != 0 {
        return;
    }
    if flags & (RUNNING | SUSPENDED) != 0 {
        warn!("cyclic dependency detected; aborting transaction");
        panic_any(CycleError);
    }
    if flags & STALE == 0 {
        return;
    }
    if with_context(|ctx| ctx.in_mark_phase()) {
        // Cleanups observing the graph mid-mark see the pre-update world;
        // the update phase brings the node current afterwards.
        return;
    }

    match computation.scheduler() {
        Some(scheduler) => {
            // The scheduler owns this node's update step; the reader
            // proceeds against the memo while the node is pending.
            defer_update(computation, scheduler);
        }
        None => {
            let reader =
                with_context(|ctx| ctx.active_computation()).and_then(|weak| weak.upgrade());
            let _suspended = reader.map(SuspendScope::enter);
            computation.update();
        }
    }
}

/// Flags the reader SUSPENDED for the duration of a recursive source
/// update, restoring RUNNING when the update returns.
struct SuspendScope {
    reader: Rc<dyn AnyComputation>,
}

impl SuspendScope {
    fn enter(reader: Rc<dyn AnyComputation>) -> Self {
        reader.set_state(SUSPENDED);
        Self { reader }
    }
}

impl Drop for SuspendScope {
    fn drop(&mut self) {
        // Leave the state alone if the reader was disposed underneath us.
        if self.reader.state_is(SUSPENDED) {
            self.reader.set_state(RUNNING);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::core::context::set_max_propagation_rounds;
    use crate::core::error::RoundLimitError;
    use crate::primitives::computation::computation;
    use crate::primitives::data::data;

    #[test]
    fn write_drives_propagation_to_completion() {
        let cell = data(1);
        let doubled = computation({
            let cell = cell.clone();
            move || cell.get() * 2
        });

        cell.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn write_inside_a_thunk_triggers_a_follow_up_round() {
        let input = data(1);
        let mirror = data(0);

        // A forwarding computation: every input change is written through.
        let _forward = computation({
            let input = input.clone();
            let mirror = mirror.clone();
            move || mirror.set(input.get())
        });
        assert_eq!(mirror.get(), 1);

        let downstream = computation({
            let mirror = mirror.clone();
            move || mirror.get() + 100
        });
        assert_eq!(downstream.get(), 101);

        input.set(7);
        assert_eq!(mirror.get(), 7);
        assert_eq!(downstream.get(), 107);
    }

    #[test]
    fn round_cap_aborts_a_runaway_chain() {
        set_max_propagation_rounds(Some(16));

        let cell = data(0i64);
        let runs = Rc::new(Cell::new(0));

        // Self-amplifying: every run writes a fresh value back.
        let _feedback = computation({
            let cell = cell.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                let v = cell.get();
                cell.set(v + 1);
            }
        });

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cell.set(1000);
        }));

        let payload = caught.unwrap_err();
        let limit = payload
            .downcast_ref::<RoundLimitError>()
            .map(|e| e.limit);
        assert_eq!(limit, Some(16));

        // The driver released its flags; a later write propagates normally.
        set_max_propagation_rounds(None);
        assert!(!crate::core::context::in_transaction());
    }

    #[test]
    fn reentrant_propagate_is_absorbed() {
        let a = data(1);
        let b = data(10);

        let sum = computation({
            let a = a.clone();
            let b = b.clone();
            move || a.get() + b.get()
        });

        // Both writes land in one driver: the second is staged while the
        // first one's propagation is on the stack.
        let _bridge = computation({
            let a = a.clone();
            let b = b.clone();
            move || {
                let v = a.get();
                if v > 1 {
                    b.set(v * 10);
                }
            }
        });

        a.set(3);
        assert_eq!(b.get(), 30);
        assert_eq!(sum.get(), 33);
    }
}
