// ============================================================================
// ripple-cells - Subscription Recorder
// Wires symmetric edges between a computation and the nodes it reads
// ============================================================================
//
// Every edge is written as a pair: the reader's source list and the source's
// dependents list always change together, so the two sides can never
// disagree. The borrow discipline is the collect-then-mutate pattern: a
// side's list is never borrowed while the other side is being touched.
// ============================================================================

use std::rc::Rc;

use crate::core::context::with_context;
use crate::core::types::{AnyComputation, AnyNode};

// =============================================================================
// TRACK READ
// =============================================================================

/// Record a read of `source` by the active computation.
///
/// No-op when nothing is recording (top-level reads, `sample` bodies,
/// cleanup handlers) or when the edge already exists — a computation holds
/// at most one edge per source per run, no matter how often it reads it.
pub fn track_read(source: Rc<dyn AnyNode>) {
    let reader = match with_context(|ctx| ctx.active_computation()) {
        Some(weak) => match weak.upgrade() {
            Some(reader) => reader,
            None => return,
        },
        None => return,
    };

    // The source list was emptied when this run started, so the scan only
    // walks edges recorded by the run itself.
    if reader.has_source(&source) {
        return;
    }

    reader.add_source(source.clone());
    source.add_dependent(reader.as_weak_computation());
}

// =============================================================================
// DETACH SOURCES
// =============================================================================

/// Remove `computation` from every node it subscribes to and empty its
/// source list.
///
/// Called before every re-run (subscriptions are rebuilt from scratch) and
/// during disposal. Leaves the computation with no incoming notifications.
pub fn detach_sources(computation: &Rc<dyn AnyComputation>) {
    let sources = computation.take_sources();
    for source in sources.iter() {
        source.remove_dependent(computation);
    }
}

// =============================================================================
// TESTS
// =============================================================================
