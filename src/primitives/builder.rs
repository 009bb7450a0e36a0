// ============================================================================
// ripple-cells - Computation Modifiers
// Orphan and defer options applied before construction
// ============================================================================

use std::rc::Rc;

use crate::core::types::{SchedulerFn, UpdateFn};
use crate::primitives::computation::{make, Computation};

// =============================================================================
// COMPUTATION BUILDER
// =============================================================================

/// Options applied to the next computation: orphan status and a scheduler.
///
/// Obtained from [`orphan()`] or [`defer()`]; the modifiers chain and
/// `computation` consumes the builder.
#[derive(Default)]
pub struct ComputationBuilder {
    orphan: bool,
    scheduler: Option<SchedulerFn>,
}

impl ComputationBuilder {
    /// A builder with no modifiers applied.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next computation is not adopted by the active owner and survives
    /// the owner's re-runs; only an explicit `dispose` (or dropping its last
    /// handle) tears it down.
    pub fn orphan(mut self) -> Self {
        self.orphan = true;
        self
    }

    /// Attach a scheduler wrapping the computation's update step.
    ///
    /// When a round would re-run the node, the engine instead passes the
    /// real update to `scheduler` and invokes the returned replacement. The
    /// node stays pending until the scheduler fires the real update; marks
    /// in the meantime are no-ops. The thunk still runs once at
    /// construction.
    pub fn defer(mut self, scheduler: impl Fn(UpdateFn) -> UpdateFn + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Build the computation and run it once immediately.
    pub fn computation<T, F>(self, thunk: F) -> Computation<T>
    where
        T: 'static,
        F: FnMut() -> T + 'static,
    {
        make(self.orphan, self.scheduler, Box::new(thunk))
    }
}

// =============================================================================
// MODIFIER ENTRY POINTS
// =============================================================================

/// Start a builder whose computation will not be adopted by its creator.
///
/// # Example
///
/// ```
/// use ripple_cells::{computation, data, orphan};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let cell = data(0);
/// let survivor_runs = Rc::new(Cell::new(0));
///
/// let keeper = Rc::new(std::cell::RefCell::new(None));
/// let _parent = computation({
///     let cell = cell.clone();
///     let survivor_runs = survivor_runs.clone();
///     let keeper = keeper.clone();
///     move || {
///         let _ = cell.get();
///         if keeper.borrow().is_none() {
///             let survivor_runs = survivor_runs.clone();
///             let cell = cell.clone();
///             *keeper.borrow_mut() = Some(orphan().computation(move || {
///                 let _ = cell.get();
///                 survivor_runs.set(survivor_runs.get() + 1);
///             }));
///         }
///     }
/// });
/// assert_eq!(survivor_runs.get(), 1);
///
/// // The parent re-runs, but the orphan is not disposed with it.
/// cell.set(1);
/// assert_eq!(survivor_runs.get(), 2);
/// ```
pub fn orphan() -> ComputationBuilder {
    ComputationBuilder::new().orphan()
}

/// Start a builder whose computation updates through `scheduler`.
pub fn defer(scheduler: impl Fn(UpdateFn) -> UpdateFn + 'static) -> ComputationBuilder {
    ComputationBuilder::new().defer(scheduler)
}

// =============================================================================
// TESTS
// =============================================================================
