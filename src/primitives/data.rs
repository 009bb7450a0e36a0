// ============================================================================
// ripple-cells - Data Cells
// The writable reactive primitives: plain cells and accumulators
// ============================================================================

use std::rc::Rc;

use crate::core::types::{AnyNode, DataInner, EqualsFn, StageOutcome};
use crate::reactivity::tracking::track_read;
use crate::reactivity::transaction;

// =============================================================================
// DATA<T> - plain mutable cell
// =============================================================================

/// A mutable reactive cell.
///
/// Reads inside a computation subscribe it to this cell; writes stage a
/// pending value and propagate atomically when the enclosing transaction
/// (or the write itself, outside one) commits.
///
/// # Example
///
/// ```
/// use ripple_cells::{computation, data};
///
/// let count = data(1);
/// let doubled = computation({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 2);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Data<T> {
    inner: Rc<DataInner<T>>,
}

/// Create a data cell with the given initial value.
pub fn data<T>(value: T) -> Data<T>
where
    T: PartialEq + 'static,
{
    Data {
        inner: Rc::new(DataInner::new(value)),
    }
}

/// Create a data cell with a custom identity comparison.
///
/// The comparison only gates the write no-op check; it is not structural
/// change detection.
pub fn data_with_equals<T: 'static>(value: T, equals: EqualsFn<T>) -> Data<T> {
    Data {
        inner: Rc::new(DataInner::with_equals(value, equals)),
    }
}

impl<T: 'static> Data<T> {
    /// Read the committed value (cloning), subscribing the active
    /// computation. Pending writes are never visible to reads.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        track_read(self.inner.clone() as Rc<dyn AnyNode>);
        self.inner.get()
    }

    /// Borrow the committed value without cloning, subscribing the active
    /// computation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track_read(self.inner.clone() as Rc<dyn AnyNode>);
        self.inner.with(f)
    }

    /// Write the cell.
    ///
    /// Outside a transaction this opens one and propagates to a fixed point
    /// before returning. Inside one, the write is staged; a second write to
    /// the same cell replaces the first. Writing the committed value back is
    /// a no-op that marks nothing downstream.
    ///
    /// Returns false only for that no-op case.
    pub fn set(&self, value: T) -> bool {
        let outcome = self.inner.stage_value(value);
        if outcome == StageOutcome::Staged {
            transaction::submit(self.inner.clone() as Rc<dyn AnyNode>);
        }
        outcome.changed()
    }

    /// Commit counter: how many transactions have changed this cell.
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    /// Access the inner record.
    pub fn inner(&self) -> &Rc<DataInner<T>> {
        &self.inner
    }
}

impl<T> Clone for Data<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

// =============================================================================
// ACCUMULATOR<T> - reducer-composing cell
// =============================================================================

/// A data cell whose writes are reducers composed within a transaction.
///
/// Each write takes `old -> new`; writes in one transaction fold in order,
/// and the composed result commits once. Accumulator writes always reach
/// dependents, even when the composition reproduces the old value.
///
/// # Example
///
/// ```
/// use ripple_cells::{accumulator, batch};
///
/// let total = accumulator(0);
///
/// batch(|| {
///     total.set(|v| v + 1);
///     total.set(|v| v + 10);
///     total.set(|v| v * 2);
/// });
///
/// // ((0 + 1) + 10) * 2
/// assert_eq!(total.get(), 22);
/// ```
pub struct Accumulator<T> {
    inner: Rc<DataInner<T>>,
}

/// Create an accumulating data cell with the given initial value.
pub fn accumulator<T>(value: T) -> Accumulator<T>
where
    T: Clone + 'static,
{
    Accumulator {
        inner: Rc::new(DataInner::new_accumulator(value)),
    }
}

impl<T: Clone + 'static> Accumulator<T> {
    /// Read the committed value (cloning), subscribing the active
    /// computation.
    pub fn get(&self) -> T {
        track_read(self.inner.clone() as Rc<dyn AnyNode>);
        self.inner.get()
    }

    /// Borrow the committed value without cloning, subscribing the active
    /// computation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track_read(self.inner.clone() as Rc<dyn AnyNode>);
        self.inner.with(f)
    }

    /// Stage a reducer write. The first write in a transaction folds over
    /// the committed value, later ones over the pending result.
    pub fn set(&self, f: impl FnOnce(T) -> T) {
        if self.inner.stage_compose(f) == StageOutcome::Staged {
            transaction::submit(self.inner.clone() as Rc<dyn AnyNode>);
        }
    }

    /// Commit counter: how many transactions have changed this cell.
    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    /// Access the inner record.
    pub fn inner(&self) -> &Rc<DataInner<T>> {
        &self.inner
    }
}

impl<T> Clone for Accumulator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
