// ============================================================================
// ripple-cells - Batching & Sampling
// Group writes into one transaction; read without subscribing
// ============================================================================

use std::rc::Weak;

use crate::core::context::with_context;
use crate::core::types::AnyComputation;
use crate::reactivity::transaction;

// =============================================================================
// BATCH
// =============================================================================

/// Run `f` inside one transaction: every write staged during the call
/// commits atomically, and downstream computations observe all of them at
/// once, re-running at most once per round.
///
/// Nesting is a no-op on the inner call; propagation happens when the
/// outermost batch exits. Returns `f`'s value.
///
/// # Example
///
/// ```
/// use ripple_cells::{batch, computation, data};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let a = data(1);
/// let b = data(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let sum = computation({
///     let a = a.clone();
///     let b = b.clone();
///     let runs = runs.clone();
///     move || {
///         runs.set(runs.get() + 1);
///         a.get() + b.get()
///     }
/// });
/// assert_eq!(runs.get(), 1);
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
///
/// // One re-run for both writes.
/// assert_eq!(sum.get(), 30);
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_transaction());

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_transaction());
            if depth == 0 {
                if std::thread::panicking() {
                    // An aborted batch never half-propagates: its staged
                    // writes are discarded on the way out.
                    with_context(|ctx| {
                        for node in ctx.take_pending_writes() {
                            node.discard_pending();
                        }
                    });
                } else {
                    transaction::propagate();
                }
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

// =============================================================================
// SAMPLE
// =============================================================================

/// Run `f` with the current computation cleared: reads inside the call
/// return current values without creating subscriptions. The current owner
/// is preserved, so computations and cleanups created inside a sample still
/// land on the enclosing computation.
///
/// # Example
///
/// ```
/// use ripple_cells::{computation, data, sample};
///
/// let tracked = data(1);
/// let peeked = data(10);
///
/// let sum = computation({
///     let tracked = tracked.clone();
///     let peeked = peeked.clone();
///     move || tracked.get() + sample(|| peeked.get())
/// });
/// assert_eq!(sum.get(), 11);
///
/// // A peeked cell never re-runs the computation...
/// peeked.set(100);
/// assert_eq!(sum.get(), 11);
///
/// // ...but a tracked one does, and the new peek sees the latest value.
/// tracked.set(2);
/// assert_eq!(sum.get(), 102);
/// ```
pub fn sample<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_active_computation(None));

    struct SampleGuard {
        prev: Option<Weak<dyn AnyComputation>>,
    }

    impl Drop for SampleGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_active_computation(self.prev.take()));
        }
    }

    let _guard = SampleGuard { prev };
    f()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::in_transaction;
    use crate::primitives::computation::computation;
    use crate::primitives::data::data;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn batch_defers_propagation_until_exit() {
        let a = data(1);
        let b = data(2);
        let runs = Rc::new(Cell::new(0));

        let sum = computation({
            let a = a.clone();
            let b = b.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                a.get() + b.get()
            }
        });
        assert_eq!(runs.get(), 1);

        batch(|| {
            a.set(10);
            assert_eq!(runs.get(), 1);
            // Reads inside the batch still see committed values.
            assert_eq!(sum.get(), 3);

            b.set(20);
            assert_eq!(runs.get(), 1);
        });

        assert_eq!(sum.get(), 30);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn batch_returns_the_thunk_value() {
        assert_eq!(batch(|| 42), 42);
        assert_eq!(batch(|| String::from("hello")), "hello");
    }

    #[test]
    fn nested_batches_commit_once() {
        let a = data(0);
        let runs = Rc::new(Cell::new(0));

        let _watch = computation({
            let a = a.clone();
            let runs = runs.clone();
            move || {
                let _ = a.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        batch(|| {
            a.set(1);
            batch(|| {
                a.set(2);
                a.set(3);
            });
            // Inner batch exited, outer still open: nothing ran yet.
            assert_eq!(runs.get(), 1);
            a.set(4);
        });

        assert_eq!(runs.get(), 2);
        assert_eq!(a.get(), 4);
    }

    #[test]
    fn batch_panic_discards_staged_writes() {
        let a = data(1);
        let runs = Rc::new(Cell::new(0));

        let _watch = computation({
            let a = a.clone();
            let runs = runs.clone();
            move || {
                let _ = a.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            batch(|| {
                a.set(99);
                panic!("intentional panic");
            });
        }));
        assert!(caught.is_err());

        // The staged write never committed and the transaction closed.
        assert!(!in_transaction());
        assert_eq!(a.get(), 1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn sample_reads_do_not_subscribe() {
        let watched = data(1);
        let ignored = data(2);
        let runs = Rc::new(Cell::new(0));

        let _probe = computation({
            let watched = watched.clone();
            let ignored = ignored.clone();
            let runs = runs.clone();
            move || {
                let _ = watched.get();
                let _ = sample(|| ignored.get());
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        ignored.set(20);
        assert_eq!(runs.get(), 1);

        watched.set(10);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn sample_returns_the_thunk_value() {
        let cell = data(42);
        let value = sample(|| cell.get());
        assert_eq!(value, 42);
    }

    #[test]
    fn sample_restores_tracking_after_panic() {
        let watched = data(1);
        let ignored = data(2);
        let runs = Rc::new(Cell::new(0));

        let _probe = computation({
            let watched = watched.clone();
            let ignored = ignored.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                if runs.get() == 1 {
                    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        sample(|| -> i32 { panic!("intentional panic") });
                    }));
                    assert!(caught.is_err());
                }
                // Tracking must be back: this read subscribes.
                let _ = watched.get();
                let _ = sample(|| ignored.get());
            }
        });
        assert_eq!(runs.get(), 1);

        watched.set(5);
        assert_eq!(runs.get(), 2);

        ignored.set(7);
        assert_eq!(runs.get(), 2);
    }
}
