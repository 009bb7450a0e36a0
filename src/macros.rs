// ============================================================================
// ripple-cells - Ergonomic Macros
// ============================================================================

/// Clone variables into a move closure.
///
/// Handles are cheap `Rc` clones, but moving them into a thunk still takes
/// a `let`-clone per handle; this macro folds that boilerplate away.
///
/// # Usage
///
/// ```rust
/// use ripple_cells::{cloned, computation, data};
///
/// let a = data(1);
/// let b = data(2);
///
/// // Instead of:
/// // let a_clone = a.clone();
/// // let b_clone = b.clone();
/// // computation(move || a_clone.get() + b_clone.get());
///
/// let sum = computation(cloned!(a, b => move || a.get() + b.get()));
/// assert_eq!(sum.get(), 3);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}
