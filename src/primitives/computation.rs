// ============================================================================
// ripple-cells - Computations
// Re-runnable thunks with a memoized value, subscriptions, and children
// ============================================================================
//
// A computation is both sides of the graph at once: a reaction that
// re-runs when its sources change, and a source that its own readers
// subscribe to. ComputationInner<T> therefore implements AnyNode and
// AnyComputation over one shared flag cell; the self_weak reference bridges
// between the two trait-object views (an Rc can't be recovered from &self).
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{
    AnyComputation, AnyNode, CleanupFn, DependentList, SchedulerFn, SourceList,
};
use crate::primitives::owner::dispose_computation;
use crate::reactivity::tracking::{detach_sources, track_read};
use crate::reactivity::transaction::resolve;

// =============================================================================
// COMPUTATION INNER
// =============================================================================

/// The record behind a computation node.
pub struct ComputationInner<T: 'static> {
    /// Kind + state bitmask (shared by both trait views)
    flags: Cell<u32>,

    /// Memoized result of the last completed run; None only before the
    /// first run completes
    value: RefCell<Option<T>>,

    /// The thunk; dropped at disposal to release its captures
    thunk: RefCell<Option<Box<dyn FnMut() -> T>>>,

    /// Bumped every completed run
    generation: Cell<u64>,

    /// Clock tick of the last completed run
    updated_at: Cell<u64>,

    /// Nodes this computation read during its last run
    sources: RefCell<SourceList>,

    /// Computations subscribed to this one
    dependents: RefCell<DependentList>,

    /// Owning computation, if any
    parent: RefCell<Option<Weak<dyn AnyComputation>>>,

    /// Computations created during the last run, in creation order
    children: RefCell<Vec<Rc<dyn AnyComputation>>>,

    /// Cleanups registered during the last run, in registration order
    cleanups: RefCell<Vec<CleanupFn>>,

    /// Update indirection installed by the defer modifier
    scheduler: RefCell<Option<SchedulerFn>>,

    /// Weak self-reference for trait-object conversion
    self_weak: RefCell<Weak<ComputationInner<T>>>,
}

impl<T: 'static> ComputationInner<T> {
    fn new(
        flags: u32,
        thunk: Box<dyn FnMut() -> T>,
        scheduler: Option<SchedulerFn>,
    ) -> Rc<Self> {
        let inner = Rc::new(Self {
            flags: Cell::new(flags),
            value: RefCell::new(None),
            thunk: RefCell::new(Some(thunk)),
            generation: Cell::new(0),
            updated_at: Cell::new(0),
            sources: RefCell::new(SmallVec::new()),
            dependents: RefCell::new(SmallVec::new()),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            scheduler: RefCell::new(scheduler),
            self_weak: RefCell::new(Weak::new()),
        });

        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
        inner
    }

    /// Inherent state check; shadows the identical trait defaults so call
    /// sites with both traits in scope stay unambiguous.
    pub fn state_is(&self, state: u32) -> bool {
        self.flags.get() & state != 0
    }

    fn set_state(&self, state: u32) {
        self.flags
            .set((self.flags.get() & STATE_MASK) | state);
    }

    /// Execute the thunk with full context setup.
    ///
    /// Prior subscriptions are torn down first, so a run that unwinds
    /// leaves the node STALE with empty sources; the next read re-runs it.
    pub(crate) fn run(self: &Rc<Self>) {
        let as_computation: Rc<dyn AnyComputation> = self.clone();
        detach_sources(&as_computation);
        self.set_state(RUNNING);

        let mut scope = RunScope::enter(as_computation);

        let value = {
            let mut thunk = self.thunk.borrow_mut();
            match thunk.as_mut() {
                Some(f) => f(),
                None => return,
            }
        };

        *self.value.borrow_mut() = Some(value);
        self.generation.set(self.generation.get() + 1);
        self.updated_at
            .set(with_context(|ctx| ctx.clock()));
        self.set_state(CURRENT);
        scope.completed = true;
    }
}

impl<T: 'static> Drop for ComputationInner<T> {
    fn drop(&mut self) {
        // Fallback for inners that die without passing through dispose
        // (say, dropped out of a transient queue): final cleanups still run.
        if self.flags.get() & DISPOSED != 0 {
            return;
        }
        let cleanups: Vec<CleanupFn> = self.cleanups.get_mut().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cleanup(true)));
        }
    }
}

// =============================================================================
// RUN SCOPE
// =============================================================================

/// Installs the running computation as both the active computation and the
/// active owner, restoring the previous occupants on every exit path.
struct RunScope {
    node: Rc<dyn AnyComputation>,
    prev_computation: Option<Weak<dyn AnyComputation>>,
    prev_owner: Option<Weak<dyn AnyComputation>>,
    completed: bool,
}

impl RunScope {
    fn enter(node: Rc<dyn AnyComputation>) -> Self {
        let weak = node.as_weak_computation();
        let (prev_computation, prev_owner) = with_context(|ctx| {
            (
                ctx.set_active_computation(Some(weak.clone())),
                ctx.set_active_owner(Some(weak)),
            )
        });
        Self {
            node,
            prev_computation,
            prev_owner,
            completed: false,
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        with_context(|ctx| {
            ctx.set_active_computation(self.prev_computation.take());
            ctx.set_active_owner(self.prev_owner.take());
        });
        if !self.completed && !self.node.state_is(DISPOSED) {
            // The thunk unwound: drop whatever the partial run subscribed
            // to and stay stale, so the next read re-runs it from scratch.
            detach_sources(&self.node);
            self.node.set_state(STALE);
        }
    }
}

// =============================================================================
// AnyNode IMPLEMENTATION (the source side)
// =============================================================================

impl<T: 'static> AnyNode for ComputationInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }

    fn add_dependent(&self, dependent: Weak<dyn AnyComputation>) {
        self.dependents.borrow_mut().push(dependent);
    }

    fn remove_dependent(&self, dependent: &Rc<dyn AnyComputation>) {
        let target = Rc::as_ptr(dependent) as *const ();
        self.dependents.borrow_mut().retain(|weak| match weak.upgrade() {
            Some(rc) => Rc::as_ptr(&rc) as *const () != target,
            None => false,
        });
    }

    fn for_each_dependent(&self, f: &mut dyn FnMut(Rc<dyn AnyComputation>) -> bool) {
        let dependents = self.dependents.borrow();
        for weak in dependents.iter() {
            if let Some(rc) = weak.upgrade() {
                if !f(rc) {
                    break;
                }
            }
        }
    }

    fn prune_dead_dependents(&self) {
        self.dependents
            .borrow_mut()
            .retain(|weak| weak.strong_count() > 0);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_computation(&self) -> Option<Rc<dyn AnyComputation>> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnyComputation>)
    }
}

// =============================================================================
// AnyComputation IMPLEMENTATION (the reaction side)
// =============================================================================

impl<T: 'static> AnyComputation for ComputationInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    fn add_source(&self, source: Rc<dyn AnyNode>) {
        self.sources.borrow_mut().push(source);
    }

    fn has_source(&self, source: &Rc<dyn AnyNode>) -> bool {
        let target = Rc::as_ptr(source) as *const ();
        self.sources
            .borrow()
            .iter()
            .any(|s| Rc::as_ptr(s) as *const () == target)
    }

    fn take_sources(&self) -> SourceList {
        self.sources.replace(SmallVec::new())
    }

    fn adopt_child(&self, child: Rc<dyn AnyComputation>) {
        self.children.borrow_mut().push(child);
    }

    fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    fn take_children(&self) -> Vec<Rc<dyn AnyComputation>> {
        self.children.replace(Vec::new())
    }

    fn push_cleanup(&self, cleanup: CleanupFn) {
        self.cleanups.borrow_mut().push(cleanup);
    }

    fn cleanup_count(&self) -> usize {
        self.cleanups.borrow().len()
    }

    fn take_cleanups(&self) -> Vec<CleanupFn> {
        self.cleanups.replace(Vec::new())
    }

    fn scheduler(&self) -> Option<SchedulerFn> {
        self.scheduler.borrow().clone()
    }

    fn updated_at(&self) -> u64 {
        self.updated_at.get()
    }

    fn update(&self) {
        if self.state_is(DISPOSED) {
            return;
        }
        if let Some(rc) = self.self_weak.borrow().upgrade() {
            rc.run();
        }
    }

    fn clear_thunk(&self) {
        self.thunk.borrow_mut().take();
        self.scheduler.borrow_mut().take();
        self.parent.borrow_mut().take();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_node(&self) -> Option<Rc<dyn AnyNode>> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnyNode>)
    }

    fn as_weak_computation(&self) -> Weak<dyn AnyComputation> {
        match self.self_weak.borrow().upgrade() {
            Some(rc) => Rc::downgrade(&(rc as Rc<dyn AnyComputation>)),
            None => Weak::<ComputationInner<T>>::new() as Weak<dyn AnyComputation>,
        }
    }
}

// =============================================================================
// COMPUTATION<T> - the public handle
// =============================================================================

/// A readable handle to a computation.
///
/// The thunk runs once at construction (capturing its first subscriptions)
/// and again whenever a propagation round marks it stale. Reads return the
/// memoized value and subscribe the active computation, like any source.
///
/// Handles are cheap clones; dropping the last handle to a computation that
/// no parent owns tears it down.
pub struct Computation<T: 'static> {
    inner: Rc<ComputationInner<T>>,
}

/// Create a computation and run it once immediately.
///
/// Created under an owner it becomes that owner's child and is disposed on
/// the owner's next run; use the [`orphan`](crate::orphan) modifier to opt
/// out.
///
/// # Example
///
/// ```
/// use ripple_cells::{computation, data};
///
/// let a = data(2);
/// let squared = computation({
///     let a = a.clone();
///     move || a.get() * a.get()
/// });
///
/// assert_eq!(squared.get(), 4);
/// a.set(3);
/// assert_eq!(squared.get(), 9);
/// ```
pub fn computation<T, F>(thunk: F) -> Computation<T>
where
    T: 'static,
    F: FnMut() -> T + 'static,
{
    make(false, None, Box::new(thunk))
}

/// Shared constructor behind `computation()` and the builder modifiers.
pub(crate) fn make<T: 'static>(
    orphan: bool,
    scheduler: Option<SchedulerFn>,
    thunk: Box<dyn FnMut() -> T>,
) -> Computation<T> {
    let mut kind = COMPUTATION;
    if orphan {
        kind |= ORPHAN;
    }
    if scheduler.is_some() {
        kind |= DEFERRED;
    }

    let inner = ComputationInner::new(kind | STALE, thunk, scheduler);

    if !orphan {
        if let Some(owner) = with_context(|ctx| ctx.active_owner()).and_then(|weak| weak.upgrade())
        {
            *inner.parent.borrow_mut() = Some(owner.as_weak_computation());
            owner.adopt_child(inner.clone() as Rc<dyn AnyComputation>);
        }
    }

    // Initial run, deferred or not: the first subscriptions must exist.
    inner.run();

    Computation { inner }
}

impl<T: 'static> Computation<T> {
    /// Read the memoized value (cloning), subscribing the active
    /// computation. A stale node is brought current first.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the memoized value without cloning, subscribing the active
    /// computation. A stale node is brought current first.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let node: Rc<dyn AnyNode> = self.inner.clone();
        resolve(&node);
        if !self.inner.state_is(DISPOSED) {
            track_read(node);
        }

        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(v) => f(v),
            // Unreachable after a completed run; resolve() either ran the
            // thunk or unwound.
            None => unreachable!("computation read before its first completed run"),
        }
    }

    /// Tear down this computation and every non-orphan descendant: final
    /// cleanups run, subscriptions drop, the subtree is cleared. The last
    /// memoized value stays readable; the node just never updates again.
    pub fn dispose(&self) {
        dispose_computation(self.inner.clone() as Rc<dyn AnyComputation>);
    }

    /// The node has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.inner.state_is(DISPOSED)
    }

    /// Commit counter: how many runs have completed.
    pub fn generation(&self) -> u64 {
        AnyNode::generation(&*self.inner)
    }

    /// Access the inner record.
    pub fn inner(&self) -> &Rc<ComputationInner<T>> {
        &self.inner
    }
}

impl<T: 'static> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Drop for Computation<T> {
    fn drop(&mut self) {
        // The last handle to a computation nothing else holds (no parent's
        // child list, no reader's source list) tears it down so its
        // cleanups run.
        if Rc::strong_count(&self.inner) == 1 && !self.inner.state_is(DISPOSED) {
            dispose_computation(self.inner.clone() as Rc<dyn AnyComputation>);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
