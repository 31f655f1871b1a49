//! Registry slots: per-subscription-point state and the lock-free read path.
//!
//! A [`HookPoint`] is created once per call site, typically as a process-wide
//! static, and never destroyed during normal operation. Readers check the
//! enabled flag, enter a read section, and dispatch either through the cached
//! direct target (exactly one live probe) or by walking the published array.
//! Neither path takes a lock.
//!
//! # Examples
//!
//! ```
//! use hookpoint::slot::HookPoint;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::OnceLock;
//!
//! static SEEN: AtomicUsize = AtomicUsize::new(0);
//! static ON_EVENT: OnceLock<HookPoint<u64>> = OnceLock::new();
//!
//! fn count_events(_context: usize, args: &u64) {
//!     SEEN.fetch_add(*args as usize, Ordering::Relaxed);
//! }
//!
//! let slot = ON_EVENT.get_or_init(|| HookPoint::new("on_event"));
//! slot.invoke(&1); // disabled, no probes: nothing happens
//! slot.register(count_events, 0, 0).unwrap();
//! slot.invoke(&2);
//! assert_eq!(SEEN.load(Ordering::Relaxed), 2);
//! slot.unregister(count_events, 0).unwrap();
//! ```

use crate::error::RegistryResult;
use crate::probe::{ProbeArray, ProbeEntry, ProbeFn};
use crate::registry::HookRegistry;
use arc_swap::ArcSwapOption;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cached function + context for single-probe dispatch. The consistency
/// contract for installing and clearing this target is the transition table
/// in the registry; a build without the direct path would still be correct,
/// only slower.
pub(crate) struct DirectTarget<A> {
    pub(crate) func: ProbeFn<A>,
    pub(crate) context: usize,
}

/// Edge hooks fired on a slot's empty/non-empty transitions.
///
/// `on_first_probe` runs before a registration that would enable a disabled
/// slot; its failure aborts that registration. `on_last_probe` runs when the
/// last probe is removed, before the slot is disabled.
#[derive(Default, Clone, Copy)]
pub struct EdgeHooks {
    pub on_first_probe: Option<fn() -> RegistryResult<()>>,
    pub on_last_probe: Option<fn()>,
}

/// One subscription point.
pub struct HookPoint<A> {
    name: &'static str,
    enabled: AtomicBool,
    direct: ArcSwapOption<DirectTarget<A>>,
    funcs: ArcSwapOption<ProbeArray<A>>,
    edges: EdgeHooks,
}

impl<A> HookPoint<A> {
    pub fn new(name: &'static str) -> Self {
        Self::with_edge_hooks(name, EdgeHooks::default())
    }

    pub fn with_edge_hooks(name: &'static str, edges: EdgeHooks) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(false),
            direct: ArcSwapOption::const_empty(),
            funcs: ArcSwapOption::const_empty(),
            edges,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Live (non-tombstoned) probes on the current array.
    pub fn probe_count(&self) -> usize {
        match &*self.funcs.load() {
            Some(array) => array.live_count(),
            None => 0,
        }
    }

    /// Invoke every live probe in array order. Lock-free; managed by the
    /// global registry. Slots mutated through a custom [`HookRegistry`] must
    /// use [`invoke_in`](Self::invoke_in) with that registry instead.
    pub fn invoke(&self, args: &A) {
        self.invoke_in(HookRegistry::global(), args);
    }

    /// Invoke every live probe, entering a read section on `registry`'s
    /// epoch domain.
    pub fn invoke_in(&self, registry: &HookRegistry, args: &A) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let _read = registry.epoch().enter_read();
        if let Some(direct) = &*self.direct.load() {
            (direct.func)(direct.context, args);
            return;
        }
        if let Some(array) = &*self.funcs.load() {
            for entry in array.iter_live() {
                (entry.func())(entry.context(), args);
            }
        }
    }

    /// Read-only traversal of the live probes, for introspection and
    /// tooling. Lock-free; the visitor sees one coherent generation.
    pub fn for_each(&self, visitor: impl FnMut(ProbeFn<A>, usize, i32)) {
        self.for_each_in(HookRegistry::global(), visitor);
    }

    pub fn for_each_in(
        &self,
        registry: &HookRegistry,
        mut visitor: impl FnMut(ProbeFn<A>, usize, i32),
    ) {
        let _read = registry.epoch().enter_read();
        if let Some(array) = &*self.funcs.load() {
            for entry in array.iter_live() {
                visitor(entry.func(), entry.context(), entry.priority());
            }
        }
    }

    /// Register a probe on this slot through the global registry.
    pub fn register(&self, func: ProbeFn<A>, context: usize, priority: i32) -> RegistryResult<()>
    where
        A: 'static,
    {
        HookRegistry::global().register(self, func, context, priority)
    }

    /// Like [`register`](Self::register), but an existing identical
    /// registration counts as success.
    pub fn register_allow_existing(
        &self,
        func: ProbeFn<A>,
        context: usize,
        priority: i32,
    ) -> RegistryResult<()>
    where
        A: 'static,
    {
        HookRegistry::global().register_allow_existing(self, func, context, priority)
    }

    /// Unregister a probe from this slot through the global registry.
    pub fn unregister(&self, func: ProbeFn<A>, context: usize) -> RegistryResult<()>
    where
        A: 'static,
    {
        HookRegistry::global().unregister(self, func, context)
    }

    // Writer-lock-only internals, called by the registry in transition-table
    // order.

    pub(crate) fn current(&self) -> Option<Arc<ProbeArray<A>>> {
        self.funcs.load_full()
    }

    pub(crate) fn publish(&self, array: Option<Arc<ProbeArray<A>>>) {
        self.funcs.store(array);
    }

    pub(crate) fn install_direct(&self, entry: &ProbeEntry<A>) {
        self.direct.store(Some(Arc::new(DirectTarget {
            func: entry.func(),
            context: entry.context(),
        })));
    }

    pub(crate) fn clear_direct(&self) {
        self.direct.store(None);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn edges(&self) -> &EdgeHooks {
        &self.edges
    }

    /// True iff the slot currently dispatches through the cached direct
    /// target rather than array iteration.
    pub fn has_direct_target(&self) -> bool {
        self.direct.load().is_some()
    }
}

/// Type-erased view of a slot, used by the unit lifecycle tracker.
pub trait HookSlot: Send + Sync {
    fn slot_name(&self) -> &str;
    fn live_probes(&self) -> usize;
    /// Recover the typed slot for callers that know its payload type.
    fn as_any(&self) -> &dyn Any;
    /// True iff no probe array is published.
    fn is_quiescent(&self) -> bool {
        self.live_probes() == 0
    }
}

impl<A: 'static> HookSlot for HookPoint<A> {
    fn slot_name(&self) -> &str {
        self.name
    }

    fn live_probes(&self) -> usize {
        self.probe_count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
