//! Writer-locked registration façade and the transition table.
//!
//! All mutations serialize on one process-wide mutex; mutation is orders of
//! magnitude rarer than invocation, so a single lock is the deliberate
//! simplicity choice. Readers never touch it. Each successful mutation
//! publishes a freshly built array, applies the dispatch-mode and hazard
//! ordering required for its transition, defers the superseded array to the
//! reclaimer, and reaps whatever earlier generations have quiesced.

use crate::epoch::EpochDomain;
use crate::error::{RegistryError, RegistryResult};
use crate::mutate::{self, Removal};
use crate::probe::{FuncState, ProbeArray, ProbeFn};
use crate::reclaim::Reclaimer;
use crate::slot::HookPoint;
use crate::stats::RegistryStats;
use crate::transition::{HazardClass, TransitionSync};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// The registry backing a set of [`HookPoint`] slots.
///
/// Most programs use [`HookRegistry::global`] through the convenience
/// methods on [`HookPoint`]; tests and embedders can run an isolated
/// instance and use the explicit `*_in`/registry methods throughout.
pub struct HookRegistry {
    /// Serializes every mutation across the whole registry.
    writer: Mutex<()>,
    epoch: EpochDomain,
    transitions: TransitionSync,
    reclaimer: Reclaimer,
    stats: RegistryStats,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            epoch: EpochDomain::new(),
            transitions: TransitionSync::new(),
            reclaimer: Reclaimer::new(),
            stats: RegistryStats::default(),
        }
    }

    /// Process-wide registry instance.
    pub fn global() -> &'static HookRegistry {
        static GLOBAL: OnceLock<HookRegistry> = OnceLock::new();
        GLOBAL.get_or_init(HookRegistry::new)
    }

    pub fn epoch(&self) -> &EpochDomain {
        &self.epoch
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// True iff a grace-period requirement is pending for `class`.
    pub fn hazard_pending(&self, class: HazardClass) -> bool {
        self.transitions.is_pending(class)
    }

    /// Superseded arrays still awaiting their grace period.
    pub fn deferred_arrays(&self) -> usize {
        self.reclaimer.pending()
    }

    /// Block until every deferred array is freed.
    pub fn quiesce(&self) {
        let _writer = self.writer.lock();
        self.reclaimer.drain(&self.epoch);
    }

    /// Connect a probe to `slot` with the given priority.
    pub fn register<A: 'static>(
        &self,
        slot: &HookPoint<A>,
        func: ProbeFn<A>,
        context: usize,
        priority: i32,
    ) -> RegistryResult<()> {
        self.add_probe(slot, func, context, priority)
    }

    /// Like [`register`](Self::register), but an existing identical
    /// registration is treated as success. Used where idempotent
    /// registration is expected.
    pub fn register_allow_existing<A: 'static>(
        &self,
        slot: &HookPoint<A>,
        func: ProbeFn<A>,
        context: usize,
        priority: i32,
    ) -> RegistryResult<()> {
        match self.add_probe(slot, func, context, priority) {
            Err(RegistryError::DuplicateProbe) => Ok(()),
            other => other,
        }
    }

    /// Disconnect a probe from `slot`.
    pub fn unregister<A: 'static>(
        &self,
        slot: &HookPoint<A>,
        func: ProbeFn<A>,
        context: usize,
    ) -> RegistryResult<()> {
        self.remove_probe(slot, func, context)
    }

    fn add_probe<A: 'static>(
        &self,
        slot: &HookPoint<A>,
        func: ProbeFn<A>,
        context: usize,
        priority: i32,
    ) -> RegistryResult<()> {
        let _writer = self.writer.lock();

        if !slot.is_enabled() {
            if let Some(on_first) = slot.edges().on_first_probe {
                on_first()?;
            }
        }

        let old = slot.current();
        let new = Arc::new(mutate::with_probe(
            old.as_deref(),
            func,
            context,
            priority,
        )?);

        match new.state() {
            FuncState::One => {
                // 0 -> 1. A reader may still hold the direct context of the
                // generation torn down by the last 1 -> 0; never install the
                // new direct target before that grace period has elapsed.
                self.transitions
                    .cond_wait(HazardClass::Oscillation, &self.epoch);
                if let Some(first) = new.first_live() {
                    slot.install_direct(first);
                }
                slot.publish(Some(Arc::clone(&new)));
                slot.set_enabled(true);
            }
            FuncState::Two => {
                // 1 -> 2: iterate dispatch must be in place before the wider
                // array becomes reachable.
                slot.clear_direct();
                slot.publish(Some(Arc::clone(&new)));
                self.record_if_leading_changed(old.as_deref(), &new);
            }
            FuncState::Many => {
                slot.publish(Some(Arc::clone(&new)));
                self.record_if_leading_changed(old.as_deref(), &new);
            }
            FuncState::Zero => {
                debug_assert!(false, "add produced an empty array");
            }
        }

        self.release(old);
        self.stats.note_registered();
        Ok(())
    }

    fn remove_probe<A: 'static>(
        &self,
        slot: &HookPoint<A>,
        func: ProbeFn<A>,
        context: usize,
    ) -> RegistryResult<()> {
        let _writer = self.writer.lock();

        let Some(old) = slot.current() else {
            return Err(RegistryError::ProbeNotFound);
        };

        match mutate::without_probe(&old, func, context)? {
            Removal::Tombstoned => {
                // Published array and dispatch mode are unchanged; readers
                // skip the dead entry from now on and a later successful
                // mutation compacts it. The array must stay published, so
                // nothing is released here.
                self.stats.note_tombstoned();
                self.stats.note_unregistered();
                return Ok(());
            }
            Removal::Cleared => {
                // 1 -> 0.
                if let Some(on_last) = slot.edges().on_last_probe {
                    on_last();
                }
                slot.set_enabled(false);
                slot.clear_direct();
                slot.publish(None);
                self.transitions
                    .record(HazardClass::Oscillation, &self.epoch);
            }
            Removal::Replaced(new) => {
                let new = Arc::new(new);
                match new.state() {
                    FuncState::One => {
                        // 2 -> 1 by live count. If the surviving probe's
                        // context differs from the old leading context,
                        // readers mid-iteration under the old array must
                        // drain before the direct target goes live.
                        if leading_context_changed(&old, &new) {
                            self.transitions
                                .record(HazardClass::ShrinkToDirect, &self.epoch);
                        }
                        self.transitions
                            .cond_wait(HazardClass::ShrinkToDirect, &self.epoch);
                        slot.publish(Some(Arc::clone(&new)));
                        if let Some(first) = new.first_live() {
                            slot.install_direct(first);
                        }
                    }
                    FuncState::Two | FuncState::Many => {
                        slot.publish(Some(Arc::clone(&new)));
                        self.record_if_leading_changed(Some(&old), &new);
                    }
                    FuncState::Zero => {
                        debug_assert!(false, "replacement with no survivors");
                    }
                }
            }
        }

        self.release(Some(old));
        self.stats.note_unregistered();
        Ok(())
    }

    fn record_if_leading_changed<A>(&self, old: Option<&ProbeArray<A>>, new: &ProbeArray<A>) {
        let Some(old) = old else { return };
        if leading_context_changed(old, new) {
            self.transitions
                .record(HazardClass::ShrinkToDirect, &self.epoch);
        }
    }

    /// Defer the superseded array, then reap quiesced generations.
    fn release<A: 'static>(&self, old: Option<Arc<ProbeArray<A>>>) {
        if let Some(old) = old {
            self.reclaimer.defer(self.epoch.snapshot(), Box::new(old));
            self.stats.note_deferred();
        }
        let freed = self.reclaimer.reap(&self.epoch);
        self.stats.note_freed(freed);
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn leading_context_changed<A>(old: &ProbeArray<A>, new: &ProbeArray<A>) -> bool {
    match (old.first_live(), new.first_live()) {
        (Some(old_first), Some(new_first)) => old_first.context() != new_first.context(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_a(_context: usize, _args: &u32) {}
    fn probe_b(_context: usize, _args: &u32) {}
    fn probe_c(_context: usize, _args: &u32) {}

    #[test]
    fn register_unregister_round_trip_leaves_slot_empty() {
        let registry = HookRegistry::new();
        let slot: HookPoint<u32> = HookPoint::new("round_trip");

        registry.register(&slot, probe_a, 1, 0).unwrap();
        assert!(slot.is_enabled());
        assert_eq!(slot.probe_count(), 1);

        registry.unregister(&slot, probe_a, 1).unwrap();
        assert!(!slot.is_enabled());
        assert_eq!(slot.probe_count(), 0);
    }

    #[test]
    fn duplicate_registration_fails_and_allow_existing_succeeds() {
        let registry = HookRegistry::new();
        let slot: HookPoint<u32> = HookPoint::new("dup");

        registry.register(&slot, probe_a, 1, 0).unwrap();
        assert_eq!(
            registry.register(&slot, probe_a, 1, 0),
            Err(RegistryError::DuplicateProbe)
        );
        registry
            .register_allow_existing(&slot, probe_a, 1, 0)
            .unwrap();
        assert_eq!(slot.probe_count(), 1);
    }

    #[test]
    fn unregister_on_empty_slot_reports_not_found() {
        let registry = HookRegistry::new();
        let slot: HookPoint<u32> = HookPoint::new("empty_remove");
        assert_eq!(
            registry.unregister(&slot, probe_a, 1),
            Err(RegistryError::ProbeNotFound)
        );
    }

    #[test]
    fn teardown_records_oscillation_hazard() {
        let registry = HookRegistry::new();
        let slot: HookPoint<u32> = HookPoint::new("oscillate");

        registry.register(&slot, probe_a, 1, 0).unwrap();
        registry.unregister(&slot, probe_a, 1).unwrap();
        assert!(registry.hazard_pending(HazardClass::Oscillation));

        // Repopulating waits the grace period out and clears the record.
        registry.register(&slot, probe_b, 2, 0).unwrap();
        assert!(!registry.hazard_pending(HazardClass::Oscillation));
    }

    #[test]
    fn leading_context_change_records_shrink_hazard() {
        let registry = HookRegistry::new();
        let slot: HookPoint<u32> = HookPoint::new("leading");

        registry.register(&slot, probe_a, 1, 0).unwrap();
        registry.register(&slot, probe_b, 2, 0).unwrap();
        // New probe with the highest priority takes the lead: context 1 -> 3.
        registry.register(&slot, probe_c, 3, 10).unwrap();
        assert!(registry.hazard_pending(HazardClass::ShrinkToDirect));

        // Shrinking to one probe must wait the recorded period out.
        registry.unregister(&slot, probe_c, 3).unwrap();
        registry.unregister(&slot, probe_b, 2).unwrap();
        assert!(!registry.hazard_pending(HazardClass::ShrinkToDirect));
        assert_eq!(slot.probe_count(), 1);
    }

    #[test]
    fn superseded_arrays_are_reaped_once_quiescent() {
        let registry = HookRegistry::new();
        let slot: HookPoint<u32> = HookPoint::new("reclaim");

        registry.register(&slot, probe_a, 1, 0).unwrap();
        registry.register(&slot, probe_b, 2, 0).unwrap();
        registry.register(&slot, probe_c, 3, 0).unwrap();
        registry.quiesce();
        assert_eq!(registry.deferred_arrays(), 0);

        let stats = registry.stats().snapshot();
        assert_eq!(stats.registered, 3);
        assert_eq!(stats.deferred, 2);
    }
}
