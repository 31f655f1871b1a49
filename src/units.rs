//! Loadable-unit lifecycle tracking and the unload quiescence check.
//!
//! Plain observer-list plumbing, deliberately outside the registry core: a
//! [`UnitTracker`] keeps the set of currently loaded units and a list of
//! observers interested in load/unload events. On unload, observers get
//! their chance to unregister the unit's probes; any slot the unit owned
//! that still holds live probes afterwards is a probe/context leak and is
//! logged as a warning, not an abort.
//!
//! Load/unload notifications run on a snapshot of the observer list, outside
//! the tracker's locks; the replay loops on observer add/remove iterate the
//! unit list under its lock, so callbacks must not call back into the
//! tracker.
//!
//! # Examples
//!
//! ```
//! use hookpoint::slot::{HookPoint, HookSlot};
//! use hookpoint::units::{UnitHooks, UnitTracker};
//! use std::sync::Arc;
//!
//! let tracker = UnitTracker::new();
//! let slot = Arc::new(HookPoint::<u32>::new("unit_slot")) as Arc<dyn HookSlot>;
//! tracker.unit_coming(UnitHooks::new("demo_unit", vec![slot]));
//! assert_eq!(tracker.unit_going("demo_unit"), 0); // nothing leaked
//! ```

use crate::slot::HookSlot;
use log::warn;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// Load/unload notification delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEvent {
    Coming,
    Going,
}

/// Observer of unit lifecycle events.
pub trait UnitObserver: Send + Sync {
    fn on_unit_event(&self, event: UnitEvent, unit: &UnitHooks);
}

/// One loadable unit and the slots it owns.
pub struct UnitHooks {
    name: String,
    slots: Vec<Arc<dyn HookSlot>>,
}

impl UnitHooks {
    pub fn new(name: impl Into<String>, slots: Vec<Arc<dyn HookSlot>>) -> Self {
        Self {
            name: name.into(),
            slots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[Arc<dyn HookSlot>] {
        &self.slots
    }
}

/// Tracks loaded units and notifies observers on load/unload.
pub struct UnitTracker {
    observers: Mutex<Vec<Arc<dyn UnitObserver>>>,
    units: Mutex<Vec<Arc<UnitHooks>>>,
}

impl UnitTracker {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            units: Mutex::new(Vec::new()),
        }
    }

    /// Process-wide tracker instance.
    pub fn global() -> &'static UnitTracker {
        static GLOBAL: OnceLock<UnitTracker> = OnceLock::new();
        GLOBAL.get_or_init(UnitTracker::new)
    }

    /// Add an observer and replay [`UnitEvent::Coming`] for every unit
    /// already tracked, so late registration misses nothing.
    pub fn register_observer(&self, observer: Arc<dyn UnitObserver>) {
        self.observers.lock().push(Arc::clone(&observer));
        for unit in self.units.lock().iter() {
            observer.on_unit_event(UnitEvent::Coming, unit);
        }
    }

    /// Remove an observer and replay [`UnitEvent::Going`] for every unit
    /// still tracked, so it can tear down whatever it set up.
    pub fn unregister_observer(&self, observer: &Arc<dyn UnitObserver>) {
        self.observers
            .lock()
            .retain(|existing| !Arc::ptr_eq(existing, observer));
        for unit in self.units.lock().iter() {
            observer.on_unit_event(UnitEvent::Going, unit);
        }
    }

    /// Track a freshly loaded unit and notify observers.
    pub fn unit_coming(&self, unit: UnitHooks) -> Arc<UnitHooks> {
        let unit = Arc::new(unit);
        self.units.lock().push(Arc::clone(&unit));
        let observers: Vec<_> = self.observers.lock().clone();
        for observer in observers {
            observer.on_unit_event(UnitEvent::Coming, &unit);
        }
        unit
    }

    /// Untrack `name`, notify observers, then run the quiescence check.
    /// Returns the number of the unit's slots that still held live probes;
    /// each one is a leak, logged and surfaced for diagnosis, never fatal.
    pub fn unit_going(&self, name: &str) -> usize {
        let unit = {
            let mut units = self.units.lock();
            match units.iter().position(|unit| unit.name() == name) {
                Some(index) => units.remove(index),
                None => return 0,
            }
        };

        let observers: Vec<_> = self.observers.lock().clone();
        for observer in observers {
            observer.on_unit_event(UnitEvent::Going, &unit);
        }

        // Observers had their chance to unregister; anything left leaks the
        // probe and its context past the unit's lifetime.
        let mut leaked = 0;
        for slot in unit.slots() {
            let live = slot.live_probes();
            if live != 0 {
                warn!(
                    "unit {} unloaded with {} live probe(s) on slot {}",
                    unit.name(),
                    live,
                    slot.slot_name()
                );
                leaked += 1;
            }
        }
        leaked
    }

    pub fn tracked_units(&self) -> usize {
        self.units.lock().len()
    }

    /// Visit every slot of every tracked unit.
    pub fn for_each_slot(&self, mut visitor: impl FnMut(&Arc<dyn HookSlot>)) {
        for unit in self.units.lock().iter() {
            for slot in unit.slots() {
                visitor(slot);
            }
        }
    }
}

impl Default for UnitTracker {
    fn default() -> Self {
        Self::new()
    }
}
