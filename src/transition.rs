//! Cross-generation hazard records.
//!
//! Two slot transitions are unsafe to complete while a reader from an older
//! generation may still be executing, even though plain reclamation already
//! keeps the old array alive:
//!
//! - [`HazardClass::Oscillation`]: a slot dropped from one probe to zero and
//!   is being repopulated. A reader may still hold the previous generation's
//!   direct-dispatch context, so a new direct target must wait out the grace
//!   period recorded at the 1 -> 0 teardown.
//! - [`HazardClass::ShrinkToDirect`]: the array's leading context changed and
//!   a later mutation wants to shrink the slot to a single probe. A reader
//!   that began an iterate traversal under the old leading context must not
//!   be exposed to a direct target with mismatched identity.
//!
//! Records are process-wide singletons, one per class, and are only accessed
//! under the registry's writer lock; the atomics are for storage, not for
//! cross-writer synchronization.

use crate::epoch::{EpochDomain, EpochToken};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The two hazard classes requiring a barrier beyond reclamation safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardClass {
    /// 1 -> 0 -> 1 oscillation through an empty slot.
    Oscillation = 0,
    /// Shrink toward one probe after the leading context changed.
    ShrinkToDirect = 1,
}

#[derive(Default)]
struct HazardRecord {
    pending: AtomicBool,
    token: AtomicU64,
}

/// The per-class hazard records and their record/conditional-wait protocol.
pub struct TransitionSync {
    records: [HazardRecord; 2],
}

impl TransitionSync {
    pub fn new() -> Self {
        Self {
            records: [HazardRecord::default(), HazardRecord::default()],
        }
    }

    /// Record a grace-period requirement for `class`. Keeps the latest
    /// snapshot if one is already pending.
    pub fn record(&self, class: HazardClass, domain: &EpochDomain) {
        let record = &self.records[class as usize];
        record.token.store(domain.snapshot().raw(), Ordering::Relaxed);
        record.pending.store(true, Ordering::Relaxed);
    }

    /// If a requirement is pending for `class`, block until its grace period
    /// elapses and reset the record.
    pub fn cond_wait(&self, class: HazardClass, domain: &EpochDomain) {
        let record = &self.records[class as usize];
        if !record.pending.load(Ordering::Relaxed) {
            return;
        }
        domain.wait_until(EpochToken::from_raw(record.token.load(Ordering::Relaxed)));
        record.pending.store(false, Ordering::Relaxed);
    }

    pub fn is_pending(&self, class: HazardClass) -> bool {
        self.records[class as usize].pending.load(Ordering::Relaxed)
    }
}

impl Default for TransitionSync {
    fn default() -> Self {
        Self::new()
    }
}
