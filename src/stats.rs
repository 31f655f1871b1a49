//! Writer-side registry counters.
//!
//! Maintained only under the writer lock; the invocation path is deliberately
//! left uninstrumented so it stays free of shared-memory traffic.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RegistryStats {
    registered: AtomicU64,
    unregistered: AtomicU64,
    tombstoned: AtomicU64,
    deferred: AtomicU64,
    freed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub unregistered: u64,
    pub tombstoned: u64,
    pub deferred: u64,
    pub freed: u64,
}

impl RegistryStats {
    pub(crate) fn note_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_unregistered(&self) {
        self.unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_tombstoned(&self) {
        self.tombstoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_freed(&self, count: usize) {
        self.freed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            tombstoned: self.tombstoned.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = RegistryStats::default();
        stats.note_registered();
        stats.note_registered();
        stats.note_unregistered();
        stats.note_deferred();
        stats.note_freed(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.registered, 2);
        assert_eq!(snapshot.unregistered, 1);
        assert_eq!(snapshot.tombstoned, 0);
        assert_eq!(snapshot.deferred, 1);
        assert_eq!(snapshot.freed, 3);
    }
}
