//! Deferred reclamation of superseded probe arrays.
//!
//! Publishing a new array leaves the previous generation reachable only by
//! readers already inside a read section. The writer hands the old array to
//! the [`Reclaimer`] together with a fresh epoch token; a non-blocking reap
//! pass at the end of every mutation drops the generations whose grace
//! period has elapsed. The queue is only ever touched under the registry's
//! writer lock.

use crate::epoch::{EpochDomain, EpochToken};
use parking_lot::Mutex;
use std::any::Any;

struct Deferred {
    token: EpochToken,
    /// Dropped once the grace period elapses; holds the owning reference to
    /// a superseded `ProbeArray`.
    garbage: Box<dyn Any + Send>,
}

/// Queue of superseded snapshots awaiting their grace period.
pub struct Reclaimer {
    queue: Mutex<Vec<Deferred>>,
}

impl Reclaimer {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Defer freeing `garbage` until the grace period for `token` elapses.
    pub fn defer(&self, token: EpochToken, garbage: Box<dyn Any + Send>) {
        self.queue.lock().push(Deferred { token, garbage });
    }

    /// Drop every deferred generation whose grace period has elapsed.
    /// Returns the number freed; never blocks.
    pub fn reap(&self, domain: &EpochDomain) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|deferred| !domain.try_elapsed(deferred.token));
        before - queue.len()
    }

    /// Block until every deferred generation is freed. Shutdown/test helper.
    pub fn drain(&self, domain: &EpochDomain) -> usize {
        let mut queue = self.queue.lock();
        let freed = queue.len();
        for deferred in queue.drain(..) {
            domain.wait_until(deferred.token);
            drop(deferred.garbage);
        }
        freed
    }

    /// Generations still awaiting their grace period.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}
