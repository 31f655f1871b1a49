//! Epoch-based grace-period tracking for unsynchronized readers.
//!
//! Readers wrap each traversal in [`EpochDomain::enter_read`]; the returned
//! guard records the current epoch in a per-thread slot and clears it on
//! drop. A writer takes a [`snapshot`](EpochDomain::snapshot) and later calls
//! [`wait_until`](EpochDomain::wait_until), which blocks until every reader
//! that was inside a read section at snapshot time has left it. This is the
//! portable stand-in for the original's RCU grace-period primitive.
//!
//! # Examples
//!
//! ```
//! use hookpoint::epoch::EpochDomain;
//!
//! let domain = EpochDomain::new();
//! let token = domain.snapshot();
//! // No reader is active, so the grace period elapses immediately.
//! domain.wait_until(token);
//! assert!(domain.try_elapsed(token));
//! ```

use crossbeam_utils::Backoff;
use dashmap::DashMap;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Opaque monotonic grace-period marker returned by [`EpochDomain::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpochToken(u64);

impl EpochToken {
    pub(crate) fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Default)]
struct ReaderSlot {
    /// Epoch observed on entry to the outermost read section; 0 when the
    /// thread is quiescent.
    active: AtomicU64,
    /// Read-section nesting depth. Touched only by the owning thread.
    nesting: AtomicU64,
}

/// Grace-period domain shared by one registry and all of its readers.
///
/// Reader slots are created lazily on a thread's first read section and are
/// removed again when the thread exits; a quiescent slot never delays a
/// grace period.
pub struct EpochDomain {
    /// Strictly positive; advanced past a token before waiting on it so that
    /// readers entering during the wait are distinguishable from readers that
    /// may still hold the superseded generation.
    global: AtomicU64,
    /// Highest token whose grace period is known to have elapsed.
    completed: AtomicU64,
    readers: Arc<ReaderMap>,
}

type ReaderMap = DashMap<ThreadId, Arc<ReaderSlot>>;

/// Per-thread cleanup handle: on thread exit, removes the thread's reader
/// slot from every domain it ever read under, so thread churn does not grow
/// the reader maps without bound.
struct ThreadSlots {
    id: ThreadId,
    domains: Vec<Weak<ReaderMap>>,
}

impl Drop for ThreadSlots {
    fn drop(&mut self) {
        for readers in self.domains.drain(..) {
            if let Some(readers) = readers.upgrade() {
                readers.remove(&self.id);
            }
        }
    }
}

thread_local! {
    static THREAD_SLOTS: RefCell<ThreadSlots> = RefCell::new(ThreadSlots {
        id: thread::current().id(),
        domains: Vec::new(),
    });
}

impl EpochDomain {
    pub fn new() -> Self {
        Self {
            global: AtomicU64::new(1),
            completed: AtomicU64::new(0),
            readers: Arc::new(DashMap::new()),
        }
    }

    fn reader_slot(&self) -> Arc<ReaderSlot> {
        let id = thread::current().id();
        if let Some(slot) = self.readers.get(&id) {
            return Arc::clone(&slot);
        }
        let slot = Arc::new(ReaderSlot::default());
        self.readers.insert(id, Arc::clone(&slot));
        // First contact between this thread and this domain: arrange for the
        // slot to be dropped from the map on thread exit. try_with because a
        // read section may run inside another thread-local's destructor,
        // after this handle is gone; the slot then merely outlives the
        // thread, which is harmless.
        let _ = THREAD_SLOTS.try_with(|slots| {
            slots
                .borrow_mut()
                .domains
                .push(Arc::downgrade(&self.readers));
        });
        slot
    }

    /// Enter a read section. Nests; the section ends when the outermost
    /// guard drops.
    pub fn enter_read(&self) -> ReadGuard {
        let slot = self.reader_slot();
        if slot.nesting.fetch_add(1, Ordering::Relaxed) == 0 {
            let epoch = self.global.load(Ordering::SeqCst);
            slot.active.store(epoch, Ordering::SeqCst);
            // The active marker must be ordered before any snapshot load the
            // reader performs; pairs with the fence in wait_until.
            fence(Ordering::SeqCst);
        }
        ReadGuard {
            slot,
            _not_send: PhantomData,
        }
    }

    /// Take a grace-period marker covering every reader currently active.
    pub fn snapshot(&self) -> EpochToken {
        EpochToken(self.global.load(Ordering::SeqCst))
    }

    /// Block until every reader active at `token` time has exited its read
    /// section. Must not be called while the calling thread holds a
    /// [`ReadGuard`] on this domain.
    pub fn wait_until(&self, token: EpochToken) {
        if self.completed.load(Ordering::Acquire) >= token.0 {
            return;
        }
        self.advance_past(token);
        // Snapshot the slots first: spinning inside the map iterator would
        // hold a shard guard across the whole grace period and block a new
        // thread's first enter_read. Slots created after this point entered
        // past the advanced epoch and need no wait.
        let slots: Vec<Arc<ReaderSlot>> = self
            .readers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for slot in slots {
            let backoff = Backoff::new();
            loop {
                let active = slot.active.load(Ordering::SeqCst);
                if active == 0 || active > token.0 {
                    break;
                }
                backoff.snooze();
            }
        }
        self.completed.fetch_max(token.0, Ordering::AcqRel);
    }

    /// Non-blocking poll: true iff the grace period for `token` has elapsed.
    pub fn try_elapsed(&self, token: EpochToken) -> bool {
        if self.completed.load(Ordering::Acquire) >= token.0 {
            return true;
        }
        self.advance_past(token);
        for entry in self.readers.iter() {
            let active = entry.value().active.load(Ordering::SeqCst);
            if active != 0 && active <= token.0 {
                return false;
            }
        }
        self.completed.fetch_max(token.0, Ordering::AcqRel);
        true
    }

    fn advance_past(&self, token: EpochToken) {
        self.global.fetch_max(token.0 + 1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Number of threads currently inside a read section.
    pub fn active_readers(&self) -> usize {
        self.readers
            .iter()
            .filter(|entry| entry.value().active.load(Ordering::SeqCst) != 0)
            .count()
    }
}

impl Default for EpochDomain {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker for a read section. Not `Send`: the guard must drop on the
/// thread that created it.
pub struct ReadGuard {
    slot: Arc<ReaderSlot>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        if self.slot.nesting.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.slot.active.store(0, Ordering::Release);
        }
    }
}
