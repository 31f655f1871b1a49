//! Probe entries and immutable probe-array snapshots.
//!
//! A [`ProbeArray`] is the copy-on-write unit of the registry: it is built in
//! full by the mutation engine, published atomically into a slot, and never
//! structurally modified afterwards. The only post-publication write is the
//! single-word tombstone flag on an entry, which readers observe as "skip".
//!
//! # Examples
//!
//! ```
//! use hookpoint::probe::{FuncState, ProbeArray, ProbeEntry};
//!
//! fn probe(_context: usize, _args: &u32) {}
//!
//! let array = ProbeArray::from_entries(vec![ProbeEntry::new(probe, 7, 10)]);
//! assert_eq!(array.live_count(), 1);
//! assert_eq!(array.state(), FuncState::One);
//! assert_eq!(array.first_live().unwrap().context(), 7);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Signature every probe on a slot agrees on. The context is an opaque
/// pointer-sized token chosen by the registrant.
pub type ProbeFn<A> = fn(context: usize, args: &A);

/// One registered probe. Two entries denote the *same probe* iff both the
/// function address and the context are equal.
pub struct ProbeEntry<A> {
    func: ProbeFn<A>,
    context: usize,
    priority: i32,
    /// Tombstone tag. Set in place when a removal could not allocate a
    /// compacted array; the entry stays in the published array but is
    /// skipped by every traversal until the next successful mutation.
    dead: AtomicBool,
}

impl<A> ProbeEntry<A> {
    pub fn new(func: ProbeFn<A>, context: usize, priority: i32) -> Self {
        Self {
            func,
            context,
            priority,
            dead: AtomicBool::new(false),
        }
    }

    pub fn func(&self) -> ProbeFn<A> {
        self.func
    }

    pub fn context(&self) -> usize {
        self.context
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Mark the entry dead in the published array. Single atomic word write;
    /// concurrent readers see either a live entry or a skipped one.
    pub(crate) fn tombstone(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub(crate) fn matches(&self, func: ProbeFn<A>, context: usize) -> bool {
        std::ptr::fn_addr_eq(self.func, func) && self.context == context
    }

    /// Copy the identity of a live entry into a fresh (live) one for a new
    /// array generation.
    pub(crate) fn duplicate(&self) -> Self {
        Self::new(self.func, self.context, self.priority)
    }
}

impl<A> fmt::Debug for ProbeEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeEntry")
            .field("func", &(self.func as usize as *const ()))
            .field("context", &self.context)
            .field("priority", &self.priority)
            .field("dead", &self.is_dead())
            .finish()
    }
}

/// Dispatch-state classification of a slot, computed from the *live* count of
/// the freshly built array after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncState {
    /// No probes; the slot is disabled.
    Zero,
    /// Exactly one live probe; direct dispatch applies.
    One,
    /// Exactly two live probes.
    Two,
    /// Three or more live probes.
    Many,
}

/// Immutable ordered snapshot of the probes on one slot.
///
/// Invariant: among live entries, priority is non-increasing by position, and
/// entries of equal priority preserve their relative insertion order.
pub struct ProbeArray<A> {
    entries: Box<[ProbeEntry<A>]>,
}

impl<A> ProbeArray<A> {
    pub fn from_entries(entries: Vec<ProbeEntry<A>>) -> Self {
        Self {
            entries: entries.into_boxed_slice(),
        }
    }

    /// Total slots, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ProbeEntry<A>] {
        &self.entries
    }

    /// Iterate the live entries in array order, skipping tombstones.
    pub fn iter_live(&self) -> impl Iterator<Item = &ProbeEntry<A>> {
        self.entries.iter().filter(|entry| !entry.is_dead())
    }

    pub fn live_count(&self) -> usize {
        self.iter_live().count()
    }

    pub fn first_live(&self) -> Option<&ProbeEntry<A>> {
        self.iter_live().next()
    }

    pub fn state(&self) -> FuncState {
        match self.live_count() {
            0 => FuncState::Zero,
            1 => FuncState::One,
            2 => FuncState::Two,
            _ => FuncState::Many,
        }
    }
}

impl<A> fmt::Debug for ProbeArray<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

/// Classify an optional published array; an empty slot is [`FuncState::Zero`].
pub fn func_state<A>(array: Option<&ProbeArray<A>>) -> FuncState {
    match array {
        None => FuncState::Zero,
        Some(array) => array.state(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_a(_context: usize, _args: &u32) {}
    fn probe_b(_context: usize, _args: &u32) {}

    #[test]
    fn state_counts_only_live_entries() {
        let array = ProbeArray::from_entries(vec![
            ProbeEntry::new(probe_a, 1, 10),
            ProbeEntry::new(probe_b, 2, 5),
        ]);
        assert_eq!(array.state(), FuncState::Two);

        array.entries()[0].tombstone();
        assert_eq!(array.state(), FuncState::One);
        assert_eq!(array.len(), 2);
        assert_eq!(array.first_live().unwrap().context(), 2);
    }

    #[test]
    fn matches_requires_function_and_context() {
        let entry = ProbeEntry::new(probe_a, 1, 0);
        assert!(entry.matches(probe_a, 1));
        assert!(!entry.matches(probe_a, 2));
        assert!(!entry.matches(probe_b, 1));
    }

    #[test]
    fn empty_slot_classifies_as_zero() {
        assert_eq!(func_state::<u32>(None), FuncState::Zero);
    }
}
