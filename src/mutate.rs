//! Copy-on-write mutation engine for probe arrays.
//!
//! Every mutation builds a complete replacement array from the current one;
//! the published generation is never edited structurally. The one exception
//! is the degraded removal path, which flips tombstone flags in place when
//! the compacted replacement cannot be allocated.

use crate::error::{RegistryError, RegistryResult};
use crate::probe::{ProbeArray, ProbeEntry, ProbeFn};
use crate::test_utils;

fn allocate_entries<A>(count: usize) -> RegistryResult<Vec<ProbeEntry<A>>> {
    if test_utils::take_forced_alloc_failure() {
        return Err(RegistryError::AllocFailed);
    }
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(count)
        .map_err(|_| RegistryError::AllocFailed)?;
    Ok(entries)
}

/// Build the array that results from adding one probe.
///
/// Fails with [`RegistryError::DuplicateProbe`] if the same (function,
/// context) pair is already live, or [`RegistryError::AllocFailed`] if the
/// replacement cannot be allocated; the current array is untouched either
/// way. Tombstones left behind by earlier degraded removals are compacted
/// away while copying. The new entry lands after every live entry of
/// priority >= its own, keeping priorities non-increasing with stable ties.
pub(crate) fn with_probe<A>(
    old: Option<&ProbeArray<A>>,
    func: ProbeFn<A>,
    context: usize,
    priority: i32,
) -> RegistryResult<ProbeArray<A>> {
    let mut live = 0;
    if let Some(old) = old {
        for entry in old.iter_live() {
            if entry.matches(func, context) {
                return Err(RegistryError::DuplicateProbe);
            }
            live += 1;
        }
    }

    let mut entries = allocate_entries::<A>(live + 1)?;
    let mut inserted = false;
    if let Some(old) = old {
        for entry in old.iter_live() {
            // Insert before probes of strictly lower priority.
            if !inserted && entry.priority() < priority {
                entries.push(ProbeEntry::new(func, context, priority));
                inserted = true;
            }
            entries.push(entry.duplicate());
        }
    }
    if !inserted {
        entries.push(ProbeEntry::new(func, context, priority));
    }

    let new = ProbeArray::from_entries(entries);
    debug_dump("add", &new);
    Ok(new)
}

/// Outcome of a removal.
#[derive(Debug)]
pub(crate) enum Removal<A> {
    /// The sole live probe was removed; the slot goes empty, no allocation.
    Cleared,
    /// A compacted replacement array, tombstones and the match omitted.
    Replaced(ProbeArray<A>),
    /// Allocation failed; the matching entry was tombstoned in place on the
    /// published array and the removal still counts as successful.
    Tombstoned,
}

/// Remove one probe from `old`.
pub(crate) fn without_probe<A>(
    old: &ProbeArray<A>,
    func: ProbeFn<A>,
    context: usize,
) -> RegistryResult<Removal<A>> {
    let mut live = 0;
    let mut matched = 0;
    for entry in old.iter_live() {
        if entry.matches(func, context) {
            matched += 1;
        }
        live += 1;
    }
    if matched == 0 {
        return Err(RegistryError::ProbeNotFound);
    }

    let survivors = live - matched;
    if survivors == 0 {
        return Ok(Removal::Cleared);
    }

    match allocate_entries::<A>(survivors) {
        Ok(mut entries) => {
            for entry in old.iter_live() {
                if !entry.matches(func, context) {
                    entries.push(entry.duplicate());
                }
            }
            let new = ProbeArray::from_entries(entries);
            debug_dump("remove", &new);
            Ok(Removal::Replaced(new))
        }
        Err(_) => {
            // Cannot compact. Flag the matching live entries dead in place;
            // readers skip them from the next traversal on and a later
            // successful mutation compacts them physically.
            for entry in old.iter_live() {
                if entry.matches(func, context) {
                    entry.tombstone();
                }
            }
            debug_dump("remove (degraded)", old);
            Ok(Removal::Tombstoned)
        }
    }
}

fn debug_dump<A>(op: &str, array: &ProbeArray<A>) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    for (index, entry) in array.entries().iter().enumerate() {
        log::trace!(
            "{}: probe {} : func {:p} ctx {:#x} prio {}{}",
            op,
            index,
            entry.func() as usize as *const (),
            entry.context(),
            entry.priority(),
            if entry.is_dead() { " (dead)" } else { "" },
        );
    }
}
