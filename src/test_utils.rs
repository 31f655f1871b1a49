//! Fault-injection helpers for exercising the degraded removal path.
//!
//! Real allocation failure is next to impossible to provoke in a test, so
//! the mutation engine consults a failure budget before every array
//! allocation. The budget is per-thread: a test arms failures for the
//! mutations it performs itself, and tests running in parallel never consume
//! each other's budget. Production code never touches it.

use std::cell::Cell;

thread_local! {
    static FORCED_ALLOC_FAILURES: Cell<usize> = const { Cell::new(0) };
}

/// Make the next `count` probe-array allocations on this thread fail.
pub fn force_alloc_failures(count: usize) {
    FORCED_ALLOC_FAILURES.with(|budget| budget.set(budget.get() + count));
}

/// Clear any armed failures on this thread.
pub fn clear_alloc_failures() {
    FORCED_ALLOC_FAILURES.with(|budget| budget.set(0));
}

/// Consume one armed failure, if any.
pub(crate) fn take_forced_alloc_failure() -> bool {
    FORCED_ALLOC_FAILURES.with(|budget| {
        let remaining = budget.get();
        if remaining == 0 {
            return false;
        }
        budget.set(remaining - 1);
        true
    })
}

/// Arms `count` allocation failures and disarms any leftovers on drop.
pub struct AllocFailureGuard;

impl AllocFailureGuard {
    pub fn new(count: usize) -> Self {
        force_alloc_failures(count);
        AllocFailureGuard
    }
}

impl Drop for AllocFailureGuard {
    fn drop(&mut self) {
        clear_alloc_failures();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_consumed_one_failure_at_a_time() {
        force_alloc_failures(2);
        assert!(take_forced_alloc_failure());
        assert!(take_forced_alloc_failure());
        assert!(!take_forced_alloc_failure());
    }

    #[test]
    fn guard_disarms_on_drop() {
        {
            let _guard = AllocFailureGuard::new(5);
        }
        assert!(!take_forced_alloc_failure());
    }
}
