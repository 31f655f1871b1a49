//! Concurrent dynamic probe registry.
//!
//! Call sites compiled throughout a program declare a [`HookPoint`] and
//! invoke whatever probes are currently attached to it; probes can be
//! registered and unregistered at any time while invocations run on other
//! threads. The invocation path is lock-free: it reads an atomically
//! published, immutable probe array (or a cached direct target when exactly
//! one probe is live) inside an epoch read section. Writers serialize on one
//! process-wide mutex, build replacement arrays copy-on-write, and defer
//! freeing superseded generations until every reader that could hold them
//! has quiesced. Two slot transitions need a barrier beyond plain
//! reclamation safety; see [`transition`].

pub mod epoch;
pub mod error;
mod mutate;
pub mod probe;
pub mod reclaim;
pub mod registry;
pub mod slot;
pub mod stats;
pub mod test_utils;
pub mod transition;
pub mod units;

pub use epoch::{EpochDomain, EpochToken, ReadGuard};
pub use error::{RegistryError, RegistryResult};
pub use probe::{func_state, FuncState, ProbeArray, ProbeEntry, ProbeFn};
pub use registry::HookRegistry;
pub use slot::{EdgeHooks, HookPoint, HookSlot};
pub use stats::{RegistryStats, StatsSnapshot};
pub use transition::{HazardClass, TransitionSync};
pub use units::{UnitEvent, UnitHooks, UnitObserver, UnitTracker};
