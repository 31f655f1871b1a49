//! Error types for the hookpoint registry.

use thiserror::Error;

/// Errors that can occur while mutating a registry slot.
///
/// The lock-free read path (`invoke`/`for_each`) never fails; these errors
/// only surface from registration and unregistration.
///
/// # Examples
///
/// ```
/// use hookpoint::error::{RegistryError, RegistryResult};
///
/// let err = RegistryError::DuplicateProbe;
/// assert_eq!(err.to_string(), "probe already registered on this slot");
///
/// let outcome: RegistryResult<()> = Err(RegistryError::ProbeNotFound);
/// assert!(outcome.is_err());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The same (function, context) pair is already registered.
    #[error("probe already registered on this slot")]
    DuplicateProbe,
    /// Allocating the replacement probe array failed.
    #[error("probe array allocation failed")]
    AllocFailed,
    /// Unregistering a probe that is not present, or an empty slot.
    #[error("probe not found on this slot")]
    ProbeNotFound,
    /// A slot's first-probe edge hook refused the registration.
    #[error("slot edge hook failed: {0}")]
    EdgeHookFailed(String),
}

/// Result type for registry mutations.
pub type RegistryResult<T> = Result<T, RegistryError>;
