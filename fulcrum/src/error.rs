//! The facade's only error type: a thin union over the errors its wiring
//! helpers can surface, so callers using [`crate::kit::Kit`] don't need to
//! match on every sub-crate's error type separately.

use thiserror::Error;

/// Errors surfaced by [`crate::kit::Kit`]'s convenience methods.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FulcrumError {
    /// A durable store operation failed.
    #[error(transparent)]
    Store(#[from] fulcrum_core::StoreError),

    /// The actor pool rejected a scheduling operation.
    #[error(transparent)]
    Pool(#[from] fulcrum_core::PoolError),

    /// The referenced task does not exist.
    #[error("unknown task: {0}")]
    UnknownTask(String),
}
