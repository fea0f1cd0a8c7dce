//! Error type for the daemons in this crate.

use fulcrum_core::StoreError;
use thiserror::Error;

/// Errors a daemon can encounter while reacting to one event. Callers log
/// and continue rather than propagate — see each daemon's module doc.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The summarizer failed to produce lessons.
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// Catch-all, for retriever/memory-store implementations with their own
    /// error types.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
