//! Error taxonomy for the core's protocol seams (spec §7).

use thiserror::Error;

/// Errors from `SessionStore`/`TaskStore` implementations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A metadata write failed (tmp-file write or rename).
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// An append to a log file failed.
    #[error("append failed: {0}")]
    AppendFailed(String),

    /// Structured (de)serialization of persisted data failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from `TaskExecutor`/`EventRunner` implementations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The chat model wrapper reported itself unavailable (rate limited,
    /// connection refused, etc). Not counted against `retry_count` — see
    /// spec §7 and the `model_unavailable` open-question decision in
    /// DESIGN.md.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A tool invocation failed past the recovery middleware's retry budget.
    #[error("tool error in {tool}: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Error message.
        message: String,
    },

    /// Context assembly (instruction/dependency/mailbox blocks) failed
    /// before the model could be called.
    #[error("context assembly failed: {0}")]
    ContextAssembly(String),

    /// A durable store operation failed mid-execution.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Any other runner failure; the task transitions to `failed`.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from `ActorPool` implementations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PoolError {
    /// No actor exists for the requested provider at all.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// No idle or preemptible actor was available for the request.
    #[error("no capacity available for provider {0}")]
    NoCapacity(String),

    /// The referenced task does not exist in the pool's bookkeeping.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A store operation the pool depends on (task lookup, status update)
    /// failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
