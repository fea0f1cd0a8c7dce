//! The LLM provider seam. Grounded on `neuron-turn/src/provider.rs`: RPITIT,
//! deliberately not dyn-compatible, since an agent invocation is generic over
//! `P: Provider` rather than holding a trait object directly.

use crate::wire::{ProviderRequest, ProviderResponse};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from LLM providers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The model backing this provider is temporarily unavailable (rate
    /// limit, outage, or local model not loaded). Distinguished from other
    /// errors because the Task Runner treats it specially (spec §4.4
    /// "Failure semantics", §7, DESIGN.md open question 1).
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The provider's HTTP/transport request failed outright.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// LLM provider interface. Each concrete backend (Anthropic, OpenAI,
/// Ollama, ...) implements this; none of those drivers live in this
/// workspace (spec §1, §6: model provider drivers are an external
/// collaborator).
pub trait Provider: Send + Sync {
    /// Send a completion request to the provider.
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send;

    /// The provider's context window size in tokens, used by the Compressor
    /// to decide when to trigger (spec §9 "Cumulative conversation
    /// summarization").
    fn context_window(&self) -> usize;
}

/// Object-safe adapter over [`Provider`], so the Task Runner can resolve a
/// provider by name (spec §4.4 "Inputs": "a chat model instance already
/// bound to the provider chosen by the scheduler") out of a
/// `HashMap<String, Arc<dyn ProviderDyn>>` instead of being generic over one
/// fixed `P`. Boxes the future the same way [`crate::tool::ToolDyn`] boxes
/// its call future; every `Provider` gets this for free via the blanket impl
/// below.
pub trait ProviderDyn: Send + Sync {
    /// Boxed-future form of [`Provider::complete`].
    fn complete_dyn(
        &self,
        request: ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>>;

    /// Forwards to [`Provider::context_window`].
    fn context_window(&self) -> usize;
}

impl<P: Provider> ProviderDyn for P {
    fn complete_dyn(
        &self,
        request: ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>> {
        Box::pin(self.complete(request))
    }

    fn context_window(&self) -> usize {
        Provider::context_window(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_unavailable_display() {
        assert_eq!(
            ProviderError::ModelUnavailable("rate limited".into()).to_string(),
            "model unavailable: rate limited"
        );
    }
}
