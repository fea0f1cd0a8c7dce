#![deny(missing_docs)]
//! The LLM-facing seam of the execution core: the [`Provider`] trait and
//! its wire types, the tool registry and recovery middleware, and the
//! conversation Compressor (spec §4.4, §9).
//!
//! Nothing here talks to the Event Bus, the stores, or the Actor Pool —
//! this crate only knows how to call a model and run tools against one
//! assembled conversation. `fulcrum-runner` is the caller that wires this
//! into the Task Runner and Event Runner.

pub mod compress;
pub mod provider;
pub mod recovery;
pub mod tool;
pub mod wire;

pub use compress::Compressor;
pub use provider::{Provider, ProviderError};
pub use recovery::{RecoveryMiddleware, ToolInvocationResult};
pub use tool::{ToolDyn, ToolError, ToolRegistry};
pub use wire::{
    ContentPart, ProviderMessage, ProviderRequest, ProviderResponse, Role, StopReason, TokenUsage,
    ToolSchema,
};
