#![deny(missing_docs)]
//! The Event Runner and Task Runner: the two orchestrators that turn a
//! `fulcrum-agent` provider call plus tool registry into an interactive
//! session turn or a task's full execution (spec §4.3, §4.4, §4.5).
//!
//! This crate owns the shared ReAct loop ([`react`]), instruction assembly
//! ([`instructions`]), best-effort plan parsing ([`plan_parser`]), and the
//! two runners built from them ([`task_runner::TaskRunner`],
//! [`event_runner::EventRunner`]). Nothing here talks to the Actor Pool's
//! scheduling policy (`fulcrum-pool`) or the durable stores' on-disk layout
//! (`fulcrum-store`) — it is handed `Arc<dyn TaskStore>`/`Arc<dyn
//! SessionStore>`/`Arc<dyn EventBus>` and only knows the protocol traits
//! `fulcrum-core` defines.

pub mod event_runner;
pub mod instructions;
pub mod plan_parser;
pub mod react;
pub mod task_runner;

pub use event_runner::EventRunner;
pub use instructions::PersonaLayer;
pub use task_runner::{SkillExecutor, TaskRunner};
