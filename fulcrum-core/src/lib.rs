#![deny(missing_docs)]
//! Shared data model and protocol traits for the fulcrum agent execution core.
//!
//! This crate defines, without implementing, the four durable entities
//! (event, session, task, actor) and the seams the rest of the workspace
//! programs against:
//!
//! - [`event::EventBus`] — fan-out of typed events with a replayable tail.
//! - [`session::SessionStore`] — durable per-session metadata and message log.
//! - [`task::TaskStore`] — durable per-task metadata, checkpoints, mailbox.
//! - [`task::TaskExecutor`] — drives one task to completion or suspension.
//! - [`actor::ActorPool`] — capacity slots, scheduling, preemption.
//!
//! Implementations live in sibling crates (`fulcrum-bus`, `fulcrum-store`,
//! `fulcrum-runner`, `fulcrum-pool`); this crate has no runnable behavior.

pub mod actor;
pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod id;
pub mod session;
pub mod task;

pub use actor::{Actor, ActorLease, ActorPool, ActorStatus};
pub use config::{CoreConfig, ProviderConfig};
pub use duration::{DurationMs, Timestamp};
pub use error::{PoolError, RunnerError, StoreError};
pub use event::{Event, EventBus, EventPayload, EventSubscriber, Source};
pub use id::{ActorId, EventId, SessionId, TaskId};
pub use session::{Message, Role, Session, SessionStatus, SessionStore};
pub use task::{
    AutonomyLevel, Checkpoint, CheckpointKind, MailboxMessage, MailboxKind, MailboxStatus, Plan,
    PlanStep, PreemptHandle, Priority, Progress, StepStatus, Task, TaskConfig, TaskExecutor,
    TaskOutcome, TaskResult, TaskStatus, TaskStore,
};
