#![deny(missing_docs)]
//! # fulcrum — execution core
//!
//! Single import surface for the execution core of a self-hosted agent
//! platform (spec §1-§9): an event bus, durable session/task stores, a
//! capacity-aware actor pool with cooperative preemption, the runners that
//! drive interactive turns and background tasks, and a handful of
//! cross-cutting daemons. Everything outside this core — the terminal UI,
//! the WebSocket gateway, the WASM plugin host, concrete tool
//! implementations, the memory/embeddings store, model provider drivers,
//! and the configuration loader — is out of scope and consumed only
//! through the narrow interfaces this crate's dependencies define.
//!
//! Re-exports the sibling crates behind feature flags and offers a
//! [`prelude`] for the common path, plus [`kit::Kit`] for wiring them
//! together.

#[cfg(feature = "core")]
pub use fulcrum_agent;
#[cfg(feature = "core")]
pub use fulcrum_bus;
#[cfg(feature = "core")]
pub use fulcrum_core;
#[cfg(feature = "daemons")]
pub use fulcrum_daemons;
#[cfg(feature = "core")]
pub use fulcrum_hooks;
#[cfg(feature = "core")]
pub use fulcrum_pool;
#[cfg(feature = "core")]
pub use fulcrum_runner;
#[cfg(feature = "core")]
pub use fulcrum_store;

#[cfg(feature = "core")]
pub mod error;
#[cfg(feature = "core")]
pub mod kit;

#[cfg(feature = "core")]
pub use error::FulcrumError;
#[cfg(feature = "core")]
pub use kit::Kit;

/// Happy-path imports for composing a fulcrum deployment.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use fulcrum_core::{
        Actor, ActorLease, ActorPool, ActorStatus, AutonomyLevel, Checkpoint, CheckpointKind,
        CoreConfig, Event, EventBus, EventPayload, EventSubscriber, MailboxKind, MailboxMessage,
        MailboxStatus, Message, PreemptHandle, Priority, ProviderConfig, Role, Session,
        SessionId, SessionStatus, SessionStore, Source, Task, TaskConfig, TaskExecutor, TaskId,
        TaskOutcome, TaskStatus, TaskStore,
    };

    #[cfg(feature = "core")]
    pub use fulcrum_bus::RingBus;

    #[cfg(feature = "core")]
    pub use fulcrum_store::{FsStore, MemoryStore};

    #[cfg(feature = "core")]
    pub use fulcrum_hooks::HookRegistry;

    #[cfg(feature = "core")]
    pub use fulcrum_agent::{Provider, ToolDyn, ToolRegistry};

    #[cfg(feature = "core")]
    pub use fulcrum_runner::{EventRunner, PersonaLayer, TaskRunner};

    #[cfg(feature = "core")]
    pub use fulcrum_pool::LocalActorPool;

    #[cfg(feature = "core")]
    pub use crate::{FulcrumError, Kit};

    #[cfg(feature = "daemons")]
    pub use fulcrum_daemons::{CostTracker, HeartbeatPublisher, LessonExtractor};
}
