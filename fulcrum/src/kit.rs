//! Unopinionated wiring handle for assembling a runnable execution core.
//!
//! Grounded on `neuron-orch-kit/src/kit.rs`'s `Kit`: a small struct that
//! holds the already-constructed protocol implementations and offers
//! fluent `with_*` builders plus a couple of helpers for wiring that would
//! otherwise be repeated by every caller. Like its model, `Kit` is
//! deliberately thin — callers can always bypass it and wire
//! `fulcrum-core`'s traits directly.

use fulcrum_core::{
    ActorPool, EventBus, MailboxKind, MailboxMessage, MailboxStatus, SessionStore, TaskId,
    TaskStore, Timestamp,
};
use fulcrum_pool::LocalActorPool;
use std::sync::Arc;

use crate::error::FulcrumError;

/// Holds the durable stores, bus, and actor pool a deployment needs, and
/// provides the cross-cutting helpers that span more than one of them (a
/// validation reply, in particular, touches the Task Store, the bus, and
/// the pool all at once — spec §4.4 "Self-suspension protocol").
#[derive(Clone)]
pub struct Kit {
    bus: Arc<dyn EventBus>,
    session_store: Arc<dyn SessionStore>,
    task_store: Arc<dyn TaskStore>,
    pool: LocalActorPool,
}

impl Kit {
    /// Assemble a kit from its already-constructed parts. Building the
    /// parts themselves (which `RingBus`/`MemoryStore`/`FsStore` to use,
    /// which providers to register) is left to the caller, same as
    /// `neuron-orch-kit`'s `Kit::new`.
    pub fn new(
        bus: Arc<dyn EventBus>,
        session_store: Arc<dyn SessionStore>,
        task_store: Arc<dyn TaskStore>,
        pool: LocalActorPool,
    ) -> Self {
        Self { bus, session_store, task_store, pool }
    }

    /// The event bus.
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// The session store.
    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.session_store
    }

    /// The task store.
    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.task_store
    }

    /// The actor pool.
    pub fn pool(&self) -> &LocalActorPool {
        &self.pool
    }

    /// Submit a task to the pool (spec §6 "Task submitter").
    pub async fn submit(&self, task: fulcrum_core::Task) -> Result<(), FulcrumError> {
        self.pool.submit(task).await.map_err(Into::into)
    }

    /// Resolve a pending validation (spec §4.4 "Self-suspension protocol":
    /// "a subsequent user `approve` or `revise` arrives through the
    /// external boundary, appends a `response` mailbox message, clears the
    /// flag, and re-queues the task").
    ///
    /// This is the one operation the spec describes that genuinely spans
    /// three collaborators — the Task Store (the mailbox entry), the bus
    /// (the `validation.response` event clients are watching for), and the
    /// pool (the re-queue) — which is exactly the kind of seam a `Kit`
    /// exists to paper over.
    pub async fn submit_validation_response(
        &self,
        task_id: &TaskId,
        token: impl Into<String>,
        approved: bool,
    ) -> Result<(), FulcrumError> {
        let token = token.into();
        if self.task_store.get(task_id).await?.is_none() {
            return Err(FulcrumError::UnknownTask(task_id.to_string()));
        }

        let status = if approved { MailboxStatus::Approved } else { MailboxStatus::Revise };
        self.task_store
            .append_mailbox(
                task_id,
                MailboxMessage {
                    id: format!("mbx-resp-{token}"),
                    timestamp: Timestamp::now(),
                    kind: MailboxKind::Response,
                    token: Some(token.clone()),
                    content: String::new(),
                    status: Some(status),
                },
            )
            .await?;

        self.bus.publish(
            fulcrum_core::Event::new(
                fulcrum_core::Source::User,
                fulcrum_core::EventPayload::ValidationResponse {
                    token,
                    status: if approved {
                        fulcrum_core::event::ValidationStatus::Approved
                    } else {
                        fulcrum_core::event::ValidationStatus::Revise
                    },
                },
            )
            .with_task(task_id.clone()),
        );

        self.pool.resume(task_id).await.map_err(Into::into)
    }
}
