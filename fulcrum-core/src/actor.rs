//! Capacity actor data model and the `ActorPool` protocol trait (spec §3
//! "Capacity Actor", §4.6).

use crate::error::PoolError;
use crate::id::{ActorId, TaskId};
use crate::task::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Whether a capacity slot is free or bound to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    /// Free to accept the next runnable task.
    Idle,
    /// Bound to `current_task`.
    Busy,
}

/// A runtime-only capacity slot bound to one provider (spec §3 "Capacity
/// Actor").
///
/// *Invariant:* at any instant the number of `Busy` actors for provider `P`
/// equals the number of in-flight LLM turns on `P`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Deterministic identifier, `"<provider>-<i>"`.
    pub id: ActorId,
    /// The provider this actor is bound to.
    pub provider: String,
    /// Tags inherited from the provider's static configuration.
    pub tags: Vec<String>,
    /// Idle or busy.
    pub status: ActorStatus,
    /// The task currently bound to this actor, if busy.
    pub current_task: Option<TaskId>,
}

impl Actor {
    /// Construct a new idle actor.
    pub fn new(id: ActorId, provider: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id,
            provider: provider.into(),
            tags,
            status: ActorStatus::Idle,
            current_task: None,
        }
    }

    /// True iff this actor carries every tag in `required`.
    pub fn satisfies_tags(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
    }
}

/// A capability token returned by [`ActorPool::acquire_interactive`]. Holding
/// it represents exclusive use of one actor; callers must [`ActorPool::release`]
/// it exactly once.
#[derive(Debug, Clone)]
pub struct ActorLease {
    /// The actor bound to this lease.
    pub actor_id: ActorId,
    /// The provider it belongs to.
    pub provider: String,
}

/// Multiplexes runnable tasks and interactive LLM calls onto a fixed set of
/// provider-bound capacity slots (spec §4.6).
#[async_trait]
pub trait ActorPool: Send + Sync {
    /// Hand a new task to the pool. It becomes eligible for scheduling on
    /// the next tick (or immediately, if the pool signals itself).
    async fn submit(&self, task: Task) -> Result<(), PoolError>;

    /// Request cancellation. No-op on an already-terminal task; cancelling
    /// twice is the same as cancelling once.
    async fn cancel(&self, task_id: &TaskId, reason: &str) -> Result<(), PoolError>;

    /// Re-queue a suspended task (e.g. after a validation response arrives).
    async fn resume(&self, task_id: &TaskId) -> Result<(), PoolError>;

    /// Acquire an actor for an interactive (session) turn, preempting a
    /// running background task on that provider if none is idle (spec §4.6
    /// "Interactive acquisition").
    async fn acquire_interactive(&self, provider: &str) -> Result<ActorLease, PoolError>;

    /// Release a lease obtained from `acquire_interactive`, or return a
    /// background actor to idle after its task's worker exits.
    async fn release(&self, lease: ActorLease);
}
