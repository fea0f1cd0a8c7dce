//! The event model and `EventBus` protocol trait (spec §3, §4.1).

use crate::id::{EventId, SessionId, TaskId};
use crate::duration::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Who caused an event to be published.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A human user.
    User,
    /// The LLM agent.
    Agent,
    /// A background task.
    Task,
    /// The actor pool's scheduling loop.
    Scheduler,
    /// A tool invocation.
    Tool,
    /// The runtime itself (crash recovery, heartbeats).
    System,
}

/// Phase of a streamed assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// The stream has opened; no content yet.
    Start,
    /// One chunk of streamed content.
    Delta,
    /// The stream has closed.
    End,
}

/// Status of a single tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// The tool invocation has begun.
    Started,
    /// The tool invocation returned successfully.
    Completed,
    /// The tool invocation returned an error.
    Failed,
}

/// Phase of a provider call, for `llm.call` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmCallPhase {
    /// The request is about to be sent.
    Request,
    /// A response was received.
    Response,
    /// The call failed.
    Error,
}

/// Phase of a task's lifecycle, for `task.*` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLifecyclePhase {
    /// The task was submitted.
    Created,
    /// The scheduler launched the task on an actor.
    Started,
    /// A progress update (plan step advanced).
    Progress,
    /// The task reached `completed`.
    Completed,
    /// The task reached `failed`.
    Failed,
    /// The task reached `cancelled`.
    Cancelled,
    /// The task reached `suspended`.
    Suspended,
    /// The task re-entered `pending` after a suspension.
    Resumed,
}

/// Outcome of a validation round (approve or request changes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// The user approved the plan; execution proceeds.
    Approved,
    /// The user asked for revisions.
    Revise,
}

/// The closed set of event payloads (spec §3, §6 "Event types").
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    /// `user.message`
    UserMessage {
        /// The message text.
        content: String,
    },
    /// `assistant.message`
    AssistantMessage {
        /// The assistant's reply text. Empty when `error` is set.
        content: String,
        /// Non-empty when the turn failed; no assistant message was persisted.
        error: Option<String>,
    },
    /// `assistant.stream`
    AssistantStream {
        /// Which part of the stream this event represents.
        phase: StreamPhase,
        /// Monotonic index within the turn, starting at 1. Ignored for `Start`/`End`.
        index: u64,
        /// The chunk of content, present only for `Delta`.
        delta: Option<String>,
    },
    /// `tool.call`
    ToolCall {
        /// The tool's name.
        tool: String,
        /// Lifecycle status of this invocation.
        status: ToolCallStatus,
        /// Result or error summary, present for `Completed`/`Failed`.
        detail: Option<String>,
    },
    /// `llm.call`
    LlmCall {
        /// Which phase of the call this event represents.
        phase: LlmCallPhase,
        /// Input tokens consumed, if known at this phase.
        tokens_in: u64,
        /// Output tokens produced, if known at this phase.
        tokens_out: u64,
    },
    /// `task.{created,started,progress,completed,failed,cancelled,suspended,resumed}`
    TaskLifecycle {
        /// Which lifecycle phase this event represents.
        phase: TaskLifecyclePhase,
        /// Free-form detail (suspension reason, failure message, ...).
        detail: Option<String>,
    },
    /// `validation.request`
    ValidationRequest {
        /// Correlates with the eventual `validation.response`.
        token: String,
        /// The plan/question text presented for approval.
        content: String,
    },
    /// `validation.response`
    ValidationResponse {
        /// Matches the token from the corresponding `validation.request`.
        token: String,
        /// Approve or request revisions.
        status: ValidationStatus,
    },
    /// `prompt.request`
    PromptRequest {
        /// Correlates with the eventual `prompt.response`.
        token: String,
        /// The prompt text shown to the user.
        prompt: String,
    },
    /// `prompt.response`
    PromptResponse {
        /// Matches the token from the corresponding `prompt.request`.
        token: String,
        /// The user's answer.
        value: String,
    },
    /// `schedule.trigger`
    ScheduleTrigger {
        /// Why the scheduling loop woke (signal vs. timer tick).
        reason: String,
    },
    /// `heartbeat` (Supplement B): observational only, published every 30s.
    Heartbeat {
        /// Actors currently busy, summed across all providers.
        busy_actors: u32,
        /// Total configured actors, summed across all providers.
        total_actors: u32,
    },
}

impl EventPayload {
    /// Stable event-type string, matching spec §6's closed set of names.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::UserMessage { .. } => "user.message",
            EventPayload::AssistantMessage { .. } => "assistant.message",
            EventPayload::AssistantStream { .. } => "assistant.stream",
            EventPayload::ToolCall { .. } => "tool.call",
            EventPayload::LlmCall { .. } => "llm.call",
            EventPayload::TaskLifecycle { phase, .. } => match phase {
                TaskLifecyclePhase::Created => "task.created",
                TaskLifecyclePhase::Started => "task.started",
                TaskLifecyclePhase::Progress => "task.progress",
                TaskLifecyclePhase::Completed => "task.completed",
                TaskLifecyclePhase::Failed => "task.failed",
                TaskLifecyclePhase::Cancelled => "task.cancelled",
                TaskLifecyclePhase::Suspended => "task.suspended",
                TaskLifecyclePhase::Resumed => "task.resumed",
            },
            EventPayload::ValidationRequest { .. } => "validation.request",
            EventPayload::ValidationResponse { .. } => "validation.response",
            EventPayload::PromptRequest { .. } => "prompt.request",
            EventPayload::PromptResponse { .. } => "prompt.response",
            EventPayload::ScheduleTrigger { .. } => "schedule.trigger",
            EventPayload::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// An immutable record published on the event bus (spec §3 "Event").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic identifier, assigned by the bus at publish time.
    pub id: EventId,
    /// When the event was published.
    pub timestamp: Timestamp,
    /// Who caused the event.
    pub source: Source,
    /// The session this event belongs to, if any.
    pub session_id: Option<SessionId>,
    /// The task this event belongs to, if any.
    pub task_id: Option<TaskId>,
    /// The typed payload.
    pub payload: EventPayload,
}

impl Event {
    /// Construct an event with a placeholder id; the bus overwrites `id`
    /// and `timestamp` at publish time so callers never need to coordinate
    /// a monotonic counter themselves.
    pub fn new(source: Source, payload: EventPayload) -> Self {
        Self {
            id: EventId::new("0"),
            timestamp: Timestamp::now(),
            source,
            session_id: None,
            task_id: None,
            payload,
        }
    }

    /// Attach a session id.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach a task id.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Stable event-type string (delegates to the payload).
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Receiving half of a bus subscription. Cheap to poll; bounded, so a slow
/// consumer drops events rather than stalling the publisher (spec §4.1).
pub struct EventSubscriber {
    rx: mpsc::Receiver<Event>,
}

impl EventSubscriber {
    /// Wrap a receiver. Bus implementations construct this; consumers only
    /// ever receive one from [`EventBus::subscribe`].
    pub fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Await the next event, or `None` once the bus has closed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking poll for the next event.
    pub fn try_recv(&mut self) -> Result<Event, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Await the next event whose [`Event::event_type`] is in `types`,
    /// discarding everything else in between. `None` once the bus has
    /// closed and drained without producing a match.
    ///
    /// Spec §6 describes `subscribe(handler, typefilter...)`; rather than
    /// filtering at registration (which would mean a subscriber can never
    /// widen its interest later), the filter is applied here, against the
    /// same unfiltered receiver `subscribe` hands back.
    pub async fn recv_matching(&mut self, types: &[&str]) -> Option<Event> {
        loop {
            let event = self.rx.recv().await?;
            if types.contains(&event.event_type()) {
                return Some(event);
            }
        }
    }
}

/// Fan-out of typed events with a replayable tail (spec §4.1).
///
/// `publish` never blocks and never fails: a subscriber whose queue is full
/// simply drops that event, in isolation from every other subscriber.
pub trait EventBus: Send + Sync {
    /// Publish an event. Non-blocking; fans out to all live subscribers.
    fn publish(&self, event: Event);

    /// Register a new subscriber. Events published after this call (and
    /// only those) are delivered to it, subject to its queue capacity.
    fn subscribe(&self) -> EventSubscriber;

    /// The last `n` published events, oldest first, for late joiners that
    /// want to reconcile against the ring before subscribing live.
    fn tail(&self, n: usize) -> Vec<Event>;

    /// Stop dispatch. Subsequent `publish` calls are a no-op; `tail` keeps
    /// serving already-published history (Supplement A).
    fn close(&self);
}
