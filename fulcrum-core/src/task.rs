//! Task, plan, checkpoint, and mailbox data model, and the `TaskStore` /
//! `TaskExecutor` protocol traits (spec §3 "Task"/"Plan"/"Checkpoint"/
//! "Mailbox", §4.2, §4.4, §4.5).

use crate::duration::Timestamp;
use crate::error::{RunnerError, StoreError};
use crate::id::{SessionId, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a task stands in the state machine of spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted or resumed, waiting for an idle actor.
    Pending,
    /// Bound to an actor, executing.
    Running,
    /// Cooperatively paused — preemption or self-suspension (validation).
    Suspended,
    /// Terminal: finished successfully.
    Completed,
    /// Terminal: `retry_count >= max_retries`, or an unrecoverable error.
    Failed,
    /// Terminal: cancelled by the user or cascaded from a parent.
    Cancelled,
}

/// Scheduling priority; lower-priority running tasks are preempted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Preempted before `Normal` or `High`.
    Low,
    /// Default priority.
    Normal,
    /// Preempted last.
    High,
}

/// How much autonomy the task's agent invocation is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// One LLM invocation, no coordinator phases.
    Disabled,
    /// Plan first, wait for human approval, then execute.
    Supervised,
    /// Plan and execute without stopping for approval.
    Autonomous,
}

/// Per-task execution configuration (spec §3 "Task" `config`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    /// If set and a skill executor is available, bypasses LLM reasoning
    /// entirely (spec §4.4 "Skill shortcut").
    pub skill: Option<String>,
    /// Tool names the agent invocation is allowed to call. Empty means "all
    /// tools known to the lookup".
    pub tool_whitelist: Vec<String>,
    /// Selects among the five execution modes together with the plan shape.
    pub autonomy_level: AutonomyLevel,
    /// Working directory passed into instruction assembly's
    /// execution-context block.
    pub working_directory: Option<String>,
    /// Environment variables passed into instruction assembly's
    /// execution-context block (sorted before rendering).
    pub environment: HashMap<String, String>,
    /// Tags an actor must carry to be eligible to run this task.
    pub tag_requirements: Vec<String>,
}

/// Current progress within a plan (spec §3 "Task" `progress`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    /// 1-indexed current step, or 0 before the first step starts.
    pub current_step: u32,
    /// Total steps in the plan, or 0 for non-plan modes.
    pub total_steps: u32,
    /// Human-readable label for the current step.
    pub label: String,
    /// `current_step / total_steps`, pre-computed for display.
    pub percentage: f32,
}

/// Terminal result payload once a task leaves `running`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    /// Pointer to the task's output blob, if one was written.
    pub output_path: Option<String>,
    /// Error text, set only on `failed`.
    pub error: Option<String>,
}

/// Status of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet executed.
    Pending,
    /// Finished; a matching `step_completed` checkpoint exists.
    Completed,
}

/// One step of a task's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Stable identifier, unique within the plan.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Longer description fed to the step's agent invocation.
    pub description: String,
    /// Pending or completed.
    pub status: StepStatus,
}

/// Ordered list of steps a task executes sequentially (spec §3 "Plan").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Steps in execution order.
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// The first step still `Pending`, i.e. the resumption point after a
    /// crash or preemption (spec §3 "Checkpoint": "used to determine
    /// resumption point").
    pub fn next_pending(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }
}

/// Checkpoint kind (spec §3 "Checkpoint").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// A plan step began executing.
    StepStarted,
    /// A plan step finished successfully.
    StepCompleted,
    /// A plan step errored.
    StepFailed,
    /// The task was suspended (preemption or validation).
    Suspended,
    /// Crash recovery reset this task from `running` to `pending`.
    Recovery,
    /// The task was cancelled.
    Cancelled,
    /// The task failed outright (not step-scoped).
    Failed,
    /// An informational note with no state-machine meaning.
    Note,
}

/// One entry in a task's append-only checkpoint log (spec §3 "Checkpoint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// When the checkpoint was appended.
    pub timestamp: Timestamp,
    /// The plan step this checkpoint concerns, if any.
    pub step_id: Option<String>,
    /// What kind of checkpoint this is.
    pub kind: CheckpointKind,
    /// Free-form summary (suspension reason, failure message, ...).
    pub summary: String,
}

impl Checkpoint {
    /// Construct a checkpoint stamped with the current time.
    pub fn new(kind: CheckpointKind, summary: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            step_id: None,
            kind,
            summary: summary.into(),
        }
    }

    /// Attach a plan step id.
    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

/// Kind of mailbox entry (spec §3 "Mailbox").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxKind {
    /// The agent is asking the user to approve or revise a plan.
    Request,
    /// The user's answer.
    Response,
    /// Exploration text accumulated before a `Request` was raised.
    Exploration,
}

/// Outcome of a validation request the user has answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxStatus {
    /// The user approved; execution proceeds.
    Approved,
    /// The user asked for revisions.
    Revise,
}

/// One entry in a task's append-only validation-exchange log (spec §3
/// "Mailbox").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxMessage {
    /// Stable identifier, unique within the mailbox.
    pub id: String,
    /// When the message was appended.
    pub timestamp: Timestamp,
    /// Request, response, or exploration.
    pub kind: MailboxKind,
    /// Correlates a `Request` with its eventual `Response`.
    pub token: Option<String>,
    /// The message text.
    pub content: String,
    /// Set on `Response`: approved or revise.
    pub status: Option<MailboxStatus>,
}

/// Durable per-task metadata, dependency list, and result (spec §3 "Task").
///
/// *Invariants:* a task transitions only along the state machine of spec
/// §4.5; dependencies are resolved iff every entry in `depends_on` is
/// `completed`; `waiting_for_reply = true` implies `status = Suspended`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// The interactive session that spawned this task, if any.
    pub session_id: Option<SessionId>,
    /// The coordinator task this step belongs to, if any.
    pub parent_task_id: Option<TaskId>,
    /// Short title.
    pub title: String,
    /// Longer description, fed to the agent invocation.
    pub description: String,
    /// Current state-machine status.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: Priority,
    /// When the task was submitted.
    pub created_at: Timestamp,
    /// When any field of the task last changed.
    pub updated_at: Timestamp,
    /// When the task first entered `running`.
    pub started_at: Option<Timestamp>,
    /// When the task most recently entered `suspended`.
    pub suspended_at: Option<Timestamp>,
    /// When the task reached `completed`.
    pub completed_at: Option<Timestamp>,
    /// The plan, if one has been drafted (plan-steps or coordinator modes).
    pub plan: Option<Plan>,
    /// Step/percentage progress.
    pub progress: Progress,
    /// Execution configuration.
    pub config: TaskConfig,
    /// Prerequisite task ids; this task is runnable only once every entry
    /// here is `completed`.
    pub depends_on: Vec<TaskId>,
    /// Terminal result, set once the task leaves `running` for the last time.
    pub result: Option<TaskResult>,
    /// How many times this task has been retried after a non-suspend failure.
    pub retry_count: u32,
    /// Retries allowed before `failed` becomes terminal.
    pub max_retries: u32,
    /// How many times this task has been suspended (preemption or validation).
    pub suspend_count: u32,
    /// True iff the task is waiting on a user validation response. Implies
    /// `status = Suspended`.
    pub waiting_for_reply: bool,
}

impl Task {
    /// Construct a new, pending task with the given title/description.
    pub fn new(id: TaskId, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            session_id: None,
            parent_task_id: None,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            created_at: now,
            updated_at: now,
            started_at: None,
            suspended_at: None,
            completed_at: None,
            plan: None,
            progress: Progress::default(),
            config: TaskConfig::default(),
            depends_on: Vec::new(),
            result: None,
            retry_count: 0,
            max_retries: 3,
            suspend_count: 0,
            waiting_for_reply: false,
        }
    }

    /// Whether every dependency is `completed` (spec §3 invariant, §4.6
    /// "Dependency gating").
    pub fn dependencies_resolved(&self, lookup: impl Fn(&TaskId) -> Option<TaskStatus>) -> bool {
        self.depends_on
            .iter()
            .all(|dep| lookup(dep) == Some(TaskStatus::Completed))
    }

    /// True once the task can no longer transition (spec §4.5 "Terminal states").
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Durable store for tasks, their checkpoint log, mailbox log, and output
/// blob (spec §4.2).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a new task. Errors if one with the same id already exists.
    async fn create(&self, task: Task) -> Result<(), StoreError>;

    /// Fetch a task's metadata, or `None` if it does not exist.
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Atomically rewrite a task's metadata.
    async fn update(&self, task: &Task) -> Result<(), StoreError>;

    /// All known tasks. At the expected scale (tens of tasks, spec §9) a
    /// full scan on every scheduling tick is cheaper than an index.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    /// Append one checkpoint to the task's log.
    async fn append_checkpoint(&self, id: &TaskId, checkpoint: Checkpoint) -> Result<(), StoreError>;

    /// The full checkpoint log, in append order.
    async fn checkpoints(&self, id: &TaskId) -> Result<Vec<Checkpoint>, StoreError>;

    /// Append one mailbox entry to the task's log.
    async fn append_mailbox(&self, id: &TaskId, message: MailboxMessage) -> Result<(), StoreError>;

    /// The full mailbox log, in append order.
    async fn mailbox(&self, id: &TaskId) -> Result<Vec<MailboxMessage>, StoreError>;

    /// Overwrite the task's single output blob.
    async fn write_output(&self, id: &TaskId, content: &str) -> Result<(), StoreError>;

    /// Read the task's output blob, if one has been written.
    async fn read_output(&self, id: &TaskId) -> Result<Option<String>, StoreError>;
}

/// What a `TaskExecutor::run` call resolved to; the actor pool uses this to
/// decide the next state transition and whether to count a retry (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Reached `completed`.
    Completed,
    /// Reached `failed`; `retry_count` should be considered.
    Failed,
    /// Reached `suspended` via self-suspension (validation) or preemption.
    Suspended,
    /// Reached `cancelled`.
    Cancelled,
    /// The chat model reported itself unavailable; reset to `pending`
    /// without incrementing `retry_count` (DESIGN.md open question 1).
    ModelUnavailable,
}

/// A cooperative preemption signal the pool hands to a running task (spec
/// §4.4 "Preemption check", §4.6).
#[derive(Clone)]
pub struct PreemptHandle(tokio::sync::watch::Receiver<bool>);

impl PreemptHandle {
    /// Wrap a watch receiver.
    pub fn new(rx: tokio::sync::watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    /// A handle that never signals preemption, for tests and single-shot
    /// execution modes that do not poll between events.
    pub fn never() -> Self {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        Self(rx)
    }

    /// Whether preemption has been requested.
    pub fn is_set(&self) -> bool {
        *self.0.borrow()
    }
}

/// Drives one task to a terminal state or a cooperative suspension (spec
/// §4.4). Implemented once, generically over any task; the provider to use
/// is resolved by name so the actor pool can bind different tasks to
/// different providers without the trait knowing about providers at all.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run `task` to completion, failure, cancellation, or suspension,
    /// using the provider registered under `provider`.
    async fn run(
        &self,
        task: Task,
        provider: &str,
        preempt: PreemptHandle,
    ) -> Result<TaskOutcome, RunnerError>;
}
