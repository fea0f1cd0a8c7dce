//! End-to-end coverage of spec §8's six concrete scenarios, driven against
//! the in-memory store/bus and a scripted [`fulcrum_agent::Provider`]
//! standing in for the out-of-scope model driver.
//!
//! One scenario is adapted to match what the workspace actually publishes
//! (see `DESIGN.md`'s "Status" section for the full rationale): *supervised
//! validation* asserts the request side through Task Store state (the
//! `suspended`/`waiting_for_reply` flag and the mailbox's `request` entry)
//! rather than a `validation.request` bus event, since that side channel is
//! still mailbox-only — a task never publishes to the bus directly, the
//! pool owns every `task.*` lifecycle event, and a validation request isn't
//! one of those.

use fulcrum::fulcrum_agent;
use fulcrum::fulcrum_agent::{
    ContentPart, Provider, ProviderError, ProviderRequest, ProviderResponse, StopReason, ToolError,
    TokenUsage,
};
use fulcrum::fulcrum_core::event::{StreamPhase, ValidationStatus};
use fulcrum::fulcrum_core::{ActorPool, EventPayload, RunnerError};
use fulcrum::fulcrum_daemons::recover as crash_recover;
use fulcrum::fulcrum_pool::LocalActorPool;
use fulcrum::fulcrum_runner::{EventRunner, PersonaLayer, TaskRunner};
use fulcrum::fulcrum_store::MemoryStore;
use fulcrum::prelude::*;
use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

// ---------------------------------------------------------------------
// Shared fixtures
// ---------------------------------------------------------------------

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::Text { text: text.to_string() }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage { input_tokens: 12, output_tokens: 6 },
        model: "scripted".to_string(),
        cost: None,
    }
}

fn tool_use_response(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        content: vec![ContentPart::ToolUse { id: id.to_string(), name: name.to_string(), input }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage { input_tokens: 20, output_tokens: 8 },
        model: "scripted".to_string(),
        cost: None,
    }
}

fn text_and_tool_use(text: &str, id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        content: vec![
            ContentPart::Text { text: text.to_string() },
            ContentPart::ToolUse { id: id.to_string(), name: name.to_string(), input },
        ],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage { input_tokens: 20, output_tokens: 8 },
        model: "scripted".to_string(),
        cost: None,
    }
}

/// A provider that replays a fixed script of responses in order, one per
/// call. Panics the test (via the returned error surfacing as a task
/// failure) rather than hanging if the script runs out, so a miscounted
/// scenario fails loudly instead of stalling.
struct ScriptedProvider {
    responses: AsyncMutex<VecDeque<ProviderResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self { responses: AsyncMutex::new(responses.into()) })
    }
}

impl Provider for ScriptedProvider {
    fn complete(
        &self,
        _request: ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send {
        async move {
            self.responses
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| ProviderError::RequestFailed("scripted provider script exhausted".into()))
        }
    }

    fn context_window(&self) -> usize {
        100_000
    }
}

/// A tool that sleeps briefly then succeeds, used to keep a task
/// observably `running` long enough for an interactive preemption to land.
struct SleepTool(Duration);

impl fulcrum_agent::ToolDyn for SleepTool {
    fn name(&self) -> &str {
        "wait"
    }
    fn description(&self) -> &str {
        "Waits, then returns."
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    fn call(
        &self,
        _input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        let delay = self.0;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(json!({"status": "done"}))
        })
    }
}

/// A no-op tool used purely to give the supervised-validation scenario an
/// exploration step before it asks for approval.
struct PeekTool;

impl fulcrum_agent::ToolDyn for PeekTool {
    fn name(&self) -> &str {
        "peek"
    }
    fn description(&self) -> &str {
        "Looks something up."
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    fn call(
        &self,
        _input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        Box::pin(async move { Ok(json!({"found": "nothing interesting"})) })
    }
}

/// A tool that fails its first `fail_count` calls, then succeeds forever
/// after (spec §8 scenario 6's "fails with a specific error twice then
/// succeeds"), or fails unconditionally when `fail_count` is `u32::MAX`.
struct FlakyTool {
    fail_count: u32,
    calls: AtomicU32,
}

impl FlakyTool {
    fn failing_n_times(n: u32) -> Arc<Self> {
        Arc::new(Self { fail_count: n, calls: AtomicU32::new(0) })
    }
    fn always_failing() -> Arc<Self> {
        Arc::new(Self { fail_count: u32::MAX, calls: AtomicU32::new(0) })
    }
}

impl fulcrum_agent::ToolDyn for FlakyTool {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "Fails a configured number of times before succeeding."
    }
    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }
    fn call(
        &self,
        _input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_count = self.fail_count;
        Box::pin(async move {
            if attempt <= fail_count {
                Err(ToolError::ExecutionFailed(format!("transient failure #{attempt}")))
            } else {
                Ok(json!({"result": "ok"}))
            }
        })
    }
}

/// Grants an interactive lease for any provider unconditionally, so
/// scenarios that only exercise `EventRunner` (and never submit a
/// background task) don't need a fully wired `LocalActorPool` with its
/// own task store and scheduler.
struct AlwaysGrantPool;

#[async_trait::async_trait]
impl ActorPool for AlwaysGrantPool {
    async fn submit(&self, _task: Task) -> Result<(), fulcrum::fulcrum_core::PoolError> {
        Ok(())
    }
    async fn cancel(&self, _task_id: &TaskId, _reason: &str) -> Result<(), fulcrum::fulcrum_core::PoolError> {
        Ok(())
    }
    async fn resume(&self, _task_id: &TaskId) -> Result<(), fulcrum::fulcrum_core::PoolError> {
        Ok(())
    }
    async fn acquire_interactive(&self, provider: &str) -> Result<fulcrum::fulcrum_core::ActorLease, fulcrum::fulcrum_core::PoolError> {
        Ok(fulcrum::fulcrum_core::ActorLease {
            actor_id: fulcrum::fulcrum_core::ActorId::new(format!("{provider}-0")),
            provider: provider.to_string(),
        })
    }
    async fn release(&self, _lease: fulcrum::fulcrum_core::ActorLease) {}
}

fn single_provider_config(max_concurrent: u32) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.providers.insert(
        "demo".to_string(),
        ProviderConfig { max_concurrent, tags: Vec::new() },
    );
    config.preemption_cooperative_wait_secs = 2;
    config.preemption_watchdog_secs = 5;
    config.scheduler_tick_secs = 1;
    config
}

async fn poll_until<F, Fut>(mut check: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------
// Scenario 1: hello world
// ---------------------------------------------------------------------

#[tokio::test]
async fn hello_world_turn_emits_the_expected_event_sequence() {
    let bus = RingBus::with_defaults() as Arc<dyn EventBus>;
    let session_store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let provider = ScriptedProvider::new(vec![text_response("hi yourself")]);

    let runner = EventRunner::new(
        PersonaLayer::default(),
        session_store.clone(),
        bus.clone(),
        Arc::new(AlwaysGrantPool),
        Arc::new(ToolRegistry::new()),
        Arc::new(HookRegistry::new()),
        fulcrum::fulcrum_agent::Compressor::new(0.8),
    )
    .with_provider("demo", provider as Arc<dyn fulcrum_agent::provider::ProviderDyn>);

    let mut subscriber = bus.subscribe();
    let session_id = SessionId::new("s-hello");

    let reply = runner.handle_turn(session_id.clone(), "demo", "Say hi.".to_string()).await.unwrap();
    assert!(!reply.is_empty());

    let mut saw_user_message = false;
    let mut saw_stream_start = false;
    let mut delta_count = 0;
    let mut saw_stream_end = false;
    let mut saw_assistant_message = false;

    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
            .await
            .expect("event should arrive promptly")
            .expect("bus should not close mid-test");

        match &event.payload {
            EventPayload::UserMessage { .. } if !saw_stream_start => saw_user_message = true,
            EventPayload::AssistantStream { phase: StreamPhase::Start, .. } if saw_user_message => {
                saw_stream_start = true;
            }
            EventPayload::AssistantStream { phase: StreamPhase::Delta, .. } if saw_stream_start => {
                delta_count += 1;
            }
            EventPayload::AssistantStream { phase: StreamPhase::End, .. } if delta_count >= 1 => {
                saw_stream_end = true;
            }
            EventPayload::AssistantMessage { content, error: None } if saw_stream_end => {
                assert!(!content.is_empty());
                saw_assistant_message = true;
            }
            other => panic!("unexpected event out of order: {:?}", other.event_type()),
        }
    }

    assert!(saw_user_message && saw_stream_start && delta_count >= 1 && saw_stream_end && saw_assistant_message);

    let messages = session_store.messages(&session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

// ---------------------------------------------------------------------
// Scenario 2: preemption
// ---------------------------------------------------------------------

#[tokio::test]
async fn low_priority_task_is_preempted_for_an_interactive_caller() {
    let bus = RingBus::with_defaults() as Arc<dyn EventBus>;
    let task_store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());

    // Turn 1 triggers a tool call that sleeps briefly; turn 2 (only
    // reached if preemption did *not* land) would complete immediately.
    let provider = ScriptedProvider::new(vec![
        tool_use_response("call-1", "wait", json!({})),
        text_response("finished without being preempted"),
    ]);
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(SleepTool(Duration::from_millis(150))));

    let runner = TaskRunner::new(
        PersonaLayer::default(),
        task_store.clone(),
        bus.clone(),
        Arc::new(tools),
        Arc::new(HookRegistry::new()),
        fulcrum::fulcrum_agent::Compressor::new(0.8),
    )
    .with_provider("demo", provider as Arc<dyn fulcrum_agent::provider::ProviderDyn>);

    let config = single_provider_config(1);
    let pool = LocalActorPool::new(task_store.clone(), Arc::new(runner), bus.clone(), &config);
    pool.spawn_scheduler();

    let mut task = Task::new(TaskId::new("low-1"), "background chore", "a low priority background chore");
    task.priority = Priority::Low;
    pool.submit(task.clone()).await.unwrap();

    let became_running = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Running))
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(became_running, "low priority task should start running almost immediately");

    let lease = pool.acquire_interactive("demo").await.unwrap();
    assert_eq!(lease.provider, "demo");

    let became_suspended = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Suspended))
            }
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(became_suspended, "preempted task should transition to suspended within the cooperative window");

    let checkpoints = task_store.checkpoints(&task.id).await.unwrap();
    assert!(checkpoints.iter().any(|c| c.summary.contains("preempted")));

    pool.release(lease).await;

    let resumed_and_completed = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Completed))
            }
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(resumed_and_completed, "releasing the interactive lease should let the scheduler resume and finish the task");
}

// ---------------------------------------------------------------------
// Scenario 3: dependency chain
// ---------------------------------------------------------------------

#[tokio::test]
async fn dependent_task_waits_for_its_dependency_to_complete() {
    let bus = RingBus::with_defaults() as Arc<dyn EventBus>;
    let task_store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());

    let provider_a = ScriptedProvider::new(vec![text_response("A is done")]);
    let provider_b = ScriptedProvider::new(vec![text_response("B is done")]);

    // One provider instance per task id would complicate resolving "which
    // script responds to which task" since the runner resolves providers
    // by name, not by task; instead give each task its own provider name
    // bound to its own actor, both under the same runner.
    let runner = TaskRunner::new(
        PersonaLayer::default(),
        task_store.clone(),
        bus.clone(),
        Arc::new(ToolRegistry::new()),
        Arc::new(HookRegistry::new()),
        fulcrum::fulcrum_agent::Compressor::new(0.8),
    )
    .with_provider("provider-a", provider_a as Arc<dyn fulcrum_agent::provider::ProviderDyn>)
    .with_provider("provider-b", provider_b as Arc<dyn fulcrum_agent::provider::ProviderDyn>);

    let mut config = CoreConfig::default();
    config.providers.insert("provider-a".to_string(), ProviderConfig { max_concurrent: 1, tags: Vec::new() });
    config.providers.insert("provider-b".to_string(), ProviderConfig { max_concurrent: 1, tags: Vec::new() });
    config.scheduler_tick_secs = 1;

    let pool = LocalActorPool::new(task_store.clone(), Arc::new(runner), bus.clone(), &config);
    pool.spawn_scheduler();

    let task_a = Task::new(TaskId::new("dep-a"), "step A", "first step");
    let mut task_b = Task::new(TaskId::new("dep-b"), "step B", "depends on A");
    task_b.depends_on = vec![task_a.id.clone()];

    // Submit B first: it must stay pending regardless of submission order,
    // since gating is by dependency status, not queue position.
    pool.submit(task_b.clone()).await.unwrap();
    pool.submit(task_a.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let b_before = task_store.get(&task_b.id).await.unwrap().unwrap();
    assert_eq!(b_before.status, TaskStatus::Pending, "B must not start before A completes");

    let a_completed = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task_a.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Completed))
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(a_completed);

    let b_completed = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task_b.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Completed))
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(b_completed, "B should run once A is completed");
}

// ---------------------------------------------------------------------
// Scenario 4: supervised validation
// ---------------------------------------------------------------------

#[tokio::test]
async fn supervised_task_suspends_for_validation_then_resumes_and_completes() {
    let bus = RingBus::with_defaults() as Arc<dyn EventBus>;
    let task_store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
    let session_store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());

    let provider = ScriptedProvider::new(vec![
        // Exploration turn.
        text_and_tool_use("let me check something first", "call-1", "peek", json!({})),
        // Validation turn: call the side-channel tool with the plan text.
        tool_use_response(
            "call-2",
            fulcrum::fulcrum_runner::react::REQUEST_VALIDATION_TOOL,
            json!({"content": "1. Do the thing\n2. Report back"}),
        ),
        // Plan-execute turn, reached only after the response re-queues it.
        text_response("1. Do the thing\n2. Report back"),
    ]);

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(PeekTool));

    let runner = TaskRunner::new(
        PersonaLayer::default(),
        task_store.clone(),
        bus.clone(),
        Arc::new(tools),
        Arc::new(HookRegistry::new()),
        fulcrum::fulcrum_agent::Compressor::new(0.8),
    )
    .with_provider("demo", provider as Arc<dyn fulcrum_agent::provider::ProviderDyn>);

    let config = single_provider_config(1);
    let pool = LocalActorPool::new(task_store.clone(), Arc::new(runner), bus.clone(), &config);
    pool.spawn_scheduler();

    let mut task = Task::new(TaskId::new("sup-1"), "draft then ask", "draft a plan and get it approved");
    task.config = TaskConfig { autonomy_level: AutonomyLevel::Supervised, ..Default::default() };
    pool.submit(task.clone()).await.unwrap();

    let suspended = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                task_store
                    .get(&id)
                    .await
                    .unwrap()
                    .map(|t| t.status == TaskStatus::Suspended && t.waiting_for_reply)
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(suspended, "supervised task should self-suspend pending validation");

    let mailbox = task_store.mailbox(&task.id).await.unwrap();
    let request = mailbox
        .iter()
        .find(|m| m.kind == MailboxKind::Request)
        .expect("a request mailbox entry should exist");
    let token = request.token.clone().expect("request should carry a token");

    let kit = Kit::new(bus.clone(), session_store, task_store.clone(), pool.clone());

    let mut subscriber = bus.subscribe();
    kit.submit_validation_response(&task.id, token, true).await.unwrap();

    let response_event = tokio::time::timeout(Duration::from_secs(1), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    match response_event.payload {
        EventPayload::ValidationResponse { status, .. } => assert_eq!(status, ValidationStatus::Approved),
        other => panic!("expected a validation.response event, got {:?}", other.event_type()),
    }

    let mailbox_after = task_store.mailbox(&task.id).await.unwrap();
    assert!(mailbox_after.iter().any(|m| m.kind == MailboxKind::Response));

    let completed = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Completed))
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(completed, "approving the validation should let the task run to completion");
}

// ---------------------------------------------------------------------
// Scenario 5: crash recovery
// ---------------------------------------------------------------------

/// Stands in for a worker that was still mid-flight when the process died:
/// it parks forever rather than returning, so the task it's driving stays
/// `running` in the store until this test aborts its scheduling task.
struct HangExecutor;

#[async_trait::async_trait]
impl TaskExecutor for HangExecutor {
    async fn run(&self, _task: Task, _provider: &str, _preempt: PreemptHandle) -> Result<TaskOutcome, RunnerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("HangExecutor never returns within a test's lifetime")
    }
}

struct ImmediateCompleteExecutor;

#[async_trait::async_trait]
impl TaskExecutor for ImmediateCompleteExecutor {
    async fn run(&self, _task: Task, _provider: &str, _preempt: PreemptHandle) -> Result<TaskOutcome, RunnerError> {
        Ok(TaskOutcome::Completed)
    }
}

#[tokio::test]
async fn crash_recovery_requeues_running_tasks_and_the_scheduler_finishes_them() {
    let task_store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());
    let bus_before = RingBus::with_defaults() as Arc<dyn EventBus>;

    let mut config = CoreConfig::default();
    config.providers.insert("demo".to_string(), ProviderConfig { max_concurrent: 2, tags: Vec::new() });
    config.scheduler_tick_secs = 1;

    let pool_before = LocalActorPool::new(task_store.clone(), Arc::new(HangExecutor), bus_before, &config);
    let scheduler_before = pool_before.spawn_scheduler();

    let task_1 = Task::new(TaskId::new("crash-1"), "first", "first task");
    let task_2 = Task::new(TaskId::new("crash-2"), "second", "second task");
    pool_before.submit(task_1.clone()).await.unwrap();
    pool_before.submit(task_2.clone()).await.unwrap();

    let both_running = poll_until(
        || {
            let task_store = task_store.clone();
            let ids = [task_1.id.clone(), task_2.id.clone()];
            async move {
                for id in &ids {
                    if !matches!(task_store.get(id).await.unwrap().map(|t| t.status), Some(TaskStatus::Running)) {
                        return false;
                    }
                }
                true
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(both_running, "both tasks should be running before the simulated crash");

    // Simulate killing the process: stop this pool's scheduler. Its two
    // worker futures are left parked on `HangExecutor`'s eternal sleep —
    // harmless for the rest of the test, since a real restart would drop
    // them along with the whole process; only the task store's state
    // (what a durable store would have persisted) carries over.
    scheduler_before.abort();

    let recovered = crash_recover(task_store.as_ref()).await.unwrap();
    assert_eq!(recovered, 2);

    for id in [&task_1.id, &task_2.id] {
        let task = task_store.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        let checkpoints = task_store.checkpoints(id).await.unwrap();
        assert!(checkpoints.iter().any(|c| c.kind == CheckpointKind::Recovery));
    }

    let bus_after = RingBus::with_defaults() as Arc<dyn EventBus>;
    let pool_after = LocalActorPool::new(task_store.clone(), Arc::new(ImmediateCompleteExecutor), bus_after, &config);
    pool_after.spawn_scheduler();

    let both_completed = poll_until(
        || {
            let task_store = task_store.clone();
            let ids = [task_1.id.clone(), task_2.id.clone()];
            async move {
                for id in &ids {
                    if !matches!(task_store.get(id).await.unwrap().map(|t| t.status), Some(TaskStatus::Completed)) {
                        return false;
                    }
                }
                true
            }
        },
        Duration::from_secs(4),
    )
    .await;
    assert!(both_completed, "the restarted pool should drive both recovered tasks to completion");
}

// ---------------------------------------------------------------------
// Scenario 6: tool retry
// ---------------------------------------------------------------------

#[tokio::test]
async fn tool_recovers_from_transient_failures_and_the_task_completes() {
    let bus = RingBus::with_defaults() as Arc<dyn EventBus>;
    let task_store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());

    let provider = ScriptedProvider::new(vec![
        tool_use_response("call-1", "flaky", json!({})),
        tool_use_response("call-2", "flaky", json!({})),
        tool_use_response("call-3", "flaky", json!({})),
        text_response("done after two retries"),
    ]);
    let mut tools = ToolRegistry::new();
    let flaky = FlakyTool::failing_n_times(2);
    tools.register(flaky.clone() as Arc<dyn fulcrum_agent::ToolDyn>);

    let runner = TaskRunner::new(
        PersonaLayer::default(),
        task_store.clone(),
        bus.clone(),
        Arc::new(tools),
        Arc::new(HookRegistry::new()),
        fulcrum::fulcrum_agent::Compressor::new(0.8),
    )
    .with_provider("demo", provider as Arc<dyn fulcrum_agent::provider::ProviderDyn>);

    let config = single_provider_config(1);
    let pool = LocalActorPool::new(task_store.clone(), Arc::new(runner), bus, &config);
    pool.spawn_scheduler();

    let task = Task::new(TaskId::new("retry-ok"), "flaky call", "call a flaky tool until it works");
    pool.submit(task.clone()).await.unwrap();

    let completed = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Completed))
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(completed, "the task should complete once the flaky tool succeeds on its third call");
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn tool_failing_past_the_retry_budget_fails_the_task() {
    let bus = RingBus::with_defaults() as Arc<dyn EventBus>;
    let task_store: Arc<dyn TaskStore> = Arc::new(MemoryStore::new());

    // tool_max_retries defaults to 3, so the 4th consecutive failure (one
    // per model turn) exceeds the recovery budget and propagates.
    let provider = ScriptedProvider::new(vec![
        tool_use_response("call-1", "flaky", json!({})),
        tool_use_response("call-2", "flaky", json!({})),
        tool_use_response("call-3", "flaky", json!({})),
        tool_use_response("call-4", "flaky", json!({})),
    ]);
    let mut tools = ToolRegistry::new();
    let flaky = FlakyTool::always_failing();
    tools.register(flaky.clone() as Arc<dyn fulcrum_agent::ToolDyn>);

    let runner = TaskRunner::new(
        PersonaLayer::default(),
        task_store.clone(),
        bus.clone(),
        Arc::new(tools),
        Arc::new(HookRegistry::new()),
        fulcrum::fulcrum_agent::Compressor::new(0.8),
    )
    .with_provider("demo", provider as Arc<dyn fulcrum_agent::provider::ProviderDyn>);

    let config = single_provider_config(1);
    let pool = LocalActorPool::new(task_store.clone(), Arc::new(runner), bus, &config);
    pool.spawn_scheduler();

    let mut task = Task::new(TaskId::new("retry-fail"), "always flaky call", "call a tool that never succeeds");
    // One pool-level retry budget so a single `ReactOutcome::Failed` goes
    // straight to `failed` instead of requeuing the whole task and
    // re-running the flaky tool from a fresh recovery window.
    task.max_retries = 1;
    pool.submit(task.clone()).await.unwrap();

    let failed = poll_until(
        || {
            let task_store = task_store.clone();
            let id = task.id.clone();
            async move {
                matches!(task_store.get(&id).await.unwrap().map(|t| t.status), Some(TaskStatus::Failed))
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(failed, "exhausting the recovery budget should fail the task");
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
}
