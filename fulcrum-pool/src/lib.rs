#![deny(missing_docs)]
//! In-process implementation of [`fulcrum_core::ActorPool`] (spec §4.6
//! "Actor Pool"): a capacity-aware scheduler with priority-ordered
//! preemption and dependency gating over a fixed set of provider-bound
//! actors.
//!
//! Grounded on `neuron-orch-local`'s `HashMap`-keyed registration plus
//! `tokio::spawn` dispatch shape; that orchestrator has no notion of
//! capacity, priority, or preemption at all, so the scheduling loop,
//! dependency gating, and the interactive-acquisition preemption dance
//! below are original to this crate, built directly against spec §4.6's
//! algorithm description and the [`fulcrum_core::actor::ActorPool`]
//! contract.
//!
//! [`LocalActorPool`] never publishes `task.progress` events — the spec's
//! dataflow text implies step-level granularity, but that signal only
//! exists inside `fulcrum-runner`'s plan-step loop, which has no bus
//! handle (see DESIGN.md). Every other `task.*` lifecycle event is
//! published here, by the scheduler, rather than by the executor it
//! drives.

use async_trait::async_trait;
use fulcrum_core::event::TaskLifecyclePhase;
use fulcrum_core::{
    Actor, ActorId, ActorLease, ActorPool, ActorStatus, Checkpoint, CheckpointKind, CoreConfig,
    Event, EventBus, EventPayload, PoolError, PreemptHandle, RunnerError, Source, Task,
    TaskExecutor, TaskId, TaskOutcome, TaskResult, TaskStatus, TaskStore, Timestamp,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::warn;

struct PoolInner {
    task_store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    bus: Arc<dyn EventBus>,
    actors: Mutex<Vec<Actor>>,
    preempt_txs: Mutex<HashMap<TaskId, watch::Sender<bool>>>,
    running: Mutex<HashMap<TaskId, AbortHandle>>,
    notify: Notify,
    watchdog_secs: u64,
    cooperative_wait_secs: u64,
    tick_secs: u64,
}

/// A capacity-aware scheduler over a fixed set of provider-bound actors
/// (spec §4.6).
///
/// Construct one per process, call [`LocalActorPool::spawn_scheduler`] once
/// to start its background tick loop, then hand clones of the `Arc`-backed
/// pool to whatever needs to submit tasks or acquire interactive capacity.
#[derive(Clone)]
pub struct LocalActorPool(Arc<PoolInner>);

impl LocalActorPool {
    /// Build a pool with one idle actor per unit of `max_concurrent` for
    /// each configured provider, named deterministically `"<provider>-<i>"`
    /// (spec §4.6 "Static configuration").
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
        bus: Arc<dyn EventBus>,
        config: &CoreConfig,
    ) -> Self {
        let mut providers: Vec<_> = config.providers.iter().collect();
        providers.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut actors = Vec::new();
        for (name, provider_config) in providers {
            for i in 0..provider_config.max_concurrent {
                actors.push(Actor::new(
                    ActorId::new(format!("{name}-{i}")),
                    name.clone(),
                    provider_config.tags.clone(),
                ));
            }
        }

        Self(Arc::new(PoolInner {
            task_store,
            executor,
            bus,
            actors: Mutex::new(actors),
            preempt_txs: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            watchdog_secs: config.preemption_watchdog_secs,
            cooperative_wait_secs: config.preemption_cooperative_wait_secs,
            tick_secs: config.scheduler_tick_secs,
        }))
    }

    /// Start the background scheduling loop. Wakes on every `submit`/
    /// `resume`/`release` and on a `scheduler_tick_secs` timer, whichever
    /// comes first (spec §4.6 "Scheduling loop").
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.0);
        tokio::spawn(run_scheduler(inner))
    }

    /// `(busy actors, total actors)` summed across all providers, for the
    /// heartbeat daemon (Supplement B). Not part of the `ActorPool` trait:
    /// nothing else in the workspace needs a capacity snapshot, and adding
    /// it there would widen a contract every other implementation must also
    /// satisfy for the sake of one subscriber.
    pub async fn actor_counts(&self) -> (u32, u32) {
        let actors = self.0.actors.lock().await;
        let busy = actors.iter().filter(|a| a.status == ActorStatus::Busy).count() as u32;
        (busy, actors.len() as u32)
    }
}

async fn run_scheduler(inner: Arc<PoolInner>) {
    let tick = Duration::from_secs(inner.tick_secs.max(1));
    loop {
        tokio::select! {
            _ = inner.notify.notified() => {}
            _ = tokio::time::sleep(tick) => {}
        }
        if let Err(err) = scheduling_pass(&inner).await {
            warn!(error = %err, "scheduling pass failed");
        }
    }
}

/// One pass of spec §4.6's two-step scheduling algorithm: first re-launch
/// suspended tasks that are no longer waiting on a reply, then assign
/// dependency-resolved pending tasks to idle actors, both in `updated_at`
/// order so long-waiting tasks are served first.
async fn scheduling_pass(inner: &Arc<PoolInner>) -> Result<(), PoolError> {
    let tasks = inner.task_store.list().await?;
    let status_of: HashMap<TaskId, TaskStatus> =
        tasks.iter().map(|t| (t.id.clone(), t.status)).collect();

    let mut resumable: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Suspended && !t.waiting_for_reply)
        .collect();
    resumable.sort_by_key(|t| t.updated_at);
    for task in resumable {
        if let Some((actor_id, provider)) =
            claim_idle_actor(inner, &task.config.tag_requirements, &task.id).await
        {
            launch(Arc::clone(inner), task.clone(), actor_id, provider).await;
        }
    }

    let mut runnable: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .collect();
    runnable.sort_by_key(|t| t.updated_at);
    for task in runnable {
        if !task.dependencies_resolved(|dep| status_of.get(dep).copied()) {
            continue;
        }
        match claim_idle_actor(inner, &task.config.tag_requirements, &task.id).await {
            Some((actor_id, provider)) => {
                launch(Arc::clone(inner), task.clone(), actor_id, provider).await;
            }
            None => continue,
        }
    }

    Ok(())
}

async fn claim_idle_actor(
    inner: &Arc<PoolInner>,
    tags: &[String],
    task_id: &TaskId,
) -> Option<(ActorId, String)> {
    let mut actors = inner.actors.lock().await;
    let actor = actors
        .iter_mut()
        .find(|a| a.status == ActorStatus::Idle && a.satisfies_tags(tags))?;
    actor.status = ActorStatus::Busy;
    actor.current_task = Some(task_id.clone());
    Some((actor.id.clone(), actor.provider.clone()))
}

async fn release_actor(inner: &Arc<PoolInner>, actor_id: &ActorId) {
    let mut actors = inner.actors.lock().await;
    if let Some(actor) = actors.iter_mut().find(|a| &a.id == actor_id) {
        actor.status = ActorStatus::Idle;
        actor.current_task = None;
    }
}

async fn launch(inner: Arc<PoolInner>, mut task: Task, actor_id: ActorId, provider: String) {
    let (tx, rx) = watch::channel(false);

    task.status = TaskStatus::Running;
    task.started_at.get_or_insert_with(Timestamp::now);
    task.updated_at = Timestamp::now();
    if let Err(err) = inner.task_store.update(&task).await {
        warn!(task = %task.id, error = %err, "failed to mark task running, returning actor to idle");
        release_actor(&inner, &actor_id).await;
        return;
    }

    inner.preempt_txs.lock().await.insert(task.id.clone(), tx);
    inner.bus.publish(
        Event::new(
            Source::Scheduler,
            EventPayload::TaskLifecycle {
                phase: TaskLifecyclePhase::Started,
                detail: None,
            },
        )
        .with_task(task.id.clone()),
    );

    let task_id = task.id.clone();
    let preempt = PreemptHandle::new(rx);
    let worker_inner = Arc::clone(&inner);
    let join = tokio::spawn(worker_body(worker_inner, task, actor_id, provider, preempt));
    inner.running.lock().await.insert(task_id, join.abort_handle());
}

async fn worker_body(
    inner: Arc<PoolInner>,
    task: Task,
    actor_id: ActorId,
    provider: String,
    preempt: PreemptHandle,
) {
    let task_id = task.id.clone();
    let result = inner.executor.run(task, &provider, preempt).await;

    // Removing the abort handle here, before touching the store, closes the
    // race window against `hard_cancel_if_still_running`: whichever side
    // observes the handle first owns recording the outcome. A watchdog that
    // fires in the narrow gap between this line and `finish_task`'s status
    // write can still double-write a terminal task's status to `suspended`;
    // `finish_task` below always re-reads and overwrites with the true
    // outcome, so the self-correction is eventually consistent, not atomic
    // (spec §9: preemption is not a hard contract).
    inner.running.lock().await.remove(&task_id);
    inner.preempt_txs.lock().await.remove(&task_id);

    finish_task(&inner, &task_id, result).await;
    release_actor(&inner, &actor_id).await;
    inner.notify.notify_one();
}

async fn finish_task(
    inner: &Arc<PoolInner>,
    task_id: &TaskId,
    result: Result<TaskOutcome, RunnerError>,
) {
    let (outcome, error) = match result {
        Ok(outcome) => (Some(outcome), None),
        Err(err) => (None, Some(err.to_string())),
    };

    let task = match inner.task_store.get(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task = %task_id, "task vanished before its outcome could be recorded");
            return;
        }
        Err(err) => {
            warn!(task = %task_id, error = %err, "failed to refetch task after execution");
            return;
        }
    };

    if task.status == TaskStatus::Cancelled {
        return;
    }

    match (outcome, error) {
        (Some(TaskOutcome::Completed), _) => {
            mark_terminal(inner, task, TaskStatus::Completed, None).await
        }
        (Some(TaskOutcome::Cancelled), _) => {
            mark_terminal(inner, task, TaskStatus::Cancelled, None).await
        }
        (Some(TaskOutcome::Failed), _) => {
            handle_failure(inner, task, "task executor reported failure".to_string()).await
        }
        (Some(TaskOutcome::Suspended), _) => suspend(inner, task).await,
        (Some(TaskOutcome::ModelUnavailable), _) => reset_to_pending(inner, task).await,
        (None, Some(message)) => handle_failure(inner, task, message).await,
        (None, None) => unreachable!("finish_task always carries an outcome or an error"),
    }
}

async fn mark_terminal(
    inner: &Arc<PoolInner>,
    mut task: Task,
    status: TaskStatus,
    error: Option<String>,
) {
    task.status = status;
    task.completed_at = Some(Timestamp::now());
    task.updated_at = Timestamp::now();
    if let Some(message) = &error {
        let output_path = task.result.as_ref().and_then(|r| r.output_path.clone());
        task.result = Some(TaskResult {
            output_path,
            error: Some(message.clone()),
        });
    }

    let task_id = task.id.clone();
    if let Err(err) = inner.task_store.update(&task).await {
        warn!(task = %task_id, error = %err, "failed to persist terminal task state");
        return;
    }

    let phase = match status {
        TaskStatus::Completed => TaskLifecyclePhase::Completed,
        TaskStatus::Failed => TaskLifecyclePhase::Failed,
        TaskStatus::Cancelled => TaskLifecyclePhase::Cancelled,
        _ => unreachable!("mark_terminal is only called with a terminal status"),
    };
    inner.bus.publish(
        Event::new(Source::Scheduler, EventPayload::TaskLifecycle { phase, detail: error })
            .with_task(task_id),
    );
}

async fn suspend(inner: &Arc<PoolInner>, mut task: Task) {
    task.status = TaskStatus::Suspended;
    task.suspended_at = Some(Timestamp::now());
    task.suspend_count += 1;
    task.updated_at = Timestamp::now();

    let task_id = task.id.clone();
    if let Err(err) = inner.task_store.update(&task).await {
        warn!(task = %task_id, error = %err, "failed to persist suspended task");
        return;
    }

    // The executor already appended a `Suspended` checkpoint with the
    // actual reason (preemption vs. a validation request) before handing
    // this outcome back; carry that same text onto the bus event instead
    // of publishing an empty one.
    let detail = match inner.task_store.checkpoints(&task_id).await {
        Ok(checkpoints) => checkpoints
            .iter()
            .rev()
            .find(|c| c.kind == CheckpointKind::Suspended)
            .map(|c| c.summary.clone()),
        Err(err) => {
            warn!(task = %task_id, error = %err, "failed to read checkpoints for suspended task");
            None
        }
    };

    inner.bus.publish(
        Event::new(
            Source::Scheduler,
            EventPayload::TaskLifecycle {
                phase: TaskLifecyclePhase::Suspended,
                detail,
            },
        )
        .with_task(task_id),
    );
}

async fn reset_to_pending(inner: &Arc<PoolInner>, mut task: Task) {
    task.status = TaskStatus::Pending;
    task.updated_at = Timestamp::now();
    let task_id = task.id.clone();
    if let Err(err) = inner.task_store.update(&task).await {
        warn!(task = %task_id, error = %err, "failed to reset model-unavailable task to pending");
    }
}

/// Retry-count gated failure handling (spec §4.6, §7): requeue silently
/// while under budget, otherwise terminal `failed`.
async fn handle_failure(inner: &Arc<PoolInner>, mut task: Task, message: String) {
    task.retry_count += 1;
    if task.retry_count >= task.max_retries {
        mark_terminal(inner, task, TaskStatus::Failed, Some(message)).await;
        return;
    }

    if let Err(err) = inner
        .task_store
        .append_checkpoint(
            &task.id,
            Checkpoint::new(CheckpointKind::Note, format!("retrying after failure: {message}")),
        )
        .await
    {
        warn!(task = %task.id, error = %err, "failed to append retry checkpoint");
    }

    task.status = TaskStatus::Pending;
    task.updated_at = Timestamp::now();
    let task_id = task.id.clone();
    if let Err(err) = inner.task_store.update(&task).await {
        warn!(task = %task_id, error = %err, "failed to requeue task after failure");
    }
}

async fn hard_cancel_if_still_running(inner: Arc<PoolInner>, task_id: TaskId, actor_id: ActorId) {
    let handle = inner.running.lock().await.remove(&task_id);
    let Some(handle) = handle else {
        // The worker already finished cooperatively; nothing to force.
        return;
    };
    handle.abort();
    inner.preempt_txs.lock().await.remove(&task_id);

    if let Ok(Some(mut task)) = inner.task_store.get(&task_id).await {
        if !task.is_terminal() {
            task.status = TaskStatus::Suspended;
            task.suspended_at = Some(Timestamp::now());
            task.suspend_count += 1;
            task.updated_at = Timestamp::now();
            let _ = inner.task_store.update(&task).await;
            let _ = inner
                .task_store
                .append_checkpoint(
                    &task_id,
                    Checkpoint::new(CheckpointKind::Suspended, "preemption watchdog expired"),
                )
                .await;
            inner.bus.publish(
                Event::new(
                    Source::Scheduler,
                    EventPayload::TaskLifecycle {
                        phase: TaskLifecyclePhase::Suspended,
                        detail: Some("preemption watchdog expired".to_string()),
                    },
                )
                .with_task(task_id),
            );
        }
    }

    release_actor(&inner, &actor_id).await;
    inner.notify.notify_one();
}

async fn acquire_interactive(inner: Arc<PoolInner>, provider: &str) -> Result<ActorLease, PoolError> {
    {
        let mut actors = inner.actors.lock().await;
        if !actors.iter().any(|a| a.provider == provider) {
            return Err(PoolError::UnknownProvider(provider.to_string()));
        }
        if let Some(actor) = actors
            .iter_mut()
            .find(|a| a.provider == provider && a.status == ActorStatus::Idle)
        {
            actor.status = ActorStatus::Busy;
            return Ok(ActorLease {
                actor_id: actor.id.clone(),
                provider: provider.to_string(),
            });
        }
    }

    // No idle actor on this provider: preempt the lowest-priority running
    // background task bound to it (spec §4.6 "Interactive acquisition").
    let tasks = inner.task_store.list().await?;
    let victim = {
        let actors = inner.actors.lock().await;
        actors
            .iter()
            .filter(|a| a.provider == provider && a.status == ActorStatus::Busy)
            .filter_map(|a| a.current_task.as_ref().map(|t| (a.id.clone(), t.clone())))
            .filter_map(|(actor_id, task_id)| {
                tasks
                    .iter()
                    .find(|t| t.id == task_id)
                    .map(|t| (actor_id, task_id, t.priority))
            })
            .min_by_key(|(_, _, priority)| *priority)
    };
    let Some((actor_id, victim_task_id, _)) = victim else {
        return Err(PoolError::NoCapacity(provider.to_string()));
    };

    if let Some(tx) = inner.preempt_txs.lock().await.get(&victim_task_id) {
        let _ = tx.send(true);
    }

    let watchdog_inner = Arc::clone(&inner);
    let watchdog_task_id = victim_task_id.clone();
    let watchdog_actor_id = actor_id.clone();
    let watchdog_secs = inner.watchdog_secs;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(watchdog_secs)).await;
        hard_cancel_if_still_running(watchdog_inner, watchdog_task_id, watchdog_actor_id).await;
    });

    // Poll for the actor to go idle — either the victim cooperated and
    // `worker_body` released it, or a prior watchdog beat us to it.
    let poll_interval = Duration::from_millis(50);
    let deadline = Duration::from_secs(inner.cooperative_wait_secs);
    let mut waited = Duration::ZERO;
    while waited < deadline {
        tokio::time::sleep(poll_interval).await;
        waited += poll_interval;
        let mut actors = inner.actors.lock().await;
        if let Some(actor) = actors
            .iter_mut()
            .find(|a| a.id == actor_id && a.status == ActorStatus::Idle)
        {
            actor.status = ActorStatus::Busy;
            return Ok(ActorLease {
                actor_id,
                provider: provider.to_string(),
            });
        }
    }

    // Cooperative wait expired without the actor going idle. Preemption is
    // not a hard contract (spec §9): claim it anyway, racing whatever the
    // background task is still doing with it.
    let mut actors = inner.actors.lock().await;
    if let Some(actor) = actors.iter_mut().find(|a| a.id == actor_id) {
        actor.status = ActorStatus::Busy;
        actor.current_task = None;
    }
    Ok(ActorLease {
        actor_id,
        provider: provider.to_string(),
    })
}

#[async_trait]
impl ActorPool for LocalActorPool {
    async fn submit(&self, task: Task) -> Result<(), PoolError> {
        let task_id = task.id.clone();
        self.0.task_store.create(task).await?;
        self.0.bus.publish(
            Event::new(
                Source::Scheduler,
                EventPayload::TaskLifecycle {
                    phase: TaskLifecyclePhase::Created,
                    detail: None,
                },
            )
            .with_task(task_id),
        );
        self.0.notify.notify_one();
        Ok(())
    }

    async fn cancel(&self, task_id: &TaskId, reason: &str) -> Result<(), PoolError> {
        let all = self.0.task_store.list().await?;
        let mut children_of: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for t in &all {
            if let Some(parent) = &t.parent_task_id {
                children_of.entry(parent.clone()).or_default().push(t.id.clone());
            }
        }
        if !all.iter().any(|t| &t.id == task_id) {
            return Err(PoolError::UnknownTask(task_id.to_string()));
        }

        let mut stack = vec![task_id.clone()];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(children) = children_of.get(&id) {
                stack.extend(children.iter().cloned());
            }

            let Some(mut task) = self.0.task_store.get(&id).await? else {
                continue;
            };
            if task.is_terminal() {
                continue;
            }

            if let Some(tx) = self.0.preempt_txs.lock().await.get(&id) {
                let _ = tx.send(true);
            }

            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(Timestamp::now());
            task.updated_at = Timestamp::now();
            self.0.task_store.update(&task).await?;
            self.0
                .task_store
                .append_checkpoint(&id, Checkpoint::new(CheckpointKind::Cancelled, reason))
                .await?;
            self.0.bus.publish(
                Event::new(
                    Source::Scheduler,
                    EventPayload::TaskLifecycle {
                        phase: TaskLifecyclePhase::Cancelled,
                        detail: Some(reason.to_string()),
                    },
                )
                .with_task(id),
            );
        }
        Ok(())
    }

    async fn resume(&self, task_id: &TaskId) -> Result<(), PoolError> {
        let mut task = self
            .0
            .task_store
            .get(task_id)
            .await?
            .ok_or_else(|| PoolError::UnknownTask(task_id.to_string()))?;
        if !task.waiting_for_reply {
            return Ok(());
        }

        task.waiting_for_reply = false;
        task.updated_at = Timestamp::now();
        self.0.task_store.update(&task).await?;
        self.0.bus.publish(
            Event::new(
                Source::Scheduler,
                EventPayload::TaskLifecycle {
                    phase: TaskLifecyclePhase::Resumed,
                    detail: None,
                },
            )
            .with_task(task_id.clone()),
        );
        self.0.notify.notify_one();
        Ok(())
    }

    async fn acquire_interactive(&self, provider: &str) -> Result<ActorLease, PoolError> {
        acquire_interactive(Arc::clone(&self.0), provider).await
    }

    async fn release(&self, lease: ActorLease) {
        release_actor(&self.0, &lease.actor_id).await;
        self.0.notify.notify_one();
    }
}
