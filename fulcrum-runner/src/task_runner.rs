//! The Task Runner (spec §4.4/§4.5): drives one [`Task`] across its five
//! execution modes to a terminal outcome or a cooperative suspension.
//!
//! Grounded on `neuron-orch-kit/src/kit.rs`'s fluent `with_*` wiring style
//! for [`TaskRunner`]'s constructor, and on `neuron-op-react`/
//! `neuron-op-single-shot` for the two model-driven modes, both now routed
//! through [`crate::react::run_react_loop`].
//!
//! Division of responsibility with the (not yet built) Actor Pool, per
//! `TaskOutcome`'s own doc comment in `fulcrum-core`: this runner writes
//! output blobs, checkpoints, and — for `Suspended` — the mailbox entries
//! and `waiting_for_reply`/`plan` fields directly. It never flips a task to
//! `Completed` or `Failed` itself, nor increments `retry_count`; those
//! terminal decisions belong to the pool, which is the only component that
//! knows about retry budgets across the task's whole lifetime.

use crate::instructions::{self, DependencyOutput, PersonaLayer};
use crate::plan_parser;
use crate::react::{run_react_loop, ReactLoopInputs, ReactOutcome};
use async_trait::async_trait;
use fulcrum_agent::provider::ProviderDyn;
use fulcrum_agent::{Compressor, ProviderMessage, Role as WireRole, RecoveryMiddleware, ToolRegistry};
use fulcrum_core::{
    AutonomyLevel, Checkpoint, CheckpointKind, EventBus, MailboxKind, MailboxMessage, PreemptHandle,
    Task, TaskExecutor, TaskOutcome, TaskStatus, TaskStore, Timestamp,
};
use fulcrum_hooks::HookRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// A skill implementation runnable without any LLM invocation at all (spec
/// §4.4 "Skill shortcut"). Registered by name and selected via
/// `task.config.skill`.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    /// Run the skill against `task`, returning the text to write as the
    /// task's output.
    async fn execute(&self, task: &Task) -> Result<String, String>;
}

/// Drives tasks across the five execution modes (spec §4.4's table):
/// Skill shortcut, Single step, Plan steps, Supervised coordinator,
/// Autonomous coordinator.
pub struct TaskRunner {
    persona: PersonaLayer,
    task_store: Arc<dyn TaskStore>,
    bus: Arc<dyn EventBus>,
    tools: Arc<ToolRegistry>,
    providers: HashMap<String, Arc<dyn ProviderDyn>>,
    skills: HashMap<String, Arc<dyn SkillExecutor>>,
    hooks: Arc<HookRegistry>,
    compressor: Compressor,
    tool_max_retries: u32,
    max_turns_per_step: u32,
    max_tokens: u32,
}

impl TaskRunner {
    /// Construct a runner with no providers or skills registered yet; use
    /// [`Self::with_provider`] and [`Self::with_skill`] to populate them.
    pub fn new(
        persona: PersonaLayer,
        task_store: Arc<dyn TaskStore>,
        bus: Arc<dyn EventBus>,
        tools: Arc<ToolRegistry>,
        hooks: Arc<HookRegistry>,
        compressor: Compressor,
    ) -> Self {
        Self {
            persona,
            task_store,
            bus,
            tools,
            providers: HashMap::new(),
            skills: HashMap::new(),
            hooks,
            compressor,
            tool_max_retries: 3,
            max_turns_per_step: 25,
            max_tokens: 4096,
        }
    }

    /// Register a provider under `name` (spec §4.4 "Inputs": "the provider
    /// chosen by the scheduler", resolved here by name at `run` time).
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn ProviderDyn>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Register a skill under `name` for the Skill shortcut mode.
    pub fn with_skill(mut self, name: impl Into<String>, skill: Arc<dyn SkillExecutor>) -> Self {
        self.skills.insert(name.into(), skill);
        self
    }

    /// Override the per-turn tool retry budget (spec default 3).
    pub fn with_tool_max_retries(mut self, max_retries: u32) -> Self {
        self.tool_max_retries = max_retries;
        self
    }

    /// Override the per-invocation model-turn cap.
    pub fn with_max_turns_per_step(mut self, max_turns: u32) -> Self {
        self.max_turns_per_step = max_turns;
        self
    }

    async fn dependency_outputs(&self, task: &Task) -> Result<Vec<(String, TaskStatus, Option<String>)>, fulcrum_core::RunnerError> {
        let mut out = Vec::with_capacity(task.depends_on.len());
        for dep_id in &task.depends_on {
            let dep = self.task_store.get(dep_id).await?;
            if let Some(dep) = dep {
                let output = self.task_store.read_output(&dep.id).await?;
                out.push((dep.title, dep.status, output));
            }
        }
        Ok(out)
    }

    async fn assemble_instructions(&self, task: &Task) -> Result<String, fulcrum_core::RunnerError> {
        let deps = self.dependency_outputs(task).await?;
        let dep_refs: Vec<DependencyOutput<'_>> = deps
            .iter()
            .map(|(title, status, output)| DependencyOutput {
                title,
                status: *status,
                output: output.as_deref(),
            })
            .collect();
        let mailbox = self.task_store.mailbox(&task.id).await?;
        Ok(instructions::assemble(&self.persona, task, &dep_refs, &mailbox))
    }

    fn resolve_provider(&self, name: &str) -> Result<&Arc<dyn ProviderDyn>, fulcrum_core::RunnerError> {
        self.providers
            .get(name)
            .ok_or_else(|| fulcrum_core::RunnerError::Other(format!("unknown provider: {name}").into()))
    }

    async fn run_one_invocation(
        &self,
        task: &Task,
        system: String,
        allow_validation: bool,
        provider: &dyn ProviderDyn,
        preempt: &PreemptHandle,
    ) -> ReactOutcome {
        let recovery = RecoveryMiddleware::new(self.tool_max_retries);
        let messages = vec![ProviderMessage::text(
            WireRole::User,
            "Begin working on the task described in your instructions.".to_string(),
        )];

        run_react_loop(ReactLoopInputs {
            system,
            messages,
            tools: &self.tools,
            allowed_tool_names: &task.config.tool_whitelist,
            allow_validation,
            provider,
            recovery: &recovery,
            hooks: &self.hooks,
            preempt,
            compressor: &self.compressor,
            max_turns: self.max_turns_per_step,
            model: None,
            max_tokens: self.max_tokens,
            bus: self.bus.as_ref(),
            session_id: None,
            task_id: Some(task.id.clone()),
        })
        .await
    }

    async fn suspend_for_validation(
        &self,
        mut task: Task,
        request: crate::react::ValidationRequest,
        exploration: String,
    ) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        if !exploration.trim().is_empty() {
            self.task_store
                .append_mailbox(
                    &task.id,
                    MailboxMessage {
                        id: format!("mbx-{}", task.suspend_count),
                        timestamp: Timestamp::now(),
                        kind: MailboxKind::Exploration,
                        token: None,
                        content: exploration,
                        status: None,
                    },
                )
                .await?;
        }
        self.task_store
            .append_mailbox(
                &task.id,
                MailboxMessage {
                    id: format!("mbx-{}-req", task.suspend_count),
                    timestamp: Timestamp::now(),
                    kind: MailboxKind::Request,
                    token: Some(request.token.clone()),
                    content: request.content.clone(),
                    status: None,
                },
            )
            .await?;

        if let Some(plan) = plan_parser::parse_plan(&request.content) {
            task.plan = Some(plan);
        }

        task.status = TaskStatus::Suspended;
        task.waiting_for_reply = true;
        task.suspended_at = Some(Timestamp::now());
        task.suspend_count += 1;
        task.updated_at = Timestamp::now();
        self.task_store.update(&task).await?;

        self.task_store
            .append_checkpoint(
                &task.id,
                Checkpoint::new(CheckpointKind::Suspended, "awaiting validation response"),
            )
            .await?;

        Ok(TaskOutcome::Suspended)
    }

    async fn suspend_for_preemption(&self, mut task: Task, step_id: Option<&str>) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        task.status = TaskStatus::Suspended;
        task.suspended_at = Some(Timestamp::now());
        task.suspend_count += 1;
        task.updated_at = Timestamp::now();
        self.task_store.update(&task).await?;

        let mut checkpoint = Checkpoint::new(CheckpointKind::Suspended, "preempted by the actor pool");
        if let Some(step_id) = step_id {
            checkpoint = checkpoint.with_step(step_id);
        }
        self.task_store.append_checkpoint(&task.id, checkpoint).await?;

        Ok(TaskOutcome::Suspended)
    }

    async fn fail(&self, task: &Task, message: String) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        self.task_store
            .append_checkpoint(&task.id, Checkpoint::new(CheckpointKind::Failed, message))
            .await?;
        Ok(TaskOutcome::Failed)
    }

    /// The provider reported itself unavailable; the pool resets the task
    /// to `pending` without counting it against `retry_count` (DESIGN.md
    /// open question 1) — this runner only records why.
    async fn model_unavailable(&self, task: &Task, message: String) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        self.task_store
            .append_checkpoint(
                &task.id,
                Checkpoint::new(CheckpointKind::Note, format!("model unavailable: {message}")),
            )
            .await?;
        Ok(TaskOutcome::ModelUnavailable)
    }

    async fn complete_with_text(&self, task: &Task, text: String) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        self.task_store.write_output(&task.id, &text).await?;
        self.task_store
            .append_checkpoint(
                &task.id,
                Checkpoint::new(CheckpointKind::Note, "invocation completed"),
            )
            .await?;
        Ok(TaskOutcome::Completed)
    }

    /// Skill shortcut (spec §4.4): bypasses the LLM entirely.
    async fn run_skill(&self, task: &Task, skill_name: &str) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        let Some(skill) = self.skills.get(skill_name) else {
            return self
                .fail(task, format!("no skill registered under \"{skill_name}\""))
                .await;
        };

        match skill.execute(task).await {
            Ok(output) => self.complete_with_text(task, output).await,
            Err(message) => self.fail(task, message).await,
        }
    }

    /// Single step (disabled autonomy, spec §4.4): one model invocation, no
    /// plan, no validation side channel.
    async fn run_single_step(
        &self,
        task: Task,
        provider: &dyn ProviderDyn,
        preempt: &PreemptHandle,
    ) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        let system = self.assemble_instructions(&task).await?;
        match self.run_one_invocation(&task, system, false, provider, preempt).await {
            ReactOutcome::Completed { text, .. } => self.complete_with_text(&task, text).await,
            ReactOutcome::Preempted { .. } => self.suspend_for_preemption(task, None).await,
            ReactOutcome::Suspended { request, exploration, .. } => {
                // Disabled autonomy offers no validation tool, so the model
                // should never produce this; treat it as a hard failure
                // rather than silently dropping the request.
                let _ = (request, exploration);
                self.fail(&task, "validation requested outside a supervised task".to_string()).await
            }
            ReactOutcome::Failed(message) => self.fail(&task, message).await,
            ReactOutcome::ModelUnavailable(message) => self.model_unavailable(&task, message).await,
        }
    }

    /// Plan steps (spec §4.4): execute `task.plan`'s steps in order,
    /// resuming at the first `Pending` one (spec §3 "Checkpoint").
    async fn run_plan_steps(
        &self,
        mut task: Task,
        provider: &dyn ProviderDyn,
        preempt: &PreemptHandle,
    ) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        loop {
            if preempt.is_set() {
                let step_id = task.plan.as_ref().and_then(|p| p.next_pending()).map(|s| s.id.clone());
                return self.suspend_for_preemption(task, step_id.as_deref()).await;
            }

            let Some(step) = task.plan.as_ref().and_then(|p| p.next_pending()).cloned() else {
                // No pending steps left.
                let output = self.task_store.read_output(&task.id).await?.unwrap_or_default();
                return self.complete_with_text(&task, output).await;
            };

            self.task_store
                .append_checkpoint(
                    &task.id,
                    Checkpoint::new(CheckpointKind::StepStarted, step.title.clone()).with_step(step.id.clone()),
                )
                .await?;

            let system = format!(
                "{}\n\n## Current plan step\n{}\n{}",
                self.assemble_instructions(&task).await?,
                step.title,
                step.description
            );

            match self.run_one_invocation(&task, system, false, provider, preempt).await {
                ReactOutcome::Completed { text, .. } => {
                    self.task_store.write_output(&task.id, &text).await?;
                    self.task_store
                        .append_checkpoint(
                            &task.id,
                            Checkpoint::new(CheckpointKind::StepCompleted, "step finished").with_step(step.id.clone()),
                        )
                        .await?;

                    if let Some(plan) = task.plan.as_mut() {
                        if let Some(s) = plan.steps.iter_mut().find(|s| s.id == step.id) {
                            s.status = fulcrum_core::StepStatus::Completed;
                        }
                    }
                    task.updated_at = Timestamp::now();
                    self.task_store.update(&task).await?;
                }
                ReactOutcome::Preempted { .. } => {
                    return self.suspend_for_preemption(task, Some(step.id.as_str())).await;
                }
                ReactOutcome::Suspended { request, exploration, .. } => {
                    return self.suspend_for_validation(task, request, exploration).await;
                }
                ReactOutcome::Failed(message) => {
                    self.task_store
                        .append_checkpoint(
                            &task.id,
                            Checkpoint::new(CheckpointKind::StepFailed, message.clone()).with_step(step.id),
                        )
                        .await?;
                    return self.fail(&task, message).await;
                }
                ReactOutcome::ModelUnavailable(message) => {
                    return self.model_unavailable(&task, message).await;
                }
            }
        }
    }

    /// Supervised coordinator (spec §4.4): draft a plan, then self-suspend
    /// via `request_validation` rather than executing it immediately.
    async fn run_supervised_planning(
        &self,
        task: Task,
        provider: &dyn ProviderDyn,
        preempt: &PreemptHandle,
    ) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        let system = format!(
            "{}\n\n## Planning\nDraft a numbered step-by-step plan for this task, then call \
             request_validation with the plan before doing any other work.",
            self.assemble_instructions(&task).await?
        );

        match self.run_one_invocation(&task, system, true, provider, preempt).await {
            ReactOutcome::Suspended { request, exploration, .. } => {
                self.suspend_for_validation(task, request, exploration).await
            }
            ReactOutcome::Completed { text, .. } => {
                // The model answered without asking for validation; still
                // suspend so a human gets a chance to review it, rather
                // than silently treating "supervised" as "autonomous".
                self.suspend_for_validation(
                    task,
                    crate::react::ValidationRequest {
                        token: "auto".to_string(),
                        content: text,
                    },
                    String::new(),
                )
                .await
            }
            ReactOutcome::Preempted { .. } => self.suspend_for_preemption(task, None).await,
            ReactOutcome::Failed(message) => self.fail(&task, message).await,
            ReactOutcome::ModelUnavailable(message) => self.model_unavailable(&task, message).await,
        }
    }

    /// Autonomous coordinator (spec §4.4): draft a plan and immediately
    /// begin executing it, no validation stop.
    async fn run_autonomous_planning(
        &self,
        mut task: Task,
        provider: &dyn ProviderDyn,
        preempt: &PreemptHandle,
    ) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        let system = format!(
            "{}\n\n## Planning\nDraft a numbered step-by-step plan for this task, then proceed to \
             execute it yourself.",
            self.assemble_instructions(&task).await?
        );

        match self.run_one_invocation(&task, system, false, provider, preempt).await {
            ReactOutcome::Completed { text, .. } => {
                if let Some(plan) = plan_parser::parse_plan(&text) {
                    task.plan = Some(plan);
                    task.updated_at = Timestamp::now();
                    self.task_store.update(&task).await?;
                    self.run_plan_steps(task, provider, preempt).await
                } else {
                    self.complete_with_text(&task, text).await
                }
            }
            ReactOutcome::Preempted { .. } => self.suspend_for_preemption(task, None).await,
            ReactOutcome::Suspended { request, exploration, .. } => {
                self.suspend_for_validation(task, request, exploration).await
            }
            ReactOutcome::Failed(message) => self.fail(&task, message).await,
            ReactOutcome::ModelUnavailable(message) => self.model_unavailable(&task, message).await,
        }
    }
}

#[async_trait]
impl TaskExecutor for TaskRunner {
    async fn run(
        &self,
        task: Task,
        provider: &str,
        preempt: PreemptHandle,
    ) -> Result<TaskOutcome, fulcrum_core::RunnerError> {
        if let Some(skill_name) = task.config.skill.clone() {
            return self.run_skill(&task, &skill_name).await;
        }

        let provider_handle = self.resolve_provider(provider)?;
        let provider_ref: &dyn ProviderDyn = provider_handle.as_ref();

        if task.plan.is_some() {
            return self.run_plan_steps(task, provider_ref, &preempt).await;
        }

        match task.config.autonomy_level {
            AutonomyLevel::Disabled => self.run_single_step(task, provider_ref, &preempt).await,
            AutonomyLevel::Supervised => self.run_supervised_planning(task, provider_ref, &preempt).await,
            AutonomyLevel::Autonomous => self.run_autonomous_planning(task, provider_ref, &preempt).await,
        }
    }
}
