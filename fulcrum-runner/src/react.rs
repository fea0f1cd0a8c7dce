//! The shared Reason-Act-Observe loop underlying every Task Runner execution
//! mode that calls the model at all (spec §4.4's Single step, Plan steps,
//! and coordinator planning/execution phases all drive one of these).
//!
//! Grounded on `neuron-op-react/src/lib.rs`'s `ReactOperator::execute`: hook
//! dispatch at the same points, the same tool-use extraction and
//! recorded-tool-call bookkeeping, and the same compaction trigger at the
//! end of a turn. Generalized here by lifting the loop out of one `Operator`
//! impl into a free function so every execution mode in [`crate::task_runner`]
//! can drive it, and by adding the side-channel self-suspension check (spec
//! §4.4 "Self-suspension protocol") that `neuron-op-react` has no equivalent
//! of. The loop also publishes `llm.call` around every provider round trip
//! and `tool.call` around every tool invocation, tagged with whichever of
//! `session_id`/`task_id` the caller supplies, so the Cost Tracker and any
//! other bus consumer can observe a turn's model/tool traffic as it happens
//! rather than only its final outcome.

use fulcrum_agent::provider::ProviderDyn;
use fulcrum_agent::{
    Compressor, ContentPart, ProviderError, ProviderMessage, ProviderRequest, Role as WireRole,
    RecoveryMiddleware, StopReason, ToolRegistry, ToolSchema,
};
use fulcrum_core::event::{LlmCallPhase, ToolCallStatus};
use fulcrum_core::{Event, EventBus, EventPayload, PreemptHandle, SessionId, Source, TaskId};
use fulcrum_hooks::{HookAction, HookContext, HookPoint, HookRegistry};
use std::future::Future;

/// The name of the built-in self-suspension tool. Special-cased the same
/// way `neuron-op-react`'s `EFFECT_TOOL_NAMES` special-cases effect tools —
/// intercepted before reaching the tool registry at all.
pub const REQUEST_VALIDATION_TOOL: &str = "request_validation";

/// A validation request captured off the model's tool call (spec §4.4).
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// Correlates with the eventual user response.
    pub token: String,
    /// The plan/question text presented for approval.
    pub content: String,
}

/// How one call to [`run_react_loop`] resolved.
pub enum ReactOutcome {
    /// The model reached `EndTurn`; `text` is its final assistant message.
    Completed {
        /// The model's final assistant text.
        text: String,
        /// Aggregate input tokens across every turn.
        tokens_in: u64,
        /// Aggregate output tokens across every turn.
        tokens_out: u64,
        /// Number of model turns taken.
        turns: u32,
    },
    /// `preempt.is_set()` was observed between turns.
    Preempted {
        /// Aggregate input tokens across every turn so far.
        tokens_in: u64,
        /// Aggregate output tokens across every turn so far.
        tokens_out: u64,
    },
    /// The model called `request_validation`; the loop unwound with the
    /// request and the exploration text accumulated beforehand (spec §4.4).
    Suspended {
        /// The captured validation request.
        request: ValidationRequest,
        /// Assistant text emitted before the suspending tool call.
        exploration: String,
        /// Aggregate input tokens across every turn so far.
        tokens_in: u64,
        /// Aggregate output tokens across every turn so far.
        tokens_out: u64,
    },
    /// A tool failed past the recovery middleware's retry budget, or the
    /// provider call failed outright.
    Failed(String),
    /// The provider reported itself unavailable (rate limited, connection
    /// refused, ...). Distinguished from `Failed` so callers can reset the
    /// task to `pending` without counting it against `retry_count` (spec
    /// §7, DESIGN.md open question 1).
    ModelUnavailable(String),
}

/// One iteration's worth of knobs, bundled so [`run_react_loop`]'s signature
/// stays readable across the five call sites in `task_runner.rs`.
pub struct ReactLoopInputs<'a> {
    /// The assembled system instructions (spec §4.4 "Instruction assembly").
    pub system: String,
    /// The conversation so far; the loop appends to and returns through this.
    pub messages: Vec<ProviderMessage>,
    /// Tools available this invocation, already filtered to the task's
    /// whitelist.
    pub tools: &'a ToolRegistry,
    /// Tool names from `tools` actually offered to the model this call.
    pub allowed_tool_names: &'a [String],
    /// Whether the `request_validation` side-channel tool is offered
    /// (supervised planning phase only).
    pub allow_validation: bool,
    /// The provider bound to this task, resolved by name upstream.
    pub provider: &'a dyn ProviderDyn,
    /// Per-invocation tool-call recovery state.
    pub recovery: &'a RecoveryMiddleware,
    /// The hook pipeline to dispatch at each of the loop's five points.
    pub hooks: &'a HookRegistry,
    /// Cooperative preemption signal, polled between turns.
    pub preempt: &'a PreemptHandle,
    /// Conversation compaction policy.
    pub compressor: &'a Compressor,
    /// Hard cap on model turns before the loop gives up and returns whatever
    /// text it has (prevents an unbounded tool-call loop).
    pub max_turns: u32,
    /// Model override passed straight through to the provider request.
    pub model: Option<String>,
    /// `max_tokens` passed straight through to the provider request.
    pub max_tokens: u32,
    /// Where to publish `llm.call`/`tool.call` events for this invocation
    /// (spec §6's closed event-type set).
    pub bus: &'a dyn EventBus,
    /// Session this invocation belongs to, if it's an interactive turn.
    pub session_id: Option<SessionId>,
    /// Task this invocation belongs to, if it's a background task.
    pub task_id: Option<TaskId>,
}

fn tag(mut event: Event, session_id: &Option<SessionId>, task_id: &Option<TaskId>) -> Event {
    if let Some(session_id) = session_id {
        event = event.with_session(session_id.clone());
    }
    if let Some(task_id) = task_id {
        event = event.with_task(task_id.clone());
    }
    event
}

fn publish_tool_call(
    bus: &dyn EventBus,
    session_id: &Option<SessionId>,
    task_id: &Option<TaskId>,
    tool: &str,
    status: ToolCallStatus,
    detail: Option<String>,
) {
    bus.publish(tag(
        Event::new(Source::Tool, EventPayload::ToolCall { tool: tool.to_string(), status, detail }),
        session_id,
        task_id,
    ));
}

/// Adapts a borrowed `&dyn ProviderDyn` back into [`fulcrum_agent::Provider`]
/// so it can be handed to [`Compressor::compact`], which is generic over
/// `impl Provider` rather than dyn-compatible (spec §4.4's `Provider` is
/// deliberately not object-safe; this is the narrow bridge back, mirroring
/// the `ProviderDyn` blanket impl on the way out).
pub(crate) struct DynProviderRef<'a>(pub(crate) &'a dyn ProviderDyn);

impl<'a> fulcrum_agent::Provider for DynProviderRef<'a> {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> impl Future<Output = Result<fulcrum_agent::wire::ProviderResponse, ProviderError>> + Send
    {
        self.0.complete_dyn(request)
    }

    fn context_window(&self) -> usize {
        ProviderDyn::context_window(self.0)
    }
}

/// Drive the Reason-Act-Observe loop until completion, preemption,
/// self-suspension, or failure.
pub async fn run_react_loop(mut inputs: ReactLoopInputs<'_>) -> ReactOutcome {
    let mut total_tokens_in: u64 = 0;
    let mut total_tokens_out: u64 = 0;
    let mut turns: u32 = 0;
    let mut last_text = String::new();
    let mut exploration = String::new();

    let mut tool_schemas: Vec<ToolSchema> = inputs
        .tools
        .iter_allowed(inputs.allowed_tool_names)
        .map(|tool| ToolSchema {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        })
        .collect();
    if inputs.allow_validation {
        tool_schemas.push(validation_tool_schema());
    }

    let dyn_provider = DynProviderRef(inputs.provider);

    loop {
        if inputs.preempt.is_set() {
            return ReactOutcome::Preempted {
                tokens_in: total_tokens_in,
                tokens_out: total_tokens_out,
            };
        }

        turns += 1;
        if turns > inputs.max_turns {
            return ReactOutcome::Completed {
                text: last_text,
                tokens_in: total_tokens_in,
                tokens_out: total_tokens_out,
                turns: turns - 1,
            };
        }

        let pre_ctx = HookContext::new(HookPoint::PreInference);
        if let HookAction::Halt { reason } = inputs.hooks.dispatch(&pre_ctx).await {
            return ReactOutcome::Failed(format!("halted before inference: {reason}"));
        }

        let request = ProviderRequest {
            model: inputs.model.clone(),
            messages: inputs.messages.clone(),
            tools: tool_schemas.clone(),
            max_tokens: Some(inputs.max_tokens),
            system: Some(inputs.system.clone()),
        };

        inputs.bus.publish(tag(
            Event::new(
                Source::Agent,
                EventPayload::LlmCall { phase: LlmCallPhase::Request, tokens_in: 0, tokens_out: 0 },
            ),
            &inputs.session_id,
            &inputs.task_id,
        ));

        let response = match inputs.provider.complete_dyn(request).await {
            Ok(response) => response,
            Err(ProviderError::ModelUnavailable(msg)) => {
                inputs.bus.publish(tag(
                    Event::new(
                        Source::Agent,
                        EventPayload::LlmCall { phase: LlmCallPhase::Error, tokens_in: 0, tokens_out: 0 },
                    ),
                    &inputs.session_id,
                    &inputs.task_id,
                ));
                return ReactOutcome::ModelUnavailable(msg);
            }
            Err(err) => {
                inputs.bus.publish(tag(
                    Event::new(
                        Source::Agent,
                        EventPayload::LlmCall { phase: LlmCallPhase::Error, tokens_in: 0, tokens_out: 0 },
                    ),
                    &inputs.session_id,
                    &inputs.task_id,
                ));
                return ReactOutcome::Failed(err.to_string());
            }
        };

        total_tokens_in += response.usage.input_tokens;
        total_tokens_out += response.usage.output_tokens;

        inputs.bus.publish(tag(
            Event::new(
                Source::Agent,
                EventPayload::LlmCall {
                    phase: LlmCallPhase::Response,
                    tokens_in: response.usage.input_tokens,
                    tokens_out: response.usage.output_tokens,
                },
            ),
            &inputs.session_id,
            &inputs.task_id,
        ));

        let post_payload = serde_json::to_value(&response.content).unwrap_or(serde_json::Value::Null);
        let post_ctx = HookContext::new(HookPoint::PostInference).with_payload(post_payload);
        if let HookAction::Halt { reason } = inputs.hooks.dispatch(&post_ctx).await {
            return ReactOutcome::Failed(format!("halted after inference: {reason}"));
        }

        for part in &response.content {
            if let ContentPart::Text { text } = part {
                if !text.is_empty() {
                    exploration.push_str(text);
                    exploration.push('\n');
                    last_text = text.clone();
                }
            }
        }

        match response.stop_reason {
            StopReason::EndTurn => {
                return ReactOutcome::Completed {
                    text: last_text,
                    tokens_in: total_tokens_in,
                    tokens_out: total_tokens_out,
                    turns,
                };
            }
            StopReason::MaxTokens => {
                return ReactOutcome::Failed("output truncated (max_tokens)".to_string());
            }
            StopReason::ContentFilter => {
                return ReactOutcome::Failed("content filtered".to_string());
            }
            StopReason::ToolUse => {}
        }

        inputs.messages.push(ProviderMessage {
            role: WireRole::Assistant,
            content: response.content.clone(),
        });

        let mut tool_results = Vec::new();
        let mut suspended = None;

        for part in &response.content {
            let ContentPart::ToolUse { id, name, input } = part else {
                continue;
            };

            if inputs.allow_validation && name == REQUEST_VALIDATION_TOOL {
                let token = format!("val-{turns}-{id}");
                let content = input
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                tool_results.push(ContentPart::ToolResult {
                    tool_use_id: id.clone(),
                    content: "Validation requested; awaiting user response.".to_string(),
                    is_error: false,
                });
                suspended = Some(ValidationRequest { token, content });
                continue;
            }

            let pre_tool_ctx =
                HookContext::new(HookPoint::PreToolUse).with_tool(name.clone(), input.clone());
            match inputs.hooks.dispatch(&pre_tool_ctx).await {
                HookAction::Halt { reason } => {
                    return ReactOutcome::Failed(format!("halted before tool use: {reason}"));
                }
                HookAction::SkipTool => {
                    tool_results.push(ContentPart::ToolResult {
                        tool_use_id: id.clone(),
                        content: "Skipped by hook policy.".to_string(),
                        is_error: false,
                    });
                    continue;
                }
                HookAction::ModifyToolInput(modified) => {
                    publish_tool_call(inputs.bus, &inputs.session_id, &inputs.task_id, name, ToolCallStatus::Started, None);
                    let invocation = inputs.recovery.invoke(inputs.tools, name, modified).await;
                    match invocation {
                        Ok(result) => {
                            publish_tool_call(
                                inputs.bus,
                                &inputs.session_id,
                                &inputs.task_id,
                                name,
                                if result.is_error { ToolCallStatus::Failed } else { ToolCallStatus::Completed },
                                Some(result.content.clone()),
                            );
                            tool_results.push(ContentPart::ToolResult {
                                tool_use_id: id.clone(),
                                content: result.content,
                                is_error: result.is_error,
                            })
                        }
                        Err(err) => {
                            publish_tool_call(
                                inputs.bus,
                                &inputs.session_id,
                                &inputs.task_id,
                                name,
                                ToolCallStatus::Failed,
                                Some(err.to_string()),
                            );
                            return ReactOutcome::Failed(format!("tool \"{name}\" failed: {err}"));
                        }
                    }
                    continue;
                }
                HookAction::Continue => {}
            }

            publish_tool_call(inputs.bus, &inputs.session_id, &inputs.task_id, name, ToolCallStatus::Started, None);
            let invocation = inputs
                .recovery
                .invoke(inputs.tools, name, input.clone())
                .await;

            match invocation {
                Ok(result) => {
                    publish_tool_call(
                        inputs.bus,
                        &inputs.session_id,
                        &inputs.task_id,
                        name,
                        if result.is_error { ToolCallStatus::Failed } else { ToolCallStatus::Completed },
                        Some(result.content.clone()),
                    );
                    tool_results.push(ContentPart::ToolResult {
                        tool_use_id: id.clone(),
                        content: result.content,
                        is_error: result.is_error,
                    });
                }
                Err(err) => {
                    publish_tool_call(
                        inputs.bus,
                        &inputs.session_id,
                        &inputs.task_id,
                        name,
                        ToolCallStatus::Failed,
                        Some(err.to_string()),
                    );
                    return ReactOutcome::Failed(format!("tool \"{name}\" failed: {err}"));
                }
            }

            let post_tool_ctx = HookContext::new(HookPoint::PostToolUse).with_tool(name.clone(), input.clone());
            if let HookAction::Halt { reason } = inputs.hooks.dispatch(&post_tool_ctx).await {
                return ReactOutcome::Failed(format!("halted after tool use: {reason}"));
            }
        }

        if let Some(request) = suspended {
            return ReactOutcome::Suspended {
                request,
                exploration,
                tokens_in: total_tokens_in,
                tokens_out: total_tokens_out,
            };
        }

        inputs.messages.push(ProviderMessage {
            role: WireRole::User,
            content: tool_results,
        });

        let exit_ctx = HookContext::new(HookPoint::ExitCheck);
        if let HookAction::Halt { reason } = inputs.hooks.dispatch(&exit_ctx).await {
            return ReactOutcome::Failed(format!("halted at exit check: {reason}"));
        }

        let estimated = fulcrum_agent::compress::estimate_tokens(&to_core_messages(&inputs.messages));
        if inputs
            .compressor
            .should_compact(estimated, dyn_provider.context_window())
        {
            let (compacted, _) = inputs
                .compressor
                .compact(to_core_messages(&inputs.messages), None, &dyn_provider)
                .await;
            inputs.messages = from_core_messages(compacted);
        }
    }
}

fn validation_tool_schema() -> ToolSchema {
    ToolSchema {
        name: REQUEST_VALIDATION_TOOL.to_string(),
        description: "Ask the user to approve or revise a drafted plan before executing it."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The plan or question to present for approval"}
            },
            "required": ["content"]
        }),
    }
}

fn to_core_messages(messages: &[ProviderMessage]) -> Vec<fulcrum_core::Message> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                WireRole::System => fulcrum_core::Role::System,
                WireRole::User => fulcrum_core::Role::User,
                WireRole::Assistant => fulcrum_core::Role::Assistant,
            };
            let text = m
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::ToolResult { content, .. } => Some(content.clone()),
                    ContentPart::ToolUse { name, .. } => Some(format!("[tool call: {name}]")),
                })
                .collect::<Vec<_>>()
                .join("\n");
            fulcrum_core::Message::new(role, text)
        })
        .collect()
}

/// Convert a session's or task's stored messages into wire messages.
/// Shared with [`crate::event_runner`], which loads a session's message log
/// the same way the compactor loads a task's.
pub(crate) fn from_core_messages(messages: Vec<fulcrum_core::Message>) -> Vec<ProviderMessage> {
    messages
        .into_iter()
        .map(|m| {
            let role = match m.role {
                fulcrum_core::Role::System => WireRole::System,
                fulcrum_core::Role::User | fulcrum_core::Role::Tool => WireRole::User,
                fulcrum_core::Role::Assistant => WireRole::Assistant,
            };
            ProviderMessage::text(role, m.content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_agent::wire::{ProviderResponse, TokenUsage};
    use fulcrum_agent::{Provider, ToolDyn, ToolError};
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    struct NoopBus;
    impl EventBus for NoopBus {
        fn publish(&self, _event: Event) {}
        fn subscribe(&self) -> fulcrum_core::EventSubscriber {
            fulcrum_core::EventSubscriber::new(tokio::sync::mpsc::channel(1).1)
        }
        fn tail(&self, _n: usize) -> Vec<Event> {
            Vec::new()
        }
        fn close(&self) {}
    }

    struct ScriptedProvider {
        responses: StdMutex<VecDeque<ProviderResponse>>,
    }

    impl Provider for ScriptedProvider {
        fn complete(
            &self,
            _request: ProviderRequest,
        ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send {
            let response = self.responses.lock().unwrap().pop_front();
            async move {
                response.ok_or_else(|| ProviderError::RequestFailed("no more scripted responses".into()))
            }
        }

        fn context_window(&self) -> usize {
            100_000
        }
    }

    fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::Text { text: text.to_string() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
            model: "mock".into(),
            cost: None,
        }
    }

    fn tool_use_response(tool: &str, input: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse {
                id: "tu1".into(),
                name: tool.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
            model: "mock".into(),
            cost: None,
        }
    }

    struct EchoTool;
    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn call(
            &self,
            input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(input) })
        }
    }

    fn base_inputs<'a>(
        provider: &'a ScriptedProvider,
        tools: &'a ToolRegistry,
        recovery: &'a RecoveryMiddleware,
        hooks: &'a HookRegistry,
        preempt: &'a PreemptHandle,
        compressor: &'a Compressor,
        bus: &'a dyn EventBus,
    ) -> ReactLoopInputs<'a> {
        ReactLoopInputs {
            system: "be helpful".to_string(),
            messages: vec![ProviderMessage::text(WireRole::User, "go".to_string())],
            tools,
            allowed_tool_names: &[],
            allow_validation: false,
            provider,
            recovery,
            hooks,
            preempt,
            compressor,
            max_turns: 10,
            model: None,
            max_tokens: 1024,
            bus,
            session_id: None,
            task_id: None,
        }
    }

    #[tokio::test]
    async fn completes_on_end_turn() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(VecDeque::from([text_response("done")])),
        };
        let tools = ToolRegistry::new();
        let recovery = RecoveryMiddleware::new(3);
        let hooks = HookRegistry::new();
        let preempt = PreemptHandle::never();
        let compressor = Compressor::new(0.8);

        let outcome = run_react_loop(base_inputs(
            &provider, &tools, &recovery, &hooks, &preempt, &compressor, &NoopBus,
        ))
        .await;

        match outcome {
            ReactOutcome::Completed { text, turns, .. } => {
                assert_eq!(text, "done");
                assert_eq!(turns, 1);
            }
            _ => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn preemption_is_observed_before_the_next_turn() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(VecDeque::from([text_response("unreached")])),
        };
        let tools = ToolRegistry::new();
        let recovery = RecoveryMiddleware::new(3);
        let hooks = HookRegistry::new();
        let (tx, rx) = tokio::sync::watch::channel(false);
        tx.send(true).unwrap();
        let preempt = PreemptHandle::new(rx);
        let compressor = Compressor::new(0.8);

        let outcome = run_react_loop(base_inputs(
            &provider, &tools, &recovery, &hooks, &preempt, &compressor, &NoopBus,
        ))
        .await;

        assert!(matches!(outcome, ReactOutcome::Preempted { .. }));
    }

    #[tokio::test]
    async fn tool_use_then_completion() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(VecDeque::from([
                tool_use_response("echo", serde_json::json!({"msg": "hi"})),
                text_response("all set"),
            ])),
        };
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let recovery = RecoveryMiddleware::new(3);
        let hooks = HookRegistry::new();
        let preempt = PreemptHandle::never();
        let compressor = Compressor::new(0.8);

        let inputs = base_inputs(&provider, &tools, &recovery, &hooks, &preempt, &compressor, &NoopBus);

        let outcome = run_react_loop(inputs).await;
        match outcome {
            ReactOutcome::Completed { text, turns, .. } => {
                assert_eq!(text, "all set");
                assert_eq!(turns, 2);
            }
            _ => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn request_validation_suspends_the_loop() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(VecDeque::from([tool_use_response(
                REQUEST_VALIDATION_TOOL,
                serde_json::json!({"content": "1. a\n2. b"}),
            )])),
        };
        let tools = ToolRegistry::new();
        let recovery = RecoveryMiddleware::new(3);
        let hooks = HookRegistry::new();
        let preempt = PreemptHandle::never();
        let compressor = Compressor::new(0.8);

        let mut inputs = base_inputs(&provider, &tools, &recovery, &hooks, &preempt, &compressor, &NoopBus);
        inputs.allow_validation = true;

        let outcome = run_react_loop(inputs).await;
        match outcome {
            ReactOutcome::Suspended { request, .. } => {
                assert_eq!(request.content, "1. a\n2. b");
            }
            _ => panic!("expected Suspended"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_past_retry_budget_fails() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(VecDeque::from([tool_use_response(
                "missing",
                serde_json::json!({}),
            )])),
        };
        let tools = ToolRegistry::new();
        let recovery = RecoveryMiddleware::new(0);
        let hooks = HookRegistry::new();
        let preempt = PreemptHandle::never();
        let compressor = Compressor::new(0.8);

        let inputs = base_inputs(&provider, &tools, &recovery, &hooks, &preempt, &compressor, &NoopBus);
        let outcome = run_react_loop(inputs).await;
        assert!(matches!(outcome, ReactOutcome::Failed(_)));
    }
}
