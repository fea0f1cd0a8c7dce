#![deny(missing_docs)]
//! Hook registry and composition for the agent execution loop.
//!
//! [`HookRegistry`] collects [`Hook`] implementations into an ordered
//! pipeline. At each [`HookPoint`], hooks are dispatched in registration
//! order and the pipeline short-circuits on anything other than
//! [`HookAction::Continue`]. A hook that errors is logged and treated as
//! `Continue` — one misbehaving observer must not halt the loop.

use async_trait::async_trait;
use fulcrum_core::{SessionId, TaskId};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Where in the agent loop a hook may observe or intervene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Immediately before a provider call is issued.
    PreInference,
    /// Immediately after a provider call returns.
    PostInference,
    /// Immediately before a tool is invoked.
    PreToolUse,
    /// Immediately after a tool call resolves (success or failure).
    PostToolUse,
    /// Before the loop decides whether to continue iterating.
    ExitCheck,
}

/// What a hook wants the pipeline to do next.
#[derive(Debug, Clone)]
pub enum HookAction {
    /// Proceed to the next hook, or resume normal execution.
    Continue,
    /// Stop the task outright with the given reason.
    Halt {
        /// Human-readable reason surfaced in the task's failure result.
        reason: String,
    },
    /// Skip the tool call this hook point concerns (only meaningful at
    /// [`HookPoint::PreToolUse`]).
    SkipTool,
    /// Replace the tool call's input before it executes (only meaningful at
    /// [`HookPoint::PreToolUse`]).
    ModifyToolInput(serde_json::Value),
}

/// Everything a hook needs to observe or act on one point in the loop.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Which point this dispatch is for.
    pub point: HookPoint,
    /// The task being executed, if any (absent for interactive-session turns).
    pub task_id: Option<TaskId>,
    /// The session the turn belongs to, if any.
    pub session_id: Option<SessionId>,
    /// The tool name, for `PreToolUse`/`PostToolUse`.
    pub tool_name: Option<String>,
    /// The tool's input, for `PreToolUse`.
    pub tool_input: Option<serde_json::Value>,
    /// Point-specific free-form payload (e.g. the assistant's raw response
    /// at `PostInference`).
    pub payload: serde_json::Value,
}

impl HookContext {
    /// Construct a context carrying no task/session/tool association.
    pub fn new(point: HookPoint) -> Self {
        Self {
            point,
            task_id: None,
            session_id: None,
            tool_name: None,
            tool_input: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a task id.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Attach a session id.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach a tool name and input.
    pub fn with_tool(mut self, tool_name: impl Into<String>, tool_input: serde_json::Value) -> Self {
        self.tool_name = Some(tool_name.into());
        self.tool_input = Some(tool_input);
        self
    }

    /// Attach a free-form payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Error a hook implementation may return; always logged and swallowed by
/// [`HookRegistry::dispatch`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HookError {
    /// Catch-all for hook-internal failures.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// One observer/interceptor in the hook pipeline.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Which points this hook wants to be dispatched at.
    fn points(&self) -> &[HookPoint];

    /// Handle one dispatch at one of `points()`.
    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError>;
}

/// An ordered pipeline of hooks, dispatched in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook to the end of the pipeline.
    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Dispatch `ctx` through every hook registered for `ctx.point`, in
    /// order, stopping at the first non-`Continue` action. A hook's error
    /// is logged and treated as `Continue`.
    pub async fn dispatch(&self, ctx: &HookContext) -> HookAction {
        for hook in &self.hooks {
            if !hook.points().contains(&ctx.point) {
                continue;
            }

            match hook.on_event(ctx).await {
                Ok(HookAction::Continue) => continue,
                Ok(action) => return action,
                Err(err) => {
                    warn!(error = %err, point = ?ctx.point, "fulcrum-hooks: hook errored, continuing pipeline");
                    continue;
                }
            }
        }

        HookAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        points: Vec<HookPoint>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Hook for CountingHook {
        fn points(&self) -> &[HookPoint] {
            &self.points
        }

        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HookAction::Continue)
        }
    }

    struct HaltingHook;

    #[async_trait]
    impl Hook for HaltingHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::PreToolUse]
        }

        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            Ok(HookAction::Halt {
                reason: "blocked".into(),
            })
        }
    }

    struct ErroringHook;

    #[async_trait]
    impl Hook for ErroringHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::PreInference]
        }

        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            Err(HookError::Other("boom".into()))
        }
    }

    #[tokio::test]
    async fn hooks_not_registered_for_this_point_are_skipped() {
        let hook = Arc::new(CountingHook {
            points: vec![HookPoint::PostToolUse],
            calls: AtomicUsize::new(0),
        });
        let mut registry = HookRegistry::new();
        registry.add(hook.clone());

        let action = registry.dispatch(&HookContext::new(HookPoint::PreInference)).await;
        assert!(matches!(action, HookAction::Continue));
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pipeline_short_circuits_on_halt() {
        let first = Arc::new(CountingHook {
            points: vec![HookPoint::PreToolUse],
            calls: AtomicUsize::new(0),
        });
        let mut registry = HookRegistry::new();
        registry.add(first.clone());
        registry.add(Arc::new(HaltingHook));
        registry.add(first.clone());

        let action = registry.dispatch(&HookContext::new(HookPoint::PreToolUse)).await;
        assert!(matches!(action, HookAction::Halt { .. }));
        // The first hook ran once before the halt, and the repeated
        // registration after the halting hook never ran.
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_hook_error_is_swallowed_and_pipeline_continues() {
        let after = Arc::new(CountingHook {
            points: vec![HookPoint::PreInference],
            calls: AtomicUsize::new(0),
        });
        let mut registry = HookRegistry::new();
        registry.add(Arc::new(ErroringHook));
        registry.add(after.clone());

        let action = registry.dispatch(&HookContext::new(HookPoint::PreInference)).await;
        assert!(matches!(action, HookAction::Continue));
        assert_eq!(after.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_registry_continues() {
        let registry = HookRegistry::new();
        let action = registry.dispatch(&HookContext::new(HookPoint::ExitCheck)).await;
        assert!(matches!(action, HookAction::Continue));
    }
}
