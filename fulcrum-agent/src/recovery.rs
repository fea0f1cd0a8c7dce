//! Tool recovery middleware (spec §4.4 "Tool recovery middleware"): a
//! mandatory wrapper converting the first `max_retries` consecutive errors
//! per tool name into a synthesized result the LLM can read and
//! self-correct from, propagating only on the next one.
//!
//! Grounded on `neuron-tool/src/middleware.rs`'s continuation-chaining
//! idiom, rebuilt directly against this crate's [`ToolDyn`]/[`ToolError`]
//! rather than the retrieved file's `neuron_types`-dependent `Next`/
//! `ToolMiddleware` pair, since every tool here is invoked exactly once per
//! call with no further chain to continue.

use crate::tool::{ToolError, ToolRegistry};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// What a recovery-wrapped tool call resolved to. Both variants feed the
/// iterator a `ToolResult` content string; only [`Self::invoke`]'s `Err`
/// (the `(max_retries + 1)`-th consecutive failure) halts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocationResult {
    /// The text to hand back to the model as the tool's result.
    pub content: String,
    /// Whether this result represents a (recovered) failure.
    pub is_error: bool,
}

/// Per-task tool-call recovery state. One instance is created per task
/// invocation; the consecutive-error counters do not outlive it.
pub struct RecoveryMiddleware {
    max_retries: u32,
    consecutive_errors: Mutex<HashMap<String, u32>>,
}

impl RecoveryMiddleware {
    /// Create a new recovery wrapper with the given per-tool-name retry
    /// budget (spec default 3).
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            consecutive_errors: Mutex::new(HashMap::new()),
        }
    }

    /// Look up and invoke `name` from `registry`, applying the recovery
    /// policy. Returns `Err` only once a tool name has failed
    /// `max_retries + 1` times in a row for this task.
    pub async fn invoke(
        &self,
        registry: &ToolRegistry,
        name: &str,
        input: serde_json::Value,
    ) -> Result<ToolInvocationResult, ToolError> {
        let outcome = match registry.get(name) {
            Some(tool) => tool.call(input).await,
            None => Err(ToolError::NotFound(name.to_string())),
        };

        match outcome {
            Ok(value) => {
                self.consecutive_errors.lock().await.remove(name);
                let content = value_to_result_text(&value);
                Ok(ToolInvocationResult {
                    content: if content.trim().is_empty() {
                        "[OK]".to_string()
                    } else {
                        content
                    },
                    is_error: false,
                })
            }
            Err(err) => {
                let mut counts = self.consecutive_errors.lock().await;
                let attempt = counts.entry(name.to_string()).or_insert(0);
                *attempt += 1;

                if *attempt > self.max_retries {
                    return Err(err);
                }

                Ok(ToolInvocationResult {
                    content: format!(
                        "[TOOL_ERROR] Tool \"{name}\" failed (attempt {attempt}/{}): {err}",
                        self.max_retries
                    ),
                    is_error: true,
                })
            }
        }
    }
}

fn value_to_result_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
