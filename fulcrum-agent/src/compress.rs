//! Cumulative conversation summarization (the "Compressor", spec §9).
//!
//! Grounded on `neuron-context/src/strategies.rs`'s `SlidingWindowStrategy`
//! (token-threshold trigger, `should_compact`/`compact` shape) and
//! `SummarizationStrategy` (summarize-then-splice), folded into a single
//! type since this workspace only needs the one compaction policy the spec
//! names rather than a pluggable strategy chain.

use crate::provider::{Provider, ProviderError};
use crate::wire::{ProviderMessage, ProviderRequest, Role as WireRole};
use fulcrum_core::{Message, Role};

const SUMMARIZATION_SYSTEM_PROMPT: &str = "Summarize the conversation so far concisely. \
Focus on key information, decisions made, and results from tool calls. Write in third person.";

/// Estimates token counts for a message history. A real deployment would
/// swap this for the provider's own tokenizer; the heuristic here (roughly
/// 4 characters per token, plus a small per-message overhead) is good
/// enough to decide whether to trigger compaction.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| m.content.len() / 4 + 4)
        .sum()
}

/// Drives the spec's compaction policy: trigger at `compaction_threshold`
/// of the provider's context window, summarize the oldest two-thirds
/// (folding in any prior summary), and splice the result back in as a
/// single synthetic system message ahead of the preserved recent third.
pub struct Compressor {
    threshold: f32,
}

impl Compressor {
    /// Construct a compressor that triggers at `threshold` (0.0-1.0) of the
    /// provider's context window (spec default 0.8).
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Whether compaction should run given the estimated token count and
    /// the provider's context window.
    pub fn should_compact(&self, estimated_tokens: usize, context_window: usize) -> bool {
        estimated_tokens as f32 > self.threshold * context_window as f32
    }

    /// Summarize the oldest two-thirds of `messages` (merged with
    /// `previous_summary` if present) via `provider`, returning the
    /// replacement message list: one synthetic system message carrying the
    /// new summary, followed by the preserved recent third.
    ///
    /// A failed summarization call falls back to straight truncation —
    /// the oldest two-thirds are dropped without being folded into a
    /// summary (spec §9: "A failure of the summarization call falls back
    /// to straight truncation").
    pub async fn compact(
        &self,
        messages: Vec<Message>,
        previous_summary: Option<&str>,
        provider: &impl Provider,
    ) -> (Vec<Message>, Option<String>) {
        if messages.is_empty() {
            return (messages, previous_summary.map(str::to_string));
        }

        let split_at = messages.len() - (messages.len() / 3);
        let (old, recent) = messages.split_at(split_at);
        if old.is_empty() {
            return (messages, previous_summary.map(str::to_string));
        }

        match self.summarize(old, previous_summary, provider).await {
            Ok(summary) => {
                let summary_message = Message::new(
                    Role::System,
                    format!("[Summary of earlier conversation]\n{summary}"),
                );
                let mut result = vec![summary_message];
                result.extend(recent.iter().cloned());
                (result, Some(summary))
            }
            Err(_) => (recent.to_vec(), previous_summary.map(str::to_string)),
        }
    }

    async fn summarize(
        &self,
        old: &[Message],
        previous_summary: Option<&str>,
        provider: &impl Provider,
    ) -> Result<String, ProviderError> {
        let mut wire_messages = Vec::with_capacity(old.len() + 1);
        if let Some(summary) = previous_summary {
            wire_messages.push(ProviderMessage::text(
                WireRole::User,
                format!("[Previous summary]\n{summary}"),
            ));
        }
        for message in old {
            wire_messages.push(ProviderMessage::text(to_wire_role(message.role), message.content.clone()));
        }

        let request = ProviderRequest {
            model: None,
            messages: wire_messages,
            tools: Vec::new(),
            max_tokens: Some(1024),
            system: Some(SUMMARIZATION_SYSTEM_PROMPT.to_string()),
        };

        let response = provider.complete(request).await?;
        Ok(response.text())
    }
}

fn to_wire_role(role: Role) -> WireRole {
    match role {
        Role::System => WireRole::System,
        Role::User | Role::Tool => WireRole::User,
        Role::Assistant => WireRole::Assistant,
    }
}
