//! Lesson Extractor (spec §4.7): on `task.completed`, turns a task's output
//! into reusable lessons and writes the non-duplicate ones into long-term
//! memory.

use crate::lesson::{LessonMemory, LessonRetriever, LessonSummarizer, DEDUP_SIMILARITY_THRESHOLD, OUTPUT_TRUNCATION_BYTES};
use fulcrum_core::event::TaskLifecyclePhase;
use fulcrum_core::{Event, EventPayload, EventSubscriber, TaskStore};
use std::sync::Arc;
use tracing::warn;

/// Subscribes to the bus and, on every `task.completed` event, summarizes
/// the task's output into lessons and persists the ones not already
/// covered by existing memory.
pub struct LessonExtractor {
    task_store: Arc<dyn TaskStore>,
    summarizer: Arc<dyn LessonSummarizer>,
    retriever: Arc<dyn LessonRetriever>,
    memory: Arc<dyn LessonMemory>,
}

impl LessonExtractor {
    /// Build a lesson extractor over the given task store and the three
    /// pluggable seams from [`crate::lesson`].
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        summarizer: Arc<dyn LessonSummarizer>,
        retriever: Arc<dyn LessonRetriever>,
        memory: Arc<dyn LessonMemory>,
    ) -> Self {
        Self { task_store, summarizer, retriever, memory }
    }

    /// Consume events from `subscriber` until the bus closes. Meant to be
    /// spawned once at startup.
    pub async fn run(self, mut subscriber: EventSubscriber) {
        while let Some(event) = subscriber.recv_matching(&["task.completed"]).await {
            self.handle(&event).await;
        }
    }

    async fn handle(&self, event: &Event) {
        let EventPayload::TaskLifecycle { phase, .. } = &event.payload else {
            return;
        };
        if *phase != TaskLifecyclePhase::Completed {
            return;
        }
        let Some(task_id) = &event.task_id else {
            return;
        };

        let output = match self.task_store.read_output(task_id).await {
            Ok(Some(output)) => output,
            Ok(None) => return,
            Err(err) => {
                warn!(%task_id, error = %err, "lesson extractor: failed to read task output");
                return;
            }
        };
        let truncated = truncate_to_bytes(&output, OUTPUT_TRUNCATION_BYTES);

        let lessons = match self.summarizer.summarize(truncated).await {
            Ok(lessons) => lessons,
            Err(err) => {
                warn!(%task_id, error = %err, "lesson extractor: summarization failed");
                return;
            }
        };

        for lesson in lessons.into_iter().take(3) {
            match self.retriever.most_similar(&lesson).await {
                Ok(Some(score)) if score >= DEDUP_SIMILARITY_THRESHOLD => {
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%task_id, error = %err, "lesson extractor: retriever lookup failed, storing anyway");
                }
            }
            if let Err(err) = self.memory.store(lesson).await {
                warn!(%task_id, error = %err, "lesson extractor: failed to persist lesson");
            }
        }
    }
}

/// Truncate `s` to at most `max_bytes` bytes, respecting UTF-8 character
/// boundaries rather than splitting one in half.
fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
