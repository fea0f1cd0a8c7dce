//! The Lesson Extractor's data shape and the three seams it calls through
//! (spec §4.7 "Lesson Extractor"): a summarizer, an existing-memory
//! retriever, and a long-term memory store. None of these are part of
//! `fulcrum-core`'s four durable entities — they are specific to this one
//! daemon, so they live here rather than widening the core's shared model.

use crate::error::DaemonError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One JSON-structured takeaway extracted from a completed task's output
/// (spec §4.7: "up-to-three JSON-structured lessons").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    /// The lesson text.
    pub content: String,
    /// Free-form tags the summarizer attaches, for later retrieval.
    pub tags: Vec<String>,
}

/// Turns a task's (truncated) output into up to three candidate lessons.
#[async_trait]
pub trait LessonSummarizer: Send + Sync {
    /// Summarize `text` into at most three lessons. An empty result is not
    /// an error — not every completed task teaches something reusable.
    async fn summarize(&self, text: &str) -> Result<Vec<Lesson>, DaemonError>;
}

/// Looks up the most similar lesson already in long-term memory, so the
/// extractor can skip near-duplicates (spec §4.7: "similarity score >= 0.65
/// => skip").
#[async_trait]
pub trait LessonRetriever: Send + Sync {
    /// The similarity score of the closest existing lesson to `candidate`,
    /// or `None` if memory is empty.
    async fn most_similar(&self, candidate: &Lesson) -> Result<Option<f32>, DaemonError>;
}

/// Durable store for lessons that survived deduplication.
#[async_trait]
pub trait LessonMemory: Send + Sync {
    /// Persist a lesson.
    async fn store(&self, lesson: Lesson) -> Result<(), DaemonError>;
}

/// Threshold above which a candidate lesson is considered a near-duplicate
/// of something already in memory (spec §4.7).
pub const DEDUP_SIMILARITY_THRESHOLD: f32 = 0.65;

/// Output is truncated to roughly this many bytes before summarization
/// (spec §4.7: "truncates to ~4 KB").
pub const OUTPUT_TRUNCATION_BYTES: usize = 4096;
