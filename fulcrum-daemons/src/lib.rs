#![deny(missing_docs)]
//! Cross-cutting bus subscribers (spec §4.7 "Cross-Cutting Subscribers"):
//! three thin daemons plus the Supplement B heartbeat publisher.
//!
//! Grounded on `neuron-hooks`' "dispatch, log the error, keep going"
//! discipline (applied here to bus subscription instead of hook dispatch)
//! and `taskdaemon`'s `events/logger.rs` subscribe-then-loop shape
//! (`fn new(...)`, `async fn run(self, ...)` meant to be spawned, matched
//! against `subscriber.recv()` until the bus closes).
//!
//! - [`cost_tracker::CostTracker`] — session token accounting.
//! - [`crash_recovery::recover`] — one-shot startup requeue of orphaned
//!   `running` tasks; not a subscriber, since it must finish before the
//!   scheduler launches anything.
//! - [`lesson_extractor::LessonExtractor`] — task-output summarization into
//!   long-term memory.
//! - [`heartbeat::HeartbeatPublisher`] — periodic capacity snapshot.

pub mod cost_tracker;
pub mod crash_recovery;
pub mod error;
pub mod heartbeat;
pub mod lesson;
pub mod lesson_extractor;

pub use cost_tracker::CostTracker;
pub use crash_recovery::recover;
pub use error::DaemonError;
pub use heartbeat::{HeartbeatPublisher, DEFAULT_INTERVAL_SECS};
pub use lesson::{Lesson, LessonMemory, LessonRetriever, LessonSummarizer, DEDUP_SIMILARITY_THRESHOLD, OUTPUT_TRUNCATION_BYTES};
pub use lesson_extractor::LessonExtractor;
