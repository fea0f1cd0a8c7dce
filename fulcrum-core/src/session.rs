//! Session and message data model, and the `SessionStore` protocol trait
//! (spec §3 "Session"/"Message", §4.2).

use crate::duration::Timestamp;
use crate::error::StoreError;
use crate::id::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Open for further messages.
    Active,
    /// No further messages expected.
    Closed,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A human user.
    User,
    /// The LLM assistant.
    Assistant,
    /// A system-role message (instructions, or a compaction summary).
    System,
    /// A tool-role message carrying a tool's result.
    Tool,
}

/// One entry in a session's append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who authored it.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// When it was appended.
    pub timestamp: Timestamp,
}

impl Message {
    /// Construct a message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Durable per-session metadata (spec §3 "Session").
///
/// *Invariant:* messages are append-only; `summary_up_to <= message_count`;
/// messages past `summary_up_to` form the tail that is not summarized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// When the session was created.
    pub created_at: Timestamp,
    /// When the session was last modified.
    pub updated_at: Timestamp,
    /// Active or closed.
    pub status: SessionStatus,
    /// Working directory agent turns for this session execute against.
    pub working_directory: Option<String>,
    /// Preferred response language, if set.
    pub language: Option<String>,
    /// A user-facing title.
    pub title: Option<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
    /// Total messages ever appended.
    pub message_count: u64,
    /// Cumulative input tokens across all turns (maintained by the Cost
    /// Tracker daemon, spec §4.7).
    pub tokens_in: u64,
    /// Cumulative output tokens across all turns.
    pub tokens_out: u64,
    /// Rolling compaction summary, if the history has ever been compacted.
    pub summary: Option<String>,
    /// Number of original messages folded into `summary`.
    pub summary_up_to: u64,
}

impl Session {
    /// Construct a new, empty, active session.
    pub fn new(id: SessionId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            status: SessionStatus::Active,
            working_directory: None,
            language: None,
            title: None,
            metadata: HashMap::new(),
            message_count: 0,
            tokens_in: 0,
            tokens_out: 0,
            summary: None,
            summary_up_to: 0,
        }
    }
}

/// Durable store for sessions and their message logs (spec §4.2).
///
/// Implementations perform atomic `meta` rewrite (write-to-tmp + rename) and
/// append-only writes for the message log; a successful `append_message`
/// must be durable before it returns.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session. Errors if one with the same id already exists.
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    /// Fetch a session's metadata, or `None` if it does not exist.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Atomically rewrite a session's metadata.
    async fn update(&self, session: &Session) -> Result<(), StoreError>;

    /// Append one message to the session's log. Callers are responsible for
    /// bumping `message_count`/`updated_at` via a subsequent `update`.
    async fn append_message(&self, id: &SessionId, message: Message) -> Result<(), StoreError>;

    /// The full message log, in append order. A partial/corrupt trailing
    /// line is skipped rather than erroring the whole read.
    async fn messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError>;

    /// All known session ids.
    async fn list(&self) -> Result<Vec<SessionId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active_and_empty() {
        let s = Session::new(SessionId::new("s1"));
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.message_count, 0);
        assert_eq!(s.summary_up_to, 0);
    }

    #[test]
    fn message_constructor_stamps_timestamp() {
        let m = Message::new(Role::User, "hello");
        assert_eq!(m.content, "hello");
        assert!(m.timestamp.as_millis() > 0);
    }
}
