//! In-memory `SessionStore`/`TaskStore` backed by `RwLock<HashMap<..>>`,
//! grounded on `neuron-state-memory`'s pattern. Suitable for tests and
//! ephemeral runs; nothing here survives a process restart.

use async_trait::async_trait;
use fulcrum_core::{
    Checkpoint, MailboxMessage, Message, Session, SessionId, SessionStore, StoreError, Task,
    TaskId, TaskStore,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory store implementing both [`SessionStore`] and [`TaskStore`].
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    session_messages: RwLock<HashMap<SessionId, Vec<Message>>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    checkpoints: RwLock<HashMap<TaskId, Vec<Checkpoint>>>,
    mailbox: RwLock<HashMap<TaskId, Vec<MailboxMessage>>>,
    outputs: RwLock<HashMap<TaskId, String>>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::WriteFailed(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn append_message(&self, id: &SessionId, message: Message) -> Result<(), StoreError> {
        self.session_messages
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .session_messages
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::WriteFailed(format!(
                "task {} already exists",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn append_checkpoint(&self, id: &TaskId, checkpoint: Checkpoint) -> Result<(), StoreError> {
        self.checkpoints
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn checkpoints(&self, id: &TaskId) -> Result<Vec<Checkpoint>, StoreError> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_mailbox(&self, id: &TaskId, message: MailboxMessage) -> Result<(), StoreError> {
        self.mailbox
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn mailbox(&self, id: &TaskId) -> Result<Vec<MailboxMessage>, StoreError> {
        Ok(self.mailbox.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn write_output(&self, id: &TaskId, content: &str) -> Result<(), StoreError> {
        self.outputs
            .write()
            .await
            .insert(id.clone(), content.to_string());
        Ok(())
    }

    async fn read_output(&self, id: &TaskId) -> Result<Option<String>, StoreError> {
        Ok(self.outputs.read().await.get(id).cloned())
    }
}
