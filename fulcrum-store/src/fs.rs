//! Filesystem-backed `SessionStore`/`TaskStore`, grounded on
//! `neuron-state-fs`'s directory-per-entity layout. Extended beyond the
//! teacher's version with atomic tmp-then-rename metadata writes and
//! durable append-only JSONL logs, since the teacher only ever needed a
//! whole-value overwrite.
//!
//! Directory layout:
//! ```text
//! root/
//!   sessions/<encoded-id>/meta.json
//!   sessions/<encoded-id>/messages.jsonl
//!   tasks/<encoded-id>/meta.json
//!   tasks/<encoded-id>/checkpoints.jsonl
//!   tasks/<encoded-id>/mailbox.jsonl
//!   tasks/<encoded-id>/output.txt
//! ```

use async_trait::async_trait;
use fulcrum_core::{
    Checkpoint, MailboxMessage, Message, Session, SessionId, SessionStore, StoreError, Task,
    TaskId, TaskStore,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

const ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'%')
    .add(b' ');

fn encode_id(id: &str) -> String {
    utf8_percent_encode(id, ENCODE_SET).to_string()
}

fn decode_id(encoded: &str) -> Option<String> {
    percent_decode_str(encoded).decode_utf8().ok().map(|s| s.into_owned())
}

/// Filesystem-backed store implementing both [`SessionStore`] and [`TaskStore`].
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a new filesystem store rooted at the given directory. The
    /// directory tree is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join("sessions").join(encode_id(id.as_str()))
    }

    fn task_dir(&self, id: &TaskId) -> PathBuf {
        self.root.join("tasks").join(encode_id(id.as_str()))
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::WriteFailed(e.to_string()))
}

/// Write `value` to `path` atomically: serialize to a sibling `.tmp` file,
/// flush and sync it, then rename over the destination.
async fn write_meta_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().expect("meta path always has a parent");
    ensure_dir(dir).await?;

    let tmp_path = path.with_extension("json.tmp");
    let contents = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)
        .await
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
    file.write_all(&contents)
        .await
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
    file.sync_all().await.map_err(|e| StoreError::WriteFailed(e.to_string()))?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::WriteFailed(e.to_string()))
}

async fn read_meta<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::WriteFailed(e.to_string())),
    }
}

/// Append one JSON-serialized line to `path`, syncing before returning so a
/// successful append is durable (spec §4.2's durability invariant).
async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().expect("log path always has a parent");
    ensure_dir(dir).await?;

    let mut line = serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| StoreError::AppendFailed(e.to_string()))?;
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| StoreError::AppendFailed(e.to_string()))?;
    file.sync_data().await.map_err(|e| StoreError::AppendFailed(e.to_string()))
}

/// Read every line of an append-only log. A trailing partial/corrupt line
/// (e.g. a process killed mid-append) is skipped rather than failing the
/// whole read (spec §4.2).
async fn read_log<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::WriteFailed(e.to_string())),
    };

    let mut out = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(value) => out.push(value),
            Err(_) => continue,
        }
    }
    Ok(out)
}

async fn list_ids(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::WriteFailed(e.to_string())),
    };

    let mut ids = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::WriteFailed(e.to_string()))?
    {
        if let Some(name) = entry.file_name().to_str() {
            if let Some(id) = decode_id(name) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

#[async_trait]
impl SessionStore for FsStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let dir = self.session_dir(&session.id);
        if tokio::fs::try_exists(dir.join("meta.json")).await.unwrap_or(false) {
            return Err(StoreError::WriteFailed(format!(
                "session {} already exists",
                session.id
            )));
        }
        write_meta_atomic(&dir.join("meta.json"), &session).await
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        read_meta(&self.session_dir(id).join("meta.json")).await
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        write_meta_atomic(&self.session_dir(&session.id).join("meta.json"), session).await
    }

    async fn append_message(&self, id: &SessionId, message: Message) -> Result<(), StoreError> {
        append_line(&self.session_dir(id).join("messages.jsonl"), &message).await
    }

    async fn messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
        read_log(&self.session_dir(id).join("messages.jsonl")).await
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        Ok(list_ids(&self.root.join("sessions"))
            .await?
            .into_iter()
            .map(SessionId::new)
            .collect())
    }
}

#[async_trait]
impl TaskStore for FsStore {
    async fn create(&self, task: Task) -> Result<(), StoreError> {
        let dir = self.task_dir(&task.id);
        if tokio::fs::try_exists(dir.join("meta.json")).await.unwrap_or(false) {
            return Err(StoreError::WriteFailed(format!("task {} already exists", task.id)));
        }
        write_meta_atomic(&dir.join("meta.json"), &task).await
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        read_meta(&self.task_dir(id).join("meta.json")).await
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        write_meta_atomic(&self.task_dir(&task.id).join("meta.json"), task).await
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks = Vec::new();
        for id in list_ids(&self.root.join("tasks")).await? {
            if let Some(task) = self.get(&TaskId::new(id)).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn append_checkpoint(&self, id: &TaskId, checkpoint: Checkpoint) -> Result<(), StoreError> {
        append_line(&self.task_dir(id).join("checkpoints.jsonl"), &checkpoint).await
    }

    async fn checkpoints(&self, id: &TaskId) -> Result<Vec<Checkpoint>, StoreError> {
        read_log(&self.task_dir(id).join("checkpoints.jsonl")).await
    }

    async fn append_mailbox(&self, id: &TaskId, message: MailboxMessage) -> Result<(), StoreError> {
        append_line(&self.task_dir(id).join("mailbox.jsonl"), &message).await
    }

    async fn mailbox(&self, id: &TaskId) -> Result<Vec<MailboxMessage>, StoreError> {
        read_log(&self.task_dir(id).join("mailbox.jsonl")).await
    }

    async fn write_output(&self, id: &TaskId, content: &str) -> Result<(), StoreError> {
        let dir = self.task_dir(id);
        ensure_dir(&dir).await?;
        tokio::fs::write(dir.join("output.txt"), content)
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }

    async fn read_output(&self, id: &TaskId) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.task_dir(id).join("output.txt")).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::WriteFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_core::{CheckpointKind, Role};

    #[tokio::test]
    async fn session_meta_survives_a_fresh_store_handle() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(SessionId::new("s1"));
        {
            let store = FsStore::new(dir.path());
            SessionStore::create(&store, session.clone()).await.unwrap();
        }
        let reopened = FsStore::new(dir.path());
        let fetched = SessionStore::get(&reopened, &session.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[tokio::test]
    async fn creating_duplicate_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let session = Session::new(SessionId::new("dup"));
        SessionStore::create(&store, session.clone()).await.unwrap();
        assert!(SessionStore::create(&store, session).await.is_err());
    }

    #[tokio::test]
    async fn messages_append_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let id = SessionId::new("s1");
        SessionStore::create(&store, Session::new(id.clone())).await.unwrap();

        store.append_message(&id, Message::new(Role::User, "hi")).await.unwrap();
        store.append_message(&id, Message::new(Role::Assistant, "hello")).await.unwrap();

        let messages = store.messages(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn corrupt_trailing_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let id = SessionId::new("s1");
        SessionStore::create(&store, Session::new(id.clone())).await.unwrap();
        store.append_message(&id, Message::new(Role::User, "good")).await.unwrap();

        let log_path = dir.path().join("sessions").join(encode_id("s1")).join("messages.jsonl");
        let mut file = OpenOptions::new().append(true).open(&log_path).await.unwrap();
        file.write_all(b"{not valid json\n").await.unwrap();

        let messages = store.messages(&id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "good");
    }

    #[tokio::test]
    async fn ids_with_path_like_characters_roundtrip_through_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let id = SessionId::new("weird/id with spaces:colon");
        SessionStore::create(&store, Session::new(id.clone())).await.unwrap();

        let listed = SessionStore::list(&store).await.unwrap();
        assert!(listed.contains(&id));
    }

    #[tokio::test]
    async fn task_checkpoints_mailbox_and_output_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let id = TaskId::new("t1");
        TaskStore::create(&store, Task::new(id.clone(), "title", "desc")).await.unwrap();

        TaskStore::append_checkpoint(&store, &id, Checkpoint::new(CheckpointKind::StepStarted, "begin"))
            .await
            .unwrap();
        assert_eq!(TaskStore::checkpoints(&store, &id).await.unwrap().len(), 1);

        TaskStore::write_output(&store, &id, "result").await.unwrap();
        assert_eq!(
            TaskStore::read_output(&store, &id).await.unwrap().as_deref(),
            Some("result")
        );
    }

    #[tokio::test]
    async fn listing_tasks_reads_every_meta_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        TaskStore::create(&store, Task::new(TaskId::new("a"), "a", "")).await.unwrap();
        TaskStore::create(&store, Task::new(TaskId::new("b"), "b", "")).await.unwrap();

        let tasks = TaskStore::list(&store).await.unwrap();
        assert_eq!(tasks.len(), 2);
    }
}
