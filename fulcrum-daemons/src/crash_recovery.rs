//! Crash Recovery (spec §4.7): on process start, resets any task left in
//! `running` back to `pending` so the scheduler picks it up again.
//!
//! Unlike the other daemons in this crate, this one is not a bus
//! subscriber — it runs once, synchronously, before the scheduler starts,
//! so no task can be launched on an actor while recovery is still deciding
//! what `running` means from a previous process's crash.

use fulcrum_core::{Checkpoint, CheckpointKind, StoreError, TaskStatus, TaskStore};
use tracing::info;

/// Scan `task_store` for tasks stuck in `running` from a previous process
/// and reset them to `pending`, appending a `recovery` checkpoint to each.
///
/// Idempotent: a second call against an already-recovered store finds
/// nothing to do and returns `0`.
pub async fn recover(task_store: &dyn TaskStore) -> Result<u32, StoreError> {
    let tasks = task_store.list().await?;
    let mut recovered = 0;

    for mut task in tasks.into_iter().filter(|t| t.status == TaskStatus::Running) {
        task.status = TaskStatus::Pending;
        task_store.update(&task).await?;
        task_store
            .append_checkpoint(
                &task.id,
                Checkpoint::new(CheckpointKind::Recovery, "reset from running to pending on startup"),
            )
            .await?;
        info!(task = %task.id, "crash recovery: requeued running task");
        recovered += 1;
    }

    Ok(recovered)
}
