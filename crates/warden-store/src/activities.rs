//! Activity log: append-only, totally ordered per task.

use chrono::Utc;

use warden_core::{ActivityAction, ActivityId, GovActivity, TaskId, TaskState};

use crate::error::StoreResult;
use crate::store::{GovStore, SEP};

/// Zero-padded sequence width; keeps lexicographic key order equal to
/// numeric order for any realistic task history.
const SEQ_WIDTH: usize = 10;

fn activity_key(task: &TaskId, seq: u64) -> String {
    format!("{}{}{:0width$}", task.as_str(), SEP, seq, width = SEQ_WIDTH)
}

impl GovStore {
    /// Append one activity row for a task.
    ///
    /// The per-task sequence number is assigned inside the writer lock,
    /// so per-task activities are totally ordered no matter how many
    /// components log concurrently. Rows are never updated or deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn append_activity(
        &self,
        task_id: &TaskId,
        action: ActivityAction,
        from_state: Option<TaskState>,
        to_state: Option<TaskState>,
        actor: &str,
        reason: Option<String>,
    ) -> StoreResult<GovActivity> {
        let _guard = self.write.lock().await;
        let seq = self
            .activity_seq
            .get_json::<u64>(task_id.as_str())
            .await?
            .unwrap_or(0)
            + 1;

        let activity = GovActivity {
            id: ActivityId::new(),
            task_id: task_id.clone(),
            seq,
            action,
            from_state,
            to_state,
            actor: actor.to_string(),
            reason,
            at: Utc::now(),
        };

        self.activities
            .put_json(&activity_key(task_id, seq), &activity)
            .await?;
        self.activity_seq.put_json(task_id.as_str(), &seq).await?;
        Ok(activity)
    }

    /// All activities for a task, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn activities_for(&self, task_id: &TaskId) -> StoreResult<Vec<GovActivity>> {
        let prefix = format!("{}{}", task_id.as_str(), SEP);
        let mut rows = Vec::new();
        for key in self.activities.list_keys().await? {
            if key.starts_with(&prefix)
                && let Some(row) = self.activities.get_json::<GovActivity>(&key).await?
            {
                rows.push(row);
            }
        }
        rows.sort_by_key(|a| a.seq);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_is_dense_and_ordered() {
        let store = GovStore::in_memory();
        let task = TaskId::from("T1");

        for i in 0..5 {
            store
                .append_activity(
                    &task,
                    ActivityAction::Transition,
                    Some(TaskState::Ready),
                    Some(TaskState::Doing),
                    "system",
                    Some(format!("tick {i}")),
                )
                .await
                .unwrap();
        }

        let rows = store.activities_for(&task).await.unwrap();
        assert_eq!(rows.len(), 5);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.seq, i as u64 + 1);
        }
    }

    #[tokio::test]
    async fn test_tasks_do_not_share_sequences() {
        let store = GovStore::in_memory();
        let t1 = TaskId::from("T1");
        let t12 = TaskId::from("T12");

        store
            .append_activity(&t1, ActivityAction::Create, None, None, "admin", None)
            .await
            .unwrap();
        store
            .append_activity(&t12, ActivityAction::Create, None, None, "admin", None)
            .await
            .unwrap();

        assert_eq!(store.activities_for(&t1).await.unwrap().len(), 1);
        assert_eq!(store.activities_for(&t12).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_never_collide() {
        use std::sync::Arc;
        let store = Arc::new(GovStore::in_memory());
        let task = TaskId::from("T1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let task = task.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_activity(&task, ActivityAction::Evidence, None, None, "dev", None)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let rows = store.activities_for(&task).await.unwrap();
        assert_eq!(rows.len(), 8);
        let seqs: Vec<u64> = rows.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
    }
}
