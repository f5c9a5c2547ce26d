//! Task table: creation, optimistic-locked updates, queries.

use chrono::Utc;
use tracing::debug;

use warden_core::{GovTask, GroupId, ProductId, TaskId, TaskPatch, TaskScope, TaskState};

use crate::error::StoreResult;
use crate::store::GovStore;

impl GovStore {
    /// Insert a new task row.
    ///
    /// Returns `false` if a task with the same id already exists
    /// (tasks are never hard-deleted, so an id is claimed forever).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn create_task(&self, task: &GovTask) -> StoreResult<bool> {
        let created = self
            .tasks
            .put_json_if_absent(task.id.as_str(), task)
            .await?;
        if created {
            debug!(task = %task.id, state = %task.state, "task created");
        }
        Ok(created)
    }

    /// Fetch a task by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the row is corrupt.
    pub async fn get_task(&self, id: &TaskId) -> StoreResult<Option<GovTask>> {
        Ok(self.tasks.get_json(id.as_str()).await?)
    }

    /// Apply a patch iff the stored version matches `expected_version`.
    ///
    /// The compare and the write run inside the writer lock, which is
    /// what makes this the conditional UPDATE the optimistic-concurrency
    /// discipline relies on. On success the version increments by one
    /// and `updated_at` is refreshed. Returns `false` on a version
    /// mismatch or a missing task — the caller sees both as losing the
    /// race.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn update_task(
        &self,
        id: &TaskId,
        expected_version: u64,
        patch: &TaskPatch,
    ) -> StoreResult<bool> {
        let _guard = self.write.lock().await;
        let Some(mut task) = self.tasks.get_json::<GovTask>(id.as_str()).await? else {
            return Ok(false);
        };
        if task.version != expected_version {
            debug!(
                task = %id,
                expected = expected_version,
                current = task.version,
                "optimistic update lost"
            );
            return Ok(false);
        }
        patch.apply(&mut task);
        task.version += 1;
        task.updated_at = Utc::now();
        self.tasks.put_json(id.as_str(), &task).await?;
        Ok(true)
    }

    /// All task rows. Candidate sets are control-plane sized; queries
    /// scan and filter rather than maintaining secondary indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or a row is corrupt.
    pub async fn list_tasks(&self) -> StoreResult<Vec<GovTask>> {
        let mut tasks = Vec::new();
        for key in self.tasks.list_keys().await? {
            if let Some(task) = self.tasks.get_json::<GovTask>(&key).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Tasks currently in `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn tasks_by_state(&self, state: TaskState) -> StoreResult<Vec<GovTask>> {
        Ok(self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.state == state)
            .collect())
    }

    /// Tasks assigned to `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn tasks_by_group(&self, group: &GroupId) -> StoreResult<Vec<GovTask>> {
        Ok(self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.assigned_group.as_ref() == Some(group))
            .collect())
    }

    /// Tasks belonging to `product`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn tasks_by_product(&self, product: &ProductId) -> StoreResult<Vec<GovTask>> {
        Ok(self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.product_id.as_ref() == Some(product))
            .collect())
    }

    /// Tasks in the given scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn tasks_by_scope(&self, scope: TaskScope) -> StoreResult<Vec<GovTask>> {
        Ok(self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.scope == scope)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use warden_core::{Priority, TaskType};

    fn sample_task(id: &str, state: TaskState) -> GovTask {
        GovTask {
            id: TaskId::from(id),
            title: format!("task {id}"),
            description: String::new(),
            task_type: TaskType::Feature,
            priority: Priority::P2,
            state,
            gate: None,
            scope: TaskScope::Company,
            product_id: None,
            assigned_group: Some(GroupId::from("developer")),
            executor: None,
            created_by: "test".into(),
            dod_required: false,
            metadata: Map::new(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotency_guarded() {
        let store = GovStore::in_memory();
        let task = sample_task("T1", TaskState::Inbox);
        assert!(store.create_task(&task).await.unwrap());
        assert!(!store.create_task(&task).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_bumps_version_only_on_match() {
        let store = GovStore::in_memory();
        let task = sample_task("T1", TaskState::Ready);
        store.create_task(&task).await.unwrap();

        let patch = TaskPatch::to_state(TaskState::Doing);
        assert!(store.update_task(&task.id, 0, &patch).await.unwrap());

        let stored = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Doing);
        assert_eq!(stored.version, 1);

        // Stale expected version loses.
        assert!(!store.update_task(&task.id, 0, &patch).await.unwrap());
        let stored = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_update_missing_task_returns_false() {
        let store = GovStore::in_memory();
        let patch = TaskPatch::to_state(TaskState::Doing);
        assert!(!store.update_task(&TaskId::from("nope"), 0, &patch).await.unwrap());
    }

    #[tokio::test]
    async fn test_versions_strictly_increase_across_history() {
        let store = GovStore::in_memory();
        let task = sample_task("T1", TaskState::Inbox);
        store.create_task(&task).await.unwrap();

        let path = [
            TaskState::Triaged,
            TaskState::Ready,
            TaskState::Doing,
            TaskState::Review,
        ];
        for (i, state) in path.iter().enumerate() {
            let patch = TaskPatch::to_state(*state);
            assert!(store.update_task(&task.id, i as u64, &patch).await.unwrap());
            let stored = store.get_task(&task.id).await.unwrap().unwrap();
            assert_eq!(stored.version, i as u64 + 1);
        }
    }

    #[tokio::test]
    async fn test_queries_filter() {
        let store = GovStore::in_memory();
        store.create_task(&sample_task("T1", TaskState::Ready)).await.unwrap();
        store.create_task(&sample_task("T2", TaskState::Ready)).await.unwrap();
        store.create_task(&sample_task("T3", TaskState::Doing)).await.unwrap();

        assert_eq!(store.tasks_by_state(TaskState::Ready).await.unwrap().len(), 2);
        assert_eq!(
            store.tasks_by_group(&GroupId::from("developer")).await.unwrap().len(),
            3
        );
        assert_eq!(
            store.tasks_by_scope(TaskScope::Product).await.unwrap().len(),
            0
        );
    }

    #[tokio::test]
    async fn test_concurrent_updates_one_winner() {
        use std::sync::Arc;
        let store = Arc::new(GovStore::in_memory());
        let task = sample_task("T2", TaskState::Review);
        store.create_task(&task).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            let id = task.id.clone();
            tokio::spawn(async move {
                store
                    .update_task(&id, 0, &TaskPatch::to_state(TaskState::Approval))
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = Arc::clone(&store);
            let id = task.id.clone();
            tokio::spawn(async move {
                store
                    .update_task(&id, 0, &TaskPatch::to_state(TaskState::Approval))
                    .await
                    .unwrap()
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one concurrent update must win");
        let stored = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }
}
