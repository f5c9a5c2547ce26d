//! Worker host table and the WIP counter.

use tracing::debug;

use warden_core::{GroupId, WorkerId, WorkerRecord, WorkerStatus};

use crate::error::StoreResult;
use crate::store::GovStore;

impl GovStore {
    /// Insert or replace a worker row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn upsert_worker(&self, worker: &WorkerRecord) -> StoreResult<()> {
        Ok(self.workers.put_json(worker.id.as_str(), worker).await?)
    }

    /// Fetch a worker by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get_worker(&self, id: &WorkerId) -> StoreResult<Option<WorkerRecord>> {
        Ok(self.workers.get_json(id.as_str()).await?)
    }

    /// All registered workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_workers(&self) -> StoreResult<Vec<WorkerRecord>> {
        let mut rows = Vec::new();
        for key in self.workers.list_keys().await? {
            if let Some(row) = self.workers.get_json::<WorkerRecord>(&key).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// The first online worker serving `group`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn worker_for_group(&self, group: &GroupId) -> StoreResult<Option<WorkerRecord>> {
        Ok(self
            .list_workers()
            .await?
            .into_iter()
            .find(|w| w.status == WorkerStatus::Online && w.serves(group)))
    }

    /// Adjust a worker's WIP counter by `delta`, clamped at zero.
    ///
    /// Runs inside the writer lock together with the dispatch-row update
    /// the caller makes around it; this is the only code path that
    /// writes `current_wip`. Returns the new counter, or `None` if the
    /// worker does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn adjust_worker_wip(
        &self,
        id: &WorkerId,
        delta: i64,
    ) -> StoreResult<Option<u32>> {
        let _guard = self.write.lock().await;
        let Some(mut worker) = self.workers.get_json::<WorkerRecord>(id.as_str()).await? else {
            return Ok(None);
        };
        let wip = i64::from(worker.current_wip) + delta;
        worker.current_wip = u32::try_from(wip.max(0)).unwrap_or(0);
        self.workers.put_json(id.as_str(), &worker).await?;
        debug!(worker = %id, wip = worker.current_wip, "worker wip adjusted");
        Ok(Some(worker.current_wip))
    }

    /// Mark a worker online or offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn set_worker_status(
        &self,
        id: &WorkerId,
        status: WorkerStatus,
    ) -> StoreResult<bool> {
        let _guard = self.write.lock().await;
        let Some(mut worker) = self.workers.get_json::<WorkerRecord>(id.as_str()).await? else {
            return Ok(false);
        };
        worker.status = status;
        self.workers.put_json(id.as_str(), &worker).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str, groups: &[&str]) -> WorkerRecord {
        WorkerRecord {
            id: WorkerId::new(id),
            ssh_host: None,
            ssh_user: None,
            ssh_identity_file: None,
            local_port: 8800,
            remote_port: 8800,
            max_wip: 2,
            current_wip: 0,
            status: WorkerStatus::Online,
            shared_secret: "s".into(),
            groups: groups.iter().map(|g| GroupId::from(*g)).collect(),
        }
    }

    #[tokio::test]
    async fn test_worker_for_group_skips_offline() {
        let store = GovStore::in_memory();
        let mut offline = worker("w1", &["developer"]);
        offline.status = WorkerStatus::Offline;
        store.upsert_worker(&offline).await.unwrap();
        store.upsert_worker(&worker("w2", &["developer"])).await.unwrap();

        let found = store
            .worker_for_group(&GroupId::from("developer"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, WorkerId::new("w2"));
    }

    #[tokio::test]
    async fn test_wip_clamps_at_zero() {
        let store = GovStore::in_memory();
        store.upsert_worker(&worker("w1", &["developer"])).await.unwrap();

        assert_eq!(
            store.adjust_worker_wip(&WorkerId::new("w1"), 1).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.adjust_worker_wip(&WorkerId::new("w1"), -5).await.unwrap(),
            Some(0)
        );
        assert_eq!(
            store.adjust_worker_wip(&WorkerId::new("missing"), 1).await.unwrap(),
            None
        );
    }
}
