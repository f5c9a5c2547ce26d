//! Dispatch slots: the at-most-once table behind the dispatch loop.

use chrono::Utc;
use tracing::debug;

use warden_core::{DispatchKey, DispatchStatus, GovDispatch, WorkerId};

use crate::error::StoreResult;
use crate::store::GovStore;

impl GovStore {
    /// Claim a dispatch slot.
    ///
    /// Returns `false` on a key conflict — the slot was already claimed
    /// by an earlier tick or a concurrent loop. A conflict is the normal
    /// idempotency path, never an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn try_create_dispatch(&self, dispatch: &GovDispatch) -> StoreResult<bool> {
        let claimed = self
            .dispatches
            .put_json_if_absent(dispatch.key.as_str(), dispatch)
            .await?;
        if claimed {
            debug!(key = %dispatch.key, "dispatch slot claimed");
        }
        Ok(claimed)
    }

    /// Fetch a dispatch slot by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get_dispatch(&self, key: &DispatchKey) -> StoreResult<Option<GovDispatch>> {
        Ok(self.dispatches.get_json(key.as_str()).await?)
    }

    /// Move a slot to a new status, optionally binding the worker that
    /// took the job. Returns `false` if the slot does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn update_dispatch_status(
        &self,
        key: &DispatchKey,
        status: DispatchStatus,
        worker_id: Option<WorkerId>,
    ) -> StoreResult<bool> {
        let _guard = self.write.lock().await;
        let Some(mut dispatch) = self.dispatches.get_json::<GovDispatch>(key.as_str()).await?
        else {
            return Ok(false);
        };
        dispatch.status = status;
        dispatch.updated_at = Utc::now();
        if worker_id.is_some() {
            dispatch.worker_id = worker_id;
        }
        self.dispatches.put_json(key.as_str(), &dispatch).await?;
        Ok(true)
    }

    /// All dispatch slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_dispatches(&self) -> StoreResult<Vec<GovDispatch>> {
        let mut rows = Vec::new();
        for key in self.dispatches.list_keys().await? {
            if let Some(row) = self.dispatches.get_json::<GovDispatch>(&key).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Slots currently in `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn dispatches_by_status(
        &self,
        status: DispatchStatus,
    ) -> StoreResult<Vec<GovDispatch>> {
        Ok(self
            .list_dispatches()
            .await?
            .into_iter()
            .filter(|d| d.status == status)
            .collect())
    }

    /// Slots bound to a worker host.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn dispatches_for_worker(
        &self,
        worker_id: &WorkerId,
    ) -> StoreResult<Vec<GovDispatch>> {
        Ok(self
            .list_dispatches()
            .await?
            .into_iter()
            .filter(|d| d.worker_id.as_ref() == Some(worker_id))
            .collect())
    }
}
