//! Gate approvals: idempotent on (task, gate).

use warden_core::{GateType, GovApproval, TaskId};

use crate::error::StoreResult;
use crate::store::{GovStore, SEP};

fn approval_key(task: &TaskId, gate: GateType) -> String {
    format!("{}{}{}", task.as_str(), SEP, gate.as_str())
}

impl GovStore {
    /// Record a gate approval.
    ///
    /// Idempotent: a second approval for the same (task, gate) pair is
    /// ignored and leaves exactly one persisted row. Returns `true`
    /// when this call created the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn create_approval(&self, approval: &GovApproval) -> StoreResult<bool> {
        self.approvals
            .put_json_if_absent(&approval_key(&approval.task_id, approval.gate), approval)
            .await
            .map_err(Into::into)
    }

    /// Fetch the approval for a (task, gate) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get_approval(
        &self,
        task_id: &TaskId,
        gate: GateType,
    ) -> StoreResult<Option<GovApproval>> {
        Ok(self.approvals.get_json(&approval_key(task_id, gate)).await?)
    }

    /// Every approval recorded against a task, in gate-name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn approvals_for(&self, task_id: &TaskId) -> StoreResult<Vec<GovApproval>> {
        let prefix = format!("{}{}", task_id.as_str(), SEP);
        let mut rows = Vec::new();
        for key in self.approvals.list_keys().await? {
            if key.starts_with(&prefix)
                && let Some(row) = self.approvals.get_json::<GovApproval>(&key).await?
            {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}
