//! External-provider call log.

use warden_core::{ExtCallRecord, TaskId};

use crate::error::StoreResult;
use crate::store::{GovStore, SEP};

impl GovStore {
    /// Append one external-call row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn append_ext_call(&self, call: &ExtCallRecord) -> StoreResult<()> {
        let task_part = call.task_id.as_ref().map_or("-", TaskId::as_str);
        let key = format!(
            "{}{}{}{}{}",
            task_part,
            SEP,
            call.at.timestamp_millis(),
            SEP,
            uuid::Uuid::new_v4()
        );
        Ok(self.ext_calls.put_json(&key, call).await?)
    }

    /// Calls logged against one task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn ext_calls_for(&self, task_id: &TaskId) -> StoreResult<Vec<ExtCallRecord>> {
        let prefix = format!("{}{}", task_id.as_str(), SEP);
        let mut rows = Vec::new();
        for key in self.ext_calls.list_keys().await? {
            if key.starts_with(&prefix)
                && let Some(row) = self.ext_calls.get_json::<ExtCallRecord>(&key).await?
            {
                rows.push(row);
            }
        }
        rows.sort_by_key(|c| c.at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_calls_scope_to_task() {
        let store = GovStore::in_memory();
        let call = |task: Option<&str>| ExtCallRecord {
            task_id: task.map(TaskId::from),
            group: "developer".into(),
            provider: "github".into(),
            action: "create_issue".into(),
            ok: true,
            at: Utc::now(),
        };

        store.append_ext_call(&call(Some("T1"))).await.unwrap();
        store.append_ext_call(&call(Some("T1"))).await.unwrap();
        store.append_ext_call(&call(Some("T2"))).await.unwrap();
        store.append_ext_call(&call(None)).await.unwrap();

        assert_eq!(store.ext_calls_for(&TaskId::from("T1")).await.unwrap().len(), 2);
        assert_eq!(store.ext_calls_for(&TaskId::from("T2")).await.unwrap().len(), 1);
    }
}
