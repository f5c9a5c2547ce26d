//! Memory records and the L3 access audit log.

use chrono::Utc;

use warden_core::{MemoryAccessRecord, MemoryId, MemoryRecord};

use crate::error::StoreResult;
use crate::store::{GovStore, SEP};

impl GovStore {
    /// Insert or replace a memory row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn upsert_memory(&self, memory: &MemoryRecord) -> StoreResult<()> {
        Ok(self
            .memories
            .put_json(&memory.id.to_string(), memory)
            .await?)
    }

    /// Fetch a memory by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get_memory(&self, id: &MemoryId) -> StoreResult<Option<MemoryRecord>> {
        Ok(self.memories.get_json(&id.to_string()).await?)
    }

    /// Replace a memory iff the stored version matches.
    ///
    /// On success the version increments and `updated_at` refreshes,
    /// mirroring the task table's optimistic discipline. Returns `false`
    /// on mismatch or absence.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn update_memory(
        &self,
        updated: &MemoryRecord,
        expected_version: u64,
    ) -> StoreResult<bool> {
        let _guard = self.write.lock().await;
        let key = updated.id.to_string();
        let Some(current) = self.memories.get_json::<MemoryRecord>(&key).await? else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }
        let mut row = updated.clone();
        row.version = current.version + 1;
        row.updated_at = Utc::now();
        self.memories.put_json(&key, &row).await?;
        Ok(true)
    }

    /// All memory rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_memories(&self) -> StoreResult<Vec<MemoryRecord>> {
        let mut rows = Vec::new();
        for key in self.memories.list_keys().await? {
            if let Some(row) = self.memories.get_json::<MemoryRecord>(&key).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Append one access-audit row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn append_memory_access(&self, access: &MemoryAccessRecord) -> StoreResult<()> {
        let key = format!("{}{}{}", access.memory_id, SEP, uuid::Uuid::new_v4());
        Ok(self.access_log.put_json(&key, access).await?)
    }

    /// The audit rows for one memory, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn memory_access_log(
        &self,
        memory_id: &MemoryId,
    ) -> StoreResult<Vec<MemoryAccessRecord>> {
        let prefix = format!("{memory_id}{SEP}");
        let mut rows = Vec::new();
        for key in self.access_log.list_keys().await? {
            if key.starts_with(&prefix)
                && let Some(row) = self.access_log.get_json::<MemoryAccessRecord>(&key).await?
            {
                rows.push(row);
            }
        }
        rows.sort_by_key(|r| r.at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{AccessType, GroupId, MemoryLevel, TaskScope};

    fn record(level: MemoryLevel) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::new(),
            content: "the deploy runs at dawn".into(),
            content_hash: "00".repeat(32),
            level,
            scope: TaskScope::Company,
            product_id: None,
            group_folder: GroupId::from("developer"),
            tags: vec![],
            pii_detected: false,
            pii_types: vec![],
            source_type: "test".into(),
            policy_version: 1,
            embedding: None,
            embedding_model: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = GovStore::in_memory();
        let memory = record(MemoryLevel::L1);
        store.upsert_memory(&memory).await.unwrap();
        let loaded = store.get_memory(&memory.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, memory.content);
    }

    #[tokio::test]
    async fn test_optimistic_memory_update() {
        let store = GovStore::in_memory();
        let memory = record(MemoryLevel::L1);
        store.upsert_memory(&memory).await.unwrap();

        let mut edit = memory.clone();
        edit.content = "edited".into();
        assert!(store.update_memory(&edit, 0).await.unwrap());
        assert!(!store.update_memory(&edit, 0).await.unwrap());

        let loaded = store.get_memory(&memory.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.content, "edited");
    }

    #[tokio::test]
    async fn test_access_log_is_scoped_per_memory() {
        let store = GovStore::in_memory();
        let a = record(MemoryLevel::L3);
        let b = record(MemoryLevel::L3);

        for (memory, granted) in [(&a, false), (&b, true)] {
            store
                .append_memory_access(&MemoryAccessRecord {
                    memory_id: memory.id.clone(),
                    accessor_group: GroupId::from("developer"),
                    access_type: AccessType::Recall,
                    granted,
                    reason: if granted { "granted".into() } else { "L3_ACCESS_DENIED".into() },
                    at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let log = store.memory_access_log(&a.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].granted);
    }
}
