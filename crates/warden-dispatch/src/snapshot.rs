//! Per-group snapshot files written before a worker job starts.
//!
//! Four files land in `{ipc_root}/{group}/`: `gov_pipeline.json` (the
//! task view), `ext_capabilities.json` (the provider view),
//! `tasks.json` (scheduled tasks, read-only for the worker), and
//! `.ipc_secret` (generated once, never rotated). Every write goes
//! through a temp file and an atomic rename so a worker can never read
//! a torn snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use warden_core::{GovTask, GroupId};

use crate::capabilities::{CapabilityRegistry, ProviderCapability};

/// Why a snapshot write failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem trouble under the IPC root.
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot failed to serialize.
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One task as the pipeline snapshot presents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTask {
    /// Task id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Wire task type.
    pub task_type: String,
    /// Wire state.
    pub state: String,
    /// Wire priority.
    pub priority: String,
    /// Product id, if scoped.
    pub product: Option<String>,
    /// Assigned group folder.
    pub assigned_group: Option<String>,
    /// Executor.
    pub executor: Option<String>,
    /// Gate name, `"None"` when absent.
    pub gate: String,
    /// Version counter.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&GovTask> for PipelineTask {
    fn from(task: &GovTask) -> Self {
        Self {
            id: task.id.to_string(),
            title: task.title.clone(),
            description: task.description.clone(),
            task_type: format!("{:?}", task.task_type).to_uppercase(),
            state: task.state.as_str().to_string(),
            priority: format!("{:?}", task.priority),
            product: task.product_id.as_ref().map(ToString::to_string),
            assigned_group: task.assigned_group.as_ref().map(ToString::to_string),
            executor: task.executor.clone(),
            gate: task.gate.map_or_else(|| "None".to_string(), |g| g.as_str().to_string()),
            version: task.version,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// `gov_pipeline.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineSnapshot {
    generated_at: DateTime<Utc>,
    tasks: Vec<PipelineTask>,
}

/// `ext_capabilities.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilitySnapshot {
    generated_at: DateTime<Utc>,
    capabilities: Vec<ProviderCapability>,
    providers_available: Vec<String>,
}

/// Writes the per-group snapshot files.
pub struct SnapshotWriter {
    ipc_root: PathBuf,
    registry: CapabilityRegistry,
}

impl SnapshotWriter {
    /// Build a writer rooted at the IPC directory.
    #[must_use]
    pub fn new(ipc_root: impl Into<PathBuf>, registry: CapabilityRegistry) -> Self {
        Self {
            ipc_root: ipc_root.into(),
            registry,
        }
    }

    /// The group's IPC directory, created on demand.
    async fn group_dir(&self, group: &GroupId) -> Result<PathBuf, SnapshotError> {
        let dir = self.ipc_root.join(group.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Write all snapshot files for a group.
    ///
    /// `tasks` must already be filtered to what the group may see:
    /// main sees all, every other group only `assigned_group = self`.
    ///
    /// # Errors
    ///
    /// Returns an error on filesystem or serialization failure.
    pub async fn write_for_group(
        &self,
        group: &GroupId,
        tasks: &[GovTask],
    ) -> Result<String, SnapshotError> {
        let dir = self.group_dir(group).await?;

        let pipeline = PipelineSnapshot {
            generated_at: Utc::now(),
            tasks: tasks.iter().map(PipelineTask::from).collect(),
        };
        write_atomic(&dir, "gov_pipeline.json", &serde_json::to_vec_pretty(&pipeline)?).await?;

        let capabilities = CapabilitySnapshot {
            generated_at: Utc::now(),
            capabilities: self.registry.capabilities_for(group),
            providers_available: self.registry.provider_names(),
        };
        write_atomic(
            &dir,
            "ext_capabilities.json",
            &serde_json::to_vec_pretty(&capabilities)?,
        )
        .await?;

        // Scheduled-task snapshot; read-only for the worker.
        write_atomic(&dir, "tasks.json", b"{\"tasks\":[]}").await?;

        let secret = self.ensure_ipc_secret(&dir).await?;
        debug!(group = %group, tasks = tasks.len(), "snapshots written");
        Ok(secret)
    }

    /// Filter a task list to the slice a group may see.
    #[must_use]
    pub fn visible_tasks(group: &GroupId, tasks: Vec<GovTask>) -> Vec<GovTask> {
        if group.is_main() {
            tasks
        } else {
            tasks
                .into_iter()
                .filter(|t| t.assigned_group.as_ref() == Some(group))
                .collect()
        }
    }

    /// Read the group's IPC secret, generating it on first use. The
    /// secret is 64 hex chars and never rotates.
    async fn ensure_ipc_secret(&self, dir: &Path) -> Result<String, SnapshotError> {
        let path = dir.join(".ipc_secret");
        match tokio::fs::read_to_string(&path).await {
            Ok(existing) if !existing.trim().is_empty() => Ok(existing.trim().to_string()),
            _ => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                let secret = hex::encode(bytes);
                write_atomic(dir, ".ipc_secret", secret.as_bytes()).await?;
                Ok(secret)
            },
        }
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("ipc_root", &self.ipc_root)
            .finish_non_exhaustive()
    }
}

/// Temp-then-rename write; readers never observe a partial file.
async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
    let tmp = dir.join(format!("{name}.tmp"));
    let fin = dir.join(name);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &fin).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;
    use warden_core::{Priority, TaskId, TaskScope, TaskState, TaskType};

    fn task(id: &str, group: &str) -> GovTask {
        GovTask {
            id: TaskId::from(id),
            title: "t".into(),
            description: String::new(),
            task_type: TaskType::Ops,
            priority: Priority::P2,
            state: TaskState::Ready,
            gate: None,
            scope: TaskScope::Company,
            product_id: None,
            assigned_group: Some(GroupId::from(group)),
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
    async fn test_snapshots_land_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), CapabilityRegistry::with_defaults());
        let group = GroupId::from("developer");

        writer.write_for_group(&group, &[task("T1", "developer")]).await.unwrap();

        let group_dir = dir.path().join("developer");
        for file in ["gov_pipeline.json", "ext_capabilities.json", "tasks.json", ".ipc_secret"] {
            assert!(group_dir.join(file).exists(), "{file} missing");
            assert!(!group_dir.join(format!("{file}.tmp")).exists());
        }

        let pipeline: serde_json::Value = serde_json::from_slice(
            &tokio::fs::read(group_dir.join("gov_pipeline.json")).await.unwrap(),
        )
        .unwrap();
        assert_eq!(pipeline["tasks"][0]["id"], "T1");
        assert_eq!(pipeline["tasks"][0]["gate"], "None");
    }

    #[tokio::test]
    async fn test_ipc_secret_is_stable_and_64_hex() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), CapabilityRegistry::with_defaults());
        let group = GroupId::from("developer");

        let first = writer.write_for_group(&group, &[]).await.unwrap();
        let second = writer.write_for_group(&group, &[]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_visibility_filter() {
        let tasks = vec![task("T1", "developer"), task("T2", "security")];
        let developer_view =
            SnapshotWriter::visible_tasks(&GroupId::from("developer"), tasks.clone());
        assert_eq!(developer_view.len(), 1);
        assert_eq!(developer_view[0].id, TaskId::from("T1"));

        let main_view = SnapshotWriter::visible_tasks(&GroupId::main(), tasks);
        assert_eq!(main_view.len(), 2);
    }
}
