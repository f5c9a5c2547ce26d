//! Outbound row views.
//!
//! The raw rows carry fields that must never reach the cockpit: worker
//! shared secrets and SSH identity files, and memory embedding vectors.
//! Views are the only row shapes the read handlers serialize.

use chrono::{DateTime, Utc};
use serde::Serialize;

use warden_core::{MemoryRecord, WorkerRecord, WorkerStatus};

/// A worker row as the ops surface presents it.
#[derive(Debug, Serialize)]
pub struct WorkerView {
    /// Worker id.
    pub id: String,
    /// SSH host, if remote.
    pub ssh_host: Option<String>,
    /// Local tunnel port.
    pub local_port: u16,
    /// Remote tunnel port.
    pub remote_port: u16,
    /// Max work-in-progress.
    pub max_wip: u32,
    /// Current work-in-progress.
    pub current_wip: u32,
    /// Reachability.
    pub status: WorkerStatus,
    /// Groups served.
    pub groups: Vec<String>,
}

impl From<&WorkerRecord> for WorkerView {
    fn from(worker: &WorkerRecord) -> Self {
        Self {
            id: worker.id.to_string(),
            ssh_host: worker.ssh_host.clone(),
            local_port: worker.local_port,
            remote_port: worker.remote_port,
            max_wip: worker.max_wip,
            current_wip: worker.current_wip,
            status: worker.status,
            groups: worker.groups.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A memory row as the ops surface presents it: no embedding bytes.
#[derive(Debug, Serialize)]
pub struct MemoryView {
    /// Memory id.
    pub id: String,
    /// Sanitized content.
    pub content: String,
    /// Level name.
    pub level: String,
    /// Scope.
    pub scope: String,
    /// Product, if scoped.
    pub product_id: Option<String>,
    /// Owning group.
    pub group_folder: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether PII was redacted.
    pub pii_detected: bool,
    /// Whether an embedding exists (the vector itself never leaves).
    pub has_embedding: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Version counter.
    pub version: u64,
}

impl From<&MemoryRecord> for MemoryView {
    fn from(memory: &MemoryRecord) -> Self {
        Self {
            id: memory.id.to_string(),
            content: memory.content.clone(),
            level: memory.level.as_str().to_string(),
            scope: format!("{:?}", memory.scope).to_uppercase(),
            product_id: memory.product_id.as_ref().map(ToString::to_string),
            group_folder: memory.group_folder.to_string(),
            tags: memory.tags.clone(),
            pii_detected: memory.pii_detected,
            has_embedding: memory.embedding.is_some(),
            created_at: memory.created_at,
            version: memory.version,
        }
    }
}
