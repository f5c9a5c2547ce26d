//! Worker host records.
//!
//! A worker is a remote execution host reachable either on localhost or
//! through an SSH reverse tunnel. Its `current_wip` counter is the only
//! mutable field the dispatch path writes, and only inside the store's
//! writer-coordinated section together with the dispatch row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, WorkerId};

/// Whether a worker is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum WorkerStatus {
    Online,
    Offline,
}

/// A remote execution host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Worker identity string; also the `X-Worker-Id` header value.
    pub id: WorkerId,
    /// SSH host for the reverse tunnel, if remote.
    #[serde(default)]
    pub ssh_host: Option<String>,
    /// SSH user.
    #[serde(default)]
    pub ssh_user: Option<String>,
    /// Identity file path used to open the tunnel. Never serialized to
    /// the ops surface.
    #[serde(default)]
    pub ssh_identity_file: Option<String>,
    /// Port the CP connects to locally.
    pub local_port: u16,
    /// Port the worker listens on remotely.
    pub remote_port: u16,
    /// Maximum work-in-progress the host accepts.
    pub max_wip: u32,
    /// Current work-in-progress.
    pub current_wip: u32,
    /// Reachability.
    pub status: WorkerStatus,
    /// HMAC key shared with this worker. Never serialized to the ops
    /// surface.
    pub shared_secret: String,
    /// Group folders this host serves.
    pub groups: Vec<GroupId>,
}

impl WorkerRecord {
    /// Whether the host can accept one more job.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.status == WorkerStatus::Online && self.current_wip < self.max_wip
    }

    /// Whether this host serves the given group.
    #[must_use]
    pub fn serves(&self, group: &GroupId) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Health of one SSH reverse tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum TunnelState {
    Up,
    Down,
    Connecting,
}

/// Status row for a worker's tunnel, surfaced on the ops API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelStatus {
    /// The worker the tunnel belongs to.
    pub worker_id: WorkerId,
    /// Local end of the tunnel.
    pub local_port: u16,
    /// Remote end of the tunnel.
    pub remote_port: u16,
    /// Current state.
    pub state: TunnelState,
    /// Last state change.
    pub changed_at: DateTime<Utc>,
}
