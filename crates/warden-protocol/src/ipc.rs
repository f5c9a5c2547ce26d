//! IPC wire types: what worker containers ask the CP to do.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_core::{TaskId, TaskState};

/// A request a worker container drops into its IPC directory.
///
/// Mutating variants carry their own idempotency key so the relay (and
/// the worker behind it) can retry a lost response safely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Store a memory on behalf of the group.
    MemoryStore {
        /// Raw content; the CP sanitizes before persisting.
        content: String,
        /// Requested level (`L0`..`L3`); the CP may classify higher.
        #[serde(default)]
        level: Option<String>,
        /// Free-form tags.
        #[serde(default)]
        tags: Vec<String>,
        /// Idempotency key for safe retries.
        idempotency_key: String,
    },

    /// Recall memories for the group.
    MemoryRecall {
        /// The query string.
        query: String,
        /// Max results.
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Attach an execution summary to a task's activity log.
    ExecutionSummary {
        /// The task the summary belongs to.
        task_id: TaskId,
        /// The summary text.
        summary: String,
    },

    /// Report the worker's view of a task so the CP can reconcile.
    TaskStatus {
        /// The task in question.
        task_id: TaskId,
        /// The state the worker believes the task is in.
        state: TaskState,
    },
}

/// The CP's answer, written back into the group's responses directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Whether the request was served.
    pub ok: bool,
    /// Stable error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operation-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl IpcResponse {
    /// A successful response with a payload.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            error: None,
            data,
        }
    }

    /// A failed response with a stable code.
    #[must_use]
    pub fn error(code: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(code.into()),
            data: Value::Null,
        }
    }
}
