//! The CP→worker dispatch client and the completion wire types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use warden_core::{DispatchKey, DispatchStatus, GroupId, TaskId, WorkerRecord};

use crate::sign::sign_body;
use crate::verify::headers;

/// Payload POSTed to a worker's `/worker/dispatch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    /// The task being dispatched.
    pub task_id: TaskId,
    /// The target group folder on the worker host.
    pub group_folder: GroupId,
    /// The prompt the worker agent starts from. For approval dispatches
    /// this includes the task's context pack.
    pub prompt: String,
    /// Whether the target group is the supervisory group.
    pub is_main: bool,
    /// The group's IPC secret, letting the container authenticate its
    /// own relay traffic.
    pub ipc_secret: String,
    /// The dispatch slot this job resolves, echoed back on completion.
    pub dispatch_key: DispatchKey,
}

/// Terminal status a worker reports for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// The job finished cleanly.
    Ok,
    /// The job failed.
    Error,
    /// The job produced output but hit the idle timeout.
    Timeout,
}

impl CompletionStatus {
    /// The dispatch-slot status this completion resolves to.
    ///
    /// A timeout with streamed output still counts as delivered work.
    #[must_use]
    pub fn dispatch_status(self) -> DispatchStatus {
        match self {
            Self::Ok | Self::Timeout => DispatchStatus::Done,
            Self::Error => DispatchStatus::Failed,
        }
    }
}

/// Body of `POST /ops/worker/completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    /// The completed task.
    pub task_id: TaskId,
    /// The group that ran it.
    pub group_folder: GroupId,
    /// How it ended.
    pub status: CompletionStatus,
    /// The dispatch slot to resolve, when the worker knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_key: Option<DispatchKey>,
}

/// Why a dispatch POST failed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The payload could not be serialized.
    #[error("dispatch payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The HTTP request failed outright.
    #[error("dispatch transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The worker answered with a non-success status.
    #[error("worker rejected dispatch: http {0}")]
    Rejected(u16),
}

/// HTTP client for CP→worker calls.
///
/// Binds to the worker's local port: loopback when colocated, the local
/// end of the SSH reverse tunnel otherwise.
#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
}

impl WorkerClient {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// POST a signed dispatch to a worker.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on serialization, transport, or a
    /// non-2xx worker response.
    pub async fn dispatch(
        &self,
        worker: &WorkerRecord,
        payload: &DispatchPayload,
    ) -> Result<(), ClientError> {
        let body = serde_json::to_vec(payload)?;
        let bundle = sign_body(&worker.shared_secret, &body);
        let url = format!("http://127.0.0.1:{}/worker/dispatch", worker.local_port);

        debug!(worker = %worker.id, task = %payload.task_id, "posting dispatch");
        let response = self
            .http
            .post(&url)
            .header(headers::WORKER_ID, worker.id.as_str())
            .header(headers::HMAC, &bundle.hmac)
            .header(headers::TIMESTAMP, &bundle.timestamp)
            .header(headers::REQUEST_ID, &bundle.request_id)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Rejected(response.status().as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::TaskState;

    #[test]
    fn test_payload_wire_names_are_camel_case() {
        let payload = DispatchPayload {
            task_id: TaskId::from("T1"),
            group_folder: GroupId::from("developer"),
            prompt: "do the thing".into(),
            is_main: false,
            ipc_secret: "ff".repeat(32),
            dispatch_key: DispatchKey::build(
                &TaskId::from("T1"),
                TaskState::Ready,
                TaskState::Doing,
                0,
            ),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("taskId").is_some());
        assert!(json.get("groupFolder").is_some());
        assert!(json.get("isMain").is_some());
        assert!(json.get("ipcSecret").is_some());
    }

    #[test]
    fn test_completion_resolution() {
        assert_eq!(CompletionStatus::Ok.dispatch_status(), DispatchStatus::Done);
        assert_eq!(CompletionStatus::Timeout.dispatch_status(), DispatchStatus::Done);
        assert_eq!(CompletionStatus::Error.dispatch_status(), DispatchStatus::Failed);
    }

    #[test]
    fn test_completion_report_optional_key() {
        let report: CompletionReport = serde_json::from_str(
            r#"{"taskId":"T1","groupFolder":"developer","status":"ok"}"#,
        )
        .unwrap();
        assert!(report.dispatch_key.is_none());
        assert_eq!(report.status, CompletionStatus::Ok);
    }
}
