//! Worker callback endpoints: IPC relay target and completion.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{info, warn};

use warden_core::{
    ActivityAction, ErrorCode, GroupId, MemoryLevel, TaskScope, WorkerStatus,
};
use warden_events::{EventMetadata, WardenEvent};
use warden_memory::{Accessor, MemoryError, StoreMemoryRequest};
use warden_protocol::verify::headers as wire;
use warden_protocol::{CompletionReport, IpcRequest, IpcResponse, SignedHeaders};

use crate::read::{error_response, store_error};
use crate::state::SharedState;
use crate::views::MemoryView;

/// Lift the signed envelope out of the HTTP headers.
fn signed_headers(headers: &HeaderMap) -> SignedHeaders {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    SignedHeaders {
        worker_id: get(wire::WORKER_ID),
        hmac: get(wire::HMAC),
        timestamp: get(wire::TIMESTAMP),
        request_id: get(wire::REQUEST_ID),
        group_folder: get(wire::GROUP_FOLDER),
    }
}

fn auth_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::UnknownWorker | ErrorCode::MissingWorkerId => StatusCode::NOT_FOUND,
        _ => StatusCode::UNAUTHORIZED,
    }
}

/// `POST /ops/worker/ipc`. The relay forwards worker request files
/// here under the signed envelope plus `X-Worker-GroupFolder`.
pub async fn worker_ipc(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signed = signed_headers(&headers);
    if let Err(denied) = state.verifier.verify(&signed, &body).await {
        warn!(code = %denied.code(), "ipc request rejected");
        return error_response(auth_status(denied.code()), denied.code().as_str());
    }
    let Some(group) = signed.group_folder.map(GroupId::new) else {
        return error_response(StatusCode::BAD_REQUEST, ErrorCode::MissingHeaders.as_str());
    };

    let request: IpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(IpcResponse::error("MALFORMED_REQUEST")),
            )
                .into_response();
        },
    };

    let response = handle_ipc(&state, &group, request).await;
    Json(response).into_response()
}

async fn handle_ipc(state: &SharedState, group: &GroupId, request: IpcRequest) -> IpcResponse {
    match request {
        IpcRequest::MemoryStore {
            content,
            level,
            tags,
            idempotency_key: _,
        } => {
            let requested_level = level
                .as_deref()
                .and_then(MemoryLevel::parse)
                .unwrap_or(MemoryLevel::L1);
            let result = state
                .memory
                .store_memory(StoreMemoryRequest {
                    content,
                    requested_level,
                    scope: TaskScope::Company,
                    product_id: None,
                    group: group.clone(),
                    source_type: "ipc".into(),
                    tags,
                })
                .await;
            match result {
                Ok(record) => IpcResponse::ok(json!({
                    "memoryId": record.id.to_string(),
                    "level": record.level.as_str(),
                    "piiDetected": record.pii_detected,
                })),
                Err(MemoryError::Denied(code)) => IpcResponse::error(code.as_str()),
                Err(error) => {
                    warn!(%error, "ipc memory store failed");
                    IpcResponse::error("STORE_ERROR")
                },
            }
        },

        IpcRequest::MemoryRecall { query, limit } => {
            let accessor = Accessor::group(group.as_str());
            match state.memory.recall(&query, &accessor, limit).await {
                Ok(response) => {
                    let views: Vec<MemoryView> =
                        response.memories.iter().map(MemoryView::from).collect();
                    IpcResponse::ok(json!({
                        "memories": views,
                        "mode": response.mode,
                        "accessDenials": response.access_denials,
                    }))
                },
                Err(error) => {
                    warn!(%error, "ipc recall failed");
                    IpcResponse::error("STORE_ERROR")
                },
            }
        },

        IpcRequest::ExecutionSummary { task_id, summary } => {
            let result = state
                .store
                .append_activity(
                    &task_id,
                    ActivityAction::ExecutionSummary,
                    None,
                    None,
                    group.as_str(),
                    Some(summary),
                )
                .await;
            match result {
                Ok(_) => IpcResponse::ok(json!({ "recorded": true })),
                Err(error) => {
                    warn!(%error, "ipc execution summary failed");
                    IpcResponse::error("STORE_ERROR")
                },
            }
        },

        IpcRequest::TaskStatus { task_id, state: claimed } => {
            match state.store.get_task(&task_id).await {
                Ok(Some(task)) => IpcResponse::ok(json!({
                    "state": task.state.as_str(),
                    "version": task.version,
                    "inSync": task.state == claimed,
                })),
                Ok(None) => IpcResponse::error("NOT_FOUND"),
                Err(error) => {
                    warn!(%error, "ipc task status failed");
                    IpcResponse::error("STORE_ERROR")
                },
            }
        },
    }
}

/// `POST /ops/worker/completion`.
///
/// Decrements the worker's WIP and, when a dispatch key is given,
/// resolves the slot from the reported status.
pub async fn worker_completion(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signed = signed_headers(&headers);
    let worker = match state.verifier.verify(&signed, &body).await {
        Ok(worker) => worker,
        Err(denied) => {
            warn!(code = %denied.code(), "completion rejected");
            return error_response(auth_status(denied.code()), denied.code().as_str());
        },
    };

    let report: CompletionReport = match serde_json::from_slice(&body) {
        Ok(report) => report,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "MALFORMED_REQUEST"),
    };

    let wip = match state.store.adjust_worker_wip(&worker.id, -1).await {
        Ok(wip) => wip.unwrap_or(0),
        Err(error) => return store_error(error),
    };
    state.events.publish(WardenEvent::WorkerStatus {
        metadata: EventMetadata::new("ops"),
        worker_id: worker.id.clone(),
        status: WorkerStatus::Online,
        current_wip: wip,
    });

    if let Some(key) = &report.dispatch_key {
        let status = report.status.dispatch_status();
        match state.store.update_dispatch_status(key, status, Some(worker.id.clone())).await {
            Ok(true) => {
                state.events.publish(WardenEvent::DispatchLifecycle {
                    metadata: EventMetadata::new("ops"),
                    dispatch_key: key.clone(),
                    task_id: report.task_id.clone(),
                    group: report.group_folder.clone(),
                    status,
                });
            },
            Ok(false) => {
                warn!(key = %key, "completion for unknown dispatch slot");
            },
            Err(error) => return store_error(error),
        }
    }

    info!(
        worker = %worker.id,
        task = %report.task_id,
        status = ?report.status,
        "worker completion recorded"
    );
    Json(json!({ "ok": true })).into_response()
}
