//! Authenticated write actions: transition, approve, override.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use warden_core::{ErrorCode, GateType, GroupId, TaskId, TaskState};
use warden_governance::ActionError;
use warden_limits::EnforceRequest;

use crate::auth::require_write;
use crate::read::{error_response, store_error};
use crate::state::SharedState;

/// `POST /ops/actions/transition` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    /// Target task.
    pub task_id: String,
    /// Wire state name to move to.
    pub to_state: String,
    /// Optional reason, recorded on the activity.
    #[serde(default)]
    pub reason: Option<String>,
    /// Optional optimistic guard; omitted means "one attempt against
    /// the current version".
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// `POST /ops/actions/approve` body.
#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    /// Target task.
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Gate name.
    pub gate_type: String,
    /// Optional reviewer notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /ops/actions/override` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideBody {
    /// Target task.
    pub task_id: String,
    /// Why the gate is being bypassed.
    pub reason: String,
    /// Explicit risk acknowledgement.
    pub accepted_risk: String,
    /// ISO-8601 deadline for the post-hoc review.
    pub review_deadline_iso: String,
}

/// Gate every write through the cockpit rate limit. `None` means go.
async fn cockpit_gate(state: &SharedState, addr: SocketAddr) -> Option<Response> {
    let request = EnforceRequest::cockpit_write(&addr.ip().to_string());
    match state.limits.enforce(&request).await {
        Ok(enforcement) if enforcement.allowed => None,
        Ok(enforcement) => {
            let code = enforcement.code.unwrap_or(ErrorCode::RateLimitExceeded);
            Some(error_response(denial_status(code), code.as_str()))
        },
        Err(error) => Some(store_error(error)),
    }
}

/// HTTP status for a limits denial code.
fn denial_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::RateLimitExceeded | ErrorCode::DailyQuotaExceeded => {
            StatusCode::TOO_MANY_REQUESTS
        },
        ErrorCode::LimitsDisabled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::FORBIDDEN,
    }
}

/// HTTP status + body for a governance denial.
fn action_error_response(error: &ActionError) -> Response {
    match error {
        ActionError::Denied {
            codes,
            current_state,
            current_version,
        } => {
            let code = codes.first().copied().unwrap_or(ErrorCode::Forbidden);
            let status = match code {
                ErrorCode::VersionConflict => StatusCode::CONFLICT,
                ErrorCode::Forbidden | ErrorCode::NotAuthorized => StatusCode::FORBIDDEN,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let mut body = json!({
                "error": code.as_str(),
                "errors": codes.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            });
            if let Some(state) = current_state {
                body["current_state"] = json!(state.as_str());
            }
            if let Some(version) = current_version {
                body["current_version"] = json!(version);
            }
            (status, Json(body)).into_response()
        },
        ActionError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND"),
        ActionError::Store(error) => store_error(error),
    }
}

/// `POST /ops/actions/transition`.
pub async fn action_transition(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<TransitionBody>,
) -> Response {
    if let Err(denied) = require_write(&state.settings, &headers) {
        return denied;
    }
    if let Some(denied) = cockpit_gate(&state, addr).await {
        return denied;
    }

    let Some(to) = TaskState::parse(&body.to_state) else {
        return error_response(StatusCode::BAD_REQUEST, ErrorCode::UnknownState.as_str());
    };
    match state
        .governance
        .transition(
            &TaskId::new(body.task_id),
            to,
            "cockpit",
            body.reason,
            body.expected_version,
        )
        .await
    {
        Ok(outcome) => Json(json!({
            "ok": true,
            "from": outcome.from.as_str(),
            "to": outcome.to.as_str(),
            "version": outcome.version,
        }))
        .into_response(),
        Err(error) => action_error_response(&error),
    }
}

/// `POST /ops/actions/approve`.
pub async fn action_approve(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ApproveBody>,
) -> Response {
    if let Err(denied) = require_write(&state.settings, &headers) {
        return denied;
    }
    if let Some(denied) = cockpit_gate(&state, addr).await {
        return denied;
    }

    let Some(gate) = GateType::parse(&body.gate_type) else {
        return error_response(StatusCode::BAD_REQUEST, "UNKNOWN_GATE");
    };
    // The cockpit acts with supervisory authority.
    match state
        .governance
        .approve(&TaskId::new(body.task_id), gate, &GroupId::main(), body.notes)
        .await
    {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(error) => action_error_response(&error),
    }
}

/// `POST /ops/actions/override`.
pub async fn action_override(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<OverrideBody>,
) -> Response {
    if let Err(denied) = require_write(&state.settings, &headers) {
        return denied;
    }
    if let Some(denied) = cockpit_gate(&state, addr).await {
        return denied;
    }

    match state
        .governance
        .override_to_done(
            &TaskId::new(body.task_id),
            "cockpit",
            &body.reason,
            &body.accepted_risk,
            &body.review_deadline_iso,
        )
        .await
    {
        Ok(outcome) => Json(json!({
            "ok": true,
            "from": outcome.from.as_str(),
            "to": "DONE",
            "override": true,
        }))
        .into_response(),
        Err(error) => action_error_response(&error),
    }
}
