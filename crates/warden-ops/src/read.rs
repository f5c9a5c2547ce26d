//! Read endpoints.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use warden_core::{
    GroupId, ProductId, TaskId, TaskScope, TaskState, TunnelState, TunnelStatus, WorkerId,
    WorkerStatus,
};
use warden_memory::Accessor;

use crate::auth::require_read;
use crate::state::SharedState;
use crate::views::{MemoryView, WorkerView};

/// Build the standard `{error: code}` response.
#[must_use]
pub fn error_response(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

/// Map a store failure to a 500.
pub(crate) fn store_error(error: impl std::fmt::Display) -> Response {
    tracing::error!(%error, "store failure on ops endpoint");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
}

/// `GET /ops/health`. Unauthenticated liveness probe.
pub async fn health() -> Response {
    Json(json!({ "ok": true })).into_response()
}

/// `GET /ops/stats`.
pub async fn stats(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }

    let tasks = match state.store.list_tasks().await {
        Ok(tasks) => tasks,
        Err(error) => return store_error(error),
    };
    let mut tasks_by_state = BTreeMap::new();
    for task in &tasks {
        *tasks_by_state.entry(task.state.as_str()).or_insert(0u64) += 1;
    }

    let dispatches = match state.store.list_dispatches().await {
        Ok(dispatches) => dispatches,
        Err(error) => return store_error(error),
    };
    let mut dispatches_by_status = BTreeMap::new();
    for dispatch in &dispatches {
        *dispatches_by_status
            .entry(dispatch.status.as_str())
            .or_insert(0u64) += 1;
    }

    let denials = match state.store.list_denials().await {
        Ok(denials) => denials,
        Err(error) => return store_error(error),
    };
    let mut denials_by_code = BTreeMap::new();
    for denial in &denials {
        *denials_by_code.entry(denial.code.clone()).or_insert(0u64) += 1;
    }

    let breakers = match state.store.list_breakers().await {
        Ok(breakers) => breakers,
        Err(error) => return store_error(error),
    };
    let breaker_states: BTreeMap<String, &'static str> = breakers
        .iter()
        .map(|b| (b.provider.clone(), b.state.as_str()))
        .collect();

    let workers = match state.store.list_workers().await {
        Ok(workers) => workers,
        Err(error) => return store_error(error),
    };
    let worker_wip: BTreeMap<String, u32> = workers
        .iter()
        .map(|w| (w.id.to_string(), w.current_wip))
        .collect();

    Json(json!({
        "tasks": tasks_by_state,
        "dispatches": dispatches_by_status,
        "denials": denials_by_code,
        "breakers": breaker_states,
        "workers": worker_wip,
    }))
    .into_response()
}

/// Filters for `GET /ops/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskFilter {
    /// Wire state name.
    pub state: Option<String>,
    /// Assigned group folder.
    pub group: Option<String>,
    /// Product id.
    pub product: Option<String>,
    /// Scope name (`COMPANY` / `PRODUCT`).
    pub scope: Option<String>,
}

/// `GET /ops/tasks?state=&group=&product=&scope=`.
pub async fn list_tasks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(filter): Query<TaskFilter>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }

    let wanted_state = match filter.state.as_deref().map(TaskState::parse) {
        Some(None) => return error_response(StatusCode::BAD_REQUEST, "UNKNOWN_STATE"),
        Some(Some(state)) => Some(state),
        None => None,
    };
    let wanted_scope = filter.scope.as_deref().and_then(|s| match s {
        "COMPANY" => Some(TaskScope::Company),
        "PRODUCT" => Some(TaskScope::Product),
        _ => None,
    });

    let tasks = match state.store.list_tasks().await {
        Ok(tasks) => tasks,
        Err(error) => return store_error(error),
    };
    let filtered: Vec<_> = tasks
        .into_iter()
        .filter(|t| wanted_state.is_none_or(|s| t.state == s))
        .filter(|t| {
            filter
                .group
                .as_deref()
                .is_none_or(|g| t.assigned_group.as_ref() == Some(&GroupId::from(g)))
        })
        .filter(|t| {
            filter
                .product
                .as_deref()
                .is_none_or(|p| t.product_id.as_ref() == Some(&ProductId::new(p)))
        })
        .filter(|t| wanted_scope.is_none_or(|s| t.scope == s))
        .collect();

    let body = warden_events::sanitize_payload(json!({ "tasks": filtered }));
    Json(body).into_response()
}

/// `GET /ops/tasks/:id`.
pub async fn get_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.get_task(&TaskId::new(id)).await {
        Ok(Some(task)) => {
            Json(warden_events::sanitize_payload(json!({ "task": task }))).into_response()
        },
        Ok(None) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND"),
        Err(error) => store_error(error),
    }
}

/// `GET /ops/tasks/:id/activities`.
pub async fn task_activities(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.activities_for(&TaskId::new(id)).await {
        Ok(activities) => Json(json!({ "activities": activities })).into_response(),
        Err(error) => store_error(error),
    }
}

/// `GET /ops/products`. Distinct product ids across tasks.
pub async fn products(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.list_tasks().await {
        Ok(tasks) => {
            let mut products: Vec<String> = tasks
                .into_iter()
                .filter_map(|t| t.product_id.map(|p| p.to_string()))
                .collect();
            products.sort_unstable();
            products.dedup();
            Json(json!({ "products": products })).into_response()
        },
        Err(error) => store_error(error),
    }
}

/// `GET /ops/workers`.
pub async fn workers(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.list_workers().await {
        Ok(workers) => {
            let views: Vec<WorkerView> = workers.iter().map(WorkerView::from).collect();
            Json(json!({ "workers": views })).into_response()
        },
        Err(error) => store_error(error),
    }
}

/// `GET /ops/workers/:id`.
pub async fn worker(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.get_worker(&WorkerId::new(id)).await {
        Ok(Some(worker)) => Json(json!({ "worker": WorkerView::from(&worker) })).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND"),
        Err(error) => store_error(error),
    }
}

/// `GET /ops/workers/:id/dispatches`.
pub async fn worker_dispatches(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.dispatches_for_worker(&WorkerId::new(id)).await {
        Ok(dispatches) => Json(json!({ "dispatches": dispatches })).into_response(),
        Err(error) => store_error(error),
    }
}

/// `GET /ops/workers/:id/tunnels`.
///
/// Tunnel health is derived from the worker row: the CP owns the tunnel
/// process, so an online worker implies an established local port.
pub async fn worker_tunnels(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.get_worker(&WorkerId::new(id)).await {
        Ok(Some(worker)) => {
            let tunnels = if worker.ssh_host.is_some() {
                vec![TunnelStatus {
                    worker_id: worker.id.clone(),
                    local_port: worker.local_port,
                    remote_port: worker.remote_port,
                    state: if worker.status == WorkerStatus::Online {
                        TunnelState::Up
                    } else {
                        TunnelState::Down
                    },
                    changed_at: chrono::Utc::now(),
                }]
            } else {
                Vec::new()
            };
            Json(json!({ "tunnels": tunnels })).into_response()
        },
        Ok(None) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND"),
        Err(error) => store_error(error),
    }
}

/// Query for the memory endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct MemoryQuery {
    /// Substring / recall query.
    pub q: Option<String>,
}

/// `GET /ops/memories?q=`. Plain substring listing.
pub async fn memories(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<MemoryQuery>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    match state.store.list_memories().await {
        Ok(rows) => {
            let needle = query.q.unwrap_or_default().to_lowercase();
            let views: Vec<MemoryView> = rows
                .iter()
                .filter(|m| needle.is_empty() || m.content.to_lowercase().contains(&needle))
                .map(MemoryView::from)
                .collect();
            Json(json!({ "memories": views })).into_response()
        },
        Err(error) => store_error(error),
    }
}

/// `GET /ops/memories/search?q=`. Scored recall as the supervisory
/// principal (the cockpit is operator-grade).
pub async fn memories_search(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<MemoryQuery>,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }
    let Some(q) = query.q.filter(|q| !q.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "MISSING_QUERY");
    };
    match state.memory.recall(&q, &Accessor::group("main"), None).await {
        Ok(response) => {
            let views: Vec<MemoryView> = response.memories.iter().map(MemoryView::from).collect();
            Json(json!({
                "memories": views,
                "mode": response.mode,
                "access_denials": response.access_denials,
            }))
            .into_response()
        },
        Err(error) => store_error(error),
    }
}

