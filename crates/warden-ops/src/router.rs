//! Route table.

use axum::Router;
use axum::routing::{get, post};

use crate::state::SharedState;
use crate::{actions, read, sse, worker};

/// Build the ops router over shared state.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` —
/// the SSE cap and the cockpit rate limit key on the source address.
#[must_use]
pub fn router(state: SharedState) -> Router {
    Router::new()
        // Read surface
        .route("/ops/health", get(read::health))
        .route("/ops/stats", get(read::stats))
        .route("/ops/tasks", get(read::list_tasks))
        .route("/ops/tasks/:id", get(read::get_task))
        .route("/ops/tasks/:id/activities", get(read::task_activities))
        .route("/ops/products", get(read::products))
        .route("/ops/workers", get(read::workers))
        .route("/ops/workers/:id", get(read::worker))
        .route("/ops/workers/:id/dispatches", get(read::worker_dispatches))
        .route("/ops/workers/:id/tunnels", get(read::worker_tunnels))
        .route("/ops/memories", get(read::memories))
        .route("/ops/memories/search", get(read::memories_search))
        .route("/ops/events", get(sse::events))
        // Write actions
        .route("/ops/actions/transition", post(actions::action_transition))
        .route("/ops/actions/approve", post(actions::action_approve))
        .route("/ops/actions/override", post(actions::action_override))
        // Worker callbacks
        .route("/ops/worker/ipc", post(worker::worker_ipc))
        .route("/ops/worker/completion", post(worker::worker_completion))
        .with_state(state)
}
