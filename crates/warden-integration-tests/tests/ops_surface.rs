//! Ops surface behavior: auth, rate-limited writes, and redaction.

use axum::extract::{ConnectInfo, Json, Path, Query, State};
use axum::http::HeaderMap;
use serde_json::json;

use warden_integration_tests::{Rig, response_json};
use warden_ops::actions::action_transition;
use warden_ops::read::{self, MemoryQuery, TaskFilter};

#[tokio::test]
async fn read_endpoints_require_the_read_secret() {
    let rig = Rig::new().await;
    rig.seed_ready_task("T1").await;

    let denied = read::stats(State(rig.ops.clone()), HeaderMap::new()).await;
    let (status, body) = response_json(denied).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "FORBIDDEN");

    let allowed = read::stats(State(rig.ops.clone()), Rig::read_headers()).await;
    let (status, body) = response_json(allowed).await;
    assert!(status.is_success());
    assert_eq!(body["tasks"]["READY"], 1);
}

#[tokio::test]
async fn write_actions_need_the_dual_secret() {
    let rig = Rig::new().await;
    rig.seed_ready_task("T1").await;

    // Read secret alone is rejected.
    let response = action_transition(
        State(rig.ops.clone()),
        ConnectInfo(Rig::source_addr()),
        Rig::read_headers(),
        Json(serde_json::from_value(json!({"taskId": "T1", "toState": "DOING"})).unwrap()),
    )
    .await;
    let (status, _) = response_json(response).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);

    // Dual secret goes through and returns the wire format.
    let response = action_transition(
        State(rig.ops.clone()),
        ConnectInfo(Rig::source_addr()),
        Rig::write_headers(),
        Json(serde_json::from_value(json!({"taskId": "T1", "toState": "DOING"})).unwrap()),
    )
    .await;
    let (status, body) = response_json(response).await;
    assert!(status.is_success());
    assert_eq!(body["ok"], true);
    assert_eq!(body["from"], "READY");
    assert_eq!(body["to"], "DOING");
    assert_eq!(body["version"], 3);
}

#[tokio::test]
async fn cockpit_writes_are_rate_limited_by_source_ip() {
    let rig = Rig::with_limit_overrides(&[("RL_COCKPIT_WRITE_PER_MIN", 1)]).await;
    rig.seed_ready_task("T1").await;

    let call = |body: serde_json::Value| {
        let state = State(rig.ops.clone());
        async move {
            action_transition(
                state,
                ConnectInfo(Rig::source_addr()),
                Rig::write_headers(),
                Json(serde_json::from_value(body).unwrap()),
            )
            .await
        }
    };

    let (first_status, _) = response_json(call(json!({"taskId": "T1", "toState": "DOING"})).await).await;
    assert!(first_status.is_success());

    let (second_status, second_body) =
        response_json(call(json!({"taskId": "T1", "toState": "REVIEW"})).await).await;
    assert_eq!(second_status, axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second_body["error"], "RATE_LIMIT_EXCEEDED");

    // The denial is on the books for the dashboard.
    let denials = rig.store.list_denials().await.unwrap();
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].scope_key, "127.0.0.1");
}

#[tokio::test]
async fn unknown_state_is_a_caller_error() {
    let rig = Rig::new().await;
    rig.seed_ready_task("T1").await;

    let response = action_transition(
        State(rig.ops.clone()),
        ConnectInfo(Rig::source_addr()),
        Rig::write_headers(),
        Json(serde_json::from_value(json!({"taskId": "T1", "toState": "LIMBO"})).unwrap()),
    )
    .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "UNKNOWN_STATE");
}

#[tokio::test]
async fn worker_listing_never_leaks_secrets() {
    let rig = Rig::new().await;
    let response = read::workers(State(rig.ops.clone()), Rig::read_headers()).await;
    let (status, body) = response_json(response).await;
    assert!(status.is_success());
    let raw = body.to_string();
    assert!(raw.contains("\"w1\""));
    assert!(!raw.contains("test-worker-secret"));
    assert!(!raw.contains("shared_secret"));
}

#[tokio::test]
async fn task_filters_apply() {
    let rig = Rig::new().await;
    rig.seed_ready_task("T1").await;
    rig.seed_ready_task("T2").await;
    rig.governance
        .transition(&warden_core::TaskId::from("T2"), warden_core::TaskState::Doing, "admin", None, None)
        .await
        .unwrap();

    let response = read::list_tasks(
        State(rig.ops.clone()),
        Rig::read_headers(),
        Query(TaskFilter {
            state: Some("READY".into()),
            ..TaskFilter::default()
        }),
    )
    .await;
    let (status, body) = response_json(response).await;
    assert!(status.is_success());
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(body["tasks"][0]["id"], "T1");
}

#[tokio::test]
async fn memory_listing_hides_embeddings() {
    let rig = Rig::new().await;
    rig.memory
        .store_memory(warden_memory::StoreMemoryRequest {
            content: "alpha launch notes".into(),
            requested_level: warden_core::MemoryLevel::L1,
            scope: warden_core::TaskScope::Company,
            product_id: None,
            group: warden_core::GroupId::from("developer"),
            source_type: "test".into(),
            tags: vec![],
        })
        .await
        .unwrap();

    let response = read::memories(
        State(rig.ops.clone()),
        Rig::read_headers(),
        Query(MemoryQuery { q: Some("alpha".into()) }),
    )
    .await;
    let (status, body) = response_json(response).await;
    assert!(status.is_success());
    let memories = body["memories"].as_array().unwrap();
    assert_eq!(memories.len(), 1);
    assert!(memories[0].get("embedding").is_none());
    assert_eq!(memories[0]["has_embedding"], false);
}

#[tokio::test]
async fn task_detail_404s_cleanly() {
    let rig = Rig::new().await;
    let response = read::get_task(
        State(rig.ops.clone()),
        Rig::read_headers(),
        Path("missing".into()),
    )
    .await;
    let (status, body) = response_json(response).await;
    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}
