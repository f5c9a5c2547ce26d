//! Replay defence and completion handling through the ops endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;

use warden_core::{DispatchKey, DispatchStatus, GovDispatch, GroupId, TaskState, WorkerId};
use warden_integration_tests::{Rig, TEST_WORKER_SECRET, response_json};
use warden_ops::worker::{worker_completion, worker_ipc};
use warden_protocol::sign_body;

fn signed_headers(body: &[u8], group: Option<&str>) -> HeaderMap {
    let bundle = sign_body(TEST_WORKER_SECRET, body);
    let mut headers = HeaderMap::new();
    headers.insert("X-Worker-Id", "w1".parse().unwrap());
    headers.insert("X-Worker-HMAC", bundle.hmac.parse().unwrap());
    headers.insert("X-Worker-Timestamp", bundle.timestamp.parse().unwrap());
    headers.insert("X-Worker-RequestId", bundle.request_id.parse().unwrap());
    if let Some(group) = group {
        headers.insert("X-Worker-GroupFolder", group.parse().unwrap());
    }
    headers
}

#[tokio::test]
async fn replayed_ipc_request_is_rejected() {
    let rig = Rig::new().await;
    let body = br#"{"type":"memory_recall","query":"deploy window"}"#.to_vec();
    let headers = signed_headers(&body, Some("developer"));

    // First delivery verifies and answers.
    let response = worker_ipc(
        State(rig.ops.clone()),
        headers.clone(),
        Bytes::from(body.clone()),
    )
    .await;
    let (status, json) = response_json(response).await;
    assert!(status.is_success());
    assert_eq!(json["ok"], true);

    // Identical envelope again: replay.
    let response = worker_ipc(State(rig.ops.clone()), headers, Bytes::from(body)).await;
    let (status, json) = response_json(response).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "REPLAY_DETECTED");
}

#[tokio::test]
async fn tampered_body_fails_hmac() {
    let rig = Rig::new().await;
    let body = br#"{"type":"memory_recall","query":"deploy window"}"#.to_vec();
    let headers = signed_headers(&body, Some("developer"));

    let tampered = br#"{"type":"memory_recall","query":"deploy secret"}"#.to_vec();
    let response = worker_ipc(State(rig.ops.clone()), headers, Bytes::from(tampered)).await;
    let (status, json) = response_json(response).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "HMAC_INVALID");
}

#[tokio::test]
async fn ipc_memory_store_flows_through_classification() {
    let rig = Rig::new().await;
    let body = serde_json::to_vec(&serde_json::json!({
        "type": "memory_store",
        "content": "the deploy window opens at dawn",
        "level": "L1",
        "tags": ["ops"],
        "idempotency_key": "k1",
    }))
    .unwrap();
    let headers = signed_headers(&body, Some("developer"));

    let response = worker_ipc(State(rig.ops.clone()), headers, Bytes::from(body)).await;
    let (status, json) = response_json(response).await;
    assert!(status.is_success());
    assert_eq!(json["ok"], true);
    assert_eq!(json["data"]["level"], "L1");
    assert_eq!(json["data"]["piiDetected"], false);
}

#[tokio::test]
async fn completion_resolves_dispatch_and_wip() {
    let rig = Rig::new().await;
    let task = rig.seed_ready_task("T9").await;
    let key = DispatchKey::build(&task.id, TaskState::Ready, TaskState::Doing, task.version);

    let now = chrono::Utc::now();
    rig.store
        .try_create_dispatch(&GovDispatch {
            key: key.clone(),
            task_id: task.id.clone(),
            group: GroupId::from("developer"),
            worker_id: Some(WorkerId::new("w1")),
            status: DispatchStatus::Started,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    rig.store.adjust_worker_wip(&WorkerId::new("w1"), 1).await.unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "taskId": "T9",
        "groupFolder": "developer",
        "status": "ok",
        "dispatchKey": key.as_str(),
    }))
    .unwrap();
    let headers = signed_headers(&body, None);

    let response = worker_completion(State(rig.ops.clone()), headers, Bytes::from(body)).await;
    let (status, json) = response_json(response).await;
    assert!(status.is_success());
    assert_eq!(json["ok"], true);

    let slot = rig.store.get_dispatch(&key).await.unwrap().unwrap();
    assert_eq!(slot.status, DispatchStatus::Done);
    let worker = rig.store.get_worker(&WorkerId::new("w1")).await.unwrap().unwrap();
    assert_eq!(worker.current_wip, 0);
}
