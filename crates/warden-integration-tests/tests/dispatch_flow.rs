//! Dispatch-loop scenarios: the happy path, the optimistic race, and
//! crash-safe idempotency.

use std::time::Duration;

use axum::extract::{ConnectInfo, Json, State};
use chrono::Utc;
use serde_json::json;

use warden_core::{
    ActivityAction, DispatchKey, DispatchStatus, GovDispatch, GroupId, TaskState, WorkerId,
};
use warden_integration_tests::{Rig, response_json};
use warden_ops::actions;

async fn wait_for_dispatch(rig: &Rig, key: &DispatchKey, status: DispatchStatus) {
    for _ in 0..200 {
        if let Some(slot) = rig.store.get_dispatch(key).await.unwrap()
            && slot.status == status
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("dispatch {key} never reached {status:?}");
}

#[tokio::test]
async fn policy_gated_transition_success() {
    let rig = Rig::new().await;
    let task = rig.seed_ready_task("T1").await;
    let key = DispatchKey::build(&task.id, TaskState::Ready, TaskState::Doing, task.version);
    assert_eq!(key.as_str(), "T1:READY->DOING:v2");

    rig.dispatch.tick().await.unwrap();
    wait_for_dispatch(&rig, &key, DispatchStatus::Done).await;

    // Task moved with one version bump.
    let stored = rig.store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Doing);
    assert_eq!(stored.version, task.version + 1);

    // Exactly one system transition activity READY -> DOING.
    let activities = rig.store.activities_for(&task.id).await.unwrap();
    let system_transitions: Vec<_> = activities
        .iter()
        .filter(|a| {
            a.action == ActivityAction::Transition
                && a.actor == "system"
                && a.from_state == Some(TaskState::Ready)
                && a.to_state == Some(TaskState::Doing)
        })
        .collect();
    assert_eq!(system_transitions.len(), 1);

    // The worker job actually ran.
    assert_eq!(rig.invoker.calls().len(), 1);
}

#[tokio::test]
async fn optimistic_conflict_has_one_winner() {
    let rig = Rig::new().await;
    // Task at REVIEW with a Security gate; the loop and the cockpit
    // will both try REVIEW -> APPROVAL against the same version.
    let task = rig.seed_ready_task("T2").await;
    rig.governance
        .transition(&task.id, TaskState::Doing, "admin", None, None)
        .await
        .unwrap();
    rig.governance
        .transition(&task.id, TaskState::Review, "admin", None, None)
        .await
        .unwrap();
    rig.set_gate(&task.id, warden_core::GateType::Security).await;
    let current = rig.store.get_task(&task.id).await.unwrap().unwrap();
    let contested_version = current.version;

    let cockpit = {
        let state = State(rig.ops.clone());
        let task_id = task.id.to_string();
        async move {
            actions::action_transition(
                state,
                ConnectInfo(Rig::source_addr()),
                Rig::write_headers(),
                Json(
                    serde_json::from_value(json!({
                        "taskId": task_id,
                        "toState": "APPROVAL",
                        "expectedVersion": contested_version,
                    }))
                    .unwrap(),
                ),
            )
            .await
        }
    };
    let loop_tick = rig.dispatch.tick();

    let (cockpit_response, tick_result) = tokio::join!(cockpit, loop_tick);
    tick_result.unwrap();
    let (cockpit_status, cockpit_body) = response_json(cockpit_response).await;

    // Give the enqueued job (if any) time to settle.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The task advanced exactly once.
    let stored = rig.store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Approval);
    assert_eq!(stored.version, contested_version + 1);

    let key = DispatchKey::build(
        &task.id,
        TaskState::Review,
        TaskState::Approval,
        contested_version,
    );
    let slot = rig.store.get_dispatch(&key).await.unwrap();

    if cockpit_status.is_success() {
        assert_eq!(cockpit_body["ok"], true);
        // The loop either lost the race (FAILED slot) or never claimed.
        if let Some(slot) = slot {
            assert_eq!(slot.status, DispatchStatus::Failed);
        }
    } else {
        // The loop won. Depending on when the cockpit read the row it
        // sees the version conflict, or (reading after the write) an
        // APPROVAL -> APPROVAL edge rejection. Either way it carries
        // the row's current coordinates.
        let code = cockpit_body["error"].as_str().unwrap().to_string();
        match code.as_str() {
            "VERSION_CONFLICT" => {
                assert_eq!(cockpit_status, axum::http::StatusCode::CONFLICT);
                assert_eq!(cockpit_body["current_version"], contested_version + 1);
            },
            "INVALID_TRANSITION" => {
                assert_eq!(cockpit_status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(cockpit_body["current_state"], "APPROVAL");
            },
            other => panic!("unexpected cockpit denial: {other}"),
        }
        let slot = slot.expect("winning loop leaves its slot");
        assert_ne!(slot.status, DispatchStatus::Failed);
    }
}

#[tokio::test]
async fn idempotent_dispatch_survives_crash() {
    let rig = Rig::new().await;
    let task = rig.seed_ready_task("T6").await;
    let key = DispatchKey::build(&task.id, TaskState::Ready, TaskState::Doing, task.version);

    // A worker died mid-run before the crash: the slot is STARTED and
    // the task already moved to DOING.
    let now = Utc::now();
    assert!(
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
            .unwrap()
    );
    rig.governance
        .dispatch_transition(&task, TaskState::Doing)
        .await
        .unwrap();

    // Restarted CP: recovery skips STARTED rows, ticks claim nothing.
    assert_eq!(rig.dispatch.recover().await.unwrap(), 0);
    rig.dispatch.tick().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let slots = rig.store.list_dispatches().await.unwrap();
    assert_eq!(slots.len(), 1, "no second slot for {key}");
    assert_eq!(slots[0].status, DispatchStatus::Started);
    assert!(rig.invoker.calls().is_empty());
}
