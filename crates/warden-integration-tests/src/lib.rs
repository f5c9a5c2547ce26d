//! Test rig shared by the scenario tests.
//!
//! Assembles the whole control plane over an in-memory store: store,
//! limits, governance, memory, dispatch loop with a recording invoker,
//! and the ops state the HTTP handlers take. Tests drive handlers and
//! services directly; no sockets are opened.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use warden_config::{BreakerSettings, HttpSettings, LimitsSettings};
use warden_core::{
    GateType, GroupId, Priority, TaskId, TaskScope, TaskState, TaskType, WorkerId, WorkerRecord,
    WorkerStatus,
};
use warden_dispatch::{CapabilityRegistry, DispatchLoop, SnapshotWriter, WorkerInvoker};
use warden_events::EventBus;
use warden_governance::{Governance, NewTask};
use warden_limits::LimitsEngine;
use warden_memory::MemoryService;
use warden_ops::OpsState;
use warden_protocol::{DispatchPayload, Verifier};
use warden_store::GovStore;

/// The shared secret every test worker signs with.
pub const TEST_WORKER_SECRET: &str = "test-worker-secret";
/// The read secret of the test ops surface.
pub const TEST_READ_SECRET: &str = "test-read-secret";
/// The current write secret of the test ops surface.
pub const TEST_WRITE_SECRET: &str = "test-write-secret";

/// Records every dispatched payload; optionally fails them all.
pub struct RecordingInvoker {
    calls: Mutex<Vec<DispatchPayload>>,
    fail: bool,
}

impl RecordingInvoker {
    /// A succeeding invoker.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// The payloads seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<DispatchPayload> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        _worker: &WorkerRecord,
        payload: DispatchPayload,
    ) -> Result<(), String> {
        self.calls.lock().unwrap().push(payload);
        if self.fail { Err("invoker failure".into()) } else { Ok(()) }
    }
}

/// A fully wired control plane over an in-memory store.
pub struct Rig {
    /// The shared store.
    pub store: Arc<GovStore>,
    /// The governance service (strict mode off unless rebuilt).
    pub governance: Arc<Governance>,
    /// The limits engine.
    pub limits: LimitsEngine,
    /// The memory service (no embedder).
    pub memory: Arc<MemoryService>,
    /// The event bus.
    pub events: EventBus,
    /// The dispatch loop.
    pub dispatch: Arc<DispatchLoop>,
    /// The loop's recording invoker.
    pub invoker: Arc<RecordingInvoker>,
    /// The ops handler state.
    pub ops: Arc<OpsState>,
    /// IPC snapshot root (kept alive for the rig's lifetime).
    pub ipc_dir: tempfile::TempDir,
}

impl Rig {
    /// Build a rig with one online worker `w1` serving `developer` and
    /// `security`.
    ///
    /// # Panics
    ///
    /// Panics on any setup failure; this is test scaffolding.
    pub async fn new() -> Self {
        Self::with_limit_overrides(&[]).await
    }

    /// Build a rig with explicit `RL_*` / `QUOTA_*` override pairs.
    ///
    /// # Panics
    ///
    /// Panics on any setup failure.
    pub async fn with_limit_overrides(overrides: &[(&str, u64)]) -> Self {
        let store = Arc::new(GovStore::in_memory());
        let events = EventBus::new();

        let mut rate_overrides = HashMap::new();
        let mut quota_overrides = HashMap::new();
        for (key, value) in overrides {
            if key.starts_with("RL_") {
                rate_overrides.insert((*key).to_string(), *value);
            } else {
                quota_overrides.insert((*key).to_string(), *value);
            }
        }
        let limits = LimitsEngine::new(
            Arc::clone(&store),
            LimitsSettings {
                enabled: true,
                ext_calls_enabled: true,
                rate_overrides,
                quota_overrides,
                breaker: BreakerSettings::default(),
            },
            events.clone(),
        );

        let governance = Arc::new(Governance::new(
            Arc::clone(&store),
            warden_policy::ApproverMap::default(),
            false,
        ));
        let memory = Arc::new(MemoryService::new(
            Arc::clone(&store),
            limits.clone(),
            None,
        ));

        store
            .upsert_worker(&WorkerRecord {
                id: WorkerId::new("w1"),
                ssh_host: None,
                ssh_user: None,
                ssh_identity_file: None,
                local_port: 8800,
                remote_port: 8800,
                max_wip: 4,
                current_wip: 0,
                status: WorkerStatus::Online,
                shared_secret: TEST_WORKER_SECRET.into(),
                groups: vec![GroupId::from("developer"), GroupId::from("security")],
            })
            .await
            .unwrap();

        let invoker = Arc::new(RecordingInvoker::ok());
        let ipc_dir = tempfile::tempdir().unwrap();
        let dispatch = Arc::new(DispatchLoop::new(
            Arc::clone(&governance),
            events.clone(),
            Arc::clone(&invoker) as Arc<dyn WorkerInvoker>,
            Arc::new(SnapshotWriter::new(
                ipc_dir.path(),
                CapabilityRegistry::with_defaults(),
            )),
            Duration::from_millis(20),
        ));

        let ops = Arc::new(OpsState {
            governance: Arc::clone(&governance),
            store: Arc::clone(&store),
            limits: limits.clone(),
            memory: Arc::clone(&memory),
            events: events.clone(),
            verifier: Verifier::new(Arc::clone(&store), Duration::from_secs(60)),
            settings: HttpSettings {
                bind_addr: "127.0.0.1:0".into(),
                read_secret: TEST_READ_SECRET.into(),
                write_secret_current: TEST_WRITE_SECRET.into(),
                write_secret_previous: None,
                sse_connection_cap: 3,
            },
            sse_connections: dashmap::DashMap::new(),
            shutdown: CancellationToken::new(),
        });

        Self {
            store,
            governance,
            limits,
            memory,
            events,
            dispatch,
            invoker,
            ops,
            ipc_dir,
        }
    }

    /// Create a task and walk it to READY assigned to `developer`.
    ///
    /// # Panics
    ///
    /// Panics on setup failure.
    pub async fn seed_ready_task(&self, id: &str) -> warden_core::GovTask {
        let task = self
            .governance
            .create_task(NewTask {
                id: TaskId::from(id),
                title: format!("task {id}"),
                description: "do the work".into(),
                task_type: TaskType::Feature,
                priority: Priority::P1,
                gate: None,
                scope: TaskScope::Company,
                product_id: None,
                assigned_group: Some(GroupId::from("developer")),
                created_by: "admin".into(),
                dod_required: false,
                metadata: serde_json::Map::new(),
            })
            .await
            .unwrap();
        self.governance
            .transition(&task.id, TaskState::Triaged, "admin", None, None)
            .await
            .unwrap();
        self.governance
            .transition(&task.id, TaskState::Ready, "admin", None, None)
            .await
            .unwrap();
        self.store.get_task(&task.id).await.unwrap().unwrap()
    }

    /// Set a gate on a task via a raw store patch (bypasses policy).
    ///
    /// # Panics
    ///
    /// Panics on setup failure.
    pub async fn set_gate(&self, id: &TaskId, gate: GateType) {
        let current = self.store.get_task(id).await.unwrap().unwrap();
        let applied = self
            .store
            .update_task(
                id,
                current.version,
                &warden_core::TaskPatch {
                    gate: Some(Some(gate)),
                    ..warden_core::TaskPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(applied);
    }

    /// A loopback source address for handler calls.
    #[must_use]
    pub fn source_addr() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    /// Headers carrying both cockpit secrets.
    #[must_use]
    pub fn write_headers() -> axum::http::HeaderMap {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("X-OS-SECRET", TEST_READ_SECRET.parse().unwrap());
        headers.insert("X-OS-WRITE-SECRET", TEST_WRITE_SECRET.parse().unwrap());
        headers
    }

    /// Headers carrying only the read secret.
    #[must_use]
    pub fn read_headers() -> axum::http::HeaderMap {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("X-OS-SECRET", TEST_READ_SECRET.parse().unwrap());
        headers
    }
}

/// Decode an axum response into (status, JSON body).
///
/// # Panics
///
/// Panics if the body is not JSON.
pub async fn response_json(
    response: axum::response::Response,
) -> (axum::http::StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
