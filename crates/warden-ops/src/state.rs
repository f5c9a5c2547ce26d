//! Shared state for the ops surface.

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use warden_config::HttpSettings;
use warden_events::EventBus;
use warden_governance::Governance;
use warden_limits::LimitsEngine;
use warden_memory::MemoryService;
use warden_protocol::Verifier;
use warden_store::GovStore;

/// Everything the handlers need.
pub struct OpsState {
    /// The governance write path.
    pub governance: Arc<Governance>,
    /// The shared store, for read endpoints.
    pub store: Arc<GovStore>,
    /// Limits enforcement (cockpit writes).
    pub limits: LimitsEngine,
    /// The memory service, for search and IPC.
    pub memory: Arc<MemoryService>,
    /// The event bus feeding the SSE stream.
    pub events: EventBus,
    /// Verifier for signed worker traffic.
    pub verifier: Verifier,
    /// HTTP settings (secrets, SSE cap).
    pub settings: HttpSettings,
    /// Live SSE connection count per source IP.
    pub sse_connections: DashMap<IpAddr, usize>,
    /// Cancelled at shutdown; SSE streams flush their goodbye on it.
    pub shutdown: CancellationToken,
}

/// The state handle handlers receive.
pub type SharedState = Arc<OpsState>;

impl std::fmt::Debug for OpsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsState").finish_non_exhaustive()
    }
}
