//! Event types for the Warden event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{
    BreakerState, DispatchKey, DispatchStatus, GroupId, LimitOp, TaskId, TunnelState, WorkerId,
    WorkerStatus,
};

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Source component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// All events the control plane can emit.
///
/// Each variant belongs to one named channel (see [`WardenEvent::channel`]);
/// the cockpit filters on the channel name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WardenEvent {
    // ========== Worker fleet ==========
    /// A worker came online, went offline, or changed WIP.
    WorkerStatus {
        /// Event metadata.
        metadata: EventMetadata,
        /// The worker.
        worker_id: WorkerId,
        /// New reachability.
        status: WorkerStatus,
        /// Current work-in-progress.
        current_wip: u32,
    },

    /// An SSH reverse tunnel changed state.
    TunnelStatus {
        /// Event metadata.
        metadata: EventMetadata,
        /// The worker the tunnel belongs to.
        worker_id: WorkerId,
        /// New tunnel state.
        state: TunnelState,
    },

    // ========== Dispatch ==========
    /// A dispatch slot changed status.
    DispatchLifecycle {
        /// Event metadata.
        metadata: EventMetadata,
        /// The idempotency key of the slot.
        dispatch_key: DispatchKey,
        /// The task being dispatched.
        task_id: TaskId,
        /// The target group.
        group: GroupId,
        /// New slot status.
        status: DispatchStatus,
    },

    // ========== Limits ==========
    /// An operation was denied by the limits engine.
    LimitsDenial {
        /// Event metadata.
        metadata: EventMetadata,
        /// The denied operation.
        op: LimitOp,
        /// The scope key the limit was computed over.
        scope_key: String,
        /// The stable denial code.
        code: String,
    },

    /// A circuit breaker changed state.
    BreakerState {
        /// Event metadata.
        metadata: EventMetadata,
        /// The provider the breaker guards.
        provider: String,
        /// New breaker state.
        state: BreakerState,
        /// Failure count at the time of the change.
        fail_count: u32,
    },

    // ========== Complaint vertical (emitted by out-of-tree adapters) ==========
    /// A complaint was created.
    ComplaintCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Opaque complaint id.
        complaint_id: String,
    },

    /// A complaint changed status.
    ComplaintStatusChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// Opaque complaint id.
        complaint_id: String,
        /// New status label.
        status: String,
    },
}

impl WardenEvent {
    /// The channel this event is published on.
    #[must_use]
    pub fn channel(&self) -> &'static str {
        match self {
            Self::WorkerStatus { .. } => "worker:status",
            Self::TunnelStatus { .. } => "tunnel:status",
            Self::DispatchLifecycle { .. } => "dispatch:lifecycle",
            Self::LimitsDenial { .. } => "limits:denial",
            Self::BreakerState { .. } => "breaker:state",
            Self::ComplaintCreated { .. } => "complaint:created",
            Self::ComplaintStatusChanged { .. } => "complaint:status-changed",
        }
    }

    /// The metadata attached to this event.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::WorkerStatus { metadata, .. }
            | Self::TunnelStatus { metadata, .. }
            | Self::DispatchLifecycle { metadata, .. }
            | Self::LimitsDenial { metadata, .. }
            | Self::BreakerState { metadata, .. }
            | Self::ComplaintCreated { metadata, .. }
            | Self::ComplaintStatusChanged { metadata, .. } => metadata,
        }
    }
}
