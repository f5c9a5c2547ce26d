//! The governance task data model.
//!
//! A [`GovTask`] is the unit of work flowing through the control plane.
//! Tasks are never hard-deleted; every mutation goes through an
//! optimistic-locked update keyed on the current version, and every
//! observable action leaves a [`GovActivity`] row behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::ids::{ActivityId, DispatchKey, GroupId, ProductId, TaskId, WorkerId};

/// Lifecycle state of a governance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Newly arrived, not yet classified.
    Inbox,
    /// Classified and prioritised.
    Triaged,
    /// Ready for dispatch to its assigned group.
    Ready,
    /// A worker is executing it.
    Doing,
    /// Execution finished, awaiting review.
    Review,
    /// Under gate approval.
    Approval,
    /// Terminal.
    Done,
    /// Parked; can re-enter the active states.
    Blocked,
}

impl TaskState {
    /// The wire representation (`READY`, `DOING`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Triaged => "TRIAGED",
            Self::Ready => "READY",
            Self::Doing => "DOING",
            Self::Review => "REVIEW",
            Self::Approval => "APPROVAL",
            Self::Done => "DONE",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Parse a wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INBOX" => Some(Self::Inbox),
            "TRIAGED" => Some(Self::Triaged),
            "READY" => Some(Self::Ready),
            "DOING" => Some(Self::Doing),
            "REVIEW" => Some(Self::Review),
            "APPROVAL" => Some(Self::Approval),
            "DONE" => Some(Self::Done),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// All states, in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::Inbox,
        Self::Triaged,
        Self::Ready,
        Self::Doing,
        Self::Review,
        Self::Approval,
        Self::Done,
        Self::Blocked,
    ];
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TaskType {
    Epic,
    Feature,
    Bug,
    Security,
    Revops,
    Ops,
    Research,
    Content,
    Doc,
    Incident,
}

impl TaskType {
    /// Task types whose completion requires updated documentation.
    #[must_use]
    pub fn requires_docs(self) -> bool {
        matches!(self, Self::Security | Self::Revops | Self::Incident | Self::Feature)
    }
}

/// Task priority, `P0` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

/// A required approval between REVIEW and DONE.
///
/// Each gate maps to exactly one approver group per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateType {
    /// Security review gate.
    Security,
    /// Revenue-operations gate.
    RevOps,
    /// Claims gate.
    Claims,
    /// Product gate.
    Product,
}

impl GateType {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "Security",
            Self::RevOps => "RevOps",
            Self::Claims => "Claims",
            Self::Product => "Product",
        }
    }

    /// Parse a wire representation. `"None"` parses to `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Security" => Some(Self::Security),
            "RevOps" => Some(Self::RevOps),
            "Claims" => Some(Self::Claims),
            "Product" => Some(Self::Product),
            _ => None,
        }
    }
}

impl fmt::Display for GateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a task (or memory) belongs to the whole company or one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskScope {
    /// Visible company-wide (subject to level checks).
    Company,
    /// Isolated to a single product.
    Product,
}

/// The unit of work owned by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovTask {
    /// Opaque stable id.
    pub id: TaskId,
    /// Short human title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Work classification.
    pub task_type: TaskType,
    /// Priority, `P0` highest.
    pub priority: Priority,
    /// Lifecycle state.
    pub state: TaskState,
    /// Required approval gate, if any.
    #[serde(default)]
    pub gate: Option<GateType>,
    /// Company or product scope.
    pub scope: TaskScope,
    /// Product the task belongs to; required when `scope` is `Product`.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    /// Worker group folder the task is assigned to.
    #[serde(default)]
    pub assigned_group: Option<GroupId>,
    /// The identity executing the task.
    #[serde(default)]
    pub executor: Option<String>,
    /// Who created the task (channel or admin identity).
    pub created_by: String,
    /// Whether a definition-of-done checklist is required before DOING.
    #[serde(default)]
    pub dod_required: bool,
    /// Open-world metadata blob. Unknown keys are preserved on round-trip.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Monotone version counter; increments on every update.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl GovTask {
    /// Whether the task's scope invariant holds (PRODUCT ⇒ product_id).
    #[must_use]
    pub fn scope_is_consistent(&self) -> bool {
        self.scope != TaskScope::Product || self.product_id.is_some()
    }
}

/// A partial update applied to a task under optimistic locking.
///
/// Only the populated fields change; `metadata` entries are merged into
/// the existing blob so unknown keys written by other principals survive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New gate. `Some(None)` clears the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<Option<GateType>>,
    /// New assigned group. `Some(None)` unassigns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_group: Option<Option<GroupId>>,
    /// New executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<Option<String>>,
    /// Metadata entries to merge in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl TaskPatch {
    /// A patch that only moves the task to a new state.
    #[must_use]
    pub fn to_state(state: TaskState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Apply the patch to a task in place. Does not touch the version;
    /// the store bumps it as part of the conditional write.
    pub fn apply(&self, task: &mut GovTask) {
        if let Some(state) = self.state {
            task.state = state;
        }
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(gate) = self.gate {
            task.gate = gate;
        }
        if let Some(group) = &self.assigned_group {
            task.assigned_group.clone_from(group);
        }
        if let Some(executor) = &self.executor {
            task.executor.clone_from(executor);
        }
        if let Some(entries) = &self.metadata {
            for (k, v) in entries {
                task.metadata.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Action recorded by an activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ActivityAction {
    Create,
    Transition,
    Approve,
    Override,
    Assign,
    Evidence,
    ExecutionSummary,
    CoerceScope,
}

impl ActivityAction {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Transition => "transition",
            Self::Approve => "approve",
            Self::Override => "override",
            Self::Assign => "assign",
            Self::Evidence => "evidence",
            Self::ExecutionSummary => "execution_summary",
            Self::CoerceScope => "coerce_scope",
        }
    }

    /// Actions that carry cross-agent meaning and belong in context packs.
    #[must_use]
    pub fn is_cross_agent(self) -> bool {
        matches!(
            self,
            Self::Transition
                | Self::Approve
                | Self::Evidence
                | Self::ExecutionSummary
                | Self::CoerceScope
        )
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit log entry; one row per governance action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovActivity {
    /// Unique entry id.
    pub id: ActivityId,
    /// The task this entry belongs to.
    pub task_id: TaskId,
    /// Per-task sequence number; assigned by the store, strictly increasing.
    pub seq: u64,
    /// What happened.
    pub action: ActivityAction,
    /// State before a transition, if applicable.
    #[serde(default)]
    pub from_state: Option<TaskState>,
    /// State after a transition, if applicable.
    #[serde(default)]
    pub to_state: Option<TaskState>,
    /// Acting principal (`system`, a group folder, or an admin identity).
    pub actor: String,
    /// Free-form reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// When the entry was appended.
    pub at: DateTime<Utc>,
}

/// Idempotent record of a gate approval; unique on (task, gate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovApproval {
    /// The approved task.
    pub task_id: TaskId,
    /// Which gate was approved.
    pub gate: GateType,
    /// The approving principal.
    pub approved_by: String,
    /// Approval timestamp.
    pub approved_at: DateTime<Utc>,
    /// Optional reviewer notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Status of an idempotent dispatch slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum DispatchStatus {
    Enqueued,
    Started,
    Done,
    Failed,
}

impl DispatchStatus {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "ENQUEUED",
            Self::Started => "STARTED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

/// Idempotent dispatch slot; unique on its [`DispatchKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovDispatch {
    /// The idempotency key (`{task}:{from}->{to}:v{version}`).
    pub key: DispatchKey,
    /// The task being dispatched.
    pub task_id: TaskId,
    /// The group the job targets.
    pub group: GroupId,
    /// The worker host the job landed on, once known.
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
    /// Slot status.
    pub status: DispatchStatus,
    /// When the slot was claimed.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}
