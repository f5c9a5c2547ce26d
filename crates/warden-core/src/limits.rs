//! Limits and external-call records.
//!
//! Rate, quota and breaker rows are plain counters owned by the store;
//! the enforcement logic lives in `warden-limits`. The denial log is
//! deliberately parameter-free: a denial row can never leak a request
//! payload because the row type has nowhere to put one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::TaskId;

/// Side-effectful operations subject to limit enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitOp {
    /// Capability-scoped external-provider call.
    ExtCall,
    /// Embedding API request.
    Embed,
    /// Governance state transition.
    GovTransition,
    /// Cockpit write action.
    CockpitWrite,
}

impl LimitOp {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExtCall => "ext_call",
            Self::Embed => "embed",
            Self::GovTransition => "gov_transition",
            Self::CockpitWrite => "cockpit_write",
        }
    }
}

impl fmt::Display for LimitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit-breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-provider circuit-breaker row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerRecord {
    /// Provider name (`github`, `calendar`, ...).
    pub provider: String,
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures inside the failure window.
    pub fail_count: u32,
    /// When the breaker last opened.
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    /// When the last failure was recorded; used for the failure window.
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Probes issued since entering HALF_OPEN.
    #[serde(default)]
    pub probes_issued: u32,
}

impl BreakerRecord {
    /// A fresh CLOSED breaker for a provider.
    #[must_use]
    pub fn closed(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            state: BreakerState::Closed,
            fail_count: 0,
            opened_at: None,
            last_failure_at: None,
            probes_issued: 0,
        }
    }
}

/// Result of a quota increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Units used today, including this increment.
    pub used: u64,
    /// Soft threshold; above it the call is allowed with a warning.
    pub soft: u64,
    /// Hard threshold; above it the call is denied.
    pub hard: u64,
}

impl QuotaUsage {
    /// Whether usage exceeds the hard threshold.
    #[must_use]
    pub fn exceeded(&self) -> bool {
        self.used > self.hard
    }

    /// Whether usage is in the soft-warning band (soft < used ≤ hard).
    #[must_use]
    pub fn soft_warn(&self) -> bool {
        self.used > self.soft && self.used <= self.hard
    }
}

/// One denial, aggregated for the dashboard.
///
/// Carries only the operation, scope key, code and timestamp. Request
/// parameters and payloads are never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialRecord {
    /// The denied operation.
    pub op: LimitOp,
    /// The scope key the limit was computed over.
    pub scope_key: String,
    /// The stable denial code.
    pub code: String,
    /// When the denial happened.
    pub at: DateTime<Utc>,
}

/// Log row for a capability-scoped external-provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtCallRecord {
    /// The task the call was made on behalf of, if any.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Calling group folder.
    pub group: String,
    /// Provider name.
    pub provider: String,
    /// Action name within the provider.
    pub action: String,
    /// Whether the call succeeded.
    pub ok: bool,
    /// When the call completed.
    pub at: DateTime<Utc>,
}
