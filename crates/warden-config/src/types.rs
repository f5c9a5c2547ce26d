//! Typed configuration sections.

use std::collections::HashMap;
use std::time::Duration;

use warden_core::{GateType, GroupId, LimitOp};

/// Everything the control plane reads from its host environment.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Ops HTTP surface.
    pub http: HttpSettings,
    /// Limits engine tuning.
    pub limits: LimitsSettings,
    /// Worker protocol tuning.
    pub worker: WorkerSettings,
    /// Dispatch loop tuning.
    pub dispatch: DispatchSettings,
    /// Embedding pipeline.
    pub embeddings: EmbeddingSettings,
    /// Filesystem layout.
    pub paths: PathSettings,
    /// Gate → approver-group routing for this deployment.
    pub approvers: Vec<(GateType, GroupId)>,
    /// Whether strict-mode policy gates are active. Host-side only;
    /// agents cannot toggle this.
    pub strict_policy: bool,
}

/// Ops HTTP settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Bind address for the ops server.
    pub bind_addr: String,
    /// Shared read secret (`X-OS-SECRET`).
    pub read_secret: String,
    /// Current cockpit write secret.
    pub write_secret_current: String,
    /// Previous cockpit write secret, present mid-rotation.
    pub write_secret_previous: Option<String>,
    /// Max concurrent SSE connections per source IP.
    pub sse_connection_cap: usize,
}

/// Soft and hard daily thresholds for one (op, group) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaThresholds {
    /// Above this, allowed with a warning.
    pub soft: u64,
    /// Above this, denied.
    pub hard: u64,
}

/// Limits engine settings.
///
/// Overrides are captured as raw `(env key, value)` pairs at load time;
/// lookups construct candidate keys most-specific-first, so a
/// `RL_EXT_CALL_PER_MIN_DEVELOPER` beats `RL_EXT_CALL_PER_MIN`.
#[derive(Debug, Clone)]
pub struct LimitsSettings {
    /// Global kill switch (`LIMITS_ENABLED`).
    pub enabled: bool,
    /// External-call kill switch (`EXT_CALLS_ENABLED`).
    pub ext_calls_enabled: bool,
    /// Per-minute override table, keyed by raw env name.
    pub rate_overrides: HashMap<String, u64>,
    /// Daily quota override table, keyed by raw env name.
    pub quota_overrides: HashMap<String, u64>,
    /// Circuit-breaker tuning.
    pub breaker: BreakerSettings,
}

impl LimitsSettings {
    /// Default per-minute limits per operation.
    #[must_use]
    pub fn default_rate(op: LimitOp) -> u64 {
        match op {
            LimitOp::ExtCall => 20,
            LimitOp::Embed => 60,
            LimitOp::GovTransition => 60,
            LimitOp::CockpitWrite => 30,
        }
    }

    /// Default daily thresholds per operation.
    #[must_use]
    pub fn default_quota(op: LimitOp) -> QuotaThresholds {
        match op {
            LimitOp::ExtCall => QuotaThresholds { soft: 200, hard: 500 },
            LimitOp::Embed => QuotaThresholds { soft: 1000, hard: 2000 },
            LimitOp::GovTransition => QuotaThresholds { soft: 500, hard: 1000 },
            LimitOp::CockpitWrite => QuotaThresholds { soft: 300, hard: 600 },
        }
    }

    fn op_env(op: LimitOp) -> &'static str {
        match op {
            LimitOp::ExtCall => "EXT_CALL",
            LimitOp::Embed => "EMBED",
            LimitOp::GovTransition => "GOV_TRANSITION",
            LimitOp::CockpitWrite => "COCKPIT_WRITE",
        }
    }

    /// Resolve the per-minute limit for (op, group).
    ///
    /// A configured value of zero is meaningful: the enforcement layer
    /// treats it as a hard deny, not a rate limit.
    #[must_use]
    pub fn rate_limit(&self, op: LimitOp, group: Option<&str>) -> u64 {
        let op_key = Self::op_env(op);
        if let Some(group) = group {
            let specific = format!("RL_{}_PER_MIN_{}", op_key, group.to_uppercase());
            if let Some(v) = self.rate_overrides.get(&specific) {
                return *v;
            }
        }
        self.rate_overrides
            .get(&format!("RL_{op_key}_PER_MIN"))
            .copied()
            .unwrap_or_else(|| Self::default_rate(op))
    }

    /// Resolve the daily thresholds for (op, group).
    #[must_use]
    pub fn quota(&self, op: LimitOp, group: Option<&str>) -> QuotaThresholds {
        let op_key = Self::op_env(op);
        let lookup = |suffix: &str| -> Option<u64> {
            if let Some(group) = group {
                let specific =
                    format!("QUOTA_{}_{}_{}", op_key, group.to_uppercase(), suffix);
                if let Some(v) = self.quota_overrides.get(&specific) {
                    return Some(*v);
                }
            }
            self.quota_overrides
                .get(&format!("QUOTA_{op_key}_{suffix}"))
                .copied()
        };
        let defaults = Self::default_quota(op);
        QuotaThresholds {
            soft: lookup("SOFT").unwrap_or(defaults.soft),
            hard: lookup("HARD").unwrap_or(defaults.hard),
        }
    }
}

/// Circuit-breaker tuning. Read once at startup, never per-request.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Failures before CLOSED → OPEN.
    pub open_after_fails: u32,
    /// Seconds before OPEN → HALF_OPEN is considered.
    pub cooldown: Duration,
    /// Failures older than this no longer count toward opening.
    pub fail_window: Duration,
    /// Probes allowed through in HALF_OPEN.
    pub half_open_probes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            open_after_fails: 5,
            cooldown: Duration::from_secs(30),
            fail_window: Duration::from_secs(120),
            half_open_probes: 1,
        }
    }
}

/// Worker protocol settings.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Default HMAC key for workers without a per-worker override.
    pub shared_secret: String,
    /// Signature TTL; timestamps farther from now than this are rejected.
    pub hmac_ttl: Duration,
    /// Idle timeout for a dispatched job.
    pub idle_timeout: Duration,
    /// Per-call deadline for external provider calls.
    pub provider_deadline: Duration,
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Tick period (`GOV_POLL_INTERVAL`, milliseconds).
    pub poll_interval: Duration,
    /// How many recent activities a context pack includes.
    pub context_pack_activities: usize,
}

/// Embedding pipeline settings.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Kill switch (`EMBEDDINGS_ENABLED`).
    pub enabled: bool,
    /// Model identifier; part of the embed rate scope key.
    pub model: String,
    /// Endpoint URL.
    pub url: String,
}

/// Filesystem layout.
#[derive(Debug, Clone)]
pub struct PathSettings {
    /// Durable store directory.
    pub data_dir: String,
    /// Root of the per-group IPC directories.
    pub ipc_root: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_lookup_prefers_group_override() {
        let mut overrides = HashMap::new();
        overrides.insert("RL_EXT_CALL_PER_MIN".to_string(), 10);
        overrides.insert("RL_EXT_CALL_PER_MIN_DEVELOPER".to_string(), 3);
        let limits = LimitsSettings {
            enabled: true,
            ext_calls_enabled: true,
            rate_overrides: overrides,
            quota_overrides: HashMap::new(),
            breaker: BreakerSettings::default(),
        };
        assert_eq!(limits.rate_limit(LimitOp::ExtCall, Some("developer")), 3);
        assert_eq!(limits.rate_limit(LimitOp::ExtCall, Some("security")), 10);
        assert_eq!(
            limits.rate_limit(LimitOp::Embed, Some("developer")),
            LimitsSettings::default_rate(LimitOp::Embed)
        );
    }

    #[test]
    fn test_quota_lookup_merges_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("QUOTA_EMBED_SOFT".to_string(), 7);
        let limits = LimitsSettings {
            enabled: true,
            ext_calls_enabled: true,
            rate_overrides: HashMap::new(),
            quota_overrides: overrides,
            breaker: BreakerSettings::default(),
        };
        let q = limits.quota(LimitOp::Embed, None);
        assert_eq!(q.soft, 7);
        assert_eq!(q.hard, LimitsSettings::default_quota(LimitOp::Embed).hard);
    }
}
