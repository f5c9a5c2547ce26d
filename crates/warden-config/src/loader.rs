//! Environment capture and parsing.

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use warden_core::{GateType, GroupId};

use crate::types::{
    BreakerSettings, DispatchSettings, EmbeddingSettings, HttpSettings, LimitsSettings,
    PathSettings, WardenConfig, WorkerSettings,
};

/// A snapshot of the variables configuration is read from.
///
/// Tests construct one from a map; production code snapshots the process
/// environment once, so nothing observes a mid-run environment change.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Snapshot the process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a source from explicit pairs (tests).
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(raw) => matches!(raw, "1" | "true" | "TRUE" | "yes" | "on"),
            None => default,
        }
    }

    fn number<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key).map(str::parse) {
            Some(Ok(v)) => v,
            Some(Err(_)) => {
                warn!(key, "unparseable numeric env var, using default");
                default
            },
            None => default,
        }
    }

    /// Collect numeric variables whose name starts with `prefix`.
    fn numeric_table(&self, prefix: &str) -> HashMap<String, u64> {
        self.vars
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter_map(|(k, v)| match v.parse::<u64>() {
                Ok(n) => Some((k.clone(), n)),
                Err(_) => {
                    warn!(key = %k, "unparseable limit override, ignoring");
                    None
                },
            })
            .collect()
    }
}

/// Load configuration from the process environment.
#[must_use]
pub fn load() -> WardenConfig {
    load_from(&EnvSource::from_process())
}

/// Load configuration from an explicit source.
#[must_use]
pub fn load_from(env: &EnvSource) -> WardenConfig {
    WardenConfig {
        http: HttpSettings {
            bind_addr: env.string("OPS_BIND_ADDR", "127.0.0.1:8787"),
            read_secret: env.string("OS_HTTP_SECRET", ""),
            write_secret_current: env.string("COCKPIT_WRITE_SECRET_CURRENT", ""),
            write_secret_previous: env
                .get("COCKPIT_WRITE_SECRET_PREVIOUS")
                .filter(|s| !s.is_empty())
                .map(String::from),
            sse_connection_cap: env.number("SSE_CONNECTION_CAP", 3),
        },
        limits: LimitsSettings {
            enabled: env.flag("LIMITS_ENABLED", true),
            ext_calls_enabled: env.flag("EXT_CALLS_ENABLED", true),
            rate_overrides: env.numeric_table("RL_"),
            quota_overrides: env.numeric_table("QUOTA_"),
            breaker: BreakerSettings {
                open_after_fails: env.number("BREAKER_OPEN_AFTER_FAILS", 5),
                cooldown: Duration::from_secs(env.number("BREAKER_COOLDOWN_SEC", 30)),
                fail_window: Duration::from_secs(env.number("BREAKER_FAIL_WINDOW_SEC", 120)),
                half_open_probes: env.number("BREAKER_HALF_OPEN_PROBES", 1),
            },
        },
        worker: WorkerSettings {
            shared_secret: env.string("WORKER_SHARED_SECRET", ""),
            hmac_ttl: Duration::from_secs(env.number("WORKER_HMAC_TTL_SEC", 60)),
            idle_timeout: Duration::from_secs(env.number("WORKER_IDLE_TIMEOUT_SEC", 30 * 60)),
            provider_deadline: Duration::from_secs(env.number("PROVIDER_DEADLINE_SEC", 10)),
        },
        dispatch: DispatchSettings {
            poll_interval: Duration::from_millis(env.number("GOV_POLL_INTERVAL", 10_000)),
            context_pack_activities: env.number("CONTEXT_PACK_ACTIVITIES", 20),
        },
        embeddings: EmbeddingSettings {
            enabled: env.flag("EMBEDDINGS_ENABLED", false),
            model: env.string("EMBEDDINGS_MODEL", "text-embedding-3-small"),
            url: env.string("EMBEDDINGS_URL", ""),
        },
        paths: PathSettings {
            data_dir: env.string("WARDEN_DATA_DIR", "./data"),
            ipc_root: env.string("WARDEN_IPC_DIR", "./ipc"),
        },
        approvers: approver_entries(env),
        strict_policy: env.flag("GOV_STRICT_POLICY", true),
    }
}

/// Gate routing entries, overridable per gate with `APPROVER_{GATE}`.
fn approver_entries(env: &EnvSource) -> Vec<(GateType, GroupId)> {
    let entry = |gate: GateType, var: &str, default: &str| {
        (gate, GroupId::new(env.string(var, default)))
    };
    vec![
        entry(GateType::Security, "APPROVER_SECURITY", "security"),
        entry(GateType::RevOps, "APPROVER_REVOPS", "revops"),
        entry(GateType::Claims, "APPROVER_CLAIMS", "claims"),
        entry(GateType::Product, "APPROVER_PRODUCT", "product"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::LimitOp;

    #[test]
    fn test_defaults_without_env() {
        let config = load_from(&EnvSource::default());
        assert!(config.limits.enabled);
        assert!(!config.embeddings.enabled);
        assert_eq!(config.dispatch.poll_interval, Duration::from_millis(10_000));
        assert_eq!(config.worker.hmac_ttl, Duration::from_secs(60));
        assert_eq!(config.http.sse_connection_cap, 3);
    }

    #[test]
    fn test_overrides_are_captured() {
        let env = EnvSource::from_pairs([
            ("LIMITS_ENABLED", "false"),
            ("GOV_POLL_INTERVAL", "500"),
            ("RL_EXT_CALL_PER_MIN_DEVELOPER", "0"),
            ("QUOTA_EMBED_HARD", "9"),
            ("COCKPIT_WRITE_SECRET_PREVIOUS", "old"),
        ]);
        let config = load_from(&env);
        assert!(!config.limits.enabled);
        assert_eq!(config.dispatch.poll_interval, Duration::from_millis(500));
        assert_eq!(config.limits.rate_limit(LimitOp::ExtCall, Some("developer")), 0);
        assert_eq!(config.limits.quota(LimitOp::Embed, None).hard, 9);
        assert_eq!(config.http.write_secret_previous.as_deref(), Some("old"));
    }

    #[test]
    fn test_garbage_numbers_fall_back() {
        let env = EnvSource::from_pairs([("GOV_POLL_INTERVAL", "soon")]);
        let config = load_from(&env);
        assert_eq!(config.dispatch.poll_interval, Duration::from_millis(10_000));
    }
}
