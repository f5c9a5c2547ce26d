//! The enforcement façade composing kill switches, rate, breaker, quota.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use warden_config::LimitsSettings;
use warden_core::{DenialRecord, ErrorCode, LimitOp};
use warden_events::{EventBus, EventMetadata, WardenEvent};
use warden_store::{GovStore, StoreResult};

use crate::breaker::CircuitBreakers;

/// One enforcement request.
#[derive(Debug, Clone)]
pub struct EnforceRequest {
    /// The operation class.
    pub op: LimitOp,
    /// The group component of the scope, when one exists; used for
    /// per-group limit lookup.
    pub group: Option<String>,
    /// The colon-joined scope key the counters are bucketed by
    /// (`group:provider:L1`, `group:model`, a source IP, ...).
    pub scope_key: String,
    /// Provider to consult the breaker for (external ops only).
    pub provider: Option<String>,
}

impl EnforceRequest {
    /// An external-provider call: scope `group:provider:L{level}`.
    #[must_use]
    pub fn ext_call(group: &str, provider: &str, level: u8) -> Self {
        Self {
            op: LimitOp::ExtCall,
            group: Some(group.to_string()),
            scope_key: format!("{group}:{provider}:L{level}"),
            provider: Some(provider.to_string()),
        }
    }

    /// An embedding request: scope `group:model`.
    #[must_use]
    pub fn embed(group: &str, model: &str, provider: &str) -> Self {
        Self {
            op: LimitOp::Embed,
            group: Some(group.to_string()),
            scope_key: format!("{group}:{model}"),
            provider: Some(provider.to_string()),
        }
    }

    /// A governance transition: scope is the acting group.
    #[must_use]
    pub fn gov_transition(group: &str) -> Self {
        Self {
            op: LimitOp::GovTransition,
            group: Some(group.to_string()),
            scope_key: group.to_string(),
            provider: None,
        }
    }

    /// A cockpit write: scope is the source IP.
    #[must_use]
    pub fn cockpit_write(source_ip: &str) -> Self {
        Self {
            op: LimitOp::CockpitWrite,
            group: None,
            scope_key: source_ip.to_string(),
            provider: None,
        }
    }
}

/// The composed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enforcement {
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// The denial code, or the soft-warn code on an allowed call inside
    /// the warning band.
    pub code: Option<ErrorCode>,
    /// Soft quota threshold passed (call still allowed).
    pub soft_warn: bool,
    /// This call is a breaker probe; report its outcome.
    pub is_probe: bool,
}

impl Enforcement {
    fn allow() -> Self {
        Self {
            allowed: true,
            code: None,
            soft_warn: false,
            is_probe: false,
        }
    }

    fn deny(code: ErrorCode) -> Self {
        Self {
            allowed: false,
            code: Some(code),
            soft_warn: false,
            is_probe: false,
        }
    }
}

/// The limits engine: counters in the store, tuning from config.
#[derive(Clone)]
pub struct LimitsEngine {
    store: Arc<GovStore>,
    settings: LimitsSettings,
    breakers: CircuitBreakers,
    events: EventBus,
}

impl LimitsEngine {
    /// Build over the shared store.
    #[must_use]
    pub fn new(store: Arc<GovStore>, settings: LimitsSettings, events: EventBus) -> Self {
        let breakers =
            CircuitBreakers::new(Arc::clone(&store), settings.breaker, events.clone());
        Self {
            store,
            settings,
            breakers,
            events,
        }
    }

    /// The breakers, for recording call outcomes after the fact.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    /// Enforce all applicable limits for one operation.
    ///
    /// Composition order, exiting at the first denial: kill switch,
    /// rate limit (zero limit is a hard deny), breaker for external
    /// ops, daily quota. Every denial is logged (code only, never
    /// parameters) and emitted on `limits:denial`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails; a denial is a value.
    pub async fn enforce(&self, request: &EnforceRequest) -> StoreResult<Enforcement> {
        self.enforce_at(request, Utc::now()).await
    }

    /// Clock-injected variant of [`enforce`](Self::enforce).
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn enforce_at(
        &self,
        request: &EnforceRequest,
        now: DateTime<Utc>,
    ) -> StoreResult<Enforcement> {
        // 1. Kill switches.
        if !self.settings.enabled
            || (request.op == LimitOp::ExtCall && !self.settings.ext_calls_enabled)
        {
            return self.denied(request, ErrorCode::LimitsDisabled, now).await;
        }

        // 2. Rate limit. A configured limit of zero never reaches the
        //    counter: it is an authorization hole, not a window.
        let limit = self
            .settings
            .rate_limit(request.op, request.group.as_deref());
        if limit == 0 {
            return self.denied(request, ErrorCode::NotAuthorized, now).await;
        }
        let minute_bucket = now.timestamp().div_euclid(60);
        let count = self
            .store
            .increment_rate(request.op, &request.scope_key, minute_bucket)
            .await?;
        if count > limit {
            return self
                .denied(request, ErrorCode::RateLimitExceeded, now)
                .await;
        }

        // 3. Breaker, for external ops.
        let mut is_probe = false;
        if let Some(provider) = &request.provider {
            let decision = self.breakers.check_at(provider, now).await?;
            if !decision.allowed {
                return self
                    .denied(request, ErrorCode::ProviderBreakerOpen, now)
                    .await;
            }
            is_probe = decision.is_probe;
        }

        // 4. Daily quota.
        let day = now.format("%Y-%m-%d").to_string();
        let used = self
            .store
            .increment_quota(request.op, &request.scope_key, &day)
            .await?;
        let thresholds = self.settings.quota(request.op, request.group.as_deref());
        if used > thresholds.hard {
            return self
                .denied(request, ErrorCode::DailyQuotaExceeded, now)
                .await;
        }

        let soft_warn = used > thresholds.soft;
        if soft_warn {
            debug!(
                op = %request.op,
                scope = %request.scope_key,
                used,
                soft = thresholds.soft,
                "daily quota soft threshold passed"
            );
        }
        Ok(Enforcement {
            allowed: true,
            code: soft_warn.then_some(ErrorCode::DailyQuotaSoftWarn),
            soft_warn,
            is_probe,
        })
    }

    async fn denied(
        &self,
        request: &EnforceRequest,
        code: ErrorCode,
        now: DateTime<Utc>,
    ) -> StoreResult<Enforcement> {
        self.store
            .append_denial(&DenialRecord {
                op: request.op,
                scope_key: request.scope_key.clone(),
                code: code.as_str().to_string(),
                at: now,
            })
            .await?;
        self.events.publish(WardenEvent::LimitsDenial {
            metadata: EventMetadata::new("limits"),
            op: request.op,
            scope_key: request.scope_key.clone(),
            code: code.as_str().to_string(),
        });
        Ok(Enforcement::deny(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warden_config::{BreakerSettings, QuotaThresholds};

    fn engine_with(
        rate: &[(&str, u64)],
        quota: &[(&str, u64)],
        enabled: bool,
    ) -> LimitsEngine {
        let settings = LimitsSettings {
            enabled,
            ext_calls_enabled: true,
            rate_overrides: rate
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect::<HashMap<_, _>>(),
            quota_overrides: quota
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect::<HashMap<_, _>>(),
            breaker: BreakerSettings {
                open_after_fails: 2,
                cooldown: std::time::Duration::from_secs(30),
                fail_window: std::time::Duration::from_secs(120),
                half_open_probes: 1,
            },
        };
        LimitsEngine::new(Arc::new(GovStore::in_memory()), settings, EventBus::new())
    }

    #[tokio::test]
    async fn test_kill_switch_denies_with_limits_disabled() {
        let engine = engine_with(&[], &[], false);
        let outcome = engine
            .enforce(&EnforceRequest::gov_transition("developer"))
            .await
            .unwrap();
        assert_eq!(outcome, Enforcement::deny(ErrorCode::LimitsDisabled));
    }

    #[tokio::test]
    async fn test_zero_limit_is_not_authorized_not_rate_limited() {
        let engine = engine_with(&[("RL_EXT_CALL_PER_MIN_DEVELOPER", 0)], &[], true);
        let outcome = engine
            .enforce(&EnforceRequest::ext_call("developer", "github", 1))
            .await
            .unwrap();
        // First call, and the code is NOT_AUTHORIZED rather than
        // RATE_LIMIT_EXCEEDED.
        assert_eq!(outcome.code, Some(ErrorCode::NotAuthorized));
    }

    #[tokio::test]
    async fn test_rate_window_denies_past_limit() {
        let engine = engine_with(&[("RL_GOV_TRANSITION_PER_MIN", 2)], &[], true);
        let request = EnforceRequest::gov_transition("developer");
        let now = Utc::now();

        assert!(engine.enforce_at(&request, now).await.unwrap().allowed);
        assert!(engine.enforce_at(&request, now).await.unwrap().allowed);
        let third = engine.enforce_at(&request, now).await.unwrap();
        assert_eq!(third.code, Some(ErrorCode::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_quota_bands_at_the_boundaries() {
        let engine = engine_with(
            &[("RL_GOV_TRANSITION_PER_MIN", 1000)],
            &[("QUOTA_GOV_TRANSITION_SOFT", 2), ("QUOTA_GOV_TRANSITION_HARD", 4)],
            true,
        );
        let request = EnforceRequest::gov_transition("developer");
        let now = Utc::now();

        // used=1,2: clean. used=3,4: soft warn. used=5: denied.
        for expected_warn in [false, false, true, true] {
            let outcome = engine.enforce_at(&request, now).await.unwrap();
            assert!(outcome.allowed);
            assert_eq!(outcome.soft_warn, expected_warn);
        }
        let fifth = engine.enforce_at(&request, now).await.unwrap();
        assert_eq!(fifth.code, Some(ErrorCode::DailyQuotaExceeded));
        assert!(!fifth.allowed);
    }

    #[tokio::test]
    async fn test_open_breaker_denies_ext_calls() {
        let engine = engine_with(&[], &[], true);
        engine.breakers().record_failure("github").await.unwrap();
        engine.breakers().record_failure("github").await.unwrap();

        let outcome = engine
            .enforce(&EnforceRequest::ext_call("developer", "github", 1))
            .await
            .unwrap();
        assert_eq!(outcome.code, Some(ErrorCode::ProviderBreakerOpen));
    }

    #[tokio::test]
    async fn test_denials_are_logged_without_parameters() {
        let engine = engine_with(&[], &[], false);
        engine
            .enforce(&EnforceRequest::cockpit_write("203.0.113.9"))
            .await
            .unwrap();

        let denials = engine.store.list_denials().await.unwrap();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].code, "LIMITS_DISABLED");
        assert_eq!(denials[0].scope_key, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_quota_thresholds_type_sanity() {
        let q = QuotaThresholds { soft: 2, hard: 4 };
        assert!(q.soft < q.hard);
    }
}
