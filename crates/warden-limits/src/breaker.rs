//! Per-provider circuit breakers.
//!
//! State machine: CLOSED counts failures inside the failure window and
//! opens at the configured threshold; OPEN denies everything until the
//! cooldown elapses, then admits probes in HALF_OPEN; a probe success
//! closes the breaker, a probe failure re-opens it with a fresh
//! `opened_at`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use warden_config::BreakerSettings;
use warden_core::BreakerState;
use warden_events::{EventBus, EventMetadata, WardenEvent};
use warden_store::{GovStore, StoreResult};

/// Outcome of one breaker check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// The breaker state after the check.
    pub state: BreakerState,
    /// Whether this call is the HALF_OPEN probe; its outcome decides
    /// CLOSED vs re-OPEN.
    pub is_probe: bool,
}

/// The breaker table plus its tuning.
#[derive(Clone)]
pub struct CircuitBreakers {
    store: Arc<GovStore>,
    settings: BreakerSettings,
    events: EventBus,
}

impl CircuitBreakers {
    /// Build over the shared store.
    #[must_use]
    pub fn new(store: Arc<GovStore>, settings: BreakerSettings, events: EventBus) -> Self {
        Self {
            store,
            settings,
            events,
        }
    }

    /// Check whether a call to `provider` may proceed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn check(&self, provider: &str) -> StoreResult<BreakerDecision> {
        self.check_at(provider, Utc::now()).await
    }

    /// Clock-injected variant of [`check`](Self::check).
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn check_at(
        &self,
        provider: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<BreakerDecision> {
        let cooldown = to_chrono(self.settings.cooldown);
        let probes = self.settings.half_open_probes;

        let (decision, transition) = self
            .store
            .update_breaker(provider, move |row| match row.state {
                BreakerState::Closed => (
                    BreakerDecision {
                        allowed: true,
                        state: BreakerState::Closed,
                        is_probe: false,
                    },
                    None,
                ),
                BreakerState::Open => {
                    let cooled = row
                        .opened_at
                        .is_none_or(|opened| now.signed_duration_since(opened) >= cooldown);
                    if cooled {
                        row.state = BreakerState::HalfOpen;
                        row.probes_issued = 1;
                        (
                            BreakerDecision {
                                allowed: true,
                                state: BreakerState::HalfOpen,
                                is_probe: true,
                            },
                            Some((BreakerState::HalfOpen, row.fail_count)),
                        )
                    } else {
                        (
                            BreakerDecision {
                                allowed: false,
                                state: BreakerState::Open,
                                is_probe: false,
                            },
                            None,
                        )
                    }
                },
                BreakerState::HalfOpen => {
                    if row.probes_issued < probes {
                        row.probes_issued += 1;
                        (
                            BreakerDecision {
                                allowed: true,
                                state: BreakerState::HalfOpen,
                                is_probe: true,
                            },
                            None,
                        )
                    } else {
                        // Probe already in flight; hold the line.
                        (
                            BreakerDecision {
                                allowed: false,
                                state: BreakerState::HalfOpen,
                                is_probe: false,
                            },
                            None,
                        )
                    }
                },
            })
            .await?;

        if let Some((state, fail_count)) = transition {
            self.emit(provider, state, fail_count);
        }
        Ok(decision)
    }

    /// Record a failed call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_failure(&self, provider: &str) -> StoreResult<()> {
        self.record_failure_at(provider, Utc::now()).await
    }

    /// Clock-injected variant of [`record_failure`](Self::record_failure).
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_failure_at(
        &self,
        provider: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let open_after = self.settings.open_after_fails;
        let window = to_chrono(self.settings.fail_window);

        let transition = self
            .store
            .update_breaker(provider, move |row| {
                match row.state {
                    BreakerState::HalfOpen => {
                        // The probe failed; back to OPEN with a fresh clock.
                        row.state = BreakerState::Open;
                        row.opened_at = Some(now);
                        row.last_failure_at = Some(now);
                        row.probes_issued = 0;
                        Some((BreakerState::Open, row.fail_count))
                    },
                    BreakerState::Open => {
                        row.last_failure_at = Some(now);
                        None
                    },
                    BreakerState::Closed => {
                        let in_window = row
                            .last_failure_at
                            .is_some_and(|last| now.signed_duration_since(last) <= window);
                        row.fail_count = if in_window { row.fail_count + 1 } else { 1 };
                        row.last_failure_at = Some(now);
                        if row.fail_count >= open_after {
                            row.state = BreakerState::Open;
                            row.opened_at = Some(now);
                            Some((BreakerState::Open, row.fail_count))
                        } else {
                            None
                        }
                    },
                }
            })
            .await?;

        if let Some((state, fail_count)) = transition {
            warn!(provider, fail_count, "breaker opened");
            self.emit(provider, state, fail_count);
        }
        Ok(())
    }

    /// Record a successful call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_success(&self, provider: &str) -> StoreResult<()> {
        let transition = self
            .store
            .update_breaker(provider, |row| {
                let was_half_open = row.state == BreakerState::HalfOpen;
                row.fail_count = 0;
                row.last_failure_at = None;
                if was_half_open {
                    row.state = BreakerState::Closed;
                    row.opened_at = None;
                    row.probes_issued = 0;
                    Some((BreakerState::Closed, 0))
                } else {
                    None
                }
            })
            .await?;

        if let Some((state, fail_count)) = transition {
            info!(provider, "breaker closed after successful probe");
            self.emit(provider, state, fail_count);
        }
        Ok(())
    }

    fn emit(&self, provider: &str, state: BreakerState, fail_count: u32) {
        self.events.publish(WardenEvent::BreakerState {
            metadata: EventMetadata::new("limits"),
            provider: provider.to_string(),
            state,
            fail_count,
        });
    }
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::seconds(i64::MAX / 1_000))
}
