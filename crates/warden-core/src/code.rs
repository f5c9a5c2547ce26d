//! The stable error-code taxonomy.
//!
//! Every denial or failure surfaced to callers carries one of these codes
//! as a stable string; callers (workers, the cockpit) switch on the code,
//! so the string forms are part of the wire contract and never change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Policy
    /// The `from` state is not part of the transition graph.
    UnknownState,
    /// The (from, to) edge is not in the transition graph.
    InvalidTransition,
    /// Entering DOING without a definition-of-done checklist.
    MissingDodChecklist,
    /// Leaving REVIEW / entering DONE without an evidence link.
    MissingEvidenceLink,
    /// Entering DONE with unfinished checklist items.
    DodIncomplete,
    /// Entering DONE without updated docs for a docs-required task type.
    DocsNotUpdated,
    /// Entering DONE without the required gate approval.
    GateNotApproved,
    /// Override used without `by`.
    OverrideMissingBy,
    /// Override used without `reason`.
    OverrideMissingReason,
    /// Override used without `acceptedRisk`.
    OverrideMissingAcceptedRisk,
    /// Override used without `reviewDeadlineIso`.
    OverrideMissingReviewDeadline,

    // Concurrency
    /// Optimistic update lost the race.
    VersionConflict,

    // Authority
    /// The actor may not perform this action.
    Forbidden,
    /// Hard-denied by configuration (rate limit of zero).
    NotAuthorized,
    /// A non-main group touched L3 memory.
    L3AccessDenied,

    // Limits
    /// The relevant kill switch is off.
    LimitsDisabled,
    /// Per-minute rate limit exhausted.
    RateLimitExceeded,
    /// Daily hard quota exhausted.
    DailyQuotaExceeded,
    /// Past the soft quota threshold; allowed, but flagged.
    DailyQuotaSoftWarn,
    /// The provider's circuit breaker is open.
    ProviderBreakerOpen,

    // Worker auth
    /// One or more signature headers absent.
    MissingHeaders,
    /// Signature timestamp outside the TTL window.
    TtlExpired,
    /// Nonce already seen for this worker.
    ReplayDetected,
    /// HMAC mismatch.
    HmacInvalid,
    /// `X-Worker-Id` did not resolve to a registered worker.
    UnknownWorker,
    /// `X-Worker-Id` header absent.
    MissingWorkerId,
}

impl ErrorCode {
    /// The stable wire string for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownState => "UNKNOWN_STATE",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::MissingDodChecklist => "MISSING_DOD_CHECKLIST",
            Self::MissingEvidenceLink => "MISSING_EVIDENCE_LINK",
            Self::DodIncomplete => "DOD_INCOMPLETE",
            Self::DocsNotUpdated => "DOCS_NOT_UPDATED",
            Self::GateNotApproved => "GATE_NOT_APPROVED",
            Self::OverrideMissingBy => "OVERRIDE_MISSING_BY",
            Self::OverrideMissingReason => "OVERRIDE_MISSING_REASON",
            Self::OverrideMissingAcceptedRisk => "OVERRIDE_MISSING_ACCEPTED_RISK",
            Self::OverrideMissingReviewDeadline => "OVERRIDE_MISSING_REVIEW_DEADLINE",
            Self::VersionConflict => "VERSION_CONFLICT",
            Self::Forbidden => "FORBIDDEN",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::L3AccessDenied => "L3_ACCESS_DENIED",
            Self::LimitsDisabled => "LIMITS_DISABLED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::DailyQuotaExceeded => "DAILY_QUOTA_EXCEEDED",
            Self::DailyQuotaSoftWarn => "DAILY_QUOTA_SOFT_WARN",
            Self::ProviderBreakerOpen => "PROVIDER_BREAKER_OPEN",
            Self::MissingHeaders => "MISSING_HEADERS",
            Self::TtlExpired => "TTL_EXPIRED",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::HmacInvalid => "HMAC_INVALID",
            Self::UnknownWorker => "UNKNOWN_WORKER",
            Self::MissingWorkerId => "MISSING_WORKER_ID",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_wire_string() {
        // Display and serde must agree — callers switch on either.
        let json = serde_json::to_string(&ErrorCode::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
        assert_eq!(ErrorCode::RateLimitExceeded.to_string(), "RATE_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_l3_code() {
        assert_eq!(ErrorCode::L3AccessDenied.as_str(), "L3_ACCESS_DENIED");
    }
}
