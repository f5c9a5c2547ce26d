//! Inbound request verification: identity, headers, TTL, nonce, HMAC.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use warden_core::{ErrorCode, WorkerId, WorkerRecord};
use warden_store::{GovStore, StoreError};

use crate::sign::verify_hmac;

/// Header names of the signed wire format.
pub mod headers {
    /// Hex HMAC-SHA-256 of the request.
    pub const HMAC: &str = "X-Worker-HMAC";
    /// ISO-8601 UTC timestamp.
    pub const TIMESTAMP: &str = "X-Worker-Timestamp";
    /// Opaque ≥128-bit nonce, hex.
    pub const REQUEST_ID: &str = "X-Worker-RequestId";
    /// Worker identity string.
    pub const WORKER_ID: &str = "X-Worker-Id";
    /// Originating group folder (IPC relay only).
    pub const GROUP_FOLDER: &str = "X-Worker-GroupFolder";
}

/// The signature headers extracted from one inbound request.
///
/// Extraction is the transport layer's job (axum handlers, the relay);
/// verification here is transport-agnostic.
#[derive(Debug, Clone, Default)]
pub struct SignedHeaders {
    /// `X-Worker-Id`.
    pub worker_id: Option<String>,
    /// `X-Worker-HMAC`.
    pub hmac: Option<String>,
    /// `X-Worker-Timestamp`.
    pub timestamp: Option<String>,
    /// `X-Worker-RequestId`.
    pub request_id: Option<String>,
    /// `X-Worker-GroupFolder`, on IPC relay calls.
    pub group_folder: Option<String>,
}

/// Why verification failed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// `X-Worker-Id` absent.
    #[error("missing X-Worker-Id header")]
    MissingWorkerId,
    /// The worker id did not resolve.
    #[error("unknown worker: {0}")]
    UnknownWorker(String),
    /// One or more signature headers absent or malformed.
    #[error("missing signature headers")]
    MissingHeaders,
    /// Timestamp outside the TTL window.
    #[error("signature timestamp outside ttl window")]
    TtlExpired,
    /// Request id already seen for this worker.
    #[error("replayed request id")]
    ReplayDetected,
    /// HMAC mismatch.
    #[error("invalid request hmac")]
    HmacInvalid,
    /// The store failed mid-verification.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// The stable wire code for this failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingWorkerId => ErrorCode::MissingWorkerId,
            Self::UnknownWorker(_) => ErrorCode::UnknownWorker,
            Self::MissingHeaders => ErrorCode::MissingHeaders,
            Self::TtlExpired => ErrorCode::TtlExpired,
            Self::ReplayDetected => ErrorCode::ReplayDetected,
            Self::HmacInvalid => ErrorCode::HmacInvalid,
            Self::Store(_) => ErrorCode::Forbidden,
        }
    }
}

/// Verifier for inbound signed traffic, worker→CP and CP→worker alike.
#[derive(Clone)]
pub struct Verifier {
    store: Arc<GovStore>,
    ttl: Duration,
}

impl Verifier {
    /// Build over the shared store with the deployment TTL.
    #[must_use]
    pub fn new(store: Arc<GovStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Verify one inbound request and resolve its worker.
    ///
    /// Check order is fixed: worker identity, header presence, TTL,
    /// nonce, HMAC. A timestamp exactly at the TTL boundary is allowed;
    /// one millisecond past is not. Expired nonces are purged lazily on
    /// this path.
    ///
    /// # Errors
    ///
    /// One [`AuthError`] per failed check, in check order.
    pub async fn verify(
        &self,
        headers: &SignedHeaders,
        body: &[u8],
    ) -> Result<WorkerRecord, AuthError> {
        self.verify_at(headers, body, Utc::now()).await
    }

    /// Clock-injected variant of [`verify`](Self::verify).
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub async fn verify_at(
        &self,
        headers: &SignedHeaders,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<WorkerRecord, AuthError> {
        // 1. Resolve the worker identity.
        let worker_id = headers
            .worker_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::MissingWorkerId)?;
        let worker = self
            .store
            .get_worker(&WorkerId::new(worker_id))
            .await?
            .ok_or_else(|| AuthError::UnknownWorker(worker_id.to_string()))?;

        // 2. All three signature headers must be present.
        let (Some(hmac), Some(timestamp), Some(request_id)) = (
            headers.hmac.as_deref(),
            headers.timestamp.as_deref(),
            headers.request_id.as_deref(),
        ) else {
            return Err(AuthError::MissingHeaders);
        };

        // 3. TTL window around the claimed timestamp.
        let Ok(claimed_at) = DateTime::parse_from_rfc3339(timestamp) else {
            return Err(AuthError::MissingHeaders);
        };
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let skew = now.signed_duration_since(claimed_at.with_timezone(&Utc));
        if skew.abs() > ttl {
            return Err(AuthError::TtlExpired);
        }

        // 4. Nonce: a duplicate insert is the replay signal.
        self.store.purge_expired_nonces(now).await?;
        let expires_at = claimed_at.with_timezone(&Utc) + ttl;
        if !self
            .store
            .record_nonce(&worker.id, request_id, expires_at)
            .await?
        {
            warn!(worker = %worker.id, "replayed request id rejected");
            return Err(AuthError::ReplayDetected);
        }

        // 5. Recompute and compare in constant time.
        if !verify_hmac(&worker.shared_secret, timestamp, request_id, body, hmac) {
            return Err(AuthError::HmacInvalid);
        }

        Ok(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::{compute_hmac, sign_body};
    use chrono::SecondsFormat;
    use warden_core::{GroupId, WorkerStatus};

    const SECRET: &str = "wire-secret";

    async fn verifier() -> Verifier {
        let store = Arc::new(GovStore::in_memory());
        store
            .upsert_worker(&WorkerRecord {
                id: WorkerId::new("w1"),
                ssh_host: None,
                ssh_user: None,
                ssh_identity_file: None,
                local_port: 8800,
                remote_port: 8800,
                max_wip: 1,
                current_wip: 0,
                status: WorkerStatus::Online,
                shared_secret: SECRET.into(),
                groups: vec![GroupId::from("developer")],
            })
            .await
            .unwrap();
        Verifier::new(store, Duration::from_secs(60))
    }

    fn signed(body: &[u8]) -> SignedHeaders {
        let bundle = sign_body(SECRET, body);
        SignedHeaders {
            worker_id: Some("w1".into()),
            hmac: Some(bundle.hmac),
            timestamp: Some(bundle.timestamp),
            request_id: Some(bundle.request_id),
            group_folder: None,
        }
    }

    #[tokio::test]
    async fn test_valid_request_verifies_once() {
        let verifier = verifier().await;
        let body = br#"{"taskId":"T3"}"#;
        let headers = signed(body);

        assert!(verifier.verify(&headers, body).await.is_ok());

        // Identical headers and body again: replay.
        let err = verifier.verify(&headers, body).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReplayDetected);
    }

    #[tokio::test]
    async fn test_new_request_id_with_stale_hmac_is_invalid() {
        let verifier = verifier().await;
        let body = br#"{"taskId":"T3"}"#;
        let mut headers = signed(body);
        headers.request_id = Some(crate::sign::fresh_request_id());

        let err = verifier.verify(&headers, body).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::HmacInvalid);
    }

    #[tokio::test]
    async fn test_mutated_body_is_invalid() {
        let verifier = verifier().await;
        let headers = signed(br#"{"taskId":"T3"}"#);
        let err = verifier.verify(&headers, br#"{"taskId":"T4"}"#).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::HmacInvalid);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_worker() {
        let verifier = verifier().await;
        let mut headers = signed(b"{}");
        headers.worker_id = Some("w9".into());
        assert_eq!(
            verifier.verify(&headers, b"{}").await.unwrap_err().code(),
            ErrorCode::UnknownWorker
        );

        headers.worker_id = None;
        assert_eq!(
            verifier.verify(&headers, b"{}").await.unwrap_err().code(),
            ErrorCode::MissingWorkerId
        );
    }

    #[tokio::test]
    async fn test_missing_signature_headers() {
        let verifier = verifier().await;
        let mut headers = signed(b"{}");
        headers.hmac = None;
        assert_eq!(
            verifier.verify(&headers, b"{}").await.unwrap_err().code(),
            ErrorCode::MissingHeaders
        );
    }

    #[tokio::test]
    async fn test_ttl_boundary_is_inclusive() {
        let verifier = verifier().await;
        let body = b"{}";

        let sent_at = Utc::now();
        let timestamp = sent_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let request_id = crate::sign::fresh_request_id();
        let headers = SignedHeaders {
            worker_id: Some("w1".into()),
            hmac: Some(compute_hmac(SECRET, &timestamp, &request_id, body)),
            timestamp: Some(timestamp.clone()),
            request_id: Some(request_id.clone()),
            group_folder: None,
        };

        // Exactly 60s later: allowed.
        let at_boundary = sent_at + chrono::Duration::seconds(60);
        assert!(verifier.verify_at(&headers, body, at_boundary).await.is_ok());

        // 60.001s later with a fresh id: expired.
        let request_id = crate::sign::fresh_request_id();
        let late_headers = SignedHeaders {
            hmac: Some(compute_hmac(SECRET, &timestamp, &request_id, body)),
            request_id: Some(request_id),
            ..headers
        };
        let past_boundary = sent_at + chrono::Duration::milliseconds(60_001);
        assert_eq!(
            verifier
                .verify_at(&late_headers, body, past_boundary)
                .await
                .unwrap_err()
                .code(),
            ErrorCode::TtlExpired
        );
    }

    #[tokio::test]
    async fn test_future_timestamps_are_bounded_too() {
        let verifier = verifier().await;
        let body = b"{}";
        let future = (Utc::now() + chrono::Duration::seconds(120))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let request_id = crate::sign::fresh_request_id();
        let headers = SignedHeaders {
            worker_id: Some("w1".into()),
            hmac: Some(compute_hmac(SECRET, &future, &request_id, body)),
            timestamp: Some(future),
            request_id: Some(request_id),
            group_folder: None,
        };
        assert_eq!(
            verifier.verify(&headers, body).await.unwrap_err().code(),
            ErrorCode::TtlExpired
        );
    }
}
