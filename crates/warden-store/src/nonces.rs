//! Nonce table: replay defence for signed worker traffic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::WorkerId;

use crate::error::StoreResult;
use crate::store::{GovStore, SEP};

/// One recorded request id; primary key is (worker, request_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NonceRow {
    expires_at: DateTime<Utc>,
}

fn nonce_key(worker: &WorkerId, request_id: &str) -> String {
    format!("{}{}{}", worker.as_str(), SEP, request_id)
}

impl GovStore {
    /// Record a request id for a worker.
    ///
    /// Returns `false` if the id was already seen — a replay. Writes are
    /// serialized by the primary-key conflict itself: the duplicate
    /// insert loses, no lock needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn record_nonce(
        &self,
        worker: &WorkerId,
        request_id: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.nonces
            .put_json_if_absent(&nonce_key(worker, request_id), &NonceRow { expires_at })
            .await
            .map_err(Into::into)
    }

    /// Drop nonces whose TTL has passed. Called lazily from the verify
    /// path; the table never needs a background sweeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut purged = 0;
        for key in self.nonces.list_keys().await? {
            if let Some(row) = self.nonces.get_json::<NonceRow>(&key).await?
                && row.expires_at < now
                && self.nonces.delete(&key).await?
            {
                purged += 1;
            }
        }
        Ok(purged)
    }
}
