//! Limit counters: rate windows, daily quotas, breaker rows, denials.

use serde::{Deserialize, Serialize};

use warden_core::{BreakerRecord, DenialRecord, LimitOp};

use crate::error::StoreResult;
use crate::store::{GovStore, SEP};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Counter {
    count: u64,
}

fn rate_key(op: LimitOp, scope_key: &str, minute_bucket: i64) -> String {
    format!("{}{}{}{}{}", op.as_str(), SEP, scope_key, SEP, minute_bucket)
}

fn quota_key(op: LimitOp, scope_key: &str, day: &str) -> String {
    format!("{}{}{}{}{}", op.as_str(), SEP, scope_key, SEP, day)
}

impl GovStore {
    /// Atomically bump the fixed-window rate counter and return the new
    /// count. Called N times for one key it returns 1, 2, ..., N.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn increment_rate(
        &self,
        op: LimitOp,
        scope_key: &str,
        minute_bucket: i64,
    ) -> StoreResult<u64> {
        let key = rate_key(op, scope_key, minute_bucket);
        let _guard = self.write.lock().await;
        let count = self
            .rate
            .get_json::<Counter>(&key)
            .await?
            .map_or(0, |c| c.count)
            + 1;
        self.rate.put_json(&key, &Counter { count }).await?;
        Ok(count)
    }

    /// Atomically bump the daily quota counter and return today's usage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn increment_quota(
        &self,
        op: LimitOp,
        scope_key: &str,
        day: &str,
    ) -> StoreResult<u64> {
        let key = quota_key(op, scope_key, day);
        let _guard = self.write.lock().await;
        let used = self
            .quota
            .get_json::<Counter>(&key)
            .await?
            .map_or(0, |c| c.count)
            + 1;
        self.quota.put_json(&key, &Counter { count: used }).await?;
        Ok(used)
    }

    /// Fetch a breaker row; absent means CLOSED with zero failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get_breaker(&self, provider: &str) -> StoreResult<BreakerRecord> {
        Ok(self
            .breakers
            .get_json::<BreakerRecord>(provider)
            .await?
            .unwrap_or_else(|| BreakerRecord::closed(provider)))
    }

    /// Read-modify-write a breaker row inside the writer lock.
    ///
    /// The mutation closure is synchronous; the row it returns is
    /// persisted before the lock drops, so two concurrent state
    /// transitions on the same provider cannot interleave.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn update_breaker<T>(
        &self,
        provider: &str,
        mutate: impl FnOnce(&mut BreakerRecord) -> T + Send,
    ) -> StoreResult<T> {
        let _guard = self.write.lock().await;
        let mut row = self
            .breakers
            .get_json::<BreakerRecord>(provider)
            .await?
            .unwrap_or_else(|| BreakerRecord::closed(provider));
        let out = mutate(&mut row);
        self.breakers.put_json(provider, &row).await?;
        Ok(out)
    }

    /// All breaker rows, for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_breakers(&self) -> StoreResult<Vec<BreakerRecord>> {
        let mut rows = Vec::new();
        for key in self.breakers.list_keys().await? {
            if let Some(row) = self.breakers.get_json::<BreakerRecord>(&key).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Append one denial row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn append_denial(&self, denial: &DenialRecord) -> StoreResult<()> {
        // Timestamp prefix keeps the log chronologically ordered; the
        // UUID suffix keeps concurrent denials from colliding.
        let key = format!(
            "{}{}{}",
            denial.at.timestamp_millis(),
            SEP,
            uuid::Uuid::new_v4()
        );
        Ok(self.denials.put_json(&key, denial).await?)
    }

    /// The full denial log, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_denials(&self) -> StoreResult<Vec<DenialRecord>> {
        let mut rows = Vec::new();
        for key in self.denials.list_keys().await? {
            if let Some(row) = self.denials.get_json::<DenialRecord>(&key).await? {
                rows.push(row);
            }
        }
        rows.sort_by_key(|d| d.at);
        Ok(rows)
    }
}
