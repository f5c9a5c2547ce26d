//! The store handle and its table namespaces.

use std::sync::Arc;

use tokio::sync::Mutex;
use warden_storage::{KvStore, MemoryKvStore, ScopedKvStore};

use crate::error::StoreResult;

/// Separator between key components inside a table.
///
/// Task and scope ids are opaque but conventionally never contain `|`;
/// the null byte is rejected by the storage layer, so `|` keeps keys
/// readable in diagnostics.
pub(crate) const SEP: char = '|';

// Table namespaces.
pub(crate) const NS_TASKS: &str = "gov:tasks";
pub(crate) const NS_ACTIVITIES: &str = "gov:activities";
pub(crate) const NS_ACTIVITY_SEQ: &str = "gov:activity_seq";
pub(crate) const NS_APPROVALS: &str = "gov:approvals";
pub(crate) const NS_DISPATCHES: &str = "gov:dispatches";
pub(crate) const NS_EXT_CALLS: &str = "gov:ext_calls";
pub(crate) const NS_WORKERS: &str = "fleet:workers";
pub(crate) const NS_NONCES: &str = "fleet:nonces";
pub(crate) const NS_RATE: &str = "limits:rate";
pub(crate) const NS_QUOTA: &str = "limits:quota";
pub(crate) const NS_BREAKERS: &str = "limits:breakers";
pub(crate) const NS_DENIALS: &str = "limits:denials";
pub(crate) const NS_MEMORIES: &str = "mem:records";
pub(crate) const NS_ACCESS_LOG: &str = "mem:access_log";

/// The durable store every component shares.
///
/// Cheap to clone behind an `Arc`; all mutation goes through `&self`.
pub struct GovStore {
    pub(crate) tasks: ScopedKvStore,
    pub(crate) activities: ScopedKvStore,
    pub(crate) activity_seq: ScopedKvStore,
    pub(crate) approvals: ScopedKvStore,
    pub(crate) dispatches: ScopedKvStore,
    pub(crate) ext_calls: ScopedKvStore,
    pub(crate) workers: ScopedKvStore,
    pub(crate) nonces: ScopedKvStore,
    pub(crate) rate: ScopedKvStore,
    pub(crate) quota: ScopedKvStore,
    pub(crate) breakers: ScopedKvStore,
    pub(crate) denials: ScopedKvStore,
    pub(crate) memories: ScopedKvStore,
    pub(crate) access_log: ScopedKvStore,
    /// Writer coordination for read-modify-write sections (version
    /// checks, counters, WIP adjustments). Never held across a network
    /// call; only across store awaits.
    pub(crate) write: Mutex<()>,
}

impl GovStore {
    /// Open the table layer over any KV backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a table namespace fails validation, which
    /// only happens if the constants above are edited into invalidity.
    pub fn open(kv: Arc<dyn KvStore>) -> StoreResult<Self> {
        let scoped = |ns: &str| ScopedKvStore::new(Arc::clone(&kv), ns);
        Ok(Self {
            tasks: scoped(NS_TASKS)?,
            activities: scoped(NS_ACTIVITIES)?,
            activity_seq: scoped(NS_ACTIVITY_SEQ)?,
            approvals: scoped(NS_APPROVALS)?,
            dispatches: scoped(NS_DISPATCHES)?,
            ext_calls: scoped(NS_EXT_CALLS)?,
            workers: scoped(NS_WORKERS)?,
            nonces: scoped(NS_NONCES)?,
            rate: scoped(NS_RATE)?,
            quota: scoped(NS_QUOTA)?,
            breakers: scoped(NS_BREAKERS)?,
            denials: scoped(NS_DENIALS)?,
            memories: scoped(NS_MEMORIES)?,
            access_log: scoped(NS_ACCESS_LOG)?,
            write: Mutex::new(()),
        })
    }

    /// An in-memory store for tests and ephemeral runs.
    ///
    /// # Panics
    ///
    /// Never panics in practice; the table namespaces are static and
    /// valid.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryKvStore::new())).expect("static namespaces are valid")
    }
}

impl std::fmt::Debug for GovStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovStore").finish_non_exhaustive()
    }
}
