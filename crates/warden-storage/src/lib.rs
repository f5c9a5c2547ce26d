//! Warden Storage — namespaced key-value persistence.
//!
//! The control plane keeps every durable table in one embedded KV store
//! behind the [`KvStore`] trait:
//!
//! - [`MemoryKvStore`] (always available): for tests and ephemeral runs
//! - [`SurrealKvStore`] (behind the `kv` feature): persistent, versioned,
//!   ACID-compliant LSM-tree storage
//!
//! Two primitives carry the relational guarantees the data model needs:
//! [`KvStore::put_if_absent`] gives UNIQUE-constraint semantics (an insert
//! that loses returns `false`, never an error), and the single-process
//! writer discipline in `warden-store` supplies conditional-UPDATE
//! semantics for optimistic version checks.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
