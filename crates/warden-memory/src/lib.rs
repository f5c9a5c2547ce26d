//! Warden Memory - The tiered memory store.
//!
//! Everything a group asks the control plane to remember flows through
//! the classification pipeline: a deterministic PII scan replaces
//! matches with fixed sentinels, detection forces the record to L3, and
//! product scope floors it at L2. Recall applies the cross-group access
//! matrix, audits every L3 touch, and scores candidates by embedding
//! cosine when available or keyword fraction otherwise.
//!
//! L3 content never leaves the control plane — not in recall responses
//! to other groups, and never as an embedding request to an external
//! model host.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod access;
pub mod embedding;
pub mod pii;
pub mod service;

pub use access::{Accessor, can_access, max_level};
pub use embedding::{EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider, cosine};
pub use pii::{ScanOutcome, scan_and_sanitize};
pub use service::{MemoryError, MemoryService, RecallResponse, StoreMemoryRequest};
