//! The tiered memory data model.
//!
//! Memories are stored post-sanitization with a sensitivity level in
//! `L0..=L3`. The level governs cross-group visibility and whether the
//! content may ever be externalised: L3 content never leaves the control
//! plane, not even as an embedding vector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{GroupId, MemoryId, ProductId};
use crate::task::TaskScope;

/// Memory sensitivity tier, `L0` least sensitive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[allow(missing_docs)]
pub enum MemoryLevel {
    L0,
    L1,
    L2,
    L3,
}

impl MemoryLevel {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L0 => "L0",
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
        }
    }

    /// Parse a wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "L0" => Some(Self::L0),
            "L1" => Some(Self::L1),
            "L2" => Some(Self::L2),
            "L3" => Some(Self::L3),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored unit of knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique id.
    pub id: MemoryId,
    /// Sanitized content. The original never persists once PII was found.
    pub content: String,
    /// SHA-256 of the ORIGINAL content, hex-encoded.
    pub content_hash: String,
    /// Sensitivity tier.
    pub level: MemoryLevel,
    /// Company or product scope.
    pub scope: TaskScope,
    /// Product the memory belongs to, when product-scoped.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    /// Owning group folder.
    pub group_folder: GroupId,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the PII scanner matched anything.
    pub pii_detected: bool,
    /// Sorted list of detected PII kinds.
    #[serde(default)]
    pub pii_types: Vec<String>,
    /// Where the memory came from (ipc, admin, channel, ...).
    pub source_type: String,
    /// Version of the classification policy that produced this record.
    pub policy_version: u32,
    /// Fixed-dimension embedding vector; always absent for L3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Model that produced the embedding.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Monotone version counter.
    pub version: u64,
}

impl MemoryRecord {
    /// Whether the externalisation invariant holds (L3 ⇒ no embedding).
    #[must_use]
    pub fn embedding_is_permitted(&self) -> bool {
        self.level != MemoryLevel::L3 || self.embedding.is_none()
    }
}

/// How a memory was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AccessType {
    Recall,
    Read,
    Store,
    Update,
}

impl AccessType {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recall => "recall",
            Self::Read => "read",
            Self::Store => "store",
            Self::Update => "update",
        }
    }
}

/// Append-only audit row for L3 reads and access denials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryAccessRecord {
    /// The memory that was touched.
    pub memory_id: MemoryId,
    /// The group that attempted access.
    pub accessor_group: GroupId,
    /// The kind of access.
    pub access_type: AccessType,
    /// Whether access was granted.
    pub granted: bool,
    /// Stable reason code (`L3_ACCESS_DENIED`, `granted`, ...).
    pub reason: String,
    /// When the attempt happened.
    pub at: DateTime<Utc>,
}

/// Which retrieval path produced a recall response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallMode {
    /// Embedding cosine similarity.
    Semantic,
    /// Keyword-fraction scoring.
    Keyword,
}
