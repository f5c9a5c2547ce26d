//! Governance action errors.
//!
//! Policy denials are structural: the `Denied` variant carries the
//! stable codes and, for version conflicts, the current state of the
//! losing row so the caller can re-read and retry deliberately.

use thiserror::Error;

use warden_core::{ErrorCode, TaskId, TaskState};
use warden_store::StoreError;

/// Why a governance action did not happen.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action was denied by policy, authority, or a lost race.
    #[error("action denied: {codes:?}")]
    Denied {
        /// One stable code per violated precondition.
        codes: Vec<ErrorCode>,
        /// The task's current state, when known.
        current_state: Option<TaskState>,
        /// The task's current version, when known.
        current_version: Option<u64>,
    },

    /// No task with this id exists.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActionError {
    /// A denial carrying a single code and no row context.
    #[must_use]
    pub fn denied(code: ErrorCode) -> Self {
        Self::Denied {
            codes: vec![code],
            current_state: None,
            current_version: None,
        }
    }

    /// The denial codes, if this is a denial.
    #[must_use]
    pub fn codes(&self) -> &[ErrorCode] {
        match self {
            Self::Denied { codes, .. } => codes,
            _ => &[],
        }
    }
}

/// Result alias for governance actions.
pub type ActionResult<T> = Result<T, ActionError>;
