//! Warden Core - Foundation types for the Warden governance control plane.
//!
//! This crate provides:
//! - Typed identifiers for tasks, groups, workers, products and memories
//! - The governance data model (tasks, activities, approvals, dispatches)
//! - The tiered memory data model (levels, access records)
//! - Worker and circuit-breaker records
//! - The stable error-code taxonomy shared across all components

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod code;
pub mod ids;
pub mod limits;
pub mod memory;
pub mod task;
pub mod worker;

pub use code::ErrorCode;
pub use ids::{ActivityId, DispatchKey, GroupId, MemoryId, ProductId, TaskId, WorkerId};
pub use limits::{BreakerRecord, BreakerState, DenialRecord, ExtCallRecord, LimitOp, QuotaUsage};
pub use memory::{AccessType, MemoryAccessRecord, MemoryLevel, MemoryRecord, RecallMode};
pub use task::{
    ActivityAction, DispatchStatus, GateType, GovActivity, GovApproval, GovDispatch, GovTask,
    Priority, TaskPatch, TaskScope, TaskState, TaskType,
};
pub use worker::{TunnelState, TunnelStatus, WorkerRecord, WorkerStatus};
