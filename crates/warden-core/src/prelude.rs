//! Convenient glob import for downstream crates.
//!
//! ```rust
//! use warden_core::prelude::*;
//! ```

pub use crate::code::ErrorCode;
pub use crate::ids::{
    ActivityId, DispatchKey, GroupId, MAIN_GROUP, MemoryId, ProductId, TaskId, WorkerId,
};
pub use crate::limits::{
    BreakerRecord, BreakerState, DenialRecord, ExtCallRecord, LimitOp, QuotaUsage,
};
pub use crate::memory::{AccessType, MemoryAccessRecord, MemoryLevel, MemoryRecord, RecallMode};
pub use crate::task::{
    ActivityAction, DispatchStatus, GateType, GovActivity, GovApproval, GovDispatch, GovTask,
    Priority, TaskPatch, TaskScope, TaskState, TaskType,
};
pub use crate::worker::{TunnelState, TunnelStatus, WorkerRecord, WorkerStatus};
