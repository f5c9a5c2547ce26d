//! Warden Dispatch - The loop that turns governance state into work.
//!
//! A single long-lived loop polls for READY tasks with an assigned
//! group and REVIEW tasks awaiting a gate, claims an idempotent
//! dispatch slot for each, consults the policy engine, flips the task
//! under its optimistic version, and hands the job to the target
//! group's FIFO queue. A full worker skips its tasks for the tick —
//! that skip is the only backpressure channel to workers.
//!
//! Crash safety comes from the dispatch table: a re-started control
//! plane finds the claimed slots and the UNIQUE key keeps it from
//! dispatching the same transition twice.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod capabilities;
pub mod queue;
pub mod runner;
pub mod snapshot;

pub use capabilities::{ActionInfo, ActionStatus, CapabilityRegistry, ProviderCapability};
pub use queue::GroupQueues;
pub use runner::{DispatchLoop, HttpWorkerInvoker, WorkerInvoker};
pub use snapshot::SnapshotWriter;
