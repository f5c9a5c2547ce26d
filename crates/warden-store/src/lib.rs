//! Warden Store - Durable tables for the control plane.
//!
//! One [`GovStore`] owns every row exclusively: tasks, activities,
//! approvals, dispatch slots, memories and their access log, external
//! call log, rate/quota counters, breaker rows, the denial log, worker
//! hosts and nonces. Other components borrow rows through its methods
//! and never retain references to its internals.
//!
//! Two guarantees carry the relational semantics the data model needs:
//!
//! - **UNIQUE**: idempotent tables (dispatch slots, approvals, nonces)
//!   insert through `put_if_absent`; a losing insert returns `false`.
//! - **Conditional UPDATE**: version-checked writes run inside the
//!   store's writer lock, so a version compare and the following write
//!   are atomic with respect to every other writer in the process. The
//!   control plane is a single process (distributed consensus is an
//!   explicit non-goal), so this lock *is* the writer coordination the
//!   durable file sees.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod activities;
mod approvals;
mod dispatches;
mod error;
mod ext_calls;
mod limits;
mod memories;
mod nonces;
mod store;
mod tasks;
mod workers;

pub use error::{StoreError, StoreResult};
pub use store::GovStore;
