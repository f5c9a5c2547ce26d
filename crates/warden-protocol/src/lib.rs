//! Warden Protocol - The signed CP↔worker wire protocol.
//!
//! Every message body between the control plane and a worker is UTF-8
//! JSON authenticated by an HMAC-SHA-256 over the exact byte string
//! `timestamp "." request_id "." body`, keyed by the worker's shared
//! secret. Verification layers a TTL window and a per-worker nonce
//! table on top, so a captured request can neither be replayed nor
//! splice a different body under an old signature.
//!
//! The crate also carries the dispatch HTTP client, the completion
//! report types, and the file-based IPC relay that ferries worker
//! requests into the CP and responses back out.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod client;
pub mod ipc;
pub mod relay;
pub mod sign;
pub mod verify;

pub use client::{CompletionReport, CompletionStatus, DispatchPayload, WorkerClient};
pub use ipc::{IpcRequest, IpcResponse};
pub use relay::IpcRelay;
pub use sign::{SignatureBundle, compute_hmac, fresh_request_id, sign_body, verify_hmac};
pub use verify::{AuthError, SignedHeaders, Verifier};
