//! The worker-side IPC relay.
//!
//! A worker container drops request files into its group's requests
//! directory. The relay polls that directory, forwards each file to the
//! CP's `/ops/worker/ipc` under the signed envelope plus
//! `X-Worker-GroupFolder`, writes the response atomically (temp file,
//! then rename) into the responses directory, and deletes the original.
//! Retries are caller-driven: a file that fails to forward stays put
//! and is retried on the next poll.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use warden_core::{GroupId, WorkerId};

use crate::sign::sign_body;
use crate::verify::headers;

/// Why a relay pass failed.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Filesystem trouble in the IPC directories.
    #[error("ipc directory error: {0}")]
    Io(#[from] std::io::Error),

    /// The CP could not be reached.
    #[error("relay transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One group's relay endpoint.
pub struct IpcRelay {
    http: reqwest::Client,
    /// CP base URL, e.g. `http://127.0.0.1:8787`.
    cp_url: String,
    worker_id: WorkerId,
    group: GroupId,
    shared_secret: String,
    requests_dir: PathBuf,
    responses_dir: PathBuf,
}

impl IpcRelay {
    /// Build a relay for one group's IPC directories.
    #[must_use]
    pub fn new(
        cp_url: impl Into<String>,
        worker_id: WorkerId,
        group: GroupId,
        shared_secret: impl Into<String>,
        requests_dir: impl Into<PathBuf>,
        responses_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            cp_url: cp_url.into(),
            worker_id,
            group,
            shared_secret: shared_secret.into(),
            requests_dir: requests_dir.into(),
            responses_dir: responses_dir.into(),
        }
    }

    /// Forward every pending request file once.
    ///
    /// Returns how many files were relayed. A file that fails mid-flight
    /// is left in place for the next poll; its error is logged, not
    /// propagated, so one poisoned file cannot wedge the queue.
    ///
    /// # Errors
    ///
    /// Returns an error only if the requests directory itself cannot be
    /// read.
    pub async fn poll_once(&self) -> Result<u32, RelayError> {
        let mut relayed = 0;
        let mut dir = tokio::fs::read_dir(&self.requests_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };
            // Skip our own half-written responses if dirs are shared.
            if name.ends_with(".tmp") {
                continue;
            }
            match self.relay_file(&path, &name).await {
                Ok(()) => relayed += 1,
                Err(error) => {
                    warn!(file = %name, %error, "ipc relay failed; will retry next poll");
                },
            }
        }
        Ok(relayed)
    }

    async fn relay_file(&self, path: &Path, name: &str) -> Result<(), RelayError> {
        let body = tokio::fs::read(path).await?;
        let bundle = sign_body(&self.shared_secret, &body);

        let response = self
            .http
            .post(format!("{}/ops/worker/ipc", self.cp_url))
            .header(headers::WORKER_ID, self.worker_id.as_str())
            .header(headers::HMAC, &bundle.hmac)
            .header(headers::TIMESTAMP, &bundle.timestamp)
            .header(headers::REQUEST_ID, &bundle.request_id)
            .header(headers::GROUP_FOLDER, self.group.as_str())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let reply = response.bytes().await?;

        // Write-then-rename so the container never reads a torn response.
        let tmp = self.responses_dir.join(format!("{name}.tmp"));
        let fin = self.responses_dir.join(name);
        tokio::fs::write(&tmp, &reply).await?;
        tokio::fs::rename(&tmp, &fin).await?;
        tokio::fs::remove_file(path).await?;

        debug!(file = %name, "ipc request relayed");
        Ok(())
    }
}
