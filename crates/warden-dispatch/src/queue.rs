//! Per-group FIFO work queues.
//!
//! Each group gets one unbounded channel drained by one consumer task,
//! so jobs for a group run strictly in the order they were enqueued
//! while different groups proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use warden_core::GroupId;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The set of per-group queues.
#[derive(Default)]
pub struct GroupQueues {
    senders: Mutex<HashMap<GroupId, mpsc::UnboundedSender<Job>>>,
}

impl GroupQueues {
    /// Create an empty queue set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job on a group's queue, spawning the group's consumer
    /// on first use.
    pub fn enqueue<F>(&self, group: &GroupId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = {
            let mut senders = match self.senders.lock() {
                Ok(senders) => senders,
                Err(poisoned) => poisoned.into_inner(),
            };
            senders
                .entry(group.clone())
                .or_insert_with(|| Self::spawn_consumer(group.clone()))
                .clone()
        };
        // The consumer task only ends when the sender set is dropped,
        // so a send can only fail during shutdown; the job is dropped
        // with the queue.
        if sender.send(Box::pin(job)).is_err() {
            debug!(group = %group, "queue closed, job dropped");
        }
    }

    fn spawn_consumer(group: GroupId) -> mpsc::UnboundedSender<Job> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            debug!(group = %group, "group queue consumer started");
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            debug!(group = %group, "group queue consumer stopped");
        });
        sender
    }
}

impl std::fmt::Debug for GroupQueues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupQueues").finish_non_exhaustive()
    }
}
