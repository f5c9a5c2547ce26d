//! The dispatch loop itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_core::{
    DispatchKey, DispatchStatus, GovDispatch, GroupId, TaskId, TaskState, WorkerRecord,
};
use warden_events::{EventBus, EventMetadata, WardenEvent};
use warden_governance::{ActionError, Governance};
use warden_protocol::{DispatchPayload, WorkerClient};
use warden_store::StoreResult;

use crate::queue::GroupQueues;
use crate::snapshot::SnapshotWriter;

/// Executes one dispatched job against a worker host.
///
/// The loop is written against this trait so tests can swap the HTTP
/// client for an in-process fake.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    /// Run the job; a returned error marks the dispatch FAILED.
    async fn invoke(&self, worker: &WorkerRecord, payload: DispatchPayload)
    -> Result<(), String>;
}

/// The production invoker: signed POST to the worker's dispatch port.
pub struct HttpWorkerInvoker {
    client: WorkerClient,
}

impl HttpWorkerInvoker {
    /// Build over a configured client.
    #[must_use]
    pub fn new(client: WorkerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkerInvoker for HttpWorkerInvoker {
    async fn invoke(
        &self,
        worker: &WorkerRecord,
        payload: DispatchPayload,
    ) -> Result<(), String> {
        self.client
            .dispatch(worker, &payload)
            .await
            .map_err(|e| e.to_string())
    }
}

/// The long-lived governance dispatch loop.
pub struct DispatchLoop {
    governance: Arc<Governance>,
    events: EventBus,
    queues: Arc<GroupQueues>,
    invoker: Arc<dyn WorkerInvoker>,
    snapshots: Arc<SnapshotWriter>,
    poll_interval: Duration,
}

impl DispatchLoop {
    /// Wire up a loop. Nothing runs until [`run`](Self::run) or
    /// [`tick`](Self::tick) is called.
    #[must_use]
    pub fn new(
        governance: Arc<Governance>,
        events: EventBus,
        invoker: Arc<dyn WorkerInvoker>,
        snapshots: Arc<SnapshotWriter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            governance,
            events,
            queues: Arc::new(GroupQueues::new()),
            invoker,
            snapshots,
            poll_interval,
        }
    }

    /// Run ticks on the poll interval until cancelled.
    ///
    /// A failing tick is logged and the loop keeps going; the store
    /// being briefly unavailable must not kill dispatch.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_ms = self.poll_interval.as_millis() as u64, "dispatch loop started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("dispatch loop draining");
                    return;
                },
                _ = ticker.tick() => {
                    if let Err(error) = self.tick().await {
                        error!(%error, "dispatch tick failed");
                    }
                },
            }
        }
    }

    /// One pass over READY and REVIEW work.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; per-task policy denials are
    /// absorbed into FAILED dispatch rows instead.
    pub async fn tick(&self) -> StoreResult<()> {
        self.ready_pass().await?;
        self.review_pass().await?;
        Ok(())
    }

    /// READY + assigned → DOING.
    async fn ready_pass(&self) -> StoreResult<()> {
        let store = self.governance.store();
        for task in store.tasks_by_state(TaskState::Ready).await? {
            let Some(group) = task.assigned_group.clone() else {
                continue;
            };
            let Some(worker) = store.worker_for_group(&group).await? else {
                debug!(task = %task.id, group = %group, "no worker for group, skipping");
                continue;
            };
            if !worker.has_capacity() {
                // Backpressure: the task stays READY for the next tick.
                debug!(task = %task.id, worker = %worker.id, "worker full, skipping tick");
                continue;
            }

            let key = DispatchKey::build(&task.id, TaskState::Ready, TaskState::Doing, task.version);
            if !self.claim(&key, &task.id, &group).await? {
                continue;
            }

            match self.governance.dispatch_transition(&task, TaskState::Doing).await {
                Ok(_) => {
                    let prompt =
                        format!("Task {}: {}\n\n{}", task.id, task.title, task.description);
                    self.enqueue_job(worker, group, task.id.clone(), key, prompt);
                },
                Err(error) => self.fail_claim(&key, &task.id, &group, &error).await?,
            }
        }
        Ok(())
    }

    /// REVIEW + gated → APPROVAL, dispatched to the approver group.
    async fn review_pass(&self) -> StoreResult<()> {
        let store = self.governance.store();
        for task in store.tasks_by_state(TaskState::Review).await? {
            let Some(gate) = task.gate else {
                continue;
            };
            let Some(approver) = self.governance.approvers().approver(gate).cloned() else {
                warn!(task = %task.id, gate = %gate, "gate has no routed approver");
                continue;
            };
            let Some(worker) = store.worker_for_group(&approver).await? else {
                continue;
            };
            if !worker.has_capacity() {
                continue;
            }

            let key =
                DispatchKey::build(&task.id, TaskState::Review, TaskState::Approval, task.version);
            if !self.claim(&key, &task.id, &approver).await? {
                continue;
            }

            match self.governance.dispatch_transition(&task, TaskState::Approval).await {
                Ok(_) => {
                    let pack = match self.governance.context_pack(&task.id).await {
                        Ok(pack) => pack,
                        Err(error) => {
                            self.fail_claim(&key, &task.id, &approver, &error).await?;
                            continue;
                        },
                    };
                    let prompt = format!(
                        "Approval requested: task {} needs the {} gate.\n\n{}",
                        task.id, gate, pack
                    );
                    self.enqueue_job(worker, approver, task.id.clone(), key, prompt);
                },
                Err(error) => self.fail_claim(&key, &task.id, &approver, &error).await?,
            }
        }
        Ok(())
    }

    /// Re-examine claimed slots after a restart.
    ///
    /// ENQUEUED rows are re-enqueued when the target worker is known
    /// (applying the transition first if the crash landed between claim
    /// and update); a row whose task has moved on is marked FAILED.
    /// STARTED rows are left for the completion callback to resolve.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn recover(&self) -> StoreResult<u32> {
        let store = self.governance.store();
        let mut recovered = 0;
        for slot in store.dispatches_by_status(DispatchStatus::Enqueued).await? {
            let Some((from, to, version)) = parse_dispatch_key(&slot.key) else {
                continue;
            };
            let Some(task) = store.get_task(&slot.task_id).await? else {
                continue;
            };
            let Some(worker) = store.worker_for_group(&slot.group).await? else {
                continue;
            };

            if task.state == from && task.version == version {
                // Crash landed between claim and transition.
                if let Err(error) = self.governance.dispatch_transition(&task, to).await {
                    self.fail_claim(&slot.key, &task.id, &slot.group, &error).await?;
                    continue;
                }
            } else if !(task.state == to && task.version == version + 1) {
                // The world moved on; this claim is stale.
                store
                    .update_dispatch_status(&slot.key, DispatchStatus::Failed, None)
                    .await?;
                self.emit(&slot.key, &slot.task_id, &slot.group, DispatchStatus::Failed);
                continue;
            }

            let prompt = format!("Task {}: {}\n\n{}", task.id, task.title, task.description);
            self.enqueue_job(worker, slot.group.clone(), task.id.clone(), slot.key.clone(), prompt);
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "re-enqueued claimed dispatches after restart");
        }
        Ok(recovered)
    }

    /// Claim the slot; `false` means someone already holds it.
    async fn claim(&self, key: &DispatchKey, task_id: &TaskId, group: &GroupId) -> StoreResult<bool> {
        let now = Utc::now();
        let slot = GovDispatch {
            key: key.clone(),
            task_id: task_id.clone(),
            group: group.clone(),
            worker_id: None,
            status: DispatchStatus::Enqueued,
            created_at: now,
            updated_at: now,
        };
        let claimed = self.governance.store().try_create_dispatch(&slot).await?;
        if claimed {
            self.emit(key, task_id, group, DispatchStatus::Enqueued);
        }
        Ok(claimed)
    }

    async fn fail_claim(
        &self,
        key: &DispatchKey,
        task_id: &TaskId,
        group: &GroupId,
        error: &ActionError,
    ) -> StoreResult<()> {
        warn!(task = %task_id, key = %key, %error, "dispatch claim failed");
        self.governance
            .store()
            .update_dispatch_status(key, DispatchStatus::Failed, None)
            .await?;
        self.emit(key, task_id, group, DispatchStatus::Failed);
        Ok(())
    }

    /// Hand the job to the group's FIFO queue.
    fn enqueue_job(
        &self,
        worker: WorkerRecord,
        group: GroupId,
        task_id: TaskId,
        key: DispatchKey,
        prompt: String,
    ) {
        let governance = Arc::clone(&self.governance);
        let events = self.events.clone();
        let invoker = Arc::clone(&self.invoker);
        let snapshots = Arc::clone(&self.snapshots);
        let queue_group = group.clone();

        self.queues.enqueue(&queue_group, async move {
            let store = governance.store();
            let emit = |status: DispatchStatus| {
                events.publish(WardenEvent::DispatchLifecycle {
                    metadata: EventMetadata::new("dispatch"),
                    dispatch_key: key.clone(),
                    task_id: task_id.clone(),
                    group: group.clone(),
                    status,
                });
            };

            if let Err(error) = store
                .update_dispatch_status(&key, DispatchStatus::Started, Some(worker.id.clone()))
                .await
            {
                error!(key = %key, %error, "failed to mark dispatch started");
                return;
            }
            emit(DispatchStatus::Started);

            // WIP up before the payload leaves; down again only via the
            // completion callback, or here if the send itself fails.
            if let Err(error) = store.adjust_worker_wip(&worker.id, 1).await {
                error!(worker = %worker.id, %error, "failed to raise wip");
            }

            let visible = match store.list_tasks().await {
                Ok(tasks) => SnapshotWriter::visible_tasks(&group, tasks),
                Err(error) => {
                    error!(%error, "failed to list tasks for snapshot");
                    Vec::new()
                },
            };
            let ipc_secret = match snapshots.write_for_group(&group, &visible).await {
                Ok(secret) => secret,
                Err(error) => {
                    error!(group = %group, %error, "snapshot write failed");
                    let _ = store
                        .update_dispatch_status(&key, DispatchStatus::Failed, None)
                        .await;
                    let _ = store.adjust_worker_wip(&worker.id, -1).await;
                    emit(DispatchStatus::Failed);
                    return;
                },
            };

            let payload = DispatchPayload {
                task_id: task_id.clone(),
                group_folder: group.clone(),
                prompt,
                is_main: group.is_main(),
                ipc_secret,
                dispatch_key: key.clone(),
            };

            match invoker.invoke(&worker, payload).await {
                Ok(()) => {
                    if let Err(error) = store
                        .update_dispatch_status(&key, DispatchStatus::Done, None)
                        .await
                    {
                        error!(key = %key, %error, "failed to mark dispatch done");
                        return;
                    }
                    emit(DispatchStatus::Done);
                },
                Err(reason) => {
                    warn!(key = %key, %reason, "worker job failed");
                    let _ = store
                        .update_dispatch_status(&key, DispatchStatus::Failed, None)
                        .await;
                    let _ = store.adjust_worker_wip(&worker.id, -1).await;
                    emit(DispatchStatus::Failed);
                },
            }
        });
    }

    fn emit(&self, key: &DispatchKey, task_id: &TaskId, group: &GroupId, status: DispatchStatus) {
        self.events.publish(WardenEvent::DispatchLifecycle {
            metadata: EventMetadata::new("dispatch"),
            dispatch_key: key.clone(),
            task_id: task_id.clone(),
            group: group.clone(),
            status,
        });
    }
}

/// Split a dispatch key back into (from, to, version).
fn parse_dispatch_key(key: &DispatchKey) -> Option<(TaskState, TaskState, u64)> {
    let mut parts = key.as_str().rsplitn(3, ':');
    let version = parts.next()?.strip_prefix('v')?.parse().ok()?;
    let edge = parts.next()?;
    let (from, to) = edge.split_once("->")?;
    Some((TaskState::parse(from)?, TaskState::parse(to)?, version))
}
