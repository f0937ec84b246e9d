//! Background job dispatcher.
//!
//! Ingest hands accepted jobs to a bounded queue through a [`DispatchHandle`].
//! A single long-lived [`JobDispatcher`] task drains the queue and runs each
//! job on its own Tokio task, never more than `concurrency` at a time. While
//! all worker slots are busy, jobs wait in the queue; once the queue is full,
//! new uploads are refused before anything is stored.

use std::collections::HashMap;
use std::sync::Arc;

use clauselens_core::error::CoreError;
use clauselens_core::store::{JobStore, StoreError};
use clauselens_core::types::JobId;
use clauselens_core::worker::{DispatchedJob, WorkerCommand, WorkerInvoker};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Cloneable sending side of the dispatch queue, held in `AppState`.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<DispatchedJob>,
}

/// A reserved position in the dispatch queue.
///
/// Sending through it cannot fail, so a job is dispatched exactly once after
/// its record exists. Dropping it unused frees the position.
#[derive(Debug)]
pub struct DispatchSlot(OwnedPermit<DispatchedJob>);

impl DispatchSlot {
    pub fn send(self, job: DispatchedJob) {
        self.0.send(job);
    }
}

impl DispatchHandle {
    /// Reserve a queue position without waiting.
    ///
    /// Returns [`CoreError::Unavailable`] when the queue is full or the
    /// dispatcher has stopped.
    pub fn reserve(&self) -> Result<DispatchSlot, CoreError> {
        self.tx
            .clone()
            .try_reserve_owned()
            .map(DispatchSlot)
            .map_err(|e| match e {
                TrySendError::Full(_) => CoreError::Unavailable(
                    "Analysis queue is full, please retry shortly".into(),
                ),
                TrySendError::Closed(_) => {
                    CoreError::Unavailable("Analysis service is shutting down".into())
                }
            })
    }
}

/// Failure reason recorded when a worker task panics.
pub const WORKER_PANIC_REASON: &str = "analysis task crashed";

/// Receives dispatched jobs and runs the worker for each.
pub struct JobDispatcher {
    rx: mpsc::Receiver<DispatchedJob>,
    store: Arc<dyn JobStore>,
    invoker: Arc<WorkerInvoker>,
    slots: Arc<Semaphore>,
    concurrency: usize,
}

impl JobDispatcher {
    /// Create the queue and its dispatcher.
    ///
    /// `capacity` bounds jobs waiting for a free worker; `concurrency` bounds
    /// workers running at once.
    pub fn new(
        store: Arc<dyn JobStore>,
        command: WorkerCommand,
        concurrency: usize,
        capacity: usize,
    ) -> (DispatchHandle, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let dispatcher = Self {
            rx,
            invoker: Arc::new(WorkerInvoker::new(Arc::clone(&store), command)),
            store,
            slots: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        };
        (DispatchHandle { tx }, dispatcher)
    }

    /// Run the dispatcher loop until the cancellation token is triggered
    /// or every [`DispatchHandle`] is dropped.
    ///
    /// Worker tasks still running when the loop exits are aborted, which
    /// kills their child processes.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        let mut running: HashMap<task::Id, JobId> = HashMap::new();
        tracing::info!(concurrency = self.concurrency, "Job dispatcher started");

        loop {
            // Wait for a free worker slot before taking the next job, so
            // waiting jobs stay in the bounded queue.
            let permit = tokio::select! {
                () = cancel.cancelled() => break,
                Some(joined) = tasks.join_next_with_id() => {
                    reap(self.store.as_ref(), joined, &mut running).await;
                    continue;
                }
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = loop {
                tokio::select! {
                    () = cancel.cancelled() => break None,
                    Some(joined) = tasks.join_next_with_id() => {
                        reap(self.store.as_ref(), joined, &mut running).await;
                    }
                    job = self.rx.recv() => break job,
                }
            };
            let Some(job) = job else { break };

            tracing::debug!(job_id = %job.job_id, "Job dispatched");
            let invoker = Arc::clone(&self.invoker);
            let job_id = job.job_id;
            let handle = tasks.spawn(async move {
                let _permit = permit;
                invoker.run(job).await;
            });
            running.insert(handle.id(), job_id);
        }

        tracing::info!(in_flight = tasks.len(), "Job dispatcher shutting down");
        tasks.shutdown().await;
    }
}

/// Forget a finished worker task. A panicked task's job is failed so it
/// does not stay open until the next restart.
async fn reap(
    store: &dyn JobStore,
    joined: Result<(task::Id, ()), JoinError>,
    running: &mut HashMap<task::Id, JobId>,
) {
    let error = match joined {
        Ok((id, ())) => {
            running.remove(&id);
            return;
        }
        Err(e) => e,
    };
    let Some(job_id) = running.remove(&error.id()) else {
        return;
    };
    if !error.is_panic() {
        return;
    }

    tracing::error!(job_id = %job_id, error = %error, "Worker task panicked");
    match store.set_failed(job_id, WORKER_PANIC_REASON).await {
        Ok(()) => {}
        Err(StoreError::InvalidTransition { .. }) => {
            tracing::debug!(job_id = %job_id, "Job was already terminal when its task panicked");
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record crashed job");
        }
    }
}
