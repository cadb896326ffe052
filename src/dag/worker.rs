// src/dag/worker.rs

//! Worker pool that executes ready nodes.
//!
//! A fixed number of worker loops share one bounded task queue. Each pulled
//! task runs in its own Tokio task, so a slow operator never stops a worker
//! from picking up the next ready sibling. Starts and finishes are reported
//! on one channel; the coordinator in [`solver`](super::solver) is the only
//! reader.
//!
//! Executions are tracked per worker in a [`JoinSet`]. After an abort the
//! sets outlive the run and are handed back to the graph, so the next run
//! can wait for operators that are still going.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, debug, info, warn};

use crate::context::RunContext;
use crate::dag::solver::SolverConfig;
use crate::errors::OperatorError;
use crate::operator::Operator;
use crate::types::NodeName;

/// A node handed to the pool: everything needed to run it, nothing more.
pub(crate) struct NodeTask {
    pub name: NodeName,
    pub operator: Arc<dyn Operator>,
}

/// What a worker tells the coordinator about a node.
#[derive(Debug)]
pub(crate) enum Report {
    /// A worker took the node off the queue and is about to run it.
    Started { name: NodeName },
    /// The node's operator returned (or panicked).
    Finished {
        name: NodeName,
        outcome: Result<(), OperatorError>,
    },
}

/// Node executions spawned by the workers of one run.
#[derive(Debug, Default)]
pub(crate) struct Executions(Vec<JoinSet<()>>);

impl Executions {
    /// Executions not yet reaped.
    pub fn len(&self) -> usize {
        self.0.iter().map(JoinSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every execution has returned.
    pub async fn settle(self) {
        for mut set in self.0 {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "node execution ended abnormally");
                }
            }
        }
    }
}

pub(crate) struct WorkerPool {
    abort_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<JoinSet<()>>>,
}

impl WorkerPool {
    /// Start `config.workers` worker loops reading from `queue_rx`.
    pub fn spawn(
        config: &SolverConfig,
        queue_rx: mpsc::Receiver<NodeTask>,
        report_tx: mpsc::Sender<Report>,
        ctx: Arc<dyn RunContext>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue_rx));
        let (abort_tx, abort_rx) = watch::channel(false);
        let permits = config
            .max_parallel
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let handles = (0..config.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&queue),
                    abort_rx: abort_rx.clone(),
                    report_tx: report_tx.clone(),
                    ctx: Arc::clone(&ctx),
                    permits: permits.clone(),
                };
                tokio::spawn(worker.run().in_current_span().with_current_subscriber())
            })
            .collect();

        Self { abort_tx, handles }
    }

    /// Tell every worker to stop pulling tasks. Operators already running
    /// are left to finish.
    pub fn abort(&self) {
        // Err only means every worker has already exited.
        let _ = self.abort_tx.send(true);
    }

    /// Wait for the worker loops to exit and collect the executions they
    /// spawned. Once this returns, no worker sends another `Started`.
    pub async fn join(self) -> Executions {
        let mut executions = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(set) => executions.push(set),
                Err(e) => warn!(error = %e, "worker loop ended abnormally"),
            }
        }
        Executions(executions)
    }
}

struct Worker {
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<NodeTask>>>,
    abort_rx: watch::Receiver<bool>,
    report_tx: mpsc::Sender<Report>,
    ctx: Arc<dyn RunContext>,
    permits: Option<Arc<Semaphore>>,
}

impl Worker {
    async fn run(mut self) -> JoinSet<()> {
        debug!(worker = self.id, "worker started");
        let mut running = JoinSet::new();

        loop {
            while let Some(joined) = running.try_join_next() {
                if let Err(e) = joined {
                    warn!(worker = self.id, error = %e, "node execution ended abnormally");
                }
            }

            // A task is only taken off the queue once it can start, so an
            // abort never finds work stuck behind the parallelism cap.
            let permit = match &self.permits {
                Some(sem) => tokio::select! {
                    biased;

                    _ = self.abort_rx.wait_for(|aborted| *aborted) => {
                        info!(worker = self.id, "worker stopping as it got the abort signal");
                        break;
                    }

                    permit = Arc::clone(sem).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            let task = tokio::select! {
                biased;

                _ = self.abort_rx.wait_for(|aborted| *aborted) => {
                    info!(worker = self.id, "worker stopping as it got the abort signal");
                    break;
                }

                task = next_task(&self.queue) => task,
            };

            let Some(task) = task else {
                debug!(worker = self.id, "task queue closed; worker exiting");
                break;
            };

            let started = Report::Started {
                name: task.name.clone(),
            };
            if self.report_tx.send(started).await.is_err() {
                debug!(worker = self.id, "report channel closed; worker exiting");
                break;
            }

            let execution = execute(
                task,
                Arc::clone(&self.ctx),
                self.report_tx.clone(),
                permit,
            );
            running.spawn(execution.in_current_span().with_current_subscriber());
        }

        running
    }
}

async fn next_task(queue: &Mutex<mpsc::Receiver<NodeTask>>) -> Option<NodeTask> {
    queue.lock().await.recv().await
}

/// Run one node's operator and report the outcome.
///
/// The operator runs in a task of its own so that a panic inside it becomes
/// a failed outcome instead of a report that never arrives. `_permit` is
/// held until the report is sent.
async fn execute(
    task: NodeTask,
    ctx: Arc<dyn RunContext>,
    report_tx: mpsc::Sender<Report>,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let NodeTask { name, operator } = task;
    info!(node = %name, operator = %operator.describe(), "solving node");
    let started = Instant::now();

    let run = async move { operator.run(ctx).await };
    let outcome = match tokio::spawn(run.in_current_span().with_current_subscriber()).await {
        Ok(result) => result.map_err(OperatorError::new),
        Err(e) => Err(OperatorError::new(anyhow!(
            "operator of node `{name}` did not complete: {e}"
        ))),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(()) => info!(node = %name, elapsed_ms, "node finished"),
        Err(e) => warn!(node = %name, elapsed_ms, error = %e, "node operator returned an error"),
    }

    if report_tx.send(Report::Finished { name, outcome }).await.is_err() {
        debug!("report dropped; the run already ended");
    }
}
