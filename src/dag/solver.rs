// src/dag/solver.rs

//! Coordination loop for one run of a [`Dag`].
//!
//! The solver owns every status write for the duration of a run:
//! - it marks a node `Running` when a worker reports that it started,
//! - it records `Success` / `Failed` when the completion report arrives,
//! - it marks whatever was never reached `Skipped` at the end.
//!
//! Workers only ever see a name and an operator, so node state needs no
//! lock. The solver remembers what it submitted, so a node is queued at
//! most once per run.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::graph::Dag;
use crate::dag::worker::{NodeTask, Report, WorkerPool};
use crate::errors::{DagflowError, OperatorError, Result};
use crate::types::{NodeName, NodeStatus};

/// Tuning knobs for a run. Mirrors the `[solver]` table of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Number of worker loops pulling from the task queue.
    pub workers: usize,
    /// Capacity of the task queue; submission waits while it is full.
    pub queue_capacity: usize,
    /// Upper bound on operators running at the same time (`None` = no bound).
    pub max_parallel: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 10,
            max_parallel: None,
        }
    }
}

impl SolverConfig {
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = Some(max_parallel);
        self
    }

    /// Check the bounds. Out-of-range values are clamped to 1 at run time,
    /// but config loading reports them instead.
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.workers == 0 {
            return Err("[solver].workers must be >= 1 (got 0)".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("[solver].queue_capacity must be >= 1 (got 0)".to_string());
        }
        if self.max_parallel == Some(0) {
            return Err("[solver].max_parallel must be >= 1 when set (got 0)".to_string());
        }
        Ok(())
    }
}

/// Ephemeral per-run state. Created by [`Dag::solve_with`] and dropped when
/// the run ends.
pub(crate) struct Solver<'a> {
    dag: &'a mut Dag,
    config: SolverConfig,
    /// Nodes whose completion has been processed and expanded, root first.
    completed: Vec<NodeName>,
    /// Every node put on the task queue during this run.
    submitted: HashSet<NodeName>,
    /// Submitted nodes whose completion has not been received yet.
    in_flight: usize,
}

impl<'a> Solver<'a> {
    pub fn new(dag: &'a mut Dag, config: SolverConfig) -> Self {
        let capacity = dag.num_of_nodes();
        Self {
            dag,
            config,
            completed: Vec::with_capacity(capacity),
            submitted: HashSet::with_capacity(capacity),
            in_flight: 0,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let total = self.dag.num_of_nodes();

        let leftover = self.dag.take_executions();
        if !leftover.is_empty() {
            info!(
                running = leftover.len(),
                "waiting for operators still running from the previous run"
            );
            leftover.settle().await;
        }
        self.dag.reset_for_run();

        info!(
            nodes = total,
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            "starting dag solver"
        );

        let (queue_tx, queue_rx) = mpsc::channel::<NodeTask>(self.config.queue_capacity.max(1));
        // Each node reports at most twice per run, so workers never wait here.
        let (report_tx, mut report_rx) = mpsc::channel::<Report>(2 * total.max(1));
        let pool = WorkerPool::spawn(
            &self.config,
            queue_rx,
            report_tx,
            Arc::clone(self.dag.context()),
        );

        let root = self.dag.name().to_string();
        self.completed.push(root.clone());
        let mut outcome = self.solve_children(&root, &queue_tx).await;

        while outcome.is_ok() && self.in_flight > 0 {
            let Some(report) = report_rx.recv().await else {
                outcome = Err(DagflowError::Other(anyhow!(
                    "report channel closed with {} node(s) in flight",
                    self.in_flight
                )));
                break;
            };
            outcome = self.handle_report(report, &queue_tx).await;
        }

        if let Err(err) = outcome {
            pool.abort();
            drop(queue_tx);
            let executions = pool.join().await;

            // Workers have exited, so every start they announced is queued.
            while let Ok(report) = report_rx.try_recv() {
                self.record_late(report);
            }
            let skipped = self.skip_unreached();
            info!(
                skipped,
                still_running = executions.len(),
                "dag solver aborted"
            );
            self.dag.keep_executions(executions);
            return Err(err);
        }

        // Nothing is in flight and nothing new became ready.
        drop(queue_tx);
        pool.join().await.settle().await;

        let skipped = self.skip_unreached();
        info!(
            completed = self.completed.len(),
            skipped,
            total,
            "dag solver finished"
        );
        Ok(())
    }

    async fn handle_report(
        &mut self,
        report: Report,
        queue_tx: &mpsc::Sender<NodeTask>,
    ) -> Result<()> {
        match report {
            Report::Started { name } => {
                if let Some(node) = self.dag.node_mut(&name) {
                    node.start();
                }
                debug!(node = %name, "node started");
                Ok(())
            }
            Report::Finished { name, outcome } => {
                self.in_flight -= 1;
                self.handle_completion(name, outcome, queue_tx).await
            }
        }
    }

    /// Apply a report that arrived after the run was aborted: statuses are
    /// brought up to date, nothing is expanded.
    fn record_late(&mut self, report: Report) {
        match report {
            Report::Started { name } => {
                if let Some(node) = self.dag.node_mut(&name) {
                    node.start();
                }
            }
            Report::Finished { name, outcome } => {
                if let Some(node) = self.dag.node_mut(&name) {
                    if node.status() == NodeStatus::Running {
                        node.record_outcome(outcome);
                    }
                }
            }
        }
    }

    /// Record one completion, then either expand the node's children or
    /// report the run-ending failure.
    async fn handle_completion(
        &mut self,
        name: NodeName,
        outcome: std::result::Result<(), OperatorError>,
        queue_tx: &mpsc::Sender<NodeTask>,
    ) -> Result<()> {
        let failure = outcome.as_ref().err().cloned();

        let Some(node) = self.dag.node_mut(&name) else {
            warn!(node = %name, "completion for unknown node; ignoring");
            return Ok(());
        };
        node.record_outcome(outcome);

        let status = node.status();
        let required = node.is_required();
        let expand = node.can_solve_children();
        info!(node = %name, %status, in_flight = self.in_flight, "completed node");

        if let Some(source) = failure.filter(|_| required) {
            error!(node = %name, error = %source, "stopping dag solver as a required node failed");
            return Err(DagflowError::NodeFailed {
                dag: self.dag.name().to_string(),
                node: name,
                source,
            });
        }

        if expand {
            self.completed.push(name.clone());
            self.solve_children(&name, queue_tx).await?;
        } else {
            debug!(
                node = %name,
                "node failed without continue_on_err; not scheduling its children"
            );
        }

        Ok(())
    }

    /// Submit every child of `parent` whose parents are now all complete
    /// and all let their branch continue.
    ///
    /// A join node is submitted once even when several parents finish in a
    /// row: anything already in `submitted` is passed over.
    async fn solve_children(
        &mut self,
        parent: &str,
        queue_tx: &mpsc::Sender<NodeTask>,
    ) -> Result<()> {
        let children = match self.dag.node(parent) {
            Some(node) => node.children().to_vec(),
            None => return Ok(()),
        };

        for child in children {
            if !self.dag.can_run(&child) {
                debug!(node = %child, parent, "waiting on other parents");
                continue;
            }
            if !self.dag.parents_expand(&child) {
                debug!(
                    node = %child,
                    parent,
                    "another parent failed without continue_on_err; not scheduling"
                );
                continue;
            }

            let Some(node) = self.dag.node(&child) else {
                continue;
            };
            if node.status() != NodeStatus::Pending || !self.submitted.insert(child.clone()) {
                continue;
            }

            let task = NodeTask {
                name: child.clone(),
                operator: Arc::clone(node.operator()),
            };
            self.in_flight += 1;
            debug!(node = %child, parent, in_flight = self.in_flight, "submitting node");

            queue_tx
                .send(task)
                .await
                .map_err(|_| anyhow!("task queue closed while submitting node `{child}`"))?;
        }

        Ok(())
    }

    /// Mark every node still `Pending` as `Skipped`; returns how many.
    fn skip_unreached(&mut self) -> usize {
        let mut skipped = Vec::new();
        for node in self.dag.nodes_mut() {
            if node.status() == NodeStatus::Pending {
                node.skip();
                skipped.push(node.name().to_string());
            }
        }

        if !skipped.is_empty() {
            skipped.sort_unstable();
            debug!(?skipped, "nodes never reached in this run");
        }
        skipped.len()
    }
}
