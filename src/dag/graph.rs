// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, debug, error, info, info_span};

use crate::context::RunContext;
use crate::dag::node::Node;
use crate::dag::solver::{Solver, SolverConfig};
use crate::dag::worker::Executions;
use crate::errors::{DagflowError, Result};
use crate::operator::NoopOperator;
use crate::types::{NodeName, NodeStatus};

/// A graph of named nodes hanging off a synthetic root.
///
/// The root is named after the graph, never fails and starts out
/// `Success`, so its children are the first nodes to run. Edges are added
/// only through `&mut self` methods and are frozen while [`solve`](Dag::solve)
/// runs, which also holds `&mut self`.
///
/// Structural mistakes (unknown parent, duplicate name, bad position) are
/// programming errors and panic instead of returning an error.
pub struct Dag {
    root: NodeName,
    nodes: HashMap<NodeName, Node>,
    ctx: Arc<dyn RunContext>,
    logger: Option<Dispatch>,
    /// Operators an aborted run left running.
    executions: Executions,
}

/// Per-status counts after a run, excluding the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub pending: usize,
    pub running: usize,
    /// Names of failed nodes, sorted.
    pub failed: Vec<NodeName>,
}

impl Dag {
    /// New graph whose diagnostics go to the host's current default
    /// `tracing` subscriber.
    pub fn new(name: impl Into<NodeName>, ctx: Arc<dyn RunContext>) -> Self {
        Self::build(name.into(), ctx, None)
    }

    /// New graph whose diagnostics go to `logger` only.
    pub fn with_logger(
        name: impl Into<NodeName>,
        ctx: Arc<dyn RunContext>,
        logger: Dispatch,
    ) -> Self {
        Self::build(name.into(), ctx, Some(logger))
    }

    fn build(name: NodeName, ctx: Arc<dyn RunContext>, logger: Option<Dispatch>) -> Self {
        let mut root = Node::new(name.clone(), NoopOperator)
            .required(true)
            .continue_on_err(true);
        root.status = NodeStatus::Success;

        let mut nodes = HashMap::new();
        nodes.insert(name.clone(), root);

        let dag = Self {
            root: name,
            nodes,
            ctx,
            logger,
            executions: Executions::default(),
        };
        dag.log(|| debug!(dag = %dag.root, "new dag created"));
        dag
    }

    pub fn name(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&self.root]
    }

    /// Number of registered nodes, including the root.
    pub fn num_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        self.nodes.get(name).map(Node::status)
    }

    /// All registered names, sorted.
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn context(&self) -> &Arc<dyn RunContext> {
        &self.ctx
    }

    /// Append `node` to the children of `parent`.
    pub fn add_child(&mut self, parent: &str, node: Node) {
        let pos = self.parent_mut(parent).num_of_children();
        self.add_child_at(parent, node, pos);
    }

    /// Insert `node` among the children of `parent` at `pos`.
    ///
    /// # Panics
    ///
    /// If `parent` is unknown, if a node named like `node` is already
    /// registered (use [`link_at`](Dag::link_at) to give an existing node
    /// another parent), or if `pos` is past the end of the child list.
    pub fn add_child_at(&mut self, parent: &str, mut node: Node, pos: usize) {
        assert!(
            !self.nodes.contains_key(&node.name),
            "dag {:?} already contains a node named {:?}; use `link` to add another parent",
            self.root,
            node.name
        );

        let name = node.name.clone();
        self.parent_mut(parent).insert_child(name.clone(), pos);
        node.parents.push(parent.to_string());
        self.nodes.insert(name.clone(), node);

        self.log(|| {
            info!(dag = %self.root, node = %name, parent, position = pos, "added node")
        });
    }

    /// Make the already-registered `child` a child of `parent` too.
    pub fn link(&mut self, parent: &str, child: &str) {
        let pos = self.parent_mut(parent).num_of_children();
        self.link_at(parent, child, pos);
    }

    /// Positional variant of [`link`](Dag::link).
    ///
    /// # Panics
    ///
    /// If either node is unknown, if the edge already exists, or if `pos`
    /// is past the end of the child list.
    pub fn link_at(&mut self, parent: &str, child: &str, pos: usize) {
        assert!(
            self.nodes.contains_key(child),
            "dag {:?} doesn't contain any node named {:?}",
            self.root,
            child
        );
        assert!(
            !self.children_of(parent).iter().any(|c| c == child),
            "node {:?} is already a child of {:?}",
            child,
            parent
        );

        self.parent_mut(parent).insert_child(child.to_string(), pos);
        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parents.push(parent.to_string());
        }

        self.log(|| {
            info!(dag = %self.root, node = child, parent, position = pos, "linked node")
        });
    }

    /// Splice `sub` under `parent`: its root becomes an ordinary (no-op)
    /// child of `parent` and all its nodes join this graph.
    ///
    /// The two graphs must use disjoint node names.
    ///
    /// # Panics
    ///
    /// If `parent` is unknown or the graphs share a node name.
    pub fn add_dag(&mut self, parent: &str, sub: Dag) {
        let Dag {
            root: sub_root,
            nodes: sub_nodes,
            ..
        } = sub;

        if let Some(clash) = sub_nodes.keys().find(|name| self.nodes.contains_key(*name)) {
            panic!(
                "cannot add dag {:?} to dag {:?}: node name {:?} is used by both",
                sub_root, self.root, clash
            );
        }

        let parent_node = self.parent_mut(parent);
        let pos = parent_node.num_of_children();
        parent_node.insert_child(sub_root.clone(), pos);

        let merged = sub_nodes.len();
        for (name, mut node) in sub_nodes {
            if name == sub_root {
                node.parents.push(parent.to_string());
                node.reset();
            }
            self.nodes.insert(name, node);
        }

        self.log(|| {
            info!(
                dag = %self.root,
                sub_dag = %sub_root,
                parent,
                merged,
                "added sub-dag"
            )
        });
    }

    /// `true` iff every parent of `name` is complete. Unknown names are
    /// never runnable.
    pub fn can_run(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|node| {
            node.parents
                .iter()
                .all(|p| self.nodes.get(p).is_some_and(Node::is_complete))
        })
    }

    /// `true` iff every parent of `name` lets its branch continue
    /// ([`Node::can_solve_children`]).
    ///
    /// A join node under a parent that failed without `continue_on_err` is
    /// therefore never scheduled, whichever parent happens to finish last.
    pub fn parents_expand(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|node| {
            node.parents
                .iter()
                .all(|p| self.nodes.get(p).is_some_and(Node::can_solve_children))
        })
    }

    /// `true` iff no cycle is reachable from the root.
    pub fn is_solvable(&self) -> bool {
        self.find_cycle().is_none()
    }

    /// Depth-first search from the root for a back edge.
    ///
    /// Returns the cycle as a path whose first and last names are equal.
    /// A node is "on path" only while it is on the DFS stack; once all its
    /// children are explored it is moved to `finished` and never walked
    /// again, so diamonds are neither misreported nor re-explored.
    pub fn find_cycle(&self) -> Option<Vec<NodeName>> {
        let root = self.root.as_str();
        let mut on_path: HashSet<&str> = HashSet::from([root]);
        let mut finished: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];

        while let Some(top) = stack.last_mut() {
            let name = top.0;
            let next = top.1;
            let children = self.children_of(name);

            if next == children.len() {
                on_path.remove(name);
                finished.insert(name);
                stack.pop();
                continue;
            }

            top.1 += 1;
            let child = children[next].as_str();

            if on_path.contains(child) {
                let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                let mut cycle: Vec<NodeName> =
                    stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                cycle.push(child.to_string());
                return Some(cycle);
            }

            if !finished.contains(child) {
                on_path.insert(child);
                stack.push((child, 0));
            }
        }

        None
    }

    /// Run every node once with the default [`SolverConfig`].
    pub async fn solve(&mut self) -> Result<()> {
        self.solve_with(SolverConfig::default()).await
    }

    /// Check for cycles, then run the graph.
    ///
    /// Returns `Ok(())` when every reachable node ran (tolerated failures
    /// included), [`DagflowError::CyclicGraph`] without running anything if
    /// the graph has a cycle, or [`DagflowError::NodeFailed`] for the first
    /// required node that failed.
    pub async fn solve_with(&mut self, config: SolverConfig) -> Result<()> {
        let dispatch = self.dispatch();

        async {
            if let Some(cycle) = self.find_cycle() {
                error!(dag = %self.root, ?cycle, "dag is not solvable as it has cycles");
                return Err(DagflowError::CyclicGraph {
                    dag: self.root.clone(),
                    cycle,
                });
            }

            let span = info_span!("solve", dag = %self.root);
            Solver::new(&mut *self, config).run().instrument(span).await
        }
        .with_subscriber(dispatch)
        .await
    }

    /// Wait for operators that an aborted run left running.
    ///
    /// A later [`solve`](Dag::solve) does this itself before resetting any
    /// status. Their reports are discarded, so nodes they belong to keep
    /// whatever status the aborted run left them in.
    pub async fn settle(&mut self) {
        let executions = std::mem::take(&mut self.executions);
        if executions.is_empty() {
            return;
        }

        let dispatch = self.dispatch();
        async {
            debug!(dag = %self.root, running = executions.len(), "waiting for leftover operators");
            executions.settle().await;
        }
        .with_subscriber(dispatch)
        .await
    }

    /// Status counts for the most recent run.
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for node in self.nodes.values().filter(|n| n.name != self.root) {
            summary.total += 1;
            match node.status {
                NodeStatus::Success => summary.succeeded += 1,
                NodeStatus::Skipped => summary.skipped += 1,
                NodeStatus::Pending => summary.pending += 1,
                NodeStatus::Running => summary.running += 1,
                NodeStatus::Failed => summary.failed.push(node.name.clone()),
            }
        }

        summary.failed.sort_unstable();
        summary
    }

    pub(crate) fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Put every node but the root back to `Pending` ahead of a new run.
    pub(crate) fn reset_for_run(&mut self) {
        let root = self.root.clone();
        for node in self.nodes.values_mut() {
            if node.name == root {
                node.status = NodeStatus::Success;
            } else {
                node.reset();
            }
        }
    }

    pub(crate) fn take_executions(&mut self) -> Executions {
        std::mem::take(&mut self.executions)
    }

    pub(crate) fn keep_executions(&mut self, executions: Executions) {
        self.executions = executions;
    }

    fn children_of(&self, name: &str) -> &[NodeName] {
        self.nodes
            .get(name)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn parent_mut(&mut self, parent: &str) -> &mut Node {
        match self.nodes.get_mut(parent) {
            Some(node) => node,
            None => panic!(
                "dag {:?} doesn't contain any node named {:?}",
                self.root, parent
            ),
        }
    }

    /// The injected logger, or the caller's current default subscriber.
    fn dispatch(&self) -> Dispatch {
        self.logger
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone))
    }

    /// Run `f` with the injected logger as the default subscriber.
    pub(crate) fn log(&self, f: impl FnOnce()) {
        match &self.logger {
            Some(logger) => tracing::dispatcher::with_default(logger, f),
            None => f(),
        }
    }
}

impl fmt::Debug for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag")
            .field("name", &self.root)
            .field("nodes", &self.node_names())
            .finish_non_exhaustive()
    }
}
