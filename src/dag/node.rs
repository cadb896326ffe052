// src/dag/node.rs

//! A single vertex of the graph: one operator, its per-run status and its
//! edges to parents and children.

use std::fmt;
use std::sync::Arc;

use crate::errors::OperatorError;
use crate::operator::Operator;
use crate::types::{NodeName, NodeStatus};

/// One unit of work in a [`Dag`](crate::dag::Dag).
///
/// Edges are stored by name and only ever changed through the owning graph,
/// so a `Node` on its own is just the work unit plus its failure policy.
pub struct Node {
    pub(crate) name: NodeName,
    pub(crate) operator: Arc<dyn Operator>,
    pub(crate) status: NodeStatus,
    pub(crate) required: bool,
    pub(crate) continue_on_err: bool,
    pub(crate) retries: u32,
    pub(crate) last_error: Option<OperatorError>,
    pub(crate) parents: Vec<NodeName>,
    pub(crate) children: Vec<NodeName>,
}

impl Node {
    /// New pending node: not required, stops its branch on error, no retries.
    pub fn new(name: impl Into<NodeName>, operator: impl Operator + 'static) -> Self {
        Self::from_shared(name, Arc::new(operator))
    }

    /// Same as [`Node::new`] for an operator that is already shared.
    pub fn from_shared(name: impl Into<NodeName>, operator: Arc<dyn Operator>) -> Self {
        Self {
            name: name.into(),
            operator,
            status: NodeStatus::Pending,
            required: false,
            continue_on_err: false,
            retries: 0,
            last_error: None,
            parents: Vec::with_capacity(1),
            children: Vec::new(),
        }
    }

    /// If `true`, a failure of this node aborts the whole run.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// If `true` (and not required), children still run after this node fails.
    pub fn continue_on_err(mut self, continue_on_err: bool) -> Self {
        self.continue_on_err = continue_on_err;
        self
    }

    /// Declared re-execution budget. Recorded only; the solver runs every
    /// node at most once.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn continues_on_err(&self) -> bool {
        self.continue_on_err
    }

    pub fn retry_budget(&self) -> u32 {
        self.retries
    }

    /// Error from the most recent failed execution, if any.
    pub fn last_error(&self) -> Option<&OperatorError> {
        self.last_error.as_ref()
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }

    pub fn parents(&self) -> &[NodeName] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeName] {
        &self.children
    }

    pub fn num_of_parents(&self) -> usize {
        self.parents.len()
    }

    pub fn num_of_children(&self) -> usize {
        self.children.len()
    }

    /// `Success`, or a failure that is not required.
    ///
    /// Children waiting on this node treat it as satisfied. A required
    /// failed node is never complete.
    pub fn is_complete(&self) -> bool {
        match self.status {
            NodeStatus::Success => true,
            NodeStatus::Failed => !self.required,
            _ => false,
        }
    }

    /// Whether finishing this node should trigger readiness checks on its
    /// children. Narrower than [`is_complete`](Node::is_complete): a
    /// non-required failure only expands when `continue_on_err` is set.
    pub fn can_solve_children(&self) -> bool {
        match self.status {
            NodeStatus::Success => true,
            NodeStatus::Failed => !self.required && self.continue_on_err,
            _ => false,
        }
    }

    /// Mark a still-pending node as skipped. No-op in any other state.
    pub fn skip(&mut self) {
        if self.status == NodeStatus::Pending {
            self.status = NodeStatus::Skipped;
        }
    }

    /// `Pending -> Running`, once a worker has started the node. Returns
    /// `false` (and changes nothing) if the node was not pending.
    pub(crate) fn start(&mut self) -> bool {
        if self.status != NodeStatus::Pending {
            return false;
        }
        self.status = NodeStatus::Running;
        true
    }

    /// `Running -> Success | Failed`, keeping the error on failure.
    pub(crate) fn record_outcome(&mut self, outcome: Result<(), OperatorError>) {
        debug_assert_eq!(self.status, NodeStatus::Running, "node {}", self.name);
        match outcome {
            Ok(()) => self.status = NodeStatus::Success,
            Err(err) => {
                self.status = NodeStatus::Failed;
                self.last_error = Some(err);
            }
        }
    }

    /// Back to `Pending` for a fresh run. `last_error` survives from the
    /// previous run until the node fails again.
    pub(crate) fn reset(&mut self) {
        self.status = NodeStatus::Pending;
    }

    /// Insert `child` among this node's children at `pos`.
    ///
    /// Panics if `pos` is past the end of the child list.
    pub(crate) fn insert_child(&mut self, child: NodeName, pos: usize) {
        assert!(
            pos <= self.children.len(),
            "cannot insert child {:?} of node {:?} at position {} (only {} children)",
            child,
            self.name,
            pos,
            self.children.len()
        );
        self.children.insert(pos, child);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("operator", &self.operator.describe())
            .field("status", &self.status)
            .field("required", &self.required)
            .field("continue_on_err", &self.continue_on_err)
            .field("retries", &self.retries)
            .field("last_error", &self.last_error)
            .field("parents", &self.parents)
            .field("children", &self.children)
            .finish()
    }
}
