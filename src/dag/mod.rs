// src/dag/mod.rs

//! Graph representation and concurrent solving.
//!
//! - [`graph`] holds the [`Dag`]: the root, the name index and edge insertion.
//! - [`node`] is a single vertex and its status state machine.
//! - [`solver`] contains the coordination loop that drives one run.
//! - [`worker`] is the pool that executes ready nodes in parallel.

pub mod graph;
pub mod node;
pub mod solver;
mod worker;

pub use graph::{Dag, RunSummary};
pub use node::Node;
pub use solver::SolverConfig;
