// src/lib.rs

//! Concurrent dependency-graph execution.
//!
//! Build a [`Dag`] of named [`Node`]s, each carrying an [`Operator`], then
//! call [`Dag::solve`]. Every node runs once, after all of its parents,
//! with independent branches running in parallel.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dagflow::{CommandOperator, Dag, MemoryContext, Node};
//!
//! # async fn demo() -> dagflow::errors::Result<()> {
//! let mut dag = Dag::new("build", Arc::new(MemoryContext::new()));
//! dag.add_child("build", Node::new("fetch", CommandOperator::new("git pull")).required(true));
//! dag.add_child("fetch", Node::new("test", CommandOperator::new("cargo test")));
//! dag.solve().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod errors;
pub mod logging;
pub mod operator;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, build_dag, load_and_validate};

pub use crate::context::{MemoryContext, RunContext};
pub use crate::dag::{Dag, Node, RunSummary, SolverConfig};
pub use crate::errors::{DagflowError, OperatorError};
pub use crate::operator::{AsyncFnOperator, CommandOperator, FnOperator, NoopOperator, Operator};
pub use crate::types::{NodeName, NodeStatus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - graph construction
/// - a single solve
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)?;

    if let Some(workers) = args.workers {
        cfg.solver.workers = workers.max(1);
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mut dag = build_dag(&cfg);
    info!(dag = %dag.name(), nodes = dag.num_of_nodes(), "solving dag from config");

    let result = dag.solve_with(cfg.solver).await;

    let summary = dag.summary();
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        skipped = summary.skipped,
        total = summary.total,
        "run finished"
    );
    for name in &summary.failed {
        if let Some(err) = dag.node(name).and_then(|n| n.last_error()) {
            eprintln!("node {name} failed: {err:#}");
        }
    }

    result?;
    Ok(())
}

/// Simple dry-run output: print the solver settings and tasks in the order
/// they would be added to the graph.
fn print_dry_run(cfg: &ConfigFile) {
    println!("dagflow dry-run");
    println!("  dag.name = {}", cfg.dag.name);
    println!("  solver.workers = {}", cfg.solver.workers);
    println!("  solver.queue_capacity = {}", cfg.solver.queue_capacity);
    if let Some(max) = cfg.solver.max_parallel {
        println!("  solver.max_parallel = {max}");
    }
    println!();

    println!("tasks ({}):", cfg.task.len());
    for name in cfg.topological_order() {
        let Some(task) = cfg.task.get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if task.required {
            println!("      required: true");
        }
        if task.continue_on_err {
            println!("      continue_on_err: true");
        }
        if task.retries > 0 {
            println!("      retries: {}", task.retries);
        }
        if let Some(ref cwd) = task.cwd {
            println!("      cwd: {}", cwd.display());
        }
    }

    debug!("dry-run complete (no execution)");
}
