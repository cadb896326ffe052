// src/config/build.rs

//! Turn a validated [`ConfigFile`] into a runnable [`Dag`].

use std::sync::Arc;

use tracing::{Dispatch, debug};

use crate::config::model::{ConfigFile, TaskConfig};
use crate::context::MemoryContext;
use crate::dag::{Dag, Node};
use crate::operator::CommandOperator;

/// Build a graph of [`CommandOperator`] nodes from `cfg`.
///
/// Tasks are inserted in dependency order: a task without `after` hangs off
/// the root, otherwise its first `after` entry is the parent it is added
/// under and the remaining entries are linked as extra parents.
pub fn build_dag(cfg: &ConfigFile) -> Dag {
    build(cfg, None)
}

/// Same as [`build_dag`], logging to `logger` instead of the default subscriber.
pub fn build_dag_with_logger(cfg: &ConfigFile, logger: Dispatch) -> Dag {
    build(cfg, Some(logger))
}

fn build(cfg: &ConfigFile, logger: Option<Dispatch>) -> Dag {
    let ctx = Arc::new(MemoryContext::from_pairs(
        cfg.context.iter().map(|(k, v)| (k.clone(), v.clone())),
    ));

    let mut dag = match logger {
        Some(logger) => Dag::with_logger(cfg.dag.name.clone(), ctx, logger),
        None => Dag::new(cfg.dag.name.clone(), ctx),
    };

    for name in cfg.topological_order() {
        let Some(task) = cfg.task.get(name) else {
            continue;
        };

        let node = node_from_task(name, task);
        match task.after.split_first() {
            None => dag.add_child(&cfg.dag.name, node),
            Some((first, rest)) => {
                dag.add_child(first, node);
                for parent in rest {
                    dag.link(parent, name);
                }
            }
        }
    }

    dag.log(|| debug!(dag = %cfg.dag.name, tasks = cfg.task.len(), "built dag from config"));
    dag
}

fn node_from_task(name: &str, task: &TaskConfig) -> Node {
    let mut op = CommandOperator::new(task.cmd.clone());
    if let Some(dir) = &task.cwd {
        op = op.cwd(dir.clone());
    }
    for (key, val) in &task.env {
        op = op.env(key.clone(), val.clone());
    }

    Node::new(name, op)
        .required(task.required)
        .continue_on_err(task.continue_on_err)
        .retries(task.retries)
}
