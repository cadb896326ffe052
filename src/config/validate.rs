// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DagflowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let order = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, order))
    }
}

/// Run semantic validation and return the tasks in dependency order.
///
/// This checks:
/// - there is at least one task
/// - `[solver]` bounds
/// - no task is named like the graph itself (that name is the root)
/// - all `after` dependencies refer to existing tasks, not the task itself,
///   and are not repeated
/// - the task graph has no cycles
fn validate_raw_config(cfg: &RawConfigFile) -> Result<Vec<String>> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagflowError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    cfg.solver.check().map_err(DagflowError::ConfigError)?;

    if cfg.dag.name.trim().is_empty() {
        return Err(DagflowError::ConfigError(
            "[dag].name must not be empty".to_string(),
        ));
    }

    if cfg.task.contains_key(&cfg.dag.name) {
        return Err(DagflowError::ConfigError(format!(
            "task '{}' has the same name as the dag; rename one of them",
            cfg.dag.name
        )));
    }

    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        let mut seen = HashSet::new();
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(DagflowError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(DagflowError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !seen.insert(dep.as_str()) {
                return Err(DagflowError::ConfigError(format!(
                    "task '{}' lists dependency '{}' more than once in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<Vec<String>> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => {
            let node = cycle.node_id();
            let mut members: Vec<String> = kosaraju_scc(&graph)
                .into_iter()
                .find(|scc| scc.contains(&node))
                .unwrap_or_else(|| vec![node])
                .into_iter()
                .map(str::to_string)
                .collect();
            members.sort_unstable();

            Err(DagflowError::CyclicGraph {
                dag: cfg.dag.name.clone(),
                cycle: members,
            })
        }
    }
}
