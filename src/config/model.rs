// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::dag::SolverConfig;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [dag]
/// name = "build"
///
/// [solver]
/// workers = 2
/// queue_capacity = 10
///
/// [context]
/// target = "release"
///
/// [task.compile]
/// cmd = "cargo build --$TARGET"
/// required = true
///
/// [task.docs]
/// cmd = "cargo doc"
/// after = ["compile"]
/// continue_on_err = true
/// ```
///
/// All sections except `[task.<name>]` are optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub dag: DagSection,

    #[serde(default)]
    pub solver: SolverConfig,

    /// Initial run-context entries, visible to every task.
    #[serde(default)]
    pub context: BTreeMap<String, Value>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A [`RawConfigFile`] that passed validation.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see
/// [`validate`](crate::config::validate)), so holders can rely on every
/// `after` entry existing and the task graph being acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub dag: DagSection,
    pub solver: SolverConfig,
    pub context: BTreeMap<String, Value>,
    pub task: BTreeMap<String, TaskConfig>,
    /// Task names in dependency order (every task after all of its `after`).
    order: Vec<String>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, order: Vec<String>) -> Self {
        Self {
            dag: raw.dag,
            solver: raw.solver,
            context: raw.context,
            task: raw.task,
            order,
        }
    }

    /// Task names in an order where dependencies come first.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }
}

/// `[dag]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DagSection {
    /// Graph name; also the name of the root node.
    #[serde(default = "default_dag_name")]
    pub name: String,
}

fn default_dag_name() -> String {
    "dagflow".to_string()
}

impl Default for DagSection {
    fn default() -> Self {
        Self {
            name: default_dag_name(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command to execute.
    pub cmd: String,

    /// This task waits for all tasks listed here. Empty means it hangs
    /// directly off the graph root.
    #[serde(default)]
    pub after: Vec<String>,

    /// A failure of a required task aborts the whole run.
    #[serde(default)]
    pub required: bool,

    /// Let dependents run even if this (non-required) task fails.
    #[serde(default)]
    pub continue_on_err: bool,

    /// Declared retry budget; carried onto the node, not acted upon.
    #[serde(default)]
    pub retries: u32,

    /// Working directory for the command.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
