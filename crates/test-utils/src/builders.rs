#![allow(dead_code)]

use std::collections::BTreeMap;

use dagflow::config::{ConfigFile, DagSection, RawConfigFile, TaskConfig};
use dagflow::dag::SolverConfig;
use serde_json::Value;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                dag: DagSection::default(),
                solver: SolverConfig::default(),
                context: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.config.dag.name = name.to_string();
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.solver.workers = workers;
        self
    }

    pub fn with_context(mut self, key: &str, val: Value) -> Self {
        self.config.context.insert(key.to_string(), val);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                required: false,
                continue_on_err: false,
                retries: 0,
                cwd: None,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn required(mut self, val: bool) -> Self {
        self.task.required = val;
        self
    }

    pub fn continue_on_err(mut self, val: bool) -> Self {
        self.task.continue_on_err = val;
        self
    }

    pub fn retries(mut self, val: u32) -> Self {
        self.task.retries = val;
        self
    }

    pub fn env(mut self, key: &str, val: &str) -> Self {
        self.task.env.insert(key.to_string(), val.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
