// src/config/mod.rs

//! Pipeline configuration for dagflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate dependencies and acyclicity (`validate.rs`).
//! - Build a [`Dag`](crate::dag::Dag) of shell commands from it (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::{build_dag, build_dag_with_logger};
pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{ConfigFile, DagSection, RawConfigFile, TaskConfig};
