// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("dag `{dag}` is not solvable as it has cycles: {}", cycle.join(" -> "))]
    CyclicGraph { dag: String, cycle: Vec<String> },

    #[error("failed to solve dag `{dag}`: required node `{node}` failed")]
    NodeFailed {
        dag: String,
        node: String,
        #[source]
        source: OperatorError,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagflowError>;

/// Error returned by a node's operator, retained verbatim on the node.
///
/// Cloning is cheap: the same underlying `anyhow::Error` is shared between
/// the node (for later reporting) and the run-level [`DagflowError`].
#[derive(Clone)]
pub struct OperatorError(Arc<anyhow::Error>);

impl OperatorError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// The operator's error as it was returned.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for OperatorError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

impl fmt::Debug for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for OperatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        (**self.0).source()
    }
}
