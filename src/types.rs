use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical node name type used throughout the crate.
pub type NodeName = String;

/// Completion status of a node within a single run.
///
/// Transitions only move forward:
/// `Pending -> Running -> {Success, Failed}` or `Pending -> Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Skipped,
    Success,
    Failed,
}

impl NodeStatus {
    /// `true` for `Skipped`, `Success` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Skipped | NodeStatus::Success | NodeStatus::Failed
        )
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::Pending
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Skipped => "skipped",
            NodeStatus::Success => "success",
            NodeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(NodeStatus::Pending),
            "running" => Ok(NodeStatus::Running),
            "skipped" => Ok(NodeStatus::Skipped),
            "success" => Ok(NodeStatus::Success),
            "failed" => Ok(NodeStatus::Failed),
            other => Err(format!(
                "invalid node status: {other} (expected pending, running, skipped, success or failed)"
            )),
        }
    }
}
