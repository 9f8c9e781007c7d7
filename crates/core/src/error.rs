use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Errors raised while building a workflow DAG. Fatal for the submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// The task list contains a dependency cycle (including a self-reference)
    #[error("Circular dependency detected between tasks: {}", nodes.join(", "))]
    CircularDependency { nodes: Vec<String> },

    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),
}

/// Failure of a single node, captured on its execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Task {node} failed: {message}")]
pub struct NodeExecutionError {
    pub node: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_concurrency must be between 1 and {}", tokio::sync::Semaphore::MAX_PERMITS)]
    InvalidConcurrency,

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
