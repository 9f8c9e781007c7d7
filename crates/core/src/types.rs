use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::NodeExecutionError;

/// Unique identifier for a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named unit of work submitted as part of a workflow.
///
/// `action` and `parameters` are opaque to the scheduler and only interpreted
/// by the executor. `order` is a display hint and never affects scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            parameters: HashMap::new(),
            order: 0,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Parameters with `$name` references replaced from `context`
    pub fn resolved_parameters(
        &self,
        context: &HashMap<String, serde_json::Value>,
    ) -> HashMap<String, serde_json::Value> {
        crate::params::resolve_variables(&self.parameters, context)
    }
}

/// A persisted workflow definition as handed over by the workflow store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub tasks: Vec<Task>,
}

impl WorkflowDefinition {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Status of a single node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether dependents of a node in this state must be skipped
    pub fn blocks_dependents(self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Overall outcome of a run, derived from its node records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    PartialSuccess,
    Failed,
}

/// Per-node state for one run. Never reused across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub node: String,
    pub level: usize,
    pub status: NodeStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<NodeExecutionError>,
    pub reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl ExecutionRecord {
    pub fn pending(node: impl Into<String>, level: usize) -> Self {
        Self {
            node: node.into(),
            level,
            status: NodeStatus::Pending,
            result: None,
            error: None,
            reason: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = NodeStatus::Running;
    }

    pub(crate) fn finish(
        &mut self,
        outcome: Result<serde_json::Value, String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    ) {
        self.started_at = Some(started_at);
        self.completed_at = Some(completed_at);
        self.duration_ms = Some(duration_ms);

        match outcome {
            Ok(value) => {
                self.status = NodeStatus::Completed;
                self.result = Some(value);
            }
            Err(message) => self.fail(message),
        }
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = NodeStatus::Failed;
        self.error = Some(NodeExecutionError {
            node: self.node.clone(),
            message,
        });
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub(crate) fn skip(&mut self, reason: String) {
        self.status = NodeStatus::Skipped;
        self.reason = Some(reason);
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_definition_defaults() {
        let definition = WorkflowDefinition::from_json(
            r#"{
                "name": "scrape",
                "tasks": [
                    {"name": "open", "action": "navigate", "parameters": {"url": "https://example.com"}},
                    {"name": "read", "action": "extract", "order": 2, "depends_on": ["open"]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(definition.name.as_deref(), Some("scrape"));
        assert_eq!(definition.tasks.len(), 2);
        assert_eq!(definition.tasks[0].order, 0);
        assert!(definition.tasks[0].depends_on.is_empty());
        assert_eq!(definition.tasks[0].parameters["url"], json!("https://example.com"));
        assert!(definition.tasks[1].parameters.is_empty());
        assert_eq!(definition.tasks[1].depends_on, vec!["open".to_string()]);
    }

    #[test]
    fn test_workflow_definition_requires_action() {
        let result = WorkflowDefinition::from_json(r#"{"tasks": [{"name": "x"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("t2", "transform")
            .depends_on(["t1"])
            .with_parameter("format", json!("csv"))
            .with_order(3);

        assert_eq!(task.depends_on, vec!["t1".to_string()]);
        assert_eq!(task.parameters["format"], json!("csv"));
        assert_eq!(task.order, 3);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Completed.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(NodeStatus::Failed.blocks_dependents());
        assert!(NodeStatus::Skipped.blocks_dependents());
        assert!(!NodeStatus::Completed.blocks_dependents());
        assert_eq!(serde_json::to_value(NodeStatus::Skipped).unwrap(), json!("skipped"));
    }

    #[test]
    fn test_record_transitions() {
        let mut record = ExecutionRecord::pending("t1", 0);
        record.start();
        assert_eq!(record.status, NodeStatus::Running);

        let now = Utc::now();
        record.finish(Err("boom".to_string()), now, now, 0);
        assert_eq!(record.status, NodeStatus::Failed);
        assert_eq!(record.error.as_ref().unwrap().message, "boom");
        assert!(record.result.is_none());

        let mut skipped = ExecutionRecord::pending("t2", 1);
        skipped.skip("Dependency failed: t1".to_string());
        assert_eq!(skipped.status, NodeStatus::Skipped);
        assert!(skipped.started_at.is_none());
        assert!(skipped.completed_at.is_some());
    }
}
