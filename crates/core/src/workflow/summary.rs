use crate::types::{ExecutionRecord, NodeStatus, RunId, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one `execute` call, ready to be persisted by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub run_id: RunId,
    pub completed: Vec<ExecutionRecord>,
    pub failed: Vec<ExecutionRecord>,
    pub skipped: Vec<ExecutionRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock time from the first node start to the last terminal state
    pub total_duration_ms: u64,
    /// Highest number of nodes observed running at the same time
    pub parallelism_achieved: usize,
}

/// Node counts for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Fold the records of one run into a summary.
///
/// Records that never reached a terminal state are dropped with a warning;
/// the engine does not produce any.
pub fn summarize<I>(run_id: RunId, records: I, parallelism_achieved: usize) -> ExecutionSummary
where
    I: IntoIterator<Item = ExecutionRecord>,
{
    let mut completed = Vec::new();
    let mut failed = Vec::new();
    let mut skipped = Vec::new();
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut completed_at: Option<DateTime<Utc>> = None;

    for record in records {
        if let Some(start) = record.started_at {
            started_at = Some(started_at.map_or(start, |s| s.min(start)));
        }
        if let Some(end) = record.completed_at {
            completed_at = Some(completed_at.map_or(end, |c| c.max(end)));
        }

        match record.status {
            NodeStatus::Completed => completed.push(record),
            NodeStatus::Failed => failed.push(record),
            NodeStatus::Skipped => skipped.push(record),
            status => {
                tracing::warn!("Dropping record for {} in non-terminal state {}", record.node, status);
            }
        }
    }

    for list in [&mut completed, &mut failed, &mut skipped] {
        list.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.node.cmp(&b.node)));
    }

    let total_duration_ms = match (started_at, completed_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
        _ => 0,
    };

    ExecutionSummary {
        run_id,
        completed,
        failed,
        skipped,
        started_at,
        completed_at,
        total_duration_ms,
        parallelism_achieved,
    }
}

impl ExecutionSummary {
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.total_duration_ms)
    }

    pub fn status(&self) -> RunStatus {
        if self.failed.is_empty() && self.skipped.is_empty() {
            RunStatus::Completed
        } else if !self.completed.is_empty() {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Completed
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.completed.len() + self.failed.len() + self.skipped.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
            skipped: self.skipped.len(),
        }
    }

    /// Look up the record of a node by name
    pub fn record(&self, node: &str) -> Option<&ExecutionRecord> {
        self.completed
            .iter()
            .chain(&self.failed)
            .chain(&self.skipped)
            .find(|r| r.node == node)
    }
}
