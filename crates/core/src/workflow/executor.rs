use super::dag::{Node, WorkflowDag};
use super::node_executor::NodeExecutor;
use super::summary::{summarize, ExecutionSummary};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::events::{Event, EventEmitter, EventType};
use crate::types::{ExecutionRecord, NodeStatus, RunId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Runs a workflow DAG level by level with a global concurrency bound
pub struct ParallelExecutor {
    executor: Arc<dyn NodeExecutor>,
    max_concurrency: usize,
}

/// What a spawned node task hands back to the coordinator
struct NodeOutcome {
    node: String,
    result: Result<Value, String>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration_ms: u64,
}

impl ParallelExecutor {
    pub fn new(config: &EngineConfig, executor: Arc<dyn NodeExecutor>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            executor,
            max_concurrency: config.max_concurrency,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Execute every node of `dag` and summarize the run.
    ///
    /// Node failures never abort the run; they are recorded and cause the
    /// failed node's dependents to be skipped.
    pub async fn execute(&self, dag: &WorkflowDag) -> ExecutionSummary {
        let run_id = RunId::new();
        self.run(run_id, dag, EventEmitter::new(run_id, None)).await
    }

    /// Same as [`Self::execute`], streaming lifecycle events to `events`
    pub async fn execute_with_events(
        &self,
        dag: &WorkflowDag,
        events: UnboundedSender<Event>,
    ) -> ExecutionSummary {
        let run_id = RunId::new();
        self.run(run_id, dag, EventEmitter::new(run_id, Some(events))).await
    }

    #[tracing::instrument(skip_all, fields(run_id = %run_id, nodes = dag.len()))]
    async fn run(&self, run_id: RunId, dag: &WorkflowDag, emitter: EventEmitter) -> ExecutionSummary {
        let levels = dag.levels();

        tracing::info!(
            "Starting workflow execution: {} nodes across {} levels (max_concurrency={})",
            dag.len(),
            levels.len(),
            self.max_concurrency
        );
        emitter.emit(EventType::RunStarted {
            total_nodes: dag.len(),
            levels: levels.len(),
            max_concurrency: self.max_concurrency,
        });

        let mut records: HashMap<String, ExecutionRecord> = dag
            .nodes()
            .iter()
            .map(|n| (n.id.clone(), ExecutionRecord::pending(&n.id, n.level)))
            .collect();

        // One semaphore for the whole run so the bound holds across levels
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let gauge = Arc::new(ConcurrencyGauge::default());

        for (level, nodes) in levels.iter().enumerate() {
            tracing::info!("Executing level {} ({} nodes)", level, nodes.len());
            emitter.emit(EventType::LevelStarted {
                level,
                node_count: nodes.len(),
            });

            let mut in_flight: JoinSet<NodeOutcome> = JoinSet::new();

            for node in nodes {
                if let Some(blocker) = blocking_dependency(node, &records) {
                    let reason = format!("Dependency failed: {}", blocker);
                    tracing::info!("Skipping task {} due to failed dependency {}", node.id, blocker);

                    if let Some(record) = records.get_mut(&node.id) {
                        record.skip(reason.clone());
                    }
                    emitter.emit(EventType::NodeSkipped {
                        node: node.id.clone(),
                        reason,
                    });
                    continue;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    if let Some(record) = records.get_mut(&node.id) {
                        fail_unsettled(record, &emitter, "Concurrency limiter closed");
                    }
                    continue;
                };

                tracing::debug!("Launching task {} (action={})", node.id, node.task.action);
                if let Some(record) = records.get_mut(&node.id) {
                    record.start();
                }
                emitter.emit(EventType::NodeStarted {
                    node: node.id.clone(),
                    level,
                });

                let executor = self.executor.clone();
                let gauge = gauge.clone();
                let node = (*node).clone();

                in_flight.spawn(async move {
                    let _permit = permit;
                    let _slot = gauge.enter();
                    run_node(executor, node).await
                });
            }

            // Barrier: the whole level settles before the next one starts
            while let Some(joined) = in_flight.join_next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // executor panics are already caught in run_node;
                        // the orphaned record is failed after the join
                        tracing::error!("Node task aborted: {}", e);
                        continue;
                    }
                };

                match &outcome.result {
                    Ok(_) => {
                        tracing::info!("Task {} completed in {}ms", outcome.node, outcome.duration_ms);
                        emitter.emit(EventType::NodeCompleted {
                            node: outcome.node.clone(),
                            duration_ms: outcome.duration_ms,
                        });
                    }
                    Err(error) => {
                        tracing::warn!("Task {} failed: {}", outcome.node, error);
                        emitter.emit(EventType::NodeFailed {
                            node: outcome.node.clone(),
                            error: error.clone(),
                        });
                    }
                }

                if let Some(record) = records.get_mut(&outcome.node) {
                    record.finish(
                        outcome.result,
                        outcome.started_at,
                        outcome.completed_at,
                        outcome.duration_ms,
                    );
                }
            }

            // Anything still running here lost its task to an abort
            let (mut completed, mut failed, mut skipped) = (0, 0, 0);
            for node in nodes {
                let Some(record) = records.get_mut(&node.id) else {
                    continue;
                };
                if record.status == NodeStatus::Running {
                    fail_unsettled(record, &emitter, "Node task aborted");
                }
                match record.status {
                    NodeStatus::Completed => completed += 1,
                    NodeStatus::Failed => failed += 1,
                    NodeStatus::Skipped => skipped += 1,
                    NodeStatus::Pending | NodeStatus::Running => {}
                }
            }

            emitter.emit(EventType::LevelCompleted {
                level,
                completed,
                failed,
                skipped,
            });
        }

        let summary = summarize(run_id, records.into_values(), gauge.peak());

        tracing::info!(
            "Workflow execution finished: {} completed, {} failed, {} skipped in {}ms (parallelism={})",
            summary.completed.len(),
            summary.failed.len(),
            summary.skipped.len(),
            summary.total_duration_ms,
            summary.parallelism_achieved
        );
        emitter.emit(EventType::RunCompleted {
            status: summary.status(),
            completed: summary.completed.len(),
            failed: summary.failed.len(),
            skipped: summary.skipped.len(),
            duration_ms: summary.total_duration_ms,
        });

        summary
    }
}

/// First resolved dependency that failed or was skipped.
///
/// Unresolved dependencies have no record and never block.
fn blocking_dependency<'a>(node: &'a Node, records: &HashMap<String, ExecutionRecord>) -> Option<&'a str> {
    node.dependencies
        .iter()
        .find(|dep| {
            records
                .get(dep.as_str())
                .is_some_and(|record| record.status.blocks_dependents())
        })
        .map(String::as_str)
}

/// Fail a node the executor never reported on, keeping the event stream in step
fn fail_unsettled(record: &mut ExecutionRecord, emitter: &EventEmitter, error: &str) {
    tracing::error!("Task {} failed without an outcome: {}", record.node, error);
    record.fail(error.to_string());
    emitter.emit(EventType::NodeFailed {
        node: record.node.clone(),
        error: error.to_string(),
    });
}

/// Invoke the executor on its own task so a panic becomes a node failure
async fn run_node(executor: Arc<dyn NodeExecutor>, node: Node) -> NodeOutcome {
    let id = node.id.clone();
    let started_at = Utc::now();
    let start = Instant::now();

    let handle = tokio::spawn(async move { executor.execute(&node).await });
    let result = match handle.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(e) if e.is_panic() => {
            tracing::error!("Executor panicked while running task {}", id);
            Err(format!("Executor panicked: {}", e))
        }
        Err(e) => Err(e.to_string()),
    };

    NodeOutcome {
        node: id,
        result,
        started_at,
        completed_at: Utc::now(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Tracks nodes currently executing and the highest count observed
#[derive(Debug, Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(self: &Arc<Self>) -> GaugeSlot {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeSlot {
            gauge: Arc::clone(self),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct GaugeSlot {
    gauge: Arc<ConcurrencyGauge>,
}

impl Drop for GaugeSlot {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}
