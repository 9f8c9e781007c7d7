use super::dag::WorkflowDag;
use super::executor::ParallelExecutor;
use super::summary::ExecutionSummary;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Caller-side policy re-running a whole workflow while it reports failures.
///
/// The engine itself never retries; each attempt is a fresh run with fresh
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 1,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_secs(self.backoff_secs.saturating_mul(factor))
    }

    /// Run `dag` until a run succeeds or the attempts are used up.
    ///
    /// Returns the summary of the last attempt.
    pub async fn execute(&self, engine: &ParallelExecutor, dag: &WorkflowDag) -> ExecutionSummary {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let summary = engine.execute(dag).await;
            if summary.is_success() || attempt >= max_attempts {
                if !summary.is_success() {
                    tracing::warn!(
                        "Workflow still failing after {} attempts ({} failed, {} skipped)",
                        attempt,
                        summary.failed.len(),
                        summary.skipped.len()
                    );
                }
                return summary;
            }

            let backoff = self.backoff(attempt);
            tracing::info!(
                "Retrying workflow after {:?} (attempt {} of {})",
                backoff,
                attempt + 1,
                max_attempts
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::Task;
    use crate::workflow::dag::Node;
    use crate::workflow::node_executor::executor_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky_engine(failures_before_success: u32, calls: Arc<AtomicU32>) -> ParallelExecutor {
        let executor = executor_fn(move |node: Node| {
            let calls = calls.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if node.id == "flaky" && call <= failures_before_success {
                    anyhow::bail!("transient failure #{}", call);
                }
                Ok(json!(call))
            }
        });
        ParallelExecutor::new(&EngineConfig::default(), Arc::new(executor)).unwrap()
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_secs: 2,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(200), Duration::from_secs(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = flaky_engine(2, calls.clone());
        let dag = WorkflowDag::build(&[Task::new("flaky", "fetch")]).unwrap();

        let start = tokio::time::Instant::now();
        let summary = RetryPolicy::default().execute(&engine, &dag).await;

        assert!(summary.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = flaky_engine(10, calls.clone());
        let dag = WorkflowDag::build(&[Task::new("flaky", "fetch")]).unwrap();

        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_secs: 1,
        };
        let summary = policy.execute(&engine, &dag).await;

        assert!(!summary.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            summary.failed[0].error.as_ref().unwrap().message,
            "transient failure #2"
        );
    }

    #[tokio::test]
    async fn test_successful_run_is_not_repeated() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = flaky_engine(0, calls.clone());
        let dag = WorkflowDag::build(&[Task::new("steady", "fetch")]).unwrap();

        let policy = RetryPolicy {
            max_attempts: 0,
            backoff_secs: 1,
        };
        assert!(policy.execute(&engine, &dag).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
