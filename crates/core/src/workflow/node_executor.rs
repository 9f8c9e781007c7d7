use super::dag::Node;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Performs the work behind a single DAG node.
///
/// The engine treats implementations as opaque: any `Err` marks the node
/// failed and skips its dependents. Timeouts, retries of a single node and
/// resource cleanup all belong to the implementation.
#[async_trait::async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, node: &Node) -> Result<Value>;
}

/// Adapter turning an async closure into a [`NodeExecutor`]
pub struct FnExecutor<F> {
    f: F,
}

/// Wrap a closure `Fn(Node) -> impl Future<Output = Result<Value>>` as an executor
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(Node) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnExecutor { f }
}

#[async_trait::async_trait]
impl<F, Fut> NodeExecutor for FnExecutor<F>
where
    F: Fn(Node) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, node: &Node) -> Result<Value> {
        (self.f)(node.clone()).await
    }
}

/// Fails a node whose inner executor does not settle in time
pub struct TimeoutExecutor<E> {
    inner: E,
    limit: Duration,
}

impl<E: NodeExecutor> TimeoutExecutor<E> {
    pub fn new(inner: E, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait::async_trait]
impl<E: NodeExecutor> NodeExecutor for TimeoutExecutor<E> {
    async fn execute(&self, node: &Node) -> Result<Value> {
        match timeout(self.limit, self.inner.execute(node)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Task {} timed out after {:?}", node.id, self.limit);
                Err(anyhow!("Task timed out after {:?}", self.limit))
            }
        }
    }
}
