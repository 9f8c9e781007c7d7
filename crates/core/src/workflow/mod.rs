// DAG-based parallel workflow execution engine

pub mod dag;
pub mod executor;
pub mod node_executor;
pub mod retry;
pub mod summary;

pub use dag::{build_dag, Node, UnresolvedDependency, WorkflowDag};
pub use executor::ParallelExecutor;
pub use node_executor::{executor_fn, FnExecutor, NodeExecutor, TimeoutExecutor};
pub use retry::RetryPolicy;
pub use summary::{summarize, ExecutionSummary, Progress};
