// Core of the Weft workflow engine: DAG building, bounded parallel execution and run summaries

pub mod config;
pub mod error;
pub mod events;
pub mod params;
pub mod telemetry;
pub mod types;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{ConfigError, DagError, NodeExecutionError};
pub use types::*;
pub use workflow::{build_dag, ExecutionSummary, NodeExecutor, ParallelExecutor, WorkflowDag};
