//! Pipeline coordination: configuration, orchestration, report rendering and
//! run tracing.

pub mod config;
pub mod orchestrator;
pub mod report;
pub mod trace;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{Coordinator, PipelineError, PipelineRun, RunStats};
pub use report::RunPaths;
pub use trace::RunTrace;
