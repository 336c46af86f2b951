//! insight-forge: agentic marketing-analytics pipeline coordinator.
//!
//! This library sequences five role contracts (planner, data summarizer,
//! insight generator, evaluator, creative generator) over immutable
//! JSON-serializable payloads, and merges their outputs into a report.

// Core modules
pub mod cli;
pub mod contract;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod prompts;
pub mod stages;

// Re-export commonly used error types
pub use error::{LlmError, MetricsError, PlanError, SchemaError};
pub use pipeline::{Coordinator, PipelineConfig, PipelineError, PipelineRun};
