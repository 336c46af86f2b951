//! Pipeline stages.
//!
//! Each stage is a thin schema-validating role contract: structured input in,
//! validated structured output out. Stages holding a [`crate::llm::ModelInvoker`]
//! use the model path with bounded parse retries and fall back to their
//! deterministic generator; the evaluator and data stages are pure functions.

pub mod creative;
pub mod data;
pub mod evaluator;
pub mod insight;
pub mod planner;

pub use creative::{CreativeBrief, CreativeConfig, CreativeStage};
pub use data::DataStage;
pub use evaluator::{EvaluatorConfig, EvaluatorStage};
pub use insight::{InsightConfig, InsightStage};
pub use planner::{PlannerConfig, PlannerStage};

/// Number of model-path attempts before a stage falls back or gives up.
pub(crate) const MODEL_ATTEMPTS: usize = 3;
