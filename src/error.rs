//! Error types for insight-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Plan structure validation (planner stage output)
//! - Schema validation of inter-stage payloads
//! - Metrics snapshot loading
//! - LLM API interactions
//!
//! The coordinator-level `PipelineError` lives in `pipeline::orchestrator`
//! and aggregates these into stage-named contract violations.

use thiserror::Error;

/// Errors raised when a plan violates its structural minimums.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Planner produced {count} tasks; at least {minimum} are required")]
    TooFewTasks { count: usize, minimum: usize },

    #[error("Duplicate task id '{0}' in plan")]
    DuplicateTaskId(String),

    #[error("Plan is missing the 'generate_insights' task")]
    MissingInsightTask,

    #[error(
        "'generate_insights' must immediately precede the first evaluation task \
         (found at position {found}, expected {expected})"
    )]
    MisplacedInsightTask { found: usize, expected: usize },

    #[error("Failed to parse planner output: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised when a stage output does not conform to its schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Missing required field '{field}' in {stage} output")]
    MissingField { stage: String, field: String },

    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidEnumValue { field: String, value: String },

    #[error("{stage} produced {count} {field}; expected between {min} and {max}")]
    CountOutOfRange {
        stage: String,
        field: String,
        count: usize,
        min: usize,
        max: usize,
    },

    #[error("Duplicate id '{id}' in {stage} output")]
    DuplicateId { stage: String, id: String },

    #[error("No summary produced for task '{0}'")]
    MissingTaskSummary(String),

    #[error("Task '{0}' appears more than once in the summaries")]
    DuplicateTaskSummary(String),

    #[error("Summary references unknown task id '{0}'")]
    UnknownTaskId(String),

    #[error("Evaluation references unknown hypothesis id '{0}'")]
    UnknownHypothesisId(String),

    #[error("Confidence value {value} for '{field}' is outside [0, 1]")]
    ConfidenceOutOfRange { field: String, value: f64 },

    #[error("Summary for task '{task_id}' references metric '{key}' absent from the snapshot")]
    UnknownMetric { task_id: String, key: String },

    #[error("Creative output is missing the '{0}' angle")]
    MissingAngleCoverage(String),

    #[error("Creative output has no {0}-specific variant")]
    MissingPlatformVariant(String),

    #[error("Near-duplicate headline '{0}' in creative output")]
    DuplicateHeadline(String),

    #[error("Failed to parse stage output: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading a metrics snapshot.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to read metrics snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse metrics snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid metrics snapshot: {0}")]
    Invalid(String),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: INSIGHT_FORGE_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Empty LLM response")]
    EmptyResponse,

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
