//! Planner stage: decomposes a user query into an ordered task list.
//!
//! No numeric computation happens here; the output is a purely structural
//! decomposition validated against the plan minimums before it is returned.

use std::sync::Arc;

use serde::Deserialize;

use crate::contract::validate::validate_plan;
use crate::contract::{Task, TaskPriority};
use crate::error::PlanError;
use crate::llm::{extract_json, GenerationRequest, Message, ModelInvoker};
use crate::prompts::PLANNER_SYSTEM_PROMPT;

use super::MODEL_ATTEMPTS;

/// Configuration for the planner stage.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Model to use on the LLM path.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Maximum tokens for the response.
    pub max_tokens: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 1500,
        }
    }
}

/// Planner stage.
///
/// With an invoker attached, the model is asked for a plan (3 attempts);
/// structurally invalid or unparseable plans fall back to the canonical
/// offline plan, which always passes validation.
pub struct PlannerStage {
    invoker: Option<Arc<dyn ModelInvoker>>,
    config: PlannerConfig,
}

impl std::fmt::Debug for PlannerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerStage")
            .field("config", &self.config)
            .field("model_backed", &self.invoker.is_some())
            .finish()
    }
}

/// Wire shape of the planner's model output.
#[derive(Debug, Deserialize)]
struct PlanEnvelope {
    tasks: Vec<Task>,
}

impl PlannerStage {
    /// Creates a deterministic planner with no model attached.
    pub fn offline() -> Self {
        Self {
            invoker: None,
            config: PlannerConfig::default(),
        }
    }

    /// Creates a model-backed planner.
    pub fn with_invoker(invoker: Arc<dyn ModelInvoker>, config: PlannerConfig) -> Self {
        Self {
            invoker: Some(invoker),
            config,
        }
    }

    /// Decomposes a query into an ordered, validated task list.
    pub async fn decompose(&self, query: &str) -> Result<Vec<Task>, PlanError> {
        if let Some(invoker) = &self.invoker {
            for attempt in 0..MODEL_ATTEMPTS {
                match self.attempt_decompose(invoker.as_ref(), query).await {
                    Ok(tasks) => return Ok(tasks),
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            error = %e,
                            "planner model attempt failed"
                        );
                    }
                }
            }
            tracing::warn!("planner model path exhausted; using canonical plan");
        }

        let tasks = canonical_plan(query);
        validate_plan(&tasks)?;
        Ok(tasks)
    }

    /// Single model attempt: prompt, extract JSON, parse, validate.
    async fn attempt_decompose(
        &self,
        invoker: &dyn ModelInvoker,
        query: &str,
    ) -> Result<Vec<Task>, PlanError> {
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(PLANNER_SYSTEM_PROMPT),
                Message::user(format!("User query:\n{query}")),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = invoker
            .invoke(request)
            .await
            .map_err(|e| PlanError::Parse(e.to_string()))?;
        let content = response
            .first_content()
            .ok_or_else(|| PlanError::Parse("empty model response".to_string()))?;
        let json = extract_json(content).map_err(|e| PlanError::Parse(e.to_string()))?;

        let tasks = match serde_json::from_str::<PlanEnvelope>(&json) {
            Ok(envelope) => envelope.tasks,
            Err(_) => serde_json::from_str::<Vec<Task>>(&json)?,
        };
        validate_plan(&tasks)?;
        Ok(tasks)
    }
}

/// The canonical offline plan covering every mandatory task category.
fn canonical_plan(query: &str) -> Vec<Task> {
    vec![
        Task::new(
            "t1",
            "load_and_filter_data",
            format!("Load the ads dataset and filter to the recent window, scoped to: {query}"),
            TaskPriority::High,
            vec!["df_recent".to_string()],
        ),
        Task::new(
            "t2",
            "metric_analysis",
            "Review aggregate spend, revenue, CTR and ROAS for the recent period.",
            TaskPriority::High,
            vec![
                "total_spend".to_string(),
                "total_revenue".to_string(),
                "avg_ctr".to_string(),
                "avg_roas".to_string(),
            ],
        ),
        Task::new(
            "t3",
            "segment_breakdown",
            "Break performance down by audience type and platform.",
            TaskPriority::High,
            vec!["by_audience".to_string(), "by_platform".to_string()],
        ),
        Task::new(
            "t4",
            "roas_trend_check",
            "Compare recent ROAS against the prior window and flag the direction of change.",
            TaskPriority::High,
            vec!["pct_change_roas".to_string(), "avg_roas".to_string()],
        ),
        Task::new(
            "t5",
            "ctr_spend_diagnosis",
            "Diagnose whether spend is concentrated on low-CTR creatives.",
            TaskPriority::Medium,
            vec![
                "avg_ctr".to_string(),
                "total_spend".to_string(),
                "low_ctr_creatives".to_string(),
            ],
        ),
        Task::new(
            "t6",
            "generate_insights",
            "Create hypotheses explaining the observed ROAS and CTR changes.",
            TaskPriority::High,
            vec!["summary".to_string()],
        ),
        Task::new(
            "t7",
            "evaluate_hypotheses",
            "Check each hypothesis against its numeric evidence.",
            TaskPriority::High,
            vec![],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use async_trait::async_trait;

    /// Mock invoker returning a fixed response.
    struct MockInvoker {
        response: String,
    }

    impl MockInvoker {
        fn new(response: impl Into<String>) -> Self {
            Self {
                response: response.into(),
            }
        }
    }

    #[async_trait]
    impl ModelInvoker for MockInvoker {
        async fn invoke(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            Ok(GenerationResponse {
                id: "mock".to_string(),
                model: "mock".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.response.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn offline_plan_passes_structural_checks() {
        let planner = PlannerStage::offline();
        let tasks = planner
            .decompose("Analyze ROAS drop in last 7 days")
            .await
            .expect("plan");
        assert!(tasks.len() >= 5);
        assert!(validate_plan(&tasks).is_ok());
    }

    #[tokio::test]
    async fn offline_plan_covers_mandatory_categories() {
        let planner = PlannerStage::offline();
        let tasks = planner
            .decompose("Analyze ROAS drop in last 7 days")
            .await
            .expect("plan");
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert!(titles.contains(&"load_and_filter_data"));
        assert!(titles.contains(&"roas_trend_check"));
        assert!(titles.contains(&"ctr_spend_diagnosis"));
        assert!(titles.contains(&"generate_insights"));
    }

    #[tokio::test]
    async fn model_plan_is_parsed_and_accepted() {
        let json = r#"{"tasks": [
            {"id": "t1", "title": "load_and_filter_data", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t2", "title": "metric_analysis", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t3", "title": "segment_breakdown", "description": "d", "priority": "medium", "required_inputs": []},
            {"id": "t4", "title": "roas_trend_check", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t5", "title": "generate_insights", "description": "d", "priority": "high", "required_inputs": []}
        ]}"#;
        let planner =
            PlannerStage::with_invoker(Arc::new(MockInvoker::new(json)), PlannerConfig::default());
        let tasks = planner.decompose("any query").await.expect("plan");
        assert_eq!(tasks.len(), 5);
        assert_eq!(tasks[4].title, "generate_insights");
    }

    #[tokio::test]
    async fn malformed_model_plan_falls_back_to_canonical() {
        // Duplicate ids make the model plan structurally invalid.
        let json = r#"{"tasks": [
            {"id": "t1", "title": "a", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t1", "title": "b", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t3", "title": "c", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t4", "title": "d", "description": "d", "priority": "high", "required_inputs": []},
            {"id": "t5", "title": "generate_insights", "description": "d", "priority": "high", "required_inputs": []}
        ]}"#;
        let planner =
            PlannerStage::with_invoker(Arc::new(MockInvoker::new(json)), PlannerConfig::default());
        let tasks = planner.decompose("any query").await.expect("plan");
        assert!(validate_plan(&tasks).is_ok());
        assert!(tasks.iter().any(|t| t.title == "roas_trend_check"));
    }
}
