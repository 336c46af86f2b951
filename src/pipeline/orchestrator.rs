//! The coordinator: runs the full stage graph for one query.
//!
//! Stage order: planner, data, then the insight/evaluation branch and the
//! creative branch concurrently, then assembly. The creative branch never
//! sees hypotheses or evaluations; it works from a brief derived from the
//! snapshot alone. When the top evaluation confidence comes in below the
//! configured minimum and a model is attached, one reflection pass re-runs
//! the insight stage and merges the batches before final assembly.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::contract::validate::{
    validate_evaluations, validate_summaries, HYPOTHESIS_RANGE,
};
use crate::contract::{Evaluation, Evidence, Hypothesis, LedgerEntry, Report, Verdict};
use crate::error::{MetricsError, PlanError, SchemaError};
use crate::llm::ModelInvoker;
use crate::metrics::MetricsProvider;
use crate::stages::{
    CreativeBrief, CreativeConfig, CreativeStage, DataStage, EvaluatorConfig, EvaluatorStage,
    InsightConfig, InsightStage, PlannerConfig, PlannerStage,
};

use super::config::PipelineConfig;
use super::report::{render_markdown, write_artifacts, RunPaths};
use super::trace::{self, RunTrace, StageTrace};

/// Errors surfaced by a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
    #[error("plan rejected: {0}")]
    MalformedPlan(#[from] PlanError),
    #[error("stage contract violation in {stage}: {violation}")]
    StageContractViolation {
        stage: &'static str,
        violation: SchemaError,
    },
    #[error("metrics provider error: {0}")]
    Metrics(#[from] MetricsError),
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Counts summarizing one run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub tasks: usize,
    pub summaries: usize,
    pub hypotheses: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub needs_review: usize,
    pub ideas: usize,
    pub reflected: bool,
}

/// Result of a completed pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub report: Report,
    pub report_markdown: String,
    pub stats: RunStats,
    pub paths: RunPaths,
}

/// Runs the stage graph end to end.
pub struct Coordinator {
    config: PipelineConfig,
    invoker: Option<Arc<dyn ModelInvoker>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("model_backed", &self.invoker.is_some())
            .finish()
    }
}

impl Coordinator {
    /// Creates a coordinator running every stage on its deterministic path.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            invoker: None,
        }
    }

    /// Creates a coordinator with a model attached for the LLM-backed stages.
    pub fn with_invoker(config: PipelineConfig, invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            config,
            invoker: Some(invoker),
        }
    }

    fn planner(&self) -> PlannerStage {
        let config = PlannerConfig {
            model: self.config.model.clone(),
            ..PlannerConfig::default()
        };
        match &self.invoker {
            Some(invoker) if self.config.llm_enabled => {
                PlannerStage::with_invoker(Arc::clone(invoker), config)
            }
            _ => PlannerStage::offline(),
        }
    }

    fn insight(&self) -> InsightStage {
        let config = InsightConfig {
            model: self.config.model.clone(),
            ..InsightConfig::default()
        };
        match &self.invoker {
            Some(invoker) if self.config.llm_enabled => {
                InsightStage::with_invoker(Arc::clone(invoker), config)
            }
            _ => InsightStage::offline(),
        }
    }

    fn creative(&self) -> CreativeStage {
        let config = CreativeConfig {
            seed: self.config.random_seed,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            ..CreativeConfig::default()
        };
        match &self.invoker {
            Some(invoker) if self.config.llm_enabled => {
                CreativeStage::with_invoker(Arc::clone(invoker), config)
            }
            _ => CreativeStage::with_seed(self.config.random_seed),
        }
    }

    /// Runs the full pipeline for one query.
    pub async fn run(
        &self,
        query: &str,
        provider: &dyn MetricsProvider,
    ) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut stage_traces: Vec<StageTrace> = Vec::new();
        tracing::info!(%run_id, query, "pipeline run started");

        let snapshot = provider.snapshot()?;

        let clock = Instant::now();
        let planner = self.planner();
        let tasks = planner.decompose(query).await?;
        stage_traces.push(StageTrace {
            stage: "planner".to_string(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
            output_count: tasks.len(),
            fallback_used: self.invoker.is_none() || !self.config.llm_enabled,
        });
        tracing::info!(task_count = tasks.len(), "plan accepted");

        let clock = Instant::now();
        let summaries = DataStage.summarize(&tasks, &snapshot);
        validate_summaries(&tasks, &summaries, &snapshot).map_err(|violation| {
            PipelineError::StageContractViolation {
                stage: "data",
                violation,
            }
        })?;
        stage_traces.push(StageTrace {
            stage: "data".to_string(),
            elapsed_ms: clock.elapsed().as_millis() as u64,
            output_count: summaries.len(),
            fallback_used: false,
        });

        let evaluator = EvaluatorStage::new(
            EvaluatorConfig::default().with_confidence_min(self.config.confidence_min),
        );

        // Insight/evaluation and creative run concurrently; the creative
        // branch depends only on the snapshot-derived brief.
        let insight_branch = self.run_insight_branch(&summaries, &snapshot, provider, &evaluator);
        let creative_branch = async {
            let clock = Instant::now();
            let brief = CreativeBrief::from_snapshot(&snapshot);
            let ideas = self.creative().generate(&brief).await.map_err(|violation| {
                PipelineError::StageContractViolation {
                    stage: "creative",
                    violation,
                }
            })?;
            Ok::<_, PipelineError>((ideas, clock.elapsed().as_millis() as u64))
        };
        let ((ledger, reflected, insight_ms), (ideas, creative_ms)) =
            futures::future::try_join(insight_branch, creative_branch).await?;

        stage_traces.push(StageTrace {
            stage: "insight_eval".to_string(),
            elapsed_ms: insight_ms,
            output_count: ledger.len(),
            fallback_used: self.invoker.is_none() || !self.config.llm_enabled,
        });
        stage_traces.push(StageTrace {
            stage: "creative".to_string(),
            elapsed_ms: creative_ms,
            output_count: ideas.len(),
            fallback_used: self.invoker.is_none() || !self.config.llm_enabled,
        });

        let hypotheses: Vec<Hypothesis> =
            ledger.iter().map(|e| e.hypothesis.clone()).collect();
        let evaluations: Vec<Evaluation> =
            ledger.iter().map(|e| e.evaluation.clone()).collect();
        validate_evaluations(&hypotheses, &evaluations).map_err(|violation| {
            PipelineError::StageContractViolation {
                stage: "evaluator",
                violation,
            }
        })?;

        let stats = RunStats {
            tasks: tasks.len(),
            summaries: summaries.len(),
            hypotheses: ledger.len(),
            accepted: count_verdict(&ledger, Verdict::Accepted),
            rejected: count_verdict(&ledger, Verdict::Rejected),
            needs_review: count_verdict(&ledger, Verdict::NeedsReview),
            ideas: ideas.len(),
            reflected,
        };

        let report = Report {
            run_id,
            query: query.to_string(),
            generated_at: Utc::now(),
            snapshot,
            ledger,
            ideas,
        };
        let report_markdown = render_markdown(&report);
        let paths = write_artifacts(&report, &report_markdown, &self.config.out_dir)?;

        let run_trace = RunTrace {
            run_id,
            query: query.to_string(),
            started_at,
            finished_at: Utc::now(),
            stages: stage_traces,
            reflected,
        };
        if let Err(e) = trace::append(&self.config.logs_path, &run_trace) {
            tracing::warn!(error = %e, "failed to append run trace");
        }

        tracing::info!(
            %run_id,
            hypotheses = stats.hypotheses,
            accepted = stats.accepted,
            ideas = stats.ideas,
            "pipeline run finished"
        );
        Ok(PipelineRun {
            run_id,
            report,
            report_markdown,
            stats,
            paths,
        })
    }

    /// Insight generation, per-hypothesis evaluation and the bounded
    /// reflection pass. Returns the assembled ledger.
    async fn run_insight_branch(
        &self,
        summaries: &[crate::contract::TaskSummary],
        snapshot: &crate::contract::MetricsSnapshot,
        provider: &dyn MetricsProvider,
        evaluator: &EvaluatorStage,
    ) -> Result<(Vec<LedgerEntry>, bool, u64), PipelineError> {
        let clock = Instant::now();
        let insight = self.insight();

        let hypotheses = insight.generate(summaries, snapshot).await.map_err(|violation| {
            PipelineError::StageContractViolation {
                stage: "insight",
                violation,
            }
        })?;
        let mut ledger = evaluate_batch(&hypotheses, snapshot, provider, evaluator);

        let top_confidence = ledger
            .iter()
            .map(|e| e.evaluation.confidence_score)
            .fold(0.0_f64, f64::max);
        let mut reflected = false;
        if top_confidence < self.config.confidence_min
            && self.invoker.is_some()
            && self.config.llm_enabled
        {
            tracing::info!(
                top_confidence,
                confidence_min = self.config.confidence_min,
                "reflection pass: regenerating hypotheses"
            );
            reflected = true;
            let extra = insight.generate(summaries, snapshot).await.map_err(|violation| {
                PipelineError::StageContractViolation {
                    stage: "insight",
                    violation,
                }
            })?;
            let extra_ledger = evaluate_batch(&extra, snapshot, provider, evaluator);
            ledger = merge_ledgers(ledger, extra_ledger);
        }

        Ok((ledger, reflected, clock.elapsed().as_millis() as u64))
    }
}

fn count_verdict(ledger: &[LedgerEntry], verdict: Verdict) -> usize {
    ledger.iter().filter(|e| e.evaluation.verdict == verdict).count()
}

/// Evaluates every hypothesis against provider-supplied evidence.
fn evaluate_batch(
    hypotheses: &[Hypothesis],
    snapshot: &crate::contract::MetricsSnapshot,
    provider: &dyn MetricsProvider,
    evaluator: &EvaluatorStage,
) -> Vec<LedgerEntry> {
    hypotheses
        .iter()
        .map(|hypothesis| {
            let evidence: Evidence = provider.evidence_for(hypothesis, snapshot);
            let evaluation = evaluator.evaluate(hypothesis, &evidence);
            LedgerEntry {
                hypothesis: hypothesis.clone(),
                evidence,
                evaluation,
            }
        })
        .collect()
}

/// Merges the original and reflection batches.
///
/// Entries are deduplicated by claim text, ranked by evaluation confidence,
/// truncated to the schema maximum and re-identified so hypothesis ids stay
/// sequential and one-to-one with their evaluations.
fn merge_ledgers(mut base: Vec<LedgerEntry>, extra: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
    let (_, max) = HYPOTHESIS_RANGE;
    let mut seen: std::collections::HashSet<String> = base
        .iter()
        .map(|e| e.hypothesis.hypothesis.clone())
        .collect();
    for entry in extra {
        if seen.insert(entry.hypothesis.hypothesis.clone()) {
            base.push(entry);
        }
    }

    base.sort_by(|a, b| {
        b.evaluation
            .confidence_score
            .partial_cmp(&a.evaluation.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    base.truncate(max);

    for (i, entry) in base.iter_mut().enumerate() {
        let id = format!("H{}", i + 1);
        entry.hypothesis.id = id.clone();
        entry.evaluation.hypothesis_id = id;
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Evaluation;

    fn entry(id: &str, text: &str, confidence: f64) -> LedgerEntry {
        LedgerEntry {
            hypothesis: Hypothesis::new(id, text, "r", vec![], 0.5),
            evidence: Evidence::new(0.1, 100, false),
            evaluation: Evaluation {
                hypothesis_id: id.to_string(),
                verdict: Verdict::NeedsReview,
                confidence_score: confidence,
                evaluator_notes: String::new(),
            },
        }
    }

    #[test]
    fn merge_dedups_and_ranks_by_confidence() {
        let base = vec![entry("H1", "claim a", 0.3), entry("H2", "claim b", 0.5)];
        let extra = vec![entry("H1", "claim a", 0.9), entry("H2", "claim c", 0.7)];
        let merged = merge_ledgers(base, extra);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].hypothesis.hypothesis, "claim c");
        assert_eq!(merged[0].hypothesis.id, "H1");
        assert_eq!(merged[0].evaluation.hypothesis_id, "H1");
        assert_eq!(merged[1].hypothesis.hypothesis, "claim b");
        assert_eq!(merged[2].hypothesis.hypothesis, "claim a");
        assert!((merged[2].evaluation.confidence_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn merge_never_exceeds_the_schema_maximum() {
        let base: Vec<LedgerEntry> = (0..10)
            .map(|i| entry(&format!("H{i}"), &format!("base {i}"), 0.5))
            .collect();
        let extra: Vec<LedgerEntry> = (0..10)
            .map(|i| entry(&format!("H{i}"), &format!("extra {i}"), 0.6))
            .collect();
        let merged = merge_ledgers(base, extra);
        assert_eq!(merged.len(), HYPOTHESIS_RANGE.1);
        for (i, e) in merged.iter().enumerate() {
            assert_eq!(e.hypothesis.id, format!("H{}", i + 1));
        }
    }
}
