//! Schema validation for inter-stage payloads.
//!
//! The coordinator calls these checks at every stage boundary; a failure
//! halts the run with an error naming the stage and offending field, rather
//! than emitting a partial report. Stages also call them defensively on
//! their own output before returning it.

use std::collections::HashSet;

use crate::error::{PlanError, SchemaError};

use super::{
    CreativeAngle, CreativeIdea, Evaluation, Hypothesis, MetricsSnapshot, PlatformFit, Task,
    TaskSummary,
};

/// Minimum number of tasks a plan must contain.
pub const MIN_PLAN_TASKS: usize = 5;

/// Canonical title of the insight-generation task.
pub const INSIGHT_TASK_TITLE: &str = "generate_insights";

/// Bounds on the number of hypotheses the insight stage may return.
pub const HYPOTHESIS_RANGE: (usize, usize) = (8, 12);

/// Bounds on the number of ideas the creative stage may return.
pub const IDEA_RANGE: (usize, usize) = (10, 12);

/// Returns true when a task is evaluation-oriented.
///
/// Matched on the title so the rule is robust to model-worded descriptions.
pub fn is_evaluation_task(task: &Task) -> bool {
    task.title.to_ascii_lowercase().contains("evaluat")
}

/// Validates the structural minimums of a plan.
///
/// Checks: at least [`MIN_PLAN_TASKS`] tasks, unique ids, and a
/// `generate_insights` task placed immediately before the first
/// evaluation-oriented task (or last, when the plan has none).
pub fn validate_plan(tasks: &[Task]) -> Result<(), PlanError> {
    if tasks.len() < MIN_PLAN_TASKS {
        return Err(PlanError::TooFewTasks {
            count: tasks.len(),
            minimum: MIN_PLAN_TASKS,
        });
    }

    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(PlanError::DuplicateTaskId(task.id.clone()));
        }
    }

    let insight_pos = tasks
        .iter()
        .position(|t| t.title.trim().eq_ignore_ascii_case(INSIGHT_TASK_TITLE))
        .ok_or(PlanError::MissingInsightTask)?;

    let expected = match tasks.iter().position(is_evaluation_task) {
        Some(eval_pos) => eval_pos.saturating_sub(1),
        None => tasks.len() - 1,
    };
    if insight_pos != expected {
        return Err(PlanError::MisplacedInsightTask {
            found: insight_pos,
            expected,
        });
    }

    Ok(())
}

/// Validates the data stage output against the plan and snapshot.
///
/// Every task id must appear exactly once, and no summary may carry a key
/// that does not resolve in the snapshot (fabricated metrics are forbidden).
pub fn validate_summaries(
    tasks: &[Task],
    summaries: &[TaskSummary],
    snapshot: &MetricsSnapshot,
) -> Result<(), SchemaError> {
    let task_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut seen = HashSet::new();
    for summary in summaries {
        if !task_ids.contains(summary.task_id.as_str()) {
            return Err(SchemaError::UnknownTaskId(summary.task_id.clone()));
        }
        if !seen.insert(summary.task_id.as_str()) {
            return Err(SchemaError::DuplicateTaskSummary(summary.task_id.clone()));
        }
        for key in summary.summary.keys() {
            if snapshot.resolve(key).is_none() {
                return Err(SchemaError::UnknownMetric {
                    task_id: summary.task_id.clone(),
                    key: key.clone(),
                });
            }
        }
    }

    for task in tasks {
        if !seen.contains(task.id.as_str()) {
            return Err(SchemaError::MissingTaskSummary(task.id.clone()));
        }
    }

    Ok(())
}

/// Validates the insight stage output.
pub fn validate_hypotheses(hypotheses: &[Hypothesis]) -> Result<(), SchemaError> {
    let (min, max) = HYPOTHESIS_RANGE;
    if hypotheses.len() < min || hypotheses.len() > max {
        return Err(SchemaError::CountOutOfRange {
            stage: "insight".to_string(),
            field: "hypotheses".to_string(),
            count: hypotheses.len(),
            min,
            max,
        });
    }

    let mut seen = HashSet::new();
    for h in hypotheses {
        if h.hypothesis.trim().is_empty() {
            return Err(SchemaError::MissingField {
                stage: "insight".to_string(),
                field: "hypothesis".to_string(),
            });
        }
        if !seen.insert(h.id.as_str()) {
            return Err(SchemaError::DuplicateId {
                stage: "insight".to_string(),
                id: h.id.clone(),
            });
        }
        if !(0.0..=1.0).contains(&h.confidence_guess) {
            return Err(SchemaError::ConfidenceOutOfRange {
                field: "confidence_guess".to_string(),
                value: h.confidence_guess,
            });
        }
    }

    Ok(())
}

/// Validates the evaluator stage output against the hypotheses it covers.
///
/// Evaluations are one-to-one with hypotheses; every referenced id must
/// exist and every confidence score must lie in [0, 1].
pub fn validate_evaluations(
    hypotheses: &[Hypothesis],
    evaluations: &[Evaluation],
) -> Result<(), SchemaError> {
    let ids: HashSet<&str> = hypotheses.iter().map(|h| h.id.as_str()).collect();

    let mut seen = HashSet::new();
    for evaluation in evaluations {
        if !ids.contains(evaluation.hypothesis_id.as_str()) {
            return Err(SchemaError::UnknownHypothesisId(
                evaluation.hypothesis_id.clone(),
            ));
        }
        if !seen.insert(evaluation.hypothesis_id.as_str()) {
            return Err(SchemaError::DuplicateId {
                stage: "evaluator".to_string(),
                id: evaluation.hypothesis_id.clone(),
            });
        }
        if !(0.0..=1.0).contains(&evaluation.confidence_score) {
            return Err(SchemaError::ConfidenceOutOfRange {
                field: "confidence_score".to_string(),
                value: evaluation.confidence_score,
            });
        }
    }

    for h in hypotheses {
        if !seen.contains(h.id.as_str()) {
            return Err(SchemaError::MissingField {
                stage: "evaluator".to_string(),
                field: format!("evaluation for '{}'", h.id),
            });
        }
    }

    Ok(())
}

/// Validates the creative stage output.
///
/// Checks the idea count, id and headline uniqueness, coverage of all four
/// angles, and presence of platform-differentiated variants.
pub fn validate_ideas(ideas: &[CreativeIdea]) -> Result<(), SchemaError> {
    let (min, max) = IDEA_RANGE;
    if ideas.len() < min || ideas.len() > max {
        return Err(SchemaError::CountOutOfRange {
            stage: "creative".to_string(),
            field: "ideas".to_string(),
            count: ideas.len(),
            min,
            max,
        });
    }

    let mut ids = HashSet::new();
    let mut headlines = HashSet::new();
    for idea in ideas {
        if idea.headline.trim().is_empty() {
            return Err(SchemaError::MissingField {
                stage: "creative".to_string(),
                field: "headline".to_string(),
            });
        }
        if !ids.insert(idea.id.as_str()) {
            return Err(SchemaError::DuplicateId {
                stage: "creative".to_string(),
                id: idea.id.clone(),
            });
        }
        if !headlines.insert(normalized_headline(&idea.headline)) {
            return Err(SchemaError::DuplicateHeadline(idea.headline.clone()));
        }
    }

    for angle in CreativeAngle::ALL {
        if !ideas.iter().any(|i| i.angle == angle) {
            return Err(SchemaError::MissingAngleCoverage(angle.to_string()));
        }
    }

    for platform in [PlatformFit::Facebook, PlatformFit::Instagram] {
        if !ideas.iter().any(|i| i.platform_fit == platform) {
            return Err(SchemaError::MissingPlatformVariant(platform.to_string()));
        }
    }

    Ok(())
}

/// Lowercased, alphanumeric-only form of a headline for duplicate detection.
pub fn normalized_headline(headline: &str) -> String {
    headline
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}
