//! Evaluator stage: deterministic verdicts from numeric evidence.
//!
//! Evaluation is a pure function of (hypothesis, evidence): no model call,
//! no retries, no metric that is not already in the evidence bundle. Running
//! it twice on the same pair yields the same verdict and score.

use crate::contract::{Evaluation, Evidence, Hypothesis, Verdict};

/// Configuration for the evaluator stage.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Confidence at or above which consistent evidence is accepted.
    pub confidence_min: f64,
    /// Confidence below which the evidence cannot support the claim.
    pub rejection_threshold: f64,
    /// |pct_change_roas| below this counts as borderline next to an outlier flag.
    pub borderline_pct_change: f64,
    /// Both percent changes at or above this with opposite signs conflict.
    pub directional_conflict_pct: f64,
    /// Sample sizes below this take the small-sample penalty and block acceptance.
    pub small_sample_floor: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            confidence_min: 0.6,
            rejection_threshold: 0.25,
            borderline_pct_change: 0.10,
            directional_conflict_pct: 0.25,
            small_sample_floor: 50,
        }
    }
}

impl EvaluatorConfig {
    /// Sets the acceptance threshold.
    pub fn with_confidence_min(mut self, confidence_min: f64) -> Self {
        self.confidence_min = confidence_min.clamp(0.0, 1.0);
        self
    }
}

/// Evaluator stage.
pub struct EvaluatorStage {
    config: EvaluatorConfig,
}

impl std::fmt::Debug for EvaluatorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorStage")
            .field("config", &self.config)
            .finish()
    }
}

impl EvaluatorStage {
    /// Creates an evaluator with the given configuration.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Creates an evaluator with default thresholds.
    pub fn with_defaults() -> Self {
        Self::new(EvaluatorConfig::default())
    }

    /// Evaluates one hypothesis against its evidence bundle.
    ///
    /// Contradictory signals take precedence over the thresholds: an outlier
    /// flag next to a borderline percent change, or large opposing ROAS/CTR
    /// changes, always land in `needs_review` regardless of the score.
    pub fn evaluate(&self, hypothesis: &Hypothesis, evidence: &Evidence) -> Evaluation {
        let confidence = self.confidence(evidence);
        let contradiction = self.contradiction(evidence);

        let verdict = match &contradiction {
            Some(_) => Verdict::NeedsReview,
            None if confidence >= self.config.confidence_min
                && evidence.sample_size >= self.config.small_sample_floor =>
            {
                Verdict::Accepted
            }
            None if confidence < self.config.rejection_threshold => Verdict::Rejected,
            None => Verdict::NeedsReview,
        };

        let signal_note = contradiction.unwrap_or_else(|| "signals consistent".to_string());
        let evaluator_notes = format!(
            "confidence={:.3} (min {:.2}); pct_change_roas={:.4}; sample_size={}; outlier_flag={}; {}",
            confidence,
            self.config.confidence_min,
            evidence.pct_change_roas,
            evidence.sample_size,
            evidence.outlier_flag,
            signal_note,
        );

        Evaluation {
            hypothesis_id: hypothesis.id.clone(),
            verdict,
            confidence_score: confidence,
            evaluator_notes,
        }
    }

    /// Weighted confidence score over the evidence fields present.
    ///
    /// Each present field contributes weight * value and the sum is
    /// normalized by the total weight used, so absent optional fields do not
    /// drag the score down. Percent-change magnitudes cap at 200%; sample
    /// size saturates at 1000. Monotonically increasing in |pct_change_roas|
    /// and in sample size.
    fn confidence(&self, evidence: &Evidence) -> f64 {
        let mut score = 0.0;
        let mut weight = 0.0;

        let pct_roas = evidence.pct_change_roas;
        score += 0.5 * (pct_roas.abs().min(2.0) / 2.0);
        weight += 0.5;

        if let Some(pct_ctr) = evidence.pct_change_ctr {
            score += 0.2 * (pct_ctr.abs().min(2.0) / 2.0);
            weight += 0.2;
        }

        score += 0.15 * (evidence.sample_size as f64 / 1000.0).min(1.0);
        weight += 0.15;

        if evidence.outlier_flag {
            // An outlier is weak supporting evidence at best.
            score += 0.15 * 0.2;
            weight += 0.15;
        }

        let mut confidence = if weight == 0.0 { 0.0 } else { score / weight };

        // An infinite percent change means the base window was zero; large
        // samples make that informative, small ones make it noise.
        if pct_roas.is_infinite() {
            confidence += if evidence.sample_size > 200 { 0.15 } else { -0.1 };
        }

        if evidence.outlier_flag && evidence.sample_size < 200 {
            confidence *= 0.6;
        }

        // Small-sample penalty.
        if evidence.sample_size < self.config.small_sample_floor {
            confidence *= 0.85;
        }

        confidence.clamp(0.0, 1.0)
    }

    /// Detects internally contradictory evidence. Evidence-driven only.
    fn contradiction(&self, evidence: &Evidence) -> Option<String> {
        let pct_roas = evidence.pct_change_roas;

        if evidence.outlier_flag
            && pct_roas.is_finite()
            && pct_roas.abs() < self.config.borderline_pct_change
        {
            return Some(format!(
                "contradictory signals: outlier_flag with borderline pct_change_roas ({pct_roas:.4})"
            ));
        }

        if let Some(pct_ctr) = evidence.pct_change_ctr {
            if pct_roas.abs() >= self.config.directional_conflict_pct
                && pct_ctr.abs() >= self.config.directional_conflict_pct
                && (pct_roas.signum() != pct_ctr.signum())
            {
                return Some(format!(
                    "contradictory signals: pct_change_roas ({pct_roas:.4}) and pct_change_ctr ({pct_ctr:.4}) point in opposite directions"
                ));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hypothesis() -> Hypothesis {
        Hypothesis::new(
            "H1",
            "ROAS decline driven by Broad audience",
            "Broad roas=1.8 vs avg 2.25",
            vec!["compare spend allocation by audience".to_string()],
            0.7,
        )
    }

    fn evaluator() -> EvaluatorStage {
        EvaluatorStage::with_defaults()
    }

    #[test]
    fn documented_outlier_scenario_needs_review() {
        let evidence = Evidence::new(0.0093, 350, true);
        let evaluation = evaluator().evaluate(&hypothesis(), &evidence);
        assert_eq!(evaluation.verdict, Verdict::NeedsReview);
        assert!(
            (evaluation.confidence_score - 0.106).abs() < 5e-3,
            "expected ~0.106, got {}",
            evaluation.confidence_score
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let evidence = Evidence::new(0.42, 600, false).with_pct_change_ctr(0.1);
        let first = evaluator().evaluate(&hypothesis(), &evidence);
        let second = evaluator().evaluate(&hypothesis(), &evidence);
        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.confidence_score, second.confidence_score);
    }

    #[test]
    fn confidence_always_in_unit_interval() {
        let bundles = [
            Evidence::new(0.0, 0, false),
            Evidence::new(5.0, 10_000, false),
            Evidence::new(f64::INFINITY, 5, false),
            Evidence::new(f64::INFINITY, 500, true),
            Evidence::new(-3.0, 30, true),
        ];
        for evidence in &bundles {
            let evaluation = evaluator().evaluate(&hypothesis(), evidence);
            assert!((0.0..=1.0).contains(&evaluation.confidence_score));
        }
    }

    #[test]
    fn small_sample_scores_strictly_lower() {
        let small = Evidence::new(0.5, 49, false);
        let adequate = Evidence::new(0.5, 50, false);
        let ev = evaluator();
        let low = ev.evaluate(&hypothesis(), &small);
        let high = ev.evaluate(&hypothesis(), &adequate);
        assert!(low.confidence_score < high.confidence_score);
    }

    #[test]
    fn strong_consistent_evidence_is_accepted() {
        let evidence = Evidence::new(2.0, 1500, false).with_pct_change_ctr(0.3);
        let evaluation = evaluator().evaluate(&hypothesis(), &evidence);
        // (0.5*1.0 + 0.2*0.15 + 0.15*1.0) / 0.85 = 0.8
        assert_eq!(evaluation.verdict, Verdict::Accepted);
        assert!(evaluation.confidence_score >= 0.6);
    }

    #[test]
    fn weak_evidence_is_rejected() {
        let evidence = Evidence::new(0.01, 60, false);
        let evaluation = evaluator().evaluate(&hypothesis(), &evidence);
        assert_eq!(evaluation.verdict, Verdict::Rejected);
        assert!(evaluation.confidence_score < 0.25);
    }

    #[test]
    fn opposing_large_changes_need_review() {
        let evidence = Evidence::new(0.6, 2000, false).with_pct_change_ctr(-0.5);
        let evaluation = evaluator().evaluate(&hypothesis(), &evidence);
        assert_eq!(evaluation.verdict, Verdict::NeedsReview);
        assert!(evaluation.evaluator_notes.contains("opposite directions"));
    }

    #[test]
    fn adequate_sample_without_contradiction_but_middling_confidence_needs_review() {
        let evidence = Evidence::new(0.6, 400, false);
        let evaluation = evaluator().evaluate(&hypothesis(), &evidence);
        // (0.5*0.3 + 0.15*0.4) / 0.65 = 0.323
        assert_eq!(evaluation.verdict, Verdict::NeedsReview);
    }

    #[test]
    fn small_sample_blocks_acceptance_even_with_high_score() {
        let config = EvaluatorConfig::default().with_confidence_min(0.3);
        let ev = EvaluatorStage::new(config);
        let evidence = Evidence::new(2.0, 30, false);
        let evaluation = ev.evaluate(&hypothesis(), &evidence);
        assert_ne!(evaluation.verdict, Verdict::Accepted);
    }
}
