//! Insight stage: turns task summaries and the metrics snapshot into ranked,
//! figure-traceable hypotheses.
//!
//! Every hypothesis cites at least one concrete figure from the input in its
//! reasoning; nothing is invented. A self-review pass rewords or drops any
//! candidate whose confidence guess falls below the floor before the list is
//! returned.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::contract::validate::{validate_hypotheses, HYPOTHESIS_RANGE};
use crate::contract::{CreativeRecord, Hypothesis, MetricsSnapshot, TaskSummary};
use crate::error::SchemaError;
use crate::llm::{extract_json, GenerationRequest, Message, ModelInvoker};
use crate::prompts::INSIGHT_SYSTEM_PROMPT;

use super::MODEL_ATTEMPTS;

/// Configuration for the insight stage.
#[derive(Debug, Clone)]
pub struct InsightConfig {
    /// Hypotheses with a guess below this are reworded or dropped.
    pub min_confidence_guess: f64,
    /// Model to use on the LLM path.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Maximum tokens for the response.
    pub max_tokens: u32,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_confidence_guess: 0.4,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.4,
            max_tokens: 3000,
        }
    }
}

/// Insight stage.
pub struct InsightStage {
    invoker: Option<Arc<dyn ModelInvoker>>,
    config: InsightConfig,
}

impl std::fmt::Debug for InsightStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightStage")
            .field("config", &self.config)
            .field("model_backed", &self.invoker.is_some())
            .finish()
    }
}

/// Wire shape of the insight model output.
#[derive(Debug, Deserialize)]
struct HypothesesEnvelope {
    hypotheses: Vec<Hypothesis>,
}

/// A candidate with its selection priority.
struct Candidate {
    required: bool,
    hypothesis: Hypothesis,
}

impl InsightStage {
    /// Creates a deterministic insight stage with no model attached.
    pub fn offline() -> Self {
        Self {
            invoker: None,
            config: InsightConfig::default(),
        }
    }

    /// Creates a model-backed insight stage.
    pub fn with_invoker(invoker: Arc<dyn ModelInvoker>, config: InsightConfig) -> Self {
        Self {
            invoker: Some(invoker),
            config,
        }
    }

    /// Generates 8-12 hypotheses from the summaries and snapshot.
    pub async fn generate(
        &self,
        summaries: &[TaskSummary],
        snapshot: &MetricsSnapshot,
    ) -> Result<Vec<Hypothesis>, SchemaError> {
        if let Some(invoker) = &self.invoker {
            for attempt in 0..MODEL_ATTEMPTS {
                match self
                    .attempt_generate(invoker.as_ref(), summaries, snapshot)
                    .await
                {
                    Ok(hypotheses) => return Ok(hypotheses),
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            error = %e,
                            "insight model attempt failed"
                        );
                    }
                }
            }
            tracing::warn!("insight model path exhausted; using offline generators");
        }

        let hypotheses = self.finish(offline_candidates(snapshot));
        validate_hypotheses(&hypotheses)?;
        Ok(hypotheses)
    }

    /// Single model attempt: prompt, parse, self-review, validate.
    async fn attempt_generate(
        &self,
        invoker: &dyn ModelInvoker,
        summaries: &[TaskSummary],
        snapshot: &MetricsSnapshot,
    ) -> Result<Vec<Hypothesis>, SchemaError> {
        let payload = json!({
            "task_summaries": summaries,
            "snapshot": snapshot,
        });
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(INSIGHT_SYSTEM_PROMPT),
                Message::user(format!("Input JSON:\n{payload}")),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = invoker
            .invoke(request)
            .await
            .map_err(|e| SchemaError::Parse(e.to_string()))?;
        let content = response
            .first_content()
            .ok_or_else(|| SchemaError::Parse("empty model response".to_string()))?;
        let json = extract_json(content).map_err(|e| SchemaError::Parse(e.to_string()))?;
        let envelope: HypothesesEnvelope = serde_json::from_str(&json)?;

        let candidates = envelope
            .hypotheses
            .into_iter()
            .map(|hypothesis| Candidate {
                required: false,
                hypothesis,
            })
            .collect();
        let hypotheses = self.finish(candidates);
        validate_hypotheses(&hypotheses)?;
        Ok(hypotheses)
    }

    /// Self-review, dedup, selection and id reassignment.
    ///
    /// Low-guess candidates are dropped while the count stays at or above the
    /// minimum, otherwise reworded with a hedging note and floored at the
    /// review threshold. Required candidates (fatigue, platform) always make
    /// the cut; the rest are ranked by confidence guess.
    fn finish(&self, candidates: Vec<Candidate>) -> Vec<Hypothesis> {
        let (min, max) = HYPOTHESIS_RANGE;

        // Dedup by claim text.
        let mut seen = HashSet::new();
        let mut pool: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            let key: String = candidate.hypothesis.hypothesis.chars().take(200).collect();
            if seen.insert(key) {
                pool.push(candidate);
            }
        }

        // Self-review pass.
        let floor = self.config.min_confidence_guess;
        let strong = pool
            .iter()
            .filter(|c| c.hypothesis.confidence_guess >= floor)
            .count();
        let mut reviewed: Vec<Candidate> = Vec::new();
        for mut candidate in pool {
            if candidate.hypothesis.confidence_guess < floor {
                if strong >= min {
                    tracing::debug!(
                        hypothesis = %candidate.hypothesis.hypothesis,
                        "dropping low-confidence hypothesis in self-review"
                    );
                    continue;
                }
                candidate.hypothesis.hypothesis = format!(
                    "{} (directional signal only; verify before acting)",
                    candidate.hypothesis.hypothesis
                );
                candidate.hypothesis.confidence_guess = floor;
            }
            reviewed.push(candidate);
        }

        // Required candidates first, then by guess, descending.
        reviewed.sort_by(|a, b| {
            b.required.cmp(&a.required).then(
                b.hypothesis
                    .confidence_guess
                    .partial_cmp(&a.hypothesis.confidence_guess)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        reviewed.truncate(max);

        reviewed
            .into_iter()
            .enumerate()
            .map(|(i, c)| Hypothesis {
                id: format!("H{}", i + 1),
                ..c.hypothesis
            })
            .collect()
    }
}

/// Deterministic hypothesis generators over the snapshot.
///
/// The first eight are unconditional and grounded in aggregate figures, so a
/// breakdown-free snapshot still yields a full batch; the rest trigger on
/// segment, creative and flag signals. Ported heuristics: spend shift,
/// creative-type gap, platform gap, funnel leakage, fatigue, outlier skew,
/// data quality, retargeting saturation, frequency proxy.
fn offline_candidates(snapshot: &MetricsSnapshot) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::new();
    let mut push = |required: bool, hypothesis: Hypothesis| {
        out.push(Candidate {
            required,
            hypothesis,
        })
    };

    let pct = snapshot.pct_change_roas;
    push(
        false,
        Hypothesis::new(
            "roas_trend",
            format!(
                "Recent ROAS {} versus the prior window, pointing at a real efficiency shift rather than noise",
                if pct < 0.0 { "declined" } else { "moved" }
            ),
            format!("pct_change_roas={:.4} over a {}-day window", pct, snapshot.recent_period_days),
            vec![
                "Recompute the ROAS trend with outlier days winsorized".to_string(),
                "Compare pct change per audience segment".to_string(),
            ],
            0.45 + pct.abs().min(1.0) * 0.3,
        ),
    );

    let blended_roas = if snapshot.total_spend > 0.0 {
        snapshot.total_revenue / snapshot.total_spend
    } else {
        snapshot.avg_roas
    };
    push(
        false,
        Hypothesis::new(
            "spend_efficiency",
            "Spend is outpacing revenue growth, compressing blended return on ad spend",
            format!(
                "total_spend={:.2} against total_revenue={:.2} (blended ROAS {:.2})",
                snapshot.total_spend, snapshot.total_revenue, blended_roas
            ),
            vec!["Compare daily spend allocation against daily revenue".to_string()],
            0.55,
        ),
    );

    push(
        false,
        Hypothesis::new(
            "funnel_leakage",
            "Click engagement is not translating into purchase value, suggesting funnel leakage after the ad click",
            format!(
                "avg_ctr={:.4} while avg_roas={:.4} over the recent period",
                snapshot.avg_ctr, snapshot.avg_roas
            ),
            vec![
                "Trace CTR to purchases per creative".to_string(),
                "Review landing page conversion for top-click creatives".to_string(),
            ],
            0.68,
        ),
    );

    push(
        false,
        Hypothesis::new(
            "sample_volatility",
            "The recent window is small enough that daily swings dominate the averages",
            format!("sample_size={} rows behind the recent-period aggregates", snapshot.sample_size),
            vec!["Extend the comparison window and recheck the trend".to_string()],
            if snapshot.sample_size < 400 { 0.55 } else { 0.45 },
        ),
    );

    let cpc = if snapshot.total_clicks > 0 {
        snapshot.total_spend / snapshot.total_clicks as f64
    } else {
        0.0
    };
    push(
        false,
        Hypothesis::new(
            "cpc_pressure",
            "Rising cost per click is eroding return even where engagement holds",
            format!(
                "total_spend={:.2} over total_clicks={} gives CPC {:.2}",
                snapshot.total_spend, snapshot.total_clicks, cpc
            ),
            vec!["Chart CPC by day and by placement".to_string()],
            0.52,
        ),
    );

    push(
        false,
        Hypothesis::new(
            "ctr_benchmark_gap",
            "Click-through sits below the ~1% benchmark at meaningful impression volume, indicating weak creative resonance",
            format!(
                "avg_ctr={:.4} across total_impressions={}",
                snapshot.avg_ctr, snapshot.total_impressions
            ),
            vec!["Benchmark CTR against the account's trailing quarter".to_string()],
            0.5,
        ),
    );

    let revenue_per_click = if snapshot.total_clicks > 0 {
        snapshot.total_revenue / snapshot.total_clicks as f64
    } else {
        0.0
    };
    push(
        false,
        Hypothesis::new(
            "click_value",
            "Revenue per click is drifting down, pointing at lower purchase intent in the clicking audience",
            format!(
                "total_revenue={:.2} over total_clicks={} gives {:.2} per click",
                snapshot.total_revenue, snapshot.total_clicks, revenue_per_click
            ),
            vec!["Split revenue per click by audience type".to_string()],
            0.48,
        ),
    );

    let freq_proxy = if snapshot.total_clicks > 0 {
        snapshot.total_impressions as f64 / snapshot.total_clicks as f64
    } else {
        snapshot.total_impressions as f64
    };
    push(
        false,
        Hypothesis::new(
            "frequency_saturation",
            "High impression-to-click ratios suggest ad saturation for part of the delivery",
            format!(
                "total_impressions={} over total_clicks={} gives a frequency proxy of {:.0}",
                snapshot.total_impressions, snapshot.total_clicks, freq_proxy
            ),
            vec![
                "Compute frequency per ad id where available".to_string(),
                "Cap frequency on the worst offenders and retest".to_string(),
            ],
            0.6,
        ),
    );

    // Segment-conditional generators.
    let worst_audience = snapshot
        .by_audience
        .iter()
        .min_by(|a, b| a.roas.partial_cmp(&b.roas).unwrap_or(std::cmp::Ordering::Equal));
    let best_audience = snapshot
        .by_audience
        .iter()
        .max_by(|a, b| a.roas.partial_cmp(&b.roas).unwrap_or(std::cmp::Ordering::Equal));
    if let (Some(worst), Some(best)) = (worst_audience, best_audience) {
        if worst.segment != best.segment {
            push(
                false,
                Hypothesis::new(
                    "audience_shift",
                    format!(
                        "ROAS decline driven by increased spend on low-efficiency audience: {}",
                        worst.segment
                    ),
                    format!(
                        "{} has roas={:.2} vs best {} roas={:.2}",
                        worst.segment, worst.roas, best.segment, best.roas
                    ),
                    vec![
                        "Compare daily spend allocation by audience (last 7 vs prior 7 days)"
                            .to_string(),
                        "Compute pct change in ROAS for each audience".to_string(),
                    ],
                    if worst.roas < best.roas * 0.7 { 0.75 } else { 0.45 },
                ),
            );
        }
    }

    if let Some(worst_platform) = snapshot
        .by_platform
        .iter()
        .min_by(|a, b| a.roas.partial_cmp(&b.roas).unwrap_or(std::cmp::Ordering::Equal))
    {
        let wide_gap = worst_platform.roas < snapshot.avg_roas * 0.6;
        push(
            true,
            Hypothesis::new(
                "platform_gap",
                format!(
                    "Platform underperformance: {} trails the account on return",
                    worst_platform.segment
                ),
                format!(
                    "{} roas={:.2} vs avg_roas={:.2}",
                    worst_platform.segment, worst_platform.roas, snapshot.avg_roas
                ),
                vec![
                    "Compare the creative-type mix on this platform".to_string(),
                    "Check the CTR differential between platforms".to_string(),
                ],
                if wide_gap { 0.7 } else { 0.5 },
            ),
        );
    }

    let low_ctr = &snapshot.low_ctr_creatives;
    let images_low = low_ctr
        .iter()
        .filter(|c| c.creative_type.to_ascii_lowercase().starts_with("image"))
        .count();
    if !low_ctr.is_empty() && images_low > 2.max(low_ctr.len() / 3) {
        push(
            false,
            Hypothesis::new(
                "creative_type_gap",
                "Image creatives underperform relative to Video/UGC formats",
                format!("{images_low} of {} low-CTR creatives are Image types", low_ctr.len()),
                vec![
                    "Compare ROAS by creative_type".to_string(),
                    "A/B Image vs UGC/Video on the same audience".to_string(),
                ],
                0.72,
            ),
        );
    }

    if let Some(top_terms) = repeated_themes(low_ctr, &snapshot.top_creatives) {
        push(
            true,
            Hypothesis::new(
                "creative_fatigue",
                "Creative fatigue from repeated messaging themes across active ads",
                format!("recurring terms across creative messages: {}", top_terms.join(", ")),
                vec![
                    "Cluster creative messages and compute similarity over time".to_string(),
                    "Rotate messaging themes on the most exposed ads".to_string(),
                ],
                0.7,
            ),
        );
    }

    let retargeting = low_ctr
        .iter()
        .filter(|c| c.audience_type.to_ascii_lowercase().starts_with("retarget"))
        .count();
    if retargeting > 0 {
        push(
            false,
            Hypothesis::new(
                "retargeting_saturation",
                "Retargeting pool saturation: retarget segments show diminishing returns",
                format!("{retargeting} low-CTR creatives originate from retargeting segments"),
                vec![
                    "Widen the retargeting window or expand the audience".to_string(),
                    "Check frequency and overlap with recent buyers".to_string(),
                ],
                0.65,
            ),
        );
    }

    if snapshot.outlier_flag {
        push(
            false,
            Hypothesis::new(
                "outlier_skew",
                "Outlier days are skewing rolling averages and hiding the underlying trend",
                format!(
                    "outlier_flag=true on the recent window (pct_change_roas={:.4})",
                    snapshot.pct_change_roas
                ),
                vec![
                    "List dates with extreme ROAS".to_string(),
                    "Recompute trends on median-based aggregates".to_string(),
                ],
                0.6,
            ),
        );
    }

    if low_ctr.iter().any(|c| c.ad_id.trim().is_empty()) {
        push(
            false,
            Hypothesis::new(
                "data_quality",
                "Data quality: missing ad identifiers detected in the creative rows",
                "at least one low-CTR creative row has an empty ad_id".to_string(),
                vec!["Audit the source export for blank ad_id or spend values".to_string()],
                0.52,
            ),
        );
    }

    out
}

/// Detects repeated messaging themes across creative rows.
///
/// Returns the dominant terms when more than two messages share one of the
/// top three tokens, mirroring the fatigue heuristic of the source system.
fn repeated_themes(low_ctr: &[CreativeRecord], top: &[CreativeRecord]) -> Option<Vec<String>> {
    let messages: Vec<String> = low_ctr
        .iter()
        .chain(top.iter())
        .map(|c| c.creative_message.to_ascii_lowercase())
        .filter(|m| !m.trim().is_empty())
        .collect();
    if messages.is_empty() {
        return None;
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for message in &messages {
        for token in message.split_whitespace() {
            let token = token.trim_matches(|c: char| " .,-".contains(c));
            if token.len() > 3 {
                *counts.entry(token.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let top_terms: Vec<String> = ranked.iter().take(3).map(|(w, _)| (*w).clone()).collect();
    if top_terms.is_empty() {
        return None;
    }

    let repeats = messages
        .iter()
        .filter(|m| top_terms.iter().any(|w| m.contains(w.as_str())))
        .count();
    if repeats > 2 {
        Some(ranked.iter().take(6).map(|(w, _)| (*w).clone()).collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::SegmentStats;

    fn aggregate_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            recent_period_days: 7,
            total_impressions: 152_000,
            total_clicks: 1_824,
            total_spend: 5_230.0,
            total_revenue: 11_760.0,
            avg_ctr: 0.012,
            avg_roas: 2.25,
            pct_change_roas: -0.18,
            sample_size: 350,
            ..Default::default()
        }
    }

    fn creative(msg: &str, audience: &str) -> CreativeRecord {
        CreativeRecord {
            ad_id: "ad_1".to_string(),
            creative_message: msg.to_string(),
            creative_type: "Image".to_string(),
            audience_type: audience.to_string(),
            platform: "Facebook".to_string(),
            ctr: 0.004,
            revenue: 12.0,
        }
    }

    #[tokio::test]
    async fn breakdown_free_snapshot_still_yields_full_batch() {
        let snapshot = aggregate_snapshot();
        let hypotheses = InsightStage::offline()
            .generate(&[], &snapshot)
            .await
            .expect("hypotheses");
        assert!((8..=12).contains(&hypotheses.len()));
        // No platform data supplied, so no platform hypothesis may appear.
        assert!(!hypotheses
            .iter()
            .any(|h| h.hypothesis.to_ascii_lowercase().contains("platform")));
    }

    #[tokio::test]
    async fn platform_breakdown_produces_platform_hypothesis() {
        let mut snapshot = aggregate_snapshot();
        snapshot.by_platform = vec![
            SegmentStats {
                segment: "Instagram".to_string(),
                roas: 0.9,
                ..Default::default()
            },
            SegmentStats {
                segment: "Facebook".to_string(),
                roas: 2.8,
                ..Default::default()
            },
        ];
        let hypotheses = InsightStage::offline()
            .generate(&[], &snapshot)
            .await
            .expect("hypotheses");
        assert!(hypotheses
            .iter()
            .any(|h| h.hypothesis.contains("Platform underperformance")));
    }

    #[tokio::test]
    async fn repeated_themes_trigger_fatigue_hypothesis() {
        let mut snapshot = aggregate_snapshot();
        snapshot.low_ctr_creatives = vec![
            creative("Breathable comfort, made for daily wear", "Broad"),
            creative("Breathable comfort, made for daily wear", "Broad"),
            creative("Breathable comfort you can trust", "Lookalike"),
        ];
        let hypotheses = InsightStage::offline()
            .generate(&[], &snapshot)
            .await
            .expect("hypotheses");
        assert!(hypotheses
            .iter()
            .any(|h| h.hypothesis.contains("Creative fatigue")));
    }

    #[tokio::test]
    async fn every_hypothesis_meets_the_review_floor() {
        let hypotheses = InsightStage::offline()
            .generate(&[], &aggregate_snapshot())
            .await
            .expect("hypotheses");
        assert!(hypotheses.iter().all(|h| h.confidence_guess >= 0.4));
    }

    #[tokio::test]
    async fn ids_are_sequential_after_selection() {
        let hypotheses = InsightStage::offline()
            .generate(&[], &aggregate_snapshot())
            .await
            .expect("hypotheses");
        for (i, h) in hypotheses.iter().enumerate() {
            assert_eq!(h.id, format!("H{}", i + 1));
        }
    }

    #[test]
    fn theme_detection_requires_repetition() {
        let rows = vec![creative("unique message one here", "Broad")];
        assert!(repeated_themes(&rows, &[]).is_none());

        let rows = vec![
            creative("cooling mesh keeps you dry", "Broad"),
            creative("cooling mesh all day", "Broad"),
            creative("cooling mesh for workouts", "Broad"),
        ];
        let themes = repeated_themes(&rows, &[]).expect("themes");
        assert!(themes.contains(&"cooling".to_string()) || themes.contains(&"mesh".to_string()));
    }
}
