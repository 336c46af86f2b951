//! Inter-stage contract types for the analytics pipeline.
//!
//! Every record here is an immutable, JSON-serializable value passed between
//! stages. Stages never mutate payloads they receive; the coordinator owns
//! the only copies and hands out references.

pub mod validate;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority of a planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

/// A single analytical task produced by the planner.
///
/// Tasks are created once and never mutated; the data stage consumes them to
/// decide which snapshot fields are salient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the plan (e.g. "t1").
    pub id: String,
    /// Short machine-friendly title (e.g. "roas_trend_check").
    pub title: String,
    /// Human-readable description of the task.
    pub description: String,
    /// Execution priority.
    pub priority: TaskPriority,
    /// Ordered list of snapshot field names this task needs.
    #[serde(default)]
    pub required_inputs: Vec<String>,
}

impl Task {
    /// Creates a new task.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: TaskPriority,
        required_inputs: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            priority,
            required_inputs,
        }
    }
}

/// Per-task summary produced by the data stage.
///
/// The summary maps snapshot field names to scalar or short-string values.
/// Tasks unrelated to data carry an empty map rather than being omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Id of the task this summary belongs to.
    pub task_id: String,
    /// Salient metrics, keyed by snapshot field name.
    #[serde(default)]
    pub summary: BTreeMap<String, serde_json::Value>,
}

/// A candidate explanation produced by the insight stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique identifier (e.g. "H1").
    pub id: String,
    /// The claim itself.
    pub hypothesis: String,
    /// Concrete figures from the input that support the claim.
    pub reasoning: String,
    /// Ordered list of follow-up checks an analyst could run.
    #[serde(default)]
    pub suggested_checks: Vec<String>,
    /// Self-assessed confidence in [0, 1].
    pub confidence_guess: f64,
}

impl Hypothesis {
    /// Creates a new hypothesis with the confidence guess clamped to [0, 1].
    pub fn new(
        id: impl Into<String>,
        hypothesis: impl Into<String>,
        reasoning: impl Into<String>,
        suggested_checks: Vec<String>,
        confidence_guess: f64,
    ) -> Self {
        Self {
            id: id.into(),
            hypothesis: hypothesis.into(),
            reasoning: reasoning.into(),
            suggested_checks,
            confidence_guess: confidence_guess.clamp(0.0, 1.0),
        }
    }
}

/// Numeric evidence for one hypothesis, supplied by the metrics provider.
///
/// Read-only input to the evaluator; never produced inside the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Percent change of ROAS between the comparison windows.
    pub pct_change_roas: f64,
    /// Percent change of CTR, when the provider supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct_change_ctr: Option<f64>,
    /// Number of underlying observations.
    pub sample_size: u64,
    /// True when the metric value is statistically atypical for its segment.
    #[serde(default)]
    pub outlier_flag: bool,
    /// Additional scalar fields passed through untouched.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Evidence {
    /// Creates an evidence bundle with the three core fields.
    pub fn new(pct_change_roas: f64, sample_size: u64, outlier_flag: bool) -> Self {
        Self {
            pct_change_roas,
            pct_change_ctr: None,
            sample_size,
            outlier_flag,
            extra: BTreeMap::new(),
        }
    }

    /// Attaches a CTR percent change.
    pub fn with_pct_change_ctr(mut self, pct_change_ctr: f64) -> Self {
        self.pct_change_ctr = Some(pct_change_ctr);
        self
    }
}

/// Verdict on a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected,
    NeedsReview,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::Rejected => write!(f, "rejected"),
            Verdict::NeedsReview => write!(f, "needs_review"),
        }
    }
}

/// Result of evaluating one hypothesis against its evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Id of the evaluated hypothesis.
    pub hypothesis_id: String,
    /// Verdict on the claim.
    pub verdict: Verdict,
    /// Confidence score in [0, 1].
    pub confidence_score: f64,
    /// Provenance notes explaining the verdict.
    pub evaluator_notes: String,
}

/// Messaging angle of a creative idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeAngle {
    Performance,
    Comfort,
    Emotion,
    SocialProof,
}

impl CreativeAngle {
    /// All angles a creative batch must cover.
    pub const ALL: [CreativeAngle; 4] = [
        CreativeAngle::Performance,
        CreativeAngle::Comfort,
        CreativeAngle::Emotion,
        CreativeAngle::SocialProof,
    ];
}

impl std::fmt::Display for CreativeAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreativeAngle::Performance => write!(f, "performance"),
            CreativeAngle::Comfort => write!(f, "comfort"),
            CreativeAngle::Emotion => write!(f, "emotion"),
            CreativeAngle::SocialProof => write!(f, "social_proof"),
        }
    }
}

/// Platform a creative idea is framed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformFit {
    Facebook,
    Instagram,
    Both,
}

impl std::fmt::Display for PlatformFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformFit::Facebook => write!(f, "Facebook"),
            PlatformFit::Instagram => write!(f, "Instagram"),
            PlatformFit::Both => write!(f, "Both"),
        }
    }
}

/// A new ad creative concept produced by the creative stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeIdea {
    /// Unique identifier (e.g. "c1").
    pub id: String,
    /// Headline text.
    pub headline: String,
    /// Opening hook line.
    pub hook: String,
    /// Call to action.
    pub cta: String,
    /// Visual direction for the creative.
    pub image_idea: String,
    /// Messaging angle.
    pub angle: CreativeAngle,
    /// Platform the framing targets.
    pub platform_fit: PlatformFit,
}

/// Aggregated performance of one audience or platform segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentStats {
    /// Segment name (audience type or platform).
    pub segment: String,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub roas: f64,
}

/// One creative row from the snapshot (top or low-CTR lists).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreativeRecord {
    #[serde(default)]
    pub ad_id: String,
    #[serde(default)]
    pub creative_message: String,
    #[serde(default)]
    pub creative_type: String,
    #[serde(default)]
    pub audience_type: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub revenue: f64,
}

/// Precomputed metrics snapshot consumed from the external metrics provider.
///
/// The pipeline never computes statistics; this arrives ready-made and is
/// treated as an opaque key-value source by the data stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Length of the recent comparison window in days.
    #[serde(default)]
    pub recent_period_days: u32,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_spend: f64,
    pub total_revenue: f64,
    pub avg_ctr: f64,
    pub avg_roas: f64,
    /// Per-audience segment aggregates, empty when no breakdown was supplied.
    #[serde(default)]
    pub by_audience: Vec<SegmentStats>,
    /// Per-platform segment aggregates, empty when no breakdown was supplied.
    #[serde(default)]
    pub by_platform: Vec<SegmentStats>,
    /// Creatives with below-median CTR over the full window.
    #[serde(default)]
    pub low_ctr_creatives: Vec<CreativeRecord>,
    /// Top creatives by recent revenue.
    #[serde(default)]
    pub top_creatives: Vec<CreativeRecord>,
    /// Run-level ROAS percent change between comparison windows.
    #[serde(default)]
    pub pct_change_roas: f64,
    /// Run-level CTR percent change, when available.
    #[serde(default)]
    pub pct_change_ctr: Option<f64>,
    /// Number of rows behind the recent-period aggregates.
    #[serde(default)]
    pub sample_size: u64,
    /// True when the recent window contains statistically atypical values.
    #[serde(default)]
    pub outlier_flag: bool,
}

impl MetricsSnapshot {
    /// Resolves a snapshot field by name into a scalar or short-string value.
    ///
    /// Returns `None` for keys absent from the snapshot; the data stage omits
    /// those rather than fabricating placeholders. List-valued fields render
    /// as compact one-line strings so summaries stay scalar-shaped.
    pub fn resolve(&self, key: &str) -> Option<serde_json::Value> {
        use serde_json::{json, Value};

        let render_segments = |slices: &[SegmentStats]| -> Option<Value> {
            if slices.is_empty() {
                return None;
            }
            let rendered = slices
                .iter()
                .map(|s| format!("{} roas={:.2} ctr={:.4} spend={:.2}", s.segment, s.roas, s.ctr, s.spend))
                .collect::<Vec<_>>()
                .join("; ");
            Some(Value::String(rendered))
        };
        let render_creatives = |rows: &[CreativeRecord]| -> Option<Value> {
            if rows.is_empty() {
                return None;
            }
            let rendered = rows
                .iter()
                .map(|c| format!("{} [{}] ctr={:.4} \"{}\"", c.ad_id, c.creative_type, c.ctr, c.creative_message))
                .collect::<Vec<_>>()
                .join("; ");
            Some(Value::String(rendered))
        };

        match key {
            "recent_period_days" => Some(json!(self.recent_period_days)),
            "total_impressions" => Some(json!(self.total_impressions)),
            "total_clicks" => Some(json!(self.total_clicks)),
            "total_spend" => Some(json!(self.total_spend)),
            "total_revenue" => Some(json!(self.total_revenue)),
            "avg_ctr" => Some(json!(self.avg_ctr)),
            "avg_roas" => Some(json!(self.avg_roas)),
            "pct_change_roas" => Some(json!(self.pct_change_roas)),
            "pct_change_ctr" => self.pct_change_ctr.map(|v| json!(v)),
            "sample_size" => Some(json!(self.sample_size)),
            "outlier_flag" => Some(json!(self.outlier_flag)),
            "by_audience" => render_segments(&self.by_audience),
            "by_platform" => render_segments(&self.by_platform),
            "low_ctr_creatives" => render_creatives(&self.low_ctr_creatives),
            "top_creatives" => render_creatives(&self.top_creatives),
            "df_recent" => Some(Value::String(format!(
                "rows={} window_days={}",
                self.sample_size, self.recent_period_days
            ))),
            "summary" => Some(Value::String(format!(
                "impressions={} clicks={} spend={:.2} revenue={:.2} avg_ctr={:.4} avg_roas={:.4}",
                self.total_impressions,
                self.total_clicks,
                self.total_spend,
                self.total_revenue,
                self.avg_ctr,
                self.avg_roas
            ))),
            _ => None,
        }
    }

    /// Builds the run-level evidence bundle for an evaluated hypothesis.
    pub fn default_evidence(&self) -> Evidence {
        let mut evidence = Evidence::new(self.pct_change_roas, self.sample_size, self.outlier_flag);
        if let Some(ctr) = self.pct_change_ctr {
            evidence = evidence.with_pct_change_ctr(ctr);
        }
        evidence
    }
}

/// One row of the final hypothesis/evidence/verdict ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hypothesis: Hypothesis,
    pub evidence: Evidence,
    pub evaluation: Evaluation,
}

/// Final artifact of a pipeline run. Terminal entity; not consumed further.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// The user query that started the run.
    pub query: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Raw recent-period metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Full hypothesis/evidence/verdict ledger.
    pub ledger: Vec<LedgerEntry>,
    /// Ranked creative recommendations.
    pub ideas: Vec<CreativeIdea>,
}

impl Report {
    /// Iterates over hypotheses in ledger order.
    pub fn hypotheses(&self) -> impl Iterator<Item = &Hypothesis> {
        self.ledger.iter().map(|e| &e.hypothesis)
    }

    /// Iterates over evaluations in ledger order.
    pub fn evaluations(&self) -> impl Iterator<Item = &Evaluation> {
        self.ledger.iter().map(|e| &e.evaluation)
    }
}
