//! Markdown report rendering and artifact writing.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::contract::{Report, Verdict};

/// Evidence blocks longer than this are truncated in the markdown ledger.
const EVIDENCE_CHAR_LIMIT: usize = 1000;

/// Paths of the artifacts written for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub report_md: PathBuf,
    pub insights_json: PathBuf,
    pub creatives_json: PathBuf,
}

/// Renders the full markdown report.
///
/// Sections, in order: title, generation timestamp, executive summary built
/// from the accepted-or-review hypotheses, key metrics, the first eight
/// creative recommendations, then the full hypothesis/evidence ledger.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    let snapshot = &report.snapshot;

    let _ = writeln!(out, "# Marketing Performance Analysis");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Query:** {}", report.query);
    let _ = writeln!(
        out,
        "**Generated:** {}  ",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "**Run:** {}", report.run_id);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Executive summary");
    let _ = writeln!(out);
    let mut ranked: Vec<_> = report.ledger.iter().collect();
    ranked.sort_by(|a, b| {
        b.evaluation
            .confidence_score
            .partial_cmp(&a.evaluation.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let leading: Vec<_> = ranked
        .iter()
        .filter(|e| e.evaluation.verdict != Verdict::Rejected)
        .take(3)
        .collect();
    if leading.is_empty() {
        let _ = writeln!(
            out,
            "No hypothesis survived evaluation at the current evidence level; all candidate \
             explanations were rejected. Review the evidence ledger below."
        );
    } else {
        for entry in &leading {
            let _ = writeln!(
                out,
                "- {} ({}, confidence {:.2})",
                entry.hypothesis.hypothesis,
                entry.evaluation.verdict,
                entry.evaluation.confidence_score
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Key metrics");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Window | last {} days |", snapshot.recent_period_days);
    let _ = writeln!(out, "| Impressions | {} |", snapshot.total_impressions);
    let _ = writeln!(out, "| Clicks | {} |", snapshot.total_clicks);
    let _ = writeln!(out, "| Spend | {:.2} |", snapshot.total_spend);
    let _ = writeln!(out, "| Revenue | {:.2} |", snapshot.total_revenue);
    let _ = writeln!(out, "| Avg CTR | {:.4} |", snapshot.avg_ctr);
    let _ = writeln!(out, "| Avg ROAS | {:.4} |", snapshot.avg_roas);
    let _ = writeln!(out, "| ROAS pct change | {:.4} |", snapshot.pct_change_roas);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Recommended creatives");
    let _ = writeln!(out);
    for idea in report.ideas.iter().take(8) {
        let _ = writeln!(
            out,
            "- **{}** ({} / {}): {} _CTA: {}_",
            idea.headline, idea.angle, idea.platform_fit, idea.hook, idea.cta
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Hypotheses and evidence");
    let _ = writeln!(out);
    for entry in &report.ledger {
        let _ = writeln!(
            out,
            "### {} - {} ({:.2})",
            entry.hypothesis.id, entry.evaluation.verdict, entry.evaluation.confidence_score
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", entry.hypothesis.hypothesis);
        let _ = writeln!(out);
        let _ = writeln!(out, "*Reasoning:* {}", entry.hypothesis.reasoning);
        let _ = writeln!(out);
        let _ = writeln!(out, "*Evaluator notes:* {}", entry.evaluation.evaluator_notes);
        let _ = writeln!(out);
        let evidence = serde_json::to_string_pretty(&entry.evidence)
            .unwrap_or_else(|_| "{}".to_string());
        let evidence = if evidence.len() > EVIDENCE_CHAR_LIMIT {
            let cut: String = evidence.chars().take(EVIDENCE_CHAR_LIMIT).collect();
            format!("{cut}\n... (truncated)")
        } else {
            evidence
        };
        let _ = writeln!(out, "```json\n{evidence}\n```");
        let _ = writeln!(out);
    }

    out
}

/// Writes the three run artifacts under `out_dir` and returns their paths.
///
/// `insights.json` holds the ledger (hypothesis + evidence + evaluation per
/// entry), `creatives.json` the idea batch, `report.md` the rendered report.
pub fn write_artifacts(
    report: &Report,
    markdown: &str,
    out_dir: &Path,
) -> Result<RunPaths, std::io::Error> {
    std::fs::create_dir_all(out_dir)?;

    let paths = RunPaths {
        report_md: out_dir.join("report.md"),
        insights_json: out_dir.join("insights.json"),
        creatives_json: out_dir.join("creatives.json"),
    };

    let insights = serde_json::json!({
        "run_id": report.run_id,
        "query": report.query,
        "generated_at": report.generated_at,
        "ledger": report.ledger,
    });
    std::fs::write(&paths.insights_json, serde_json::to_string_pretty(&insights)?)?;

    let creatives = serde_json::json!({
        "run_id": report.run_id,
        "ideas": report.ideas,
    });
    std::fs::write(&paths.creatives_json, serde_json::to_string_pretty(&creatives)?)?;

    std::fs::write(&paths.report_md, markdown)?;
    Ok(paths)
}
