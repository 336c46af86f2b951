//! End-to-end offline pipeline runs against an in-memory metrics provider.

use insight_forge::contract::{CreativeRecord, MetricsSnapshot, SegmentStats, Verdict};
use insight_forge::metrics::{InMemoryProvider, SnapshotFile};
use insight_forge::pipeline::{Coordinator, PipelineConfig};

fn sample_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        recent_period_days: 7,
        total_impressions: 152_000,
        total_clicks: 1_824,
        total_spend: 5_230.0,
        total_revenue: 11_760.0,
        avg_ctr: 0.012,
        avg_roas: 2.25,
        by_audience: vec![
            SegmentStats {
                segment: "Broad".to_string(),
                impressions: 90_000,
                clicks: 1_100,
                spend: 3_000.0,
                revenue: 7_500.0,
                ctr: 0.0122,
                roas: 2.5,
            },
            SegmentStats {
                segment: "Retargeting".to_string(),
                impressions: 62_000,
                clicks: 724,
                spend: 2_230.0,
                revenue: 4_260.0,
                ctr: 0.0117,
                roas: 1.91,
            },
        ],
        by_platform: vec![
            SegmentStats {
                segment: "Facebook".to_string(),
                roas: 2.6,
                ctr: 0.013,
                ..Default::default()
            },
            SegmentStats {
                segment: "Instagram".to_string(),
                roas: 1.2,
                ctr: 0.009,
                ..Default::default()
            },
        ],
        low_ctr_creatives: vec![CreativeRecord {
            ad_id: "ad_101".to_string(),
            creative_message: "Breathable comfort for every day".to_string(),
            creative_type: "Image".to_string(),
            audience_type: "Retargeting".to_string(),
            platform: "Instagram".to_string(),
            ctr: 0.004,
            revenue: 35.0,
        }],
        top_creatives: vec![CreativeRecord {
            ad_id: "ad_204".to_string(),
            creative_message: "Seamless support, cooling mesh".to_string(),
            creative_type: "UGC".to_string(),
            audience_type: "Broad".to_string(),
            platform: "Facebook".to_string(),
            ctr: 0.021,
            revenue: 830.0,
        }],
        pct_change_roas: -0.18,
        pct_change_ctr: Some(-0.07),
        sample_size: 350,
        outlier_flag: false,
    }
}

fn config_in(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        out_dir: dir.join("reports"),
        logs_path: dir.join("logs/traces.json"),
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn offline_run_produces_full_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = InMemoryProvider::new(sample_snapshot());
    let coordinator = Coordinator::new(config_in(dir.path()));

    let run = coordinator
        .run("Analyze ROAS drop in the last 7 days", &provider)
        .await
        .expect("pipeline run");

    assert!((8..=12).contains(&run.report.ledger.len()));
    assert!((10..=12).contains(&run.report.ideas.len()));
    assert_eq!(run.stats.hypotheses, run.report.ledger.len());
    assert!(!run.stats.reflected);

    // Every evaluation pairs with its hypothesis.
    for entry in &run.report.ledger {
        assert_eq!(entry.hypothesis.id, entry.evaluation.hypothesis_id);
        assert!((0.0..=1.0).contains(&entry.evaluation.confidence_score));
    }

    // All four angles covered, Facebook and Instagram variants present.
    use insight_forge::contract::{CreativeAngle, PlatformFit};
    for angle in CreativeAngle::ALL {
        assert!(run.report.ideas.iter().any(|i| i.angle == angle));
    }
    assert!(run.report.ideas.iter().any(|i| i.platform_fit == PlatformFit::Facebook));
    assert!(run.report.ideas.iter().any(|i| i.platform_fit == PlatformFit::Instagram));
}

#[tokio::test]
async fn artifacts_and_trace_are_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = InMemoryProvider::new(sample_snapshot());
    let coordinator = Coordinator::new(config_in(dir.path()));

    let run = coordinator
        .run("Analyze ROAS drop in the last 7 days", &provider)
        .await
        .expect("pipeline run");

    assert!(run.paths.report_md.exists());
    assert!(run.paths.insights_json.exists());
    assert!(run.paths.creatives_json.exists());
    assert!(dir.path().join("logs/traces.json").exists());

    let markdown = std::fs::read_to_string(&run.paths.report_md).expect("read report");
    assert_eq!(markdown, run.report_markdown);
    assert!(markdown.contains("## Executive summary"));
    assert!(markdown.contains("## Recommended creatives"));
    assert!(markdown.contains("## Hypotheses and evidence"));
}

#[tokio::test]
async fn two_offline_runs_are_deterministic() {
    let dir_a = tempfile::tempdir().expect("tempdir");
    let dir_b = tempfile::tempdir().expect("tempdir");
    let provider = InMemoryProvider::new(sample_snapshot());

    let run_a = Coordinator::new(config_in(dir_a.path()))
        .run("Analyze ROAS drop in the last 7 days", &provider)
        .await
        .expect("first run");
    let run_b = Coordinator::new(config_in(dir_b.path()))
        .run("Analyze ROAS drop in the last 7 days", &provider)
        .await
        .expect("second run");

    let texts_a: Vec<&str> = run_a.report.hypotheses().map(|h| h.hypothesis.as_str()).collect();
    let texts_b: Vec<&str> = run_b.report.hypotheses().map(|h| h.hypothesis.as_str()).collect();
    assert_eq!(texts_a, texts_b);

    let headlines_a: Vec<&str> = run_a.report.ideas.iter().map(|i| i.headline.as_str()).collect();
    let headlines_b: Vec<&str> = run_b.report.ideas.iter().map(|i| i.headline.as_str()).collect();
    assert_eq!(headlines_a, headlines_b);
}

#[tokio::test]
async fn snapshot_file_round_trips_through_the_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot_path = dir.path().join("snapshot.json");
    let raw = serde_json::to_string_pretty(&sample_snapshot()).expect("serialize");
    std::fs::write(&snapshot_path, raw).expect("write snapshot");

    let provider = SnapshotFile::new(&snapshot_path);
    let run = Coordinator::new(config_in(dir.path()))
        .run("Analyze ROAS drop in the last 7 days", &provider)
        .await
        .expect("pipeline run");

    assert!((8..=12).contains(&run.report.ledger.len()));
    // The default evidence carries the run-level ROAS decline, which at this
    // sample size lands every hypothesis short of acceptance.
    assert!(run
        .report
        .evaluations()
        .all(|e| e.verdict != Verdict::Accepted));
}
