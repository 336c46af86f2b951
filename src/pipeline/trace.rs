//! Append-only run trace log.
//!
//! Every pipeline run appends one record to a JSON array on disk, capturing
//! per-stage timings and outcome counts. A missing or corrupt log file is
//! replaced rather than treated as fatal; tracing a run must never fail the
//! run itself.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timing and outcome record for one stage of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTrace {
    pub stage: String,
    pub elapsed_ms: u64,
    /// Number of items the stage produced (tasks, summaries, hypotheses...).
    pub output_count: usize,
    /// True when the stage used its deterministic fallback path.
    pub fallback_used: bool,
}

/// One run's trace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageTrace>,
    /// True when the reflection pass re-ran the insight stage.
    pub reflected: bool,
}

/// Appends a trace record to the log at `path`, creating parents as needed.
///
/// An unreadable or non-array existing file is discarded with a warning and
/// the log restarts from this record.
pub fn append(path: &Path, trace: &RunTrace) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut records: Vec<RunTrace> = match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "trace log unreadable; restarting it");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    };
    records.push(trace.clone());

    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace() -> RunTrace {
        RunTrace {
            run_id: Uuid::new_v4(),
            query: "Analyze ROAS drop".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![StageTrace {
                stage: "planner".to_string(),
                elapsed_ms: 3,
                output_count: 7,
                fallback_used: true,
            }],
            reflected: false,
        }
    }

    #[test]
    fn appends_accumulate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/traces.json");
        append(&path, &sample_trace()).expect("first append");
        append(&path, &sample_trace()).expect("second append");

        let raw = std::fs::read_to_string(&path).expect("read");
        let records: Vec<RunTrace> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn corrupt_log_is_restarted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("traces.json");
        std::fs::write(&path, "not json at all").expect("seed");
        append(&path, &sample_trace()).expect("append over corrupt log");

        let raw = std::fs::read_to_string(&path).expect("read");
        let records: Vec<RunTrace> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(records.len(), 1);
    }
}
