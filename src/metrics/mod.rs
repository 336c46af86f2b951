//! Metrics provider interface.
//!
//! The pipeline consumes precomputed statistics; it never calculates them.
//! A [`MetricsProvider`] hands the coordinator a [`MetricsSnapshot`] at the
//! start of a run and an [`Evidence`] bundle per evaluated hypothesis.

use std::fs;
use std::path::{Path, PathBuf};

use crate::contract::{Evidence, Hypothesis, MetricsSnapshot};
use crate::error::MetricsError;

/// Source of precomputed metrics for a pipeline run.
pub trait MetricsProvider: Send + Sync {
    /// Returns the recent-period metrics snapshot.
    fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError>;

    /// Returns the evidence bundle for one hypothesis.
    ///
    /// The default implementation hands back the run-level evidence fields
    /// carried by the snapshot; providers with per-hypothesis numerics can
    /// override this.
    fn evidence_for(&self, _hypothesis: &Hypothesis, snapshot: &MetricsSnapshot) -> Evidence {
        snapshot.default_evidence()
    }
}

/// Metrics provider backed by a JSON snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Creates a provider reading from the given snapshot path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsProvider for SnapshotFile {
    fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        let raw = fs::read_to_string(&self.path)?;
        let snapshot: MetricsSnapshot = serde_json::from_str(&raw)?;
        if snapshot.total_spend < 0.0 || snapshot.total_revenue < 0.0 {
            return Err(MetricsError::Invalid(
                "spend and revenue totals must be non-negative".to_string(),
            ));
        }
        Ok(snapshot)
    }
}

/// In-memory metrics provider, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    snapshot: MetricsSnapshot,
    evidence: Option<Evidence>,
}

impl InMemoryProvider {
    /// Creates a provider serving a fixed snapshot.
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot,
            evidence: None,
        }
    }

    /// Overrides the evidence bundle handed to the evaluator.
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

impl MetricsProvider for InMemoryProvider {
    fn snapshot(&self) -> Result<MetricsSnapshot, MetricsError> {
        Ok(self.snapshot.clone())
    }

    fn evidence_for(&self, _hypothesis: &Hypothesis, snapshot: &MetricsSnapshot) -> Evidence {
        self.evidence
            .clone()
            .unwrap_or_else(|| snapshot.default_evidence())
    }
}
