//! Data stage: pure transformation of tasks + snapshot into per-task summaries.

use std::collections::BTreeMap;

use crate::contract::{MetricsSnapshot, Task, TaskSummary};

/// Data stage.
///
/// For every task it emits exactly one summary containing only the snapshot
/// fields named by the task's `required_inputs`. Inputs that do not resolve
/// in the snapshot are omitted (no null placeholders, no errors) and tasks
/// with no data dependencies yield an empty map rather than being skipped.
/// Metric keys are never fabricated.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataStage;

impl DataStage {
    /// Creates the data stage.
    pub fn new() -> Self {
        Self
    }

    /// Produces one summary per task, in task order.
    pub fn summarize(&self, tasks: &[Task], snapshot: &MetricsSnapshot) -> Vec<TaskSummary> {
        tasks
            .iter()
            .map(|task| {
                let mut summary = BTreeMap::new();
                for key in &task.required_inputs {
                    if let Some(value) = snapshot.resolve(key) {
                        summary.insert(key.clone(), value);
                    }
                }
                TaskSummary {
                    task_id: task.id.clone(),
                    summary,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::validate::validate_summaries;
    use crate::contract::{SegmentStats, TaskPriority};

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            recent_period_days: 7,
            total_impressions: 152_000,
            total_clicks: 1_824,
            total_spend: 5_230.0,
            total_revenue: 11_760.0,
            avg_ctr: 0.012,
            avg_roas: 2.25,
            by_audience: vec![SegmentStats {
                segment: "Broad".to_string(),
                impressions: 90_000,
                clicks: 900,
                spend: 3_000.0,
                revenue: 5_400.0,
                ctr: 0.01,
                roas: 1.8,
            }],
            sample_size: 350,
            ..Default::default()
        }
    }

    fn task(id: &str, inputs: &[&str]) -> Task {
        Task::new(
            id,
            format!("task_{id}"),
            "desc",
            TaskPriority::Medium,
            inputs.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn every_task_appears_exactly_once() {
        let tasks = vec![
            task("t1", &["avg_roas"]),
            task("t2", &["by_audience"]),
            task("t3", &[]),
        ];
        let snapshot = snapshot();
        let summaries = DataStage::new().summarize(&tasks, &snapshot);
        assert_eq!(summaries.len(), 3);
        assert!(validate_summaries(&tasks, &summaries, &snapshot).is_ok());
    }

    #[test]
    fn unrelated_task_yields_empty_summary() {
        let tasks = vec![task("t1", &[])];
        let summaries = DataStage::new().summarize(&tasks, &snapshot());
        assert!(summaries[0].summary.is_empty());
    }

    #[test]
    fn unavailable_inputs_are_omitted_without_placeholders() {
        let tasks = vec![task("t1", &["avg_roas", "by_platform", "made_up_field"])];
        let summaries = DataStage::new().summarize(&tasks, &snapshot());
        // by_platform is empty in the snapshot and made_up_field does not
        // exist; only avg_roas survives.
        assert_eq!(summaries[0].summary.len(), 1);
        assert!(summaries[0].summary.contains_key("avg_roas"));
    }

    #[test]
    fn summary_values_reflect_snapshot_figures() {
        let tasks = vec![task("t1", &["total_spend", "by_audience"])];
        let summaries = DataStage::new().summarize(&tasks, &snapshot());
        assert_eq!(
            summaries[0].summary["total_spend"],
            serde_json::json!(5_230.0)
        );
        let rendered = summaries[0].summary["by_audience"]
            .as_str()
            .expect("rendered string");
        assert!(rendered.contains("Broad"));
    }
}
