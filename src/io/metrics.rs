//! Per-run metrics sink.
//!
//! One row is appended per run so repeated invocations with different
//! datasets, cluster counts, or group sizes build up a comparison table.
//! The file gets its header row exactly once, when it is first created.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::info;

use crate::error::{DroverError, Result};

/// Outcome of the optional expected-result comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestVerdict {
    /// No expected file was supplied.
    #[default]
    Untested,
    Passed,
    Failed,
}

impl std::fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestVerdict::Untested => write!(f, "untested"),
            TestVerdict::Passed => write!(f, "passed"),
            TestVerdict::Failed => write!(f, "failed"),
        }
    }
}

/// Everything root knows about a finished run, one metrics row.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub label: String,
    pub used_iterations: u32,
    pub total_seconds: f64,
    pub assignment_seconds: f64,
    pub centroids_seconds: f64,
    pub max_iteration_seconds: f64,
    pub num_points: usize,
    pub num_clusters: usize,
    pub max_iterations: u32,
    pub num_nodes: usize,
    pub test_verdict: TestVerdict,
}

const HEADER: [&str; 11] = [
    "label",
    "used_iterations",
    "total_seconds",
    "assignment_seconds",
    "centroids_seconds",
    "max_iteration_seconds",
    "num_points",
    "num_clusters",
    "max_iterations",
    "num_nodes",
    "test_result",
];

impl RunMetrics {
    fn record(&self) -> [String; 11] {
        [
            self.label.clone(),
            self.used_iterations.to_string(),
            format!("{:.6}", self.total_seconds),
            format!("{:.6}", self.assignment_seconds),
            format!("{:.6}", self.centroids_seconds),
            format!("{:.6}", self.max_iteration_seconds),
            self.num_points.to_string(),
            self.num_clusters.to_string(),
            self.max_iterations.to_string(),
            self.num_nodes.to_string(),
            self.test_verdict.to_string(),
        ]
    }

    pub fn log_summary(&self) {
        info!(
            label = %self.label,
            iterations = self.used_iterations,
            total_seconds = self.total_seconds,
            assignment_seconds = self.assignment_seconds,
            centroids_seconds = self.centroids_seconds,
            max_iteration_seconds = self.max_iteration_seconds,
            points = self.num_points,
            clusters = self.num_clusters,
            nodes = self.num_nodes,
            test_result = %self.test_verdict,
            "run complete"
        );
    }
}

/// Append one metrics row, creating the file with a header row first if
/// it does not exist yet.
pub fn append_row(path: &Path, metrics: &RunMetrics) -> Result<()> {
    let first_time = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            DroverError::Config(format!("cannot open metrics file {}: {e}", path.display()))
        })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if first_time {
        writer.write_record(HEADER)?;
    }
    writer.write_record(metrics.record())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: &str) -> RunMetrics {
        RunMetrics {
            label: label.into(),
            used_iterations: 4,
            total_seconds: 0.25,
            assignment_seconds: 0.125,
            centroids_seconds: 0.0625,
            max_iteration_seconds: 0.1,
            num_points: 100,
            num_clusters: 3,
            max_iterations: 50,
            num_nodes: 2,
            test_verdict: TestVerdict::Untested,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        append_row(&path, &sample("first")).unwrap();
        append_row(&path, &sample("second")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3, "one header plus two rows");
        assert!(lines[0].starts_with("label,used_iterations"));
        assert!(lines[1].starts_with("first,4,"));
        assert!(lines[2].starts_with("second,4,"));
        assert_eq!(
            content.matches("label,used_iterations").count(),
            1,
            "header must not repeat on append"
        );
    }

    #[test]
    fn test_verdict_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        let mut metrics = sample("verdicts");
        append_row(&path, &metrics).unwrap();
        metrics.test_verdict = TestVerdict::Passed;
        append_row(&path, &metrics).unwrap();
        metrics.test_verdict = TestVerdict::Failed;
        append_row(&path, &metrics).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(",untested"));
        assert!(content.contains(",passed"));
        assert!(content.contains(",failed"));
    }
}
