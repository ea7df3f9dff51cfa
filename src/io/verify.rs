//! Comparison of a clustering result against an expected-result file.

use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::io::csv::read_points;
use crate::io::metrics::TestVerdict;
use crate::pointset::PointSet;

/// Compare the converged dataset point-for-point against an expected CSV.
///
/// Coordinates must match exactly and cluster ids must agree; the first
/// divergence fails the comparison. An expected file with extra trailing
/// points passes (they are ignored), one with fewer points fails. The
/// verdict feeds the metrics row; a failure never aborts the run.
pub fn compare_with_expected(dataset: &PointSet, path: &Path) -> Result<TestVerdict> {
    let expected = read_points(path, dataset.len())?;

    if expected.points.len() < dataset.len() {
        warn!(
            expected = expected.points.len(),
            needed = dataset.len(),
            "expected file has too few points"
        );
        return Ok(TestVerdict::Failed);
    }

    for i in 0..dataset.len() {
        if expected.points.x(i) != dataset.x(i) || expected.points.y(i) != dataset.y(i) {
            warn!(
                point = i,
                got_x = dataset.x(i),
                got_y = dataset.y(i),
                expected_x = expected.points.x(i),
                expected_y = expected.points.y(i),
                "point coordinates do not match expected file"
            );
            return Ok(TestVerdict::Failed);
        }
        if expected.points.cluster_id(i) != dataset.cluster_id(i) {
            warn!(
                point = i,
                got = dataset.cluster_id(i),
                expected = expected.points.cluster_id(i),
                "cluster assignment does not match expected file"
            );
            return Ok(TestVerdict::Failed);
        }
    }
    Ok(TestVerdict::Passed)
}
