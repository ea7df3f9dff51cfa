//! Root-side centroid recomputation.

use tracing::trace;

use crate::kernels::mean_centroids;
use crate::pointset::PointSet;

/// Recomputes centroids from the gathered global assignment. Runs on root
/// only, after every gather; deterministic given the same assignment.
pub struct CentroidAggregator;

impl CentroidAggregator {
    /// Overwrite each centroid with the mean of its cluster's members.
    /// Empty clusters keep their previous centroid.
    pub fn recompute(&self, dataset: &PointSet, centroids: &mut PointSet) {
        mean_centroids(dataset, centroids);
        for k in 0..centroids.len() {
            trace!(
                cluster = k,
                x = centroids.x(k),
                y = centroids.y(k),
                "centroid recomputed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointset::NO_CLUSTER;

    #[test]
    fn test_recompute_means() {
        let mut dataset = PointSet::with_capacity(4);
        dataset.push(0.0, 0.0, 0);
        dataset.push(0.0, 2.0, 0);
        dataset.push(10.0, 0.0, 1);
        dataset.push(10.0, 2.0, 1);

        let mut centroids = PointSet::with_capacity(2);
        centroids.push(0.0, 0.0, NO_CLUSTER);
        centroids.push(0.0, 0.0, NO_CLUSTER);

        CentroidAggregator.recompute(&dataset, &mut centroids);

        assert_eq!((centroids.x(0), centroids.y(0)), (0.0, 1.0));
        assert_eq!((centroids.x(1), centroids.y(1)), (10.0, 1.0));
    }
}
