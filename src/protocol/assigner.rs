//! Per-node nearest-centroid assignment pass.

use tracing::trace;

use crate::kernels::{nearest_centroid, DistanceMode};
use crate::pointset::PointSet;

/// Runs the assignment step over a node's partition. Pure local compute:
/// no collective communication, no side effects beyond the partition's
/// cluster ids.
pub struct LocalAssigner {
    mode: DistanceMode,
}

impl LocalAssigner {
    pub fn new(mode: DistanceMode) -> Self {
        Self { mode }
    }

    /// Assign every real point of the partition to its nearest centroid.
    ///
    /// Only the partition's `len` leading points are touched — the
    /// padding slots beyond the true local count are never read or
    /// assigned. Returns how many points moved to a different cluster;
    /// zero means this partition has reached a fixed point.
    pub fn assign(&self, partition: &mut PointSet, centroids: &PointSet) -> u64 {
        let mut changes = 0u64;
        for i in 0..partition.len() {
            let (closest, distance) =
                nearest_centroid(partition.x(i), partition.y(i), centroids, self.mode);
            if partition.cluster_id(i) != closest as i32 {
                trace!(
                    point = i,
                    cluster = closest,
                    distance,
                    "point moved to new cluster"
                );
                partition.set_cluster_id(i, closest as i32);
                changes += 1;
            }
        }
        changes
    }
}
