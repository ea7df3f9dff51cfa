//! Partition planning: how many points each node owns.
//!
//! Every node allocates its scatter/gather buffers to one uniform
//! `capacity` so the collectives move fixed-shape chunks, but the tail
//! partition usually holds fewer real points than that. The plan therefore
//! carries both numbers: the padded buffer capacity and each rank's true
//! local count. Local work must loop over `local_count`, never over
//! `capacity` — the padding slots hold stale values.

use crate::error::{DroverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    total_points: usize,
    nodes: usize,
    capacity: usize,
}

impl PartitionPlan {
    /// Plan a split of `total_points` across `nodes` workers.
    ///
    /// `capacity = ceil(total_points / nodes)`, so
    /// `capacity * nodes >= total_points` always holds. A dataset smaller
    /// than the group cannot be planned: some nodes would own zero points
    /// and the uniform-chunk collectives would move nothing but padding.
    pub fn new(total_points: usize, nodes: usize) -> Result<Self> {
        if nodes == 0 {
            return Err(DroverError::Validation("node count must be positive".into()));
        }
        if total_points < nodes {
            return Err(DroverError::GroupTooLarge {
                total_points,
                nodes,
            });
        }
        let capacity = total_points.div_ceil(nodes);
        Ok(Self {
            total_points,
            nodes,
            capacity,
        })
    }

    /// Rebuild a plan received from root. Root already validated it.
    pub fn from_parts(total_points: usize, nodes: usize, capacity: usize) -> Self {
        Self {
            total_points,
            nodes,
            capacity,
        }
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Uniform per-node buffer capacity used by every scatter/gather chunk.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total padded length of the root-side buffers: `capacity * nodes`.
    pub fn padded_len(&self) -> usize {
        self.capacity * self.nodes
    }

    /// Number of real points owned by `rank`. Equal to `capacity` for all
    /// but possibly the last rank, whose partition is clipped to the
    /// dataset tail.
    pub fn local_count(&self, rank: usize) -> usize {
        debug_assert!(rank < self.nodes);
        self.total_points
            .saturating_sub(rank * self.capacity)
            .min(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_ceiling() {
        assert_eq!(PartitionPlan::new(12, 4).unwrap().capacity(), 3);
        assert_eq!(PartitionPlan::new(13, 4).unwrap().capacity(), 4);
        assert_eq!(PartitionPlan::new(4, 4).unwrap().capacity(), 1);
        assert_eq!(PartitionPlan::new(5, 1).unwrap().capacity(), 5);
    }

    #[test]
    fn test_local_counts_cover_dataset_exactly() {
        for &(total, nodes) in &[
            (12usize, 4usize),
            (13, 4),
            (7, 3),
            (5, 1),
            (4, 4),
            (100, 7),
            (1000, 13),
        ] {
            let plan = PartitionPlan::new(total, nodes).unwrap();
            assert!(plan.capacity() * nodes >= total);
            assert_eq!(plan.capacity(), total.div_ceil(nodes));

            let covered: usize = (0..nodes).map(|r| plan.local_count(r)).sum();
            assert_eq!(covered, total, "split of {total} across {nodes}");
        }
    }

    #[test]
    fn test_tail_partition_is_clipped() {
        // 13 points over 4 nodes: capacity 4, ranks own 4,4,4,1.
        let plan = PartitionPlan::new(13, 4).unwrap();
        assert_eq!(plan.local_count(0), 4);
        assert_eq!(plan.local_count(1), 4);
        assert_eq!(plan.local_count(2), 4);
        assert_eq!(plan.local_count(3), 1);
        assert_eq!(plan.padded_len(), 16);
    }

    #[test]
    fn test_whole_ranks_of_padding() {
        // 5 points over 4 nodes: capacity 2, ranks own 2,2,1,0. The last
        // rank holds nothing but padding and must do zero local work.
        let plan = PartitionPlan::new(5, 4).unwrap();
        assert_eq!(plan.capacity(), 2);
        assert_eq!(plan.local_count(0), 2);
        assert_eq!(plan.local_count(1), 2);
        assert_eq!(plan.local_count(2), 1);
        assert_eq!(plan.local_count(3), 0);
        let covered: usize = (0..4).map(|r| plan.local_count(r)).sum();
        assert_eq!(covered, 5);
    }

    #[test]
    fn test_dataset_smaller_than_group_is_rejected() {
        match PartitionPlan::new(2, 4) {
            Err(DroverError::GroupTooLarge {
                total_points,
                nodes,
            }) => {
                assert_eq!(total_points, 2);
                assert_eq!(nodes, 4);
            }
            other => panic!("expected GroupTooLarge, got {other:?}"),
        }
        assert!(PartitionPlan::new(0, 1).is_err());
        assert!(PartitionPlan::new(10, 0).is_err());
    }
}
