//! Columnar point storage.
//!
//! Points are kept as three parallel arrays (x, y, cluster id) rather than
//! an array of structs so each column can be handed to a collective
//! operation as one contiguous buffer. All three columns are allocated to
//! the same fixed capacity up front and never reallocated mid-run; `len`
//! tracks how many leading slots hold real points.

/// Cluster id of a point that has not yet been assigned.
pub const NO_CLUSTER: i32 = -1;

/// Cluster id that means "leave the stored assignment untouched" when
/// writing a point.
pub const IGNORE_CLUSTER: i32 = -2;

#[derive(Debug, Clone)]
pub struct PointSet {
    xs: Vec<f64>,
    ys: Vec<f64>,
    cluster_ids: Vec<i32>,
    len: usize,
}

impl PointSet {
    /// Allocate a point set with `capacity` slots and zero real points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            xs: vec![0.0; capacity],
            ys: vec![0.0; capacity],
            cluster_ids: vec![NO_CLUSTER; capacity],
            len: 0,
        }
    }

    /// Build a point set from parallel columns, all `len` real points.
    pub fn from_columns(xs: Vec<f64>, ys: Vec<f64>, cluster_ids: Vec<i32>) -> Self {
        assert_eq!(xs.len(), ys.len());
        assert_eq!(xs.len(), cluster_ids.len());
        let len = xs.len();
        Self {
            xs,
            ys,
            cluster_ids,
            len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.xs.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the number of leading slots considered real points.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity(), "len {len} exceeds capacity");
        self.len = len;
    }

    /// Grow the backing columns to at least `capacity` slots, padding with
    /// zeroed coordinates and `NO_CLUSTER`. Existing points are untouched.
    pub fn pad_to(&mut self, capacity: usize) {
        if capacity > self.capacity() {
            self.xs.resize(capacity, 0.0);
            self.ys.resize(capacity, 0.0);
            self.cluster_ids.resize(capacity, NO_CLUSTER);
        }
    }

    /// Append a point. Panics if the set is already at capacity.
    pub fn push(&mut self, x: f64, y: f64, cluster_id: i32) {
        assert!(self.len < self.capacity(), "point set is full");
        let i = self.len;
        self.xs[i] = x;
        self.ys[i] = y;
        self.cluster_ids[i] = cluster_id;
        self.len += 1;
    }

    /// Overwrite slot `i`. An `IGNORE_CLUSTER` id leaves the stored
    /// assignment as it was.
    pub fn set_point(&mut self, i: usize, x: f64, y: f64, cluster_id: i32) {
        self.xs[i] = x;
        self.ys[i] = y;
        if cluster_id != IGNORE_CLUSTER {
            self.cluster_ids[i] = cluster_id;
        }
    }

    pub fn x(&self, i: usize) -> f64 {
        self.xs[i]
    }

    pub fn y(&self, i: usize) -> f64 {
        self.ys[i]
    }

    pub fn cluster_id(&self, i: usize) -> i32 {
        self.cluster_ids[i]
    }

    pub fn set_cluster_id(&mut self, i: usize, cluster_id: i32) {
        self.cluster_ids[i] = cluster_id;
    }

    // Whole-column access, full capacity including padding slots. These are
    // the buffers handed to scatter/gather.

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn cluster_ids(&self) -> &[i32] {
        &self.cluster_ids
    }

    /// Replace the leading slots of each column from freshly received
    /// chunks. The chunks must all be the same length and fit in capacity.
    pub fn fill_from_columns(&mut self, xs: &[f64], ys: &[f64], cluster_ids: &[i32]) {
        assert_eq!(xs.len(), ys.len());
        assert_eq!(xs.len(), cluster_ids.len());
        assert!(xs.len() <= self.capacity(), "chunk exceeds capacity");
        self.xs[..xs.len()].copy_from_slice(xs);
        self.ys[..ys.len()].copy_from_slice(ys);
        self.cluster_ids[..cluster_ids.len()].copy_from_slice(cluster_ids);
    }

    /// Copy the first `count` points of `src` into this set, resetting
    /// their assignments to `NO_CLUSTER`. Used to seed centroids.
    pub fn seed_from(&mut self, src: &PointSet, count: usize) {
        assert!(count <= src.len(), "cannot seed beyond source points");
        assert!(count <= self.capacity(), "seed count exceeds capacity");
        for i in 0..count {
            self.xs[i] = src.xs[i];
            self.ys[i] = src.ys[i];
            self.cluster_ids[i] = NO_CLUSTER;
        }
        self.len = count;
    }

    /// Iterate over the real points as `(x, y, cluster_id)`.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, i32)> + '_ {
        (0..self.len).map(move |i| (self.xs[i], self.ys[i], self.cluster_ids[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_and_len_are_independent() {
        let mut ps = PointSet::with_capacity(8);
        assert_eq!(ps.capacity(), 8);
        assert_eq!(ps.len(), 0);

        ps.push(1.0, 2.0, NO_CLUSTER);
        ps.push(3.0, 4.0, 1);
        assert_eq!(ps.len(), 2);
        assert_eq!(ps.capacity(), 8);
        assert_eq!(ps.x(1), 3.0);
        assert_eq!(ps.cluster_id(1), 1);
        assert_eq!(ps.cluster_id(0), NO_CLUSTER);
    }

    #[test]
    fn test_set_point_honors_ignore_sentinel() {
        let mut ps = PointSet::with_capacity(2);
        ps.push(0.0, 0.0, 3);

        ps.set_point(0, 5.0, 6.0, IGNORE_CLUSTER);
        assert_eq!(ps.x(0), 5.0);
        assert_eq!(ps.y(0), 6.0);
        assert_eq!(ps.cluster_id(0), 3, "IGNORE_CLUSTER must not overwrite");

        ps.set_point(0, 7.0, 8.0, 1);
        assert_eq!(ps.cluster_id(0), 1);
    }

    #[test]
    fn test_pad_to_preserves_points() {
        let mut ps = PointSet::with_capacity(2);
        ps.push(1.0, 1.0, 0);
        ps.push(2.0, 2.0, 1);
        ps.pad_to(6);
        assert_eq!(ps.capacity(), 6);
        assert_eq!(ps.len(), 2);
        assert_eq!(ps.x(1), 2.0);
        assert_eq!(ps.cluster_id(5), NO_CLUSTER);
    }

    #[test]
    fn test_fill_from_columns() {
        let mut ps = PointSet::with_capacity(4);
        ps.fill_from_columns(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[0, 1, 0]);
        ps.set_len(3);
        assert_eq!(ps.y(2), 6.0);
        assert_eq!(ps.cluster_id(1), 1);
    }

    #[test]
    fn test_seed_from_resets_assignments() {
        let mut data = PointSet::with_capacity(4);
        data.push(1.0, 1.0, 7);
        data.push(2.0, 2.0, 7);
        data.push(3.0, 3.0, 7);

        let mut centroids = PointSet::with_capacity(2);
        centroids.seed_from(&data, 2);
        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids.x(1), 2.0);
        assert_eq!(centroids.cluster_id(0), NO_CLUSTER);
        assert_eq!(centroids.cluster_id(1), NO_CLUSTER);
    }

    #[test]
    #[should_panic(expected = "full")]
    fn test_push_past_capacity_panics() {
        let mut ps = PointSet::with_capacity(1);
        ps.push(0.0, 0.0, NO_CLUSTER);
        ps.push(1.0, 1.0, NO_CLUSTER);
    }
}
