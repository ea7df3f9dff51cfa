//! Per-node run context.
//!
//! `NodeContext` carries everything a node needs across iteration rounds:
//! its place in the group, the partition plan, and the owned buffers —
//! the authoritative dataset on root, the local partition, and this
//! node's centroid replica. It is built once at startup through a group
//! handshake and passed explicitly to the orchestrator; no process-wide
//! state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{DroverError, Result};
use crate::partition::PartitionPlan;
use crate::pointset::{PointSet, IGNORE_CLUSTER};
use crate::transport::Collective;

/// First collective of a run: root either publishes the agreed shape of
/// the work or tells the whole group to abort. Workers block on this
/// before allocating anything, so a root-side validation failure unwinds
/// every node instead of deadlocking the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum RunHeader {
    Proceed { total_points: u64, capacity: u64 },
    Abort { reason: String },
}

#[derive(Debug)]
pub struct NodeContext {
    pub rank: usize,
    pub size: usize,
    pub is_root: bool,
    pub plan: PartitionPlan,
    /// The full dataset; `Some` on root only. Padded to `plan.padded_len()`
    /// slots so whole-column scatter/gather chunks line up.
    pub global: Option<PointSet>,
    /// This node's partition buffer, `plan.capacity()` slots, repopulated
    /// by scatter every round.
    pub partition: PointSet,
    /// This node's centroid replica; root's copy is authoritative.
    pub centroids: PointSet,
}

impl NodeContext {
    /// Establish the shared run context across the whole group.
    ///
    /// Root validates the dataset against the group shape and either
    /// publishes the partition plan or aborts the run for everyone. After
    /// the header, root seeds the centroids from the first K points
    /// (deterministic by design — runs are comparable across transports
    /// and node counts) and broadcasts them.
    pub fn establish<C: Collective>(
        transport: &mut C,
        run: &RunConfig,
        root_data: Option<PointSet>,
    ) -> Result<Self> {
        let rank = transport.rank();
        let size = transport.size();
        let is_root = transport.is_root();

        let (plan, global) = if is_root {
            let data = root_data.ok_or_else(|| {
                DroverError::Transport("root node requires the loaded dataset".into())
            })?;
            match plan_run(&data, run, size) {
                Ok(plan) => {
                    transport.broadcast(Some(RunHeader::Proceed {
                        total_points: plan.total_points() as u64,
                        capacity: plan.capacity() as u64,
                    }))?;
                    (plan, Some(data))
                }
                Err(e) => {
                    transport.broadcast(Some(RunHeader::Abort {
                        reason: e.to_string(),
                    }))?;
                    return Err(e);
                }
            }
        } else {
            match transport.broadcast::<RunHeader>(None)? {
                RunHeader::Proceed {
                    total_points,
                    capacity,
                } => (
                    PartitionPlan::from_parts(total_points as usize, size, capacity as usize),
                    None,
                ),
                RunHeader::Abort { reason } => return Err(DroverError::AbortedByRoot(reason)),
            }
        };

        debug!(
            rank,
            total_points = plan.total_points(),
            capacity = plan.capacity(),
            local_count = plan.local_count(rank),
            "partition plan agreed"
        );

        let mut ctx = Self {
            rank,
            size,
            is_root,
            plan,
            global,
            partition: PointSet::with_capacity(plan.capacity()),
            centroids: PointSet::with_capacity(run.num_clusters),
        };

        // Root's columns must span every scatter chunk, padding included.
        if let Some(global) = ctx.global.as_mut() {
            global.pad_to(plan.padded_len());
        }

        ctx.seed_centroids(transport, run.num_clusters)?;

        if is_root {
            info!(
                nodes = size,
                total_points = plan.total_points(),
                capacity = plan.capacity(),
                clusters = run.num_clusters,
                "run context established"
            );
        }
        Ok(ctx)
    }

    /// Root-only: tell the whole group to abort before the run context is
    /// established. Used when root fails (for example loading the input)
    /// after workers have already connected and are blocked on the run
    /// header.
    pub fn abort<C: Collective>(transport: &mut C, reason: &str) -> Result<()> {
        debug_assert!(transport.is_root());
        transport.broadcast(Some(RunHeader::Abort {
            reason: reason.to_string(),
        }))?;
        Ok(())
    }

    /// Seed centroids on root from the first K points, then replicate.
    fn seed_centroids<C: Collective>(&mut self, transport: &mut C, k: usize) -> Result<()> {
        if let Some(global) = self.global.as_ref() {
            self.centroids.seed_from(global, k);
        }
        self.replicate_centroids(transport)?;
        Ok(())
    }

    /// Broadcast root's centroid coordinates into every node's replica.
    pub fn replicate_centroids<C: Collective>(&mut self, transport: &mut C) -> Result<()> {
        let k = self.centroids.capacity();
        let xs = transport.broadcast(self.is_root.then(|| self.centroids.xs()[..k].to_vec()))?;
        let ys = transport.broadcast(self.is_root.then(|| self.centroids.ys()[..k].to_vec()))?;
        if !self.is_root {
            for (i, (&x, &y)) in xs.iter().zip(ys.iter()).enumerate() {
                self.centroids.set_point(i, x, y, IGNORE_CLUSTER);
            }
            self.centroids.set_len(k);
        }
        Ok(())
    }
}

/// Root-side validation of the dataset against the run shape.
fn plan_run(data: &PointSet, run: &RunConfig, nodes: usize) -> Result<PartitionPlan> {
    if data.len() < run.num_clusters {
        return Err(DroverError::Validation(format!(
            "dataset of {} points cannot seed {} clusters",
            data.len(),
            run.num_clusters
        )));
    }
    PartitionPlan::new(data.len(), nodes)
}
