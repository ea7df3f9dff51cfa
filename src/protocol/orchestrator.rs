//! The per-round iteration protocol.
//!
//! Every node runs the same loop in lockstep:
//!
//! 1. Receive root's termination decision (root evaluates it from the
//!    previous round's reduced change count).
//! 2. If done, exit synchronously.
//! 3. Scatter the dataset columns into each node's partition.
//! 4. Run the local assignment pass.
//! 5. Reduce-sum the local change counts to root.
//! 6. Gather the partitions back into root's dataset.
//! 7. Root recomputes centroids from the global assignment.
//! 8. Broadcast the new centroids.
//!
//! Scattering before assignment and gathering before recomputation moves
//! O(total points) per round, but keeps the averaging kernel simple and
//! single-threaded on root; per-round volume is fixed and K is tiny
//! relative to the point count.

use std::time::Instant;

use tracing::debug;

use crate::config::RunConfig;
use crate::error::Result;
use crate::kernels::DistanceMode;
use crate::protocol::aggregator::CentroidAggregator;
use crate::protocol::assigner::LocalAssigner;
use crate::protocol::context::NodeContext;
use crate::protocol::termination::{RunState, TerminationCoordinator};
use crate::transport::Collective;

/// Loop state owned by the orchestrator. `change_count` holds the reduced
/// global count on root and stays `None` elsewhere; the run state is
/// root-authoritative and disseminated each round.
struct IterationState {
    change_count: Option<u64>,
    iteration_index: u32,
    state: RunState,
}

/// Root-side wall-clock accounting, one value set per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundTimings {
    /// Accumulated seconds in the assignment phase (scatter, local
    /// assignment, reduce, gather) across all iterations.
    pub assignment_seconds: f64,
    /// Accumulated seconds recomputing and broadcasting centroids.
    pub centroids_seconds: f64,
    /// Wall-clock seconds of the slowest single iteration.
    pub max_iteration_seconds: f64,
    /// Total loop seconds, centroid seeding excluded.
    pub total_seconds: f64,
}

/// What a node knows once the loop has exited.
#[derive(Debug)]
pub struct Outcome {
    pub state: RunState,
    pub iterations: u32,
    pub total_points: usize,
    /// `Some` on root only.
    pub timings: Option<RoundTimings>,
}

pub struct IterationOrchestrator<'a, C: Collective> {
    transport: &'a mut C,
    ctx: NodeContext,
    coordinator: TerminationCoordinator,
    assigner: LocalAssigner,
    aggregator: CentroidAggregator,
}

impl<'a, C: Collective> IterationOrchestrator<'a, C> {
    pub fn new(transport: &'a mut C, ctx: NodeContext, run: &RunConfig) -> Self {
        Self {
            transport,
            ctx,
            coordinator: TerminationCoordinator::new(run.max_iterations),
            assigner: LocalAssigner::new(DistanceMode::from_proper(run.proper_distance)),
            aggregator: CentroidAggregator,
        }
    }

    /// Drive the loop to termination. Returns the outcome along with the
    /// context so root can hand its converged dataset to the output
    /// boundary.
    pub fn run(mut self) -> Result<(Outcome, NodeContext)> {
        let mut state = IterationState {
            change_count: None,
            iteration_index: 0,
            state: RunState::Running,
        };
        let mut timings = RoundTimings::default();
        let loop_start = Instant::now();

        loop {
            state.state = self.coordinator.decide(
                self.transport,
                state.change_count,
                state.iteration_index,
            )?;
            if state.state.is_done() {
                break;
            }

            debug!(
                rank = self.ctx.rank,
                iteration = state.iteration_index,
                changes = state.change_count,
                "starting iteration"
            );

            let iteration_start = Instant::now();
            state.change_count = self.assignment_round()?;
            let assignment_elapsed = iteration_start.elapsed().as_secs_f64();

            let centroids_start = Instant::now();
            self.centroid_round()?;
            let centroids_elapsed = centroids_start.elapsed().as_secs_f64();

            if self.ctx.is_root {
                timings.assignment_seconds += assignment_elapsed;
                timings.centroids_seconds += centroids_elapsed;
                let iteration_elapsed = iteration_start.elapsed().as_secs_f64();
                if iteration_elapsed > timings.max_iteration_seconds {
                    timings.max_iteration_seconds = iteration_elapsed;
                }
            }

            state.iteration_index += 1;
        }

        timings.total_seconds = loop_start.elapsed().as_secs_f64();

        debug!(
            rank = self.ctx.rank,
            iterations = state.iteration_index,
            state = %state.state,
            "loop exited"
        );

        let outcome = Outcome {
            state: state.state,
            iterations: state.iteration_index,
            total_points: self.ctx.plan.total_points(),
            timings: self.ctx.is_root.then_some(timings),
        };
        Ok((outcome, self.ctx))
    }

    /// Scatter, assign locally, reduce the change count, gather back.
    /// Returns the reduced global change count (root only).
    fn assignment_round(&mut self) -> Result<Option<u64>> {
        let chunk = self.ctx.plan.capacity();

        let xs = self
            .transport
            .scatter(self.ctx.global.as_ref().map(|g| g.xs()), chunk)?;
        let ys = self
            .transport
            .scatter(self.ctx.global.as_ref().map(|g| g.ys()), chunk)?;
        let ids = self
            .transport
            .scatter(self.ctx.global.as_ref().map(|g| g.cluster_ids()), chunk)?;

        self.ctx.partition.fill_from_columns(&xs, &ys, &ids);
        // Clip to the true local count: the tail partition's trailing
        // slots are padding and must not be assigned.
        self.ctx
            .partition
            .set_len(self.ctx.plan.local_count(self.ctx.rank));

        let local_changes = self
            .assigner
            .assign(&mut self.ctx.partition, &self.ctx.centroids);
        let global_changes = self.transport.reduce_sum(local_changes)?;

        let gx = self.transport.gather(self.ctx.partition.xs())?;
        let gy = self.transport.gather(self.ctx.partition.ys())?;
        let gids = self.transport.gather(self.ctx.partition.cluster_ids())?;
        if let (Some(gx), Some(gy), Some(gids), Some(global)) =
            (gx, gy, gids, self.ctx.global.as_mut())
        {
            global.fill_from_columns(&gx, &gy, &gids);
            global.set_len(self.ctx.plan.total_points());
        }

        Ok(global_changes)
    }

    /// Recompute centroids on root from the gathered assignment, then
    /// refresh every node's replica.
    fn centroid_round(&mut self) -> Result<()> {
        if let Some(global) = self.ctx.global.as_ref() {
            self.aggregator.recompute(global, &mut self.ctx.centroids);
        }
        self.ctx.replicate_centroids(self.transport)
    }
}
