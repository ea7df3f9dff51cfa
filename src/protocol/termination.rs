//! Root-driven termination decision.
//!
//! Only root holds the reduced global change count and the authoritative
//! iteration counter, so only root evaluates the stop predicate. The
//! decision is then broadcast before any other collective of the round:
//! every node's loop condition agrees, so no node can exit early while a
//! peer blocks in a collective that will never complete.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::transport::Collective;

/// Where the run stands after a termination check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Keep iterating.
    Running,
    /// The last round reassigned no points: the clustering is a fixed
    /// point.
    Converged,
    /// The iteration limit was reached before convergence.
    Capped,
}

impl RunState {
    pub fn is_done(self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Converged => write!(f, "converged"),
            RunState::Capped => write!(f, "capped"),
        }
    }
}

pub struct TerminationCoordinator {
    max_iterations: u32,
}

impl TerminationCoordinator {
    pub fn new(max_iterations: u32) -> Self {
        Self { max_iterations }
    }

    /// Evaluate the stop predicate on root and disseminate the decision.
    ///
    /// `changes` is the reduced global change count of the previous round;
    /// `None` on the first round (nothing has run yet) and always `None`
    /// on non-root nodes, which only learn the outcome from the broadcast.
    pub fn decide<C: Collective>(
        &self,
        transport: &mut C,
        changes: Option<u64>,
        iteration: u32,
    ) -> Result<RunState> {
        let decision = transport.is_root().then(|| {
            let state = self.evaluate(changes, iteration);
            if state.is_done() {
                info!(
                    iterations = iteration,
                    changes = changes.unwrap_or(0),
                    state = %state,
                    "root decided the run is done"
                );
            }
            state
        });
        transport.broadcast(decision)
    }

    fn evaluate(&self, changes: Option<u64>, iteration: u32) -> RunState {
        match changes {
            Some(0) => RunState::Converged,
            _ if iteration >= self.max_iterations => RunState::Capped,
            _ => RunState::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_round_always_runs() {
        let coordinator = TerminationCoordinator::new(10);
        assert_eq!(coordinator.evaluate(None, 0), RunState::Running);
    }

    #[test]
    fn test_zero_changes_converges() {
        let coordinator = TerminationCoordinator::new(10);
        assert_eq!(coordinator.evaluate(Some(0), 3), RunState::Converged);
    }

    #[test]
    fn test_iteration_limit_caps() {
        let coordinator = TerminationCoordinator::new(10);
        assert_eq!(coordinator.evaluate(Some(5), 10), RunState::Capped);
        assert_eq!(coordinator.evaluate(Some(5), 11), RunState::Capped);
        assert_eq!(coordinator.evaluate(Some(5), 9), RunState::Running);
    }

    #[test]
    fn test_convergence_wins_over_cap() {
        let coordinator = TerminationCoordinator::new(10);
        assert_eq!(coordinator.evaluate(Some(0), 10), RunState::Converged);
    }
}
