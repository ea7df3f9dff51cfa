//! Collective communication between the nodes of a fixed process group.
//!
//! The clustering protocol needs exactly five group operations — scatter,
//! gather, broadcast, reduce-sum, and barrier — all blocking rendezvous:
//! no member proceeds past a collective until every member has entered it.
//! They are exposed through the [`Collective`] trait with two
//! implementations:
//!
//! - [`local::LocalGroup`] — every node is a thread in one process,
//!   rendezvous built on `std::sync`. Used by the test suites and by
//!   single-node runs.
//! - [`net::NetGroup`] — one process per node, star topology over TCP with
//!   length-prefixed bincode frames.
//!
//! Callers must keep control flow identical across all nodes for a given
//! round: every member issues the same collectives in the same program
//! order with the same shapes. Both implementations detect a mismatched
//! call and fail with [`DroverError::CollectiveMismatch`] rather than
//! silently corrupting data.
//!
//! [`DroverError::CollectiveMismatch`]: crate::error::DroverError::CollectiveMismatch

pub mod local;
pub mod net;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Rank of the root node, which owns the authoritative dataset and makes
/// the termination decision.
pub const ROOT_RANK: usize = 0;

/// Element types that can travel through a collective.
pub trait Wire: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> Wire for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

/// Blocking group operations over a fixed-membership process group.
///
/// Root-asymmetric operations take or return `Option`s: root supplies
/// `Some` send buffer to `scatter`/`broadcast`, and only root receives
/// `Some` result from `gather`/`reduce_sum`.
pub trait Collective {
    /// This node's rank, stable for the process lifetime.
    fn rank(&self) -> usize;

    /// Number of members in the group, stable for the process lifetime.
    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// Split root's buffer into `size` contiguous chunks of `chunk`
    /// elements and deliver each member its rank's chunk (root included).
    /// Root must supply a buffer of at least `chunk * size` elements.
    fn scatter<T: Wire>(&mut self, send: Option<&[T]>, chunk: usize) -> Result<Vec<T>>;

    /// Inverse of scatter: every member contributes `local`, root receives
    /// all contributions concatenated in rank order.
    fn gather<T: Wire>(&mut self, local: &[T]) -> Result<Option<Vec<T>>>;

    /// Copy root's value to every member. Root passes `Some`, everyone
    /// receives the value.
    fn broadcast<T: Wire>(&mut self, value: Option<T>) -> Result<T>;

    /// Sum a per-member scalar across the group; the total is delivered to
    /// root only.
    fn reduce_sum(&mut self, local: u64) -> Result<Option<u64>>;

    /// Block until every member has entered the barrier.
    fn barrier(&mut self) -> Result<()>;
}
