//! Single-process collective transport.
//!
//! Every node is a thread holding one [`LocalNode`]; the group shares a
//! rendezvous slot guarded by a mutex plus a reusable barrier. Each
//! collective is two barrier crossings around a deposit/read of the shared
//! slot, which gives the same blocking semantics as the networked
//! transport: nobody leaves a collective before everyone has entered it.

use std::any::Any;
use std::sync::{Arc, Barrier, Mutex};

use crate::error::{DroverError, Result};
use crate::transport::{Collective, Wire};

/// Exchange area for one in-flight collective.
#[derive(Default)]
struct Exchange {
    /// Root's deposit for scatter/broadcast.
    from_root: Option<Box<dyn Any + Send>>,
    /// Per-rank contributions for gather/reduce.
    contributions: Vec<Option<Box<dyn Any + Send>>>,
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slot: Mutex<Exchange>,
}

/// One member of an in-process group. Create the whole group at once with
/// [`LocalGroup::new`] and hand one node to each thread.
pub struct LocalNode {
    rank: usize,
    shared: Arc<Shared>,
}

pub struct LocalGroup;

impl LocalGroup {
    /// Create a group of `size` members sharing one rendezvous.
    pub fn new(size: usize) -> Vec<LocalNode> {
        assert!(size > 0, "group must have at least one member");
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slot: Mutex::new(Exchange {
                from_root: None,
                contributions: (0..size).map(|_| None).collect(),
            }),
        });
        (0..size)
            .map(|rank| LocalNode {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

fn mismatch<T>(expected: &str) -> DroverError {
    DroverError::CollectiveMismatch {
        expected: format!("{expected}<{}>", std::any::type_name::<T>()),
        actual: "a different collective or element type".into(),
    }
}

impl LocalNode {
    fn deposit_from_root<T: Wire>(&self, buf: Vec<T>) {
        let mut slot = self.shared.slot.lock().unwrap();
        slot.from_root = Some(Box::new(buf));
    }

    fn read_from_root<T: Wire>(&self, op: &str) -> Result<Vec<T>> {
        let slot = self.shared.slot.lock().unwrap();
        let any = slot.from_root.as_ref().ok_or_else(|| mismatch::<T>(op))?;
        let buf = any.downcast_ref::<Vec<T>>().ok_or_else(|| mismatch::<T>(op))?;
        Ok(buf.clone())
    }

    /// Called by root after the closing barrier of a collective, once all
    /// members have read the slot. A stale deposit must never survive into
    /// the next collective or a mismatched same-type call could read it.
    fn clear_from_root(&self) {
        let mut slot = self.shared.slot.lock().unwrap();
        slot.from_root = None;
    }
}

impl Collective for LocalNode {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn scatter<T: Wire>(&mut self, send: Option<&[T]>, chunk: usize) -> Result<Vec<T>> {
        let needed = chunk * self.size();
        if self.is_root() {
            let send = send.ok_or_else(|| {
                DroverError::Transport("scatter on root requires a send buffer".into())
            })?;
            if send.len() < needed {
                return Err(DroverError::Transport(format!(
                    "scatter buffer holds {} elements, group needs {needed}",
                    send.len()
                )));
            }
            self.deposit_from_root(send[..needed].to_vec());
        }
        self.shared.barrier.wait();

        let full = self.read_from_root::<T>("scatter")?;
        if full.len() != needed {
            return Err(mismatch::<T>("scatter"));
        }
        let mine = full[self.rank * chunk..(self.rank + 1) * chunk].to_vec();

        self.shared.barrier.wait();
        if self.is_root() {
            self.clear_from_root();
        }
        Ok(mine)
    }

    fn gather<T: Wire>(&mut self, local: &[T]) -> Result<Option<Vec<T>>> {
        {
            let mut slot = self.shared.slot.lock().unwrap();
            slot.contributions[self.rank] = Some(Box::new(local.to_vec()));
        }
        self.shared.barrier.wait();

        let result = if self.is_root() {
            let mut slot = self.shared.slot.lock().unwrap();
            let mut all = Vec::with_capacity(local.len() * self.shared.size);
            for rank in 0..self.shared.size {
                let any = slot.contributions[rank]
                    .take()
                    .ok_or_else(|| mismatch::<T>("gather"))?;
                let part = any
                    .downcast::<Vec<T>>()
                    .map_err(|_| mismatch::<T>("gather"))?;
                if part.len() != local.len() {
                    return Err(mismatch::<T>("gather"));
                }
                all.extend_from_slice(&part);
            }
            Some(all)
        } else {
            None
        };

        self.shared.barrier.wait();
        Ok(result)
    }

    fn broadcast<T: Wire>(&mut self, value: Option<T>) -> Result<T> {
        if self.is_root() {
            let value = value.ok_or_else(|| {
                DroverError::Transport("broadcast on root requires a value".into())
            })?;
            self.deposit_from_root(vec![value]);
        }
        self.shared.barrier.wait();

        let buf = self.read_from_root::<T>("broadcast")?;
        let value = buf
            .into_iter()
            .next()
            .ok_or_else(|| mismatch::<T>("broadcast"))?;

        self.shared.barrier.wait();
        if self.is_root() {
            self.clear_from_root();
        }
        Ok(value)
    }

    fn reduce_sum(&mut self, local: u64) -> Result<Option<u64>> {
        let parts = self.gather(&[local])?;
        Ok(parts.map(|p| p.iter().sum()))
    }

    fn barrier(&mut self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Run `f` on every node of a fresh group, one thread per node, and
    /// return the per-rank results in rank order.
    fn on_group<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send + 'static,
        F: Fn(LocalNode) -> R + Clone + Send + 'static,
    {
        let handles: Vec<_> = LocalGroup::new(size)
            .into_iter()
            .map(|node| {
                let f = f.clone();
                thread::spawn(move || f(node))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_scatter_delivers_rank_chunks() {
        let results = on_group(3, |mut node| {
            let send: Vec<i32> = (0..6).collect();
            let buf = if node.is_root() { Some(&send[..]) } else { None };
            node.scatter(buf, 2).unwrap()
        });
        assert_eq!(results, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    #[test]
    fn test_gather_concatenates_in_rank_order() {
        let results = on_group(3, |mut node| {
            let local = vec![node.rank() as i32 * 10, node.rank() as i32 * 10 + 1];
            node.gather(&local).unwrap()
        });
        assert_eq!(results[0], Some(vec![0, 1, 10, 11, 20, 21]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }

    #[test]
    fn test_broadcast_reaches_all_members() {
        let results = on_group(4, |mut node| {
            let value = node.is_root().then(|| vec![1.5f64, 2.5]);
            node.broadcast(value).unwrap()
        });
        for r in results {
            assert_eq!(r, vec![1.5, 2.5]);
        }
    }

    #[test]
    fn test_reduce_sum_on_root_only() {
        let results = on_group(4, |mut node| node.reduce_sum(node.rank() as u64 + 1).unwrap());
        assert_eq!(results[0], Some(1 + 2 + 3 + 4));
        assert!(results[1..].iter().all(|r| r.is_none()));
    }

    #[test]
    fn test_sequenced_collectives_keep_order() {
        // Two different element types back to back: every member must see
        // the values of its own round, never the neighbor round's.
        let results = on_group(2, |mut node| {
            let ints = node.is_root().then(|| vec![7i64]);
            let a = node.broadcast(ints).unwrap();
            node.barrier().unwrap();
            let floats = node.is_root().then(|| vec![0.5f64]);
            let b = node.broadcast(floats).unwrap();
            (a, b)
        });
        for (a, b) in results {
            assert_eq!(a, vec![7]);
            assert_eq!(b, vec![0.5]);
        }
    }

    #[test]
    fn test_single_member_group_degenerates() {
        let mut node = LocalGroup::new(1).pop().unwrap();
        let out = node.scatter(Some(&[9.0f64, 8.0][..]), 2).unwrap();
        assert_eq!(out, vec![9.0, 8.0]);
        let gathered = node.gather(&out).unwrap();
        assert_eq!(gathered, Some(vec![9.0, 8.0]));
        assert_eq!(node.reduce_sum(3).unwrap(), Some(3));
        assert_eq!(node.broadcast(Some(true)).unwrap(), true);
        node.barrier().unwrap();
    }

    #[test]
    fn test_scatter_rejects_short_root_buffer() {
        let mut node = LocalGroup::new(1).pop().unwrap();
        let err = node.scatter(Some(&[1i32][..]), 2).unwrap_err();
        assert!(matches!(err, DroverError::Transport(_)));
    }
}
