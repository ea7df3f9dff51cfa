//! Multi-process collective transport over TCP.
//!
//! Star topology: root binds a listener and every worker holds one
//! connection to root. Each collective is realized as frame exchanges
//! along the star — root fans chunks out for scatter/broadcast and drains
//! workers in rank order for gather/reduce. Barriers are an enter/release
//! round trip through root.
//!
//! Every frame carries an opcode and a per-node collective sequence
//! number. The sequence advances once per collective on every member, so
//! a node that calls a different collective than its peers (or drifts a
//! round ahead) is rejected with a mismatch error instead of having its
//! payload misinterpreted.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DroverError, Result};
use crate::transport::{Collective, Wire, ROOT_RANK};

const FRAME_HEADER_LEN: usize = 1 + 8 + 4; // opcode, sequence, payload length

/// Upper bound on a single frame payload. Collectives move whole columns,
/// so this is sized far above any realistic dataset chunk; it exists to
/// reject garbage lengths from a desynchronized peer.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum OpCode {
    Hello = 1,
    Scatter = 2,
    Gather = 3,
    Broadcast = 4,
    Reduce = 5,
    BarrierEnter = 6,
    BarrierRelease = 7,
}

impl OpCode {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(OpCode::Hello),
            2 => Some(OpCode::Scatter),
            3 => Some(OpCode::Gather),
            4 => Some(OpCode::Broadcast),
            5 => Some(OpCode::Reduce),
            6 => Some(OpCode::BarrierEnter),
            7 => Some(OpCode::BarrierRelease),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            OpCode::Hello => "hello",
            OpCode::Scatter => "scatter",
            OpCode::Gather => "gather",
            OpCode::Broadcast => "broadcast",
            OpCode::Reduce => "reduce",
            OpCode::BarrierEnter => "barrier-enter",
            OpCode::BarrierRelease => "barrier-release",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Hello {
    rank: u32,
    group_size: u32,
}

/// One framed, blocking link to a peer.
struct Link {
    stream: TcpStream,
}

impl Link {
    fn new(stream: TcpStream) -> Result<Self> {
        stream
            .set_nodelay(true)
            .map_err(|e| DroverError::Transport(format!("set_nodelay failed: {e}")))?;
        Ok(Self { stream })
    }

    fn send(&mut self, op: OpCode, seq: u64, payload: &[u8]) -> Result<()> {
        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.put_u8(op as u8);
        frame.put_u64(seq);
        frame.put_u32(payload.len() as u32);
        frame.put_slice(payload);
        self.stream.write_all(&frame)?;
        Ok(())
    }

    /// Read one frame and require it to match the collective this node is
    /// currently executing.
    fn recv(&mut self, expect: OpCode, seq: u64) -> Result<Vec<u8>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.stream.read_exact(&mut header)?;

        let op = header[0];
        let got_seq = u64::from_be_bytes(header[1..9].try_into().unwrap());
        let len = u32::from_be_bytes(header[9..13].try_into().unwrap());

        let op = OpCode::from_u8(op).ok_or_else(|| DroverError::CollectiveMismatch {
            expected: expect.name().into(),
            actual: format!("unknown opcode {op}"),
        })?;
        if op != expect || got_seq != seq {
            return Err(DroverError::CollectiveMismatch {
                expected: format!("{} (round {seq})", expect.name()),
                actual: format!("{} (round {got_seq})", op.name()),
            });
        }
        if len > MAX_FRAME_LEN {
            return Err(DroverError::Transport(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload)?;
        Ok(payload)
    }
}

enum Links {
    /// Worker links indexed by `rank - 1`.
    Root(Vec<Link>),
    Worker(Link),
}

/// A member of a TCP process group.
pub struct NetGroup {
    rank: usize,
    size: usize,
    seq: u64,
    links: Links,
}

impl NetGroup {
    /// Bind `addr` and assemble the group as root, blocking until all
    /// `size - 1` workers have connected and introduced themselves.
    pub fn bind_root(addr: &str, size: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| DroverError::Transport(format!("cannot bind {addr}: {e}")))?;
        Self::root_from_listener(listener, size)
    }

    /// Assemble the group as root from an already-bound listener. Exposed
    /// so tests can bind an ephemeral port first and share the address.
    pub fn root_from_listener(listener: TcpListener, size: usize) -> Result<Self> {
        assert!(size > 0, "group must have at least one member");
        let local = listener
            .local_addr()
            .map_err(|e| DroverError::Transport(e.to_string()))?;
        info!(addr = %local, group_size = size, "waiting for workers");

        let mut links: Vec<Option<Link>> = (1..size).map(|_| None).collect();
        let mut joined = 0usize;
        while joined < size - 1 {
            let (stream, peer) = listener
                .accept()
                .map_err(|e| DroverError::Transport(format!("accept failed: {e}")))?;
            let mut link = Link::new(stream)?;
            let payload = link.recv(OpCode::Hello, 0)?;
            let hello: Hello = bincode::deserialize(&payload)?;
            let rank = hello.rank as usize;

            if hello.group_size as usize != size {
                return Err(DroverError::Transport(format!(
                    "worker {peer} expects a group of {}, root has {size}",
                    hello.group_size
                )));
            }
            if rank == ROOT_RANK || rank >= size {
                return Err(DroverError::Transport(format!(
                    "worker {peer} announced invalid rank {rank} for group of {size}"
                )));
            }
            if links[rank - 1].is_some() {
                return Err(DroverError::Transport(format!(
                    "two workers announced rank {rank}"
                )));
            }
            debug!(rank, peer = %peer, "worker joined");
            links[rank - 1] = Some(link);
            joined += 1;
        }

        info!(group_size = size, "group assembled");
        let links: Vec<Link> = links.into_iter().flatten().collect();
        if links.len() != size - 1 {
            return Err(DroverError::Transport(
                "group assembly lost a worker link".into(),
            ));
        }
        Ok(Self {
            rank: ROOT_RANK,
            size,
            seq: 1,
            links: Links::Root(links),
        })
    }

    /// Join the group as `rank`, connecting to root at `addr`. Retries the
    /// connection while root is still binding; collectives themselves
    /// never time out.
    pub fn connect_worker(addr: &str, rank: usize, size: usize) -> Result<Self> {
        assert!(rank != ROOT_RANK && rank < size, "invalid worker rank");
        let target: SocketAddr = addr
            .parse()
            .map_err(|e| DroverError::Config(format!("bad root address {addr}: {e}")))?;

        const ATTEMPTS: u32 = 100;
        const RETRY_DELAY: Duration = Duration::from_millis(100);
        let mut last_err = None;
        let mut stream = None;
        for _ in 0..ATTEMPTS {
            match TcpStream::connect(target) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    last_err = Some(e);
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
        let stream = stream.ok_or_else(|| {
            DroverError::Transport(format!(
                "cannot reach root at {addr}: {}",
                last_err.map(|e| e.to_string()).unwrap_or_default()
            ))
        })?;

        let mut link = Link::new(stream)?;
        let hello = bincode::serialize(&Hello {
            rank: rank as u32,
            group_size: size as u32,
        })?;
        link.send(OpCode::Hello, 0, &hello)?;
        info!(rank, root = %addr, "joined group");

        Ok(Self {
            rank,
            size,
            seq: 1,
            links: Links::Worker(link),
        })
    }

    fn next_round(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn root_links(&mut self) -> &mut Vec<Link> {
        match &mut self.links {
            Links::Root(links) => links,
            Links::Worker(_) => unreachable!("root links requested on a worker"),
        }
    }

    fn worker_link(&mut self) -> &mut Link {
        match &mut self.links {
            Links::Worker(link) => link,
            Links::Root(_) => unreachable!("worker link requested on root"),
        }
    }
}

impl Collective for NetGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn scatter<T: Wire>(&mut self, send: Option<&[T]>, chunk: usize) -> Result<Vec<T>> {
        let seq = self.next_round();
        if self.is_root() {
            let send = send.ok_or_else(|| {
                DroverError::Transport("scatter on root requires a send buffer".into())
            })?;
            let needed = chunk * self.size;
            if send.len() < needed {
                return Err(DroverError::Transport(format!(
                    "scatter buffer holds {} elements, group needs {needed}",
                    send.len()
                )));
            }
            for rank in 1..self.size {
                let part = &send[rank * chunk..(rank + 1) * chunk];
                let payload = bincode::serialize(part)?;
                self.root_links()[rank - 1].send(OpCode::Scatter, seq, &payload)?;
            }
            Ok(send[..chunk].to_vec())
        } else {
            let payload = self.worker_link().recv(OpCode::Scatter, seq)?;
            let part: Vec<T> = bincode::deserialize(&payload)?;
            if part.len() != chunk {
                return Err(DroverError::CollectiveMismatch {
                    expected: format!("scatter chunk of {chunk}"),
                    actual: format!("chunk of {}", part.len()),
                });
            }
            Ok(part)
        }
    }

    fn gather<T: Wire>(&mut self, local: &[T]) -> Result<Option<Vec<T>>> {
        let seq = self.next_round();
        if self.is_root() {
            let mut all = Vec::with_capacity(local.len() * self.size);
            all.extend_from_slice(local);
            for rank in 1..self.size {
                let payload = self.root_links()[rank - 1].recv(OpCode::Gather, seq)?;
                let part: Vec<T> = bincode::deserialize(&payload)?;
                if part.len() != local.len() {
                    return Err(DroverError::CollectiveMismatch {
                        expected: format!("gather chunk of {}", local.len()),
                        actual: format!("chunk of {} from rank {rank}", part.len()),
                    });
                }
                all.extend_from_slice(&part);
            }
            Ok(Some(all))
        } else {
            let payload = bincode::serialize(local)?;
            self.worker_link().send(OpCode::Gather, seq, &payload)?;
            Ok(None)
        }
    }

    fn broadcast<T: Wire>(&mut self, value: Option<T>) -> Result<T> {
        let seq = self.next_round();
        if self.is_root() {
            let value = value.ok_or_else(|| {
                DroverError::Transport("broadcast on root requires a value".into())
            })?;
            let payload = bincode::serialize(&value)?;
            for rank in 1..self.size {
                self.root_links()[rank - 1].send(OpCode::Broadcast, seq, &payload)?;
            }
            Ok(value)
        } else {
            let payload = self.worker_link().recv(OpCode::Broadcast, seq)?;
            Ok(bincode::deserialize(&payload)?)
        }
    }

    fn reduce_sum(&mut self, local: u64) -> Result<Option<u64>> {
        let seq = self.next_round();
        if self.is_root() {
            let mut total = local;
            for rank in 1..self.size {
                let payload = self.root_links()[rank - 1].recv(OpCode::Reduce, seq)?;
                let part: u64 = bincode::deserialize(&payload)?;
                total += part;
            }
            Ok(Some(total))
        } else {
            let payload = bincode::serialize(&local)?;
            self.worker_link().send(OpCode::Reduce, seq, &payload)?;
            Ok(None)
        }
    }

    fn barrier(&mut self) -> Result<()> {
        let seq = self.next_round();
        if self.is_root() {
            for rank in 1..self.size {
                self.root_links()[rank - 1].recv(OpCode::BarrierEnter, seq)?;
            }
            for rank in 1..self.size {
                self.root_links()[rank - 1].send(OpCode::BarrierRelease, seq, &[])?;
            }
        } else {
            self.worker_link().send(OpCode::BarrierEnter, seq, &[])?;
            self.worker_link().recv(OpCode::BarrierRelease, seq)?;
        }
        Ok(())
    }
}
