/// MPI-based parallel communication module.
///
/// This module provides an implementation of the `Comm` trait using the MPI
/// (Message Passing Interface) backend for distributed-memory parallelism.
/// It supplies the collectives the reduction stages need: an element-wise
/// minimum all-reduce, a variable-length gather to a root, a broadcast, and
/// blocking point-to-point send/receive. The implementation is only available
/// when the `mpi` feature is enabled.
///
/// # Usage
///
/// - The `MpiComm` struct wraps the MPI world communicator and exposes the
///   `Comm` collectives over it.
/// - It is a drop-in replacement for the in-memory `LocalComm` backend.
///
/// # References
/// - [MPI Standard](https://www.mpi-forum.org/)
use mpi::collective::SystemOperation;
use mpi::datatype::PartitionMut;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use super::Comm;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds the MPI world communicator, the rank of the current process, and the
/// total number of processes.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// # Panics
    /// Panics if MPI initialization fails.
    pub fn new() -> Self {
        let universe = mpi::initialize().unwrap();
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { world, rank, size }
    }
}

impl Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize {
        self.size
    }

    /// Synchronizes all processes at a barrier.
    fn barrier(&self) {
        self.world.barrier();
    }

    /// Element-wise minimum across all ranks; every rank receives the result.
    fn all_reduce_min(&self, local: &[i64], global: &mut [i64]) {
        self.world
            .all_reduce_into(local, global, &SystemOperation::min());
    }

    /// Variable-length gather to `root`: counts are exchanged first, then the
    /// payloads are collected into one partitioned buffer and split per rank.
    fn gather_varied(&self, local: &[f64], root: usize) -> Option<Vec<Vec<f64>>> {
        let root_process = self.world.process_at_rank(root as i32);
        let n = local.len() as Count;
        if self.rank == root {
            let mut counts = vec![0 as Count; self.size];
            root_process.gather_into_root(&n, &mut counts[..]);
            let displs: Vec<Count> = counts
                .iter()
                .scan(0, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect();
            let total: Count = counts.iter().sum();
            let mut buf = vec![0.0f64; total as usize];
            {
                let mut partition = PartitionMut::new(&mut buf[..], counts.clone(), &displs[..]);
                root_process.gather_varcount_into_root(local, &mut partition);
            }
            let mut out = Vec::with_capacity(self.size);
            for (count, displ) in counts.iter().zip(&displs) {
                let start = *displ as usize;
                out.push(buf[start..start + *count as usize].to_vec());
            }
            Some(out)
        } else {
            root_process.gather_into(&n);
            root_process.gather_varcount_into(local);
            None
        }
    }

    /// Broadcast from `root`: the length first, then the payload.
    fn broadcast(&self, buf: &mut Vec<f64>, root: usize) {
        let root_process = self.world.process_at_rank(root as i32);
        let mut len = buf.len() as u64;
        root_process.broadcast_into(&mut len);
        if self.rank != root {
            buf.resize(len as usize, 0.0);
        }
        root_process.broadcast_into(&mut buf[..]);
    }

    /// Blocking standard-mode send to `dest`.
    fn send(&self, buf: &[f64], dest: usize) {
        self.world.process_at_rank(dest as i32).send(buf);
    }

    /// Blocking receive from `src`; the payload length comes from the
    /// message status.
    fn recv(&self, src: usize) -> Vec<f64> {
        let (data, _status) = self.world.process_at_rank(src as i32).receive_vec::<f64>();
        data
    }
}
