use std::ops::Range;
use std::sync::Arc;

/// Process-level collectives used by the reduction stages.
///
/// Every rank must call the same collective in the same order; this is a
/// caller precondition and is not validated beyond the natural deadlock.
pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Element-wise minimum across all ranks; every rank receives the result.
    /// `local` and `global` must have the same length on every rank.
    fn all_reduce_min(&self, local: &[i64], global: &mut [i64]);
    /// Variable-length gather. The root receives one payload per rank
    /// (its own included, indexed by rank); other ranks receive `None`.
    fn gather_varied(&self, local: &[f64], root: usize) -> Option<Vec<Vec<f64>>>;
    /// Broadcast `buf` from `root` to every rank, resizing as needed.
    fn broadcast(&self, buf: &mut Vec<f64>, root: usize);
    /// Blocking point-to-point send to `dest`.
    fn send(&self, buf: &[f64], dest: usize);
    /// Blocking point-to-point receive from `src`.
    fn recv(&self, src: usize) -> Vec<f64>;
}

pub mod local_comm;
pub use local_comm::LocalComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// Periodic progress callback, called with a fraction in [0, 1] by exactly
/// one worker of a thread-parallel pass.
pub type Progress = Arc<dyn Fn(f64) + Send + Sync>;

/// Worker-count hint for thread-parallel passes.
pub fn pieces_hint() -> usize {
    #[cfg(feature = "rayon")]
    {
        num_cpus::get().max(1)
    }
    #[cfg(not(feature = "rayon"))]
    {
        1
    }
}

/// Split `0..n` into at most `pieces` contiguous, non-empty ranges.
pub fn partition_ranges(n: usize, pieces: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let pieces = pieces.clamp(1, n);
    let base = n / pieces;
    let extra = n % pieces;
    let mut out = Vec::with_capacity(pieces);
    let mut start = 0;
    for p in 0..pieces {
        let len = base + usize::from(p < extra);
        out.push(start..start + len);
        start += len;
    }
    out
}

/// Fork-join map over contiguous ranges; results come back in range order.
pub fn map_ranges<T, F>(n: usize, pieces: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>) -> T + Sync + Send,
{
    let ranges = partition_ranges(n, pieces);
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        ranges.into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        ranges.into_iter().map(f).collect()
    }
}

/// Fork-join map over contiguous ranges followed by a pairwise reduction.
/// `combine` must be associative and commutative: the merge order is
/// unspecified. Returns `None` when `n` is zero.
pub fn reduce_ranges<T, F, R>(n: usize, pieces: usize, map: F, combine: R) -> Option<T>
where
    T: Send,
    F: Fn(Range<usize>) -> T + Sync + Send,
    R: Fn(T, T) -> T + Sync + Send,
{
    let ranges = partition_ranges(n, pieces);
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        ranges.into_par_iter().map(map).reduce_with(combine)
    }
    #[cfg(not(feature = "rayon"))]
    {
        ranges.into_iter().map(map).reduce(combine)
    }
}
