//! Distributed Lloyd-iteration k-means.
//!
//! Each iteration assigns local rows to their nearest center, reduces the
//! per-center {count, coordinate-sum} accumulators globally, and re-derives
//! the centers on every rank, so the trajectory is identical for any process
//! count. Iteration stops at the cap or when no center moves farther than
//! the tolerance.

use crate::error::VsError;
use crate::parallel::Comm;
use crate::stats::model::{KMeansModel, StatisticalModel};
use crate::stats::{allreduce_sum, KMeansParams, TrainingSample};

pub(crate) fn learn_and_derive<C: Comm>(
    comm: &C,
    sample: &TrainingSample,
    params: &KMeansParams,
) -> Result<StatisticalModel, VsError> {
    let p = sample.ncols();
    let k = params.k;
    if k == 0 {
        return Err(VsError::Unsupported("k-means requires at least one cluster"));
    }
    let n_global = allreduce_sum(comm, vec![sample.nrows() as f64])?[0] as usize;
    if n_global < k {
        return Err(VsError::TooFewSamples { need: k, have: n_global });
    }

    let mut centers = initial_centers(comm, sample, k);
    let mut iterations = 0;
    let mut converged = false;
    while iterations < params.max_iterations {
        iterations += 1;
        let acc = allreduce_sum(comm, accumulate(sample, &centers))?;
        let mut movement: f64 = 0.0;
        let mut next = centers.clone();
        for (c, center) in next.iter_mut().enumerate() {
            let count = acc[c * (1 + p)];
            if count == 0.0 {
                // empty cluster keeps its previous center
                continue;
            }
            let sums = &acc[c * (1 + p) + 1..(c + 1) * (1 + p)];
            let mut dist2 = 0.0;
            for (d, slot) in center.iter_mut().enumerate() {
                let updated = sums[d] / count;
                dist2 += (updated - *slot) * (updated - *slot);
                *slot = updated;
            }
            movement = movement.max(dist2.sqrt());
        }
        centers = next;
        if movement <= params.tolerance {
            converged = true;
            break;
        }
    }

    // one final assignment pass for the global cardinalities
    let acc = allreduce_sum(comm, accumulate(sample, &centers))?;
    let cardinality: Vec<u64> = (0..k).map(|c| acc[c * (1 + p)] as u64).collect();

    Ok(StatisticalModel::KMeans(KMeansModel {
        columns: sample.columns.clone(),
        centers,
        cardinality,
        iterations,
        converged,
    }))
}

/// Per-center {count, coordinate sums}, flattened with stride `1 + p`.
fn accumulate(sample: &TrainingSample, centers: &[Vec<f64>]) -> Vec<f64> {
    let p = sample.ncols();
    let mut acc = vec![0.0; centers.len() * (1 + p)];
    for r in 0..sample.nrows() {
        let row = sample.row(r);
        let c = nearest(row, centers);
        acc[c * (1 + p)] += 1.0;
        for (d, &x) in row.iter().enumerate() {
            acc[c * (1 + p) + 1 + d] += x;
        }
    }
    acc
}

fn nearest(row: &[f64], centers: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let dist: f64 = row
            .iter()
            .zip(center)
            .map(|(&x, &c)| (x - c) * (x - c))
            .sum();
        if dist < best_dist {
            best = c;
            best_dist = dist;
        }
    }
    best
}

/// Deterministic seeding: the first `k` distinct rows in rank order. Ranks
/// offer up to `k` distinct local rows; the root keeps the first `k`
/// distinct overall and pads by repetition when fewer exist globally.
fn initial_centers<C: Comm>(comm: &C, sample: &TrainingSample, k: usize) -> Vec<Vec<f64>> {
    let p = sample.ncols();
    let mut offer: Vec<f64> = Vec::with_capacity(k * p);
    let mut distinct: Vec<&[f64]> = Vec::new();
    for r in 0..sample.nrows() {
        let row = sample.row(r);
        if !distinct.iter().any(|d| *d == row) {
            distinct.push(row);
            offer.extend_from_slice(row);
            if distinct.len() == k {
                break;
            }
        }
    }

    let mut chosen = Vec::new();
    if comm.size() <= 1 {
        chosen = offer;
    } else {
        if let Some(per_rank) = comm.gather_varied(&offer, 0) {
            let mut picked: Vec<Vec<f64>> = Vec::new();
            'outer: for payload in &per_rank {
                for row in payload.chunks_exact(p) {
                    if !picked.iter().any(|d| d.as_slice() == row) {
                        picked.push(row.to_vec());
                        if picked.len() == k {
                            break 'outer;
                        }
                    }
                }
            }
            chosen = picked.into_iter().flatten().collect();
        }
        comm.broadcast(&mut chosen, 0);
    }

    let mut centers: Vec<Vec<f64>> = chosen.chunks_exact(p).map(|c| c.to_vec()).collect();
    while centers.len() < k {
        let repeat = centers.last().cloned().unwrap_or_else(|| vec![0.0; p]);
        centers.push(repeat);
    }
    centers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::LocalComm;
    use approx::assert_abs_diff_eq;

    fn two_blobs() -> TrainingSample {
        let mut data = Vec::new();
        for i in 0..10 {
            let jitter = (i as f64) * 0.01;
            data.extend_from_slice(&[jitter, jitter]);
            data.extend_from_slice(&[10.0 + jitter, 10.0 + jitter]);
        }
        TrainingSample { columns: vec!["x".to_string(), "y".to_string()], data }
    }

    #[test]
    fn separates_two_blobs() {
        let comm = LocalComm::solo();
        let params = KMeansParams { k: 2, max_iterations: 20, tolerance: 1e-9 };
        let model = learn_and_derive(&comm, &two_blobs(), &params).unwrap();
        let StatisticalModel::KMeans(m) = model else { panic!() };
        assert!(m.converged);
        assert_eq!(m.cardinality, vec![10, 10]);
        let mut xs: Vec<f64> = m.centers.iter().map(|c| c[0]).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_abs_diff_eq!(xs[0], 0.045, epsilon = 1e-12);
        assert_abs_diff_eq!(xs[1], 10.045, epsilon = 1e-12);
    }

    #[test]
    fn too_few_rows_is_fatal() {
        let comm = LocalComm::solo();
        let sample = TrainingSample {
            columns: vec!["x".to_string()],
            data: vec![1.0, 2.0],
        };
        let params = KMeansParams { k: 3, ..KMeansParams::default() };
        let err = learn_and_derive(&comm, &sample, &params).unwrap_err();
        assert!(matches!(err, VsError::TooFewSamples { need: 3, have: 2 }));
    }
}
