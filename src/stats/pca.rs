//! Principal component analysis over the multi-correlative aggregates.
//!
//! LEARN accumulates the same multivariate moments as the multi-correlative
//! strategy; DERIVE centers them (about the mean, or a robust cross-rank
//! median), optionally normalizes the matrix, and eigendecomposes it into a
//! descending-eigenvalue basis truncated per the basis scheme.

use faer::linalg::solvers::SelfAdjointEigen;
use faer::{Mat, Side};

use crate::error::VsError;
use crate::parallel::Comm;
use crate::stats::model::{PcaModel, StatisticalModel};
use crate::stats::moments::CoMoments;
use crate::stats::multicorrelative::reduce_comoments;
use crate::stats::{BasisScheme, NormalizationScheme, PcaParams, TrainingSample};

pub(crate) fn learn_and_derive<C: Comm>(
    comm: &C,
    sample: &TrainingSample,
    params: &PcaParams,
) -> Result<StatisticalModel, VsError> {
    let p = sample.ncols();
    let mut agg = CoMoments::empty(p);
    for r in 0..sample.nrows() {
        agg.fold(sample.row(r));
    }
    let agg = reduce_comoments(comm, agg)?;
    if agg.n < 2 {
        return Err(VsError::TooFewSamples { need: 2, have: agg.n as usize });
    }

    let center = if params.robust {
        robust_center(comm, sample)
    } else {
        agg.means.clone()
    };

    // Second moment about the chosen center:
    // Σ (x − c)(x − c)ᵀ = comoment + n (mean − c)(mean − c)ᵀ
    let nf = agg.n as f64;
    let mut scatter = vec![0.0; p * p];
    for j in 0..p {
        for k in 0..p {
            let shift = nf * (agg.means[j] - center[j]) * (agg.means[k] - center[k]);
            scatter[j * p + k] = (agg.comoment[j * p + k] + shift) / (nf - 1.0);
        }
    }

    if let NormalizationScheme::DiagonalVariance = params.normalization {
        let diag: Vec<f64> = (0..p)
            .map(|j| {
                let d = scatter[j * p + j];
                if d > 0.0 { d.sqrt() } else { 1.0 }
            })
            .collect();
        for j in 0..p {
            for k in 0..p {
                scatter[j * p + k] /= diag[j] * diag[k];
            }
        }
    }

    let (eigenvalues, basis) = eigen_basis(&scatter, p, &params.basis)?;
    Ok(StatisticalModel::Pca(PcaModel {
        columns: sample.columns.clone(),
        means: center,
        eigenvalues,
        basis,
    }))
}

/// Cross-rank robust center: each rank contributes its per-column sample
/// median with its row count as weight; the root takes the weighted median
/// of the rank medians and broadcasts it.
fn robust_center<C: Comm>(comm: &C, sample: &TrainingSample) -> Vec<f64> {
    let p = sample.ncols();
    let local_median: Vec<f64> = (0..p)
        .map(|c| {
            let mut v: Vec<f64> = (0..sample.nrows()).map(|r| sample.row(r)[c]).collect();
            v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            if v.is_empty() {
                0.0
            } else {
                v[v.len() / 2]
            }
        })
        .collect();
    if comm.size() <= 1 {
        return local_median;
    }
    let mut payload = Vec::with_capacity(1 + p);
    payload.push(sample.nrows() as f64);
    payload.extend_from_slice(&local_median);
    let mut center = Vec::new();
    if let Some(per_rank) = comm.gather_varied(&payload, 0) {
        let parts: Vec<&[f64]> = per_rank
            .iter()
            .filter(|b| b.len() == 1 + p && b[0] > 0.0)
            .map(|b| b.as_slice())
            .collect();
        center = (0..p).map(|c| weighted_median(&parts, c)).collect();
    }
    comm.broadcast(&mut center, 0);
    center
}

fn weighted_median(parts: &[&[f64]], column: usize) -> f64 {
    let mut pairs: Vec<(f64, f64)> = parts.iter().map(|b| (b[1 + column], b[0])).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let mut acc = 0.0;
    for (value, weight) in &pairs {
        acc += weight;
        if acc * 2.0 >= total {
            return *value;
        }
    }
    pairs.last().map(|(v, _)| *v).unwrap_or(0.0)
}

fn eigen_basis(
    matrix: &[f64],
    p: usize,
    scheme: &BasisScheme,
) -> Result<(Vec<f64>, Vec<Vec<f64>>), VsError> {
    let mat = Mat::from_fn(p, p, |i, j| matrix[i * p + j]);
    let evd = SelfAdjointEigen::new(mat.as_ref(), Side::Lower).map_err(|_| VsError::EigenFailure)?;
    let s = evd.S();
    let u = evd.U();
    let eigenvalues = s.column_vector();
    let mut pairs: Vec<(f64, Vec<f64>)> = (0..p)
        .map(|i| (eigenvalues[i], (0..p).map(|j| u[(j, i)]).collect()))
        .collect();
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let keep = match scheme {
        BasisScheme::Full => p,
        BasisScheme::FixedSize(k) => (*k).clamp(1, p),
        BasisScheme::FixedEnergy(energy) => {
            let energy = energy.clamp(0.0, 1.0);
            let total: f64 = pairs.iter().map(|(l, _)| l.max(0.0)).sum();
            if total <= 0.0 {
                1
            } else {
                let mut acc = 0.0;
                let mut keep = p;
                for (i, (l, _)) in pairs.iter().enumerate() {
                    acc += l.max(0.0);
                    if acc / total >= energy {
                        keep = i + 1;
                        break;
                    }
                }
                keep
            }
        }
    };
    pairs.truncate(keep);
    Ok(pairs.into_iter().unzip())
}
