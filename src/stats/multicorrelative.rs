//! Multi-correlative statistics: means, covariance, and the lower Cholesky
//! factor of the covariance.

use faer::linalg::solvers::Llt;
use faer::{Mat, Side};

use crate::error::VsError;
use crate::parallel::Comm;
use crate::stats::model::{MultiCorrelativeModel, StatisticalModel};
use crate::stats::moments::CoMoments;
use crate::stats::TrainingSample;

pub(crate) fn learn_and_derive<C: Comm>(
    comm: &C,
    sample: &TrainingSample,
) -> Result<StatisticalModel, VsError> {
    let p = sample.ncols();
    let mut agg = CoMoments::empty(p);
    for r in 0..sample.nrows() {
        agg.fold(sample.row(r));
    }
    let agg = reduce_comoments(comm, agg)?;

    let covariance: Vec<f64> = (0..p * p)
        .map(|i| agg.covariance(i / p, i % p))
        .collect();
    let cholesky = lower_cholesky(&covariance, p)?;

    Ok(StatisticalModel::MultiCorrelative(MultiCorrelativeModel {
        columns: sample.columns.clone(),
        n: agg.n,
        means: agg.means.clone(),
        covariance,
        cholesky,
    }))
}

/// Merge per-rank multivariate aggregates so every rank derives the same
/// model. The pairwise merge is associative and commutative, so the rank
/// visit order on the root is immaterial.
pub(crate) fn reduce_comoments<C: Comm>(
    comm: &C,
    local: CoMoments,
) -> Result<CoMoments, VsError> {
    if comm.size() <= 1 {
        return Ok(local);
    }
    let p = local.ncols();
    let mut merged = Vec::new();
    if let Some(per_rank) = comm.gather_varied(&local.pack(), 0) {
        let mut acc = CoMoments::empty(p);
        for payload in per_rank {
            let part = CoMoments::unpack(&payload, p)?;
            acc.merge(&part);
        }
        merged = acc.pack();
    }
    comm.broadcast(&mut merged, 0);
    CoMoments::unpack(&merged, p)
}

fn lower_cholesky(covariance: &[f64], p: usize) -> Result<Vec<f64>, VsError> {
    let mat = Mat::from_fn(p, p, |i, j| covariance[i * p + j]);
    let llt = Llt::new(mat.as_ref(), Side::Lower)
        .map_err(|_| VsError::FactorError("covariance is not positive definite".to_string()))?;
    let l = llt.L();
    let mut out = vec![0.0; p * p];
    for i in 0..p {
        for j in 0..=i {
            out[i * p + j] = l[(i, j)];
        }
    }
    Ok(out)
}
