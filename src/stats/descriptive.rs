//! Descriptive statistics: per-column {count, min, max, mean, M2} with a
//! variance/standard-deviation derive step.

use crate::error::VsError;
use crate::parallel::Comm;
use crate::stats::model::{DescriptiveModel, StatisticalModel};
use crate::stats::moments::{pack_column_moments, unpack_column_moments, ColumnMoments};
use crate::stats::TrainingSample;

pub(crate) fn learn_and_derive<C: Comm>(
    comm: &C,
    sample: &TrainingSample,
) -> Result<StatisticalModel, VsError> {
    let p = sample.ncols();
    let mut cols = vec![ColumnMoments::empty(); p];
    for r in 0..sample.nrows() {
        for (col, &x) in cols.iter_mut().zip(sample.row(r)) {
            col.fold(x);
        }
    }
    let cols = reduce_moments(comm, cols)?;
    Ok(StatisticalModel::Descriptive(DescriptiveModel {
        columns: sample.columns.clone(),
        moments: cols,
    }))
}

/// Merge per-rank column moments so every rank derives the same model.
fn reduce_moments<C: Comm>(
    comm: &C,
    local: Vec<ColumnMoments>,
) -> Result<Vec<ColumnMoments>, VsError> {
    if comm.size() <= 1 {
        return Ok(local);
    }
    let packed = pack_column_moments(&local);
    let mut merged = Vec::new();
    if let Some(per_rank) = comm.gather_varied(&packed, 0) {
        let mut acc = vec![ColumnMoments::empty(); local.len()];
        for payload in per_rank {
            let cols = unpack_column_moments(&payload)?;
            if cols.len() != acc.len() {
                return Err(VsError::MalformedTable(
                    "rank reported a different column count".to_string(),
                ));
            }
            for (a, c) in acc.iter_mut().zip(&cols) {
                a.merge(c);
            }
        }
        merged = pack_column_moments(&acc);
    }
    comm.broadcast(&mut merged, 0);
    unpack_column_moments(&merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::LocalComm;
    use approx::assert_abs_diff_eq;

    #[test]
    fn known_values() {
        let comm = LocalComm::solo();
        let sample = TrainingSample {
            columns: vec!["v".to_string()],
            data: vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0],
        };
        let model = learn_and_derive(&comm, &sample).unwrap();
        let StatisticalModel::Descriptive(m) = model else { panic!() };
        assert_eq!(m.moments[0].n, 8);
        assert_abs_diff_eq!(m.moments[0].mean, 5.0);
        assert_abs_diff_eq!(m.moments[0].min, 2.0);
        assert_abs_diff_eq!(m.moments[0].max, 9.0);
        // population M2 = 32, sample variance = 32/7
        assert_abs_diff_eq!(m.moments[0].variance(), 32.0 / 7.0, epsilon = 1e-12);
    }
}
