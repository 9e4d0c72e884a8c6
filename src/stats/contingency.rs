//! Contingency statistics: joint value counts for the first two requested
//! columns, with derived joint probabilities.

use std::collections::BTreeMap;

use crate::error::VsError;
use crate::parallel::Comm;
use crate::stats::model::{ContingencyModel, StatisticalModel};
use crate::stats::TrainingSample;

const ROW_STRIDE: usize = 3;

pub(crate) fn learn_and_derive<C: Comm>(
    comm: &C,
    sample: &TrainingSample,
) -> Result<StatisticalModel, VsError> {
    if sample.ncols() < 2 {
        return Err(VsError::Unsupported("contingency requires two columns"));
    }

    // keys are exact values; NaN pairs are skipped
    let mut counts: BTreeMap<(u64, u64), u64> = BTreeMap::new();
    for r in 0..sample.nrows() {
        let row = sample.row(r);
        let (x, y) = (row[0], row[1]);
        if x.is_nan() || y.is_nan() {
            continue;
        }
        *counts.entry((x.to_bits(), y.to_bits())).or_insert(0) += 1;
    }

    let counts = reduce_counts(comm, counts)?;

    let mut rows: Vec<(f64, f64, u64)> = counts
        .into_iter()
        .map(|((x, y), c)| (f64::from_bits(x), f64::from_bits(y), c))
        .collect();
    rows.sort_by(|a, b| {
        (a.0, a.1)
            .partial_cmp(&(b.0, b.1))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let total = rows.iter().map(|(_, _, c)| c).sum();

    Ok(StatisticalModel::Contingency(ContingencyModel {
        x: sample.columns[0].clone(),
        y: sample.columns[1].clone(),
        keys: rows.iter().map(|(x, y, _)| (*x, *y)).collect(),
        counts: rows.iter().map(|(_, _, c)| *c).collect(),
        total,
    }))
}

fn reduce_counts<C: Comm>(
    comm: &C,
    local: BTreeMap<(u64, u64), u64>,
) -> Result<BTreeMap<(u64, u64), u64>, VsError> {
    if comm.size() <= 1 {
        return Ok(local);
    }
    let packed: Vec<f64> = local
        .iter()
        .flat_map(|(&(x, y), &c)| [f64::from_bits(x), f64::from_bits(y), c as f64])
        .collect();
    let mut merged_rows = Vec::new();
    if let Some(per_rank) = comm.gather_varied(&packed, 0) {
        let mut acc: BTreeMap<(u64, u64), u64> = BTreeMap::new();
        for payload in per_rank {
            if payload.len() % ROW_STRIDE != 0 {
                return Err(VsError::MalformedTable(
                    "contingency payload length is not a row multiple".to_string(),
                ));
            }
            for row in payload.chunks_exact(ROW_STRIDE) {
                *acc.entry((row[0].to_bits(), row[1].to_bits())).or_insert(0) += row[2] as u64;
            }
        }
        merged_rows = acc
            .iter()
            .flat_map(|(&(x, y), &c)| [f64::from_bits(x), f64::from_bits(y), c as f64])
            .collect();
    }
    comm.broadcast(&mut merged_rows, 0);
    let mut out = BTreeMap::new();
    for row in merged_rows.chunks_exact(ROW_STRIDE) {
        out.insert((row[0].to_bits(), row[1].to_bits()), row[2] as u64);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::LocalComm;

    #[test]
    fn joint_counts_and_probabilities() {
        let comm = LocalComm::solo();
        let sample = TrainingSample {
            columns: vec!["a".to_string(), "b".to_string()],
            data: vec![1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0],
        };
        let model = learn_and_derive(&comm, &sample).unwrap();
        let StatisticalModel::Contingency(m) = model else { panic!() };
        assert_eq!(m.total, 4);
        assert_eq!(m.keys, vec![(1.0, 1.0), (1.0, 2.0), (2.0, 2.0)]);
        assert_eq!(m.counts, vec![2, 1, 1]);
        let tables = StatisticalModel::Contingency(m).extract_tables();
        let probs = tables[0].table.real_column("Probability").unwrap().to_vec();
        assert_eq!(probs, vec![0.5, 0.25, 0.25]);
    }

    #[test]
    fn one_column_is_rejected() {
        let comm = LocalComm::solo();
        let sample = TrainingSample { columns: vec!["a".to_string()], data: vec![1.0] };
        assert!(learn_and_derive(&comm, &sample).is_err());
    }
}
