//! Label-keyed weighted barycenters.
//!
//! `ClusterMoment::merge` is the single most important correctness invariant
//! of the cluster engines: it is associative and commutative, so folding any
//! partition of the input samples in any order — per thread, per rank, or in
//! one pass — produces the same {count, barycenter} pair per label. Every
//! reduction stage in this module family relies on that property.

use std::collections::BTreeMap;

use crate::error::VsError;

/// Running {count, barycenter} of one material cluster.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClusterMoment {
    pub weight: u64,
    pub center: [f64; 3],
}

impl ClusterMoment {
    pub fn from_point(p: [f64; 3]) -> Self {
        ClusterMoment { weight: 1, center: p }
    }

    /// Weighted-average merge:
    /// `center ← (w₁·c₁ + w₂·c₂) / (w₁ + w₂)`, `weight ← w₁ + w₂`.
    pub fn merge(&mut self, other: &ClusterMoment) {
        if other.weight == 0 {
            return;
        }
        if self.weight == 0 {
            *self = *other;
            return;
        }
        let wa = self.weight as f64;
        let wb = other.weight as f64;
        let inv = 1.0 / (wa + wb);
        for (c, o) in self.center.iter_mut().zip(other.center) {
            *c = (wa * *c + wb * o) * inv;
        }
        self.weight += other.weight;
    }
}

/// Flat-row stride: label, weight, center x/y/z.
pub const ROW_STRIDE: usize = 5;

/// Map from material label to its running cluster moment. Iteration order is
/// ascending label, so exported tables are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelValuesMap {
    entries: BTreeMap<i64, ClusterMoment>,
}

impl LabelValuesMap {
    pub fn new() -> Self {
        LabelValuesMap { entries: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: i64) -> Option<&ClusterMoment> {
        self.entries.get(&label)
    }

    pub fn labels(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &ClusterMoment)> {
        self.entries.iter().map(|(&l, m)| (l, m))
    }

    /// Fold one sample position into the map.
    pub fn fold_point(&mut self, label: i64, p: [f64; 3]) {
        self.entries
            .entry(label)
            .or_default()
            .merge(&ClusterMoment::from_point(p));
    }

    /// Insert a whole cluster moment (used when trusting upstream tables).
    pub fn insert(&mut self, label: i64, moment: ClusterMoment) {
        self.entries.insert(label, moment);
    }

    /// Entry-wise merge of two maps.
    pub fn merge(mut self, other: LabelValuesMap) -> LabelValuesMap {
        for (label, moment) in other.entries {
            self.entries.entry(label).or_default().merge(&moment);
        }
        self
    }

    /// Restrict to the given labels.
    pub fn filtered<F: Fn(i64) -> bool>(&self, keep: F) -> LabelValuesMap {
        LabelValuesMap {
            entries: self
                .entries
                .iter()
                .filter(|&(&l, _)| keep(l))
                .map(|(&l, m)| (l, *m))
                .collect(),
        }
    }

    /// Flatten for transport, stride [`ROW_STRIDE`].
    pub fn to_rows(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.entries.len() * ROW_STRIDE);
        for (&label, m) in &self.entries {
            out.push(label as f64);
            out.push(m.weight as f64);
            out.extend_from_slice(&m.center);
        }
        out
    }

    /// Rebuild from a flat payload; a length that is not a stride multiple
    /// marks a malformed sub-table.
    pub fn from_rows(rows: &[f64]) -> Result<LabelValuesMap, VsError> {
        if rows.len() % ROW_STRIDE != 0 {
            return Err(VsError::MalformedTable(format!(
                "payload length {} is not a multiple of {}",
                rows.len(),
                ROW_STRIDE
            )));
        }
        let mut map = LabelValuesMap::new();
        for row in rows.chunks_exact(ROW_STRIDE) {
            map.insert(
                row[0] as i64,
                ClusterMoment { weight: row[1] as u64, center: [row[2], row[3], row[4]] },
            );
        }
        Ok(map)
    }
}
