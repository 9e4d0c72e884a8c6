//! Mergeable moment accumulators.
//!
//! Both the per-column and the multivariate accumulators support a pairwise
//! merge that is associative and commutative, so per-thread and per-rank
//! partials can be combined in any order and still reproduce the single-pass
//! result. The merge updates follow the parallel variance formulas of
//! Chan, Golub & LeVeque.

use crate::error::VsError;

/// Running {count, min, max, mean, M2} for one column.
#[derive(Clone, Copy, Debug)]
pub struct ColumnMoments {
    pub n: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub m2: f64,
}

impl ColumnMoments {
    pub fn empty() -> Self {
        ColumnMoments {
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
        }
    }

    pub fn fold(&mut self, x: f64) {
        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn merge(&mut self, other: &ColumnMoments) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let na = self.n as f64;
        let nb = other.n as f64;
        let n = na + nb;
        let delta = other.mean - self.mean;
        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.n += other.n;
    }

    /// Sample variance (n − 1 in the denominator), zero below two samples.
    pub fn variance(&self) -> f64 {
        if self.n < 2 { 0.0 } else { self.m2 / (self.n - 1) as f64 }
    }
}

pub const COLUMN_MOMENTS_STRIDE: usize = 5;

/// Flatten per-column moments for transport.
pub fn pack_column_moments(cols: &[ColumnMoments]) -> Vec<f64> {
    let mut out = Vec::with_capacity(cols.len() * COLUMN_MOMENTS_STRIDE);
    for c in cols {
        out.extend_from_slice(&[c.n as f64, c.min, c.max, c.mean, c.m2]);
    }
    out
}

pub fn unpack_column_moments(rows: &[f64]) -> Result<Vec<ColumnMoments>, VsError> {
    if rows.len() % COLUMN_MOMENTS_STRIDE != 0 {
        return Err(VsError::MalformedTable(format!(
            "moment payload length {} is not a multiple of {}",
            rows.len(),
            COLUMN_MOMENTS_STRIDE
        )));
    }
    Ok(rows
        .chunks_exact(COLUMN_MOMENTS_STRIDE)
        .map(|c| ColumnMoments {
            n: c[0] as u64,
            min: c[1],
            max: c[2],
            mean: c[3],
            m2: c[4],
        })
        .collect())
}

/// Running multivariate {count, means, co-moment matrix} over `p` columns.
/// The co-moment matrix is `Σ (x − mean)(x − mean)ᵀ`, stored row-major.
#[derive(Clone, Debug)]
pub struct CoMoments {
    pub n: u64,
    pub means: Vec<f64>,
    pub comoment: Vec<f64>,
}

impl CoMoments {
    pub fn empty(p: usize) -> Self {
        CoMoments { n: 0, means: vec![0.0; p], comoment: vec![0.0; p * p] }
    }

    pub fn ncols(&self) -> usize {
        self.means.len()
    }

    pub fn fold(&mut self, row: &[f64]) {
        let p = self.means.len();
        debug_assert_eq!(row.len(), p);
        self.n += 1;
        let inv = 1.0 / self.n as f64;
        let mut delta_old = vec![0.0; p];
        for j in 0..p {
            delta_old[j] = row[j] - self.means[j];
            self.means[j] += delta_old[j] * inv;
        }
        for j in 0..p {
            for k in 0..p {
                self.comoment[j * p + k] += delta_old[j] * (row[k] - self.means[k]);
            }
        }
    }

    pub fn merge(&mut self, other: &CoMoments) {
        let p = self.means.len();
        debug_assert_eq!(other.means.len(), p);
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other.clone();
            return;
        }
        let na = self.n as f64;
        let nb = other.n as f64;
        let n = na + nb;
        let scale = na * nb / n;
        let delta: Vec<f64> = (0..p).map(|j| other.means[j] - self.means[j]).collect();
        for j in 0..p {
            self.means[j] += delta[j] * nb / n;
        }
        for j in 0..p {
            for k in 0..p {
                self.comoment[j * p + k] += other.comoment[j * p + k] + delta[j] * delta[k] * scale;
            }
        }
        self.n += other.n;
    }

    /// Sample covariance between columns `j` and `k`.
    pub fn covariance(&self, j: usize, k: usize) -> f64 {
        let p = self.means.len();
        if self.n < 2 { 0.0 } else { self.comoment[j * p + k] / (self.n - 1) as f64 }
    }

    pub fn pack(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(1 + self.means.len() + self.comoment.len());
        out.push(self.n as f64);
        out.extend_from_slice(&self.means);
        out.extend_from_slice(&self.comoment);
        out
    }

    pub fn unpack(rows: &[f64], p: usize) -> Result<CoMoments, VsError> {
        if rows.len() != 1 + p + p * p {
            return Err(VsError::MalformedTable(format!(
                "co-moment payload length {} does not match {} columns",
                rows.len(),
                p
            )));
        }
        Ok(CoMoments {
            n: rows[0] as u64,
            means: rows[1..1 + p].to_vec(),
            comoment: rows[1 + p..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn column_merge_matches_single_pass() {
        let xs: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let mut whole = ColumnMoments::empty();
        for &x in &xs {
            whole.fold(x);
        }
        let mut left = ColumnMoments::empty();
        let mut right = ColumnMoments::empty();
        for &x in &xs[..33] {
            left.fold(x);
        }
        for &x in &xs[33..] {
            right.fold(x);
        }
        left.merge(&right);
        assert_eq!(left.n, whole.n);
        assert_abs_diff_eq!(left.mean, whole.mean, epsilon = 1e-12);
        assert_abs_diff_eq!(left.m2, whole.m2, epsilon = 1e-9);
        assert_abs_diff_eq!(left.min, whole.min);
        assert_abs_diff_eq!(left.max, whole.max);
    }

    #[test]
    fn comoment_merge_matches_single_pass() {
        let rows: Vec<[f64; 2]> = (0..60)
            .map(|i| {
                let t = i as f64 * 0.11;
                [t.sin(), t.cos() + 0.5 * t.sin()]
            })
            .collect();
        let mut whole = CoMoments::empty(2);
        for r in &rows {
            whole.fold(r);
        }
        let mut a = CoMoments::empty(2);
        let mut b = CoMoments::empty(2);
        for r in &rows[..25] {
            a.fold(r);
        }
        for r in &rows[25..] {
            b.fold(r);
        }
        a.merge(&b);
        assert_eq!(a.n, whole.n);
        for j in 0..2 {
            assert_abs_diff_eq!(a.means[j], whole.means[j], epsilon = 1e-12);
            for k in 0..2 {
                assert_abs_diff_eq!(
                    a.covariance(j, k),
                    whole.covariance(j, k),
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn pack_round_trip_checks_stride() {
        let mut m = ColumnMoments::empty();
        m.fold(2.0);
        let rows = pack_column_moments(&[m]);
        assert!(unpack_column_moments(&rows).is_ok());
        assert!(unpack_column_moments(&rows[..3]).is_err());
    }
}
