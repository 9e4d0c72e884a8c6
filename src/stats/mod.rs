//! Statistics engine: training-sample selection, strategy dispatch, and the
//! cross-rank reductions behind each strategy.
//!
//! The engine is agnostic to the statistical computation. A run reconciles
//! the requested arrays across ranks, assembles the local training table,
//! samples it down to the training fraction, and hands the sample to the
//! strategy selected by the `Statistics` variant. Each strategy merges its
//! LEARN aggregates globally before deriving, so every rank ends up with the
//! same model for any process count.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::StatsOptions;
use crate::data::{Association, DataSet};
use crate::error::VsError;
use crate::parallel::Comm;

pub mod model;
pub mod moments;
pub mod reconcile;

mod contingency;
mod descriptive;
mod kmeans;
mod multicorrelative;
mod pca;

pub use model::{
    ContingencyModel, DescriptiveModel, KMeansModel, MultiCorrelativeModel, PcaModel,
    StatisticalModel,
};
pub use reconcile::{reconcile_components, GlobalComponentMap, NO_LOCAL_DATA};

/// Covariance normalization applied before the PCA eigendecomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationScheme {
    None,
    /// Scale entry (j, k) by the inverse geometric mean of the (j, j) and
    /// (k, k) variances.
    DiagonalVariance,
}

/// How many basis vectors a PCA model retains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BasisScheme {
    Full,
    FixedSize(usize),
    /// Smallest leading basis whose eigenvalue sum reaches this fraction of
    /// the total energy.
    FixedEnergy(f64),
}

/// PCA strategy parameters.
#[derive(Debug, Clone)]
pub struct PcaParams {
    pub normalization: NormalizationScheme,
    pub basis: BasisScheme,
    /// Center about a cross-rank median instead of the mean.
    pub robust: bool,
}

impl Default for PcaParams {
    fn default() -> Self {
        PcaParams {
            normalization: NormalizationScheme::None,
            basis: BasisScheme::Full,
            robust: false,
        }
    }
}

/// K-means strategy parameters.
#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        KMeansParams { k: 5, max_iterations: 50, tolerance: 0.01 }
    }
}

/// The closed set of statistics strategies.
#[derive(Debug, Clone)]
pub enum Statistics {
    Descriptive,
    MultiCorrelative,
    Pca(PcaParams),
    KMeans(KMeansParams),
    Contingency,
}

/// A numeric training table: named columns over row-major storage.
#[derive(Clone, Debug)]
pub struct TrainingSample {
    pub columns: Vec<String>,
    pub data: Vec<f64>,
}

impl TrainingSample {
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn nrows(&self) -> usize {
        if self.columns.is_empty() { 0 } else { self.data.len() / self.columns.len() }
    }

    pub fn row(&self, r: usize) -> &[f64] {
        let p = self.ncols();
        &self.data[r * p..(r + 1) * p]
    }
}

/// The statistics engine shell: sampling plus strategy dispatch.
pub struct StatsEngine {
    pub options: StatsOptions,
}

impl StatsEngine {
    pub fn new(options: StatsOptions) -> Self {
        StatsEngine { options }
    }

    /// LEARN + DERIVE over a training sample of the dataset's rows.
    ///
    /// Requests whose association differs from `association` are ignored;
    /// the rest are reconciled across ranks first, so a rank with partial
    /// or absent data never causes an out-of-bounds access elsewhere.
    pub fn learn_and_derive<C: Comm>(
        &self,
        comm: &C,
        kind: &Statistics,
        data: &DataSet,
        requests: &crate::data::RequestList,
        association: Association,
    ) -> Result<StatisticalModel, VsError> {
        let components = reconcile_components(comm, requests, data);
        if components.is_empty() {
            return Err(VsError::EmptySelection);
        }
        let full = assemble_rows(data, &components, association);
        if full.columns.is_empty() {
            return Err(VsError::EmptySelection);
        }
        let sample = self.sample_rows(full);
        run_statistics(comm, kind, &sample)
    }

    /// Bernoulli row selection followed by random add/remove adjustment to
    /// exactly `round(training_fraction · nrows)` rows.
    fn sample_rows(&self, full: TrainingSample) -> TrainingSample {
        let n = full.nrows();
        let fraction = self.options.training_fraction.clamp(0.0, 1.0);
        if fraction >= 1.0 || n == 0 {
            return full;
        }
        let target = (fraction * n as f64).round() as usize;
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut selected: Vec<bool> = (0..n).map(|_| rng.gen_bool(fraction)).collect();
        let mut count = selected.iter().filter(|&&s| s).count();
        while count > target {
            let i = rng.gen_range(0..n);
            if selected[i] {
                selected[i] = false;
                count -= 1;
            }
        }
        while count < target {
            let i = rng.gen_range(0..n);
            if !selected[i] {
                selected[i] = true;
                count += 1;
            }
        }
        let p = full.ncols();
        let mut data = Vec::with_capacity(target * p);
        for (r, keep) in selected.iter().enumerate() {
            if *keep {
                data.extend_from_slice(full.row(r));
            }
        }
        TrainingSample { columns: full.columns, data }
    }
}

/// Dispatch a training sample to the selected strategy.
pub fn run_statistics<C: Comm>(
    comm: &C,
    kind: &Statistics,
    sample: &TrainingSample,
) -> Result<StatisticalModel, VsError> {
    match kind {
        Statistics::Descriptive => descriptive::learn_and_derive(comm, sample),
        Statistics::MultiCorrelative => multicorrelative::learn_and_derive(comm, sample),
        Statistics::Pca(params) => pca::learn_and_derive(comm, sample, params),
        Statistics::KMeans(params) => kmeans::learn_and_derive(comm, sample, params),
        Statistics::Contingency => contingency::learn_and_derive(comm, sample),
    }
}

/// Assemble the local training table over the reconciled arrays of one
/// association. Ghost elements are skipped; leaves missing any reconciled
/// array contribute no rows.
fn assemble_rows(
    data: &DataSet,
    components: &GlobalComponentMap,
    association: Association,
) -> TrainingSample {
    let selected: Vec<(&crate::data::AttributeRequest, usize)> = components
        .iter()
        .filter(|(req, _)| req.association == association)
        .collect();

    let mut columns = Vec::new();
    for (req, c) in &selected {
        if *c == 1 {
            columns.push(req.name.clone());
        } else {
            for i in 0..*c {
                columns.push(format!("{}_{}", req.name, i));
            }
        }
    }

    let mut rows = Vec::new();
    for leaf in data.leaves() {
        let n = leaf.element_count(association);
        if n == 0 {
            continue;
        }
        let Some(atts) = leaf.attributes(association) else {
            continue;
        };
        let arrays: Option<Vec<&crate::data::AttributeArray>> =
            selected.iter().map(|(req, _)| atts.get(&req.name)).collect();
        let Some(arrays) = arrays else {
            continue;
        };
        for t in 0..n {
            if atts.is_ghost(t) {
                continue;
            }
            for ((_, c), array) in selected.iter().zip(&arrays) {
                for comp in 0..*c {
                    rows.push(array.component(t, comp));
                }
            }
        }
    }
    TrainingSample { columns, data: rows }
}

/// Element-wise sum across all ranks; every rank receives the result.
pub(crate) fn allreduce_sum<C: Comm>(comm: &C, local: Vec<f64>) -> Result<Vec<f64>, VsError> {
    if comm.size() <= 1 {
        return Ok(local);
    }
    let len = local.len();
    let mut merged = Vec::new();
    if let Some(per_rank) = comm.gather_varied(&local, 0) {
        let mut acc = vec![0.0; len];
        for payload in per_rank {
            if payload.len() != len {
                return Err(VsError::MalformedTable(
                    "rank reported a different accumulator length".to_string(),
                ));
            }
            for (a, x) in acc.iter_mut().zip(payload) {
                *a += x;
            }
        }
        merged = acc;
    }
    comm.broadcast(&mut merged, 0);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsOptions;
    use crate::data::{AttributeArray, ImageData, RequestList};
    use crate::parallel::LocalComm;

    fn fixture() -> DataSet {
        let mut img = ImageData::new([3, 3, 3], [0.0; 3], [1.0; 3]);
        let n = img.num_points();
        img.point_data.insert(AttributeArray::real(
            "density",
            1,
            (0..n).map(|i| i as f64).collect(),
        ));
        DataSet::Image(img)
    }

    #[test]
    fn sampling_hits_exact_target() {
        let engine = StatsEngine::new(StatsOptions { training_fraction: 0.25, seed: 7 });
        let full = TrainingSample {
            columns: vec!["v".to_string()],
            data: (0..1000).map(|i| i as f64).collect(),
        };
        let sample = engine.sample_rows(full);
        assert_eq!(sample.nrows(), 250);
    }

    #[test]
    fn full_fraction_keeps_everything() {
        let engine = StatsEngine::new(StatsOptions { training_fraction: 1.0, seed: 7 });
        let full = TrainingSample {
            columns: vec!["v".to_string()],
            data: (0..10).map(|i| i as f64).collect(),
        };
        assert_eq!(engine.sample_rows(full).nrows(), 10);
    }

    #[test]
    fn engine_runs_descriptive_end_to_end() {
        let comm = LocalComm::solo();
        let engine = StatsEngine::new(StatsOptions { training_fraction: 1.0, seed: 1 });
        let mut requests = RequestList::new();
        requests.add("density", Association::Point);
        let model = engine
            .learn_and_derive(
                &comm,
                &Statistics::Descriptive,
                &fixture(),
                &requests,
                Association::Point,
            )
            .unwrap();
        let StatisticalModel::Descriptive(m) = model else { panic!() };
        assert_eq!(m.moments[0].n, 27);
        assert_eq!(m.moments[0].min, 0.0);
        assert_eq!(m.moments[0].max, 26.0);
    }

    #[test]
    fn ghost_rows_are_excluded() {
        let mut img = ImageData::new([2, 2, 1], [0.0; 3], [1.0; 3]);
        img.point_data
            .insert(AttributeArray::real("v", 1, vec![1.0, 2.0, 3.0, 100.0]));
        img.point_data.ghost = Some(vec![0, 0, 0, 1]);
        let comm = LocalComm::solo();
        let engine = StatsEngine::new(StatsOptions { training_fraction: 1.0, seed: 1 });
        let mut requests = RequestList::new();
        requests.add("v", Association::Point);
        let model = engine
            .learn_and_derive(
                &comm,
                &Statistics::Descriptive,
                &DataSet::Image(img),
                &requests,
                Association::Point,
            )
            .unwrap();
        let StatisticalModel::Descriptive(m) = model else { panic!() };
        assert_eq!(m.moments[0].n, 3);
        assert_eq!(m.moments[0].max, 3.0);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let comm = LocalComm::solo();
        let engine = StatsEngine::new(StatsOptions::default());
        let requests = RequestList::new();
        let err = engine
            .learn_and_derive(
                &comm,
                &Statistics::Descriptive,
                &fixture(),
                &requests,
                Association::Point,
            )
            .unwrap_err();
        assert!(matches!(err, VsError::EmptySelection));
    }
}
