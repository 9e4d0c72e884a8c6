//! Statistical models and their export into flat named tables.
//!
//! A model is created fresh by one engine run and never mutated afterwards.
//! `extract_tables` is the only representation downstream consumers see: a
//! deterministic, pure conversion into named tables with named columns, so
//! serializers and inspectors need no knowledge of the per-kind internals.

use crate::data::{Column, NamedTable, Table};
use crate::stats::moments::ColumnMoments;

/// Descriptive statistics per requested column.
#[derive(Clone, Debug)]
pub struct DescriptiveModel {
    pub columns: Vec<String>,
    pub moments: Vec<ColumnMoments>,
}

/// Means, covariance and its lower Cholesky factor over the requested
/// columns; matrices are row-major `p × p`.
#[derive(Clone, Debug)]
pub struct MultiCorrelativeModel {
    pub columns: Vec<String>,
    pub n: u64,
    pub means: Vec<f64>,
    pub covariance: Vec<f64>,
    pub cholesky: Vec<f64>,
}

/// Principal-component basis of the (optionally normalized) covariance.
/// Eigenvalues are in descending order; `basis[b]` is the b-th basis vector
/// over the requested columns.
#[derive(Clone, Debug)]
pub struct PcaModel {
    pub columns: Vec<String>,
    pub means: Vec<f64>,
    pub eigenvalues: Vec<f64>,
    pub basis: Vec<Vec<f64>>,
}

/// K-means cluster centers and per-cluster populations.
#[derive(Clone, Debug)]
pub struct KMeansModel {
    pub columns: Vec<String>,
    pub centers: Vec<Vec<f64>>,
    pub cardinality: Vec<u64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Joint value counts for one column pair.
#[derive(Clone, Debug)]
pub struct ContingencyModel {
    pub x: String,
    pub y: String,
    pub keys: Vec<(f64, f64)>,
    pub counts: Vec<u64>,
    pub total: u64,
}

/// The opaque result of one statistics-engine run.
#[derive(Clone, Debug)]
pub enum StatisticalModel {
    Descriptive(DescriptiveModel),
    MultiCorrelative(MultiCorrelativeModel),
    Pca(PcaModel),
    KMeans(KMeansModel),
    Contingency(ContingencyModel),
}

impl StatisticalModel {
    /// Convert the model into an ordered collection of flat named tables.
    pub fn extract_tables(&self) -> Vec<NamedTable> {
        match self {
            StatisticalModel::Descriptive(m) => extract_descriptive(m),
            StatisticalModel::MultiCorrelative(m) => extract_multicorrelative(m),
            StatisticalModel::Pca(m) => extract_pca(m),
            StatisticalModel::KMeans(m) => extract_kmeans(m),
            StatisticalModel::Contingency(m) => extract_contingency(m),
        }
    }
}

fn variable_column(names: &[String]) -> Column {
    Column::Str(names.to_vec())
}

fn extract_descriptive(m: &DescriptiveModel) -> Vec<NamedTable> {
    let mut primary = Table::new();
    primary.set_column("Variable", variable_column(&m.columns));
    primary.set_column(
        "Cardinality",
        Column::Int(m.moments.iter().map(|c| c.n as i64).collect()),
    );
    primary.set_column("Minimum", Column::Real(m.moments.iter().map(|c| c.min).collect()));
    primary.set_column("Maximum", Column::Real(m.moments.iter().map(|c| c.max).collect()));
    primary.set_column("Mean", Column::Real(m.moments.iter().map(|c| c.mean).collect()));
    primary.set_column("M2", Column::Real(m.moments.iter().map(|c| c.m2).collect()));

    let mut derived = Table::new();
    derived.set_column("Variable", variable_column(&m.columns));
    derived.set_column(
        "Variance",
        Column::Real(m.moments.iter().map(|c| c.variance()).collect()),
    );
    derived.set_column(
        "StandardDeviation",
        Column::Real(m.moments.iter().map(|c| c.variance().sqrt()).collect()),
    );

    vec![NamedTable::new("Primary", primary), NamedTable::new("Derived", derived)]
}

fn matrix_table(names: &[String], matrix: &[f64]) -> Table {
    let p = names.len();
    let mut t = Table::new();
    t.set_column("Variable", variable_column(names));
    for (k, name) in names.iter().enumerate() {
        let col: Vec<f64> = (0..p).map(|j| matrix[j * p + k]).collect();
        t.set_column(name, Column::Real(col));
    }
    t
}

fn extract_multicorrelative(m: &MultiCorrelativeModel) -> Vec<NamedTable> {
    let mut means = Table::new();
    means.set_column("Variable", variable_column(&m.columns));
    means.set_column("Cardinality", Column::Int(vec![m.n as i64; m.columns.len()]));
    means.set_column("Mean", Column::Real(m.means.clone()));
    vec![
        NamedTable::new("Means", means),
        NamedTable::new("Covariance", matrix_table(&m.columns, &m.covariance)),
        NamedTable::new("Cholesky", matrix_table(&m.columns, &m.cholesky)),
    ]
}

fn extract_pca(m: &PcaModel) -> Vec<NamedTable> {
    let mut means = Table::new();
    means.set_column("Variable", variable_column(&m.columns));
    means.set_column("Mean", Column::Real(m.means.clone()));

    let mut eigenvalues = Table::new();
    eigenvalues.set_column(
        "Basis",
        Column::Int((0..m.eigenvalues.len() as i64).collect()),
    );
    eigenvalues.set_column("Eigenvalue", Column::Real(m.eigenvalues.clone()));

    let mut vectors = Table::new();
    vectors.set_column("Basis", Column::Int((0..m.basis.len() as i64).collect()));
    for (k, name) in m.columns.iter().enumerate() {
        let col: Vec<f64> = m.basis.iter().map(|v| v[k]).collect();
        vectors.set_column(name, Column::Real(col));
    }

    vec![
        NamedTable::new("Means", means),
        NamedTable::new("Eigenvalues", eigenvalues),
        NamedTable::new("Eigenvectors", vectors),
    ]
}

fn extract_kmeans(m: &KMeansModel) -> Vec<NamedTable> {
    let mut centers = Table::new();
    centers.set_column("ClusterId", Column::Int((0..m.centers.len() as i64).collect()));
    centers.set_column(
        "Cardinality",
        Column::Int(m.cardinality.iter().map(|&c| c as i64).collect()),
    );
    for (k, name) in m.columns.iter().enumerate() {
        let col: Vec<f64> = m.centers.iter().map(|c| c[k]).collect();
        centers.set_column(name, Column::Real(col));
    }

    let mut summary = Table::new();
    summary.set_column("Iterations", Column::Int(vec![m.iterations as i64]));
    summary.set_column("Converged", Column::Int(vec![i64::from(m.converged)]));

    vec![NamedTable::new("Centers", centers), NamedTable::new("Summary", summary)]
}

fn extract_contingency(m: &ContingencyModel) -> Vec<NamedTable> {
    let mut t = Table::new();
    t.set_column(&m.x, Column::Real(m.keys.iter().map(|k| k.0).collect()));
    t.set_column(&m.y, Column::Real(m.keys.iter().map(|k| k.1).collect()));
    t.set_column(
        "Cardinality",
        Column::Int(m.counts.iter().map(|&c| c as i64).collect()),
    );
    let total = m.total.max(1) as f64;
    t.set_column(
        "Probability",
        Column::Real(m.counts.iter().map(|&c| c as f64 / total).collect()),
    );
    vec![NamedTable::new("Contingency", t)]
}
