//! Distributed statistics strategies vs their serial counterparts.

use approx::assert_abs_diff_eq;
use std::thread;
use voxstat::config::StatsOptions;
use voxstat::data::{Association, AttributeArray, DataSet, ImageData, RequestList};
use voxstat::parallel::{Comm, LocalComm};
use voxstat::stats::{
    run_statistics, KMeansParams, StatisticalModel, Statistics, StatsEngine, TrainingSample,
};

fn sample_from(columns: &[&str], data: Vec<f64>) -> TrainingSample {
    TrainingSample {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        data,
    }
}

/// Split `data` row-wise into `size` chunks and run the strategy on
/// simulated ranks; returns the (identical) model from rank 0.
fn run_partitioned(
    kind: Statistics,
    columns: &'static [&'static str],
    data: Vec<f64>,
    size: usize,
) -> StatisticalModel {
    let p = columns.len();
    let nrows = data.len() / p;
    let per_rank = nrows.div_ceil(size);
    let comms = LocalComm::split(size);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let kind = kind.clone();
            let start = (comm.rank() * per_rank).min(nrows);
            let end = ((comm.rank() + 1) * per_rank).min(nrows);
            let chunk = data[start * p..end * p].to_vec();
            thread::spawn(move || {
                let sample = sample_from(columns, chunk);
                (comm.rank(), run_statistics(&comm, &kind, &sample).unwrap())
            })
        })
        .collect();
    let mut root = None;
    for h in handles {
        let (rank, model) = h.join().unwrap();
        if rank == 0 {
            root = Some(model);
        }
    }
    root.unwrap()
}

#[test]
fn descriptive_is_process_count_invariant() {
    let data: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64).collect();
    let serial = run_statistics(
        &LocalComm::solo(),
        &Statistics::Descriptive,
        &sample_from(&["v"], data.clone()),
    )
    .unwrap();
    let StatisticalModel::Descriptive(serial) = serial else { panic!() };

    for size in [2, 4] {
        let model = run_partitioned(Statistics::Descriptive, &["v"], data.clone(), size);
        let StatisticalModel::Descriptive(m) = model else { panic!() };
        assert_eq!(m.moments[0].n, serial.moments[0].n);
        assert_abs_diff_eq!(m.moments[0].mean, serial.moments[0].mean, epsilon = 1e-10);
        assert_abs_diff_eq!(m.moments[0].m2, serial.moments[0].m2, epsilon = 1e-7);
        assert_eq!(m.moments[0].min, serial.moments[0].min);
        assert_eq!(m.moments[0].max, serial.moments[0].max);
    }
}

#[test]
fn kmeans_is_process_count_invariant() {
    // two tight blobs; seeding takes the first two distinct rows in rank order
    let mut data = Vec::new();
    for i in 0..12 {
        let j = i as f64 * 0.01;
        data.extend_from_slice(&[j, j]);
    }
    for i in 0..12 {
        let j = i as f64 * 0.01;
        data.extend_from_slice(&[8.0 + j, 8.0 + j]);
    }
    let params = KMeansParams { k: 2, max_iterations: 30, tolerance: 1e-9 };

    let serial = run_statistics(
        &LocalComm::solo(),
        &Statistics::KMeans(params.clone()),
        &sample_from(&["x", "y"], data.clone()),
    )
    .unwrap();
    let StatisticalModel::KMeans(serial) = serial else { panic!() };
    assert_eq!(serial.cardinality, vec![12, 12]);

    let model = run_partitioned(Statistics::KMeans(params), &["x", "y"], data, 3);
    let StatisticalModel::KMeans(m) = model else { panic!() };
    assert_eq!(m.cardinality, serial.cardinality);
    for (a, b) in m.centers.iter().zip(&serial.centers) {
        for d in 0..2 {
            assert_abs_diff_eq!(a[d], b[d], epsilon = 1e-9);
        }
    }
}

#[test]
fn contingency_counts_merge_exactly() {
    let mut data = Vec::new();
    for i in 0..30 {
        data.extend_from_slice(&[(i % 3) as f64, (i % 2) as f64]);
    }
    let serial = run_statistics(
        &LocalComm::solo(),
        &Statistics::Contingency,
        &sample_from(&["a", "b"], data.clone()),
    )
    .unwrap();
    let StatisticalModel::Contingency(serial) = serial else { panic!() };
    assert_eq!(serial.total, 30);

    let model = run_partitioned(Statistics::Contingency, &["a", "b"], data, 2);
    let StatisticalModel::Contingency(m) = model else { panic!() };
    assert_eq!(m.keys, serial.keys);
    assert_eq!(m.counts, serial.counts);
}

#[test]
fn engine_builds_pca_model_from_image_arrays() {
    let mut img = ImageData::new([4, 4, 4], [0.0; 3], [1.0; 3]);
    let n = img.num_points();
    let xs: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 0.01 * (x * 50.0).cos()).collect();
    img.point_data.insert(AttributeArray::real("u", 1, xs));
    img.point_data.insert(AttributeArray::real("w", 1, ys));

    let comm = LocalComm::solo();
    let engine = StatsEngine::new(StatsOptions { training_fraction: 1.0, seed: 3 });
    let mut requests = RequestList::new();
    requests.add("u", Association::Point);
    requests.add("w", Association::Point);

    let model = engine
        .learn_and_derive(
            &comm,
            &Statistics::Pca(Default::default()),
            &DataSet::Image(img),
            &requests,
            Association::Point,
        )
        .unwrap();
    let StatisticalModel::Pca(m) = model else { panic!() };
    assert_eq!(m.columns, vec!["u".to_string(), "w".to_string()]);
    assert_eq!(m.basis.len(), 2);
    // dominant direction is close to (1, 2)/√5
    let v = &m.basis[0];
    let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
    assert_abs_diff_eq!((v[1] / v[0]).abs(), 2.0, epsilon = 0.05);
    assert!(norm > 0.0);

    let tables = StatisticalModel::Pca(m).extract_tables();
    assert_eq!(tables.len(), 3);
    assert_eq!(tables[1].name, "Eigenvalues");
}

#[test]
fn training_fraction_samples_the_table() {
    let mut img = ImageData::new([10, 10, 10], [0.0; 3], [1.0; 3]);
    let n = img.num_points();
    img.point_data.insert(AttributeArray::real(
        "v",
        1,
        (0..n).map(|i| i as f64).collect(),
    ));
    let comm = LocalComm::solo();
    let engine = StatsEngine::new(StatsOptions { training_fraction: 0.1, seed: 11 });
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
    assert_eq!(m.moments[0].n, 100);
}
