//! voxstat: distributed statistics and material-cluster analysis
//!
//! This crate computes statistical models (descriptive, PCA, k-means,
//! multi-correlative, contingency) and material-cluster analyses over
//! possibly-partitioned structured voxel datasets, with support for shared
//! and distributed memory parallelism. Results are numerically and
//! structurally identical for any process or thread count.

pub mod parallel;

pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod stats;

// Re-exports for convenience
pub use cluster::*;
pub use config::*;
pub use data::*;
pub use error::*;
pub use stats::*;

// Re-export the statistics-model type at the crate root for convenience
pub use stats::model::StatisticalModel;
