//! Command-line or API options for the statistics and cluster engines.
//!
//! This module provides the option structs consumed by the engine
//! constructors: sampling controls for model building, the background label
//! shared by both cluster engines, and the displacement multiplier for the
//! explode engine. All fields are public and carry the defaults of the
//! corresponding filter parameters.

/// Statistics-engine sampling parameters.
#[derive(Debug, Clone)]
pub struct StatsOptions {
    /// Fraction of input rows sampled for model building, in [0, 1]
    pub training_fraction: f64,

    /// Seed for the training-sample selection
    pub seed: u64,
}

impl Default for StatsOptions {
    fn default() -> Self {
        StatsOptions { training_fraction: 0.1, seed: 0x5eed }
    }
}

/// Cluster-analysis parameters.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Label value treated as "no material of interest", always skipped
    pub rockfill_label: i64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        ClusterOptions { rockfill_label: 0 }
    }
}

/// Cluster-explode parameters.
#[derive(Debug, Clone)]
pub struct ExplodeOptions {
    /// Label value treated as "no material of interest", always skipped
    pub rockfill_label: i64,

    /// Multiplier applied to the barycenter-to-center displacement
    pub explode_factor: f64,
}

impl Default for ExplodeOptions {
    fn default() -> Self {
        ExplodeOptions { rockfill_label: 0, explode_factor: 1.0 }
    }
}
