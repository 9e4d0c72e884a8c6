//! Engine configuration.

pub mod options;
pub use options::{ClusterOptions, ExplodeOptions, StatsOptions};
