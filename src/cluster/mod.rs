//! Material-cluster engines: analysis and explode.

pub mod analysis;
pub mod barycenter;
pub mod explode;

pub use analysis::{ClusterAnalysis, ClusterOutput, LabelRanksMap};
pub use barycenter::{ClusterMoment, LabelValuesMap};
pub use explode::ClusterExplode;
