use thiserror::Error;

// Unified error type for voxstat

#[derive(Error, Debug)]
pub enum VsError {
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("missing attribute array: {0}")]
    MissingArray(String),
    #[error("array {0} does not hold integer labels")]
    LabelTypeMismatch(String),
    #[error("malformed cluster table: {0}")]
    MalformedTable(String),
    #[error("too few samples: need {need}, have {have}")]
    TooFewSamples { need: usize, have: usize },
    #[error("no requested array has data on any rank")]
    EmptySelection,
    #[error("eigendecomposition of the covariance matrix failed")]
    EigenFailure,
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("no cluster statistics for label {0}")]
    UnknownLabel(i64),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
