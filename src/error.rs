//! Typed validation errors raised by the library

use thiserror::Error;

/// Errors produced while loading, clustering, predicting or recommending
#[derive(Debug, Error, PartialEq)]
pub enum RecommendError {
    #[error("dataset is empty")]
    EmptyDataset,

    #[error("cannot form {k} clusters from {available} restaurants")]
    InvalidClusterCount { k: usize, available: usize },

    #[error("cannot form {k} clusters from {distinct} distinct feature vectors")]
    TooFewDistinctPoints { k: usize, distinct: usize },

    #[error("duplicate restaurant id: {0}")]
    DuplicateRestaurant(String),

    #[error("unknown restaurant id: {0}")]
    UnknownRestaurant(String),

    #[error("invalid value for {field} of {id}: {reason}")]
    InvalidField {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no preference or reviewed restaurant available for feature {0}")]
    MissingPreference(String),

    #[error("not enough data to fit a predictor: {0}")]
    InsufficientSamples(String),

    #[error("k-means failed: {0}")]
    Clustering(String),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
