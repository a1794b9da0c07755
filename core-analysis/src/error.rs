//! # Feature Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// The signal is shorter than the feature's minimum window.
    #[error("{feature} needs at least {required} frames, got {available}")]
    InsufficientSamples {
        feature: &'static str,
        required: usize,
        available: usize,
    },

    /// The feature is undefined for this signal (for example dBFS of silence).
    #[error("{feature} could not be computed: {reason}")]
    Computation {
        feature: &'static str,
        reason: String,
    },

    #[error("Analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FeatureError>;
