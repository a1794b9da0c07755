//! # Feature Report

use crate::error::FeatureError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a single feature is missing from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFailureKind {
    InsufficientSamples,
    FeatureComputationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFailure {
    pub feature: String,
    pub kind: FeatureFailureKind,
    pub message: String,
}

/// Computed feature values plus the features that failed, in the order they
/// were attempted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub values: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FeatureFailure>,
}

impl FeatureReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Record a failed feature. Cancellation is not a feature failure and is
    /// ignored here.
    pub fn record_failure(&mut self, error: &FeatureError) {
        let (feature, kind) = match error {
            FeatureError::InsufficientSamples { feature, .. } => {
                (*feature, FeatureFailureKind::InsufficientSamples)
            }
            FeatureError::Computation { feature, .. } => {
                (*feature, FeatureFailureKind::FeatureComputationError)
            }
            FeatureError::Cancelled => return,
        };

        self.failures.push(FeatureFailure {
            feature: feature.to_string(),
            kind,
            message: error.to_string(),
        });
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Whether at least one feature was computed.
    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// First failure in feature order.
    pub fn first_failure(&self) -> Option<&FeatureFailure> {
        self.failures.first()
    }
}
