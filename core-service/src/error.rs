//! # Job Error Types
//!
//! Every crate's error converges on [`JobError`], and every [`JobError`] maps
//! to exactly one [`FailureKind`]. The kind decides the status class reported
//! to clients.

use core_analysis::FeatureFailureKind;
use core_decoder::DecoderError;
use core_transcode::TranscodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Message returned to clients in place of internal fault details.
pub const INTERNAL_FAULT_MESSAGE: &str = "internal error while processing the job";

/// Failure taxonomy exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    PayloadTooLarge,
    UnsupportedFormat,
    DecodeError,
    DurationLimitExceeded,
    ChannelLimitExceeded,
    UnsupportedChannelLayout,
    EncoderFailed,
    TranscodeTimeout,
    FeatureComputationError,
    InsufficientSamples,
    JobTimeout,
    ServiceBusy,
    InternalFault,
}

/// Coarse outcome class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// The request or its content is at fault
    ClientError,
    /// Retry later: capacity or time budget exhausted
    ServiceUnavailable,
    /// Bug or environment problem on the service side
    ServerError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::PayloadTooLarge => "payload_too_large",
            FailureKind::UnsupportedFormat => "unsupported_format",
            FailureKind::DecodeError => "decode_error",
            FailureKind::DurationLimitExceeded => "duration_limit_exceeded",
            FailureKind::ChannelLimitExceeded => "channel_limit_exceeded",
            FailureKind::UnsupportedChannelLayout => "unsupported_channel_layout",
            FailureKind::EncoderFailed => "encoder_failed",
            FailureKind::TranscodeTimeout => "transcode_timeout",
            FailureKind::FeatureComputationError => "feature_computation_error",
            FailureKind::InsufficientSamples => "insufficient_samples",
            FailureKind::JobTimeout => "job_timeout",
            FailureKind::ServiceBusy => "service_busy",
            FailureKind::InternalFault => "internal_fault",
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            FailureKind::JobTimeout | FailureKind::TranscodeTimeout | FailureKind::ServiceBusy => {
                StatusClass::ServiceUnavailable
            }
            FailureKind::InternalFault => StatusClass::ServerError,
            _ => StatusClass::ClientError,
        }
    }

    /// HTTP status code a front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            FailureKind::InvalidRequest => 400,
            FailureKind::PayloadTooLarge => 413,
            FailureKind::UnsupportedFormat => 415,
            FailureKind::DecodeError
            | FailureKind::DurationLimitExceeded
            | FailureKind::ChannelLimitExceeded
            | FailureKind::UnsupportedChannelLayout
            | FailureKind::EncoderFailed
            | FailureKind::FeatureComputationError
            | FailureKind::InsufficientSamples => 422,
            FailureKind::JobTimeout | FailureKind::TranscodeTimeout | FailureKind::ServiceBusy => {
                503
            }
            FailureKind::InternalFault => 500,
        }
    }
}

impl FromStr for FailureKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        const ALL: [FailureKind; 14] = [
            FailureKind::InvalidRequest,
            FailureKind::PayloadTooLarge,
            FailureKind::UnsupportedFormat,
            FailureKind::DecodeError,
            FailureKind::DurationLimitExceeded,
            FailureKind::ChannelLimitExceeded,
            FailureKind::UnsupportedChannelLayout,
            FailureKind::EncoderFailed,
            FailureKind::TranscodeTimeout,
            FailureKind::FeatureComputationError,
            FailureKind::InsufficientSamples,
            FailureKind::JobTimeout,
            FailureKind::ServiceBusy,
            FailureKind::InternalFault,
        ];

        ALL.into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| JobError::InvalidRequest(format!("unknown failure kind '{}'", s)))
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that end a job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecoderError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// No feature could be computed.
    #[error("Analysis failed: {message}")]
    Analysis {
        kind: FeatureFailureKind,
        message: String,
    },

    /// A CPU stage did not finish before the job deadline.
    #[error("Job exceeded its time budget during {stage} after {elapsed:?}")]
    JobTimeout {
        stage: &'static str,
        elapsed: Duration,
    },

    #[error("Service busy: {capacity} jobs already admitted")]
    ServiceBusy { capacity: usize },

    #[error("Invalid job state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Client-facing failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::InvalidRequest(_) => FailureKind::InvalidRequest,
            JobError::Decode(e) => match e {
                DecoderError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
                DecoderError::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
                DecoderError::Malformed { .. } => FailureKind::DecodeError,
                DecoderError::DurationLimitExceeded { .. } => FailureKind::DurationLimitExceeded,
                DecoderError::ChannelLimitExceeded { .. } => FailureKind::ChannelLimitExceeded,
                // Decoding is only cancelled once the deadline has passed
                DecoderError::Cancelled => FailureKind::JobTimeout,
                DecoderError::InvalidBuffer(_) => FailureKind::InternalFault,
            },
            JobError::Transcode(e) => match e {
                TranscodeError::UnsupportedChannelLayout { .. } => {
                    FailureKind::UnsupportedChannelLayout
                }
                TranscodeError::InvalidTarget(_) => FailureKind::InvalidRequest,
                TranscodeError::Timeout { .. } => FailureKind::TranscodeTimeout,
                // Same as decoding: only the job deadline cancels conversion
                TranscodeError::Cancelled => FailureKind::JobTimeout,
                TranscodeError::EncoderFailed { .. } => FailureKind::EncoderFailed,
                TranscodeError::IncompatibleBuffers(_)
                | TranscodeError::Resample(_)
                | TranscodeError::Wav(_)
                | TranscodeError::EncoderUnavailable { .. }
                | TranscodeError::Io(_)
                | TranscodeError::Buffer(_) => FailureKind::InternalFault,
            },
            JobError::Analysis { kind, .. } => match kind {
                FeatureFailureKind::InsufficientSamples => FailureKind::InsufficientSamples,
                FeatureFailureKind::FeatureComputationError => FailureKind::FeatureComputationError,
            },
            JobError::JobTimeout { .. } => FailureKind::JobTimeout,
            JobError::ServiceBusy { .. } => FailureKind::ServiceBusy,
            JobError::InvalidStateTransition { .. }
            | JobError::Runtime(_)
            | JobError::Internal(_) => FailureKind::InternalFault,
        }
    }

    /// Client-facing failure body. Internal faults carry a fixed message; the
    /// detail only goes to the log.
    pub fn to_failure(&self) -> JobFailure {
        let kind = self.kind();
        let message = match kind {
            FailureKind::InternalFault => INTERNAL_FAULT_MESSAGE.to_string(),
            _ => self.to_string(),
        };
        JobFailure { kind, message }
    }
}

/// Serialised error body: `{"kind": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "kind": self.kind, "message": self.message }).to_string()
    }
}

/// Error body as sent over the wire.
pub type ErrorBody = JobFailure;

pub type Result<T> = std::result::Result<T, JobError>;
