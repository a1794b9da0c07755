//! # Processing Job State Machine
//!
//! One [`ProcessingJob`] exists per client request. It is created at request
//! entry, owns the uploaded payloads, and is dropped once its outcome has been
//! emitted. Jobs are never persisted.
//!
//! ## State Machine
//!
//! ```text
//! Received → Validated → Decoded → Processed → Completed
//!     ↓          ↓          ↓          ↓
//!     └──────────┴──────────┴──────────┴──────→ Failed
//! ```
//!
//! Every accepted transition is appended to the job history with its
//! timestamp.

use crate::error::{JobError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_decoder::DecoderError;
use core_runtime::ResourceLimits;
use core_transcode::TargetFormat;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a processing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s).map_err(|e| {
            JobError::InvalidRequest(format!("invalid job id: {}", e))
        })?))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

// ============================================================================
// State Types
// ============================================================================

/// Lifecycle state of a processing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Request accepted, nothing checked yet
    Received,
    /// Payloads and parameters passed validation
    Validated,
    /// Every payload decoded into a canonical buffer
    Decoded,
    /// Analysis, transcode or edit finished
    Processed,
    /// Result packaged
    Completed,
    /// Job ended with a failure
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::Decoded => "decoded",
            JobState::Processed => "processed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "received" => Ok(JobState::Received),
            "validated" => Ok(JobState::Validated),
            "decoded" => Ok(JobState::Decoded),
            "processed" => Ok(JobState::Processed),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(JobError::InvalidRequest(format!("unknown job state '{}'", s))),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: JobState,
    pub to: JobState,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

/// Length of each input's leading segment in a mashup when none is given.
pub const DEFAULT_SEGMENT_SECONDS: f64 = 20.0;

fn default_segment_seconds() -> f64 {
    DEFAULT_SEGMENT_SECONDS
}

/// Requested processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Decode and describe the stream
    DecodeOnly,
    /// Re-encode into the target format
    Transcode { target: TargetFormat },
    /// Compute the feature report
    Analyze,
    /// Join the leading segment of every payload into one artifact.
    /// Without a target the result is MP3 at the default bitrate.
    Mashup {
        #[serde(default = "default_segment_seconds")]
        segment_seconds: f64,
        #[serde(default)]
        target: Option<TargetFormat>,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::DecodeOnly => "decode_only",
            Operation::Transcode { .. } => "transcode",
            Operation::Analyze => "analyze",
            Operation::Mashup { .. } => "mashup",
        }
    }

    /// Target format of the produced artifact, if the operation produces one.
    pub fn target(&self) -> Option<TargetFormat> {
        match self {
            Operation::Transcode { target } => Some(target.clone()),
            Operation::Mashup { target, .. } => {
                Some(target.clone().unwrap_or_else(TargetFormat::mp3))
            }
            Operation::DecodeOnly | Operation::Analyze => None,
        }
    }
}

/// Request parameters as sent by clients. Payloads travel separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub operation: Operation,
}

impl JobRequest {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }

    /// Parse request parameters from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| JobError::InvalidRequest(format!("malformed request: {}", e)))
    }
}

// ============================================================================
// Job
// ============================================================================

/// A single unit of client-requested work.
#[derive(Debug)]
pub struct ProcessingJob {
    id: JobId,
    state: JobState,
    operation: Operation,
    payloads: Vec<Bytes>,
    limits: ResourceLimits,
    history: Vec<StateTransition>,
    created_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(request: JobRequest, payloads: Vec<Bytes>, limits: ResourceLimits) -> Self {
        Self {
            id: JobId::new(),
            state: JobState::Received,
            operation: request.operation,
            payloads,
            limits,
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn payload_count(&self) -> usize {
        self.payloads.len()
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Hand the payloads over to the decode stage.
    pub fn take_payloads(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.payloads)
    }

    /// Check payloads and parameters, moving `Received → Validated`.
    ///
    /// # Errors
    ///
    /// - [`JobError::InvalidRequest`] for a wrong payload count or bad
    ///   parameters
    /// - [`JobError::Decode`] with `PayloadTooLarge` for an oversized payload
    pub fn validate(&mut self) -> Result<()> {
        self.check_request()?;
        self.transition(JobState::Validated)
    }

    fn check_request(&self) -> Result<()> {
        let count = self.payloads.len();
        match &self.operation {
            Operation::Mashup { .. } if count == 0 => {
                return Err(JobError::InvalidRequest(
                    "mashup requires at least one payload".to_string(),
                ));
            }
            Operation::Mashup { .. } => {}
            _ if count != 1 => {
                return Err(JobError::InvalidRequest(format!(
                    "{} requires exactly one payload, got {}",
                    self.operation.name(),
                    count
                )));
            }
            _ => {}
        }

        if let Some(payload) = self.payloads.iter().find(|p| p.len() > self.limits.max_bytes) {
            return Err(DecoderError::PayloadTooLarge {
                size: payload.len(),
                limit: self.limits.max_bytes,
            }
            .into());
        }

        if let Operation::Mashup {
            segment_seconds, ..
        } = &self.operation
        {
            segment_duration(*segment_seconds)?;
        }

        if let Some(target) = self.operation.target() {
            target.validate(self.limits.max_channels)?;
        }

        Ok(())
    }

    /// Move to `to`, recording the transition.
    ///
    /// # Errors
    ///
    /// [`JobError::InvalidStateTransition`] if the state machine forbids it.
    pub fn transition(&mut self, to: JobState) -> Result<()> {
        self.validate_transition(to)?;
        self.history.push(StateTransition {
            from: self.state,
            to,
            at: Utc::now(),
        });
        self.state = to;
        Ok(())
    }

    /// Mark the job failed. A job that already reached a terminal state is
    /// left untouched.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.history.push(StateTransition {
                from: self.state,
                to: JobState::Failed,
                at: Utc::now(),
            });
            self.state = JobState::Failed;
        }
    }

    fn validate_transition(&self, to: JobState) -> Result<()> {
        let valid = match (self.state, to) {
            (JobState::Received, JobState::Validated) => true,
            (JobState::Validated, JobState::Decoded) => true,
            (JobState::Decoded, JobState::Processed) => true,
            (JobState::Processed, JobState::Completed) => true,

            // Terminal states cannot transition
            (JobState::Completed, _) => false,
            (JobState::Failed, _) => false,

            (_, JobState::Failed) => true,

            _ => false,
        };

        if !valid {
            return Err(JobError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        Ok(())
    }
}

/// Validated mashup segment length.
pub fn segment_duration(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(JobError::InvalidRequest(format!(
            "segment length must be a positive number of seconds, got {}",
            seconds
        )));
    }

    Duration::try_from_secs_f64(seconds)
        .map_err(|e| JobError::InvalidRequest(format!("segment length out of range: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use core_transcode::OutputContainer;

    fn job(operation: Operation, payloads: usize) -> ProcessingJob {
        ProcessingJob::new(
            JobRequest::new(operation),
            vec![Bytes::from_static(b"RIFF....WAVE"); payloads],
            ResourceLimits::default(),
        )
    }

    #[test]
    fn test_job_id_from_string() {
        let id = JobId::new();
        assert_eq!(JobId::from_string(&id.as_str()).unwrap(), id);
        assert!(JobId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_state_round_trip() {
        for state in ["received", "validated", "decoded", "processed", "completed", "failed"] {
            assert_eq!(state.parse::<JobState>().unwrap().as_str(), state);
        }
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Processed.is_terminal());
    }

    #[test]
    fn test_happy_path_records_history() {
        let mut job = job(Operation::Analyze, 1);
        job.validate().unwrap();
        job.transition(JobState::Decoded).unwrap();
        job.transition(JobState::Processed).unwrap();
        job.transition(JobState::Completed).unwrap();

        let states: Vec<_> = job.history().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                JobState::Validated,
                JobState::Decoded,
                JobState::Processed,
                JobState::Completed
            ]
        );
        assert_eq!(job.history()[0].from, JobState::Received);
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut job = job(Operation::Analyze, 1);
        let err = job.transition(JobState::Processed).unwrap_err();
        assert!(matches!(err, JobError::InvalidStateTransition { .. }));
        assert_eq!(job.state(), JobState::Received);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job(Operation::Analyze, 1);
        job.fail();
        assert_eq!(job.state(), JobState::Failed);
        assert!(job.transition(JobState::Validated).is_err());

        job.fail();
        assert_eq!(job.history().len(), 1);
    }

    #[test]
    fn test_wrong_payload_count() {
        let err = job(Operation::DecodeOnly, 2).validate().unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);

        let mashup = Operation::Mashup {
            segment_seconds: 5.0,
            target: None,
        };
        assert!(job(mashup.clone(), 0).validate().is_err());
        assert!(job(mashup, 3).validate().is_ok());
    }

    #[test]
    fn test_oversized_payload() {
        let mut job = ProcessingJob::new(
            JobRequest::new(Operation::DecodeOnly),
            vec![Bytes::from(vec![0u8; 64])],
            ResourceLimits::default().with_max_bytes(32),
        );
        let err = job.validate().unwrap_err();
        assert_eq!(err.kind(), FailureKind::PayloadTooLarge);
    }

    #[test]
    fn test_invalid_targets() {
        let bitrate_on_wav = Operation::Transcode {
            target: TargetFormat::wav().with_bitrate(128),
        };
        assert_eq!(
            job(bitrate_on_wav, 1).validate().unwrap_err().kind(),
            FailureKind::InvalidRequest
        );

        let zero_rate = Operation::Transcode {
            target: TargetFormat::mp3().with_sample_rate(0),
        };
        assert!(job(zero_rate, 1).validate().is_err());

        let too_many_channels = Operation::Transcode {
            target: TargetFormat::wav().with_channels(9),
        };
        assert!(job(too_many_channels, 1).validate().is_err());
    }

    #[test]
    fn test_segment_must_be_positive() {
        for seconds in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let op = Operation::Mashup {
                segment_seconds: seconds,
                target: None,
            };
            assert_eq!(
                job(op, 2).validate().unwrap_err().kind(),
                FailureKind::InvalidRequest
            );
        }
        assert_eq!(segment_duration(1.5).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_request_from_json() {
        let request = JobRequest::from_json(
            r#"{ "operation": { "type": "transcode", "target": { "container": "flac", "sample_rate": 48000 } } }"#,
        )
        .unwrap();
        let target = request.operation.target().unwrap();
        assert_eq!(target.container, OutputContainer::Flac);
        assert_eq!(target.sample_rate, Some(48_000));

        let request = JobRequest::from_json(r#"{ "operation": { "type": "mashup" } }"#).unwrap();
        assert_eq!(
            request.operation,
            Operation::Mashup {
                segment_seconds: DEFAULT_SEGMENT_SECONDS,
                target: None
            }
        );
        assert_eq!(request.operation.target(), Some(TargetFormat::mp3()));

        let err = JobRequest::from_json(r#"{ "operation": { "type": "explode" } }"#).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);
    }
}
