//! Job outcomes.

use crate::error::{FailureKind, JobFailure};
use crate::job::{JobId, JobState, StateTransition};
use core_analysis::FeatureReport;
use core_transcode::EncodedArtifact;
use std::time::Duration;

/// What a job produced. Exactly one variant per job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingResult {
    Artifact(EncodedArtifact),
    Features(FeatureReport),
    Failure(JobFailure),
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ProcessingResult::Failure(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProcessingResult::Failure(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// HTTP status for the response carrying this result.
    pub fn http_status(&self) -> u16 {
        match self {
            ProcessingResult::Failure(failure) => failure.http_status(),
            _ => 200,
        }
    }
}

/// Terminal record of one job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    /// `Completed` or `Failed`
    pub state: JobState,
    pub result: ProcessingResult,
    pub history: Vec<StateTransition>,
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.result {
            ProcessingResult::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn artifact(&self) -> Option<&EncodedArtifact> {
        match &self.result {
            ProcessingResult::Artifact(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn features(&self) -> Option<&FeatureReport> {
        match &self.result {
            ProcessingResult::Features(report) => Some(report),
            _ => None,
        }
    }
}
