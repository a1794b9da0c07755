//! Audio processing service.
//!
//! Accepts jobs (uploaded payloads plus an [`Operation`]), runs them through
//! decode and processing under per-job resource limits, and reports exactly
//! one [`ProcessingResult`] per job. Failures are classified by
//! [`FailureKind`], which also decides the status a front end answers with.
//!
//! ```ignore
//! use core_runtime::ServiceConfig;
//! use core_service::{JobRequest, Operation, Orchestrator};
//!
//! let config = ServiceConfig::load(None)?;
//! let orchestrator = Orchestrator::new(config);
//!
//! let outcome = orchestrator
//!     .submit(JobRequest::new(Operation::Analyze), vec![payload])
//!     .await;
//! ```

pub mod error;
pub mod job;
pub mod orchestrator;
pub mod result;

pub use error::{ErrorBody, FailureKind, JobError, JobFailure, Result, StatusClass};
pub use job::{JobId, JobRequest, JobState, Operation, ProcessingJob, StateTransition};
pub use orchestrator::Orchestrator;
pub use result::{JobOutcome, ProcessingResult};
