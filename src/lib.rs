//! Audio ingestion pipeline.
//!
//! Re-exports the service surface and the runtime bootstrap so hosts can
//! depend on a single crate: load a [`ServiceConfig`], initialise logging,
//! build an [`Orchestrator`] and submit jobs.

pub use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use core_runtime::{AnalysisConfig, CodecToolConfig, ResourceLimits, ServiceConfig};
pub use core_service::*;
