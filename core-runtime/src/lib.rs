//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the audio pipeline:
//! - Logging and tracing infrastructure
//! - Process-wide configuration (resource limits, worker pool sizing)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities every other pipeline crate
//! depends on. Configuration is loaded once at startup, validated, and then
//! frozen behind an `Arc` so jobs can only read it.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AnalysisConfig, CodecToolConfig, ResourceLimits, ServiceConfig};
pub use error::{Error, Result};
