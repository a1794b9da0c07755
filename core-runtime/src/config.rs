//! # Service Configuration
//!
//! Process-wide configuration for the audio pipeline.
//!
//! ## Overview
//!
//! `ServiceConfig` is built once at startup from three layers, each
//! overriding the previous one:
//!
//! 1. Built-in conservative defaults
//! 2. An optional JSON document (every field may be omitted)
//! 3. `AUDIO_PIPELINE_*` environment variables
//!
//! The result is validated and frozen into an `Arc<ServiceConfig>` that is
//! handed to every job by reference. Nothing mutates it afterwards.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::ServiceConfig;
//!
//! let config = ServiceConfig::from_json_str(r#"{ "workers": 2 }"#)
//!     .and_then(ServiceConfig::freeze)
//!     .expect("valid config");
//! assert_eq!(config.workers, 2);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AUDIO_PIPELINE_MAX_BYTES` | `limits.max_bytes` |
//! | `AUDIO_PIPELINE_MAX_DURATION_SECS` | `limits.max_duration` |
//! | `AUDIO_PIPELINE_MAX_CHANNELS` | `limits.max_channels` |
//! | `AUDIO_PIPELINE_MAX_SECONDS` | `limits.max_seconds` |
//! | `AUDIO_PIPELINE_WORKERS` | `workers` |
//! | `AUDIO_PIPELINE_QUEUE_DEPTH` | `queue_depth` |
//! | `AUDIO_PIPELINE_FFMPEG` | `codec.program` |
//! | `AUDIO_PIPELINE_LOG` | `log_filter` |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_MAX_BYTES: &str = "AUDIO_PIPELINE_MAX_BYTES";
pub const ENV_MAX_DURATION_SECS: &str = "AUDIO_PIPELINE_MAX_DURATION_SECS";
pub const ENV_MAX_CHANNELS: &str = "AUDIO_PIPELINE_MAX_CHANNELS";
pub const ENV_MAX_SECONDS: &str = "AUDIO_PIPELINE_MAX_SECONDS";
pub const ENV_WORKERS: &str = "AUDIO_PIPELINE_WORKERS";
pub const ENV_QUEUE_DEPTH: &str = "AUDIO_PIPELINE_QUEUE_DEPTH";
pub const ENV_FFMPEG: &str = "AUDIO_PIPELINE_FFMPEG";
pub const ENV_LOG: &str = "AUDIO_PIPELINE_LOG";

/// Upper bound on channels any configuration may allow.
const HARD_MAX_CHANNELS: u16 = 32;

// ============================================================================
// Resource Limits
// ============================================================================

/// Per-job resource bounds.
///
/// Violating any bound aborts the job with a dedicated failure kind. Inputs
/// are never silently truncated to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum accepted payload size in bytes.
    ///
    /// Default: 25 MiB.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum decoded audio duration.
    ///
    /// Default: 10 minutes.
    #[serde(default = "default_max_duration", with = "duration_secs")]
    pub max_duration: Duration,

    /// Maximum channel count of a decoded stream.
    ///
    /// Default: 8.
    #[serde(default = "default_max_channels")]
    pub max_channels: u16,

    /// Wall-clock budget for one job (decode + processing, including any
    /// external codec process).
    ///
    /// Default: 60 seconds.
    #[serde(default = "default_max_seconds", with = "duration_secs")]
    pub max_seconds: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_duration: default_max_duration(),
            max_channels: default_max_channels(),
            max_seconds: default_max_seconds(),
        }
    }
}

impl ResourceLimits {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_max_channels(mut self, max_channels: u16) -> Self {
        self.max_channels = max_channels;
        self
    }

    pub fn with_max_seconds(mut self, max_seconds: Duration) -> Self {
        self.max_seconds = max_seconds;
        self
    }

    /// Maximum number of frames allowed at the given sample rate.
    pub fn max_frames(&self, sample_rate: u32) -> u64 {
        (self.max_duration.as_secs_f64() * sample_rate as f64).ceil() as u64
    }

    /// Validate limit values.
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(Error::Config("limits.max_bytes must be > 0".to_string()));
        }

        if self.max_duration.is_zero() {
            return Err(Error::Config(
                "limits.max_duration must be > 0".to_string(),
            ));
        }

        if self.max_channels == 0 || self.max_channels > HARD_MAX_CHANNELS {
            return Err(Error::Config(format!(
                "limits.max_channels must be between 1 and {}",
                HARD_MAX_CHANNELS
            )));
        }

        if self.max_seconds.is_zero() {
            return Err(Error::Config("limits.max_seconds must be > 0".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// External Codec Tool
// ============================================================================

/// External codec toolchain used for containers without a native encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecToolConfig {
    /// Program to execute. Resolved through `PATH` when not absolute.
    ///
    /// Default: `ffmpeg`.
    #[serde(default = "default_codec_program")]
    pub program: PathBuf,

    /// Number of trailing stderr bytes kept for error reports.
    ///
    /// Default: 2048.
    #[serde(default = "default_stderr_tail_bytes")]
    pub stderr_tail_bytes: usize,
}

impl Default for CodecToolConfig {
    fn default() -> Self {
        Self {
            program: default_codec_program(),
            stderr_tail_bytes: default_stderr_tail_bytes(),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Analysis engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// FFT window length for spectral features. Must be a power of two.
    ///
    /// Default: 2048.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,

    /// Hop between successive spectral frames.
    ///
    /// Default: 1024.
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,

    /// Fraction of spectral energy below the rolloff frequency.
    ///
    /// Stored in percent to keep the type `Eq`. Default: 85.
    #[serde(default = "default_rolloff_percent")]
    pub rolloff_percent: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            hop_size: default_hop_size(),
            rolloff_percent: default_rolloff_percent(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 16 || !self.fft_size.is_power_of_two() {
            return Err(Error::Config(
                "analysis.fft_size must be a power of two >= 16".to_string(),
            ));
        }

        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(Error::Config(
                "analysis.hop_size must be between 1 and fft_size".to_string(),
            ));
        }

        if self.rolloff_percent == 0 || self.rolloff_percent >= 100 {
            return Err(Error::Config(
                "analysis.rolloff_percent must be between 1 and 99".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Service Configuration
// ============================================================================

/// Process-wide, read-only service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Per-job resource limits.
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Size of the CPU worker pool.
    ///
    /// Default: number of available cores.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs allowed to wait for a worker. Anything beyond
    /// `workers + queue_depth` is rejected as busy.
    ///
    /// Default: same as `workers`.
    #[serde(default = "default_workers")]
    pub queue_depth: usize,

    /// External codec tool.
    #[serde(default)]
    pub codec: CodecToolConfig,

    /// Analysis engine tuning.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Optional `tracing` filter directive (e.g. `core_decoder=debug`).
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            workers: default_workers(),
            queue_depth: default_workers(),
            codec: CodecToolConfig::default(),
            analysis: AnalysisConfig::default(),
            log_filter: None,
        }
    }
}

impl ServiceConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid configuration document: {}", e)))
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Load the startup configuration: optional file, then environment,
    /// then validation. Returns the frozen shared handle.
    pub fn load(path: Option<&Path>) -> Result<Arc<Self>> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        base.with_env_overrides(|var| std::env::var(var).ok())?
            .freeze()
    }

    /// Apply `AUDIO_PIPELINE_*` overrides using the given lookup.
    ///
    /// The lookup is injectable so tests never touch the real environment.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_BYTES) {
            self.limits.max_bytes = parse_env(ENV_MAX_BYTES, &value)?;
        }

        if let Some(value) = lookup(ENV_MAX_DURATION_SECS) {
            self.limits.max_duration = parse_env_secs(ENV_MAX_DURATION_SECS, &value)?;
        }

        if let Some(value) = lookup(ENV_MAX_CHANNELS) {
            self.limits.max_channels = parse_env(ENV_MAX_CHANNELS, &value)?;
        }

        if let Some(value) = lookup(ENV_MAX_SECONDS) {
            self.limits.max_seconds = parse_env_secs(ENV_MAX_SECONDS, &value)?;
        }

        if let Some(value) = lookup(ENV_WORKERS) {
            self.workers = parse_env(ENV_WORKERS, &value)?;
        }

        if let Some(value) = lookup(ENV_QUEUE_DEPTH) {
            self.queue_depth = parse_env(ENV_QUEUE_DEPTH, &value)?;
        }

        if let Some(value) = lookup(ENV_FFMPEG) {
            self.codec.program = PathBuf::from(value);
        }

        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = Some(value);
        }

        Ok(self)
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    pub fn with_codec_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.codec.program = program.into();
        self
    }

    /// Total number of jobs admitted at once (running + waiting).
    pub fn admission_capacity(&self) -> usize {
        self.workers + self.queue_depth
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.analysis.validate()?;

        if self.workers == 0 {
            return Err(Error::Config("workers must be > 0".to_string()));
        }

        if self.codec.program.as_os_str().is_empty() {
            return Err(Error::Config("codec.program cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Validate and freeze into the shared read-only handle.
    pub fn freeze(self) -> Result<Arc<Self>> {
        self.validate()?;
        Ok(Arc::new(self))
    }
}

fn parse_env<T>(var: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| Error::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_env_secs(var: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_env(var, value)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
            reason: "must be a positive number of seconds".to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| Error::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_max_bytes() -> usize {
    25 * 1024 * 1024 // 25 MiB
}

fn default_max_duration() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_max_channels() -> u16 {
    8
}

fn default_max_seconds() -> Duration {
    Duration::from_secs(60)
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_codec_program() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_stderr_tail_bytes() -> usize {
    2048
}

fn default_fft_size() -> usize {
    2048
}

fn default_hop_size() -> usize {
    1024
}

fn default_rolloff_percent() -> u8 {
    85
}

/// Durations serialised as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(
                "duration must be a non-negative number of seconds",
            ));
        }
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_bytes, 25 * 1024 * 1024);
        assert_eq!(config.limits.max_channels, 8);
        assert_eq!(config.limits.max_seconds, Duration::from_secs(60));
        assert!(config.workers >= 1);
        assert_eq!(config.queue_depth, config.workers);
        assert_eq!(config.codec.program, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ServiceConfig::from_json_str(r#"{ "limits": { "max_seconds": 2.5 }, "workers": 3 }"#)
                .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.limits.max_seconds, Duration::from_millis(2500));
        assert_eq!(config.limits.max_bytes, default_max_bytes());
        assert_eq!(config.analysis.fft_size, 2048);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ServiceConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::default()
            .with_env_overrides(lookup(&[
                (ENV_MAX_BYTES, "1024"),
                (ENV_MAX_DURATION_SECS, "30"),
                (ENV_MAX_CHANNELS, "2"),
                (ENV_MAX_SECONDS, "0.5"),
                (ENV_WORKERS, "4"),
                (ENV_QUEUE_DEPTH, "0"),
                (ENV_FFMPEG, "/opt/bin/ffmpeg"),
                (ENV_LOG, "core_decoder=debug"),
            ]))
            .unwrap();

        assert_eq!(config.limits.max_bytes, 1024);
        assert_eq!(config.limits.max_duration, Duration::from_secs(30));
        assert_eq!(config.limits.max_channels, 2);
        assert_eq!(config.limits.max_seconds, Duration::from_millis(500));
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_depth, 0);
        assert_eq!(config.admission_capacity(), 4);
        assert_eq!(config.codec.program, PathBuf::from("/opt/bin/ffmpeg"));
        assert_eq!(config.log_filter.as_deref(), Some("core_decoder=debug"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = ServiceConfig::default()
            .with_env_overrides(lookup(&[(ENV_WORKERS, "many")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { ref var, .. } if var == ENV_WORKERS));

        let err = ServiceConfig::default()
            .with_env_overrides(lookup(&[(ENV_MAX_SECONDS, "-1")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { .. }));
    }

    #[test]
    fn test_unrepresentable_durations_are_rejected() {
        let err = ServiceConfig::default()
            .with_env_overrides(lookup(&[(ENV_MAX_SECONDS, "1e30")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { ref var, .. } if var == ENV_MAX_SECONDS));

        let err = ServiceConfig::default()
            .with_env_overrides(lookup(&[(ENV_MAX_DURATION_SECS, "1e300")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { ref var, .. } if var == ENV_MAX_DURATION_SECS));

        let err = ServiceConfig::from_json_str(r#"{ "limits": { "max_seconds": 1e30 } }"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = ServiceConfig::default();

        config.workers = 0;
        assert!(config.validate().is_err());
        config.workers = 1;

        config.limits.max_channels = 0;
        assert!(config.validate().is_err());
        config.limits.max_channels = 64;
        assert!(config.validate().is_err());
        config.limits.max_channels = 2;

        config.analysis.fft_size = 1000;
        assert!(config.validate().is_err());
        config.analysis.fft_size = 1024;

        config.analysis.hop_size = 4096;
        assert!(config.validate().is_err());
        config.analysis.hop_size = 512;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_frames() {
        let limits = ResourceLimits::default().with_max_duration(Duration::from_secs(2));
        assert_eq!(limits.max_frames(44100), 88200);
    }

    #[test]
    fn test_freeze_validates() {
        let frozen = ServiceConfig::default().with_workers(0).freeze();
        assert!(frozen.is_err());

        let frozen = ServiceConfig::default().with_workers(2).freeze().unwrap();
        assert_eq!(frozen.workers, 2);
    }
}
