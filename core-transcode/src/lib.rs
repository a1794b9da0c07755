//! # Transcode/Resample Engine
//!
//! Converts a canonical [`AudioBuffer`](core_decoder::AudioBuffer) into an
//! encoded artifact with the requested container, sample rate and channel
//! layout.
//!
//! ## Overview
//!
//! ```text
//! AudioBuffer → ChannelMapping → resample → WavEncoder ─────────────→ EncodedArtifact
//!                                               └→ ExternalEncoder (ffmpeg) ─┘
//! ```
//!
//! - Channel mapping and resampling are synchronous CPU work; callers run
//!   them on a blocking pool.
//! - WAV is encoded in-process with `hound`.
//! - Every other container is produced by an external codec tool behind the
//!   [`ExternalEncoder`] trait. The default implementation,
//!   [`FfmpegEncoder`], drives `ffmpeg` through a [`CodecProcess`] guard
//!   that never outlives its deadline.

pub mod channels;
pub mod edit;
pub mod encoder;
pub mod error;
pub mod format;
pub mod process;
pub mod resample;
pub mod transcoder;

pub use channels::ChannelMapping;
pub use edit::{concat, conform, conform_cancellable, trim};
pub use encoder::{ExternalEncoder, FfmpegEncoder, WavEncoder};
pub use error::{Result, TranscodeError};
pub use format::{EncodedArtifact, OutputContainer, TargetFormat, WavEncoding};
pub use process::CodecProcess;
pub use resample::{output_frames, resample, resample_cancellable};
pub use transcoder::Transcoder;
