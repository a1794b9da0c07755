//! # Encoders
//!
//! WAV is written in-process by [`WavEncoder`]. Other containers are handed
//! to an [`ExternalEncoder`]; [`FfmpegEncoder`] is the production
//! implementation.

mod ffmpeg;
mod wav;

pub use ffmpeg::FfmpegEncoder;
pub use wav::WavEncoder;

use crate::error::Result;
use crate::format::TargetFormat;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

/// Encoder backed by an external codec tool.
///
/// Implementations receive the audio as a complete WAV stream and must
/// return the encoded container bytes before `deadline`, or fail with
/// [`TranscodeError::Timeout`](crate::TranscodeError::Timeout) having
/// released every resource they acquired.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalEncoder: Send + Sync {
    async fn encode(&self, wav: Bytes, target: &TargetFormat, deadline: Instant) -> Result<Bytes>;
}
