//! # Transcoder
//!
//! Ties channel mapping, resampling and encoding together.
//!
//! The work is split in two so callers can schedule it appropriately:
//! [`Transcoder::prepare`] is synchronous CPU work, while
//! [`Transcoder::encode`] may wait on an external process.

use crate::edit::conform_cancellable;
use crate::encoder::{ExternalEncoder, FfmpegEncoder, WavEncoder};
use crate::error::{Result, TranscodeError};
use crate::format::{EncodedArtifact, TargetFormat, WavEncoding};
use bytes::Bytes;
use core_decoder::AudioBuffer;
use core_runtime::ServiceConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct Transcoder {
    external: Arc<dyn ExternalEncoder>,

    /// Upper bound on a single external encode, on top of the job deadline.
    max_seconds: Duration,
}

impl Transcoder {
    pub fn new(external: Arc<dyn ExternalEncoder>, max_seconds: Duration) -> Self {
        Self {
            external,
            max_seconds,
        }
    }

    /// Transcoder using `ffmpeg` as configured.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            Arc::new(FfmpegEncoder::new(&config.codec)),
            config.limits.max_seconds,
        )
    }

    /// Map channels and resample to the target layout.
    pub fn prepare(buffer: AudioBuffer, target: &TargetFormat) -> Result<AudioBuffer> {
        Self::prepare_cancellable(buffer, target, &CancellationToken::new())
    }

    /// Same as [`prepare`](Self::prepare), stopping with
    /// [`TranscodeError::Cancelled`] once `cancel` fires.
    pub fn prepare_cancellable(
        buffer: AudioBuffer,
        target: &TargetFormat,
        cancel: &CancellationToken,
    ) -> Result<AudioBuffer> {
        let sample_rate = target.sample_rate.unwrap_or(buffer.sample_rate());
        let channels = target.channels.unwrap_or(buffer.channels());
        conform_cancellable(buffer, sample_rate, channels, cancel)
    }

    /// Encode a buffer in-process. Only valid for native containers.
    pub fn encode_native(buffer: &AudioBuffer, target: &TargetFormat) -> Result<EncodedArtifact> {
        if !target.container.is_native() {
            return Err(TranscodeError::InvalidTarget(format!(
                "{} has no native encoder",
                target.container
            )));
        }

        let bytes = Bytes::from(WavEncoder::encode(buffer, target.wav_encoding)?);
        Ok(artifact(bytes, buffer, target))
    }

    /// Encode an already prepared buffer.
    ///
    /// External encodes are bounded by the earlier of `deadline` and
    /// `now + max_seconds`.
    #[instrument(skip(self, buffer), fields(container = %target.container, frames = buffer.frames()))]
    pub async fn encode(
        &self,
        buffer: &AudioBuffer,
        target: &TargetFormat,
        deadline: Instant,
    ) -> Result<EncodedArtifact> {
        if target.container.is_native() {
            return Self::encode_native(buffer, target);
        }

        let wav = Bytes::from(WavEncoder::encode(buffer, WavEncoding::Float32)?);
        let bound = deadline.min(Instant::now() + self.max_seconds);
        debug!(wav_bytes = wav.len(), "Handing off to external encoder");

        let bytes = self.external.encode(wav, target, bound).await?;
        info!(bytes = bytes.len(), "Encoded artifact");
        Ok(artifact(bytes, buffer, target))
    }

    /// [`prepare`](Self::prepare) followed by [`encode`](Self::encode).
    pub async fn transcode(
        &self,
        buffer: AudioBuffer,
        target: &TargetFormat,
        deadline: Instant,
    ) -> Result<EncodedArtifact> {
        let prepared = Self::prepare(buffer, target)?;
        self.encode(&prepared, target, deadline).await
    }
}

fn artifact(bytes: Bytes, buffer: &AudioBuffer, target: &TargetFormat) -> EncodedArtifact {
    EncodedArtifact {
        bytes,
        container: target.container,
        sample_rate: buffer.sample_rate(),
        channels: buffer.channels(),
        frames: buffer.frames() as u64,
    }
}
