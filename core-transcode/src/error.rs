//! # Transcode Error Types

use core_decoder::DecoderError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    /// The requested channel conversion has no unambiguous mapping.
    #[error("Cannot map {from} channels to {to} channels")]
    UnsupportedChannelLayout { from: u16, to: u16 },

    /// Target parameters are out of range or inconsistent.
    #[error("Invalid target format: {0}")]
    InvalidTarget(String),

    /// Buffers passed to an edit operation do not share a sample rate and
    /// channel count.
    #[error("Incompatible buffers: {0}")]
    IncompatibleBuffers(String),

    #[error("Resampler error: {0}")]
    Resample(String),

    /// The caller's cancellation token fired while buffers were being
    /// converted.
    #[error("Conversion cancelled")]
    Cancelled,

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    /// The external codec did not finish before its deadline. The process has
    /// been killed and reaped.
    #[error("External encoder timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The external codec exited unsuccessfully.
    #[error("External encoder exited with {status}: {stderr}")]
    EncoderFailed { status: String, stderr: String },

    /// The external codec could not be started at all.
    #[error("External encoder '{program}' unavailable: {reason}")]
    EncoderUnavailable { program: String, reason: String },

    #[error("External encoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Buffer(#[from] DecoderError),
}

impl TranscodeError {
    /// Returns `true` if the failure is caused by the input or the requested
    /// target rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TranscodeError::UnsupportedChannelLayout { .. }
                | TranscodeError::InvalidTarget(_)
                | TranscodeError::EncoderFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TranscodeError>;
