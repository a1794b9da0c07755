//! # Decoder Error Types

use crate::decoder::ContainerFormat;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while turning a payload into an `AudioBuffer`.
#[derive(Error, Debug)]
pub enum DecoderError {
    // ========================================================================
    // Admission Errors
    // ========================================================================
    /// Payload exceeds the configured byte limit. Raised before parsing.
    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Content signature does not match any supported container.
    #[error("Unsupported or unrecognised audio format: {0}")]
    UnsupportedFormat(String),

    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// Container was recognised but the stream is malformed or truncated.
    #[error("Malformed {format} stream at frame {frame_offset}: {reason}")]
    Malformed {
        format: ContainerFormat,
        frame_offset: u64,
        reason: String,
    },

    /// Decoded audio is longer than the configured maximum duration.
    #[error("Audio duration exceeds limit of {limit:?}")]
    DurationLimitExceeded { limit: Duration },

    /// Stream has more channels than the configured maximum.
    #[error("Stream has {channels} channels, limit is {limit}")]
    ChannelLimitExceeded { channels: usize, limit: u16 },

    /// Decoding was cancelled by the caller.
    #[error("Decoding cancelled")]
    Cancelled,

    // ========================================================================
    // Buffer Errors
    // ========================================================================
    /// Sample data does not satisfy the canonical buffer invariants.
    #[error("Invalid audio buffer: {0}")]
    InvalidBuffer(String),
}

impl DecoderError {
    /// Returns `true` if the payload itself is at fault.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            DecoderError::UnsupportedFormat(_) | DecoderError::Malformed { .. }
        )
    }

    /// Returns `true` if a configured resource limit was violated.
    pub fn is_limit_error(&self) -> bool {
        matches!(
            self,
            DecoderError::PayloadTooLarge { .. }
                | DecoderError::DurationLimitExceeded { .. }
                | DecoderError::ChannelLimitExceeded { .. }
        )
    }
}

/// Result type for decoder operations.
pub type Result<T> = std::result::Result<T, DecoderError>;
