//! # Audio Decoder Module
//!
//! Decoding of complete in-memory payloads through symphonia.
//!
//! ## Supported Containers
//!
//! | Container | Signature | Exact frame count |
//! |-----------|-----------|-------------------|
//! | WAV | `RIFF....WAVE` | yes |
//! | AIFF | `FORM....AIFF` / `AIFC` | yes |
//! | FLAC | `fLaC` | yes |
//! | Ogg (Vorbis, Opus, FLAC) | `OggS` | no |
//! | MP3 | `ID3` or MPEG frame sync | no |
//! | AAC (ADTS) | ADTS frame sync | no |
//! | MP4 / M4A | `....ftyp` | no |
//! | Matroska / WebM | EBML header | no |
//!
//! ## Architecture
//!
//! ```text
//! Bytes → FormatDetector::sniff → Hint → FormatReader → Decoder → SampleConverter
//! ```
//!
//! The container is chosen from the content signature alone. The sniffed
//! container is then passed to symphonia's probe as an extension hint.

mod format_detector;
mod sample_converter;
mod symphonia;

pub use self::symphonia::SymphoniaDecoder;
pub use format_detector::{AudioCodec, ContainerFormat, FormatDetector};
pub use sample_converter::SampleConverter;

use crate::buffer::AudioBuffer;
use crate::error::{DecoderError, Result};
use bytes::Bytes;
use core_runtime::ResourceLimits;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decode a complete payload into the canonical buffer.
///
/// Checks, in order: payload size, content signature, track parameters
/// against the channel and duration limits, then decodes every packet while
/// re-checking the limits on the running totals.
///
/// # Errors
///
/// - [`DecoderError::PayloadTooLarge`] before any parsing
/// - [`DecoderError::UnsupportedFormat`] if no signature matches
/// - [`DecoderError::Malformed`] for corrupt or truncated streams
/// - [`DecoderError::DurationLimitExceeded`] / [`DecoderError::ChannelLimitExceeded`]
pub fn decode(payload: Bytes, limits: &ResourceLimits) -> Result<AudioBuffer> {
    decode_cancellable(payload, limits, &CancellationToken::new())
}

/// Same as [`decode`], but stops with [`DecoderError::Cancelled`] once the
/// token is cancelled.
pub fn decode_cancellable(
    payload: Bytes,
    limits: &ResourceLimits,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    if payload.len() > limits.max_bytes {
        warn!(
            size = payload.len(),
            limit = limits.max_bytes,
            "Rejecting oversized payload"
        );
        return Err(DecoderError::PayloadTooLarge {
            size: payload.len(),
            limit: limits.max_bytes,
        });
    }

    let format = FormatDetector::sniff(&payload)?;
    debug!(%format, bytes = payload.len(), "Sniffed container");

    let decoder = SymphoniaDecoder::open(payload, format, limits)?;
    decoder.decode_all(limits, cancel)
}
