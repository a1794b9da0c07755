//! # Buffer Editing
//!
//! Trimming, concatenation and format conforming of canonical buffers. These
//! are the building blocks of a mashup: the leading segment of every input,
//! conformed to a common layout, joined end to end.

use crate::channels::ChannelMapping;
use crate::error::{Result, TranscodeError};
use crate::resample::resample_cancellable;
use core_decoder::{AudioBuffer, SamplePrecision};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

fn frames_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Keep `length` of audio starting at `start`.
///
/// Ranges reaching past the end are clamped, so a short input yields a
/// shorter (possibly empty) buffer.
pub fn trim(buffer: AudioBuffer, start: Duration, length: Duration) -> Result<AudioBuffer> {
    let rate = buffer.sample_rate();
    let frames = buffer.frames();
    let first = frames_for(start, rate).min(frames);
    let last = first.saturating_add(frames_for(length, rate)).min(frames);

    if first == 0 && last == frames {
        return Ok(buffer);
    }

    let (mut samples, sample_rate, channels, precision) = buffer.into_parts();
    let width = channels as usize;
    samples.truncate(last * width);
    samples.drain(..first * width);

    debug!(first, last, "Trimmed buffer");
    Ok(AudioBuffer::from_interleaved(
        samples,
        sample_rate,
        channels,
        precision,
    )?)
}

/// Join buffers end to end. All parts must share sample rate and channel
/// count; see [`conform`].
pub fn concat(buffers: Vec<AudioBuffer>) -> Result<AudioBuffer> {
    let mut parts = buffers.into_iter();
    let first = parts.next().ok_or_else(|| {
        TranscodeError::IncompatibleBuffers("nothing to concatenate".to_string())
    })?;

    let sample_rate = first.sample_rate();
    let channels = first.channels();
    let mut precision = first.precision();
    let (mut samples, _, _, _) = first.into_parts();

    for (index, part) in parts.enumerate() {
        if part.sample_rate() != sample_rate || part.channels() != channels {
            return Err(TranscodeError::IncompatibleBuffers(format!(
                "part {} is {} Hz / {} ch, expected {} Hz / {} ch",
                index + 1,
                part.sample_rate(),
                part.channels(),
                sample_rate,
                channels
            )));
        }
        if part.precision() != precision {
            precision = SamplePrecision::F32;
        }
        samples.extend_from_slice(part.samples());
    }

    Ok(AudioBuffer::from_interleaved(
        samples,
        sample_rate,
        channels,
        precision,
    )?)
}

/// Convert a buffer to the given sample rate and channel count.
///
/// Downmixes before resampling and upmixes after, so the resampler always
/// runs on the smaller number of channels.
pub fn conform(buffer: AudioBuffer, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    conform_cancellable(buffer, sample_rate, channels, &CancellationToken::new())
}

/// [`conform`] with a cancellation token handed to the resampler.
pub fn conform_cancellable(
    buffer: AudioBuffer,
    sample_rate: u32,
    channels: u16,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    let mapping = ChannelMapping::plan(buffer.channels(), channels)?;

    if channels < buffer.channels() {
        resample_cancellable(mapping.apply(buffer)?, sample_rate, cancel)
    } else {
        mapping.apply(resample_cancellable(buffer, sample_rate, cancel)?)
    }
}
