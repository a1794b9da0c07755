//! # Sample Rate Conversion
//!
//! Windowed-sinc resampling with rubato. The output always has exactly
//! `round(frames * target / source)` frames, and the resampler's filter delay
//! is removed so the signal stays aligned with the source.

use crate::error::{Result, TranscodeError};
use crate::format::MAX_SAMPLE_RATE;
use core_decoder::AudioBuffer;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Input frames handed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

/// Number of frames a buffer of `frames` at `source_rate` has after
/// conversion to `target_rate`, rounded half up.
pub fn output_frames(frames: usize, source_rate: u32, target_rate: u32) -> usize {
    let numerator = frames as u128 * target_rate as u128 + source_rate as u128 / 2;
    (numerator / source_rate as u128) as usize
}

/// Resample every channel of `buffer` to `target_rate`.
///
/// Returns the buffer unchanged when the rates already match. The channel
/// count is never altered.
pub fn resample(buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    resample_cancellable(buffer, target_rate, &CancellationToken::new())
}

/// Same as [`resample`], checking `cancel` before every chunk.
///
/// # Errors
///
/// [`TranscodeError::Cancelled`] once the token is cancelled.
#[instrument(skip(buffer, cancel), fields(source_rate = buffer.sample_rate(), frames = buffer.frames()))]
pub fn resample_cancellable(
    buffer: AudioBuffer,
    target_rate: u32,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    let source_rate = buffer.sample_rate();
    if target_rate == 0 || target_rate > MAX_SAMPLE_RATE {
        return Err(TranscodeError::InvalidTarget(format!(
            "sample rate {} outside 1..={}",
            target_rate, MAX_SAMPLE_RATE
        )));
    }
    if source_rate == target_rate {
        return Ok(buffer);
    }

    let frames = buffer.frames();
    let channels = buffer.channels() as usize;
    let precision = buffer.precision();
    let expected = output_frames(frames, source_rate, target_rate);

    if frames == 0 {
        return Ok(AudioBuffer::from_interleaved(
            Vec::new(),
            target_rate,
            buffer.channels(),
            precision,
        )?);
    }

    let planes = buffer.to_planar();
    drop(buffer);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, channels)
        .map_err(|e| TranscodeError::Resample(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];

    let mut pos = 0;
    while frames - pos >= resampler.input_frames_next() {
        if cancel.is_cancelled() {
            debug!(pos, frames, "Resample cancelled");
            return Err(TranscodeError::Cancelled);
        }
        let end = pos + resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planes.iter().map(|plane| &plane[pos..end]).collect();
        let produced = resampler
            .process(&chunk, None)
            .map_err(|e| TranscodeError::Resample(format!("Resample failed: {}", e)))?;
        append(&mut output, produced);
        pos = end;
    }

    if pos < frames {
        let chunk: Vec<&[f32]> = planes.iter().map(|plane| &plane[pos..]).collect();
        let produced = resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| TranscodeError::Resample(format!("Resample failed: {}", e)))?;
        append(&mut output, produced);
    }

    // Flush the filter tail until the delayed signal is fully out
    while output[0].len() < wanted {
        let produced = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| TranscodeError::Resample(format!("Resample flush failed: {}", e)))?;
        if produced.first().map_or(true, Vec::is_empty) {
            break;
        }
        append(&mut output, produced);
    }

    for plane in &mut output {
        plane.drain(..delay.min(plane.len()));
        plane.resize(expected, 0.0);
    }

    debug!(target_rate, delay, output_frames = expected, "Resampled");
    Ok(AudioBuffer::from_planar(output, target_rate, precision)?)
}

fn append(output: &mut [Vec<f32>], produced: Vec<Vec<f32>>) {
    for (plane, chunk) in output.iter_mut().zip(produced) {
        plane.extend_from_slice(&chunk);
    }
}
