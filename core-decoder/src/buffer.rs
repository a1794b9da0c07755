//! # Canonical Audio Buffer
//!
//! Every decoder output and every transcode input is an [`AudioBuffer`]:
//! interleaved `f32` samples in `[-1.0, 1.0]` plus the stream's sample rate
//! and channel count. The buffer is owned by exactly one job and is never
//! cloned implicitly.

use crate::error::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample representation of the source stream before conversion to `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePrecision {
    U8,
    S8,
    U16,
    S16,
    U24,
    S24,
    U32,
    S32,
    F32,
    F64,
    Unknown,
}

impl SamplePrecision {
    /// Bit depth of the source samples, if known.
    pub fn bits_per_sample(&self) -> Option<u16> {
        match self {
            SamplePrecision::U8 | SamplePrecision::S8 => Some(8),
            SamplePrecision::U16 | SamplePrecision::S16 => Some(16),
            SamplePrecision::U24 | SamplePrecision::S24 => Some(24),
            SamplePrecision::U32 | SamplePrecision::S32 | SamplePrecision::F32 => Some(32),
            SamplePrecision::F64 => Some(64),
            SamplePrecision::Unknown => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SamplePrecision::F32 | SamplePrecision::F64)
    }
}

/// Uniform in-memory sample representation, independent of the source
/// container and codec.
///
/// ## Invariants
///
/// - `sample_rate > 0` and `channels > 0`
/// - `samples.len()` is a whole multiple of `channels`
/// - Samples are interleaved (`L R L R ...` for stereo)
///
/// The fields are private so that a constructed buffer always upholds these.
#[derive(Debug, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    precision: SamplePrecision,
}

impl AudioBuffer {
    /// Build a buffer from interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::InvalidBuffer`] if the sample rate or channel
    /// count is zero, or if the sample count is not a whole number of frames.
    pub fn from_interleaved(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        precision: SamplePrecision,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DecoderError::InvalidBuffer(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(DecoderError::InvalidBuffer(
                "channel count must be greater than 0".to_string(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(DecoderError::InvalidBuffer(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        Ok(Self {
            samples,
            sample_rate,
            channels,
            precision,
        })
    }

    /// Build a buffer from one vector per channel. All planes must have the
    /// same length.
    pub fn from_planar(
        planes: Vec<Vec<f32>>,
        sample_rate: u32,
        precision: SamplePrecision,
    ) -> Result<Self> {
        let channels = u16::try_from(planes.len()).map_err(|_| {
            DecoderError::InvalidBuffer(format!("{} channels is out of range", planes.len()))
        })?;
        let frames = planes.first().map(Vec::len).unwrap_or(0);
        if planes.iter().any(|plane| plane.len() != frames) {
            return Err(DecoderError::InvalidBuffer(
                "channel planes differ in length".to_string(),
            ));
        }

        let mut samples = Vec::with_capacity(frames * planes.len());
        for frame in 0..frames {
            for plane in &planes {
                samples.push(plane[frame]);
            }
        }

        Self::from_interleaved(samples, sample_rate, channels, precision)
    }

    /// A zero-filled buffer of the given shape.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Result<Self> {
        Self::from_interleaved(
            vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
            SamplePrecision::F32,
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn precision(&self) -> SamplePrecision {
        self.precision
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of the buffer.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Iterate over the samples of one channel.
    pub fn channel(&self, index: u16) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels as usize)
            .copied()
    }

    /// Split into one vector per channel.
    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        let channels = self.channels as usize;
        let mut planes = vec![Vec::with_capacity(self.frames()); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (plane, sample) in planes.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }
        planes
    }

    /// Average all channels into a single mono signal.
    pub fn mono_mixdown(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }

        let scale = 1.0 / self.channels as f32;
        self.samples
            .chunks_exact(self.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }

    /// Consume the buffer, returning `(samples, sample_rate, channels, precision)`.
    pub fn into_parts(self) -> (Vec<f32>, u32, u16, SamplePrecision) {
        (self.samples, self.sample_rate, self.channels, self.precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_partial_frames() {
        let result = AudioBuffer::from_interleaved(vec![0.0; 5], 44_100, 2, SamplePrecision::S16);
        assert!(matches!(result, Err(DecoderError::InvalidBuffer(_))));
    }

    #[test]
    fn test_rejects_zero_rate_and_channels() {
        assert!(AudioBuffer::from_interleaved(vec![], 0, 1, SamplePrecision::S16).is_err());
        assert!(AudioBuffer::from_interleaved(vec![], 44_100, 0, SamplePrecision::S16).is_err());
    }

    #[test]
    fn test_frames_and_duration() {
        let buffer = AudioBuffer::silence(22_050, 44_100, 2).unwrap();
        assert_eq!(buffer.frames(), 22_050);
        assert_eq!(buffer.samples().len(), 44_100);
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_planar_round_trip() {
        let planes = vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]];
        let buffer = AudioBuffer::from_planar(planes.clone(), 8_000, SamplePrecision::F32).unwrap();

        assert_eq!(buffer.samples(), &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
        assert_eq!(buffer.to_planar(), planes);
        assert_eq!(buffer.channel(1).collect::<Vec<_>>(), vec![-0.1, -0.2, -0.3]);
    }

    #[test]
    fn test_planar_length_mismatch() {
        let planes = vec![vec![0.0; 3], vec![0.0; 2]];
        assert!(AudioBuffer::from_planar(planes, 8_000, SamplePrecision::F32).is_err());
    }

    #[test]
    fn test_mono_mixdown_averages() {
        let buffer =
            AudioBuffer::from_interleaved(vec![1.0, 0.0, 0.5, 0.5], 8_000, 2, SamplePrecision::F32)
                .unwrap();
        assert_eq!(buffer.mono_mixdown(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_precision_bits() {
        assert_eq!(SamplePrecision::S24.bits_per_sample(), Some(24));
        assert_eq!(SamplePrecision::Unknown.bits_per_sample(), None);
        assert!(SamplePrecision::F64.is_float());
    }
}
