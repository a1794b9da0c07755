//! # Channel Mapping
//!
//! The single place where channel count conversions are decided.

use crate::error::{Result, TranscodeError};
use core_decoder::AudioBuffer;
use tracing::debug;

/// How source channels become target channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMapping {
    /// Counts match; samples pass through untouched.
    Identity,
    /// Mono source copied into every target channel.
    Duplicate { to: u16 },
    /// All source channels averaged into mono.
    Average { from: u16 },
}

impl ChannelMapping {
    /// Choose the mapping from `from` channels to `to` channels.
    ///
    /// # Errors
    ///
    /// [`TranscodeError::UnsupportedChannelLayout`] when neither side is mono
    /// and the counts differ (for example stereo to 5.1).
    pub fn plan(from: u16, to: u16) -> Result<Self> {
        if from == 0 || to == 0 {
            return Err(TranscodeError::InvalidTarget(format!(
                "channel counts must be positive (from {} to {})",
                from, to
            )));
        }

        match (from, to) {
            (from, to) if from == to => Ok(ChannelMapping::Identity),
            (1, to) => Ok(ChannelMapping::Duplicate { to }),
            (from, 1) => Ok(ChannelMapping::Average { from }),
            (from, to) => Err(TranscodeError::UnsupportedChannelLayout { from, to }),
        }
    }

    /// Channel count after the mapping is applied to a buffer with
    /// `source` channels.
    pub fn output_channels(&self, source: u16) -> u16 {
        match self {
            ChannelMapping::Identity => source,
            ChannelMapping::Duplicate { to } => *to,
            ChannelMapping::Average { .. } => 1,
        }
    }

    /// Apply the mapping, consuming the source buffer.
    pub fn apply(&self, buffer: AudioBuffer) -> Result<AudioBuffer> {
        let expected_source = match *self {
            ChannelMapping::Identity => return Ok(buffer),
            ChannelMapping::Duplicate { .. } => 1,
            ChannelMapping::Average { from } => from,
        };
        if buffer.channels() != expected_source {
            return Err(TranscodeError::IncompatibleBuffers(format!(
                "mapping {:?} applied to a {}-channel buffer",
                self,
                buffer.channels()
            )));
        }

        let (samples, sample_rate, channels, precision) = buffer.into_parts();
        let mapped = match self {
            ChannelMapping::Identity => samples,
            ChannelMapping::Duplicate { to } => {
                let to = *to as usize;
                let mut out = Vec::with_capacity(samples.len() * to);
                for sample in samples {
                    out.extend(std::iter::repeat(sample).take(to));
                }
                out
            }
            ChannelMapping::Average { from } => {
                let scale = 1.0 / *from as f32;
                samples
                    .chunks_exact(channels as usize)
                    .map(|frame| frame.iter().sum::<f32>() * scale)
                    .collect()
            }
        };

        debug!(from = channels, mapping = ?self, "Applied channel mapping");
        Ok(AudioBuffer::from_interleaved(
            mapped,
            sample_rate,
            self.output_channels(channels),
            precision,
        )?)
    }
}
