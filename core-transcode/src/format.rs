//! # Output Formats
//!
//! Target description for a transcode and the artifact it produces.

use crate::error::{Result, TranscodeError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest output sample rate accepted.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// MP3 bitrate used when the request does not name one.
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 128;

const BITRATE_RANGE_KBPS: std::ops::RangeInclusive<u32> = 8..=512;

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputContainer {
    Wav,
    Flac,
    Mp3,
    Ogg,
    Opus,
    M4a,
}

impl OutputContainer {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputContainer::Wav => "wav",
            OutputContainer::Flac => "flac",
            OutputContainer::Mp3 => "mp3",
            OutputContainer::Ogg => "ogg",
            OutputContainer::Opus => "opus",
            OutputContainer::M4a => "m4a",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputContainer::Wav => "audio/wav",
            OutputContainer::Flac => "audio/flac",
            OutputContainer::Mp3 => "audio/mpeg",
            OutputContainer::Ogg => "audio/ogg",
            OutputContainer::Opus => "audio/ogg; codecs=opus",
            OutputContainer::M4a => "audio/mp4",
        }
    }

    /// Lossy containers accept a bitrate.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            OutputContainer::Mp3 | OutputContainer::Ogg | OutputContainer::Opus | OutputContainer::M4a
        )
    }

    /// Whether the container is produced in-process rather than by the
    /// external codec tool.
    pub fn is_native(&self) -> bool {
        matches!(self, OutputContainer::Wav)
    }
}

impl fmt::Display for OutputContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Sample encoding of WAV output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavEncoding {
    #[default]
    Pcm16,
    Pcm24,
    Float32,
}

impl WavEncoding {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            WavEncoding::Pcm16 => 16,
            WavEncoding::Pcm24 => 24,
            WavEncoding::Float32 => 32,
        }
    }
}

/// Requested output of a transcode.
///
/// Unset sample rate and channel count keep the source values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFormat {
    pub container: OutputContainer,

    #[serde(default)]
    pub sample_rate: Option<u32>,

    #[serde(default)]
    pub channels: Option<u16>,

    /// Bitrate in kbps, lossy containers only.
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,

    #[serde(default)]
    pub wav_encoding: WavEncoding,
}

impl TargetFormat {
    pub fn new(container: OutputContainer) -> Self {
        Self {
            container,
            sample_rate: None,
            channels: None,
            bitrate_kbps: None,
            wav_encoding: WavEncoding::default(),
        }
    }

    pub fn wav() -> Self {
        Self::new(OutputContainer::Wav)
    }

    /// MP3 at the default bitrate.
    pub fn mp3() -> Self {
        Self::new(OutputContainer::Mp3).with_bitrate(DEFAULT_MP3_BITRATE_KBPS)
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }

    pub fn with_wav_encoding(mut self, encoding: WavEncoding) -> Self {
        self.wav_encoding = encoding;
        self
    }

    /// Bitrate passed to the encoder, if any.
    pub fn effective_bitrate(&self) -> Option<u32> {
        match (self.bitrate_kbps, self.container) {
            (Some(kbps), _) => Some(kbps),
            (None, OutputContainer::Mp3) => Some(DEFAULT_MP3_BITRATE_KBPS),
            (None, _) => None,
        }
    }

    /// Validate the target against the configured channel limit.
    pub fn validate(&self, max_channels: u16) -> Result<()> {
        if let Some(rate) = self.sample_rate {
            if rate == 0 || rate > MAX_SAMPLE_RATE {
                return Err(TranscodeError::InvalidTarget(format!(
                    "sample rate {} outside 1..={}",
                    rate, MAX_SAMPLE_RATE
                )));
            }
        }

        if let Some(channels) = self.channels {
            if channels == 0 || channels > max_channels {
                return Err(TranscodeError::InvalidTarget(format!(
                    "channel count {} outside 1..={}",
                    channels, max_channels
                )));
            }
        }

        if let Some(kbps) = self.bitrate_kbps {
            if !self.container.is_lossy() {
                return Err(TranscodeError::InvalidTarget(format!(
                    "bitrate is not applicable to {}",
                    self.container
                )));
            }
            if !BITRATE_RANGE_KBPS.contains(&kbps) {
                return Err(TranscodeError::InvalidTarget(format!(
                    "bitrate {} kbps outside {}..={}",
                    kbps,
                    BITRATE_RANGE_KBPS.start(),
                    BITRATE_RANGE_KBPS.end()
                )));
            }
        }

        Ok(())
    }
}

/// Encoded output of a transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub bytes: Bytes,
    pub container: OutputContainer,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
}

impl EncodedArtifact {
    pub fn content_type(&self) -> &'static str {
        self.container.content_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
