//! # Format Detection Module
//!
//! Identifies the container of a payload from its leading bytes and maps
//! symphonia codec types onto [`AudioCodec`].

use crate::error::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use symphonia::core::codecs::CodecType;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Container formats recognised by content signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    Wav,
    Aiff,
    Flac,
    Ogg,
    Mp3,
    Adts,
    Mp4,
    Matroska,
}

impl ContainerFormat {
    /// Extension handed to symphonia's probe as a hint.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Wav => "wav",
            ContainerFormat::Aiff => "aiff",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Ogg => "ogg",
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Adts => "aac",
            ContainerFormat::Mp4 => "m4a",
            ContainerFormat::Matroska => "mka",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Wav => "audio/wav",
            ContainerFormat::Aiff => "audio/aiff",
            ContainerFormat::Flac => "audio/flac",
            ContainerFormat::Ogg => "audio/ogg",
            ContainerFormat::Mp3 => "audio/mpeg",
            ContainerFormat::Adts => "audio/aac",
            ContainerFormat::Mp4 => "audio/mp4",
            ContainerFormat::Matroska => "audio/x-matroska",
        }
    }

    /// Whether the container header declares the exact number of frames, so
    /// that a short stream can be reported as truncated.
    pub fn has_exact_length(&self) -> bool {
        matches!(
            self,
            ContainerFormat::Wav | ContainerFormat::Aiff | ContainerFormat::Flac
        )
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Wav => "WAV",
            ContainerFormat::Aiff => "AIFF",
            ContainerFormat::Flac => "FLAC",
            ContainerFormat::Ogg => "Ogg",
            ContainerFormat::Mp3 => "MP3",
            ContainerFormat::Adts => "ADTS",
            ContainerFormat::Mp4 => "MP4",
            ContainerFormat::Matroska => "Matroska",
        };
        f.write_str(name)
    }
}

/// Codec family of the selected track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Pcm,
    Flac,
    Alac,
    Mp3,
    Aac,
    Vorbis,
    Opus,
    Unknown,
}

impl AudioCodec {
    /// Lossy streams tolerate a bounded number of undecodable packets.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            AudioCodec::Mp3 | AudioCodec::Aac | AudioCodec::Vorbis | AudioCodec::Opus
        )
    }
}

/// One entry of the signature table. Matchers run in table order and the
/// first hit wins.
struct Signature {
    format: ContainerFormat,
    matches: fn(&[u8]) -> bool,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        format: ContainerFormat::Wav,
        matches: is_riff_wave,
    },
    Signature {
        format: ContainerFormat::Flac,
        matches: is_flac,
    },
    Signature {
        format: ContainerFormat::Ogg,
        matches: is_ogg,
    },
    Signature {
        format: ContainerFormat::Mp3,
        matches: is_mpeg_audio,
    },
    Signature {
        format: ContainerFormat::Adts,
        matches: is_adts,
    },
    Signature {
        format: ContainerFormat::Mp4,
        matches: is_iso_bmff,
    },
    Signature {
        format: ContainerFormat::Matroska,
        matches: is_ebml,
    },
    Signature {
        format: ContainerFormat::Aiff,
        matches: is_aiff,
    },
];

fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn is_flac(bytes: &[u8]) -> bool {
    bytes.starts_with(b"fLaC")
}

fn is_ogg(bytes: &[u8]) -> bool {
    bytes.starts_with(b"OggS")
}

fn is_mpeg_audio(bytes: &[u8]) -> bool {
    if bytes.starts_with(b"ID3") {
        return true;
    }
    // 11-bit frame sync, layer bits must not be the reserved 00 (that is ADTS)
    bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 && bytes[1] & 0x06 != 0
}

fn is_adts(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xF6 == 0xF0
}

fn is_iso_bmff(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && &bytes[4..8] == b"ftyp"
}

fn is_ebml(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
}

fn is_aiff(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"FORM" && matches!(&bytes[8..12], b"AIFF" | b"AIFC")
}

/// Format detector for audio payloads.
pub struct FormatDetector;

impl FormatDetector {
    /// Identify the container from the payload's leading bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::UnsupportedFormat`] if no signature matches.
    pub fn sniff(bytes: &[u8]) -> Result<ContainerFormat> {
        SIGNATURES
            .iter()
            .find(|signature| (signature.matches)(bytes))
            .map(|signature| signature.format)
            .ok_or_else(|| {
                let head: Vec<String> = bytes
                    .iter()
                    .take(8)
                    .map(|byte| format!("{:02x}", byte))
                    .collect();
                debug!(head = %head.join(" "), "No container signature matched");
                DecoderError::UnsupportedFormat(if bytes.is_empty() {
                    "empty payload".to_string()
                } else {
                    format!("unrecognised signature [{}]", head.join(" "))
                })
            })
    }

    /// Create a probe hint from a sniffed container.
    pub fn hint_for(format: ContainerFormat) -> Hint {
        let mut hint = Hint::new();
        hint.with_extension(format.extension())
            .mime_type(format.mime_type());
        hint
    }

    /// Map a symphonia codec type onto [`AudioCodec`].
    pub fn detect_codec(codec_type: CodecType) -> AudioCodec {
        use symphonia::core::codecs::*;

        if codec_type == CODEC_TYPE_MP3 {
            AudioCodec::Mp3
        } else if codec_type == CODEC_TYPE_AAC {
            AudioCodec::Aac
        } else if codec_type == CODEC_TYPE_FLAC {
            AudioCodec::Flac
        } else if codec_type == CODEC_TYPE_VORBIS {
            AudioCodec::Vorbis
        } else if codec_type == CODEC_TYPE_OPUS {
            AudioCodec::Opus
        } else if codec_type == CODEC_TYPE_ALAC {
            AudioCodec::Alac
        } else if [
            CODEC_TYPE_PCM_U8,
            CODEC_TYPE_PCM_S8,
            CODEC_TYPE_PCM_S16LE,
            CODEC_TYPE_PCM_S16BE,
            CODEC_TYPE_PCM_S24LE,
            CODEC_TYPE_PCM_S24BE,
            CODEC_TYPE_PCM_S32LE,
            CODEC_TYPE_PCM_S32BE,
            CODEC_TYPE_PCM_F32LE,
            CODEC_TYPE_PCM_F32BE,
            CODEC_TYPE_PCM_F64LE,
            CODEC_TYPE_PCM_F64BE,
            CODEC_TYPE_PCM_ALAW,
            CODEC_TYPE_PCM_MULAW,
        ]
        .contains(&codec_type)
        {
            AudioCodec::Pcm
        } else {
            warn!("Unknown codec type: {:?}", codec_type);
            AudioCodec::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_header() -> Vec<u8> {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&36u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes
    }

    #[test]
    fn test_sniff_known_signatures() {
        assert_eq!(FormatDetector::sniff(&wav_header()).unwrap(), ContainerFormat::Wav);
        assert_eq!(FormatDetector::sniff(b"fLaC\0\0\0\x22").unwrap(), ContainerFormat::Flac);
        assert_eq!(FormatDetector::sniff(b"OggS\0\x02").unwrap(), ContainerFormat::Ogg);
        assert_eq!(FormatDetector::sniff(b"ID3\x04\0").unwrap(), ContainerFormat::Mp3);
        assert_eq!(FormatDetector::sniff(&[0xFF, 0xFB, 0x90, 0x64]).unwrap(), ContainerFormat::Mp3);
        assert_eq!(FormatDetector::sniff(&[0xFF, 0xF1, 0x50, 0x80]).unwrap(), ContainerFormat::Adts);
        assert_eq!(
            FormatDetector::sniff(b"\0\0\0\x20ftypM4A ").unwrap(),
            ContainerFormat::Mp4
        );
        assert_eq!(
            FormatDetector::sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F]).unwrap(),
            ContainerFormat::Matroska
        );
        assert_eq!(FormatDetector::sniff(b"FORM\0\0\0\x2eAIFF").unwrap(), ContainerFormat::Aiff);
    }

    #[test]
    fn test_sniff_ignores_riff_without_wave() {
        let result = FormatDetector::sniff(b"RIFF\0\0\0\0AVI LIST");
        assert!(matches!(result, Err(DecoderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_sniff_unknown_and_empty() {
        assert!(matches!(
            FormatDetector::sniff(b"%PDF-1.7"),
            Err(DecoderError::UnsupportedFormat(_))
        ));
        let err = FormatDetector::sniff(&[]).unwrap_err();
        assert!(err.to_string().contains("empty payload"));
    }

    #[test]
    fn test_exact_length_containers() {
        assert!(ContainerFormat::Wav.has_exact_length());
        assert!(ContainerFormat::Flac.has_exact_length());
        assert!(!ContainerFormat::Mp3.has_exact_length());
        assert!(!ContainerFormat::Ogg.has_exact_length());
    }

    #[test]
    fn test_detect_codec() {
        use symphonia::core::codecs::{CODEC_TYPE_MP3, CODEC_TYPE_PCM_S16LE};

        assert_eq!(FormatDetector::detect_codec(CODEC_TYPE_MP3), AudioCodec::Mp3);
        assert_eq!(FormatDetector::detect_codec(CODEC_TYPE_PCM_S16LE), AudioCodec::Pcm);
        assert!(AudioCodec::Mp3.is_lossy());
        assert!(!AudioCodec::Flac.is_lossy());
    }
}
