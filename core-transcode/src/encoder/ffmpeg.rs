use super::ExternalEncoder;
use crate::error::Result;
use crate::format::{OutputContainer, TargetFormat};
use crate::process::CodecProcess;
use async_trait::async_trait;
use bytes::Bytes;
use core_runtime::CodecToolConfig;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// [`ExternalEncoder`] that pipes WAV through `ffmpeg`.
///
/// Input arrives on stdin and the encoded stream is written to stdout, so
/// nothing touches the filesystem.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    stderr_tail_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(config: &CodecToolConfig) -> Self {
        Self {
            program: config.program.clone(),
            stderr_tail_bytes: config.stderr_tail_bytes,
        }
    }

    /// Command line for one encode.
    pub fn arguments(target: &TargetFormat) -> Vec<String> {
        let (codec, muxer) = match target.container {
            OutputContainer::Wav => ("pcm_s16le", "wav"),
            OutputContainer::Flac => ("flac", "flac"),
            OutputContainer::Mp3 => ("libmp3lame", "mp3"),
            OutputContainer::Ogg => ("libvorbis", "ogg"),
            OutputContainer::Opus => ("libopus", "opus"),
            OutputContainer::M4a => ("aac", "mp4"),
        };

        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "wav",
            "-i",
            "pipe:0",
            "-vn",
            "-map_metadata",
            "-1",
            "-c:a",
            codec,
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();

        if let Some(kbps) = target.effective_bitrate() {
            args.push("-b:a".to_string());
            args.push(format!("{}k", kbps));
        }

        // MP4 cannot seek back on a pipe to write its index
        if target.container == OutputContainer::M4a {
            args.push("-movflags".to_string());
            args.push("frag_keyframe+empty_moov".to_string());
        }

        args.push("-f".to_string());
        args.push(muxer.to_string());
        args.push("pipe:1".to_string());
        args
    }
}

#[async_trait]
impl ExternalEncoder for FfmpegEncoder {
    #[instrument(skip(self, wav), fields(container = %target.container, bytes = wav.len()))]
    async fn encode(&self, wav: Bytes, target: &TargetFormat, deadline: Instant) -> Result<Bytes> {
        let args = Self::arguments(target);
        debug!(program = %self.program.display(), ?args, "Launching encoder");

        let process = CodecProcess::spawn(&self.program, &args, self.stderr_tail_bytes)?;
        let encoded = process.communicate(wav, deadline).await?;
        Ok(Bytes::from(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscodeError;
    use std::time::Duration;

    #[test]
    fn test_mp3_arguments() {
        let args = FfmpegEncoder::arguments(&TargetFormat::mp3());
        let joined = args.join(" ");

        assert!(joined.starts_with("-hide_banner -loglevel error -f wav -i pipe:0"));
        assert!(joined.contains("-c:a libmp3lame"));
        assert!(joined.contains("-b:a 128k"));
        assert!(joined.ends_with("-f mp3 pipe:1"));
    }

    #[test]
    fn test_lossless_arguments_have_no_bitrate() {
        let args = FfmpegEncoder::arguments(&TargetFormat::new(OutputContainer::Flac));
        assert!(!args.iter().any(|arg| arg == "-b:a"));
    }

    #[test]
    fn test_m4a_is_fragmented() {
        let args = FfmpegEncoder::arguments(&TargetFormat::new(OutputContainer::M4a));
        assert!(args.join(" ").contains("-movflags frag_keyframe+empty_moov"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let config = CodecToolConfig {
            program: PathBuf::from("/nonexistent/ffmpeg"),
            stderr_tail_bytes: 512,
        };
        let encoder = FfmpegEncoder::new(&config);
        let deadline = Instant::now() + Duration::from_secs(5);

        let err = encoder
            .encode(Bytes::from_static(b"RIFF"), &TargetFormat::mp3(), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::EncoderUnavailable { .. }));
    }
}
