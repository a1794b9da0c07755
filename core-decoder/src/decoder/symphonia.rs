//! # Symphonia Decoder Implementation
//!
//! Decodes a whole in-memory payload with symphonia and collects the result
//! into an [`AudioBuffer`].

use crate::buffer::{AudioBuffer, SamplePrecision};
use crate::decoder::format_detector::{AudioCodec, ContainerFormat, FormatDetector};
use crate::decoder::sample_converter::SampleConverter;
use crate::error::{DecoderError, Result};
use bytes::Bytes;
use core_runtime::ResourceLimits;
use std::io::{Cursor, ErrorKind};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Consecutive undecodable packets tolerated in a lossy stream.
const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Decoder over a single payload.
///
/// Created by [`SymphoniaDecoder::open`], which probes the container and
/// validates the track parameters against the resource limits. The decoder is
/// consumed by [`SymphoniaDecoder::decode_all`].
pub struct SymphoniaDecoder {
    /// Format reader (demuxer) - owns the media source stream
    format_reader: Box<dyn FormatReader>,

    /// Codec decoder for the selected track
    decoder: Box<dyn Decoder>,

    track_id: u32,
    container: ContainerFormat,
    codec: AudioCodec,
    sample_rate: u32,

    /// Channel count from the track header, if the container declares one.
    /// AAC in MP4 only reveals it after the first packet.
    channels: Option<u16>,

    /// Frame count declared by the container header.
    declared_frames: Option<u64>,
}

impl SymphoniaDecoder {
    /// Probe the payload and prepare a codec decoder for its first audio track.
    ///
    /// # Errors
    ///
    /// - [`DecoderError::Malformed`] if the container cannot be parsed
    /// - [`DecoderError::UnsupportedFormat`] if the track's codec is unsupported
    /// - [`DecoderError::ChannelLimitExceeded`] / [`DecoderError::DurationLimitExceeded`]
    ///   if the header already violates the limits
    #[instrument(skip(payload, limits), fields(bytes = payload.len()))]
    pub fn open(payload: Bytes, container: ContainerFormat, limits: &ResourceLimits) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(payload)), Default::default());
        let hint = FormatDetector::hint_for(container);

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed: {}", e);
                DecoderError::Malformed {
                    format: container,
                    frame_offset: 0,
                    reason: format!("failed to probe stream: {}", e),
                }
            })?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecoderError::Malformed {
                format: container,
                frame_offset: 0,
                reason: "no decodable audio track".to_string(),
            })?;

        let track_id = track.id;
        let params = &track.codec_params;
        let codec = FormatDetector::detect_codec(params.codec);

        let sample_rate = params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| DecoderError::Malformed {
                format: container,
                frame_offset: 0,
                reason: "missing sample rate".to_string(),
            })?;

        let channels = params.channels.map(|ch| ch.count() as u16);
        if let Some(count) = channels {
            check_channels(count as usize, limits)?;
        }

        let declared_frames = params.n_frames.filter(|frames| *frames > 0);
        if let Some(frames) = declared_frames {
            if frames > limits.max_frames(sample_rate) {
                warn!(frames, sample_rate, "Declared length exceeds duration limit");
                return Err(DecoderError::DurationLimitExceeded {
                    limit: limits.max_duration,
                });
            }
        }

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                match e {
                    SymphoniaError::Unsupported(what) => DecoderError::UnsupportedFormat(format!(
                        "{} stream uses an unsupported codec ({})",
                        container, what
                    )),
                    other => DecoderError::Malformed {
                        format: container,
                        frame_offset: 0,
                        reason: format!("failed to create codec decoder: {}", other),
                    },
                }
            })?;

        info!(
            %container,
            ?codec,
            sample_rate,
            ?channels,
            ?declared_frames,
            "Decoder initialized"
        );

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            container,
            codec,
            sample_rate,
            channels,
            declared_frames,
        })
    }

    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    /// Decode every packet of the selected track.
    ///
    /// Lossless streams fail on the first undecodable packet. Lossy streams
    /// skip isolated bad packets, failing after [`MAX_CONSECUTIVE_ERRORS`] in
    /// a row.
    #[instrument(skip_all, fields(container = %self.container))]
    pub fn decode_all(
        mut self,
        limits: &ResourceLimits,
        cancel: &CancellationToken,
    ) -> Result<AudioBuffer> {
        let container = self.container;
        let max_frames = limits.max_frames(self.sample_rate);
        let expected = self.declared_frames.unwrap_or(0).min(max_frames) as usize;
        let mut samples: Vec<f32> =
            Vec::with_capacity(expected * self.channels.unwrap_or(1) as usize);

        let mut frames: u64 = 0;
        let mut channels = self.channels;
        let mut precision = None;
        let mut consecutive_errors = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(frames, "Decode cancelled");
                return Err(DecoderError::Cancelled);
            }

            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!(frames, "End of stream");
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(malformed(container, frames, "track list changed mid-stream"));
                }
                Err(e) => {
                    error!("Failed to read packet: {}", e);
                    return Err(malformed(
                        container,
                        frames,
                        format!("failed to read packet: {}", e),
                    ));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(reason)) if self.codec.is_lossy() => {
                    consecutive_errors += 1;
                    warn!(
                        frames,
                        consecutive_errors, "Skipping undecodable packet: {}", reason
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(malformed(
                            container,
                            frames,
                            format!("{} consecutive undecodable packets", consecutive_errors),
                        ));
                    }
                    continue;
                }
                Err(e) => {
                    error!("Packet decode failed: {}", e);
                    return Err(malformed(container, frames, e.to_string()));
                }
            };
            consecutive_errors = 0;

            let packet_rate = decoded.spec().rate;
            let packet_channels = decoded.spec().channels.count();
            check_channels(packet_channels, limits)?;

            match channels {
                None => channels = Some(packet_channels as u16),
                Some(known) if known as usize != packet_channels => {
                    return Err(malformed(
                        container,
                        frames,
                        format!("channel count changed from {} to {}", known, packet_channels),
                    ));
                }
                Some(_) => {}
            }
            if packet_rate != self.sample_rate {
                return Err(malformed(
                    container,
                    frames,
                    format!("sample rate changed from {} to {}", self.sample_rate, packet_rate),
                ));
            }
            precision.get_or_insert_with(|| SampleConverter::precision(&decoded));

            frames += SampleConverter::append_interleaved(&decoded, &mut samples) as u64;
            if frames > max_frames {
                warn!(frames, max_frames, "Decoded audio exceeds duration limit");
                return Err(DecoderError::DurationLimitExceeded {
                    limit: limits.max_duration,
                });
            }
        }

        if container.has_exact_length() {
            if let Some(declared) = self.declared_frames {
                if frames < declared {
                    error!(frames, declared, "Stream ended early");
                    return Err(malformed(
                        container,
                        frames,
                        format!("truncated: header declares {} frames", declared),
                    ));
                }
            }
        }

        let channels = channels
            .ok_or_else(|| malformed(container, frames, "stream contains no audio frames"))?;

        info!(frames, channels, sample_rate = self.sample_rate, "Decode complete");

        AudioBuffer::from_interleaved(
            samples,
            self.sample_rate,
            channels,
            precision.unwrap_or(SamplePrecision::Unknown),
        )
    }
}

fn malformed(format: ContainerFormat, frame_offset: u64, reason: impl Into<String>) -> DecoderError {
    DecoderError::Malformed {
        format,
        frame_offset,
        reason: reason.into(),
    }
}

fn check_channels(channels: usize, limits: &ResourceLimits) -> Result<()> {
    if channels > limits.max_channels as usize {
        warn!(channels, limit = limits.max_channels, "Channel limit exceeded");
        return Err(DecoderError::ChannelLimitExceeded {
            channels,
            limit: limits.max_channels,
        });
    }
    Ok(())
}
