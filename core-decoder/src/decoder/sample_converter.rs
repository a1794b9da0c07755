//! # Sample Format Converter
//!
//! Converts symphonia's planar buffers of any sample type into the
//! interleaved `f32` layout of [`AudioBuffer`](crate::AudioBuffer).

use crate::buffer::SamplePrecision;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

/// Sample converter that normalizes audio to interleaved `f32` in `[-1.0, 1.0]`.
pub struct SampleConverter;

impl SampleConverter {
    /// Append the decoded packet to `out` as interleaved `f32` samples.
    ///
    /// Returns the number of frames appended.
    pub fn append_interleaved(buffer: &AudioBufferRef<'_>, out: &mut Vec<f32>) -> usize {
        match buffer {
            AudioBufferRef::F32(buf) => Self::interleave_f32(buf, out),
            AudioBufferRef::F64(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S32(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S24(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S16(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::S8(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U32(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U24(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U16(buf) => Self::convert_and_interleave(buf, out),
            AudioBufferRef::U8(buf) => Self::convert_and_interleave(buf, out),
        }
    }

    /// Sample representation of the decoded packet.
    pub fn precision(buffer: &AudioBufferRef<'_>) -> SamplePrecision {
        match buffer {
            AudioBufferRef::F32(_) => SamplePrecision::F32,
            AudioBufferRef::F64(_) => SamplePrecision::F64,
            AudioBufferRef::S32(_) => SamplePrecision::S32,
            AudioBufferRef::S24(_) => SamplePrecision::S24,
            AudioBufferRef::S16(_) => SamplePrecision::S16,
            AudioBufferRef::S8(_) => SamplePrecision::S8,
            AudioBufferRef::U32(_) => SamplePrecision::U32,
            AudioBufferRef::U24(_) => SamplePrecision::U24,
            AudioBufferRef::U16(_) => SamplePrecision::U16,
            AudioBufferRef::U8(_) => SamplePrecision::U8,
        }
    }

    fn interleave_f32(buffer: &AudioBuffer<f32>, out: &mut Vec<f32>) -> usize {
        let channels = buffer.spec().channels.count();
        let frames = buffer.frames();

        if channels == 1 {
            out.extend_from_slice(buffer.chan(0));
            return frames;
        }

        let planes: Vec<&[f32]> = (0..channels).map(|ch| buffer.chan(ch)).collect();
        out.reserve(frames * channels);
        for frame in 0..frames {
            for plane in &planes {
                out.push(plane[frame]);
            }
        }
        frames
    }

    fn convert_and_interleave<S>(buffer: &AudioBuffer<S>, out: &mut Vec<f32>) -> usize
    where
        S: Sample + IntoSample<f32>,
    {
        let channels = buffer.spec().channels.count();
        let frames = buffer.frames();

        let planes: Vec<&[S]> = (0..channels).map(|ch| buffer.chan(ch)).collect();
        out.reserve(frames * channels);
        for frame in 0..frames {
            for plane in &planes {
                out.push(plane[frame].into_sample());
            }
        }
        frames
    }
}
