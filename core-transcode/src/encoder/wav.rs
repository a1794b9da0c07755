use crate::error::Result;
use crate::format::WavEncoding;
use core_decoder::AudioBuffer;
use std::io::Cursor;

/// Native WAV writer.
pub struct WavEncoder;

impl WavEncoder {
    /// Encode the buffer as a complete WAV file.
    ///
    /// Samples are clamped to `[-1.0, 1.0]` before integer quantization.
    pub fn encode(buffer: &AudioBuffer, encoding: WavEncoding) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
            bits_per_sample: encoding.bits_per_sample(),
            sample_format: match encoding {
                WavEncoding::Float32 => hound::SampleFormat::Float,
                WavEncoding::Pcm16 | WavEncoding::Pcm24 => hound::SampleFormat::Int,
            },
        };

        let header_room = 80;
        let payload = buffer.samples().len() * encoding.bits_per_sample() as usize / 8;
        let mut cursor = Cursor::new(Vec::with_capacity(header_room + payload));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            match encoding {
                WavEncoding::Pcm16 => {
                    for &sample in buffer.samples() {
                        writer.write_sample(quantize(sample, i16::MAX as f32) as i16)?;
                    }
                }
                WavEncoding::Pcm24 => {
                    for &sample in buffer.samples() {
                        writer.write_sample(quantize(sample, 8_388_607.0) as i32)?;
                    }
                }
                WavEncoding::Float32 => {
                    for &sample in buffer.samples() {
                        writer.write_sample(sample)?;
                    }
                }
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }
}

fn quantize(sample: f32, full_scale: f32) -> f32 {
    (sample.clamp(-1.0, 1.0) * full_scale).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_decoder::SamplePrecision;

    fn buffer() -> AudioBuffer {
        AudioBuffer::from_interleaved(
            vec![0.0, 0.5, -0.5, 1.0, 2.0, -2.0],
            8_000,
            2,
            SamplePrecision::F32,
        )
        .unwrap()
    }

    #[test]
    fn test_pcm16_header_and_clamping() {
        let bytes = WavEncoder::encode(&buffer(), WavEncoding::Pcm16).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration(), 3);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16_384, -16_384, 32_767, 32_767, -32_767]);
    }

    #[test]
    fn test_pcm24() {
        let bytes = WavEncoder::encode(&buffer(), WavEncoding::Pcm24).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 24);

        let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples[3], 8_388_607);
    }

    #[test]
    fn test_float32_is_lossless() {
        let bytes = WavEncoder::encode(&buffer(), WavEncoding::Float32).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, buffer().samples());
    }
}
