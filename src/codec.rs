//! Collaborator interfaces around the engines: byte compression and audio
//! container decoding. Only the WAV decoder ships here; compression is left
//! to the caller.

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::io::Cursor;

pub trait Compressor {
    fn compress(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>>;
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Decoded mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

pub trait AudioDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio>;
}

/// WAV decoder. Integer and float PCM, multichannel input is mixed to mono.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn decode_reader<R: std::io::Read>(reader: WavReader<R>) -> Result<DecodedAudio> {
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    bail!("unsupported float WAV with {} bits", spec.bits_per_sample);
                }
                reader
                    .into_samples::<f32>()
                    .collect::<std::result::Result<_, _>>()
                    .context("failed to read float samples")?
            }
            SampleFormat::Int => {
                let bits = spec.bits_per_sample;
                if !(1..=32).contains(&bits) {
                    bail!("unsupported integer WAV with {bits} bits");
                }
                let scale = 1.0 / (1u64 << (bits - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<_, _>>()
                    .context("failed to read integer samples")?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(DecodedAudio {
            sample_rate: spec.sample_rate,
            samples,
        })
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        let reader = WavReader::new(Cursor::new(bytes)).context("not a readable WAV stream")?;
        Self::decode_reader(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn encode_i16_stereo(frames: &[(i16, i16)]) -> Vec<u8> {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 12_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &(l, r) in frames {
                writer.write_sample(l).unwrap();
                writer.write_sample(r).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_stereo_int_wav_mixed_to_mono() {
        let bytes = encode_i16_stereo(&[(16384, 0), (-16384, -16384), (0, 0)]);
        let audio = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 12_000);
        assert_eq!(audio.samples, vec![0.25, -0.5, 0.0]);
    }

    #[test]
    fn test_float_wav_passes_through() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for v in [0.1f32, -0.7, 0.33] {
                writer.write_sample(v).unwrap();
            }
            writer.finalize().unwrap();
        }
        let audio = WavDecoder.decode(&cursor.into_inner()).unwrap();
        assert_eq!(audio.samples, vec![0.1, -0.7, 0.33]);
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(WavDecoder.decode(b"definitely not RIFF").is_err());
    }

    struct Identity;

    impl Compressor for Identity {
        fn compress(&self, bytes: &[u8], _level: u32) -> Result<Vec<u8>> {
            Ok(bytes.to_vec())
        }
        fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
            Ok(bytes.to_vec())
        }
    }

    #[test]
    fn test_compressed_wav_payload_decodes() {
        let bytes = encode_i16_stereo(&[(8192, 8192)]);
        let codec = Identity;
        let packed = codec.compress(&bytes, 6).unwrap();
        let audio = WavDecoder.decode(&codec.decompress(&packed).unwrap()).unwrap();
        assert_eq!(audio.samples, vec![0.25]);
    }
}
