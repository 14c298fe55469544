use std::borrow::Cow;

use crate::models::audio_format::{SampleFormat, StreamFormat};

/// Size of the canonical RIFF/WAVE header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Generate a 44-byte RIFF/WAVE header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate
/// [32-33]  block_align
/// [34-35]  bits per sample
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(format: &StreamFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36u32.saturating_add(data_size)).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format.sample_format.wav_format_code().to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    write_rate_fields(&mut header, format);
    header[34..36].copy_from_slice(&format.sample_format.bits_per_sample().to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Largest data chunk a RIFF header can describe.
pub const MAX_DATA_SIZE: u64 = (u32::MAX - 36) as u64;

/// Patch the RIFF chunk size (offset 4) and data size (offset 40) for `data_size` bytes of audio.
///
/// Sizes past [`MAX_DATA_SIZE`] are clamped; returns false when that happened.
/// The audio bytes stay in the file but most readers stop at the clamped size.
pub fn patch_sizes(header: &mut [u8], data_size: u64) -> bool {
    let fits = data_size <= MAX_DATA_SIZE;
    let data_size = data_size.min(MAX_DATA_SIZE) as u32;
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    fits
}

/// Patch sample rate (offset 24), byte rate (offset 28) and block align (offset 32).
///
/// Used when the device ran at a different rate than was requested at open.
pub fn patch_sample_rate(header: &mut [u8], format: &StreamFormat) {
    write_rate_fields(header, format);
}

fn write_rate_fields(header: &mut [u8], format: &StreamFormat) {
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&format.block_align().to_le_bytes());
}

/// Fields read back from a WAVE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeaderInfo {
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

/// Parse a canonical 44-byte header. Returns `None` if the magic values are wrong.
pub fn parse_header(bytes: &[u8]) -> Option<WavHeaderInfo> {
    if bytes.len() < WAV_HEADER_SIZE
        || &bytes[0..4] != b"RIFF"
        || &bytes[8..12] != b"WAVE"
        || &bytes[12..16] != b"fmt "
        || &bytes[36..40] != b"data"
    {
        return None;
    }
    let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    Some(WavHeaderInfo {
        format_code: u16_at(20),
        channels: u16_at(22),
        sample_rate: u32_at(24),
        byte_rate: u32_at(28),
        block_align: u16_at(32),
        bits_per_sample: u16_at(34),
        data_size: u32_at(40),
    })
}

/// Encode f32 samples in the little-endian layout of `format`, appending to `out`.
///
/// Integer formats clamp to [-1.0, 1.0] before scaling.
pub fn encode_samples(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    out.reserve(samples.len() * format.bytes_per_sample());
    match format {
        SampleFormat::Int16 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleFormat::Int24 => {
            const MAX_24: f32 = 8_388_607.0;
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * MAX_24) as i32;
                out.extend_from_slice(&v.to_le_bytes()[..3]);
            }
        }
        SampleFormat::Float32 => {
            for &s in samples {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
}

/// Convert interleaved audio from `from` channels to `to` channels.
///
/// Matching layouts are borrowed. Stereo to mono averages, mono to stereo
/// duplicates, anything else keeps or pads the leading channels.
pub fn adapt_channels(samples: &[f32], from: u16, to: u16) -> Cow<'_, [f32]> {
    if from == to || from == 0 || to == 0 {
        return Cow::Borrowed(samples);
    }
    if to == 1 {
        return Cow::Owned(downmix_to_mono(samples, from as usize));
    }
    let (from, to) = (from as usize, to as usize);
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        for ch in 0..to {
            // Missing channels repeat the last source channel.
            out.push(frame[ch.min(from - 1)]);
        }
    }
    Cow::Owned(out)
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_magic_and_size() {
        let header = generate_wav_header(&StreamFormat::default(), 0);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn header_float_stereo_48k() {
        let header = generate_wav_header(&StreamFormat::default(), 9600);
        let info = parse_header(&header).unwrap();

        assert_eq!(info.format_code, 3);
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.byte_rate, 384_000);
        assert_eq!(info.block_align, 8);
        assert_eq!(info.bits_per_sample, 32);
        assert_eq!(info.data_size, 9600);
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), 36 + 9600);
    }

    #[test]
    fn header_int16_is_pcm() {
        let format = StreamFormat::new(44100, 1, SampleFormat::Int16);
        let info = parse_header(&generate_wav_header(&format, 0)).unwrap();
        assert_eq!(info.format_code, 1);
        assert_eq!(info.byte_rate, 88200);
        assert_eq!(info.block_align, 2);
    }

    #[test]
    fn patching_sizes_and_rate() {
        let mut header = generate_wav_header(&StreamFormat::default(), 0);
        assert!(patch_sizes(&mut header, 19200));
        patch_sample_rate(&mut header, &StreamFormat::new(44100, 2, SampleFormat::Float32));

        let info = parse_header(&header).unwrap();
        assert_eq!(info.data_size, 19200);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.byte_rate, 352_800);
    }

    #[test]
    fn oversized_data_is_clamped_and_reported() {
        let mut header = generate_wav_header(&StreamFormat::default(), 0);
        assert!(patch_sizes(&mut header, MAX_DATA_SIZE));
        assert!(!patch_sizes(&mut header, 5 * 1024 * 1024 * 1024));

        let info = parse_header(&header).unwrap();
        assert_eq!(info.data_size as u64, MAX_DATA_SIZE);
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), u32::MAX);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_header(&[0u8; 44]).is_none());
        assert!(parse_header(b"RIFF").is_none());
    }

    #[test]
    fn encode_int16_clamps() {
        let mut out = Vec::new();
        encode_samples(&[0.0, 1.0, -2.0], SampleFormat::Int16, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 0);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), -i16::MAX);
    }

    #[test]
    fn encode_int24_is_three_bytes() {
        let mut out = Vec::new();
        encode_samples(&[1.0, -1.0], SampleFormat::Int24, &mut out);
        assert_eq!(out, vec![0xFF, 0xFF, 0x7F, 0x01, 0x00, 0x80]);
    }

    #[test]
    fn encode_float_is_bit_exact() {
        let mut out = Vec::new();
        encode_samples(&[0.25], SampleFormat::Float32, &mut out);
        assert_eq!(out, 0.25f32.to_le_bytes().to_vec());
    }

    #[test]
    fn adapt_same_layout_borrows() {
        let samples = [0.1, 0.2];
        assert!(matches!(adapt_channels(&samples, 2, 2), Cow::Borrowed(_)));
    }

    #[test]
    fn adapt_stereo_to_mono_and_back() {
        let stereo = [0.2, 0.8, 0.4, 0.6];
        let mono = adapt_channels(&stereo, 2, 1);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-6);

        let widened = adapt_channels(&[0.3, 0.7], 1, 2);
        assert_eq!(widened.as_ref(), &[0.3, 0.3, 0.7, 0.7]);
    }

    #[test]
    fn downmix_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }
}
