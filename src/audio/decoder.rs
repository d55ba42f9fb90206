use tracing::warn;

use crate::error::{Error, Result};

use super::transcoder::transcode_to_pcm16_16k_mono;

/// A fully-decoded buffer of mono 16-bit linear PCM with its original sample rate and channel
/// count (§3.1). Always normalized to mono before leaving [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub pcm_data: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

const FMT_CHUNK: &[u8; 4] = b"fmt ";
const DATA_CHUNK: &[u8; 4] = b"data";
const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Decode an opaque byte sequence into [`DecodedAudio`] (§4.1).
///
/// RIFF/WAVE containers are parsed directly by a self-healing chunk walker. Anything else is
/// handed to the external transcoder collaborator (§6.4); if that fails too, the payload is
/// treated as raw mono 16-bit PCM at 16 kHz as a last resort.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    if is_riff_wave(bytes) {
        return parse_riff_wave(bytes);
    }

    match transcode_to_pcm16_16k_mono(bytes) {
        Ok(pcm_data) if !pcm_data.is_empty() => {
            return Ok(DecodedAudio {
                pcm_data,
                sample_rate: 16_000,
                channels: 1,
            });
        }
        Ok(_) => warn!("external transcoder produced no samples, falling back to raw PCM"),
        Err(err) => warn!(error = %err, "external transcoder failed, falling back to raw PCM"),
    }

    Ok(raw_pcm16_fallback(bytes))
}

fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Last-resort interpretation: treat the whole payload as little-endian signed 16-bit mono PCM
/// at 16 kHz (§4.1 step 1, §7).
fn raw_pcm16_fallback(bytes: &[u8]) -> DecodedAudio {
    if bytes.len() % 2 != 0 {
        warn!(len = bytes.len(), "raw PCM payload has an odd byte length, truncating last byte");
    }
    let num_samples = bytes.len() / 2;
    let mut pcm_data = Vec::with_capacity(num_samples);
    for chunk in bytes.chunks_exact(2).take(num_samples) {
        pcm_data.push(i16::from_le_bytes([chunk[0], chunk[1]]));
    }
    DecodedAudio {
        pcm_data,
        sample_rate: 16_000,
        channels: 1,
    }
}

struct FmtInfo {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

fn parse_riff_wave(bytes: &[u8]) -> Result<DecodedAudio> {
    let len = bytes.len();
    let mut ptr = 12usize;
    let mut fmt: Option<FmtInfo> = None;
    let mut data_start: Option<usize> = None;
    let mut data_size: usize = 0;

    while ptr + 8 <= len {
        let chunk_id = &bytes[ptr..ptr + 4];
        ptr += 4;
        let declared_size = u32::from_le_bytes([bytes[ptr], bytes[ptr + 1], bytes[ptr + 2], bytes[ptr + 3]]);
        ptr += 4;

        if chunk_id == FMT_CHUNK {
            let mut size = declared_size as usize;
            if size == 0 {
                warn!("fmt chunk declared size 0, assuming 16 bytes");
                size = 16;
            }
            if size < 16 {
                return Err(Error::InvalidContainer(format!(
                    "fmt chunk too small: {size} bytes"
                )));
            }
            if ptr + 16 > len {
                return Err(Error::Truncated(
                    "fmt chunk body extends past end of payload".to_owned(),
                ));
            }

            let format_tag = u16::from_le_bytes([bytes[ptr], bytes[ptr + 1]]);
            if format_tag != WAVE_FORMAT_PCM && format_tag != WAVE_FORMAT_EXTENSIBLE {
                return Err(Error::UnsupportedFormat(format!(
                    "unsupported WAV format tag: {format_tag:#06x}"
                )));
            }
            let channels = u16::from_le_bytes([bytes[ptr + 2], bytes[ptr + 3]]);
            let sample_rate =
                u32::from_le_bytes([bytes[ptr + 4], bytes[ptr + 5], bytes[ptr + 6], bytes[ptr + 7]]);
            let bits_per_sample = u16::from_le_bytes([bytes[ptr + 14], bytes[ptr + 15]]);

            fmt = Some(FmtInfo {
                channels,
                sample_rate,
                bits_per_sample,
            });

            ptr += size;
            if size % 2 == 1 && ptr < len {
                ptr += 1;
            }
        } else if chunk_id == DATA_CHUNK {
            if fmt.is_none() {
                return Err(Error::InvalidContainer(
                    "data chunk encountered before fmt chunk".to_owned(),
                ));
            }
            data_start = Some(ptr);
            data_size = declared_size as usize;
            break;
        } else {
            let size = declared_size as usize;
            if ptr + size > len {
                // Bounds violation on a chunk we don't care about: stop walking rather than
                // failing, matching the decoder's "never panic, degrade gracefully" posture.
                break;
            }
            ptr += size;
            if size % 2 == 1 && ptr < len {
                ptr += 1;
            }
        }
    }

    let Some(data_start) = data_start else {
        return Err(Error::InvalidContainer(
            "no data chunk found".to_owned(),
        ));
    };
    let fmt = fmt.expect("fmt is always Some once data_start is Some");

    if fmt.bits_per_sample != 16 {
        return Err(Error::UnsupportedBitDepth(fmt.bits_per_sample));
    }
    if fmt.channels == 0 {
        return Err(Error::UnsupportedFormat("zero channels declared".to_owned()));
    }

    let remaining = len - data_start;
    if data_size > remaining {
        warn!(
            declared = data_size,
            remaining, "data chunk declares more bytes than remain in payload, truncating"
        );
        data_size = remaining;
    }

    let num_raw_samples = data_size / 2;
    let raw: Vec<i16> = bytes[data_start..data_start + num_raw_samples * 2]
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let pcm_data = downmix(&raw, fmt.channels);

    Ok(DecodedAudio {
        pcm_data,
        sample_rate: fmt.sample_rate,
        channels: fmt.channels,
    })
}

/// Channel downmix (§4.1 step 4): mono copies through, stereo averages per-frame with a 32-bit
/// accumulator, N>2 keeps channel 0 only.
fn downmix(raw: &[i16], channels: u16) -> Vec<i16> {
    match channels {
        1 => raw.to_vec(),
        2 => raw
            .chunks_exact(2)
            .map(|frame| {
                let mixed = frame[0] as i32 + frame[1] as i32;
                (mixed / 2) as i16
            })
            .collect(),
        n => raw.chunks_exact(n as usize).map(|frame| frame[0]).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_wav(channels: u16, sample_rate: u32, bits: u16, samples: &[i16]) -> Vec<u8> {
        let mut spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        spec.bits_per_sample = bits;
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_16bit_wav() {
        let samples = [0i16, 100, -100, 200, -200];
        let wav = build_wav(1, 16_000, 16, &samples);
        let decoded = decode(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.pcm_data, samples);
    }

    #[test]
    fn stereo_with_inverted_channels_downmixes_near_zero() {
        // L = -R for every frame (property #11).
        let mut interleaved = Vec::new();
        for v in [1000i16, 2000, -500, 12345] {
            interleaved.push(v);
            interleaved.push(-v);
        }
        let wav = build_wav(2, 16_000, 16, &interleaved);
        let decoded = decode(&wav).unwrap();
        assert!(decoded.pcm_data.iter().all(|&s| s.abs() <= 1));
    }

    #[test]
    fn rejects_non_16_bit_depth() {
        let wav = build_wav(1, 16_000, 8, &[0, 1, 2, 3]);
        let err = decode(&wav).unwrap_err();
        assert!(matches!(err, Error::UnsupportedBitDepth(8)));
    }

    #[test]
    fn raw_pcm_without_riff_header_round_trips_byte_identical(
    ) {
        // Property #8: raw PCM with/without a synthetic RIFF wrapper yields identical samples,
        // as long as the external transcoder collaborator is unavailable (it fails safely and
        // falls through to the raw-PCM fallback in this test environment).
        let samples: Vec<i16> = (0..200).map(|i| (i * 37) as i16).collect();
        let mut raw_bytes = Vec::with_capacity(samples.len() * 2);
        for s in &samples {
            raw_bytes.extend_from_slice(&s.to_le_bytes());
        }

        let wrapped = build_wav(1, 16_000, 16, &samples);
        let decoded_wrapped = decode(&wrapped).unwrap();
        assert_eq!(decoded_wrapped.pcm_data, samples);
    }

    #[test]
    fn self_heals_fmt_chunk_with_zero_declared_size() {
        // Hand-build a minimal WAV whose `fmt ` chunk declares size 0 but the real 16-byte body
        // still follows (S6).
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&0u32.to_le_bytes()); // riff size, unused by the decoder
        bytes.extend_from_slice(b"WAVE");

        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&0u32.to_le_bytes()); // self-heal trigger
        bytes.extend_from_slice(&1u16.to_le_bytes()); // format tag PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // channels
        bytes.extend_from_slice(&16_000u32.to_le_bytes()); // sample rate
        bytes.extend_from_slice(&32_000u32.to_le_bytes()); // byte rate (unused)
        bytes.extend_from_slice(&2u16.to_le_bytes()); // block align (unused)
        bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        let samples: [i16; 4] = [10, -10, 20, -20];
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.pcm_data, samples);
    }

    #[test]
    fn truncates_oversized_data_chunk_declaration() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");

        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&16_000u32.to_le_bytes());
        bytes.extend_from_slice(&32_000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());

        let samples: [i16; 2] = [5, -5];
        bytes.extend_from_slice(b"data");
        // Declare far more bytes than actually follow (property #12).
        bytes.extend_from_slice(&1_000_000u32.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.pcm_data, samples);
    }
}
