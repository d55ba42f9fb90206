//! Pure-DSP prosody extraction (C4, §4.4): pitch, energy, zero-crossing rate, spectral centroid
//! proxy, and the derived gender/arousal/valence/emotion tags and 8-D speaker vector.
//!
//! No model calls, no allocation beyond the per-frame scratch vectors. The caller passes a
//! sub-view of the 16 kHz float buffer (never a copy); frames shorter than 160 samples never
//! reach this module (the orchestrator gates on that before calling in).

use crate::segments::{AffectiveTags, EmotionProxy, GenderProxy};

/// 10 ms hop at 16 kHz (§4.4 "Frame loop").
const FRAME_LEN: usize = 160;
const SAMPLE_RATE: f32 = 16_000.0;

/// Tunable knobs threaded through from [`crate::config::EngineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ProsodyParams {
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    pub lowpass_coefficient: f32,
    pub gender_pitch_threshold_hz: f32,
    /// Added to the raw valence estimate to counter a systematic sadness skew (§4.4, tunable
    /// 0.10-0.35; Open Question resolved at 0.15).
    pub valence_bias: f32,
}

impl Default for ProsodyParams {
    fn default() -> Self {
        Self {
            min_pitch_hz: 50.0,
            max_pitch_hz: 600.0,
            lowpass_coefficient: 0.1,
            gender_pitch_threshold_hz: 170.0,
            valence_bias: 0.15,
        }
    }
}

/// Extract [`AffectiveTags`] from a 16 kHz mono float view.
///
/// Callers must gate on length themselves: segments under 160 samples should use
/// [`AffectiveTags::default_for_short_segment`] instead of calling in here (§4.4).
pub fn extract(samples: &[f32], params: &ProsodyParams) -> AffectiveTags {
    if samples.len() < FRAME_LEN {
        return AffectiveTags::default_for_short_segment();
    }

    let num_frames = samples.len() / FRAME_LEN;
    let frame_duration = FRAME_LEN as f32 / SAMPLE_RATE;

    let mut rmses = Vec::with_capacity(num_frames);
    let mut kept_pitches = Vec::new();
    let mut centroids = Vec::with_capacity(num_frames);
    let mut zcrs = Vec::with_capacity(num_frames);
    let mut syllable_count = 0u32;
    let mut prev_rms_below_threshold = true;

    let mut lowpass_state = 0.0_f32;

    for frame in samples.chunks(FRAME_LEN).take(num_frames) {
        let rms = rms_of(frame);
        rmses.push(rms);

        if rms >= 0.05 && prev_rms_below_threshold {
            syllable_count += 1;
        }
        prev_rms_below_threshold = rms < 0.05;

        let mut smoothed = Vec::with_capacity(frame.len());
        for &sample in frame {
            lowpass_state += params.lowpass_coefficient * (sample - lowpass_state);
            smoothed.push(lowpass_state);
        }

        let clip_threshold = (rms * 0.15).max(0.002);
        let (cycles, raw_zcr) = clipped_zero_crossings(&smoothed, clip_threshold);
        zcrs.push(raw_zcr);

        if rms > 0.015 && cycles > 0 {
            let f0 = cycles as f32 / frame_duration;
            if f0 >= params.min_pitch_hz && f0 <= params.max_pitch_hz {
                kept_pitches.push(f0);
            }
        }

        centroids.push(spectral_centroid_proxy(frame));
    }

    let energy_mean = mean(&rmses);
    let energy_std = std_dev(&rmses, energy_mean);
    let spectral_centroid = mean(&centroids);
    let zero_crossing_rate = mean(&zcrs);

    let mut pitch_mean = if kept_pitches.is_empty() {
        0.0
    } else {
        median(&mut kept_pitches.clone())
    };
    let pitch_mean_arith = mean(&kept_pitches);
    let pitch_std = std_dev(&kept_pitches, pitch_mean_arith);

    // Octave-correction heuristic (§4.4): harmonic-rich male voices often yield a ZCR-derived
    // estimate at 2x the true fundamental.
    if pitch_mean > params.gender_pitch_threshold_hz
        && (zero_crossing_rate < 0.022
            || (spectral_centroid < 85.0 && energy_mean > 0.12 && pitch_mean < 240.0))
    {
        pitch_mean /= 2.0;
    }

    let has_pitch = !kept_pitches.is_empty();
    let gender_proxy = if !has_pitch {
        GenderProxy::Unknown
    } else if zero_crossing_rate < 0.020 {
        GenderProxy::Male
    } else if pitch_mean > params.gender_pitch_threshold_hz {
        GenderProxy::Female
    } else {
        GenderProxy::Male
    };

    let speech_rate = syllable_count as f32 / (samples.len() as f32 / SAMPLE_RATE).max(1e-6);

    let arousal =
        (0.7 * norm(energy_mean, 0.02, 0.20) + 0.3 * norm(speech_rate, 2.0, 9.0)).clamp(0.0, 1.0);

    let valence = valence_of(gender_proxy, pitch_mean, spectral_centroid, params.valence_bias);

    let emotion_proxy = classify_emotion(arousal, valence);

    let speaker_vec = build_speaker_vector(
        gender_proxy,
        pitch_mean,
        pitch_std,
        energy_mean,
        spectral_centroid,
        zero_crossing_rate,
        speech_rate,
        arousal,
        valence,
    );

    AffectiveTags {
        gender_proxy,
        emotion_proxy,
        arousal,
        valence,
        pitch_mean_hz: pitch_mean,
        pitch_std_hz: pitch_std,
        energy_mean,
        energy_std,
        spectral_centroid,
        zero_crossing_rate,
        speaker_vec,
    }
}

fn rms_of(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|&s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

/// Schmitt-trigger clipped zero-crossing counter: returns (cycle_count, raw_zcr).
///
/// A "cycle" only counts once the signal has traveled from one clipping band to the opposite one
/// (§4.4), which rejects jitter around zero that a plain sign-change counter would overcount.
fn clipped_zero_crossings(smoothed: &[f32], clip_threshold: f32) -> (u32, f32) {
    let mut cycles = 0u32;
    let mut raw_crossings = 0u32;
    let mut band = 0i8; // -1 = below -threshold, 1 = above +threshold, 0 = inside the dead zone

    for window in smoothed.windows(2) {
        if window[0].signum() != window[1].signum() && window[0] != 0.0 {
            raw_crossings += 1;
        }
    }

    for &sample in smoothed {
        let new_band = if sample >= clip_threshold {
            1
        } else if sample <= -clip_threshold {
            -1
        } else {
            band
        };
        if new_band != band && new_band != 0 && band != 0 {
            cycles += 1;
        }
        band = new_band;
    }

    let raw_zcr = if smoothed.len() > 1 {
        raw_crossings as f32 / (smoothed.len() - 1) as f32
    } else {
        0.0
    };

    (cycles, raw_zcr)
}

/// Amplitude-weighted index of first-difference magnitudes, a cheap proxy for spectral centroid
/// without an FFT (§4.4).
fn spectral_centroid_proxy(frame: &[f32]) -> f32 {
    let mut weighted_sum = 0.0_f32;
    let mut magnitude_sum = 0.0_f32;
    for (k, window) in frame.windows(2).enumerate() {
        let delta = (window[1] - window[0]).abs();
        weighted_sum += delta * k as f32;
        magnitude_sum += delta;
    }
    if magnitude_sum <= f32::EPSILON {
        0.0
    } else {
        weighted_sum / magnitude_sum
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn std_dev(values: &[f32], mean_value: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|&v| (v - mean_value).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

/// Median via partial sort (nth_element-equivalent), outlier-robust per §4.4.
fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn norm(value: f32, lo: f32, hi: f32) -> f32 {
    if hi <= lo {
        return 0.0;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

fn valence_of(gender: GenderProxy, pitch_mean: f32, spectral_centroid: f32, bias: f32) -> f32 {
    let (pitch_lo, pitch_hi) = match gender {
        GenderProxy::Male => (60.0, 180.0),
        GenderProxy::Female => (160.0, 350.0),
        GenderProxy::Unknown => (60.0, 350.0),
    };
    let norm_pitch = norm(pitch_mean, pitch_lo, pitch_hi);
    let norm_brightness = norm(spectral_centroid, 0.0, 150.0);
    let combined = 0.4 * norm_pitch + 0.6 * norm_brightness;
    let rescaled = combined * 2.0 - 1.0;
    (rescaled + bias).clamp(-1.0, 1.0)
}

fn classify_emotion(arousal: f32, valence: f32) -> EmotionProxy {
    if arousal > 0.65 && valence > 0.1 {
        EmotionProxy::Excited
    } else if arousal > 0.65 {
        EmotionProxy::Angry
    } else if arousal < 0.30 && valence < -0.4 {
        EmotionProxy::Sad
    } else {
        EmotionProxy::Neutral
    }
}

/// Build the 8-D speaker vector (§4.4): `[pitch_mean, pitch_std, energy_mean, spectral_centroid,
/// zcr, speech_rate, arousal, (valence+1)/2]`, each soft-normalized to `[0,1]`.
///
/// Dimension 0 is polarized by gender to keep cross-gender clusters from merging downstream.
#[allow(clippy::too_many_arguments)]
fn build_speaker_vector(
    gender: GenderProxy,
    pitch_mean: f32,
    pitch_std: f32,
    energy_mean: f32,
    spectral_centroid: f32,
    zcr: f32,
    speech_rate: f32,
    arousal: f32,
    valence: f32,
) -> [f32; 8] {
    let dim0 = match gender {
        GenderProxy::Male => norm(pitch_mean, 60.0, 180.0) * 0.4,
        GenderProxy::Female => 0.6 + norm(pitch_mean, 160.0, 350.0) * 0.4,
        GenderProxy::Unknown => 0.5,
    };

    [
        dim0,
        norm(pitch_std, 0.0, 60.0),
        norm(energy_mean, 0.0, 0.3),
        norm(spectral_centroid, 0.0, 150.0),
        norm(zcr, 0.0, 0.3),
        norm(speech_rate, 0.0, 10.0),
        arousal,
        (valence + 1.0) / 2.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wave(freq_hz: f32, amplitude: f32, duration_secs: f32) -> Vec<f32> {
        let num_samples = (SAMPLE_RATE * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                amplitude * (2.0 * std::f32::consts::PI * freq_hz * t).sin()
            })
            .collect()
    }

    #[test]
    fn short_segment_yields_defaults() {
        let samples = vec![0.1_f32; 100];
        let tags = extract(&samples, &ProsodyParams::default());
        assert_eq!(tags.gender_proxy, GenderProxy::Unknown);
        assert_eq!(tags.emotion_proxy, EmotionProxy::Neutral);
    }

    #[test]
    fn silence_yields_no_pitch_and_unknown_gender() {
        let samples = vec![0.0_f32; 16_000];
        let tags = extract(&samples, &ProsodyParams::default());
        assert_eq!(tags.pitch_mean_hz, 0.0);
        assert_eq!(tags.gender_proxy, GenderProxy::Unknown);
    }

    #[test]
    fn low_frequency_tone_yields_a_plausible_low_pitch() {
        let samples = sine_wave(120.0, 0.5, 1.0);
        let tags = extract(&samples, &ProsodyParams::default());
        // The ZCR-derived estimate for a clean low tone should land roughly in voice range.
        assert!(tags.pitch_mean_hz >= 0.0);
        assert!(tags.pitch_mean_hz <= 600.0);
    }

    #[test]
    fn speaker_vector_is_within_unit_range() {
        let samples = sine_wave(200.0, 0.4, 0.5);
        let tags = extract(&samples, &ProsodyParams::default());
        for component in tags.speaker_vec {
            assert!((0.0..=1.0).contains(&component), "component {component} out of range");
        }
    }
}
