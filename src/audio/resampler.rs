use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use tracing::warn;

/// The model's fixed input sample rate (§1, §4.2).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Convert mono PCM from `source_rate` to [`TARGET_SAMPLE_RATE`] using a sinc-family
/// fast-quality kernel (§4.2, §6.3).
///
/// Skips entirely when `source_rate` already matches. Unlike a streaming pipeline, this
/// converts the whole buffer in a single `process()` call — there is no chunked/incremental
/// path here. On kernel failure, returns an empty buffer; the orchestrator treats that as
/// silence (§7).
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == TARGET_SAMPLE_RATE || samples.is_empty() {
        return samples.to_vec();
    }

    match run_whole_buffer(samples, source_rate) {
        Ok(out) => out,
        Err(err) => {
            warn!(error = %err, source_rate, "resampler kernel failed, treating as silence");
            Vec::new()
        }
    }
}

fn run_whole_buffer(samples: &[f32], source_rate: u32) -> Result<Vec<f32>, rubato::ResamplerConstructionError> {
    let ratio = TARGET_SAMPLE_RATE as f64 / source_rate as f64;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    // Whole-buffer conversion: the chunk size IS the entire input, so a single `process()`
    // call does the whole job (no streaming accumulator, unlike a chunked pipeline).
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len().max(1), 1)?;

    let input = vec![samples.to_vec()];
    let output = match resampler.process(&input, None) {
        Ok(out) => out,
        Err(_) => return Ok(Vec::new()),
    };

    Ok(output.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_conversion_when_rate_already_matches() {
        let samples = vec![0.1, -0.2, 0.3];
        let out = resample_to_16k(&samples, TARGET_SAMPLE_RATE);
        assert_eq!(out, samples);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample_to_16k(&[], 8_000).is_empty());
    }

    #[test]
    fn downsamples_8khz_to_16khz_roughly_doubles_length() {
        let samples: Vec<f32> = (0..800)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        let out = resample_to_16k(&samples, 8_000);
        assert!(!out.is_empty());
        let ratio = out.len() as f32 / samples.len() as f32;
        assert!((ratio - 2.0).abs() < 0.2, "unexpected resample ratio: {ratio}");
    }
}
