//! Voice-activity gate (C3, §4.3): a single boolean "does this buffer contain speech" decision
//! over the whole 16 kHz buffer, used by the orchestrator (C7) to short-circuit silent requests
//! before a decoder state is ever touched.

use std::path::Path;
use std::sync::Mutex;

use tracing::warn;
use whisper_rs::{WhisperVadContext, WhisperVadParams};

/// Buffers shorter than this bypass the VAD call entirely (§4.3).
const MIN_DURATION_MS: u32 = 200;

/// Wraps the VAD native context behind a dedicated mutex: the underlying library is assumed not
/// thread-safe, so only one detection call runs at a time (§4.3 "Concurrency").
pub struct VadGate {
    inner: Option<Mutex<WhisperVadContext>>,
    threshold: f32,
}

impl VadGate {
    /// Load a VAD model from disk. A load failure degrades the gate to "always speech" rather
    /// than failing server startup (§4.3: "When VAD is disabled or the VAD model failed to load,
    /// always returns true.").
    pub fn load(model_path: impl AsRef<Path>, threshold: f32) -> Self {
        let path = model_path.as_ref();
        match WhisperVadContext::new(&path.to_string_lossy(), Default::default()) {
            Ok(ctx) => Self {
                inner: Some(Mutex::new(ctx)),
                threshold,
            },
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to load VAD model, VAD gate disabled");
                Self {
                    inner: None,
                    threshold,
                }
            }
        }
    }

    /// Construct a gate that always reports speech, bypassing VAD entirely (§4.3's "disabled"
    /// case, selected via `EngineConfig::enable_vad`).
    pub fn disabled() -> Self {
        Self {
            inner: None,
            threshold: 0.5,
        }
    }

    /// Decide whether `pcm_16k` (mono, 16 kHz float samples) contains speech.
    ///
    /// Buffers shorter than 200 ms always return `true` (§4.3). A missing/failed-to-load model
    /// also always returns `true`.
    pub fn contains_speech(&self, pcm_16k: &[f32]) -> bool {
        let duration_ms = (pcm_16k.len() as f64 / 16_000.0 * 1000.0) as u32;
        if duration_ms < MIN_DURATION_MS {
            return true;
        }

        let Some(mutex) = &self.inner else {
            return true;
        };

        let mut ctx = match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut params = WhisperVadParams::default();
        params.set_threshold(self.threshold);

        match ctx.segments_from_samples(params, pcm_16k) {
            Ok(segments) => segments.num_segments() > 0,
            Err(err) => {
                warn!(error = %err, "VAD detection call failed, treating buffer as speech");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_always_reports_speech() {
        let gate = VadGate::disabled();
        assert!(gate.contains_speech(&vec![0.0_f32; 16_000]));
        assert!(gate.contains_speech(&[]));
    }

    #[test]
    fn short_buffer_bypasses_vad_even_without_a_model() {
        let gate = VadGate::disabled();
        let short = vec![0.0_f32; 100]; // ~6ms at 16kHz, well under 200ms
        assert!(gate.contains_speech(&short));
    }
}
