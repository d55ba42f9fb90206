//! Inference orchestrator (C7, §4.7): the single entry point that ties every other collaborator
//! together for one `transcribe` call.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::audio::resample_to_16k;
use crate::backend::{AcousticModel, DecodeParams};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::hallucination;
use crate::opts::{RequestOptions, ResolvedOptions};
use crate::pool::DecoderStatePool;
use crate::prosody::{self, ProsodyParams};
use crate::segments::{SegmentResult, Token};
use crate::speaker::SpeakerClusterer;
use crate::vad_gate::VadGate;

/// Entropy threshold hardcoded per §4.7 step 6; not a server-tunable.
const ENTROPY_THRESHOLD: f32 = 2.40;

/// Samples below this length skip prosody extraction entirely (§4.4, §4.7 step 8).
const MIN_PROSODY_SAMPLES: usize = 160;

/// Ambient metrics hook (§4.6 "pool-wait histogram"). Library-internal; the server binary
/// supplies a `prometheus`-backed implementation. No-op by default so the library stays usable
/// without pulling in a metrics stack.
pub trait MetricsSink: Send + Sync {
    fn observe_pool_wait(&self, seconds: f64);
}

/// Ties together the acoustic model (C7's sole model collaborator), its decoder-state pool (C6),
/// the VAD gate (C3), and the ambient server configuration into one `transcribe` entry point.
pub struct Engine<M: AcousticModel> {
    model: M,
    pool: DecoderStatePool<M::State>,
    vad: VadGate,
    config: Arc<EngineConfig>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl<M: AcousticModel> Engine<M> {
    /// Build an engine with `config.parallel_requests` pre-allocated decoder states (§4.6).
    pub fn new(model: M, vad: VadGate, config: Arc<EngineConfig>) -> Result<Self> {
        Self::new_with_metrics(model, vad, config, None)
    }

    /// Same as [`Engine::new`], additionally wiring a [`MetricsSink`] for pool-wait observations.
    pub fn new_with_metrics(
        model: M,
        vad: VadGate,
        config: Arc<EngineConfig>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self> {
        let mut states = Vec::with_capacity(config.parallel_requests.max(1));
        for _ in 0..config.parallel_requests.max(1) {
            states.push(model.new_state()?);
        }
        Ok(Self {
            model,
            pool: DecoderStatePool::new(states),
            vad,
            config,
            metrics,
        })
    }

    /// Number of idle decoder states, for health/diagnostics reporting.
    pub fn idle_decoder_states(&self) -> usize {
        self.pool.idle_count()
    }

    /// Run the end-to-end pipeline over one PCM-16 buffer at `source_sample_rate` (§4.7).
    pub fn transcribe(
        &self,
        pcm_i16: &[i16],
        source_sample_rate: u32,
        options: &RequestOptions,
    ) -> Result<Vec<SegmentResult>> {
        // Step 1: int16 -> f32 in [-1, 1].
        let as_f32: Vec<f32> = pcm_i16.iter().map(|&s| s as f32 / 32768.0).collect();
        self.transcribe_f32(&as_f32, source_sample_rate, options)
    }

    /// Same as [`Engine::transcribe`] but for callers that already hold float samples (§4.7 step
    /// 1: "or cast floats").
    pub fn transcribe_f32(
        &self,
        samples: &[f32],
        source_sample_rate: u32,
        options: &RequestOptions,
    ) -> Result<Vec<SegmentResult>> {
        // Step 2: resample to 16 kHz unless already there.
        let pcm_16k: std::borrow::Cow<'_, [f32]> = if source_sample_rate != 16_000 {
            std::borrow::Cow::Owned(resample_to_16k(samples, source_sample_rate))
        } else {
            std::borrow::Cow::Borrowed(samples)
        };

        let duration_cs = (pcm_16k.len() as f64 / 16_000.0 * 100.0).round() as i64;
        let duration_ms = duration_cs as u32 * 10;

        // Step 3: VAD short-circuit. The decoder state is never acquired on this path (§4.3).
        if self.config.enable_vad
            && duration_ms > self.config.vad_skip_duration_ms
            && !self.vad.contains_speech(&pcm_16k)
        {
            debug!(duration_cs, "VAD gate reports silence, short-circuiting");
            return Ok(vec![SegmentResult::empty_vad_negative(duration_cs)]);
        }

        let resolved = options.resolve(&self.config);

        // Step 4: acquire a decoder state (may block). Released automatically when `guard` drops
        // on every exit path below, including the `?` early returns.
        let (waited, mut guard) = self.pool.acquire_timed();
        if let Some(sink) = &self.metrics {
            sink.observe_pool_wait(waited.as_secs_f64());
        }

        let decode_params = build_decode_params(&resolved, &self.config);

        // Step 6: run the model.
        if let Err(err) = self.model.run(&mut guard, &decode_params, &pcm_16k) {
            warn!(error = %err, "model call failed, returning empty segment sequence");
            return Ok(Vec::new());
        }

        let raw_segments = self.model.read_segments(&guard)?;
        let eot = self.model.eot_token();

        drop(guard); // release before post-processing; post-processing is pure and model-free.

        let mut clusterer = SpeakerClusterer::new();
        let prosody_params = ProsodyParams {
            min_pitch_hz: resolved.min_pitch_hz,
            max_pitch_hz: resolved.max_pitch_hz,
            lowpass_coefficient: resolved.lowpass_coefficient,
            gender_pitch_threshold_hz: resolved.gender_pitch_threshold_hz,
            ..ProsodyParams::default()
        };

        let language = resolved
            .language
            .clone()
            .unwrap_or_else(|| "auto".to_owned());

        let mut results = Vec::with_capacity(raw_segments.len());
        for raw in raw_segments {
            // Step 7: filter tokens below the EOT sentinel, compute average probability, apply
            // hallucination layer A.
            let kept_tokens: Vec<Token> = raw
                .tokens
                .into_iter()
                .filter(|t| t.id < eot)
                .map(|t| Token {
                    text: t.text,
                    probability: t.probability,
                    start_cs: t.start_cs,
                    end_cs: t.end_cs,
                })
                .collect();

            let avg_probability = if kept_tokens.is_empty() {
                0.0
            } else {
                kept_tokens.iter().map(|t| t.probability).sum::<f32>() / kept_tokens.len() as f32
            };

            if !hallucination::passes_probability_filter(avg_probability, kept_tokens.len()) {
                continue;
            }

            // Step 8: map (t0, t1) centiseconds to sample indices at 16 kHz, extract the
            // sub-view, run prosody + speaker clustering if long enough.
            let total_samples = pcm_16k.len();
            let sample_start = ((raw.start_cs as f64 / 100.0) * 16_000.0).round() as usize;
            let sample_start = sample_start.min(total_samples);
            let sample_end = ((raw.end_cs as f64 / 100.0) * 16_000.0).round() as usize;
            let sample_end = sample_end.clamp(sample_start, total_samples);

            let sub_view = &pcm_16k[sample_start..sample_end];

            let (affective, speaker_id) = if resolved.enable_prosody
                && sub_view.len() >= MIN_PROSODY_SAMPLES
            {
                let tags = prosody::extract(sub_view, &prosody_params);
                let speaker_id = clusterer.assign_or_add(tags.speaker_vec);
                (tags, speaker_id)
            } else {
                (
                    crate::segments::AffectiveTags::default_for_short_segment(),
                    "unknown".to_owned(),
                )
            };

            results.push(SegmentResult {
                text: raw.text,
                language: language.clone(),
                avg_probability,
                start_cs: raw.start_cs,
                end_cs: raw.end_cs,
                speaker_turn_next: raw.speaker_turn_next,
                tokens: kept_tokens,
                affective,
                speaker_id,
            });
        }

        debug!(
            clusters = clusterer.clusters().len(),
            "speaker clustering complete for request"
        );

        Ok(results)
    }
}

fn build_decode_params<'a>(resolved: &'a ResolvedOptions, config: &EngineConfig) -> DecodeParams<'a> {
    DecodeParams {
        language: resolved.language.as_deref(),
        initial_prompt: resolved.initial_prompt.as_deref(),
        translate: resolved.translate,
        enable_diarization: resolved.diarization,
        use_beam_search: resolved.use_beam_search(),
        beam_size: resolved.beam_size,
        best_of: resolved.best_of,
        temperature: resolved.temperature,
        entropy_threshold: ENTROPY_THRESHOLD,
        logprob_threshold: config.logprob_threshold,
        no_speech_threshold: config.no_speech_threshold,
        suppress_non_speech_tokens: config.suppress_non_speech_tokens,
        n_threads: config.n_threads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::StubModel;
    use crate::backend::{RawSegment, RawToken};

    fn test_config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig {
            enable_vad: false,
            parallel_requests: 2,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn vad_disabled_never_short_circuits() {
        let model = StubModel::with_segments(vec![RawSegment {
            text: "hello world".to_owned(),
            start_cs: 0,
            end_cs: 100,
            speaker_turn_next: false,
            tokens: vec![RawToken {
                id: 1,
                text: "hello world".to_owned(),
                probability: 0.9,
                start_cs: 0,
                end_cs: 100,
            }],
        }]);
        let engine = Engine::new(model, VadGate::disabled(), test_config()).unwrap();
        let samples = vec![0.1_f32; 16_000];
        let result = engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "hello world");
    }

    #[test]
    fn low_probability_segment_is_filtered_out() {
        let model = StubModel::with_segments(vec![RawSegment {
            text: "garbled output".to_owned(),
            start_cs: 0,
            end_cs: 100,
            speaker_turn_next: false,
            tokens: vec![RawToken {
                id: 1,
                text: "garbled output".to_owned(),
                probability: 0.1,
                start_cs: 0,
                end_cs: 100,
            }],
        }]);
        let engine = Engine::new(model, VadGate::disabled(), test_config()).unwrap();
        let samples = vec![0.1_f32; 16_000];
        let result = engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn high_probability_bracketed_artifact_survives_layer_a_alone() {
        // Layer B (text-artifact rejection) lives at the protocol surface, not here; the
        // orchestrator only applies layer A (probability threshold), so a confident "[Music]"
        // segment is returned rather than dropped.
        let model = StubModel::with_segments(vec![RawSegment {
            text: "[Music]".to_owned(),
            start_cs: 0,
            end_cs: 100,
            speaker_turn_next: false,
            tokens: vec![RawToken {
                id: 1,
                text: "[Music]".to_owned(),
                probability: 0.95,
                start_cs: 0,
                end_cs: 100,
            }],
        }]);
        let engine = Engine::new(model, VadGate::disabled(), test_config()).unwrap();
        let samples = vec![0.1_f32; 16_000];
        let result = engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "[Music]");
    }

    #[test]
    fn model_failure_yields_empty_sequence_not_an_error() {
        let model = StubModel::with_segments(vec![]);
        *model.fail_next_run.lock().unwrap() = true;
        let engine = Engine::new(model, VadGate::disabled(), test_config()).unwrap();
        let samples = vec![0.1_f32; 16_000];
        let result = engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(engine.idle_decoder_states(), 2);
    }

    #[test]
    fn state_is_released_after_a_successful_call() {
        let model = StubModel::with_segments(vec![]);
        let engine = Engine::new(model, VadGate::disabled(), test_config()).unwrap();
        let samples = vec![0.1_f32; 16_000];
        engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert_eq!(engine.idle_decoder_states(), 2);
    }

    #[test]
    fn metrics_sink_observes_one_pool_wait_per_call() {
        use std::sync::Mutex as StdMutex;

        struct RecordingSink {
            observed: StdMutex<Vec<f64>>,
        }
        impl MetricsSink for RecordingSink {
            fn observe_pool_wait(&self, seconds: f64) {
                self.observed.lock().unwrap().push(seconds);
            }
        }

        let model = StubModel::with_segments(vec![]);
        let sink = Arc::new(RecordingSink {
            observed: StdMutex::new(Vec::new()),
        });
        let engine = Engine::new_with_metrics(
            model,
            VadGate::disabled(),
            test_config(),
            Some(sink.clone() as Arc<dyn MetricsSink>),
        )
        .unwrap();
        let samples = vec![0.1_f32; 16_000];
        engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert_eq!(sink.observed.lock().unwrap().len(), 1);
    }

    #[test]
    fn short_buffer_bypasses_vad_and_still_releases_its_state() {
        // A VAD-enabled engine whose buffer is under the 200ms skip threshold never calls into
        // the gate at all (§4.3); confirm the pool still balances out after such a call.
        let model = StubModel::with_segments(vec![]);
        let config = Arc::new(EngineConfig {
            enable_vad: true,
            parallel_requests: 1,
            ..EngineConfig::default()
        });
        let engine = Engine::new(model, VadGate::disabled(), config).unwrap();
        let samples = vec![0.0_f32; 100]; // ~6ms at 16kHz
        let before = engine.idle_decoder_states();
        let _ = engine
            .transcribe_f32(&samples, 16_000, &RequestOptions::default())
            .unwrap();
        assert_eq!(engine.idle_decoder_states(), before);
    }
}
