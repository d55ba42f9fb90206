use std::sync::Mutex;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperState};

use crate::backend::{AcousticModel, DecodeParams, RawSegment, RawToken};
use crate::error::{Error, Result};

mod ctx;
mod logging;

use ctx::get_context;

/// Built-in [`AcousticModel`] backed by `whisper-rs` / `whisper.cpp` (§6.1).
///
/// One context is loaded per server process and shared read-only across every request; the
/// per-request mutable scratchpad is [`WhisperState`], pooled by [`crate::pool::DecoderStatePool`].
pub struct WhisperBackend {
    ctx: WhisperContext,
}

impl WhisperBackend {
    /// Load a whisper.cpp model from disk.
    pub fn new(model_path: impl AsRef<str>) -> Result<Self> {
        let ctx = get_context(model_path.as_ref())?;
        Ok(Self { ctx })
    }

    /// Access the underlying context (used by diagnostics/health checks).
    pub fn context(&self) -> &WhisperContext {
        &self.ctx
    }
}

/// A pooled decoder state wraps the whisper-rs state in a `Mutex` purely so [`WhisperState`]'s
/// `!Sync` internals are sound to share across the pool's `Send` boundary; actual concurrent
/// access never happens because the pool hands out exclusive borrows (§3.7, §5).
pub struct WhisperDecoderState(Mutex<WhisperState>);

impl AcousticModel for WhisperBackend {
    type State = WhisperDecoderState;

    fn new_state(&self) -> Result<Self::State> {
        let state = self
            .ctx
            .create_state()
            .map_err(|err| Error::msg(format!("failed to create whisper state: {err}")))?;
        Ok(WhisperDecoderState(Mutex::new(state)))
    }

    fn run(&self, state: &mut Self::State, params: &DecodeParams<'_>, pcm_f32: &[f32]) -> Result<()> {
        let full_params = build_full_params(params);
        let mut state = state.0.lock().expect("decoder state mutex poisoned");
        state
            .full(full_params, pcm_f32)
            .map_err(|err| Error::msg(format!("whisper full() failed: {err}")))
    }

    fn read_segments(&self, state: &Self::State) -> Result<Vec<RawSegment>> {
        let state = state.0.lock().expect("decoder state mutex poisoned");
        let mut out = Vec::new();
        for segment in state.as_iter() {
            let text = segment
                .to_str()
                .map_err(|err| Error::msg(format!("failed to read segment text: {err}")))?
                .to_owned();

            let token_count = segment.n_tokens();
            let mut tokens = Vec::with_capacity(token_count.max(0) as usize);
            for token_idx in 0..token_count {
                let token = segment
                    .get_token(token_idx)
                    .map_err(|err| Error::msg(format!("failed to read token {token_idx}: {err}")))?;
                let data = token.token_data();
                let text = token
                    .to_str()
                    .map_err(|err| Error::msg(format!("failed to read token text: {err}")))?
                    .to_owned();
                tokens.push(RawToken {
                    id: token.token_id(),
                    text,
                    probability: data.p,
                    start_cs: data.t0,
                    end_cs: data.t1,
                });
            }

            out.push(RawSegment {
                text,
                start_cs: segment.start_timestamp(),
                end_cs: segment.end_timestamp(),
                speaker_turn_next: segment.next_segment_speaker_turn(),
                tokens,
            });
        }
        Ok(out)
    }

    fn eot_token(&self) -> i32 {
        self.ctx.token_eot()
    }
}

/// Build `FullParams` from the orchestrator's resolved [`DecodeParams`] (§4.7 step 6, §6.1).
fn build_full_params<'a>(params: &DecodeParams<'a>) -> FullParams<'a, 'a> {
    let strategy = if params.use_beam_search {
        SamplingStrategy::BeamSearch {
            beam_size: params.beam_size,
            patience: 1.0,
        }
    } else {
        SamplingStrategy::Greedy {
            best_of: params.best_of,
        }
    };

    let mut full = FullParams::new(strategy);

    full.set_n_threads(params.n_threads);
    full.set_language(params.language);
    full.set_translate(params.translate);
    full.set_no_context(true);
    full.set_single_segment(false);
    full.set_token_timestamps(true);
    full.set_temperature(params.temperature);
    full.set_entropy_thold(params.entropy_threshold);
    full.set_logprob_thold(params.logprob_threshold);
    full.set_no_speech_thold(params.no_speech_threshold);
    full.set_suppress_nst(params.suppress_non_speech_tokens);
    full.set_print_progress(false);
    full.set_print_special(false);
    full.set_print_realtime(false);
    full.set_print_timestamps(false);

    if let Some(prompt) = params.initial_prompt {
        full.set_initial_prompt(prompt);
    }
    let _ = params.enable_diarization; // whisper-rs's tinydiarize flag is not exposed in 0.15; tracked as a follow-up.

    full
}
