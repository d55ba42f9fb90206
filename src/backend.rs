//! The acoustic-model capability set (§4.1/§9 "Polymorphism over decoding backends", §6.1).
//!
//! The orchestrator (C7) never talks to `whisper-rs` directly. It talks to this narrow trait,
//! which exposes exactly the operations §6.1 describes: create a reusable decoder state, run one
//! inference pass against it, and read back segments/tokens as plain data. This lets the pool
//! (C6) and orchestrator be exercised against an in-memory stub in tests, without a model file.

use crate::error::Result;

/// One token as reported by the model collaborator, before the end-of-transcription cutoff and
/// the hallucination filter have been applied (§3.3, §6.1).
#[derive(Debug, Clone, PartialEq)]
pub struct RawToken {
    pub id: i32,
    pub text: String,
    pub probability: f32,
    pub start_cs: i64,
    pub end_cs: i64,
}

/// One segment as reported by the model collaborator (§6.1's `segment_text/t0/t1/speaker_turn_next`
/// readers), before layer A/B of the hallucination filter (§4.8) or post-processing (§4.4, §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub text: String,
    pub start_cs: i64,
    pub end_cs: i64,
    pub speaker_turn_next: bool,
    pub tokens: Vec<RawToken>,
}

/// Resolved decoding parameters passed to the model collaborator for one `run` call (§4.7 step 6,
/// §6.1).
#[derive(Debug, Clone)]
pub struct DecodeParams<'a> {
    pub language: Option<&'a str>,
    pub initial_prompt: Option<&'a str>,
    pub translate: bool,
    pub enable_diarization: bool,
    pub use_beam_search: bool,
    pub beam_size: i32,
    pub best_of: i32,
    pub temperature: f32,
    /// Hardcoded per §4.7 step 6; not a tunable.
    pub entropy_threshold: f32,
    pub logprob_threshold: f32,
    pub no_speech_threshold: f32,
    pub suppress_non_speech_tokens: bool,
    pub n_threads: i32,
}

/// The acoustic-model capability set (§6.1). `whisper-rs` is this repository's concrete binding
/// (see [`crate::backends::whisper::WhisperBackend`]).
///
/// `State` is the opaque, non-reentrant "decoder state" (§3.7) that [`crate::pool::DecoderStatePool`]
/// multiplexes across concurrent callers. `Self` (the model context) is shared-read and safe to
/// call `run` against concurrently as long as each call uses a distinct `State`.
pub trait AcousticModel: Send + Sync {
    type State: Send;

    /// Allocate one fresh decoder state against this context (§6.1 `init_state`).
    fn new_state(&self) -> Result<Self::State>;

    /// Run one inference pass, reusing `state`'s internal buffers (§6.1 `run`).
    fn run(&self, state: &mut Self::State, params: &DecodeParams<'_>, pcm_f32: &[f32]) -> Result<()>;

    /// Read back the segments produced by the most recent `run` call (§6.1 `n_segments` + the
    /// per-segment/per-token readers).
    fn read_segments(&self, state: &Self::State) -> Result<Vec<RawSegment>>;

    /// The end-of-transcription sentinel token id (§6.1 `eot_token`). Tokens at or beyond this id
    /// are excluded before a [`crate::segments::Token`] record is built (§3.3).
    fn eot_token(&self) -> i32;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    //! An in-memory [`AcousticModel`] stub used by pool/orchestrator unit tests (§9: "narrow
    //! capability sets to enable testing with stubs"), also exposed under the `test-util` feature
    //! so integration tests (`tests/`) can exercise [`crate::orchestrator::Engine`] end to end
    //! without a real model file on disk.
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    pub struct StubState {
        pub run_count: u32,
    }

    /// A stub model whose segments are scripted ahead of time via [`StubModel::with_segments`].
    pub struct StubModel {
        pub eot: i32,
        scripted: Mutex<Vec<RawSegment>>,
        pub fail_next_run: Mutex<bool>,
    }

    impl StubModel {
        pub fn with_segments(segments: Vec<RawSegment>) -> Self {
            Self {
                eot: 50_000,
                scripted: Mutex::new(segments),
                fail_next_run: Mutex::new(false),
            }
        }
    }

    impl AcousticModel for StubModel {
        type State = StubState;

        fn new_state(&self) -> Result<Self::State> {
            Ok(StubState::default())
        }

        fn run(&self, state: &mut Self::State, _params: &DecodeParams<'_>, _pcm: &[f32]) -> Result<()> {
            if *self.fail_next_run.lock().unwrap() {
                return Err(crate::error::Error::msg("stub model failure"));
            }
            state.run_count += 1;
            Ok(())
        }

        fn read_segments(&self, _state: &Self::State) -> Result<Vec<RawSegment>> {
            Ok(self.scripted.lock().unwrap().clone())
        }

        fn eot_token(&self) -> i32 {
            self.eot
        }
    }
}
