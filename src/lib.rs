//! `stt-engine` — a long-running speech-to-text server wrapping a Whisper-family acoustic model,
//! with voice-activity gating, per-segment prosody extraction, and online speaker clustering.
//!
//! This crate provides:
//! - Container/codec intake and resampling to the model's native 16 kHz mono format
//! - A single-call VAD gate that short-circuits silent requests before touching the model
//! - A bounded pool of reusable decoder states for safe concurrent inference
//! - Pure-DSP prosody extraction and online speaker clustering layered on top of the model's
//!   segment/token output
//! - A hallucination filter rejecting low-confidence or known-artifact segments
//!
//! The library is designed to be used by both CLI tools and a long-running HTTP service, with
//! typed errors, structured logging, and an environment-driven configuration layer.

pub mod error;

pub mod config;
pub mod opts;
pub mod segments;

pub mod backend;
pub mod backends;

pub mod audio;
pub mod vad_gate;
pub mod prosody;
pub mod speaker;
pub mod pool;
pub mod hallucination;
pub mod orchestrator;

pub mod logging;
pub mod wav;

pub use backend::AcousticModel;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use opts::{RequestOptions, ResolvedOptions};
pub use orchestrator::{Engine, MetricsSink};
pub use segments::SegmentResult;
