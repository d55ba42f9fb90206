// src/bin/stt-cli.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::sync::Arc;

use stt_engine::backends::whisper::WhisperBackend;
use stt_engine::config::EngineConfig;
use stt_engine::hallucination::HallucinationFilter;
use stt_engine::opts::RequestOptions;
use stt_engine::orchestrator::Engine;
use stt_engine::vad_gate::VadGate;
use stt_engine::{audio, wav};

fn main() -> Result<()> {
    let params = Params::parse();

    let mut config = EngineConfig::from_env();
    if let Some(beam_size) = params.beam_size {
        config.beam_size = beam_size;
    }
    if let Some(threads) = params.threads {
        config.n_threads = threads;
    }
    if params.no_vad {
        config.enable_vad = false;
    }

    let options = RequestOptions {
        language: params.language.clone().unwrap_or_default(),
        translate: params.translate,
        diarization: params.diarization,
        ..RequestOptions::default()
    };

    let config = Arc::new(config);

    let model =
        WhisperBackend::new(params.model_path.clone()).context("failed to load acoustic model")?;

    let vad = if config.enable_vad {
        match &params.vad_model_path {
            Some(path) => VadGate::load(path, config.vad_threshold),
            None => VadGate::disabled(),
        }
    } else {
        VadGate::disabled()
    };

    let engine = Engine::new(model, vad, config).context("failed to build engine")?;

    let (pcm_data, sample_rate) = load_input(&params.input)?;

    let segments = engine
        .transcribe(&pcm_data, sample_rate, &options)
        .context("transcription failed")?;

    // Hallucination layer B (text-artifact rejection) is this protocol surface's own
    // responsibility, not the orchestrator's (§4.8).
    let hallucination_filter = HallucinationFilter::default();
    let segments: Vec<_> = segments
        .into_iter()
        .filter(|segment| !hallucination_filter.rejects(&segment.text))
        .collect();

    match params.output_type {
        OutputType::Json => {
            let json = serde_json::to_string_pretty(&segments)?;
            println!("{json}");
        }
        OutputType::Text => {
            for segment in &segments {
                println!("{}", segment.text);
            }
        }
    }

    Ok(())
}

/// Load `path` as PCM samples at the source sample rate, accepting either a pre-resampled mono
/// WAV (the common case for batch jobs) or any container the decoder (C1) understands.
fn load_input(path: &str) -> Result<(Vec<i16>, u32)> {
    if path.ends_with(".wav") {
        if let Ok((samples, spec)) = wav::get_samples_from_wav(&path.to_owned()) {
            let pcm: Vec<i16> = samples.iter().map(|&s| (s * i16::MAX as f32) as i16).collect();
            return Ok((pcm, spec.sample_rate));
        }
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read input file: {path}"))?;
    let decoded = audio::decode(&bytes).context("failed to decode input audio")?;
    Ok((decoded.pcm_data, decoded.sample_rate))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputType {
    Json,
    Text,
}

/// CLI parameters for `stt-cli`.
#[derive(Parser, Debug)]
#[command(name = "stt-cli")]
#[command(about = "A batch transcription CLI wrapping a Whisper-family acoustic model")]
struct Params {
    /// Path to a whisper.cpp model file (e.g. `ggml-medium.bin`).
    #[arg(short = 'm', long = "model", required = true)]
    pub model_path: String,

    /// Path to a Whisper-VAD model file. If omitted, VAD is disabled.
    #[arg(short = 'v', long = "vad-model")]
    pub vad_model_path: Option<String>,

    /// Input media path (audio or video).
    #[arg(short = 'i', long = "input", required = true)]
    pub input: String,

    /// Output format.
    #[arg(
        short = 'o',
        long = "output-type",
        value_enum,
        default_value_t = OutputType::Json
    )]
    pub output_type: OutputType,

    /// Target language hint. Omit for auto-detect.
    #[arg(long = "language")]
    pub language: Option<String>,

    /// Translate to English.
    #[arg(long = "translate", default_value_t = false)]
    pub translate: bool,

    /// Enable speaker-turn diarization hints.
    #[arg(long = "diarization", default_value_t = false)]
    pub diarization: bool,

    /// Disable voice activity detection entirely.
    #[arg(long = "no-vad", default_value_t = false)]
    pub no_vad: bool,

    /// Override the configured beam size.
    #[arg(long = "beam-size")]
    pub beam_size: Option<i32>,

    /// Override the configured thread count.
    #[arg(long = "threads")]
    pub threads: Option<i32>,
}
