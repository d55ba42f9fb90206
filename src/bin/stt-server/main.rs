use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use stt_engine::backends::whisper::WhisperBackend;
use stt_engine::config::EngineConfig;
use stt_engine::hallucination::HallucinationFilter;
use stt_engine::opts::RequestOptions;
use stt_engine::orchestrator::Engine;
use stt_engine::segments::{SegmentResult, Token};
use stt_engine::vad_gate::VadGate;
use stt_engine::{audio, error::Error};

/// CLI overrides layered on top of `STT_ENGINE_*` environment resolution (§4.10).
#[derive(Parser, Debug)]
#[command(name = "stt-server")]
#[command(about = "HTTP server wrapping a Whisper-family acoustic model")]
struct Args {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    metrics_port: Option<u16>,
    #[arg(long)]
    model_dir: Option<String>,
    #[arg(long)]
    model_filename: Option<String>,
    #[arg(long)]
    vad_model: Option<String>,
    #[arg(long)]
    no_vad: bool,
}

type SharedEngine = Arc<Engine<WhisperBackend>>;

/// Router state: the engine plus the protocol surface's own copy of hallucination layer B
/// (text-artifact rejection), kept separate from C7 so each surface can tune/disable it (§4.8
/// "implementer-configurable... applied by protocol surfaces").
#[derive(Clone)]
struct AppState {
    engine: SharedEngine,
    hallucination_filter: Arc<HallucinationFilter>,
}

#[tokio::main]
async fn main() {
    stt_engine::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "stt-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = EngineConfig::from_env();

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }
    if let Some(filename) = args.model_filename {
        config.model_filename = filename;
    }
    if let Some(vad_model) = args.vad_model {
        config.vad_model_filename = vad_model;
    }
    if args.no_vad {
        config.enable_vad = false;
    }

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let config = Arc::new(config);

    let model_path = config.model_path();
    info!(path = %model_path.display(), "loading acoustic model");
    let model = WhisperBackend::new(model_path.to_string_lossy())
        .context("failed to load the Whisper acoustic model")?;

    let vad = if config.enable_vad {
        VadGate::load(config.vad_model_path(), config.vad_threshold)
    } else {
        VadGate::disabled()
    };

    let engine: SharedEngine = Arc::new(
        Engine::new_with_metrics(
            model,
            vad,
            Arc::clone(&config),
            Some(Arc::new(metrics::PoolWaitSink)),
        )
        .context("failed to build engine")?,
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port)
        .parse()
        .context("invalid host/port bind address")?;

    let state = AppState {
        engine,
        hallucination_filter: Arc::new(HallucinationFilter::default()),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/v1/transcriptions", post(transcribe))
        .route("/v1/audio/transcriptions", post(transcribe))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_ready: bool,
    service: &'static str,
    api_compatibility: &'static str,
}

/// `GET /health`: model load happens synchronously in `run()` before the router is served, so a
/// reachable server always reports `model_ready: true`.
async fn health(State(_state): State<AppState>) -> Response {
    let body = HealthResponse {
        status: "ok",
        model_ready: true,
        service: "stt-engine",
        api_compatibility: "v1",
    };
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::ModelNotReady => AppError::unavailable("model not ready"),
            Error::Cancelled => Self {
                status: StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
                message: "request cancelled".to_owned(),
            },
            other => AppError::bad_request(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct WordResponse {
    word: String,
    start: f64,
    end: f64,
    probability: f32,
}

#[derive(Debug, Serialize)]
struct SegmentResponse {
    text: String,
    start: f64,
    end: f64,
    probability: f32,
    speaker_turn_next: bool,
    speaker_id: String,
    gender: &'static str,
    emotion: String,
    arousal: f32,
    valence: f32,
    pitch_mean: f32,
    pitch_std: f32,
    energy_mean: f32,
    energy_std: f32,
    spectral_centroid: f32,
    zero_crossing_rate: f32,
    speaker_vec: [f32; 8],
    words: Vec<WordResponse>,
}

#[derive(Debug, Serialize)]
struct MetaResponse {
    processing_time: f64,
    rtf: f64,
    input_sr: u32,
    input_channels: u16,
}

#[derive(Debug, Serialize)]
struct TranscriptionResponse {
    text: String,
    language: String,
    duration: f64,
    segments: Vec<SegmentResponse>,
    meta: MetaResponse,
}

fn to_word(token: &Token) -> WordResponse {
    WordResponse {
        word: token.text.clone(),
        start: stt_engine::segments::centiseconds_to_seconds(token.start_cs),
        end: stt_engine::segments::centiseconds_to_seconds(token.end_cs),
        probability: token.probability,
    }
}

fn to_segment_response(segment: &SegmentResult) -> SegmentResponse {
    let tags = &segment.affective;
    SegmentResponse {
        text: segment.text.clone(),
        start: stt_engine::segments::centiseconds_to_seconds(segment.start_cs),
        end: stt_engine::segments::centiseconds_to_seconds(segment.end_cs),
        probability: segment.avg_probability,
        speaker_turn_next: segment.speaker_turn_next,
        speaker_id: segment.speaker_id.clone(),
        gender: tags.gender_proxy.as_str(),
        emotion: format!("{:?}", tags.emotion_proxy).to_lowercase(),
        arousal: tags.arousal,
        valence: tags.valence,
        pitch_mean: tags.pitch_mean_hz,
        pitch_std: tags.pitch_std_hz,
        energy_mean: tags.energy_mean,
        energy_std: tags.energy_std,
        spectral_centroid: tags.spectral_centroid,
        zero_crossing_rate: tags.zero_crossing_rate,
        speaker_vec: tags.speaker_vec,
        words: segment.tokens.iter().map(to_word).collect(),
    }
}

/// `POST /v1/transcriptions` (and its `/v1/audio/transcriptions` alias) multipart endpoint
/// (§6.5). Fields: `file` (required), `language`, `prompt`, `temperature`, `beam_size`,
/// `translate`, `diarization`.
async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<TranscriptionResponse>, AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut options = RequestOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("failed to read file field: {err}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            "language" => {
                options.language = field_text(field).await?;
            }
            "prompt" => {
                let text = field_text(field).await?;
                options.initial_prompt = if text.is_empty() { None } else { Some(text) };
            }
            "temperature" => {
                options.temperature = parse_field(field, "temperature").await?;
            }
            "beam_size" => {
                options.beam_size = parse_field(field, "beam_size").await?;
            }
            "translate" => {
                options.translate = parse_field(field, "translate").await?;
            }
            "diarization" => {
                options.diarization = parse_field(field, "diarization").await?;
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| AppError::bad_request("missing `file` field"))?;

    // Decoding and inference are synchronous, CPU-bound native calls; run them off the async
    // runtime's worker threads so one request can't stall every other connection (§5).
    let engine = Arc::clone(&state.engine);
    let start = Instant::now();
    let (input_sr, input_channels, audio_seconds, segments) =
        tokio::task::spawn_blocking(move || -> std::result::Result<_, Error> {
            let decoded = audio::decode(&file_bytes)?;
            let input_sr = decoded.sample_rate;
            let input_channels = decoded.channels;
            let audio_seconds = decoded.pcm_data.len() as f64 / input_sr.max(1) as f64;
            let segments = engine.transcribe(&decoded.pcm_data, input_sr, &options)?;
            Ok((input_sr, input_channels, audio_seconds, segments))
        })
        .await
        .map_err(|err| AppError::internal(format!("transcription task panicked: {err}")))?
        .map_err(AppError::from)?;
    let processing_time = start.elapsed().as_secs_f64();

    let segments: Vec<SegmentResult> = segments
        .into_iter()
        .filter(|segment| !state.hallucination_filter.rejects(&segment.text))
        .collect();

    metrics::observe_audio_seconds(audio_seconds);

    let duration = segments
        .last()
        .map(|s| stt_engine::segments::centiseconds_to_seconds(s.end_cs))
        .unwrap_or(0.0);

    let language = segments
        .first()
        .map(|s| s.language.clone())
        .unwrap_or_else(|| "auto".to_owned());

    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_owned();

    let rtf = if audio_seconds > 0.0 {
        processing_time / audio_seconds
    } else {
        0.0
    };

    Ok(Json(TranscriptionResponse {
        text,
        language,
        duration,
        segments: segments.iter().map(to_segment_response).collect(),
        meta: MetaResponse {
            processing_time,
            rtf,
            input_sr,
            input_channels,
        },
    }))
}

/// Read a multipart text field, sanitizing invalid UTF-8 byte sequences by dropping them rather
/// than rejecting the whole request (§6.5 "All text fields UTF-8-sanitized").
async fn field_text(field: axum::extract::multipart::Field<'_>) -> std::result::Result<String, AppError> {
    let bytes = field
        .bytes()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart field: {err}")))?;
    Ok(sanitize_utf8(&bytes))
}

/// Drop invalid byte sequences instead of substituting a replacement character, per §6.5.
fn sanitize_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().filter(|&c| c != '\u{FFFD}').collect()
}

async fn parse_field<T: std::str::FromStr>(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> std::result::Result<T, AppError> {
    let text = field_text(field).await?;
    text.trim()
        .parse::<T>()
        .map_err(|_| AppError::bad_request(format!("invalid value for `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_utf8_passes_through_valid_text() {
        assert_eq!(sanitize_utf8("hello world".as_bytes()), "hello world");
    }

    #[test]
    fn sanitize_utf8_drops_invalid_byte_sequences() {
        let mut bytes = b"tr".to_vec();
        bytes.push(0xFF); // invalid standalone continuation byte
        bytes.extend_from_slice(b"anscript");
        assert_eq!(sanitize_utf8(&bytes), "transcript");
    }
}
