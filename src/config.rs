use std::env;
use std::str::FromStr;

/// Process-wide, resolved settings shared read-only by every request (§3.8, §4.10).
///
/// Resolution order, highest priority first: explicit CLI flag > `STT_ENGINE_*` environment
/// variable > hardcoded default. One value is built at process start and wrapped in an `Arc` by
/// the binaries; the orchestration core never mutates it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub http_port: u16,
    pub metrics_port: u16,

    pub model_dir: String,
    pub model_filename: String,
    pub vad_model_filename: String,

    pub enable_vad: bool,
    pub vad_threshold: f32,
    /// Buffers shorter than this bypass the VAD call entirely (§4.3's 200 ms heuristic,
    /// declared a configurable constant per §9's open questions).
    pub vad_skip_duration_ms: u32,

    pub n_threads: i32,
    /// Size of the decoder-state pool (C6); also the max number of concurrent model calls.
    pub parallel_requests: usize,

    pub language: String,
    pub translate: bool,
    pub enable_diarization: bool,

    pub beam_size: i32,
    pub temperature: f32,
    pub best_of: i32,
    pub logprob_threshold: f32,
    pub no_speech_threshold: f32,
    pub suppress_non_speech_tokens: bool,
    pub flash_attn: bool,

    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    pub lowpass_coefficient: f32,
    pub gender_pitch_threshold_hz: f32,

    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            http_port: 15030,
            metrics_port: 15032,

            model_dir: "/models".to_owned(),
            model_filename: "ggml-medium.bin".to_owned(),
            vad_model_filename: "ggml-silero-vad.bin".to_owned(),

            enable_vad: true,
            vad_threshold: 0.5,
            vad_skip_duration_ms: 200,

            n_threads: num_cpus::get().min(4) as i32,
            parallel_requests: 2,

            language: "auto".to_owned(),
            translate: false,
            enable_diarization: false,

            beam_size: 5,
            temperature: 0.0,
            best_of: 5,
            logprob_threshold: -1.0,
            no_speech_threshold: 0.6,
            suppress_non_speech_tokens: true,
            flash_attn: true,

            min_pitch_hz: 50.0,
            max_pitch_hz: 600.0,
            lowpass_coefficient: 0.1,
            gender_pitch_threshold_hz: 170.0,

            log_level: "info".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Layer `STT_ENGINE_*` environment variables over [`EngineConfig::default`].
    ///
    /// CLI-layer binaries (feature `cli`) should call this first, then overwrite individual
    /// fields from parsed `clap::Args` so CLI flags win over the environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.host = env_or("STT_ENGINE_LISTEN_ADDRESS", cfg.host);
        cfg.http_port = env_parsed_or("STT_ENGINE_HTTP_PORT", cfg.http_port);
        cfg.metrics_port = env_parsed_or("STT_ENGINE_METRICS_PORT", cfg.metrics_port);

        cfg.model_dir = env_or("STT_ENGINE_MODEL_DIR", cfg.model_dir);
        cfg.model_filename = env_or("STT_ENGINE_MODEL_FILENAME", cfg.model_filename);
        cfg.vad_model_filename = env_or("STT_ENGINE_VAD_MODEL", cfg.vad_model_filename);

        cfg.enable_vad = env_parsed_or("STT_ENGINE_ENABLE_VAD", cfg.enable_vad);
        cfg.vad_threshold = env_parsed_or("STT_ENGINE_VAD_THRESHOLD", cfg.vad_threshold);
        cfg.vad_skip_duration_ms =
            env_parsed_or("STT_ENGINE_VAD_SKIP_DURATION_MS", cfg.vad_skip_duration_ms);

        cfg.n_threads = env_parsed_or("STT_ENGINE_THREADS", cfg.n_threads);
        cfg.parallel_requests =
            env_parsed_or("STT_ENGINE_PARALLEL_REQUESTS", cfg.parallel_requests);

        cfg.language = env_or("STT_ENGINE_LANGUAGE", cfg.language);
        cfg.translate = env_parsed_or("STT_ENGINE_TRANSLATE", cfg.translate);
        cfg.enable_diarization =
            env_parsed_or("STT_ENGINE_ENABLE_DIARIZATION", cfg.enable_diarization);

        cfg.beam_size = env_parsed_or("STT_ENGINE_BEAM_SIZE", cfg.beam_size);
        cfg.temperature = env_parsed_or("STT_ENGINE_TEMPERATURE", cfg.temperature);
        cfg.best_of = env_parsed_or("STT_ENGINE_BEST_OF", cfg.best_of);
        cfg.logprob_threshold =
            env_parsed_or("STT_ENGINE_LOGPROB_THRESHOLD", cfg.logprob_threshold);
        cfg.no_speech_threshold =
            env_parsed_or("STT_ENGINE_NO_SPEECH_THRESHOLD", cfg.no_speech_threshold);
        cfg.flash_attn = env_parsed_or("STT_ENGINE_FLASH_ATTN", cfg.flash_attn);

        cfg.log_level = env_or("STT_ENGINE_LOG_LEVEL", cfg.log_level);

        cfg
    }

    /// Full path to the configured Whisper model file.
    pub fn model_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.model_dir).join(&self.model_filename)
    }

    /// Full path to the configured VAD model file.
    pub fn vad_model_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.model_dir).join(&self.vad_model_filename)
    }
}

fn env_or(name: &str, default: String) -> String {
    env::var(name).unwrap_or(default)
}

fn env_parsed_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.parallel_requests, 2);
        assert_eq!(cfg.beam_size, 5);
        assert!(cfg.enable_vad);
        assert_eq!(cfg.vad_skip_duration_ms, 200);
    }

    #[test]
    fn model_path_joins_dir_and_filename() {
        let cfg = EngineConfig {
            model_dir: "/models".to_owned(),
            model_filename: "ggml-base.bin".to_owned(),
            ..EngineConfig::default()
        };
        assert_eq!(cfg.model_path().to_str().unwrap(), "/models/ggml-base.bin");
    }
}
