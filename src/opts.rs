use crate::config::EngineConfig;

/// Numeric "unset" sentinel for `i32` fields (§3.2, §4.9).
pub const UNSET_I32: i32 = -1;
/// Numeric "unset" sentinel for `f32` fields.
pub const UNSET_F32: f32 = -1.0;

/// Per-call transcription options as received from a protocol surface, before resolution
/// against server defaults (§3.2).
///
/// Unset numeric fields use the sentinel `-1` / `-1.0`; an empty `language` means
/// auto-detect. This is library-level configuration, constructed by the wire-surface
/// collaborators (HTTP multipart, RPC) from user input — it is not itself a CLI/HTTP type.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Target language hint. Empty means auto-detect.
    pub language: String,
    pub initial_prompt: Option<String>,
    pub translate: bool,
    pub diarization: bool,

    /// Sentinel `-1.0` inherits [`EngineConfig::temperature`].
    pub temperature: f32,
    /// Sentinel `-1` inherits [`EngineConfig::beam_size`].
    pub beam_size: i32,
    /// Sentinel `-1` inherits [`EngineConfig::best_of`].
    pub best_of: i32,

    pub enable_prosody: bool,
    /// Sentinel `-1.0` inherits [`EngineConfig::min_pitch_hz`].
    pub min_pitch_hz: f32,
    /// Sentinel `-1.0` inherits [`EngineConfig::max_pitch_hz`].
    pub max_pitch_hz: f32,
    /// Sentinel `-1.0` inherits [`EngineConfig::lowpass_coefficient`].
    pub lowpass_coefficient: f32,
    /// Sentinel `-1.0` inherits [`EngineConfig::gender_pitch_threshold_hz`].
    pub gender_pitch_threshold_hz: f32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            language: String::new(),
            initial_prompt: None,
            translate: false,
            diarization: false,
            temperature: UNSET_F32,
            beam_size: UNSET_I32,
            best_of: UNSET_I32,
            enable_prosody: true,
            min_pitch_hz: UNSET_F32,
            max_pitch_hz: UNSET_F32,
            lowpass_coefficient: UNSET_F32,
            gender_pitch_threshold_hz: UNSET_F32,
        }
    }
}

/// Resolved, immutable options for the lifetime of one call (§3.2, §4.9).
///
/// Produced once by [`RequestOptions::resolve`]; nothing downstream mutates it.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub language: Option<String>,
    pub initial_prompt: Option<String>,
    pub translate: bool,
    pub diarization: bool,
    pub temperature: f32,
    pub beam_size: i32,
    pub best_of: i32,
    pub enable_prosody: bool,
    pub min_pitch_hz: f32,
    pub max_pitch_hz: f32,
    pub lowpass_coefficient: f32,
    pub gender_pitch_threshold_hz: f32,
}

impl ResolvedOptions {
    /// `true` iff the resolved sampling strategy is beam search (beam_size > 1), greedy
    /// otherwise (§4.7 step 5).
    pub fn use_beam_search(&self) -> bool {
        self.beam_size > 1
    }
}

impl RequestOptions {
    /// Resolve unset sentinels against `config`, freezing the result for the remainder of the
    /// call (§4.9).
    pub fn resolve(&self, config: &EngineConfig) -> ResolvedOptions {
        let language = if self.language.trim().is_empty() {
            None
        } else {
            Some(self.language.clone())
        };

        ResolvedOptions {
            language,
            initial_prompt: self.initial_prompt.clone(),
            translate: self.translate,
            diarization: self.diarization,
            temperature: resolve_f32(self.temperature, config.temperature),
            beam_size: resolve_i32(self.beam_size, config.beam_size),
            best_of: resolve_i32(self.best_of, config.best_of),
            enable_prosody: self.enable_prosody,
            min_pitch_hz: resolve_f32(self.min_pitch_hz, config.min_pitch_hz),
            max_pitch_hz: resolve_f32(self.max_pitch_hz, config.max_pitch_hz),
            lowpass_coefficient: resolve_f32(self.lowpass_coefficient, config.lowpass_coefficient),
            gender_pitch_threshold_hz: resolve_f32(
                self.gender_pitch_threshold_hz,
                config.gender_pitch_threshold_hz,
            ),
        }
    }
}

fn resolve_i32(value: i32, default: i32) -> i32 {
    if value >= 0 { value } else { default }
}

fn resolve_f32(value: f32, default: f32) -> f32 {
    if value >= 0.0 { value } else { default }
}
