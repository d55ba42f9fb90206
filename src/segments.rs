use serde::Serialize;

/// A single token produced by the model collaborator for one segment (§3.3).
///
/// Timestamps are centiseconds (10 ms units), matching the model's own reporting unit, so the
/// orchestrator can compare them against segment bounds without a unit conversion.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub probability: f32,
    pub start_cs: i64,
    pub end_cs: i64,
}

/// Convert centiseconds to seconds for wire-surface consumption (§6.5).
pub fn centiseconds_to_seconds(value: i64) -> f64 {
    value as f64 / 100.0
}

/// Per-segment prosodic summary and coarse categorical labels (§3.5).
///
/// Every numeric field has a deterministic default when the source audio was too short or
/// contained no voiced frames; see [`AffectiveTags::default_for_short_segment`].
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AffectiveTags {
    pub gender_proxy: GenderProxy,
    pub emotion_proxy: EmotionProxy,
    pub arousal: f32,
    pub valence: f32,
    pub pitch_mean_hz: f32,
    pub pitch_std_hz: f32,
    pub energy_mean: f32,
    pub energy_std: f32,
    pub spectral_centroid: f32,
    pub zero_crossing_rate: f32,
    pub speaker_vec: [f32; 8],
}

impl AffectiveTags {
    /// The default returned for segments shorter than 160 samples (10 ms at 16 kHz), or when no
    /// voiced frame was found at all (§4.4).
    pub fn default_for_short_segment() -> Self {
        Self {
            gender_proxy: GenderProxy::Unknown,
            emotion_proxy: EmotionProxy::Neutral,
            arousal: 0.0,
            valence: 0.0,
            pitch_mean_hz: 0.0,
            pitch_std_hz: 0.0,
            energy_mean: 0.0,
            energy_std: 0.0,
            spectral_centroid: 0.0,
            zero_crossing_rate: 0.0,
            speaker_vec: [0.0; 8],
        }
    }
}

/// A coarse `{M, F, ?}` label derived from pitch and ZCR; never treated as ground truth.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenderProxy {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "?")]
    Unknown,
}

impl GenderProxy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Unknown => "?",
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmotionProxy {
    Neutral,
    Excited,
    Angry,
    Sad,
}

/// `{text, language, avg_probability, start_cs, end_cs, speaker_turn_next, tokens, affective,
/// speaker_id}` (§3.4).
#[derive(Debug, Serialize, Clone)]
pub struct SegmentResult {
    pub text: String,
    pub language: String,
    pub avg_probability: f32,
    pub start_cs: i64,
    pub end_cs: i64,
    pub speaker_turn_next: bool,
    pub tokens: Vec<Token>,
    pub affective: AffectiveTags,
    pub speaker_id: String,
}

impl SegmentResult {
    /// The single empty segment emitted by the VAD short-circuit (§4.3, S1).
    pub fn empty_vad_negative(duration_cs: i64) -> Self {
        Self {
            text: String::new(),
            language: "unknown".to_owned(),
            avg_probability: 0.0,
            start_cs: 0,
            end_cs: duration_cs,
            speaker_turn_next: false,
            tokens: Vec::new(),
            affective: AffectiveTags::default_for_short_segment(),
            speaker_id: "unknown".to_owned(),
        }
    }
}

/// `{id, centroid, count}` owned exclusively by one request's [`crate::speaker::SpeakerClusterer`]
/// (§3.6).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerCluster {
    pub id: String,
    pub centroid: [f32; 8],
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_proxy_as_str_matches_serde_rename() {
        assert_eq!(GenderProxy::Male.as_str(), "M");
        assert_eq!(GenderProxy::Female.as_str(), "F");
        assert_eq!(GenderProxy::Unknown.as_str(), "?");
    }

    #[test]
    fn centiseconds_to_seconds_divides_by_hundred() {
        assert_eq!(centiseconds_to_seconds(250), 2.5);
        assert_eq!(centiseconds_to_seconds(0), 0.0);
    }

    #[test]
    fn empty_vad_negative_matches_s1_scenario() {
        let seg = SegmentResult::empty_vad_negative(100);
        assert_eq!(seg.text, "");
        assert_eq!(seg.language, "unknown");
        assert_eq!(seg.avg_probability, 0.0);
        assert_eq!(seg.start_cs, 0);
        assert_eq!(seg.end_cs, 100);
        assert_eq!(seg.speaker_id, "unknown");
    }
}
