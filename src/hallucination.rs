//! Hallucination filter (C8, §4.8): two layers applied by the orchestrator (layer A) and
//! available to protocol surfaces for a second pass (layer B).

/// Layer A: average included-token probability must be ≥ this threshold when at least one valid
/// token was produced. Segments with zero valid tokens pass through unconditionally (§4.8).
pub const PROBABILITY_THRESHOLD: f32 = 0.40;

/// Layer A check. `avg_probability` is ignored (treated as passing) when `token_count == 0`.
pub fn passes_probability_filter(avg_probability: f32, token_count: usize) -> bool {
    token_count == 0 || avg_probability >= PROBABILITY_THRESHOLD
}

/// The built-in banned-phrase list (§4.8, §9 Open Questions: "a `default_banned_phrases()` free
/// function supplies the built-in list").
pub fn default_banned_phrases() -> Vec<String> {
    [
        "altyazı",
        "sesli betimleme",
        "www.",
        ".com",
        "teşekkürler",
        "thank you",
        "thanks for watching",
        "abone ol",
        "subtitle:",
        "transcription:",
        "subscribe to",
        "like and subscribe",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

/// Phrases that, after trimming surrounding punctuation and lowercasing, must match the *whole*
/// segment text exactly to be rejected (§4.8's "exactly equals" rule).
fn default_exact_phrases() -> Vec<String> {
    ["hmm", "ah", "oh", "eh", "um", "uh", "mm", "mhm"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Layer B: text-artifact rejection (§4.8).
///
/// The banned substring/exact-phrase lists are implementer-configurable; a deployment can supply
/// its own localized list via [`HallucinationFilter::new`].
pub struct HallucinationFilter {
    banned_substrings: Vec<String>,
    exact_phrases: Vec<String>,
}

impl HallucinationFilter {
    pub fn new(banned_substrings: Vec<String>, exact_phrases: Vec<String>) -> Self {
        Self {
            banned_substrings,
            exact_phrases,
        }
    }

    /// `true` if `text` should be rejected by layer B.
    pub fn rejects(&self, text: &str) -> bool {
        let trimmed = text.trim();

        if trimmed.chars().count() < 2 {
            return true;
        }
        if trimmed.chars().all(|c| c.is_whitespace() || c.is_ascii_punctuation()) {
            return true;
        }
        if is_bracket_wrapped(trimmed) {
            return true;
        }

        let lower = trimmed.to_lowercase();
        for phrase in &self.banned_substrings {
            if phrase.chars().count() > 4 && lower.contains(phrase.as_str()) {
                return true;
            }
        }

        let bare = lower.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
        if self.exact_phrases.iter().any(|phrase| phrase == bare) {
            return true;
        }

        false
    }
}

impl Default for HallucinationFilter {
    fn default() -> Self {
        Self::new(default_banned_phrases(), default_exact_phrases())
    }
}

fn is_bracket_wrapped(text: &str) -> bool {
    let bytes: Vec<char> = text.chars().collect();
    if bytes.len() < 2 {
        return false;
    }
    let first = *bytes.first().unwrap();
    let last = *bytes.last().unwrap();
    (first == '[' && last == ']') || (first == '(' && last == ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tokens_always_pass_layer_a() {
        assert!(passes_probability_filter(0.0, 0));
    }

    #[test]
    fn low_probability_with_tokens_is_rejected() {
        assert!(!passes_probability_filter(0.10, 3));
    }

    #[test]
    fn probability_at_threshold_passes() {
        assert!(passes_probability_filter(0.40, 3));
    }

    #[test]
    fn bracketed_music_tag_is_rejected() {
        let filter = HallucinationFilter::default();
        assert!(filter.rejects("[Music]"));
        assert!(filter.rejects("(inaudible)"));
    }

    #[test]
    fn banned_phrase_substring_is_rejected() {
        let filter = HallucinationFilter::default();
        assert!(filter.rejects("please subscribe to the channel"));
        assert!(filter.rejects("visit www.example.com"));
    }

    #[test]
    fn short_filler_word_is_rejected_exactly() {
        let filter = HallucinationFilter::default();
        assert!(filter.rejects("hmm"));
        assert!(filter.rejects("Hmm."));
        assert!(filter.rejects("  uh  "));
    }

    #[test]
    fn ordinary_speech_passes() {
        let filter = HallucinationFilter::default();
        assert!(!filter.rejects("the weather today is quite pleasant"));
    }

    #[test]
    fn empty_or_whitespace_only_is_rejected() {
        let filter = HallucinationFilter::default();
        assert!(filter.rejects(""));
        assert!(filter.rejects("   "));
        assert!(filter.rejects("..."));
    }
}
