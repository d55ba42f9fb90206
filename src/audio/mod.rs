//! Audio intake: container detection, PCM extraction, resampling, and the external-transcoder
//! fallback collaborator (§4.1, §4.2, §6.4).

mod decoder;
mod resampler;
mod transcoder;

pub use decoder::{DecodedAudio, decode};
pub use resampler::resample_to_16k;
pub use transcoder::transcode_to_pcm16_16k_mono;
