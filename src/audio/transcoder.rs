use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Error, Result};

/// Invoke the external transcoder collaborator for non-RIFF containers (MP3, WebM, etc.) (§6.4).
///
/// The payload is written to a temporary input file and `ffmpeg` is invoked with an argv array
/// (never a shell string, to rule out injection) to produce raw little-endian signed 16-bit mono
/// PCM at 16 kHz into a second temporary file, which is then read back. Both temp files are
/// cleaned up on every exit path via `tempfile`'s drop-based deletion.
///
/// Returns `Ok(vec![])` (never an error for "ffmpeg not installed" or "decode failed") so the
/// caller can fall back to treating the payload as raw PCM (§4.1 step 1, §7).
pub fn transcode_to_pcm16_16k_mono(bytes: &[u8]) -> Result<Vec<i16>> {
    let mut input_file =
        NamedTempFile::new().map_err(|err| Error::msg(format!("failed to create temp input file: {err}")))?;
    input_file
        .write_all(bytes)
        .map_err(|err| Error::msg(format!("failed to write temp input file: {err}")))?;
    input_file
        .flush()
        .map_err(|err| Error::msg(format!("failed to flush temp input file: {err}")))?;

    let output_file = NamedTempFile::new()
        .map_err(|err| Error::msg(format!("failed to create temp output file: {err}")))?;

    let input_path = input_file.path();
    let output_path = output_file.path();

    let status = Command::new("ffmpeg")
        .args([
            "-hide_banner".as_ref(),
            "-loglevel".as_ref(),
            "error".as_ref(),
            "-y".as_ref(),
            "-i".as_ref(),
            input_path.as_os_str(),
            "-f".as_ref(),
            "s16le".as_ref(),
            "-ar".as_ref(),
            "16000".as_ref(),
            "-ac".as_ref(),
            "1".as_ref(),
            output_path.as_os_str(),
        ])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .output();

    // Both temp files are removed when `input_file`/`output_file` drop at the end of this
    // function, regardless of which branch below returns.
    let output = match status {
        Ok(output) => output,
        Err(err) => {
            warn!(error = %err, "failed to spawn external transcoder");
            return Ok(Vec::new());
        }
    };

    if !output.status.success() {
        warn!(
            stderr = %String::from_utf8_lossy(&output.stderr),
            "external transcoder exited non-zero"
        );
        return Ok(Vec::new());
    }

    let raw = std::fs::read(output_path)
        .map_err(|err| Error::msg(format!("failed to read transcoder output: {err}")))?;

    let num_samples = raw.len() / 2;
    let pcm: Vec<i16> = raw
        .chunks_exact(2)
        .take(num_samples)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ffmpeg_binary_degrades_to_empty_buffer() {
        // Property: transcoder failures never surface as a hard error (§7); the caller falls
        // back to the raw-PCM interpretation. We can't assert ffmpeg is absent in CI, so this
        // only asserts the function returns `Ok` either way.
        let result = transcode_to_pcm16_16k_mono(b"not a real media container");
        assert!(result.is_ok());
    }
}
