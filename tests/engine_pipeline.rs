#![cfg(feature = "test-util")]

//! End-to-end coverage across the decoder, resampler, VAD gate, pool, and hallucination filter,
//! exercised through the public `Engine` API against the in-memory acoustic-model stub.

use std::io::Cursor;
use std::sync::Arc;

use stt_engine::backend::test_support::StubModel;
use stt_engine::backend::{RawSegment, RawToken};
use stt_engine::config::EngineConfig;
use stt_engine::opts::RequestOptions;
use stt_engine::orchestrator::Engine;
use stt_engine::vad_gate::VadGate;
use stt_engine::{audio, wav};

/// A one-second, 8 kHz mono WAV of a quiet tone, encoded in memory with `hound`.
fn wav_bytes(sample_rate: u32, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let n = (sample_rate as f32 * seconds) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 220.0 * std::f32::consts::TAU).sin() * 8_000.0;
            writer.write_sample(sample as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn engine_with(segments: Vec<RawSegment>, config: EngineConfig) -> Engine<StubModel> {
    let model = StubModel::with_segments(segments);
    Engine::new(model, VadGate::disabled(), Arc::new(config)).expect("engine builds")
}

#[test]
fn decode_resample_and_transcribe_a_non_native_sample_rate() {
    // 8 kHz input exercises the decoder (C1) and the resampler (C2) before the model ever runs.
    let bytes = wav_bytes(8_000, 1.0);
    let decoded = audio::decode(&bytes).expect("wav decodes");
    assert_eq!(decoded.sample_rate, 8_000);
    assert_eq!(decoded.channels, 1);

    let engine = engine_with(
        vec![RawSegment {
            text: "testing one two three".to_owned(),
            start_cs: 0,
            end_cs: 100,
            speaker_turn_next: false,
            tokens: vec![RawToken {
                id: 1,
                text: "testing one two three".to_owned(),
                probability: 0.92,
                start_cs: 0,
                end_cs: 100,
            }],
        }],
        EngineConfig {
            enable_vad: false,
            parallel_requests: 1,
            ..EngineConfig::default()
        },
    );

    let segments = engine
        .transcribe(&decoded.pcm_data, decoded.sample_rate, &RequestOptions::default())
        .expect("transcription succeeds");

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, "testing one two three");
    // The segment spans a full second of 16 kHz audio, well past the prosody gate (§4.4), so it
    // should carry a real speaker id rather than the short-segment fallback.
    assert_ne!(segments[0].speaker_id, "unknown");
}

#[test]
fn wav_helper_round_trips_mono_16khz_input() {
    let bytes = wav_bytes(16_000, 0.5);
    let path = std::env::temp_dir().join("stt_engine_engine_pipeline_fixture.wav");
    std::fs::write(&path, &bytes).unwrap();

    let (samples, spec) = wav::get_samples_from_wav(&path.to_string_lossy().into_owned())
        .expect("mono 16kHz wav reads back");
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(samples.len(), 8_000);

    std::fs::remove_file(&path).ok();
}

#[test]
fn identical_speakers_across_two_segments_share_a_cluster() {
    // Two segments with the same synthetic tone should land in the same speaker cluster (C5),
    // while the pool (C6) balances back out afterward.
    let bytes = wav_bytes(16_000, 2.0);
    let decoded = audio::decode(&bytes).unwrap();

    let make_segment = |start_cs: i64, end_cs: i64| RawSegment {
        text: "hello again".to_owned(),
        start_cs,
        end_cs,
        speaker_turn_next: false,
        tokens: vec![RawToken {
            id: 1,
            text: "hello again".to_owned(),
            probability: 0.9,
            start_cs,
            end_cs,
        }],
    };

    let engine = engine_with(
        vec![make_segment(0, 100), make_segment(100, 200)],
        EngineConfig {
            enable_vad: false,
            parallel_requests: 2,
            ..EngineConfig::default()
        },
    );

    let segments = engine
        .transcribe(&decoded.pcm_data, decoded.sample_rate, &RequestOptions::default())
        .unwrap();

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].speaker_id, segments[1].speaker_id);
    assert_eq!(engine.idle_decoder_states(), 2);
}
