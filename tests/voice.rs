//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware or network.

use parley::voice::{AudioSource, CAPTURE_SAMPLE_RATE, Clip, PLAYBACK_SAMPLE_RATE, TextToSpeech};
use parley::{Credentials, Error, Orchestrator, Settings, SharedSettings, TurnState, normalize_transcript};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (CAPTURE_SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / CAPTURE_SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn clip_encodes_as_wav() {
    let clip = Clip {
        samples: generate_sine_samples(440.0, 0.1, 0.5),
        sample_rate: CAPTURE_SAMPLE_RATE,
    };
    let wav = clip.to_wav().unwrap();

    // Check WAV header magic
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    assert!(wav.len() > 44); // WAV header is 44 bytes
}

#[test]
fn clip_duration_tracks_sample_count() {
    let clip = Clip {
        samples: vec![0.0; CAPTURE_SAMPLE_RATE as usize / 2],
        sample_rate: CAPTURE_SAMPLE_RATE,
    };
    assert!((clip.duration_secs() - 0.5).abs() < 0.001);
}

#[tokio::test]
async fn audio_source_preserves_chunk_order() {
    let (tx, mut source) = AudioSource::channel(PLAYBACK_SAMPLE_RATE);

    let feeder = tokio::spawn(async move {
        for i in 0..5_i32 {
            let value = i as f32;
            tx.send(vec![value; 10]).await.unwrap();
        }
    });

    let mut seen = Vec::new();
    while let Some(chunk) = source.next_chunk().await {
        seen.push(chunk[0]);
    }
    feeder.await.unwrap();

    assert_eq!(seen, [0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[tokio::test]
async fn silent_voice_mode_never_produces_audio() {
    let tts = TextToSpeech::disabled();

    for text in ["hello", "a longer reply with several words", "?"] {
        let result = tts.synthesize(text, "any-voice").await;
        assert!(matches!(result, Ok(None)));
    }
}

#[test]
fn transcript_normalization_gates_the_turn() {
    // Whitespace-only transcriptions mean nothing was said
    assert_eq!(normalize_transcript(""), None);
    assert_eq!(normalize_transcript("  \n "), None);
    assert_eq!(normalize_transcript(" hi "), Some("hi".to_string()));
}

#[test]
fn orchestrator_requires_chat_credential() {
    let err = Credentials::new(String::new(), None).unwrap_err();
    assert!(matches!(err, Error::MissingCredential(_)));
}

#[tokio::test]
async fn orchestrator_idle_operations_are_noops() {
    let credentials = Credentials::new("test-key".to_string(), None).unwrap();
    let mut orchestrator = Orchestrator::new(credentials, SharedSettings::new(Settings::default()));

    // Stop and focus-loss without a live recording change nothing
    orchestrator.stop_recording().await;
    orchestrator.focus_lost().await;

    assert_eq!(orchestrator.state(), TurnState::Idle);
    assert!(orchestrator.history().is_empty());
    assert!(!orchestrator.is_playing());
}

#[test]
fn settings_changes_do_not_leak_into_snapshots() {
    let credentials = Credentials::new("test-key".to_string(), None).unwrap();
    let orchestrator = Orchestrator::new(credentials, SharedSettings::new(Settings::default()));

    let settings = orchestrator.settings();
    let pinned = settings.snapshot();
    settings.set_model("some-newer-model");
    settings.set_voice("another-voice");

    // The pinned snapshot (as a turn would hold) is unaffected
    assert_eq!(pinned.model, Settings::default().model);
    assert_eq!(pinned.voice, Settings::default().voice);
    assert_eq!(settings.snapshot().model, "some-newer-model");
}
