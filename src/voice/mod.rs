//! Voice processing module
//!
//! Audio capture and playback, plus the two speech service clients
//! (transcription over HTTP, synthesis over a persistent websocket).

mod capture;
mod playback;
mod stt;
mod tts;

pub use capture::{AudioCapture, CAPTURE_SAMPLE_RATE, Clip};
pub use playback::{AudioPlayback, AudioSource, PLAYBACK_SAMPLE_RATE};
pub use stt::{SpeechToText, TRANSCRIPTION_MODEL};
pub use tts::{SYNTHESIS_MODEL, TextToSpeech};
