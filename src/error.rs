//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Parley
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone or speaker could not be acquired
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// No supported audio encoding on this host
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Speech-to-text request failed
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Chat completion stream failed
    #[error("completion failed: {0}")]
    CompletionFailed(String),

    /// Speech synthesis request failed
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Audio playback failed
    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    /// Required service credential is absent
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
