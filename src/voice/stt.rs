//! Speech-to-text transcription

use std::time::Instant;

use secrecy::{ExposeSecret, SecretString};

use crate::voice::Clip;
use crate::{Error, Result};

const TRANSCRIPTIONS_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";

/// Transcription model identifier
pub const TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes finalized clips to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
}

impl SpeechToText {
    /// Create a new transcription client
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Transcribe a clip, returning trimmed text
    ///
    /// Decoding is deterministic (temperature 0) with language auto-detect.
    /// The result may be empty — the caller decides what "nothing said"
    /// means.
    ///
    /// # Errors
    ///
    /// Returns `TranscriptionFailed` if the upload or the service fails.
    pub async fn transcribe(&self, clip: &Clip) -> Result<String> {
        let wav = clip.to_wav()?;
        tracing::debug!(
            audio_bytes = wav.len(),
            duration_secs = clip.duration_secs(),
            "starting transcription"
        );

        let started = Instant::now();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::TranscriptionFailed(e.to_string()))?,
            )
            .text("model", TRANSCRIPTION_MODEL)
            .text("temperature", "0")
            .text("response_format", "json");

        let response = self
            .client
            .post(TRANSCRIPTIONS_URL)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::TranscriptionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::TranscriptionFailed(format!("HTTP {status}: {body}")));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::TranscriptionFailed(e.to_string()))?;

        let text = result.text.trim().to_string();
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis(),
            transcript = %text,
            "transcription complete"
        );

        Ok(text)
    }
}
