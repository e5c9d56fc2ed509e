//! Conversation orchestration
//!
//! The turn-taking controller: owns the history and the settings handle, and
//! sequences capture → transcription → completion → synthesis → playback on
//! each push-to-talk turn.
//!
//! States run `Idle → Recording → Transcribing → Completing → Speaking →
//! Idle`, short-circuiting back to `Idle` whenever a step yields nothing
//! actionable (empty transcript, empty completion). Step failures are logged
//! and resolve to `Idle`; history appended before the failing step is never
//! retracted.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::chat::ChatClient;
use crate::config::{Credentials, SharedSettings};
use crate::conversation::{History, Message};
use crate::voice::{AudioCapture, AudioPlayback, SpeechToText, TextToSpeech};
use crate::Result;

/// Where the turn pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Waiting for a mic press
    #[default]
    Idle,
    /// Microphone open, chunks buffering
    Recording,
    /// Clip uploaded, waiting for text
    Transcribing,
    /// Completion streaming in
    Completing,
    /// Reply playing back
    Speaking,
}

/// Trim a raw transcript; `None` means nothing was said
#[must_use]
pub fn normalize_transcript(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The turn-taking controller
///
/// Construction requires [`Credentials`], which cannot exist without the
/// chat key — so an orchestrator without a chat credential is unrepresentable.
/// Audio devices and the synthesis session are acquired lazily, keeping
/// their failures local to the turn that hit them.
pub struct Orchestrator {
    capture: AudioCapture,
    playback: AudioPlayback,
    stt: SpeechToText,
    chat: ChatClient,
    tts: TextToSpeech,
    history: Arc<History>,
    settings: SharedSettings,
    state: TurnState,
}

impl Orchestrator {
    /// Create an orchestrator from validated credentials
    #[must_use]
    pub fn new(credentials: Credentials, settings: SharedSettings) -> Self {
        // Transcription and chat ride on the same service credential
        let transcription_key: SecretString =
            credentials.chat_api_key.expose_secret().to_owned().into();

        Self {
            capture: AudioCapture::new(),
            playback: AudioPlayback::new(),
            stt: SpeechToText::new(transcription_key),
            chat: ChatClient::new(credentials.chat_api_key),
            tts: TextToSpeech::new(credentials.voice_api_key),
            history: Arc::new(History::new()),
            settings,
            state: TurnState::Idle,
        }
    }

    /// Load credentials from the environment and construct
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` if the chat key is absent; no partial
    /// instance exists in that case.
    pub fn from_env(settings: SharedSettings) -> Result<Self> {
        Ok(Self::new(Credentials::from_env()?, settings))
    }

    /// Mic press: start a recording session
    ///
    /// On failure the device is not held, no history is touched, and the
    /// machine stays `Idle`; the error is returned for the UI layer.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` or `UnsupportedFormat` from the capture
    /// layer.
    pub fn start_recording(&mut self) -> Result<()> {
        match self.capture.start() {
            Ok(()) => {
                self.state = TurnState::Recording;
                tracing::debug!("recording");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "could not start recording");
                Err(e)
            }
        }
    }

    /// Mic release: finalize the clip and run the turn to completion
    ///
    /// A no-op unless currently recording. Failures inside the turn are
    /// logged and the machine returns to `Idle`; whatever history was
    /// appended before the failing step stays appended.
    #[allow(clippy::future_not_send)]
    pub async fn stop_recording(&mut self) {
        if self.state != TurnState::Recording {
            return;
        }

        if let Err(e) = self.run_turn().await {
            tracing::error!(error = %e, "turn failed");
        }
        self.state = TurnState::Idle;
    }

    /// Focus loss: force the stop transition if a recording is live
    ///
    /// Prevents a stuck-recording state when the user switches away
    /// mid-press without a release event.
    #[allow(clippy::future_not_send)]
    pub async fn focus_lost(&mut self) {
        if self.state == TurnState::Recording {
            tracing::debug!("focus lost while recording, forcing stop");
            self.stop_recording().await;
        }
    }

    /// One full turn, from finalized clip to finished playback
    async fn run_turn(&mut self) -> Result<()> {
        self.state = TurnState::Transcribing;
        let Some(clip) = self.capture.stop() else {
            return Ok(());
        };

        let raw = self.stt.transcribe(&clip).await?;
        let Some(transcript) = normalize_transcript(&raw) else {
            tracing::debug!("empty transcript, nothing said");
            return Ok(());
        };

        self.history.push(Message::user(&transcript));

        // Settings are pinned here; mid-turn changes wait for the next turn
        self.state = TurnState::Completing;
        let settings = self.settings.snapshot();
        let messages = self.history.snapshot();
        let completion = self
            .chat
            .complete(&messages, &settings.model, &settings.prompt)
            .await?;

        if !completion.tool_calls.is_empty() {
            // TODO: execute the assembled calls and re-complete with the
            // tool results appended (bounded at 10 rounds), once a tool
            // registry exists
            tracing::warn!(
                count = completion.tool_calls.len(),
                "model requested tool calls, execution not enabled"
            );
        }

        if completion.text.is_empty() {
            tracing::debug!("empty completion, nothing to say");
            return Ok(());
        }

        self.history.push(Message::assistant(&completion.text));

        self.state = TurnState::Speaking;
        if let Some(source) = self.tts.synthesize(&completion.text, &settings.voice).await? {
            self.playback.play(source).await?;
        }

        Ok(())
    }

    /// Current pipeline state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// Whether a recording session is live
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state == TurnState::Recording
    }

    /// Whether a reply is currently playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Latest input loudness sample, roughly 0-100
    #[must_use]
    pub fn input_level(&self) -> f32 {
        self.capture.level()
    }

    /// Stable snapshot of the conversation so far
    #[must_use]
    pub fn history(&self) -> Arc<Vec<Message>> {
        self.history.snapshot()
    }

    /// Handle to the mutable model/voice/prompt settings
    #[must_use]
    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }
}
