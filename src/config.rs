//! Configuration: service credentials and mutable conversation settings

use std::sync::{Arc, RwLock};

use secrecy::SecretString;

use crate::{Error, Result};

/// Environment variable holding the chat service API key
pub const CHAT_API_KEY_VAR: &str = "PARLEY_CHAT_API_KEY";

/// Environment variable holding the speech synthesis API key
pub const VOICE_API_KEY_VAR: &str = "PARLEY_VOICE_API_KEY";

/// Default chat model identifier
pub const DEFAULT_CHAT_MODEL: &str = "llama3-70b-8192";

/// Default synthesis voice identifier
pub const DEFAULT_VOICE_ID: &str = "95d51f79-c397-46f9-b49a-23763d3eaa2d";

const DEFAULT_PROMPT: &str = "You are a helpful assistant.

Respond in brief natural sentences.";

/// API credentials for the two external services
///
/// The chat credential is mandatory; without it no conversation can happen.
/// The voice credential is optional — when absent, speech synthesis degrades
/// to a silent no-op and replies stay text-only.
#[derive(Debug)]
pub struct Credentials {
    /// Chat + transcription service key (required)
    pub chat_api_key: SecretString,
    /// Speech synthesis service key (optional)
    pub voice_api_key: Option<SecretString>,
}

impl Credentials {
    /// Load credentials from the environment
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` if the chat key is absent or empty.
    pub fn from_env() -> Result<Self> {
        let chat = std::env::var(CHAT_API_KEY_VAR).unwrap_or_default();
        let voice = std::env::var(VOICE_API_KEY_VAR).ok();
        Self::new(chat, voice)
    }

    /// Build credentials from raw key strings
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` if the chat key is empty.
    pub fn new(chat_api_key: String, voice_api_key: Option<String>) -> Result<Self> {
        if chat_api_key.is_empty() {
            return Err(Error::MissingCredential(format!(
                "chat API key required (set {CHAT_API_KEY_VAR})"
            )));
        }

        Ok(Self {
            chat_api_key: chat_api_key.into(),
            voice_api_key: voice_api_key.filter(|k| !k.is_empty()).map(Into::into),
        })
    }
}

/// User-adjustable conversation settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Chat model identifier
    pub model: String,
    /// Synthesis voice identifier
    pub voice: String,
    /// System prompt sent fresh with every completion
    pub prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            voice: DEFAULT_VOICE_ID.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Shared handle to the mutable settings
///
/// Setters may be called from the UI at any time. A turn in flight is never
/// affected: the orchestrator takes a [`SharedSettings::snapshot`] when it
/// starts the completion step and uses that snapshot for the rest of the turn.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    /// Wrap initial settings in a shared handle
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the settings as they are right now
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.inner.read().unwrap().clone()
    }

    /// Replace the chat model identifier
    pub fn set_model(&self, model: impl Into<String>) {
        self.inner.write().unwrap().model = model.into();
    }

    /// Replace the synthesis voice identifier
    pub fn set_voice(&self, voice: impl Into<String>) {
        self.inner.write().unwrap().voice = voice.into();
    }

    /// Replace the system prompt
    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.inner.write().unwrap().prompt = prompt.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chat_key_is_rejected() {
        let err = Credentials::new(String::new(), None).unwrap_err();
        assert!(matches!(err, Error::MissingCredential(_)));
    }

    #[test]
    fn empty_voice_key_counts_as_absent() {
        let creds = Credentials::new("ck".to_string(), Some(String::new())).unwrap();
        assert!(creds.voice_api_key.is_none());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let shared = SharedSettings::new(Settings::default());
        let before = shared.snapshot();
        shared.set_model("other-model");
        shared.set_prompt("new prompt");

        assert_eq!(before.model, DEFAULT_CHAT_MODEL);
        assert_eq!(shared.snapshot().model, "other-model");
        assert_eq!(shared.snapshot().prompt, "new prompt");
    }
}
