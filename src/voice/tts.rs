//! Speech synthesis over a persistent websocket session
//!
//! One connection serves the whole process lifetime: established lazily on
//! first use, reused across turns, and replaced only after a socket failure.
//! Synthesis hands back a playable source as soon as the first audio chunk
//! arrives; the rest of the utterance keeps streaming in the background.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::OwnedMutexGuard;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::voice::playback::{AudioSource, PLAYBACK_SAMPLE_RATE};
use crate::{Error, Result};

const SYNTHESIS_WS_URL: &str = "wss://api.cartesia.ai/tts/websocket";
const API_VERSION: &str = "2024-06-10";

/// Synthesis model identifier
pub const SYNTHESIS_MODEL: &str = "sonic-english";

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceSelector<'a>,
    output_format: OutputFormat,
    context_id: &'a str,
}

#[derive(Serialize)]
struct VoiceSelector<'a> {
    mode: &'a str,
    id: &'a str,
}

#[derive(Serialize)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}

/// Events the synthesis service streams back
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SynthesisEvent {
    /// An audio-bearing chunk, base64 pcm_f32le
    Chunk {
        data: String,
        #[serde(default)]
        context_id: Option<String>,
    },
    /// The utterance finished generating
    Done {
        #[serde(default)]
        context_id: Option<String>,
    },
    /// Service-side failure for this request
    Error { error: String },
    /// Timestamps and other events this client does not consume
    #[serde(other)]
    Other,
}

/// Synthesizes speech over a reusable websocket session
///
/// Without a credential the whole client degrades to a silent no-op: every
/// call succeeds immediately and produces no audio ("voice disabled" mode).
pub struct TextToSpeech {
    api_key: Option<SecretString>,
    conn: Arc<tokio::sync::Mutex<Option<WsConn>>>,
}

impl TextToSpeech {
    /// Create a new synthesis client; `None` enables silent mode
    #[must_use]
    pub fn new(api_key: Option<SecretString>) -> Self {
        if api_key.is_none() {
            tracing::info!("no voice credential, speech synthesis disabled");
        }
        Self {
            api_key,
            conn: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Create a client permanently in silent mode
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Whether synthesis is enabled (a credential is present)
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Synthesize text with the given voice
    ///
    /// Resolves as soon as the first audio chunk arrives, returning a source
    /// that keeps receiving the rest of the utterance in the background.
    /// Returns `Ok(None)` in silent mode or when the service produced no
    /// audio.
    ///
    /// # Errors
    ///
    /// Returns `SynthesisFailed` on connection or mid-send failure; the
    /// broken connection is discarded so the next call reconnects.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Option<AudioSource>> {
        let Some(api_key) = &self.api_key else {
            tracing::debug!("voice disabled, skipping synthesis");
            return Ok(None);
        };

        let mut guard = self.acquire_connection(api_key).await?;

        let context_id = uuid::Uuid::new_v4().to_string();
        let request = SynthesisRequest {
            model_id: SYNTHESIS_MODEL,
            transcript: text,
            voice: VoiceSelector {
                mode: "id",
                id: voice_id,
            },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_f32le",
                sample_rate: PLAYBACK_SAMPLE_RATE,
            },
            context_id: &context_id,
        };
        let frame = serde_json::to_string(&request)?;

        let started = Instant::now();

        {
            let Some(ws) = guard.as_mut() else {
                return Err(Error::SynthesisFailed("connection not established".to_string()));
            };
            if let Err(e) = ws.send(WsMessage::Text(frame)).await {
                *guard = None;
                return Err(Error::SynthesisFailed(e.to_string()));
            }
        }

        // Wait for the first audio-bearing event, then hand the socket to a
        // background task that drains the rest of the utterance
        loop {
            let Some(ws) = guard.as_mut() else {
                return Err(Error::SynthesisFailed("connection not established".to_string()));
            };
            match ws.next().await {
                Some(Ok(WsMessage::Text(payload))) => {
                    match serde_json::from_str::<SynthesisEvent>(&payload) {
                        Ok(SynthesisEvent::Chunk { data, context_id: ctx })
                            if ctx.as_deref().is_none_or(|c| c == context_id) =>
                        {
                            tracing::debug!(
                                elapsed_ms = started.elapsed().as_millis(),
                                "first audio chunk received"
                            );
                            let samples = decode_chunk(&data)?;
                            let (tx, source) = AudioSource::channel(PLAYBACK_SAMPLE_RATE);
                            let _ = tx.send(samples).await;
                            tokio::spawn(drain_utterance(guard, context_id, tx));
                            return Ok(Some(source));
                        }
                        Ok(SynthesisEvent::Done { .. }) => {
                            tracing::debug!("synthesis finished without audio");
                            return Ok(None);
                        }
                        Ok(SynthesisEvent::Error { error }) => {
                            return Err(Error::SynthesisFailed(error));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::trace!(error = %e, "skipping unparseable synthesis event");
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    *guard = None;
                    return Err(Error::SynthesisFailed(e.to_string()));
                }
                None => {
                    *guard = None;
                    return Err(Error::SynthesisFailed("connection closed".to_string()));
                }
            }
        }
    }

    /// Get the live connection, establishing it if needed
    async fn acquire_connection(
        &self,
        api_key: &SecretString,
    ) -> Result<OwnedMutexGuard<Option<WsConn>>> {
        let mut guard = Arc::clone(&self.conn).lock_owned().await;

        if guard.is_none() {
            let url = format!(
                "{SYNTHESIS_WS_URL}?api_key={}&cartesia_version={API_VERSION}",
                api_key.expose_secret()
            );
            let (ws, _) = connect_async(&url)
                .await
                .map_err(|e| Error::SynthesisFailed(e.to_string()))?;
            tracing::debug!("synthesis connection established");
            *guard = Some(ws);
        }

        Ok(guard)
    }
}

/// Forward remaining utterance chunks to the source, then release the socket
///
/// Holds the connection lock until the utterance ends so no other request
/// interleaves; the connection itself survives for the next turn unless the
/// socket fails.
async fn drain_utterance(
    mut guard: OwnedMutexGuard<Option<WsConn>>,
    context_id: String,
    tx: tokio::sync::mpsc::Sender<Vec<f32>>,
) {
    loop {
        let Some(ws) = guard.as_mut() else {
            return;
        };
        match ws.next().await {
            Some(Ok(WsMessage::Text(payload))) => {
                match serde_json::from_str::<SynthesisEvent>(&payload) {
                    Ok(SynthesisEvent::Chunk { data, context_id: ctx })
                        if ctx.as_deref().is_none_or(|c| c == context_id) =>
                    {
                        match decode_chunk(&data) {
                            // A closed receiver just means playback stopped
                            // listening; keep reading so the socket flushes
                            Ok(samples) => {
                                let _ = tx.send(samples).await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "bad audio chunk, skipping");
                            }
                        }
                    }
                    Ok(SynthesisEvent::Done { context_id: ctx })
                        if ctx.as_deref().is_none_or(|c| c == context_id) =>
                    {
                        tracing::debug!("utterance complete");
                        return;
                    }
                    Ok(SynthesisEvent::Error { error }) => {
                        tracing::error!(error = %error, "synthesis error mid-utterance");
                        return;
                    }
                    Ok(_) | Err(_) => {}
                }
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "synthesis connection lost mid-utterance");
                *guard = None;
                return;
            }
            None => {
                *guard = None;
                return;
            }
        }
    }
}

/// Decode a base64 pcm_f32le payload into samples
fn decode_chunk(data: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| Error::SynthesisFailed(e.to_string()))?;

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn silent_mode_synthesize_is_a_noop() {
        let tts = TextToSpeech::disabled();
        assert!(!tts.is_enabled());

        let result = tts.synthesize("hello there", "some-voice").await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn chunk_decoding_yields_le_f32_samples() {
        let samples = [0.0_f32, 0.5, -1.0];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let encoded = BASE64.encode(&bytes);

        assert_eq!(decode_chunk(&encoded).unwrap(), samples);
    }

    #[test]
    fn malformed_chunk_payload_is_an_error() {
        assert!(decode_chunk("not base64!!!").is_err());
    }

    #[test]
    fn synthesis_events_parse() {
        let chunk = r#"{"type":"chunk","data":"AAAA","context_id":"ctx"}"#;
        assert!(matches!(
            serde_json::from_str::<SynthesisEvent>(chunk).unwrap(),
            SynthesisEvent::Chunk { .. }
        ));

        let done = r#"{"type":"done","context_id":"ctx"}"#;
        assert!(matches!(
            serde_json::from_str::<SynthesisEvent>(done).unwrap(),
            SynthesisEvent::Done { .. }
        ));

        let error = r#"{"type":"error","error":"bad voice"}"#;
        assert!(matches!(
            serde_json::from_str::<SynthesisEvent>(error).unwrap(),
            SynthesisEvent::Error { .. }
        ));

        let timestamps = r#"{"type":"timestamps","word_timestamps":{}}"#;
        assert!(matches!(
            serde_json::from_str::<SynthesisEvent>(timestamps).unwrap(),
            SynthesisEvent::Other
        ));
    }
}
