//! Parley - push-to-talk voice agent with streamed spoken replies
//!
//! Hold to record, release to get an answer: the clip is transcribed, the
//! conversation history plus a fresh system prompt goes to a streaming chat
//! model, and the reply is synthesized over a persistent websocket session
//! and played back while it is still generating.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      UI layer                          │
//! │  press/release │ level meter │ playing flag │ history  │
//! └────────────────────────┬───────────────────────────────┘
//!                          │
//! ┌────────────────────────▼───────────────────────────────┐
//! │                    Orchestrator                        │
//! │  Idle → Recording → Transcribing → Completing →        │
//! │  Speaking → Idle                                       │
//! └──┬──────────┬──────────────┬──────────────┬────────────┘
//!    │          │              │              │
//! ┌──▼───┐  ┌───▼────┐  ┌──────▼─────┐  ┌─────▼─────┐
//! │ mic  │  │  STT   │  │ chat model │  │ TTS + out │
//! │ cpal │  │ upload │  │ SSE stream │  │ websocket │
//! └──────┘  └────────┘  └────────────┘  └───────────┘
//! ```

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod orchestrator;
pub mod voice;

pub use chat::{ChatClient, Completion, StreamAccumulator};
pub use config::{Credentials, Settings, SharedSettings};
pub use conversation::{FunctionCall, History, Message, Role, ToolCall};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, TurnState, normalize_transcript};
