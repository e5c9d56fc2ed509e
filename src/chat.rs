//! Streaming chat completions
//!
//! Issues one streamed completion request per turn and folds the incremental
//! chunks into a full response: content fragments into a text buffer,
//! indexed tool-call deltas into per-index buffers.

use std::collections::BTreeMap;
use std::time::Instant;

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::conversation::{FunctionCall, Message, ToolCall};
use crate::{Error, Result};

const COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Fixed sampling temperature
const TEMPERATURE: f32 = 0.7;

/// Fixed response length cap
const MAX_TOKENS: u32 = 1024;

/// Fixed nucleus sampling parameter
const TOP_P: f32 = 1.0;

/// Fixed seed for reproducible generations
const SEED: u32 = 42;

/// A fully assembled completion
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Response text, concatenated in arrival order
    pub text: String,
    /// Assembled tool calls, ordered by ascending stream index
    pub tool_calls: Vec<ToolCall>,
}

/// Streaming chat completion client
pub struct ChatClient {
    client: reqwest::Client,
    api_key: SecretString,
}

impl ChatClient {
    /// Create a new chat client
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Run one streamed completion over the given history
    ///
    /// The request always opens with a system message built fresh from
    /// `system_prompt`, followed by the full history. Resolves once the
    /// stream ends; a transport error mid-stream discards everything
    /// buffered so far.
    ///
    /// # Errors
    ///
    /// Returns `CompletionFailed` if the request or the stream fails.
    pub async fn complete(
        &self,
        history: &[Message],
        model: &str,
        system_prompt: &str,
    ) -> Result<Completion> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend(history.iter().cloned());

        let request = ChatRequest {
            model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            top_p: TOP_P,
            seed: SEED,
            stream: true,
        };

        let started = Instant::now();

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::CompletionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::CompletionFailed(format!("HTTP {status}: {body}")));
        }

        let mut accumulator = StreamAccumulator::default();
        let mut carry: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        'receive: while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| Error::CompletionFailed(e.to_string()))?;
            carry.extend_from_slice(&bytes);

            // Frames may split anywhere, so only complete lines are parsed
            while let Some(newline) = carry.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = carry.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let Some(data) = sse_data(line.trim_end()) else {
                    continue;
                };
                if data == "[DONE]" {
                    break 'receive;
                }
                match serde_json::from_str::<ChatChunk>(data) {
                    Ok(chunk) => accumulator.push(chunk),
                    Err(e) => tracing::trace!(error = %e, "skipping unparseable chunk"),
                }
            }
        }

        let completion = accumulator.finish();
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis(),
            text_len = completion.text.len(),
            tool_calls = completion.tool_calls.len(),
            "completion stream finished"
        );

        Ok(completion)
    }
}

/// Extract the payload of an SSE `data:` line
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    seed: u32,
    stream: bool,
}

/// One streamed increment of a completion
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    /// Candidate deltas; only the first is consumed
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice inside a streamed chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    /// The incremental payload
    #[serde(default)]
    pub delta: ChunkDelta,
}

/// Incremental payload: a content fragment and/or tool-call deltas
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    /// Content fragment to append to the response buffer
    #[serde(default)]
    pub content: Option<String>,
    /// Partial tool-call fragments, keyed by index
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Partial tool call keyed by its position in the final call list
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    /// Positional key; all deltas with the same index accrete into one call
    pub index: u32,
    /// Call id; populated by the first delta of a call
    #[serde(default)]
    pub id: Option<String>,
    /// Partial function name/arguments
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Partial function name and arguments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// In-progress tool call assembled from streamed deltas
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chunks into a [`Completion`]
///
/// Content fragments append in arrival order. Tool-call deltas accrete into
/// one buffer per index: the id is fixed by the first non-empty delta and
/// never overwritten, name and arguments are concatenations of every
/// fragment seen at that index.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    pending: BTreeMap<u32, PendingToolCall>,
}

impl StreamAccumulator {
    /// Merge one streamed chunk into the accumulator
    pub fn push(&mut self, chunk: ChatChunk) {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content {
            self.text.push_str(&content);
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let buffer = self.pending.entry(delta.index).or_default();
            if buffer.id.is_empty() {
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    buffer.id = id;
                }
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    buffer.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    buffer.arguments.push_str(&arguments);
                }
            }
        }
    }

    /// Finish the fold, yielding text plus calls by ascending index
    #[must_use]
    pub fn finish(self) -> Completion {
        let tool_calls = self
            .pending
            .into_values()
            .map(|pending| ToolCall {
                id: pending.id,
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: pending.name,
                    arguments: pending.arguments,
                },
            })
            .collect();

        Completion {
            text: self.text,
            tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_chunk(text: &str) -> ChatChunk {
        ChatChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(text.to_string()),
                    tool_calls: None,
                },
            }],
        }
    }

    fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ChatChunk {
        ChatChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: id.map(String::from),
                        function: Some(FunctionDelta {
                            name: name.map(String::from),
                            arguments: args.map(String::from),
                        }),
                    }]),
                },
            }],
        }
    }

    #[test]
    fn content_fragments_concatenate_in_arrival_order() {
        let mut acc = StreamAccumulator::default();
        acc.push(content_chunk("Hel"));
        acc.push(content_chunk("lo "));
        acc.push(content_chunk("there"));

        let completion = acc.finish();
        assert_eq!(completion.text, "Hello there");
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn tool_call_deltas_accrete_by_index() {
        let mut acc = StreamAccumulator::default();
        acc.push(tool_chunk(0, Some("call_abc"), Some("get_"), None));
        acc.push(tool_chunk(0, None, Some("weather"), None));
        acc.push(tool_chunk(0, None, None, Some("{\"c")));
        acc.push(tool_chunk(0, None, None, Some("ity\":\"NYC\"}")));

        let completion = acc.finish();
        assert_eq!(completion.tool_calls.len(), 1);

        let call = &completion.tool_calls[0];
        assert_eq!(call.id, "call_abc");
        assert_eq!(call.function.name, "get_weather");
        assert_eq!(call.function.arguments, "{\"city\":\"NYC\"}");
    }

    #[test]
    fn call_id_is_fixed_by_first_nonempty_delta() {
        let mut acc = StreamAccumulator::default();
        acc.push(tool_chunk(0, Some(""), Some("lookup"), None));
        acc.push(tool_chunk(0, Some("call_1"), None, None));
        acc.push(tool_chunk(0, Some("call_2"), None, None));

        let completion = acc.finish();
        assert_eq!(completion.tool_calls[0].id, "call_1");
    }

    #[test]
    fn calls_are_ordered_by_ascending_index() {
        let mut acc = StreamAccumulator::default();
        acc.push(tool_chunk(1, Some("b"), Some("second"), None));
        acc.push(tool_chunk(0, Some("a"), Some("first"), None));

        let completion = acc.finish();
        let names: Vec<&str> = completion
            .tool_calls
            .iter()
            .map(|c| c.function.name.as_str())
            .collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn empty_stream_is_a_valid_empty_completion() {
        let completion = StreamAccumulator::default().finish();
        assert!(completion.text.is_empty());
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn chunk_json_shape_parses() {
        let data = r#"{"choices":[{"delta":{"content":"hi","tool_calls":[{"index":0,"id":"c1","function":{"name":"f","arguments":"{}"}}]}}]}"#;
        let chunk: ChatChunk = serde_json::from_str(data).unwrap();
        let mut acc = StreamAccumulator::default();
        acc.push(chunk);

        let completion = acc.finish();
        assert_eq!(completion.text, "hi");
        assert_eq!(completion.tool_calls[0].id, "c1");
    }

    #[test]
    fn sse_data_strips_prefix() {
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("data:{\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data(""), None);
    }
}
