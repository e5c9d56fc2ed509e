//! Conversation messages and append-only history

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Synthesized instruction message, never stored in history
    System,
    /// Transcribed user speech
    User,
    /// Model reply
    Assistant,
    /// Tool execution result
    Tool,
}

/// A function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, echoed back in the matching tool result message
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function to invoke
    pub function: FunctionCall,
}

/// Function name and raw JSON arguments of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON string, exactly as streamed by the model
    pub arguments: String,
}

/// One conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool invocations attached to an assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `Role::Tool` messages: the id of the call this result answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Build a system message
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    /// Build a user message
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    /// Build an assistant message
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Build a tool result message answering the given call id
    #[must_use]
    pub fn tool(call_id: &str, content: &str) -> Self {
        Self {
            role: Role::Tool,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }

    fn plain(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Append-only conversation history
///
/// Every append replaces the backing sequence with a copy extended by one
/// message; a snapshot handed out earlier is never mutated underneath its
/// reader. Messages are never edited or removed for the lifetime of the
/// session.
#[derive(Debug, Default)]
pub struct History {
    messages: RwLock<Arc<Vec<Message>>>,
}

impl History {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable snapshot of the messages appended so far
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.messages.read().unwrap())
    }

    /// Append one message
    pub fn push(&self, message: Message) {
        let mut guard = self.messages.write().unwrap();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(message);
        *guard = Arc::new(next);
    }

    /// Number of messages appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// Whether no message has been appended yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_extends_without_touching_prior_snapshots() {
        let history = History::new();
        history.push(Message::user("turn the lights on"));

        let snapshot = history.snapshot();
        history.push(Message::assistant("done"));

        // The earlier snapshot still sees exactly one message
        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len(), 2);

        // And the new snapshot is a prefix extension of the old one
        let latest = history.snapshot();
        assert_eq!(latest[..1], snapshot[..]);
    }

    #[test]
    fn tool_message_carries_call_id() {
        let msg = Message::tool("call_0", "72 degrees");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_0"));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains(r#""role":"user""#));
        assert!(!json.contains("tool_calls"));
    }
}
