//! Message history: roles, content, tool calls, and normalization.
//!
//! Grounded on `session/entities.rs`'s `Role`/`Message` pair, generalized
//! with a `Tool` role and `tool_calls`/`tool_call_id` so the chat-turn
//! orchestrator can express the LLM API's assistant-then-tool message
//! shape.

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_data_url(mime: &str, base64_data: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{mime};base64,{base64_data}"),
            },
        }
    }
}

/// The body of a message: either plain text or a list of multimodal parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Concatenate all visible text in this content, ignoring non-text parts.
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// A pending tool invocation attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    /// `<server>__<tool>`, as emitted by the model.
    pub name: String,
    /// JSON-encoded arguments, kept as a string for round-trip stability
    /// with the LLM API (see [`crate::tool::ToolCallRequest`]).
    pub arguments: String,
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: Some(Content::Parts(parts)),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.map(Content::Text),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRef>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.map(Content::Text),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(Content::as_text)
    }

    pub fn is_assistant_with_tool_calls(&self) -> bool {
        self.role == Role::Assistant
            && self
                .tool_calls
                .as_ref()
                .is_some_and(|calls| !calls.is_empty())
    }
}

/// Drop any `assistant` message carrying `tool_calls` whose id set is not
/// fully covered by the immediately-following `tool` messages, together
/// with whichever of those `tool` messages *are* present (they would be
/// orphaned otherwise). This is the defensive cleanup applied when
/// resuming a log that was truncated mid tool-round.
///
/// Idempotent: `normalize(normalize(h)) == normalize(h)`.
pub fn normalize(history: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(history.len());
    let mut i = 0;
    while i < history.len() {
        let msg = &history[i];
        if msg.is_assistant_with_tool_calls() {
            let ids: Vec<&str> = msg
                .tool_calls
                .as_ref()
                .unwrap()
                .iter()
                .map(|c| c.id.as_str())
                .collect();

            let mut j = i + 1;
            let mut seen = std::collections::HashSet::new();
            while j < history.len() && history[j].role == Role::Tool {
                if let Some(id) = history[j].tool_call_id.as_deref() {
                    if ids.contains(&id) {
                        seen.insert(id.to_string());
                    }
                }
                j += 1;
            }

            if ids.iter().all(|id| seen.contains(*id)) {
                out.push(msg.clone());
                out.extend_from_slice(&history[i + 1..j]);
            }
            // else: drop the assistant stub and its partial tool results entirely.
            i = j;
        } else {
            out.push(msg.clone());
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(ids: &[&str]) -> Message {
        Message::assistant_with_tool_calls(
            None,
            ids.iter()
                .map(|id| ToolCallRef {
                    id: id.to_string(),
                    name: "fs__read".into(),
                    arguments: "{}".into(),
                })
                .collect(),
        )
    }

    #[test]
    fn complete_round_survives_normalization() {
        let history = vec![
            Message::user("hello"),
            stub(&["1"]),
            Message::tool_result("1", "fs__read", "DATA"),
            Message::assistant(Some("done".into())),
        ];
        let normalized = normalize(&history);
        assert_eq!(normalized, history);
    }

    #[test]
    fn incomplete_round_is_dropped() {
        let history = vec![
            Message::user("hello"),
            stub(&["1", "2"]),
            Message::tool_result("1", "fs__read", "DATA"),
            // tool call "2" never resolved (log truncated here)
        ];
        let normalized = normalize(&history);
        assert_eq!(normalized, vec![Message::user("hello")]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let history = vec![
            Message::user("hello"),
            stub(&["1", "2"]),
            Message::tool_result("1", "fs__read", "DATA"),
        ];
        let once = normalize(&history);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn out_of_order_tool_results_still_cover_the_set() {
        let history = vec![
            stub(&["1", "2"]),
            Message::tool_result("2", "time__now", "2024-01-01T00:00:00Z"),
            Message::tool_result("1", "fs__read", "DATA"),
        ];
        let normalized = normalize(&history);
        assert_eq!(normalized, history);
    }

    #[test]
    fn content_as_text_joins_parts() {
        let content = Content::Parts(vec![
            ContentPart::text("hi "),
            ContentPart::image_data_url("image/png", "AAA"),
            ContentPart::text("there"),
        ]);
        assert_eq!(content.as_text(), "hi there");
    }
}
