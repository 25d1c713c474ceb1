//! The persisted session document (see `SessionStore`, C6).

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::usage::Usage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRef {
    pub name: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_small: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_system: Option<String>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRef {
    pub name: String,
}

/// A persisted conversation. `id` is a timestamped, lexicographically
/// sortable identifier (ULID-shaped: millisecond timestamp prefix +
/// random suffix) so directory listings sort naturally without parsing
/// `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub agent: AgentRef,
    pub provider: ProviderRef,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_allowed_servers: Option<Vec<String>>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub usage: Usage,
}

impl SessionDocument {
    pub fn new(id: impl Into<String>, created_at: impl Into<String>, agent: AgentRef, provider: ProviderRef) -> Self {
        let created_at = created_at.into();
        Self {
            id: id.into(),
            updated_at: created_at.clone(),
            created_at,
            title: None,
            agent,
            provider,
            output: "text".into(),
            mcp_allowed_servers: None,
            messages: Vec::new(),
            usage: Usage::default(),
        }
    }

    /// Append new messages in order and bump `updated_at`.
    pub fn append_messages(&mut self, new_messages: Vec<Message>, now: impl Into<String>) {
        self.messages.extend(new_messages);
        self.updated_at = now.into();
    }

    pub fn has_assistant_reply(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == crate::message::Role::Assistant)
    }

    pub fn first_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == crate::message::Role::User)
            .and_then(|m| m.content.as_ref())
            .map(|c| c.as_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn doc() -> SessionDocument {
        SessionDocument::new(
            "01J00000000000000000000000",
            "2026-01-01T00:00:00Z",
            AgentRef {
                name: "default".into(),
                model: "gpt-4".into(),
                model_small: None,
                prompt_system: None,
                params: Default::default(),
            },
            ProviderRef { name: "openai".into() },
        )
    }

    #[test]
    fn append_bumps_updated_at() {
        let mut doc = doc();
        doc.append_messages(vec![Message::user("hi")], "2026-01-01T00:00:05Z");
        assert_eq!(doc.updated_at, "2026-01-01T00:00:05Z");
        assert_eq!(doc.messages.len(), 1);
    }

    #[test]
    fn no_assistant_reply_initially() {
        assert!(!doc().has_assistant_reply());
    }
}
