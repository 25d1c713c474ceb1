//! MCP server configuration value objects.
//!
//! A tagged `transport` variant replaces the untyped nested maps the
//! original configuration format used (see `DESIGN.md`, "dynamic config
//! maps").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Configuration for one MCP server, closed for the lifetime of a
/// session once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: Option<TransportKind>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub auto_approve: Vec<String>,
}

impl ServerConfig {
    /// Resolve the effective transport: explicit config wins, otherwise
    /// infer from which of `url`/`command` is present, and finally from
    /// a `/sse` path segment in the URL.
    pub fn effective_transport(&self) -> Option<TransportKind> {
        if let Some(kind) = self.transport {
            return Some(kind);
        }
        if let Some(url) = &self.url {
            if url.trim_end_matches('/').ends_with("/sse") {
                return Some(TransportKind::Sse);
            }
            return Some(TransportKind::Http);
        }
        if self.command.is_some() {
            return Some(TransportKind::Stdio);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_stdio_from_command() {
        let cfg = ServerConfig {
            transport: None,
            command: Some("npx".into()),
            args: vec![],
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            credentials: None,
            disabled: false,
            auto_approve: vec![],
        };
        assert_eq!(cfg.effective_transport(), Some(TransportKind::Stdio));
    }

    #[test]
    fn infers_sse_from_url_suffix() {
        let cfg = ServerConfig {
            transport: None,
            command: None,
            args: vec![],
            env: HashMap::new(),
            url: Some("https://example.com/mcp/sse".into()),
            headers: HashMap::new(),
            credentials: None,
            disabled: false,
            auto_approve: vec![],
        };
        assert_eq!(cfg.effective_transport(), Some(TransportKind::Sse));
    }

    #[test]
    fn infers_http_from_plain_url() {
        let cfg = ServerConfig {
            transport: None,
            command: None,
            args: vec![],
            env: HashMap::new(),
            url: Some("https://example.com/mcp".into()),
            headers: HashMap::new(),
            credentials: None,
            disabled: false,
            auto_approve: vec![],
        };
        assert_eq!(cfg.effective_transport(), Some(TransportKind::Http));
    }

    #[test]
    fn explicit_transport_wins_over_inference() {
        let cfg = ServerConfig {
            transport: Some(TransportKind::Sse),
            command: Some("npx".into()),
            args: vec![],
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            credentials: None,
            disabled: false,
            auto_approve: vec![],
        };
        assert_eq!(cfg.effective_transport(), Some(TransportKind::Sse));
    }
}
