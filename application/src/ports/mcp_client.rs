//! MCP client manager port. In the shape of `tool/provider.rs`'s
//! `ToolProvider` trait, reshaped around a server-keyed session model
//! with discovery and execution as the contract. The wire protocol
//! itself is out of scope — implementations delegate to an MCP
//! transport library.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use turnloop_domain::tool::ToolSpec;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("server '{0}' is disabled")]
    Disabled(String),
    #[error("failed to open transport for '{0}': {1}")]
    OpenFailed(String, String),
    #[error("operation on '{0}' timed out")]
    Timeout(String),
    #[error("tool '{0}' not found on server '{1}'")]
    ToolNotFound(String, String),
    #[error("call to '{0}' on '{1}' failed: {2}")]
    CallFailed(String, String, String),
}

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages one live session per configured MCP server plus the built-in
/// `shell`/`time` pseudo-servers.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Idempotent: open every non-disabled server's transport.
    async fn start(&self) -> Result<(), TransportError>;

    /// Tools currently known for one server.
    async fn list_tools(&self, server: &str) -> Result<Vec<ToolSpec>, TransportError>;

    /// Concurrent fan-out over every known server. A server whose
    /// discovery fails contributes an empty list rather than aborting
    /// the whole call.
    async fn list_tools_all(&self) -> HashMap<String, Vec<ToolSpec>>;

    /// Invoke one tool, returning its concatenated textual content.
    async fn call_tool(&self, server: &str, tool: &str, args: serde_json::Value) -> Result<String, TransportError>;

    /// Per-server `autoApprove` lists, keyed exactly as configured
    /// (including the synthetic `"*"` global key if present).
    fn auto_approve_map(&self) -> HashMap<String, Vec<String>>;

    /// Close every open session in reverse order of opening.
    async fn stop(&self) -> Result<(), TransportError>;
}
