//! Approval policy port. Auto-allow is pure logic, already covered
//! by `turnloop_domain::approval`; this port adds the interactive,
//! I/O-bound half (`confirm`) plus serialization across concurrent tool
//! executions.

use std::collections::HashMap;

use async_trait::async_trait;

use turnloop_domain::approval::is_auto_allowed;

#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    /// The effective `server -> [tool_or_wildcard]` map, including the
    /// synthetic `"*"` global key, as currently configured.
    fn allowed_map(&self) -> HashMap<String, Vec<String>>;

    fn is_auto_allowed(&self, server: &str, tool: &str) -> bool {
        is_auto_allowed(server, tool, &self.allowed_map())
    }

    /// Ask the user to approve one call. Calls to this method across
    /// concurrent tool executions must be serialized so prompts never
    /// interleave; implementations typically hold a process-wide lock
    /// for the duration of one prompt. EOF or any I/O failure must be
    /// treated as a denial, never as a panic.
    async fn confirm(&self, server: &str, tool: &str, arguments: &serde_json::Value) -> bool;
}
