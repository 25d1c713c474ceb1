//! Infrastructure layer: concrete adapters implementing the ports
//! defined by the application layer — MCP discovery/execution, config
//! loading, session persistence, the LLM client, and interactive
//! approval.

pub mod approval;
pub mod config;
pub mod llm_client;
pub mod mcp;
pub mod session_store;

pub use approval::{AutoApprovalPolicy, InteractiveApprovalPolicy};
pub use config::{ConfigError, ConfigIssue, ConfigLoader, Severity};
pub use llm_client::OpenAiCompatibleClient;
pub use mcp::McpManager;
pub use session_store::{generate_session_id, FileSessionStore};
