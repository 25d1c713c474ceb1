//! Domain layer: pure entities and value objects for the chat-turn
//! orchestrator. No infrastructure dependency may appear here — see
//! `application` for ports and `infrastructure` for adapters.

pub mod approval;
pub mod config;
pub mod error;
pub mod mcp;
pub mod message;
pub mod session;
pub mod tool;
pub mod usage;

pub use config::{AgentConfig, AgentPrompt, Defaults, ProviderConfig, RootConfig};
pub use error::DomainError;
pub use mcp::{Credentials, ServerConfig, TransportKind};
pub use message::{Content, ContentPart, ImageUrl, Message, Role, ToolCallRef};
pub use session::{AgentRef, ProviderRef, SessionDocument};
pub use tool::{ToolCallRequest, ToolExecutionResult, ToolSpec};
pub use usage::{TokenUsage, Usage, UsageDelta};
