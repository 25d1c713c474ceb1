//! Ports: traits implemented by the infrastructure layer and consumed
//! by the use cases below.

pub mod approval_policy;
pub mod llm_client;
pub mod mcp_client;
pub mod progress_reporter;
pub mod session_store;

pub use approval_policy::ApprovalPolicy;
pub use llm_client::{Chunk, CompletionResponse, FinishReason, GatewayError, LlmClient, LlmStream, ModelCapabilities, RequestParams, StreamInfo};
pub use mcp_client::{McpClient, TransportError, DEFAULT_CALL_TIMEOUT};
pub use progress_reporter::{IoRegionGuard, NoProgress, ProgressReporter, TaskHandle};
pub use session_store::{SessionStore, SessionStoreError, SessionSummary};
