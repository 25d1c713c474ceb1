//! LLM client port. Grounded on `ports/llm_gateway.rs`'s `LlmGateway`
//! contract, generalized from a request/response pair to a
//! streaming + tool-call-aware client per the design note on duck-typed
//! LLM chunks: this crate's [`Chunk`] is the tagged-variant replacement.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use turnloop_domain::message::ToolCallRef;
use turnloop_domain::usage::UsageDelta;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timeout")]
    Timeout,
    #[error("transport closed")]
    TransportClosed,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("other error: {0}")]
    Other(String),
}

/// One decoded unit of a streaming response.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Visible text delta.
    Text(String),
    /// Partial tool-call delta at the given index. `id`/`name` are only
    /// present on the delta that introduces the call; `arguments` is a
    /// fragment to be concatenated onto prior fragments at this index.
    ToolDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Usage(UsageDelta),
    /// Anything else (role markers, empty keep-alives, provider-specific
    /// metadata) — ignored by the orchestrator but still observed so a
    /// caller can log it.
    Other,
}

/// Why the stream ended, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other,
}

/// Observable state after a stream has fully drained.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub finish_reason: FinishReason,
    pub saw_tool_delta: bool,
}

/// A completed (non-streaming) response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRef>,
    pub usage: Option<UsageDelta>,
}

/// An in-flight stream. Implementations hand back chunks in arrival
/// order; the caller drives it to completion (or drops it to cancel)
/// then reads `finish` for the post-stream observables.
#[async_trait]
pub trait LlmStream: Send {
    /// Pull the next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Chunk>, GatewayError>;

    /// Observables valid only after `next_chunk` has returned `None`.
    fn finish(&self) -> StreamInfo;
}

/// Capability flags the orchestrator consults when assembling
/// multimodal user content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelCapabilities {
    pub vision: bool,
    pub pdf: bool,
}

/// Opaque request parameters; `model`/`messages`/`tools` are attached by
/// the orchestrator, the rest is carried through verbatim from the
/// agent's configured params.
pub type RequestParams = Value;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streaming completion.
    async fn stream(&self, params: RequestParams) -> Result<Box<dyn LlmStream>, GatewayError>;

    /// One-shot, non-streaming completion — used for the non-stream
    /// fallback when a stream signals tool intent without complete
    /// argument deltas.
    async fn complete(&self, params: RequestParams) -> Result<CompletionResponse, GatewayError>;

    /// Static capability query for a model name.
    fn capabilities(&self, model: &str) -> ModelCapabilities;
}
