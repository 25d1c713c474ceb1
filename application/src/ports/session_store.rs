//! Session store port.

use async_trait::async_trait;
use thiserror::Error;

use turnloop_domain::message::Message;
use turnloop_domain::session::SessionDocument;

use super::llm_client::LlmClient;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Summary row for session listings, cheap to produce without loading
/// the full message history.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub updated_at: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, doc: &SessionDocument) -> Result<(), SessionStoreError>;

    async fn load(&self, id: &str) -> Result<SessionDocument, SessionStoreError>;

    /// Extend `doc`'s history and persist atomically (temp file + rename).
    async fn append_messages(&self, doc: &mut SessionDocument, new_messages: Vec<Message>) -> Result<(), SessionStoreError>;

    /// Lazily scan the store, most recently updated first.
    async fn list(&self) -> Result<Vec<SessionSummary>, SessionStoreError>;

    /// All-digits `ref` selects the Nth most recent (1-based); otherwise
    /// `ref` is matched as an id prefix.
    async fn resolve_session_ref(&self, reference: &str) -> Result<String, SessionStoreError>;

    /// Generate a title from the first user message via `small_model`,
    /// only if no title is set and at least one assistant reply exists.
    /// Failure to generate a title is swallowed (never blocks or fails
    /// the turn that triggered it).
    async fn generate_title(&self, doc: &mut SessionDocument, small_model: &dyn LlmClient);
}
