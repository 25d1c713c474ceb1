//! File-based session persistence. In the shape of
//! `logging/jsonl_logger.rs`'s create-parent-dirs-then-write pattern,
//! generalized to one JSON document per session with an atomic
//! temp-file-then-rename write instead of JSONL appends, under a
//! `sessions/<YYYY>/<MM>/<id>.json` layout.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::warn;

use turnloop_application::ports::llm_client::{LlmClient, RequestParams};
use turnloop_application::ports::session_store::{SessionStore, SessionStoreError, SessionSummary};
use turnloop_domain::message::Message;
use turnloop_domain::session::SessionDocument;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A timestamp-prefixed, lexicographically sortable session id. Not a
/// true ULID (no cryptographic randomness), just unique enough within
/// one process: millisecond timestamp + a monotonic counter suffix.
pub fn generate_session_id(now: &chrono::DateTime<chrono::Utc>) -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{:06x}", now.format("%Y%m%dT%H%M%S%3f"), counter)
}

pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, created_at: &chrono::DateTime<chrono::Utc>, id: &str) -> PathBuf {
        self.root
            .join(created_at.format("%Y").to_string())
            .join(created_at.format("%m").to_string())
            .join(format!("{id}.json"))
    }

    /// Session documents don't record their own file path, so resolving
    /// an id back to a path means scanning the tree. Cheap in practice —
    /// session counts are small and this only runs on load/append.
    fn find_path(&self, id: &str) -> Result<PathBuf, SessionStoreError> {
        for path in self.all_session_files()? {
            if path.file_stem().and_then(|s| s.to_str()) == Some(id) {
                return Ok(path);
            }
        }
        Err(SessionStoreError::NotFound(id.to_string()))
    }

    fn all_session_files(&self) -> Result<Vec<PathBuf>, SessionStoreError> {
        let pattern = self.root.join("*").join("*").join("*.json");
        let pattern = pattern.to_string_lossy().to_string();
        glob::glob(&pattern)
            .map_err(|e| SessionStoreError::Io(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(Ok)
            .collect()
    }

    fn write_atomic(&self, path: &Path, doc: &SessionDocument) -> Result<(), SessionStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionStoreError::Io(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(doc).map_err(|e| SessionStoreError::Serde(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| SessionStoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|e| SessionStoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, doc: &SessionDocument) -> Result<(), SessionStoreError> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&doc.created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());
        let path = self.path_for(&created_at, &doc.id);
        self.write_atomic(&path, doc)
    }

    async fn load(&self, id: &str) -> Result<SessionDocument, SessionStoreError> {
        let path = self.find_path(id)?;
        let bytes = std::fs::read(&path).map_err(|e| SessionStoreError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| SessionStoreError::Serde(e.to_string()))
    }

    async fn append_messages(&self, doc: &mut SessionDocument, new_messages: Vec<Message>) -> Result<(), SessionStoreError> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        doc.append_messages(new_messages, now);

        let created_at = chrono::DateTime::parse_from_rfc3339(&doc.created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());
        let path = self.path_for(&created_at, &doc.id);
        self.write_atomic(&path, doc)
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let mut summaries = Vec::new();
        for path in self.all_session_files()? {
            let Ok(bytes) = std::fs::read(&path) else { continue };
            let Ok(doc) = serde_json::from_slice::<SessionDocument>(&bytes) else { continue };
            summaries.push(SessionSummary {
                id: doc.id,
                updated_at: doc.updated_at,
                title: doc.title,
            });
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn resolve_session_ref(&self, reference: &str) -> Result<String, SessionStoreError> {
        if !reference.is_empty() && reference.chars().all(|c| c.is_ascii_digit()) {
            let n: usize = reference.parse().unwrap_or(1);
            let summaries = self.list().await?;
            return summaries
                .into_iter()
                .nth(n.saturating_sub(1))
                .map(|s| s.id)
                .ok_or_else(|| SessionStoreError::NotFound(reference.to_string()));
        }

        let summaries = self.list().await?;
        summaries
            .into_iter()
            .find(|s| s.id.starts_with(reference))
            .map(|s| s.id)
            .ok_or_else(|| SessionStoreError::NotFound(reference.to_string()))
    }

    async fn generate_title(&self, doc: &mut SessionDocument, small_model: &dyn LlmClient) {
        if doc.title.is_some() || !doc.has_assistant_reply() {
            return;
        }
        let Some(first_user) = doc.first_user_message() else { return };

        let params: RequestParams = serde_json::json!({
            "messages": [
                {"role": "system", "content": "Summarize the following user request as a short title (max 8 words). Respond with only the title."},
                {"role": "user", "content": first_user},
            ],
        });

        match small_model.complete(params).await {
            Ok(response) => {
                if let Some(text) = response.text {
                    let title = text.trim().trim_matches('"').to_string();
                    if !title.is_empty() {
                        doc.title = Some(title);
                    }
                }
            }
            Err(e) => warn!("title generation failed, leaving session untitled: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use turnloop_application::ports::llm_client::{CompletionResponse, GatewayError, LlmStream, ModelCapabilities};
    use turnloop_domain::session::{AgentRef, ProviderRef};

    struct StubSmallModel {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmClient for StubSmallModel {
        async fn stream(&self, _: RequestParams) -> Result<Box<dyn LlmStream>, GatewayError> {
            unimplemented!()
        }
        async fn complete(&self, _: RequestParams) -> Result<CompletionResponse, GatewayError> {
            Ok(CompletionResponse {
                text: Some(self.reply.to_string()),
                tool_calls: vec![],
                usage: None,
            })
        }
        fn capabilities(&self, _model: &str) -> ModelCapabilities {
            ModelCapabilities::default()
        }
    }

    fn doc() -> SessionDocument {
        let mut d = SessionDocument::new(
            generate_session_id(&chrono::Utc::now()),
            "2026-01-01T00:00:00Z",
            AgentRef {
                name: "default".into(),
                model: "gpt-4o".into(),
                model_small: None,
                prompt_system: None,
                params: Default::default(),
            },
            ProviderRef { name: "openai".into() },
        );
        d.messages.push(Message::user("how do I use grep?"));
        d.messages.push(Message::assistant(Some("use `grep -r`".into())));
        d
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let document = doc();
        store.create(&document).await.unwrap();

        let loaded = store.load(&document.id).await.unwrap();
        assert_eq!(loaded.id, document.id);
        assert_eq!(loaded.messages.len(), 2);
    }

    #[tokio::test]
    async fn append_messages_persists_and_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut document = doc();
        store.create(&document).await.unwrap();
        let before = document.updated_at.clone();

        store
            .append_messages(&mut document, vec![Message::user("more")])
            .await
            .unwrap();

        assert_ne!(document.updated_at, before);
        let loaded = store.load(&document.id).await.unwrap();
        assert_eq!(loaded.messages.len(), 3);
    }

    #[tokio::test]
    async fn resolve_by_numeric_ref_picks_nth_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut first = doc();
        first.updated_at = "2026-01-01T00:00:00Z".into();
        let mut second = doc();
        second.id = format!("{}-b", first.id);
        second.updated_at = "2026-01-02T00:00:00Z".into();
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        let resolved = store.resolve_session_ref("1").await.unwrap();
        assert_eq!(resolved, second.id);
    }

    #[tokio::test]
    async fn resolve_by_prefix_matches_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let document = doc();
        store.create(&document).await.unwrap();

        let prefix = &document.id[..8];
        let resolved = store.resolve_session_ref(prefix).await.unwrap();
        assert_eq!(resolved, document.id);
    }

    #[tokio::test]
    async fn generate_title_sets_title_from_first_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut document = doc();
        let model = StubSmallModel { reply: "\"Grep usage\"" };
        store.generate_title(&mut document, &model).await;
        assert_eq!(document.title.as_deref(), Some("Grep usage"));
    }

    #[tokio::test]
    async fn generate_title_is_skipped_when_already_titled() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut document = doc();
        document.title = Some("Existing".into());
        let model = StubSmallModel { reply: "New title" };
        store.generate_title(&mut document, &model).await;
        assert_eq!(document.title.as_deref(), Some("Existing"));
    }
}
