//! MCP client manager, implementing the `McpClient` port with the
//! `rmcp` crate for the stdio/http/sse wire protocol plus the
//! `shell`/`time` built-in pseudo-servers.
//!
//! Grounded on `tool/provider.rs`'s provider-discovery shape and the
//! `rmcp`-based connection managers found across several reference
//! crates (`ServiceExt::serve`, `TokioChildProcess`, `list_tools`/
//! `call_tool`), built fresh since nothing upstream wired real MCP
//! support end to end.

mod builtin;

use std::collections::HashMap;
use std::process::Stdio as StdStdio;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::{
    StreamableHttpClientTransport, StreamableHttpClientTransportConfig,
};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use turnloop_application::ports::mcp_client::{McpClient, TransportError, DEFAULT_CALL_TIMEOUT};
use turnloop_domain::mcp::{ServerConfig, TransportKind};
use turnloop_domain::tool::ToolSpec;

use builtin::{shell, time};

/// One live session to a non-builtin MCP server.
struct Session {
    service: RunningService<RoleClient, ()>,
}

/// The built-in pseudo-servers never open a real transport; their
/// schemas and execution live entirely in `builtin`.
const BUILTIN_SERVERS: &[&str] = &["shell", "time"];

pub struct McpManager {
    configs: HashMap<String, ServerConfig>,
    sessions: RwLock<HashMap<String, Session>>,
    /// Insertion order, so `stop()` can close in reverse.
    opened_order: RwLock<Vec<String>>,
}

impl McpManager {
    pub fn new(configs: HashMap<String, ServerConfig>) -> Self {
        Self {
            configs,
            sessions: RwLock::new(HashMap::new()),
            opened_order: RwLock::new(Vec::new()),
        }
    }

    async fn open_one(&self, name: &str, config: &ServerConfig) -> Result<(), TransportError> {
        if config.disabled {
            return Err(TransportError::Disabled(name.to_string()));
        }

        let service = match config.effective_transport() {
            Some(TransportKind::Stdio) => self.open_stdio(name, config).await?,
            Some(TransportKind::Http) => match self.open_http(name, config).await {
                Ok(service) => service,
                Err(TransportError::OpenFailed(_, msg)) if is_sse_fallback_status(&msg) => {
                    debug!("http transport for '{name}' rejected ({msg}), retrying over sse");
                    self.open_sse(name, config).await?
                }
                Err(e) => return Err(e),
            },
            Some(TransportKind::Sse) => self.open_sse(name, config).await?,
            None => {
                return Err(TransportError::OpenFailed(
                    name.to_string(),
                    "no transport could be inferred (need `command` or `url`)".into(),
                ))
            }
        };

        self.sessions.write().await.insert(name.to_string(), Session { service });
        self.opened_order.write().await.push(name.to_string());
        Ok(())
    }

    async fn open_stdio(&self, name: &str, config: &ServerConfig) -> Result<RunningService<RoleClient, ()>, TransportError> {
        let program = config
            .command
            .as_deref()
            .ok_or_else(|| TransportError::OpenFailed(name.to_string(), "missing `command`".into()))?;

        let mut command = Command::new(program);
        command.args(&config.args);
        for (key, value) in &config.env {
            command.env(key, value);
        }
        command.stderr(StdStdio::piped());

        // Ensure the child is killed if this process dies unexpectedly,
        // rather than being orphaned under init.
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                command.pre_exec(|| {
                    libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                    Ok(())
                });
            }
        }

        let transport = TokioChildProcess::new(command)
            .map_err(|e| TransportError::OpenFailed(name.to_string(), e.to_string()))?;

        ().serve(transport)
            .await
            .map_err(|e| TransportError::OpenFailed(name.to_string(), e.to_string()))
    }

    async fn open_http(&self, name: &str, config: &ServerConfig) -> Result<RunningService<RoleClient, ()>, TransportError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| TransportError::OpenFailed(name.to_string(), "missing `url`".into()))?;

        let transport_config = StreamableHttpClientTransportConfig::with_uri(url.to_string());
        let transport = StreamableHttpClientTransport::from_config(transport_config);

        ().serve(transport)
            .await
            .map_err(|e| TransportError::OpenFailed(name.to_string(), e.to_string()))
    }

    async fn open_sse(&self, name: &str, config: &ServerConfig) -> Result<RunningService<RoleClient, ()>, TransportError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| TransportError::OpenFailed(name.to_string(), "missing `url`".into()))?;

        let transport = rmcp::transport::SseTransport::start(url)
            .await
            .map_err(|e| TransportError::OpenFailed(name.to_string(), e.to_string()))?;

        ().serve(transport)
            .await
            .map_err(|e| TransportError::OpenFailed(name.to_string(), e.to_string()))
    }
}

/// True when an `open_http` failure message carries one of the status
/// codes a server returns for "this endpoint doesn't speak streamable
/// HTTP" (400 Bad Request, 404 Not Found, 405 Method Not Allowed) —
/// those, and only those, are worth one SSE retry before giving up.
fn is_sse_fallback_status(message: &str) -> bool {
    const CODES: [&str; 3] = ["400", "404", "405"];
    let bytes = message.as_bytes();
    CODES.iter().any(|code| {
        message.match_indices(code).any(|(idx, _)| {
            let before_ok = idx == 0 || !bytes[idx - 1].is_ascii_digit();
            let after = idx + code.len();
            let after_ok = after >= bytes.len() || !bytes[after].is_ascii_digit();
            before_ok && after_ok
        })
    })
}

#[async_trait]
impl McpClient for McpManager {
    async fn start(&self) -> Result<(), TransportError> {
        for (name, config) in &self.configs {
            if self.sessions.read().await.contains_key(name) {
                continue;
            }
            if let Err(e) = self.open_one(name, config).await {
                warn!("MCP server '{name}' failed to start: {e}");
            }
        }
        Ok(())
    }

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolSpec>, TransportError> {
        if server == shell::NAME {
            return Ok(shell::tool_specs());
        }
        if server == time::NAME {
            return Ok(time::tool_specs());
        }

        let sessions = self.sessions.read().await;
        let session = sessions
            .get(server)
            .ok_or_else(|| TransportError::OpenFailed(server.to_string(), "not started".into()))?;

        let result = tokio::time::timeout(DEFAULT_CALL_TIMEOUT, session.service.list_tools(None))
            .await
            .map_err(|_| TransportError::Timeout(server.to_string()))?
            .map_err(|e| TransportError::OpenFailed(server.to_string(), e.to_string()))?;

        Ok(result
            .tools
            .into_iter()
            .map(|t| {
                ToolSpec::new(
                    server,
                    &t.name,
                    t.description.as_deref().unwrap_or_default(),
                    Some(serde_json::to_value(&t.input_schema).unwrap_or_default()),
                )
            })
            .collect())
    }

    async fn list_tools_all(&self) -> HashMap<String, Vec<ToolSpec>> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.extend(BUILTIN_SERVERS.iter().map(|s| s.to_string()));

        let results = futures::future::join_all(names.iter().map(|name| async move {
            match self.list_tools(name).await {
                Ok(specs) => (name.clone(), specs),
                Err(e) => {
                    debug!("discovery on '{name}' failed, contributing empty list: {e}");
                    (name.clone(), Vec::new())
                }
            }
        }))
        .await;

        results.into_iter().collect()
    }

    async fn call_tool(&self, server: &str, tool: &str, args: serde_json::Value) -> Result<String, TransportError> {
        if server == shell::NAME {
            return shell::call(tool, &args).map_err(|e| TransportError::CallFailed(server.into(), tool.into(), e));
        }
        if server == time::NAME {
            return time::call(tool).map_err(|e| TransportError::CallFailed(server.into(), tool.into(), e));
        }

        let sessions = self.sessions.read().await;
        let session = sessions
            .get(server)
            .ok_or_else(|| TransportError::OpenFailed(server.to_string(), "not started".into()))?;

        let arguments = args.as_object().cloned();
        let params = CallToolRequestParam {
            name: tool.to_string().into(),
            arguments,
        };

        let result = tokio::time::timeout(DEFAULT_CALL_TIMEOUT, session.service.call_tool(params))
            .await
            .map_err(|_| TransportError::Timeout(server.to_string()))?
            .map_err(|e| TransportError::CallFailed(server.to_string(), tool.to_string(), e.to_string()))?;

        let text = result
            .content
            .into_iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(TransportError::CallFailed(server.to_string(), tool.to_string(), text));
        }
        Ok(text)
    }

    fn auto_approve_map(&self) -> HashMap<String, Vec<String>> {
        self.configs
            .iter()
            .map(|(name, config)| (name.clone(), config.auto_approve.clone()))
            .collect()
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let order = self.opened_order.write().await.drain(..).collect::<Vec<_>>();
        let mut sessions = self.sessions.write().await;
        for name in order.into_iter().rev() {
            if let Some(session) = sessions.remove(&name) {
                if let Err(e) = session.service.cancel().await {
                    warn!("error stopping MCP server '{name}': {e}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_fallback_status_matches_only_whole_codes() {
        assert!(is_sse_fallback_status("HTTP error: 404 Not Found"));
        assert!(is_sse_fallback_status("status code 400"));
        assert!(is_sse_fallback_status("405 Method Not Allowed"));
        assert!(!is_sse_fallback_status("connection reset by peer"));
        assert!(!is_sse_fallback_status("HTTP error: 5404 Not Found"));
        assert!(!is_sse_fallback_status("HTTP error: 500 Internal Server Error"));
    }

    #[tokio::test]
    async fn auto_approve_map_mirrors_configured_servers() {
        let mut configs = HashMap::new();
        configs.insert(
            "fs".to_string(),
            ServerConfig {
                transport: Some(TransportKind::Stdio),
                command: Some("true".into()),
                args: vec![],
                env: HashMap::new(),
                url: None,
                headers: HashMap::new(),
                credentials: None,
                disabled: false,
                auto_approve: vec!["read".into()],
            },
        );
        let manager = McpManager::new(configs);
        let map = manager.auto_approve_map();
        assert_eq!(map.get("fs").unwrap(), &vec!["read".to_string()]);
    }

    #[tokio::test]
    async fn builtin_servers_list_tools_without_a_session() {
        let manager = McpManager::new(HashMap::new());
        let tools = manager.list_tools("shell").await.unwrap();
        assert!(tools.iter().any(|t| t.name == "shell__execute"));

        let tools = manager.list_tools("time").await.unwrap();
        assert!(tools.iter().any(|t| t.name == "time__now"));
    }

    #[tokio::test]
    async fn disabled_server_fails_to_open() {
        let mut configs = HashMap::new();
        configs.insert(
            "fs".to_string(),
            ServerConfig {
                transport: Some(TransportKind::Stdio),
                command: Some("true".into()),
                args: vec![],
                env: HashMap::new(),
                url: None,
                headers: HashMap::new(),
                credentials: None,
                disabled: true,
                auto_approve: vec![],
            },
        );
        let manager = McpManager::new(configs.clone());
        let err = manager.open_one("fs", configs.get("fs").unwrap()).await.unwrap_err();
        assert!(matches!(err, TransportError::Disabled(_)));
    }
}
