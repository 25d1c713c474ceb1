//! CLI entrypoint for turnloop.
//!
//! Wires the four layers together with dependency injection: load and
//! validate config, resolve the effective agent/provider, stand up the
//! LLM client, MCP manager, approval policy, session store and progress
//! reporter, then hand a `ChatSession` to either the REPL or a single
//! one-shot turn.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use turnloop_application::ports::approval_policy::ApprovalPolicy;
use turnloop_application::ports::mcp_client::McpClient;
use turnloop_application::ports::progress_reporter::{NoProgress, ProgressReporter};
use turnloop_application::ports::session_store::SessionStore;
use turnloop_application::{ApplicationError, ChatSession, TurnRequest};
use turnloop_domain::config::{pick_effective_agent, AgentConfig, ProviderConfig};
use turnloop_domain::session::{AgentRef, ProviderRef, SessionDocument};
use turnloop_infrastructure::llm_client::from_provider;
use turnloop_infrastructure::mcp::McpManager;
use turnloop_infrastructure::{AutoApprovalPolicy, ConfigLoader, FileSessionStore, InteractiveApprovalPolicy, Severity};
use turnloop_presentation::{run_one_shot, Cli, IndicatifProgressReporter, OutputFormat, Repl};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    // Rolling daily log file under the same data directory as sessions
    // and REPL history; stderr stays human-readable, the file gets
    // everything for post-mortem debugging.
    let log_dir = dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join("turnloop").join("logs");
    let file_appender = tracing_appender::rolling::daily(&log_dir, "turnloop.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(file_writer.and(std::io::stderr))
        .init();
    info!("starting turnloop");

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), ApplicationError> {
    let config = ConfigLoader::new().load().map_err(|e| ApplicationError::Config(e.to_string()))?;
    for issue in ConfigLoader::validate(&config) {
        match issue.severity {
            Severity::Warning => warn!("{}", issue.message),
            Severity::Error => return Err(ApplicationError::Config(issue.message)),
        }
    }

    let agent: AgentConfig = pick_effective_agent(&config, cli.agent.as_deref())
        .ok_or_else(|| ApplicationError::Config("no agent resolved: set defaults.agent or pass --agent".into()))?
        .clone();
    let provider: ProviderConfig = config
        .providers
        .get(&agent.provider)
        .ok_or_else(|| {
            ApplicationError::Config(format!("agent '{}' references unknown provider '{}'", agent.name, agent.provider))
        })?
        .clone();

    let llm = from_provider(&provider);
    // Title generation reuses the main client: model selection happens
    // per-request via `RequestParams`, and there is no separate
    // small-model client construction path.
    let small_model = llm.clone();

    let mcp = Arc::new(McpManager::new(config.mcp_servers.clone()));
    mcp.start().await.map_err(|e| ApplicationError::Transport(e.to_string()))?;

    let allowed = merge_auto_approve(mcp.auto_approve_map(), &config.mcp_servers);
    let approval: Arc<dyn ApprovalPolicy> = if std::io::stdin().is_terminal() {
        Arc::new(InteractiveApprovalPolicy::new(allowed))
    } else {
        Arc::new(AutoApprovalPolicy::new(allowed))
    };

    let progress: Arc<dyn ProgressReporter> =
        if cli.no_progress { Arc::new(NoProgress) } else { Arc::new(IndicatifProgressReporter::new()) };

    let stream = !cli.no_stream && config.defaults.stream;
    let format = resolve_format(&cli, &config);
    let tool_choice_required = agent.tool_choice.as_deref() == Some("required");

    let base_params = agent.params.clone();

    let store = FileSessionStore::new(session_root());
    let mut doc = load_or_create_session(&cli, &store, &agent, &provider).await?;
    let seed = seeded_history(&agent, &doc);
    doc.messages = seed.clone();

    let chat = ChatSession::new(
        agent.model.clone(),
        serde_json::Value::Object(base_params),
        tool_choice_required,
        llm.clone(),
        mcp.clone(),
        approval,
        progress,
    );
    let mut chat = chat.resume(seed, doc.usage);

    let store = Arc::new(store);

    if let Some(prompt) = resolve_prompt(&cli)? {
        let request = TurnRequest { prompt, attachments: vec![], no_tools: cli.no_tools };
        let outcome = run_one_shot(&mut chat, request, format, stream).await?;
        chat.commit(&outcome, now);
        store
            .append_messages(&mut doc, outcome.new_messages)
            .await
            .map_err(|e| ApplicationError::Unexpected(e.into()))?;
        store.generate_title(&mut doc, small_model.as_ref()).await;
    } else {
        let repl = Repl::new(chat, format, stream, cli.no_tools, store, doc, small_model);
        repl.run().await?;
    }

    mcp.stop().await.map_err(|e| ApplicationError::Transport(e.to_string()))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn session_root() -> std::path::PathBuf {
    dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join("turnloop").join("sessions")
}

/// Union the MCP manager's per-server auto-approve rules (from
/// `mcp_servers.*.auto_approve`) with the same rules for the `shell`/
/// `time` built-ins, which have no `ServerConfig` entry to carry them.
fn merge_auto_approve(
    mut from_manager: HashMap<String, Vec<String>>,
    configured: &HashMap<String, turnloop_domain::ServerConfig>,
) -> HashMap<String, Vec<String>> {
    for (server, cfg) in configured {
        from_manager.entry(server.clone()).or_default().extend(cfg.auto_approve.clone());
    }
    from_manager
}

fn resolve_format(cli: &Cli, config: &turnloop_domain::RootConfig) -> OutputFormat {
    if let Some(format) = cli.format {
        return format;
    }
    match config.defaults.output.as_str() {
        "markdown" => OutputFormat::Markdown,
        _ => OutputFormat::Text,
    }
}

/// The prompt argument if given; otherwise the entire stdin if it is
/// not a terminal; otherwise `None`, meaning "start the REPL".
fn resolve_prompt(cli: &Cli) -> Result<Option<String>, ApplicationError> {
    if let Some(prompt) = &cli.prompt {
        return Ok(Some(prompt.clone()));
    }
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buf = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
        .map_err(|e| ApplicationError::Unexpected(e.into()))?;
    let buf = buf.trim().to_string();
    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}

async fn load_or_create_session(
    cli: &Cli,
    store: &FileSessionStore,
    agent: &AgentConfig,
    provider: &ProviderConfig,
) -> Result<SessionDocument, ApplicationError> {
    if let Some(reference) = &cli.session {
        let id = store
            .resolve_session_ref(reference)
            .await
            .map_err(|e| ApplicationError::Config(e.to_string()))?;
        return store.load(&id).await.map_err(|e| ApplicationError::Config(e.to_string()));
    }

    let created_at = now();
    let id = turnloop_infrastructure::generate_session_id(&chrono::Utc::now());
    let agent_ref = AgentRef {
        name: agent.name.clone(),
        model: agent.model.clone(),
        model_small: agent.model_small.clone(),
        prompt_system: agent.prompt.system.clone(),
        params: agent.params.clone(),
    };
    let doc = SessionDocument::new(id, created_at, agent_ref, ProviderRef { name: provider.name.clone() });
    store.create(&doc).await.map_err(|e| ApplicationError::Unexpected(anyhow::anyhow!(e.to_string())))?;
    Ok(doc)
}

/// A freshly created session has no history yet; seed it with the
/// agent's system prompt if one is configured. A resumed session
/// already carries its own history (including any system message) and
/// is returned unchanged.
fn seeded_history(agent: &AgentConfig, doc: &SessionDocument) -> Vec<turnloop_domain::message::Message> {
    if !doc.messages.is_empty() {
        return doc.messages.clone();
    }
    match &agent.prompt.system {
        Some(system) if !system.is_empty() => vec![turnloop_domain::message::Message::system(system.clone())],
        _ => Vec::new(),
    }
}
