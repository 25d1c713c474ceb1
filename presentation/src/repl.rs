//! Interactive REPL, in the shape of `agent/repl.rs` and `chat/repl.rs`
//! (readline-error handling, history file under `dirs::data_dir()`,
//! slash-command dispatch), adapted from `rustyline` to `reedline` and
//! to one chat session instead of a multi-model panel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use turnloop_application::ports::llm_client::LlmClient;
use turnloop_application::ports::session_store::SessionStore;
use turnloop_application::{ApplicationError, ChatSession, TurnRequest};
use turnloop_domain::session::SessionDocument;

use crate::cli::OutputFormat;
use crate::render::{map_turn_error, RenderingSink};

/// A second Ctrl-C within this window of the first ends the session
/// instead of just cancelling the in-flight turn.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_millis(1500);

/// Drives a chat session from the terminal until the user exits,
/// persisting every committed turn to `store` and generating a title
/// once the first reply lands, the same as a one-shot run.
pub struct Repl {
    chat: ChatSession,
    format: OutputFormat,
    stream: bool,
    no_tools: bool,
    last_interrupt: Option<Instant>,
    store: Arc<dyn SessionStore>,
    doc: SessionDocument,
    small_model: Arc<dyn LlmClient>,
}

impl Repl {
    pub fn new(
        chat: ChatSession,
        format: OutputFormat,
        stream: bool,
        no_tools: bool,
        store: Arc<dyn SessionStore>,
        doc: SessionDocument,
        small_model: Arc<dyn LlmClient>,
    ) -> Self {
        Self { chat, format, stream, no_tools, last_interrupt: None, store, doc, small_model }
    }

    fn history_path() -> Option<std::path::PathBuf> {
        dirs::data_dir().map(|p| p.join("turnloop").join("history.txt"))
    }

    pub async fn run(mut self) -> Result<(), ApplicationError> {
        let history_path = Self::history_path();
        if let Some(path) = &history_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
        }

        let mut editor = match history_path.and_then(|p| FileBackedHistory::with_file(200, p).ok()) {
            Some(history) => Reedline::create().with_history(Box::new(history)),
            None => Reedline::create(),
        };
        let prompt = DefaultPrompt::new(DefaultPromptSegment::Basic("turnloop".into()), DefaultPromptSegment::Empty);

        println!("turnloop — interactive chat. /quit to exit, Ctrl-C cancels the current turn.");

        loop {
            match editor.read_line(&prompt) {
                Ok(Signal::Success(line)) => {
                    self.last_interrupt = None;
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "/quit" || line == "/exit" {
                        println!("Bye!");
                        break;
                    }
                    match self.run_turn(line).await {
                        Ok(()) => {}
                        Err(ApplicationError::Cancelled) => println!("{}", "(cancelled)".yellow()),
                        Err(other) => eprintln!("{}", format!("error: {other}").red()),
                    }
                }
                Ok(Signal::CtrlC) => {
                    let now = Instant::now();
                    let exits = self.last_interrupt.is_some_and(|prev| now.duration_since(prev) < DOUBLE_INTERRUPT_WINDOW);
                    if exits {
                        println!("\nBye!");
                        break;
                    }
                    self.last_interrupt = Some(now);
                    println!("{}", "^C (press again within 1.5s to exit)".yellow());
                }
                Ok(Signal::CtrlD) => {
                    println!("Bye!");
                    break;
                }
                Err(err) => {
                    eprintln!("{}", format!("error: {err}").red());
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run one turn, cancelling it if Ctrl-C arrives while it is
    /// in flight. On cancellation, records the interrupt time so a
    /// second Ctrl-C at the next idle prompt ends the session.
    async fn run_turn(&mut self, prompt: &str) -> Result<(), ApplicationError> {
        let cancel = CancellationToken::new();
        let watcher_cancel = cancel.clone();
        let watcher = tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            watcher_cancel.cancel();
        });

        let mut sink = RenderingSink::new(self.format, self.stream);
        let request = TurnRequest { prompt: prompt.to_string(), attachments: vec![], no_tools: self.no_tools };
        let result = self.chat.run_turn(request, &mut sink, cancel).await;
        watcher.abort();
        sink.finish();

        match result {
            Ok(outcome) => {
                self.chat.commit(&outcome, || chrono::Utc::now().to_rfc3339());
                if let Err(err) = self.store.append_messages(&mut self.doc, outcome.new_messages).await {
                    warn!("failed to persist session: {err}");
                }
                self.store.generate_title(&mut self.doc, self.small_model.as_ref()).await;
                Ok(())
            }
            Err(turn_err) => {
                let mapped = map_turn_error(turn_err);
                if matches!(mapped, ApplicationError::Cancelled) {
                    self.last_interrupt = Some(Instant::now());
                }
                Err(mapped)
            }
        }
    }
}
