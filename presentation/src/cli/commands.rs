//! CLI argument definitions (boundary surface only). All resolution
//! (agent lookup, config merge, session ref resolution) happens past
//! this boundary, not here.

use clap::{Parser, ValueEnum};

/// How streamed assistant text is rendered to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
}

/// CLI arguments for `turnloop`.
#[derive(Parser, Debug)]
#[command(name = "turnloop")]
#[command(author, version, about = "An interactive and scriptable LLM chat client")]
#[command(long_about = r#"
turnloop sends prompts to a configured LLM agent, streaming its reply
and any tool calls it makes through the Model Context Protocol.

With a PROMPT argument it runs one turn and exits. With no PROMPT and
an interactive terminal it starts a REPL; with no PROMPT and piped
stdin it reads the entire input as the prompt.

Example:
  turnloop "What does this function do?"
  turnloop --agent reviewer --format markdown --session last
"#)]
pub struct Cli {
    /// Prompt to send. If omitted and stdin is not a terminal, all of
    /// stdin is read and used as the prompt.
    pub prompt: Option<String>,

    /// Named agent to use instead of the configured default.
    #[arg(long, value_name = "NAME")]
    pub agent: Option<String>,

    /// Output rendering format. Overrides the configured agent/global
    /// default when given.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Wait for the complete response instead of streaming it.
    #[arg(long)]
    pub no_stream: bool,

    /// Disable progress spinners.
    #[arg(long)]
    pub no_progress: bool,

    /// Resume (or create) a session: an id prefix, "last", or omitted
    /// for a fresh session.
    #[arg(long, value_name = "REF")]
    pub session: Option<String>,

    /// Run this turn with tool calling disabled.
    #[arg(long)]
    pub no_tools: bool,

    /// Verbosity (-v info, -vv debug, -vvv+ trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
