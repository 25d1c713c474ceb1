//! Turn runner: drives one `ChatSession::run_turn` call, rendering
//! streamed text through the format-appropriate sink and mapping the
//! outcome onto the process's exit-code contract.

use std::io::Write;

use tokio_util::sync::CancellationToken;

use turnloop_application::{ApplicationError, ChatSession, TurnError, TurnOutcome, TurnRequest, TurnSink};

use crate::cli::OutputFormat;
use crate::markdown::MarkdownBuffer;

/// Renders streamed text as it arrives: line-buffered in `Text` mode
/// (so a terminal repaint never lands mid-line), or through the
/// `MarkdownBuffer` block detector in `Markdown` mode. With `stream`
/// false (`--no-stream`), nothing is printed until `finish()` — the
/// wire call underneath is unaffected, only the repaint cadence is.
pub struct RenderingSink {
    format: OutputFormat,
    stream: bool,
    raw: String,
    line_buf: String,
    markdown: MarkdownBuffer,
}

impl RenderingSink {
    pub fn new(format: OutputFormat, stream: bool) -> Self {
        Self { format, stream, raw: String::new(), line_buf: String::new(), markdown: MarkdownBuffer::new() }
    }

    /// Print whatever remains buffered plus a trailing newline. Call
    /// once the turn (streaming or not) has finished.
    pub fn finish(mut self) {
        if !self.stream {
            match self.format {
                OutputFormat::Text => print!("{}", self.raw),
                OutputFormat::Markdown => {
                    let mut markdown = MarkdownBuffer::new();
                    for block in markdown.push(&self.raw) {
                        print!("{block}");
                    }
                    if let Some(rest) = markdown.flush() {
                        print!("{rest}");
                    }
                }
            }
            println!();
            let _ = std::io::stdout().flush();
            return;
        }

        match self.format {
            OutputFormat::Text => {
                if !self.line_buf.is_empty() {
                    print!("{}", self.line_buf);
                }
            }
            OutputFormat::Markdown => {
                if let Some(rest) = self.markdown.flush() {
                    print!("{rest}");
                }
            }
        }
        println!();
        let _ = std::io::stdout().flush();
    }
}

impl TurnSink for RenderingSink {
    fn on_text(&mut self, text: &str) {
        if !self.stream {
            self.raw.push_str(text);
            return;
        }

        match self.format {
            OutputFormat::Text => {
                self.line_buf.push_str(text);
                while let Some(idx) = self.line_buf.find('\n') {
                    let line: String = self.line_buf.drain(..=idx).collect();
                    print!("{line}");
                }
            }
            OutputFormat::Markdown => {
                for block in self.markdown.push(text) {
                    print!("{block}");
                }
            }
        }
        let _ = std::io::stdout().flush();
    }
}

/// Map a turn failure onto the process exit-code contract: approval
/// denials and cancellation keep their distinct codes, stream/gateway
/// failures collapse to the generic transport failure.
pub fn map_turn_error(err: TurnError) -> ApplicationError {
    match err {
        TurnError::ApprovalDenied(name) => ApplicationError::ToolApprovalDenied(name),
        TurnError::Cancelled => ApplicationError::Cancelled,
        TurnError::Gateway(e) => ApplicationError::Transport(e.to_string()),
        TurnError::Transport(e) => ApplicationError::Transport(e.to_string()),
    }
}

/// Run one turn to completion, cancelling it on Ctrl-C. For one-shot
/// invocations; the REPL drives `run_turn` itself so it can tell a
/// turn-only cancellation from one that should end the session.
pub async fn run_one_shot(
    chat: &mut ChatSession,
    request: TurnRequest,
    format: OutputFormat,
    stream: bool,
) -> Result<TurnOutcome, ApplicationError> {
    let cancel = CancellationToken::new();
    let watcher_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        watcher_cancel.cancel();
    });

    let mut sink = RenderingSink::new(format, stream);
    let result = chat.run_turn(request, &mut sink, cancel).await;
    watcher.abort();
    sink.finish();

    result.map_err(map_turn_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_survives_partial_lines_and_empty_finish() {
        let mut sink = RenderingSink::new(OutputFormat::Text, true);
        sink.on_text("partial");
        sink.on_text(" line\nsecond");
        sink.finish();

        RenderingSink::new(OutputFormat::Markdown, true).finish();
    }

    #[test]
    fn no_stream_mode_buffers_everything_until_finish() {
        let mut sink = RenderingSink::new(OutputFormat::Text, false);
        sink.on_text("first chunk ");
        sink.on_text("second chunk");
        sink.finish();
    }

    #[test]
    fn turn_errors_map_to_the_documented_exit_codes() {
        assert_eq!(map_turn_error(TurnError::ApprovalDenied("fs__write".into())).exit_code(), 4);
        assert_eq!(map_turn_error(TurnError::Cancelled).exit_code(), 130);
    }
}
