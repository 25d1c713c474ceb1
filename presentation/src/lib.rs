//! Presentation layer for turnloop: CLI argument definitions, the
//! streaming renderer (line-buffered text and Markdown block
//! detection), progress reporting, and the interactive REPL.

pub mod cli;
pub mod markdown;
pub mod progress;
pub mod render;
pub mod repl;

pub use cli::{Cli, OutputFormat};
pub use markdown::MarkdownBuffer;
pub use progress::IndicatifProgressReporter;
pub use render::{map_turn_error, run_one_shot, RenderingSink};
pub use repl::Repl;
