//! Use cases: the chat-turn orchestrator and its tool-adapter helper.

pub mod tool_adapter;
pub mod turn_orchestrator;

pub use turn_orchestrator::{Attachment, ChatSession, NullSink, TurnError, TurnOutcome, TurnRequest, TurnSink};
