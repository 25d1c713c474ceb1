//! Application layer: ports (traits implemented by infrastructure) and
//! the use cases built on top of them. Depends only on the domain layer.

pub mod errors;
pub mod ports;
pub mod use_cases;

pub use errors::ApplicationError;
pub use use_cases::{Attachment, ChatSession, NullSink, TurnError, TurnOutcome, TurnRequest, TurnSink};
