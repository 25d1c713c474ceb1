//! Domain-level error types.

use thiserror::Error;

/// Errors raised by pure domain logic (history normalization, name
/// resolution, value construction). Infrastructure-specific failures
/// (transport, filesystem, HTTP) have their own error types in the
/// application and infrastructure layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid tool name '{0}': expected '<server>__<tool>' or a bare name")]
    InvalidToolName(String),

    #[error("invalid transport kind '{0}'")]
    InvalidTransport(String),

    #[error("session document is missing required field: {0}")]
    MissingField(&'static str),
}
