//! Application-level error kinds and their exit-code mapping. The CLI
//! boundary matches on these variants to pick a process exit code; the
//! core never calls `std::process::exit` itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("tool approval denied for '{0}' while tools are required")]
    ToolApprovalDenied(String),

    #[error("operation timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Unexpected(#[from] anyhow::Error),
}

impl ApplicationError {
    /// Exit code the CLI boundary should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ApplicationError::Config(_) => 2,
            ApplicationError::ToolApprovalDenied(_) => 4,
            ApplicationError::Timeout => 124,
            ApplicationError::Cancelled => 130,
            ApplicationError::Transport(_) | ApplicationError::Unexpected(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_contract() {
        assert_eq!(ApplicationError::Config("x".into()).exit_code(), 2);
        assert_eq!(ApplicationError::ToolApprovalDenied("fs__write".into()).exit_code(), 4);
        assert_eq!(ApplicationError::Timeout.exit_code(), 124);
        assert_eq!(ApplicationError::Cancelled.exit_code(), 130);
        assert_eq!(ApplicationError::Transport("x".into()).exit_code(), 1);
    }
}
