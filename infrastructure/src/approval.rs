//! Interactive approval policy. In the shape of `agent/human_intervention.rs`'s
//! confirm-before-proceeding pattern, simplified from its TUI event loop
//! to a direct stdin/stdout prompt since this crate's REPL is a plain
//! terminal, not a ratatui app.

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use tokio::sync::Mutex;

use turnloop_application::ports::approval_policy::ApprovalPolicy;

/// Prompts on stdout and reads a yes/no answer from stdin. Concurrent
/// calls are serialized through `prompt_lock` so tool executions running
/// in parallel never interleave their prompts.
pub struct InteractiveApprovalPolicy {
    allowed: HashMap<String, Vec<String>>,
    prompt_lock: Mutex<()>,
}

impl InteractiveApprovalPolicy {
    pub fn new(allowed: HashMap<String, Vec<String>>) -> Self {
        Self {
            allowed,
            prompt_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ApprovalPolicy for InteractiveApprovalPolicy {
    fn allowed_map(&self) -> HashMap<String, Vec<String>> {
        self.allowed.clone()
    }

    async fn confirm(&self, server: &str, tool: &str, arguments: &serde_json::Value) -> bool {
        let _guard = self.prompt_lock.lock().await;
        let server = server.to_string();
        let tool = tool.to_string();
        let arguments = arguments.clone();

        tokio::task::spawn_blocking(move || prompt_stdin(&server, &tool, &arguments))
            .await
            .unwrap_or(false)
    }
}

fn prompt_stdin(server: &str, tool: &str, arguments: &serde_json::Value) -> bool {
    print!("Allow {server}__{tool}({arguments})? [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match std::io::stdin().read_line(&mut answer) {
        Ok(0) => false, // EOF: deny
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Approves every call without prompting, for `--no-progress`-free
/// scripted/non-interactive invocations where the global wildcard is
/// already configured.
pub struct AutoApprovalPolicy {
    allowed: HashMap<String, Vec<String>>,
}

impl AutoApprovalPolicy {
    pub fn new(allowed: HashMap<String, Vec<String>>) -> Self {
        Self { allowed }
    }
}

#[async_trait]
impl ApprovalPolicy for AutoApprovalPolicy {
    fn allowed_map(&self) -> HashMap<String, Vec<String>> {
        self.allowed.clone()
    }

    async fn confirm(&self, _server: &str, _tool: &str, _arguments: &serde_json::Value) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_approval_policy_denies_anything_not_in_allow_list() {
        let policy = AutoApprovalPolicy::new(HashMap::new());
        assert!(!policy.confirm("fs", "write", &serde_json::json!({})).await);
    }

    #[tokio::test]
    async fn allowed_map_is_returned_verbatim() {
        let mut allowed = HashMap::new();
        allowed.insert("fs".to_string(), vec!["read".to_string()]);
        let policy = InteractiveApprovalPolicy::new(allowed.clone());
        assert_eq!(policy.allowed_map(), allowed);
    }

    #[test]
    fn is_auto_allowed_delegates_to_domain_predicate() {
        let mut allowed = HashMap::new();
        allowed.insert("fs".to_string(), vec!["read".to_string()]);
        let policy = InteractiveApprovalPolicy::new(allowed);
        assert!(policy.is_auto_allowed("fs", "read"));
        assert!(!policy.is_auto_allowed("fs", "write"));
    }
}
