//! Built-in `shell` and `time` pseudo-servers. These never open a real
//! MCP transport — their tool specs are synthesized locally and their
//! calls are dispatched in-process.

pub mod shell {
    use std::io::Read;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    use serde_json::{json, Value};
    use turnloop_domain::tool::ToolSpec;

    pub const NAME: &str = "shell";
    const DEFAULT_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_HISTORY_LIMIT: usize = 20;

    pub fn tool_specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                NAME,
                "execute",
                "Execute a shell command and return its exit code, stdout, and stderr.",
                Some(json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"},
                        "cwd": {"type": "string"},
                        "timeout": {"type": "integer"},
                        "env": {"type": "object", "additionalProperties": {"type": "string"}}
                    },
                    "required": ["command"]
                })),
            ),
            ToolSpec::new(
                NAME,
                "get_history",
                "Return the most recent shell history entries.",
                Some(json!({
                    "type": "object",
                    "properties": {"limit": {"type": "integer"}}
                })),
            ),
            ToolSpec::new(
                NAME,
                "search_history",
                "Search shell history for entries matching a pattern.",
                Some(json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"},
                        "limit": {"type": "integer"}
                    },
                    "required": ["pattern"]
                })),
            ),
        ]
    }

    pub fn call(tool: &str, args: &Value) -> Result<String, String> {
        match tool {
            "execute" => execute(args),
            "get_history" => get_history(args),
            "search_history" => search_history(args),
            other => Err(format!("unknown shell tool '{other}'")),
        }
    }

    fn execute(args: &Value) -> Result<String, String> {
        let command_str = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'command'")?;

        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command_str]);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        if let Some(cwd) = args.get("cwd").and_then(Value::as_str) {
            cmd.current_dir(cwd);
        }
        if let Some(env) = args.get("env").and_then(Value::as_object) {
            for (key, value) in env {
                if let Some(value) = value.as_str() {
                    cmd.env(key, value);
                }
            }
        }

        let mut child = cmd.spawn().map_err(|e| format!("failed to spawn command: {e}"))?;
        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_secs);

        let status = loop {
            match child.try_wait().map_err(|e| e.to_string())? {
                Some(status) => break Some(status),
                None => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        break None;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }

        let exit_code = match status {
            Some(status) => status.code().unwrap_or(-1),
            None => {
                stderr.push_str("[Timed out]");
                -1
            }
        };

        Ok(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
        })
        .to_string())
    }

    fn history_file() -> std::path::PathBuf {
        std::env::var("HISTFILE")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| std::path::PathBuf::from("."))
                    .join(".zsh_history")
            })
    }

    /// Parse zsh extended-history lines (`: <epoch>:<elapsed>;<command>`),
    /// falling back to the raw line for plain history files.
    fn parse_history(raw: &str) -> Vec<String> {
        raw.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                if let Some(rest) = line.strip_prefix(": ") {
                    rest.split_once(';').map(|(_, cmd)| cmd.to_string())
                } else {
                    Some(line.to_string())
                }
            })
            .collect()
    }

    fn get_history(args: &Value) -> Result<String, String> {
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        let raw = std::fs::read_to_string(history_file()).unwrap_or_default();
        let mut entries = parse_history(&raw);
        let start = entries.len().saturating_sub(limit);
        let mut entries: Vec<String> = entries.split_off(start);
        entries.reverse();
        Ok(json!({ "entries": entries }).to_string())
    }

    fn search_history(args: &Value) -> Result<String, String> {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'pattern'")?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        let raw = std::fs::read_to_string(history_file()).unwrap_or_default();
        let matches: Vec<String> = parse_history(&raw)
            .into_iter()
            .filter(|entry| entry.contains(pattern))
            .rev()
            .take(limit)
            .collect();
        Ok(json!({ "entries": matches }).to_string())
    }

}

pub mod time {
    use serde_json::{json, Value};
    use turnloop_domain::tool::ToolSpec;

    pub const NAME: &str = "time";

    pub fn tool_specs() -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            NAME,
            "now",
            "Return the current UTC time as an ISO-8601 timestamp.",
            Some(json!({"type": "object", "properties": {}})),
        )]
    }

    pub fn call(tool: &str) -> Result<String, String> {
        match tool {
            "now" => Ok(json!({ "now": now() }).to_string()),
            other => Err(format!("unknown time tool '{other}'")),
        }
    }

    fn now() -> String {
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn now_matches_expected_format() {
            let result = call("now").unwrap();
            let value: Value = serde_json::from_str(&result).unwrap();
            let now = value["now"].as_str().unwrap();
            assert!(chrono::DateTime::parse_from_rfc3339(&now.replace('Z', "+00:00")).is_ok());
        }
    }
}
