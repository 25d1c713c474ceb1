//! Config loader. In the shape of `config/loader.rs`'s `ConfigLoader`
//! (figment + toml, project file then global file, `Serialized::defaults`
//! as the base layer) and `config/file_config/mod.rs`'s `validate()`
//! pattern of collecting non-fatal [`ConfigIssue`]s. The snippet-merge and
//! `${VAR}` expansion steps follow `original_source/gptsh/config/loader.py`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use thiserror::Error;
use turnloop_domain::RootConfig;

const ROOT_FILE: &str = "turnloop.toml";
const SNIPPET_DIR: &str = "config.d";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Severity of a non-fatal configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub message: String,
}

/// Loads `./turnloop.toml` plus every `config.d/*.toml` snippet (sorted by
/// filename), right-biased merged, then expands `${VAR}`/`${env:VAR}`
/// references against the process environment.
pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    /// Search rooted at the current working directory.
    pub fn new() -> Self {
        Self { root: PathBuf::from(".") }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn snippet_paths(&self) -> Vec<PathBuf> {
        let dir = self.root.join(SNIPPET_DIR);
        let mut paths: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"))
                .collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }

    /// Load and deserialize the merged configuration. Missing files are
    /// not an error — an empty tree still yields `RootConfig::default()`.
    pub fn load(&self) -> Result<RootConfig, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RootConfig::default()));

        let root_file = self.root.join(ROOT_FILE);
        if root_file.exists() {
            figment = figment.merge(Toml::file(&root_file));
        }
        for snippet in self.snippet_paths() {
            figment = figment.merge(Toml::file(&snippet));
        }

        let config: RootConfig = figment.extract().map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(expand_env(config))
    }

    /// Non-fatal checks over an already-loaded config.
    pub fn validate(config: &RootConfig) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if let Some(name) = &config.defaults.agent {
            if !config.agents.contains_key(name) {
                issues.push(ConfigIssue {
                    severity: Severity::Warning,
                    message: format!("defaults.agent '{name}' does not name a configured agent"),
                });
            }
        }

        for (name, agent) in &config.agents {
            if !config.providers.contains_key(&agent.provider) {
                issues.push(ConfigIssue {
                    severity: Severity::Error,
                    message: format!(
                        "agent '{name}' references unknown provider '{}'",
                        agent.provider
                    ),
                });
            }
        }

        issues
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively expand `${VAR}` and `${env:VAR}` references in every string
/// value against the process environment. Missing variables expand to the
/// empty string rather than failing the load.
fn expand_env(config: RootConfig) -> RootConfig {
    let json = serde_json::to_value(config).expect("RootConfig always serializes");
    let expanded = expand_value(json);
    serde_json::from_value(expanded).expect("expansion preserves shape")
}

fn expand_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(expand_string(&s)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(expand_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter().map(|(k, v)| (k, expand_value(v))).collect(),
        ),
        other => other,
    }
}

fn expand_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = input[i + 2..].find('}') {
                let inner = &input[i + 2..i + 2 + end];
                let var_name = inner.strip_prefix("env:").unwrap_or(inner);
                out.push_str(&std::env::var(var_name).unwrap_or_default());
                i += 2 + end + 1;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Resolve the effective project config path if one exists (for display
/// in `--verbose` config-source diagnostics).
pub fn project_config_path(root: &Path) -> Option<PathBuf> {
    let path = root.join(ROOT_FILE);
    path.exists().then_some(path)
}

/// `resolve(HashMap)` used when a provider's `api_key_env` points at an
/// environment variable (distinct from the `${...}` expansion above,
/// which runs on raw string values from the TOML tree itself).
pub fn resolve_api_key(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok()
}

#[allow(dead_code)]
fn unused_helper(_: &HashMap<String, String>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_defaults_when_nothing_present() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_root(dir.path());
        let config = loader.load().unwrap();
        assert!(config.agents.is_empty());
        assert_eq!(config.defaults.output, "text");
    }

    #[test]
    fn root_file_and_snippets_merge_right_biased() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            ROOT_FILE,
            r#"
[defaults]
agent = "main"
output = "text"
"#,
        );
        write_file(
            dir.path(),
            "config.d/10-override.toml",
            r#"
[defaults]
output = "markdown"
"#,
        );
        let config = ConfigLoader::with_root(dir.path()).load().unwrap();
        assert_eq!(config.defaults.agent.as_deref(), Some("main"));
        assert_eq!(config.defaults.output, "markdown");
    }

    #[test]
    fn env_expansion_fills_in_values() {
        // SAFETY: test-only, single-threaded env mutation scoped to this test.
        unsafe { std::env::set_var("TURNLOOP_TEST_TOKEN", "secret123") };
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            ROOT_FILE,
            r#"
[providers.openai]
name = "openai"
api_base = "https://api.example.com/${env:TURNLOOP_TEST_TOKEN}"
"#,
        );
        let config = ConfigLoader::with_root(dir.path()).load().unwrap();
        let provider = config.providers.get("openai").unwrap();
        assert_eq!(
            provider.api_base.as_deref(),
            Some("https://api.example.com/secret123")
        );
        unsafe { std::env::remove_var("TURNLOOP_TEST_TOKEN") };
    }

    #[test]
    fn missing_env_var_expands_to_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            ROOT_FILE,
            r#"
[providers.openai]
name = "openai"
api_base = "https://x/${TURNLOOP_DOES_NOT_EXIST}"
"#,
        );
        let config = ConfigLoader::with_root(dir.path()).load().unwrap();
        assert_eq!(
            config.providers.get("openai").unwrap().api_base.as_deref(),
            Some("https://x/")
        );
    }

    #[test]
    fn validate_flags_unknown_provider_reference() {
        let mut config = RootConfig::default();
        config.agents.insert(
            "main".into(),
            turnloop_domain::AgentConfig {
                name: "main".into(),
                provider: "nope".into(),
                model: "gpt-4o".into(),
                ..Default::default()
            },
        );
        let issues = ConfigLoader::validate(&config);
        assert!(issues.iter().any(|i| i.severity == Severity::Error));
    }
}
