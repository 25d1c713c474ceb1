//! Typed configuration entities. Raw untyped maps are confined to
//! the infrastructure-layer parsing boundary; everything past that
//! boundary works with these types.
//!
//! Grounded on `original_source/gptsh/domain/models.py`'s
//! `ProviderConfig`/`AgentConfig`/`Defaults` dataclasses and the
//! `file_config` pattern of one struct per concern with
//! `#[serde(default)]` throughout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mcp::ServerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPrompt {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub system_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub model_small: Option<String>,
    #[serde(default)]
    pub prompt: AgentPrompt,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_output() -> String {
    "text".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub mcp_servers: HashMap<String, ServerConfig>,
}

/// Resolve the effective agent name: CLI override, else the named
/// agent's own config, else the global default. Mirrors
/// `pick_effective_agent_provider` in the original source.
pub fn pick_effective_agent<'a>(config: &'a RootConfig, cli_override: Option<&str>) -> Option<&'a AgentConfig> {
    let name = cli_override
        .map(str::to_string)
        .or_else(|| config.defaults.agent.clone())?;
    config.agents.get(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RootConfig {
        let mut agents = HashMap::new();
        agents.insert(
            "default".into(),
            AgentConfig {
                name: "default".into(),
                provider: "openai".into(),
                model: "gpt-4o".into(),
                ..Default::default()
            },
        );
        agents.insert(
            "fast".into(),
            AgentConfig {
                name: "fast".into(),
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
                ..Default::default()
            },
        );
        RootConfig {
            defaults: Defaults {
                agent: Some("default".into()),
                ..Default::default()
            },
            agents,
            ..Default::default()
        }
    }

    #[test]
    fn cli_override_wins() {
        let cfg = config();
        let agent = pick_effective_agent(&cfg, Some("fast")).unwrap();
        assert_eq!(agent.name, "fast");
    }

    #[test]
    fn falls_back_to_default_agent() {
        let cfg = config();
        let agent = pick_effective_agent(&cfg, None).unwrap();
        assert_eq!(agent.name, "default");
    }

    #[test]
    fn unknown_override_resolves_to_none() {
        let cfg = config();
        assert!(pick_effective_agent(&cfg, Some("nope")).is_none());
    }
}
