//! Declared agent table and fallback chains.
//!
//! Agents are configuration, not runtime discoveries: the engine only ever
//! mutates usage counters and enabled state (see `ledger`). Chains are
//! validated against the agent table when the configuration loads, so a
//! dangling reference fails startup instead of a request.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

fn default_api_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

/// How an agent is reached: a direct HTTP API or an external command-line
/// tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentInterface {
    Api {
        #[serde(default = "default_api_base_url")]
        base_url: String,
    },
    Cli {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// One configured AI text-generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    #[serde(flatten)]
    pub interface: AgentInterface,
    pub default_model: String,
    /// Env vars that can satisfy authentication. Any ONE being set is
    /// enough, including across `auth_files`.
    #[serde(default)]
    pub auth_env: Vec<String>,
    /// Credential files that can satisfy authentication.
    #[serde(default)]
    pub auth_files: Vec<String>,
    pub daily_budget: f64,
    /// Cost units per call when an explicit model override is used. Calls
    /// on the agent's own default model cost 1 unit.
    #[serde(default)]
    pub model_rates: HashMap<String, f64>,
}

impl AgentDefinition {
    pub fn cost_for(&self, model_override: Option<&str>) -> f64 {
        match model_override {
            Some(model) => self.model_rates.get(model).copied().unwrap_or(1.0),
            None => 1.0,
        }
    }

    /// True when no auth is declared, or any one declared env var is set,
    /// or any one declared credential file exists.
    pub fn auth_satisfied(&self) -> bool {
        if self.auth_env.is_empty() && self.auth_files.is_empty() {
            return true;
        }
        let env_ok = self
            .auth_env
            .iter()
            .any(|var| std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false));
        let file_ok = self.auth_files.iter().any(|path| Path::new(path).exists());
        env_ok || file_ok
    }

    /// Disable reason recorded when `auth_satisfied` is false.
    pub fn auth_failure_reason(&self) -> String {
        let mut parts = Vec::new();
        if !self.auth_env.is_empty() {
            parts.push(format!("missing_env:any_of:{}", self.auth_env.join(",")));
        }
        if !self.auth_files.is_empty() {
            parts.push(format!("missing_file:any_of:{}", self.auth_files.join(",")));
        }
        parts.join("; ")
    }
}

/// The full declared configuration: agent table plus per-task fallback
/// chains, tried strictly in declared order and never reordered at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    pub agents: BTreeMap<String, AgentDefinition>,
    pub chains: BTreeMap<String, Vec<String>>,
}

impl AgentsConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading agents config {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: AgentsConfig =
            serde_json::from_str(raw).context("parsing agents config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Every chain must be non-empty and reference only declared agents.
    pub fn validate(&self) -> Result<()> {
        for (category, chain) in &self.chains {
            if chain.is_empty() {
                bail!("fallback chain for task '{category}' is empty");
            }
            for agent_id in chain {
                if !self.agents.contains_key(agent_id) {
                    bail!(
                        "fallback chain for task '{category}' references unknown agent '{agent_id}'"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        serde_json::json!({
            "agents": {
                "claude-api": {
                    "kind": "api",
                    "default_model": "claude-sonnet-4-5",
                    "auth_env": ["ANTHROPIC_API_KEY"],
                    "daily_budget": 50.0,
                    "model_rates": { "claude-opus-4-6": 5.0 }
                },
                "claude-cli": {
                    "kind": "cli",
                    "command": "claude",
                    "args": ["-p"],
                    "default_model": "claude-sonnet-4-5",
                    "auth_files": ["/root/.claude/credentials.json"],
                    "daily_budget": 100.0
                }
            },
            "chains": {
                "resume_generation": ["claude-api", "claude-cli"],
                "cover_letter_generation": ["claude-api", "claude-cli"]
            }
        })
        .to_string()
    }

    #[test]
    fn test_config_parses_and_validates() {
        let config = AgentsConfig::from_json(&sample_json()).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(
            config.chains["resume_generation"],
            vec!["claude-api", "claude-cli"]
        );
        match &config.agents["claude-api"].interface {
            AgentInterface::Api { base_url } => {
                assert!(base_url.contains("anthropic.com"));
            }
            other => panic!("expected api interface, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_chain_reference_fails_load() {
        let raw = serde_json::json!({
            "agents": {},
            "chains": { "resume_generation": ["ghost"] }
        })
        .to_string();
        let err = AgentsConfig::from_json(&raw).unwrap_err();
        assert!(err.to_string().contains("unknown agent 'ghost'"));
    }

    #[test]
    fn test_empty_chain_fails_load() {
        let raw = serde_json::json!({
            "agents": {},
            "chains": { "resume_generation": [] }
        })
        .to_string();
        let err = AgentsConfig::from_json(&raw).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn test_cost_defaults_to_one_unit() {
        let config = AgentsConfig::from_json(&sample_json()).unwrap();
        let agent = &config.agents["claude-api"];
        assert_eq!(agent.cost_for(None), 1.0);
        assert_eq!(agent.cost_for(Some("claude-opus-4-6")), 5.0);
        assert_eq!(agent.cost_for(Some("unknown-model")), 1.0);
    }

    #[test]
    fn test_auth_satisfied_with_no_declared_auth() {
        let def = AgentDefinition {
            interface: AgentInterface::Cli {
                command: "claude".to_string(),
                args: vec![],
            },
            default_model: "claude-sonnet-4-5".to_string(),
            auth_env: vec![],
            auth_files: vec![],
            daily_budget: 10.0,
            model_rates: HashMap::new(),
        };
        assert!(def.auth_satisfied());
    }

    #[test]
    fn test_auth_failure_reason_lists_both_kinds() {
        let def = AgentDefinition {
            interface: AgentInterface::Cli {
                command: "claude".to_string(),
                args: vec![],
            },
            default_model: "claude-sonnet-4-5".to_string(),
            auth_env: vec!["KEY_A".to_string(), "KEY_B".to_string()],
            auth_files: vec!["/etc/creds".to_string()],
            daily_budget: 10.0,
            model_rates: HashMap::new(),
        };
        assert_eq!(
            def.auth_failure_reason(),
            "missing_env:any_of:KEY_A,KEY_B; missing_file:any_of:/etc/creds"
        );
    }
}
