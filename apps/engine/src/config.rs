use anyhow::{Context, Result};

/// Engine configuration loaded from environment variables.
///
/// Only `AGENTS_CONFIG_PATH` is required; everything else has a sensible
/// default so tests and local runs need no `.env` file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the JSON document declaring agents and fallback chains.
    pub agents_config_path: String,
    /// Path where the reliability ledger (usage, disable reasons) persists.
    pub ledger_path: String,
    /// Directory the default JSON artifact sink writes into.
    pub artifacts_dir: String,
    /// Per-call deadline for agent backends, in seconds. Governs the HTTP
    /// client timeout and the command-line backend kill deadline.
    pub call_timeout_secs: u64,
    pub rust_log: String,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(EngineConfig {
            agents_config_path: require_env("AGENTS_CONFIG_PATH")?,
            ledger_path: std::env::var("AGENT_LEDGER_PATH")
                .unwrap_or_else(|_| "agent-ledger.json".to_string()),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .unwrap_or_else(|_| "artifacts".to_string()),
            call_timeout_secs: std::env::var("AGENT_CALL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse::<u64>()
                .context("AGENT_CALL_TIMEOUT_SECS must be a whole number of seconds")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
