//! Agent backends — the two interface kinds an agent can declare, behind
//! one trait the orchestrator drives.
//!
//! Backends classify their own failures into [`AgentError`]; retry and
//! chain-advance policy lives entirely in the orchestrator.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Classified backend failure. Each class carries its own orchestrator
/// policy; the strings are operator-facing detail, never shown to users.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("quota or rate limit reported: {0}")]
    Quota(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String, AgentError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Direct API backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

/// Anthropic-style messages API reached over HTTP.
///
/// The API key is resolved at call time from the first declared env var
/// that is set, so a key rotated mid-process is picked up without restart.
pub struct ApiBackend {
    base_url: String,
    auth_env: Vec<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ApiBackend {
    pub fn new(base_url: String, auth_env: Vec<String>, timeout: Duration) -> Self {
        ApiBackend {
            base_url,
            auth_env,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            timeout_secs: timeout.as_secs(),
        }
    }

    fn resolve_api_key(&self) -> Option<String> {
        self.auth_env
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }
}

#[async_trait]
impl AgentBackend for ApiBackend {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String, AgentError> {
        let api_key = self.resolve_api_key().ok_or_else(|| {
            AgentError::Auth(format!(
                "no API key present in any of: {}",
                self.auth_env.join(", ")
            ))
        })?;

        let request_body = ApiRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AgentError::Timeout(self.timeout_secs)
                } else {
                    AgentError::Other(format!("HTTP request failed: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("status {status}: {}", truncate(&body, 300));
            return Err(match status.as_u16() {
                429 | 529 => AgentError::Quota(detail),
                401 | 403 => AgentError::Auth(detail),
                404 => AgentError::NotFound(detail),
                _ => AgentError::Other(detail),
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|err| AgentError::Other(format!("unreadable API response: {err}")))?;

        let text = parsed
            .content
            .iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text.clone())
            .ok_or_else(|| AgentError::Other("API returned no text content".to_string()))?;

        debug!(model, chars = text.len(), "api backend call succeeded");
        Ok(text)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Command-line backend
// ────────────────────────────────────────────────────────────────────────────

/// External command-line tool: prompt on stdin, document on stdout, model
/// passed as `--model <model>`.
///
/// The per-call deadline is enforced with `tokio::time::timeout`; on
/// expiry the wait future is dropped and `kill_on_drop` terminates the
/// child process.
pub struct CliBackend {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliBackend {
    pub fn new(command: String, args: Vec<String>, timeout: Duration) -> Self {
        CliBackend {
            command,
            args,
            timeout,
        }
    }
}

#[async_trait]
impl AgentBackend for CliBackend {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String, AgentError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg("--model")
            .arg(model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    AgentError::NotFound(format!("command not found: {}", self.command))
                }
                _ => AgentError::Other(format!("failed to spawn {}: {err}", self.command)),
            })?;

        // Feed the prompt from a separate task so a tool that interleaves
        // reading and writing cannot deadlock against a full pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_string();
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                    warn!("writing prompt to cli backend stdin failed: {err}");
                }
                // Dropping stdin closes the pipe so the tool sees EOF.
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|err| AgentError::Other(format!("waiting for output: {err}")))?
            }
            Err(_) => {
                warn!(command = %self.command, "cli backend timed out; killing child");
                return Err(AgentError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(classify_cli_failure(&output.status, &stdout, &stderr));
        }

        if stdout.trim().is_empty() {
            return Err(AgentError::Other(format!(
                "{} produced no output",
                self.command
            )));
        }
        Ok(stdout)
    }
}

/// Classifies a non-zero CLI exit by sniffing its output for quota/auth
/// markers; anything unrecognized is `Other`.
fn classify_cli_failure(
    status: &std::process::ExitStatus,
    stdout: &str,
    stderr: &str,
) -> AgentError {
    let haystack = format!("{} {}", stdout, stderr).to_lowercase();
    let detail = if stderr.trim().is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {}", truncate(stderr.trim(), 300))
    };

    if ["rate limit", "rate_limit", "quota", "429"]
        .iter()
        .any(|marker| haystack.contains(marker))
    {
        AgentError::Quota(detail)
    } else if ["unauthorized", "authentication", "api key", "invalid x-api-key", "401", "403"]
        .iter()
        .any(|marker| haystack.contains(marker))
    {
        AgentError::Auth(detail)
    } else if ["model not found", "unknown model", "404"]
        .iter()
        .any(|marker| haystack.contains(marker))
    {
        AgentError::NotFound(detail)
    } else {
        AgentError::Other(detail)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
