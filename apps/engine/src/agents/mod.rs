//! Agent Orchestrator — backend selection, health/quota/auth checks, retry
//! policy, and the persisted reliability ledger.
//!
//! Fallback chains are tried strictly in configured order. Failure policy
//! by class:
//! - `Timeout` — retry the same agent, 3 attempts total, then disable and
//!   advance to the next candidate;
//! - `Quota` — no retry; disable and advance immediately;
//! - `Auth` — systemic; disable and abort the entire chain;
//! - `NotFound` — disable and advance (an uninstalled tool or unknown
//!   model must not poison the rest of the chain);
//! - anything else — systemic; disable and abort the chain.
//!
//! Every ledger mutation persists the full agent table before the
//! orchestrator moves on — one write per attempt, success or failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

pub mod backend;
pub mod config;
pub mod ledger;

pub use backend::{AgentBackend, AgentError, ApiBackend, CliBackend};
pub use config::{AgentDefinition, AgentInterface, AgentsConfig};
pub use ledger::{AgentLedger, JsonFileLedgerStore, LedgerStore};

/// Attempts made against a single agent before a timeout disables it.
const MAX_ATTEMPTS_PER_AGENT: u32 = 3;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no agent chain is configured for task '{0}'")]
    ChainNotConfigured(String),

    #[error("no agents available for task '{category}' (tried: {})", .tried.join(", "))]
    NoAgentsAvailable {
        category: String,
        tried: Vec<String>,
    },

    #[error("agent '{agent_id}' failed with a non-retryable error: {source}")]
    ChainAborted {
        agent_id: String,
        #[source]
        source: AgentError,
    },
}

/// Successful execution: the raw text plus which agent/model produced it.
#[derive(Debug, Clone)]
pub struct Execution {
    pub text: String,
    pub agent_id: String,
    pub model: String,
}

pub struct AgentOrchestrator {
    chains: BTreeMap<String, Vec<String>>,
    ledger: Arc<AgentLedger>,
    backends: HashMap<String, Arc<dyn AgentBackend>>,
}

impl AgentOrchestrator {
    /// Builds backends from the declared configuration.
    pub fn new(config: &AgentsConfig, ledger: Arc<AgentLedger>, call_timeout: Duration) -> Self {
        let backends = config
            .agents
            .iter()
            .map(|(id, def)| {
                let backend: Arc<dyn AgentBackend> = match &def.interface {
                    AgentInterface::Api { base_url } => Arc::new(ApiBackend::new(
                        base_url.clone(),
                        def.auth_env.clone(),
                        call_timeout,
                    )),
                    AgentInterface::Cli { command, args } => Arc::new(CliBackend::new(
                        command.clone(),
                        args.clone(),
                        call_timeout,
                    )),
                };
                (id.clone(), backend)
            })
            .collect();

        AgentOrchestrator {
            chains: config.chains.clone(),
            ledger,
            backends,
        }
    }

    /// Construction seam for embedders (and tests) wiring custom backends.
    pub fn with_backends(
        chains: BTreeMap<String, Vec<String>>,
        ledger: Arc<AgentLedger>,
        backends: HashMap<String, Arc<dyn AgentBackend>>,
    ) -> Self {
        AgentOrchestrator {
            chains,
            ledger,
            backends,
        }
    }

    /// Fails fast when no chain agent is enabled for the scope. Checks the
    /// disable flags only — auth and budget are evaluated per attempt.
    pub async fn ensure_available(&self, category: &str) -> Result<(), OrchestratorError> {
        let chain = self
            .chains
            .get(category)
            .ok_or_else(|| OrchestratorError::ChainNotConfigured(category.to_string()))?;

        for agent_id in chain {
            if self.ledger.disabled_reason(agent_id, category).await.is_none() {
                return Ok(());
            }
        }
        Err(OrchestratorError::NoAgentsAvailable {
            category: category.to_string(),
            tried: chain.clone(),
        })
    }

    /// Runs the prompt against the first candidate that survives the
    /// availability checks, applying per-class failure policy.
    pub async fn execute(
        &self,
        category: &str,
        prompt: &str,
        model_override: Option<&str>,
    ) -> Result<Execution, OrchestratorError> {
        let chain = self
            .chains
            .get(category)
            .ok_or_else(|| OrchestratorError::ChainNotConfigured(category.to_string()))?;

        let mut tried: Vec<String> = Vec::new();

        for agent_id in chain {
            tried.push(agent_id.clone());

            let Some(snapshot) = self.ledger.snapshot(agent_id).await else {
                // Unreachable after config validation; skip defensively.
                warn!(%agent_id, "chain references agent with no definition");
                continue;
            };

            if let Some(reason) = snapshot.disabled.get(category) {
                debug!(%agent_id, category, reason = %reason, "skipping disabled agent");
                continue;
            }

            // Auth pre-check: any one declared env var or credential file.
            if !snapshot.definition.auth_satisfied() {
                let reason = snapshot.definition.auth_failure_reason();
                self.disable(agent_id, category, reason).await;
                continue;
            }

            // Daily budget check at the configured model rate.
            let cost = snapshot.definition.cost_for(model_override);
            if snapshot.daily_usage + cost > snapshot.definition.daily_budget {
                self.disable(
                    agent_id,
                    category,
                    "quota_exhausted: daily budget reached".to_string(),
                )
                .await;
                continue;
            }

            let model = model_override
                .unwrap_or(&snapshot.definition.default_model)
                .to_string();
            let Some(backend) = self.backends.get(agent_id) else {
                warn!(%agent_id, "no backend wired for agent");
                continue;
            };

            let mut attempt = 0u32;
            loop {
                attempt += 1;
                debug!(%agent_id, category, %model, attempt, "invoking agent");

                match backend.invoke(prompt, &model).await {
                    Ok(text) => {
                        if let Err(err) = self.ledger.record_usage(agent_id, cost).await {
                            warn!(%agent_id, "persisting usage failed: {err:#}");
                        }
                        info!(%agent_id, category, %model, attempt, "agent call succeeded");
                        return Ok(Execution {
                            text,
                            agent_id: agent_id.clone(),
                            model,
                        });
                    }

                    Err(AgentError::Timeout(secs)) if attempt < MAX_ATTEMPTS_PER_AGENT => {
                        warn!(
                            %agent_id,
                            attempt,
                            "agent timed out after {secs}s; retrying same agent"
                        );
                        if let Err(err) = self.ledger.persist().await {
                            warn!(%agent_id, "persisting ledger failed: {err:#}");
                        }
                    }

                    Err(err @ AgentError::Timeout(_)) => {
                        self.disable(
                            agent_id,
                            category,
                            format!("error: {err} ({MAX_ATTEMPTS_PER_AGENT} attempts)"),
                        )
                        .await;
                        break; // advance to the next candidate
                    }

                    Err(err @ AgentError::Quota(_)) => {
                        self.disable(agent_id, category, format!("quota_exhausted: {err}"))
                            .await;
                        break; // advance immediately, no retry
                    }

                    Err(err @ AgentError::Auth(_)) => {
                        // Systemic: a credential rejected at call time will
                        // not heal by trying a different agent chain link.
                        self.disable(agent_id, category, format!("error: {err}")).await;
                        return Err(OrchestratorError::ChainAborted {
                            agent_id: agent_id.clone(),
                            source: err,
                        });
                    }

                    Err(err @ AgentError::NotFound(_)) => {
                        self.disable(agent_id, category, format!("error: {err}")).await;
                        break; // advance
                    }

                    Err(err) => {
                        self.disable(agent_id, category, format!("error: {err}")).await;
                        return Err(OrchestratorError::ChainAborted {
                            agent_id: agent_id.clone(),
                            source: err,
                        });
                    }
                }
            }
        }

        Err(OrchestratorError::NoAgentsAvailable {
            category: category.to_string(),
            tried,
        })
    }

    async fn disable(&self, agent_id: &str, category: &str, reason: String) {
        warn!(%agent_id, category, reason = %reason, "disabling agent");
        if let Err(err) = self.ledger.disable(agent_id, category, reason).await {
            warn!(%agent_id, "persisting disable failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::config::AgentInterface;
    use crate::agents::ledger::InMemoryLedgerStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back a scripted sequence of results, counting calls.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, AgentError>>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, AgentError>>) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AgentBackend for ScriptedBackend {
        async fn invoke(&self, _prompt: &str, _model: &str) -> Result<String, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    fn definition(budget: f64) -> AgentDefinition {
        AgentDefinition {
            interface: AgentInterface::Cli {
                command: "unused".to_string(),
                args: vec![],
            },
            default_model: "default-model".to_string(),
            auth_env: vec![],
            auth_files: vec![],
            daily_budget: budget,
            model_rates: HashMap::new(),
        }
    }

    async fn orchestrator_with(
        agents: Vec<(&str, Arc<ScriptedBackend>)>,
    ) -> (AgentOrchestrator, Arc<AgentLedger>) {
        let mut definitions = BTreeMap::new();
        let mut backends: HashMap<String, Arc<dyn AgentBackend>> = HashMap::new();
        let mut chain = Vec::new();
        for (id, backend) in agents {
            definitions.insert(id.to_string(), definition(100.0));
            backends.insert(id.to_string(), backend as Arc<dyn AgentBackend>);
            chain.push(id.to_string());
        }
        let ledger = Arc::new(
            AgentLedger::open(definitions, Arc::new(InMemoryLedgerStore::new()))
                .await
                .unwrap(),
        );
        let mut chains = BTreeMap::new();
        chains.insert("resume_generation".to_string(), chain);
        (
            AgentOrchestrator::with_backends(chains, ledger.clone(), backends),
            ledger,
        )
    }

    fn timeout() -> AgentError {
        AgentError::Timeout(120)
    }

    #[tokio::test]
    async fn test_timeout_retries_three_times_then_advances() {
        let first = ScriptedBackend::new(vec![
            Err(timeout()),
            Err(timeout()),
            Err(timeout()),
        ]);
        let second = ScriptedBackend::new(vec![Ok("{\"ok\":1}".to_string())]);
        let (orchestrator, ledger) =
            orchestrator_with(vec![("first", first.clone()), ("second", second.clone())]).await;

        let execution = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap();

        assert_eq!(first.calls(), 3, "timeouts retry the same agent 3 times");
        assert_eq!(second.calls(), 1, "fallback gets exactly one attempt");
        assert_eq!(execution.agent_id, "second");

        let reason = ledger
            .disabled_reason("first", "resume_generation")
            .await
            .unwrap();
        assert!(reason.starts_with("error:"), "reason was {reason}");
        assert!(ledger
            .disabled_reason("second", "resume_generation")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_quota_advances_without_retry() {
        let first = ScriptedBackend::new(vec![Err(AgentError::Quota("429".to_string()))]);
        let second = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let (orchestrator, ledger) =
            orchestrator_with(vec![("first", first.clone()), ("second", second.clone())]).await;

        orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap();

        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        let reason = ledger
            .disabled_reason("first", "resume_generation")
            .await
            .unwrap();
        assert!(reason.starts_with("quota_exhausted:"));
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_entire_chain() {
        let first = ScriptedBackend::new(vec![Err(AgentError::Auth("401".to_string()))]);
        let second = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let (orchestrator, _ledger) =
            orchestrator_with(vec![("first", first.clone()), ("second", second.clone())]).await;

        let err = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap_err();

        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0, "auth failure must not try the fallback");
        assert!(matches!(err, OrchestratorError::ChainAborted { .. }));
    }

    #[tokio::test]
    async fn test_other_error_aborts_chain() {
        let first = ScriptedBackend::new(vec![Err(AgentError::Other("boom".to_string()))]);
        let second = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let (orchestrator, _ledger) =
            orchestrator_with(vec![("first", first.clone()), ("second", second.clone())]).await;

        let err = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ChainAborted { .. }));
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_advances_to_next_agent() {
        let first = ScriptedBackend::new(vec![Err(AgentError::NotFound(
            "command not found".to_string(),
        ))]);
        let second = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let (orchestrator, _ledger) =
            orchestrator_with(vec![("first", first.clone()), ("second", second.clone())]).await;

        let execution = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap();
        assert_eq!(execution.agent_id, "second");
    }

    #[tokio::test]
    async fn test_chain_exhaustion_names_every_tried_agent() {
        let first = ScriptedBackend::new(vec![Err(AgentError::Quota("q".to_string()))]);
        let second = ScriptedBackend::new(vec![Err(AgentError::Quota("q".to_string()))]);
        let (orchestrator, _ledger) =
            orchestrator_with(vec![("first", first), ("second", second)]).await;

        let err = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap_err();

        match err {
            OrchestratorError::NoAgentsAvailable { category, tried } => {
                assert_eq!(category, "resume_generation");
                assert_eq!(tried, vec!["first".to_string(), "second".to_string()]);
            }
            other => panic!("expected NoAgentsAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_records_usage() {
        let backend = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let (orchestrator, ledger) = orchestrator_with(vec![("solo", backend)]).await;

        orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap();

        let snapshot = ledger.snapshot("solo").await.unwrap();
        assert_eq!(snapshot.daily_usage, 1.0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_disables_and_skips() {
        let backend = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let mut definitions = BTreeMap::new();
        definitions.insert("tiny".to_string(), definition(1.0));
        let ledger = Arc::new(
            AgentLedger::open(definitions, Arc::new(InMemoryLedgerStore::new()))
                .await
                .unwrap(),
        );
        ledger.record_usage("tiny", 1.0).await.unwrap();

        let mut chains = BTreeMap::new();
        chains.insert("resume_generation".to_string(), vec!["tiny".to_string()]);
        let mut backends: HashMap<String, Arc<dyn AgentBackend>> = HashMap::new();
        backends.insert("tiny".to_string(), backend.clone() as Arc<dyn AgentBackend>);
        let orchestrator = AgentOrchestrator::with_backends(chains, ledger.clone(), backends);

        let err = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::NoAgentsAvailable { .. }));
        assert_eq!(backend.calls(), 0, "budget-exhausted agent is never invoked");
        assert_eq!(
            ledger
                .disabled_reason("tiny", "resume_generation")
                .await
                .unwrap(),
            "quota_exhausted: daily budget reached"
        );
    }

    #[tokio::test]
    async fn test_missing_auth_disables_with_any_of_reason() {
        let backend = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let mut def = definition(100.0);
        def.auth_env = vec!["ENGINE_TEST_UNSET_KEY_1".to_string()];
        std::env::remove_var("ENGINE_TEST_UNSET_KEY_1");

        let mut definitions = BTreeMap::new();
        definitions.insert("keyed".to_string(), def);
        let ledger = Arc::new(
            AgentLedger::open(definitions, Arc::new(InMemoryLedgerStore::new()))
                .await
                .unwrap(),
        );
        let mut chains = BTreeMap::new();
        chains.insert("resume_generation".to_string(), vec!["keyed".to_string()]);
        let mut backends: HashMap<String, Arc<dyn AgentBackend>> = HashMap::new();
        backends.insert("keyed".to_string(), backend.clone() as Arc<dyn AgentBackend>);
        let orchestrator = AgentOrchestrator::with_backends(chains, ledger.clone(), backends);

        let err = orchestrator
            .execute("resume_generation", "prompt", None)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::NoAgentsAvailable { .. }));
        assert_eq!(backend.calls(), 0);
        assert_eq!(
            ledger
                .disabled_reason("keyed", "resume_generation")
                .await
                .unwrap(),
            "missing_env:any_of:ENGINE_TEST_UNSET_KEY_1"
        );
    }

    #[tokio::test]
    async fn test_ensure_available_fails_when_all_disabled() {
        let backend = ScriptedBackend::new(vec![]);
        let (orchestrator, ledger) = orchestrator_with(vec![("solo", backend)]).await;

        orchestrator.ensure_available("resume_generation").await.unwrap();

        ledger
            .disable("solo", "resume_generation", "error: dead".to_string())
            .await
            .unwrap();
        let err = orchestrator
            .ensure_available("resume_generation")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoAgentsAvailable { .. }));

        let err = orchestrator.ensure_available("unknown_task").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ChainNotConfigured(_)));
    }

    #[tokio::test]
    async fn test_orchestrator_builds_backends_from_config() {
        let raw = serde_json::json!({
            "agents": {
                "api-agent": {
                    "kind": "api",
                    "default_model": "claude-sonnet-4-5",
                    "auth_env": ["ANTHROPIC_API_KEY"],
                    "daily_budget": 10.0
                },
                "cli-agent": {
                    "kind": "cli",
                    "command": "claude",
                    "default_model": "claude-sonnet-4-5",
                    "daily_budget": 10.0
                }
            },
            "chains": { "resume_generation": ["api-agent", "cli-agent"] }
        })
        .to_string();
        let config = AgentsConfig::from_json(&raw).unwrap();
        let ledger = Arc::new(
            AgentLedger::open(config.agents.clone(), Arc::new(InMemoryLedgerStore::new()))
                .await
                .unwrap(),
        );

        let orchestrator = AgentOrchestrator::new(&config, ledger, Duration::from_secs(5));
        orchestrator
            .ensure_available("resume_generation")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_scope_does_not_leak_to_other_scope() {
        let backend = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let mut definitions = BTreeMap::new();
        definitions.insert("solo".to_string(), definition(100.0));
        let ledger = Arc::new(
            AgentLedger::open(definitions, Arc::new(InMemoryLedgerStore::new()))
                .await
                .unwrap(),
        );
        ledger
            .disable("solo", "resume_generation", "error: dead".to_string())
            .await
            .unwrap();

        let mut chains = BTreeMap::new();
        chains.insert("resume_generation".to_string(), vec!["solo".to_string()]);
        chains.insert(
            "cover_letter_generation".to_string(),
            vec!["solo".to_string()],
        );
        let mut backends: HashMap<String, Arc<dyn AgentBackend>> = HashMap::new();
        backends.insert("solo".to_string(), backend as Arc<dyn AgentBackend>);
        let orchestrator = AgentOrchestrator::with_backends(chains, ledger, backends);

        assert!(orchestrator
            .ensure_available("resume_generation")
            .await
            .is_err());
        assert!(orchestrator
            .ensure_available("cover_letter_generation")
            .await
            .is_ok());
    }
}
