//! Reliability ledger — the only mutable state shared across concurrent
//! requests.
//!
//! The ledger tracks per-agent daily usage and per-scope disable reasons
//! behind a single mutex and writes the full table through a `LedgerStore`
//! after every mutation. In-process access is serialized; the persisted
//! table is last-writer-wins across processes, so usage counters are
//! eventually consistent and brief over-spend under concurrency is
//! tolerated.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::agents::config::AgentDefinition;

/// Mutable runtime state for one agent. Everything else about an agent is
/// declared configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentRuntimeState {
    pub daily_usage: f64,
    /// UTC day the usage counter belongs to; a rollover resets the counter.
    pub usage_date: Option<NaiveDate>,
    /// Scope (task category) → disable reason.
    pub disabled: BTreeMap<String, String>,
}

pub type LedgerTable = BTreeMap<String, AgentRuntimeState>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn save(&self, table: &LedgerTable) -> Result<()>;
    async fn load(&self) -> Result<Option<LedgerTable>>;
}

/// Persists the table as a JSON file.
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileLedgerStore { path: path.into() }
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedgerStore {
    async fn save(&self, table: &LedgerTable) -> Result<()> {
        let body = serde_json::to_vec_pretty(table).context("serializing agent ledger")?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing agent ledger {}", self.path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<LedgerTable>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let table =
                    serde_json::from_str(&raw).context("parsing persisted agent ledger")?;
                Ok(Some(table))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("reading agent ledger {}", self.path.display()))
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    table: Mutex<Option<LedgerTable>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn save(&self, table: &LedgerTable) -> Result<()> {
        *self.table.lock().await = Some(table.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<LedgerTable>> {
        Ok(self.table.lock().await.clone())
    }
}

/// Point-in-time view of one agent: its declared definition plus runtime
/// state with the day rollover already applied.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub definition: AgentDefinition,
    pub daily_usage: f64,
    pub disabled: BTreeMap<String, String>,
}

/// Shared reliability ledger. Narrow interface by design:
/// snapshot / disable / record-usage, nothing else mutates agent state.
pub struct AgentLedger {
    definitions: BTreeMap<String, AgentDefinition>,
    inner: Mutex<LedgerTable>,
    store: Arc<dyn LedgerStore>,
}

impl AgentLedger {
    /// Opens the ledger, merging persisted runtime state (if any) over the
    /// declared agent table.
    pub async fn open(
        definitions: BTreeMap<String, AgentDefinition>,
        store: Arc<dyn LedgerStore>,
    ) -> Result<Self> {
        let mut table = store.load().await?.unwrap_or_default();
        // Drop state for agents no longer declared.
        table.retain(|id, _| definitions.contains_key(id));
        Ok(AgentLedger {
            definitions,
            inner: Mutex::new(table),
            store,
        })
    }

    pub fn definition(&self, agent_id: &str) -> Option<&AgentDefinition> {
        self.definitions.get(agent_id)
    }

    pub async fn snapshot(&self, agent_id: &str) -> Option<AgentSnapshot> {
        let definition = self.definitions.get(agent_id)?.clone();
        let table = self.inner.lock().await;
        let state = table.get(agent_id).cloned().unwrap_or_default();
        let today = Utc::now().date_naive();
        let daily_usage = if state.usage_date == Some(today) {
            state.daily_usage
        } else {
            0.0
        };
        Some(AgentSnapshot {
            definition,
            daily_usage,
            disabled: state.disabled,
        })
    }

    /// The disable reason for an agent in a scope, if any.
    pub async fn disabled_reason(&self, agent_id: &str, scope: &str) -> Option<String> {
        let table = self.inner.lock().await;
        table.get(agent_id)?.disabled.get(scope).cloned()
    }

    /// Permanently disables an agent for a scope and persists the table.
    pub async fn disable(&self, agent_id: &str, scope: &str, reason: String) -> Result<()> {
        let mut table = self.inner.lock().await;
        debug!(agent_id, scope, %reason, "disabling agent");
        table
            .entry(agent_id.to_string())
            .or_default()
            .disabled
            .insert(scope.to_string(), reason);
        self.store.save(&table).await
    }

    /// Adds `cost` to today's usage counter and persists the table.
    pub async fn record_usage(&self, agent_id: &str, cost: f64) -> Result<()> {
        let mut table = self.inner.lock().await;
        let state = table.entry(agent_id.to_string()).or_default();
        let today = Utc::now().date_naive();
        if state.usage_date != Some(today) {
            state.usage_date = Some(today);
            state.daily_usage = 0.0;
        }
        state.daily_usage += cost;
        self.store.save(&table).await
    }

    /// Persists the current table unchanged. Used after a failed call that
    /// did not mutate state, keeping one write per attempt.
    pub async fn persist(&self) -> Result<()> {
        let table = self.inner.lock().await;
        self.store.save(&table).await
    }
}
