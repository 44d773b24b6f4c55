//! Scrivener engine — the core orchestration engine that turns a personal
//! profile plus a target job into tailored, reviewed, rendered application
//! documents (resumes and cover letters).
//!
//! The engine is transport-agnostic: callers invoke it with already
//! authenticated, validated parameters. Persistence, profile data, prompt
//! templates and rendering are reached through the narrow traits in
//! [`stores`]; AI text generation goes through the fallback-chain
//! [`agents::AgentOrchestrator`]; untrusted model output passes through
//! [`recovery`] and [`grounding`] before it can ever reach a human.

pub mod agents;
pub mod config;
pub mod errors;
pub mod fit;
pub mod grounding;
pub mod models;
pub mod recovery;
pub mod stores;
pub mod workflow;

pub use config::EngineConfig;
pub use errors::{EngineError, EngineResult};
pub use workflow::WorkflowEngine;
