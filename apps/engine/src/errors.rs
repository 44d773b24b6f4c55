use thiserror::Error;

use crate::agents::OrchestratorError;
use crate::models::request::DocumentType;
use crate::recovery::RecoveryError;

pub type EngineResult<T> = Result<T, EngineError>;

/// The one stable message shown to users for anything not classified as
/// safe to surface verbatim.
pub const GENERIC_STEP_MESSAGE: &str =
    "An unexpected error occurred while processing this step.";

/// Engine-level error type.
///
/// Variants split into two families: classified user-facing conditions
/// (preconditions, availability, review-protocol violations, parse
/// failures) whose messages surface verbatim, and internal failures that
/// collapse to [`GENERIC_STEP_MESSAGE`] via [`EngineError::user_message`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Precondition(String),

    #[error("generation request not found")]
    RequestNotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("maximum revision attempts reached for the {doc_type} draft ({attempts} used)")]
    RevisionLimit { doc_type: DocumentType, attempts: u32 },

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("render failed: {0}")]
    Render(String),

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Short stable identifier recorded in `StepError.code`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Precondition(_) => "precondition_failed",
            EngineError::RequestNotFound => "request_not_found",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::RevisionLimit { .. } => "revision_limit",
            EngineError::Orchestrator(OrchestratorError::ChainNotConfigured(_)) => {
                "chain_not_configured"
            }
            EngineError::Orchestrator(OrchestratorError::NoAgentsAvailable { .. }) => {
                "no_agents_available"
            }
            EngineError::Orchestrator(OrchestratorError::ChainAborted { .. }) => "chain_aborted",
            EngineError::Recovery(RecoveryError::Parse(_)) => "output_parse_failed",
            EngineError::Recovery(RecoveryError::Schema { .. }) => "output_schema_failed",
            EngineError::Render(_) => "render_failed",
            EngineError::Storage(_) => "storage_failed",
            EngineError::Internal(_) => "internal_error",
        }
    }

    /// The message safe to show a user.
    ///
    /// Classified conditions pass through verbatim; raw internal text
    /// (backend bodies, store errors, panic-adjacent detail) never leaks.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Precondition(msg) | EngineError::InvalidState(msg) => msg.clone(),
            EngineError::RequestNotFound | EngineError::RevisionLimit { .. } => self.to_string(),
            EngineError::Orchestrator(
                err @ (OrchestratorError::ChainNotConfigured(_)
                | OrchestratorError::NoAgentsAvailable { .. }),
            ) => err.to_string(),
            EngineError::Recovery(err) => err.to_string(),
            EngineError::Orchestrator(OrchestratorError::ChainAborted { .. })
            | EngineError::Render(_)
            | EngineError::Storage(_)
            | EngineError::Internal(_) => GENERIC_STEP_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message_passes_verbatim() {
        let err = EngineError::Precondition("No profile found.".to_string());
        assert_eq!(err.user_message(), "No profile found.");
        assert_eq!(err.code(), "precondition_failed");
    }

    #[test]
    fn test_internal_errors_collapse_to_generic_message() {
        let err = EngineError::Storage("connection reset by peer at 10.0.0.3".to_string());
        assert_eq!(err.user_message(), GENERIC_STEP_MESSAGE);

        let err = EngineError::Render("latexmk exited with code 12".to_string());
        assert_eq!(err.user_message(), GENERIC_STEP_MESSAGE);
    }

    #[test]
    fn test_revision_limit_names_the_document() {
        let err = EngineError::RevisionLimit {
            doc_type: DocumentType::Resume,
            attempts: 3,
        };
        assert!(err.user_message().contains("maximum revision attempts"));
        assert!(err.user_message().contains("resume"));
    }
}
