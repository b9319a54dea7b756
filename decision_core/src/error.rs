//! Error types for the decision core.

use tactical_core::SnapshotError;

use crate::person::PersonId;

/// Result type for decision-core operations.
pub type Result<T> = std::result::Result<T, DecisionError>;

/// Error types for the decision core.
///
/// Vetoes, missing modalities, stale features and "no valid action" are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    /// Corrupted state that makes the agent's pipeline unusable.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A vector did not have the configured length.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The agent hit a fatal error earlier and no longer runs cycles.
    #[error("agent {0} is terminated")]
    AgentTerminated(PersonId),

    #[error("agent not found: {0}")]
    AgentNotFound(PersonId),

    /// An external collaborator could not deliver within the retry budget.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// The snapshot was rejected by the entity tracker.
    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking agent task panicked or was cancelled.
    #[error("agent task failed: {0}")]
    TaskFailed(String),
}

impl DecisionError {
    /// Whether the error ends the agent's pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecisionError::InvariantViolation(_) | DecisionError::DimensionMismatch { .. }
        )
    }
}

impl From<tactical_core::ConfigError> for DecisionError {
    fn from(err: tactical_core::ConfigError) -> Self {
        DecisionError::Configuration(err.to_string())
    }
}
