//! Error types for snapshot ingestion and configuration loading.

/// Result type for snapshot ingestion.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Reasons a snapshot is rejected by the tracker.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A required field is absent.
    #[error("malformed snapshot: missing required field `{0}`")]
    MissingField(&'static str),

    /// A required numeric field is NaN or infinite.
    #[error("malformed snapshot: field `{0}` is not a finite number")]
    NonFinite(&'static str),

    /// Timestamp does not advance past the last accepted snapshot.
    #[error("out-of-order snapshot: timestamp {timestamp} <= last accepted {last_accepted}")]
    OutOfOrder { timestamp: f64, last_accepted: f64 },

    /// Payload is not valid JSON for a snapshot.
    #[error("failed to parse snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Whether this rejection counts as a malformed snapshot (as opposed to ordering).
    pub fn is_malformed(&self) -> bool {
        !matches!(self, SnapshotError::OutOfOrder { .. })
    }
}

/// Errors raised while loading tactical configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
