//! Unified error hierarchy for coachrs
//!
//! Every engine operation returns a typed failure from this taxonomy. Domain
//! functions fail fast and coordinators pass failures through unchanged, so the
//! caller decides how a failure is presented to the athlete.

use thiserror::Error;

/// Top-level error type for all engine operations
#[derive(Debug, Error)]
pub enum CoachError {
    /// Malformed or out-of-range field (negative distance, future-dated log, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Goal and milestone geometry cannot be satisfied
    #[error("Infeasible plan: {0}")]
    InfeasiblePlan(String),

    /// Milestone re-planning could not be applied; the plan was left unchanged
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(String),

    /// The dispatcher has no route for the command kind
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Referenced plan, milestone, injury or profile is absent
    #[error("Not found: {kind} {id}")]
    NotFound { kind: String, id: String },

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Document (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded
    #[error("Corrupt record in {table}: {reason}")]
    Corrupt { table: String, reason: String },

    /// Store lock was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, CoachError>;

impl CoachError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        CoachError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Stable machine-readable code for response payloads
    pub fn code(&self) -> &'static str {
        match self {
            CoachError::InvalidInput(_) => "invalid_input",
            CoachError::InfeasiblePlan(_) => "infeasible_plan",
            CoachError::ReconciliationFailed(_) => "reconciliation_failed",
            CoachError::UnknownCommand(_) => "unknown_command",
            CoachError::NotFound { .. } => "not_found",
            CoachError::Storage(_) => "storage",
            CoachError::Configuration(_) => "configuration",
            CoachError::Io(_) => "io",
        }
    }

    /// Check if error is retryable by the transport layer
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoachError::Storage(StoreError::Sqlite(_)) | CoachError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoachError::InvalidInput(_)
            | CoachError::InfeasiblePlan(_)
            | CoachError::UnknownCommand(_)
            | CoachError::NotFound { .. } => ErrorSeverity::Warning,
            CoachError::ReconciliationFailed(_) => ErrorSeverity::Error,
            CoachError::Configuration(_) | CoachError::Io(_) => ErrorSeverity::Error,
            CoachError::Storage(StoreError::Poisoned) => ErrorSeverity::Critical,
            CoachError::Storage(_) => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CoachError::InfeasiblePlan(reason) => {
                format!("That plan can't be built as requested: {}", reason)
            }
            CoachError::ReconciliationFailed(_) => {
                "Your milestone result couldn't be applied; your plan is unchanged.".to_string()
            }
            CoachError::NotFound { kind, id } => format!("No {} found with id {}", kind, id),
            CoachError::Storage(_) => {
                "Unable to reach training storage. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Rejected request; nothing was changed
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = CoachError::InvalidInput("negative distance".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = CoachError::Storage(StoreError::Poisoned);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CoachError::not_found("milestone", "m1").code(), "not_found");
        assert_eq!(
            CoachError::UnknownCommand("Dance".to_string()).code(),
            "unknown_command"
        );
    }

    #[test]
    fn test_user_messages() {
        let err = CoachError::not_found("injury", "abc");
        assert!(err.user_message().contains("abc"));

        let err = CoachError::ReconciliationFailed("bad pace".to_string());
        assert!(err.user_message().contains("unchanged"));
        assert!(!err.is_retryable());
    }
}
