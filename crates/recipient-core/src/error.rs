use thiserror::Error;

/// Recipient dashboard errors.
///
/// Cloneable so controllers can keep the last page-level or localized error
/// alongside the retained view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DashboardError {
    #[error("Remote call '{operation}' failed: {message}")]
    Network { operation: String, message: String },

    #[error("Anticipation limit unavailable: {0}")]
    PartialDegradation(String),

    #[error("Schema violation in {context}: {message}")]
    Schema { context: String, message: String },

    #[error("Bank account '{account_id}' created but not linked to the recipient: {message}")]
    AccountLinkPending { account_id: String, message: String },

    #[error("Cancellation acknowledged '{actual}' while '{expected}' was pending")]
    AcknowledgementMismatch { expected: String, actual: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error("Recipient view is not loaded")]
    NotLoaded,

    #[error("Export failed: {0}")]
    Export(String),
}

impl DashboardError {
    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn schema(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn stage_violation(expected: &str, actual: &str) -> Self {
        Self::InvariantViolation(format!(
            "stage order violation: expected '{}', got '{}'",
            expected, actual
        ))
    }
}
