use thiserror::Error;

/// Enumeration of errors surfaced by resource lifecycle managers.
///
/// Initialization outcomes are cached and handed to every caller, so this type is `Clone`.
/// Driver errors are not, and are kept as their rendered message with added context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{resource} health check failed: {reason}")]
    Connectivity {
        resource: &'static str,
        reason: String,
    },
    #[error("{resource} {operation} failed: {reason}")]
    Operation {
        resource: &'static str,
        operation: &'static str,
        reason: String,
    },
    #[error("{0} has been shut down")]
    Closed(&'static str),
}

impl LifecycleError {
    pub fn connectivity(resource: &'static str, reason: impl ToString) -> Self {
        LifecycleError::Connectivity {
            resource,
            reason: reason.to_string(),
        }
    }

    pub fn operation(resource: &'static str, operation: &'static str, reason: impl ToString) -> Self {
        LifecycleError::Operation {
            resource,
            operation,
            reason: reason.to_string(),
        }
    }

    /// Label used when recording metrics for a failed outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Configuration(_) => "configuration",
            LifecycleError::Connectivity { .. } => "connectivity",
            LifecycleError::Operation { .. } => "operation",
            LifecycleError::Closed(_) => "closed",
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
