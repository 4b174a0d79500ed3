//! Error types for head-node adapters
//!
//! Stream failures stay typed as the pipeline's `E`; this module only
//! defines the taxonomy the built-in adapters map their platform errors
//! into at the boundary.

use thiserror::Error;

/// Failures surfaced by the built-in head-node adapters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The stage's deadline elapsed without an event
    #[error("Operation timed out")]
    Timeout,

    /// The underlying source closed before producing a result
    #[error("Source closed: {0}")]
    Closed(String),

    /// A background bridge task failed
    #[error("Task error: {0}")]
    Task(String),

    /// The data source reported a load failure
    #[error("Load failed: {0}")]
    Load(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(SourceError::Timeout.to_string(), "Operation timed out");
        assert_eq!(
            SourceError::Load("dns".to_string()).to_string(),
            "Load failed: dns"
        );
    }
}
