//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A session name was empty or contained a path separator
    #[error("Invalid session name: {name:?} ({reason})")]
    InvalidSessionName { name: String, reason: String },

    /// A patchbay name was empty or tried to escape its directory
    #[error("Invalid patchbay name: {name:?}")]
    InvalidPatchbayName { name: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_session_name_display() {
        let err = DomainError::InvalidSessionName {
            name: "a/b".to_string(),
            reason: "contains '/'".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("Invalid session name"));
        assert!(display.contains("a/b"));
    }
}
