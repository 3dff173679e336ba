//! Domain error types
//!
//! Errors raised while constructing or validating domain values such as
//! remote folder paths and artifact names.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid local path (no file name, not UTF-8, ...)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote folder path
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid remote folder identifier
    #[error("Invalid folder ID: {0}")]
    InvalidFolderId(String),

    /// Invalid pipeline state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("/bad/path".to_string());
        assert_eq!(err.to_string(), "Invalid path: /bad/path");

        let err = DomainError::InvalidState {
            from: "Settling".to_string(),
            to: "Guarded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Settling to Guarded"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidRemotePath("a".to_string());
        let err2 = DomainError::InvalidRemotePath("a".to_string());
        let err3 = DomainError::InvalidFolderId("a".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
