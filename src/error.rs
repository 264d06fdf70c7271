//! Error types for the Marginalia annotation workspace
//!
//! This module provides structured error definitions using thiserror, with
//! anyhow used for propagation at the binary boundary.

use thiserror::Error;

/// Main error type for Marginalia operations
#[derive(Error, Debug)]
pub enum MarginaliaError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid annotation ID format
    #[error("Invalid annotation ID: {0}")]
    InvalidAnnotationId(#[from] uuid::Error),

    /// File content could not be interpreted as text
    #[error("Not a text document: {0}")]
    NotText(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Marginalia operations
pub type Result<T> = std::result::Result<T, MarginaliaError>;

/// Convert anyhow::Error to MarginaliaError
impl From<anyhow::Error> for MarginaliaError {
    fn from(err: anyhow::Error) -> Self {
        MarginaliaError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MarginaliaError::NotText("notes.bin".to_string());
        assert_eq!(err.to_string(), "Not a text document: notes.bin");
    }

    #[test]
    fn test_error_conversion() {
        let uuid_err = uuid::Uuid::parse_str("invalid");
        assert!(uuid_err.is_err());

        let err: MarginaliaError = uuid_err.unwrap_err().into();
        assert!(matches!(err, MarginaliaError::InvalidAnnotationId(_)));
    }
}
