//! Error types for record storage.

use thiserror::Error;

/// Errors that can occur in a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record fields are out of range or otherwise unusable.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be read back.
    #[error("corrupt store at line {line}: {reason}")]
    Corrupt {
        /// 1-based line number in the backing file
        line: usize,
        /// What was wrong with the line
        reason: String,
    },

    /// The schema has not been created yet.
    #[error("store schema has not been created")]
    SchemaMissing,
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = StoreError::InvalidRecord("log level 9 is outside 2..=6".to_string());
        assert_eq!(err.to_string(), "invalid record: log level 9 is outside 2..=6");

        let err = StoreError::Corrupt {
            line: 3,
            reason: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "corrupt store at line 3: expected value");

        let err = StoreError::SchemaMissing;
        assert_eq!(err.to_string(), "store schema has not been created");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: StoreError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn error_serde_conversion() {
        let json_err = serde_json::from_str::<u32>("nope").err();
        let err = json_err.map(StoreError::from);
        assert!(matches!(err, Some(StoreError::Serialization(_))));
    }
}
