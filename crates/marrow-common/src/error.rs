//! Error types for MarrowDB.

use thiserror::Error;

/// Result type alias using MarrowError.
pub type Result<T> = std::result::Result<T, MarrowError>;

/// Errors that can occur in MarrowDB operations.
#[derive(Debug, Error)]
pub enum MarrowError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("Page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: u32, reason: String },

    #[error("B+ tree corrupted: {0}")]
    TreeCorrupted(String),

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Page full, unable to insert record")]
    NodeFull,

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    // Catalog errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    // Query errors
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: MarrowError = io_err.into();
        assert!(matches!(err, MarrowError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_page_corrupted_display() {
        let err = MarrowError::PageCorrupted {
            page_id: 100,
            reason: "free_start past free_end".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Page corrupted: 100, reason: free_start past free_end"
        );
    }

    #[test]
    fn test_key_too_large_display() {
        let err = MarrowError::KeyTooLarge { size: 300, max: 256 };
        assert_eq!(err.to_string(), "Key too large: 300 bytes (max 256)");
    }

    #[test]
    fn test_catalog_errors_display() {
        let err = MarrowError::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Table not found: users");

        let err = MarrowError::TableAlreadyExists("orders".to_string());
        assert_eq!(err.to_string(), "Table already exists: orders");
    }

    #[test]
    fn test_query_errors_display() {
        let err = MarrowError::ColumnNotFound("email".to_string());
        assert_eq!(err.to_string(), "Column not found: email");

        let err = MarrowError::PlanError("unsupported plan node: Insert".to_string());
        assert_eq!(err.to_string(), "Plan error: unsupported plan node: Insert");

        let err = MarrowError::ExecutionError("division by zero".to_string());
        assert_eq!(err.to_string(), "Execution error: division by zero");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(MarrowError::Internal("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MarrowError>();
    }
}
