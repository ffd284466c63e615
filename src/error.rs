//! Error types for the file store.

use crate::transaction::TransactionState;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not encodable: {0}")]
    NotEncodable(String),

    #[error("Record {record_type}/{id} not decodable: {reason}")]
    NotDecodable {
        record_type: String,
        id: String,
        reason: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Transaction already {0}")]
    TransactionClosed(TransactionState),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl StoreError {
    /// Build a decode error for the record at `record_type/id`.
    pub fn not_decodable(record_type: &str, id: &str, reason: impl ToString) -> Self {
        StoreError::NotDecodable {
            record_type: record_type.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
