//! Error types for local store operations.

use tasksync_core::{Collection, RecordId, ValidationError};
use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during local store operations.
///
/// A read miss is not an error: [`crate::LocalStore::get`] returns `None`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write targeted a row that does not exist.
    #[error("no {collection} record with id {id}")]
    NotFound {
        /// Collection searched.
        collection: Collection,
        /// Missing id.
        id: RecordId,
    },

    /// A local write targeted a tombstoned id. Ids are never reused.
    #[error("{collection} record {id} has been deleted")]
    Tombstoned {
        /// Collection of the row.
        collection: Collection,
        /// Tombstoned id.
        id: RecordId,
    },

    /// The write was rejected before persistence.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The underlying datastore failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if the error was raised by validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let id = RecordId::new();
        let err = StoreError::NotFound {
            collection: Collection::Tasks,
            id,
        };
        assert_eq!(err.to_string(), format!("no tasks record with id {id}"));
    }

    #[test]
    fn validation_classification() {
        let err: StoreError = ValidationError::EmptyField { field: "name" }.into();
        assert!(err.is_validation());
        assert!(!StoreError::Backend("disk full".into()).is_validation());
    }
}
