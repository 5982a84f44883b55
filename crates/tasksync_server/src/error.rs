//! Error types for the hosted backend.

use tasksync_core::{Collection, OwnerScope, RecordId};
use tasksync_protocol::{ConflictReason, RemoteError, WireError};
use thiserror::Error;
use uuid::Uuid;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The service is unreachable (fault injection).
    #[error("service offline")]
    Offline,

    /// The session has been revoked.
    #[error("session for user {0} is no longer valid")]
    SessionRevoked(Uuid),

    /// The session may not touch the scope.
    #[error("user {user} may not access scope {scope}")]
    Forbidden {
        /// Session user.
        user: Uuid,
        /// Requested scope.
        scope: OwnerScope,
    },

    /// The row is tombstoned.
    #[error("{collection} row {id} is deleted")]
    Deleted {
        /// Collection of the row.
        collection: Collection,
        /// Row id.
        id: RecordId,
    },

    /// The row belongs to a different scope.
    #[error("{collection} row {id} belongs to another scope")]
    ScopeChanged {
        /// Collection of the row.
        collection: Collection,
        /// Row id.
        id: RecordId,
    },

    /// A row could not be mapped.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl ServiceError {
    /// Returns true if the caller sent something the service refuses.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Offline)
    }
}

impl From<ServiceError> for RemoteError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Offline => RemoteError::NetworkUnavailable(err.to_string()),
            ServiceError::SessionRevoked(_) | ServiceError::Forbidden { .. } => {
                RemoteError::Unauthorized(err.to_string())
            }
            ServiceError::Deleted { collection, id } => RemoteError::Conflict {
                collection,
                id,
                reason: ConflictReason::Deleted,
            },
            ServiceError::ScopeChanged { collection, id } => RemoteError::Conflict {
                collection,
                id,
                reason: ConflictReason::ScopeChanged,
            },
            ServiceError::Wire(wire) => RemoteError::Wire(wire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_into_remote_taxonomy() {
        assert!(matches!(
            RemoteError::from(ServiceError::Offline),
            RemoteError::NetworkUnavailable(_)
        ));
        assert!(RemoteError::from(ServiceError::SessionRevoked(Uuid::new_v4())).is_unauthorized());

        let id = RecordId::new();
        assert_eq!(
            RemoteError::from(ServiceError::Deleted {
                collection: Collection::Tasks,
                id
            }),
            RemoteError::Conflict {
                collection: Collection::Tasks,
                id,
                reason: ConflictReason::Deleted,
            }
        );
    }

    #[test]
    fn error_classification() {
        assert!(!ServiceError::Offline.is_client_error());
        assert!(ServiceError::SessionRevoked(Uuid::new_v4()).is_client_error());
    }
}
