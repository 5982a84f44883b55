//! Read predicates.

use std::fmt;
use tasksync_core::{OwnerScope, SyncableRecord};

type Predicate = Box<dyn Fn(&SyncableRecord) -> bool + Send + Sync>;

/// Narrows a [`crate::LocalStore::query`].
///
/// Tombstoned rows are excluded by the store before the filter runs.
#[derive(Default)]
pub struct RecordFilter {
    scope: Option<OwnerScope>,
    predicate: Option<Predicate>,
}

impl RecordFilter {
    /// Matches every live record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches live records owned by `scope`.
    #[must_use]
    pub fn scope(scope: OwnerScope) -> Self {
        Self {
            scope: Some(scope),
            predicate: None,
        }
    }

    /// Adds an arbitrary predicate.
    #[must_use]
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SyncableRecord) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Returns true if `record` passes the filter.
    pub fn matches(&self, record: &SyncableRecord) -> bool {
        if self.scope.is_some_and(|scope| record.scope != scope) {
            return false;
        }
        self.predicate.as_ref().map_or(true, |p| p(record))
    }
}

impl fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordFilter")
            .field("scope", &self.scope)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
