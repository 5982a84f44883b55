//! Row tables.

use crate::error::{ServiceError, ServiceResult};
use std::collections::{HashMap, HashSet};
use tasksync_core::{Collection, OwnerScope, RecordId, Timestamp};
use tasksync_protocol::{ChangeType, WireRow};

/// Every table of the service plus the `updated_at` sequence.
///
/// Not synchronized; the service wraps it in a lock.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    rows: HashMap<(Collection, RecordId), WireRow>,
    /// Ids deleted before the service ever stored them.
    graveyard: HashSet<(Collection, RecordId)>,
    last_updated: Timestamp,
}

impl Tables {
    /// Issues the next `updated_at`, strictly greater than any issued
    /// before.
    fn next_timestamp(&mut self, now: Timestamp) -> Timestamp {
        let ts = now.max(self.last_updated.next());
        self.last_updated = ts;
        ts
    }

    fn check_writable(
        &self,
        collection: Collection,
        id: RecordId,
        scope: OwnerScope,
    ) -> ServiceResult<Option<&WireRow>> {
        if self.graveyard.contains(&(collection, id)) {
            return Err(ServiceError::Deleted { collection, id });
        }
        let existing = self.rows.get(&(collection, id));
        if let Some(row) = existing {
            if row.is_deleted() {
                return Err(ServiceError::Deleted { collection, id });
            }
            if row.scope != scope {
                return Err(ServiceError::ScopeChanged { collection, id });
            }
        }
        Ok(existing)
    }

    /// Creates or replaces a live row.
    pub(crate) fn upsert(
        &mut self,
        collection: Collection,
        mut row: WireRow,
        now: Timestamp,
    ) -> ServiceResult<(Timestamp, ChangeType)> {
        let change = match self.check_writable(collection, row.id, row.scope)? {
            Some(_) => ChangeType::Update,
            None => ChangeType::Insert,
        };
        let ts = self.next_timestamp(now);
        row.updated_at = ts;
        row.deleted_at = None;
        self.rows.insert((collection, row.id), row);
        Ok((ts, change))
    }

    /// Tombstones a row. Returns whether a stored row was affected.
    pub(crate) fn delete(
        &mut self,
        collection: Collection,
        scope: OwnerScope,
        id: RecordId,
        now: Timestamp,
    ) -> ServiceResult<(Timestamp, bool)> {
        let stored = self.check_writable(collection, id, scope)?.is_some();
        let ts = self.next_timestamp(now);
        match self.rows.get_mut(&(collection, id)) {
            Some(row) => {
                row.updated_at = ts;
                row.deleted_at = Some(ts);
            }
            None => {
                self.graveyard.insert((collection, id));
            }
        }
        Ok((ts, stored))
    }

    /// Returns a scope's rows with `updated_at > since`, ascending.
    pub(crate) fn since(
        &self,
        collection: Collection,
        scope: OwnerScope,
        since: Option<Timestamp>,
    ) -> Vec<WireRow> {
        let mut rows: Vec<WireRow> = self
            .rows
            .iter()
            .filter(|((c, _), row)| {
                *c == collection && row.scope == scope && since.map_or(true, |s| row.updated_at > s)
            })
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|row| row.updated_at);
        rows
    }

    pub(crate) fn get(&self, collection: Collection, id: RecordId) -> Option<&WireRow> {
        self.rows.get(&(collection, id))
    }

    pub(crate) fn len(&self, collection: Collection) -> usize {
        self.rows.keys().filter(|(c, _)| *c == collection).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use uuid::Uuid;

    fn row(id: RecordId, scope: OwnerScope) -> WireRow {
        let mut fields = Map::new();
        fields.insert("name".into(), json!("Errands"));
        WireRow {
            id,
            scope,
            updated_at: Timestamp::ZERO,
            edited_at: None,
            deleted_at: None,
            fields,
        }
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mut tables = Tables::default();
        let scope = OwnerScope::User(Uuid::new_v4());

        let (a, change) = tables
            .upsert(Collection::Labels, row(RecordId::new(), scope), Timestamp(50))
            .unwrap();
        assert_eq!(change, ChangeType::Insert);
        // Clock stepped backwards; the sequence does not.
        let (b, _) = tables
            .upsert(Collection::Labels, row(RecordId::new(), scope), Timestamp(10))
            .unwrap();
        assert_eq!(a, Timestamp(50));
        assert_eq!(b, Timestamp(51));
    }

    #[test]
    fn since_filters_and_orders() {
        let mut tables = Tables::default();
        let scope = OwnerScope::User(Uuid::new_v4());
        let other = OwnerScope::User(Uuid::new_v4());
        let first = RecordId::new();
        let second = RecordId::new();

        tables.upsert(Collection::Labels, row(first, scope), Timestamp(1)).unwrap();
        tables.upsert(Collection::Labels, row(RecordId::new(), other), Timestamp(2)).unwrap();
        tables.upsert(Collection::Labels, row(second, scope), Timestamp(3)).unwrap();
        // Touch `first` again so it sorts last.
        tables.upsert(Collection::Labels, row(first, scope), Timestamp(4)).unwrap();

        let all = tables.since(Collection::Labels, scope, None);
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(tables.since(Collection::Labels, scope, Some(Timestamp(3))).len(), 1);
        assert!(tables.since(Collection::Tasks, scope, None).is_empty());
    }

    #[test]
    fn writes_to_tombstones_conflict() {
        let mut tables = Tables::default();
        let scope = OwnerScope::User(Uuid::new_v4());
        let id = RecordId::new();

        tables.upsert(Collection::Labels, row(id, scope), Timestamp(1)).unwrap();
        let (ts, stored) = tables.delete(Collection::Labels, scope, id, Timestamp(2)).unwrap();
        assert!(stored);
        assert_eq!(tables.get(Collection::Labels, id).unwrap().deleted_at, Some(ts));

        assert_eq!(
            tables.upsert(Collection::Labels, row(id, scope), Timestamp(3)),
            Err(ServiceError::Deleted { collection: Collection::Labels, id })
        );
        assert!(matches!(
            tables.delete(Collection::Labels, scope, id, Timestamp(3)),
            Err(ServiceError::Deleted { .. })
        ));
    }

    #[test]
    fn delete_of_unknown_id_is_remembered() {
        let mut tables = Tables::default();
        let scope = OwnerScope::User(Uuid::new_v4());
        let id = RecordId::new();

        let (_, stored) = tables.delete(Collection::Tasks, scope, id, Timestamp(1)).unwrap();
        assert!(!stored);
        assert_eq!(tables.len(Collection::Tasks), 0);
        assert!(matches!(
            tables.upsert(Collection::Tasks, row(id, scope), Timestamp(2)),
            Err(ServiceError::Deleted { .. })
        ));
    }

    #[test]
    fn scope_mismatch_conflicts() {
        let mut tables = Tables::default();
        let id = RecordId::new();
        tables
            .upsert(Collection::Labels, row(id, OwnerScope::User(Uuid::new_v4())), Timestamp(1))
            .unwrap();

        let moved = row(id, OwnerScope::Team(Uuid::new_v4()));
        assert_eq!(
            tables.upsert(Collection::Labels, moved, Timestamp(2)),
            Err(ServiceError::ScopeChanged { collection: Collection::Labels, id })
        );
    }
}
