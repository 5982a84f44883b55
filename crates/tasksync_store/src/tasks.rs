//! Blocked-by editing helpers.
//!
//! These are the entry points the presentation layer uses to edit task
//! dependencies. Cycle checks run before anything reaches the store.

use crate::error::{StoreError, StoreResult};
use crate::filter::RecordFilter;
use crate::store::{LocalStore, WriteOrigin};
use tasksync_core::{Collection, DependencyGraph, OwnerScope, RecordId, SyncableRecord, ValidationError};

/// Builds the blocked-by graph of a scope's live tasks.
pub fn dependency_graph<S: LocalStore + ?Sized>(
    store: &S,
    scope: OwnerScope,
) -> StoreResult<DependencyGraph> {
    let tasks = store.query(Collection::Tasks, &RecordFilter::scope(scope))?;
    Ok(DependencyGraph::from_edges(tasks.iter().filter_map(|record| {
        record.as_task().map(|task| (record.id, &task.blocked_by))
    })))
}

/// Marks `task` as blocked by `blocker`.
///
/// # Errors
///
/// - `NotFound` if `task` does not exist
/// - `Validation(UnknownTask)` if `blocker` does not exist
/// - `Validation(SelfDependency | DependencyCycle)` if the edge would
///   close a cycle; nothing is written in that case
pub fn add_blocker<S: LocalStore + ?Sized>(
    store: &S,
    task: RecordId,
    blocker: RecordId,
) -> StoreResult<SyncableRecord> {
    let mut record = load_task(store, task)?;
    if task != blocker && store.get(Collection::Tasks, blocker)?.is_none() {
        return Err(ValidationError::UnknownTask(blocker).into());
    }

    dependency_graph(store, record.scope)?.check_edge(task, blocker)?;

    if let Some(fields) = record.body.as_task_mut() {
        if !fields.blocked_by.insert(blocker) {
            return Ok(record);
        }
    }
    store.upsert(record, WriteOrigin::Local)
}

/// Removes `blocker` from `task`'s blockers. Removing an absent edge is a
/// no-op.
pub fn remove_blocker<S: LocalStore + ?Sized>(
    store: &S,
    task: RecordId,
    blocker: RecordId,
) -> StoreResult<SyncableRecord> {
    let mut record = load_task(store, task)?;
    let removed = record
        .body
        .as_task_mut()
        .is_some_and(|fields| fields.blocked_by.remove(&blocker));
    if !removed {
        return Ok(record);
    }
    store.upsert(record, WriteOrigin::Local)
}

fn load_task<S: LocalStore + ?Sized>(store: &S, id: RecordId) -> StoreResult<SyncableRecord> {
    store
        .get(Collection::Tasks, id)?
        .ok_or(StoreError::NotFound {
            collection: Collection::Tasks,
            id,
        })
}
