//! Conflict detection and resolution.
//!
//! A conflict exists when a row carries unpushed local edits and the remote
//! has also advanced past the last sync. The policy is whole-record
//! last-writer-wins: the side whose edit was made later keeps all of its
//! fields and the other edit is discarded. There is no field-level merge.
//!
//! Edits are compared by the client time they were made at, not by the
//! server's `updated_at`, which only orders arrivals at the backend.

use tasksync_core::{Collection, RecordId, SyncMeta, Timestamp};

/// Outcome of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local fields; the row stays dirty and is pushed.
    KeepLocal,
    /// Overwrite the local row with the remote fields.
    AcceptRemote,
    /// The remote tombstoned the row; delete it locally.
    ApplyTombstone,
}

impl ConflictResolution {
    /// Returns true if the remote side won.
    pub fn remote_wins(&self) -> bool {
        !matches!(self, ConflictResolution::KeepLocal)
    }
}

/// A detected conflict and how it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Collection of the row.
    pub collection: Collection,
    /// Row id.
    pub id: RecordId,
    /// Local mutation time at detection.
    pub local_updated_at: Timestamp,
    /// Remote modification time at detection.
    pub remote_updated_at: Timestamp,
    /// Client time of the edit the remote version carries.
    pub remote_edited_at: Timestamp,
    /// True if the remote version is a tombstone.
    pub remote_deleted: bool,
    /// Applied resolution.
    pub resolution: ConflictResolution,
}

impl Conflict {
    /// Detects and resolves a conflict between a local row and an incoming
    /// remote version.
    ///
    /// Returns `None` when there is nothing to resolve: the local row is
    /// clean, or the remote has not moved past the last sync.
    pub fn detect(
        collection: Collection,
        id: RecordId,
        local: &SyncMeta,
        remote_updated_at: Timestamp,
        remote_edited_at: Timestamp,
        remote_deleted: bool,
    ) -> Option<Self> {
        if !local.is_dirty() || !local.remote_advanced(remote_updated_at) {
            return None;
        }
        Some(Self {
            collection,
            id,
            local_updated_at: local.local_updated_at,
            remote_updated_at,
            remote_edited_at,
            remote_deleted,
            resolution: resolve_conflict(local, remote_edited_at, remote_deleted),
        })
    }
}

/// Applies the last-writer-wins rule.
///
/// - A remote tombstone always wins.
/// - A local tombstone beats a remote edit, so the delete is pushed.
/// - Otherwise the later edit wins; a tie goes to the remote, since every
///   device sees the same remote value.
pub fn resolve_conflict(
    local: &SyncMeta,
    remote_edited_at: Timestamp,
    remote_deleted: bool,
) -> ConflictResolution {
    if remote_deleted {
        return ConflictResolution::ApplyTombstone;
    }
    if local.is_deleted() || local.local_updated_at > remote_edited_at {
        ConflictResolution::KeepLocal
    } else {
        ConflictResolution::AcceptRemote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dirty(local: u64, synced: u64) -> SyncMeta {
        SyncMeta {
            local_updated_at: Timestamp(local),
            remote_updated_at: Some(Timestamp(synced)),
            synced_at: Some(Timestamp(synced)),
            deleted_at: None,
        }
    }

    #[test]
    fn newer_local_wins() {
        // Device edited at 150, remote moved to 141 since sync at 101.
        let meta = dirty(150, 101);
        assert_eq!(
            resolve_conflict(&meta, Timestamp(141), false),
            ConflictResolution::KeepLocal
        );
    }

    #[test]
    fn newer_remote_wins() {
        let meta = dirty(120, 101);
        assert_eq!(
            resolve_conflict(&meta, Timestamp(141), false),
            ConflictResolution::AcceptRemote
        );
    }

    #[test]
    fn tie_goes_to_remote() {
        let meta = dirty(141, 101);
        assert_eq!(
            resolve_conflict(&meta, Timestamp(141), false),
            ConflictResolution::AcceptRemote
        );
    }

    #[test]
    fn remote_tombstone_beats_newer_edit() {
        let meta = dirty(500, 101);
        let resolution = resolve_conflict(&meta, Timestamp(141), true);
        assert_eq!(resolution, ConflictResolution::ApplyTombstone);
        assert!(resolution.remote_wins());
    }

    #[test]
    fn local_tombstone_beats_remote_edit() {
        let mut meta = dirty(120, 101);
        meta.deleted_at = Some(Timestamp(120));
        assert_eq!(
            resolve_conflict(&meta, Timestamp(141), false),
            ConflictResolution::KeepLocal
        );
    }

    #[test]
    fn detect_requires_both_sides_to_move() {
        let id = RecordId::new();

        let clean = SyncMeta {
            local_updated_at: Timestamp(101),
            remote_updated_at: Some(Timestamp(101)),
            synced_at: Some(Timestamp(101)),
            deleted_at: None,
        };
        let at = Timestamp(141);
        assert!(Conflict::detect(Collection::Tasks, id, &clean, at, at, false).is_none());

        let stale_remote = dirty(150, 141);
        assert!(Conflict::detect(Collection::Tasks, id, &stale_remote, at, at, false).is_none());

        let conflict = Conflict::detect(
            Collection::Tasks,
            id,
            &dirty(150, 101),
            Timestamp(141),
            Timestamp(140),
            false,
        )
        .unwrap();
        assert_eq!(conflict.resolution, ConflictResolution::KeepLocal);
        assert_eq!(conflict.local_updated_at, Timestamp(150));
    }

    #[test]
    fn late_arrival_does_not_beat_later_edit() {
        // Remote edit made at 140 but stamped 160 on arrival; the local
        // edit at 150 is the later one.
        let id = RecordId::new();
        let conflict = Conflict::detect(
            Collection::Tasks,
            id,
            &dirty(150, 101),
            Timestamp(160),
            Timestamp(140),
            false,
        )
        .unwrap();
        assert_eq!(conflict.resolution, ConflictResolution::KeepLocal);
        assert_eq!(conflict.remote_updated_at, Timestamp(160));
        assert_eq!(conflict.remote_edited_at, Timestamp(140));

        // And the other way round: remote edit at 150 arriving at 160 beats
        // a local edit at 140.
        let conflict = Conflict::detect(
            Collection::Tasks,
            id,
            &dirty(140, 101),
            Timestamp(160),
            Timestamp(150),
            false,
        )
        .unwrap();
        assert_eq!(conflict.resolution, ConflictResolution::AcceptRemote);
    }

    proptest! {
        #[test]
        fn resolution_is_order_independent(local in 1u64..10_000, remote in 1u64..10_000) {
            // Two devices holding the opposite versions agree on the winner.
            let on_a = resolve_conflict(&dirty(local, 0), Timestamp(remote), false);
            let on_b = resolve_conflict(&dirty(remote, 0), Timestamp(local), false);
            let winner_a = if on_a.remote_wins() { remote } else { local };
            let winner_b = if on_b.remote_wins() { local } else { remote };
            prop_assert_eq!(winner_a, winner_b);
        }

        #[test]
        fn remote_tombstone_always_applies(local in 0u64..10_000, remote in 0u64..10_000) {
            prop_assert_eq!(
                resolve_conflict(&dirty(local, 0), Timestamp(remote), true),
                ConflictResolution::ApplyTombstone
            );
        }
    }
}
