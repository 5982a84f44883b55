//! Table-row mapping adapter.
//!
//! Each collection maps to a remote table keyed by `id`, with a
//! server-maintained `updated_at`, a client-supplied `edited_at`, a `scope`
//! column used for filtering and authorization, a nullable `deleted_at`,
//! and one column per field.
//!
//! Older clients wrote camelCase column names. This module is the only
//! place that knows about them: decoding folds legacy spellings into the
//! canonical snake_case schema, and encoding only ever emits the canonical
//! names.

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tasksync_core::{
    Collection, EntityBody, OwnerScope, RecordId, SyncMeta, SyncableRecord, Timestamp,
};

/// Legacy column spellings and their canonical names.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("projectId", "project_id"),
    ("dueAt", "due_at"),
    ("labelIds", "label_ids"),
    ("blockedBy", "blocked_by"),
    ("isArchived", "archived"),
];

/// One row of a remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRow {
    /// Primary key.
    pub id: RecordId,
    /// Owner scope column.
    pub scope: OwnerScope,
    /// Server-maintained modification time.
    #[serde(alias = "updatedAt")]
    pub updated_at: Timestamp,
    /// Client time of the edit the row carries. Missing on rows written by
    /// older clients, which fall back to `updated_at`.
    #[serde(default, alias = "editedAt", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    /// Tombstone column.
    #[serde(default, alias = "deletedAt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    /// Field columns.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WireRow {
    /// Encodes a record's canonical fields as a row.
    ///
    /// `updated_at` carries the record's last known remote time; the
    /// backend replaces it on write.
    pub fn from_record(record: &SyncableRecord) -> Result<Self, WireError> {
        let encoded = match &record.body {
            EntityBody::Project(fields) => serde_json::to_value(fields),
            EntityBody::Task(fields) => serde_json::to_value(fields),
            EntityBody::Label(fields) => serde_json::to_value(fields),
        }
        .map_err(|e| WireError::Encode {
            id: record.id,
            message: e.to_string(),
        })?;

        let Value::Object(fields) = encoded else {
            return Err(WireError::Encode {
                id: record.id,
                message: "fields did not encode to an object".into(),
            });
        };

        Ok(Self {
            id: record.id,
            scope: record.scope,
            updated_at: record.meta.remote_updated_at.unwrap_or_default(),
            edited_at: Some(record.meta.local_updated_at),
            deleted_at: record.meta.deleted_at,
            fields,
        })
    }

    /// Returns true if the row is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Decodes the row into a record of `collection`.
    ///
    /// The record comes back with the row's authoritative `updated_at` as
    /// its remote time, the edit time as its local time, and no
    /// `synced_at`; the engine decides how it lands locally.
    pub fn into_record(self, collection: Collection) -> Result<SyncableRecord, WireError> {
        let id = self.id;
        let mut fields = self.fields;
        normalize_columns(&mut fields);
        let value = Value::Object(fields);

        let invalid = |e: serde_json::Error| WireError::InvalidRow {
            collection,
            id,
            message: e.to_string(),
        };
        let body = match collection {
            Collection::Projects => EntityBody::Project(serde_json::from_value(value).map_err(invalid)?),
            Collection::Tasks => EntityBody::Task(serde_json::from_value(value).map_err(invalid)?),
            Collection::Labels => EntityBody::Label(serde_json::from_value(value).map_err(invalid)?),
        };

        Ok(SyncableRecord {
            id,
            scope: self.scope,
            body,
            meta: SyncMeta {
                local_updated_at: self.edited_at.unwrap_or(self.updated_at),
                remote_updated_at: Some(self.updated_at),
                synced_at: None,
                deleted_at: self.deleted_at,
            },
        })
    }
}

/// Folds legacy column names into canonical ones. The canonical column
/// wins when both are present.
fn normalize_columns(fields: &mut Map<String, Value>) {
    for (legacy, canonical) in FIELD_ALIASES {
        if let Some(value) = fields.remove(*legacy) {
            if !fields.contains_key(*canonical) {
                fields.insert((*canonical).to_string(), value);
            }
        }
    }
}
