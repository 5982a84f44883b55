//! Core type definitions for tasksync.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A point in time, in milliseconds since the Unix epoch.
///
/// Local mutation timestamps and server-assigned `updated_at` values share
/// this representation so last-writer-wins can compare them directly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the next representable timestamp.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Reads the wall clock.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

/// The partition under which records are owned and synced.
///
/// Each scope syncs independently: a personal scope and a team scope
/// have separate watermarks and may run passes concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OwnerScope {
    /// Records owned by a single user.
    User(Uuid),
    /// Records shared by a team.
    Team(Uuid),
}

impl OwnerScope {
    /// Returns the owning user or team id.
    #[must_use]
    pub fn owner_id(&self) -> Uuid {
        match self {
            OwnerScope::User(id) | OwnerScope::Team(id) => *id,
        }
    }

    /// Returns true for team scopes.
    #[must_use]
    pub fn is_team(&self) -> bool {
        matches!(self, OwnerScope::Team(_))
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerScope::User(id) => write!(f, "user:{id}"),
            OwnerScope::Team(id) => write!(f, "team:{id}"),
        }
    }
}

impl FromStr for OwnerScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidScope(s.to_string()))?;
        let id = Uuid::parse_str(id).map_err(|_| CoreError::InvalidScope(s.to_string()))?;
        match kind {
            "user" => Ok(OwnerScope::User(id)),
            "team" => Ok(OwnerScope::Team(id)),
            _ => Err(CoreError::InvalidScope(s.to_string())),
        }
    }
}

impl From<OwnerScope> for String {
    fn from(scope: OwnerScope) -> Self {
        scope.to_string()
    }
}

impl TryFrom<String> for OwnerScope {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A kind of synced entity, one table per kind on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Projects group tasks.
    Projects,
    /// Tasks, which may block one another.
    Tasks,
    /// Labels attached to tasks.
    Labels,
}

impl Collection {
    /// Every collection, in sync order.
    ///
    /// Projects and labels come before tasks so references resolve on the
    /// receiving device as soon as a task lands.
    pub const ALL: [Collection; 3] = [Collection::Projects, Collection::Labels, Collection::Tasks];

    /// Returns the remote table name.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Tasks => "tasks",
            Collection::Labels => "labels",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Collection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "projects" => Ok(Collection::Projects),
            "tasks" => Ok(Collection::Tasks),
            "labels" => Ok(Collection::Labels),
            other => Err(CoreError::UnknownCollection(other.to_string())),
        }
    }
}
