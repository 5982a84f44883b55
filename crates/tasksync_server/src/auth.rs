//! Session authorization.
//!
//! A session belongs to one user and lists the teams that user is a member
//! of. It may read and write its own personal scope and the scope of each
//! of its teams, nothing else.

use crate::error::{ServiceError, ServiceResult};
use std::collections::BTreeSet;
use tasksync_core::OwnerScope;
use uuid::Uuid;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The signed-in user.
    pub user: Uuid,
    /// Teams the user belongs to.
    pub teams: BTreeSet<Uuid>,
}

impl Session {
    /// Creates a session with no team memberships.
    pub fn new(user: Uuid) -> Self {
        Self {
            user,
            teams: BTreeSet::new(),
        }
    }

    /// Adds a team membership.
    pub fn with_team(mut self, team: Uuid) -> Self {
        self.teams.insert(team);
        self
    }

    /// Returns the user's personal scope.
    pub fn personal_scope(&self) -> OwnerScope {
        OwnerScope::User(self.user)
    }

    /// Returns every scope the session may access.
    pub fn scopes(&self) -> Vec<OwnerScope> {
        std::iter::once(self.personal_scope())
            .chain(self.teams.iter().copied().map(OwnerScope::Team))
            .collect()
    }

    /// Returns true if the session may access `scope`.
    pub fn can_access(&self, scope: OwnerScope) -> bool {
        match scope {
            OwnerScope::User(user) => user == self.user,
            OwnerScope::Team(team) => self.teams.contains(&team),
        }
    }

    /// Checks access to `scope`.
    pub fn authorize(&self, scope: OwnerScope) -> ServiceResult<()> {
        if self.can_access(scope) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden {
                user: self.user,
                scope,
            })
        }
    }
}
