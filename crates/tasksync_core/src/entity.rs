//! Entity schemas.
//!
//! Each kind has exactly one canonical field schema. Alternate spellings
//! seen on the wire are handled by the protocol adapter, never here.

use crate::error::ValidationError;
use crate::id::RecordId;
use crate::types::{Collection, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A project groups tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Display color, e.g. `#ff8800`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Archived projects are hidden from the default views.
    #[serde(default)]
    pub archived: bool,
}

impl Project {
    /// Creates a project with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: None,
            archived: false,
        }
    }

    /// Sets the color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

/// Task priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// No priority set.
    #[default]
    None,
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
    /// Drop everything.
    Urgent,
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Short title.
    pub title: String,
    /// Longer notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Owning project, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<RecordId>,
    /// Workflow status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<Timestamp>,
    /// Attached labels.
    #[serde(default)]
    pub label_ids: BTreeSet<RecordId>,
    /// Tasks that must finish before this one. Never cyclic.
    #[serde(default)]
    pub blocked_by: BTreeSet<RecordId>,
}

impl Task {
    /// Creates a task with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: None,
            project_id: None,
            status: TaskStatus::Todo,
            priority: Priority::None,
            due_at: None,
            label_ids: BTreeSet::new(),
            blocked_by: BTreeSet::new(),
        }
    }

    /// Places the task in a project.
    pub fn in_project(mut self, project_id: RecordId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a blocker.
    pub fn with_blocker(mut self, blocker: RecordId) -> Self {
        self.blocked_by.insert(blocker);
        self
    }

    /// Returns true once the task is done.
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

/// A label that can be attached to tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Display name.
    pub name: String,
    /// Display color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Label {
    /// Creates a label with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }
}

/// The typed fields of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityBody {
    /// Project fields.
    Project(Project),
    /// Task fields.
    Task(Task),
    /// Label fields.
    Label(Label),
}

impl EntityBody {
    /// Returns the collection this body is stored in.
    pub fn collection(&self) -> Collection {
        match self {
            EntityBody::Project(_) => Collection::Projects,
            EntityBody::Task(_) => Collection::Tasks,
            EntityBody::Label(_) => Collection::Labels,
        }
    }

    /// Returns the task fields, if this is a task.
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            EntityBody::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns mutable task fields, if this is a task.
    pub fn as_task_mut(&mut self) -> Option<&mut Task> {
        match self {
            EntityBody::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Checks field-level rules that do not need other records.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (field, value) = match self {
            EntityBody::Project(p) => ("name", &p.name),
            EntityBody::Task(t) => ("title", &t.title),
            EntityBody::Label(l) => ("name", &l.name),
        };
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyField { field });
        }
        Ok(())
    }
}

impl From<Project> for EntityBody {
    fn from(p: Project) -> Self {
        EntityBody::Project(p)
    }
}

impl From<Task> for EntityBody {
    fn from(t: Task) -> Self {
        EntityBody::Task(t)
    }
}

impl From<Label> for EntityBody {
    fn from(l: Label) -> Self {
        EntityBody::Label(l)
    }
}
