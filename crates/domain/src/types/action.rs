//! Queued actions and their payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Unique identifier for a queued action.
///
/// Generated at enqueue time as a UUID v7, so ids are time-ordered. The same
/// id is sent to the remote applier on every attempt and doubles as its
/// idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generate a fresh, time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ActionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of the local entity (task, checklist) an action targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Dispatch priority. `Critical` sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl_domain_status_conversions!(Priority {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
});

/// Lifecycle status of a queued action.
///
/// - `Pending`: eligible for dispatch
/// - `Retrying`: currently being dispatched
/// - `Failed`: last attempt failed transiently; waiting out its backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Pending,
    Retrying,
    Failed,
}

impl_domain_status_conversions!(ActionStatus {
    Pending => "pending",
    Retrying => "retrying",
    Failed => "failed",
});

/// Discriminant of [`ActionKind`], used as half of the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    TaskCompletion,
    UndoTaskCompletion,
    ChecklistUpdate,
    NoteAdd,
    ChecklistSubmission,
}

impl_domain_status_conversions!(ActionType {
    TaskCompletion => "task_completion",
    UndoTaskCompletion => "undo_task_completion",
    ChecklistUpdate => "checklist_update",
    NoteAdd => "note_add",
    ChecklistSubmission => "checklist_submission",
});

/// A mutation the client wants delivered to the server.
///
/// Serialised adjacently tagged (`{"type": ..., "payload": {...}}`), which is
/// also the body shape the HTTP applier sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ActionKind {
    /// Mark a task completed.
    TaskCompletion {
        task_id: EntityId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_by: Option<String>,
    },
    /// Reopen a completed task.
    UndoTaskCompletion { task_id: EntityId },
    /// Shallow-merge `fields` into a checklist.
    ChecklistUpdate { checklist_id: EntityId, fields: Map<String, Value> },
    /// Append a note to a task.
    NoteAdd { task_id: EntityId, note_id: String, text: String },
    /// Submit a finished checklist.
    ChecklistSubmission { checklist_id: EntityId },
}

impl ActionKind {
    /// Discriminant of this action.
    #[must_use]
    pub const fn action_type(&self) -> ActionType {
        match self {
            Self::TaskCompletion { .. } => ActionType::TaskCompletion,
            Self::UndoTaskCompletion { .. } => ActionType::UndoTaskCompletion,
            Self::ChecklistUpdate { .. } => ActionType::ChecklistUpdate,
            Self::NoteAdd { .. } => ActionType::NoteAdd,
            Self::ChecklistSubmission { .. } => ActionType::ChecklistSubmission,
        }
    }

    /// Entity whose local state this action changes.
    #[must_use]
    pub const fn target(&self) -> &EntityId {
        match self {
            Self::TaskCompletion { task_id, .. }
            | Self::UndoTaskCompletion { task_id }
            | Self::NoteAdd { task_id, .. } => task_id,
            Self::ChecklistUpdate { checklist_id, .. }
            | Self::ChecklistSubmission { checklist_id } => checklist_id,
        }
    }

    /// Priority used when the caller does not pick one.
    #[must_use]
    pub const fn default_priority(&self) -> Priority {
        match self {
            Self::ChecklistSubmission { .. } => Priority::Critical,
            Self::TaskCompletion { .. } | Self::UndoTaskCompletion { .. } => Priority::High,
            Self::ChecklistUpdate { .. } => Priority::Medium,
            Self::NoteAdd { .. } => Priority::Low,
        }
    }
}

/// Caller intent to enqueue a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub kind: ActionKind,
    pub priority: Option<Priority>,
    pub max_retries: Option<u32>,
}

impl NewAction {
    /// Intent with default priority and retry budget.
    #[must_use]
    pub const fn new(kind: ActionKind) -> Self {
        Self { kind, priority: None, max_retries: None }
    }

    /// Override the kind's default priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Override the configured retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

impl From<ActionKind> for NewAction {
    fn from(kind: ActionKind) -> Self {
        Self::new(kind)
    }
}

/// Total order of the queue: priority first, then age, then insertion
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderKey {
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

/// An action waiting in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Stable identity, also the idempotency key sent to the backend
    pub id: ActionId,
    pub kind: ActionKind,
    /// Entity the action mutates, derived from `kind`
    pub target_entity_id: EntityId,
    /// Kept across supersedes, so a merged action keeps its place
    pub created_at: DateTime<Utc>,
    /// Insertion counter that breaks ties between equal timestamps
    pub sequence: u64,
    pub priority: Priority,
    /// Transient failures so far; never above `max_retries`
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: ActionStatus,
    /// Message of the most recent transient failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the action was last handed to the applier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedAction {
    /// Discriminant of the payload.
    #[must_use]
    pub const fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    /// Position key within the queue.
    #[must_use]
    pub const fn order_key(&self) -> OrderKey {
        OrderKey { priority: self.priority, created_at: self.created_at, sequence: self.sequence }
    }

    /// Whether the action is eligible for dispatch.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    /// Whether another transient failure would be terminal.
    #[must_use]
    pub const fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
