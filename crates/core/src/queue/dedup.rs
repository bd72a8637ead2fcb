//! Deduplication index and per-type merge policy.
//!
//! The index only tracks **pending** actions. An action leaves it when it is
//! picked up for dispatch (`retrying`) or parked in backoff (`failed`) and
//! re-enters when it returns to `pending`, so an in-flight action is never
//! merged with or cancelled by a newer one.
//!
//! | Type | Policy |
//! |------|--------|
//! | `task_completion` | supersede; cancels a pending `undo_task_completion` |
//! | `undo_task_completion` | supersede; cancels a pending `task_completion` |
//! | `checklist_update` | supersede, merging `fields` (later keys win) |
//! | `note_add` | reject only an identical payload |
//! | `checklist_submission` | reject duplicate |

use checksync_domain::{ActionId, ActionKind, ActionType, EntityId, QueuedAction};

/// How an incoming action interacts with a pending one of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Fold the incoming payload into the pending action.
    Supersede,
    /// Drop the incoming action if an identical payload is pending.
    RejectIdentical,
    /// Drop the incoming action if any action with the same key is pending.
    RejectDuplicate,
}

/// Merge policy for an action type.
#[must_use]
pub const fn policy_for(action_type: ActionType) -> DedupPolicy {
    match action_type {
        ActionType::TaskCompletion
        | ActionType::UndoTaskCompletion
        | ActionType::ChecklistUpdate => DedupPolicy::Supersede,
        ActionType::NoteAdd => DedupPolicy::RejectIdentical,
        ActionType::ChecklistSubmission => DedupPolicy::RejectDuplicate,
    }
}

/// Type whose pending action is annihilated by an incoming action of
/// `action_type` on the same target.
#[must_use]
pub const fn cancelled_by(action_type: ActionType) -> Option<ActionType> {
    match action_type {
        ActionType::TaskCompletion => Some(ActionType::UndoTaskCompletion),
        ActionType::UndoTaskCompletion => Some(ActionType::TaskCompletion),
        ActionType::ChecklistUpdate | ActionType::NoteAdd | ActionType::ChecklistSubmission => {
            None
        }
    }
}

/// Result of consulting the index for an incoming action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// No interaction; insert as a new action.
    Insert,
    /// Merge into this pending action.
    Supersede(ActionId),
    /// Drop the incoming action; this pending action already covers it.
    Reject(ActionId),
    /// Remove this pending action and drop the incoming one.
    Cancel(ActionId),
}

type DedupKey = (ActionType, EntityId);

/// Pending actions keyed by `(type, target_entity_id)`.
#[derive(Debug, Clone, Default)]
pub struct DeduplicationIndex {
    entries: im::HashMap<DedupKey, Vec<ActionId>>,
}

impl DeduplicationIndex {
    /// Track a pending action.
    pub fn insert(&mut self, action: &QueuedAction) {
        let ids =
            self.entries.entry((action.action_type(), action.target_entity_id.clone())).or_default();
        if !ids.contains(&action.id) {
            ids.push(action.id);
        }
    }

    /// Stop tracking an action. No-op if it was not tracked.
    pub fn remove(&mut self, action: &QueuedAction) {
        let key = (action.action_type(), action.target_entity_id.clone());
        let now_empty = match self.entries.get_mut(&key) {
            Some(ids) => {
                ids.retain(|id| *id != action.id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.entries.remove(&key);
        }
    }

    /// Pending ids for a key, oldest first.
    #[must_use]
    pub fn pending(&self, action_type: ActionType, target: &EntityId) -> &[ActionId] {
        self.entries.get(&(action_type, target.clone())).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tracked actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide how `incoming` interacts with the pending actions.
    ///
    /// `lookup` resolves a tracked id to its action; it is only consulted for
    /// the identical-payload check.
    pub fn decide<'a, F>(&self, incoming: &ActionKind, lookup: F) -> DedupDecision
    where
        F: Fn(&ActionId) -> Option<&'a QueuedAction>,
    {
        let action_type = incoming.action_type();
        let target = incoming.target();

        if let Some(opposite) = cancelled_by(action_type) {
            if let Some(existing) = self.pending(opposite, target).first() {
                return DedupDecision::Cancel(*existing);
            }
        }

        let pending = self.pending(action_type, target);
        match policy_for(action_type) {
            DedupPolicy::Supersede => {
                pending.first().map_or(DedupDecision::Insert, |id| DedupDecision::Supersede(*id))
            }
            DedupPolicy::RejectDuplicate => {
                pending.first().map_or(DedupDecision::Insert, |id| DedupDecision::Reject(*id))
            }
            DedupPolicy::RejectIdentical => pending
                .iter()
                .find(|id| lookup(*id).is_some_and(|existing| existing.kind == *incoming))
                .map_or(DedupDecision::Insert, |id| DedupDecision::Reject(*id)),
        }
    }
}

/// Fold a superseding payload into the pending one.
///
/// Checklist updates merge field maps so that an earlier edit to a different
/// field is not lost; every other supersedable kind is replaced outright.
#[must_use]
pub fn merge_kinds(existing: &ActionKind, incoming: ActionKind) -> ActionKind {
    match (existing, incoming) {
        (
            ActionKind::ChecklistUpdate { checklist_id, fields: earlier },
            ActionKind::ChecklistUpdate { fields: later, .. },
        ) => {
            let mut fields = earlier.clone();
            fields.extend(later);
            ActionKind::ChecklistUpdate { checklist_id: checklist_id.clone(), fields }
        }
        (_, incoming) => incoming,
    }
}
