//! Reversible record of an optimistic local update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{ActionId, EntityId};

/// What an optimistic update changed, and how to undo it.
///
/// `previous_value` is `None` when the entity did not exist locally before the
/// update; rolling back then removes it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticPatch {
    pub action_id: ActionId,
    pub target_entity_id: EntityId,
    pub previous_value: Option<Value>,
    pub applied_value: Value,
}
