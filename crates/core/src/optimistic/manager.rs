//! Optimistic read model with exact rollback.
//!
//! Each entity keeps a confirmed `base` value plus the ordered layers of its
//! unconfirmed actions. The visible value is the base with every layer's
//! prediction folded on top. Committing a layer folds it into the base (or
//! replaces the base with the server's canonical value); rolling one back
//! simply drops it. Either way the remaining layers are replayed, so actions
//! resolved out of order never resurrect or clobber each other's effects, and
//! rolling back every layer restores the base exactly.

use std::collections::HashMap;

use checksync_common::time::SharedClock;
use checksync_domain::{ActionId, ActionKind, EntityId, OptimisticPatch};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::predict::predict;

/// Snapshot of every locally known entity, as the UI should render it.
pub type ReadModel = im::HashMap<EntityId, Value>;

#[derive(Debug, Clone)]
struct Layer {
    action_id: ActionId,
    kind: ActionKind,
    applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    base: Option<Value>,
    layers: Vec<Layer>,
}

impl Ledger {
    /// Visible value after the first `depth` layers.
    fn value_at(&self, depth: usize) -> Option<Value> {
        self.layers
            .iter()
            .take(depth)
            .fold(self.base.clone(), |acc, layer| {
                Some(predict(acc.as_ref(), &layer.kind, layer.applied_at))
            })
    }

    fn visible(&self) -> Option<Value> {
        self.value_at(self.layers.len())
    }

    fn position(&self, action_id: &ActionId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.action_id == *action_id)
    }

    fn is_vacant(&self) -> bool {
        self.base.is_none() && self.layers.is_empty()
    }
}

#[derive(Debug, Default)]
struct State {
    ledgers: HashMap<EntityId, Ledger>,
    owners: HashMap<ActionId, EntityId>,
}

/// Applies predicted effects of queued actions to the local read model and
/// reverses them exactly on failure.
pub struct OptimisticStateManager {
    clock: SharedClock,
    state: Mutex<State>,
    read_model: watch::Sender<ReadModel>,
}

impl std::fmt::Debug for OptimisticStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticStateManager")
            .field("pending_patches", &self.pending_patches())
            .finish_non_exhaustive()
    }
}

impl OptimisticStateManager {
    pub fn new(clock: SharedClock) -> Self {
        let (read_model, _) = watch::channel(ReadModel::new());
        Self { clock, state: Mutex::new(State::default()), read_model }
    }

    /// Record the confirmed server value of an entity.
    ///
    /// Pending layers on the entity are replayed on top of the new value.
    pub fn seed(&self, entity: EntityId, value: Value) {
        let mut state = self.state.lock();
        let ledger = state.ledgers.entry(entity.clone()).or_default();
        ledger.base = Some(value);
        let visible = ledger.visible();
        self.publish(entity, visible);
    }

    /// Apply the predicted effect of `kind` and return the reversible patch.
    ///
    /// Applying an action that already has a layer (a superseded action)
    /// amends that layer in place instead of stacking a second one.
    pub fn apply(&self, action_id: ActionId, kind: &ActionKind) -> OptimisticPatch {
        self.apply_at(action_id, kind, self.clock.utc_now())
    }

    /// [`Self::apply`] with an explicit effect time, for replaying actions
    /// restored from storage.
    pub fn apply_at(
        &self,
        action_id: ActionId,
        kind: &ActionKind,
        applied_at: DateTime<Utc>,
    ) -> OptimisticPatch {
        let target = kind.target().clone();
        let mut state = self.state.lock();

        if let Some(previous_target) = state.owners.get(&action_id).cloned() {
            if previous_target != target {
                Self::detach(&mut state, &action_id);
                let visible = state.ledgers.get(&previous_target).and_then(Ledger::visible);
                self.publish(previous_target, visible);
            }
        }

        state.owners.insert(action_id, target.clone());
        let ledger = state.ledgers.entry(target.clone()).or_default();
        let depth = match ledger.position(&action_id) {
            Some(index) => {
                let layer = &mut ledger.layers[index];
                layer.kind = kind.clone();
                layer.applied_at = applied_at;
                index
            }
            None => {
                ledger.layers.push(Layer { action_id, kind: kind.clone(), applied_at });
                ledger.layers.len() - 1
            }
        };

        let previous_value = ledger.value_at(depth);
        let applied_value = predict(previous_value.as_ref(), kind, applied_at);
        let visible = ledger.visible();
        self.publish(target.clone(), visible);

        debug!(action_id = %action_id, target = %target, "Optimistic patch applied");
        OptimisticPatch { action_id, target_entity_id: target, previous_value, applied_value }
    }

    /// Make the action's effect permanent.
    ///
    /// `canonical`, when the server returned one, replaces the entity's base
    /// and wins over the prediction. Returns `false` if the action has no
    /// patch (already committed or rolled back).
    pub fn commit(&self, action_id: &ActionId, canonical: Option<Value>) -> bool {
        let mut state = self.state.lock();
        let Some((target, layer)) = Self::detach(&mut state, action_id) else {
            trace!(action_id = %action_id, "Commit ignored; no pending patch");
            return false;
        };

        let ledger = state.ledgers.entry(target.clone()).or_default();
        let base = match canonical {
            Some(value) => value,
            None => predict(ledger.base.as_ref(), &layer.kind, layer.applied_at),
        };
        ledger.base = Some(base);
        let visible = ledger.visible();
        self.publish(target, visible);

        debug!(action_id = %action_id, "Optimistic patch committed");
        true
    }

    /// Drop the action's effect. Returns `false` if the action has no patch.
    pub fn rollback(&self, action_id: &ActionId) -> bool {
        let mut state = self.state.lock();
        let Some((target, _)) = Self::detach(&mut state, action_id) else {
            trace!(action_id = %action_id, "Rollback ignored; no pending patch");
            return false;
        };

        let visible = state.ledgers.get(&target).and_then(Ledger::visible);
        if state.ledgers.get(&target).is_some_and(Ledger::is_vacant) {
            state.ledgers.remove(&target);
        }
        self.publish(target, visible);

        debug!(action_id = %action_id, "Optimistic patch rolled back");
        true
    }

    /// Current patch for an action, computed against the layers below it.
    #[must_use]
    pub fn patch(&self, action_id: &ActionId) -> Option<OptimisticPatch> {
        let state = self.state.lock();
        let target = state.owners.get(action_id)?;
        let ledger = state.ledgers.get(target)?;
        let depth = ledger.position(action_id)?;
        let layer = &ledger.layers[depth];

        let previous_value = ledger.value_at(depth);
        let applied_value = predict(previous_value.as_ref(), &layer.kind, layer.applied_at);
        Some(OptimisticPatch {
            action_id: *action_id,
            target_entity_id: target.clone(),
            previous_value,
            applied_value,
        })
    }

    /// Whether the action currently has a patch.
    #[must_use]
    pub fn has_patch(&self, action_id: &ActionId) -> bool {
        self.state.lock().owners.contains_key(action_id)
    }

    /// Number of actions with a patch.
    #[must_use]
    pub fn pending_patches(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// Visible value of one entity.
    #[must_use]
    pub fn get(&self, entity: &EntityId) -> Option<Value> {
        self.read_model.borrow().get(entity).cloned()
    }

    /// Visible value of every entity.
    #[must_use]
    pub fn snapshot(&self) -> ReadModel {
        self.read_model.borrow().clone()
    }

    /// Receive the read model after every apply, commit, rollback or seed.
    ///
    /// Each operation publishes exactly once, so a subscriber never observes
    /// an intermediate state of a rollback.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReadModel> {
        self.read_model.subscribe()
    }

    fn detach(state: &mut State, action_id: &ActionId) -> Option<(EntityId, Layer)> {
        let target = state.owners.remove(action_id)?;
        let ledger = state.ledgers.get_mut(&target)?;
        let index = ledger.position(action_id)?;
        let layer = ledger.layers.remove(index);
        Some((target, layer))
    }

    fn publish(&self, entity: EntityId, visible: Option<Value>) {
        self.read_model.send_modify(|model| match visible {
            Some(value) => {
                model.insert(entity, value);
            }
            None => {
                model.remove(&entity);
            }
        });
    }
}
