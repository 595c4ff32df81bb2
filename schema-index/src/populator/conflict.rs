//! Detection and resolution of duplicate values in unique indexes.

use super::tree::{MergeOutcome, ValueMerger};
use crate::key::{GenericKey, NullValue};
use crate::values::Value;

/// Two entities index the same values in a unique index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntryConflict {
    pub existing_entity_id: i64,
    pub added_entity_id: i64,
    pub values: Vec<Value>,
}

impl std::fmt::Display for IndexEntryConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "entities {} and {} both have values {:?}",
            self.existing_entity_id, self.added_entity_id, self.values
        )
    }
}

/// What to do about a conflict found while verifying a unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Fail the population.
    Throw,
    /// Remove the later entry and continue.
    Delete,
}

/// Decides the fate of each conflicting entry.
pub trait IndexEntryConflictHandler {
    fn index_entry_conflict(
        &self,
        existing_entity_id: i64,
        added_entity_id: i64,
        values: &[Value],
    ) -> ConflictAction;
}

/// Fails on the first conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrowingConflictHandler;

impl IndexEntryConflictHandler for ThrowingConflictHandler {
    fn index_entry_conflict(&self, _: i64, _: i64, _: &[Value]) -> ConflictAction {
        ConflictAction::Throw
    }
}

impl<F: Fn(i64, i64, &[Value]) -> ConflictAction> IndexEntryConflictHandler for F {
    fn index_entry_conflict(
        &self,
        existing_entity_id: i64,
        added_entity_id: i64,
        values: &[Value],
    ) -> ConflictAction {
        self(existing_entity_id, added_entity_id, values)
    }
}

/// Notes when an inserted key meets an equal key of another entity.
///
/// With `compare_entity_ids` set, keys of different entities never compare
/// equal, so only exact duplicates reach the merger and nothing is reported.
#[derive(Debug)]
pub(crate) struct ConflictDetectingValueMerger {
    compare_entity_ids: bool,
    conflict: Option<(i64, i64)>,
}

impl ConflictDetectingValueMerger {
    pub(crate) const fn new(compare_entity_ids: bool) -> Self {
        Self {
            compare_entity_ids,
            conflict: None,
        }
    }

    /// Prepare `key` for insertion under this detector's uniqueness rule.
    pub(crate) const fn control_conflict_detection(&self, key: &mut GenericKey) {
        key.set_compare_id(self.compare_entity_ids);
    }

    /// The `(existing, added)` entity ids of the last conflict, clearing it.
    pub(crate) fn take_conflict(&mut self) -> Option<(i64, i64)> {
        self.conflict.take()
    }
}

impl ValueMerger<GenericKey, NullValue> for ConflictDetectingValueMerger {
    fn merge(
        &mut self,
        existing_key: &GenericKey,
        new_key: &GenericKey,
        _existing_value: &NullValue,
        _new_value: &NullValue,
    ) -> MergeOutcome {
        if existing_key.entity_id() != new_key.entity_id() {
            self.conflict = Some((existing_key.entity_id(), new_key.entity_id()));
        }
        MergeOutcome::Unchanged
    }
}
