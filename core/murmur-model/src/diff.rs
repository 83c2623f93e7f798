use crate::Entity;
use serde::{Deserialize, Serialize};

/// Outcome of reconciling one server snapshot against local state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncDiffResult {
    /// Entities that did not exist locally and were written.
    pub new_entities: Vec<Entity>,
    /// Entities whose server copy was newer and overwrote the local one.
    pub updated_entities: Vec<Entity>,
    /// Entities left as they were (local copy equal or newer).
    pub unchanged_entities: Vec<Entity>,
}

impl SyncDiffResult {
    /// True if the cycle wrote anything.
    pub fn has_changes(&self) -> bool {
        !self.new_entities.is_empty() || !self.updated_entities.is_empty()
    }

    /// Total number of classified entities.
    pub fn len(&self) -> usize {
        self.new_entities.len() + self.updated_entities.len() + self.unchanged_entities.len()
    }

    /// Appends another cycle's classifications.
    pub fn merge(&mut self, other: SyncDiffResult) {
        self.new_entities.extend(other.new_entities);
        self.updated_entities.extend(other.updated_entities);
        self.unchanged_entities.extend(other.unchanged_entities);
    }

    /// True if nothing was classified.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
