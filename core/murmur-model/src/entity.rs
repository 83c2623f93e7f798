use murmur_types::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};

/// Local projection of a server publication.
///
/// `payload` holds the publication body exactly as the server sent it.
/// `updated_at` strictly increases on every authoritative mutation, which
/// is what reconciliation compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Entity {
    /// Creates an entity whose `updated_at` equals its `created_at`.
    pub fn new(id: impl Into<EntityId>, payload: serde_json::Value, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            payload,
            created_at,
            updated_at: created_at,
        }
    }

    /// Sets `updated_at`.
    #[must_use]
    pub fn updated(mut self, at: Timestamp) -> Self {
        self.updated_at = at;
        self
    }

    /// True if this copy carries a strictly newer authoritative version.
    pub fn is_newer_than(&self, other: &Entity) -> bool {
        self.updated_at > other.updated_at
    }

    /// Extract a string value from `payload` using a JSON pointer (e.g., "/title").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.payload.pointer(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value from `payload` using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.payload.pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value from `payload` using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.payload.pointer(pointer).and_then(|v| v.as_f64())
    }
}
