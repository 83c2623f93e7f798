//! Boundary adapter for server publication responses.
//!
//! The feed endpoints have answered in several shapes over time: a bare
//! array, an envelope keyed by `data`, `items`, `publications` or
//! `results`, or a single object. Ids arrive as strings or numbers and
//! timestamps as RFC 3339 strings or epoch milliseconds, in camelCase or
//! snake_case. Everything is normalized here into [`Entity`] values.

use crate::Entity;
use chrono::DateTime;
use murmur_types::{EntityId, Timestamp};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Envelope keys that may wrap the list of publications.
const LIST_KEYS: [&str; 4] = ["data", "items", "publications", "results"];

/// Errors raised while normalizing a server response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DtoError {
    /// The response is neither a list nor a recognized envelope.
    #[error("unrecognized response shape: {0}")]
    UnrecognizedShape(String),

    /// An item could not be decoded.
    #[error("malformed publication: {0}")]
    Malformed(String),

    /// An item has no usable id.
    #[error("publication without id")]
    MissingId,

    /// An item carries a timestamp that cannot be parsed.
    #[error("invalid timestamp {value:?} in field {field}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Identifier as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_entity_id(self) -> Result<EntityId, DtoError> {
        let id = match self {
            WireId::Text(s) => EntityId::new(s.trim()),
            WireId::Number(n) => EntityId::new(n.to_string()),
        };
        if id.is_empty() {
            return Err(DtoError::MissingId);
        }
        Ok(id)
    }
}

/// Timestamp as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTime {
    Millis(i64),
    Text(String),
}

impl WireTime {
    fn parse(self, field: &'static str) -> Result<Timestamp, DtoError> {
        match self {
            WireTime::Millis(ms) => Ok(Timestamp::from_millis(ms)),
            WireTime::Text(s) => {
                if let Ok(ms) = s.trim().parse::<i64>() {
                    return Ok(Timestamp::from_millis(ms));
                }
                DateTime::parse_from_rfc3339(s.trim())
                    .map(|dt| Timestamp::from_millis(dt.timestamp_millis()))
                    .map_err(|_| DtoError::InvalidTimestamp { field, value: s })
            }
        }
    }
}

/// Keys that may carry the id, in priority order.
const ID_KEYS: [&str; 4] = ["id", "_id", "publicationId", "publication_id"];
/// Keys that may carry the creation time, in priority order.
const CREATED_KEYS: [&str; 4] = ["createdAt", "created_at", "publishedAt", "published_at"];
/// Keys that may carry the last modification time, in priority order.
const UPDATED_KEYS: [&str; 4] = ["updatedAt", "updated_at", "modifiedAt", "modified_at"];

/// The header fields every publication shape carries.
///
/// Each field is read from the first of its candidate keys that is
/// present and not null, so items carrying several spellings at once
/// (`id` next to `_id`, `createdAt` next to `publishedAt`) still decode.
#[derive(Debug, Clone)]
pub struct PublicationDto {
    pub id: Option<WireId>,
    pub created_at: Option<WireTime>,
    pub updated_at: Option<WireTime>,
}

impl PublicationDto {
    /// Reads the header fields of one item.
    pub fn from_item(item: &Value) -> Result<Self, DtoError> {
        let map = match item {
            Value::Object(map) => map,
            other => {
                return Err(DtoError::Malformed(format!(
                    "expected object, found {}",
                    shape_name(other)
                )));
            }
        };
        Ok(Self {
            id: pick(map, &ID_KEYS)?,
            created_at: pick(map, &CREATED_KEYS)?,
            updated_at: pick(map, &UPDATED_KEYS)?,
        })
    }

    /// Decodes one publication. The full item becomes the entity payload.
    pub fn into_entity(item: Value) -> Result<Entity, DtoError> {
        let dto = Self::from_item(&item)?;

        let id = dto.id.ok_or(DtoError::MissingId)?.into_entity_id()?;
        let created_at = dto
            .created_at
            .ok_or_else(|| DtoError::Malformed(format!("publication {id} has no createdAt")))?
            .parse("createdAt")?;
        let updated_at = match dto.updated_at {
            Some(t) => t.parse("updatedAt")?,
            None => created_at,
        };

        Ok(Entity {
            id,
            payload: item,
            created_at,
            updated_at,
        })
    }
}

fn pick<T: DeserializeOwned>(map: &Map<String, Value>, keys: &[&str]) -> Result<Option<T>, DtoError> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
    else {
        return Ok(None);
    };
    T::deserialize(value)
        .map(Some)
        .map_err(|e| DtoError::Malformed(format!("field {key}: {e}")))
}

/// Result of normalizing one response: decoded entities plus the items
/// that were rejected. Rejections never fail the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSnapshot {
    pub entities: Vec<Entity>,
    pub rejected: Vec<DtoError>,
}

/// Normalizes any supported response shape into entities.
pub fn normalize_snapshot(body: Value) -> Result<NormalizedSnapshot, DtoError> {
    let items = extract_items(body, 0)?;
    let mut snapshot = NormalizedSnapshot::default();
    for item in items {
        match PublicationDto::into_entity(item) {
            Ok(entity) => snapshot.entities.push(entity),
            Err(e) => snapshot.rejected.push(e),
        }
    }
    Ok(snapshot)
}

fn extract_items(body: Value, depth: usize) -> Result<Vec<Value>, DtoError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if ID_KEYS.iter().any(|k| map.contains_key(*k)) {
                return Ok(vec![Value::Object(map)]);
            }
            if let Some(inner) = LIST_KEYS.iter().find_map(|k| map.remove(*k)) {
                // `{"data": {"items": [...]}}` is the deepest nesting seen.
                if depth == 0 {
                    return extract_items(inner, depth + 1);
                }
                return match inner {
                    Value::Array(items) => Ok(items),
                    other => Err(DtoError::UnrecognizedShape(shape_name(&other).to_string())),
                };
            }
            Err(DtoError::UnrecognizedShape("object without list or id".to_string()))
        }
        Value::Null => Ok(Vec::new()),
        other => Err(DtoError::UnrecognizedShape(shape_name(&other).to_string())),
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
