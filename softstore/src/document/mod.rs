// Document envelope - lifecycle metadata wrapped around a typed payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A loaded document with implicit lifecycle fields and typed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<T> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub data: T,
}

impl<T> Document<T> {
    /// Replace the payload, keeping every lifecycle field.
    pub fn with_data<U>(self, data: U) -> Document<U> {
        Document {
            id: self.id,
            created_at: self.created_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
            deleted: self.deleted,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
            data,
        }
    }
}

/// Skip/limit window for list queries. `limit: None` returns everything
/// past the offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Page {
            limit: Some(limit),
            offset,
        }
    }
}

/// Merge non-null top-level fields of `partial` into `payload`, overwriting
/// existing keys. Null values in the partial are skipped rather than
/// clearing the field.
pub(crate) fn merge_fields(payload: &mut Map<String, Value>, partial: &Map<String, Value>) {
    for (key, value) in partial {
        if !value.is_null() {
            payload.insert(key.clone(), value.clone());
        }
    }
}
