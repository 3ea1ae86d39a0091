//! Cross-collection field synchronization.
//!
//! A [`Relationship`] declares which payload fields of a source collection
//! are mirrored onto documents of a related collection, keyed by a
//! foreign-key payload field holding the source document's id. Hooks are
//! constructed explicitly and handed to the repository, which invokes them
//! from its write path inside the same store transaction as the primary
//! write; a propagation failure rolls the whole write back.

use crate::document::{merge_fields, Document};
use crate::error::{Result, SoftstoreError};
use crate::store::DocStore;
use serde_json::{Map, Value};

/// Maps a source document onto the partial payload mirrored into every
/// related document.
pub type ProjectionFn = fn(&Document<Value>) -> Map<String, Value>;

/// Declarative mapping between a source collection and a related collection
/// that denormalizes some of its fields. Stateless.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Source collection name.
    pub source: String,
    /// Related collection name.
    pub related: String,
    /// Payload field on related documents holding the source document's id.
    pub foreign_key: String,
    /// Source payload fields whose mutation must be mirrored. Consulted by
    /// the pre-update hook to skip propagation for unrelated updates.
    pub watched: Vec<String>,
    pub project: ProjectionFn,
}

impl Relationship {
    pub fn new(
        source: &str,
        related: &str,
        foreign_key: &str,
        watched: &[&str],
        project: ProjectionFn,
    ) -> Self {
        Relationship {
            source: source.to_string(),
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            watched: watched.iter().map(|f| f.to_string()).collect(),
            project,
        }
    }

    /// Whether the given update partial touches any watched field.
    pub(crate) fn touches_watched(&self, partial: &Map<String, Value>) -> bool {
        partial.keys().any(|key| self.watched.iter().any(|w| w == key))
    }
}

/// When a hook runs relative to the primary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// After a new source document is inserted; always propagates.
    PostCreate,
    /// After an update is applied; propagates the post-update document
    /// unconditionally.
    PostUpdate,
    /// Before an update is applied; skipped entirely unless the update
    /// touches a watched field, then propagates the merged document.
    PreUpdate,
}

/// A relationship bound to a phase, ready to hand to a repository.
#[derive(Debug, Clone)]
pub struct SyncHook {
    pub relationship: Relationship,
    pub phase: SyncPhase,
}

impl SyncHook {
    pub fn post_create(relationship: Relationship) -> Self {
        SyncHook {
            relationship,
            phase: SyncPhase::PostCreate,
        }
    }

    pub fn post_update(relationship: Relationship) -> Self {
        SyncHook {
            relationship,
            phase: SyncPhase::PostUpdate,
        }
    }

    pub fn pre_update(relationship: Relationship) -> Self {
        SyncHook {
            relationship,
            phase: SyncPhase::PreUpdate,
        }
    }
}

/// Merge the projected fields into every related document whose foreign key
/// equals the source id, active or soft-deleted alike. Returns the number of
/// documents rewritten. Store failures come back as sync errors.
pub fn propagate(
    store: &DocStore,
    relationship: &Relationship,
    source_id: &str,
    fields: &Map<String, Value>,
) -> Result<u64> {
    if fields.is_empty() {
        return Ok(0);
    }

    let candidates = store
        .find_payload_candidates(&relationship.related, source_id)
        .map_err(as_sync_error)?;

    let mut updated = 0u64;
    for record in candidates {
        let mut payload = record.parse_payload().map_err(as_sync_error)?;
        let Some(obj) = payload.as_object_mut() else {
            log::warn!(
                "Skipping non-object payload {}/{} during sync",
                relationship.related,
                record.id
            );
            continue;
        };
        // The LIKE prefilter is broad; confirm the actual foreign key.
        match obj.get(&relationship.foreign_key) {
            Some(Value::String(fk)) if fk == source_id => {}
            _ => continue,
        }

        merge_fields(obj, fields);
        let data_json = serde_json::to_string(&payload).map_err(|e| {
            SoftstoreError::Sync(format!(
                "Failed to serialize payload {}/{}: {e}",
                relationship.related, record.id
            ))
        })?;
        store
            .set_payload(&relationship.related, &record.id, &data_json, None)
            .map_err(as_sync_error)?;
        updated += 1;
    }

    log::debug!(
        "Synced {} field(s) from {}/{} onto {} document(s) in {}",
        fields.len(),
        relationship.source,
        source_id,
        updated,
        relationship.related
    );
    Ok(updated)
}

fn as_sync_error(err: SoftstoreError) -> SoftstoreError {
    SoftstoreError::Sync(err.to_string())
}
