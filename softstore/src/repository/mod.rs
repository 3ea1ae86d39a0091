use crate::document::{merge_fields, Document, Page};
use crate::error::{Result, SoftstoreError};
use crate::schema::CollectionSchema;
use crate::store::{DocStore, DocumentRecord, Visibility};
use crate::sync::{self, SyncHook, SyncPhase};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Generic repository over one collection: CRUD, the
/// soft-delete/restore/hard-delete state machine, active-or-inactive
/// sub-document projections, and the sync hooks invoked from its write
/// path. `T` is the entity payload; lifecycle metadata lives on the
/// [`Document`] envelope, so any `Serialize + DeserializeOwned` shape works
/// without per-entity code.
pub struct Repository<'a, T> {
    pub(crate) store: &'a DocStore,
    pub(crate) schema: CollectionSchema,
    hooks: Vec<SyncHook>,
    _payload: PhantomData<fn() -> T>,
}

impl<'a, T> Repository<'a, T>
where
    T: Serialize + DeserializeOwned,
{
    /// Construct a repository without sync hooks. The schema is validated
    /// here, once; operations after this point do not re-check shape.
    pub fn new(store: &'a DocStore, schema: CollectionSchema) -> Result<Self> {
        Self::with_sync(store, schema, Vec::new())
    }

    /// Construct a repository with sync hooks attached to its write path.
    /// Every hook's relationship must name this collection as its source.
    pub fn with_sync(
        store: &'a DocStore,
        schema: CollectionSchema,
        hooks: Vec<SyncHook>,
    ) -> Result<Self> {
        schema.validate()?;
        for hook in &hooks {
            if hook.relationship.source != schema.name {
                return Err(SoftstoreError::Schema(format!(
                    "Sync hook source '{}' does not match collection '{}'",
                    hook.relationship.source, schema.name
                )));
            }
        }
        Ok(Repository {
            store,
            schema,
            hooks,
            _payload: PhantomData,
        })
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    // ── Create ───────────────────────────────────────────────────────

    /// Store a new document with a generated id, stamping `created_by`.
    pub fn create(&self, data: T, actor: &str) -> Result<Document<T>> {
        let id = self.schema.id.generate();
        self.create_with_id(&id, data, actor)
    }

    /// Store a new document under a caller-supplied id. Id collisions
    /// surface as store errors; no other uniqueness is enforced.
    pub fn create_with_id(&self, id: &str, data: T, actor: &str) -> Result<Document<T>> {
        let payload = serde_json::to_value(&data)?;
        let record = DocumentRecord {
            id: id.to_string(),
            collection: self.schema.name.clone(),
            deleted: false,
            created_at: Utc::now().to_rfc3339(),
            deleted_at: None,
            created_by: actor.to_string(),
            updated_by: None,
            deleted_by: None,
            data_json: serde_json::to_string(&payload)?,
        };

        self.store.begin_transaction()?;
        let result = (|| {
            self.store.insert(&record)?;
            let doc = dynamic_document(&record, payload.clone())?;
            for hook in self.hooks_in_phase(SyncPhase::PostCreate) {
                let fields = (hook.relationship.project)(&doc);
                sync::propagate(self.store, &hook.relationship, id, &fields)?;
            }
            Ok(())
        })();
        self.finish_transaction(result)?;

        document_from_record(record, serde_json::from_value(payload)?)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// List active documents in insertion order.
    pub fn find_all(&self, page: Page) -> Result<Vec<Document<T>>> {
        let records = self
            .store
            .list(&self.schema.name, false, page.limit, page.offset)?;
        records.into_iter().map(typed_document).collect()
    }

    /// List soft-deleted documents in insertion order.
    pub fn find_soft_deleted(&self, page: Page) -> Result<Vec<Document<T>>> {
        let records = self
            .store
            .list(&self.schema.name, true, page.limit, page.offset)?;
        records.into_iter().map(typed_document).collect()
    }

    /// Case-insensitive substring search on one declared payload field,
    /// scoped to active documents. Documents whose field value is not a
    /// string are skipped.
    pub fn find_all_by(&self, text: &str, field: &str, page: Page) -> Result<Vec<Document<T>>> {
        self.schema.require_field(field)?;
        let pattern = RegexBuilder::new(&regex::escape(text))
            .case_insensitive(true)
            .build()
            .map_err(|e| SoftstoreError::Other(format!("Invalid search pattern: {e}")))?;

        let records = self.store.list(&self.schema.name, false, None, 0)?;
        let mut matches = Vec::new();
        for record in records {
            let payload = record.parse_payload()?;
            if let Some(Value::String(value)) = payload.get(field) {
                if pattern.is_match(value) {
                    matches.push(record);
                }
            }
        }

        matches
            .into_iter()
            .skip(page.offset)
            .take(page.limit.unwrap_or(usize::MAX))
            .map(typed_document)
            .collect()
    }

    /// Get one active document by id.
    pub fn find_by_id(&self, id: &str) -> Result<Document<T>> {
        let record = self.require_record(id, Visibility::Active)?;
        typed_document(record)
    }

    /// First active document whose declared payload field equals `value`,
    /// in insertion order.
    pub fn find_one(&self, value: &Value, field: &str) -> Result<Document<T>> {
        self.schema.require_field(field)?;
        let records = self.store.list(&self.schema.name, false, None, 0)?;
        for record in records {
            let payload = record.parse_payload()?;
            if payload.get(field) == Some(value) {
                return typed_document(record);
            }
        }
        Err(SoftstoreError::not_found(
            &self.schema.name,
            format!("{field}={value}"),
        ))
    }

    // ── Sub-document projections ─────────────────────────────────────

    /// Load an active parent and replace `array_field` in the returned
    /// value with only the elements whose deleted flag equals
    /// `want_deleted`. A pure projection: stored data is never touched.
    pub fn find_with_array(
        &self,
        id: &str,
        array_field: &str,
        want_deleted: bool,
    ) -> Result<Document<T>> {
        self.schema.require_array(array_field)?;
        let record = self.require_record(id, Visibility::Active)?;
        let mut payload = record.parse_payload()?;

        filter_array_field(&mut payload, array_field, want_deleted);

        document_from_record(record, serde_json::from_value(payload)?)
    }

    /// Two-level projection: the parent must match `parent_deleted`,
    /// `array_field` elements are filtered by `sub_deleted`, and each
    /// surviving element's `nested_field` is filtered by `nested_deleted`.
    /// The two filters are independent; survivors are never re-evaluated
    /// by the nested flag.
    pub fn find_with_nested_array(
        &self,
        id: &str,
        array_field: &str,
        nested_field: &str,
        parent_deleted: bool,
        sub_deleted: bool,
        nested_deleted: bool,
    ) -> Result<Document<T>> {
        let spec = self.schema.require_array(array_field)?;
        if spec.element(nested_field).is_none() {
            return Err(SoftstoreError::Schema(format!(
                "Array field '{}' of collection '{}' has no nested array '{}'",
                array_field, self.schema.name, nested_field
            )));
        }

        let visibility = if parent_deleted {
            Visibility::Deleted
        } else {
            Visibility::Active
        };
        let record = self.require_record(id, visibility)?;
        let mut payload = record.parse_payload()?;

        filter_array_field(&mut payload, array_field, sub_deleted);
        if let Some(Value::Array(elements)) = payload.get_mut(array_field) {
            for element in elements {
                filter_array_field(element, nested_field, nested_deleted);
            }
        }

        document_from_record(record, serde_json::from_value(payload)?)
    }

    // ── Update ───────────────────────────────────────────────────────

    /// Merge non-null top-level fields of `partial` into the active
    /// document's payload and stamp `updated_by`. Pre-update hooks run
    /// before the write, post-update hooks after it, all in one store
    /// transaction.
    pub fn update(&self, id: &str, partial: Value, actor: &str) -> Result<Document<T>> {
        let partial = match partial {
            Value::Object(map) => map,
            _ => {
                return Err(SoftstoreError::Schema(
                    "Update partial must be a JSON object".into(),
                ))
            }
        };

        self.store.begin_transaction()?;
        let result = (|| {
            let record = self.require_record(id, Visibility::Active)?;
            let mut payload = record.parse_payload()?;
            let fields = payload.as_object_mut().ok_or_else(|| {
                SoftstoreError::Other(format!(
                    "Payload of {}/{} is not a JSON object",
                    self.schema.name, id
                ))
            })?;

            for hook in self.hooks_in_phase(SyncPhase::PreUpdate) {
                if !hook.relationship.touches_watched(&partial) {
                    continue;
                }
                // Project the merged pre-image so the projection always
                // sees a complete source document, not a partial payload.
                let mut merged = fields.clone();
                merge_fields(&mut merged, &partial);
                let doc = dynamic_document(&record, Value::Object(merged))?;
                let projected = (hook.relationship.project)(&doc);
                sync::propagate(self.store, &hook.relationship, id, &projected)?;
            }

            merge_fields(fields, &partial);
            let data_json = serde_json::to_string(&payload)?;
            self.store
                .set_payload(&self.schema.name, id, &data_json, Some(actor))?;

            self.run_post_update_hooks(id, Visibility::Active)?;
            Ok(())
        })();
        self.finish_transaction(result)?;

        let record = self.require_record(id, Visibility::Active)?;
        typed_document(record)
    }

    // ── Lifecycle state machine ──────────────────────────────────────

    /// Soft-delete an active document, stamping the tombstone fields.
    /// Absent or already-deleted documents are NotFound under the
    /// active-only visibility rule.
    pub fn soft_delete(&self, id: &str, actor: &str) -> Result<Document<T>> {
        self.store.begin_transaction()?;
        let result = (|| {
            let now = Utc::now().to_rfc3339();
            if !self.store.mark_deleted(&self.schema.name, id, &now, actor)? {
                return Err(SoftstoreError::not_found(&self.schema.name, id));
            }
            self.run_post_update_hooks(id, Visibility::Deleted)?;
            Ok(())
        })();
        self.finish_transaction(result)?;

        let record = self.require_record(id, Visibility::Deleted)?;
        typed_document(record)
    }

    /// Restore a soft-deleted document to active, clearing the tombstone
    /// fields and stamping `updated_by`. Restoring an active document is a
    /// Conflict, not a no-op.
    pub fn restore(&self, id: &str, actor: &str) -> Result<Document<T>> {
        self.store.begin_transaction()?;
        let result = (|| {
            let record = self.require_any_record(id)?;
            if !record.deleted {
                return Err(SoftstoreError::Conflict(format!(
                    "Document {}/{} is not deleted",
                    self.schema.name, id
                )));
            }
            self.store.mark_restored(&self.schema.name, id, actor)?;
            self.run_post_update_hooks(id, Visibility::Active)?;
            Ok(())
        })();
        self.finish_transaction(result)?;

        let record = self.require_record(id, Visibility::Active)?;
        typed_document(record)
    }

    /// Permanently remove a soft-deleted document. A document that was
    /// never soft-deleted is a Conflict; an absent one is NotFound.
    pub fn hard_delete(&self, id: &str) -> Result<Document<T>> {
        let record = self.require_any_record(id)?;
        if !record.deleted {
            return Err(SoftstoreError::Conflict(format!(
                "Document {}/{} must be soft-deleted before hard delete",
                self.schema.name, id
            )));
        }
        self.store.remove(&self.schema.name, id)?;
        typed_document(record)
    }

    /// Permanently remove every soft-deleted document of the collection.
    /// Returns the purge count.
    pub fn purge_soft_deleted(&self) -> Result<u64> {
        self.store.purge_deleted(&self.schema.name)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn hooks_in_phase(&self, phase: SyncPhase) -> impl Iterator<Item = &SyncHook> {
        self.hooks.iter().filter(move |hook| hook.phase == phase)
    }

    /// Post-update hooks see the post-write document value and propagate
    /// unconditionally.
    fn run_post_update_hooks(&self, id: &str, visibility: Visibility) -> Result<()> {
        let mut hooks = self.hooks_in_phase(SyncPhase::PostUpdate).peekable();
        if hooks.peek().is_none() {
            return Ok(());
        }

        let record = self.require_record(id, visibility)?;
        let payload = record.parse_payload()?;
        let doc = dynamic_document(&record, payload)?;
        for hook in hooks {
            let fields = (hook.relationship.project)(&doc);
            sync::propagate(self.store, &hook.relationship, id, &fields)?;
        }
        Ok(())
    }

    fn finish_transaction(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => self.store.commit_transaction(),
            Err(err) => {
                let _ = self.store.rollback_transaction();
                Err(err)
            }
        }
    }

    pub(crate) fn require_record(&self, id: &str, visibility: Visibility) -> Result<DocumentRecord> {
        self.store
            .get(&self.schema.name, id, visibility)?
            .ok_or_else(|| SoftstoreError::not_found(&self.schema.name, id))
    }

    fn require_any_record(&self, id: &str) -> Result<DocumentRecord> {
        self.require_record(id, Visibility::Any)
    }
}

/// Drop array elements whose deleted flag does not equal `want_deleted`.
/// Elements without a flag count as active. Missing or non-array fields are
/// left alone.
fn filter_array_field(payload: &mut Value, field: &str, want_deleted: bool) {
    if let Some(Value::Array(elements)) = payload.get_mut(field) {
        elements.retain(|element| element_deleted(element) == want_deleted);
    }
}

pub(crate) fn element_deleted(element: &Value) -> bool {
    element
        .get("deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SoftstoreError::Other(format!("Invalid stored timestamp '{raw}': {e}")))
}

fn document_from_record<T>(record: DocumentRecord, data: T) -> Result<Document<T>> {
    Ok(Document {
        id: record.id,
        created_at: parse_timestamp(&record.created_at)?,
        created_by: record.created_by,
        updated_by: record.updated_by,
        deleted: record.deleted,
        deleted_at: record
            .deleted_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        deleted_by: record.deleted_by,
        data,
    })
}

fn typed_document<T: DeserializeOwned>(record: DocumentRecord) -> Result<Document<T>> {
    let payload = record.parse_payload()?;
    document_from_record(record, serde_json::from_value(payload)?)
}

pub(crate) fn dynamic_document(record: &DocumentRecord, payload: Value) -> Result<Document<Value>> {
    document_from_record(record.clone(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ArraySpec;
    use crate::sync::Relationship;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::{json, Map};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Course {
        title: String,
        #[serde(default)]
        units: Vec<Value>,
    }

    impl Course {
        fn titled(title: &str) -> Self {
            Course {
                title: title.to_string(),
                units: Vec::new(),
            }
        }
    }

    fn course_schema() -> CollectionSchema {
        CollectionSchema::new("courses")
            .scalar("title")
            .array(ArraySpec::new("units").element_array(ArraySpec::new("lessons")))
    }

    fn setup() -> DocStore {
        DocStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_find_by_id() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();

        let created = repo.create(Course::titled("Rust basics"), "teacher-1").unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.created_by, "teacher-1");
        assert!(!created.deleted);

        let found = repo.find_by_id(&created.id).unwrap();
        assert_eq!(found.data, created.data);
    }

    #[test]
    fn test_soft_delete_hides_from_active_reads() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let doc = repo.create(Course::titled("Rust"), "t").unwrap();

        let deleted = repo.soft_delete(&doc.id, "admin").unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.deleted_by.as_deref(), Some("admin"));
        assert!(deleted.deleted_at.is_some());

        assert!(matches!(
            repo.find_by_id(&doc.id),
            Err(SoftstoreError::NotFound { .. })
        ));
        let trash = repo.find_soft_deleted(Page::default()).unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].id, doc.id);

        // Already deleted: invisible on the active path.
        assert!(matches!(
            repo.soft_delete(&doc.id, "admin"),
            Err(SoftstoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_hard_delete_requires_soft_delete_first() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let doc = repo.create(Course::titled("Rust"), "t").unwrap();

        assert!(matches!(
            repo.hard_delete(&doc.id),
            Err(SoftstoreError::Conflict(_))
        ));

        repo.soft_delete(&doc.id, "admin").unwrap();
        let removed = repo.hard_delete(&doc.id).unwrap();
        assert_eq!(removed.id, doc.id);

        assert!(matches!(
            repo.hard_delete(&doc.id),
            Err(SoftstoreError::NotFound { .. })
        ));
        assert!(repo.find_soft_deleted(Page::default()).unwrap().is_empty());
    }

    #[test]
    fn test_restore_state_machine() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let doc = repo.create(Course::titled("Rust"), "t").unwrap();

        // Restoring an active document is rejected, not a no-op.
        assert!(matches!(
            repo.restore(&doc.id, "admin"),
            Err(SoftstoreError::Conflict(_))
        ));

        repo.soft_delete(&doc.id, "admin").unwrap();
        let restored = repo.restore(&doc.id, "admin").unwrap();
        assert!(!restored.deleted);
        assert!(restored.deleted_at.is_none());
        assert!(restored.deleted_by.is_none());
        assert_eq!(restored.updated_by.as_deref(), Some("admin"));

        assert!(matches!(
            repo.restore(&doc.id, "admin"),
            Err(SoftstoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.restore("missing", "admin"),
            Err(SoftstoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_all_pagination_and_visibility() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();

        let ids: Vec<String> = (0..4)
            .map(|i| repo.create(Course::titled(&format!("c{i}")), "t").unwrap().id)
            .collect();
        repo.soft_delete(&ids[0], "t").unwrap();

        let all = repo.find_all(Page::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].data.title, "c1");

        let window = repo.find_all(Page::new(1, 1)).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].data.title, "c2");
    }

    #[test]
    fn test_find_all_by_substring_case_insensitive() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        repo.create(Course::titled("Advanced Rust"), "t").unwrap();
        repo.create(Course::titled("Intro to rust"), "t").unwrap();
        repo.create(Course::titled("Go basics"), "t").unwrap();

        let hits = repo.find_all_by("RUST", "title", Page::default()).unwrap();
        assert_eq!(hits.len(), 2);

        let paged = repo.find_all_by("rust", "title", Page::new(1, 1)).unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].data.title, "Intro to rust");
    }

    #[test]
    fn test_find_all_by_unknown_field_is_schema_error() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        assert!(matches!(
            repo.find_all_by("x", "does_not_exist", Page::default()),
            Err(SoftstoreError::Schema(_))
        ));
    }

    #[test]
    fn test_find_one_by_field_equality() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        repo.create(Course::titled("Rust"), "t").unwrap();
        let second = repo.create(Course::titled("Go"), "t").unwrap();

        let found = repo.find_one(&json!("Go"), "title").unwrap();
        assert_eq!(found.id, second.id);

        assert!(matches!(
            repo.find_one(&json!("Zig"), "title"),
            Err(SoftstoreError::NotFound { .. })
        ));
        assert!(matches!(
            repo.find_one(&json!("x"), "nope"),
            Err(SoftstoreError::Schema(_))
        ));
    }

    #[test]
    fn test_update_merges_and_stamps_actor() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let doc = repo.create(Course::titled("Rust"), "t").unwrap();

        let updated = repo
            .update(&doc.id, json!({ "title": "Rust 2024" }), "editor")
            .unwrap();
        assert_eq!(updated.data.title, "Rust 2024");
        assert_eq!(updated.updated_by.as_deref(), Some("editor"));

        repo.soft_delete(&doc.id, "t").unwrap();
        assert!(matches!(
            repo.update(&doc.id, json!({ "title": "x" }), "editor"),
            Err(SoftstoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_purge_soft_deleted_counts() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let a = repo.create(Course::titled("a"), "t").unwrap();
        let b = repo.create(Course::titled("b"), "t").unwrap();
        repo.create(Course::titled("c"), "t").unwrap();
        repo.soft_delete(&a.id, "t").unwrap();
        repo.soft_delete(&b.id, "t").unwrap();

        assert_eq!(repo.purge_soft_deleted().unwrap(), 2);
        assert_eq!(repo.find_all(Page::default()).unwrap().len(), 1);
        assert!(repo.find_soft_deleted(Page::default()).unwrap().is_empty());
    }

    #[test]
    fn test_find_with_array_projects_by_deleted_flag() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let course = Course {
            title: "Rust".into(),
            units: vec![
                json!({ "id": "u1", "deleted": false, "title": "Intro" }),
                json!({ "id": "u2", "deleted": false, "title": "Ownership" }),
            ],
        };
        let doc = repo.create(course, "t").unwrap();
        repo.array("units")
            .unwrap()
            .soft_delete(&doc.id, "u1", "t")
            .unwrap();

        let active = repo.find_with_array(&doc.id, "units", false).unwrap();
        let ids: Vec<_> = active.data.units.iter().map(|u| u["id"].clone()).collect();
        assert_eq!(ids, [json!("u2")]);

        let inactive = repo.find_with_array(&doc.id, "units", true).unwrap();
        let ids: Vec<_> = inactive.data.units.iter().map(|u| u["id"].clone()).collect();
        assert_eq!(ids, [json!("u1")]);

        // Projection only: stored data still holds both elements.
        let raw = repo.find_by_id(&doc.id).unwrap();
        assert_eq!(raw.data.units.len(), 2);
    }

    #[test]
    fn test_find_with_nested_array_filters_independently() {
        let store = setup();
        let repo: Repository<Course> = Repository::new(&store, course_schema()).unwrap();
        let course = Course {
            title: "Rust".into(),
            units: vec![
                json!({
                    "id": "u1",
                    "deleted": false,
                    "lessons": [
                        { "id": "l1", "deleted": false },
                        { "id": "l2", "deleted": true },
                    ],
                }),
                json!({ "id": "u2", "deleted": true, "lessons": [] }),
            ],
        };
        let doc = repo.create(course, "t").unwrap();

        let projected = repo
            .find_with_nested_array(&doc.id, "units", "lessons", false, false, false)
            .unwrap();
        assert_eq!(projected.data.units.len(), 1);
        assert_eq!(projected.data.units[0]["id"], "u1");
        let lessons = projected.data.units[0]["lessons"].as_array().unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0]["id"], "l1");

        let unknown = repo.find_with_nested_array(&doc.id, "units", "quizzes", false, false, false);
        assert!(matches!(unknown, Err(SoftstoreError::Schema(_))));
    }

    // ── Sync hook integration ────────────────────────────────────────

    fn title_relationship() -> Relationship {
        Relationship::new("courses", "enrollments", "course_id", &["title"], |doc| {
            let mut fields = Map::new();
            fields.insert("course_title".into(), doc.data["title"].clone());
            fields
        })
    }

    fn seed_enrollment(store: &DocStore, id: &str, course_id: &str) {
        let repo: Repository<Value> =
            Repository::new(store, CollectionSchema::new("enrollments")).unwrap();
        repo.create_with_id(
            id,
            json!({ "course_id": course_id, "course_title": "stale" }),
            "t",
        )
        .unwrap();
    }

    #[test]
    fn test_post_update_hook_propagates_title() {
        let store = setup();
        let repo: Repository<Course> = Repository::with_sync(
            &store,
            course_schema(),
            vec![SyncHook::post_update(title_relationship())],
        )
        .unwrap();

        let course = repo.create(Course::titled("x"), "t").unwrap();
        seed_enrollment(&store, "e1", &course.id);
        seed_enrollment(&store, "e2", &course.id);
        seed_enrollment(&store, "e3", "other-course");

        repo.update(&course.id, json!({ "title": "y" }), "t").unwrap();

        let enrollments: Repository<Value> =
            Repository::new(&store, CollectionSchema::new("enrollments")).unwrap();
        assert_eq!(
            enrollments.find_by_id("e1").unwrap().data["course_title"],
            "y"
        );
        assert_eq!(
            enrollments.find_by_id("e2").unwrap().data["course_title"],
            "y"
        );
        assert_eq!(
            enrollments.find_by_id("e3").unwrap().data["course_title"],
            "stale"
        );
    }

    #[test]
    fn test_pre_update_hook_skips_unwatched_fields() {
        let store = setup();
        let schema = course_schema().scalar("description");
        let repo: Repository<Value> = Repository::with_sync(
            &store,
            schema,
            vec![SyncHook::pre_update(title_relationship())],
        )
        .unwrap();

        let course = repo
            .create(json!({ "title": "x", "description": "d" }), "t")
            .unwrap();
        seed_enrollment(&store, "e1", &course.id);

        let enrollments: Repository<Value> =
            Repository::new(&store, CollectionSchema::new("enrollments")).unwrap();

        repo.update(&course.id, json!({ "description": "d2" }), "t")
            .unwrap();
        assert_eq!(
            enrollments.find_by_id("e1").unwrap().data["course_title"],
            "stale"
        );

        repo.update(&course.id, json!({ "title": "y" }), "t").unwrap();
        assert_eq!(
            enrollments.find_by_id("e1").unwrap().data["course_title"],
            "y"
        );
    }

    #[test]
    fn test_post_create_hook_reconciles_prepopulated_documents() {
        let store = setup();
        seed_enrollment(&store, "e1", "course-1");

        let repo: Repository<Course> = Repository::with_sync(
            &store,
            course_schema(),
            vec![SyncHook::post_create(title_relationship())],
        )
        .unwrap();
        repo.create_with_id("course-1", Course::titled("Fresh"), "t")
            .unwrap();

        let enrollments: Repository<Value> =
            Repository::new(&store, CollectionSchema::new("enrollments")).unwrap();
        assert_eq!(
            enrollments.find_by_id("e1").unwrap().data["course_title"],
            "Fresh"
        );
    }

    #[test]
    fn test_hook_source_must_match_collection() {
        let store = setup();
        let result: Result<Repository<Course>> = Repository::with_sync(
            &store,
            CollectionSchema::new("orders"),
            vec![SyncHook::post_update(title_relationship())],
        );
        assert!(matches!(result, Err(SoftstoreError::Schema(_))));
    }
}
