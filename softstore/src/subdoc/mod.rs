//! Sub-document lifecycle scoped to one declared array field of a parent
//! document. Elements are JSON objects carrying their own identity key and
//! `deleted`/`deleted_by` pair; creation is a push, soft delete is a
//! targeted element update, and hard removal (pull) is gated on prior
//! soft delete.

use crate::error::{Result, SoftstoreError};
use crate::repository::{element_deleted, Repository};
use crate::schema::ArraySpec;
use crate::store::Visibility;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A handle scoped to one array field of a collection. Obtained via
/// [`Repository::array`], which validates the field against the schema
/// descriptor once; operations on the handle never re-check it.
pub struct ArrayField<'r, 'a, T> {
    repo: &'r Repository<'a, T>,
    spec: &'r ArraySpec,
}

impl<'a, T> Repository<'a, T>
where
    T: Serialize + DeserializeOwned,
{
    /// Get a sub-document handle for a declared array field. Unknown or
    /// non-array fields are schema errors.
    pub fn array(&self, field: &str) -> Result<ArrayField<'_, 'a, T>> {
        let spec = self.schema.require_array(field)?;
        Ok(ArrayField { repo: self, spec })
    }
}

impl<'r, 'a, T> ArrayField<'r, 'a, T>
where
    T: Serialize + DeserializeOwned,
{
    fn scope(&self) -> String {
        format!("{}.{}", self.repo.schema.name, self.spec.name)
    }

    /// Append an element to the array on the active parent and stamp the
    /// parent's `updated_by`. A missing element id is generated with the
    /// collection's id strategy; a missing deleted flag defaults to false.
    /// Returns the appended element: the last array entry after the
    /// write, which is best-effort under independent concurrent writers.
    pub fn push(&self, parent_id: &str, actor: &str, element: Value) -> Result<Value> {
        let mut element = match element {
            Value::Object(map) => map,
            _ => {
                return Err(SoftstoreError::Schema(
                    "Sub-document must be a JSON object".into(),
                ))
            }
        };
        if element
            .get(&self.spec.id_field)
            .map_or(true, Value::is_null)
        {
            element.insert(
                self.spec.id_field.clone(),
                Value::String(self.repo.schema.id.generate()),
            );
        }
        element.entry("deleted").or_insert(Value::Bool(false));

        let record = self.repo.require_record(parent_id, Visibility::Active)?;
        let mut payload = record.parse_payload()?;
        let elements = self.elements_mut(&mut payload, parent_id)?;
        elements.push(Value::Object(element));

        self.write_payload(parent_id, &payload, Some(actor))?;

        let record = self.repo.require_record(parent_id, Visibility::Active)?;
        let payload = record.parse_payload()?;
        payload
            .get(&self.spec.name)
            .and_then(Value::as_array)
            .and_then(|elements| elements.last())
            .cloned()
            .ok_or_else(|| {
                SoftstoreError::Other(format!(
                    "Array field '{}' vanished after push on {}/{}",
                    self.spec.name, self.repo.schema.name, parent_id
                ))
            })
    }

    /// Linear scan for the element whose identity field equals `sub_id`.
    pub fn find_by_id(&self, parent_id: &str, sub_id: &str) -> Result<Value> {
        let record = self.repo.require_record(parent_id, Visibility::Active)?;
        let payload = record.parse_payload()?;
        payload
            .get(&self.spec.name)
            .and_then(Value::as_array)
            .and_then(|elements| {
                elements
                    .iter()
                    .find(|element| self.element_id_is(element, sub_id))
            })
            .cloned()
            .ok_or_else(|| SoftstoreError::not_found(self.scope(), sub_id))
    }

    /// Soft-delete one element, leaving its siblings untouched. An element
    /// that is already deleted is NotFound under the active-only
    /// visibility rule.
    pub fn soft_delete(&self, parent_id: &str, sub_id: &str, actor: &str) -> Result<Value> {
        let record = self.repo.require_record(parent_id, Visibility::Active)?;
        let mut payload = record.parse_payload()?;
        let elements = self.elements_mut(&mut payload, parent_id)?;

        let position = elements
            .iter()
            .position(|element| self.element_id_is(element, sub_id))
            .ok_or_else(|| SoftstoreError::not_found(self.scope(), sub_id))?;
        if element_deleted(&elements[position]) {
            return Err(SoftstoreError::not_found(self.scope(), sub_id));
        }

        {
            let element = elements[position].as_object_mut().ok_or_else(|| {
                SoftstoreError::Other(format!(
                    "Element '{sub_id}' of '{}' is not a JSON object",
                    self.scope()
                ))
            })?;
            element.insert("deleted".into(), Value::Bool(true));
            element.insert("deleted_by".into(), Value::String(actor.to_string()));
        }
        let updated = elements[position].clone();

        self.write_payload(parent_id, &payload, None)?;
        Ok(updated)
    }

    /// Remove one element permanently. An element that was never
    /// soft-deleted is a Conflict. Returns the removed element's last
    /// known state.
    pub fn pull_if_deleted(&self, parent_id: &str, sub_id: &str) -> Result<Value> {
        let record = self.repo.require_record(parent_id, Visibility::Active)?;
        let mut payload = record.parse_payload()?;
        let elements = self.elements_mut(&mut payload, parent_id)?;

        let position = elements
            .iter()
            .position(|element| self.element_id_is(element, sub_id))
            .ok_or_else(|| SoftstoreError::not_found(self.scope(), sub_id))?;
        if !element_deleted(&elements[position]) {
            return Err(SoftstoreError::Conflict(format!(
                "Sub-document {}/{sub_id} must be soft-deleted before removal",
                self.scope()
            )));
        }

        let removed = elements.remove(position);
        self.write_payload(parent_id, &payload, None)?;
        Ok(removed)
    }

    fn element_id_is(&self, element: &Value, sub_id: &str) -> bool {
        element
            .get(&self.spec.id_field)
            .and_then(Value::as_str)
            .map_or(false, |id| id == sub_id)
    }

    /// Borrow the array field of the parent payload, creating it empty
    /// when absent. A stored non-array value under the declared name means
    /// the payload no longer matches the descriptor.
    fn elements_mut<'p>(
        &self,
        payload: &'p mut Value,
        parent_id: &str,
    ) -> Result<&'p mut Vec<Value>> {
        let obj = payload.as_object_mut().ok_or_else(|| {
            SoftstoreError::Other(format!(
                "Payload of {}/{parent_id} is not a JSON object",
                self.repo.schema.name
            ))
        })?;
        match obj
            .entry(self.spec.name.clone())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(elements) => Ok(elements),
            _ => Err(SoftstoreError::Schema(format!(
                "Stored field '{}' of {}/{parent_id} is not an array",
                self.spec.name, self.repo.schema.name
            ))),
        }
    }

    fn write_payload(
        &self,
        parent_id: &str,
        payload: &Value,
        updated_by: Option<&str>,
    ) -> Result<()> {
        let data_json = serde_json::to_string(payload)?;
        self.repo
            .store
            .set_payload(&self.repo.schema.name, parent_id, &data_json, updated_by)?;
        Ok(())
    }
}
