use crate::error::{Result, SoftstoreError};

/// How ids are generated when the caller does not supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    #[default]
    Ulid,
    Uuid,
    Nanoid,
}

impl IdStrategy {
    pub fn generate(&self) -> String {
        match self {
            IdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

/// Declares one array-valued payload field: the field name, the identity key
/// its elements carry, and any array fields the elements themselves embed.
#[derive(Debug, Clone)]
pub struct ArraySpec {
    pub name: String,
    pub id_field: String,
    pub element_arrays: Vec<ArraySpec>,
}

impl ArraySpec {
    pub fn new(name: &str) -> Self {
        ArraySpec {
            name: name.to_string(),
            id_field: "id".to_string(),
            element_arrays: Vec::new(),
        }
    }

    /// Override the identity key of the elements (default `"id"`).
    pub fn id_field(mut self, field: &str) -> Self {
        self.id_field = field.to_string();
        self
    }

    /// Declare an array field embedded in each element.
    pub fn element_array(mut self, spec: ArraySpec) -> Self {
        self.element_arrays.push(spec);
        self
    }

    pub fn element(&self, name: &str) -> Option<&ArraySpec> {
        self.element_arrays.iter().find(|a| a.name == name)
    }
}

/// A declared payload field of a collection.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    Scalar { name: String },
    Array(ArraySpec),
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Scalar { name } => name,
            FieldSpec::Array(spec) => &spec.name,
        }
    }
}

/// Static descriptor for one collection: its name, id generation strategy,
/// and declared payload fields. Built once with the builder methods and
/// validated when a repository is constructed; field lookups after that
/// point never re-check shape at call time.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    pub name: String,
    pub id: IdStrategy,
    pub fields: Vec<FieldSpec>,
}

impl CollectionSchema {
    pub fn new(name: &str) -> Self {
        CollectionSchema {
            name: name.to_string(),
            id: IdStrategy::default(),
            fields: Vec::new(),
        }
    }

    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id = strategy;
        self
    }

    pub fn scalar(mut self, name: &str) -> Self {
        self.fields.push(FieldSpec::Scalar {
            name: name.to_string(),
        });
        self
    }

    pub fn array(mut self, spec: ArraySpec) -> Self {
        self.fields.push(FieldSpec::Array(spec));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Look up a declared field, failing if the collection does not declare it.
    pub fn require_field(&self, name: &str) -> Result<&FieldSpec> {
        self.field(name).ok_or_else(|| {
            SoftstoreError::Schema(format!(
                "Collection '{}' has no field '{}'",
                self.name, name
            ))
        })
    }

    /// Look up a declared field that must be array-typed.
    pub fn require_array(&self, name: &str) -> Result<&ArraySpec> {
        match self.require_field(name)? {
            FieldSpec::Array(spec) => Ok(spec),
            FieldSpec::Scalar { .. } => Err(SoftstoreError::Schema(format!(
                "Field '{}' of collection '{}' is not array-typed",
                name, self.name
            ))),
        }
    }

    /// Structural validation, run once at repository construction.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SoftstoreError::Schema(
                "Collection name must not be empty".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name().is_empty() {
                return Err(SoftstoreError::Schema(format!(
                    "Collection '{}' declares a field with an empty name",
                    self.name
                )));
            }
            if !seen.insert(field.name()) {
                return Err(SoftstoreError::Schema(format!(
                    "Collection '{}' declares field '{}' twice",
                    self.name,
                    field.name()
                )));
            }
            if let FieldSpec::Array(spec) = field {
                validate_array_spec(&self.name, spec)?;
            }
        }
        Ok(())
    }
}

fn validate_array_spec(collection: &str, spec: &ArraySpec) -> Result<()> {
    if spec.id_field.is_empty() {
        return Err(SoftstoreError::Schema(format!(
            "Array field '{}' of collection '{}' has an empty id field",
            spec.name, collection
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for nested in &spec.element_arrays {
        if !seen.insert(nested.name.as_str()) {
            return Err(SoftstoreError::Schema(format!(
                "Array field '{}' of collection '{}' declares nested array '{}' twice",
                spec.name, collection, nested.name
            )));
        }
        validate_array_spec(collection, nested)?;
    }
    Ok(())
}
