pub mod document;
pub mod error;
pub mod repository;
pub mod schema;
pub mod store;
pub mod subdoc;
pub mod sync;

pub use document::{Document, Page};
pub use error::{Result, SoftstoreError};
pub use repository::Repository;
pub use schema::{ArraySpec, CollectionSchema, FieldSpec, IdStrategy};
pub use store::DocStore;
pub use subdoc::ArrayField;
pub use sync::{Relationship, SyncHook, SyncPhase};
