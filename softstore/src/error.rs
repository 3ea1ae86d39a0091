use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoftstoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl SoftstoreError {
    pub(crate) fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        SoftstoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SoftstoreError>;
