use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Visibility filter for reads against the documents table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Active,
    Deleted,
    Any,
}

/// The embedded document store: one SQLite database holding every
/// collection's documents. Lifecycle metadata lives in dedicated columns so
/// visibility filters are plain predicates; the entity payload is a JSON
/// blob in `data_json`. Insertion order is `rowid` order.
pub struct DocStore {
    conn: Connection,
}

impl DocStore {
    /// Open or create the store database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = DocStore { conn };
        store.initialize_tables()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing and dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = DocStore { conn };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT NOT NULL,
                collection TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                deleted_at TEXT,
                created_by TEXT NOT NULL,
                updated_by TEXT,
                deleted_by TEXT,
                data_json TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            CREATE INDEX IF NOT EXISTS idx_documents_deleted ON documents(collection, deleted);
            ",
        )?;
        Ok(())
    }

    // ── Document rows ────────────────────────────────────────────────

    /// Insert a new document row. Primary-key conflicts surface as SQLite
    /// errors; no other uniqueness is enforced.
    pub fn insert(&self, record: &DocumentRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO documents
                 (id, collection, deleted, created_at, deleted_at, created_by, updated_by, deleted_by, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.collection,
                record.deleted as i64,
                record.created_at,
                record.deleted_at,
                record.created_by,
                record.updated_by,
                record.deleted_by,
                record.data_json,
            ],
        )?;
        Ok(())
    }

    /// Get a document row by collection and id under a visibility filter.
    pub fn get(
        &self,
        collection: &str,
        id: &str,
        visibility: Visibility,
    ) -> Result<Option<DocumentRecord>> {
        let sql = match visibility {
            Visibility::Active => {
                "SELECT id, collection, deleted, created_at, deleted_at, created_by, updated_by, deleted_by, data_json
                 FROM documents WHERE collection = ?1 AND id = ?2 AND deleted = 0"
            }
            Visibility::Deleted => {
                "SELECT id, collection, deleted, created_at, deleted_at, created_by, updated_by, deleted_by, data_json
                 FROM documents WHERE collection = ?1 AND id = ?2 AND deleted = 1"
            }
            Visibility::Any => {
                "SELECT id, collection, deleted, created_at, deleted_at, created_by, updated_by, deleted_by, data_json
                 FROM documents WHERE collection = ?1 AND id = ?2"
            }
        };
        let result = self
            .conn
            .query_row(sql, params![collection, id], row_to_record)
            .optional()?;
        Ok(result)
    }

    /// List document rows of a collection with the given deleted flag, in
    /// insertion (rowid) order, with skip/limit applied in SQL.
    pub fn list(
        &self,
        collection: &str,
        deleted: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, collection, deleted, created_at, deleted_at, created_by, updated_by, deleted_by, data_json
             FROM documents WHERE collection = ?1 AND deleted = ?2
             ORDER BY rowid LIMIT ?3 OFFSET ?4",
        )?;
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(
            params![collection, deleted as i64, limit, offset as i64],
            row_to_record,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Replace a document's payload, optionally stamping `updated_by`.
    pub fn set_payload(
        &self,
        collection: &str,
        id: &str,
        data_json: &str,
        updated_by: Option<&str>,
    ) -> Result<bool> {
        let changed = match updated_by {
            Some(actor) => self.conn.execute(
                "UPDATE documents SET data_json = ?3, updated_by = ?4
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id, data_json, actor],
            )?,
            None => self.conn.execute(
                "UPDATE documents SET data_json = ?3
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id, data_json],
            )?,
        };
        Ok(changed > 0)
    }

    /// Flip an active document to deleted, stamping the tombstone fields.
    /// Returns false when no active row matched.
    pub fn mark_deleted(
        &self,
        collection: &str,
        id: &str,
        deleted_at: &str,
        deleted_by: &str,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE documents SET deleted = 1, deleted_at = ?3, deleted_by = ?4
             WHERE collection = ?1 AND id = ?2 AND deleted = 0",
            params![collection, id, deleted_at, deleted_by],
        )?;
        Ok(changed > 0)
    }

    /// Flip a deleted document back to active, clearing the tombstone fields
    /// and stamping `updated_by`. Returns false when no deleted row matched.
    pub fn mark_restored(&self, collection: &str, id: &str, updated_by: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE documents SET deleted = 0, deleted_at = NULL, deleted_by = NULL, updated_by = ?3
             WHERE collection = ?1 AND id = ?2 AND deleted = 1",
            params![collection, id, updated_by],
        )?;
        Ok(changed > 0)
    }

    /// Permanently remove a document row.
    pub fn remove(&self, collection: &str, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(changed > 0)
    }

    /// Permanently remove every soft-deleted row of a collection.
    /// Returns the number of rows purged.
    pub fn purge_deleted(&self, collection: &str) -> Result<u64> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND deleted = 1",
            params![collection],
        )?;
        Ok(changed as u64)
    }

    /// Find rows of a collection whose payload may reference the given id.
    /// This is a broad `LIKE` prefilter over the JSON blob; the caller must
    /// confirm the actual foreign-key field. Matches any deleted state.
    pub fn find_payload_candidates(
        &self,
        collection: &str,
        referenced_id: &str,
    ) -> Result<Vec<DocumentRecord>> {
        let pattern = format!("%\"{}\"%", referenced_id);
        let mut stmt = self.conn.prepare(
            "SELECT id, collection, deleted, created_at, deleted_at, created_by, updated_by, deleted_by, data_json
             FROM documents WHERE collection = ?1 AND data_json LIKE ?2
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![collection, pattern], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ── Collection stats (dynamic API) ───────────────────────────────

    /// Names of every collection that has at least one row.
    pub fn collections(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Count rows of a collection with the given deleted flag.
    pub fn count(&self, collection: &str, deleted: bool) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND deleted = ?2",
            params![collection, deleted as i64],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ── Transaction Support ──────────────────────────────────────────

    /// Begin a transaction spanning the next several statements.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    /// Commit the current transaction.
    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Rollback the current transaction.
    pub fn rollback_transaction(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        collection: row.get(1)?,
        deleted: row.get::<_, i64>(2)? != 0,
        created_at: row.get(3)?,
        deleted_at: row.get(4)?,
        created_by: row.get(5)?,
        updated_by: row.get(6)?,
        deleted_by: row.get(7)?,
        data_json: row.get(8)?,
    })
}

/// A row from the documents table. Timestamps are stored as RFC 3339 text.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub collection: String,
    pub deleted: bool,
    pub created_at: String,
    pub deleted_at: Option<String>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub deleted_by: Option<String>,
    pub data_json: String,
}

impl DocumentRecord {
    /// Parse the stored payload back into a JSON value.
    pub fn parse_payload(&self) -> Result<serde_json::Value> {
        let value: serde_json::Value = serde_json::from_str(&self.data_json)?;
        Ok(value)
    }

    /// Render the row as one JSON object: lifecycle fields plus the payload
    /// fields merged into the top level. Used by the dynamic (CLI) API.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut obj = serde_json::Map::new();
        obj.insert("id".into(), serde_json::Value::String(self.id.clone()));
        obj.insert(
            "created_at".into(),
            serde_json::Value::String(self.created_at.clone()),
        );
        obj.insert(
            "created_by".into(),
            serde_json::Value::String(self.created_by.clone()),
        );
        obj.insert("deleted".into(), serde_json::Value::Bool(self.deleted));
        if let Some(deleted_at) = &self.deleted_at {
            obj.insert(
                "deleted_at".into(),
                serde_json::Value::String(deleted_at.clone()),
            );
        }
        if let Some(deleted_by) = &self.deleted_by {
            obj.insert(
                "deleted_by".into(),
                serde_json::Value::String(deleted_by.clone()),
            );
        }
        if let Some(updated_by) = &self.updated_by {
            obj.insert(
                "updated_by".into(),
                serde_json::Value::String(updated_by.clone()),
            );
        }

        if let serde_json::Value::Object(fields) = self.parse_payload()? {
            for (k, v) in fields {
                obj.insert(k, v);
            }
        }

        Ok(serde_json::Value::Object(obj))
    }
}
