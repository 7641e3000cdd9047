//! Document Store
//! Mission: Persist users, assignments and solutions in SQLite with atomic uniqueness
//!
//! A single connection sits behind a mutex. Every check-then-write sequence
//! (username/email uniqueness in particular) runs under that one lock inside one
//! transaction, so two concurrent registrations for the same name can never both win.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, Row};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub mod assignments;
pub mod solutions;

pub use assignments::AssignmentStore;
pub use solutions::SolutionStore;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    full_name TEXT NOT NULL,
    gender TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS assignments (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    subject TEXT NOT NULL,
    files_json TEXT NOT NULL,
    created_by TEXT NOT NULL,
    status TEXT NOT NULL,
    due_date TEXT,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_assignments_created_by
    ON assignments(created_by);

CREATE TABLE IF NOT EXISTS solutions (
    id TEXT PRIMARY KEY,
    assignment_id TEXT NOT NULL,
    answer_files_json TEXT NOT NULL,
    answered_by TEXT NOT NULL,
    submitted_on TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_solutions_assignment
    ON solutions(assignment_id, submitted_on);
"#;

/// Errors surfaced at the store boundary
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field (username, email) is already taken
    #[error("{0}")]
    Conflict(String),

    #[error("document not found")]
    NotFound,

    /// A stored row does not match the expected record shape
    #[error("stored document has unexpected shape: {0}")]
    Decode(String),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking task running a store call panicked or was cancelled
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(idx, _, inner) => {
                StoreError::Decode(format!("column {}: {}", idx, inner))
            }
            rusqlite::Error::InvalidColumnType(idx, name, ty) => {
                StoreError::Decode(format!("column {} ({}) has type {}", idx, name, ty))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

/// Whether `err` is a UNIQUE violation on `table.column`.
pub(crate) fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation && msg.contains(column)
        }
        _ => false,
    }
}

/// Read a JSON-encoded TEXT column, failing the row on a shape mismatch.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// ObjectId-shaped document identifier: 24 lowercase hex characters.
///
/// The first 4 bytes are the big-endian creation second, the remaining 8 are random.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub const LEN: usize = 24;

    pub fn generate() -> Self {
        let secs = Utc::now().timestamp() as u32;
        let random: [u8; 8] = rand::random();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&random);

        Self(hex::encode(bytes))
    }

    /// Accepts only 24 hex characters; anything else is not an id.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Canonical form of a stored reference: ObjectId-shaped values are lowercased,
    /// anything else is kept as sent.
    pub fn canonical_reference(raw: &str) -> String {
        match Self::parse(raw) {
            Some(id) => id.0,
            None => raw.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for DocumentId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DocumentId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        DocumentId::parse(raw).ok_or_else(|| {
            FromSqlError::Other(format!("'{}' is not a document id", raw).into())
        })
    }
}

/// Shared handle to the SQLite document store
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        let db = Self::init(conn)?;
        info!("📚 Document store initialized at: {}", db_path);
        Ok(db)
    }

    /// Private in-memory database, used by tests and throwaway instances
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if !matches!(journal_mode.to_lowercase().as_str(), "wal" | "memory") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_generated_ids_are_object_id_shaped() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();

        assert_eq!(a.as_str().len(), DocumentId::LEN);
        assert!(DocumentId::parse(a.as_str()).is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_non_object_ids() {
        assert!(DocumentId::parse("").is_none());
        assert!(DocumentId::parse("not-an-id").is_none());
        assert!(DocumentId::parse("zzzzzzzzzzzzzzzzzzzzzzzz").is_none());
        assert!(DocumentId::parse("0123456789abcdef0123456").is_none());
        assert!(DocumentId::parse("0123456789abcdef012345678").is_none());

        let upper = DocumentId::parse("0123456789ABCDEF01234567").unwrap();
        assert_eq!(upper.as_str(), "0123456789abcdef01234567");
    }

    #[test]
    fn test_canonical_reference() {
        assert_eq!(
            DocumentId::canonical_reference("0123456789ABCDEF01234567"),
            "0123456789abcdef01234567"
        );
        assert_eq!(
            DocumentId::canonical_reference("0123456789abcdef01234567"),
            "0123456789abcdef01234567"
        );
        assert_eq!(DocumentId::canonical_reference("Legacy-Ref"), "Legacy-Ref");
    }

    #[test]
    fn test_open_file_database_twice() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_str().unwrap();

        Database::open(path).unwrap();
        // Schema creation is idempotent
        Database::open(path).unwrap();
    }

    #[test]
    fn test_unique_violation_detection() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_conn(|conn| {
            let insert = "INSERT INTO users
                (id, username, email, password_hash, role, full_name, gender, created_at)
                VALUES (?1, 'alice_01', ?2, 'h', 'user', 'Alice', 'female', '2025-01-01T00:00:00Z')";
            conn.execute(insert, ["a", "a@example.com"])?;
            let err = conn
                .execute(insert, ["b", "b@example.com"])
                .expect_err("duplicate username must fail");
            Ok((
                is_unique_violation(&err, "users.username"),
                is_unique_violation(&err, "users.email"),
            ))
        });

        assert_eq!(result.unwrap(), (true, false));
    }
}
