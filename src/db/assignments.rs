//! Assignment documents

use super::{json_column, Database, DocumentId, StoreError};
use crate::models::{Assignment, AssignmentUpdate, NewAssignment};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

const ASSIGNMENT_COLUMNS: &str =
    "id, title, description, subject, files_json, created_by, status, due_date, created_at";

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        subject: row.get(3)?,
        files: json_column(row, 4)?,
        created_by: row.get(5)?,
        status: row.get(6)?,
        due_date: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[derive(Clone)]
pub struct AssignmentStore {
    db: Database,
}

impl AssignmentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, new: NewAssignment) -> Result<Assignment, StoreError> {
        let assignment = Assignment {
            id: DocumentId::generate(),
            title: new.title,
            description: new.description,
            subject: new.subject,
            files: new.files,
            created_by: new.created_by,
            status: new.status,
            due_date: new.due_date,
            created_at: Utc::now(),
        };
        let files_json = serde_json::to_string(&assignment.files)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO assignments
                    (id, title, description, subject, files_json, created_by, status, due_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    assignment.id,
                    assignment.title,
                    assignment.description,
                    assignment.subject,
                    files_json,
                    assignment.created_by,
                    assignment.status,
                    assignment.due_date,
                    assignment.created_at,
                ],
            )?;
            Ok(())
        })?;

        info!(
            "📝 Assignment {} created by {}",
            assignment.id, assignment.created_by
        );
        Ok(assignment)
    }

    pub fn list(&self) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "SELECT {} FROM assignments ORDER BY created_at, id",
            ASSIGNMENT_COLUMNS
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], assignment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn find(&self, id: &DocumentId) -> Result<Option<Assignment>, StoreError> {
        let sql = format!("SELECT {} FROM assignments WHERE id = ?1", ASSIGNMENT_COLUMNS);
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, params![id], assignment_from_row)
                .optional()?)
        })
    }

    pub fn get(&self, id: &DocumentId) -> Result<Assignment, StoreError> {
        self.find(id)?.ok_or(StoreError::NotFound)
    }

    /// Merge `update` into the stored assignment and write it back
    pub fn update(
        &self,
        id: &DocumentId,
        update: AssignmentUpdate,
    ) -> Result<Assignment, StoreError> {
        let sql = format!("SELECT {} FROM assignments WHERE id = ?1", ASSIGNMENT_COLUMNS);
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut assignment = tx
                .query_row(&sql, params![id], assignment_from_row)
                .optional()?
                .ok_or(StoreError::NotFound)?;

            if update.is_empty() {
                return Ok(assignment);
            }
            update.apply_to(&mut assignment);
            let files_json = serde_json::to_string(&assignment.files)?;

            tx.execute(
                "UPDATE assignments SET title = ?2, description = ?3, subject = ?4,
                    files_json = ?5, status = ?6, due_date = ?7
                 WHERE id = ?1",
                params![
                    assignment.id,
                    assignment.title,
                    assignment.description,
                    assignment.subject,
                    files_json,
                    assignment.status,
                    assignment.due_date,
                ],
            )?;
            tx.commit()?;
            Ok(assignment)
        })
    }

    pub fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let rows_affected = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM assignments WHERE id = ?1", params![id])?)
        })?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        info!("🗑️  Deleted assignment: {}", id);
        Ok(())
    }
}
