//! Solution documents

use super::{json_column, Database, DocumentId, StoreError};
use crate::models::{NewSolution, Solution, SolutionUpdate};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

const SOLUTION_COLUMNS: &str = "id, assignment_id, answer_files_json, answered_by, submitted_on";

fn solution_from_row(row: &Row<'_>) -> rusqlite::Result<Solution> {
    Ok(Solution {
        id: row.get(0)?,
        assignment_id: row.get(1)?,
        answer_files: json_column(row, 2)?,
        answered_by: row.get(3)?,
        submitted_on: row.get(4)?,
    })
}

#[derive(Clone)]
pub struct SolutionStore {
    db: Database,
}

impl SolutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, new: NewSolution) -> Result<Solution, StoreError> {
        let solution = Solution {
            id: DocumentId::generate(),
            assignment_id: new.assignment_id,
            answer_files: new.answer_files,
            answered_by: new.answered_by,
            submitted_on: Utc::now(),
        };
        let files_json = serde_json::to_string(&solution.answer_files)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO solutions (id, assignment_id, answer_files_json, answered_by, submitted_on)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    solution.id,
                    solution.assignment_id,
                    files_json,
                    solution.answered_by,
                    solution.submitted_on,
                ],
            )?;
            Ok(())
        })?;

        info!(
            "💡 Solution {} for assignment {} posted by {}",
            solution.id, solution.assignment_id, solution.answered_by
        );
        Ok(solution)
    }

    /// Solutions whose `assignment_id` equals `assignment_id`, oldest first
    pub fn list_by_assignment(&self, assignment_id: &str) -> Result<Vec<Solution>, StoreError> {
        let sql = format!(
            "SELECT {} FROM solutions WHERE assignment_id = ?1 ORDER BY submitted_on, id",
            SOLUTION_COLUMNS
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![assignment_id], solution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get(&self, id: &DocumentId) -> Result<Solution, StoreError> {
        let sql = format!("SELECT {} FROM solutions WHERE id = ?1", SOLUTION_COLUMNS);
        self.db.with_conn(|conn| {
            conn.query_row(&sql, params![id], solution_from_row)
                .optional()?
                .ok_or(StoreError::NotFound)
        })
    }

    pub fn update(&self, id: &DocumentId, update: SolutionUpdate) -> Result<Solution, StoreError> {
        let sql = format!("SELECT {} FROM solutions WHERE id = ?1", SOLUTION_COLUMNS);
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut solution = tx
                .query_row(&sql, params![id], solution_from_row)
                .optional()?
                .ok_or(StoreError::NotFound)?;

            if update.is_empty() {
                return Ok(solution);
            }
            update.apply_to(&mut solution);
            let files_json = serde_json::to_string(&solution.answer_files)?;

            tx.execute(
                "UPDATE solutions SET assignment_id = ?2, answer_files_json = ?3 WHERE id = ?1",
                params![solution.id, solution.assignment_id, files_json],
            )?;
            tx.commit()?;
            Ok(solution)
        })
    }

    pub fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let rows_affected = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM solutions WHERE id = ?1", params![id])?)
        })?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        info!("🗑️  Deleted solution: {}", id);
        Ok(())
    }
}
