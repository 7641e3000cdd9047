//! Assignment endpoints
//!
//! Create and update take `multipart/form-data`. Attachments are written before the
//! document, and removed again if the document write fails.

use crate::api::{not_found_as, parse_id, store_all, AppState, MultipartForm};
use crate::auth::models::Principal;
use crate::db::StoreError;
use crate::error::ApiError;
use crate::models::{Assignment, AssignmentUpdate, NewAssignment, DEFAULT_ASSIGNMENT_STATUS};
use crate::storage::remove_all;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};
use tracing::info;

const ASSIGNMENT_NOT_FOUND: &str = "Assignment not found";
const FILE_FIELDS: &[&str] = &["files"];

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (taken as UTC) or a bare `YYYY-MM-DD`
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(ApiError::validation(format!("Invalid due_date '{}'", raw)))
}

/// GET /assignments
pub async fn list_assignments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    Ok(Json(state.blocking(|s| s.assignments.list()).await?))
}

/// GET /assignments/:id
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Assignment>, ApiError> {
    let id = parse_id(&id, ASSIGNMENT_NOT_FOUND)?;
    let assignment = state
        .blocking(move |s| s.assignments.get(&id))
        .await
        .map_err(|e| not_found_as(e, ASSIGNMENT_NOT_FOUND))?;
    Ok(Json(assignment))
}

/// POST /assignments - any authenticated user; `created_by` is the caller
pub async fn create_assignment(
    State(state): State<AppState>,
    principal: Principal,
    mut form: MultipartForm,
) -> Result<Json<Assignment>, ApiError> {
    let title = form.required_text("title")?;
    let description = form.required_text("description")?;
    let subject = form.required_text("subject")?;
    let status = form
        .text("status")
        .unwrap_or_else(|| DEFAULT_ASSIGNMENT_STATUS.to_string());
    let due_date = form
        .text("due_date")
        .map(|raw| parse_due_date(&raw))
        .transpose()?;

    let sink = state.assignment_files.as_ref();
    let files = store_all(sink, form.take_files(FILE_FIELDS)).await?;

    let new = NewAssignment {
        title,
        description,
        subject,
        files: files.clone(),
        created_by: principal.username,
        status,
        due_date,
    };

    match state.blocking(move |s| s.assignments.insert(new)).await {
        Ok(assignment) => Ok(Json(assignment)),
        Err(e) => {
            remove_all(sink, &files).await;
            Err(e.into())
        }
    }
}

/// PUT /assignments/:id - authenticated, no role rule
pub async fn update_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    mut form: MultipartForm,
) -> Result<Json<Assignment>, ApiError> {
    let id = parse_id(&id, ASSIGNMENT_NOT_FOUND)?;
    let lookup = id.clone();
    let current = state
        .blocking(move |s| s.assignments.get(&lookup))
        .await
        .map_err(|e| not_found_as(e, ASSIGNMENT_NOT_FOUND))?;

    let mut update = AssignmentUpdate {
        title: form.text("title"),
        description: form.text("description"),
        subject: form.text("subject"),
        status: form.text("status"),
        due_date: form
            .text("due_date")
            .map(|raw| parse_due_date(&raw))
            .transpose()?,
        files: None,
    };

    let sink = state.assignment_files.as_ref();
    let uploads = form.take_files(FILE_FIELDS);
    if !uploads.is_empty() {
        update.files = Some(store_all(sink, uploads).await?);
    }
    let new_files = update.files.clone();

    let target = id.clone();
    match state
        .blocking(move |s| s.assignments.update(&target, update))
        .await
    {
        Ok(assignment) => {
            if new_files.is_some() {
                // superseded attachments are no longer referenced
                remove_all(sink, &current.files).await;
            }
            info!("✏️  Assignment {} updated by {}", id, principal.username);
            Ok(Json(assignment))
        }
        Err(e) => {
            if let Some(files) = new_files {
                remove_all(sink, &files).await;
            }
            Err(not_found_as(e, ASSIGNMENT_NOT_FOUND))
        }
    }
}

/// DELETE /assignments/:id - authenticated, no role rule
pub async fn delete_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, ASSIGNMENT_NOT_FOUND)?;
    let target = id.clone();
    let assignment = state
        .blocking(move |s| {
            let assignment = s.assignments.get(&target)?;
            s.assignments.delete(&target)?;
            Ok::<_, StoreError>(assignment)
        })
        .await
        .map_err(|e| not_found_as(e, ASSIGNMENT_NOT_FOUND))?;
    remove_all(state.assignment_files.as_ref(), &assignment.files).await;

    info!("Assignment {} deleted by {}", id, principal.username);
    Ok(Json(json!({ "message": "Assignment deleted successfully" })))
}
