//! Solution endpoints
//!
//! Role rules come from `auth::policy`; they are checked before any id parsing or
//! store access.

use crate::api::{not_found_as, parse_id, store_all, AppState, MultipartForm};
use crate::auth::{
    models::Principal,
    policy::{authorize, Operation},
};
use crate::db::{DocumentId, StoreError};
use crate::error::ApiError;
use crate::models::{NewSolution, Solution, SolutionUpdate};
use crate::storage::remove_all;
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

const SOLUTION_NOT_FOUND: &str = "Solution not found";
const ANSWER_FIELDS: &[&str] = &["answer_files", "answer_file"];

/// POST /solutions - helper or admin
pub async fn create_solution(
    State(state): State<AppState>,
    principal: Principal,
    mut form: MultipartForm,
) -> Result<Json<Solution>, ApiError> {
    authorize(&principal, Operation::CreateSolution)?;

    let assignment_id = DocumentId::canonical_reference(&form.required_text("assignment_id")?);

    let sink = state.solution_files.as_ref();
    let answer_files = store_all(sink, form.take_files(ANSWER_FIELDS)).await?;

    let new = NewSolution {
        assignment_id,
        answer_files: answer_files.clone(),
        answered_by: principal.username,
    };

    match state.blocking(move |s| s.solutions.insert(new)).await {
        Ok(solution) => Ok(Json(solution)),
        Err(e) => {
            remove_all(sink, &answer_files).await;
            Err(e.into())
        }
    }
}

/// GET /solutions/assignment/:assignment_id
///
/// Students only see solutions for assignments they created themselves.
pub async fn list_solutions_for_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(assignment_id): Path<String>,
) -> Result<Json<Vec<Solution>>, ApiError> {
    let assignment_id = DocumentId::canonical_reference(&assignment_id);

    let lookup = assignment_id.clone();
    let creator = state
        .blocking(move |s| -> Result<Option<String>, StoreError> {
            match DocumentId::parse(&lookup) {
                Some(id) => Ok(s.assignments.find(&id)?.map(|a| a.created_by)),
                None => Ok(None),
            }
        })
        .await?;

    authorize(
        &principal,
        Operation::ListSolutionsForAssignment {
            assignment_creator: creator.as_deref(),
        },
    )?;

    let solutions = state
        .blocking(move |s| s.solutions.list_by_assignment(&assignment_id))
        .await?;
    Ok(Json(solutions))
}

/// GET /solutions/:id
pub async fn get_solution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Solution>, ApiError> {
    let id = parse_id(&id, SOLUTION_NOT_FOUND)?;
    let solution = state
        .blocking(move |s| s.solutions.get(&id))
        .await
        .map_err(|e| not_found_as(e, SOLUTION_NOT_FOUND))?;
    Ok(Json(solution))
}

/// PUT /solutions/:id - authenticated, no role rule
pub async fn update_solution(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    mut form: MultipartForm,
) -> Result<Json<Solution>, ApiError> {
    let id = parse_id(&id, SOLUTION_NOT_FOUND)?;
    let lookup = id.clone();
    let current = state
        .blocking(move |s| s.solutions.get(&lookup))
        .await
        .map_err(|e| not_found_as(e, SOLUTION_NOT_FOUND))?;

    let mut update = SolutionUpdate {
        assignment_id: form
            .text("assignment_id")
            .map(|raw| DocumentId::canonical_reference(&raw)),
        answer_files: None,
    };

    let sink = state.solution_files.as_ref();
    let uploads = form.take_files(ANSWER_FIELDS);
    if !uploads.is_empty() {
        update.answer_files = Some(store_all(sink, uploads).await?);
    }
    let new_files = update.answer_files.clone();

    let target = id.clone();
    match state
        .blocking(move |s| s.solutions.update(&target, update))
        .await
    {
        Ok(solution) => {
            if new_files.is_some() {
                remove_all(sink, &current.answer_files).await;
            }
            info!("✏️  Solution {} updated by {}", id, principal.username);
            Ok(Json(solution))
        }
        Err(e) => {
            if let Some(files) = new_files {
                remove_all(sink, &files).await;
            }
            Err(not_found_as(e, SOLUTION_NOT_FOUND))
        }
    }
}

/// DELETE /solutions/:id - admin only
pub async fn delete_solution(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(&principal, Operation::DeleteSolution)?;

    let id = parse_id(&id, SOLUTION_NOT_FOUND)?;
    let solution = state
        .blocking(move |s| {
            let solution = s.solutions.get(&id)?;
            s.solutions.delete(&id)?;
            Ok::<_, StoreError>(solution)
        })
        .await
        .map_err(|e| not_found_as(e, SOLUTION_NOT_FOUND))?;
    remove_all(state.solution_files.as_ref(), &solution.answer_files).await;

    Ok(Json(json!({ "message": "Solution deleted successfully" })))
}
