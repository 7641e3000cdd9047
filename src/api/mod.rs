//! HTTP API
//! Mission: Wire stores, auth and file storage into one axum Router
//!
//! Public routes need no token. Protected routes sit behind `auth_middleware` via
//! `route_layer`, so a request without a valid token never reaches their handlers.

pub mod assignments;
pub mod solutions;
pub mod users;

use crate::auth::{api as auth_api, auth_middleware, JwtHandler, PasswordHasher, UserStore};
use crate::db::{AssignmentStore, Database, DocumentId, SolutionStore, StoreError};
use crate::error::ApiError;
use crate::middleware::request_logging_simple;
use crate::storage::{self, FileStorage};
use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request},
    middleware,
    routing::{get, post, put},
    Form, Router,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub assignments: AssignmentStore,
    pub solutions: SolutionStore,
    pub jwt: Arc<JwtHandler>,
    pub hasher: Arc<PasswordHasher>,
    pub assignment_files: Arc<dyn FileStorage>,
    pub solution_files: Arc<dyn FileStorage>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        db: Database,
        jwt: JwtHandler,
        hasher: PasswordHasher,
        assignment_files: Arc<dyn FileStorage>,
        solution_files: Arc<dyn FileStorage>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            assignments: AssignmentStore::new(db.clone()),
            solutions: SolutionStore::new(db),
            jwt: Arc::new(jwt),
            hasher: Arc::new(hasher),
            assignment_files,
            solution_files,
            max_upload_bytes,
        }
    }

    /// Run a store call on the blocking pool. rusqlite and the connection mutex
    /// both block, so no handler touches a store from an async worker.
    pub async fn blocking<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&AppState) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let state = self.clone();
        match tokio::task::spawn_blocking(move || f(&state)).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Task(e.to_string()).into()),
        }
    }

    /// bcrypt off the async workers
    pub async fn hash_password(&self, plaintext: String) -> Result<String, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| ApiError::internal(format!("hash task failed: {}", e)))?
            .map_err(|e| ApiError::internal(format!("{:#}", e)))
    }
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(auth_api::login))
        .route("/users/register", post(users::register))
        .route("/assignments", get(assignments::list_assignments))
        .route("/assignments/:id", get(assignments::get_assignment));

    let protected_routes = Router::new()
        .route("/me", get(auth_api::me))
        .route("/users", get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/role", put(users::set_role))
        .route("/assignments", post(assignments::create_assignment))
        .route(
            "/assignments/:id",
            put(assignments::update_assignment).delete(assignments::delete_assignment),
        )
        .route("/solutions", post(solutions::create_solution))
        .route(
            "/solutions/assignment/:assignment_id",
            get(solutions::list_solutions_for_assignment),
        )
        .route(
            "/solutions/:id",
            get(solutions::get_solution)
                .put(solutions::update_solution)
                .delete(solutions::delete_solution),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_logging_simple))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Path ids that are not ObjectId-shaped cannot name a document
pub(crate) fn parse_id(raw: &str, not_found: &str) -> Result<DocumentId, ApiError> {
    DocumentId::parse(raw).ok_or_else(|| ApiError::not_found(not_found))
}

/// Store errors with a resource-specific 404 message
pub(crate) fn not_found_as(err: StoreError, message: &str) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::not_found(message),
        other => other.into(),
    }
}

/// `application/x-www-form-urlencoded` body whose rejection is a 400 with our error shape
pub struct FormBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for FormBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(FormBody(value))
    }
}

/// Treat a blank form value the same as an absent one
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One uploaded file part
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// A fully read multipart body: text fields by name, file parts grouped by field
#[derive(Default)]
pub struct MultipartForm {
    text: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl MultipartForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::validation(e.body_text()))?;
                    // Browsers send an empty, unnamed part when no file was chosen
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files
                        .entry(name)
                        .or_default()
                        .push(UploadedFile { file_name, bytes });
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(e.body_text()))?;
                    form.text.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Text field, `None` when absent or blank
    pub fn text(&mut self, name: &str) -> Option<String> {
        non_empty(self.text.remove(name))
    }

    pub fn required_text(&mut self, name: &str) -> Result<String, ApiError> {
        self.text(name)
            .ok_or_else(|| ApiError::validation(format!("Field '{}' is required", name)))
    }

    /// File parts sent under any of `names`, in arrival order per name
    pub fn take_files(&mut self, names: &[&str]) -> Vec<UploadedFile> {
        names
            .iter()
            .filter_map(|name| self.files.remove(*name))
            .flatten()
            .collect()
    }
}

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Self::read(multipart).await
    }
}

/// Write every file, or none: a failed write removes the ones already stored
pub(crate) async fn store_all(
    sink: &dyn FileStorage,
    files: Vec<UploadedFile>,
) -> Result<Vec<String>, ApiError> {
    let mut stored = Vec::with_capacity(files.len());

    for file in files {
        match sink.store(&file.file_name, &file.bytes).await {
            Ok(reference) => stored.push(reference),
            Err(e) => {
                storage::remove_all(sink, &stored).await;
                return Err(ApiError::internal(format!(
                    "failed to store {}: {:#}",
                    file.file_name, e
                )));
            }
        }
    }

    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskStorage;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        let files: Arc<dyn FileStorage> = Arc::new(DiskStorage::new(dir.path()));
        AppState::new(
            Database::open_in_memory().unwrap(),
            JwtHandler::new("state-test-secret-0123456789abcdef", Duration::minutes(60)),
            PasswordHasher::new(4).unwrap(),
            files.clone(),
            files,
            1024 * 1024,
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_store_calls_leave_the_runtime_thread() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let runtime_thread = std::thread::current().id();

        let (ran_on, users) = state
            .blocking(|s| Ok::<_, StoreError>((std::thread::current().id(), s.users.list()?)))
            .await
            .unwrap();

        assert_ne!(ran_on, runtime_thread);
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_store_call_is_an_internal_error() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let result: Result<(), ApiError> = state.blocking(|_| panic!("connection poisoned")).await;
        assert!(matches!(result, Err(ApiError::Storage(StoreError::Task(_)))));
    }
}
