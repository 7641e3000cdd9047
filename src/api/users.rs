//! User account endpoints: registration, lookup, profile updates, role changes

use crate::api::{non_empty, not_found_as, parse_id, AppState, FormBody};
use crate::auth::{
    models::{Gender, Principal, Role, UnknownVariant, UserResponse},
    policy::{authorize, Operation},
    password::MAX_PASSWORD_BYTES,
    user_store::{NewUser, UserUpdate},
};
use crate::error::ApiError;
use axum::{
    extract::{Path, State},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::ops::RangeInclusive;
use tracing::info;

const USERNAME_LEN: RangeInclusive<usize> = 6..=12;
const PASSWORD_LEN: RangeInclusive<usize> = 8..=60;
const USER_NOT_FOUND: &str = "User not found";

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(alias = "FullName")]
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub gender: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserForm {
    #[serde(default, alias = "FullName")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(ApiError::validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ApiError::validation("Invalid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(ApiError::validation(format!(
            "Password must be between {} and {} characters",
            PASSWORD_LEN.start(),
            PASSWORD_LEN.end()
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::validation(format!(
            "Password must be at most {} bytes when UTF-8 encoded",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.trim()
        .parse()
        .map_err(|e: UnknownVariant| ApiError::validation(e.to_string()))
}

fn parse_gender(raw: &str) -> Result<Gender, ApiError> {
    raw.trim()
        .parse()
        .map_err(|e: UnknownVariant| ApiError::validation(e.to_string()))
}

/// POST /users/register
pub async fn register(
    State(state): State<AppState>,
    FormBody(form): FormBody<RegisterForm>,
) -> Result<Json<UserResponse>, ApiError> {
    let full_name = form.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(ApiError::validation("Full name is required"));
    }
    validate_username(&form.username)?;
    validate_email(&form.email)?;
    validate_password(&form.password)?;
    let role = parse_role(&form.role)?;
    let gender = parse_gender(&form.gender)?;

    let password_hash = state.hash_password(form.password).await?;

    let new_user = NewUser {
        username: form.username,
        email: form.email,
        password_hash,
        role,
        full_name,
        gender,
    };
    let user = state.blocking(move |s| s.users.insert(new_user)).await?;

    info!("✅ Registered user: {} ({})", user.username, user.role);
    Ok(Json(UserResponse::from_user(&user)))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.blocking(|s| s.users.list()).await?;
    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(&id, USER_NOT_FOUND)?;
    let user = state
        .blocking(move |s| s.users.get(&id))
        .await
        .map_err(|e| not_found_as(e, USER_NOT_FOUND))?;
    Ok(Json(UserResponse::from_user(&user)))
}

/// PUT /users/:id - self or admin
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    FormBody(form): FormBody<UpdateUserForm>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(&id, USER_NOT_FOUND)?;
    authorize(&principal, Operation::ManageUser { target: &id })?;

    let username = non_empty(form.username);
    let email = non_empty(form.email);
    let password = non_empty(form.password);
    if let Some(username) = &username {
        validate_username(username)?;
    }
    if let Some(email) = &email {
        validate_email(email)?;
    }
    if let Some(password) = &password {
        validate_password(password)?;
    }
    let gender = non_empty(form.gender)
        .map(|g| parse_gender(&g))
        .transpose()?;

    let password_hash = match password {
        Some(password) => Some(state.hash_password(password).await?),
        None => None,
    };

    let update = UserUpdate {
        full_name: non_empty(form.full_name).map(|n| n.trim().to_string()),
        username,
        email,
        password_hash,
        gender,
    };

    let user = state
        .blocking(move |s| s.users.update(&id, update))
        .await
        .map_err(|e| not_found_as(e, USER_NOT_FOUND))?;

    info!("✏️  Updated user: {} (by {})", user.username, principal.username);
    Ok(Json(UserResponse::from_user(&user)))
}

/// PUT /users/:id/role - admin only
pub async fn set_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    FormBody(form): FormBody<RoleForm>,
) -> Result<Json<UserResponse>, ApiError> {
    authorize(&principal, Operation::ChangeRole)?;
    let id = parse_id(&id, USER_NOT_FOUND)?;
    let role = parse_role(&form.role)?;

    let user = state
        .blocking(move |s| s.users.set_role(&id, role))
        .await
        .map_err(|e| not_found_as(e, USER_NOT_FOUND))?;

    info!(
        "🔑 Role of {} set to {} by {}",
        user.username, user.role, principal.username
    );
    Ok(Json(UserResponse::from_user(&user)))
}

/// DELETE /users/:id - self or admin
pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, USER_NOT_FOUND)?;
    authorize(&principal, Operation::ManageUser { target: &id })?;

    state
        .blocking(move |s| s.users.delete(&id))
        .await
        .map_err(|e| not_found_as(e, USER_NOT_FOUND))?;

    Ok(Json(json!({ "message": "User deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_bounds() {
        assert!(validate_username("bob").is_err());
        assert!(validate_username("bobby1").is_ok());
        assert!(validate_username("twelve_chars").is_ok());
        assert!(validate_username("thirteen_char").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(validate_email("bob@example.com").is_ok());
        assert!(validate_email("bob@example").is_err());
        assert!(validate_email("bob example@x.com").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_password_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"x".repeat(61)).is_err());
    }

    #[test]
    fn test_password_byte_limit() {
        assert!(validate_password(&"é".repeat(36)).is_ok());
        assert!(validate_password(&"é".repeat(37)).is_err());
        // within the character bound, past what bcrypt reads
        assert!(validate_password(&"é".repeat(60)).is_err());
        assert!(validate_password(&"x".repeat(60)).is_ok());
    }

    #[test]
    fn test_role_and_gender_parsing() {
        assert_eq!(parse_role("helper").unwrap(), Role::Helper);
        assert!(matches!(parse_role("student"), Err(ApiError::Validation(_))));
        assert_eq!(parse_gender("female").unwrap(), Gender::Female);
        assert!(parse_gender("unknown").is_err());
    }
}
