//! Authentication API Endpoints
//! Mission: Exchange credentials for a bearer token and report who a token belongs to

use crate::api::{AppState, FormBody};
use crate::auth::{
    models::{LoginForm, Principal, TokenResponse, User},
    user_store::UserField,
};
use crate::db::StoreError;
use crate::error::ApiError;
use axum::{extract::State, Json};
use tracing::{info, warn};

const BAD_CREDENTIALS: &str = "Incorrect username or password";

/// Login endpoint - POST /login
///
/// Unknown usernames and wrong passwords are indistinguishable to the caller, and
/// both run one bcrypt verification.
pub async fn login(
    State(state): State<AppState>,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    info!("🔐 Login attempt: {}", form.username);

    let username = form.username.clone();
    let password = form.password;
    let (user, valid) = state
        .blocking(move |s| -> Result<(Option<User>, bool), StoreError> {
            let user = s.users.find_by(UserField::Username, &username)?;
            let valid = match &user {
                Some(user) => s.hasher.verify(&password, &user.password_hash),
                None => s.hasher.verify_dummy(&password),
            };
            Ok((user, valid))
        })
        .await?;

    let user = match user {
        Some(user) if valid => user,
        _ => {
            warn!("❌ Failed login attempt: {}", form.username);
            return Err(ApiError::validation(BAD_CREDENTIALS));
        }
    };

    let token = state
        .jwt
        .issue(&user.username, user.role)
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;

    info!("✅ Login successful: {} ({})", user.username, user.role);
    Ok(Json(TokenResponse::bearer(token)))
}

/// Current principal - GET /me
pub async fn me(principal: Principal) -> Json<Principal> {
    Json(principal)
}
