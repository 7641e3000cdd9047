//! Authentication Middleware
//! Mission: Turn a bearer token into a verified Principal before protected handlers run
//!
//! Authentication is all-or-nothing: any failure ends the request with 401 and the
//! handler never runs.

use crate::api::AppState;
use crate::auth::{
    jwt::JwtHandler,
    models::Principal,
    user_store::{UserField, UserStore},
};
use crate::error::{ApiError, AuthError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use tracing::debug;

/// Resolve `token` into the principal it names.
///
/// The token must verify and its subject must still exist in the store. The
/// principal's role is the token's snapshot, not the stored role.
pub fn resolve_principal(
    jwt: &JwtHandler,
    users: &UserStore,
    token: &str,
) -> Result<Principal, ApiError> {
    let claims = jwt.verify(token)?;

    let user = users
        .find_by(UserField::Username, &claims.sub)?
        .ok_or(AuthError::UnknownSubject)?;

    if user.role != claims.role {
        debug!(
            username = %user.username,
            token_role = %claims.role,
            stored_role = %user.role,
            "Token role snapshot differs from stored role"
        );
    }

    Ok(Principal {
        id: user.id,
        username: user.username,
        role: claims.role,
    })
}

/// Auth middleware: validates the bearer token and stores the Principal in request
/// extensions for the `Principal` extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AuthError::MissingToken)?;

    let token = token.token().to_string();
    let principal = state
        .blocking(move |s| resolve_principal(&s.jwt, &s.users, &token))
        .await?;
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}
