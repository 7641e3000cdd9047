//! Authentication Models
//! Mission: Define user accounts, roles, token claims and the per-request principal

use crate::db::DocumentId;
use crate::error::{ApiError, AuthError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User account as stored in the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: DocumentId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: Role,
    pub full_name: String,
    pub gender: Gender,
    pub created_at: DateTime<Utc>,
}

/// User roles for RBAC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,   // Student: posts assignments, reads solutions to their own
    Helper, // Posts solutions
    Admin,  // Everything, including deleting solutions
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Helper => "helper",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised enum value in input or storage
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "helper" => Ok(Role::Helper),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(UnknownVariant {
                kind: "gender",
                value: other.to_string(),
            }),
        }
    }
}

// Stored as plain TEXT; an unknown value fails the row instead of defaulting.
macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: UnknownVariant| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_sql!(Role);
text_enum_sql!(Gender);

/// JWT Claims payload
///
/// Exactly `sub`, `role` and `exp` travel on the wire. `role` is a snapshot taken
/// at issuance and stays in the token until it expires, even if the stored role
/// changes in the meantime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // username
    pub role: Role,
    pub exp: i64, // expiration, epoch seconds
}

/// The authenticated identity for the current request only
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Principal {
    pub id: DocumentId,
    pub username: String,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Inserted by auth_middleware; absent means the route was not protected.
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(ApiError::Auth(AuthError::MissingToken))
    }
}

/// Login form body (`application/x-www-form-urlencoded`)
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// User response (sanitized)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub gender: Gender,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            gender: user.gender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_role_serialization() {
        let admin = Role::Admin;
        let json = serde_json::to_string(&admin).unwrap();
        assert_eq!(json, r#""admin""#);

        let helper: Role = serde_json::from_str(r#""helper""#).unwrap();
        assert_eq!(helper, Role::Helper);

        assert!(serde_json::from_str::<Role>(r#""student""#).is_err());
    }

    #[test]
    fn test_role_string_conversion() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Helper.as_str(), "helper");
        assert_eq!(Role::Admin.as_str(), "admin");

        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("ADMIN".parse::<Role>().is_err());
        assert!("trader".parse::<Role>().is_err());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("other".parse::<Gender>().unwrap(), Gender::Other);
        assert!("unknown".parse::<Gender>().is_err());
    }

    #[test]
    fn test_user_response_hides_password() {
        let user = User {
            id: DocumentId::generate(),
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            password_hash: "hash123".to_string(),
            role: Role::Helper,
            full_name: "Test User".to_string(),
            gender: Gender::Female,
            created_at: Utc::now(),
        };

        let response = serde_json::to_value(UserResponse::from_user(&user)).unwrap();
        assert_eq!(response["username"], "testuser");
        assert_eq!(response["role"], "helper");
        assert!(response.get("password_hash").is_none());

        let raw = serde_json::to_value(&user).unwrap();
        assert!(raw.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_principal_extraction() {
        let principal = Principal {
            id: DocumentId::generate(),
            username: "bobby_01".to_string(),
            role: Role::User,
        };

        let mut req = Request::new(());
        req.extensions_mut().insert(principal.clone());
        let (mut parts, _) = req.into_parts();
        let extracted = Principal::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted, principal);

        let (mut bare, _) = Request::new(()).into_parts();
        let missing = Principal::from_request_parts(&mut bare, &()).await;
        assert!(matches!(
            missing,
            Err(ApiError::Auth(AuthError::MissingToken))
        ));
    }
}
