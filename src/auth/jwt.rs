//! JWT Token Handler
//! Mission: Issue and verify signed, time-limited bearer tokens

use crate::auth::models::{Claims, Role};
use crate::error::AuthError;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::debug;

pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

/// JWT Handler for token operations
///
/// Verification is stateless: there is no revocation list, so a token stays valid
/// (with the role it was issued with) until `exp`.
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtHandler {
    /// The only algorithm tokens are signed with or accepted under
    pub const ALGORITHM: Algorithm = Algorithm::HS256;

    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Self::ALGORITHM);
        validation.leeway = 0;
        // Expiry is compared against an explicit clock in verify_at
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` that expires after the configured ttl
    pub fn issue(&self, subject: &str, role: Role) -> Result<String> {
        self.issue_at(subject, role, self.ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let exp = issued_at
            .checked_add_signed(ttl)
            .context("Invalid timestamp")?
            .timestamp();

        let claims = Claims {
            sub: subject.to_string(),
            role,
            exp,
        };

        debug!(
            "Generating JWT for {} ({}), expires in {}m",
            subject,
            role,
            ttl.num_minutes()
        );

        encode(&Header::new(Self::ALGORITHM), &claims, &self.encoding_key)
            .context("Failed to generate JWT")
    }

    /// Verify signature, algorithm and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            },
        )?;

        if now.timestamp() >= decoded.claims.exp {
            return Err(AuthError::Expired);
        }

        debug!("Validated JWT for {}", decoded.claims.sub);
        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-that-is-long-enough-123";

    fn handler() -> JwtHandler {
        JwtHandler::new(SECRET, Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES))
    }

    #[test]
    fn test_issue_and_verify() {
        let handler = handler();
        let token = handler.issue("alice_01", Role::Helper).unwrap();

        let claims = handler.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice_01");
        assert_eq!(claims.role, Role::Helper);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_header_names_hs256() {
        let token = handler().issue("alice_01", Role::User).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_expiry_boundary() {
        let handler = handler();
        let ttl = Duration::minutes(60);
        let issued = Utc::now();
        let token = handler.issue_at("alice_01", Role::User, ttl, issued).unwrap();

        let just_before = issued + ttl - Duration::seconds(1);
        assert!(handler.verify_at(&token, just_before).is_ok());

        assert_eq!(
            handler.verify_at(&token, issued + ttl),
            Err(AuthError::Expired)
        );
        assert_eq!(
            handler.verify_at(&token, issued + ttl + Duration::seconds(1)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_already_expired_token() {
        let handler = handler();
        let token = handler
            .issue_at("alice_01", Role::User, Duration::minutes(5), Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(handler.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let handler = handler();
        let token = handler.issue("alice_01", Role::Admin).unwrap();
        let sig_start = token.rfind('.').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                handler.verify(&tampered),
                Err(AuthError::InvalidSignature),
                "tampered byte {} accepted",
                i
            );
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let handler = handler();
        let user_token = handler.issue("alice_01", Role::User).unwrap();
        let admin_token = handler.issue("alice_01", Role::Admin).unwrap();

        // Admin payload spliced onto the user token's signature
        let user_parts: Vec<&str> = user_token.split('.').collect();
        let admin_parts: Vec<&str> = admin_token.split('.').collect();
        let forged = format!("{}.{}.{}", user_parts[0], admin_parts[1], user_parts[2]);

        assert_eq!(handler.verify(&forged), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_different_secrets_reject() {
        let handler1 = JwtHandler::new("secret-one-secret-one-secret-one!", Duration::minutes(60));
        let handler2 = JwtHandler::new("secret-two-secret-two-secret-two!", Duration::minutes(60));

        let token = handler1.issue("alice_01", Role::User).unwrap();
        assert_eq!(handler2.verify(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let claims = Claims {
            sub: "alice_01".to_string(),
            role: Role::Admin,
            exp: (Utc::now() + Duration::minutes(10)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(handler().verify(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_alg_none_rejected() {
        let token = handler().issue("alice_01", Role::Admin).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        // {"alg":"none","typ":"JWT"}
        parts[0] = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0";
        parts[2] = "";
        let unsigned = parts.join(".");

        assert!(handler().verify(&unsigned).is_err());
    }

    #[test]
    fn test_malformed_tokens() {
        let handler = handler();

        assert_eq!(handler.verify(""), Err(AuthError::Malformed));
        assert_eq!(handler.verify("abc"), Err(AuthError::Malformed));
        assert_eq!(
            handler.verify("invalid.token.here"),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn test_unexpected_claim_shape_is_malformed() {
        let key = EncodingKey::from_secret(SECRET.as_bytes());
        let exp = (Utc::now() + Duration::minutes(10)).timestamp();

        let unknown_role = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "alice_01", "role": "student", "exp": exp }),
            &key,
        )
        .unwrap();
        assert_eq!(handler().verify(&unknown_role), Err(AuthError::Malformed));

        let missing_sub = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "role": "user", "exp": exp }),
            &key,
        )
        .unwrap();
        assert_eq!(handler().verify(&missing_sub), Err(AuthError::Malformed));

        let missing_exp = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "alice_01", "role": "user" }),
            &key,
        )
        .unwrap();
        assert_eq!(handler().verify(&missing_exp), Err(AuthError::Malformed));
    }
}
