//! Password hashing, access tokens and request extractors.
//!
//! Passwords are stored as Argon2 PHC strings. Access tokens are HS256 JWTs
//! carrying the user id and role; handlers take [`AuthUser`] or [`AdminUser`]
//! as an argument to require a valid `Authorization: Bearer <token>` header.

use std::time::Duration;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::response::ApiError;
use crate::routes::AppState;

// ---

pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Error)]
pub enum AuthError {
    // ---
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("admin role required")]
    AdminRequired,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    // ---
    pub sub: i64,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Signing material and lifetime for access tokens.
#[derive(Clone)]
pub struct TokenKeys {
    // ---
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    // ---
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Sign a token for `user_id` valid for the configured lifetime.
    pub fn issue(&self, user_id: i64, role: &str) -> Result<String, AuthError> {
        // ---
        let now = Utc::now().timestamp().max(0) as usize;
        let claims = Claims {
            sub: user_id,
            role: role.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as usize,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    /// Validate signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        // ---
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// Hash a password into a PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    // ---
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    // ---
    PasswordHash::new(password_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Token from an `Authorization: Bearer <token>` header value.
fn bearer_token(header: &str) -> Option<&str> {
    // ---
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn claims_from_parts(parts: &Parts, keys: &TokenKeys) -> Result<Claims, AuthError> {
    // ---
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    let token = bearer_token(header).ok_or(AuthError::MissingToken)?;
    keys.verify(token)
}

/// Any authenticated user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

/// An authenticated user with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(claims_from_parts(parts, &state.tokens)?))
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // ---
        let claims = claims_from_parts(parts, &state.tokens)?;
        if !claims.is_admin() {
            return Err(AuthError::AdminRequired.into());
        }
        Ok(Self(claims))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_password_round_trip() {
        // ---
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        // ---
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_token_carries_user_and_role() {
        // ---
        let keys = keys();
        let token = keys.issue(42, ROLE_ADMIN).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        // ---
        let token = TokenKeys::new("other", Duration::from_secs(60)).issue(1, "user").unwrap();
        assert!(matches!(keys().verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // ---
        let keys = keys();
        let past = (Utc::now().timestamp() - 7200) as usize;
        let token = keys
            .sign(&Claims {
                sub: 1,
                role: "user".to_string(),
                iat: past,
                exp: past + 60,
            })
            .unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_bearer_token_parsing() {
        // ---
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
