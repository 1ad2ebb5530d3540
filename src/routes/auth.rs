//! Registration, login and token introspection.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::models::UserProfile;
use crate::response::{ApiError, ApiResponse, ApiResult};
use crate::store::StoreError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    phone: Option<String>,
    password: Option<String>,
    nickname: Option<String>,
}

impl Credentials {
    /// Trimmed phone and raw password, both required.
    fn required(&self) -> Result<(&str, &str), ApiError> {
        // ---
        let phone = self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let password = self.password.as_deref().filter(|p| !p.is_empty());
        match (phone, password) {
            (Some(phone), Some(password)) => Ok((phone, password)),
            _ => Err(ApiError::bad_request("phone_and_password_required")),
        }
    }
}

#[derive(Debug, Serialize)]
struct Session {
    token: String,
    user: UserProfile,
}

/// `POST /auth/register`
async fn register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Session> {
    // ---
    let Json(creds) = body?;
    let (phone, password) = creds.required()?;

    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let nickname = creds.nickname.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = match state.store.create_user(phone, &password_hash, nickname).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => return Err(ApiError::Conflict("phone_exists".to_string())),
        Err(err) => return Err(err.into()),
    };

    info!(user_id = user.id, "User registered");
    let token = state.tokens.issue(user.id, &user.role)?;
    Ok(ApiResponse::ok(
        Session {
            token,
            user: user.into(),
        },
        "registered",
    ))
}

/// `POST /auth/login`
async fn login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Session> {
    // ---
    let Json(creds) = body?;
    let (phone, password) = creds.required()?;

    let invalid = || ApiError::Unauthorized("invalid_credentials".to_string());
    let user = state.store.find_user_by_phone(phone).await?.ok_or_else(invalid)?;

    let password = password.to_string();
    let password_hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !verified {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.id, &user.role)?;
    Ok(ApiResponse::ok(
        Session {
            token,
            user: user.into(),
        },
        "success",
    ))
}

/// `GET /auth/me`
pub(super) async fn me(State(state): State<AppState>, AuthUser(claims): AuthUser) -> ApiResult<UserProfile> {
    // ---
    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user_not_found".to_string()))?;
    Ok(ApiResponse::ok(user.into(), "success"))
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::test_support::spawn;
    use crate::sync::test_support::{FakeProvider, MemoryStore};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_register_requires_phone_and_password() {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let response = server
            .client
            .post(server.url("/auth/register"))
            .json(&json!({"phone": "13800000000"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "phone_and_password_required");
    }

    #[tokio::test]
    async fn test_login_rejects_malformed_body() {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let response = server
            .client
            .post(server.url("/auth/login"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let response = server.client.get(server.url("/auth/me")).send().await.unwrap();

        assert_eq!(response.status(), 401);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "token_required");
    }

    #[tokio::test]
    async fn test_me_rejects_forged_token() {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let response = server
            .client
            .get(server.url("/auth/me"))
            .bearer_auth("eyJhbGciOiJIUzI1NiJ9.e30.forged")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "invalid_token");
    }
}
