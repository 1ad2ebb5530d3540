//! Self-service profile endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use super::{auth::me, AppState};
use crate::auth::AuthUser;
use crate::models::UserProfile;
use crate::response::{ApiError, ApiResponse, ApiResult};
use crate::store::{StoreError, UserUpdate};

// ---

const MAX_TAG_LEN: usize = 32;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/users/me", get(me).put(update_me))
        .route("/users/me/tags", put(update_tag))
}

/// `PUT /users/me`
async fn update_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    body: Result<Json<UserUpdate>, JsonRejection>,
) -> ApiResult<UserProfile> {
    // ---
    let Json(mut update) = body?;
    update.phone = update.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    if update.is_empty() {
        return Err(ApiError::bad_request("no_fields"));
    }

    match state.store.update_user(claims.sub, &update).await {
        Ok(user) => Ok(ApiResponse::ok(user.into(), "updated")),
        Err(StoreError::Conflict(_)) => Err(ApiError::Conflict("phone_exists".to_string())),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Deserialize)]
struct TagBody {
    tag: Option<String>,
}

/// Trimmed tag, rejected when empty or too long.
fn valid_tag(tag: Option<&str>) -> Option<&str> {
    // ---
    tag.map(str::trim)
        .filter(|t| !t.is_empty() && t.chars().count() <= MAX_TAG_LEN)
}

/// `PUT /users/me/tags`
async fn update_tag(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    body: Result<Json<TagBody>, JsonRejection>,
) -> ApiResult<UserProfile> {
    // ---
    let Json(body) = body?;
    let tag = valid_tag(body.tag.as_deref()).ok_or_else(|| ApiError::bad_request("invalid_tag"))?;

    let user = state.store.update_tag(claims.sub, tag).await?;
    Ok(ApiResponse::ok(user.into(), "updated"))
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::test_support::spawn;
    use super::*;
    use crate::sync::test_support::{FakeProvider, MemoryStore};
    use serde_json::{json, Value};

    #[test]
    fn test_valid_tag() {
        // ---
        assert_eq!(valid_tag(Some("  asthma ")), Some("asthma"));
        assert_eq!(valid_tag(Some("")), None);
        assert_eq!(valid_tag(None), None);
        assert_eq!(valid_tag(Some(&"x".repeat(33))), None);
    }

    #[tokio::test]
    async fn test_update_me_without_fields_is_rejected() {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let response = server
            .client
            .put(server.url("/users/me"))
            .bearer_auth(server.user_token())
            .json(&json!({"phone": "   "}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "no_fields");
    }

    #[tokio::test]
    async fn test_update_tag_rejects_blank_tag() {
        // ---
        let server = spawn(&MemoryStore::default(), FakeProvider::default()).await;
        let response = server
            .client
            .put(server.url("/users/me/tags"))
            .bearer_auth(server.user_token())
            .json(&json!({"tag": " "}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "invalid_tag");
    }
}
