//! JSON response envelope and HTTP error mapping.
//!
//! Every endpoint answers with the same shape:
//! ```json
//! { "code": "OK", "message": "success", "data": { ... } }
//! ```
//! Errors carry an empty object in `data` and a short machine-readable
//! reason in `message` (e.g. `city_not_found`).

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;
use crate::sync::SyncError;

// ---

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    // ---
    pub code: &'static str,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// `200 OK` with `data`.
    pub fn ok(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: "OK",
            message: message.into(),
            data,
        })
    }
}

/// Handler return type: an `OK` envelope or an error envelope.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Errors rendered as non-2xx envelopes.
#[derive(Debug, Error)]
pub enum ApiError {
    // ---
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    // ---
    pub fn bad_request(reason: &str) -> Self {
        Self::BadRequest(reason.to_string())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "server_error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ApiResponse {
                code,
                message,
                data: json!({}),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("{}_not_found", what.replace(' ', "_"))),
            StoreError::Conflict(what) => Self::Conflict(format!("{}_exists", what.replace(' ', "_"))),
            StoreError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Self::Unauthorized("token_required".to_string()),
            AuthError::InvalidToken => Self::Unauthorized("invalid_token".to_string()),
            AuthError::AdminRequired => Self::Forbidden("admin_required".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        tracing::debug!(error = %err, "Rejected query string");
        Self::bad_request("invalid_query")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        tracing::debug!(error = %err, "Rejected request body");
        Self::bad_request("invalid_body")
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        tracing::debug!(error = %err, "Rejected path parameter");
        Self::bad_request("invalid_path")
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::UnknownSource(_) => Self::bad_request("invalid_source"),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        // ---
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        // ---
        let (status, body) = render(ApiError::bad_request("city_id_required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(body["message"], "city_id_required");
        assert_eq!(body["data"], json!({}));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        // ---
        let (status, body) = render(ApiError::Internal("connection refused".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "server_error");
    }

    #[test]
    fn test_store_errors_map_to_reasons() {
        // ---
        let not_found = ApiError::from(StoreError::NotFound("user"));
        assert!(matches!(not_found, ApiError::NotFound(ref m) if m == "user_not_found"));

        let conflict = ApiError::from(StoreError::Conflict("phone"));
        assert!(matches!(conflict, ApiError::Conflict(ref m) if m == "phone_exists"));
    }

    #[test]
    fn test_ok_envelope() {
        // ---
        let Json(body) = ApiResponse::ok(json!({"id": 1}), "created");
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["code"], "OK");
        assert_eq!(value["message"], "created");
        assert_eq!(value["data"]["id"], 1);
    }
}
