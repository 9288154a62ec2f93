use axum::{
    http::{header::WWW_AUTHENTICATE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::Challenge;

/// Route-level error type. Every failure a handler can produce maps onto
/// one of four statuses: 400 for caller mistakes, 401 for missing or wrong
/// credentials, 404 for configs with no data yet, 500 for everything else.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized(Challenge),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid_name(name: &str) -> Self {
        Self::Validation(format!(
            "invalid configuration name: {name:?} (allowed: letters, digits, underscore, hyphen)"
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
            }
            ApiError::Unauthorized(challenge) => (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, challenge.header_value())],
                Json(json!({"error": challenge.message()})),
            )
                .into_response(),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "No data available", "message": msg})),
            )
                .into_response(),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": e.to_string()})),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("none".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_carries_challenge_header() {
        let resp = ApiError::Unauthorized(Challenge::Bearer).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let header = resp.headers().get(WWW_AUTHENTICATE).unwrap();
        assert!(header.to_str().unwrap().starts_with("Bearer"));
    }
}
