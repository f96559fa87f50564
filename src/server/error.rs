use crate::error::ScoutError;
use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors returned by HTTP handlers, mapped to a status by class
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    BadRequest(String),

    #[error("Invalid token")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Record not found")]
    NotFound(String),

    #[error("Resource already exists")]
    Conflict(String),

    /// Detail is only present when the server exposes internal errors
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a library error, keeping internal details only when `expose` is set
    pub fn from_scout(err: ScoutError, expose: bool) -> Self {
        match err {
            ScoutError::PropertyNotFound(id) => ApiError::NotFound(format!("Property not found: {}", id)),
            ScoutError::InvalidUrl(url) => ApiError::BadRequest(format!("Invalid URL: {}", url)),
            other => ApiError::Internal(expose.then(|| other.to_string())),
        }
    }

    fn message(&self) -> Option<&str> {
        match self {
            ApiError::BadRequest(m) | ApiError::NotFound(m) | ApiError::Conflict(m) => Some(m.as_str()),
            ApiError::Internal(m) => m.as_deref(),
            ApiError::Unauthorized | ApiError::Forbidden => None,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {:?}", self, self.message());
        }
        let body = json!({
            "error": self.to_string(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_by_class() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Internal(None).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_details_are_hidden_unless_exposed() {
        let io = || ScoutError::Io(std::io::Error::other("disk full"));

        let hidden = ApiError::from_scout(io(), false);
        assert!(matches!(hidden, ApiError::Internal(None)));

        let shown = ApiError::from_scout(io(), true);
        assert_eq!(shown.message(), Some("IO error: disk full"));
    }

    #[test]
    fn library_errors_keep_their_class() {
        let err = ApiError::from_scout(ScoutError::PropertyNotFound("42".into()), false);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = ApiError::from_scout(ScoutError::InvalidUrl("nope".into()), false);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
