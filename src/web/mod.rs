//! HTTP error mapping for axum handlers.
//!
//! Handlers return [`Result`] and use `?` on entity calls; a missing row from
//! `get_by_token_or_404` becomes a 404 response.

use crate::core::ModelError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Model(ModelError),
    Input(String),
    Unauthorized(String),
}

impl From<ModelError> for WebError {
    fn from(err: ModelError) -> Self {
        WebError::Model(err)
    }
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::Model(err) => match err {
                ModelError::NotFound { .. } => StatusCode::NOT_FOUND,
                ModelError::ConstraintViolation(_) => StatusCode::CONFLICT,
                ModelError::TokenSpaceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                err if err.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            WebError::Input(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WebError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            WebError::Model(ModelError::NotFound { .. }) => "not_found",
            WebError::Model(ModelError::ConstraintViolation(_)) => "conflict",
            WebError::Model(ModelError::TokenSpaceExhausted { .. }) => "token_space_exhausted",
            WebError::Model(err) if err.is_validation() => "input_error",
            WebError::Model(_) => "internal_error",
            WebError::Input(_) => "input_error",
            WebError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let message = match self {
            WebError::Model(err) => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %err, "request failed");
                }
                err.to_string()
            }
            WebError::Input(msg) | WebError::Unauthorized(msg) => msg,
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::WebError;
    use crate::core::ModelError;
    use http::StatusCode;

    #[test]
    fn model_errors_map_to_statuses() {
        let cases = [
            (
                ModelError::NotFound {
                    entity: "User",
                    key: "abc".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ModelError::ConstraintViolation("token".into()),
                StatusCode::CONFLICT,
            ),
            (
                ModelError::ReadOnlyField {
                    entity: "User",
                    column: "id".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ModelError::TokenSpaceExhausted {
                    entity: "User",
                    attempts: 8,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ModelError::LockError("poisoned".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(WebError::from(err).status(), status);
        }

        let refused = WebError::Unauthorized("sign in".into());
        assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(refused.code(), "unauthorized");
    }
}
