use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

#[derive(Debug, ThisError)]
pub enum TollgateError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Account temporarily locked")]
    AccountLocked,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("URL blocked: {0}")]
    UrlBlocked(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Too many requests")]
    RateLimited,

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

/// A single rejected field in a submitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl TollgateError {
    pub fn status(&self) -> StatusCode {
        match self {
            TollgateError::InvalidCredentials | TollgateError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            TollgateError::AccountLocked | TollgateError::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            TollgateError::NotFound => StatusCode::NOT_FOUND,
            TollgateError::Conflict(_) => StatusCode::CONFLICT,
            TollgateError::BadRequest(_)
            | TollgateError::MalformedPayload(_)
            | TollgateError::Json(_)
            | TollgateError::InvalidToken
            | TollgateError::UrlParse(_) => StatusCode::BAD_REQUEST,
            TollgateError::ValidationFailed(_)
            | TollgateError::InvalidImage(_)
            | TollgateError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TollgateError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            TollgateError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TollgateError::UrlBlocked(_) => StatusCode::FORBIDDEN,
            TollgateError::Reqwest(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            TollgateError::Reqwest(_) | TollgateError::Upstream(_) => StatusCode::BAD_GATEWAY,
            TollgateError::DatabaseError(_)
            | TollgateError::Io(_)
            | TollgateError::Mail(_)
            | TollgateError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TollgateError::InvalidCredentials => "INVALID_CREDENTIALS",
            TollgateError::Unauthenticated => "UNAUTHENTICATED",
            TollgateError::AccountLocked => "ACCOUNT_LOCKED",
            TollgateError::RateLimited => "RATE_LIMIT",
            TollgateError::NotFound => "NOT_FOUND",
            TollgateError::Conflict(_) => "CONFLICT",
            TollgateError::BadRequest(_) => "BAD_REQUEST",
            TollgateError::MalformedPayload(_) | TollgateError::Json(_) => "MALFORMED_PAYLOAD",
            TollgateError::ValidationFailed(_) => "VALIDATION_FAILED",
            TollgateError::InvalidToken => "INVALID_TOKEN",
            TollgateError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            TollgateError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            TollgateError::InvalidImage(_) | TollgateError::Image(_) => "INVALID_IMAGE",
            TollgateError::UrlBlocked(_) => "URL_BLOCKED",
            TollgateError::UrlParse(_) => "INVALID_URL",
            TollgateError::Reqwest(e) if e.is_timeout() => "UPSTREAM_TIMEOUT",
            TollgateError::Reqwest(_) | TollgateError::Upstream(_) => "BAD_GATEWAY",
            TollgateError::DatabaseError(_)
            | TollgateError::Io(_)
            | TollgateError::Mail(_)
            | TollgateError::UnexpectedError(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller. Internal causes are never exposed.
    fn public_message(&self) -> String {
        match self {
            TollgateError::DatabaseError(_)
            | TollgateError::Io(_)
            | TollgateError::Mail(_)
            | TollgateError::UnexpectedError(_) => "An internal server error occurred.".to_string(),
            TollgateError::Reqwest(_) | TollgateError::Upstream(_) => {
                "Upstream service is unavailable.".to_string()
            }
            TollgateError::Image(_) => "Image could not be processed.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for TollgateError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        }

        let fields = match &self {
            TollgateError::ValidationFailed(fields) => Some(fields.clone()),
            _ => None,
        };
        let body = ApiErrorResponse {
            success: false,
            error: ApiErrorBody {
                code: self.code().to_string(),
                message: self.public_message(),
                fields,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: TollgateError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let (status, body) = body_json(TollgateError::UnexpectedError(
            "secret path /var/db".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("/var/db"));
    }

    #[tokio::test]
    async fn validation_errors_carry_fields() {
        let (status, body) = body_json(TollgateError::ValidationFailed(vec![FieldError::new(
            "age",
            "must be an integer",
        )]))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["fields"][0]["field"], "age");
    }

    #[tokio::test]
    async fn credential_errors_are_vague() {
        let (status, body) = body_json(TollgateError::InvalidCredentials).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }
}
