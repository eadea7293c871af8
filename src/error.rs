use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("malformed payload: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("session exists: {0}")]
    SessionExists(String),
    #[error("contact inbox binding failed: {0}")]
    Binding(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidPhone(_) | RelayError::Validation(_) | RelayError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::SessionExists(_) => StatusCode::CONFLICT,
            // TODO: give UnsupportedContent its own 4xx status.
            RelayError::Binding(_)
            | RelayError::Upstream(_)
            | RelayError::UnsupportedContent(_)
            | RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RelayError::InvalidPhone(_) => "invalid phone number",
            RelayError::Validation(_) => "validation failed",
            RelayError::Decode(_) => "invalid payload",
            RelayError::NotFound(_) => "not found",
            RelayError::SessionExists(_) => "session exists",
            RelayError::Binding(_) => "contact inbox binding failed",
            RelayError::Upstream(_) => "upstream error",
            RelayError::UnsupportedContent(_) => "unsupported content",
            RelayError::Storage(_) => "storage error",
        }
    }

    fn description(&self) -> Option<String> {
        let detail = match self {
            RelayError::InvalidPhone(d)
            | RelayError::Validation(d)
            | RelayError::Decode(d)
            | RelayError::NotFound(d)
            | RelayError::SessionExists(d)
            | RelayError::Binding(d)
            | RelayError::Upstream(d)
            | RelayError::UnsupportedContent(d)
            | RelayError::Storage(d) => d,
        };
        if detail.is_empty() {
            None
        } else {
            Some(detail.clone())
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Upstream(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::warn!("request rejected: {self}");
        }
        let body = ErrorBody {
            message: self.message().to_string(),
            description: self.description(),
        };
        (status, Json(body)).into_response()
    }
}
