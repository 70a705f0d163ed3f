// src/error.rs

use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling for the quiz engine, the comment thread and the HTTP backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    // No response from the backend (connection refused, timeout, broken body)
    Network(String),

    // Rejected before or by the server (400 / 422, empty content, wrong answer shape)
    BadRequest(String),

    // 401 / 403, or no session user where one is required
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict, or an operation the current state refuses
    Conflict(String),

    // 5xx and anything unexpected
    InternalServerError(String),
}

/// Shape of the backend's error body: `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    /// Maps a non-success HTTP status and its body onto an error variant.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_string()
            });

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                AppError::BadRequest(message)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::AuthError(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::CONFLICT => AppError::Conflict(message),
            _ => AppError::InternalServerError(message),
        }
    }

    /// Text shown to the learner in a transient notice.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Network(_) => "Could not reach the server. Please try again.".to_string(),
            AppError::InternalServerError(_) => "Something went wrong on our side.".to_string(),
            AppError::AuthError(msg) if msg.is_empty() => "Please sign in again.".to_string(),
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Transport failures become `Network`; a bad status that slipped through keeps its mapping.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AppError::from_status(status, ""),
            None if err.is_decode() => AppError::InternalServerError(err.to_string()),
            None => AppError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::BadRequest(format!("Invalid URL: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("I/O error: {}", err))
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::BadRequest(format!("Invalid timestamp: {}", err))
    }
}
