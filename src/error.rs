//! Central error type for the auth layer and its Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// AuthError
///
/// Every failure the auth engine, the storer, or the client state layer can report.
/// Request handlers return it directly; `IntoResponse` turns it into a sanitized reply.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,

    #[error("user already exists")]
    UserExists,

    #[error("token not found")]
    TokenNotFound,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("mail error: {0}")]
    Mail(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::TokenNotFound | AuthError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to hand back to a client.
    pub fn sanitized_message(&self) -> &'static str {
        match self {
            AuthError::UserNotFound => "User not found",
            AuthError::UserExists => "That user already exists",
            AuthError::TokenNotFound | AuthError::InvalidToken(_) => "Invalid token",
            _ => "An internal server error occurred",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, self.sanitized_message()).into_response()
    }
}

/// ConfigError
///
/// Raised by `AppConfig::load` when the environment cannot produce a usable configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingSecret(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
