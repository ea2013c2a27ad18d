use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the dispatch layer
#[derive(Debug, thiserror::Error)]
pub enum AssetwayError {
    #[error("Malformed path: {0}")]
    MalformedPath(String),

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error raised by a delegated handler that carries its own HTTP status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Standard error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
}

impl AssetwayError {
    pub fn malformed_path(msg: impl Into<String>) -> Self {
        Self::MalformedPath(msg.into())
    }

    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::MethodNotAllowed(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Error with an explicit HTTP status, relayed to the client verbatim.
    pub fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: msg.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedPath(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingToken
            | Self::InvalidToken(_)
            | Self::ExpiredToken
            | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Status { status, .. } => *status,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for client responses.
    ///
    /// Client errors (4xx) carry their message. Anything that maps to a
    /// server error collapses to a generic message; details stay in the logs.
    fn safe_message(&self) -> String {
        if self.status_code().is_server_error() {
            return "Internal server error".to_string();
        }
        match self {
            Self::InvalidToken(_) => "Invalid token".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AssetwayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = ?self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for the dispatch layer
pub type Result<T> = std::result::Result<T, AssetwayError>;

impl From<serde_json::Error> for AssetwayError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            AssetwayError::BadRequest(format!("JSON error: {}", err))
        } else {
            AssetwayError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}
