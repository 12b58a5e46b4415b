use thiserror::Error;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A uniqueness or exclusion constraint rejected the write (HTTP 409).
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
}

impl DatabaseError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => DatabaseError::Auth(message),
            404 => DatabaseError::NotFound(message),
            409 => DatabaseError::Conflict(message),
            502..=504 => DatabaseError::Unavailable(message),
            _ => DatabaseError::Api { status, message },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, DatabaseError::Unavailable(_))
    }
}

impl From<reqwest::Error> for DatabaseError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DatabaseError::Decode(e.to_string())
        } else {
            DatabaseError::Unavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(e: serde_json::Error) -> Self {
        DatabaseError::Decode(e.to_string())
    }
}

impl From<DatabaseError> for AppError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(msg) => AppError::NotFound(msg),
            DatabaseError::Auth(msg) => AppError::Auth(msg),
            DatabaseError::Conflict(msg) => AppError::Conflict(msg),
            DatabaseError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::Database(other.to_string()),
        }
    }
}
