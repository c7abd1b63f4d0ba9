//! Errors for the berth recorder.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// A single failed validation check, tied to the input field that failed.
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

#[derive(Error, Debug)]
pub enum RecorderError {
    /// Input validation failed; every failing field is listed.
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("boat already has an active movement")]
    AlreadyActive,

    #[error("boat not found")]
    BoatNotFound,

    #[error("boat is not currently at berth")]
    NoActiveMovement,

    #[error("departure timestamp precedes arrival")]
    DepartureBeforeArrival,

    #[error("invalid serial number: {0}")]
    InvalidSerialNumber(String),

    #[error("configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("database migration error: {0}")]
    MigrationError(String),

    #[error("database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

impl RecorderError {
    /// Collect validation failures into a single error, if any exist.
    pub fn from_field_errors(errors: Vec<FieldError>) -> Result<(), RecorderError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RecorderError::Validation(errors))
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RecorderError::Validation(_) | RecorderError::InvalidSerialNumber(_) => {
                StatusCode::BAD_REQUEST
            }
            RecorderError::AlreadyActive => StatusCode::CONFLICT,
            RecorderError::BoatNotFound | RecorderError::NoActiveMovement => {
                StatusCode::NOT_FOUND
            }
            RecorderError::DepartureBeforeArrival => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for RecorderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        let details = match &self {
            RecorderError::Validation(fields) => serde_json::to_value(fields).ok(),
            RecorderError::DepartureBeforeArrival => Some(serde_json::Value::String(
                "departure timestamp must not precede the arrival timestamp".to_string(),
            )),
            _ => None,
        };
        // Internal causes never leak to the client
        let message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(ErrorBody {
            error: message,
            details,
        });
        (status, body).into_response()
    }
}
