use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ride::RideStatus;

/// Main error type for the sparrow-dispatch service
#[derive(Debug)]
pub enum DispatchError {
    // HTTP and API errors
    BadRequest(String),
    Conflict(String),
    InternalServer(String),

    // Storage errors
    RedisConnection(String),
    RedisQuery(String),
    StorageCorrupted(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),

    // Business logic errors
    RideNotFound(String),
    DriverNotFound(String),
    RideAlreadyAssigned(String),
    DispatchInProgress(String),
    InvalidTransition {
        ride_id: String,
        from: RideStatus,
        action: &'static str,
    },
    DriverMismatch {
        ride_id: String,
        driver_id: String,
    },

    // Realtime communication errors
    ConnectionClosed(String),

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),

    // Configuration and setup errors
    InvalidConfiguration(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            DispatchError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            DispatchError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            DispatchError::RedisConnection(msg) => write!(f, "Redis connection error: {}", msg),
            DispatchError::RedisQuery(msg) => write!(f, "Redis query error: {}", msg),
            DispatchError::StorageCorrupted(msg) => write!(f, "Stored record is corrupted: {}", msg),

            DispatchError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            DispatchError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),

            DispatchError::RideNotFound(id) => write!(f, "Ride not found: {}", id),
            DispatchError::DriverNotFound(id) => write!(f, "Driver not found: {}", id),
            DispatchError::RideAlreadyAssigned(id) => write!(f, "Driver already assigned to ride {}", id),
            DispatchError::DispatchInProgress(id) => write!(f, "Dispatch already running for ride {}", id),
            DispatchError::InvalidTransition { ride_id, from, action } => {
                write!(f, "Cannot {} ride {} while it is {}", action, ride_id, from)
            }
            DispatchError::DriverMismatch { ride_id, driver_id } => {
                write!(f, "Driver {} is not assigned to ride {}", driver_id, ride_id)
            }

            DispatchError::ConnectionClosed(target) => write!(f, "Connection closed: {}", target),

            DispatchError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            DispatchError::MissingRequiredField(field) => write!(f, "Missing required field: {}", field),

            DispatchError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            DispatchError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            DispatchError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),

            DispatchError::ValidationFailed(errors) => {
                let details = serde_json::to_value(&errors).ok();
                (StatusCode::BAD_REQUEST, "validation_failed", "Validation errors occurred".to_string(), details)
            }
            DispatchError::MissingRequiredField(field) => {
                (StatusCode::BAD_REQUEST, "missing_field", format!("Missing required field: {}", field), None)
            }
            DispatchError::JsonParsing(msg) => (StatusCode::BAD_REQUEST, "invalid_json", msg, None),

            DispatchError::RideNotFound(id) => (StatusCode::NOT_FOUND, "ride_not_found", format!("Ride not found: {}", id), None),
            DispatchError::DriverNotFound(id) => (StatusCode::NOT_FOUND, "driver_not_found", format!("Driver not found: {}", id), None),

            DispatchError::RideAlreadyAssigned(_) => {
                (StatusCode::BAD_REQUEST, "driver_already_assigned", "Driver already assigned".to_string(), None)
            }
            DispatchError::DispatchInProgress(_) => {
                (StatusCode::CONFLICT, "dispatch_in_progress", "A driver search is already running for this ride".to_string(), None)
            }
            err @ DispatchError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_transition", err.to_string(), None)
            }
            err @ DispatchError::DriverMismatch { .. } => {
                (StatusCode::FORBIDDEN, "driver_mismatch", err.to_string(), None)
            }

            // All other errors are treated as internal server errors
            other => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", other.to_string(), None),
        };

        let error_response = ErrorResponse {
            success: false,
            error: error_type.to_string(),
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<redis::RedisError> for DispatchError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => DispatchError::RedisConnection(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => DispatchError::RedisConnection("Authentication failed".to_string()),
            _ => DispatchError::RedisQuery(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            DispatchError::JsonParsing(err.to_string())
        } else {
            DispatchError::JsonSerialization(err.to_string())
        }
    }
}

// Helper functions for creating common errors
impl DispatchError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        DispatchError::BadRequest(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        DispatchError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        DispatchError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn ride_not_found(ride_id: impl Into<String>) -> Self {
        DispatchError::RideNotFound(ride_id.into())
    }

    pub fn driver_not_found(driver_id: impl Into<String>) -> Self {
        DispatchError::DriverNotFound(driver_id.into())
    }

    pub fn invalid_transition(ride_id: impl Into<String>, from: RideStatus, action: &'static str) -> Self {
        DispatchError::InvalidTransition {
            ride_id: ride_id.into(),
            from,
            action,
        }
    }

    /// Storage and transport faults, as opposed to caller mistakes.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            DispatchError::RedisConnection(_)
                | DispatchError::RedisQuery(_)
                | DispatchError::StorageCorrupted(_)
                | DispatchError::JsonSerialization(_)
                | DispatchError::InternalServer(_)
        )
    }
}
