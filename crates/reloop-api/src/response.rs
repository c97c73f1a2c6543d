use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use reloop_types::api::Envelope;

/// Stock envelope messages shared across handlers.
pub mod messages {
    pub const SUCCESS: &str = "Operation successful";
    pub const CREATED: &str = "Resource created successfully";
    pub const INVALID_DATA: &str = "Invalid data provided";
    pub const INVALID_PARAMETERS: &str = "Invalid parameters provided";
    pub const NOT_FOUND: &str = "Resource not found";
    pub const VALIDATION_FAILED: &str = "Validation failed.";
}

/// `{"message": ..., "data": ...}` with the given status.
pub fn reply<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (status, Json(Envelope { message: message.to_string(), data: Some(data) })).into_response()
}

/// `{"message": ...}` with no payload.
pub fn notice(status: StatusCode, message: &str) -> Response {
    (status, Json(Envelope::<()> { message: message.to_string(), data: None })).into_response()
}
