use std::collections::BTreeMap;
use std::str::FromStr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use reloop_types::api::Envelope;
use reloop_types::models::InvalidChoice;

pub const REQUIRED: &str = "This field is required.";

/// Per-field validation messages, serialized as `{"field": ["msg", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Pass a required value through, recording an error when it is absent.
    pub fn require<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, REQUIRED);
        }
        value
    }

    /// Like `require`, but blank strings count as missing.
    pub fn require_text(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value {
            Some(v) if !v.trim().is_empty() => Some(v),
            Some(_) => {
                self.add(field, "This field may not be blank.");
                None
            }
            None => {
                self.add(field, REQUIRED);
                None
            }
        }
    }

    /// Parse an optional choice string. `None` in, `None` out.
    pub fn choice<T>(&mut self, field: &str, value: Option<&str>) -> Option<T>
    where
        T: FromStr<Err = InvalidChoice>,
    {
        match value?.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                self.add(field, e.to_string());
                None
            }
        }
    }

    /// Round to the column's scale and reject values with too many integer
    /// digits. `max_digits` counts both sides of the decimal point.
    pub fn decimal(&mut self, field: &str, value: f64, max_digits: i32, places: i32) -> f64 {
        let factor = 10f64.powi(places);
        let rounded = (value * factor).round() / factor;
        let whole_digits = max_digits - places;
        if !rounded.is_finite() || rounded.abs() >= 10f64.powi(whole_digits) {
            self.add(
                field,
                format!("Ensure that there are no more than {whole_digits} digits before the decimal point."),
            );
        }
        rounded
    }

    /// Prices and order amounts: ten digits, two of them decimal.
    pub fn money(&mut self, field: &str, value: f64) -> f64 {
        self.decimal(field, value, 10, 2)
    }

    pub fn coordinate(&mut self, field: &str, value: f64) -> f64 {
        self.decimal(field, value, 9, 6)
    }

    pub fn quantity(&mut self, value: i64) -> i64 {
        if value < 0 {
            self.add("quantity", "Ensure this value is greater than or equal to 0.");
        }
        value
    }

    /// `Ok(())` when nothing was recorded, otherwise a 400 carrying the errors.
    pub fn into_result(self, message: &str) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation { message: message.to_string(), errors: self })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, errors: FieldErrors },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Validation { message: message.into(), errors: FieldErrors::default() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation { message, errors } => Envelope {
                message,
                data: (!errors.is_empty()).then_some(errors),
            },
            ApiError::Upstream(cause) => {
                error!("Upstream failure: {}", cause);
                Envelope { message: "An unexpected error occurred.".into(), data: None }
            }
            ApiError::Internal(cause) => {
                error!("Internal error: {:#}", cause);
                Envelope { message: "An unexpected error occurred.".into(), data: None }
            }
            other => Envelope { message: other.to_string(), data: None },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use reloop_types::models::Category;
    use serde_json::{Value, json};

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_render_field_map() {
        let mut errors = FieldErrors::default();
        assert_eq!(errors.require::<i64>("quantity", None), None);
        assert_eq!(errors.choice::<Category>("category", Some("plastic")), None);
        let err = errors.into_result("Validation failed.").unwrap_err();

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "message": "Validation failed.",
                "data": {
                    "category": ["\"plastic\" is not a valid choice."],
                    "quantity": ["This field is required."]
                }
            })
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_their_cause() {
        let err = ApiError::from(anyhow::anyhow!("disk I/O error at /var/lib/secret"));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"message": "An unexpected error occurred."}));
    }

    #[tokio::test]
    async fn plain_errors_have_no_data() {
        let (status, body) = body_json(ApiError::not_found("Order not found.")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "Order not found."}));
    }

    #[test]
    fn decimals_round_and_bound() {
        let mut errors = FieldErrors::default();
        assert_eq!(errors.coordinate("lat", 40.12345678), 40.123457);
        assert_eq!(errors.money("price", 5.556), 5.56);
        assert_eq!(errors.money("tax", 99_999_999.994), 99_999_999.99);
        assert_eq!(errors.quantity(0), 0);
        assert!(errors.is_empty());

        errors.coordinate("lat", 1000.0);
        errors.money("total_amount", 1e8);
        errors.money("price", f64::NAN);
        errors.quantity(-1);
        assert!(errors.get("lat").is_some());
        assert!(errors.get("total_amount").is_some());
        assert!(errors.get("price").is_some());
        assert!(errors.get("quantity").is_some());
    }

    #[test]
    fn blank_text_is_rejected() {
        let mut errors = FieldErrors::default();
        assert_eq!(errors.require_text("title", Some("  ".into())), None);
        assert_eq!(errors.require_text("name", Some("Ann".into())).as_deref(), Some("Ann"));
        assert_eq!(errors.get("title"), Some(&["This field may not be blank.".to_string()][..]));
        assert!(errors.get("name").is_none());
    }
}
