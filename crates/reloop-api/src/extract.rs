//! Body, query and path extractors that reject with the JSON envelope instead of
//! axum's plain-text rejections.

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, rejection::JsonRejection},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::response::messages;

/// A JSON request body.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(ApiError::bad_request(format!(
                "{}: {}",
                messages::INVALID_DATA,
                rejection.body_text()
            ))),
        }
    }
}

/// A JSON body that may be absent entirely. An empty body (with or without a
/// content type) yields `T::default()`.
pub struct OptionalPayload<T>(pub T);

impl<S, T> FromRequest<S> for OptionalPayload<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalPayload(T::default()));
        }

        serde_json::from_slice(&bytes)
            .map(OptionalPayload)
            .map_err(|e| ApiError::bad_request(format!("{}: {}", messages::INVALID_DATA, e)))
    }
}

/// Query-string parameters.
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Params(value)),
            Err(rejection) => Err(ApiError::bad_request(format!(
                "{}: {}",
                messages::INVALID_PARAMETERS,
                rejection.body_text()
            ))),
        }
    }
}

/// Path segments, e.g. the `{id}` of `/products/{id}`.
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParam(value)),
            Err(rejection) => Err(ApiError::bad_request(format!(
                "{}: {}",
                messages::INVALID_PARAMETERS,
                rejection.body_text()
            ))),
        }
    }
}
