use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::error;

use vidtide_db::StoreError;
use vidtide_types::api::ApiEnvelope;

use crate::token::TokenError;

/// Error taxonomy for every handler. Maps one-to-one onto HTTP statuses and
/// the uniform `{status, data, message}` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => ApiError::Conflict(format!("{field} already taken")),
            other => ApiError::Internal(other.into()),
        }
    }
}

/// §7 policy: token failures are uniformly re-signaled as unauthorized with
/// the underlying message preserved. Issuance failures are server faults.
impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        if matches!(err, TokenError::Issue(_)) {
            ApiError::Internal(err.into())
        } else {
            ApiError::Unauthorized(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal(cause) = &self {
            error!("Internal error: {cause:#}");
        }
        let body = ApiEnvelope {
            status: status.as_u16(),
            data: serde_json::Value::Null,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Success envelope.
pub fn respond<T: Serialize>(
    status: StatusCode,
    data: T,
    message: &str,
) -> (StatusCode, Json<ApiEnvelope<T>>) {
    (
        status,
        Json(ApiEnvelope {
            status: status.as_u16(),
            data,
            message: message.to_string(),
        }),
    )
}

/// Statically validated JSON bodies: unknown or missing fields are rejected
/// with a 400 envelope before any business logic runs.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))
}
