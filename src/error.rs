//! Application error taxonomy.
//!
//! A small closed set of error codes mapped one-to-one onto HTTP statuses.
//! Handlers return `AppResult<T>`; the response body is JSON by default and
//! is re-rendered as HTML by the negotiation middleware for browser clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

pub type AppResult<T> = Result<T, AppError>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Invalid {
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    TooLarge(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    PaymentRequired(String),
    /// The cause is logged but never shown to the user.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn validation(fields: Vec<FieldError>) -> Self {
        Self::Invalid {
            message: "Validation failed".to_string(),
            fields,
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::Internal(cause.to_string())
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "EINVALID",
            Self::Unauthorized(_) => "EUNAUTHORIZED",
            Self::Forbidden(_) => "EFORBIDDEN",
            Self::NotFound(_) => "ENOTFOUND",
            Self::Conflict(_) => "ECONFLICT",
            Self::Gone(_) => "EGONE",
            Self::TooLarge(_) => "ETOOLARGE",
            Self::RateLimited(_) => "ERATELIMIT",
            Self::NotImplemented(_) => "ENOTIMPL",
            Self::PaymentRequired(_) => "EPAYMENT",
            Self::Internal(_) => "EINTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Invalid { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gone(_) => StatusCode::GONE,
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to any client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Invalid { fields, .. } => fields,
            _ => &[],
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => AppError::NotFound("Record not found".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::Conflict("Record already exists".to_string())
            }
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                AppError::Conflict("Record is referenced by other records".to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {} not found", key)),
            StorageError::InvalidKey(key) => AppError::invalid(format!("Invalid object key: {}", key)),
            StorageError::BadSignature => AppError::Forbidden("Invalid or tampered link".to_string()),
            StorageError::Expired => AppError::Gone("This link has expired".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// Attached to error responses so the negotiation middleware can re-render
/// them for HTML clients.
#[derive(Debug, Clone)]
pub struct RenderedError(pub ErrorPayload);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self);
        } else {
            tracing::info!(code = self.code(), "request rejected: {}", self);
        }

        let payload = ErrorPayload {
            code: self.code(),
            message: self.public_message(),
            fields: self.fields().to_vec(),
        };
        let mut response = (
            status,
            Json(ErrorBody {
                error: payload.clone(),
            }),
        )
            .into_response();
        response.extensions_mut().insert(RenderedError(payload));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_one_to_one_onto_statuses() {
        let errors = vec![
            AppError::invalid("x"),
            AppError::Unauthorized("x".into()),
            AppError::Forbidden("x".into()),
            AppError::NotFound("x".into()),
            AppError::Conflict("x".into()),
            AppError::Gone("x".into()),
            AppError::TooLarge("x".into()),
            AppError::RateLimited("x".into()),
            AppError::NotImplemented("x".into()),
            AppError::PaymentRequired("x".into()),
            AppError::internal("x"),
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let mut statuses: Vec<_> = errors.iter().map(|e| e.status().as_u16()).collect();
        codes.sort();
        codes.dedup();
        statuses.sort();
        statuses.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(statuses.len(), errors.len());
    }

    #[test]
    fn test_internal_cause_is_hidden() {
        let err = AppError::internal("disk on fire at /var/lib/db");
        assert!(!err.public_message().contains("disk"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_diesel_not_found_maps_to_enotfound() {
        let err: AppError = diesel::result::Error::NotFound.into();
        assert_eq!(err.code(), "ENOTFOUND");
    }

    #[test]
    fn test_validation_carries_fields() {
        let err = AppError::validation(vec![FieldError::new("name", "Name is required")]);
        assert_eq!(err.code(), "EINVALID");
        assert_eq!(err.fields().len(), 1);
        assert_eq!(err.fields()[0].field, "name");
    }

    #[tokio::test]
    async fn test_into_response_attaches_rendered_error() {
        let response = AppError::Conflict("busy".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let rendered = response.extensions().get::<RenderedError>().unwrap();
        assert_eq!(rendered.0.code, "ECONFLICT");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "ECONFLICT");
        assert_eq!(json["error"]["message"], "busy");
    }
}
