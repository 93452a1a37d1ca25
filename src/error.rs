//! Typed errors and HTTP mapping.

use crate::response::Envelope;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("model {table} has no primary key")]
    MissingPrimaryKey { table: String },
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    #[error("unknown field type '{ty}' for column {column}")]
    UnknownType { column: String, ty: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// One entry of the `validation_error` list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            error: error.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("object does not exist")]
    ObjectNotExist,
    #[error("column does not exist: {0}")]
    ColumnNotExist(String),
    #[error("invalid filter condition {0}")]
    InvalidFilterCondition(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("unauthorized")]
    Unauthorized,
    #[error("handler not found")]
    HandlerNotFound,
    #[error("unsafe request")]
    Unsafe,
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("{0}")]
    Internal(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl ApiError {
    /// Wraps an unstructured hook failure. Hooks that need a specific status
    /// construct `ApiError::Status` themselves.
    pub fn hook(err: impl Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ObjectNotExist | ApiError::HandlerNotFound => StatusCode::NOT_FOUND,
            ApiError::ColumnNotExist(_)
            | ApiError::InvalidFilterCondition(_)
            | ApiError::Unsafe
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::PRECONDITION_FAILED,
            ApiError::Status { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }

    /// Message placed in the response envelope. Store and config internals stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Db(sqlx::Error::RowNotFound) => "object does not exist".into(),
            ApiError::Db(_) => "database operation failed".into(),
            ApiError::Config(_) => "internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut envelope = Envelope::default();
        envelope.fail(&self);
        (status, Json(envelope.prepare())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::Validation(vec![]).status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(ApiError::PermissionDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::ObjectNotExist.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unsafe.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::hook("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::Db(sqlx::Error::RowNotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn database_details_are_not_public() {
        let err = ApiError::Db(sqlx::Error::PoolTimedOut);
        assert_eq!(err.public_message(), "database operation failed");
        assert_eq!(ApiError::Unsafe.public_message(), "unsafe request");
    }
}
