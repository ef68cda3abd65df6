//! Error taxonomy for the formsync library.
//!
//! Every error that can cross the HTTP boundary maps to a status code and a
//! `{message, fieldErrors}` body here, so handlers stay free of ad hoc
//! response shaping.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormsyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        field_errors: BTreeMap<String, String>,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("analysis collaborator failed: {0}")]
    Collaborator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FormsyncError {
    /// Shorthand for a validation error scoped to a single field.
    pub fn field(message: impl Into<String>, field: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut field_errors = BTreeMap::new();
        field_errors.insert(field.into(), detail.into());
        Self::Validation {
            message: message.into(),
            field_errors,
        }
    }
}

/// Error body shared by all non-2xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "fieldErrors")]
    pub field_errors: BTreeMap<String, String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }
}

impl IntoResponse for FormsyncError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            FormsyncError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::new(msg)),
            FormsyncError::Validation {
                message,
                field_errors,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message,
                    field_errors,
                },
            ),
            FormsyncError::MalformedInput(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg)),
            FormsyncError::Collaborator(msg) => {
                tracing::error!("collaborator failure surfaced to client: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody::new("Invalid response from analysis service"),
                )
            }
            FormsyncError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal server error"),
                )
            }
            FormsyncError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal server error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, FormsyncError>;
