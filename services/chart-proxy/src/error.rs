//! Error types for the chart proxy

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::source::SourceError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The request path or reference could not be resolved
    #[error("{0}")]
    InvalidParams(String),

    /// The manifest is still absent after populating it from the chart source
    #[error("Chart prepare error: {0} not found")]
    NotFound(String),

    /// The method is not supported on this path, or the path matches no route
    #[error("We don't understand your method + url: {method} {path}")]
    MethodUnknown {
        /// Request method
        method: Method,
        /// Request path
        path: String,
    },

    /// A query parameter could not be parsed
    #[error("{0}")]
    BadRequest(String),

    /// The chart source failed while preparing a chart or reading an index
    #[error(transparent)]
    Source(#[from] Arc<SourceError>),

    /// Chart preparation finished without delivering a result
    #[error("chart preparation ended without a result")]
    Abandoned,

    /// A response body could not be encoded
    #[error("encoding response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<SourceError> for RegistryError {
    fn from(error: SourceError) -> Self {
        RegistryError::Source(Arc::new(error))
    }
}

impl RegistryError {
    pub(crate) fn no_chart_name() -> Self {
        RegistryError::InvalidParams("No chart name specified".into())
    }

    pub(crate) fn method_unknown(method: &Method, path: &str) -> Self {
        RegistryError::MethodUnknown {
            method: method.clone(),
            path: path.to_owned(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::InvalidParams(_)
            | RegistryError::MethodUnknown { .. }
            | RegistryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Source(error) => match error.as_ref() {
                SourceError::NotFound(_) => StatusCode::NOT_FOUND,
                SourceError::Upstream(_) | SourceError::Cancelled => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            RegistryError::Abandoned | RegistryError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::InvalidParams(_) => "INVALID PARAMS",
            RegistryError::NotFound(_) => "NOT FOUND",
            RegistryError::MethodUnknown { .. } => "METHOD_UNKNOWN",
            RegistryError::BadRequest(_) => "BAD_REQUEST",
            RegistryError::Source(error) => match error.as_ref() {
                SourceError::NotFound(_) => "NOT FOUND",
                SourceError::Upstream(_) | SourceError::Cancelled => "UNKNOWN",
            },
            RegistryError::Abandoned | RegistryError::Encode(_) => "UNKNOWN",
        }
    }
}

/// OCI error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(%code, "{message}");
        } else {
            tracing::debug!(%code, "{message}");
        }

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        (status, axum::Json(body)).into_response()
    }
}
