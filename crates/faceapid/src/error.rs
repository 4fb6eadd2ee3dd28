//! Error responses.
//!
//! Every failure leaves the service as `{"success": false, "error": "<message>"}`
//! with a status code chosen by the variant.

use crate::engine::EngineError;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use faceapi_core::{FrameError, PipelineError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Request body exceeds the upload limit")]
    PayloadTooLarge,

    /// Well-formed input the models cannot use, e.g. an image without a face.
    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Unavailable(String),

    /// Unexpected failure while performing `operation`. The message is
    /// returned to the caller and logged.
    #[error("{operation} failed: {message}")]
    Failed {
        operation: &'static str,
        message: String,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    pub fn failed(operation: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Failed {
            operation,
            message: err.to_string(),
        }
    }

    /// Map an engine failure for `operation`; `no_face` is the message used
    /// when a required face was not found.
    pub fn from_engine(operation: &'static str, no_face: &str, err: EngineError) -> Self {
        match err {
            EngineError::Frame(
                e @ (FrameError::Empty
                | FrameError::Corrupt(_)
                | FrameError::UnsupportedColorDepth),
            ) => ApiError::BadRequest(e.to_string()),
            EngineError::Pipeline(PipelineError::NoFaceDetected) => {
                ApiError::Unprocessable(no_face.to_string())
            }
            EngineError::Pipeline(PipelineError::AnalyzerUnavailable) => {
                ApiError::Unavailable("Attribute analysis models are not loaded".to_string())
            }
            other => ApiError::failed(operation, other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Failed { operation, message } = &self {
            tracing::error!(operation, %message, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
