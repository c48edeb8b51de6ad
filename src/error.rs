use crate::codec::CodecError;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::AcquireError;
use tokio::task::JoinError;
use tracing::{error, warn};

pub const MISSING_FILE_MESSAGE: &str = "No image file provided";
pub const UNSUPPORTED_TYPE_MESSAGE: &str = "The provided file is not an image";
pub const CONVERSION_FAILED_MESSAGE: &str = "Failed to convert image";

/// Conversion endpoint errors
///
/// Only the two validation errors reach the caller as-is; everything else is
/// reported as one opaque failure.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no image part in the form")]
    MissingFile,

    #[error("declared media type {0:?} is not an image")]
    UnsupportedType(String),

    #[error("image part is empty")]
    EmptyFile,

    #[error("request is not a readable multipart form: {0}")]
    Rejection(#[from] MultipartRejection),

    #[error("failed to read multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("encoder pool is closed: {0}")]
    Closed(#[from] AcquireError),

    #[error("encoder task failed: {0}")]
    Join(#[from] JoinError),
}

/// Response extension set once the failure has been logged with its cause
#[derive(Debug, Clone, Copy)]
pub struct ErrorLogged;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ConvertError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConvertError::MissingFile | ConvertError::UnsupportedType(_) => {
                StatusCode::BAD_REQUEST
            }
            ConvertError::EmptyFile
            | ConvertError::Rejection(_)
            | ConvertError::Multipart(_)
            | ConvertError::Codec(_)
            | ConvertError::Closed(_)
            | ConvertError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller
    pub fn public_message(&self) -> &'static str {
        match self {
            ConvertError::MissingFile => MISSING_FILE_MESSAGE,
            ConvertError::UnsupportedType(_) => UNSUPPORTED_TYPE_MESSAGE,
            _ => CONVERSION_FAILED_MESSAGE,
        }
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Error converting image");
        } else {
            warn!(error = %self, "Rejected conversion request");
        }

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.public_message().to_string(),
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorLogged);
        response
    }
}
