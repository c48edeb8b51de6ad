use crate::AppState;
use crate::convert::{ConversionForm, ConversionRequest, ConversionResult, convert};
use crate::error::ConvertError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Extension, Multipart};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

pub const CONVERT_ROUTE: &str = "/api/convert-to-webp";

/// Success envelope of `POST /api/convert-to-webp`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub webp_url: String,
    pub original_size: usize,
    pub webp_size: usize,
    pub size_reduction: f64,
    pub quality: u8,
    pub is_animated: bool,
}

impl From<ConversionResult> for ConvertResponse {
    fn from(result: ConversionResult) -> Self {
        Self {
            success: true,
            webp_url: result.data_url(),
            original_size: result.original_size,
            webp_size: result.webp_size(),
            size_reduction: result.size_reduction(),
            quality: result.quality.get(),
            is_animated: result.is_animated,
        }
    }
}

/// Convert one uploaded image to WebP.
///
/// The multipart extractor is taken as a `Result` so that a malformed or
/// non-multipart request still gets the JSON failure body.
pub async fn convert_to_webp(
    Extension(state): Extension<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match handle_convert(&state, multipart).await {
        Ok(result) => (StatusCode::OK, Json(ConvertResponse::from(result))).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn handle_convert(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ConversionResult, ConvertError> {
    let form = ConversionForm::read(multipart?).await?;
    let request = ConversionRequest::try_from(form)?;
    convert(state, request).await
}
