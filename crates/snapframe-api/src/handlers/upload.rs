use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap},
    Json,
};
use base64::Engine;
use serde::Serialize;
use utoipa::ToSchema;

use snapframe_core::models::{DeviceContext, RawUpload};
use snapframe_core::{AppError, CameraMetadata};

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Compressed image payload, inlined as a base64 data URL.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImageData {
    #[serde(rename = "dataUrl")]
    pub data_url: String,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Display name: the original file name before its first dot.
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    #[serde(rename = "filteredMetadata")]
    pub filtered_metadata: CameraMetadata,
    #[serde(rename = "imageData")]
    pub image_data: ImageData,
}

/// Device classification: an explicit `X-Device-Mobile` hint from the client
/// wins over User-Agent sniffing.
fn device_from_headers(headers: &HeaderMap) -> DeviceContext {
    if let Some(value) = headers
        .get("x-device-mobile")
        .and_then(|value| value.to_str().ok())
    {
        let is_mobile = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );
        return DeviceContext { is_mobile };
    }
    DeviceContext::from_user_agent(
        headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok()),
    )
}

/// Upload photo handler
///
/// Accepts a multipart form with a `file` field and an optional `metadata`
/// field carrying a JSON tag bundle read client-side. Extracts camera
/// metadata, compresses the image under the payload ceiling, and returns
/// both inline.
///
/// # Errors
/// - `AppError::BadRequest` - Missing file or malformed multipart body
/// - `AppError::InvalidInput` - Non-image upload
/// - `AppError::PayloadTooLarge` - File exceeds size limit
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "upload",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo processed successfully", body = UploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, headers, multipart),
    fields(
        request_id = %uuid::Uuid::new_v4(),
        operation = "upload_photo"
    )
)]
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let device = device_from_headers(&headers);

    let mut upload: Option<RawUpload> = None;
    let mut bundle: Option<serde_json::Value> = None;

    while let Some(field) = multipart.next_field().await.map_err(HttpAppError::from)? {
        match field.name() {
            Some("file") => {
                let original_file_name = field.file_name().unwrap_or("photo").to_string();
                let declared_mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(HttpAppError::from)?;
                upload = Some(RawUpload {
                    data: data.to_vec(),
                    declared_mime_type,
                    original_file_name,
                });
            }
            Some("metadata") => {
                // Best effort: a malformed client bundle never fails the upload
                if let Ok(text) = field.text().await {
                    match serde_json::from_str(&text) {
                        Ok(value) => bundle = Some(value),
                        Err(err) => {
                            tracing::debug!(error = %err, "ignoring malformed metadata bundle");
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let upload =
        upload.ok_or_else(|| HttpAppError(AppError::BadRequest("No file uploaded".to_string())))?;

    state.validator.validate(&upload)?;

    tracing::info!(
        file_name = %upload.original_file_name,
        size_bytes = upload.size_bytes(),
        mime_type = %upload.declared_mime_type,
        is_mobile = device.is_mobile,
        has_bundle = bundle.is_some(),
        "processing upload"
    );

    let name = upload.file_stem().to_string();
    let outcome = state.pipeline.process(upload, bundle, device).await;

    let encoded = base64::engine::general_purpose::STANDARD.encode(&outcome.image.bytes);
    let data_url = format!("data:{};base64,{}", outcome.image.mime_type, encoded);

    tracing::info!(
        output_bytes = outcome.image.size_bytes,
        met_target = outcome.image.met_target,
        has_metadata = !outcome.metadata.is_empty(),
        "upload processed"
    );

    Ok(Json(UploadResponse {
        filtered_metadata: outcome.metadata,
        image_data: ImageData {
            data_url,
            content_type: outcome.image.mime_type.clone(),
            name,
        },
    }))
}
