//! OpenAPI documentation

use axum::Json;
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers::upload::{ImageData, UploadResponse};
use snapframe_core::CameraMetadata;

#[derive(OpenApi)]
#[openapi(
    paths(crate::handlers::upload::upload_photo, crate::handlers::health::health),
    components(schemas(UploadResponse, ImageData, CameraMetadata, ErrorResponse)),
    tags(
        (name = "upload", description = "Photo upload, metadata extraction and compression"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
