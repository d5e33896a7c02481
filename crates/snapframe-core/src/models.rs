//! Domain models for a single upload-processing operation.
//!
//! Every type here is created at ingress and discarded when the response is
//! written; nothing is shared across requests.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Camera metadata extracted from an uploaded photo.
///
/// The serialized record always carries exactly these eight keys; an unknown
/// field is `null`, never omitted. Downstream consumers key off presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, ToSchema)]
pub struct CameraMetadata {
    #[serde(rename = "Make")]
    pub make: Option<String>,
    #[serde(rename = "Model")]
    pub model: Option<String>,
    /// Exposure time in seconds (1/250 s is 0.004).
    #[serde(rename = "ExposureTime")]
    pub exposure_time: Option<f64>,
    #[serde(rename = "ISO")]
    pub iso: Option<u32>,
    #[serde(rename = "FNumber")]
    pub f_number: Option<f64>,
    /// Focal length in millimeters.
    #[serde(rename = "FocalLength")]
    pub focal_length: Option<f64>,
    /// Original camera timestamp, kept in the camera's own format.
    #[serde(rename = "DateTimeOriginal")]
    pub date_time_original: Option<String>,
    #[serde(rename = "LensModel")]
    pub lens_model: Option<String>,
}

impl CameraMetadata {
    /// All-null record, used when no metadata source yields anything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.exposure_time.is_none()
            && self.iso.is_none()
            && self.f_number.is_none()
            && self.focal_length.is_none()
            && self.date_time_original.is_none()
            && self.lens_model.is_none()
    }
}

/// Device class derived once from request signals; affects compression
/// aggressiveness only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceContext {
    pub is_mobile: bool,
}

fn mobile_ua_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini")
            .expect("mobile UA pattern is valid")
    })
}

impl DeviceContext {
    pub fn mobile() -> Self {
        Self { is_mobile: true }
    }

    /// Classify from a User-Agent header value; absent or empty means desktop.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let is_mobile = user_agent
            .map(|ua| mobile_ua_pattern().is_match(ua))
            .unwrap_or(false);
        Self { is_mobile }
    }
}

/// Raw upload as received at ingress.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub data: Vec<u8>,
    pub declared_mime_type: String,
    pub original_file_name: String,
}

impl RawUpload {
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Filename stem handed to the frame compositor: text before the first dot.
    pub fn file_stem(&self) -> &str {
        self.original_file_name
            .split('.')
            .next()
            .unwrap_or(&self.original_file_name)
    }
}
