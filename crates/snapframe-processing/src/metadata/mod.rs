//! Camera metadata extraction.
//!
//! Two independent sources feed the same normalized shape: the binary EXIF
//! container inside the image bytes, and an optional client-supplied tag
//! bundle parsed in the browser before upload. Extraction is pure; the same
//! inputs always produce the same [`CameraMetadata`] and never an error.

pub mod client_bundle;
pub mod exif;

use snapframe_core::models::DeviceContext;
use snapframe_core::CameraMetadata;

/// Resolve camera metadata from the available sources.
///
/// Mobile browsers routinely re-encode camera captures and strip EXIF in the
/// process, so on mobile the client bundle is consulted first. Everywhere
/// else the binary container wins and the bundle is only a fallback.
pub fn extract(
    data: &[u8],
    bundle: Option<&serde_json::Value>,
    device: DeviceContext,
) -> CameraMetadata {
    if device.is_mobile {
        if let Some(bundle) = bundle {
            let normalized = client_bundle::normalize(bundle);
            if !normalized.is_empty() {
                tracing::debug!("using client-supplied metadata bundle");
                return normalized;
            }
        }
    }

    let parsed = exif::parse(data);
    if !parsed.is_empty() {
        return parsed;
    }

    if let Some(bundle) = bundle {
        let normalized = client_bundle::normalize(bundle);
        if !normalized.is_empty() {
            tracing::debug!("binary exif absent, falling back to client bundle");
            return normalized;
        }
    }

    CameraMetadata::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_sources_yields_empty_metadata() {
        let metadata = extract(b"not an image", None, DeviceContext::default());
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_bundle_fallback_when_exif_absent() {
        let bundle = json!({"Make": "Apple", "Model": "iPhone 15 Pro"});
        let metadata = extract(b"not an image", Some(&bundle), DeviceContext::default());
        assert_eq!(metadata.make.as_deref(), Some("Apple"));
        assert_eq!(metadata.model.as_deref(), Some("iPhone 15 Pro"));
    }

    #[test]
    fn test_mobile_prefers_bundle() {
        let bundle = json!({"Make": "Google", "ISO": 125});
        let metadata = extract(b"not an image", Some(&bundle), DeviceContext::mobile());
        assert_eq!(metadata.make.as_deref(), Some("Google"));
        assert_eq!(metadata.iso, Some(125));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let bundle = json!({"Model": "X100V", "FNumber": "f/2.0"});
        let first = extract(b"bytes", Some(&bundle), DeviceContext::mobile());
        let second = extract(b"bytes", Some(&bundle), DeviceContext::mobile());
        assert_eq!(first, second);
    }
}
