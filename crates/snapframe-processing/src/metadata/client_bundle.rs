//! Normalization of the client-supplied EXIF tag bundle.
//!
//! Browser-side EXIF readers disagree on tag names and value shapes: some
//! emit bare numbers, some decorated strings ("f/2.8", "1/250s"), some wrap
//! every tag in a `{ "description": ... }` object. One alias table per
//! output field keeps the JSON quirks in this module only.

use serde_json::{Map, Value};

use snapframe_core::CameraMetadata;

const MAKE_ALIASES: &[&str] = &["Make"];
const MODEL_ALIASES: &[&str] = &["Model"];
const ISO_ALIASES: &[&str] = &["ISO", "ISOSpeedRatings", "PhotographicSensitivity"];
const EXPOSURE_ALIASES: &[&str] = &["ExposureTime", "ShutterSpeedValue"];
const F_NUMBER_ALIASES: &[&str] = &["FNumber", "ApertureValue"];
const FOCAL_LENGTH_ALIASES: &[&str] = &["FocalLength", "FocalLengthIn35mmFormat"];
const DATE_ALIASES: &[&str] = &["DateTimeOriginal", "CreateDate", "DateTime"];
const LENS_ALIASES: &[&str] = &["LensModel", "Lens"];

/// Map a raw tag bundle onto the canonical metadata shape. For each field
/// the first alias that carries a usable value wins; anything unparseable
/// stays unset.
pub fn normalize(bundle: &Value) -> CameraMetadata {
    let Some(map) = bundle.as_object() else {
        return CameraMetadata::empty();
    };

    CameraMetadata {
        make: first_string(map, MAKE_ALIASES),
        model: first_string(map, MODEL_ALIASES),
        exposure_time: first_number(map, EXPOSURE_ALIASES),
        iso: first_number(map, ISO_ALIASES).map(|v| v.round() as u32),
        f_number: first_number(map, F_NUMBER_ALIASES),
        focal_length: first_number(map, FOCAL_LENGTH_ALIASES),
        date_time_original: first_string(map, DATE_ALIASES),
        lens_model: first_string(map, LENS_ALIASES),
    }
}

fn first_string(map: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|key| map.get(*key))
        .filter_map(unwrap_value)
        .find_map(value_to_string)
}

fn first_number(map: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    aliases
        .iter()
        .filter_map(|key| map.get(*key))
        .filter_map(unwrap_value)
        .find_map(parse_loose_number)
}

/// Some readers wrap each tag in an object carrying the rendered text.
fn unwrap_value(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(obj) => obj.get("description").or_else(|| obj.get("value")),
        Value::Null => None,
        other => Some(other),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Pull a number out of decorated text such as "f/2.8", "ISO 800" or
/// "1/250s". Fractions divide; otherwise everything but the digits and the
/// first decimal point is discarded.
fn parse_loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_loose_str(s),
        _ => None,
    }
}

fn parse_loose_str(s: &str) -> Option<f64> {
    if let Some((numerator, denominator)) = s.split_once('/') {
        if let (Some(n), Some(d)) = (strip_to_number(numerator), strip_to_number(denominator)) {
            if d != 0.0 {
                return Some(n / d);
            }
        }
    }
    strip_to_number(s)
}

fn strip_to_number(s: &str) -> Option<f64> {
    let mut cleaned = String::new();
    let mut seen_dot = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            cleaned.push(c);
        } else if c == '.' && !seen_dot {
            cleaned.push(c);
            seen_dot = true;
        }
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_tags_normalize() {
        let bundle = json!({
            "Make": "FUJIFILM",
            "Model": "X-T5",
            "ISO": 800,
            "ExposureTime": 0.008,
            "FNumber": 1.4,
            "FocalLength": 35.0,
            "DateTimeOriginal": "2024:06:01 18:22:31",
            "LensModel": "XF35mmF1.4 R"
        });
        let metadata = normalize(&bundle);
        assert_eq!(metadata.make.as_deref(), Some("FUJIFILM"));
        assert_eq!(metadata.model.as_deref(), Some("X-T5"));
        assert_eq!(metadata.iso, Some(800));
        assert_eq!(metadata.exposure_time, Some(0.008));
        assert_eq!(metadata.f_number, Some(1.4));
        assert_eq!(metadata.focal_length, Some(35.0));
        assert_eq!(
            metadata.date_time_original.as_deref(),
            Some("2024:06:01 18:22:31")
        );
        assert_eq!(metadata.lens_model.as_deref(), Some("XF35mmF1.4 R"));
    }

    #[test]
    fn test_iso_aliases_resolve() {
        let bundle = json!({"ISOSpeedRatings": 200});
        assert_eq!(normalize(&bundle).iso, Some(200));

        let bundle = json!({"PhotographicSensitivity": "ISO 1600"});
        assert_eq!(normalize(&bundle).iso, Some(1600));
    }

    #[test]
    fn test_decorated_strings_parse() {
        let bundle = json!({
            "FNumber": "f/2.8",
            "ExposureTime": "1/250s",
            "FocalLength": "50 mm"
        });
        let metadata = normalize(&bundle);
        assert_eq!(metadata.f_number, Some(2.8));
        assert_eq!(metadata.exposure_time, Some(0.004));
        assert_eq!(metadata.focal_length, Some(50.0));
    }

    #[test]
    fn test_description_wrapper_objects() {
        let bundle = json!({
            "Make": {"description": "SONY"},
            "ISO": {"description": 640}
        });
        let metadata = normalize(&bundle);
        assert_eq!(metadata.make.as_deref(), Some("SONY"));
        assert_eq!(metadata.iso, Some(640));
    }

    #[test]
    fn test_unusable_values_stay_unset() {
        let bundle = json!({
            "Make": "",
            "ISO": "not a number",
            "FNumber": null,
            "Model": ["array", "is", "wrong"]
        });
        let metadata = normalize(&bundle);
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_non_object_bundle_is_empty() {
        assert!(normalize(&json!("just a string")).is_empty());
        assert!(normalize(&json!(42)).is_empty());
        assert!(normalize(&json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn test_canonical_name_wins_over_alias() {
        let bundle = json!({"ISO": 100, "ISOSpeedRatings": 999});
        assert_eq!(normalize(&bundle).iso, Some(100));
    }
}
