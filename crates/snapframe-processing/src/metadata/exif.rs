//! Binary EXIF extraction.

use std::io::Cursor;

use exif::{Exif, In, Tag, Value};

use snapframe_core::CameraMetadata;

/// Parse the camera fields out of raw image bytes.
///
/// A missing or malformed EXIF container is a normal condition, not an
/// error; every field the container lacks stays unset.
pub fn parse(data: &[u8]) -> CameraMetadata {
    let mut cursor = Cursor::new(data);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(err) => {
            tracing::debug!(error = %err, "no parseable exif container");
            return CameraMetadata::empty();
        }
    };

    CameraMetadata {
        make: string_field(&exif, Tag::Make),
        model: string_field(&exif, Tag::Model),
        exposure_time: rational_field(&exif, Tag::ExposureTime),
        iso: int_field(&exif, Tag::PhotographicSensitivity),
        f_number: rational_field(&exif, Tag::FNumber),
        focal_length: rational_field(&exif, Tag::FocalLength),
        date_time_original: string_field(&exif, Tag::DateTimeOriginal),
        lens_model: string_field(&exif, Tag::LensModel),
    }
}

fn string_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let text = match &field.value {
        Value::Ascii(values) => values
            .iter()
            .map(|v| String::from_utf8_lossy(v))
            .collect::<Vec<_>>()
            .join(" "),
        _ => field.display_value().to_string(),
    };
    let trimmed = text.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn rational_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) => values.first().map(|r| r.to_f64()),
        Value::SRational(values) => values.first().map(|r| r.to_f64()),
        Value::Short(values) => values.first().map(|v| f64::from(*v)),
        Value::Long(values) => values.first().map(|v| f64::from(*v)),
        _ => None,
    }
}

fn int_field(exif: &Exif, tag: Tag) -> Option<u32> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Short(values) => values.first().map(|v| u32::from(*v)),
        Value::Long(values) => values.first().copied(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::{Field, Rational};

    fn tiff_with_fields(fields: Vec<Field>) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut cursor = Cursor::new(Vec::new());
        writer.write(&mut cursor, false).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_parse_typical_camera_fields() {
        let data = tiff_with_fields(vec![
            Field {
                tag: Tag::Make,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"Canon".to_vec()]),
            },
            Field {
                tag: Tag::Model,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![b"Canon EOS R6".to_vec()]),
            },
            Field {
                tag: Tag::ExposureTime,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![Rational::from((1, 250))]),
            },
            Field {
                tag: Tag::FNumber,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![Rational::from((28, 10))]),
            },
            Field {
                tag: Tag::PhotographicSensitivity,
                ifd_num: In::PRIMARY,
                value: Value::Short(vec![400]),
            },
        ]);

        let metadata = parse(&data);
        assert_eq!(metadata.make.as_deref(), Some("Canon"));
        assert_eq!(metadata.model.as_deref(), Some("Canon EOS R6"));
        assert_eq!(metadata.exposure_time, Some(0.004));
        assert_eq!(metadata.f_number, Some(2.8));
        assert_eq!(metadata.iso, Some(400));
        assert!(metadata.lens_model.is_none());
    }

    #[test]
    fn test_parse_without_container_is_empty() {
        assert!(parse(b"definitely not exif").is_empty());
        assert!(parse(&[]).is_empty());
    }

    #[test]
    fn test_whitespace_padded_strings_are_trimmed() {
        let data = tiff_with_fields(vec![Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"  NIKON CORPORATION  ".to_vec()]),
        }]);
        assert_eq!(parse(&data).make.as_deref(), Some("NIKON CORPORATION"));
    }
}
