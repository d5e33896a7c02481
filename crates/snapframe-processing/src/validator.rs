//! Upload validation ahead of any decode work.

use thiserror::Error;

use snapframe_core::models::RawUpload;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is empty")]
    EmptyFile,

    #[error("File size {actual} bytes exceeds the maximum of {max} bytes")]
    FileTooLarge { actual: usize, max: usize },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("File extension '{extension}' does not match content type '{content_type}'")]
    ExtensionMismatch {
        extension: String,
        content_type: String,
    },
}

/// Known image extensions and the content types they are allowed to carry.
/// Extensions absent from this table pass, since browsers regularly invent
/// their own names for camera captures.
const EXTENSION_CONTENT_TYPES: &[(&str, &[&str])] = &[
    ("jpg", &["image/jpeg", "image/jpg"]),
    ("jpeg", &["image/jpeg", "image/jpg"]),
    ("png", &["image/png"]),
    ("gif", &["image/gif"]),
    ("webp", &["image/webp"]),
    ("heic", &["image/heic", "image/heif"]),
    ("heif", &["image/heic", "image/heif"]),
];

/// Validates uploads against size and type constraints before they reach
/// the processing pipeline.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_file_size: usize,
}

impl UploadValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    pub fn validate(&self, upload: &RawUpload) -> Result<(), ValidationError> {
        self.validate_file_size(upload.size_bytes())?;
        self.validate_content_type(&upload.declared_mime_type)?;
        self.validate_extension(&upload.original_file_name, &upload.declared_mime_type)?;
        Ok(())
    }

    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                actual: size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        if content_type.to_lowercase().starts_with("image/") {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    }

    fn validate_extension(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<(), ValidationError> {
        let Some(extension) = file_name.rsplit('.').next().filter(|e| *e != file_name) else {
            return Ok(());
        };
        let extension = extension.to_lowercase();

        let Some((_, allowed)) = EXTENSION_CONTENT_TYPES
            .iter()
            .find(|(ext, _)| *ext == extension)
        else {
            tracing::debug!(extension, "unrecognized extension, skipping cross-check");
            return Ok(());
        };

        let content_type = content_type.to_lowercase();
        if allowed.contains(&content_type.as_str()) {
            Ok(())
        } else {
            Err(ValidationError::ExtensionMismatch {
                extension,
                content_type,
            })
        }
    }
}
