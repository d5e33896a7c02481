//! Core domain types for snapframe: camera metadata, upload models,
//! configuration, and the shared error taxonomy.

pub mod config;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{CameraMetadata, DeviceContext, RawUpload};
