//! Image processing for snapframe: camera metadata extraction, adaptive
//! compression under a byte ceiling, and the upload orchestration that ties
//! the two together.

pub mod compression;
pub mod metadata;
pub mod pipeline;
pub mod validator;

pub use compression::{
    AdaptiveCompressor, BestAttempt, CompressionPlan, CompressionResult, CompressorConfig,
    OutputFormat,
};
pub use pipeline::{UploadOutcome, UploadPipeline};
pub use validator::{UploadValidator, ValidationError};
