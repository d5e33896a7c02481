//! Shared application state

use std::sync::Arc;

use snapframe_core::Config;
use snapframe_processing::{UploadPipeline, UploadValidator};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: UploadPipeline,
    pub validator: UploadValidator,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let pipeline = UploadPipeline::new(&config);
        let validator = UploadValidator::new(config.max_upload_bytes);
        Arc::new(Self {
            config,
            pipeline,
            validator,
        })
    }
}
