//! Upload processing orchestration.
//!
//! Ties validation-passed uploads to metadata extraction and adaptive
//! compression, enforcing a wall-clock budget over the whole compression
//! pass. Processing never fails: every degraded path lands on the original
//! bytes and empty metadata rather than an error.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use snapframe_core::models::{DeviceContext, RawUpload};
use snapframe_core::{CameraMetadata, Config};

use crate::compression::{AdaptiveCompressor, BestAttempt, CompressionResult, CompressorConfig};
use crate::metadata;

/// Everything the egress layer needs to answer an upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub metadata: CameraMetadata,
    pub image: CompressionResult,
}

/// Shared, stateless orchestrator. Cheap to clone into request handlers.
#[derive(Clone)]
pub struct UploadPipeline {
    compressor: Arc<AdaptiveCompressor>,
    timeout: Duration,
    target_bytes: usize,
}

impl UploadPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            compressor: Arc::new(AdaptiveCompressor::new(CompressorConfig::from(config))),
            timeout: Duration::from_secs(config.operation_timeout_secs),
            target_bytes: config.target_payload_bytes,
        }
    }

    /// Override the wall-clock compression budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Process one validated upload. Metadata extraction and compression are
    /// both CPU-bound, so each runs on the blocking pool; they do not depend
    /// on each other and run concurrently.
    pub async fn process(
        &self,
        upload: RawUpload,
        bundle: Option<serde_json::Value>,
        device: DeviceContext,
    ) -> UploadOutcome {
        let upload = Arc::new(upload);

        let metadata_task = {
            let upload = Arc::clone(&upload);
            tokio::task::spawn_blocking(move || {
                metadata::extract(&upload.data, bundle.as_ref(), device)
            })
        };

        let image = self.compress_with_budget(Arc::clone(&upload), device).await;

        let metadata = match metadata_task.await {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::error!(error = %err, "metadata extraction task failed");
                CameraMetadata::empty()
            }
        };

        UploadOutcome { metadata, image }
    }

    async fn compress_with_budget(
        &self,
        upload: Arc<RawUpload>,
        device: DeviceContext,
    ) -> CompressionResult {
        let original_size = upload.size_bytes();
        if original_size <= self.target_bytes {
            tracing::debug!(
                size_bytes = original_size,
                "upload already under target, passing through"
            );
            return self.passthrough(&upload);
        }

        let best: BestAttempt = Arc::new(Mutex::new(None));
        let task = {
            let compressor = Arc::clone(&self.compressor);
            let best = Arc::clone(&best);
            let upload = Arc::clone(&upload);
            tokio::task::spawn_blocking(move || {
                compressor.compress_tracked(
                    &upload.data,
                    &upload.declared_mime_type,
                    device,
                    Some(&best),
                )
            })
        };

        let result = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::error!(error = %err, "compression task failed");
                self.salvage(&best, &upload)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_millis = self.timeout.as_millis() as u64,
                    "compression timed out, salvaging best attempt"
                );
                self.salvage(&best, &upload)
            }
        };

        // When nothing fits under the ceiling anyway, a re-encode that barely
        // moved the needle is not worth the generational quality loss.
        if !result.met_target && result.size_bytes * 10 > original_size * 9 {
            tracing::debug!(
                original_size,
                compressed_size = result.size_bytes,
                "compression gained less than ten percent, keeping original bytes"
            );
            return self.passthrough(&upload);
        }

        result
    }

    /// Budget-expiry fallback: the newest successful attempt wins over the
    /// original bytes, which are the answer of last resort.
    fn salvage(&self, best: &BestAttempt, upload: &RawUpload) -> CompressionResult {
        take_best(best).unwrap_or_else(|| self.passthrough(upload))
    }

    fn passthrough(&self, upload: &RawUpload) -> CompressionResult {
        CompressionResult::passthrough(
            &upload.data,
            &upload.declared_mime_type,
            self.target_bytes,
        )
    }
}

fn take_best(slot: &BestAttempt) -> Option<CompressionResult> {
    slot.lock().ok().and_then(|mut slot| slot.take())
}
