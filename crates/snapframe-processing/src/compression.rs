//! Adaptive image compression under a hard byte ceiling.
//!
//! One invocation walks `Init -> Probing -> Encoding -> Evaluate ->
//! {Shrink&Retry | Accept | GiveUp}`: probe the source dimensions, pick a
//! starting quality and dimension cap from the source size and device class,
//! then re-encode with monotonically non-increasing quality and dimension cap
//! until the output fits the target or the attempt budget runs out. The
//! compressor never raises past its own boundary; it always returns bytes.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use img_parts::ImageEXIF;

use snapframe_core::models::DeviceContext;
use snapframe_core::Config;

const DESKTOP_DIMENSION_CAP: u32 = 3072;
const DESKTOP_DIMENSION_CAP_AGGRESSIVE: u32 = 2560;
const MOBILE_DIMENSION_CAP: u32 = 2560;
const MOBILE_DIMENSION_CAP_AGGRESSIVE: u32 = 2048;
/// Dimension caps never shrink below this.
const MIN_DIMENSION_CAP: u32 = 320;

/// Output format for compressed images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    /// Map the declared MIME type to the encode format.
    ///
    /// PNG sources above the target ceiling are redirected to JPEG, which
    /// compresses photographic content far better at equivalent visual
    /// quality. HEIC and every unrecognized type transcode to JPEG.
    pub fn from_declared_mime(mime: &str, source_bytes: usize, target_bytes: usize) -> Self {
        match mime.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => OutputFormat::Jpeg,
            "image/png" => {
                if source_bytes > target_bytes {
                    OutputFormat::Jpeg
                } else {
                    OutputFormat::Png
                }
            }
            "image/webp" => OutputFormat::WebP,
            _ => OutputFormat::Jpeg,
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }
}

/// Tunables for one compressor instance.
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Byte ceiling the output must fit under.
    pub target_bytes: usize,
    pub max_attempts: u32,
    pub quality_floor: f64,
    pub quality_step: f64,
    pub dimension_shrink_factor: f64,
    /// Carry the source EXIF segment through JPEG re-encoding.
    pub preserve_exif: bool,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CompressorConfig {
    fn from(config: &Config) -> Self {
        Self {
            target_bytes: config.target_payload_bytes,
            max_attempts: config.compression_max_attempts,
            quality_floor: config.quality_floor,
            quality_step: config.quality_step,
            dimension_shrink_factor: config.dimension_shrink_factor,
            preserve_exif: config.preserve_exif,
        }
    }
}

/// Quality fraction and longest-edge cap for the current attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionPlan {
    /// Normalized quality in [quality_floor, 1.0].
    pub quality: f64,
    /// Longest allowed edge in pixels; shorter edge scales proportionally.
    pub max_dimension: u32,
}

impl CompressionPlan {
    /// Starting point for the retry loop.
    ///
    /// Larger sources and mobile devices start lower: they are the uploads
    /// most likely to need many retries, and an aggressive start keeps the
    /// attempt count down. Mobile caps are always <= the desktop caps.
    pub fn initial(
        source_bytes: usize,
        target_bytes: usize,
        is_mobile: bool,
        quality_floor: f64,
    ) -> Self {
        let ratio = source_bytes as f64 / target_bytes.max(1) as f64;

        let base_quality: f64 = if ratio >= 8.0 {
            0.5
        } else if ratio >= 4.0 {
            0.6
        } else if ratio >= 2.0 {
            0.7
        } else {
            0.8
        };
        let quality = if is_mobile {
            (base_quality - 0.1).max(quality_floor)
        } else {
            base_quality
        };

        let max_dimension = match (is_mobile, ratio >= 4.0) {
            (true, true) => MOBILE_DIMENSION_CAP_AGGRESSIVE,
            (true, false) => MOBILE_DIMENSION_CAP,
            (false, true) => DESKTOP_DIMENSION_CAP_AGGRESSIVE,
            (false, false) => DESKTOP_DIMENSION_CAP,
        };

        Self {
            quality,
            max_dimension,
        }
    }
}

/// Outcome of one compressor invocation. Immutable once returned.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub bytes: Bytes,
    pub size_bytes: usize,
    pub mime_type: String,
    /// Whether the output actually fits under the target ceiling.
    pub met_target: bool,
}

impl CompressionResult {
    /// Original bytes, untouched. Used for the probe-failure and GiveUp
    /// paths and for inputs that already satisfy the size contract.
    pub fn passthrough(data: &[u8], mime_type: &str, target_bytes: usize) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
            size_bytes: data.len(),
            mime_type: mime_type.to_string(),
            met_target: data.len() <= target_bytes,
        }
    }
}

/// Shared slot holding the newest successful attempt, so a caller enforcing
/// a wall-clock budget can salvage partial progress.
pub type BestAttempt = Arc<Mutex<Option<CompressionResult>>>;

/// Main compression service. Stateless across invocations; safe to share.
#[derive(Debug, Clone)]
pub struct AdaptiveCompressor {
    config: CompressorConfig,
}

impl AdaptiveCompressor {
    pub fn new(config: CompressorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn compress(
        &self,
        data: &[u8],
        declared_mime: &str,
        device: DeviceContext,
    ) -> CompressionResult {
        self.compress_tracked(data, declared_mime, device, None)
    }

    /// Compress `data` under the configured ceiling, publishing each
    /// successful attempt into `best` when provided.
    pub fn compress_tracked(
        &self,
        data: &[u8],
        declared_mime: &str,
        device: DeviceContext,
        best: Option<&BestAttempt>,
    ) -> CompressionResult {
        let target = self.config.target_bytes;

        // Init: probe intrinsic dimensions. Unreadable input is passed
        // through untouched; compression never runs on bytes it cannot decode.
        let img = match decode_image(data) {
            Ok(img) => img,
            Err(err) => {
                tracing::warn!(error = %err, "image probe failed, passing original bytes through");
                return CompressionResult::passthrough(data, declared_mime, target);
            }
        };
        let (width, height) = img.dimensions();

        let format = OutputFormat::from_declared_mime(declared_mime, data.len(), target);
        let exif = if self.config.preserve_exif {
            extract_exif_segment(data)
        } else {
            None
        };

        // Probing: starting quality and dimension cap from source size and
        // device class.
        let mut plan = CompressionPlan::initial(
            data.len(),
            target,
            device.is_mobile,
            self.config.quality_floor,
        );
        tracing::debug!(
            width,
            height,
            source_bytes = data.len(),
            quality = plan.quality,
            max_dimension = plan.max_dimension,
            format = ?format,
            "starting adaptive compression"
        );

        let mut last_success: Option<CompressionResult> = None;
        for attempt in 1..=self.config.max_attempts {
            // Encoding
            match encode_attempt(&img, format, &plan, exif.as_ref()) {
                Ok(bytes) => {
                    let size_bytes = bytes.len();
                    let result = CompressionResult {
                        bytes,
                        size_bytes,
                        mime_type: format.to_mime_type().to_string(),
                        met_target: size_bytes <= target,
                    };
                    if let Some(slot) = best {
                        if let Ok(mut slot) = slot.lock() {
                            *slot = Some(result.clone());
                        }
                    }
                    tracing::debug!(
                        attempt,
                        size_bytes,
                        quality = plan.quality,
                        max_dimension = plan.max_dimension,
                        "compression attempt finished"
                    );
                    // Evaluate
                    let met = result.met_target;
                    last_success = Some(result);
                    if met {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "encode attempt failed, retrying with adjusted parameters"
                    );
                }
            }

            // Shrink&Retry: quality first; resolution is traded for byte
            // budget only once quality is already at its floor.
            if attempt < self.config.max_attempts {
                if plan.quality > self.config.quality_floor + f64::EPSILON {
                    plan.quality =
                        (plan.quality - self.config.quality_step).max(self.config.quality_floor);
                } else {
                    plan.max_dimension =
                        shrink_dimension(plan.max_dimension, self.config.dimension_shrink_factor);
                }
            }
        }

        // Accept the last attempt, or GiveUp: if every encode threw, the
        // original bytes go back out.
        last_success.unwrap_or_else(|| {
            tracing::warn!("all encode attempts failed, returning original bytes");
            CompressionResult::passthrough(data, declared_mime, target)
        })
    }
}

fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Raw EXIF segment from the source container, for carry-over into
/// re-encoded output. The source format is whatever the container parses
/// as, independent of the output format.
fn extract_exif_segment(data: &[u8]) -> Option<Bytes> {
    let bytes = Bytes::copy_from_slice(data);
    if let Ok(jpeg) = img_parts::jpeg::Jpeg::from_bytes(bytes.clone()) {
        return jpeg.exif();
    }
    if let Ok(png) = img_parts::png::Png::from_bytes(bytes.clone()) {
        return png.exif();
    }
    img_parts::webp::WebP::from_bytes(bytes).ok()?.exif()
}

/// Map the normalized quality fraction to an encoder percentage.
fn quality_percent(quality: f64) -> u8 {
    ((quality * 100.0).round() as i64).clamp(1, 100) as u8
}

fn shrink_dimension(cap: u32, factor: f64) -> u32 {
    (((cap as f64) * factor).round() as u32).max(MIN_DIMENSION_CAP)
}

/// Clamp the longest edge to the cap, preserving aspect ratio. Only ever
/// downscales; `None` means the image already fits.
fn downscale_to_cap(img: &DynamicImage, cap: u32) -> Option<DynamicImage> {
    let (width, height) = img.dimensions();
    let long_edge = width.max(height);
    if long_edge <= cap {
        return None;
    }
    let scale = cap as f64 / long_edge as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    let filter = select_filter(width, height, new_width, new_height);
    Some(img.resize_exact(new_width, new_height, filter))
}

/// Select filter type by downscale ratio: cheaper filters for heavy
/// reductions, Lanczos near 1:1.
fn select_filter(
    orig_width: u32,
    orig_height: u32,
    new_width: u32,
    new_height: u32,
) -> image::imageops::FilterType {
    let width_ratio = orig_width as f32 / new_width as f32;
    let height_ratio = orig_height as f32 / new_height as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        image::imageops::FilterType::Triangle
    } else if max_ratio > 1.5 {
        image::imageops::FilterType::CatmullRom
    } else {
        image::imageops::FilterType::Lanczos3
    }
}

fn encode_attempt(
    img: &DynamicImage,
    format: OutputFormat,
    plan: &CompressionPlan,
    exif: Option<&Bytes>,
) -> Result<Bytes> {
    let resized = downscale_to_cap(img, plan.max_dimension);
    let frame = resized.as_ref().unwrap_or(img);
    let encoded = match format {
        OutputFormat::Jpeg => encode_jpeg(frame, quality_percent(plan.quality)),
        OutputFormat::Png => encode_png(frame),
        OutputFormat::WebP => encode_webp(frame, quality_percent(plan.quality)),
    }?;
    match exif {
        Some(exif) => attach_exif(encoded, format, exif.clone()),
        None => Ok(encoded),
    }
}

/// Encode to JPEG using mozjpeg.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes> {
    let rgb_img = img.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp.start_compress(Vec::new())?;
    comp.write_scanlines(&rgb_img)?;
    let jpeg_data = comp.finish()?;

    Ok(Bytes::from(jpeg_data))
}

/// Re-attach an EXIF segment to freshly encoded output, in whichever
/// container the output format uses.
fn attach_exif(encoded: Bytes, format: OutputFormat, exif: Bytes) -> Result<Bytes> {
    match format {
        OutputFormat::Jpeg => {
            let mut jpeg = img_parts::jpeg::Jpeg::from_bytes(encoded)?;
            jpeg.set_exif(Some(exif));
            Ok(Bytes::from(jpeg.encoder().bytes().to_vec()))
        }
        OutputFormat::Png => {
            let mut png = img_parts::png::Png::from_bytes(encoded)?;
            png.set_exif(Some(exif));
            Ok(Bytes::from(png.encoder().bytes().to_vec()))
        }
        OutputFormat::WebP => {
            let mut webp = img_parts::webp::WebP::from_bytes(encoded)?;
            webp.set_exif(Some(exif));
            Ok(Bytes::from(webp.encoder().bytes().to_vec()))
        }
    }
}

fn encode_png(img: &DynamicImage) -> Result<Bytes> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    img.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(Bytes::from(buffer))
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Bytes> {
    let rgba_img = img.to_rgba8();
    let (width, height) = rgba_img.dimensions();

    let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
    let webp_data = encoder.encode(quality as f32);

    Ok(Bytes::copy_from_slice(&webp_data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([180, 40, 40, 255]));
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        buffer
    }

    fn gradient_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        buffer
    }

    #[test]
    fn test_format_from_declared_mime() {
        assert_eq!(
            OutputFormat::from_declared_mime("image/jpeg", 100, 1000),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormat::from_declared_mime("image/jpg", 100, 1000),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormat::from_declared_mime("image/webp", 100, 1000),
            OutputFormat::WebP
        );
        // PNG stays PNG while it fits, redirects to JPEG once oversized
        assert_eq!(
            OutputFormat::from_declared_mime("image/png", 100, 1000),
            OutputFormat::Png
        );
        assert_eq!(
            OutputFormat::from_declared_mime("image/png", 2000, 1000),
            OutputFormat::Jpeg
        );
        // HEIC is always transcoded
        assert_eq!(
            OutputFormat::from_declared_mime("image/heic", 100, 1000),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormat::from_declared_mime("application/octet-stream", 100, 1000),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn test_quality_percent_mapping() {
        assert_eq!(quality_percent(0.1), 10);
        assert_eq!(quality_percent(0.45), 45);
        assert_eq!(quality_percent(0.846), 85);
        assert_eq!(quality_percent(1.0), 100);
    }

    #[test]
    fn test_shrink_dimension_has_floor() {
        assert_eq!(shrink_dimension(3000, 0.7), 2100);
        assert_eq!(shrink_dimension(330, 0.7), MIN_DIMENSION_CAP);
    }

    #[test]
    fn test_initial_plan_mobile_caps_at_most_desktop() {
        for source in [5_000_000usize, 20_000_000, 45_000_000] {
            let desktop = CompressionPlan::initial(source, 4_500_000, false, 0.1);
            let mobile = CompressionPlan::initial(source, 4_500_000, true, 0.1);
            assert!(mobile.max_dimension <= desktop.max_dimension);
            assert!(mobile.quality <= desktop.quality);
        }
    }

    #[test]
    fn test_initial_plan_quality_drops_with_size() {
        let small = CompressionPlan::initial(5_000_000, 4_500_000, false, 0.1);
        let medium = CompressionPlan::initial(20_000_000, 4_500_000, false, 0.1);
        let huge = CompressionPlan::initial(45_000_000, 4_500_000, false, 0.1);
        assert!(small.quality >= medium.quality);
        assert!(medium.quality >= huge.quality);
        assert!(huge.quality >= 0.1);
        assert!(small.quality <= 1.0);
    }

    #[test]
    fn test_downscale_never_upscales() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(400, 200));
        assert!(downscale_to_cap(&img, 400).is_none());
        assert!(downscale_to_cap(&img, 1000).is_none());
    }

    #[test]
    fn test_downscale_preserves_aspect_ratio() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(400, 200));
        let resized = downscale_to_cap(&img, 100).unwrap();
        assert_eq!(resized.dimensions(), (100, 50));

        let portrait = DynamicImage::ImageRgba8(RgbaImage::new(300, 900));
        let resized = downscale_to_cap(&portrait, 300).unwrap();
        assert_eq!(resized.dimensions(), (100, 300));
    }

    #[test]
    fn test_unreadable_input_passes_through() {
        let garbage = vec![0xAAu8; 4096];
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 1024,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&garbage, "image/heic", DeviceContext::default());
        assert_eq!(result.bytes.as_ref(), garbage.as_slice());
        assert_eq!(result.mime_type, "image/heic");
        assert!(!result.met_target);
    }

    #[test]
    fn test_terminates_within_budget_on_unreachable_target() {
        let source = gradient_png_bytes(512, 512);
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 50, // no real image fits
            max_attempts: 5,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&source, "image/png", DeviceContext::default());
        assert!(!result.bytes.is_empty());
        assert!(!result.met_target);
        // oversized PNG redirects to JPEG
        assert_eq!(result.mime_type, "image/jpeg");
    }

    #[test]
    fn test_meets_generous_target_first_attempt() {
        let source = png_bytes(64, 64);
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 1_000_000,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&source, "image/jpeg", DeviceContext::default());
        assert!(result.met_target);
        assert!(result.size_bytes <= 1_000_000);
        assert_eq!(result.mime_type, "image/jpeg");
    }

    #[test]
    fn test_best_attempt_slot_is_published() {
        let source = gradient_png_bytes(256, 256);
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 1_000_000,
            ..CompressorConfig::default()
        });
        let slot: BestAttempt = Arc::new(Mutex::new(None));
        let result = compressor.compress_tracked(
            &source,
            "image/jpeg",
            DeviceContext::default(),
            Some(&slot),
        );
        let published = slot.lock().unwrap().clone().expect("attempt published");
        assert_eq!(published.size_bytes, result.size_bytes);
    }

    const EXIF_FIXTURE: &[u8] = b"MM\x00\x2a-frame-test";

    fn solid_frame() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([5, 5, 5, 255])))
    }

    fn jpeg_with_exif() -> Vec<u8> {
        let base = encode_jpeg(&solid_frame(), 80).unwrap();
        attach_exif(base, OutputFormat::Jpeg, Bytes::from_static(EXIF_FIXTURE))
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_exif_carried_through_jpeg_reencode() {
        let source = jpeg_with_exif();
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 1_000_000,
            preserve_exif: true,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&source, "image/jpeg", DeviceContext::default());
        assert!(result.met_target);

        let out = img_parts::jpeg::Jpeg::from_bytes(result.bytes.clone()).unwrap();
        assert_eq!(out.exif().as_deref(), Some(EXIF_FIXTURE));
    }

    #[test]
    fn test_exif_carried_through_webp_reencode() {
        let base = encode_webp(&solid_frame(), 80).unwrap();
        let source = attach_exif(base, OutputFormat::WebP, Bytes::from_static(EXIF_FIXTURE))
            .unwrap()
            .to_vec();

        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 1_000_000,
            preserve_exif: true,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&source, "image/webp", DeviceContext::default());
        assert_eq!(result.mime_type, "image/webp");

        let out = img_parts::webp::WebP::from_bytes(result.bytes.clone()).unwrap();
        assert_eq!(out.exif().as_deref(), Some(EXIF_FIXTURE));
    }

    #[test]
    fn test_exif_crosses_container_on_png_to_jpeg_redirect() {
        let base = encode_png(&solid_frame()).unwrap();
        let source = attach_exif(base, OutputFormat::Png, Bytes::from_static(EXIF_FIXTURE))
            .unwrap()
            .to_vec();

        // An oversized PNG redirects to JPEG; its tags must move containers
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 50,
            preserve_exif: true,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&source, "image/png", DeviceContext::default());
        assert_eq!(result.mime_type, "image/jpeg");

        let out = img_parts::jpeg::Jpeg::from_bytes(result.bytes.clone()).unwrap();
        assert_eq!(out.exif().as_deref(), Some(EXIF_FIXTURE));
    }

    #[test]
    fn test_exif_stripped_by_default() {
        let source = jpeg_with_exif();
        let compressor = AdaptiveCompressor::new(CompressorConfig {
            target_bytes: 1_000_000,
            preserve_exif: false,
            ..CompressorConfig::default()
        });
        let result = compressor.compress(&source, "image/jpeg", DeviceContext::default());

        let out = img_parts::jpeg::Jpeg::from_bytes(result.bytes.clone()).unwrap();
        assert!(out.exif().is_none());
    }
}
