//! Configuration module
//!
//! Environment-driven configuration for the upload API and the compression
//! pipeline. The ingress and egress byte ceilings are configuration
//! constants, never derived at the call site.

use std::env;

use anyhow::{bail, Context};

// Defaults
const SERVER_PORT: u16 = 3000;
/// Hard ingress ceiling: reject uploads above this before any processing.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
/// Hard egress ceiling the compressor targets (platform response limit).
const TARGET_PAYLOAD_BYTES: usize = 4_500_000;
const COMPRESSION_MAX_ATTEMPTS: u32 = 5;
const QUALITY_FLOOR: f64 = 0.1;
const QUALITY_STEP: f64 = 0.1;
const DIMENSION_SHRINK_FACTOR: f64 = 0.7;
const OPERATION_TIMEOUT_SECS: u64 = 10;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    /// Maximum accepted upload size in bytes (413 above this).
    pub max_upload_bytes: usize,
    /// Byte ceiling the adaptive compressor targets.
    pub target_payload_bytes: usize,
    /// Attempt budget for the compression retry loop.
    pub compression_max_attempts: u32,
    pub quality_floor: f64,
    pub quality_step: f64,
    pub dimension_shrink_factor: f64,
    /// Carry embedded EXIF through re-encoding when true; strip it when false.
    pub preserve_exif: bool,
    /// Wall-clock budget for one whole upload operation.
    pub operation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            target_payload_bytes: TARGET_PAYLOAD_BYTES,
            compression_max_attempts: COMPRESSION_MAX_ATTEMPTS,
            quality_floor: QUALITY_FLOOR,
            quality_step: QUALITY_STEP,
            dimension_shrink_factor: DIMENSION_SHRINK_FACTOR,
            preserve_exif: false,
            operation_timeout_secs: OPERATION_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let defaults = Config::default();

        let config = Config {
            server_port: parse_env("SERVER_PORT", defaults.server_port)?,
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            target_payload_bytes: parse_env("TARGET_PAYLOAD_BYTES", defaults.target_payload_bytes)?,
            compression_max_attempts: parse_env(
                "COMPRESSION_MAX_ATTEMPTS",
                defaults.compression_max_attempts,
            )?,
            quality_floor: parse_env("QUALITY_FLOOR", defaults.quality_floor)?,
            quality_step: parse_env("QUALITY_STEP", defaults.quality_step)?,
            dimension_shrink_factor: parse_env(
                "DIMENSION_SHRINK_FACTOR",
                defaults.dimension_shrink_factor,
            )?,
            preserve_exif: parse_env("PRESERVE_EXIF", false)?,
            operation_timeout_secs: parse_env(
                "OPERATION_TIMEOUT_SECS",
                defaults.operation_timeout_secs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Fail fast on misconfiguration.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.target_payload_bytes == 0 {
            bail!("TARGET_PAYLOAD_BYTES must be greater than zero");
        }
        if self.max_upload_bytes < self.target_payload_bytes {
            bail!("MAX_UPLOAD_BYTES must not be below TARGET_PAYLOAD_BYTES");
        }
        if self.compression_max_attempts == 0 {
            bail!("COMPRESSION_MAX_ATTEMPTS must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.quality_floor) || self.quality_floor == 0.0 {
            bail!("QUALITY_FLOOR must be in (0.0, 1.0]");
        }
        if self.quality_step <= 0.0 || self.quality_step >= 1.0 {
            bail!("QUALITY_STEP must be in (0.0, 1.0)");
        }
        if self.dimension_shrink_factor <= 0.0 || self.dimension_shrink_factor >= 1.0 {
            bail!("DIMENSION_SHRINK_FACTOR must be in (0.0, 1.0)");
        }
        if self.operation_timeout_secs == 0 {
            bail!("OPERATION_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}", key)),
        Err(_) => Ok(default),
    }
}
