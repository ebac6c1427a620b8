use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::common::error::{FaceAuthError, Result};
use crate::core::timing::{SessionSettings, SessionTiming};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CameraConfig {
    #[serde(default = "default_warmup")]
    pub warmup_ms: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

fn default_warmup() -> u64 { 1000 }
fn default_acquire_timeout() -> u64 { 10_000 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            warmup_ms: default_warmup(),
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,
}

fn default_load_timeout() -> u64 { 30_000 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthConfig {
    #[serde(default = "default_threshold")]
    pub distance_threshold: f32,
    #[serde(default = "default_confidence_scale")]
    pub confidence_scale: f32,
    #[serde(default = "default_scan_delay")]
    pub scan_delay_ms: u64,
    #[serde(default = "default_mismatch_recovery")]
    pub mismatch_recovery_ms: u64,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,
    #[serde(default)]
    pub lockout_after: u32,
    #[serde(default = "default_lockout_seconds")]
    pub lockout_seconds: u64,
}

fn default_threshold() -> f32 { 0.55 }
fn default_confidence_scale() -> f32 { 0.8 }
fn default_scan_delay() -> u64 { 1500 }
fn default_mismatch_recovery() -> u64 { 2000 }
fn default_probe_interval() -> u64 { 500 }
fn default_lockout_seconds() -> u64 { 30 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_threshold(),
            confidence_scale: default_confidence_scale(),
            scan_delay_ms: default_scan_delay(),
            mismatch_recovery_ms: default_mismatch_recovery(),
            probe_interval_ms: default_probe_interval(),
            lockout_after: 0,
            lockout_seconds: default_lockout_seconds(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

fn default_thumbnail_size() -> u32 { 96 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl Config {
    /// Loads `configs/facegate.toml`, or the defaults when it does not exist.
    pub fn load() -> Result<Self> {
        let config_path = Path::new("configs/facegate.toml");
        if !config_path.exists() {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(config_path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAuthError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceAuthError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Threshold and scale are distances in descriptor space
        if !(self.auth.distance_threshold > 0.0 && self.auth.distance_threshold <= 2.0) {
            return Err(FaceAuthError::Config(format!(
                "Distance threshold must be in (0.0, 2.0], got {}",
                self.auth.distance_threshold
            )));
        }
        if !(self.auth.confidence_scale > 0.0 && self.auth.confidence_scale <= 4.0) {
            return Err(FaceAuthError::Config(format!(
                "Confidence scale must be in (0.0, 4.0], got {}",
                self.auth.confidence_scale
            )));
        }

        if self.auth.scan_delay_ms > 10_000 {
            return Err(FaceAuthError::Config(format!(
                "Scan delay must be at most 10000ms, got {}", self.auth.scan_delay_ms
            )));
        }
        if self.auth.mismatch_recovery_ms > 60_000 {
            return Err(FaceAuthError::Config(format!(
                "Mismatch recovery must be at most 60000ms, got {}",
                self.auth.mismatch_recovery_ms
            )));
        }
        if self.auth.probe_interval_ms < 50 || self.auth.probe_interval_ms > 10_000 {
            return Err(FaceAuthError::Config(format!(
                "Probe interval must be between 50 and 10000ms, got {}",
                self.auth.probe_interval_ms
            )));
        }
        if self.auth.lockout_after > 0 && self.auth.lockout_seconds == 0 {
            return Err(FaceAuthError::Config(
                "Lockout duration must be positive when lockout is enabled".into()
            ));
        }

        if self.camera.warmup_ms > 10_000 {
            return Err(FaceAuthError::Config(format!(
                "Camera warmup must be at most 10000ms, got {}", self.camera.warmup_ms
            )));
        }
        if self.camera.acquire_timeout_ms == 0 {
            return Err(FaceAuthError::Config("Camera acquire timeout must be positive".into()));
        }
        if self.models.load_timeout_ms == 0 {
            return Err(FaceAuthError::Config("Model load timeout must be positive".into()));
        }

        if self.storage.thumbnail_size < 16 || self.storage.thumbnail_size > 512 {
            return Err(FaceAuthError::Config(format!(
                "Thumbnail size must be between 16 and 512, got {}",
                self.storage.thumbnail_size
            )));
        }

        Ok(())
    }

    pub fn timing(&self) -> SessionTiming {
        SessionTiming {
            warmup: Duration::from_millis(self.camera.warmup_ms),
            scan_delay: Duration::from_millis(self.auth.scan_delay_ms),
            mismatch_recovery: Duration::from_millis(self.auth.mismatch_recovery_ms),
            probe_interval: Duration::from_millis(self.auth.probe_interval_ms),
            ..SessionTiming::default()
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            distance_threshold: self.auth.distance_threshold,
            confidence_scale: self.auth.confidence_scale,
            acquire_timeout: Duration::from_millis(self.camera.acquire_timeout_ms),
            load_timeout: Duration::from_millis(self.models.load_timeout_ms),
            lockout_after: self.auth.lockout_after,
            lockout: Duration::from_secs(self.auth.lockout_seconds),
            thumbnail_size: self.storage.thumbnail_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.auth.distance_threshold, 0.55);
        assert_eq!(config.auth.confidence_scale, 0.8);
        assert_eq!(config.storage.thumbnail_size, 96);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            "[auth]\ndistance_threshold = 0.5\nlockout_after = 3\n\n[camera]\nwarmup_ms = 0\n",
        )
        .unwrap();
        assert_eq!(config.auth.distance_threshold, 0.5);
        assert_eq!(config.auth.lockout_after, 3);
        assert_eq!(config.auth.scan_delay_ms, 1500);
        assert_eq!(config.camera.warmup_ms, 0);
        assert_eq!(config.camera.acquire_timeout_ms, 10_000);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = Config::from_toml("[auth]\ndistance_threshold = 0.0\n").unwrap_err();
        assert!(matches!(err, FaceAuthError::Config(_)));
        assert!(Config::from_toml("[auth]\ndistance_threshold = 3.5\n").is_err());
    }

    #[test]
    fn rejects_bad_thumbnail_size_and_garbage() {
        assert!(Config::from_toml("[storage]\nthumbnail_size = 4\n").is_err());
        assert!(Config::from_toml("[auth\n").is_err());
    }

    #[test]
    fn timing_follows_config() {
        let mut config = Config::default();
        config.auth.scan_delay_ms = 250;
        config.camera.warmup_ms = 10;
        let timing = config.timing();
        assert_eq!(timing.scan_delay, Duration::from_millis(250));
        assert_eq!(timing.warmup, Duration::from_millis(10));
        assert_eq!(config.session_settings().lockout, Duration::from_secs(30));
    }

    #[test]
    fn missing_file_is_an_error_for_explicit_path() {
        let err = Config::load_from_path(Path::new("/nonexistent/facegate.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
