//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::capture::{CaptureConfig, FacingMode, ResolutionHint};
use crate::prompt::DEFAULT_QUICK_VALUES;
use crate::scan::{
    EanPolicy, ScanSettings, DEFAULT_SETTLE_DELAY, SLOW_CAMERA_LOOP_DELAY, STANDARD_LOOP_DELAY,
};
use crate::vision::{SamplerConfig, ScreenRect, StaticLayout, Transform};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera settings
    pub capture: CaptureSettings,
    /// Sampling and decoding settings
    pub scan: ScanTuning,
    /// Guide box placement
    pub layout: LayoutSettings,
    /// Quantity prompt settings
    pub prompt: PromptSettings,
    /// File locations
    pub storage: StorageSettings,
}

/// Camera pipeline tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineProfile {
    /// Full HD, short inter-cycle delay
    #[default]
    Standard,
    /// HD, longer inter-cycle delay for cameras that deliver frames slowly
    SlowCamera,
}

impl PipelineProfile {
    pub fn loop_delay(&self) -> Duration {
        match self {
            Self::Standard => STANDARD_LOOP_DELAY,
            Self::SlowCamera => SLOW_CAMERA_LOOP_DELAY,
        }
    }

    pub fn resolution(&self) -> ResolutionHint {
        match self {
            Self::Standard => ResolutionHint::FULL_HD,
            Self::SlowCamera => ResolutionHint::HD,
        }
    }
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Preferred camera
    pub facing: FacingMode,
    /// Pipeline profile
    pub profile: PipelineProfile,
    /// Overrides the profile's resolution hint
    pub resolution: Option<ResolutionHint>,
    /// Bounded wait for the first frame after acquisition
    pub first_frame_timeout_ms: u64,
    /// Directory of images played back as the frame feed
    pub frames_dir: Option<PathBuf>,
    /// Interval between replayed frames
    pub replay_frame_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            profile: PipelineProfile::Standard,
            resolution: None,
            first_frame_timeout_ms: 3000,
            frames_dir: None,
            replay_frame_interval_ms: 33,
        }
    }
}

/// Sampling and decoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTuning {
    /// Upscale factors, tried in order
    pub roi_scales: Vec<f32>,
    /// Preprocessing transforms, tried in order for each factor
    pub transforms: Vec<Transform>,
    /// Contrast factor of the enhance transform
    pub enhance_contrast: f32,
    /// Overrides the profile's inter-cycle delay
    pub loop_delay_ms: Option<u64>,
    /// Pause after a prompt resolves
    pub settle_delay_ms: u64,
    /// Handling of EAN-13 results that are not 13 digits
    pub ean_policy: EanPolicy,
}

impl Default for ScanTuning {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            roi_scales: sampler.scales,
            transforms: sampler.transforms,
            enhance_contrast: sampler.enhance_contrast,
            loop_delay_ms: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            ean_policy: EanPolicy::Strict,
        }
    }
}

/// Displayed video and guide rectangles
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub video: ScreenRect,
    pub guide: ScreenRect,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            video: ScreenRect::new(0.0, 0.0, 1280.0, 720.0),
            guide: ScreenRect::new(128.0, 252.0, 1024.0, 216.0),
        }
    }
}

impl LayoutSettings {
    pub fn to_layout(&self) -> StaticLayout {
        StaticLayout {
            video: self.video,
            guide: self.guide,
        }
    }
}

/// Quantity prompt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Quick-confirm values offered by the prompt
    pub quick_quantities: Vec<u32>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            quick_quantities: DEFAULT_QUICK_VALUES.to_vec(),
        }
    }
}

impl PromptSettings {
    /// Positive quick values; zeros are dropped
    pub fn quick_values(&self) -> Vec<NonZeroU32> {
        let values: Vec<NonZeroU32> = self
            .quick_quantities
            .iter()
            .filter_map(|&v| NonZeroU32::new(v))
            .collect();
        if values.len() != self.quick_quantities.len() {
            warn!("Ignoring zero quick quantities in config");
        }
        values
    }
}

/// File locations; unset paths use the platform data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite tally database
    pub database: Option<PathBuf>,
    /// Directory CSV exports are written to
    pub export_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Settings for one scan session
    pub fn scan_settings(&self) -> ScanSettings {
        let capture = &self.capture;
        let profile = capture.profile;
        ScanSettings {
            capture: CaptureConfig {
                facing: capture.facing,
                resolution: capture.resolution.unwrap_or_else(|| profile.resolution()),
                first_frame_timeout: Duration::from_millis(capture.first_frame_timeout_ms),
            },
            sampler: SamplerConfig {
                scales: self.scan.roi_scales.clone(),
                transforms: self.scan.transforms.clone(),
                enhance_contrast: self.scan.enhance_contrast,
            },
            loop_delay: self
                .scan
                .loop_delay_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| profile.loop_delay()),
            settle_delay: Duration::from_millis(self.scan.settle_delay_ms),
            ean_policy: self.scan.ean_policy,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!("No config at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }
    load_config(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Check capture defaults
        assert_eq!(config.capture.facing, FacingMode::Environment);
        assert_eq!(config.capture.profile, PipelineProfile::Standard);
        assert_eq!(config.capture.first_frame_timeout_ms, 3000);
        assert!(config.capture.frames_dir.is_none());

        // Check scan defaults
        assert_eq!(config.scan.roi_scales, vec![1.5, 2.0]);
        assert_eq!(config.scan.transforms, Transform::DEFAULT_ORDER.to_vec());
        assert!((config.scan.enhance_contrast - 1.35).abs() < 0.001);
        assert_eq!(config.scan.settle_delay_ms, 300);
        assert_eq!(config.scan.ean_policy, EanPolicy::Strict);

        // Check prompt defaults
        assert_eq!(config.prompt.quick_quantities, vec![1, 3, 5]);
    }

    #[test]
    fn test_profiles_drive_scan_settings() {
        let mut config = AppConfig::default();
        let settings = config.scan_settings();
        assert_eq!(settings.loop_delay, Duration::from_millis(140));
        assert_eq!(settings.capture.resolution, ResolutionHint::FULL_HD);
        assert_eq!(settings.capture.first_frame_timeout, Duration::from_secs(3));

        config.capture.profile = PipelineProfile::SlowCamera;
        let settings = config.scan_settings();
        assert_eq!(settings.loop_delay, Duration::from_millis(220));
        assert_eq!(settings.capture.resolution, ResolutionHint::HD);

        config.scan.loop_delay_ms = Some(50);
        assert_eq!(config.scan_settings().loop_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_default_guide_is_centred() {
        let layout = LayoutSettings::default();
        let video = layout.video;
        let guide = layout.guide;
        assert_eq!(guide.left * 2.0 + guide.width, video.width);
        assert_eq!(guide.top * 2.0 + guide.height, video.height);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.capture.profile = PipelineProfile::SlowCamera;
        config.capture.frames_dir = Some(PathBuf::from("/tmp/frames"));
        config.scan.ean_policy = EanPolicy::Lenient;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("slow-camera"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.capture.profile, PipelineProfile::SlowCamera);
        assert_eq!(parsed.capture.frames_dir, config.capture.frames_dir);
        assert_eq!(parsed.scan.ean_policy, EanPolicy::Lenient);
        assert_eq!(parsed.scan.roi_scales, config.scan.roi_scales);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [scan]
            ean_policy = "lenient"
            transforms = ["raw", "invert"]

            [prompt]
            quick_quantities = [2, 0, 12]
            "#,
        )
        .unwrap();

        assert_eq!(parsed.scan.ean_policy, EanPolicy::Lenient);
        assert_eq!(parsed.scan.transforms, vec![Transform::Raw, Transform::Invert]);
        assert_eq!(parsed.scan.settle_delay_ms, 300);
        assert_eq!(parsed.capture.profile, PipelineProfile::Standard);

        let quick: Vec<u32> = parsed.prompt.quick_values().iter().map(|v| v.get()).collect();
        assert_eq!(quick, vec![2, 12]);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();

        // Create a temporary file
        let temp_file = NamedTempFile::new().unwrap();

        // Save config
        save_config(&config, temp_file.path()).unwrap();

        // Load config
        let loaded = load_config(temp_file.path()).unwrap();

        // Verify
        assert_eq!(config.capture.first_frame_timeout_ms, loaded.capture.first_frame_timeout_ms);
        assert_eq!(config.prompt.quick_quantities, loaded.prompt.quick_quantities);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());

        let config = load_or_default(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.scan.settle_delay_ms, 300);
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        assert!(load_config(temp_file.path()).is_err());
        assert!(load_or_default(temp_file.path()).is_err());
    }
}
