//! Conversion settings and configuration files
//!
//! Settings are built once per conversion job: user overrides are merged
//! over the config file, which is merged over the defaults. The result is
//! validated and never mutated afterwards.
//!
//! # Config file
//!
//! ```toml
//! [conversion]
//! target_width = 480
//! target_height = 800
//! contrast = 4
//! dithering = true
//! overlap_percent = 10.0
//! strip_mode = false
//!
//! [book]
//! contrast_factor = 1.2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::transform::primitives::MAX_CONTRAST_LEVEL;

// ============================================================
// Constants
// ============================================================

/// Default device width in pixels
pub const DEFAULT_WIDTH: u32 = 480;

/// Default device height in pixels
pub const DEFAULT_HEIGHT: u32 = 800;

/// Default contrast level
pub const DEFAULT_CONTRAST: u8 = 4;

/// Default long-strip window overlap in percent
pub const DEFAULT_OVERLAP_PERCENT: f32 = 10.0;

/// Highest accepted long-strip overlap in percent
pub const MAX_OVERLAP_PERCENT: f32 = 50.0;

/// Default binarization threshold; pixels at or above pack as white
pub const DEFAULT_THRESHOLD: u8 = 200;

/// Largest page side the XTG header can describe
pub const MAX_DIMENSION: u32 = u16::MAX as u32;

/// Default contrast factor for rendered book pages
pub const DEFAULT_BOOK_CONTRAST: f32 = 1.2;

/// Local config file name
pub const LOCAL_CONFIG_FILE: &str = "xtc-convert.toml";

// ============================================================
// Error Types
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid target size: {width}x{height} (each side must be 1..={max})", max = MAX_DIMENSION)]
    InvalidSize { width: u32, height: u32 },

    #[error("Invalid overlap: {0}% (must be 0..={max})", max = MAX_OVERLAP_PERCENT)]
    InvalidOverlap(f32),

    #[error("Invalid thread count: {0}")]
    InvalidThreads(usize),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Settings
// ============================================================

/// Immutable settings for one conversion job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Output page width in pixels
    pub target_width: u32,
    /// Output page height in pixels
    pub target_height: u32,
    /// Contrast level (0 disables, max 8)
    pub contrast: u8,
    /// Floyd-Steinberg dithering before packing
    pub dithering: bool,
    /// Long-strip window overlap in percent
    pub overlap_percent: f32,
    /// Reflow chapters as one continuous strip
    pub strip_mode: bool,
    /// Binarization threshold for XTG packing
    pub threshold: u8,
    /// Worker threads (None = all cores)
    pub threads: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_WIDTH,
            target_height: DEFAULT_HEIGHT,
            contrast: DEFAULT_CONTRAST,
            dithering: true,
            overlap_percent: DEFAULT_OVERLAP_PERCENT,
            strip_mode: false,
            threshold: DEFAULT_THRESHOLD,
            threads: None,
        }
    }
}

impl Settings {
    /// Create a new settings builder
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Merge overrides over the defaults and validate
    pub fn from_overrides(overrides: &SettingsOverrides) -> Result<Self> {
        overrides.apply(Self::default()).validate()
    }

    /// Check invariants, returning the settings unchanged when valid
    pub fn validate(self) -> Result<Self> {
        let size_ok = |v: u32| (1..=MAX_DIMENSION).contains(&v);
        if !size_ok(self.target_width) || !size_ok(self.target_height) {
            return Err(ConfigError::InvalidSize {
                width: self.target_width,
                height: self.target_height,
            });
        }
        if !(0.0..=MAX_OVERLAP_PERCENT).contains(&self.overlap_percent) {
            return Err(ConfigError::InvalidOverlap(self.overlap_percent));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidThreads(0));
        }
        Ok(Self {
            contrast: self.contrast.min(MAX_CONTRAST_LEVEL),
            ..self
        })
    }

    /// Overlap as a fraction of the page height
    pub fn overlap_fraction(&self) -> f32 {
        self.overlap_percent / 100.0
    }

    /// Target size as XTG header fields
    pub fn page_size(&self) -> (u16, u16) {
        (
            self.target_width.min(MAX_DIMENSION) as u16,
            self.target_height.min(MAX_DIMENSION) as u16,
        )
    }

    /// Serialize to JSON (for summaries)
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Builder for Settings
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Set output page size
    #[must_use]
    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.settings.target_width = width;
        self.settings.target_height = height;
        self
    }

    /// Set contrast level (clamped to 0-8)
    #[must_use]
    pub fn contrast(mut self, level: u8) -> Self {
        self.settings.contrast = level.min(MAX_CONTRAST_LEVEL);
        self
    }

    /// Enable or disable dithering
    #[must_use]
    pub fn dithering(mut self, enabled: bool) -> Self {
        self.settings.dithering = enabled;
        self
    }

    /// Set long-strip overlap percent
    #[must_use]
    pub fn overlap_percent(mut self, percent: f32) -> Self {
        self.settings.overlap_percent = percent;
        self
    }

    /// Enable long-strip mode
    #[must_use]
    pub fn strip_mode(mut self, enabled: bool) -> Self {
        self.settings.strip_mode = enabled;
        self
    }

    /// Set binarization threshold
    #[must_use]
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.settings.threshold = threshold;
        self
    }

    /// Set worker thread count
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.settings.threads = Some(threads);
        self
    }

    /// Validate and build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()
    }
}

/// Partial settings from the command line or a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub contrast: Option<i64>,
    pub dithering: Option<bool>,
    pub overlap_percent: Option<f32>,
    pub strip_mode: Option<bool>,
    pub threshold: Option<u8>,
    pub threads: Option<usize>,
}

impl SettingsOverrides {
    /// Create empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every present value onto `base`; contrast is clamped to 0-8
    pub fn apply(&self, base: Settings) -> Settings {
        Settings {
            target_width: self.target_width.unwrap_or(base.target_width),
            target_height: self.target_height.unwrap_or(base.target_height),
            contrast: self
                .contrast
                .map(|c| c.clamp(0, MAX_CONTRAST_LEVEL as i64) as u8)
                .unwrap_or(base.contrast),
            dithering: self.dithering.unwrap_or(base.dithering),
            overlap_percent: self.overlap_percent.unwrap_or(base.overlap_percent),
            strip_mode: self.strip_mode.unwrap_or(base.strip_mode),
            threshold: self.threshold.unwrap_or(base.threshold),
            threads: self.threads.or(base.threads),
        }
    }

    /// Layer `other` on top of `self` (values in `other` win)
    #[must_use]
    pub fn merged_with(&self, other: &SettingsOverrides) -> SettingsOverrides {
        SettingsOverrides {
            target_width: other.target_width.or(self.target_width),
            target_height: other.target_height.or(self.target_height),
            contrast: other.contrast.or(self.contrast),
            dithering: other.dithering.or(self.dithering),
            overlap_percent: other.overlap_percent.or(self.overlap_percent),
            strip_mode: other.strip_mode.or(self.strip_mode),
            threshold: other.threshold.or(self.threshold),
            threads: other.threads.or(self.threads),
        }
    }
}

// ============================================================
// Book Settings
// ============================================================

/// Settings for rendered book pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookSettings {
    /// Output page width in pixels
    pub target_width: u32,
    /// Output page height in pixels
    pub target_height: u32,
    /// Contrast factor around the mean (1.0 = unchanged)
    pub contrast_factor: f32,
    /// Floyd-Steinberg dithering
    pub dithering: bool,
    /// Binarization threshold for XTG packing
    pub threshold: u8,
}

impl Default for BookSettings {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_WIDTH,
            target_height: DEFAULT_HEIGHT,
            contrast_factor: DEFAULT_BOOK_CONTRAST,
            dithering: true,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl BookSettings {
    /// Check the page size
    pub fn validate(self) -> Result<Self> {
        let size_ok = |v: u32| (1..=MAX_DIMENSION).contains(&v);
        if !size_ok(self.target_width) || !size_ok(self.target_height) {
            return Err(ConfigError::InvalidSize {
                width: self.target_width,
                height: self.target_height,
            });
        }
        Ok(self)
    }
}

// ============================================================
// Config File
// ============================================================

/// Contents of a TOML config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Comic conversion defaults
    pub conversion: SettingsOverrides,
    /// Book rendering defaults
    pub book: BookSettings,
}

impl Config {
    /// Load from the first config file found, or defaults
    ///
    /// Search order: `./xtc-convert.toml`, then
    /// `<config dir>/xtc-convert/config.toml`.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                tracing::debug!("Loading config from {}", path.display());
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Candidate config file locations
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("xtc-convert").join("config.toml"));
        }
        paths
    }

    /// Merge with command-line overrides (command line takes precedence)
    pub fn merge_with_cli(&self, cli: &SettingsOverrides) -> Result<Settings> {
        Settings::from_overrides(&self.conversion.merged_with(cli))
    }
}
