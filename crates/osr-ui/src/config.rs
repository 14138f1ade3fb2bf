//! Application Configuration
//!
//! TOML file with four sections: `window`, `browser`, `engine`, `gpu`.
//! Every field is optional; missing ones take the defaults below.

use osr_browser::{BrowserSettings, EngineSettings, DEFAULT_WHEEL_MULTIPLIER};
use osr_render::GpuConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Logical width
    pub width: u32,
    /// Logical height
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "osr-wb".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
        }
    }
}

/// Browser view settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Page loaded at startup
    pub start_url: String,
    /// Initial viewport width in pixels
    pub width: u32,
    /// Initial viewport height in pixels
    pub height: u32,
    /// Offscreen paint rate
    pub frame_rate: u32,
    /// Resize the viewport to the panel
    pub follow_panel_size: bool,
    /// Pixels per wheel notch
    pub wheel_multiplier: f32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            start_url: "https://www.google.com".to_string(),
            width: 800,
            height: 600,
            frame_rate: 60,
            follow_panel_size: true,
            wheel_multiplier: DEFAULT_WHEEL_MULTIPLIER,
        }
    }
}

/// GPU settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSection {
    pub low_power: bool,
    pub max_texture_dimension: u32,
}

impl Default for GpuSection {
    fn default() -> Self {
        let gpu = GpuConfig::default();
        Self {
            low_power: gpu.low_power,
            max_texture_dimension: gpu.max_texture_dimension,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub browser: BrowserConfig,
    pub engine: EngineSettings,
    pub gpu: GpuSection,
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidSize("window"));
        }
        if self.browser.width == 0 || self.browser.height == 0 {
            return Err(ConfigError::InvalidSize("browser"));
        }
        if !(1..=240).contains(&self.browser.frame_rate) {
            return Err(ConfigError::InvalidFrameRate(self.browser.frame_rate));
        }
        if self.browser.start_url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if !(self.browser.wheel_multiplier.is_finite() && self.browser.wheel_multiplier > 0.0) {
            return Err(ConfigError::InvalidWheelMultiplier);
        }
        if self.gpu.max_texture_dimension == 0 {
            return Err(ConfigError::InvalidSize("gpu.max_texture_dimension"));
        }
        let max = self.gpu.max_texture_dimension;
        if self.browser.width > max || self.browser.height > max {
            return Err(ConfigError::ViewportTooLarge {
                width: self.browser.width,
                height: self.browser.height,
                max,
            });
        }
        Ok(())
    }

    /// Per-browser engine settings.
    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            windowless_frame_rate: self.browser.frame_rate,
        }
    }

    /// GPU context settings.
    pub fn gpu_config(&self) -> GpuConfig {
        GpuConfig {
            low_power: self.gpu.low_power,
            max_texture_dimension: self.gpu.max_texture_dimension,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {0} size (must be non-zero)")]
    InvalidSize(&'static str),

    #[error("Browser viewport {width}x{height} exceeds texture limit {max}")]
    ViewportTooLarge { width: u32, height: u32, max: u32 },

    #[error("Invalid frame rate {0} (expected 1-240)")]
    InvalidFrameRate(u32),

    #[error("Start URL is empty")]
    EmptyUrl,

    #[error("Wheel multiplier must be a positive number")]
    InvalidWheelMultiplier,
}
