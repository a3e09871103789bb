//! Viewer configuration loaded from JSON.
//!
//! Every field has a default, so a partial file (or `{}`) is valid.

use std::fs;
use std::path::{Path, PathBuf};

use engine::{
    DEFAULT_LOOKAHEAD_TILES, DEFAULT_PIXELS_PER_MILLI, MAX_LOOKAHEAD_TILES, PrefetchConfig,
};
use renderer::{RenderOptions, RenderQuality};
use serde::{Deserialize, Serialize};
use view::{DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH, PixelSize, TileGeometry, ViewError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
    #[error("invalid view settings")]
    View(#[from] ViewError),
    #[error("scroll speed must be finite and non-negative, got {0}")]
    InvalidSpeed(f32),
    #[error("lookahead must be between 1 and {max} tiles, got {0}", max = MAX_LOOKAHEAD_TILES)]
    InvalidLookahead(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualitySetting {
    Lowest,
    #[default]
    Normal,
    High,
}

impl From<QualitySetting> for RenderQuality {
    fn from(value: QualitySetting) -> Self {
        match value {
            QualitySetting::Lowest => RenderQuality::Lowest,
            QualitySetting::Normal => RenderQuality::Normal,
            QualitySetting::High => RenderQuality::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchSettings {
    pub pixels_per_milli: f32,
    pub lookahead_tiles: u32,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            pixels_per_milli: DEFAULT_PIXELS_PER_MILLI,
            lookahead_tiles: DEFAULT_LOOKAHEAD_TILES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub terrain_animation: bool,
    pub quality: QualitySetting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub zoom: f32,
    pub prefetch: PrefetchSettings,
    pub render: RenderSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1024,
            viewport_height: 640,
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
            zoom: 1.0,
            prefetch: PrefetchSettings::default(),
            render: RenderSettings::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tile_geometry()?.scaled(self.zoom)?;
        let speed = self.prefetch.pixels_per_milli;
        if !speed.is_finite() || speed < 0.0 {
            return Err(ConfigError::InvalidSpeed(speed));
        }
        let lookahead = self.prefetch.lookahead_tiles;
        if !(1..=MAX_LOOKAHEAD_TILES).contains(&lookahead) {
            return Err(ConfigError::InvalidLookahead(lookahead));
        }
        Ok(())
    }

    /// Unzoomed tile geometry.
    pub fn tile_geometry(&self) -> Result<TileGeometry, ViewError> {
        TileGeometry::new(self.tile_width, self.tile_height)
    }

    pub fn viewport_size(&self) -> PixelSize {
        PixelSize::new(self.viewport_width, self.viewport_height)
    }

    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            pixels_per_milli: self.prefetch.pixels_per_milli,
            lookahead_tiles: self.prefetch.lookahead_tiles,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            terrain_animation: self.render.terrain_animation,
            quality: self.render.quality.into(),
        }
    }
}
