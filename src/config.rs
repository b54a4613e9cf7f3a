// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::backend::swapchain::{SwapchainSettings, PREFERRED_SRGB_FORMAT, PREFERRED_UNORM_FORMAT};
use crate::present::ClearValues;

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;
pub const DEFAULT_FENCE_TIMEOUT_MS: u64 = 30_000;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vk-present".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// No vsync, lowest latency, may tear
    Immediate,
    /// No vsync, no tearing
    #[default]
    Mailbox,
    /// Vsync, always available
    Fifo,
    FifoRelaxed,
}

impl From<PresentModePreference> for vk::PresentModeKHR {
    fn from(mode: PresentModePreference) -> Self {
        match mode {
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: PresentModePreference,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    /// Upper bound on a single frame-fence wait. Exceeding it means the GPU
    /// is hung, so this is a deadlock detector rather than a frame budget.
    pub fence_timeout_ms: u64,
    /// Prefer an sRGB swapchain format over UNORM
    pub srgb: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        let clear = ClearValues::default();
        Self {
            present_mode: PresentModePreference::default(),
            frames_in_flight: 2,
            clear_color: clear.color,
            clear_depth: clear.depth,
            fence_timeout_ms: DEFAULT_FENCE_TIMEOUT_MS,
            srgb: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn swapchain_settings(&self) -> SwapchainSettings {
        let graphics = &self.graphics;
        let frames_in_flight = graphics.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if frames_in_flight != graphics.frames_in_flight {
            log::warn!(
                "frames_in_flight = {} is out of range, using {}",
                graphics.frames_in_flight,
                frames_in_flight
            );
        }

        SwapchainSettings {
            frames_in_flight,
            present_mode: graphics.present_mode.into(),
            preferred_format: if graphics.srgb {
                PREFERRED_SRGB_FORMAT
            } else {
                PREFERRED_UNORM_FORMAT
            },
            fence_timeout: Duration::from_millis(graphics.fence_timeout_ms),
        }
    }

    pub fn clear_values(&self) -> ClearValues {
        ClearValues {
            color: self.graphics.clear_color,
            depth: self.graphics.clear_depth,
            ..ClearValues::default()
        }
    }
}
