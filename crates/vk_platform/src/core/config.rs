//! # Platform Configuration
//!
//! Settings for every layer of the platform: the logger, the Vulkan renderer
//! and the default render surface. All structs are serde-enabled and load
//! through [`Config`] from TOML or RON.
//!
//! ```rust,no_run
//! use vk_platform::config::Config;
//! use vk_platform::core::PlatformConfig;
//!
//! let config = PlatformConfig::load_or_default("platform.toml").unwrap();
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Logger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set (`env_logger` syntax)
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
        }
    }
}

/// Preferred swapchain present mode. FIFO is used when the preference is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PresentModePreference {
    /// Triple-buffered, no tearing
    #[default]
    Mailbox,
    /// Vsync
    Fifo,
    /// No vsync, may tear
    Immediate,
}

/// # Vulkan Renderer Configuration
///
/// Instance metadata, validation and frame-cycle tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Whether to enable Vulkan validation layers (`None` follows the build type)
    pub enable_validation: Option<bool>,
    /// Present mode to use when the surface supports it
    pub preferred_present_mode: PresentModePreference,
    /// Upper bound for frame fence waits; `None` waits forever
    pub fence_timeout_ns: Option<u64>,
    /// Clear colour for colour attachments
    pub clear_color: [f32; 4],
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            enable_validation: None,
            preferred_present_mode: PresentModePreference::default(),
            fence_timeout_ns: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the preferred present mode
    #[must_use]
    pub const fn with_present_mode(mut self, mode: PresentModePreference) -> Self {
        self.preferred_present_mode = mode;
        self
    }

    /// Bound fence waits; a wait that times out reports a lost device
    #[must_use]
    pub const fn with_fence_timeout(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = Some(timeout_ns);
        self
    }

    /// Set the clear colour
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Validation layers requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Timeout passed to fence waits
    pub fn fence_timeout(&self) -> u64 {
        self.fence_timeout_ns.unwrap_or(u64::MAX)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.fence_timeout_ns == Some(0) {
            return Err("Fence timeout must be greater than zero".to_string());
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err("Clear colour components must be finite".to_string());
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("vk_platform")
    }
}

/// Creation hints for a render surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Initial framebuffer width
    pub width: u32,
    /// Initial framebuffer height
    pub height: u32,
    /// Window title
    pub title: String,
    /// Start on the primary monitor in fullscreen
    pub fullscreen: bool,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Create a separate device when the shared one cannot present to this surface
    pub fallback_on_incompatible_parent: bool,
}

impl SurfaceConfig {
    /// Hints for a windowed surface
    pub fn new(width: u32, height: u32, title: impl Into<String>) -> Self {
        Self {
            width,
            height,
            title: title.into(),
            ..Self::default()
        }
    }

    /// Start fullscreen
    #[must_use]
    pub const fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    /// Allow or forbid user resizing
    #[must_use]
    pub const fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "Surface size must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        Ok(())
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "vk_platform".to_string(),
            fullscreen: false,
            resizable: true,
            fallback_on_incompatible_parent: false,
        }
    }
}

/// Complete platform configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Logger settings
    pub logging: LoggingConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Default surface hints
    pub surface: SurfaceConfig,
}

impl PlatformConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate().map_err(ConfigError::Invalid)?;
        self.surface.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Config for PlatformConfig {}
