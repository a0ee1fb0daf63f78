//! Core platform settings

pub mod config;

pub use config::{
    LoggingConfig, PlatformConfig, PresentModePreference, RendererConfig, SurfaceConfig,
};
