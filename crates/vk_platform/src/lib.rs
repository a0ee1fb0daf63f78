//! # Vulkan Platform
//!
//! Native windowing and rendering for a host runtime. Each render surface is a
//! GLFW window with its own thread driving a Vulkan frame cycle; the host builds
//! GPU resources and queues command buffers from a per-frame update callback.
//!
//! ## Layers
//!
//! - **config / core**: serde settings loaded from TOML or RON
//! - **render**: render context, multi-buffered resources and the frame cycle,
//!   written against the [`GpuDevice`](render::GpuDevice) trait
//! - **surface**: window thread, shared surface state, input queues and
//!   game controllers
//! - **ffi**: the `extern "C"` surface over all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vk_platform::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vk_platform::foundation::logging::init();
//!     let platform = Arc::new(VulkanPlatform::new(RendererConfig::default())?);
//!     let surface = RenderSurface::open(platform, SurfaceConfig::new(800, 600, "Demo"), |ctx| {
//!         let target = ctx.get_surface_target();
//!         if let Ok(commands) = ctx.create_command_buffer() {
//!             ctx.enqueue(target, commands);
//!         }
//!     })?;
//!     surface.wait_closed()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod surface;

pub mod ffi;

/// Common imports for platform users
pub mod prelude {
    pub use crate::{
        core::config::{PlatformConfig, RendererConfig, SurfaceConfig},
        render::{
            backends::vulkan::{VulkanDevice, VulkanPlatform},
            resources::{CommandFormat, PipelineSettings},
            types::*,
            CommandBuffer, DrawCommand, GpuDevice, RenderContext, RenderError, RenderTarget,
        },
        surface::{
            Controller, GlobalInputContext, HatState, RenderSurface, SurfaceError,
            SurfaceInputContext,
        },
    };
}
