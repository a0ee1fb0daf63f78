//! # Rendering
//!
//! Frame lifecycle and multi-buffered resources on top of a [`GpuDevice`].
//!
//! ## Frame flow
//!
//! ```text
//! wait fence → acquire → host update + tick → sync image → record queue → submit → present
//!                  │                                                          │
//!                  └──────────── out-of-date / resized ─── recreate ──────────┘
//! ```
//!
//! Every resource whose contents change between frames keeps one backing slot
//! per swapchain stage and advances its read slot once per frame in
//! [`ticking::TickingSet::visit`]. A write lands in the slot after the one being
//! read and reaches all slots after `stages` ticks, so the GPU never reads a
//! slot the CPU is writing.
//!
//! All GPU access goes through the [`GpuDevice`] trait; the Vulkan backend lives
//! in [`backends::vulkan`].

use ash::vk;
use thiserror::Error;

pub mod backends;
pub mod command_pool;
pub mod context;
pub mod dependents;
pub mod device;
pub mod frame_cycle;
pub mod render_queue;
pub mod resources;
pub mod ticking;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use command_pool::CommandPool;
pub use context::RenderContext;
pub use device::GpuDevice;
pub use frame_cycle::{FrameCycle, FrameOutcome, SurfaceExtent};
pub use render_queue::RenderQueue;
pub use resources::{
    CommandBuffer, DrawCommand, Framebuffer, FramebufferFormat, FramebufferTexture,
    RenderPipeline, RenderTarget, Shader, SurfaceTarget, Texture, TextureBinding,
    TextureSampler, UniformBinding, UniformBuffer, VertexBuffer,
};

/// Rendering errors
///
/// Transient presentation conditions (out-of-date, suboptimal) never appear
/// here; the frame cycle recovers from them by recreating the swapchain.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Vulkan API call failed with a result code
    #[error("Vulkan API error: {0:?}")]
    Vulkan(vk::Result),

    /// Instance, device or context setup failed
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device supports graphics and presentation to the surface
    #[error("No suitable GPU device found")]
    NoSuitableDevice,

    /// The shared device cannot present to a newly requested surface
    #[error("Device is incompatible with the requested surface")]
    IncompatibleDevice,

    /// Swapchain could not be created for the surface
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Surface has a zero width or height and cannot be presented to
    #[error("Surface has zero size")]
    ZeroSizedSurface,

    /// GPU resource could not be created
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// A fence wait timed out or the device reported loss
    #[error("GPU device lost")]
    DeviceLost,

    /// API misuse by the caller
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// No memory type matches the allocation requirements
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The surface a render target refers to has been closed
    #[error("Render surface is closed")]
    SurfaceClosed,
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST | vk::Result::TIMEOUT => Self::DeviceLost,
            other => Self::Vulkan(other),
        }
    }
}

impl RenderError {
    /// Swapchain conditions a later frame can recover from, such as a surface
    /// minimised between event polling and swapchain creation
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ZeroSizedSurface | Self::SwapchainCreation(_))
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
