//! GPU resources created through a render context
//!
//! Static resources are written once at creation. Ticking resources
//! ([`DynamicVertexBuffer`], [`UniformBuffer`], [`UniformBinding`],
//! [`TextureBinding`], [`CommandBuffer`]) keep one slot per swapchain stage and
//! are advanced by the context's ticking set.

mod command_buffer;
mod framebuffer;
mod shader;
mod slots;
mod texture;
mod uniform;
mod vertex_buffer;

pub use command_buffer::{CommandBuffer, CommandFormat, DrawCommand};
pub use framebuffer::{
    Framebuffer, FramebufferFormat, FramebufferTexture, RenderTarget, SurfaceTarget,
};
pub use shader::{PipelineSettings, RenderPipeline, Shader};
pub use texture::{StaticTexture, Texture, TextureBinding, TextureSampler};
pub use uniform::{UniformBinding, UniformBuffer};
pub use vertex_buffer::{DynamicVertexBuffer, StaticVertexBuffer, VertexBuffer};
