//! Draw commands as the host writes them
//!
//! A [`vkp_command`] is a tag plus a union; only the member matching the tag is
//! read. Handles inside are resolved against the registry when the command
//! buffer is committed.

#![allow(non_camel_case_types)]

use std::sync::Arc;

use super::handle::{self, vkp_handle, NULL_HANDLE};
use super::{FfiError, FfiResult};
use crate::render::device::GpuDevice;
use crate::render::resources::{
    DrawCommand, Framebuffer, RenderPipeline, RenderTarget, TextureBinding, UniformBinding,
    VertexBuffer,
};
use crate::render::types::Extents2D;

/// Viewport and scissor covering `data.target`
pub const VKP_COMMAND_SET_VIEWPORT_SCISSOR: u32 = 0;
/// Viewport from `data.extents`
pub const VKP_COMMAND_SET_VIEWPORT: u32 = 1;
/// Scissor from `data.extents`
pub const VKP_COMMAND_SET_SCISSOR: u32 = 2;
/// Bind the uniform binding in `data.bind`
pub const VKP_COMMAND_BIND_UNIFORM: u32 = 3;
/// Bind the texture binding in `data.bind`
pub const VKP_COMMAND_BIND_TEXTURE: u32 = 4;
/// Bind one block of the uniform binding in `data.use_uniform`
pub const VKP_COMMAND_USE_UNIFORM: u32 = 5;
/// Draw as described by `data.draw`
pub const VKP_COMMAND_DRAW: u32 = 6;

/// Pipeline plus a binding
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_bind_command {
    /// Render pipeline
    pub pipeline: vkp_handle,
    /// Uniform or texture binding
    pub binding: vkp_handle,
}

/// Pipeline, uniform binding and block index
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_use_uniform_command {
    /// Render pipeline
    pub pipeline: vkp_handle,
    /// Uniform binding
    pub binding: vkp_handle,
    /// Block inside the bound buffer
    pub index: u32,
}

/// Draw call
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_draw_command {
    /// Render pipeline
    pub pipeline: vkp_handle,
    /// Vertex buffer
    pub vertices: vkp_handle,
    /// Instance buffer, or null for one instance
    pub instances: vkp_handle,
}

/// Payload of a [`vkp_command`]
#[repr(C)]
#[derive(Clone, Copy)]
pub union vkp_command_data {
    /// Framebuffer or surface target
    pub target: vkp_handle,
    /// Pixel rectangle
    pub extents: Extents2D,
    /// Binding commands
    pub bind: vkp_bind_command,
    /// Block selection
    pub use_uniform: vkp_use_uniform_command,
    /// Draw
    pub draw: vkp_draw_command,
}

/// One draw command
#[repr(C)]
#[derive(Clone, Copy)]
pub struct vkp_command {
    /// One of the `VKP_COMMAND_*` tags
    pub tag: u32,
    /// Member selected by `tag`
    pub data: vkp_command_data,
}

fn lookup<T: std::any::Any + Send + Sync>(handle: vkp_handle, what: &'static str) -> FfiResult<Arc<T>> {
    handle::get(handle).ok_or(FfiError::InvalidHandle(what))
}

/// Render target behind a framebuffer or surface target handle
pub fn render_target<D: GpuDevice>(handle: vkp_handle) -> FfiResult<RenderTarget<D>> {
    if let Some(framebuffer) = handle::get::<Framebuffer<D>>(handle) {
        return Ok(RenderTarget::Framebuffer(framebuffer));
    }
    handle::get::<RenderTarget<D>>(handle)
        .map(|target| (*target).clone())
        .ok_or(FfiError::InvalidHandle("render target"))
}

/// Vertex buffer behind `handle`
pub fn vertex_buffer<D: GpuDevice>(handle: vkp_handle) -> FfiResult<VertexBuffer<D>> {
    lookup::<VertexBuffer<D>>(handle, "vertex buffer").map(|buffer| (*buffer).clone())
}

/// Resolve a host command
///
/// # Safety
/// The union member selected by `command.tag` must be initialised.
pub unsafe fn decode<D: GpuDevice>(command: &vkp_command) -> FfiResult<DrawCommand<D>> {
    let data = &command.data;
    Ok(match command.tag {
        VKP_COMMAND_SET_VIEWPORT_SCISSOR => DrawCommand::SetViewportScissor(render_target(data.target)?),
        VKP_COMMAND_SET_VIEWPORT => DrawCommand::SetViewport(data.extents),
        VKP_COMMAND_SET_SCISSOR => DrawCommand::SetScissor(data.extents),
        VKP_COMMAND_BIND_UNIFORM => DrawCommand::BindUniform {
            pipeline: lookup::<RenderPipeline<D>>(data.bind.pipeline, "pipeline")?,
            binding: lookup::<UniformBinding<D>>(data.bind.binding, "uniform binding")?,
        },
        VKP_COMMAND_BIND_TEXTURE => DrawCommand::BindTexture {
            pipeline: lookup::<RenderPipeline<D>>(data.bind.pipeline, "pipeline")?,
            binding: lookup::<TextureBinding<D>>(data.bind.binding, "texture binding")?,
        },
        VKP_COMMAND_USE_UNIFORM => DrawCommand::UseUniform {
            pipeline: lookup::<RenderPipeline<D>>(data.use_uniform.pipeline, "pipeline")?,
            binding: lookup::<UniformBinding<D>>(data.use_uniform.binding, "uniform binding")?,
            index: data.use_uniform.index,
        },
        VKP_COMMAND_DRAW => {
            let draw = data.draw;
            DrawCommand::Draw {
                pipeline: lookup::<RenderPipeline<D>>(draw.pipeline, "pipeline")?,
                vertices: vertex_buffer(draw.vertices)?,
                instances: if draw.instances == NULL_HANDLE {
                    None
                } else {
                    Some(vertex_buffer(draw.instances)?)
                },
            }
        }
        tag => {
            return Err(FfiError::UnknownValue {
                kind: "command tag",
                value: tag,
            })
        }
    })
}

/// Resolve every command in order, failing on the first bad one
///
/// # Safety
/// Same as [`decode`] for each command.
pub unsafe fn decode_all<D: GpuDevice>(commands: &[vkp_command]) -> FfiResult<Vec<DrawCommand<D>>> {
    commands.iter().map(|command| decode(command)).collect()
}
