//! Render context and resource entry points
//!
//! Context functions take the [`vkp_context`] pointer passed to the update
//! callback and fail with a null handle when it is null. Every pointer/length
//! pair must describe readable memory; enum arguments are checked.

#![allow(non_camel_case_types)]

use std::any::Any;
use std::sync::Arc;

use super::commands::{self, render_target, vkp_command};
use super::descriptors::{
    self, byte_enum, vkp_attachment, vkp_pipeline_settings, vkp_render_stage,
    vkp_sampler_options, vkp_shader_binding,
};
use super::handle::{self, vkp_handle, NULL_HANDLE};
use super::{guard, slice, FfiError, FfiResult};
use crate::render::backends::vulkan::VulkanDevice;
use crate::render::device::GpuDevice;
use crate::render::resources::{
    CommandBuffer, CommandFormat, Framebuffer, FramebufferFormat, RenderTarget, Shader,
    SurfaceTarget, Texture, TextureBinding, TextureSampler, UniformBinding, UniformBuffer,
    VertexBuffer,
};
use crate::render::RenderContext;

/// Render context of a surface, valid during its update callback
pub type vkp_context = RenderContext<VulkanDevice>;

fn lookup<T: Any + Send + Sync>(handle: vkp_handle, what: &'static str) -> FfiResult<Arc<T>> {
    handle::get(handle).ok_or(FfiError::InvalidHandle(what))
}

unsafe fn context<'a>(ptr: *mut vkp_context) -> FfiResult<&'a mut vkp_context> {
    ptr.as_mut().ok_or(FfiError::NoContext)
}

pub(crate) fn surface_target<D: GpuDevice>(ctx: &RenderContext<D>) -> vkp_handle {
    handle::insert(Arc::new(ctx.get_surface_target()))
}

pub(crate) fn surface_format<D: GpuDevice>(ctx: &RenderContext<D>) -> vkp_handle {
    handle::insert(ctx.get_surface_format())
}

pub(crate) unsafe fn create_framebuffer_format<D: GpuDevice>(
    ctx: &RenderContext<D>,
    attachments: *const vkp_attachment,
    attachment_count: usize,
    stages: *const vkp_render_stage,
    stage_count: usize,
) -> FfiResult<vkp_handle> {
    let attachments = descriptors::attachments(attachments, attachment_count)?;
    let stages = descriptors::render_stages(stages, stage_count)?;
    Ok(handle::insert(ctx.create_framebuffer_format(attachments, stages)?))
}

pub(crate) fn create_framebuffer<D: GpuDevice>(
    ctx: &RenderContext<D>,
    format: vkp_handle,
    width: u32,
    height: u32,
) -> FfiResult<vkp_handle> {
    let format = lookup::<FramebufferFormat<D>>(format, "framebuffer format")?;
    Ok(handle::insert(ctx.create_framebuffer(format, width, height)?))
}

pub(crate) unsafe fn create_shader<D: GpuDevice>(
    ctx: &RenderContext<D>,
    kind: u8,
    spirv: *const u8,
    spirv_len: usize,
    bindings: *const vkp_shader_binding,
    binding_count: usize,
) -> FfiResult<vkp_handle> {
    let kind = byte_enum(kind, "ShaderType")?;
    let spirv = slice(spirv, spirv_len, "SPIR-V")?;
    let bindings = descriptors::shader_bindings(bindings, binding_count)?;
    Ok(handle::insert(ctx.create_shader(kind, spirv, bindings)?))
}

pub(crate) unsafe fn create_render_pipeline<D: GpuDevice>(
    ctx: &RenderContext<D>,
    settings: *const vkp_pipeline_settings,
) -> FfiResult<vkp_handle> {
    let settings = settings
        .as_ref()
        .ok_or(FfiError::NullPointer("pipeline settings"))?;
    let settings = descriptors::pipeline_settings(settings, &ctx.get_surface_format())?;
    Ok(handle::insert(ctx.create_render_pipeline(settings)?))
}

pub(crate) unsafe fn create_uniform_buffer<D: GpuDevice>(
    ctx: &mut RenderContext<D>,
    shader: vkp_handle,
    binding: u32,
    data: *const u8,
    len: usize,
) -> FfiResult<vkp_handle> {
    let shader = lookup::<Shader<D>>(shader, "shader")?;
    let data = slice(data, len, "uniform data")?;
    Ok(handle::insert(ctx.create_uniform_buffer(shader, binding, data)?))
}

pub(crate) fn create_uniform_binding<D: GpuDevice>(
    ctx: &mut RenderContext<D>,
    shader: vkp_handle,
    binding: u32,
    buffer: vkp_handle,
) -> FfiResult<vkp_handle> {
    let shader = lookup::<Shader<D>>(shader, "shader")?;
    let buffer = if buffer == NULL_HANDLE {
        None
    } else {
        Some(lookup::<UniformBuffer<D>>(buffer, "uniform buffer")?)
    };
    Ok(handle::insert(ctx.create_uniform_binding(shader, binding, buffer)?))
}

pub(crate) unsafe fn create_vertex_buffer<D: GpuDevice>(
    ctx: &mut RenderContext<D>,
    data: *const u8,
    len: usize,
    vertex_size: u32,
    writable: bool,
) -> FfiResult<vkp_handle> {
    let data = slice(data, len, "vertex data")?;
    let buffer = ctx.create_vertex_buffer(data, vertex_size, writable)?;
    Ok(handle::insert(Arc::new(buffer)))
}

pub(crate) unsafe fn create_texture<D: GpuDevice>(
    ctx: &RenderContext<D>,
    width: u32,
    height: u32,
    format: u8,
    pixels: *const u8,
    len: usize,
) -> FfiResult<vkp_handle> {
    let format = byte_enum(format, "TextureFormat")?;
    let pixels = slice(pixels, len, "pixels")?;
    let texture = ctx.create_texture(width, height, format, pixels)?;
    Ok(handle::insert(Arc::new(texture)))
}

pub(crate) fn create_texture_binding<D: GpuDevice>(
    ctx: &mut RenderContext<D>,
    shader: vkp_handle,
    binding: u32,
) -> FfiResult<vkp_handle> {
    let shader = lookup::<Shader<D>>(shader, "shader")?;
    Ok(handle::insert(ctx.create_texture_binding(shader, binding)?))
}

pub(crate) unsafe fn create_texture_sampler<D: GpuDevice>(
    ctx: &RenderContext<D>,
    options: *const vkp_sampler_options,
) -> FfiResult<vkp_handle> {
    let options = options
        .as_ref()
        .ok_or(FfiError::NullPointer("sampler options"))?;
    let (min, mag, wrapping, border, anisotropy) = descriptors::sampler_options(options)?;
    let sampler = ctx.create_texture_sampler(min, mag, wrapping, border, anisotropy)?;
    Ok(handle::insert(sampler))
}

/// Command buffer as registered for the host, with the surface its context renders to
pub(crate) struct HostCommandBuffer<D: GpuDevice> {
    buffer: Arc<CommandBuffer<D>>,
    surface: SurfaceTarget<D>,
}

pub(crate) fn create_command_buffer<D: GpuDevice>(ctx: &mut RenderContext<D>) -> FfiResult<vkp_handle> {
    let buffer = ctx.create_command_buffer()?;
    Ok(handle::insert(Arc::new(HostCommandBuffer {
        buffer,
        surface: ctx.surface_target().clone(),
    })))
}

pub(crate) fn enqueue<D: GpuDevice>(
    ctx: &mut RenderContext<D>,
    target: vkp_handle,
    command_buffer: vkp_handle,
) -> FfiResult<bool> {
    let target = render_target::<D>(target)?;
    let command_buffer = lookup::<HostCommandBuffer<D>>(command_buffer, "command buffer")?;
    ctx.enqueue(target, command_buffer.buffer.clone());
    Ok(true)
}

pub(crate) fn framebuffer_texture<D: GpuDevice>(framebuffer: vkp_handle, attachment: usize) -> FfiResult<vkp_handle> {
    let framebuffer = lookup::<Framebuffer<D>>(framebuffer, "framebuffer")?;
    let texture = Texture::Attachment(framebuffer.texture(attachment)?);
    Ok(handle::insert(Arc::new(texture)))
}

pub(crate) unsafe fn vertex_buffer_write<D: GpuDevice>(buffer: vkp_handle, data: *const u8, len: usize) -> FfiResult<bool> {
    let buffer = lookup::<VertexBuffer<D>>(buffer, "vertex buffer")?;
    buffer.write(slice(data, len, "vertex data")?)?;
    Ok(true)
}

pub(crate) unsafe fn uniform_buffer_write<D: GpuDevice>(buffer: vkp_handle, data: *const u8, len: usize) -> FfiResult<bool> {
    let buffer = lookup::<UniformBuffer<D>>(buffer, "uniform buffer")?;
    buffer.write(slice(data, len, "uniform data")?);
    Ok(true)
}

pub(crate) fn uniform_binding_update<D: GpuDevice>(binding: vkp_handle, buffer: vkp_handle) -> FfiResult<bool> {
    let binding = lookup::<UniformBinding<D>>(binding, "uniform binding")?;
    let buffer = lookup::<UniformBuffer<D>>(buffer, "uniform buffer")?;
    binding.update(buffer)?;
    Ok(true)
}

pub(crate) fn texture_binding_update<D: GpuDevice>(
    binding: vkp_handle,
    sampler: vkp_handle,
    texture: vkp_handle,
) -> FfiResult<bool> {
    let binding = lookup::<TextureBinding<D>>(binding, "texture binding")?;
    let sampler = lookup::<TextureSampler<D>>(sampler, "texture sampler")?;
    let texture = lookup::<Texture<D>>(texture, "texture")?;
    binding.update(sampler, (*texture).clone());
    Ok(true)
}

/// Framebuffer format handle, a render target whose format follows the target,
/// or null for the surface the command buffer was created for
fn command_format<D: GpuDevice>(
    command_buffer: &HostCommandBuffer<D>,
    handle: vkp_handle,
) -> FfiResult<CommandFormat<D>> {
    if handle == NULL_HANDLE {
        return Ok(CommandFormat::Surface(command_buffer.surface.clone()));
    }
    if let Some(format) = handle::get::<FramebufferFormat<D>>(handle) {
        return Ok(CommandFormat::Format(format));
    }
    match render_target::<D>(handle) {
        Ok(RenderTarget::Surface(target)) => Ok(CommandFormat::Surface(target)),
        Ok(RenderTarget::Framebuffer(framebuffer)) => {
            Ok(CommandFormat::Format(framebuffer.format().clone()))
        }
        Err(_) => Err(FfiError::InvalidHandle("command format")),
    }
}

pub(crate) unsafe fn command_buffer_commit<D: GpuDevice>(
    command_buffer: vkp_handle,
    format: vkp_handle,
    commands: *const vkp_command,
    count: usize,
) -> FfiResult<bool> {
    let command_buffer = lookup::<HostCommandBuffer<D>>(command_buffer, "command buffer")?;
    let format = command_format(&command_buffer, format)?;
    let commands = commands::decode_all::<D>(slice(commands, count, "commands")?)?;
    command_buffer.buffer.commit(format, commands);
    Ok(true)
}

/// Target rendering into the surface's current swapchain image
#[no_mangle]
pub unsafe extern "C" fn vkp_context_get_surface_target(ctx: *mut vkp_context) -> vkp_handle {
    guard("vkp_context_get_surface_target", NULL_HANDLE, || {
        Ok::<_, FfiError>(surface_target(context(ctx)?))
    })
}

/// Framebuffer format of the surface
#[no_mangle]
pub unsafe extern "C" fn vkp_context_get_surface_format(ctx: *mut vkp_context) -> vkp_handle {
    guard("vkp_context_get_surface_format", NULL_HANDLE, || {
        Ok::<_, FfiError>(surface_format(context(ctx)?))
    })
}

/// Framebuffer format from attachments and render stages
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_framebuffer_format(
    ctx: *mut vkp_context,
    attachments: *const vkp_attachment,
    attachment_count: usize,
    stages: *const vkp_render_stage,
    stage_count: usize,
) -> vkp_handle {
    guard("vkp_context_create_framebuffer_format", NULL_HANDLE, || {
        create_framebuffer_format(context(ctx)?, attachments, attachment_count, stages, stage_count)
    })
}

/// Offscreen framebuffer
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_framebuffer(
    ctx: *mut vkp_context,
    format: vkp_handle,
    width: u32,
    height: u32,
) -> vkp_handle {
    guard("vkp_context_create_framebuffer", NULL_HANDLE, || {
        create_framebuffer(context(ctx)?, format, width, height)
    })
}

/// Shader from SPIR-V bytes
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_shader(
    ctx: *mut vkp_context,
    kind: u8,
    spirv: *const u8,
    spirv_len: usize,
    bindings: *const vkp_shader_binding,
    binding_count: usize,
) -> vkp_handle {
    guard("vkp_context_create_shader", NULL_HANDLE, || {
        create_shader(context(ctx)?, kind, spirv, spirv_len, bindings, binding_count)
    })
}

/// Render pipeline
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_render_pipeline(
    ctx: *mut vkp_context,
    settings: *const vkp_pipeline_settings,
) -> vkp_handle {
    guard("vkp_context_create_render_pipeline", NULL_HANDLE, || {
        create_render_pipeline(context(ctx)?, settings)
    })
}

/// Uniform buffer for a shader binding
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_uniform_buffer(
    ctx: *mut vkp_context,
    shader: vkp_handle,
    binding: u32,
    data: *const u8,
    len: usize,
) -> vkp_handle {
    guard("vkp_context_create_uniform_buffer", NULL_HANDLE, || {
        create_uniform_buffer(context(ctx)?, shader, binding, data, len)
    })
}

/// Uniform binding, optionally pointing at a buffer already
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_uniform_binding(
    ctx: *mut vkp_context,
    shader: vkp_handle,
    binding: u32,
    buffer: vkp_handle,
) -> vkp_handle {
    guard("vkp_context_create_uniform_binding", NULL_HANDLE, || {
        create_uniform_binding(context(ctx)?, shader, binding, buffer)
    })
}

/// Vertex buffer; only writable buffers accept [`vkp_vertex_buffer_write`]
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_vertex_buffer(
    ctx: *mut vkp_context,
    data: *const u8,
    len: usize,
    vertex_size: u32,
    writable: bool,
) -> vkp_handle {
    guard("vkp_context_create_vertex_buffer", NULL_HANDLE, || {
        create_vertex_buffer(context(ctx)?, data, len, vertex_size, writable)
    })
}

/// Texture from tightly packed pixels
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_texture(
    ctx: *mut vkp_context,
    width: u32,
    height: u32,
    format: u8,
    pixels: *const u8,
    len: usize,
) -> vkp_handle {
    guard("vkp_context_create_texture", NULL_HANDLE, || {
        create_texture(context(ctx)?, width, height, format, pixels, len)
    })
}

/// Texture binding for a shader binding
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_texture_binding(
    ctx: *mut vkp_context,
    shader: vkp_handle,
    binding: u32,
) -> vkp_handle {
    guard("vkp_context_create_texture_binding", NULL_HANDLE, || {
        create_texture_binding(context(ctx)?, shader, binding)
    })
}

/// Sampler
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_texture_sampler(
    ctx: *mut vkp_context,
    options: *const vkp_sampler_options,
) -> vkp_handle {
    guard("vkp_context_create_texture_sampler", NULL_HANDLE, || {
        create_texture_sampler(context(ctx)?, options)
    })
}

/// Empty command buffer
#[no_mangle]
pub unsafe extern "C" fn vkp_context_create_command_buffer(ctx: *mut vkp_context) -> vkp_handle {
    guard("vkp_context_create_command_buffer", NULL_HANDLE, || {
        create_command_buffer(context(ctx)?)
    })
}

/// Render a command buffer into a target this frame
#[no_mangle]
pub unsafe extern "C" fn vkp_context_enqueue(
    ctx: *mut vkp_context,
    target: vkp_handle,
    command_buffer: vkp_handle,
) -> bool {
    guard("vkp_context_enqueue", false, || {
        enqueue(context(ctx)?, target, command_buffer)
    })
}

/// Sampleable view of a framebuffer attachment
#[no_mangle]
pub extern "C" fn vkp_framebuffer_get_texture(framebuffer: vkp_handle, attachment: usize) -> vkp_handle {
    guard("vkp_framebuffer_get_texture", NULL_HANDLE, || {
        framebuffer_texture::<VulkanDevice>(framebuffer, attachment)
    })
}

/// Replace the contents of a writable vertex buffer
#[no_mangle]
pub unsafe extern "C" fn vkp_vertex_buffer_write(buffer: vkp_handle, data: *const u8, len: usize) -> bool {
    guard("vkp_vertex_buffer_write", false, || {
        vertex_buffer_write::<VulkanDevice>(buffer, data, len)
    })
}

/// Replace the contents of a uniform buffer
#[no_mangle]
pub unsafe extern "C" fn vkp_uniform_buffer_write(buffer: vkp_handle, data: *const u8, len: usize) -> bool {
    guard("vkp_uniform_buffer_write", false, || {
        uniform_buffer_write::<VulkanDevice>(buffer, data, len)
    })
}

/// Point a uniform binding at another buffer
#[no_mangle]
pub extern "C" fn vkp_uniform_binding_update(binding: vkp_handle, buffer: vkp_handle) -> bool {
    guard("vkp_uniform_binding_update", false, || {
        uniform_binding_update::<VulkanDevice>(binding, buffer)
    })
}

/// Point a texture binding at another sampler and texture
#[no_mangle]
pub extern "C" fn vkp_texture_binding_update(
    binding: vkp_handle,
    sampler: vkp_handle,
    texture: vkp_handle,
) -> bool {
    guard("vkp_texture_binding_update", false, || {
        texture_binding_update::<VulkanDevice>(binding, sampler, texture)
    })
}

/// Replace the commands of a command buffer
///
/// `format` is a framebuffer format, a render target whose format is used, or
/// null for the surface format.
#[no_mangle]
pub unsafe extern "C" fn vkp_command_buffer_commit(
    command_buffer: vkp_handle,
    format: vkp_handle,
    commands: *const vkp_command,
    count: usize,
) -> bool {
    guard("vkp_command_buffer_commit", false, || {
        command_buffer_commit::<VulkanDevice>(command_buffer, format, commands, count)
    })
}
