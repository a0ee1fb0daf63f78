//! Render context handed to the host's update callback
//!
//! Creates every resource kind and keeps the ticking ones registered so the
//! frame cycle can advance them once per frame. Resources are reference
//! counted; the context only holds weak references to them.

use std::sync::Arc;

use crate::render::command_pool::CommandPool;
use crate::render::device::GpuDevice;
use crate::render::render_queue::{QueuedPass, RenderQueue};
use crate::render::resources::{
    CommandBuffer, CommandFormat, DynamicVertexBuffer, Framebuffer, FramebufferFormat, PipelineSettings,
    RenderPipeline, RenderTarget, Shader, StaticTexture, StaticVertexBuffer, SurfaceTarget,
    Texture, TextureBinding, TextureSampler, UniformBinding, UniformBuffer, VertexBuffer,
};
use crate::render::ticking::TickingSet;
use crate::render::types::{
    AttachmentDescriptor, RenderStageDescriptor, ShaderBinding, ShaderType, TextureBorderColor,
    TextureFiltering, TextureFormat, TextureWrapping,
};
use crate::render::{RenderError, RenderResult};

/// Resource factory and per-frame queue for one surface
pub struct RenderContext<D: GpuDevice> {
    device: Arc<D>,
    stages: usize,
    clear_color: [f32; 4],
    surface_target: SurfaceTarget<D>,
    surface_format: Arc<FramebufferFormat<D>>,
    ticking: TickingSet<D>,
    queue: RenderQueue<D>,
    command_pool: Arc<CommandPool<D>>,
}

impl<D: GpuDevice> RenderContext<D> {
    /// Context whose ticking resources keep `stages` slots
    pub fn new(
        device: Arc<D>,
        stages: usize,
        surface_format: Arc<FramebufferFormat<D>>,
        clear_color: [f32; 4],
    ) -> RenderResult<Self> {
        log::debug!("Creating render context with {stages} stages");
        let command_pool = CommandPool::new(device.clone())?;
        Ok(Self {
            device,
            stages,
            clear_color,
            surface_target: SurfaceTarget::new(),
            surface_format,
            ticking: TickingSet::new(),
            queue: RenderQueue::new(),
            command_pool,
        })
    }

    /// Device every resource is created on
    pub const fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Slots per ticking resource
    pub const fn stages(&self) -> usize {
        self.stages
    }

    /// Clear colour for colour attachments
    pub const fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Clear colour used from the next recorded frame on
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Target that always renders into the current swapchain image
    pub fn get_surface_target(&self) -> RenderTarget<D> {
        RenderTarget::Surface(self.surface_target.clone())
    }

    /// Format of the swapchain framebuffers
    pub fn get_surface_format(&self) -> Arc<FramebufferFormat<D>> {
        self.surface_format.clone()
    }

    /// Command format that follows the swapchain framebuffer across recreation
    pub fn surface_command_format(&self) -> CommandFormat<D> {
        CommandFormat::Surface(self.surface_target.clone())
    }

    pub(crate) fn surface_target(&self) -> &SurfaceTarget<D> {
        &self.surface_target
    }

    pub(crate) fn set_surface_format(&mut self, format: Arc<FramebufferFormat<D>>) {
        self.surface_format = format;
    }

    /// Render pass layout over `attachments`
    pub fn create_framebuffer_format(
        &self,
        attachments: Vec<AttachmentDescriptor>,
        stages: Vec<RenderStageDescriptor>,
    ) -> RenderResult<Arc<FramebufferFormat<D>>> {
        FramebufferFormat::new(self.device.clone(), attachments, stages).map(Arc::new)
    }

    /// Offscreen framebuffer whose attachments can be sampled afterwards
    pub fn create_framebuffer(
        &self,
        format: Arc<FramebufferFormat<D>>,
        width: u32,
        height: u32,
    ) -> RenderResult<Arc<Framebuffer<D>>> {
        Framebuffer::offscreen(self.device.clone(), format, width, height, self.stages)
            .map(Arc::new)
    }

    /// Shader module from SPIR-V bytes
    pub fn create_shader(
        &self,
        kind: ShaderType,
        spirv: &[u8],
        bindings: Vec<ShaderBinding>,
    ) -> RenderResult<Arc<Shader<D>>> {
        Shader::new(self.device.clone(), kind, spirv, bindings).map(Arc::new)
    }

    /// Graphics pipeline
    pub fn create_render_pipeline(
        &self,
        settings: PipelineSettings<D>,
    ) -> RenderResult<Arc<RenderPipeline<D>>> {
        RenderPipeline::new(self.device.clone(), settings).map(Arc::new)
    }

    /// Uniform buffer for `binding` of `shader`
    pub fn create_uniform_buffer(
        &mut self,
        shader: Arc<Shader<D>>,
        binding: u32,
        data: &[u8],
    ) -> RenderResult<Arc<UniformBuffer<D>>> {
        let buffer = Arc::new(UniformBuffer::new(
            self.device.clone(),
            shader,
            binding,
            data,
            self.stages,
        )?);
        self.ticking.add_uniform_buffer(&buffer);
        Ok(buffer)
    }

    /// Descriptor binding for `binding` of `shader`
    pub fn create_uniform_binding(
        &mut self,
        shader: Arc<Shader<D>>,
        binding: u32,
        buffer: Option<Arc<UniformBuffer<D>>>,
    ) -> RenderResult<Arc<UniformBinding<D>>> {
        let uniform_binding =
            UniformBinding::new(self.device.clone(), shader, binding, buffer, self.stages)?;
        self.ticking.add_uniform_binding(&uniform_binding);
        Ok(uniform_binding)
    }

    /// Vertex buffer holding `data`; only `writable` buffers accept later writes
    pub fn create_vertex_buffer(
        &mut self,
        data: &[u8],
        vertex_size: u32,
        writable: bool,
    ) -> RenderResult<VertexBuffer<D>> {
        if writable {
            let buffer = Arc::new(DynamicVertexBuffer::new(
                self.device.clone(),
                data,
                vertex_size,
                self.stages,
            )?);
            self.ticking.add_vertex_buffer(&buffer);
            Ok(VertexBuffer::Dynamic(buffer))
        } else {
            let buffer = StaticVertexBuffer::new(&*self.device, data, vertex_size)?;
            Ok(VertexBuffer::Static(Arc::new(buffer)))
        }
    }

    /// Vertex buffer from typed vertices; the stride is the size of `T`
    pub fn create_vertex_buffer_from<T: bytemuck::Pod>(
        &mut self,
        vertices: &[T],
        writable: bool,
    ) -> RenderResult<VertexBuffer<D>> {
        let vertex_size = u32::try_from(std::mem::size_of::<T>())
            .map_err(|_| RenderError::InvalidOperation("vertex type too large".to_string()))?;
        self.create_vertex_buffer(bytemuck::cast_slice(vertices), vertex_size, writable)
    }

    /// Texture uploaded from tightly packed pixels
    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: &[u8],
    ) -> RenderResult<Texture<D>> {
        let texture = StaticTexture::new(&*self.device, width, height, format, pixels)?;
        Ok(Texture::Static(Arc::new(texture)))
    }

    /// Descriptor binding for texture `binding` of `shader`
    pub fn create_texture_binding(
        &mut self,
        shader: Arc<Shader<D>>,
        binding: u32,
    ) -> RenderResult<Arc<TextureBinding<D>>> {
        let texture_binding = Arc::new(TextureBinding::new(
            self.device.clone(),
            shader,
            binding,
            self.stages,
        )?);
        self.ticking.add_texture_binding(&texture_binding);
        Ok(texture_binding)
    }

    /// Sampler
    pub fn create_texture_sampler(
        &self,
        min_filter: TextureFiltering,
        mag_filter: TextureFiltering,
        wrapping: TextureWrapping,
        border_color: TextureBorderColor,
        anisotropy: Option<f32>,
    ) -> RenderResult<Arc<TextureSampler<D>>> {
        TextureSampler::new(
            self.device.clone(),
            min_filter,
            mag_filter,
            wrapping,
            border_color,
            anisotropy,
        )
        .map(Arc::new)
    }

    /// Empty command buffer; fill it with [`CommandBuffer::commit`]
    pub fn create_command_buffer(&mut self) -> RenderResult<Arc<CommandBuffer<D>>> {
        let command_buffer = CommandBuffer::new(&self.command_pool, self.stages)?;
        self.ticking.add_command_buffer(&command_buffer);
        Ok(command_buffer)
    }

    /// Render `command_buffer` into `target` this frame
    pub fn enqueue(&mut self, target: RenderTarget<D>, command_buffer: Arc<CommandBuffer<D>>) {
        self.queue.enqueue(target, command_buffer);
    }

    /// Number of ticking resources still alive
    pub fn live_resources(&self) -> usize {
        self.ticking.live_count()
    }

    pub(crate) fn queue(&self) -> &RenderQueue<D> {
        &self.queue
    }

    pub(crate) fn clear_queue(&mut self) {
        self.queue.clear();
    }

    pub(crate) fn take_queue(&mut self) -> Vec<QueuedPass<D>> {
        self.queue.take()
    }

    /// Pool every command buffer of this context is allocated from
    pub fn command_pool(&self) -> &Arc<CommandPool<D>> {
        &self.command_pool
    }

    pub(crate) fn tick(&mut self) -> RenderResult<()> {
        self.ticking.visit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{Call, MockDevice, SPIRV};
    use crate::render::types::NumericType;

    fn context(device: &Arc<MockDevice>) -> RenderContext<MockDevice> {
        let format = Arc::new(
            FramebufferFormat::for_surface(device.clone(), ash::vk::Format::B8G8R8A8_SRGB)
                .unwrap(),
        );
        RenderContext::new(device.clone(), 3, format, [0.0, 0.0, 0.0, 1.0]).unwrap()
    }

    fn uniform_shader(context: &RenderContext<MockDevice>) -> Arc<Shader<MockDevice>> {
        context
            .create_shader(
                ShaderType::Vertex,
                &SPIRV,
                vec![ShaderBinding::uniform(vec![NumericType::Float4x4])],
            )
            .unwrap()
    }

    #[test]
    fn test_ticking_resources_registered() {
        let device = MockDevice::new();
        let mut context = context(&device);
        let shader = uniform_shader(&context);

        let buffer = context
            .create_uniform_buffer(shader.clone(), 0, &[1; 64])
            .unwrap();
        let binding = context
            .create_uniform_binding(shader, 0, Some(buffer.clone()))
            .unwrap();
        let vertices = context.create_vertex_buffer(&[0; 12], 12, true).unwrap();
        let commands = context.create_command_buffer().unwrap();
        assert_eq!(context.live_resources(), 4);

        for _ in 0..3 {
            context.tick().unwrap();
        }
        assert!(buffer.buffer().is_some());
        assert_eq!(
            device.count(|call| matches!(call, Call::WriteBufferDescriptor { .. })),
            3
        );

        drop((binding, vertices, commands));
        assert_eq!(context.live_resources(), 1);
    }

    #[test]
    fn test_typed_vertices() {
        let device = MockDevice::new();
        let mut context = context(&device);

        let vertices = context
            .create_vertex_buffer_from(&[[0.0_f32, 1.0], [1.0, 0.0], [0.5, 0.5]], false)
            .unwrap();
        assert_eq!(vertices.vertex_size(), 8);
        assert_eq!(vertices.vertex_count(), 3);
    }

    #[test]
    fn test_clear_color_can_change() {
        let device = MockDevice::new();
        let mut context = context(&device);
        context.set_clear_color([0.2, 0.4, 0.6, 1.0]);
        assert_eq!(context.clear_color(), [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn test_static_vertex_buffer_not_ticked() {
        let device = MockDevice::new();
        let mut context = context(&device);

        let vertices = context.create_vertex_buffer(&[0; 24], 12, false).unwrap();

        assert_eq!(context.live_resources(), 0);
        assert!(matches!(
            vertices.write(&[0; 12]),
            Err(RenderError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_offscreen_framebuffer_uses_context_stages() {
        let device = MockDevice::new();
        let context = context(&device);
        let format = context
            .create_framebuffer_format(
                vec![AttachmentDescriptor::color(TextureFormat::R8G8B8A8Srgb)],
                vec![RenderStageDescriptor {
                    color_attachments: vec![0],
                    ..RenderStageDescriptor::default()
                }],
            )
            .unwrap();

        let framebuffer = context.create_framebuffer(format, 64, 32).unwrap();

        assert_eq!(framebuffer.stage_count(), 3);
        assert!(!framebuffer.is_surface());
    }

    #[test]
    fn test_surface_format_cannot_back_offscreen_framebuffer() {
        let device = MockDevice::new();
        let context = context(&device);

        let result = context.create_framebuffer(context.get_surface_format(), 64, 32);

        assert!(matches!(result, Err(RenderError::InvalidOperation(_))));
    }

    #[test]
    fn test_enqueue_and_clear() {
        let device = MockDevice::new();
        let mut context = context(&device);
        let commands = context.create_command_buffer().unwrap();
        commands.commit(
            CommandFormat::Surface(context.surface_target().clone()),
            Vec::new(),
        );

        context.enqueue(context.get_surface_target(), commands.clone());
        context.enqueue(context.get_surface_target(), commands);
        assert_eq!(context.queue().len(), 2);

        context.clear_queue();
        assert!(context.queue().is_empty());
    }

    #[test]
    fn test_texture_binding_requires_texture_slot() {
        let device = MockDevice::new();
        let mut context = context(&device);
        let shader = uniform_shader(&context);

        assert!(context.create_texture_binding(shader, 0).is_err());
        assert_eq!(context.live_resources(), 0);
    }
}
