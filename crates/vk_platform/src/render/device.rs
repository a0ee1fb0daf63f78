//! GPU capability seam
//!
//! Everything above this trait (frame cycle, ticking resources, render queue,
//! command replay) is backend-neutral and talks to the GPU only through
//! [`GpuDevice`]. Handles are plain `ash::vk` handles; buffers and images are
//! owned values that free their memory when dropped.

use ash::vk;

use crate::render::RenderResult;

/// Host-visible buffer owned by a device
pub trait DeviceBuffer: Send + Sync {
    /// Buffer handle
    fn handle(&self) -> vk::Buffer;
    /// Capacity in bytes
    fn size(&self) -> vk::DeviceSize;
}

/// Image plus its default view, owned by a device
pub trait DeviceImage: Send + Sync {
    /// Image handle
    fn image(&self) -> vk::Image;
    /// View over the whole image
    fn view(&self) -> vk::ImageView;
}

/// Swapchain with the views of its presentable images
#[derive(Debug, Clone)]
pub struct SwapchainImages {
    /// Swapchain handle
    pub swapchain: vk::SwapchainKHR,
    /// Colour format of the images
    pub format: vk::Format,
    /// Image size
    pub extent: vk::Extent2D,
    /// One view per presentable image
    pub views: Vec<vk::ImageView>,
}

impl SwapchainImages {
    /// Number of presentable images
    pub fn stage_count(&self) -> usize {
        self.views.len()
    }
}

/// Result of acquiring a presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image ready for rendering
    Acquired {
        /// Index into the swapchain images
        image_index: u32,
        /// Swapchain still works but no longer matches the surface
        suboptimal: bool,
    },
    /// Swapchain must be recreated before rendering
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented
    Presented,
    /// Presented, but the swapchain should be recreated
    Suboptimal,
    /// Not presented; the swapchain must be recreated
    OutOfDate,
}

/// Subpass layout of a render pass
#[derive(Debug, Clone, Default)]
pub struct SubpassLayout {
    /// Colour attachment references
    pub color_attachments: Vec<vk::AttachmentReference>,
    /// Depth/stencil attachment reference
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

/// Render pass description
#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    /// Attachment descriptions
    pub attachments: Vec<vk::AttachmentDescription>,
    /// Subpasses in execution order
    pub subpasses: Vec<SubpassLayout>,
    /// Dependencies between subpasses
    pub dependencies: Vec<vk::SubpassDependency>,
}

/// Rasterizer setup of a graphics pipeline
#[derive(Debug, Clone, Copy)]
pub struct RasterizationDesc {
    /// Discard before rasterization
    pub discard: bool,
    /// Fill mode
    pub polygon_mode: vk::PolygonMode,
    /// Culled faces
    pub cull_mode: vk::CullModeFlags,
    /// Front face winding
    pub front_face: vk::FrontFace,
    /// Depth bias (`enabled`, constant, clamp, slope)
    pub depth_bias: (bool, f32, f32, f32),
    /// Line width
    pub line_width: f32,
}

/// Depth/stencil setup of a graphics pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStencilDesc {
    /// Depth test on
    pub depth_test: bool,
    /// Depth write on
    pub depth_write: bool,
    /// Depth comparison
    pub depth_compare: vk::CompareOp,
    /// Stencil test on
    pub stencil_test: bool,
    /// Front stencil state
    pub front: vk::StencilOpState,
    /// Back stencil state
    pub back: vk::StencilOpState,
}

/// Everything needed to build a graphics pipeline
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    /// Shader stages and their modules, entry point `main`
    pub stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    /// Vertex input bindings
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex input attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Rasterizer
    pub rasterization: RasterizationDesc,
    /// Depth/stencil
    pub depth_stencil: DepthStencilDesc,
    /// One blend state per colour attachment of the subpass
    pub blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline is used in
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
}

/// Sampler description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Addressing on all axes
    pub address_mode: vk::SamplerAddressMode,
    /// Border colour
    pub border_color: vk::BorderColor,
    /// Maximum anisotropy, `None` to disable
    pub max_anisotropy: Option<f32>,
}

/// Image layout change recorded into a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    /// Image
    pub image: vk::Image,
    /// Aspects affected
    pub aspect: vk::ImageAspectFlags,
    /// Current layout
    pub old_layout: vk::ImageLayout,
    /// Target layout
    pub new_layout: vk::ImageLayout,
}

/// Render pass begin parameters
#[derive(Clone)]
pub struct RenderPassBegin {
    /// Render pass
    pub render_pass: vk::RenderPass,
    /// Framebuffer
    pub framebuffer: vk::Framebuffer,
    /// Render area
    pub extent: vk::Extent2D,
    /// One clear value per attachment
    pub clear_values: Vec<vk::ClearValue>,
}

/// Device limits the render layer needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Alignment of dynamic uniform offsets
    pub min_uniform_buffer_offset_alignment: u64,
}

/// Every GPU operation the render layer performs
///
/// One implementation per backend; the render context is generic over it.
pub trait GpuDevice: Send + Sync + 'static {
    /// Host-visible buffer type
    type Buffer: DeviceBuffer;
    /// Image type
    type Image: DeviceImage;

    /// Device limits
    fn limits(&self) -> DeviceLimits;

    // Synchronisation

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Block until the fence signals
    fn wait_for_fence(&self, fence: vk::Fence) -> RenderResult<()>;
    /// Return the fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()>;
    /// Create a binary semaphore
    fn create_semaphore(&self) -> RenderResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Block until the device has no outstanding work
    fn wait_idle(&self) -> RenderResult<()>;

    // Memory

    /// Create a host-visible buffer of `size` bytes
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> RenderResult<Self::Buffer>;
    /// Copy bytes to the start of a buffer
    fn write_buffer(&self, buffer: &Self::Buffer, data: &[u8]) -> RenderResult<()>;
    /// Create a sampled image filled with `pixels`, left in shader-read layout
    fn create_texture_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        pixels: &[u8],
    ) -> RenderResult<Self::Image>;
    /// Create an attachment image, left in shader-read layout
    fn create_attachment_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RenderResult<Self::Image>;
    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDesc) -> RenderResult<vk::Sampler>;
    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // Descriptors

    /// Layout with a single binding 0 of the given type
    fn create_descriptor_set_layout(
        &self,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> RenderResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Pool holding exactly `count` sets of `layout`, and the sets
    fn allocate_descriptor_sets(
        &self,
        layout: vk::DescriptorSetLayout,
        ty: vk::DescriptorType,
        count: u32,
    ) -> RenderResult<(vk::DescriptorPool, Vec<vk::DescriptorSet>)>;
    /// Destroy a pool and every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// Point binding 0 of a set at a buffer range
    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    );
    /// Point binding 0 of a set at a sampled image
    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        sampler: vk::Sampler,
        view: vk::ImageView,
    );

    // Pipeline objects

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> RenderResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    /// Create a pipeline layout over descriptor set layouts
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> RenderResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    /// Create a graphics pipeline with dynamic viewport and scissor
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> RenderResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
    /// Create a render pass
    fn create_render_pass(&self, desc: &RenderPassDesc) -> RenderResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    /// Create a framebuffer over image views
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        attachments: &[vk::ImageView],
    ) -> RenderResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Presentation

    /// Create a swapchain for `surface`, retiring `old_swapchain` if given
    fn create_swapchain(
        &self,
        surface: vk::SurfaceKHR,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> RenderResult<SwapchainImages>;
    /// Destroy image views and the swapchain
    fn destroy_swapchain(&self, swapchain: &SwapchainImages);
    /// Acquire the next presentable image
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome>;
    /// Submit a primary command buffer to the graphics queue
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> RenderResult<()>;
    /// Queue an image for presentation
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RenderResult<PresentOutcome>;

    // Recording

    /// Command pool on the graphics queue family whose buffers can be reset individually
    fn create_command_pool(&self) -> RenderResult<vk::CommandPool>;
    /// Destroy a command pool and every buffer still allocated from it
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Allocate command buffers from `pool`
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>>;
    /// Return command buffers to `pool`
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    /// Begin recording; `inherit` gives the render pass a secondary buffer continues
    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
        inherit: Option<(vk::RenderPass, u32)>,
    ) -> RenderResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()>;
    /// Begin a render pass whose contents come from secondary buffers
    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin);
    /// Move to the next subpass, again with secondary-buffer contents
    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer);
    /// End the render pass
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    /// Execute a secondary command buffer
    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary: vk::CommandBuffer);
    /// Record image layout transitions
    fn cmd_transition_images(&self, command_buffer: vk::CommandBuffer, transitions: &[ImageTransition]);
    /// Set the viewport
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport);
    /// Set the scissor
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);
    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    /// Bind one descriptor set
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    );
    /// Bind vertex buffers starting at binding 0
    fn cmd_bind_vertex_buffers(&self, command_buffer: vk::CommandBuffer, buffers: &[vk::Buffer]);
    /// Non-indexed draw
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
}
