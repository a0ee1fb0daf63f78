//! Recording GPU device for tests
//!
//! Hands out fresh fake handles, keeps buffer contents in memory and logs
//! every call the render layer makes so tests can assert on ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk::{self, Handle};

use crate::render::device::{
    AcquireOutcome, DeviceBuffer, DeviceImage, DeviceLimits, GpuDevice, GraphicsPipelineDesc,
    ImageTransition, PresentOutcome, RenderPassBegin, RenderPassDesc, SamplerDesc,
    SwapchainImages,
};
use crate::render::{RenderError, RenderResult};

/// Smallest input the SPIR-V reader accepts: the magic number
pub const SPIRV: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

/// One logged device call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    WaitIdle,
    CreateBuffer { buffer: vk::Buffer, size: u64 },
    WriteBuffer { buffer: vk::Buffer, data: Vec<u8> },
    CreateRenderPass(vk::RenderPass),
    CreateFramebuffer(vk::Framebuffer),
    DestroyFramebuffer(vk::Framebuffer),
    CreatePipeline(vk::Pipeline),
    CreateSwapchain(vk::SwapchainKHR),
    DestroySwapchain(vk::SwapchainKHR),
    WriteBufferDescriptor { set: vk::DescriptorSet, buffer: vk::Buffer, range: u64 },
    WriteImageDescriptor { set: vk::DescriptorSet, view: vk::ImageView },
    Acquire(vk::Semaphore),
    Submit {
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    },
    Present { image_index: u32, wait: vk::Semaphore },
    CreateCommandPool(vk::CommandPool),
    DestroyCommandPool(vk::CommandPool),
    FreeCommandBuffers { pool: vk::CommandPool, buffers: Vec<vk::CommandBuffer> },
    Begin(vk::CommandBuffer),
    End(vk::CommandBuffer),
    BeginRenderPass { command_buffer: vk::CommandBuffer, framebuffer: vk::Framebuffer },
    NextSubpass(vk::CommandBuffer),
    EndRenderPass(vk::CommandBuffer),
    Execute { command_buffer: vk::CommandBuffer, secondary: vk::CommandBuffer },
    Transition { command_buffer: vk::CommandBuffer, images: Vec<vk::Image> },
    SetViewport { command_buffer: vk::CommandBuffer, rect: [f32; 4] },
    SetScissor { command_buffer: vk::CommandBuffer, rect: (i32, i32, u32, u32) },
    BindPipeline { command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline },
    BindDescriptorSet {
        command_buffer: vk::CommandBuffer,
        set_index: u32,
        set: vk::DescriptorSet,
        offsets: Vec<u32>,
    },
    BindVertexBuffers { command_buffer: vk::CommandBuffer, buffers: Vec<vk::Buffer> },
    Draw { command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32 },
}

pub struct MockBuffer {
    handle: vk::Buffer,
    size: u64,
    contents: Arc<Mutex<Vec<u8>>>,
}

impl DeviceBuffer for MockBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

pub struct MockImage {
    image: vk::Image,
    view: vk::ImageView,
}

impl DeviceImage for MockImage {
    fn image(&self) -> vk::Image {
        self.image
    }

    fn view(&self) -> vk::ImageView {
        self.view
    }
}

pub struct MockDevice {
    next_handle: AtomicU64,
    calls: Mutex<Vec<Call>>,
    buffers: Mutex<HashMap<vk::Buffer, Arc<Mutex<Vec<u8>>>>>,
    swapchain_stages: Mutex<usize>,
    next_image: Mutex<u32>,
    acquire_script: Mutex<VecDeque<AcquireOutcome>>,
    present_script: Mutex<VecDeque<PresentOutcome>>,
    swapchain_failures: Mutex<VecDeque<RenderError>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Self::with_stages(3)
    }

    pub fn with_stages(stages: usize) -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            buffers: Mutex::new(HashMap::new()),
            swapchain_stages: Mutex::new(stages),
            next_image: Mutex::new(0),
            acquire_script: Mutex::new(VecDeque::new()),
            present_script: Mutex::new(VecDeque::new()),
            swapchain_failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Stage count reported by the next swapchain creation
    pub fn set_swapchain_stages(&self, stages: usize) {
        *self.swapchain_stages.lock().unwrap() = stages;
    }

    /// Outcome of the next acquire instead of round-robin success
    pub fn script_acquire(&self, outcome: AcquireOutcome) {
        self.acquire_script.lock().unwrap().push_back(outcome);
    }

    /// Error returned by the next swapchain creation
    pub fn fail_next_swapchain(&self, error: RenderError) {
        self.swapchain_failures.lock().unwrap().push_back(error);
    }

    /// Outcome of the next present instead of success
    pub fn script_present(&self, outcome: PresentOutcome) {
        self.present_script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.buffers
            .lock()
            .unwrap()
            .get(&buffer)
            .map(|contents| contents.lock().unwrap().clone())
            .unwrap_or_default()
    }

    fn handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GpuDevice for MockDevice {
    type Buffer = MockBuffer;
    type Image = MockImage;

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            min_uniform_buffer_offset_alignment: 256,
        }
    }

    fn create_fence(&self, _signaled: bool) -> RenderResult<vk::Fence> {
        Ok(self.handle())
    }

    fn destroy_fence(&self, _fence: vk::Fence) {}

    fn wait_for_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        self.record(Call::WaitFence(fence));
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        Ok(self.handle())
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {}

    fn wait_idle(&self) -> RenderResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> RenderResult<MockBuffer> {
        let handle = self.handle();
        let contents = Arc::new(Mutex::new(Vec::new()));
        self.buffers.lock().unwrap().insert(handle, contents.clone());
        self.record(Call::CreateBuffer {
            buffer: handle,
            size,
        });
        Ok(MockBuffer {
            handle,
            size,
            contents,
        })
    }

    fn write_buffer(&self, buffer: &MockBuffer, data: &[u8]) -> RenderResult<()> {
        assert!(data.len() as u64 <= buffer.size, "write past end of buffer");
        *buffer.contents.lock().unwrap() = data.to_vec();
        self.record(Call::WriteBuffer {
            buffer: buffer.handle,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn create_texture_image(
        &self,
        _width: u32,
        _height: u32,
        _format: vk::Format,
        _pixels: &[u8],
    ) -> RenderResult<MockImage> {
        Ok(MockImage {
            image: self.handle(),
            view: self.handle(),
        })
    }

    fn create_attachment_image(
        &self,
        _extent: vk::Extent2D,
        _format: vk::Format,
        _usage: vk::ImageUsageFlags,
        _aspect: vk::ImageAspectFlags,
    ) -> RenderResult<MockImage> {
        Ok(MockImage {
            image: self.handle(),
            view: self.handle(),
        })
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> RenderResult<vk::Sampler> {
        Ok(self.handle())
    }

    fn destroy_sampler(&self, _sampler: vk::Sampler) {}

    fn create_descriptor_set_layout(
        &self,
        _ty: vk::DescriptorType,
        _stages: vk::ShaderStageFlags,
    ) -> RenderResult<vk::DescriptorSetLayout> {
        Ok(self.handle())
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {}

    fn allocate_descriptor_sets(
        &self,
        _layout: vk::DescriptorSetLayout,
        _ty: vk::DescriptorType,
        count: u32,
    ) -> RenderResult<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
        let sets = (0..count).map(|_| self.handle()).collect();
        Ok((self.handle(), sets))
    }

    fn destroy_descriptor_pool(&self, _pool: vk::DescriptorPool) {}

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        _ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        self.record(Call::WriteBufferDescriptor { set, buffer, range });
    }

    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        _sampler: vk::Sampler,
        view: vk::ImageView,
    ) {
        self.record(Call::WriteImageDescriptor { set, view });
    }

    fn create_shader_module(&self, _code: &[u32]) -> RenderResult<vk::ShaderModule> {
        Ok(self.handle())
    }

    fn destroy_shader_module(&self, _module: vk::ShaderModule) {}

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
    ) -> RenderResult<vk::PipelineLayout> {
        Ok(self.handle())
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {}

    fn create_graphics_pipeline(&self, _desc: &GraphicsPipelineDesc) -> RenderResult<vk::Pipeline> {
        let pipeline = self.handle();
        self.record(Call::CreatePipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {}

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> RenderResult<vk::RenderPass> {
        let render_pass = self.handle();
        self.record(Call::CreateRenderPass(render_pass));
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {}

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _extent: vk::Extent2D,
        _attachments: &[vk::ImageView],
    ) -> RenderResult<vk::Framebuffer> {
        let framebuffer = self.handle();
        self.record(Call::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.record(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_swapchain(
        &self,
        _surface: vk::SurfaceKHR,
        window_extent: vk::Extent2D,
        _old_swapchain: vk::SwapchainKHR,
    ) -> RenderResult<SwapchainImages> {
        if let Some(error) = self.swapchain_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let stages = *self.swapchain_stages.lock().unwrap();
        let swapchain = self.handle();
        *self.next_image.lock().unwrap() = 0;
        self.record(Call::CreateSwapchain(swapchain));
        Ok(SwapchainImages {
            swapchain,
            format: vk::Format::B8G8R8A8_SRGB,
            extent: window_extent,
            views: (0..stages).map(|_| self.handle()).collect(),
        })
    }

    fn destroy_swapchain(&self, swapchain: &SwapchainImages) {
        self.record(Call::DestroySwapchain(swapchain.swapchain));
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome> {
        self.record(Call::Acquire(signal));
        if let Some(outcome) = self.acquire_script.lock().unwrap().pop_front() {
            return Ok(outcome);
        }
        let stages = u32::try_from(*self.swapchain_stages.lock().unwrap()).unwrap();
        let mut next = self.next_image.lock().unwrap();
        let image_index = *next;
        *next = (image_index + 1) % stages.max(1);
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> RenderResult<()> {
        self.record(Call::Submit {
            command_buffer,
            wait,
            signal,
            fence,
        });
        Ok(())
    }

    fn present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RenderResult<PresentOutcome> {
        self.record(Call::Present { image_index, wait });
        Ok(self
            .present_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn create_command_pool(&self) -> RenderResult<vk::CommandPool> {
        let pool = self.handle();
        self.record(Call::CreateCommandPool(pool));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.record(Call::DestroyCommandPool(pool));
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        _level: vk::CommandBufferLevel,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        self.record(Call::FreeCommandBuffers {
            pool,
            buffers: buffers.to_vec(),
        });
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
        _inherit: Option<(vk::RenderPass, u32)>,
    ) -> RenderResult<()> {
        self.record(Call::Begin(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        self.record(Call::End(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.record(Call::BeginRenderPass {
            command_buffer,
            framebuffer: begin.framebuffer,
        });
    }

    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer) {
        self.record(Call::NextSubpass(command_buffer));
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.record(Call::EndRenderPass(command_buffer));
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary: vk::CommandBuffer) {
        self.record(Call::Execute {
            command_buffer,
            secondary,
        });
    }

    fn cmd_transition_images(&self, command_buffer: vk::CommandBuffer, transitions: &[ImageTransition]) {
        self.record(Call::Transition {
            command_buffer,
            images: transitions.iter().map(|t| t.image).collect(),
        });
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(Call::SetViewport {
            command_buffer,
            rect: [viewport.x, viewport.y, viewport.width, viewport.height],
        });
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Call::SetScissor {
            command_buffer,
            rect: (
                scissor.offset.x,
                scissor.offset.y,
                scissor.extent.width,
                scissor.extent.height,
            ),
        });
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline {
            command_buffer,
            pipeline,
        });
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        self.record(Call::BindDescriptorSet {
            command_buffer,
            set_index,
            set,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffers(&self, command_buffer: vk::CommandBuffer, buffers: &[vk::Buffer]) {
        self.record(Call::BindVertexBuffers {
            command_buffer,
            buffers: buffers.to_vec(),
        });
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.record(Call::Draw {
            command_buffer,
            vertex_count,
            instance_count,
        });
    }
}
