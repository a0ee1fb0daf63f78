//! Logical device implementing [`GpuDevice`] with `ash`

use std::collections::HashSet;
use std::ffi::CStr;
use std::sync::{Arc, Mutex};

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};

use super::instance::VulkanInstance;
use super::memory::{self, layout_barrier, whole_image};
use super::swapchain::SwapchainSupport;
use crate::core::config::{PresentModePreference, RendererConfig};
use crate::foundation::sync::lock;
use crate::render::device::{
    AcquireOutcome, DeviceBuffer, DeviceImage, DeviceLimits, GpuDevice, GraphicsPipelineDesc,
    ImageTransition, PresentOutcome, RenderPassBegin, RenderPassDesc, SamplerDesc,
    SwapchainImages,
};
use crate::render::{RenderError, RenderResult};

const ENTRY_POINT: &CStr = c"main";
const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Physical device selection and capabilities
struct PhysicalDeviceInfo {
    device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    graphics_family: u32,
    present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Discrete GPUs first, otherwise the first device that can present to `surface`
    fn select(instance: &VulkanInstance, surface: vk::SurfaceKHR) -> RenderResult<Self> {
        let devices = unsafe { instance.instance().enumerate_physical_devices() }?;
        let mut suitable: Vec<Self> = devices
            .into_iter()
            .filter_map(|device| match Self::evaluate(instance, device, surface) {
                Ok(info) => info,
                Err(e) => {
                    log::debug!("Skipping physical device: {e}");
                    None
                }
            })
            .collect();
        suitable.sort_by_key(|info| info.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU);
        let selected = suitable.into_iter().next().ok_or(RenderError::NoSuitableDevice)?;
        log::info!("Selected GPU: {}", selected.name());
        Ok(selected)
    }

    fn evaluate(
        instance: &VulkanInstance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Option<Self>> {
        let raw = instance.instance();
        let properties = unsafe { raw.get_physical_device_properties(device) };
        let features = unsafe { raw.get_physical_device_features(device) };
        let queue_families = unsafe { raw.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in (0u32..).zip(&queue_families) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }
            let present_support = unsafe {
                instance
                    .surface_loader()
                    .get_physical_device_surface_support(device, index, surface)
            }?;
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }
            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }
        let (Some(graphics_family), Some(present_family)) = (graphics_family, present_family) else {
            return Ok(None);
        };

        let extensions = unsafe { raw.enumerate_device_extension_properties(device) }?;
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Ok(None);
        }

        Ok(Some(Self {
            device,
            properties,
            features,
            graphics_family,
            present_family,
        }))
    }

    fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Host-visible buffer with dedicated memory
pub struct VulkanBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl DeviceBuffer for VulkanBuffer {
    fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Device-local image with a view over all of it
pub struct VulkanImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl DeviceImage for VulkanImage {
    fn image(&self) -> vk::Image {
        self.image
    }

    fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

const fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Logical device, queues, command pool and pipeline cache
///
/// Shared by every surface the platform opens. Queue submission is serialised
/// internally. Render contexts record from command pools of their own; the
/// device pool only backs one-off uploads.
pub struct VulkanDevice {
    instance: Arc<VulkanInstance>,
    physical: PhysicalDeviceInfo,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_lock: Mutex<()>,
    transfer_pool: Mutex<vk::CommandPool>,
    pipeline_cache: vk::PipelineCache,
    swapchain_loader: SwapchainLoader,
    present_mode: PresentModePreference,
    fence_timeout: u64,
}

impl VulkanDevice {
    /// Pick a physical device able to present to `surface` and open it
    pub fn new(
        instance: Arc<VulkanInstance>,
        surface: vk::SurfaceKHR,
        config: &RendererConfig,
    ) -> RenderResult<Self> {
        let physical = PhysicalDeviceInfo::select(&instance, surface)?;
        let memory_properties = unsafe {
            instance
                .instance()
                .get_physical_device_memory_properties(physical.device)
        };
        let device = Self::create_logical_device(instance.instance(), &physical)?;

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance.instance(), &device);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical.graphics_family);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };
        let pipeline_cache =
            match unsafe { device.create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None) } {
                Ok(cache) => cache,
                Err(e) => {
                    unsafe {
                        device.destroy_command_pool(command_pool, None);
                        device.destroy_device(None);
                    }
                    return Err(e.into());
                }
            };

        log::debug!(
            "Logical device ready (graphics family {}, present family {})",
            physical.graphics_family,
            physical.present_family
        );
        Ok(Self {
            instance,
            physical,
            memory_properties,
            device,
            graphics_queue,
            present_queue,
            queue_lock: Mutex::new(()),
            transfer_pool: Mutex::new(command_pool),
            pipeline_cache,
            swapchain_loader,
            present_mode: config.preferred_present_mode,
            fence_timeout: config.fence_timeout(),
        })
    }

    fn create_logical_device(instance: &Instance, physical: &PhysicalDeviceInfo) -> RenderResult<Device> {
        let unique_families: HashSet<u32> = [physical.graphics_family, physical.present_family]
            .into_iter()
            .collect();
        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = [SwapchainLoader::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical.features.sampler_anisotropy == vk::TRUE)
            .wide_lines(physical.features.wide_lines == vk::TRUE)
            .fill_mode_non_solid(physical.features.fill_mode_non_solid == vk::TRUE)
            .build();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        Ok(unsafe { instance.create_device(physical.device, &create_info, None) }?)
    }

    /// Instance the device was created from
    pub const fn instance(&self) -> &Arc<VulkanInstance> {
        &self.instance
    }

    /// Name of the physical device
    pub fn name(&self) -> String {
        self.physical.name()
    }

    /// Whether the device's present queue can present to `surface`
    pub fn supports_surface(&self, surface: vk::SurfaceKHR) -> RenderResult<bool> {
        Ok(unsafe {
            self.instance.surface_loader().get_physical_device_surface_support(
                self.physical.device,
                self.physical.present_family,
                surface,
            )
        }?)
    }

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        view_aspect: vk::ImageAspectFlags,
    ) -> RenderResult<VulkanImage> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let image = unsafe { self.device.create_image(&image_info, None) }?;
        let mut owned = VulkanImage {
            device: self.device.clone(),
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
        };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        owned.memory = memory::allocate(
            &self.device,
            &self.memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        unsafe { self.device.bind_image_memory(image, owned.memory, 0) }?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(whole_image(view_aspect));
        owned.view = unsafe { self.device.create_image_view(&view_info, None) }?;
        Ok(owned)
    }

    /// Record and run a one-off command buffer, waiting for it to finish
    fn immediate<F>(&self, record: F) -> RenderResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = lock(&self.transfer_pool);
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(*pool)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }?;
        let command_buffer = buffers[0];

        let result = (|| -> RenderResult<()> {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }?;
            record(command_buffer);
            unsafe { self.device.end_command_buffer(command_buffer) }?;

            let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
            let _queue = lock(&self.queue_lock);
            unsafe {
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())?;
                self.device.queue_wait_idle(self.graphics_queue)?;
            }
            Ok(())
        })();

        unsafe { self.device.free_command_buffers(*pool, &buffers) };
        result
    }

    fn transition_now(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        dst_stage: vk::PipelineStageFlags,
    ) -> RenderResult<()> {
        self.immediate(|command_buffer| {
            let barrier = layout_barrier(
                image,
                aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::SHADER_READ,
            );
            unsafe {
                self.device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
        })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle: {e:?}");
            }
            self.device.destroy_pipeline_cache(self.pipeline_cache, None);
            self.device.destroy_command_pool(*lock(&self.transfer_pool), None);
            self.device.destroy_device(None);
        }
        log::debug!("Logical device destroyed");
    }
}

impl GpuDevice for VulkanDevice {
    type Buffer = VulkanBuffer;
    type Image = VulkanImage;

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            min_uniform_buffer_offset_alignment: self
                .physical
                .properties
                .limits
                .min_uniform_buffer_offset_alignment,
        }
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        Ok(unsafe { self.device.create_fence(&info, None) }?)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        Ok(unsafe {
            self.device
                .wait_for_fences(&[fence], true, self.fence_timeout)
        }?)
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        Ok(unsafe { self.device.reset_fences(&[fence]) }?)
    }

    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        Ok(unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }?)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn wait_idle(&self) -> RenderResult<()> {
        Ok(unsafe { self.device.device_wait_idle() }?)
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> RenderResult<VulkanBuffer> {
        let (buffer, memory) =
            memory::create_buffer(&self.device, &self.memory_properties, size, usage, HOST_VISIBLE)?;
        Ok(VulkanBuffer {
            device: self.device.clone(),
            buffer,
            memory,
            size,
        })
    }

    fn write_buffer(&self, buffer: &VulkanBuffer, data: &[u8]) -> RenderResult<()> {
        if data.len() as vk::DeviceSize > buffer.size {
            return Err(RenderError::InvalidOperation(format!(
                "{} bytes do not fit a {}-byte buffer",
                data.len(),
                buffer.size
            )));
        }
        memory::write_mapped(&self.device, buffer.memory, data)
    }

    fn create_texture_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        pixels: &[u8],
    ) -> RenderResult<VulkanImage> {
        let staging = self.create_buffer(
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        self.write_buffer(&staging, pixels)?;

        let extent = vk::Extent2D { width, height };
        let image = self.create_image(
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        self.immediate(|command_buffer| {
            let to_transfer = layout_barrier(
                image.image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            );
            let region = vk::BufferImageCopy::builder()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                })
                .build();
            let to_shader = layout_barrier(
                image.image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            );
            unsafe {
                self.device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                self.device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                self.device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            }
        })?;
        Ok(image)
    }

    fn create_attachment_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RenderResult<VulkanImage> {
        let image = self.create_image(extent, format, usage | vk::ImageUsageFlags::SAMPLED, aspect)?;
        let layout_aspect = if has_stencil(format) {
            aspect | vk::ImageAspectFlags::STENCIL
        } else {
            aspect
        };
        self.transition_now(image.image, layout_aspect, vk::PipelineStageFlags::FRAGMENT_SHADER)?;
        Ok(image)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> RenderResult<vk::Sampler> {
        let supported = self.physical.features.sampler_anisotropy == vk::TRUE;
        let max_anisotropy = desc
            .max_anisotropy
            .filter(|_| supported)
            .map(|a| a.min(self.physical.properties.limits.max_sampler_anisotropy));
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(max_anisotropy.is_some())
            .max_anisotropy(max_anisotropy.unwrap_or(1.0))
            .border_color(desc.border_color)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);
        Ok(unsafe { self.device.create_sampler(&info, None) }?)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_descriptor_set_layout(
        &self,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stages)
            .build()];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&info, None) }?)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_sets(
        &self,
        layout: vk::DescriptorSetLayout,
        ty: vk::DescriptorType,
        count: u32,
    ) -> RenderResult<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty,
            descriptor_count: count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(count);
        let pool = unsafe { self.device.create_descriptor_pool(&pool_info, None) }?;

        let layouts = vec![layout; count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        match unsafe { self.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok((pool, sets)),
            Err(e) => {
                unsafe { self.device.destroy_descriptor_pool(pool, None) };
                Err(e.into())
            }
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(ty)
            .buffer_info(&buffer_info)
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        sampler: vk::Sampler,
        view: vk::ImageView,
    ) {
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn create_shader_module(&self, code: &[u32]) -> RenderResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        Ok(unsafe { self.device.create_shader_module(&info, None) }?)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> RenderResult<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        Ok(unsafe { self.device.create_pipeline_layout(&info, None) }?)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> RenderResult<vk::Pipeline> {
        let stages: Vec<_> = desc
            .stages
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage)
                    .module(module)
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let raster = desc.rasterization;
        let (depth_bias, bias_constant, bias_clamp, bias_slope) = raster.depth_bias;
        let line_width = if self.physical.features.wide_lines == vk::TRUE {
            raster.line_width
        } else {
            1.0
        };
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(raster.discard)
            .polygon_mode(raster.polygon_mode)
            .line_width(line_width)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(depth_bias)
            .depth_bias_constant_factor(bias_constant)
            .depth_bias_clamp(bias_clamp)
            .depth_bias_slope_factor(bias_slope);
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let ds = desc.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(ds.depth_test)
            .depth_write_enable(ds.depth_write)
            .depth_compare_op(ds.depth_compare)
            .stencil_test_enable(ds.stencil_test)
            .front(ds.front)
            .back(ds.back);
        let color_blending =
            vk::PipelineColorBlendStateCreateInfo::builder().attachments(&desc.blend_attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(self.pipeline_cache, &[info], None)
        }
        .map_err(|(_, e)| RenderError::from(e))?;
        pipelines.into_iter().next().ok_or_else(|| {
            RenderError::ResourceCreationFailed("driver returned no pipeline".to_string())
        })
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RenderResult<vk::RenderPass> {
        let subpasses: Vec<_> = desc
            .subpasses
            .iter()
            .map(|subpass| {
                let mut builder = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&subpass.color_attachments);
                if let Some(depth) = subpass.depth_stencil_attachment.as_ref() {
                    builder = builder.depth_stencil_attachment(depth);
                }
                builder.build()
            })
            .collect();
        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&desc.attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);
        Ok(unsafe { self.device.create_render_pass(&info, None) }?)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        attachments: &[vk::ImageView],
    ) -> RenderResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        Ok(unsafe { self.device.create_framebuffer(&info, None) }?)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_swapchain(
        &self,
        surface: vk::SurfaceKHR,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> RenderResult<SwapchainImages> {
        let support =
            SwapchainSupport::query(self.instance.surface_loader(), self.physical.device, surface)?;
        let format = support.choose_format()?;
        let extent = support.choose_extent(window_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::ZeroSizedSurface);
        }
        let present_mode = support.choose_present_mode(self.present_mode);
        let image_count = support.choose_image_count();

        let families = [self.physical.graphics_family, self.physical.present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        create_info = if families[0] == families[1] {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        };

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| RenderError::SwapchainCreation(format!("{e:?}")))?;
        let mut images = SwapchainImages {
            swapchain,
            format: format.format,
            extent,
            views: Vec::new(),
        };
        let raw_images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(raw_images) => raw_images,
            Err(e) => {
                self.destroy_swapchain(&images);
                return Err(e.into());
            }
        };
        for image in raw_images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(whole_image(vk::ImageAspectFlags::COLOR));
            match unsafe { self.device.create_image_view(&view_info, None) } {
                Ok(view) => images.views.push(view),
                Err(e) => {
                    self.destroy_swapchain(&images);
                    return Err(e.into());
                }
            }
        }

        log::debug!(
            "Swapchain created: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            images.views.len(),
            present_mode
        );
        Ok(images)
    }

    fn destroy_swapchain(&self, swapchain: &SwapchainImages) {
        unsafe {
            for &view in &swapchain.views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(swapchain.swapchain, None);
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> RenderResult<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        let _queue = lock(&self.queue_lock);
        Ok(unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
        }?)
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RenderResult<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result = {
            let _queue = lock(&self.queue_lock);
            unsafe {
                self.swapchain_loader
                    .queue_present(self.present_queue, &present_info)
            }
        };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn create_command_pool(&self) -> RenderResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.physical.graphics_family);
        Ok(unsafe { self.device.create_command_pool(&info, None) }?)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(count);
        Ok(unsafe { self.device.allocate_command_buffers(&info) }?)
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) };
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
        inherit: Option<(vk::RenderPass, u32)>,
    ) -> RenderResult<()> {
        let inheritance = inherit.map(|(render_pass, subpass)| {
            vk::CommandBufferInheritanceInfo::builder()
                .render_pass(render_pass)
                .subpass(subpass)
                .build()
        });
        let mut begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        if let Some(inheritance) = inheritance.as_ref() {
            begin_info = begin_info.inheritance_info(inheritance);
        }
        Ok(unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }?)
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        Ok(unsafe { self.device.end_command_buffer(command_buffer) }?)
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(&begin.clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(
                command_buffer,
                &info,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
        }
    }

    fn cmd_next_subpass(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_next_subpass(command_buffer, vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary: vk::CommandBuffer) {
        unsafe { self.device.cmd_execute_commands(command_buffer, &[secondary]) };
    }

    fn cmd_transition_images(&self, command_buffer: vk::CommandBuffer, transitions: &[ImageTransition]) {
        let barriers: Vec<_> = transitions
            .iter()
            .map(|t| {
                let src_access = if t.aspect.contains(vk::ImageAspectFlags::COLOR) {
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                } else {
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                };
                layout_barrier(
                    t.image,
                    t.aspect,
                    t.old_layout,
                    t.new_layout,
                    src_access,
                    vk::AccessFlags::SHADER_READ,
                )
            })
            .collect();
        unsafe {
            self.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            );
        }
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(command_buffer, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(command_buffer, 0, &[scissor]) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                dynamic_offsets,
            );
        }
    }

    fn cmd_bind_vertex_buffers(&self, command_buffer: vk::CommandBuffer, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, buffers, &offsets);
        }
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .cmd_draw(command_buffer, vertex_count, instance_count, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stencil_formats() {
        assert!(has_stencil(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil(vk::Format::D32_SFLOAT));
        assert!(!has_stencil(vk::Format::B8G8R8A8_SRGB));
    }

    #[test]
    fn test_host_visible_flags() {
        assert!(HOST_VISIBLE.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(HOST_VISIBLE.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert!(!HOST_VISIBLE.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }
}
