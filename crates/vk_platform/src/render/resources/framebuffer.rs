//! Framebuffer formats, framebuffers and render targets
//!
//! A [`FramebufferFormat`] owns the render pass. A [`Framebuffer`] is either
//! backed by the swapchain images or owns its own attachment images, one set
//! per stage. Offscreen attachments are sampled through [`FramebufferTexture`],
//! which always reads the set rendered most recently.

use std::sync::{Arc, Mutex, Weak};

use ash::vk;

use crate::foundation::sync::lock;
use crate::render::dependents::{Dependent, Dependents};
use crate::render::device::{
    DeviceImage, GpuDevice, ImageTransition, RenderPassDesc, SubpassLayout, SwapchainImages,
};
use crate::render::types::{
    AttachmentDescriptor, AttachmentType, Extents2D, RenderStageDescriptor, TextureFormat,
};
use crate::render::{RenderError, RenderResult};

fn invalid(message: impl Into<String>) -> RenderError {
    RenderError::InvalidOperation(message.into())
}

/// Attachments and render stages, compiled into a render pass
pub struct FramebufferFormat<D: GpuDevice> {
    device: Arc<D>,
    attachments: Vec<AttachmentDescriptor>,
    stages: Vec<RenderStageDescriptor>,
    surface_format: Option<vk::Format>,
    render_pass: vk::RenderPass,
}

impl<D: GpuDevice> FramebufferFormat<D> {
    /// Format for offscreen framebuffers
    pub fn new(
        device: Arc<D>,
        attachments: Vec<AttachmentDescriptor>,
        stages: Vec<RenderStageDescriptor>,
    ) -> RenderResult<Self> {
        validate(&attachments, &stages)?;
        let formats: Vec<_> = attachments.iter().map(|a| a.format.vk_format()).collect();
        let desc = render_pass_desc(&attachments, &formats, &stages, false);
        let render_pass = device.create_render_pass(&desc)?;
        Ok(Self {
            device,
            attachments,
            stages,
            surface_format: None,
            render_pass,
        })
    }

    /// Single colour stage presenting to a swapchain of `format`
    pub fn for_surface(device: Arc<D>, format: vk::Format) -> RenderResult<Self> {
        let attachments = vec![AttachmentDescriptor::color(TextureFormat::B8G8R8A8Srgb)];
        let stages = vec![RenderStageDescriptor {
            color_attachments: vec![0],
            ..RenderStageDescriptor::default()
        }];
        let desc = render_pass_desc(&attachments, &[format], &stages, true);
        let render_pass = device.create_render_pass(&desc)?;
        Ok(Self {
            device,
            attachments,
            stages,
            surface_format: Some(format),
            render_pass,
        })
    }

    /// Render pass handle
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Attachment descriptions
    pub fn attachments(&self) -> &[AttachmentDescriptor] {
        &self.attachments
    }

    /// Render stage at `index`
    pub fn stage(&self, index: u32) -> RenderResult<&RenderStageDescriptor> {
        self.stages
            .get(index as usize)
            .ok_or_else(|| invalid(format!("format has no render stage {index}")))
    }

    /// Number of render stages (subpasses)
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Swapchain colour format when this is the surface format
    pub const fn surface_format(&self) -> Option<vk::Format> {
        self.surface_format
    }

    /// One clear value per attachment
    pub fn clear_values(&self, clear_color: [f32; 4]) -> Vec<vk::ClearValue> {
        self.attachments
            .iter()
            .map(|attachment| match attachment.kind {
                AttachmentType::Color => vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: clear_color,
                    },
                },
                AttachmentType::DepthStencil => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            })
            .collect()
    }
}

impl<D: GpuDevice> Drop for FramebufferFormat<D> {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.render_pass);
    }
}

fn validate(
    attachments: &[AttachmentDescriptor],
    stages: &[RenderStageDescriptor],
) -> RenderResult<()> {
    if stages.is_empty() {
        return Err(invalid("framebuffer format needs at least one render stage"));
    }
    for attachment in attachments {
        let depth = attachment.format.is_depth_stencil();
        if depth != (attachment.kind == AttachmentType::DepthStencil) {
            return Err(invalid(format!(
                "{:?} attachment cannot use {:?}",
                attachment.kind, attachment.format
            )));
        }
    }
    for (index, stage) in stages.iter().enumerate() {
        for &color in &stage.color_attachments {
            match attachments.get(color as usize) {
                Some(a) if a.kind == AttachmentType::Color => {}
                _ => {
                    return Err(invalid(format!(
                        "stage {index}: attachment {color} is not a colour attachment"
                    )))
                }
            }
        }
        if let Some(depth) = stage.depth_stencil_attachment {
            match attachments.get(depth as usize) {
                Some(a) if a.kind == AttachmentType::DepthStencil => {}
                _ => {
                    return Err(invalid(format!(
                        "stage {index}: attachment {depth} is not a depth/stencil attachment"
                    )))
                }
            }
        }
        if let Some(&dependency) = stage.dependencies.iter().find(|&&d| d as usize >= index) {
            return Err(invalid(format!(
                "stage {index} can only depend on earlier stages, not {dependency}"
            )));
        }
    }
    Ok(())
}

fn attachment_layout(kind: AttachmentType) -> vk::ImageLayout {
    match kind {
        AttachmentType::Color => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        AttachmentType::DepthStencil => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }
}

fn render_pass_desc(
    attachments: &[AttachmentDescriptor],
    formats: &[vk::Format],
    stages: &[RenderStageDescriptor],
    present: bool,
) -> RenderPassDesc {
    let attachment_descs = attachments
        .iter()
        .zip(formats)
        .map(|(attachment, &format)| vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: if present {
                vk::ImageLayout::PRESENT_SRC_KHR
            } else {
                attachment_layout(attachment.kind)
            },
            ..Default::default()
        })
        .collect();

    let subpasses = stages
        .iter()
        .map(|stage| SubpassLayout {
            color_attachments: stage
                .color_attachments
                .iter()
                .map(|&attachment| vk::AttachmentReference {
                    attachment,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                })
                .collect(),
            depth_stencil_attachment: stage.depth_stencil_attachment.map(|attachment| {
                vk::AttachmentReference {
                    attachment,
                    layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                }
            }),
        })
        .collect();

    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let attachment_writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let mut dependencies = Vec::new();
    for (index, stage) in (0u32..).zip(stages) {
        dependencies.push(vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: index,
            src_stage_mask: attachment_stages,
            dst_stage_mask: attachment_stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: attachment_writes,
            ..Default::default()
        });
        for &source in &stage.dependencies {
            dependencies.push(vk::SubpassDependency {
                src_subpass: source,
                dst_subpass: index,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                src_access_mask: attachment_writes,
                dst_access_mask: vk::AccessFlags::INPUT_ATTACHMENT_READ
                    | vk::AccessFlags::SHADER_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            });
        }
    }

    RenderPassDesc {
        attachments: attachment_descs,
        subpasses,
        dependencies,
    }
}

struct OffscreenSlot<D: GpuDevice> {
    images: Vec<D::Image>,
    framebuffer: vk::Framebuffer,
}

enum Backing<D: GpuDevice> {
    Surface {
        framebuffers: Vec<vk::Framebuffer>,
    },
    Offscreen {
        slots: Vec<OffscreenSlot<D>>,
    },
}

/// Render target images plus the framebuffers over them
pub struct Framebuffer<D: GpuDevice> {
    device: Arc<D>,
    format: Arc<FramebufferFormat<D>>,
    extent: vk::Extent2D,
    backing: Backing<D>,
    write_index: Mutex<usize>,
}

impl<D: GpuDevice> Framebuffer<D> {
    /// One framebuffer per swapchain image
    pub fn for_swapchain(
        device: Arc<D>,
        format: Arc<FramebufferFormat<D>>,
        swapchain: &SwapchainImages,
    ) -> RenderResult<Self> {
        if format.surface_format().is_none() {
            return Err(invalid("swapchain framebuffers need the surface format"));
        }
        let mut framebuffers = Vec::with_capacity(swapchain.views.len());
        for &view in &swapchain.views {
            match device.create_framebuffer(format.render_pass(), swapchain.extent, &[view]) {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(e) => {
                    for framebuffer in framebuffers {
                        device.destroy_framebuffer(framebuffer);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            device,
            format,
            extent: swapchain.extent,
            backing: Backing::Surface { framebuffers },
            write_index: Mutex::new(0),
        })
    }

    /// Framebuffer with its own attachment images, `stages` sets of them
    pub fn offscreen(
        device: Arc<D>,
        format: Arc<FramebufferFormat<D>>,
        width: u32,
        height: u32,
        stages: usize,
    ) -> RenderResult<Self> {
        if format.surface_format().is_some() {
            return Err(invalid("the surface format cannot back an offscreen framebuffer"));
        }
        if width == 0 || height == 0 {
            return Err(invalid(format!("framebuffer size {width}x{height}")));
        }
        let extent = vk::Extent2D { width, height };
        let mut framebuffer = Self {
            device,
            format,
            extent,
            backing: Backing::Offscreen { slots: Vec::new() },
            write_index: Mutex::new(0),
        };
        for _ in 0..stages.max(1) {
            let slot = framebuffer.create_slot()?;
            if let Backing::Offscreen { slots } = &mut framebuffer.backing {
                slots.push(slot);
            }
        }
        Ok(framebuffer)
    }

    fn create_slot(&self) -> RenderResult<OffscreenSlot<D>> {
        let mut images = Vec::with_capacity(self.format.attachments().len());
        for attachment in self.format.attachments() {
            let (usage, aspect) = match attachment.kind {
                AttachmentType::Color => (
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                    vk::ImageAspectFlags::COLOR,
                ),
                AttachmentType::DepthStencil => (
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                    vk::ImageAspectFlags::DEPTH,
                ),
            };
            images.push(self.device.create_attachment_image(
                self.extent,
                attachment.format.vk_format(),
                usage,
                aspect,
            )?);
        }
        let views: Vec<_> = images.iter().map(DeviceImage::view).collect();
        let framebuffer =
            self.device
                .create_framebuffer(self.format.render_pass(), self.extent, &views)?;
        Ok(OffscreenSlot {
            images,
            framebuffer,
        })
    }

    /// Format this framebuffer was created with
    pub const fn format(&self) -> &Arc<FramebufferFormat<D>> {
        &self.format
    }

    /// Size in pixels
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// True for swapchain-backed framebuffers
    pub const fn is_surface(&self) -> bool {
        matches!(self.backing, Backing::Surface { .. })
    }

    /// Number of image sets
    pub fn stage_count(&self) -> usize {
        match &self.backing {
            Backing::Surface { framebuffers } => framebuffers.len(),
            Backing::Offscreen { slots } => slots.len(),
        }
    }

    /// Framebuffer the next render pass writes
    pub fn current(&self) -> vk::Framebuffer {
        let index = *lock(&self.write_index);
        match &self.backing {
            Backing::Surface { framebuffers } => framebuffers[index],
            Backing::Offscreen { slots } => slots[index].framebuffer,
        }
    }

    /// Render into the swapchain image `image_index` next
    pub fn select(&self, image_index: usize) -> RenderResult<()> {
        if !self.is_surface() {
            return Err(invalid("only swapchain framebuffers select an image"));
        }
        if image_index >= self.stage_count() {
            return Err(invalid(format!("swapchain image {image_index} out of range")));
        }
        *lock(&self.write_index) = image_index;
        Ok(())
    }

    /// Move offscreen rendering to the next image set
    pub fn advance(&self) {
        if let Backing::Offscreen { slots } = &self.backing {
            let mut index = lock(&self.write_index);
            *index = (*index + 1) % slots.len();
        }
    }

    /// Layout changes making the current offscreen images sampleable
    pub fn post_render_transitions(&self) -> Vec<ImageTransition> {
        let Backing::Offscreen { slots } = &self.backing else {
            return Vec::new();
        };
        let slot = &slots[*lock(&self.write_index)];
        self.format
            .attachments()
            .iter()
            .zip(&slot.images)
            .map(|(attachment, image)| ImageTransition {
                image: image.image(),
                aspect: match attachment.kind {
                    AttachmentType::Color => vk::ImageAspectFlags::COLOR,
                    AttachmentType::DepthStencil => {
                        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
                    }
                },
                old_layout: attachment_layout(attachment.kind),
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect()
    }

    /// View of `attachment` in the most recently rendered image set
    pub fn read_view(&self, attachment: usize) -> RenderResult<vk::ImageView> {
        let Backing::Offscreen { slots } = &self.backing else {
            return Err(invalid("swapchain framebuffers have no textures"));
        };
        let write_index = *lock(&self.write_index);
        let read_index = (write_index + slots.len() - 1) % slots.len();
        slots[read_index]
            .images
            .get(attachment)
            .map(DeviceImage::view)
            .ok_or_else(|| invalid(format!("framebuffer has no attachment {attachment}")))
    }

    /// Sampleable view of one attachment
    pub fn texture(self: &Arc<Self>, attachment: usize) -> RenderResult<FramebufferTexture<D>> {
        self.read_view(attachment)?;
        Ok(FramebufferTexture {
            framebuffer: self.clone(),
            attachment,
        })
    }
}

impl<D: GpuDevice> Drop for Framebuffer<D> {
    fn drop(&mut self) {
        match &self.backing {
            Backing::Surface { framebuffers } => {
                for &framebuffer in framebuffers {
                    self.device.destroy_framebuffer(framebuffer);
                }
            }
            Backing::Offscreen { slots } => {
                for slot in slots {
                    self.device.destroy_framebuffer(slot.framebuffer);
                }
            }
        }
    }
}

/// One attachment of an offscreen framebuffer, sampled as a texture
pub struct FramebufferTexture<D: GpuDevice> {
    framebuffer: Arc<Framebuffer<D>>,
    attachment: usize,
}

impl<D: GpuDevice> Clone for FramebufferTexture<D> {
    fn clone(&self) -> Self {
        Self {
            framebuffer: self.framebuffer.clone(),
            attachment: self.attachment,
        }
    }
}

impl<D: GpuDevice> FramebufferTexture<D> {
    /// View of the most recently rendered image
    pub fn view(&self) -> RenderResult<vk::ImageView> {
        self.framebuffer.read_view(self.attachment)
    }

    /// Owning framebuffer
    pub const fn framebuffer(&self) -> &Arc<Framebuffer<D>> {
        &self.framebuffer
    }

    /// Attachment index
    pub const fn attachment(&self) -> usize {
        self.attachment
    }
}

struct SurfaceShared<D: GpuDevice> {
    framebuffer: Mutex<Option<Arc<Framebuffer<D>>>>,
    dependents: Dependents,
}

/// The swapchain framebuffer of a render context
///
/// Handed out once and kept valid across swapchain recreation; resolves to
/// nothing after the context is gone. Command buffers recorded against it are
/// notified whenever the framebuffer is replaced.
pub struct SurfaceTarget<D: GpuDevice>(Arc<SurfaceShared<D>>);

impl<D: GpuDevice> Clone for SurfaceTarget<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D: GpuDevice> SurfaceTarget<D> {
    /// Target with no framebuffer yet
    pub fn new() -> Self {
        Self(Arc::new(SurfaceShared {
            framebuffer: Mutex::new(None),
            dependents: Dependents::new(),
        }))
    }

    /// Swap in a new swapchain framebuffer, returning the previous one
    pub fn replace(&self, framebuffer: Option<Arc<Framebuffer<D>>>) -> Option<Arc<Framebuffer<D>>> {
        let previous = std::mem::replace(&mut *lock(&self.0.framebuffer), framebuffer);
        self.0.dependents.notify();
        previous
    }

    /// Current swapchain framebuffer
    pub fn framebuffer(&self) -> RenderResult<Arc<Framebuffer<D>>> {
        lock(&self.0.framebuffer)
            .clone()
            .ok_or(RenderError::SurfaceClosed)
    }

    pub(crate) fn register_dependent(&self, dependent: Weak<dyn Dependent>) {
        self.0.dependents.register(dependent);
    }
}

impl<D: GpuDevice> Default for SurfaceTarget<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a command buffer's output goes
pub enum RenderTarget<D: GpuDevice> {
    /// Offscreen framebuffer
    Framebuffer(Arc<Framebuffer<D>>),
    /// Current swapchain image
    Surface(SurfaceTarget<D>),
}

impl<D: GpuDevice> Clone for RenderTarget<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Framebuffer(framebuffer) => Self::Framebuffer(framebuffer.clone()),
            Self::Surface(surface) => Self::Surface(surface.clone()),
        }
    }
}

impl<D: GpuDevice> RenderTarget<D> {
    /// Framebuffer to render into now
    pub fn framebuffer(&self) -> RenderResult<Arc<Framebuffer<D>>> {
        match self {
            Self::Framebuffer(framebuffer) => Ok(framebuffer.clone()),
            Self::Surface(surface) => surface.framebuffer(),
        }
    }

    /// Full-size rectangle of the target
    pub fn extents(&self) -> RenderResult<Extents2D> {
        let extent = self.framebuffer()?.extent();
        Ok(Extents2D::sized(extent.width, extent.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{Call, MockDevice};

    fn color_and_depth(device: &Arc<MockDevice>) -> Arc<FramebufferFormat<MockDevice>> {
        Arc::new(
            FramebufferFormat::new(
                device.clone(),
                vec![
                    AttachmentDescriptor::color(TextureFormat::R8G8B8A8Srgb),
                    AttachmentDescriptor::depth_stencil(TextureFormat::D32SfloatS8Uint),
                ],
                vec![RenderStageDescriptor {
                    color_attachments: vec![0],
                    depth_stencil_attachment: Some(1),
                    dependencies: Vec::new(),
                }],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_format_validation() {
        let device = MockDevice::new();
        let color = AttachmentDescriptor::color(TextureFormat::R8G8B8A8Srgb);
        let stage = |colors: Vec<u32>, deps: Vec<u32>| RenderStageDescriptor {
            color_attachments: colors,
            depth_stencil_attachment: None,
            dependencies: deps,
        };

        assert!(FramebufferFormat::new(device.clone(), vec![color], Vec::new()).is_err());
        assert!(FramebufferFormat::new(device.clone(), vec![color], vec![stage(vec![1], vec![])]).is_err());
        assert!(FramebufferFormat::new(
            device.clone(),
            vec![AttachmentDescriptor::color(TextureFormat::D32SfloatS8Uint)],
            vec![stage(vec![0], vec![])]
        )
        .is_err());
        assert!(FramebufferFormat::new(
            device.clone(),
            vec![color],
            vec![stage(vec![0], vec![0])]
        )
        .is_err());
        assert!(FramebufferFormat::new(
            device,
            vec![color],
            vec![stage(vec![0], vec![]), stage(vec![0], vec![0])]
        )
        .is_ok());
    }

    #[test]
    fn test_render_pass_layouts() {
        let attachments = [
            AttachmentDescriptor::color(TextureFormat::R8G8B8A8Srgb),
            AttachmentDescriptor::depth_stencil(TextureFormat::D32SfloatS8Uint),
        ];
        let formats: Vec<_> = attachments.iter().map(|a| a.format.vk_format()).collect();
        let stages = [
            RenderStageDescriptor {
                color_attachments: vec![0],
                depth_stencil_attachment: Some(1),
                dependencies: Vec::new(),
            },
            RenderStageDescriptor {
                color_attachments: vec![0],
                depth_stencil_attachment: None,
                dependencies: vec![0],
            },
        ];

        let desc = render_pass_desc(&attachments, &formats, &stages, false);

        assert_eq!(desc.attachments[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(
            desc.attachments[1].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert!(desc
            .attachments
            .iter()
            .all(|a| a.load_op == vk::AttachmentLoadOp::CLEAR));
        assert_eq!(desc.subpasses.len(), 2);
        assert!(desc.subpasses[0].depth_stencil_attachment.is_some());
        assert_eq!(desc.dependencies.len(), 3);
        assert_eq!(desc.dependencies[2].src_subpass, 0);
        assert_eq!(desc.dependencies[2].dst_subpass, 1);

        let present = render_pass_desc(&attachments[..1], &formats[..1], &stages[..1], true);
        assert_eq!(present.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_clear_values_follow_attachment_kind() {
        let device = MockDevice::new();
        let format = color_and_depth(&device);
        let values = format.clear_values([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(values.len(), 2);
        // SAFETY: clear_values writes `color` for colour and `depth_stencil` for depth
        let (color, depth) = unsafe { (values[0].color.float32, values[1].depth_stencil) };
        approx::assert_relative_eq!(color[2], 0.3);
        approx::assert_relative_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
    }

    #[test]
    fn test_offscreen_write_and_read_slots() {
        let device = MockDevice::new();
        let framebuffer =
            Arc::new(Framebuffer::offscreen(device.clone(), color_and_depth(&device), 64, 32, 3).unwrap());
        assert_eq!(device.count(|c| matches!(c, Call::CreateFramebuffer(_))), 3);
        let texture = framebuffer.texture(0).unwrap();
        assert!(framebuffer.texture(2).is_err());

        let first = framebuffer.current();
        let last_read = texture.view().unwrap();
        framebuffer.advance();
        let rendered_view = texture.view().unwrap();

        assert_ne!(framebuffer.current(), first);
        assert_ne!(rendered_view, last_read);
        assert_eq!(framebuffer.post_render_transitions().len(), 2);
        framebuffer.advance();
        framebuffer.advance();
        assert_eq!(framebuffer.current(), first);
    }

    #[test]
    fn test_zero_size_offscreen_rejected() {
        let device = MockDevice::new();
        assert!(Framebuffer::offscreen(device.clone(), color_and_depth(&device), 0, 32, 2).is_err());
    }

    #[test]
    fn test_swapchain_framebuffer_select() {
        let device = MockDevice::new();
        let format = Arc::new(FramebufferFormat::for_surface(device.clone(), vk::Format::B8G8R8A8_SRGB).unwrap());
        let swapchain = device
            .create_swapchain(vk::SurfaceKHR::null(), vk::Extent2D { width: 8, height: 8 }, vk::SwapchainKHR::null())
            .unwrap();
        let framebuffer = Framebuffer::for_swapchain(device.clone(), format.clone(), &swapchain).unwrap();

        let first = framebuffer.current();
        framebuffer.select(2).unwrap();
        assert_ne!(framebuffer.current(), first);
        framebuffer.advance();
        framebuffer.select(0).unwrap();
        assert_eq!(framebuffer.current(), first);
        assert!(framebuffer.select(3).is_err());
        assert!(framebuffer.post_render_transitions().is_empty());
        assert!(Framebuffer::offscreen(device, format, 8, 8, 2).is_err());
    }

    #[test]
    fn test_surface_target_follows_replacement() {
        let device = MockDevice::new();
        let format = Arc::new(FramebufferFormat::for_surface(device.clone(), vk::Format::B8G8R8A8_SRGB).unwrap());
        let swapchain = device
            .create_swapchain(vk::SurfaceKHR::null(), vk::Extent2D { width: 8, height: 8 }, vk::SwapchainKHR::null())
            .unwrap();
        let target = SurfaceTarget::new();
        let render_target = RenderTarget::Surface(target.clone());
        assert!(matches!(render_target.framebuffer(), Err(RenderError::SurfaceClosed)));

        target.replace(Some(Arc::new(
            Framebuffer::for_swapchain(device, format, &swapchain).unwrap(),
        )));

        assert_eq!(render_target.extents().unwrap().width, 8);
    }
}
