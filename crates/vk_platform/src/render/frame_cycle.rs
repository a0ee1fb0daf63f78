//! Swapchain frame cycle
//!
//! Drives one frame end to end: wait for the frame slot's fence, acquire an
//! image, let the host update the render context, tick every multi-buffered
//! resource, record the render queue, submit and present. Out-of-date and
//! suboptimal swapchains are rebuilt here and never reported as errors.
//!
//! There are `stages - 1` frame slots, each with its own fence and
//! image-available semaphore, so the CPU runs at most `stages - 1` frames
//! ahead of the GPU. Render-finished semaphores belong to swapchain images.
//! The render passes a slot submitted stay referenced until that slot's fence
//! has been waited, so no secondary buffer is freed while still pending.

use std::sync::Arc;

use ash::vk;

use crate::core::config::RendererConfig;
use crate::render::command_pool::CommandPool;
use crate::render::context::RenderContext;
use crate::render::device::{AcquireOutcome, GpuDevice, PresentOutcome, SwapchainImages};
use crate::render::render_queue::QueuedPass;
use crate::render::resources::{Framebuffer, FramebufferFormat};
use crate::render::{RenderError, RenderResult};

/// Smallest stage count; leaves one frame slot in flight
const MIN_STAGES: usize = 2;

/// Framebuffer size reported by the surface for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceExtent {
    /// Framebuffer width in pixels
    pub width: u32,
    /// Framebuffer height in pixels
    pub height: u32,
    /// The surface changed size since the last frame
    pub just_resized: bool,
}

impl SurfaceExtent {
    /// Extent without a pending resize
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            just_resized: false,
        }
    }

    /// Mark the extent as freshly resized
    #[must_use]
    pub const fn resized(mut self) -> Self {
        self.just_resized = true;
        self
    }

    /// True when nothing can be presented
    pub const fn is_zero(self) -> bool {
        self.width == 0 || self.height == 0
    }

    const fn vk_extent(self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Submitted and queued for presentation
    Presented {
        /// The swapchain was rebuilt during this frame
        recreated: bool,
    },
    /// The swapchain was out of date; it has been rebuilt and nothing was submitted
    Aborted,
    /// The surface has zero size or the swapchain could not be rebuilt yet;
    /// nothing was submitted and the next frame tries again
    Skipped,
}

/// Swapchain plus everything sized by it
struct SwapchainState<D: GpuDevice> {
    device: Arc<D>,
    pool: Arc<CommandPool<D>>,
    images: SwapchainImages,
    framebuffer: Option<Arc<Framebuffer<D>>>,
    primaries: Vec<vk::CommandBuffer>,
    image_available: Vec<vk::Semaphore>,
    in_flight: Vec<vk::Fence>,
    render_finished: Vec<vk::Semaphore>,
    images_in_flight: Vec<Option<vk::Fence>>,
}

impl<D: GpuDevice> SwapchainState<D> {
    /// Takes ownership of `images`; they are destroyed if anything else fails
    fn new(
        pool: &Arc<CommandPool<D>>,
        images: SwapchainImages,
        format: &Arc<FramebufferFormat<D>>,
        frames_in_flight: usize,
    ) -> RenderResult<Self> {
        let device = pool.device().clone();
        let framebuffer = match Framebuffer::for_swapchain(device.clone(), format.clone(), &images) {
            Ok(framebuffer) => Arc::new(framebuffer),
            Err(e) => {
                device.destroy_swapchain(&images);
                return Err(e);
            }
        };
        let image_count = images.stage_count();
        let mut state = Self {
            device: device.clone(),
            pool: pool.clone(),
            images,
            framebuffer: Some(framebuffer),
            primaries: Vec::new(),
            image_available: Vec::with_capacity(frames_in_flight),
            in_flight: Vec::with_capacity(frames_in_flight),
            render_finished: Vec::with_capacity(image_count),
            images_in_flight: vec![None; image_count],
        };

        let count = u32::try_from(image_count)
            .map_err(|_| RenderError::SwapchainCreation("too many images".to_string()))?;
        state.primaries = pool.allocate(vk::CommandBufferLevel::PRIMARY, count)?;
        for _ in 0..frames_in_flight {
            state.image_available.push(device.create_semaphore()?);
            state.in_flight.push(device.create_fence(true)?);
        }
        for _ in 0..image_count {
            state.render_finished.push(device.create_semaphore()?);
        }
        Ok(state)
    }

    fn framebuffer(&self) -> RenderResult<&Arc<Framebuffer<D>>> {
        self.framebuffer.as_ref().ok_or(RenderError::SurfaceClosed)
    }
}

impl<D: GpuDevice> Drop for SwapchainState<D> {
    fn drop(&mut self) {
        self.pool.free(&self.primaries);
        for &semaphore in self.image_available.iter().chain(&self.render_finished) {
            self.device.destroy_semaphore(semaphore);
        }
        for &fence in &self.in_flight {
            self.device.destroy_fence(fence);
        }
        // framebuffers reference the swapchain views
        self.framebuffer.take();
        self.device.destroy_swapchain(&self.images);
    }
}

/// Per-surface frame loop state
pub struct FrameCycle<D: GpuDevice> {
    device: Arc<D>,
    surface: vk::SurfaceKHR,
    context: RenderContext<D>,
    swapchain: Option<SwapchainState<D>>,
    in_flight_passes: Vec<Vec<QueuedPass<D>>>,
    current_frame: usize,
    max_frames_in_flight: usize,
    needs_recreate: bool,
}

impl<D: GpuDevice> FrameCycle<D> {
    /// Build the swapchain for `surface` and a render context sized by it
    pub fn new(
        device: Arc<D>,
        surface: vk::SurfaceKHR,
        extent: SurfaceExtent,
        config: &RendererConfig,
    ) -> RenderResult<Self> {
        if extent.is_zero() {
            return Err(RenderError::ZeroSizedSurface);
        }
        let images = device.create_swapchain(surface, extent.vk_extent(), vk::SwapchainKHR::null())?;
        let stages = images.stage_count().max(MIN_STAGES);
        let format = match FramebufferFormat::for_surface(device.clone(), images.format) {
            Ok(format) => Arc::new(format),
            Err(e) => {
                device.destroy_swapchain(&images);
                return Err(e);
            }
        };
        let max_frames_in_flight = stages - 1;
        let context = match RenderContext::new(device.clone(), stages, format.clone(), config.clear_color) {
            Ok(context) => context,
            Err(e) => {
                device.destroy_swapchain(&images);
                return Err(e);
            }
        };
        let state = SwapchainState::new(context.command_pool(), images, &format, max_frames_in_flight)?;
        context.surface_target().replace(Some(state.framebuffer()?.clone()));

        log::info!(
            "Frame cycle ready: {}x{}, {} images, {} frames in flight",
            extent.width,
            extent.height,
            state.images.stage_count(),
            max_frames_in_flight
        );
        Ok(Self {
            device,
            surface,
            context,
            swapchain: Some(state),
            in_flight_passes: empty_slots(max_frames_in_flight),
            current_frame: 0,
            max_frames_in_flight,
            needs_recreate: false,
        })
    }

    /// Render context resources are created through
    pub const fn context(&self) -> &RenderContext<D> {
        &self.context
    }

    /// Mutable render context
    pub fn context_mut(&mut self) -> &mut RenderContext<D> {
        &mut self.context
    }

    /// Frame slot the next frame uses
    pub const fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of frame slots
    pub const fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Presentable images in the current swapchain
    pub fn image_count(&self) -> usize {
        self.swapchain
            .as_ref()
            .map_or(0, |state| state.images.stage_count())
    }

    /// Run one frame, calling `update` between acquire and submit
    pub fn run_frame<F>(&mut self, extent: SurfaceExtent, update: F) -> RenderResult<FrameOutcome>
    where
        F: FnOnce(&mut RenderContext<D>),
    {
        if extent.is_zero() {
            if extent.just_resized {
                self.needs_recreate = true;
            }
            return Ok(FrameOutcome::Skipped);
        }

        let mut recreated = false;
        if extent.just_resized || self.needs_recreate || self.swapchain.is_none() {
            if !self.try_recreate(extent)? {
                return Ok(FrameOutcome::Skipped);
            }
            recreated = true;
        }

        let frame = self.current_frame;
        let Some(state) = self.swapchain.as_mut() else {
            return Err(RenderError::SurfaceClosed);
        };
        let fence = state.in_flight[frame];
        let image_available = state.image_available[frame];
        self.device.wait_for_fence(fence)?;
        // everything this slot submitted last time has finished
        self.in_flight_passes[frame].clear();

        let (image_index, suboptimal) =
            match self.device.acquire_next_image(state.images.swapchain, image_available)? {
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                } => (image_index, suboptimal),
                AcquireOutcome::OutOfDate => {
                    log::debug!("Swapchain out of date on acquire");
                    return Ok(if self.try_recreate(extent)? {
                        FrameOutcome::Aborted
                    } else {
                        FrameOutcome::Skipped
                    });
                }
            };
        let image = image_index as usize;

        self.context.clear_queue();
        state.framebuffer()?.select(image)?;
        update(&mut self.context);
        self.context.tick()?;

        if let Some(previous) = state.images_in_flight[image] {
            if previous != fence {
                self.device.wait_for_fence(previous)?;
            }
        }
        state.images_in_flight[image] = Some(fence);
        self.device.reset_fence(fence)?;

        let primary = state.primaries[image];
        let render_finished = state.render_finished[image];
        self.context.queue().write(
            self.context.command_pool(),
            primary,
            self.context.clear_color(),
        )?;
        self.device
            .submit(primary, image_available, render_finished, fence)?;
        self.in_flight_passes[frame] = self.context.take_queue();
        let presented = self
            .device
            .present(state.images.swapchain, image_index, render_finished)?;

        self.current_frame = (frame + 1) % self.max_frames_in_flight;

        if suboptimal || presented != PresentOutcome::Presented {
            log::debug!("Swapchain needs rebuilding after present ({presented:?})");
            recreated |= self.try_recreate(extent)?;
        }
        Ok(FrameOutcome::Presented { recreated })
    }

    /// Rebuild the swapchain, deferring to a later frame on transient failures
    ///
    /// Returns whether a new swapchain is in place.
    fn try_recreate(&mut self, extent: SurfaceExtent) -> RenderResult<bool> {
        match self.recreate(extent) {
            Ok(()) => Ok(true),
            Err(e) if e.is_transient() => {
                log::debug!("Swapchain rebuild deferred: {e}");
                self.needs_recreate = true;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Tear down and rebuild the swapchain and everything sized by it
    fn recreate(&mut self, extent: SurfaceExtent) -> RenderResult<()> {
        self.needs_recreate = true;
        self.device.wait_idle()?;
        for passes in &mut self.in_flight_passes {
            passes.clear();
        }

        let old = self.swapchain.take();
        let old_handle = old
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |state| state.images.swapchain);
        let created = self
            .device
            .create_swapchain(self.surface, extent.vk_extent(), old_handle);
        self.context.surface_target().replace(None);
        drop(old);
        let images = created?;

        let mut format = self.context.get_surface_format();
        if format.surface_format() != Some(images.format) {
            log::debug!("Surface format changed to {:?}", images.format);
            format = match FramebufferFormat::for_surface(self.device.clone(), images.format) {
                Ok(format) => Arc::new(format),
                Err(e) => {
                    self.device.destroy_swapchain(&images);
                    return Err(e);
                }
            };
            self.context.set_surface_format(format.clone());
        }

        let stages = images.stage_count().max(MIN_STAGES);
        if stages != self.context.stages() {
            log::warn!(
                "Swapchain now has {stages} stages, resources keep {}",
                self.context.stages()
            );
        }
        let max_frames_in_flight = stages.min(self.context.stages()) - 1;
        let image_count = images.stage_count();
        let state = SwapchainState::new(self.context.command_pool(), images, &format, max_frames_in_flight)?;
        self.context
            .surface_target()
            .replace(Some(state.framebuffer()?.clone()));

        self.swapchain = Some(state);
        self.in_flight_passes = empty_slots(max_frames_in_flight);
        self.max_frames_in_flight = max_frames_in_flight;
        self.current_frame %= max_frames_in_flight;
        self.needs_recreate = false;
        log::info!(
            "Swapchain recreated: {}x{}, {image_count} images",
            extent.width,
            extent.height
        );
        Ok(())
    }
}

impl<D: GpuDevice> Drop for FrameCycle<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {e}");
        }
        self.in_flight_passes.clear();
        self.context.surface_target().replace(None);
        self.swapchain = None;
    }
}

fn empty_slots<D: GpuDevice>(frames_in_flight: usize) -> Vec<Vec<QueuedPass<D>>> {
    (0..frames_in_flight).map(|_| Vec::new()).collect()
}
