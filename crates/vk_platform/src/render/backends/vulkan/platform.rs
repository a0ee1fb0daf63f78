//! Platform composition root
//!
//! One per process in practice, but constructed explicitly and passed to every
//! surface that needs a device.

use std::sync::{Arc, Mutex};

use ash::vk;

use super::device::VulkanDevice;
use super::instance::VulkanInstance;
use crate::core::config::RendererConfig;
use crate::foundation::sync::lock;
use crate::render::{RenderError, RenderResult};

/// Vulkan instance plus the device shared by every surface
pub struct VulkanPlatform {
    instance: Arc<VulkanInstance>,
    config: RendererConfig,
    device: Mutex<Option<Arc<VulkanDevice>>>,
}

impl VulkanPlatform {
    /// Create the Vulkan instance
    ///
    /// The device is created lazily by the first surface that asks for one.
    pub fn new(config: RendererConfig) -> RenderResult<Self> {
        config.validate().map_err(RenderError::InitializationFailed)?;
        let glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| RenderError::InitializationFailed(format!("Failed to initialize GLFW: {e:?}")))?;
        if !glfw.vulkan_supported() {
            return Err(RenderError::InitializationFailed(
                "GLFW found no Vulkan loader".to_string(),
            ));
        }
        let instance = Arc::new(VulkanInstance::new(&glfw, &config)?);
        Ok(Self {
            instance,
            config,
            device: Mutex::new(None),
        })
    }

    /// Vulkan instance
    pub const fn instance(&self) -> &Arc<VulkanInstance> {
        &self.instance
    }

    /// Renderer settings every surface inherits
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The shared device, once a surface has created it
    pub fn shared_device(&self) -> Option<Arc<VulkanDevice>> {
        lock(&self.device).clone()
    }

    /// Device for a newly created surface
    ///
    /// The first surface picks the physical device. Later surfaces reuse it when
    /// it can present to them; otherwise they get [`RenderError::IncompatibleDevice`],
    /// or a device of their own when `fallback` is set.
    pub fn device_for_surface(
        &self,
        surface: vk::SurfaceKHR,
        fallback: bool,
    ) -> RenderResult<Arc<VulkanDevice>> {
        let mut shared = lock(&self.device);
        let Some(device) = shared.as_ref() else {
            let device = Arc::new(VulkanDevice::new(
                Arc::clone(&self.instance),
                surface,
                &self.config,
            )?);
            log::info!("Shared device initialized on {}", device.name());
            *shared = Some(Arc::clone(&device));
            return Ok(device);
        };

        if device.supports_surface(surface)? {
            return Ok(Arc::clone(device));
        }
        if !fallback {
            return Err(RenderError::IncompatibleDevice);
        }
        log::warn!(
            "{} cannot present to the new surface, creating a separate device",
            device.name()
        );
        Ok(Arc::new(VulkanDevice::new(
            Arc::clone(&self.instance),
            surface,
            &self.config,
        )?))
    }
}
