//! Swapchain parameter selection

use ash::extensions::khr::Surface;
use ash::vk;

use crate::core::config::PresentModePreference;
use crate::render::{RenderError, RenderResult};

/// What a surface supports on a physical device
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query support for `surface`
    pub fn query(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    /// sRGB BGRA8 when available, otherwise the first format
    pub fn choose_format(&self) -> RenderResult<vk::SurfaceFormatKHR> {
        self.formats
            .iter()
            .find(|sf| {
                sf.format == vk::Format::B8G8R8A8_SRGB
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| self.formats.first())
            .copied()
            .ok_or_else(|| RenderError::SwapchainCreation("surface reports no formats".to_string()))
    }

    /// The preferred mode when supported, otherwise FIFO
    pub fn choose_present_mode(&self, preference: PresentModePreference) -> vk::PresentModeKHR {
        let preferred = match preference {
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        };
        if self.present_modes.contains(&preferred) {
            preferred
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    /// The surface's extent, or the window size clamped to the surface limits
    pub fn choose_extent(&self, window_extent: vk::Extent2D) -> vk::Extent2D {
        let caps = &self.capabilities;
        if caps.current_extent.width != u32::MAX {
            return caps.current_extent;
        }
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_extent
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    /// One more than the minimum, at least two, within the surface maximum
    pub fn choose_image_count(&self) -> u32 {
        let caps = &self.capabilities;
        let wanted = (caps.min_image_count + 1).max(2);
        if caps.max_image_count > 0 {
            wanted.min(caps.max_image_count)
        } else {
            wanted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(min_images: u32, max_images: u32) -> SwapchainSupport {
        SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: min_images,
                max_image_count: max_images,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 2048,
                },
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
        }
    }

    #[test]
    fn test_prefers_srgb_format() {
        let mut support = support(2, 8);
        assert_eq!(
            support.choose_format().unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );

        support.formats.truncate(1);
        assert_eq!(
            support.choose_format().unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );

        support.formats.clear();
        assert!(support.choose_format().is_err());
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let support = support(2, 8);
        assert_eq!(
            support.choose_present_mode(PresentModePreference::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            support.choose_present_mode(PresentModePreference::Mailbox),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_clamped_to_surface_limits() {
        let mut support = support(2, 8);
        let window = vk::Extent2D {
            width: 8000,
            height: 600,
        };
        assert_eq!(
            support.choose_extent(window),
            vk::Extent2D {
                width: 4096,
                height: 600
            }
        );

        support.capabilities.current_extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert_eq!(support.choose_extent(window).width, 640);
    }

    #[test]
    fn test_image_count_bounds() {
        assert_eq!(support(2, 8).choose_image_count(), 3);
        assert_eq!(support(1, 0).choose_image_count(), 2);
        assert_eq!(support(3, 3).choose_image_count(), 3);
    }
}
