//! # Vulkan Backend
//!
//! Instance, physical/logical device and presentation built on `ash`.
//!
//! ## Ownership
//!
//! ```text
//! VulkanPlatform ──owns──► VulkanInstance
//!        │
//!        └──shares──► Arc<VulkanDevice> ◄── every surface's FrameCycle
//! ```
//!
//! The instance outlives every device: devices keep an `Arc` to it.

mod device;
mod instance;
mod memory;
mod platform;
mod swapchain;

pub use device::{VulkanBuffer, VulkanDevice, VulkanImage};
pub use instance::VulkanInstance;
pub use platform::VulkanPlatform;
pub use swapchain::SwapchainSupport;
