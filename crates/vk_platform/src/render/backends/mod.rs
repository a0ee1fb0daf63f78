//! GPU backends implementing [`GpuDevice`](crate::render::GpuDevice)

pub mod vulkan;
