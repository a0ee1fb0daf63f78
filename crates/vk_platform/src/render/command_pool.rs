//! Command pool owned by one render context
//!
//! A Vulkan command pool must be externally synchronised whenever any buffer
//! allocated from it is allocated, recorded, reset or freed. Each surface gets
//! a pool of its own so surfaces never contend, and the pool's lock is held
//! across every recording so a host thread releasing the last reference to a
//! command buffer cannot free it mid-record.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;

use crate::foundation::sync::lock;
use crate::render::device::GpuDevice;
use crate::render::RenderResult;

/// Command pool plus the lock guarding it
pub struct CommandPool<D: GpuDevice> {
    device: Arc<D>,
    pool: Mutex<vk::CommandPool>,
}

impl<D: GpuDevice> CommandPool<D> {
    /// New pool on the graphics queue family
    pub fn new(device: Arc<D>) -> RenderResult<Arc<Self>> {
        let pool = device.create_command_pool()?;
        Ok(Arc::new(Self {
            device,
            pool: Mutex::new(pool),
        }))
    }

    /// Device the pool belongs to
    pub const fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Allocate `count` buffers at `level`
    pub fn allocate(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        let pool = lock(&self.pool);
        self.device.allocate_command_buffers(*pool, level, count)
    }

    /// Return `buffers` to the pool; they must not be pending on the GPU
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        let pool = lock(&self.pool);
        self.device.free_command_buffers(*pool, buffers);
    }

    /// Hold while recording into any buffer of this pool
    pub fn recording(&self) -> MutexGuard<'_, vk::CommandPool> {
        lock(&self.pool)
    }
}

impl<D: GpuDevice> Drop for CommandPool<D> {
    fn drop(&mut self) {
        self.device.destroy_command_pool(*lock(&self.pool));
    }
}
