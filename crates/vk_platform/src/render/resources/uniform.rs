//! Uniform buffers and the descriptor sets that expose them to shaders

use std::sync::{Arc, Mutex, Weak};

use ash::vk;

use crate::foundation::sync::lock;
use crate::render::dependents::{Dependent, Dependents};
use crate::render::device::{DeviceBuffer, GpuDevice};
use crate::render::resources::slots::write_slot;
use crate::render::resources::Shader;
use crate::render::ticking::{StageCursor, Ticking};
use crate::render::types::align_up;
use crate::render::{RenderError, RenderResult};

const USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::UNIFORM_BUFFER;
const DESCRIPTOR_TYPE: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC;

fn uniform_size<D: GpuDevice>(shader: &Shader<D>, binding: u32) -> RenderResult<u32> {
    shader.binding(binding)?.uniform_size().ok_or_else(|| {
        RenderError::InvalidOperation(format!("shader binding {binding} is not a uniform block"))
    })
}

struct UniformSlots<D: GpuDevice> {
    cursor: StageCursor,
    buffers: Vec<Option<D::Buffer>>,
    pending: Vec<u8>,
}

/// Uniform data for one shader binding, one buffer per stage
///
/// The data may hold several consecutive blocks; draws select one with
/// [`DrawCommand::UseUniform`](crate::render::DrawCommand::UseUniform).
/// Bindings pointing at this buffer are notified whenever a slot reallocates.
pub struct UniformBuffer<D: GpuDevice> {
    device: Arc<D>,
    shader: Arc<Shader<D>>,
    binding: u32,
    block_size: u32,
    slots: Mutex<UniformSlots<D>>,
    dependents: Dependents,
}

impl<D: GpuDevice> UniformBuffer<D> {
    /// Buffer for `binding` of `shader`, seeded with `data`
    pub fn new(
        device: Arc<D>,
        shader: Arc<Shader<D>>,
        binding: u32,
        data: &[u8],
        stages: usize,
    ) -> RenderResult<Self> {
        let block_size = uniform_size(&shader, binding)?;
        let cursor = StageCursor::new(stages);
        let stages = cursor.stages();
        let buffer = Self {
            device,
            shader,
            binding,
            block_size,
            slots: Mutex::new(UniformSlots {
                cursor,
                buffers: (0..stages).map(|_| None).collect(),
                pending: Vec::new(),
            }),
            dependents: Dependents::new(),
        };
        if !data.is_empty() {
            buffer.write(data);
        }
        Ok(buffer)
    }

    /// Queue new contents; visible in every slot after `stages` ticks
    pub fn write(&self, data: &[u8]) {
        let mut slots = lock(&self.slots);
        slots.pending = data.to_vec();
        slots.cursor.mark_written();
    }

    /// Queue a plain-data value as the new contents
    pub fn write_value<T: bytemuck::Pod>(&self, value: &T) {
        self.write(bytemuck::bytes_of(value));
    }

    /// Buffer in the read slot
    pub fn buffer(&self) -> Option<vk::Buffer> {
        let slots = lock(&self.slots);
        slots.buffers[slots.cursor.read_index()]
            .as_ref()
            .map(DeviceBuffer::handle)
    }

    /// Shader this buffer was created for
    pub const fn shader(&self) -> &Arc<Shader<D>> {
        &self.shader
    }

    /// Binding index inside the shader
    pub const fn binding(&self) -> u32 {
        self.binding
    }

    /// Size of one uniform block
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    pub(crate) fn register_dependent(&self, dependent: Weak<dyn Dependent>) {
        self.dependents.register(dependent);
    }

    #[cfg(test)]
    pub(crate) fn slot_buffer(&self, slot: usize) -> Option<vk::Buffer> {
        lock(&self.slots).buffers[slot].as_ref().map(DeviceBuffer::handle)
    }

    #[cfg(test)]
    pub(crate) fn dependent_count(&self) -> usize {
        self.dependents.len()
    }
}

impl<D: GpuDevice> Ticking for UniformBuffer<D> {
    fn tick(&self) -> RenderResult<()> {
        let mut grew = false;
        {
            let mut guard = lock(&self.slots);
            let UniformSlots {
                cursor,
                buffers,
                pending,
            } = &mut *guard;
            cursor.tick_with(|slot| {
                grew = write_slot(&*self.device, &mut buffers[slot], USAGE, pending)?;
                Ok(())
            })?;
            if cursor.is_settled() {
                pending.clear();
                pending.shrink_to_fit();
            }
        }
        if grew {
            log::trace!("Uniform buffer slot reallocated, refreshing bindings");
            self.dependents.notify();
        }
        Ok(())
    }
}

struct BindingSlots<D: GpuDevice> {
    cursor: StageCursor,
    current: Option<Arc<UniformBuffer<D>>>,
    bound: Vec<Option<Arc<UniformBuffer<D>>>>,
}

/// One descriptor set per stage pointing a shader binding at a uniform buffer
///
/// Each slot keeps the buffer it points at alive until the slot is rewritten.
/// Command buffers binding a set are notified when it is rewritten, since an
/// update invalidates recordings that use it.
pub struct UniformBinding<D: GpuDevice> {
    device: Arc<D>,
    shader: Arc<Shader<D>>,
    binding: u32,
    block_size: u32,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    this: Weak<Self>,
    slots: Mutex<BindingSlots<D>>,
    dependents: Dependents,
}

impl<D: GpuDevice> UniformBinding<D> {
    /// Binding for `binding` of `shader`, optionally pointing at `buffer`
    pub fn new(
        device: Arc<D>,
        shader: Arc<Shader<D>>,
        binding: u32,
        buffer: Option<Arc<UniformBuffer<D>>>,
        stages: usize,
    ) -> RenderResult<Arc<Self>> {
        let block_size = uniform_size(&shader, binding)?;
        let cursor = StageCursor::new(stages);
        let count = u32::try_from(cursor.stages())
            .map_err(|_| RenderError::InvalidOperation("too many stages".to_string()))?;
        let (pool, sets) =
            device.allocate_descriptor_sets(shader.set_layout(binding)?, DESCRIPTOR_TYPE, count)?;

        let uniform_binding = Arc::new_cyclic(|this| Self {
            device,
            shader,
            binding,
            block_size,
            pool,
            sets,
            this: this.clone(),
            slots: Mutex::new(BindingSlots {
                bound: (0..cursor.stages()).map(|_| None).collect(),
                cursor,
                current: None,
            }),
            dependents: Dependents::new(),
        });
        if let Some(buffer) = buffer {
            uniform_binding.update(buffer)?;
        }
        Ok(uniform_binding)
    }

    /// Point every slot at `buffer` over the coming ticks
    pub fn update(&self, buffer: Arc<UniformBuffer<D>>) -> RenderResult<()> {
        if !Arc::ptr_eq(buffer.shader(), &self.shader) || buffer.binding() != self.binding {
            return Err(RenderError::InvalidOperation(
                "uniform buffer belongs to a different shader binding".to_string(),
            ));
        }
        let this: Weak<dyn Dependent> = self.this.clone();
        buffer.register_dependent(this);

        let mut slots = lock(&self.slots);
        slots.current = Some(buffer);
        slots.cursor.mark_written();
        Ok(())
    }

    /// Descriptor set in the read slot
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.sets[lock(&self.slots).cursor.read_index()]
    }

    /// Shader this binding belongs to
    pub const fn shader(&self) -> &Arc<Shader<D>> {
        &self.shader
    }

    /// Binding index inside the shader
    pub const fn binding(&self) -> u32 {
        self.binding
    }

    /// Distance between consecutive blocks for dynamic offsets
    pub fn block_stride(&self) -> u64 {
        align_up(
            u64::from(self.block_size),
            self.device.limits().min_uniform_buffer_offset_alignment,
        )
    }

    pub(crate) fn register_dependent(&self, dependent: Weak<dyn Dependent>) {
        self.dependents.register(dependent);
    }

    #[cfg(test)]
    pub(crate) fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    #[cfg(test)]
    pub(crate) fn leftover_writes(&self) -> usize {
        lock(&self.slots).cursor.leftover_writes()
    }
}

impl<D: GpuDevice> Ticking for UniformBinding<D> {
    fn tick(&self) -> RenderResult<()> {
        let wrote = {
            let mut guard = lock(&self.slots);
            let BindingSlots {
                cursor,
                current,
                bound,
            } = &mut *guard;
            cursor.tick_with(|slot| {
                if let Some(buffer) = current {
                    if let Some(handle) = buffer.buffer() {
                        self.device.write_buffer_descriptor(
                            self.sets[slot],
                            DESCRIPTOR_TYPE,
                            handle,
                            u64::from(self.block_size),
                        );
                    }
                }
                bound[slot].clone_from(current);
                Ok(())
            })?
        };
        if wrote {
            self.dependents.notify();
        }
        Ok(())
    }
}

impl<D: GpuDevice> Dependent for UniformBinding<D> {
    fn invalidate(&self) {
        lock(&self.slots).cursor.mark_written();
    }
}

impl<D: GpuDevice> Drop for UniformBinding<D> {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{Call, MockDevice, SPIRV};
    use crate::render::types::{NumericType, ShaderBinding, ShaderType};

    fn shader(device: &Arc<MockDevice>) -> Arc<Shader<MockDevice>> {
        Arc::new(
            Shader::new(
                device.clone(),
                ShaderType::Vertex,
                &SPIRV,
                vec![
                    ShaderBinding::uniform(vec![NumericType::Float4]),
                    ShaderBinding::Texture,
                ],
            )
            .unwrap(),
        )
    }

    fn descriptor_writes(device: &MockDevice) -> Vec<(vk::DescriptorSet, vk::Buffer)> {
        device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WriteBufferDescriptor { set, buffer, .. } => Some((set, buffer)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_uniform_write_propagates() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let buffer = UniformBuffer::new(device.clone(), shader, 0, &[1; 16], 3).unwrap();

        for _ in 0..3 {
            buffer.tick().unwrap();
        }
        buffer.write(&[2; 16]);
        for _ in 0..3 {
            buffer.tick().unwrap();
        }

        for slot in 0..3 {
            let handle = buffer.slot_buffer(slot).unwrap();
            assert_eq!(device.buffer_contents(handle), vec![2; 16]);
        }
    }

    #[test]
    fn test_write_value_uses_plain_bytes() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let buffer = UniformBuffer::new(device.clone(), shader, 0, &[0; 16], 2).unwrap();

        buffer.write_value(&[1.0_f32, 0.0, 0.0, 1.0]);
        for _ in 0..2 {
            buffer.tick().unwrap();
        }

        let handle = buffer.slot_buffer(0).unwrap();
        let contents = device.buffer_contents(handle);
        let values: Vec<f32> = contents
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_texture_binding_index_rejected() {
        let device = MockDevice::new();
        let shader = shader(&device);
        assert!(UniformBuffer::new(device.clone(), shader.clone(), 1, &[], 2).is_err());
        assert!(UniformBuffer::new(device.clone(), shader.clone(), 5, &[], 2).is_err());
        assert!(UniformBinding::new(device, shader, 1, None, 2).is_err());
    }

    #[test]
    fn test_binding_sets_follow_buffer_slots() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let buffer = Arc::new(UniformBuffer::new(device.clone(), shader.clone(), 0, &[1; 16], 3).unwrap());
        let binding = UniformBinding::new(device.clone(), shader, 0, Some(buffer.clone()), 3).unwrap();

        for _ in 0..6 {
            buffer.tick().unwrap();
            binding.tick().unwrap();
        }

        assert_eq!(binding.leftover_writes(), 0);
        let writes = descriptor_writes(&device);
        for slot in 0..3 {
            let last = writes
                .iter()
                .rev()
                .find(|(set, _)| *set == binding.set(slot))
                .map(|(_, buffer)| *buffer);
            assert_eq!(last, buffer.slot_buffer(slot));
        }
    }

    #[test]
    fn test_growth_notifies_binding() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let buffer = Arc::new(UniformBuffer::new(device.clone(), shader.clone(), 0, &[1; 16], 2).unwrap());
        let binding = UniformBinding::new(device.clone(), shader, 0, Some(buffer.clone()), 2).unwrap();
        for _ in 0..3 {
            buffer.tick().unwrap();
            binding.tick().unwrap();
        }
        assert_eq!(binding.leftover_writes(), 0);
        device.clear_calls();

        buffer.write(&[3; 64]);
        buffer.tick().unwrap();
        assert_eq!(binding.leftover_writes(), 2);
        binding.tick().unwrap();
        buffer.tick().unwrap();
        binding.tick().unwrap();

        let writes = descriptor_writes(&device);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], (binding.set(0), buffer.slot_buffer(0).unwrap()));
        assert_eq!(writes[1], (binding.set(1), buffer.slot_buffer(1).unwrap()));
    }

    #[test]
    fn test_same_size_rewrite_keeps_descriptors() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let buffer = Arc::new(UniformBuffer::new(device.clone(), shader.clone(), 0, &[1; 16], 2).unwrap());
        let binding = UniformBinding::new(device.clone(), shader, 0, Some(buffer.clone()), 2).unwrap();
        for _ in 0..3 {
            buffer.tick().unwrap();
            binding.tick().unwrap();
        }
        device.clear_calls();

        buffer.write(&[5; 16]);
        for _ in 0..2 {
            buffer.tick().unwrap();
            binding.tick().unwrap();
        }

        assert!(descriptor_writes(&device).is_empty());
    }

    #[test]
    fn test_dead_binding_pruned_on_growth() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let buffer = Arc::new(UniformBuffer::new(device.clone(), shader.clone(), 0, &[], 2).unwrap());
        let binding = UniformBinding::new(device.clone(), shader, 0, Some(buffer.clone()), 2).unwrap();
        assert_eq!(buffer.dependent_count(), 1);
        drop(binding);

        buffer.write(&[1; 16]);
        buffer.tick().unwrap();

        assert_eq!(buffer.dependent_count(), 0);
        assert_eq!(Arc::strong_count(&buffer), 1);
    }

    #[test]
    fn test_update_repoints_all_slots() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let first = Arc::new(UniformBuffer::new(device.clone(), shader.clone(), 0, &[1; 16], 3).unwrap());
        let second = Arc::new(UniformBuffer::new(device.clone(), shader.clone(), 0, &[2; 16], 3).unwrap());
        let binding = UniformBinding::new(device.clone(), shader, 0, Some(first.clone()), 3).unwrap();
        for _ in 0..3 {
            first.tick().unwrap();
            second.tick().unwrap();
            binding.tick().unwrap();
        }
        device.clear_calls();

        binding.update(second.clone()).unwrap();
        for _ in 0..2 {
            second.tick().unwrap();
            binding.tick().unwrap();
        }
        assert!(Arc::strong_count(&first) > 1, "old buffer still bound in one slot");
        second.tick().unwrap();
        binding.tick().unwrap();

        let second_buffers: Vec<_> = (0..3).map(|s| second.slot_buffer(s).unwrap()).collect();
        let writes = descriptor_writes(&device);
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|(_, b)| second_buffers.contains(b)));
        assert_eq!(Arc::strong_count(&first), 1);
        for slot in 0..3 {
            assert!(writes.iter().any(|(set, _)| *set == binding.set(slot)));
        }
    }

    #[test]
    fn test_block_stride_aligned() {
        let device = MockDevice::new();
        let shader = shader(&device);
        let binding = UniformBinding::new(device, shader, 0, None, 2).unwrap();
        assert_eq!(binding.block_stride(), 256);
    }
}
