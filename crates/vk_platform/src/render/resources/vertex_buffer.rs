//! Vertex and instance data

use std::sync::{Arc, Mutex, Weak};

use ash::vk;

use crate::foundation::sync::lock;
use crate::render::dependents::{Dependent, Dependents};
use crate::render::device::{DeviceBuffer, GpuDevice};
use crate::render::resources::slots::write_slot;
use crate::render::ticking::{StageCursor, Ticking};
use crate::render::{RenderError, RenderResult};

const USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::VERTEX_BUFFER;

fn check_layout(len: usize, vertex_size: u32) -> RenderResult<()> {
    if vertex_size == 0 {
        return Err(RenderError::InvalidOperation(
            "vertex size must be non-zero".to_string(),
        ));
    }
    if len % vertex_size as usize != 0 {
        return Err(RenderError::InvalidOperation(format!(
            "{len} bytes is not a whole number of {vertex_size}-byte vertices"
        )));
    }
    Ok(())
}

fn count_of(len: usize, vertex_size: u32) -> u32 {
    u32::try_from(len / vertex_size as usize).unwrap_or(u32::MAX)
}

/// Vertex data, either fixed at creation or rewritable per frame
pub enum VertexBuffer<D: GpuDevice> {
    /// Immutable
    Static(Arc<StaticVertexBuffer<D>>),
    /// Multi-buffered and writable
    Dynamic(Arc<DynamicVertexBuffer<D>>),
}

impl<D: GpuDevice> Clone for VertexBuffer<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(buffer) => Self::Static(buffer.clone()),
            Self::Dynamic(buffer) => Self::Dynamic(buffer.clone()),
        }
    }
}

impl<D: GpuDevice> VertexBuffer<D> {
    /// Replace the contents; static buffers refuse
    pub fn write(&self, data: &[u8]) -> RenderResult<()> {
        match self {
            Self::Static(_) => Err(RenderError::InvalidOperation(
                "static vertex buffers cannot be written".to_string(),
            )),
            Self::Dynamic(buffer) => buffer.write(data),
        }
    }

    /// Buffer to bind this frame, `None` while empty
    pub fn buffer(&self) -> Option<vk::Buffer> {
        match self {
            Self::Static(buffer) => buffer.buffer(),
            Self::Dynamic(buffer) => buffer.buffer(),
        }
    }

    /// Vertices available this frame
    pub fn vertex_count(&self) -> u32 {
        match self {
            Self::Static(buffer) => buffer.vertex_count(),
            Self::Dynamic(buffer) => buffer.vertex_count(),
        }
    }

    /// Stride in bytes
    pub fn vertex_size(&self) -> u32 {
        match self {
            Self::Static(buffer) => buffer.vertex_size,
            Self::Dynamic(buffer) => buffer.vertex_size,
        }
    }

    pub(crate) fn register_dependent(&self, dependent: Weak<dyn Dependent>) {
        if let Self::Dynamic(buffer) = self {
            buffer.dependents.register(dependent);
        }
    }
}

/// Vertex data uploaded once
pub struct StaticVertexBuffer<D: GpuDevice> {
    buffer: Option<D::Buffer>,
    vertex_size: u32,
    vertex_count: u32,
}

impl<D: GpuDevice> StaticVertexBuffer<D> {
    /// Upload `data` as vertices of `vertex_size` bytes
    pub fn new(device: &D, data: &[u8], vertex_size: u32) -> RenderResult<Self> {
        check_layout(data.len(), vertex_size)?;
        let mut buffer = None;
        write_slot(device, &mut buffer, USAGE, data)?;
        Ok(Self {
            buffer,
            vertex_size,
            vertex_count: count_of(data.len(), vertex_size),
        })
    }

    /// Buffer handle, `None` when created empty
    pub fn buffer(&self) -> Option<vk::Buffer> {
        self.buffer.as_ref().map(DeviceBuffer::handle)
    }

    /// Number of vertices
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

struct DynamicSlots<D: GpuDevice> {
    cursor: StageCursor,
    buffers: Vec<Option<D::Buffer>>,
    counts: Vec<u32>,
    pending: Vec<u8>,
}

/// Vertex data rewritten by the host, spread over one buffer per stage
///
/// Command buffers that draw it are notified whenever a slot changes so they
/// re-record with the new handle and vertex count.
pub struct DynamicVertexBuffer<D: GpuDevice> {
    device: Arc<D>,
    vertex_size: u32,
    slots: Mutex<DynamicSlots<D>>,
    dependents: Dependents,
}

impl<D: GpuDevice> DynamicVertexBuffer<D> {
    /// Writable buffer with `stages` slots, seeded with `data`
    pub fn new(device: Arc<D>, data: &[u8], vertex_size: u32, stages: usize) -> RenderResult<Self> {
        check_layout(data.len(), vertex_size)?;
        let cursor = StageCursor::new(stages);
        let stages = cursor.stages();
        let buffer = Self {
            device,
            vertex_size,
            slots: Mutex::new(DynamicSlots {
                cursor,
                buffers: (0..stages).map(|_| None).collect(),
                counts: vec![0; stages],
                pending: Vec::new(),
            }),
            dependents: Dependents::new(),
        };
        if !data.is_empty() {
            buffer.write(data)?;
        }
        Ok(buffer)
    }

    /// Queue new contents; visible in every slot after `stages` ticks
    pub fn write(&self, data: &[u8]) -> RenderResult<()> {
        check_layout(data.len(), self.vertex_size)?;
        let mut slots = lock(&self.slots);
        slots.pending = data.to_vec();
        slots.cursor.mark_written();
        Ok(())
    }

    /// Buffer in the read slot
    pub fn buffer(&self) -> Option<vk::Buffer> {
        let slots = lock(&self.slots);
        slots.buffers[slots.cursor.read_index()]
            .as_ref()
            .map(DeviceBuffer::handle)
    }

    /// Vertex count of the read slot
    pub fn vertex_count(&self) -> u32 {
        let slots = lock(&self.slots);
        slots.counts[slots.cursor.read_index()]
    }

    #[cfg(test)]
    pub(crate) fn slot_buffer(&self, slot: usize) -> Option<vk::Buffer> {
        lock(&self.slots).buffers[slot].as_ref().map(DeviceBuffer::handle)
    }
}

impl<D: GpuDevice> Ticking for DynamicVertexBuffer<D> {
    fn tick(&self) -> RenderResult<()> {
        let wrote = {
            let mut guard = lock(&self.slots);
            let DynamicSlots {
                cursor,
                buffers,
                counts,
                pending,
            } = &mut *guard;
            let wrote = cursor.tick_with(|slot| {
                write_slot(&*self.device, &mut buffers[slot], USAGE, pending)?;
                counts[slot] = count_of(pending.len(), self.vertex_size);
                Ok(())
            })?;
            if cursor.is_settled() {
                pending.clear();
                pending.shrink_to_fit();
            }
            wrote
        };
        if wrote {
            self.dependents.notify();
        }
        Ok(())
    }
}
