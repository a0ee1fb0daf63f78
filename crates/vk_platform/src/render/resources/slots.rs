//! Backing-slot writes shared by the ticking buffers

use ash::vk;

use crate::render::device::{DeviceBuffer, GpuDevice};
use crate::render::RenderResult;

/// Copy `data` into a backing slot, reallocating when it does not fit
///
/// Returns whether a new buffer was allocated. Empty data leaves the slot as it
/// is. A replaced buffer is dropped immediately: its slot was last read
/// `stages` frames ago, so no submitted work can still use it.
pub(crate) fn write_slot<D: GpuDevice>(
    device: &D,
    slot: &mut Option<D::Buffer>,
    usage: vk::BufferUsageFlags,
    data: &[u8],
) -> RenderResult<bool> {
    if data.is_empty() {
        return Ok(false);
    }
    let len = data.len() as vk::DeviceSize;
    let grew = !slot.as_ref().is_some_and(|buffer| buffer.size() >= len);
    if grew {
        *slot = Some(device.create_buffer(len, usage)?);
    }
    if let Some(buffer) = slot.as_ref() {
        device.write_buffer(buffer, data)?;
    }
    Ok(grew)
}
