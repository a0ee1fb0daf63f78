//! Per-frame list of render passes
//!
//! Filled by the host during the update callback and flushed into one primary
//! command buffer. Each entry becomes a render pass on its target that executes
//! the entry's secondary buffer.

use std::sync::Arc;

use ash::vk;

use crate::render::command_pool::CommandPool;
use crate::render::device::{GpuDevice, RenderPassBegin};
use crate::render::resources::{CommandBuffer, RenderTarget};
use crate::render::RenderResult;

/// Target and secondary buffer of one queued render pass
pub type QueuedPass<D> = (RenderTarget<D>, Arc<CommandBuffer<D>>);

/// Render passes queued for the current frame
pub struct RenderQueue<D: GpuDevice> {
    entries: Vec<QueuedPass<D>>,
}

impl<D: GpuDevice> Default for RenderQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: GpuDevice> RenderQueue<D> {
    /// Empty queue
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Render `command_buffer` into `target` this frame
    pub fn enqueue(&mut self, target: RenderTarget<D>, command_buffer: Arc<CommandBuffer<D>>) {
        self.entries.push((target, command_buffer));
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Move every entry out, leaving the queue empty
    pub fn take(&mut self) -> Vec<QueuedPass<D>> {
        std::mem::take(&mut self.entries)
    }

    /// Number of queued render passes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record every entry into `primary`, in enqueue order
    ///
    /// `primary` must come from `pool`, which stays locked while recording.
    /// Offscreen targets have their attachments made sampleable after their
    /// pass and move on to their next image set.
    pub fn write(
        &self,
        pool: &CommandPool<D>,
        primary: vk::CommandBuffer,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let _recording = pool.recording();
        let device = &**pool.device();
        device.begin_command_buffer(
            primary,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            None,
        )?;
        for (target, command_buffer) in &self.entries {
            let framebuffer = target.framebuffer()?;
            let format = framebuffer.format();
            device.cmd_begin_render_pass(
                primary,
                &RenderPassBegin {
                    render_pass: format.render_pass(),
                    framebuffer: framebuffer.current(),
                    extent: framebuffer.extent(),
                    clear_values: format.clear_values(clear_color),
                },
            );
            if let Some(secondary) = command_buffer.current() {
                device.cmd_execute_commands(primary, secondary);
            }
            for _ in 1..format.stage_count() {
                device.cmd_next_subpass(primary);
            }
            device.cmd_end_render_pass(primary);

            let transitions = framebuffer.post_render_transitions();
            if !transitions.is_empty() {
                device.cmd_transition_images(primary, &transitions);
            }
            framebuffer.advance();
        }
        device.end_command_buffer(primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::render::resources::{CommandFormat, Framebuffer, FramebufferFormat};
    use crate::render::testing::{Call, MockDevice};
    use crate::render::ticking::Ticking;
    use crate::render::types::{AttachmentDescriptor, RenderStageDescriptor, TextureFormat};

    fn offscreen(device: &Arc<MockDevice>, stages: u32) -> Arc<Framebuffer<MockDevice>> {
        let format = Arc::new(
            FramebufferFormat::new(
                device.clone(),
                vec![AttachmentDescriptor::color(TextureFormat::R8G8B8A8Srgb)],
                (0..stages)
                    .map(|_| RenderStageDescriptor {
                        color_attachments: vec![0],
                        ..RenderStageDescriptor::default()
                    })
                    .collect(),
            )
            .unwrap(),
        );
        Arc::new(Framebuffer::offscreen(device.clone(), format, 4, 4, 2).unwrap())
    }

    fn pool(device: &Arc<MockDevice>) -> Arc<CommandPool<MockDevice>> {
        CommandPool::new(device.clone()).unwrap()
    }

    fn recorded_command_buffer(
        device: &Arc<MockDevice>,
        framebuffer: &Framebuffer<MockDevice>,
    ) -> Arc<CommandBuffer<MockDevice>> {
        let command_buffer = CommandBuffer::new(&pool(device), 2).unwrap();
        command_buffer.commit(CommandFormat::Format(framebuffer.format().clone()), Vec::new());
        command_buffer.tick().unwrap();
        command_buffer
    }

    #[test]
    fn test_entries_written_in_order() {
        let device = MockDevice::new();
        let first = offscreen(&device, 1);
        let second = offscreen(&device, 1);
        let a = recorded_command_buffer(&device, &first);
        let b = recorded_command_buffer(&device, &second);
        let c = recorded_command_buffer(&device, &first);
        let mut queue = RenderQueue::new();
        queue.enqueue(RenderTarget::Framebuffer(first.clone()), a.clone());
        queue.enqueue(RenderTarget::Framebuffer(second.clone()), b.clone());
        queue.enqueue(RenderTarget::Framebuffer(first.clone()), c.clone());
        let expected_framebuffers = [first.current(), second.current()];
        device.clear_calls();

        let pool = pool(&device);
        device.clear_calls();
        let primary = vk::CommandBuffer::from_raw(9999);
        queue.write(&pool, primary, [0.0; 4]).unwrap();

        let calls = device.calls();
        assert_eq!(calls.first(), Some(&Call::Begin(primary)));
        assert_eq!(calls.last(), Some(&Call::End(primary)));
        let passes: Vec<_> = calls
            .iter()
            .filter_map(|call| match call {
                Call::BeginRenderPass { framebuffer, .. } => Some(("begin", framebuffer.as_raw())),
                Call::Execute { secondary, .. } => Some(("execute", secondary.as_raw())),
                Call::EndRenderPass(_) => Some(("end", 0)),
                _ => None,
            })
            .collect();
        assert_eq!(passes.len(), 9);
        assert_eq!(passes[0], ("begin", expected_framebuffers[0].as_raw()));
        assert_eq!(passes[1], ("execute", a.current().unwrap().as_raw()));
        assert_eq!(passes[3], ("begin", expected_framebuffers[1].as_raw()));
        assert_eq!(passes[4], ("execute", b.current().unwrap().as_raw()));
        assert_eq!(passes[7], ("execute", c.current().unwrap().as_raw()));
        assert!(passes.chunks(3).all(|pass| pass[2].0 == "end"));
        assert_eq!(
            device.count(|call| matches!(call, Call::Transition { .. })),
            3
        );

        let taken = queue.take();
        assert_eq!(taken.len(), 3);
        assert!(Arc::ptr_eq(&taken[1].1, &b));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_offscreen_target_advances_per_pass() {
        let device = MockDevice::new();
        let framebuffer = offscreen(&device, 1);
        let commands = recorded_command_buffer(&device, &framebuffer);
        let before = framebuffer.current();
        let mut queue = RenderQueue::new();
        queue.enqueue(RenderTarget::Framebuffer(framebuffer.clone()), commands);

        queue.write(&pool(&device), vk::CommandBuffer::null(), [0.0; 4]).unwrap();

        assert_ne!(framebuffer.current(), before);
    }

    #[test]
    fn test_unrecorded_buffer_leaves_empty_pass() {
        let device = MockDevice::new();
        let framebuffer = offscreen(&device, 3);
        let pool = pool(&device);
        let commands = CommandBuffer::new(&pool, 2).unwrap();
        let mut queue = RenderQueue::new();
        queue.enqueue(RenderTarget::Framebuffer(framebuffer), commands);
        device.clear_calls();

        queue.write(&pool, vk::CommandBuffer::null(), [0.0; 4]).unwrap();

        assert_eq!(device.count(|call| matches!(call, Call::Execute { .. })), 0);
        assert_eq!(device.count(|call| matches!(call, Call::NextSubpass(_))), 2);
        assert_eq!(device.count(|call| matches!(call, Call::EndRenderPass(_))), 1);
    }
}
