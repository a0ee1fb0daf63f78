//! Replayable secondary command buffers
//!
//! The host commits a flat list of [`DrawCommand`]s once. The list is replayed
//! into one secondary command buffer per stage, a slot per tick, the same way
//! buffer writes propagate. Every resource a command references is notified
//! back here when it changes what the GPU should see (a vertex buffer slot, a
//! rewritten descriptor set, a new swapchain framebuffer), which schedules a
//! re-record of every slot.

use std::sync::{Arc, Mutex, Weak};

use ash::vk;

use crate::foundation::sync::lock;
use crate::render::command_pool::CommandPool;
use crate::render::dependents::Dependent;
use crate::render::device::GpuDevice;
use crate::render::resources::{
    FramebufferFormat, RenderPipeline, RenderTarget, SurfaceTarget, TextureBinding,
    UniformBinding, VertexBuffer,
};
use crate::render::ticking::{StageCursor, Ticking};
use crate::render::types::Extents2D;
use crate::render::{RenderError, RenderResult};

/// One recorded operation
pub enum DrawCommand<D: GpuDevice> {
    /// Viewport and scissor covering the whole target
    SetViewportScissor(RenderTarget<D>),
    /// Viewport only
    SetViewport(Extents2D),
    /// Scissor only
    SetScissor(Extents2D),
    /// Bind the first block of a uniform binding
    BindUniform {
        /// Pipeline whose layout is used
        pipeline: Arc<RenderPipeline<D>>,
        /// Binding to bind
        binding: Arc<UniformBinding<D>>,
    },
    /// Bind a texture binding
    BindTexture {
        /// Pipeline whose layout is used
        pipeline: Arc<RenderPipeline<D>>,
        /// Binding to bind
        binding: Arc<TextureBinding<D>>,
    },
    /// Bind block `index` of a uniform binding
    UseUniform {
        /// Pipeline whose layout is used
        pipeline: Arc<RenderPipeline<D>>,
        /// Binding to bind
        binding: Arc<UniformBinding<D>>,
        /// Block index inside the buffer
        index: u32,
    },
    /// Draw every vertex, once per instance
    Draw {
        /// Pipeline to draw with
        pipeline: Arc<RenderPipeline<D>>,
        /// Vertex stream, binding 0
        vertices: VertexBuffer<D>,
        /// Instance stream, binding 1; a single instance when absent
        instances: Option<VertexBuffer<D>>,
    },
}

impl<D: GpuDevice> Clone for DrawCommand<D> {
    fn clone(&self) -> Self {
        match self {
            Self::SetViewportScissor(target) => Self::SetViewportScissor(target.clone()),
            Self::SetViewport(extents) => Self::SetViewport(*extents),
            Self::SetScissor(extents) => Self::SetScissor(*extents),
            Self::BindUniform { pipeline, binding } => Self::BindUniform {
                pipeline: pipeline.clone(),
                binding: binding.clone(),
            },
            Self::BindTexture { pipeline, binding } => Self::BindTexture {
                pipeline: pipeline.clone(),
                binding: binding.clone(),
            },
            Self::UseUniform {
                pipeline,
                binding,
                index,
            } => Self::UseUniform {
                pipeline: pipeline.clone(),
                binding: binding.clone(),
                index: *index,
            },
            Self::Draw {
                pipeline,
                vertices,
                instances,
            } => Self::Draw {
                pipeline: pipeline.clone(),
                vertices: vertices.clone(),
                instances: instances.clone(),
            },
        }
    }
}

/// Render pass a command buffer continues
pub enum CommandFormat<D: GpuDevice> {
    /// A fixed framebuffer format
    Format(Arc<FramebufferFormat<D>>),
    /// Whatever format the swapchain framebuffer currently has
    Surface(SurfaceTarget<D>),
}

impl<D: GpuDevice> Clone for CommandFormat<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Format(format) => Self::Format(format.clone()),
            Self::Surface(target) => Self::Surface(target.clone()),
        }
    }
}

impl<D: GpuDevice> CommandFormat<D> {
    fn resolve(&self) -> RenderResult<Arc<FramebufferFormat<D>>> {
        match self {
            Self::Format(format) => Ok(format.clone()),
            Self::Surface(target) => Ok(target.framebuffer()?.format().clone()),
        }
    }
}

/// Format and commands a slot was recorded from, held until it is re-recorded
type Recording<D> = (Arc<FramebufferFormat<D>>, Vec<DrawCommand<D>>);

struct CommandSlots<D: GpuDevice> {
    cursor: StageCursor,
    committed: Option<(CommandFormat<D>, Vec<DrawCommand<D>>)>,
    recorded: Vec<Option<Recording<D>>>,
}

/// Secondary command buffers replaying committed draw commands
pub struct CommandBuffer<D: GpuDevice> {
    device: Arc<D>,
    pool: Arc<CommandPool<D>>,
    buffers: Vec<vk::CommandBuffer>,
    this: Weak<Self>,
    slots: Mutex<CommandSlots<D>>,
}

impl<D: GpuDevice> CommandBuffer<D> {
    /// Empty command buffer with `stages` slots allocated from `pool`
    pub fn new(pool: &Arc<CommandPool<D>>, stages: usize) -> RenderResult<Arc<Self>> {
        let cursor = StageCursor::new(stages);
        let count = u32::try_from(cursor.stages())
            .map_err(|_| RenderError::InvalidOperation("too many stages".to_string()))?;
        let buffers = pool.allocate(vk::CommandBufferLevel::SECONDARY, count)?;
        Ok(Arc::new_cyclic(|this| Self {
            device: pool.device().clone(),
            pool: pool.clone(),
            buffers,
            this: this.clone(),
            slots: Mutex::new(CommandSlots {
                recorded: (0..cursor.stages()).map(|_| None).collect(),
                cursor,
                committed: None,
            }),
        }))
    }

    /// Replace the recorded commands; every slot re-records over the coming ticks
    pub fn commit(&self, format: CommandFormat<D>, commands: Vec<DrawCommand<D>>) {
        let this: Weak<dyn Dependent> = self.this.clone();
        if let CommandFormat::Surface(target) = &format {
            target.register_dependent(this.clone());
        }
        for command in &commands {
            match command {
                DrawCommand::SetViewportScissor(RenderTarget::Surface(target)) => {
                    target.register_dependent(this.clone());
                }
                DrawCommand::BindUniform { binding, .. }
                | DrawCommand::UseUniform { binding, .. } => {
                    binding.register_dependent(this.clone());
                }
                DrawCommand::BindTexture { binding, .. } => {
                    binding.register_dependent(this.clone());
                }
                DrawCommand::Draw {
                    vertices,
                    instances,
                    ..
                } => {
                    vertices.register_dependent(this.clone());
                    if let Some(instances) = instances {
                        instances.register_dependent(this.clone());
                    }
                }
                _ => {}
            }
        }

        let mut slots = lock(&self.slots);
        slots.committed = Some((format, commands));
        slots.cursor.mark_written();
    }

    /// Secondary buffer of the read slot, `None` until it has been recorded
    pub fn current(&self) -> Option<vk::CommandBuffer> {
        let slots = lock(&self.slots);
        let read = slots.cursor.read_index();
        slots.recorded[read].as_ref().map(|_| self.buffers[read])
    }

    fn record(
        &self,
        buffer: vk::CommandBuffer,
        format: &FramebufferFormat<D>,
        commands: &[DrawCommand<D>],
    ) -> RenderResult<()> {
        let device = &*self.device;
        device.begin_command_buffer(
            buffer,
            vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE
                | vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            Some((format.render_pass(), 0)),
        )?;
        for command in commands {
            match command {
                DrawCommand::SetViewportScissor(target) => {
                    let extents = target.extents()?;
                    device.cmd_set_viewport(buffer, extents.viewport());
                    device.cmd_set_scissor(buffer, extents.scissor());
                }
                DrawCommand::SetViewport(extents) => {
                    device.cmd_set_viewport(buffer, extents.viewport());
                }
                DrawCommand::SetScissor(extents) => {
                    device.cmd_set_scissor(buffer, extents.scissor());
                }
                DrawCommand::BindUniform { pipeline, binding } => {
                    let set_index =
                        pipeline.descriptor_set_index(binding.shader(), binding.binding())?;
                    device.cmd_bind_descriptor_set(
                        buffer,
                        pipeline.layout(),
                        set_index,
                        binding.descriptor_set(),
                        &[0],
                    );
                }
                DrawCommand::UseUniform {
                    pipeline,
                    binding,
                    index,
                } => {
                    let set_index =
                        pipeline.descriptor_set_index(binding.shader(), binding.binding())?;
                    let offset = u32::try_from(u64::from(*index) * binding.block_stride())
                        .map_err(|_| {
                            RenderError::InvalidOperation(format!(
                                "uniform block {index} is out of range"
                            ))
                        })?;
                    device.cmd_bind_descriptor_set(
                        buffer,
                        pipeline.layout(),
                        set_index,
                        binding.descriptor_set(),
                        &[offset],
                    );
                }
                DrawCommand::BindTexture { pipeline, binding } => {
                    let set_index =
                        pipeline.descriptor_set_index(binding.shader(), binding.binding())?;
                    device.cmd_bind_descriptor_set(
                        buffer,
                        pipeline.layout(),
                        set_index,
                        binding.descriptor_set(),
                        &[],
                    );
                }
                DrawCommand::Draw {
                    pipeline,
                    vertices,
                    instances,
                } => draw(device, buffer, pipeline, vertices, instances.as_ref()),
            }
        }
        device.end_command_buffer(buffer)
    }
}

fn draw<D: GpuDevice>(
    device: &D,
    buffer: vk::CommandBuffer,
    pipeline: &RenderPipeline<D>,
    vertices: &VertexBuffer<D>,
    instances: Option<&VertexBuffer<D>>,
) {
    let Some(vertex_buffer) = vertices.buffer() else {
        return;
    };
    let vertex_count = vertices.vertex_count();
    if vertex_count == 0 {
        return;
    }
    let mut buffers = vec![vertex_buffer];
    let instance_count = match instances {
        Some(instances) => {
            let Some(instance_buffer) = instances.buffer() else {
                return;
            };
            buffers.push(instance_buffer);
            instances.vertex_count()
        }
        None => 1,
    };
    if instance_count == 0 {
        return;
    }
    device.cmd_bind_pipeline(buffer, pipeline.handle());
    device.cmd_bind_vertex_buffers(buffer, &buffers);
    device.cmd_draw(buffer, vertex_count, instance_count);
}

impl<D: GpuDevice> Ticking for CommandBuffer<D> {
    fn tick(&self) -> RenderResult<()> {
        let _recording = self.pool.recording();
        let mut guard = lock(&self.slots);
        let CommandSlots {
            cursor,
            committed,
            recorded,
        } = &mut *guard;
        cursor.tick_with(|slot| {
            let Some((format, commands)) = committed.as_ref() else {
                return Ok(());
            };
            let format = format.resolve()?;
            self.record(self.buffers[slot], &format, commands)?;
            recorded[slot] = Some((format, commands.clone()));
            Ok(())
        })?;
        Ok(())
    }
}

impl<D: GpuDevice> Dependent for CommandBuffer<D> {
    fn invalidate(&self) {
        lock(&self.slots).cursor.mark_written();
    }
}

impl<D: GpuDevice> Drop for CommandBuffer<D> {
    fn drop(&mut self) {
        self.pool.free(&self.buffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::resources::{
        DynamicVertexBuffer, Framebuffer, PipelineSettings, Shader, StaticVertexBuffer,
        UniformBuffer,
    };
    use crate::render::testing::{Call, MockDevice, SPIRV};
    use crate::render::types::{
        AttachmentDescriptor, NumericType, RenderStageDescriptor, RenderState, ShaderBinding,
        ShaderType, TextureFormat, VertexFormatDescriptor, VertexRate,
    };

    struct Scene {
        device: Arc<MockDevice>,
        pool: Arc<CommandPool<MockDevice>>,
        format: Arc<FramebufferFormat<MockDevice>>,
        shader: Arc<Shader<MockDevice>>,
        pipeline: Arc<RenderPipeline<MockDevice>>,
    }

    fn scene() -> Scene {
        let device = MockDevice::new();
        let format = Arc::new(
            FramebufferFormat::new(
                device.clone(),
                vec![AttachmentDescriptor::color(TextureFormat::R8G8B8A8Srgb)],
                vec![RenderStageDescriptor {
                    color_attachments: vec![0],
                    ..RenderStageDescriptor::default()
                }],
            )
            .unwrap(),
        );
        let shader = Arc::new(
            Shader::new(
                device.clone(),
                ShaderType::Vertex,
                &SPIRV,
                vec![ShaderBinding::uniform(vec![NumericType::Float4x4])],
            )
            .unwrap(),
        );
        let pipeline = Arc::new(
            RenderPipeline::new(
                device.clone(),
                PipelineSettings {
                    format: format.clone(),
                    stage: 0,
                    shaders: vec![shader.clone()],
                    vertex_format: VertexFormatDescriptor::empty(VertexRate::Vertex),
                    instance_format: VertexFormatDescriptor::empty(VertexRate::Instance),
                    state: RenderState::triangles(),
                    blending: Vec::new(),
                },
            )
            .unwrap(),
        );
        Scene {
            pool: CommandPool::new(device.clone()).unwrap(),
            device,
            format,
            shader,
            pipeline,
        }
    }

    fn begins(device: &MockDevice) -> Vec<vk::CommandBuffer> {
        device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Begin(buffer) => Some(buffer),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_each_slot_recorded_once_per_commit() {
        let scene = scene();
        let commands = CommandBuffer::new(&scene.pool, 3).unwrap();
        assert!(commands.current().is_none());

        commands.commit(
            CommandFormat::Format(scene.format.clone()),
            vec![DrawCommand::SetViewport(Extents2D::sized(4, 4))],
        );
        for _ in 0..6 {
            commands.tick().unwrap();
            assert!(commands.current().is_some());
        }

        let mut recorded = begins(&scene.device);
        assert_eq!(recorded.len(), 3);
        recorded.sort_by_key(|b| ash::vk::Handle::as_raw(*b));
        recorded.dedup();
        assert_eq!(recorded.len(), 3);
    }

    #[test]
    fn test_draw_replay() {
        let scene = scene();
        let vertices = VertexBuffer::Static(Arc::new(
            StaticVertexBuffer::new(&*scene.device, &[0; 36], 12).unwrap(),
        ));
        let instances = VertexBuffer::Static(Arc::new(
            StaticVertexBuffer::new(&*scene.device, &[0; 128], 64).unwrap(),
        ));
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        commands.commit(
            CommandFormat::Format(scene.format.clone()),
            vec![DrawCommand::Draw {
                pipeline: scene.pipeline.clone(),
                vertices: vertices.clone(),
                instances: Some(instances.clone()),
            }],
        );
        scene.device.clear_calls();

        commands.tick().unwrap();

        let buffer = commands.current().unwrap();
        assert_eq!(
            scene.device.calls(),
            vec![
                Call::Begin(buffer),
                Call::BindPipeline {
                    command_buffer: buffer,
                    pipeline: scene.pipeline.handle(),
                },
                Call::BindVertexBuffers {
                    command_buffer: buffer,
                    buffers: vec![vertices.buffer().unwrap(), instances.buffer().unwrap()],
                },
                Call::Draw {
                    command_buffer: buffer,
                    vertex_count: 3,
                    instance_count: 2,
                },
                Call::End(buffer),
            ]
        );
    }

    #[test]
    fn test_empty_vertex_buffer_skips_draw() {
        let scene = scene();
        let vertices = VertexBuffer::Dynamic(Arc::new(
            DynamicVertexBuffer::new(scene.device.clone(), &[], 12, 2).unwrap(),
        ));
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        commands.commit(
            CommandFormat::Format(scene.format.clone()),
            vec![DrawCommand::Draw {
                pipeline: scene.pipeline.clone(),
                vertices,
                instances: None,
            }],
        );

        commands.tick().unwrap();

        assert_eq!(scene.device.count(|c| matches!(c, Call::Draw { .. })), 0);
        assert!(commands.current().is_some());
    }

    #[test]
    fn test_uniform_offsets() {
        let scene = scene();
        let buffer = Arc::new(
            UniformBuffer::new(scene.device.clone(), scene.shader.clone(), 0, &[0; 128], 2)
                .unwrap(),
        );
        let binding = UniformBinding::new(
            scene.device.clone(),
            scene.shader.clone(),
            0,
            Some(buffer),
            2,
        )
        .unwrap();
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        commands.commit(
            CommandFormat::Format(scene.format.clone()),
            vec![
                DrawCommand::BindUniform {
                    pipeline: scene.pipeline.clone(),
                    binding: binding.clone(),
                },
                DrawCommand::UseUniform {
                    pipeline: scene.pipeline.clone(),
                    binding: binding.clone(),
                    index: 1,
                },
            ],
        );

        commands.tick().unwrap();

        let offsets: Vec<_> = scene
            .device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::BindDescriptorSet {
                    set_index, offsets, ..
                } => Some((set_index, offsets)),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![(0, vec![0]), (0, vec![256])]);
    }

    #[test]
    fn test_vertex_write_rerecords() {
        let scene = scene();
        let dynamic = Arc::new(DynamicVertexBuffer::new(scene.device.clone(), &[0; 12], 12, 2).unwrap());
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        commands.commit(
            CommandFormat::Format(scene.format.clone()),
            vec![DrawCommand::Draw {
                pipeline: scene.pipeline.clone(),
                vertices: VertexBuffer::Dynamic(dynamic.clone()),
                instances: None,
            }],
        );
        for _ in 0..4 {
            dynamic.tick().unwrap();
            commands.tick().unwrap();
        }
        scene.device.clear_calls();

        dynamic.write(&[0; 24]).unwrap();
        for _ in 0..2 {
            dynamic.tick().unwrap();
            commands.tick().unwrap();
        }

        let draws: Vec<_> = scene
            .device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Draw { vertex_count, .. } => Some(vertex_count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![2, 2]);
    }

    #[test]
    fn test_surface_replacement_rerecords() {
        let scene = scene();
        let surface_format = Arc::new(
            FramebufferFormat::for_surface(scene.device.clone(), vk::Format::B8G8R8A8_SRGB).unwrap(),
        );
        let swapchain = scene
            .device
            .create_swapchain(
                vk::SurfaceKHR::null(),
                vk::Extent2D {
                    width: 16,
                    height: 8,
                },
                vk::SwapchainKHR::null(),
            )
            .unwrap();
        let target = SurfaceTarget::new();
        target.replace(Some(Arc::new(
            Framebuffer::for_swapchain(scene.device.clone(), surface_format.clone(), &swapchain)
                .unwrap(),
        )));
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        commands.commit(
            CommandFormat::Surface(target.clone()),
            vec![DrawCommand::SetViewportScissor(RenderTarget::Surface(
                target.clone(),
            ))],
        );
        for _ in 0..3 {
            commands.tick().unwrap();
        }
        scene.device.clear_calls();

        target.replace(Some(Arc::new(
            Framebuffer::for_swapchain(scene.device.clone(), surface_format, &swapchain).unwrap(),
        )));
        commands.tick().unwrap();

        assert_eq!(begins(&scene.device).len(), 1);
        assert!(scene.device.calls().contains(&Call::SetScissor {
            command_buffer: commands.current().unwrap(),
            rect: (0, 0, 16, 8),
        }));
    }

    #[test]
    fn test_closed_surface_fails_recording() {
        let scene = scene();
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        commands.commit(CommandFormat::Surface(SurfaceTarget::new()), Vec::new());
        assert!(matches!(commands.tick(), Err(RenderError::SurfaceClosed)));
        assert!(commands.current().is_none());
    }

    #[test]
    fn test_drop_frees_into_owning_pool() {
        let scene = scene();
        let pool = *scene.pool.recording();
        let commands = CommandBuffer::new(&scene.pool, 2).unwrap();
        let buffers = commands.buffers.clone();
        scene.device.clear_calls();

        drop(commands);

        assert_eq!(
            scene.device.calls(),
            vec![Call::FreeCommandBuffers { pool, buffers }]
        );
    }
}
