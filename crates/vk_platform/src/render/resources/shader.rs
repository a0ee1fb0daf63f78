//! Shader modules and graphics pipelines
//!
//! A [`Shader`] is a SPIR-V module plus the resource bindings it declares. Each
//! binding gets its own descriptor set layout with a single binding 0, so a
//! pipeline's set index for `(shader, binding)` is the number of bindings in
//! the shaders before it plus the binding index.
//!
//! A [`RenderPipeline`] combines shaders with a framebuffer format, one of its
//! render stages, vertex/instance layouts, fixed-function state and per
//! attachment blending. Viewport and scissor are always dynamic.

use std::io::Cursor;
use std::sync::Arc;

use ash::vk;

use crate::render::device::{
    DepthStencilDesc, GpuDevice, GraphicsPipelineDesc, RasterizationDesc,
};
use crate::render::resources::FramebufferFormat;
use crate::render::types::{
    BlendOptions, RenderState, ShaderBinding, ShaderType, VertexFormatDescriptor,
};
use crate::render::{RenderError, RenderResult};

/// Compiled shader stage and its declared bindings
pub struct Shader<D: GpuDevice> {
    device: Arc<D>,
    kind: ShaderType,
    module: vk::ShaderModule,
    bindings: Vec<ShaderBinding>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
}

impl<D: GpuDevice> Shader<D> {
    /// Load SPIR-V bytes for a stage
    pub fn new(
        device: Arc<D>,
        kind: ShaderType,
        spirv: &[u8],
        bindings: Vec<ShaderBinding>,
    ) -> RenderResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(spirv))
            .map_err(|e| RenderError::ResourceCreationFailed(format!("invalid SPIR-V: {e}")))?;
        let module = device.create_shader_module(&code)?;

        let stage = vk::ShaderStageFlags::from(kind);
        let mut set_layouts = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            match device.create_descriptor_set_layout(binding.descriptor_type(), stage) {
                Ok(layout) => set_layouts.push(layout),
                Err(e) => {
                    for layout in set_layouts {
                        device.destroy_descriptor_set_layout(layout);
                    }
                    device.destroy_shader_module(module);
                    return Err(e);
                }
            }
        }

        log::debug!("Created {kind:?} shader with {} bindings", bindings.len());
        Ok(Self {
            device,
            kind,
            module,
            bindings,
            set_layouts,
        })
    }

    /// Pipeline stage
    pub const fn kind(&self) -> ShaderType {
        self.kind
    }

    /// Declared bindings
    pub fn bindings(&self) -> &[ShaderBinding] {
        &self.bindings
    }

    /// Binding at `index`
    pub fn binding(&self, index: u32) -> RenderResult<&ShaderBinding> {
        self.bindings.get(index as usize).ok_or_else(|| {
            RenderError::InvalidOperation(format!(
                "shader has {} bindings, {index} requested",
                self.bindings.len()
            ))
        })
    }

    /// Descriptor set layout of the binding at `index`
    pub fn set_layout(&self, index: u32) -> RenderResult<vk::DescriptorSetLayout> {
        self.binding(index)?;
        Ok(self.set_layouts[index as usize])
    }

    fn binding_count(&self) -> u32 {
        u32::try_from(self.bindings.len()).unwrap_or(u32::MAX)
    }
}

impl<D: GpuDevice> Drop for Shader<D> {
    fn drop(&mut self) {
        for layout in self.set_layouts.drain(..) {
            self.device.destroy_descriptor_set_layout(layout);
        }
        self.device.destroy_shader_module(self.module);
    }
}

/// Everything a pipeline is built from
pub struct PipelineSettings<D: GpuDevice> {
    /// Format the pipeline renders into
    pub format: Arc<FramebufferFormat<D>>,
    /// Render stage of the format
    pub stage: u32,
    /// Shaders, at most one per stage type
    pub shaders: Vec<Arc<Shader<D>>>,
    /// Per-vertex stream, binding 0
    pub vertex_format: VertexFormatDescriptor,
    /// Per-instance stream, binding 1
    pub instance_format: VertexFormatDescriptor,
    /// Fixed-function state
    pub state: RenderState,
    /// Blending per colour attachment of the stage
    pub blending: Vec<BlendOptions>,
}

/// Graphics pipeline with its layout
pub struct RenderPipeline<D: GpuDevice> {
    device: Arc<D>,
    format: Arc<FramebufferFormat<D>>,
    shaders: Vec<Arc<Shader<D>>>,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl<D: GpuDevice> RenderPipeline<D> {
    /// Build a pipeline for one render stage of `settings.format`
    pub fn new(device: Arc<D>, settings: PipelineSettings<D>) -> RenderResult<Self> {
        let PipelineSettings {
            format,
            stage,
            shaders,
            vertex_format,
            instance_format,
            state,
            blending,
        } = settings;

        let color_count = format.stage(stage)?.color_attachments.len();
        let mut blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> =
            blending.into_iter().map(Into::into).collect();
        if blend_attachments.len() > color_count {
            return Err(RenderError::InvalidOperation(format!(
                "{} blend states for {color_count} colour attachments",
                blend_attachments.len()
            )));
        }
        blend_attachments.resize(color_count, BlendOptions::opaque().into());

        let mut vertex_bindings = Vec::with_capacity(2);
        let mut vertex_attributes = Vec::new();
        if let Some(binding) = vertex_format.binding(0) {
            vertex_bindings.push(binding);
            vertex_attributes.extend(vertex_format.attributes(0, 0));
        }
        if let Some(binding) = instance_format.binding(1) {
            vertex_bindings.push(binding);
            vertex_attributes.extend(
                instance_format.attributes(1, vertex_format.location_count()),
            );
        }

        let set_layouts: Vec<_> = shaders
            .iter()
            .flat_map(|shader| shader.set_layouts.iter().copied())
            .collect();
        let layout = device.create_pipeline_layout(&set_layouts)?;

        let desc = GraphicsPipelineDesc {
            stages: shaders
                .iter()
                .map(|shader| (vk::ShaderStageFlags::from(shader.kind), shader.module))
                .collect(),
            vertex_bindings,
            vertex_attributes,
            topology: state.topology.into(),
            rasterization: rasterization(&state),
            depth_stencil: depth_stencil(&state),
            blend_attachments,
            layout,
            render_pass: format.render_pass(),
            subpass: stage,
        };
        let pipeline = match device.create_graphics_pipeline(&desc) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            format,
            shaders,
            layout,
            pipeline,
        })
    }

    /// Pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Framebuffer format the pipeline was built for
    pub const fn format(&self) -> &Arc<FramebufferFormat<D>> {
        &self.format
    }

    /// Set index of `binding` inside `shader`
    pub fn descriptor_set_index(&self, shader: &Arc<Shader<D>>, binding: u32) -> RenderResult<u32> {
        let mut index = 0;
        for candidate in &self.shaders {
            if Arc::ptr_eq(candidate, shader) {
                candidate.binding(binding)?;
                return Ok(index + binding);
            }
            index += candidate.binding_count();
        }
        Err(RenderError::InvalidOperation(
            "shader is not part of this pipeline".to_string(),
        ))
    }
}

impl<D: GpuDevice> Drop for RenderPipeline<D> {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline);
        self.device.destroy_pipeline_layout(self.layout);
    }
}

fn rasterization(state: &RenderState) -> RasterizationDesc {
    let bias = state.depth_bias.unwrap_or_default();
    RasterizationDesc {
        discard: state.discard_raster,
        polygon_mode: state.raster_mode.into(),
        cull_mode: state
            .culling_mode
            .unwrap_or(RenderState::DEFAULT_CULLING)
            .into(),
        front_face: state
            .front_face
            .unwrap_or(RenderState::DEFAULT_FRONT_FACE)
            .into(),
        depth_bias: (
            bias.enabled,
            bias.constant_factor,
            bias.clamp,
            bias.slope_factor,
        ),
        line_width: state.line_width.unwrap_or(RenderState::DEFAULT_LINE_WIDTH),
    }
}

fn depth_stencil(state: &RenderState) -> DepthStencilDesc {
    let depth = state.depth_test.unwrap_or_default();
    let stencil = state.stencil_test.unwrap_or_default();
    DepthStencilDesc {
        depth_test: depth.enabled,
        depth_write: depth.write,
        depth_compare: depth.comparison.into(),
        stencil_test: stencil.enabled,
        front: stencil.front.into(),
        back: stencil.back.into(),
    }
}
