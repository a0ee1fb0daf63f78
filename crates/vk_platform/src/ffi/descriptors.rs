//! `#[repr(C)]` descriptions passed by the host, and their decoding
//!
//! Enum fields travel as single bytes and are checked on the way in. Optional
//! parts of a render state are null pointers (or [`VKP_UNSET`] for enum fields).

#![allow(non_camel_case_types)]

use std::sync::Arc;

use super::handle::{self, vkp_handle, NULL_HANDLE};
use super::{slice, FfiError, FfiResult};
use crate::render::device::GpuDevice;
use crate::render::resources::{FramebufferFormat, PipelineSettings, Shader};
use crate::render::types::{
    AttachmentDescriptor, AttachmentType, BlendOptions, ColorComponents, DepthBias, DepthTest,
    RenderStageDescriptor, RenderState, ShaderBinding, StencilFaceOperation, StencilTest,
    TextureBorderColor, TextureFiltering, TextureWrapping, VertexFormatDescriptor,
    VertexFormatElement, VertexRate,
};

/// Marks an optional enum field as unset
pub const VKP_UNSET: u8 = 0xFF;

/// Shader binding kind: uniform block
pub const VKP_BINDING_UNIFORM: u8 = 0;
/// Shader binding kind: combined image sampler
pub const VKP_BINDING_TEXTURE: u8 = 1;

/// Framebuffer attachment
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_attachment {
    /// `AttachmentType`
    pub kind: u8,
    /// `TextureFormat`
    pub format: u8,
}

/// Render stage (subpass) of a framebuffer format
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_render_stage {
    /// Colour attachment indices
    pub color_attachments: *const u32,
    /// Number of colour attachments
    pub color_attachment_count: usize,
    /// Depth/stencil attachment index, negative for none
    pub depth_stencil_attachment: i32,
    /// Indices of earlier stages this stage reads
    pub dependencies: *const u32,
    /// Number of dependencies
    pub dependency_count: usize,
}

/// Shader binding declaration
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_shader_binding {
    /// [`VKP_BINDING_UNIFORM`] or [`VKP_BINDING_TEXTURE`]
    pub kind: u8,
    /// Uniform member types (`NumericType`)
    pub properties: *const u8,
    /// Number of members
    pub property_count: usize,
}

/// Vertex attribute
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_vertex_element {
    /// Location relative to the stream
    pub location: u32,
    /// `NumericType`
    pub kind: u8,
    /// Byte offset inside one vertex
    pub offset: u32,
}

/// Vertex or instance stream layout; size 0 disables the stream
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_vertex_format {
    /// Attributes
    pub elements: *const vkp_vertex_element,
    /// Number of attributes
    pub element_count: usize,
    /// Stride in bytes
    pub size: u32,
}

/// Depth bias factors
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_depth_bias {
    /// Constant term
    pub constant_factor: f32,
    /// Maximum bias
    pub clamp: f32,
    /// Slope term
    pub slope_factor: f32,
}

/// Depth test
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_depth_test {
    /// `CompareOperation`
    pub comparison: u8,
    /// Write passing depths
    pub write: bool,
}

/// Stencil behaviour of one face orientation
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_stencil_face {
    /// `StencilOperation` on stencil failure
    pub stencil_fail: u8,
    /// `StencilOperation` on depth failure
    pub depth_fail: u8,
    /// `StencilOperation` on success
    pub success: u8,
    /// `CompareOperation`
    pub compare: u8,
    /// Bits compared
    pub compare_mask: u32,
    /// Bits written
    pub write_mask: u32,
    /// Reference value
    pub reference: u32,
}

/// Stencil test
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_stencil_test {
    /// Front faces
    pub front: vkp_stencil_face,
    /// Back faces
    pub back: vkp_stencil_face,
}

/// Fixed-function pipeline state
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_render_state {
    /// `Topology`
    pub topology: u8,
    /// `RasterMode`
    pub raster_mode: u8,
    /// Discard before rasterization
    pub discard_raster: bool,
    /// `CullingMode` or [`VKP_UNSET`]
    pub culling_mode: u8,
    /// `FrontFace` or [`VKP_UNSET`]
    pub front_face: u8,
    /// Line width, zero or less for the default
    pub line_width: f32,
    /// Depth bias, null when disabled
    pub depth_bias: *const vkp_depth_bias,
    /// Depth test, null when disabled
    pub depth_test: *const vkp_depth_test,
    /// Stencil test, null when disabled
    pub stencil_test: *const vkp_stencil_test,
}

/// Blending for one colour attachment
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_blend_options {
    /// Blend instead of overwrite
    pub enabled: bool,
    /// `BlendFactor`
    pub src_color: u8,
    /// `BlendFactor`
    pub dst_color: u8,
    /// `BlendOperation`
    pub color_operation: u8,
    /// `BlendFactor`
    pub src_alpha: u8,
    /// `BlendFactor`
    pub dst_alpha: u8,
    /// `BlendOperation`
    pub alpha_operation: u8,
    /// `ColorComponents` bits
    pub components: u8,
}

/// Everything a render pipeline is built from
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_pipeline_settings {
    /// Framebuffer format, or null for the surface format
    pub format: vkp_handle,
    /// Render stage of the format
    pub stage: u32,
    /// Shader handles
    pub shaders: *const vkp_handle,
    /// Number of shaders
    pub shader_count: usize,
    /// Per-vertex stream
    pub vertex_format: vkp_vertex_format,
    /// Per-instance stream
    pub instance_format: vkp_vertex_format,
    /// Fixed-function state
    pub state: vkp_render_state,
    /// Blend options per colour attachment
    pub blending: *const vkp_blend_options,
    /// Number of blend options
    pub blending_count: usize,
}

/// Sampler options
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct vkp_sampler_options {
    /// `TextureFiltering` when minifying
    pub min_filter: u8,
    /// `TextureFiltering` when magnifying
    pub mag_filter: u8,
    /// `TextureWrapping`
    pub wrapping: u8,
    /// `TextureBorderColor`
    pub border_color: u8,
    /// Maximum anisotropy, zero or less to disable
    pub anisotropy: f32,
}

/// Checked conversion of a byte-sized enum
pub fn byte_enum<T: TryFrom<u8, Error = u8>>(value: u8, kind: &'static str) -> FfiResult<T> {
    T::try_from(value).map_err(|value| FfiError::UnknownValue {
        kind,
        value: value.into(),
    })
}

fn optional_enum<T: TryFrom<u8, Error = u8>>(value: u8, kind: &'static str) -> FfiResult<Option<T>> {
    if value == VKP_UNSET {
        Ok(None)
    } else {
        byte_enum(value, kind).map(Some)
    }
}

/// Decode framebuffer attachments
///
/// # Safety
/// `ptr` must point to `count` attachments.
pub unsafe fn attachments(ptr: *const vkp_attachment, count: usize) -> FfiResult<Vec<AttachmentDescriptor>> {
    slice(ptr, count, "attachments")?
        .iter()
        .map(|a| {
            Ok(AttachmentDescriptor {
                kind: byte_enum::<AttachmentType>(a.kind, "AttachmentType")?,
                format: byte_enum(a.format, "TextureFormat")?,
            })
        })
        .collect()
}

/// Decode render stages
///
/// # Safety
/// `ptr` must point to `count` stages whose index arrays are valid.
pub unsafe fn render_stages(ptr: *const vkp_render_stage, count: usize) -> FfiResult<Vec<RenderStageDescriptor>> {
    slice(ptr, count, "render stages")?
        .iter()
        .map(|stage| {
            Ok(RenderStageDescriptor {
                color_attachments: slice(
                    stage.color_attachments,
                    stage.color_attachment_count,
                    "color attachments",
                )?
                .to_vec(),
                depth_stencil_attachment: u32::try_from(stage.depth_stencil_attachment).ok(),
                dependencies: slice(stage.dependencies, stage.dependency_count, "dependencies")?
                    .to_vec(),
            })
        })
        .collect()
}

/// Decode shader bindings
///
/// # Safety
/// `ptr` must point to `count` bindings whose property arrays are valid.
pub unsafe fn shader_bindings(ptr: *const vkp_shader_binding, count: usize) -> FfiResult<Vec<ShaderBinding>> {
    slice(ptr, count, "shader bindings")?
        .iter()
        .map(|binding| match binding.kind {
            VKP_BINDING_UNIFORM => {
                let properties = slice(binding.properties, binding.property_count, "uniform properties")?
                    .iter()
                    .map(|&p| byte_enum(p, "NumericType"))
                    .collect::<FfiResult<Vec<_>>>()?;
                Ok(ShaderBinding::uniform(properties))
            }
            VKP_BINDING_TEXTURE => Ok(ShaderBinding::Texture),
            other => Err(FfiError::UnknownValue {
                kind: "shader binding kind",
                value: other.into(),
            }),
        })
        .collect()
}

/// Decode a vertex stream layout
///
/// # Safety
/// `format.elements` must point to `format.element_count` elements.
pub unsafe fn vertex_format(format: &vkp_vertex_format, rate: VertexRate) -> FfiResult<VertexFormatDescriptor> {
    let elements = slice(format.elements, format.element_count, "vertex elements")?
        .iter()
        .map(|e| {
            Ok(VertexFormatElement {
                location: e.location,
                kind: byte_enum(e.kind, "NumericType")?,
                offset: e.offset,
            })
        })
        .collect::<FfiResult<Vec<_>>>()?;
    Ok(VertexFormatDescriptor {
        elements,
        size: format.size,
        rate,
    })
}

fn stencil_face(face: &vkp_stencil_face) -> FfiResult<StencilFaceOperation> {
    Ok(StencilFaceOperation {
        stencil_fail: byte_enum(face.stencil_fail, "StencilOperation")?,
        depth_fail: byte_enum(face.depth_fail, "StencilOperation")?,
        success: byte_enum(face.success, "StencilOperation")?,
        compare: byte_enum(face.compare, "CompareOperation")?,
        compare_mask: face.compare_mask,
        write_mask: face.write_mask,
        reference: face.reference,
    })
}

/// Decode a render state
///
/// # Safety
/// Non-null optional pointers must be valid.
pub unsafe fn render_state(state: &vkp_render_state) -> FfiResult<RenderState> {
    let depth_bias = state.depth_bias.as_ref().map(|bias| DepthBias {
        enabled: true,
        constant_factor: bias.constant_factor,
        clamp: bias.clamp,
        slope_factor: bias.slope_factor,
    });
    let depth_test = state
        .depth_test
        .as_ref()
        .map(|test| {
            Ok::<_, FfiError>(DepthTest {
                enabled: true,
                comparison: byte_enum(test.comparison, "CompareOperation")?,
                write: test.write,
            })
        })
        .transpose()?;
    let stencil_test = state
        .stencil_test
        .as_ref()
        .map(|test| {
            Ok::<_, FfiError>(StencilTest {
                enabled: true,
                front: stencil_face(&test.front)?,
                back: stencil_face(&test.back)?,
            })
        })
        .transpose()?;

    Ok(RenderState {
        topology: byte_enum(state.topology, "Topology")?,
        raster_mode: byte_enum(state.raster_mode, "RasterMode")?,
        discard_raster: state.discard_raster,
        line_width: (state.line_width > 0.0).then_some(state.line_width),
        depth_bias,
        depth_test,
        stencil_test,
        culling_mode: optional_enum(state.culling_mode, "CullingMode")?,
        front_face: optional_enum(state.front_face, "FrontFace")?,
    })
}

/// Decode blend options
pub fn blend_options(options: &vkp_blend_options) -> FfiResult<BlendOptions> {
    Ok(BlendOptions {
        enabled: options.enabled,
        src_color: byte_enum(options.src_color, "BlendFactor")?,
        dst_color: byte_enum(options.dst_color, "BlendFactor")?,
        color_operation: byte_enum(options.color_operation, "BlendOperation")?,
        src_alpha: byte_enum(options.src_alpha, "BlendFactor")?,
        dst_alpha: byte_enum(options.dst_alpha, "BlendFactor")?,
        alpha_operation: byte_enum(options.alpha_operation, "BlendOperation")?,
        components: ColorComponents::from_bits(options.components).ok_or(
            FfiError::UnknownValue {
                kind: "ColorComponents",
                value: options.components.into(),
            },
        )?,
    })
}

/// Sampler options as typed values
pub type SamplerOptions = (
    TextureFiltering,
    TextureFiltering,
    TextureWrapping,
    TextureBorderColor,
    Option<f32>,
);

/// Decode sampler options
pub fn sampler_options(options: &vkp_sampler_options) -> FfiResult<SamplerOptions> {
    Ok((
        byte_enum(options.min_filter, "TextureFiltering")?,
        byte_enum(options.mag_filter, "TextureFiltering")?,
        byte_enum(options.wrapping, "TextureWrapping")?,
        byte_enum(options.border_color, "TextureBorderColor")?,
        (options.anisotropy > 0.0).then_some(options.anisotropy),
    ))
}

/// Format behind `handle`, or `surface` for the null handle
pub fn format_or_surface<D: GpuDevice>(
    handle: vkp_handle,
    surface: &Arc<FramebufferFormat<D>>,
) -> FfiResult<Arc<FramebufferFormat<D>>> {
    if handle == NULL_HANDLE {
        Ok(surface.clone())
    } else {
        handle::get(handle).ok_or(FfiError::InvalidHandle("framebuffer format"))
    }
}

/// Decode pipeline settings, resolving format and shader handles
///
/// # Safety
/// Every pointer inside `settings` must be valid for its count.
pub unsafe fn pipeline_settings<D: GpuDevice>(
    settings: &vkp_pipeline_settings,
    surface_format: &Arc<FramebufferFormat<D>>,
) -> FfiResult<PipelineSettings<D>> {
    let shaders = slice(settings.shaders, settings.shader_count, "shaders")?
        .iter()
        .map(|&h| handle::get::<Shader<D>>(h).ok_or(FfiError::InvalidHandle("shader")))
        .collect::<FfiResult<Vec<_>>>()?;
    let blending = slice(settings.blending, settings.blending_count, "blending")?
        .iter()
        .map(blend_options)
        .collect::<FfiResult<Vec<_>>>()?;
    Ok(PipelineSettings {
        format: format_or_surface(settings.format, surface_format)?,
        stage: settings.stage,
        shaders,
        vertex_format: vertex_format(&settings.vertex_format, VertexRate::Vertex)?,
        instance_format: vertex_format(&settings.instance_format, VertexRate::Instance)?,
        state: render_state(&settings.state)?,
        blending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::types::{
        CompareOperation, CullingMode, NumericType, TextureFormat, Topology,
    };

    fn plain_state() -> vkp_render_state {
        vkp_render_state {
            topology: Topology::Triangles as u8,
            raster_mode: 0,
            discard_raster: false,
            culling_mode: VKP_UNSET,
            front_face: VKP_UNSET,
            line_width: 0.0,
            depth_bias: std::ptr::null(),
            depth_test: std::ptr::null(),
            stencil_test: std::ptr::null(),
        }
    }

    #[test]
    fn test_attachments_and_stages() {
        let raw = [
            vkp_attachment {
                kind: 0,
                format: TextureFormat::B8G8R8A8Srgb as u8,
            },
            vkp_attachment {
                kind: 1,
                format: TextureFormat::D32SfloatS8Uint as u8,
            },
        ];
        let decoded = unsafe { attachments(raw.as_ptr(), raw.len()) }.unwrap();
        assert_eq!(
            decoded,
            vec![
                AttachmentDescriptor::color(TextureFormat::B8G8R8A8Srgb),
                AttachmentDescriptor::depth_stencil(TextureFormat::D32SfloatS8Uint),
            ]
        );

        let colors = [0_u32];
        let stages = [
            vkp_render_stage {
                color_attachments: colors.as_ptr(),
                color_attachment_count: 1,
                depth_stencil_attachment: 1,
                dependencies: std::ptr::null(),
                dependency_count: 0,
            },
            vkp_render_stage {
                color_attachments: colors.as_ptr(),
                color_attachment_count: 1,
                depth_stencil_attachment: -1,
                dependencies: colors.as_ptr(),
                dependency_count: 1,
            },
        ];
        let decoded = unsafe { render_stages(stages.as_ptr(), stages.len()) }.unwrap();
        assert_eq!(decoded[0].depth_stencil_attachment, Some(1));
        assert_eq!(decoded[1].depth_stencil_attachment, None);
        assert_eq!(decoded[1].dependencies, vec![0]);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let raw = [vkp_attachment { kind: 0, format: 9 }];
        assert!(matches!(
            unsafe { attachments(raw.as_ptr(), 1) },
            Err(FfiError::UnknownValue {
                kind: "TextureFormat",
                value: 9
            })
        ));
    }

    #[test]
    fn test_shader_bindings() {
        let properties = [NumericType::Float4x4 as u8, NumericType::Float4 as u8];
        let raw = [
            vkp_shader_binding {
                kind: VKP_BINDING_UNIFORM,
                properties: properties.as_ptr(),
                property_count: properties.len(),
            },
            vkp_shader_binding {
                kind: VKP_BINDING_TEXTURE,
                properties: std::ptr::null(),
                property_count: 0,
            },
        ];
        let decoded = unsafe { shader_bindings(raw.as_ptr(), raw.len()) }.unwrap();
        assert_eq!(decoded[0].uniform_size(), Some(80));
        assert_eq!(decoded[1], ShaderBinding::Texture);

        let bad = [vkp_shader_binding {
            kind: 7,
            properties: std::ptr::null(),
            property_count: 0,
        }];
        assert!(unsafe { shader_bindings(bad.as_ptr(), 1) }.is_err());
    }

    #[test]
    fn test_render_state_optional_parts() {
        let state = unsafe { render_state(&plain_state()) }.unwrap();
        assert_eq!(state, RenderState::triangles());

        let test = vkp_depth_test {
            comparison: CompareOperation::Less as u8,
            write: true,
        };
        let mut raw = plain_state();
        raw.culling_mode = CullingMode::None as u8;
        raw.line_width = 2.0;
        raw.depth_test = &test;
        let state = unsafe { render_state(&raw) }.unwrap();
        assert_eq!(state.culling_mode, Some(CullingMode::None));
        assert_eq!(state.line_width, Some(2.0));
        assert_eq!(
            state.depth_test,
            Some(DepthTest {
                enabled: true,
                comparison: CompareOperation::Less,
                write: true
            })
        );
        assert!(state.stencil_test.is_none());

        raw.topology = 42;
        assert!(unsafe { render_state(&raw) }.is_err());
    }

    #[test]
    fn test_blend_components_checked() {
        let mut raw = vkp_blend_options {
            enabled: true,
            src_color: 4,
            dst_color: 5,
            color_operation: 0,
            src_alpha: 1,
            dst_alpha: 0,
            alpha_operation: 0,
            components: 0b1111,
        };
        assert_eq!(blend_options(&raw).unwrap(), BlendOptions::alpha_blended());

        raw.components = 0b1_0000;
        assert!(blend_options(&raw).is_err());
    }

    #[test]
    fn test_sampler_anisotropy_disabled_when_not_positive() {
        let raw = vkp_sampler_options {
            min_filter: 1,
            mag_filter: 0,
            wrapping: 2,
            border_color: 1,
            anisotropy: 0.0,
        };
        let (min, mag, wrap, border, anisotropy) = sampler_options(&raw).unwrap();
        assert_eq!(min, TextureFiltering::Linear);
        assert_eq!(mag, TextureFiltering::Nearest);
        assert_eq!(wrap, TextureWrapping::ClampToEdge);
        assert_eq!(border, TextureBorderColor::OpaqueBlack);
        assert!(anisotropy.is_none());
    }
}
