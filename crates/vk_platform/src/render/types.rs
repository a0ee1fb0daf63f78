//! Backend-neutral rendering vocabulary and its Vulkan translation
//!
//! Every enum here crosses the C boundary as a single byte, so each one has a
//! `TryFrom<u8>` that rejects unknown discriminants instead of trusting the host.

use ash::vk;

/// Defines a `#[repr(u8)]` enum with a checked conversion from its discriminant
macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $(v if v == $value => Ok(Self::$variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

byte_enum! {
    /// Scalar and vector element types for vertex attributes and uniforms
    pub enum NumericType {
        /// i8
        Byte = 0,
        /// u8
        UByte = 1,
        /// i16
        Short = 2,
        /// u16
        UShort = 3,
        /// i32
        Int = 4,
        /// u32
        UInt = 5,
        /// i64
        Long = 6,
        /// u64
        ULong = 7,
        /// f32
        Float = 8,
        /// f64
        Double = 9,
        /// 2 × f32
        Float2 = 10,
        /// 3 × f32
        Float3 = 11,
        /// 4 × f32
        Float4 = 12,
        /// 4 × 4 f32, column major
        Float4x4 = 13,
    }
}

impl NumericType {
    /// Size in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Byte | Self::UByte => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong | Self::Double | Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Float4x4 => 64,
        }
    }

    /// Format of one attribute location
    pub const fn vk_format(self) -> vk::Format {
        match self {
            Self::Byte => vk::Format::R8_SINT,
            Self::UByte => vk::Format::R8_UINT,
            Self::Short => vk::Format::R16_SINT,
            Self::UShort => vk::Format::R16_UINT,
            Self::Int => vk::Format::R32_SINT,
            Self::UInt => vk::Format::R32_UINT,
            Self::Long => vk::Format::R64_SINT,
            Self::ULong => vk::Format::R64_UINT,
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Double => vk::Format::R64_SFLOAT,
            Self::Float2 => vk::Format::R32G32_SFLOAT,
            Self::Float3 => vk::Format::R32G32B32_SFLOAT,
            Self::Float4 | Self::Float4x4 => vk::Format::R32G32B32A32_SFLOAT,
        }
    }

    /// Attribute locations consumed; matrices take one per column
    pub const fn locations(self) -> u32 {
        match self {
            Self::Float4x4 => 4,
            _ => 1,
        }
    }
}

byte_enum! {
    /// Pixel formats for textures and attachments
    pub enum TextureFormat {
        /// 8-bit RGBA, sRGB
        R8G8B8A8Srgb = 0,
        /// 8-bit BGRA, sRGB
        B8G8R8A8Srgb = 1,
        /// 32-bit float depth with 8-bit stencil
        D32SfloatS8Uint = 0xFF,
    }
}

impl TextureFormat {
    /// Vulkan equivalent
    pub const fn vk_format(self) -> vk::Format {
        match self {
            Self::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    /// Depth/stencil formats
    pub const fn is_depth_stencil(self) -> bool {
        matches!(self, Self::D32SfloatS8Uint)
    }

    /// Bytes per texel
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8G8B8A8Srgb | Self::B8G8R8A8Srgb => 4,
            Self::D32SfloatS8Uint => 8,
        }
    }
}

byte_enum! {
    /// Role of a framebuffer attachment
    pub enum AttachmentType {
        /// Colour output
        Color = 0,
        /// Depth/stencil output
        DepthStencil = 1,
    }
}

/// One attachment of a framebuffer format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// Colour or depth/stencil
    pub kind: AttachmentType,
    /// Pixel format
    pub format: TextureFormat,
}

impl AttachmentDescriptor {
    /// Colour attachment
    pub const fn color(format: TextureFormat) -> Self {
        Self {
            kind: AttachmentType::Color,
            format,
        }
    }

    /// Depth/stencil attachment
    pub const fn depth_stencil(format: TextureFormat) -> Self {
        Self {
            kind: AttachmentType::DepthStencil,
            format,
        }
    }
}

/// One subpass of a framebuffer format
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderStageDescriptor {
    /// Attachment indices written as colour
    pub color_attachments: Vec<u32>,
    /// Attachment index used for depth/stencil
    pub depth_stencil_attachment: Option<u32>,
    /// Earlier stages whose output this stage reads
    pub dependencies: Vec<u32>,
}

byte_enum! {
    /// Step rate of a vertex stream
    pub enum VertexRate {
        /// Advance per vertex
        Vertex = 0,
        /// Advance per instance
        Instance = 1,
    }
}

/// One attribute in a vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexFormatElement {
    /// Shader location, relative to the stream's first location
    pub location: u32,
    /// Element type
    pub kind: NumericType,
    /// Byte offset inside one vertex
    pub offset: u32,
}

/// Layout of a vertex or instance stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormatDescriptor {
    /// Attributes
    pub elements: Vec<VertexFormatElement>,
    /// Stride in bytes; zero disables the stream
    pub size: u32,
    /// Step rate
    pub rate: VertexRate,
}

impl VertexFormatDescriptor {
    /// A disabled stream
    pub const fn empty(rate: VertexRate) -> Self {
        Self {
            elements: Vec::new(),
            size: 0,
            rate,
        }
    }

    /// Locations used by all elements
    pub fn location_count(&self) -> u32 {
        self.elements.iter().map(|e| e.kind.locations()).sum()
    }

    /// Vulkan binding description, or `None` for a disabled stream
    pub fn binding(&self, binding: u32) -> Option<vk::VertexInputBindingDescription> {
        (self.size > 0).then(|| vk::VertexInputBindingDescription {
            binding,
            stride: self.size,
            input_rate: match self.rate {
                VertexRate::Vertex => vk::VertexInputRate::VERTEX,
                VertexRate::Instance => vk::VertexInputRate::INSTANCE,
            },
        })
    }

    /// Vulkan attribute descriptions, shifted by `location_offset`
    pub fn attributes(
        &self,
        binding: u32,
        location_offset: u32,
    ) -> Vec<vk::VertexInputAttributeDescription> {
        let mut attributes = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            for column in 0..element.kind.locations() {
                attributes.push(vk::VertexInputAttributeDescription {
                    location: location_offset + element.location + column,
                    binding,
                    format: element.kind.vk_format(),
                    offset: element.offset + column * 16,
                });
            }
        }
        attributes
    }
}

byte_enum! {
    /// Primitive topology
    pub enum Topology {
        /// Point list
        Points = 0,
        /// Line list
        Lines = 1,
        /// Line strip
        LineStrips = 2,
        /// Triangle list
        Triangles = 3,
        /// Triangle strip
        TriangleStrips = 4,
        /// Triangle fan
        TriangleFans = 5,
    }
}

impl From<Topology> for vk::PrimitiveTopology {
    fn from(topology: Topology) -> Self {
        match topology {
            Topology::Points => Self::POINT_LIST,
            Topology::Lines => Self::LINE_LIST,
            Topology::LineStrips => Self::LINE_STRIP,
            Topology::Triangles => Self::TRIANGLE_LIST,
            Topology::TriangleStrips => Self::TRIANGLE_STRIP,
            Topology::TriangleFans => Self::TRIANGLE_FAN,
        }
    }
}

byte_enum! {
    /// Polygon rasterization
    pub enum RasterMode {
        /// Filled
        Fill = 0,
        /// Wireframe
        Line = 1,
        /// Vertices only
        Point = 2,
    }
}

impl From<RasterMode> for vk::PolygonMode {
    fn from(mode: RasterMode) -> Self {
        match mode {
            RasterMode::Fill => Self::FILL,
            RasterMode::Line => Self::LINE,
            RasterMode::Point => Self::POINT,
        }
    }
}

byte_enum! {
    /// Face culling
    pub enum CullingMode {
        /// Cull front faces
        Front = 0,
        /// Cull back faces
        Back = 1,
        /// Cull everything
        FrontAndBack = 2,
        /// Cull nothing
        None = 3,
    }
}

impl From<CullingMode> for vk::CullModeFlags {
    fn from(mode: CullingMode) -> Self {
        match mode {
            CullingMode::Front => Self::FRONT,
            CullingMode::Back => Self::BACK,
            CullingMode::FrontAndBack => Self::FRONT_AND_BACK,
            CullingMode::None => Self::NONE,
        }
    }
}

byte_enum! {
    /// Winding of front faces
    pub enum FrontFace {
        /// Clockwise
        Clockwise = 0,
        /// Counter-clockwise
        CounterClockwise = 1,
    }
}

impl From<FrontFace> for vk::FrontFace {
    fn from(face: FrontFace) -> Self {
        match face {
            FrontFace::Clockwise => Self::CLOCKWISE,
            FrontFace::CounterClockwise => Self::COUNTER_CLOCKWISE,
        }
    }
}

byte_enum! {
    /// Depth and stencil comparison
    pub enum CompareOperation {
        /// Never passes
        Never = 0,
        /// `<`
        Less = 1,
        /// `<=`
        LessOrEqual = 2,
        /// `==`
        Equal = 3,
        /// `!=`
        NotEqual = 4,
        /// `>=`
        GreaterOrEqual = 5,
        /// `>`
        Greater = 6,
        /// Always passes
        Always = 7,
    }
}

impl From<CompareOperation> for vk::CompareOp {
    fn from(op: CompareOperation) -> Self {
        match op {
            CompareOperation::Never => Self::NEVER,
            CompareOperation::Less => Self::LESS,
            CompareOperation::LessOrEqual => Self::LESS_OR_EQUAL,
            CompareOperation::Equal => Self::EQUAL,
            CompareOperation::NotEqual => Self::NOT_EQUAL,
            CompareOperation::GreaterOrEqual => Self::GREATER_OR_EQUAL,
            CompareOperation::Greater => Self::GREATER,
            CompareOperation::Always => Self::ALWAYS,
        }
    }
}

byte_enum! {
    /// Stencil buffer update
    pub enum StencilOperation {
        /// Write zero
        Zero = 0,
        /// Keep
        Keep = 1,
        /// Write the reference value
        Replace = 2,
        /// Bitwise invert
        Invert = 3,
        /// Increment, saturating
        IncrementAndClamp = 4,
        /// Decrement, saturating
        DecrementAndClamp = 5,
        /// Increment, wrapping
        IncrementAndWrap = 6,
        /// Decrement, wrapping
        DecrementAndWrap = 7,
    }
}

impl From<StencilOperation> for vk::StencilOp {
    fn from(op: StencilOperation) -> Self {
        match op {
            StencilOperation::Zero => Self::ZERO,
            StencilOperation::Keep => Self::KEEP,
            StencilOperation::Replace => Self::REPLACE,
            StencilOperation::Invert => Self::INVERT,
            StencilOperation::IncrementAndClamp => Self::INCREMENT_AND_CLAMP,
            StencilOperation::DecrementAndClamp => Self::DECREMENT_AND_CLAMP,
            StencilOperation::IncrementAndWrap => Self::INCREMENT_AND_WRAP,
            StencilOperation::DecrementAndWrap => Self::DECREMENT_AND_WRAP,
        }
    }
}

byte_enum! {
    /// Blend equation factor
    pub enum BlendFactor {
        /// 0
        Zero = 0,
        /// 1
        One = 1,
        /// Source colour
        SrcColor = 2,
        /// 1 − source colour
        OneMinusSrcColor = 3,
        /// Source alpha
        SrcAlpha = 4,
        /// 1 − source alpha
        OneMinusSrcAlpha = 5,
        /// Destination colour
        DstColor = 6,
        /// 1 − destination colour
        OneMinusDstColor = 7,
        /// Destination alpha
        DstAlpha = 8,
        /// 1 − destination alpha
        OneMinusDstAlpha = 9,
        /// Blend constant colour
        ConstantColor = 10,
        /// 1 − blend constant colour
        OneMinusConstantColor = 11,
        /// Blend constant alpha
        ConstantAlpha = 12,
        /// 1 − blend constant alpha
        OneMinusConstantAlpha = 13,
    }
}

impl From<BlendFactor> for vk::BlendFactor {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => Self::ZERO,
            BlendFactor::One => Self::ONE,
            BlendFactor::SrcColor => Self::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => Self::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => Self::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => Self::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstColor => Self::DST_COLOR,
            BlendFactor::OneMinusDstColor => Self::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => Self::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => Self::ONE_MINUS_DST_ALPHA,
            BlendFactor::ConstantColor => Self::CONSTANT_COLOR,
            BlendFactor::OneMinusConstantColor => Self::ONE_MINUS_CONSTANT_COLOR,
            BlendFactor::ConstantAlpha => Self::CONSTANT_ALPHA,
            BlendFactor::OneMinusConstantAlpha => Self::ONE_MINUS_CONSTANT_ALPHA,
        }
    }
}

byte_enum! {
    /// Blend equation operator
    pub enum BlendOperation {
        /// src + dst
        Add = 0,
        /// src − dst
        Subtract = 1,
        /// dst − src
        ReverseSubtract = 2,
        /// min(src, dst)
        Min = 3,
        /// max(src, dst)
        Max = 4,
    }
}

impl From<BlendOperation> for vk::BlendOp {
    fn from(op: BlendOperation) -> Self {
        match op {
            BlendOperation::Add => Self::ADD,
            BlendOperation::Subtract => Self::SUBTRACT,
            BlendOperation::ReverseSubtract => Self::REVERSE_SUBTRACT,
            BlendOperation::Min => Self::MIN,
            BlendOperation::Max => Self::MAX,
        }
    }
}

bitflags::bitflags! {
    /// Colour channels written by a pipeline
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorComponents: u8 {
        /// Red
        const RED = 1 << 0;
        /// Green
        const GREEN = 1 << 1;
        /// Blue
        const BLUE = 1 << 2;
        /// Alpha
        const ALPHA = 1 << 3;
    }
}

impl From<ColorComponents> for vk::ColorComponentFlags {
    fn from(components: ColorComponents) -> Self {
        let mut flags = Self::empty();
        if components.contains(ColorComponents::RED) {
            flags |= Self::R;
        }
        if components.contains(ColorComponents::GREEN) {
            flags |= Self::G;
        }
        if components.contains(ColorComponents::BLUE) {
            flags |= Self::B;
        }
        if components.contains(ColorComponents::ALPHA) {
            flags |= Self::A;
        }
        flags
    }
}

/// Depth bias parameters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    /// Apply the bias
    pub enabled: bool,
    /// Constant term
    pub constant_factor: f32,
    /// Maximum bias
    pub clamp: f32,
    /// Slope term
    pub slope_factor: f32,
}

/// Depth test parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTest {
    /// Test against the depth buffer
    pub enabled: bool,
    /// Comparison
    pub comparison: CompareOperation,
    /// Write passing depths
    pub write: bool,
}

impl Default for DepthTest {
    fn default() -> Self {
        Self {
            enabled: false,
            comparison: CompareOperation::Never,
            write: false,
        }
    }
}

/// Stencil behaviour for one face orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFaceOperation {
    /// Applied when the stencil test fails
    pub stencil_fail: StencilOperation,
    /// Applied when the stencil test passes and the depth test fails
    pub depth_fail: StencilOperation,
    /// Applied when both pass
    pub success: StencilOperation,
    /// Stencil comparison
    pub compare: CompareOperation,
    /// Bits compared
    pub compare_mask: u32,
    /// Bits written
    pub write_mask: u32,
    /// Reference value
    pub reference: u32,
}

impl Default for StencilFaceOperation {
    fn default() -> Self {
        Self {
            stencil_fail: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            success: StencilOperation::Keep,
            compare: CompareOperation::Always,
            compare_mask: 0,
            write_mask: 0,
            reference: 0,
        }
    }
}

impl From<StencilFaceOperation> for vk::StencilOpState {
    fn from(op: StencilFaceOperation) -> Self {
        Self {
            fail_op: op.stencil_fail.into(),
            pass_op: op.success.into(),
            depth_fail_op: op.depth_fail.into(),
            compare_op: op.compare.into(),
            compare_mask: op.compare_mask,
            write_mask: op.write_mask,
            reference: op.reference,
        }
    }
}

/// Stencil test parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilTest {
    /// Test against the stencil buffer
    pub enabled: bool,
    /// Front-facing behaviour
    pub front: StencilFaceOperation,
    /// Back-facing behaviour
    pub back: StencilFaceOperation,
}

/// Blending for one colour attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendOptions {
    /// Blend instead of overwrite
    pub enabled: bool,
    /// Source colour factor
    pub src_color: BlendFactor,
    /// Destination colour factor
    pub dst_color: BlendFactor,
    /// Colour operator
    pub color_operation: BlendOperation,
    /// Source alpha factor
    pub src_alpha: BlendFactor,
    /// Destination alpha factor
    pub dst_alpha: BlendFactor,
    /// Alpha operator
    pub alpha_operation: BlendOperation,
    /// Channels written
    pub components: ColorComponents,
}

impl BlendOptions {
    /// Overwrite all channels
    pub const fn opaque() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_operation: BlendOperation::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_operation: BlendOperation::Add,
            components: ColorComponents::all(),
        }
    }

    /// Standard alpha blending
    pub const fn alpha_blended() -> Self {
        Self {
            enabled: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            color_operation: BlendOperation::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_operation: BlendOperation::Add,
            components: ColorComponents::all(),
        }
    }
}

impl Default for BlendOptions {
    fn default() -> Self {
        Self::opaque()
    }
}

impl From<BlendOptions> for vk::PipelineColorBlendAttachmentState {
    fn from(options: BlendOptions) -> Self {
        Self {
            blend_enable: vk::Bool32::from(options.enabled),
            src_color_blend_factor: options.src_color.into(),
            dst_color_blend_factor: options.dst_color.into(),
            color_blend_op: options.color_operation.into(),
            src_alpha_blend_factor: options.src_alpha.into(),
            dst_alpha_blend_factor: options.dst_alpha.into(),
            alpha_blend_op: options.alpha_operation.into(),
            color_write_mask: options.components.into(),
        }
    }
}

/// Fixed-function state of a pipeline
///
/// Unset optional parts take the defaults of [`RenderState::DEFAULT_CULLING`],
/// [`RenderState::DEFAULT_FRONT_FACE`] and [`RenderState::DEFAULT_LINE_WIDTH`],
/// with depth bias, depth test and stencil test disabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    /// Primitive topology
    pub topology: Topology,
    /// Polygon mode
    pub raster_mode: RasterMode,
    /// Discard primitives before rasterization
    pub discard_raster: bool,
    /// Line width for line topologies
    pub line_width: Option<f32>,
    /// Depth bias
    pub depth_bias: Option<DepthBias>,
    /// Depth test
    pub depth_test: Option<DepthTest>,
    /// Stencil test
    pub stencil_test: Option<StencilTest>,
    /// Face culling
    pub culling_mode: Option<CullingMode>,
    /// Front face winding
    pub front_face: Option<FrontFace>,
}

impl RenderState {
    /// Culling used when none is given
    pub const DEFAULT_CULLING: CullingMode = CullingMode::Back;
    /// Winding used when none is given
    pub const DEFAULT_FRONT_FACE: FrontFace = FrontFace::Clockwise;
    /// Line width used when none is given
    pub const DEFAULT_LINE_WIDTH: f32 = 1.0;

    /// Filled triangle lists with every optional part unset
    pub const fn triangles() -> Self {
        Self {
            topology: Topology::Triangles,
            raster_mode: RasterMode::Fill,
            discard_raster: false,
            line_width: None,
            depth_bias: None,
            depth_test: None,
            stencil_test: None,
            culling_mode: None,
            front_face: None,
        }
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::triangles()
    }
}

byte_enum! {
    /// Pipeline stage a shader runs in
    pub enum ShaderType {
        /// Vertex stage
        Vertex = 0,
        /// Fragment stage
        Fragment = 1,
    }
}

impl From<ShaderType> for vk::ShaderStageFlags {
    fn from(kind: ShaderType) -> Self {
        match kind {
            ShaderType::Vertex => Self::VERTEX,
            ShaderType::Fragment => Self::FRAGMENT,
        }
    }
}

/// A resource slot declared by a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderBinding {
    /// Uniform block laid out as tightly packed properties
    Uniform {
        /// Block size in bytes
        size: u32,
        /// Member types in declaration order
        properties: Vec<NumericType>,
    },
    /// Combined image sampler
    Texture,
}

impl ShaderBinding {
    /// Uniform block whose size is the sum of its members
    pub fn uniform(properties: Vec<NumericType>) -> Self {
        let size = properties.iter().map(|p| p.size()).sum();
        Self::Uniform { size, properties }
    }

    /// Descriptor type used for this binding
    pub const fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::Uniform { .. } => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            Self::Texture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    /// Uniform block size, or `None` for textures
    pub const fn uniform_size(&self) -> Option<u32> {
        match self {
            Self::Uniform { size, .. } => Some(*size),
            Self::Texture => None,
        }
    }
}

byte_enum! {
    /// Texel filtering
    pub enum TextureFiltering {
        /// Nearest texel
        Nearest = 0,
        /// Bilinear
        Linear = 1,
    }
}

impl From<TextureFiltering> for vk::Filter {
    fn from(filter: TextureFiltering) -> Self {
        match filter {
            TextureFiltering::Nearest => Self::NEAREST,
            TextureFiltering::Linear => Self::LINEAR,
        }
    }
}

byte_enum! {
    /// Addressing outside [0, 1]
    pub enum TextureWrapping {
        /// Tile
        Repeat = 0,
        /// Tile, mirroring every other repeat
        MirroredRepeat = 1,
        /// Clamp to the edge texel
        ClampToEdge = 2,
        /// Clamp to the border colour
        ClampToBorder = 3,
        /// Mirror once then clamp
        MirrorClampToEdge = 4,
    }
}

impl From<TextureWrapping> for vk::SamplerAddressMode {
    fn from(wrapping: TextureWrapping) -> Self {
        match wrapping {
            TextureWrapping::Repeat => Self::REPEAT,
            TextureWrapping::MirroredRepeat => Self::MIRRORED_REPEAT,
            TextureWrapping::ClampToEdge => Self::CLAMP_TO_EDGE,
            TextureWrapping::ClampToBorder => Self::CLAMP_TO_BORDER,
            TextureWrapping::MirrorClampToEdge => Self::MIRROR_CLAMP_TO_EDGE,
        }
    }
}

byte_enum! {
    /// Border colour for clamp-to-border sampling
    pub enum TextureBorderColor {
        /// (0, 0, 0, 0)
        TransparentBlack = 0,
        /// (0, 0, 0, 1)
        OpaqueBlack = 1,
        /// (1, 1, 1, 1)
        OpaqueWhite = 2,
    }
}

impl From<TextureBorderColor> for vk::BorderColor {
    fn from(color: TextureBorderColor) -> Self {
        match color {
            TextureBorderColor::TransparentBlack => Self::FLOAT_TRANSPARENT_BLACK,
            TextureBorderColor::OpaqueBlack => Self::FLOAT_OPAQUE_BLACK,
            TextureBorderColor::OpaqueWhite => Self::FLOAT_OPAQUE_WHITE,
        }
    }
}

/// Pixel rectangle
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extents2D {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Extents2D {
    /// Rectangle at the origin
    pub const fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Viewport covering the rectangle with the full depth range
    #[allow(clippy::cast_precision_loss)]
    pub fn viewport(self) -> vk::Viewport {
        vk::Viewport {
            x: self.x as f32,
            y: self.y as f32,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Scissor covering the rectangle
    #[allow(clippy::cast_possible_wrap)]
    pub const fn scissor(self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: self.x as i32,
                y: self.y as i32,
            },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }
}

/// Round `value` up to a multiple of `alignment` (zero means unaligned)
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}
