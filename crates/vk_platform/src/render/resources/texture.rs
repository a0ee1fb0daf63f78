//! Textures, samplers and texture descriptor bindings

use std::sync::{Arc, Mutex, Weak};

use ash::vk;

use crate::foundation::sync::lock;
use crate::render::dependents::{Dependent, Dependents};
use crate::render::device::{DeviceImage, GpuDevice, SamplerDesc};
use crate::render::resources::{FramebufferTexture, Shader};
use crate::render::ticking::{StageCursor, Ticking};
use crate::render::types::{
    ShaderBinding, TextureBorderColor, TextureFiltering, TextureFormat, TextureWrapping,
};
use crate::render::{RenderError, RenderResult};

const DESCRIPTOR_TYPE: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

/// Image uploaded once from host pixels
pub struct StaticTexture<D: GpuDevice> {
    image: D::Image,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl<D: GpuDevice> StaticTexture<D> {
    /// Upload tightly packed `pixels`
    pub fn new(
        device: &D,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: &[u8],
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidOperation(format!(
                "texture size {width}x{height}"
            )));
        }
        if format.is_depth_stencil() {
            return Err(RenderError::InvalidOperation(
                "depth/stencil formats cannot be uploaded".to_string(),
            ));
        }
        let expected =
            u64::from(width) * u64::from(height) * u64::from(format.bytes_per_pixel());
        if pixels.len() as u64 != expected {
            return Err(RenderError::InvalidOperation(format!(
                "{width}x{height} {format:?} texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        let image = device.create_texture_image(width, height, format.vk_format(), pixels)?;
        Ok(Self {
            image,
            width,
            height,
            format,
        })
    }

    /// Pixel format
    pub const fn format(&self) -> TextureFormat {
        self.format
    }
}

/// Anything a shader can sample
pub enum Texture<D: GpuDevice> {
    /// Uploaded image
    Static(Arc<StaticTexture<D>>),
    /// Attachment of an offscreen framebuffer
    Attachment(FramebufferTexture<D>),
}

impl<D: GpuDevice> Clone for Texture<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(texture) => Self::Static(texture.clone()),
            Self::Attachment(texture) => Self::Attachment(texture.clone()),
        }
    }
}

impl<D: GpuDevice> Texture<D> {
    /// View to sample this frame
    pub fn view(&self) -> RenderResult<vk::ImageView> {
        match self {
            Self::Static(texture) => Ok(texture.image.view()),
            Self::Attachment(texture) => texture.view(),
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        match self {
            Self::Static(texture) => texture.width,
            Self::Attachment(texture) => texture.framebuffer().extent().width,
        }
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        match self {
            Self::Static(texture) => texture.height,
            Self::Attachment(texture) => texture.framebuffer().extent().height,
        }
    }

    /// Attachment views move every frame and must be rebound
    const fn is_moving(&self) -> bool {
        matches!(self, Self::Attachment(_))
    }
}

/// Filtering and addressing for sampled textures
pub struct TextureSampler<D: GpuDevice> {
    device: Arc<D>,
    sampler: vk::Sampler,
    desc: SamplerDesc,
}

impl<D: GpuDevice> TextureSampler<D> {
    /// Create a sampler; `anisotropy` of `None` or below 1 disables it
    pub fn new(
        device: Arc<D>,
        min_filter: TextureFiltering,
        mag_filter: TextureFiltering,
        wrapping: TextureWrapping,
        border_color: TextureBorderColor,
        anisotropy: Option<f32>,
    ) -> RenderResult<Self> {
        let desc = SamplerDesc {
            min_filter: min_filter.into(),
            mag_filter: mag_filter.into(),
            address_mode: wrapping.into(),
            border_color: border_color.into(),
            max_anisotropy: anisotropy.filter(|&a| a >= 1.0),
        };
        let sampler = device.create_sampler(&desc)?;
        Ok(Self {
            device,
            sampler,
            desc,
        })
    }

    /// Sampler handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    /// Settings the sampler was created with
    pub const fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl<D: GpuDevice> Drop for TextureSampler<D> {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.sampler);
    }
}

struct Sampled<D: GpuDevice> {
    sampler: Arc<TextureSampler<D>>,
    texture: Texture<D>,
}

impl<D: GpuDevice> Clone for Sampled<D> {
    fn clone(&self) -> Self {
        Self {
            sampler: self.sampler.clone(),
            texture: self.texture.clone(),
        }
    }
}

struct TextureSlots<D: GpuDevice> {
    cursor: StageCursor,
    current: Option<Sampled<D>>,
    bound: Vec<Option<Sampled<D>>>,
    written: Vec<Option<(vk::Sampler, vk::ImageView)>>,
}

/// One descriptor set per stage pointing a shader binding at a sampled texture
///
/// Attachment textures are re-resolved on every tick so each set samples the
/// image its framebuffer rendered last; a set is only rewritten when the
/// resolved view differs from what it already holds.
pub struct TextureBinding<D: GpuDevice> {
    device: Arc<D>,
    shader: Arc<Shader<D>>,
    binding: u32,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    slots: Mutex<TextureSlots<D>>,
    dependents: Dependents,
}

impl<D: GpuDevice> TextureBinding<D> {
    /// Binding for texture `binding` of `shader`
    pub fn new(
        device: Arc<D>,
        shader: Arc<Shader<D>>,
        binding: u32,
        stages: usize,
    ) -> RenderResult<Self> {
        if *shader.binding(binding)? != ShaderBinding::Texture {
            return Err(RenderError::InvalidOperation(format!(
                "shader binding {binding} is not a texture"
            )));
        }
        let cursor = StageCursor::new(stages);
        let count = cursor.stages();
        let (pool, sets) = device.allocate_descriptor_sets(
            shader.set_layout(binding)?,
            DESCRIPTOR_TYPE,
            u32::try_from(count)
                .map_err(|_| RenderError::InvalidOperation("too many stages".to_string()))?,
        )?;
        Ok(Self {
            device,
            shader,
            binding,
            pool,
            sets,
            slots: Mutex::new(TextureSlots {
                cursor,
                current: None,
                bound: (0..count).map(|_| None).collect(),
                written: vec![None; count],
            }),
            dependents: Dependents::new(),
        })
    }

    /// Sample `texture` through `sampler` from the coming ticks on
    pub fn update(&self, sampler: Arc<TextureSampler<D>>, texture: Texture<D>) {
        let mut slots = lock(&self.slots);
        slots.current = Some(Sampled { sampler, texture });
        slots.cursor.mark_written();
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

    pub(crate) fn register_dependent(&self, dependent: Weak<dyn Dependent>) {
        self.dependents.register(dependent);
    }

    #[cfg(test)]
    pub(crate) fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }
}

impl<D: GpuDevice> Ticking for TextureBinding<D> {
    fn tick(&self) -> RenderResult<()> {
        let mut changed = false;
        {
            let mut guard = lock(&self.slots);
            let TextureSlots {
                cursor,
                current,
                bound,
                written,
            } = &mut *guard;
            if current.as_ref().is_some_and(|s| s.texture.is_moving()) {
                cursor.mark_written();
            }
            cursor.tick_with(|slot| {
                if let Some(sampled) = current.as_ref() {
                    let target = (sampled.sampler.handle(), sampled.texture.view()?);
                    if written[slot] != Some(target) {
                        self.device
                            .write_image_descriptor(self.sets[slot], target.0, target.1);
                        written[slot] = Some(target);
                        changed = true;
                    }
                }
                bound[slot].clone_from(current);
                Ok(())
            })?;
        }
        if changed {
            self.dependents.notify();
        }
        Ok(())
    }
}

impl<D: GpuDevice> Drop for TextureBinding<D> {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::resources::{Framebuffer, FramebufferFormat};
    use crate::render::testing::{Call, MockDevice, SPIRV};
    use crate::render::types::{AttachmentDescriptor, RenderStageDescriptor, ShaderType};

    fn shader(device: &Arc<MockDevice>) -> Arc<Shader<MockDevice>> {
        Arc::new(
            Shader::new(
                device.clone(),
                ShaderType::Fragment,
                &SPIRV,
                vec![ShaderBinding::Texture],
            )
            .unwrap(),
        )
    }

    fn sampler(device: &Arc<MockDevice>) -> Arc<TextureSampler<MockDevice>> {
        Arc::new(
            TextureSampler::new(
                device.clone(),
                TextureFiltering::Linear,
                TextureFiltering::Nearest,
                TextureWrapping::ClampToEdge,
                TextureBorderColor::OpaqueBlack,
                Some(0.5),
            )
            .unwrap(),
        )
    }

    fn image_writes(device: &MockDevice) -> Vec<(vk::DescriptorSet, vk::ImageView)> {
        device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WriteImageDescriptor { set, view } => Some((set, view)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_pixel_size_checked() {
        let device = MockDevice::new();
        assert!(StaticTexture::new(&*device, 2, 2, TextureFormat::R8G8B8A8Srgb, &[0; 15]).is_err());
        assert!(StaticTexture::new(&*device, 0, 2, TextureFormat::R8G8B8A8Srgb, &[]).is_err());
        assert!(
            StaticTexture::new(&*device, 1, 1, TextureFormat::D32SfloatS8Uint, &[0; 8]).is_err()
        );
        let texture =
            StaticTexture::new(&*device, 2, 2, TextureFormat::B8G8R8A8Srgb, &[0; 16]).unwrap();
        assert_eq!(texture.format(), TextureFormat::B8G8R8A8Srgb);
    }

    #[test]
    fn test_low_anisotropy_disabled() {
        let device = MockDevice::new();
        assert_eq!(sampler(&device).desc().max_anisotropy, None);
    }

    #[test]
    fn test_uniform_binding_index_rejected() {
        let device = MockDevice::new();
        let shader = Arc::new(
            Shader::new(
                device.clone(),
                ShaderType::Vertex,
                &SPIRV,
                vec![ShaderBinding::uniform(Vec::new())],
            )
            .unwrap(),
        );
        assert!(TextureBinding::new(device, shader, 0, 2).is_err());
    }

    #[test]
    fn test_static_texture_written_once_per_slot() {
        let device = MockDevice::new();
        let texture = Texture::Static(Arc::new(
            StaticTexture::new(&*device, 1, 1, TextureFormat::R8G8B8A8Srgb, &[255; 4]).unwrap(),
        ));
        let view = texture.view().unwrap();
        let binding = TextureBinding::new(device.clone(), shader(&device), 0, 3).unwrap();
        binding.update(sampler(&device), texture);

        for _ in 0..6 {
            binding.tick().unwrap();
        }

        let writes = image_writes(&device);
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|(_, v)| *v == view));
        for slot in 0..3 {
            assert!(writes.iter().any(|(set, _)| *set == binding.set(slot)));
        }
    }

    #[test]
    fn test_attachment_texture_tracks_last_render() {
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
        let framebuffer =
            Arc::new(Framebuffer::offscreen(device.clone(), format, 4, 4, 2).unwrap());
        let texture = framebuffer.texture(0).unwrap();
        let binding = TextureBinding::new(device.clone(), shader(&device), 0, 2).unwrap();
        binding.update(sampler(&device), Texture::Attachment(texture.clone()));

        for _ in 0..4 {
            binding.tick().unwrap();
            let sampled = image_writes(&device)
                .into_iter()
                .rev()
                .find(|(set, _)| *set == binding.descriptor_set())
                .map(|(_, view)| view);
            assert_eq!(sampled, Some(texture.view().unwrap()));
            framebuffer.advance();
        }
        assert_eq!(image_writes(&device).len(), 2);
    }
}
