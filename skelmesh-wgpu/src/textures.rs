use crate::TextureProvider;
use crate::renderer::create_texture_bind_group;
use skelmesh::TextureLoader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to decode texture '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture '{}' is {width}x{height}, device limit is {limit}", path.display())]
    TooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        limit: u32,
    },
}

pub fn texture_format(srgb: bool) -> wgpu::TextureFormat {
    if srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

pub fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
    srgb: bool,
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format(srgb),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        texture.as_image_copy(),
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("skelmesh sampler"),
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        ..Default::default()
    })
}

/// One value per color space of the same source image.
#[derive(Debug)]
pub(crate) struct ColorSpaces<T> {
    linear: Option<T>,
    srgb: Option<T>,
}

impl<T> Default for ColorSpaces<T> {
    fn default() -> Self {
        Self {
            linear: None,
            srgb: None,
        }
    }
}

impl<T> ColorSpaces<T> {
    pub(crate) fn get(&self, srgb: bool) -> Option<&T> {
        if srgb {
            self.srgb.as_ref()
        } else {
            self.linear.as_ref()
        }
    }

    pub(crate) fn set(&mut self, srgb: bool, value: T) {
        if srgb {
            self.srgb = Some(value);
        } else {
            self.linear = Some(value);
        }
    }

    pub(crate) fn count(&self) -> usize {
        usize::from(self.linear.is_some()) + usize::from(self.srgb.is_some())
    }
}

/// GPU textures keyed by the path the importer resolved and the requested color space. Pass it
/// to the importer as its texture loader, then to the renderer as its texture provider.
pub struct TextureCache {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_groups: HashMap<PathBuf, ColorSpaces<wgpu::BindGroup>>,
}

impl TextureCache {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            layout: layout.clone(),
            sampler: create_default_sampler(device),
            bind_groups: HashMap::new(),
        }
    }

    /// Uploaded textures; a file loaded in both color spaces counts twice.
    pub fn len(&self) -> usize {
        self.bind_groups.values().map(ColorSpaces::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bind_groups.is_empty()
    }

    pub fn contains(&self, path: &Path, srgb: bool) -> bool {
        self.bind_groups
            .get(path)
            .is_some_and(|spaces| spaces.get(srgb).is_some())
    }

    pub fn clear(&mut self) {
        self.bind_groups.clear();
    }

    /// Uploads `path` in the requested color space unless it is already resident in it.
    pub fn load(&mut self, path: &Path, srgb: bool) -> Result<(), UploadError> {
        if self.contains(path, srgb) {
            return Ok(());
        }
        if self.contains(path, !srgb) {
            log::debug!(
                "texture {} is used as both sRGB and linear; uploading a second copy",
                path.display()
            );
        }
        let image = image::open(path)
            .map_err(|source| UploadError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(UploadError::TooLarge {
                path: path.to_path_buf(),
                width,
                height,
                limit,
            });
        }

        let label = path.to_string_lossy();
        let texture = upload_rgba8(
            &self.device,
            &self.queue,
            &label,
            width,
            height,
            image.as_raw(),
            srgb,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group =
            create_texture_bind_group(&self.device, &self.layout, &view, &self.sampler);
        log::debug!(
            "uploaded texture {} ({width}x{height}, srgb: {srgb})",
            path.display()
        );
        self.bind_groups
            .entry(path.to_path_buf())
            .or_default()
            .set(srgb, bind_group);
        Ok(())
    }
}

impl TextureLoader for TextureCache {
    fn ensure_texture_loaded(&mut self, path: &Path, srgb: bool) -> bool {
        match self.load(path, srgb) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{e}");
                false
            }
        }
    }
}

impl TextureProvider for TextureCache {
    fn bind_group_for(&self, texture_path: &Path, srgb: bool) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(texture_path)?.get(srgb)
    }
}
