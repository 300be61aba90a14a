//! Material texture loading with default fallbacks.
//!
//! A texture that is absent or fails to load resolves to a 1x1 default for
//! its role. Failures are logged once per path and never reach the caller.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use vesper_rhi::descriptor::image_info;
use vesper_rhi::device::Device;
use vesper_rhi::sampler::{Sampler, SamplerKind};
use vesper_rhi::texture::Texture;
use vesper_rhi::vk;

use crate::error::{ResourceError, ResourceResult};

/// Which material slot a texture fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRole {
    Albedo,
    Normal,
    MetallicRoughness,
}

impl TextureRole {
    pub const ALL: [TextureRole; 3] = [
        TextureRole::Albedo,
        TextureRole::Normal,
        TextureRole::MetallicRoughness,
    ];

    /// Albedo is color data; the others are linear.
    pub fn format(self) -> vk::Format {
        match self {
            TextureRole::Albedo => vk::Format::R8G8B8A8_SRGB,
            TextureRole::Normal | TextureRole::MetallicRoughness => vk::Format::R8G8B8A8_UNORM,
        }
    }

    /// Texel used when no texture is available: white, a +Z tangent-space
    /// normal, and non-metallic with mid roughness (G = roughness, B = metallic).
    pub fn default_texel(self) -> [u8; 4] {
        match self {
            TextureRole::Albedo => [255, 255, 255, 255],
            TextureRole::Normal => [128, 128, 255, 255],
            TextureRole::MetallicRoughness => [0, 128, 0, 255],
        }
    }

    fn index(self) -> usize {
        match self {
            TextureRole::Albedo => 0,
            TextureRole::Normal => 1,
            TextureRole::MetallicRoughness => 2,
        }
    }

    fn default_name(self) -> &'static str {
        match self {
            TextureRole::Albedo => "default_albedo",
            TextureRole::Normal => "default_normal",
            TextureRole::MetallicRoughness => "default_metallic_roughness",
        }
    }
}

/// Decoded RGBA8 pixels.
#[derive(Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// Reads and decodes an image file into tightly packed RGBA8.
pub fn decode_rgba8(path: &Path) -> ResourceResult<DecodedImage> {
    let bytes = std::fs::read(path).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|source| ResourceError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = image.to_rgba8();

    Ok(DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    })
}

/// Loads material textures on demand and caches them by path and role.
pub struct TextureManager {
    device: Arc<Device>,
    sampler: Sampler,
    defaults: [Texture; 3],
    loaded: HashMap<(PathBuf, TextureRole), Texture>,
    failed: HashSet<(PathBuf, TextureRole)>,
}

impl TextureManager {
    /// Creates the shared sampler and uploads the three default textures.
    pub fn new(device: Arc<Device>) -> ResourceResult<Self> {
        let sampler = Sampler::new(device.clone(), SamplerKind::LinearRepeat)?;
        let [albedo, normal, metallic_roughness] = TextureRole::ALL;
        let defaults = [
            Self::default_texture(&device, albedo)?,
            Self::default_texture(&device, normal)?,
            Self::default_texture(&device, metallic_roughness)?,
        ];
        info!("Texture manager ready with default fallbacks");

        Ok(Self {
            device,
            sampler,
            defaults,
            loaded: HashMap::new(),
            failed: HashSet::new(),
        })
    }

    fn default_texture(device: &Arc<Device>, role: TextureRole) -> ResourceResult<Texture> {
        Ok(Texture::solid(
            device.clone(),
            role.default_name(),
            role.format(),
            role.default_texel(),
        )?)
    }

    /// Resolves `path` for `role` to an image view.
    ///
    /// Uploads on first use. `None`, a missing file, a decode failure or an
    /// upload failure all yield the role's default view.
    pub fn resolve(&mut self, path: Option<&Path>, role: TextureRole) -> vk::ImageView {
        let Some(path) = path else {
            return self.default_view(role);
        };

        let key = (path.to_path_buf(), role);
        if let Some(texture) = self.loaded.get(&key) {
            return texture.view();
        }
        if self.failed.contains(&key) {
            return self.default_view(role);
        }

        match self.load(path, role) {
            Ok(texture) => {
                let view = texture.view();
                self.loaded.insert(key, texture);
                view
            }
            Err(e) => {
                warn!("Using default {:?} texture for '{}': {}", role, path.display(), e);
                self.failed.insert(key);
                self.default_view(role)
            }
        }
    }

    /// [`resolve`](Self::resolve) packaged as a descriptor image info.
    pub fn descriptor(
        &mut self,
        path: Option<&Path>,
        role: TextureRole,
    ) -> vk::DescriptorImageInfo {
        let view = self.resolve(path, role);
        image_info(
            self.sampler.handle(),
            view,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    fn load(&self, path: &Path, role: TextureRole) -> ResourceResult<Texture> {
        let decoded = decode_rgba8(path)?;
        let texture = Texture::from_rgba8(
            self.device.clone(),
            "material_texture",
            decoded.extent(),
            role.format(),
            &decoded.pixels,
        )?;
        debug!(
            "Loaded {:?} texture '{}' ({}x{})",
            role,
            path.display(),
            decoded.width,
            decoded.height
        );
        Ok(texture)
    }

    #[inline]
    pub fn default_view(&self, role: TextureRole) -> vk::ImageView {
        self.defaults[role.index()].view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Number of textures successfully loaded from disk.
    #[inline]
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_texels() {
        assert_eq!(TextureRole::Albedo.default_texel(), [255; 4]);
        assert_eq!(TextureRole::Normal.default_texel(), [128, 128, 255, 255]);
        assert_eq!(TextureRole::Albedo.format(), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(TextureRole::Normal.format(), vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_role_indices_are_distinct() {
        let mut indices: Vec<usize> = TextureRole::ALL.iter().map(|r| r.index()).collect();
        indices.dedup();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_decode_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let mut img = image::RgbaImage::new(2, 3);
        img.put_pixel(1, 2, image::Rgba([10, 20, 30, 40]));
        img.save(&path).unwrap();

        let decoded = decode_rgba8(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 3));
        assert_eq!(decoded.pixels.len(), 2 * 3 * 4);
        assert_eq!(&decoded.pixels[(2 * 2 + 1) * 4..][..4], &[10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_rgba8(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, ResourceError::Io { .. }));
    }

    #[test]
    fn test_decode_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = decode_rgba8(&path).unwrap_err();
        assert!(matches!(err, ResourceError::Image { .. }));
    }
}
