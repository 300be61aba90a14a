//! The resource context handed to the renderer.

use std::sync::Arc;

use vesper_rhi::device::Device;
use vesper_rhi::vk;

use crate::error::ResourceResult;
use crate::material::MaterialIdentity;
use crate::mesh::{MeshData, MeshHandle, MeshRegistry};
use crate::texture::{TextureManager, TextureRole};

/// Meshes and textures for one device.
///
/// Constructed explicitly and passed by reference to whoever needs it; the
/// renderer reads it while recording and mutates it only between frames.
pub struct ResourceContext {
    meshes: MeshRegistry,
    textures: TextureManager,
}

impl ResourceContext {
    pub fn new(device: Arc<Device>) -> ResourceResult<Self> {
        Ok(Self {
            meshes: MeshRegistry::new(device.clone()),
            textures: TextureManager::new(device)?,
        })
    }

    pub fn upload_mesh(&mut self, name: &str, data: &MeshData) -> ResourceResult<MeshHandle> {
        self.meshes.upload(name, data)
    }

    #[inline]
    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    #[inline]
    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    #[inline]
    pub fn textures_mut(&mut self) -> &mut TextureManager {
        &mut self.textures
    }

    /// Image infos for a material's albedo, normal and metallic/roughness
    /// slots, in binding order. Missing textures resolve to defaults.
    pub fn material_images(&mut self, material: &MaterialIdentity) -> [vk::DescriptorImageInfo; 3] {
        [
            self.textures
                .descriptor(material.albedo_path(), TextureRole::Albedo),
            self.textures
                .descriptor(material.normal_path(), TextureRole::Normal),
            self.textures.descriptor(
                material.metallic_roughness_path(),
                TextureRole::MetallicRoughness,
            ),
        ]
    }
}
