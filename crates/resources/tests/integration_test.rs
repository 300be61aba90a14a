//! GPU-backed tests for the resource context.
//!
//! Skipped when no Vulkan 1.3 device is available.

use std::sync::Arc;

use vesper_resources::{MaterialIdentity, MeshData, ResourceContext, ResourceError, TextureRole};
use vesper_rhi::device::Device;
use vesper_rhi::instance::Instance;
use vesper_rhi::physical_device::select_physical_device;

fn headless_device() -> Option<(Instance, Arc<Device>)> {
    let instance = match Instance::headless(false) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Skipping test: no Vulkan loader ({e})");
            return None;
        }
    };
    let info = match select_physical_device(instance.handle(), None) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Skipping test: no suitable GPU ({e})");
            return None;
        }
    };
    let device = Device::new(&instance, &info).expect("device creation failed");
    Some((instance, device))
}

#[test]
fn test_missing_textures_fall_back_to_defaults() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let mut resources = ResourceContext::new(device).unwrap();

    let material = MaterialIdentity::new(
        Some("does/not/exist.png".into()),
        None,
        Some("also/missing.png".into()),
    );
    let images = resources.material_images(&material);

    let textures = resources.textures();
    assert_eq!(images[0].image_view, textures.default_view(TextureRole::Albedo));
    assert_eq!(images[1].image_view, textures.default_view(TextureRole::Normal));
    assert_eq!(
        images[2].image_view,
        textures.default_view(TextureRole::MetallicRoughness)
    );
    assert_eq!(textures.loaded_count(), 0);
}

#[test]
fn test_texture_loaded_once_per_path() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let mut resources = ResourceContext::new(device).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("red.png");
    image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
        .save(&path)
        .unwrap();

    let material = MaterialIdentity::albedo(&path);
    let first = resources.material_images(&material);
    let second = resources.material_images(&material);

    assert_eq!(first[0].image_view, second[0].image_view);
    assert_ne!(
        first[0].image_view,
        resources.textures().default_view(TextureRole::Albedo)
    );
    assert_eq!(resources.textures().loaded_count(), 1);
}

#[test]
fn test_mesh_upload_and_lookup() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let mut resources = ResourceContext::new(device).unwrap();

    let cube = resources.upload_mesh("cube", &MeshData::cube()).unwrap();
    let water = resources
        .upload_mesh("water", &MeshData::grid(8.0, 8, 0.0))
        .unwrap();

    assert_ne!(cube, water);
    assert_eq!(resources.meshes().len(), 2);
    assert_eq!(resources.meshes().require(cube).unwrap().index_count(), 36);
    assert_eq!(resources.meshes().name(water), Some("water"));

    let err = resources
        .upload_mesh("empty", &MeshData::default())
        .unwrap_err();
    assert!(matches!(err, ResourceError::InvalidMesh { .. }));
    assert_eq!(resources.meshes().len(), 2);
}
