//! Per-frame input handed from the scene to the renderer.

use glam::{Mat4, Vec3};
use vesper_resources::{MaterialIdentity, MeshHandle};

use crate::camera::Camera;
use crate::light::SceneLights;

/// One visible object.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    pub model: Mat4,
    pub mesh: MeshHandle,
    pub material: MaterialIdentity,
}

impl DrawItem {
    pub fn new(model: Mat4, mesh: MeshHandle, material: MaterialIdentity) -> Self {
        Self {
            model,
            mesh,
            material,
        }
    }
}

/// Placement of the water surface for a frame.
///
/// The water mesh itself belongs to the water pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterSurface {
    pub model: Mat4,
}

impl WaterSurface {
    /// A surface translated vertically to `height`.
    pub fn at_height(height: f32) -> Self {
        Self {
            model: Mat4::from_translation(Vec3::new(0.0, height, 0.0)),
        }
    }
}

impl Default for WaterSurface {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
        }
    }
}

/// Everything the renderer needs to record one frame.
///
/// `draws` is in submission order; the renderer does not sort it.
#[derive(Clone, Copy, Debug)]
pub struct FrameParameters<'a> {
    pub camera: &'a Camera,
    pub lights: &'a SceneLights,
    pub draws: &'a [DrawItem],
    pub water: Option<WaterSurface>,
}

impl<'a> FrameParameters<'a> {
    pub fn new(camera: &'a Camera, lights: &'a SceneLights, draws: &'a [DrawItem]) -> Self {
        Self {
            camera,
            lights,
            draws,
            water: None,
        }
    }

    pub fn with_water(mut self, water: WaterSurface) -> Self {
        self.water = Some(water);
        self
    }

    /// Whether anything in the frame consumes screen-space reflections.
    ///
    /// The water surface is the only reader of the reflection buffer.
    #[inline]
    pub fn has_reflective_content(&self) -> bool {
        self.water.is_some()
    }
}
