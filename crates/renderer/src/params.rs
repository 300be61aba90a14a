//! Parameter blocks shared with the shaders.
//!
//! Every block is `#[repr(C)]`, `Pod`, and laid out to match the std140
//! declarations in `shaders/`. Members are grouped so that each `vec3` is
//! followed by a scalar, which keeps std140 and the Rust layout identical
//! without implicit padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use vesper_core::{LightingConfig, WaterConfig, wrapped_phase};
use vesper_scene::{Camera, DirectionalLight, MAX_POINT_LIGHTS, PointLight, SceneLights};

/// Ray-march settings. The standalone SSR pass and the water shader each
/// hold their own instance.
pub use vesper_core::SsrConfig as SsrSettings;

/// Camera, sun and point lights for the geometry passes (set 0).
///
/// # Memory Layout
///
/// - Offset 0: view, projection, view_projection (192 bytes)
/// - Offset 192: camera position + point light count
/// - Offset 208: sun (32 bytes)
/// - Offset 240: point lights (4 x 32 bytes)
/// - Offset 368: ambient
/// - Total size: 384 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraLightUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec3,
    pub point_light_count: u32,
    pub sun: DirectionalLight,
    pub point_lights: [PointLight; MAX_POINT_LIGHTS],
    pub ambient: Vec3,
    pub _pad0: f32,
}

impl CameraLightUniform {
    pub fn new(camera: &Camera, lights: &SceneLights, lighting: &LightingConfig) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();

        let mut point_lights = [PointLight::zeroed(); MAX_POINT_LIGHTS];
        let count = lights.point_lights().len().min(MAX_POINT_LIGHTS);
        point_lights[..count].copy_from_slice(&lights.point_lights()[..count]);

        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position: camera.position,
            point_light_count: count as u32,
            sun: lights.sun,
            point_lights,
            ambient: Vec3::from(lighting.ambient),
            _pad0: 0.0,
        }
    }
}

/// std140 mirror of [`SsrSettings`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SsrParams {
    pub max_distance: f32,
    pub max_steps: u32,
    pub thickness: f32,
    pub _pad0: f32,
}

impl From<&SsrSettings> for SsrParams {
    fn from(settings: &SsrSettings) -> Self {
        Self {
            max_distance: settings.max_distance,
            max_steps: settings.max_steps,
            thickness: settings.thickness,
            _pad0: 0.0,
        }
    }
}

/// Screen size and clip planes, needed to project and linearize depth.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ScreenParams {
    pub size: Vec2,
    pub near: f32,
    pub far: f32,
}

impl ScreenParams {
    pub fn new(camera: &Camera, width: u32, height: u32) -> Self {
        Self {
            size: Vec2::new(width as f32, height as f32),
            near: camera.near,
            far: camera.far,
        }
    }
}

/// Inputs of the standalone reflection pass (160 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SsrUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub screen: ScreenParams,
    pub ssr: SsrParams,
}

impl SsrUniform {
    pub fn new(camera: &Camera, width: u32, height: u32, settings: &SsrSettings) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            screen: ScreenParams::new(camera, width, height),
            ssr: settings.into(),
        }
    }
}

/// Inputs of the deferred lighting composite (64 bytes).
///
/// Only the primary point light is evaluated; without one, `light` is zeroed
/// and only ambient remains.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightingUniform {
    pub camera_position: Vec3,
    pub _pad0: f32,
    pub light: PointLight,
    pub ambient: Vec3,
    pub _pad1: f32,
}

impl LightingUniform {
    pub fn new(camera: &Camera, lights: &SceneLights, lighting: &LightingConfig) -> Self {
        Self {
            camera_position: camera.position,
            _pad0: 0.0,
            light: lights
                .primary_point_light()
                .copied()
                .unwrap_or_else(PointLight::zeroed),
            ambient: Vec3::from(lighting.ambient),
            _pad1: 0.0,
        }
    }
}

/// Inputs of the water surface shaders (288 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct WaterUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec3,
    /// `time * wave_speed` wrapped to `[0, 2π)`.
    pub wave_phase: f32,
    pub color: Vec3,
    pub opacity: f32,
    pub sun_direction: Vec3,
    pub sun_intensity: f32,
    pub wave_strength: f32,
    pub fresnel_power: f32,
    pub _pad0: [f32; 2],
    pub screen: ScreenParams,
    pub ssr: SsrParams,
}

/// Per-frame values the water uniform is built from.
#[derive(Clone, Copy, Debug)]
pub struct WaterFrame<'a> {
    pub camera: &'a Camera,
    pub lights: &'a SceneLights,
    pub water: &'a WaterConfig,
    pub ssr: &'a SsrSettings,
    /// Simulation time in seconds.
    pub time: f64,
    pub width: u32,
    pub height: u32,
}

impl WaterUniform {
    pub fn new(frame: &WaterFrame<'_>) -> Self {
        let view = frame.camera.view_matrix();
        let projection = frame.camera.projection_matrix();
        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position: frame.camera.position,
            wave_phase: wrapped_phase(frame.time, f64::from(frame.water.wave_speed)),
            color: Vec3::from(frame.water.color),
            opacity: frame.water.opacity,
            sun_direction: frame.lights.sun.direction,
            sun_intensity: frame.lights.sun.intensity,
            wave_strength: frame.water.wave_strength,
            fresnel_power: frame.water.fresnel_power,
            _pad0: [0.0; 2],
            screen: ScreenParams::new(frame.camera, frame.width, frame.height),
            ssr: frame.ssr.into(),
        }
    }
}

/// Per-draw push constants for the G-buffer and forward passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub model: Mat4,
    pub normal_matrix: Mat4,
}

impl DrawPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(model: Mat4) -> Self {
        Self {
            model,
            normal_matrix: vesper_scene::normal_matrix(model),
        }
    }
}

/// Push constants of the water vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WaterPushConstants {
    pub model: Mat4,
}

impl WaterPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_block_sizes() {
        assert_eq!(size_of::<CameraLightUniform>(), 384);
        assert_eq!(size_of::<SsrUniform>(), 160);
        assert_eq!(size_of::<LightingUniform>(), 64);
        assert_eq!(size_of::<WaterUniform>(), 288);
        assert_eq!(size_of::<DrawPushConstants>(), 128);
        assert_eq!(size_of::<WaterPushConstants>(), 64);
    }

    #[test]
    fn test_blocks_are_vec4_multiples() {
        for size in [
            size_of::<CameraLightUniform>(),
            size_of::<SsrUniform>(),
            size_of::<LightingUniform>(),
            size_of::<WaterUniform>(),
        ] {
            assert_eq!(size % 16, 0);
        }
    }

    #[test]
    fn test_std140_offsets() {
        assert_eq!(offset_of!(CameraLightUniform, camera_position), 192);
        assert_eq!(offset_of!(CameraLightUniform, point_light_count), 204);
        assert_eq!(offset_of!(CameraLightUniform, sun), 208);
        assert_eq!(offset_of!(CameraLightUniform, point_lights), 240);
        assert_eq!(offset_of!(CameraLightUniform, ambient), 368);

        assert_eq!(offset_of!(SsrUniform, screen), 128);
        assert_eq!(offset_of!(SsrUniform, ssr), 144);

        assert_eq!(offset_of!(LightingUniform, light), 16);
        assert_eq!(offset_of!(LightingUniform, ambient), 48);

        assert_eq!(offset_of!(WaterUniform, camera_position), 192);
        assert_eq!(offset_of!(WaterUniform, wave_phase), 204);
        assert_eq!(offset_of!(WaterUniform, wave_strength), 240);
        assert_eq!(offset_of!(WaterUniform, screen), 256);
        assert_eq!(offset_of!(WaterUniform, ssr), 272);
    }

    #[test]
    fn test_camera_light_clamps_and_zero_fills() {
        let camera = Camera::default();
        let lights = SceneLights::default().with_point_light(PointLight::default());
        let block = CameraLightUniform::new(&camera, &lights, &LightingConfig::default());
        assert_eq!(block.point_light_count, 1);
        assert_eq!(block.point_lights[0], PointLight::default());
        assert_eq!(block.point_lights[1], PointLight::zeroed());
        assert_eq!(
            block.view_projection,
            camera.projection_matrix() * camera.view_matrix()
        );
    }

    #[test]
    fn test_lighting_without_point_light() {
        let block = LightingUniform::new(
            &Camera::default(),
            &SceneLights::default(),
            &LightingConfig::default(),
        );
        assert_eq!(block.light.intensity, 0.0);
    }

    #[test]
    fn test_ssr_settings_are_independent() {
        let camera = Camera::default();
        let standalone = SsrUniform::new(&camera, 640, 480, &SsrSettings::STANDALONE);
        let water = WaterUniform::new(&WaterFrame {
            camera: &camera,
            lights: &SceneLights::default(),
            water: &WaterConfig::default(),
            ssr: &SsrSettings::WATER,
            time: 1.5,
            width: 640,
            height: 480,
        });
        assert_eq!(standalone.ssr.max_steps, SsrSettings::STANDALONE.max_steps);
        assert_eq!(water.ssr.max_steps, SsrSettings::WATER.max_steps);
        // Default wave speed is 1 rad/s.
        assert_eq!(water.wave_phase, 1.5);
        assert_eq!(water.screen.size, Vec2::new(640.0, 480.0));
    }

    #[test]
    fn test_push_constants_normal_matrix() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let push = DrawPushConstants::new(model);
        assert_eq!(push.model, model);
        assert_eq!(push.normal_matrix, model.inverse().transpose());
    }
}
