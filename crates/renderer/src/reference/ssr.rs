//! Screen-space reflection march, as run by `ssr.frag` and the inline march
//! in `water.frag`.

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use vesper_scene::{Camera, linearize_depth};

use crate::params::SsrSettings;
use crate::reference::{GBufferTexel, ScreenImage};

/// Surfaces at or above this roughness get no reflection.
pub const MAX_REFLECTIVE_ROUGHNESS: f32 = 0.8;

/// Camera state the march needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarchView {
    pub view: Mat4,
    pub projection: Mat4,
    pub near: f32,
    pub far: f32,
}

impl MarchView {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            near: camera.near,
            far: camera.far,
        }
    }

    /// Screen coordinate of a view-space point, or `None` behind the camera.
    pub fn project(&self, view_pos: Vec3) -> Option<Vec2> {
        let clip = self.projection * view_pos.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        Some(clip.xy() / clip.w * 0.5 + 0.5)
    }
}

pub fn is_reflective(texel: &GBufferTexel) -> bool {
    texel.covered() && texel.roughness() < MAX_REFLECTIVE_ROUGHNESS
}

/// Alpha written for a hit.
pub fn reflection_strength(texel: &GBufferTexel) -> f32 {
    (1.0 - texel.roughness()).clamp(0.0, 1.0)
}

/// Marches the reflection of the view ray at `origin` (view space) about
/// `normal` (view space) and returns the screen coordinate of the first hit.
///
/// `depth` holds stored reverse-Z values. A sample hits when it lies behind
/// the stored surface by less than `settings.thickness`.
pub fn march(
    origin: Vec3,
    normal: Vec3,
    view: &MarchView,
    settings: &SsrSettings,
    depth: &ScreenImage<f32>,
) -> Option<Vec2> {
    let incident = origin.try_normalize()?;
    let normal = normal.try_normalize()?;
    let ray = incident.reflect(normal);
    if settings.max_steps == 0 {
        return None;
    }
    let step = settings.max_distance / settings.max_steps as f32;

    for i in 1..=settings.max_steps {
        let sample = origin + ray * (step * i as f32);
        if sample.z >= -view.near {
            break;
        }
        let uv = view.project(sample)?;
        if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
            break;
        }
        let stored = depth.sample(uv)?;
        let scene_depth = linearize_depth(stored, view.near, view.far);
        let delta = -sample.z - scene_depth;
        if delta > 0.0 && delta < settings.thickness {
            return Some(uv);
        }
    }
    None
}

/// Output of the reflection pass for one G-buffer texel.
pub fn reflect_texel(
    texel: &GBufferTexel,
    view: &MarchView,
    settings: &SsrSettings,
    depth: &ScreenImage<f32>,
    scene_color: &ScreenImage<Vec4>,
) -> Vec4 {
    if !is_reflective(texel) {
        return Vec4::ZERO;
    }
    let origin = (view.view * texel.position.xyz().extend(1.0)).xyz();
    let normal = (view.view * texel.normal.xyz().extend(0.0)).xyz();

    march(origin, normal, view, settings, depth)
        .and_then(|uv| scene_color.sample(uv))
        .map_or(Vec4::ZERO, |color| {
            color.xyz().extend(reflection_strength(texel))
        })
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::reference::pixel_center_uv;

    const WALL_Z: f32 = -10.0;
    const WALL_TOP: f32 = 2.0;
    const FLOOR_Y: f32 = -1.0;

    fn camera() -> Camera {
        Camera {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            aspect: 1.0,
            ..Camera::default()
        }
    }

    fn settings() -> SsrSettings {
        SsrSettings {
            max_distance: 32.0,
            max_steps: 64,
            thickness: 0.5,
        }
    }

    /// Reverse-Z depth of a floor at `FLOOR_Y` and a wall at `WALL_Z`
    /// spanning `FLOOR_Y..WALL_TOP`, seen from the origin.
    fn scene_depth(camera: &Camera, size: u32) -> ScreenImage<f32> {
        let projection = camera.projection_matrix();
        let tan = (camera.fov_y * 0.5).tan();
        ScreenImage::from_fn(size, size, |x, y| {
            let ndc = pixel_center_uv(x, y, size, size) * 2.0 - 1.0;
            let dir = Vec3::new(ndc.x * tan * camera.aspect, -ndc.y * tan, -1.0);

            let wall = dir * (WALL_Z / dir.z);
            let mut hit = (wall.y >= FLOOR_Y && wall.y <= WALL_TOP).then_some(wall);
            if dir.y < 0.0 {
                let floor = dir * (FLOOR_Y / dir.y);
                if hit.is_none_or(|w| floor.z > w.z) {
                    hit = Some(floor);
                }
            }
            hit.map_or(0.0, |p| {
                let clip = projection * p.extend(1.0);
                clip.z / clip.w
            })
        })
    }

    fn floor_hit(z: f32, size: u32) -> Option<Vec2> {
        let camera = camera();
        let view = MarchView::from_camera(&camera);
        let depth = scene_depth(&camera, size);
        march(Vec3::new(0.0, FLOOR_Y, z), Vec3::Y, &view, &settings(), &depth)
    }

    #[test]
    fn test_project_center() {
        let view = MarchView::from_camera(&camera());
        let uv = view.project(Vec3::new(0.0, 0.0, -5.0)).unwrap();
        assert!((uv - Vec2::splat(0.5)).length() < 1e-5);
        // +Y in view space is the top of the screen.
        assert!(view.project(Vec3::new(0.0, 1.0, -5.0)).unwrap().y < 0.5);
        assert!(view.project(Vec3::new(0.0, 0.0, 5.0)).is_none());
    }

    #[test]
    fn test_floor_reflects_wall() {
        let uv = floor_hit(-4.0, 64).expect("reflection should reach the wall");
        let view = MarchView::from_camera(&camera());
        // The reflected ray meets the wall at y = 0.5.
        let expected = view.project(Vec3::new(0.0, 0.5, WALL_Z)).unwrap();
        assert!((uv.y - expected.y).abs() < 0.05, "{uv} vs {expected}");
    }

    #[test]
    fn test_ray_over_wall_misses() {
        assert_eq!(floor_hit(-2.0, 64), None);
        assert_eq!(floor_hit(-1.8, 64), None);
    }

    #[test]
    fn test_hits_stable_under_resolution_doubling() {
        for z in [-1.8, -2.0, -3.5, -4.0, -5.0, -6.0] {
            let low = floor_hit(z, 64);
            let high = floor_hit(z, 128);
            assert_eq!(low.is_some(), high.is_some(), "z = {z}");
            if let (Some(low), Some(high)) = (low, high) {
                assert!((low - high).length() < 2.0 / 64.0, "z = {z}");
            }
        }
    }

    #[test]
    fn test_uncovered_and_rough_texels_are_skipped() {
        let camera = camera();
        let view = MarchView::from_camera(&camera);
        let depth = scene_depth(&camera, 32);
        let color = ScreenImage::filled(32, 32, Vec4::ONE);

        let floor = GBufferTexel {
            position: Vec4::new(0.0, FLOOR_Y, -4.0, 1.0),
            normal: Vec4::new(0.0, 1.0, 0.0, 0.2),
            albedo: Vec4::ONE,
        };
        let hit = reflect_texel(&floor, &view, &settings(), &depth, &color);
        assert!((hit - Vec4::new(1.0, 1.0, 1.0, 0.8)).abs().max_element() < 1e-6);

        let uncovered = GBufferTexel {
            position: floor.position.xyz().extend(0.0),
            ..floor
        };
        assert_eq!(
            reflect_texel(&uncovered, &view, &settings(), &depth, &color),
            Vec4::ZERO
        );

        let rough = GBufferTexel {
            normal: Vec4::new(0.0, 1.0, 0.0, 0.9),
            ..floor
        };
        assert_eq!(
            reflect_texel(&rough, &view, &settings(), &depth, &color),
            Vec4::ZERO
        );
    }

    #[test]
    fn test_degenerate_inputs_miss() {
        let camera = camera();
        let view = MarchView::from_camera(&camera);
        let depth = scene_depth(&camera, 16);
        assert_eq!(march(Vec3::ZERO, Vec3::Y, &view, &settings(), &depth), None);
        assert_eq!(
            march(Vec3::new(0.0, -1.0, -4.0), Vec3::ZERO, &view, &settings(), &depth),
            None
        );
    }
}
