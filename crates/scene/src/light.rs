//! Light definitions for the scene.
//!
//! Both light types are laid out for direct inclusion in std140 uniform
//! blocks (32 bytes each, vec3 + float pairs).

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Maximum number of point lights the forward path evaluates.
pub const MAX_POINT_LIGHTS: usize = 4;

/// A directional light (sun-like).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized.
    pub direction: Vec3,
    pub _pad0: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Y),
            _pad0: 0.0,
            color,
            intensity,
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.4, -1.0, -0.3), Vec3::ONE, 0.6)
    }
}

/// A point light with a finite radius of influence.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub position: Vec3,
    /// Distance at which the contribution reaches zero.
    pub radius: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position,
            radius,
            color,
            intensity,
        }
    }
}

impl Default for PointLight {
    fn default() -> Self {
        Self::new(Vec3::new(2.0, 3.0, 2.0), Vec3::ONE, 4.0, 12.0)
    }
}

/// All lights for one frame.
///
/// The deferred lighting pass evaluates the first point light only; the
/// forward pass evaluates the sun and up to [`MAX_POINT_LIGHTS`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneLights {
    pub sun: DirectionalLight,
    points: Vec<PointLight>,
}

impl SceneLights {
    pub fn new(sun: DirectionalLight) -> Self {
        Self {
            sun,
            points: Vec::new(),
        }
    }

    /// Adds a point light. Returns `false` and drops the light when the
    /// limit has been reached.
    pub fn add_point_light(&mut self, light: PointLight) -> bool {
        if self.points.len() >= MAX_POINT_LIGHTS {
            return false;
        }
        self.points.push(light);
        true
    }

    pub fn with_point_light(mut self, light: PointLight) -> Self {
        self.add_point_light(light);
        self
    }

    #[inline]
    pub fn point_lights(&self) -> &[PointLight] {
        &self.points
    }

    pub fn point_lights_mut(&mut self) -> &mut [PointLight] {
        &mut self.points
    }

    /// The light used by the deferred lighting pass.
    #[inline]
    pub fn primary_point_light(&self) -> Option<&PointLight> {
        self.points.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std140_sizes() {
        assert_eq!(std::mem::size_of::<DirectionalLight>(), 32);
        assert_eq!(std::mem::size_of::<PointLight>(), 32);
    }

    #[test]
    fn test_point_light_limit() {
        let mut lights = SceneLights::default();
        for i in 0..MAX_POINT_LIGHTS {
            assert!(lights.add_point_light(PointLight {
                intensity: i as f32,
                ..PointLight::default()
            }));
        }
        assert!(!lights.add_point_light(PointLight::default()));
        assert_eq!(lights.point_lights().len(), MAX_POINT_LIGHTS);
        assert_eq!(lights.primary_point_light().map(|l| l.intensity), Some(0.0));
    }

    #[test]
    fn test_directional_normalizes() {
        let sun = DirectionalLight::new(Vec3::new(0.0, -10.0, 0.0), Vec3::ONE, 1.0);
        assert_eq!(sun.direction, Vec3::NEG_Y);
        let degenerate = DirectionalLight::new(Vec3::ZERO, Vec3::ONE, 1.0);
        assert_eq!(degenerate.direction, Vec3::NEG_Y);
    }
}
