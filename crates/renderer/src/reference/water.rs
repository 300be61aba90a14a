//! Water surface math shared with `water.vert` and `water.frag`.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::params::WaterUniform;

/// Reflectance of water at normal incidence.
pub const WATER_F0: f32 = 0.02;

/// Extinction per world unit of water column.
pub const ABSORPTION: f32 = 0.6;

/// Blinn-Phong exponent of the sun glint.
pub const SUN_SHININESS: f32 = 128.0;

/// `(direction, frequency, amplitude weight)` of each summed wave.
pub const WAVES: [(Vec2, f32, f32); 3] = [
    (Vec2::new(1.0, 0.0), 0.9, 1.0),
    (Vec2::new(0.6, 0.8), 1.7, 0.5),
    (Vec2::new(-0.8, 0.6), 3.1, 0.25),
];

const WEIGHT_SUM: f32 = 1.75;

/// Vertical displacement at `xz`; bounded by `strength`.
///
/// `phase` is the temporal phase from [`WaterUniform::wave_phase`].
pub fn wave_height(xz: Vec2, phase: f32, strength: f32) -> f32 {
    WAVES
        .iter()
        .map(|&(dir, freq, weight)| weight * (dir.dot(xz) * freq + phase).sin())
        .sum::<f32>()
        * strength
        / WEIGHT_SUM
}

/// Surface normal of the displaced plane at `xz`.
pub fn wave_normal(xz: Vec2, phase: f32, strength: f32) -> Vec3 {
    let slope = WAVES.iter().fold(Vec2::ZERO, |acc, &(dir, freq, weight)| {
        acc + dir * (weight * freq * (dir.dot(xz) * freq + phase).cos())
    }) * strength
        / WEIGHT_SUM;
    Vec3::new(-slope.x, 1.0, -slope.y).normalize()
}

/// Schlick's approximation with an adjustable exponent.
pub fn fresnel(normal: Vec3, to_eye: Vec3, power: f32) -> f32 {
    let cos = normal.dot(to_eye).clamp(0.0, 1.0);
    let term = (1.0 - cos).powf(power.max(0.0));
    (WATER_F0 + (1.0 - WATER_F0) * term).clamp(0.0, 1.0)
}

/// Per-pixel inputs of the compose step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSample {
    pub position: Vec3,
    pub normal: Vec3,
    /// Scene color behind the surface.
    pub refraction: Vec3,
    /// Distance from the surface to the opaque geometry behind it.
    pub water_depth: f32,
    /// Scene color found by the inline march, if it hit.
    pub inline_reflection: Option<Vec3>,
    /// Reflection pass output at this pixel.
    pub ssr_reflection: Vec4,
}

/// Final straight-alpha color of one water fragment.
pub fn compose(sample: &SurfaceSample, uniform: &WaterUniform) -> Vec4 {
    let normal = finite_dir(sample.normal).unwrap_or(Vec3::Y);
    let to_eye = finite_dir(uniform.camera_position - sample.position).unwrap_or(normal);
    let water_color = sanitize(uniform.color);

    let depth = if sample.water_depth.is_nan() {
        0.0
    } else {
        sample.water_depth.max(0.0)
    };
    let absorbed = 1.0 - (-depth * ABSORPTION).exp();
    let refraction = sanitize(sample.refraction).lerp(water_color, absorbed);

    let reflection = match sample.inline_reflection {
        Some(color) => sanitize(color),
        None => {
            let ssr = sample.ssr_reflection;
            let weight = if ssr.w.is_finite() {
                ssr.w.clamp(0.0, 1.0)
            } else {
                0.0
            };
            water_color.lerp(sanitize(ssr.xyz()), weight)
        }
    };

    let f = fresnel(normal, to_eye, uniform.fresnel_power);
    let glint = finite_dir(to_eye - uniform.sun_direction).map_or(0.0, |h| {
        normal.dot(h).max(0.0).powf(SUN_SHININESS) * uniform.sun_intensity.max(0.0)
    });

    let color = refraction.lerp(reflection, f) + Vec3::splat(glint);
    sanitize(color).extend(uniform.opacity.clamp(0.0, 1.0))
}

fn finite_dir(v: Vec3) -> Option<Vec3> {
    v.try_normalize()
}

fn sanitize(v: Vec3) -> Vec3 {
    if v.is_finite() { v } else { Vec3::ZERO }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;
    use vesper_core::wrapped_phase;

    use super::*;

    fn uniform() -> WaterUniform {
        let mut uniform = WaterUniform::zeroed();
        uniform.camera_position = Vec3::new(0.0, 3.0, 6.0);
        uniform.color = Vec3::new(0.05, 0.25, 0.35);
        uniform.opacity = 0.85;
        uniform.sun_direction = Vec3::new(-0.4, -1.0, -0.3).normalize();
        uniform.sun_intensity = 0.6;
        uniform.fresnel_power = 5.0;
        uniform
    }

    fn black_ssr_sample(position: Vec3, normal: Vec3) -> SurfaceSample {
        SurfaceSample {
            position,
            normal,
            refraction: Vec3::ZERO,
            water_depth: 2.0,
            inline_reflection: None,
            ssr_reflection: Vec4::ZERO,
        }
    }

    #[test]
    fn test_black_reflection_buffer_stays_finite() {
        let uniform = uniform();
        let normals = [Vec3::Y, Vec3::new(0.3, 1.0, -0.2), Vec3::ZERO, Vec3::NEG_Y];
        for x in -10..=10 {
            for z in -10..=10 {
                let position = Vec3::new(x as f32, 0.0, z as f32);
                for normal in normals {
                    let color = compose(&black_ssr_sample(position, normal), &uniform);
                    assert!(color.is_finite(), "{position} {normal}");
                    assert_eq!(color.w, 0.85);
                }
            }
        }
    }

    #[test]
    fn test_non_finite_inputs_are_contained() {
        let mut sample = black_ssr_sample(Vec3::ZERO, Vec3::Y);
        sample.water_depth = f32::INFINITY;
        sample.refraction = Vec3::splat(f32::NAN);
        sample.ssr_reflection = Vec4::new(f32::NAN, 0.0, 0.0, f32::NAN);
        assert!(compose(&sample, &uniform()).is_finite());

        sample.water_depth = f32::NAN;
        assert!(compose(&sample, &uniform()).is_finite());

        // Eye exactly on the surface point.
        let mut uniform = uniform();
        uniform.camera_position = Vec3::ZERO;
        assert!(compose(&sample, &uniform).is_finite());
    }

    #[test]
    fn test_fresnel_grows_towards_grazing() {
        let steep = fresnel(Vec3::Y, Vec3::Y, 5.0);
        let grazing = fresnel(Vec3::Y, Vec3::new(1.0, 0.05, 0.0).normalize(), 5.0);
        assert!((steep - WATER_F0).abs() < 1e-6);
        assert!(grazing > 0.5);
        assert!(grazing <= 1.0);
    }

    #[test]
    fn test_inline_hit_overrides_ssr_buffer() {
        let mut sample = black_ssr_sample(Vec3::ZERO, Vec3::Y);
        sample.ssr_reflection = Vec4::new(0.0, 1.0, 0.0, 1.0);
        let fallback = compose(&sample, &uniform());
        sample.inline_reflection = Some(Vec3::new(1.0, 0.0, 0.0));
        let inline = compose(&sample, &uniform());
        assert!(inline.x > fallback.x);
        assert!(inline.y < fallback.y);
    }

    #[test]
    fn test_deep_water_takes_water_color() {
        let uniform = uniform();
        let mut sample = black_ssr_sample(Vec3::ZERO, Vec3::Y);
        sample.refraction = Vec3::ONE;
        sample.water_depth = 0.0;
        let shallow = compose(&sample, &uniform);
        sample.water_depth = 50.0;
        let deep = compose(&sample, &uniform);
        assert!(shallow.x > deep.x);
    }

    #[test]
    fn test_waves_are_bounded_and_deterministic() {
        for i in 0..200 {
            let xz = Vec2::new(i as f32 * 0.37, i as f32 * -0.21);
            let phase = wrapped_phase(f64::from(i) * 0.016, 1.3);
            let h = wave_height(xz, phase, 0.05);
            assert!(h.abs() <= 0.05 + 1e-6);
            assert_eq!(h, wave_height(xz, phase, 0.05));
            let n = wave_normal(xz, phase, 0.05);
            assert!((n.length() - 1.0).abs() < 1e-5);
            assert!(n.y > 0.0);
        }
    }

    #[test]
    fn test_flat_water_without_strength() {
        assert_eq!(wave_height(Vec2::new(3.0, 4.0), 1.0, 0.0), 0.0);
        assert_eq!(wave_normal(Vec2::new(3.0, 4.0), 1.0, 0.0), Vec3::Y);
    }

    #[test]
    fn test_waves_continue_across_the_phase_wrap() {
        let xz = Vec2::new(1.5, -2.0);
        let just_before = wave_height(xz, std::f32::consts::TAU - 1e-4, 0.05);
        let just_after = wave_height(xz, 1e-4, 0.05);
        assert!((just_before - just_after).abs() < 1e-4);
    }
}
