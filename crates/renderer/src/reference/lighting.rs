//! Deferred lighting as evaluated by `lighting.frag`.

use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::params::LightingUniform;
use crate::reference::GBufferTexel;

/// Fresnel reflectance of dielectrics at normal incidence.
pub const DIELECTRIC_F0: f32 = 0.04;

/// `(1 - (d / r)^2)^2` clamped to zero at and beyond the radius.
pub fn radius_falloff(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let x = (1.0 - (distance / radius).powi(2)).clamp(0.0, 1.0);
    x * x
}

/// Blinn-Phong exponent for a roughness in `[0, 1]`.
pub fn shininess(roughness: f32) -> f32 {
    let smooth = 1.0 - roughness.clamp(0.0, 1.0);
    4.0 + smooth * smooth * 252.0
}

/// Lit color of one G-buffer texel. Uncovered texels are opaque black.
pub fn shade(texel: &GBufferTexel, uniform: &LightingUniform) -> Vec4 {
    if !texel.covered() {
        return Vec4::new(0.0, 0.0, 0.0, 1.0);
    }
    let position = texel.position.xyz();
    let albedo = texel.albedo.xyz();
    let metallic = texel.metallic().clamp(0.0, 1.0);
    let ambient = uniform.ambient * albedo;

    let Some(normal) = texel.normal.xyz().try_normalize() else {
        return ambient.extend(1.0);
    };

    let light = &uniform.light;
    let to_light = light.position - position;
    let distance = to_light.length();
    let l = to_light.try_normalize().unwrap_or(normal);
    let v = (uniform.camera_position - position)
        .try_normalize()
        .unwrap_or(normal);
    let h = (l + v).try_normalize().unwrap_or(normal);

    let attenuation = radius_falloff(distance, light.radius) * light.intensity;
    let n_dot_l = normal.dot(l).max(0.0);
    let diffuse = albedo * (1.0 - metallic) * n_dot_l;
    let f0 = Vec3::splat(DIELECTRIC_F0).lerp(albedo, metallic);
    let specular = if n_dot_l > 0.0 {
        f0 * normal.dot(h).max(0.0).powf(shininess(texel.roughness()))
    } else {
        Vec3::ZERO
    };

    (ambient + (diffuse + specular) * light.color * attenuation).extend(1.0)
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;
    use vesper_scene::PointLight;

    use super::*;

    fn uniform() -> LightingUniform {
        LightingUniform {
            camera_position: Vec3::new(0.0, 2.0, 4.0),
            _pad0: 0.0,
            light: PointLight::new(Vec3::new(0.0, 2.0, 0.0), Vec3::ONE, 2.0, 5.0),
            ambient: Vec3::splat(0.1),
            _pad1: 0.0,
        }
    }

    fn floor(x: f32) -> GBufferTexel {
        GBufferTexel {
            position: Vec4::new(x, 0.0, 0.0, 1.0),
            normal: Vec4::new(0.0, 1.0, 0.0, 0.5),
            albedo: Vec4::new(0.8, 0.6, 0.4, 0.0),
        }
    }

    #[test]
    fn test_uncovered_is_opaque_black() {
        let texel = GBufferTexel {
            albedo: Vec4::ONE,
            ..GBufferTexel::default()
        };
        assert_eq!(shade(&texel, &uniform()), Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_lit_texel_exceeds_ambient() {
        let texel = floor(0.0);
        let lit = shade(&texel, &uniform());
        let ambient = Vec3::splat(0.1) * texel.albedo.xyz();
        assert_eq!(lit.w, 1.0);
        assert!(lit.x > ambient.x && lit.y > ambient.y && lit.z > ambient.z);
    }

    #[test]
    fn test_beyond_radius_is_ambient_only() {
        let texel = floor(10.0);
        let lit = shade(&texel, &uniform());
        let ambient = Vec3::splat(0.1) * texel.albedo.xyz();
        assert!((lit.xyz() - ambient).length() < 1e-6);
    }

    #[test]
    fn test_falloff_is_smooth_and_monotonic() {
        assert_eq!(radius_falloff(0.0, 5.0), 1.0);
        assert_eq!(radius_falloff(5.0, 5.0), 0.0);
        assert_eq!(radius_falloff(1.0, 0.0), 0.0);
        let mut last = 1.0;
        for i in 1..=50 {
            let value = radius_falloff(i as f32 * 0.1, 5.0);
            assert!(value <= last);
            last = value;
        }
    }

    #[test]
    fn test_missing_light_leaves_ambient() {
        let mut uniform = uniform();
        uniform.light = PointLight::zeroed();
        let texel = floor(0.0);
        let lit = shade(&texel, &uniform);
        assert!((lit.xyz() - Vec3::splat(0.1) * texel.albedo.xyz()).length() < 1e-6);
    }

    #[test]
    fn test_zero_normal_stays_finite() {
        let texel = GBufferTexel {
            normal: Vec4::ZERO,
            ..floor(0.0)
        };
        assert!(shade(&texel, &uniform()).is_finite());
    }

    #[test]
    fn test_metal_has_no_diffuse() {
        let mut texel = floor(0.0);
        texel.albedo.w = 1.0;
        texel.normal.w = 1.0;
        // Light and viewer straight above; only the specular lobe remains.
        let mut uniform = uniform();
        uniform.camera_position = Vec3::new(0.0, 4.0, 0.0);
        uniform.ambient = Vec3::ZERO;
        let lit = shade(&texel, &uniform).xyz();
        let expected = texel.albedo.xyz() * uniform.light.intensity * radius_falloff(2.0, 5.0);
        assert!((lit - expected).length() < 1e-4, "{lit} vs {expected}");
    }
}
