//! Object transforms and normal matrices.

use glam::{Mat4, Quat, Vec3};

/// Position, rotation and scale of a drawable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Model matrix (scale, then rotate, then translate).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn normal_matrix(&self) -> Mat4 {
        normal_matrix(self.matrix())
    }
}

/// Inverse transpose of `model`.
///
/// Degenerate matrices (for example zero scale) yield the identity so that
/// shaders never see NaN normals.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    const EPSILON: f32 = 1e-6;
    if model.determinant().abs() < EPSILON {
        Mat4::IDENTITY
    } else {
        model.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
        assert_eq!(t.normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_applies_scale_then_translation() {
        let t = Transform::new()
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(2.0));
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn test_normal_matrix_with_non_uniform_scale() {
        let t = Transform::new().with_scale(Vec3::new(1.0, 4.0, 1.0));
        let n = t.normal_matrix();
        assert_eq!(n, t.matrix().inverse().transpose());

        // A sloped surface normal stays perpendicular after scaling.
        let tangent = Vec3::new(1.0, 1.0, 0.0);
        let normal = Vec3::new(1.0, -1.0, 0.0);
        let t_world = t.matrix().transform_vector3(tangent);
        let n_world = n.transform_vector3(normal);
        assert!(t_world.dot(n_world).abs() < 1e-5);
    }

    #[test]
    fn test_normal_matrix_degenerate() {
        let n = normal_matrix(Mat4::from_scale(Vec3::ZERO));
        assert_eq!(n, Mat4::IDENTITY);
        assert!(n.is_finite());
    }
}
