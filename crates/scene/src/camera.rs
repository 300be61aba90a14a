//! Perspective camera with reverse-Z depth and an orbit controller.
//!
//! The projection maps the near plane to depth 1 and the far plane to 0 and
//! flips Y for Vulkan clip space. Depth buffers therefore clear to 0 and
//! test with `GREATER`.

use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            fov_y: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the aspect ratio from a target size. Zero sizes are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }

    /// Reverse-Z perspective projection with Vulkan's Y flip.
    pub fn projection_matrix(&self) -> Mat4 {
        // Swapping near and far reverses the depth range.
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.far, self.near);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Positive view-space distance for a stored reverse-Z depth value.
    pub fn linearize_depth(&self, depth: f32) -> f32 {
        linearize_depth(depth, self.near, self.far)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Points the camera at `target`, keeping +Y up.
    pub fn look_at(&mut self, target: Vec3) {
        let to_target = target - self.position;
        if to_target.length_squared() <= f32::EPSILON {
            return;
        }
        let view = Mat4::look_to_rh(Vec3::ZERO, to_target, Vec3::Y);
        self.rotation = Quat::from_mat4(&view.inverse());
    }
}

/// `near * far / (near + depth * (far - near))`; inverse of the reverse-Z
/// projection's depth mapping.
pub fn linearize_depth(depth: f32, near: f32, far: f32) -> f32 {
    near * far / (near + depth * (far - near))
}

/// Orbits a camera around a target point using yaw, pitch and distance.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitController {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub sensitivity: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 6.0,
            yaw: 0.0,
            pitch: -0.35,
            sensitivity: 0.005,
        }
    }
}

impl OrbitController {
    const PITCH_LIMIT: f32 = 1.5;
    const MIN_DISTANCE: f32 = 0.5;

    /// Applies a mouse drag in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.sensitivity;
        self.pitch =
            (self.pitch - dy * self.sensitivity).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Applies scroll wheel lines; positive zooms in.
    pub fn zoom(&mut self, lines: f32) {
        self.distance = (self.distance * (1.0 - lines * 0.1)).max(Self::MIN_DISTANCE);
    }

    /// Writes position and orientation into `camera`.
    pub fn apply(&self, camera: &mut Camera) {
        let rotation = Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch);
        camera.rotation = rotation;
        camera.position = self.target - rotation * Vec3::NEG_Z * self.distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn ndc_depth(camera: &Camera, distance: f32) -> f32 {
        let clip = camera.projection_matrix() * Vec4::new(0.0, 0.0, -distance, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_reverse_z_range() {
        let camera = Camera::default();
        assert!((ndc_depth(&camera, camera.near) - 1.0).abs() < 1e-5);
        assert!(ndc_depth(&camera, camera.far).abs() < 1e-5);
        assert!(ndc_depth(&camera, 1.0) > ndc_depth(&camera, 10.0));
    }

    #[test]
    fn test_linearize_inverts_projection() {
        let camera = Camera::default();
        for distance in [0.1, 0.5, 3.0, 42.0, 199.0] {
            let depth = ndc_depth(&camera, distance);
            let recovered = camera.linearize_depth(depth);
            assert!(
                (recovered - distance).abs() / distance < 1e-3,
                "{distance} -> {depth} -> {recovered}"
            );
        }
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let clip = camera.projection_matrix() * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_look_at() {
        let mut camera = Camera {
            position: Vec3::new(3.0, 2.0, 4.0),
            ..Camera::default()
        };
        camera.look_at(Vec3::ZERO);
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!(camera.forward().abs_diff_eq(expected, 1e-5));
        assert!(camera.right().y.abs() < 1e-5);
    }

    #[test]
    fn test_set_viewport_ignores_zero() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_eq!(camera.aspect, 2.0);
        camera.set_viewport(0, 400);
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn test_orbit_keeps_distance_and_faces_target() {
        let mut orbit = OrbitController {
            target: Vec3::new(1.0, 0.0, 0.0),
            ..OrbitController::default()
        };
        orbit.rotate(120.0, -40.0);
        let mut camera = Camera::default();
        orbit.apply(&mut camera);

        assert!(((camera.position - orbit.target).length() - orbit.distance).abs() < 1e-4);
        let to_target = (orbit.target - camera.position).normalize();
        assert!(camera.forward().abs_diff_eq(to_target, 1e-5));
    }

    #[test]
    fn test_orbit_limits() {
        let mut orbit = OrbitController::default();
        orbit.rotate(0.0, -1.0e6);
        assert!(orbit.pitch <= OrbitController::PITCH_LIMIT);
        orbit.zoom(1000.0);
        assert!(orbit.distance >= OrbitController::MIN_DISTANCE);
    }
}
