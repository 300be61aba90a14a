//! CPU mirrors of the screen-space shaders.
//!
//! These functions compute the same per-pixel results as `ssr.frag`,
//! `lighting.frag` and the compose step of `water.frag`. They are used to
//! test the algorithms without a GPU and to validate readbacks.

use glam::{Vec2, Vec4};

pub mod lighting;
pub mod ssr;
pub mod water;

/// One G-buffer texel as the shaders see it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GBufferTexel {
    /// World position, w = coverage (0 where nothing was drawn).
    pub position: Vec4,
    /// World normal, w = roughness.
    pub normal: Vec4,
    /// Base color, a = metallic.
    pub albedo: Vec4,
}

impl GBufferTexel {
    #[inline]
    pub fn covered(&self) -> bool {
        self.position.w > 0.0
    }

    #[inline]
    pub fn roughness(&self) -> f32 {
        self.normal.w
    }

    #[inline]
    pub fn metallic(&self) -> f32 {
        self.albedo.w
    }
}

/// A screen-sized grid sampled with nearest filtering and clamped
/// coordinates, like the shaders' point samplers.
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenImage<T> {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<T>,
}

impl<T: Copy> ScreenImage<T> {
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut texels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                texels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            texels,
        }
    }

    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self::from_fn(width, height, |_, _| value)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.texels.get((y * self.width + x) as usize).copied()
    }

    /// Nearest texel for `uv` in `[0, 1]`, clamped to the edge.
    pub fn sample(&self, uv: Vec2) -> Option<T> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let x = (uv.x * self.width as f32).floor().clamp(0.0, (self.width - 1) as f32) as u32;
        let y = (uv.y * self.height as f32).floor().clamp(0.0, (self.height - 1) as f32) as u32;
        self.get(x, y)
    }
}

/// Texture coordinate of the center of pixel `(x, y)`.
pub fn pixel_center_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_nearest_and_clamped() {
        let image = ScreenImage::from_fn(4, 2, |x, y| x + 10 * y);
        assert_eq!(image.sample(Vec2::new(0.0, 0.0)), Some(0));
        assert_eq!(image.sample(Vec2::new(0.99, 0.99)), Some(13));
        assert_eq!(image.sample(Vec2::new(1.5, -1.0)), Some(3));
        assert_eq!(image.sample(pixel_center_uv(2, 1, 4, 2)), Some(12));
    }

    #[test]
    fn test_empty_image_samples_none() {
        let image: ScreenImage<f32> = ScreenImage::filled(0, 0, 0.0);
        assert_eq!(image.sample(Vec2::splat(0.5)), None);
    }
}
