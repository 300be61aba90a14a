//! Scene-side inputs to the renderer.
//!
//! - [`Camera`] and [`OrbitController`]
//! - Directional and point lights collected in [`SceneLights`]
//! - [`Transform`] helpers for model and normal matrices
//! - [`FrameParameters`]: the per-frame draw list

pub mod camera;
pub mod draw;
pub mod light;
pub mod transform;

pub use camera::{Camera, OrbitController, linearize_depth};
pub use draw::{DrawItem, FrameParameters, WaterSurface};
pub use light::{DirectionalLight, MAX_POINT_LIGHTS, PointLight, SceneLights};
pub use transform::{Transform, normal_matrix};
