//! Resource managers for the Vesper renderer.
//!
//! - [`MeshRegistry`]: CPU mesh generation and GPU upload behind [`MeshHandle`]s
//! - [`TextureManager`]: image decoding and upload with per-role fallbacks
//! - [`MaterialIdentity`]: the texture-path key materials are deduplicated by
//! - [`ResourceContext`]: all of the above, owned together

mod context;
mod error;
pub mod material;
pub mod mesh;
pub mod texture;

pub use context::ResourceContext;
pub use error::{ResourceError, ResourceResult};
pub use material::MaterialIdentity;
pub use mesh::{GpuMesh, MeshData, MeshHandle, MeshRegistry};
pub use texture::{TextureManager, TextureRole, decode_rgba8};
