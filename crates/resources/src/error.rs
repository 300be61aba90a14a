//! Error types for resource loading.

use std::path::PathBuf;

use thiserror::Error;
use vesper_rhi::RhiError;

use crate::mesh::MeshHandle;

/// Error type for mesh and texture operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// IO error while reading an asset.
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image file exists but could not be decoded.
    #[error("Failed to decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// GPU upload or allocation failed.
    #[error("RHI error: {0}")]
    Rhi(#[from] RhiError),

    /// A draw referenced a mesh that was never uploaded.
    #[error("Unknown mesh handle {0:?}")]
    UnknownMesh(MeshHandle),

    /// Mesh data failed validation before upload.
    #[error("Invalid mesh '{name}': {reason}")]
    InvalidMesh { name: String, reason: String },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
