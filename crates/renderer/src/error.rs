//! Renderer error types.

use thiserror::Error;
use vesper_resources::ResourceError;
use vesper_rhi::RhiError;

use crate::material_cache::CacheError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Window or surface setup failed.
    #[error(transparent)]
    Platform(#[from] vesper_core::Error),

    /// A frame slot was used out of order (re-armed without a fence wait,
    /// submitted twice, and so on).
    #[error("frame slot {slot}: {reason}")]
    SlotProtocol { slot: usize, reason: &'static str },

    /// A pass was recorded or resized before one of its inputs existed.
    #[error("{pass} pass is missing its {input} input")]
    MissingInput {
        pass: &'static str,
        input: &'static str,
    },

    /// The render target cannot be used (zero extent, unsupported format).
    #[error("render target error: {0}")]
    Target(String),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
