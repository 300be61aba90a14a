//! Hybrid deferred/forward frame graph on Vulkan 1.3.
//!
//! ```text
//! GBuffer -> SSR -> Lighting | Forward -> snapshot -> Water -> target
//! ```
//!
//! - [`frame_sync`]: N rotating frame slots and their fence protocol
//! - [`material_cache`]: per-pass material descriptor sets in growing pool segments
//! - [`passes`]: the five render passes behind the [`passes::RenderPass`] trait
//! - [`orchestrator`]: per-frame sequencing, presentation and recreation
//! - [`reference`]: CPU versions of the screen-space shaders
//! - [`Renderer`]: owns the Vulkan object graph for a window

pub mod attachment;
pub mod error;
pub mod frame_sync;
pub mod material_cache;
pub mod orchestrator;
pub mod params;
pub mod passes;
pub mod reference;
pub mod renderer;
pub mod shaders;
pub mod target;
pub mod uniform_ring;

pub use error::{RenderError, RenderResult};
pub use orchestrator::{FrameOrchestrator, FrameStatus, ResizeState};
pub use renderer::Renderer;
pub use target::{DepthReadback, OffscreenTarget, Readback, RenderTarget};

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 2;
