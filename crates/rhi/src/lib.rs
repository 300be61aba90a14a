//! Render Hardware Interface: thin RAII wrappers over Vulkan (`ash`).
//!
//! Every wrapper holds an `Arc<Device>` and destroys its handle on drop.
//! Memory comes from `gpu-allocator`. Rendering uses Vulkan 1.3 dynamic
//! rendering; there are no render pass or framebuffer objects.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
