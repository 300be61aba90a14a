//! The render passes of a frame.
//!
//! ```text
//! GBuffer -> SSR -> Lighting | Forward -> snapshot copy -> Water
//! ```
//!
//! Each pass owns its pipelines, descriptor sets, uniform ring and any
//! screen-sized attachments it writes. The orchestrator dispatches through
//! [`RenderPass`] and hands each pass the views it reads from the others via
//! [`SharedViews`] when the target is (re)created.

use ash::vk;

use vesper_resources::ResourceContext;
use vesper_rhi::command::CommandBuffer;
use vesper_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_uniform_buffer};
use vesper_rhi::device::Device;
use vesper_scene::FrameParameters;

use crate::FRAMES_IN_FLIGHT;
use crate::error::{RenderError, RenderResult};
use crate::uniform_ring::UniformRing;

pub mod forward;
pub mod gbuffer;
pub mod lighting;
pub mod ssr;
pub mod water;

pub use forward::ForwardPass;
pub use gbuffer::{GBufferPass, GBufferViews};
pub use lighting::LightingPass;
pub use ssr::SsrPass;
pub use water::WaterPass;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    GBuffer,
    Ssr,
    Lighting,
    Forward,
    Water,
}

impl PassKind {
    pub fn name(self) -> &'static str {
        match self {
            PassKind::GBuffer => "gbuffer",
            PassKind::Ssr => "ssr",
            PassKind::Lighting => "lighting",
            PassKind::Forward => "forward",
            PassKind::Water => "water",
        }
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Views produced by one pass and sampled by later ones.
///
/// Views only change while the device is idle during target recreation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SharedViews {
    pub gbuffer: Option<GBufferViews>,
    pub reflection: Option<vk::ImageView>,
    pub scene_color: Option<vk::ImageView>,
}

impl SharedViews {
    pub fn gbuffer(&self, pass: PassKind) -> RenderResult<GBufferViews> {
        self.gbuffer.ok_or(RenderError::MissingInput {
            pass: pass.name(),
            input: "G-buffer",
        })
    }

    pub fn reflection(&self, pass: PassKind) -> RenderResult<vk::ImageView> {
        self.reflection.ok_or(RenderError::MissingInput {
            pass: pass.name(),
            input: "reflection",
        })
    }

    pub fn scene_color(&self, pass: PassKind) -> RenderResult<vk::ImageView> {
        self.scene_color.ok_or(RenderError::MissingInput {
            pass: pass.name(),
            input: "scene color",
        })
    }
}

/// Inputs for rebuilding extent- or format-dependent resources.
#[derive(Clone, Copy, Debug)]
pub struct ResizeContext {
    pub extent: vk::Extent2D,
    pub target_format: vk::Format,
    pub inputs: SharedViews,
}

/// The target image being rendered this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetView {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

/// Everything a pass reads while recording one frame.
pub struct FrameContext<'a> {
    pub slot: usize,
    pub params: &'a FrameParameters<'a>,
    pub resources: &'a ResourceContext,
    pub target: TargetView,
    /// Simulation time in seconds.
    pub time: f64,
}

pub trait RenderPass {
    fn kind(&self) -> PassKind;

    /// Rebuilds resources that depend on the target extent or format.
    ///
    /// Called with the device idle, once after construction and after every
    /// target recreation.
    fn resize(&mut self, ctx: &ResizeContext) -> RenderResult<()>;

    /// Updates the slot's uniforms and records the pass into `cmd`.
    fn record(&mut self, cmd: &CommandBuffer, frame: &FrameContext<'_>) -> RenderResult<()>;
}

/// Uniform ring plus one descriptor set per slot pointing at it.
///
/// Shared by every pass whose set 0 is a single uniform block.
pub(crate) struct UniformBinding<T: bytemuck::Pod> {
    pub(crate) ring: UniformRing<T>,
    pub(crate) sets: Vec<vk::DescriptorSet>,
}

impl<T: bytemuck::Pod> UniformBinding<T> {
    /// Allocates the per-slot sets from `pool` and points them at a new ring.
    pub(crate) fn new(
        device: &std::sync::Arc<Device>,
        pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
    ) -> RenderResult<Self> {
        let ring = UniformRing::<T>::new(device.clone())?;
        let layouts = [layout.handle(); FRAMES_IN_FLIGHT];
        let sets = pool.allocate(&layouts)?;
        for (slot, set) in sets.iter().enumerate() {
            let info = ring.descriptor_info(slot).ok_or(RenderError::SlotProtocol {
                slot,
                reason: "uniform ring slot out of range",
            })?;
            write_uniform_buffer(device, *set, 0, info.buffer, info.offset, info.range);
        }
        Ok(Self { ring, sets })
    }

    pub(crate) fn update(&self, slot: usize, value: &T) -> RenderResult<vk::DescriptorSet> {
        self.ring.write(slot, value)?;
        self.sets
            .get(slot)
            .copied()
            .ok_or(RenderError::SlotProtocol {
                slot,
                reason: "uniform set slot out of range",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_inputs_name_the_pass() {
        let views = SharedViews::default();
        let err = views.gbuffer(PassKind::Lighting).unwrap_err();
        assert_eq!(
            err.to_string(),
            "lighting pass is missing its G-buffer input"
        );
        assert!(views.reflection(PassKind::Water).is_err());
        assert!(views.scene_color(PassKind::Ssr).is_err());
    }

    #[test]
    fn test_pass_kind_names_are_unique() {
        let kinds = [
            PassKind::GBuffer,
            PassKind::Ssr,
            PassKind::Lighting,
            PassKind::Forward,
            PassKind::Water,
        ];
        let mut names: Vec<_> = kinds.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), kinds.len());
    }
}
