//! Attachments with tracked state.
//!
//! Every screen-sized image the passes render into is a [`PassAttachment`]:
//! an image plus the [`AttachmentState`] it was last transitioned to. The
//! owning pass issues transitions; a transition to the current state records
//! nothing.
//!
//! Depth images in [`AttachmentState::ShaderRead`] use
//! `DEPTH_READ_ONLY_OPTIMAL`, which serves both as a read-only depth
//! attachment and as a sampled image.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use vesper_rhi::command::CommandBuffer;
use vesper_rhi::device::Device;
use vesper_rhi::image::{Image, ImageDesc, aspect_for_format, full_range};

use crate::error::RenderResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentState {
    Undefined,
    ColorWrite,
    DepthWrite,
    ShaderRead,
    TransferSrc,
    TransferDst,
    Present,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentRole {
    Color,
    Depth,
}

impl AttachmentRole {
    pub fn for_format(format: vk::Format) -> Self {
        if aspect_for_format(format).contains(vk::ImageAspectFlags::DEPTH) {
            AttachmentRole::Depth
        } else {
            AttachmentRole::Color
        }
    }

    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            AttachmentRole::Color => vk::ImageAspectFlags::COLOR,
            AttachmentRole::Depth => vk::ImageAspectFlags::DEPTH,
        }
    }
}

/// Layout, pipeline stages and accesses that make up one side of a barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateUsage {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
}

impl AttachmentState {
    /// How an image in this state is used.
    pub fn usage(self, role: AttachmentRole) -> StateUsage {
        use vk::AccessFlags as A;
        use vk::PipelineStageFlags as S;

        let fragment_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
        let (layout, stage, access) = match (self, role) {
            // Swapchain images leave acquisition at COLOR_ATTACHMENT_OUTPUT or
            // TRANSFER, the stages the image-available semaphore is waited at.
            (AttachmentState::Undefined, _) => (
                vk::ImageLayout::UNDEFINED,
                S::COLOR_ATTACHMENT_OUTPUT | S::TRANSFER,
                A::empty(),
            ),
            (AttachmentState::ColorWrite, _) => (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
            ),
            (AttachmentState::DepthWrite, _) => (
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                fragment_tests,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            (AttachmentState::ShaderRead, AttachmentRole::Color) => (
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                S::FRAGMENT_SHADER,
                A::SHADER_READ,
            ),
            (AttachmentState::ShaderRead, AttachmentRole::Depth) => (
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
                S::FRAGMENT_SHADER | fragment_tests,
                A::SHADER_READ | A::DEPTH_STENCIL_ATTACHMENT_READ,
            ),
            (AttachmentState::TransferSrc, _) => (
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                S::TRANSFER,
                A::TRANSFER_READ,
            ),
            (AttachmentState::TransferDst, _) => (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                S::TRANSFER,
                A::TRANSFER_WRITE,
            ),
            (AttachmentState::Present, _) => {
                (vk::ImageLayout::PRESENT_SRC_KHR, S::BOTTOM_OF_PIPE, A::empty())
            }
        };
        StateUsage {
            layout,
            stage,
            access,
        }
    }

    /// Layout that descriptors sampling an image in this state must declare.
    pub fn layout(self, role: AttachmentRole) -> vk::ImageLayout {
        self.usage(role).layout
    }
}

/// Source/destination stages and the barrier for `old -> new`.
///
/// Returns `None` when nothing needs recording: equal states, or a request to
/// go back to `Undefined`, which is not a valid target layout.
pub fn transition_barrier(
    image: vk::Image,
    role: AttachmentRole,
    old: AttachmentState,
    new: AttachmentState,
) -> Option<(
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
    vk::ImageMemoryBarrier<'static>,
)> {
    if old == new {
        return None;
    }
    if new == AttachmentState::Undefined {
        warn!("Ignoring transition of {:?} image to Undefined", role);
        return None;
    }

    let src = old.usage(role);
    let dst = new.usage(role);
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(src.layout)
        .new_layout(dst.layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_range(role.aspect()))
        .src_access_mask(src.access)
        .dst_access_mask(dst.access);

    Some((src.stage, dst.stage, barrier))
}

/// Records `old -> new` for an image the caller tracks itself (swapchain
/// images).
pub fn transition_image(
    cmd: &CommandBuffer,
    image: vk::Image,
    role: AttachmentRole,
    old: AttachmentState,
    new: AttachmentState,
) {
    if let Some((src_stage, dst_stage, barrier)) = transition_barrier(image, role, old, new) {
        cmd.image_barriers(src_stage, dst_stage, &[barrier]);
    }
}

/// A render-target image owned by a pass, with its current state.
pub struct PassAttachment {
    image: Image,
    role: AttachmentRole,
    state: AttachmentState,
}

impl PassAttachment {
    /// A sampled color attachment that can also be copied from and to.
    pub fn color(
        device: Arc<Device>,
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RenderResult<Self> {
        let desc = ImageDesc::color_attachment(name, extent, format)
            .with_usage(vk::ImageUsageFlags::TRANSFER_DST);
        Self::new(device, desc)
    }

    /// A sampled depth attachment.
    pub fn depth(
        device: Arc<Device>,
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RenderResult<Self> {
        Self::new(device, ImageDesc::depth_attachment(name, extent, format))
    }

    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RenderResult<Self> {
        let role = AttachmentRole::for_format(desc.format);
        let name = desc.name;
        let image = Image::new(device, desc)?;
        debug!(
            "Created {} attachment {}x{} {:?}",
            name,
            image.extent().width,
            image.extent().height,
            image.format()
        );
        Ok(Self {
            image,
            role,
            state: AttachmentState::Undefined,
        })
    }

    /// Records a barrier to `new` unless the attachment is already there.
    pub fn transition(&mut self, cmd: &CommandBuffer, new: AttachmentState) {
        transition_image(cmd, self.image.handle(), self.role, self.state, new);
        if new != AttachmentState::Undefined {
            self.state = new;
        }
    }

    /// Forgets the contents; the next transition starts from `Undefined`.
    pub fn discard(&mut self) {
        self.state = AttachmentState::Undefined;
    }

    #[inline]
    pub fn state(&self) -> AttachmentState {
        self.state
    }

    #[inline]
    pub fn role(&self) -> AttachmentRole {
        self.role
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    /// Layout for descriptors that sample this attachment after its pass.
    #[inline]
    pub fn read_layout(&self) -> vk::ImageLayout {
        AttachmentState::ShaderRead.layout(self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: vk::Image = vk::Image::null();

    #[test]
    fn test_same_state_is_noop() {
        for state in [
            AttachmentState::ColorWrite,
            AttachmentState::ShaderRead,
            AttachmentState::Present,
        ] {
            assert!(transition_barrier(IMAGE, AttachmentRole::Color, state, state).is_none());
        }
    }

    #[test]
    fn test_undefined_target_is_rejected() {
        assert!(
            transition_barrier(
                IMAGE,
                AttachmentRole::Color,
                AttachmentState::ShaderRead,
                AttachmentState::Undefined
            )
            .is_none()
        );
    }

    #[test]
    fn test_color_write_to_shader_read() {
        let (src, dst, barrier) = transition_barrier(
            IMAGE,
            AttachmentRole::Color,
            AttachmentState::ColorWrite,
            AttachmentState::ShaderRead,
        )
        .unwrap();
        assert_eq!(src, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dst, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(
            barrier
                .src_access_mask
                .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        );
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_depth_read_layout_supports_testing() {
        let (_, dst, barrier) = transition_barrier(
            IMAGE,
            AttachmentRole::Depth,
            AttachmentState::DepthWrite,
            AttachmentState::ShaderRead,
        )
        .unwrap();
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
        assert!(dst.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dst.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::DEPTH
        );
    }

    #[test]
    fn test_acquired_image_waits_on_semaphore_stage() {
        let (src, _, barrier) = transition_barrier(
            IMAGE,
            AttachmentRole::Color,
            AttachmentState::Undefined,
            AttachmentState::ColorWrite,
        )
        .unwrap();
        assert!(src.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::empty());
    }

    #[test]
    fn test_role_from_format() {
        assert_eq!(
            AttachmentRole::for_format(vk::Format::D32_SFLOAT),
            AttachmentRole::Depth
        );
        assert_eq!(
            AttachmentRole::for_format(vk::Format::R16G16B16A16_SFLOAT),
            AttachmentRole::Color
        );
    }
}
