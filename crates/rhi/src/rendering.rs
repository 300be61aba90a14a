//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! Attachments are described with [`ColorAttachment`] and [`DepthAttachment`],
//! collected into a [`RenderingConfig`] and turned into a
//! [`RenderingInfoBundle`] that owns the attachment array the
//! `VkRenderingInfo` points at.
//!
//! ```no_run
//! use ash::vk;
//! use vesper_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//! use vesper_rhi::command::CommandBuffer;
//!
//! # fn example(color: vk::ImageView, depth: vk::ImageView, cmd: &CommandBuffer) {
//! let bundle = RenderingConfig::new(vk::Extent2D { width: 800, height: 600 })
//!     .with_color_attachment(ColorAttachment::new(color).with_clear_color([0.0; 4]))
//!     .with_depth_attachment(DepthAttachment::new(depth).with_clear_depth(0.0))
//!     .build();
//! cmd.begin_rendering(&bundle.info());
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Configuration for one color attachment.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    image_view: vk::ImageView,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
    clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Creates an attachment that clears to transparent black and stores.
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_color = color;
        self
    }

    /// Keeps the existing contents instead of clearing.
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// Configuration for the depth attachment.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    image_view: vk::ImageView,
    layout: vk::ImageLayout,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
    clear_depth: f32,
}

impl DepthAttachment {
    /// Creates a writable attachment that clears to 0 (the far plane under
    /// reverse-Z) and stores.
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_depth: 0.0,
        }
    }

    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_depth = depth;
        self
    }

    /// Loads the existing depth and binds it read-only.
    ///
    /// The image may be sampled by the same pass while attached.
    pub fn read_only(mut self) -> Self {
        self.layout = vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL;
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self.store_op = vk::AttachmentStoreOp::NONE;
        self
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Complete dynamic rendering configuration.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    render_area: vk::Rect2D,
    color_attachments: Vec<ColorAttachment>,
    depth_attachment: Option<DepthAttachment>,
}

impl RenderingConfig {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            color_attachments: Vec::new(),
            depth_attachment: None,
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    #[inline]
    pub fn color_attachment_count(&self) -> usize {
        self.color_attachments.len()
    }

    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: self
                .depth_attachment
                .as_ref()
                .map(DepthAttachment::to_rendering_attachment_info),
            render_area: self.render_area,
        }
    }
}

/// `VkRenderingInfo` together with the attachment data it references.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    /// Returns the `VkRenderingInfo` borrowing this bundle's data.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_depth_clears_to_far_plane() {
        let info = DepthAttachment::new(view(1)).to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(unsafe { info.clear_value.depth_stencil.depth }, 0.0);
    }

    #[test]
    fn test_read_only_depth_loads_without_store() {
        let depth = DepthAttachment::new(view(1)).read_only();
        let info = depth.to_rendering_attachment_info();
        assert_eq!(info.image_layout, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::NONE);
    }

    #[test]
    fn test_bundle_preserves_attachment_order() {
        let bundle = RenderingConfig::new(vk::Extent2D {
            width: 64,
            height: 32,
        })
        .with_color_attachment(ColorAttachment::new(view(1)))
        .with_color_attachment(ColorAttachment::new(view(2)).load())
        .with_color_attachment(ColorAttachment::new(view(3)))
        .build();

        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 3);
        assert_eq!(info.render_area.extent.width, 64);
        assert!(info.p_depth_attachment.is_null());
        assert_eq!(bundle.color_attachments[1].image_view, view(2));
        assert_eq!(bundle.color_attachments[1].load_op, vk::AttachmentLoadOp::LOAD);
    }
}
