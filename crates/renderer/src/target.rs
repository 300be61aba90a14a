//! Images a frame is rendered into.
//!
//! The orchestrator writes the final composite into a [`RenderTarget`]. The
//! window path uses the swapchain; headless rendering and tests use an
//! [`OffscreenTarget`] that can be read back.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vesper_rhi::buffer::{Buffer, BufferUsage};
use vesper_rhi::command::CommandBuffer;
use vesper_rhi::device::Device;
use vesper_rhi::image::{Image, ImageDesc};
use vesper_rhi::swapchain::Swapchain;

use crate::attachment::AttachmentState;
use crate::error::{RenderError, RenderResult};

/// What pipelines and attachments need to know about a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    /// State the image is left in at the end of a frame.
    pub final_state: AttachmentState,
}

pub trait RenderTarget {
    fn desc(&self) -> TargetDesc;

    fn images(&self) -> &[vk::Image];

    fn views(&self) -> &[vk::ImageView];

    fn extent(&self) -> vk::Extent2D {
        self.desc().extent
    }

    fn format(&self) -> vk::Format {
        self.desc().format
    }

    fn image_count(&self) -> usize {
        self.images().len()
    }
}

impl RenderTarget for Swapchain {
    fn desc(&self) -> TargetDesc {
        TargetDesc {
            extent: Swapchain::extent(self),
            format: Swapchain::format(self),
            final_state: AttachmentState::Present,
        }
    }

    fn images(&self) -> &[vk::Image] {
        Swapchain::images(self)
    }

    fn views(&self) -> &[vk::ImageView] {
        self.image_views()
    }
}

/// Pixels copied back from an [`OffscreenTarget`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub pixels: Vec<u8>,
}

impl Readback {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        let texel = self.pixels.get(offset..offset + 4)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }
}

/// Depth values copied back from a `D32_SFLOAT` attachment.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthReadback {
    pub width: u32,
    pub height: u32,
    pub depths: Vec<f32>,
}

impl DepthReadback {
    pub(crate) fn from_bytes(extent: vk::Extent2D, bytes: &[u8]) -> Self {
        let depths = bytes
            .chunks_exact(4)
            .map(|texel| f32::from_ne_bytes([texel[0], texel[1], texel[2], texel[3]]))
            .collect();
        Self {
            width: extent.width,
            height: extent.height,
            depths,
        }
    }

    pub fn depth(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.depths.get((y * self.width + x) as usize).copied()
    }
}

/// Copies a whole image in `TRANSFER_SRC_OPTIMAL` to host memory.
///
/// # Arguments
///
/// * `aspect` - Aspect to copy (`COLOR` or `DEPTH`)
/// * `texel_size` - Bytes per texel of the image format
pub(crate) fn copy_image_to_host(
    device: &Arc<Device>,
    image: vk::Image,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    texel_size: u64,
) -> RenderResult<Vec<u8>> {
    let size = u64::from(extent.width) * u64::from(extent.height) * texel_size;
    let staging = Buffer::new(device.clone(), BufferUsage::Readback, size)?;

    let region = vk::BufferImageCopy::default()
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: aspect,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    let buffer = staging.handle();
    device.execute_single_use(|raw| unsafe {
        let cmd = CommandBuffer::from_handle(device.clone(), raw);
        cmd.copy_image_to_buffer(image, buffer, &[region]);
        let to_host = vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        device.handle().cmd_pipeline_barrier(
            raw,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            vk::DependencyFlags::empty(),
            &[],
            &[to_host],
            &[],
        );
    })?;

    Ok(staging.read_data(0, size as usize)?)
}

/// A single-image target without a window.
pub struct OffscreenTarget {
    device: Arc<Device>,
    image: Image,
    images: [vk::Image; 1],
    views: [vk::ImageView; 1],
}

impl OffscreenTarget {
    pub const DEFAULT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

    pub fn new(device: Arc<Device>, width: u32, height: u32) -> RenderResult<Self> {
        let image = Self::create_image(&device, width, height)?;
        Ok(Self {
            images: [image.handle()],
            views: [image.view()],
            device,
            image,
        })
    }

    fn create_image(device: &Arc<Device>, width: u32, height: u32) -> RenderResult<Image> {
        if width == 0 || height == 0 {
            return Err(RenderError::Target(format!(
                "offscreen target cannot be {width}x{height}"
            )));
        }
        let desc = ImageDesc::color_attachment(
            "offscreen target",
            vk::Extent2D { width, height },
            Self::DEFAULT_FORMAT,
        );
        let image = Image::new(device.clone(), desc)?;
        debug!("Created offscreen target {}x{}", width, height);
        Ok(image)
    }

    /// Replaces the image with one of the new size. The device must be idle.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let image = Self::create_image(&self.device, width, height)?;
        self.images = [image.handle()];
        self.views = [image.view()];
        self.image = image;
        Ok(())
    }

    /// Copies the image to host memory.
    ///
    /// Valid after a frame rendered into this target has completed; the
    /// image is then in the transfer-source layout.
    pub fn read_back(&self) -> RenderResult<Readback> {
        let extent = self.image.extent();
        let pixels = copy_image_to_host(
            &self.device,
            self.image.handle(),
            extent,
            vk::ImageAspectFlags::COLOR,
            4,
        )?;
        Ok(Readback {
            width: extent.width,
            height: extent.height,
            pixels,
        })
    }
}

impl RenderTarget for OffscreenTarget {
    fn desc(&self) -> TargetDesc {
        TargetDesc {
            extent: self.image.extent(),
            format: self.image.format(),
            final_state: AttachmentState::TransferSrc,
        }
    }

    fn images(&self) -> &[vk::Image] {
        &self.images
    }

    fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readback_pixel_lookup() {
        let readback = Readback {
            width: 2,
            height: 2,
            pixels: (0..16).collect(),
        };
        assert_eq!(readback.pixel(0, 0), Some([0, 1, 2, 3]));
        assert_eq!(readback.pixel(1, 1), Some([12, 13, 14, 15]));
        assert_eq!(readback.pixel(2, 0), None);
    }

    #[test]
    fn test_depth_readback_lookup() {
        let extent = vk::Extent2D {
            width: 2,
            height: 1,
        };
        let bytes: Vec<u8> = [0.0f32, 0.75]
            .iter()
            .flat_map(|d| d.to_ne_bytes())
            .collect();
        let depth = DepthReadback::from_bytes(extent, &bytes);
        assert_eq!(depth.depth(0, 0), Some(0.0));
        assert_eq!(depth.depth(1, 0), Some(0.75));
        assert_eq!(depth.depth(0, 1), None);
    }

    #[test]
    fn test_readback_short_buffer() {
        let readback = Readback {
            width: 2,
            height: 2,
            pixels: vec![0; 8],
        };
        assert_eq!(readback.pixel(0, 1), None);
    }
}
