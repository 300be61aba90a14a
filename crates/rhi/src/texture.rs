//! Sampled textures uploaded from host memory.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, full_range};

/// Bytes per texel of an RGBA8 texture.
const RGBA8_TEXEL_SIZE: usize = 4;

/// An immutable texture in `SHADER_READ_ONLY_OPTIMAL` layout.
pub struct Texture {
    image: Image,
}

impl Texture {
    /// Uploads tightly packed RGBA8 pixels.
    ///
    /// `format` must be a 4-byte RGBA format such as `R8G8B8A8_UNORM` or
    /// `R8G8B8A8_SRGB`. Blocks until the upload has completed.
    pub fn from_rgba8(
        device: Arc<Device>,
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = extent.width as usize * extent.height as usize * RGBA8_TEXEL_SIZE;
        if pixels.len() != expected {
            return Err(RhiError::ImageError(format!(
                "{}: expected {} bytes for {}x{}, got {}",
                name,
                expected,
                extent.width,
                extent.height,
                pixels.len()
            )));
        }

        let image = Image::new(device.clone(), ImageDesc::sampled(name, extent, format))?;
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        device.execute_single_use(|raw| {
            let cmd = CommandBuffer::from_handle(device.clone(), raw);
            let range = full_range(vk::ImageAspectFlags::COLOR);

            cmd.image_barriers(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[vk::ImageMemoryBarrier::default()
                    .image(image.handle())
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .subresource_range(range)],
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), &[region]);

            cmd.image_barriers(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[vk::ImageMemoryBarrier::default()
                    .image(image.handle())
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .subresource_range(range)],
            );
        })?;

        debug!(
            "Uploaded texture '{}' ({}x{}, {} bytes)",
            name,
            extent.width,
            extent.height,
            pixels.len()
        );

        Ok(Self { image })
    }

    /// Creates a 1x1 texture filled with `rgba`.
    pub fn solid(
        device: Arc<Device>,
        name: &'static str,
        format: vk::Format,
        rgba: [u8; 4],
    ) -> RhiResult<Self> {
        Self::from_rgba8(
            device,
            name,
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            format,
            &rgba,
        )
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
}
