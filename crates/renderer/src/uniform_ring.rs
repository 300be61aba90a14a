//! Per-slot uniform buffers.

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use vesper_rhi::buffer::{Buffer, BufferUsage};
use vesper_rhi::device::Device;

use crate::FRAMES_IN_FLIGHT;
use crate::error::{RenderError, RenderResult};

/// One host-visible uniform buffer of `T` per frame slot.
///
/// The CPU only writes the buffer of the slot it is recording, whose previous
/// use the slot fence has already retired. Independent of the target extent.
pub struct UniformRing<T: Pod> {
    buffers: Vec<Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformRing<T> {
    /// Creates [`FRAMES_IN_FLIGHT`] buffers of `size_of::<T>()` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer cannot be created or allocated.
    pub fn new(device: Arc<Device>) -> RenderResult<Self> {
        let size = std::mem::size_of::<T>() as vk::DeviceSize;
        let buffers = (0..FRAMES_IN_FLIGHT)
            .map(|_| Buffer::new(device.clone(), BufferUsage::Uniform, size))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            buffers,
            _marker: PhantomData,
        })
    }

    /// Overwrites the buffer of `slot` with `value`.
    ///
    /// # Arguments
    ///
    /// * `slot` - Frame slot being recorded; its fence must have been waited
    /// * `value` - New contents, copied byte for byte
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotProtocol`] if `slot` is out of range, or the
    /// mapping error of the buffer.
    pub fn write(&self, slot: usize, value: &T) -> RenderResult<()> {
        self.slot_buffer(slot)?.write_pod(0, value)?;
        Ok(())
    }

    pub fn buffer(&self, slot: usize) -> Option<vk::Buffer> {
        self.buffers.get(slot).map(Buffer::handle)
    }

    /// Whole-buffer descriptor info for one slot.
    pub fn descriptor_info(&self, slot: usize) -> Option<vk::DescriptorBufferInfo> {
        self.buffers.get(slot).map(|buffer| {
            vk::DescriptorBufferInfo::default()
                .buffer(buffer.handle())
                .offset(0)
                .range(std::mem::size_of::<T>() as vk::DeviceSize)
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Reads back the current contents of a slot.
    pub fn read(&self, slot: usize) -> RenderResult<T> {
        let bytes = self
            .slot_buffer(slot)?
            .read_data(0, std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    fn slot_buffer(&self, slot: usize) -> RenderResult<&Buffer> {
        self.buffers.get(slot).ok_or(RenderError::SlotProtocol {
            slot,
            reason: "uniform ring slot out of range",
        })
    }
}
