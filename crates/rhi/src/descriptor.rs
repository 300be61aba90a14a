//! Descriptor set management for shader resource binding.
//!
//! - [`DescriptorSetLayout`] defines the layout of shader bindings
//! - [`DescriptorPool`] allocates descriptor sets, with a non-failing
//!   [`DescriptorPool::try_allocate`] for callers that grow on exhaustion
//! - Free functions write buffers and images into sets

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    /// Descriptor counts per type, used to size pools.
    counts: Vec<(vk::DescriptorType, u32)>,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            counts: descriptor_counts(bindings),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Pool sizes able to hold `sets` sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        self.counts
            .iter()
            .map(|&(ty, count)| {
                vk::DescriptorPoolSize::default()
                    .ty(ty)
                    .descriptor_count(count * sets)
            })
            .collect()
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Sums descriptor counts per type, preserving first-seen order.
fn descriptor_counts(
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
) -> Vec<(vk::DescriptorType, u32)> {
    let mut counts: Vec<(vk::DescriptorType, u32)> = Vec::new();
    for binding in bindings {
        match counts
            .iter_mut()
            .find(|(ty, _)| *ty == binding.descriptor_type)
        {
            Some((_, count)) => *count += binding.descriptor_count,
            None => counts.push((binding.descriptor_type, binding.descriptor_count)),
        }
    }
    counts
}

/// Descriptor pool wrapper.
///
/// Sets are never freed individually; a pool is reset or dropped as a whole.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Creates a pool sized for `max_sets` sets of `layout`.
    pub fn for_layout(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        max_sets: u32,
    ) -> RhiResult<Self> {
        Self::new(device, max_sets, &layout.pool_sizes(max_sets))
    }

    /// Allocates one set per layout.
    ///
    /// # Errors
    ///
    /// Any failure, including pool exhaustion, is an error.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Allocates one set per layout in a single call, returning `Ok(None)`
    /// when the pool is out of space.
    ///
    /// The call is all-or-nothing: on `None` no set was taken from the pool.
    pub fn try_allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Option<Vec<vk::DescriptorSet>>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(Some(sets)),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns every set to the pool. No set may be in use by the GPU.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        debug!("Reset descriptor pool");
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Writes a uniform buffer range into `binding` of `set`.
pub fn write_uniform_buffer(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) {
    let infos = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&infos);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

/// Writes combined image samplers into consecutive bindings starting at 0.
pub fn write_combined_images(
    device: &Device,
    set: vk::DescriptorSet,
    images: &[vk::DescriptorImageInfo],
) {
    if images.is_empty() {
        return;
    }

    let writes: Vec<vk::WriteDescriptorSet> = images
        .iter()
        .enumerate()
        .map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding as u32)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info))
        })
        .collect();

    unsafe {
        device.handle().update_descriptor_sets(&writes, &[]);
    }
}

/// Creates a sampled image descriptor.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Shorthand constructors for layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    /// `count` consecutive fragment-stage samplers starting at binding 0.
    pub fn fragment_samplers(count: u32) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        (0..count)
            .map(|binding| Self::combined_image_sampler(binding, vk::ShaderStageFlags::FRAGMENT))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_fragment_samplers_are_consecutive() {
        let bindings = DescriptorBindingBuilder::fragment_samplers(3);
        let indices: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(
            bindings
                .iter()
                .all(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        );
    }

    #[test]
    fn test_descriptor_counts_merge_by_type() {
        let mut bindings = vec![DescriptorBindingBuilder::uniform_buffer(
            0,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        bindings.extend(DescriptorBindingBuilder::fragment_samplers(3));
        let counts = descriptor_counts(&bindings);
        assert_eq!(
            counts,
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 1),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3),
            ]
        );
    }
}
