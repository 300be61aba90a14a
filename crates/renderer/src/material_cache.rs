//! Per-pass material descriptor cache.
//!
//! Each pass that binds material textures owns one cache. A material gets one
//! descriptor set per frame slot, written once when the material is first
//! seen and never touched again. Sets come from fixed-size pool segments of
//! `capacity` materials; a new segment is created exactly when the active one
//! holds `capacity` materials. Segments live as long as the cache.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use thiserror::Error;
use tracing::{debug, warn};

use vesper_resources::MaterialIdentity;
use vesper_rhi::RhiError;
use vesper_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_combined_images};
use vesper_rhi::device::Device;

use crate::FRAMES_IN_FLIGHT;

/// Albedo, normal and metallic/roughness, in binding order.
pub type MaterialImages = [vk::DescriptorImageInfo; 3];

#[derive(Error, Debug)]
pub enum CacheError {
    /// Even a freshly created segment could not provide the sets.
    #[error("material descriptors exhausted for '{material}' with {segments} segment(s)")]
    Exhausted { material: String, segments: usize },

    #[error("descriptor segment backend failed: {0}")]
    Backend(#[from] RhiError),
}

/// Cached descriptor sets of one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialHandle {
    segment: usize,
    sets: [vk::DescriptorSet; FRAMES_IN_FLIGHT],
}

impl MaterialHandle {
    #[inline]
    pub fn segment(&self) -> usize {
        self.segment
    }

    /// The set to bind while recording `slot`.
    #[inline]
    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot % FRAMES_IN_FLIGHT]
    }
}

/// Where segments and their sets come from.
pub trait SegmentAllocator {
    /// Creates a segment with room for `capacity` materials and returns its id.
    fn create_segment(&mut self, capacity: u32) -> Result<usize, CacheError>;

    /// Allocates one set per slot from `segment`, or `None` if it is full.
    fn allocate(
        &mut self,
        segment: usize,
    ) -> Result<Option<[vk::DescriptorSet; FRAMES_IN_FLIGHT]>, CacheError>;

    /// Writes the material images into every set.
    fn write(&mut self, sets: &[vk::DescriptorSet; FRAMES_IN_FLIGHT], images: &MaterialImages);
}

pub struct MaterialDescriptorCache<A: SegmentAllocator> {
    allocator: A,
    capacity: u32,
    entries: HashMap<MaterialIdentity, MaterialHandle>,
    segment_count: usize,
    allocated_in_active: u32,
}

impl<A: SegmentAllocator> MaterialDescriptorCache<A> {
    /// Creates an empty cache. No segment exists until the first miss.
    ///
    /// # Arguments
    ///
    /// * `allocator` - Source of segments and descriptor sets
    /// * `capacity` - Materials per segment, clamped to at least 1
    pub fn new(allocator: A, capacity: u32) -> Self {
        Self {
            allocator,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            segment_count: 0,
            allocated_in_active: 0,
        }
    }

    pub fn get(&self, id: &MaterialIdentity) -> Option<MaterialHandle> {
        self.entries.get(id).copied()
    }

    /// Returns the cached handle, or allocates and writes new sets using the
    /// images from `resolve`.
    ///
    /// `resolve` runs only on a miss. A new segment is created when the
    /// active one holds `capacity` materials, or once when it reports itself
    /// full early.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Exhausted`] when a segment with no materials in
    /// it cannot provide the sets; the cache is left unchanged apart from
    /// that segment and a retry does not create another. Backend failures
    /// are returned as [`CacheError::Backend`].
    pub fn get_or_allocate<F>(
        &mut self,
        id: &MaterialIdentity,
        resolve: F,
    ) -> Result<MaterialHandle, CacheError>
    where
        F: FnOnce() -> MaterialImages,
    {
        if let Some(handle) = self.entries.get(id) {
            return Ok(*handle);
        }

        if self.segment_count == 0 || self.allocated_in_active >= self.capacity {
            self.grow()?;
        }

        let sets = match self.allocator.allocate(self.active_segment())? {
            Some(sets) => sets,
            // A segment that cannot hold even one material will not be
            // helped by another one.
            None if self.allocated_in_active == 0 => {
                return Err(CacheError::Exhausted {
                    material: id.to_string(),
                    segments: self.segment_count,
                });
            }
            None => {
                warn!(
                    "Descriptor segment {} full before reaching capacity {}",
                    self.active_segment(),
                    self.capacity
                );
                self.grow()?;
                self.allocator
                    .allocate(self.active_segment())?
                    .ok_or_else(|| CacheError::Exhausted {
                        material: id.to_string(),
                        segments: self.segment_count,
                    })?
            }
        };

        let images = resolve();
        self.allocator.write(&sets, &images);

        let handle = MaterialHandle {
            segment: self.active_segment(),
            sets,
        };
        self.allocated_in_active += 1;
        self.entries.insert(id.clone(), handle);
        debug!(
            "Cached material '{}' in segment {} ({}/{})",
            id, handle.segment, self.allocated_in_active, self.capacity
        );
        Ok(handle)
    }

    fn grow(&mut self) -> Result<(), CacheError> {
        let id = self.allocator.create_segment(self.capacity)?;
        self.segment_count += 1;
        self.allocated_in_active = 0;
        debug!("Created material descriptor segment {}", id);
        Ok(())
    }

    fn active_segment(&self) -> usize {
        self.segment_count.saturating_sub(1)
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

/// Segments backed by Vulkan descriptor pools of `capacity * N` sets.
pub struct VulkanSegments {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings_per_set: Vec<vk::DescriptorPoolSize>,
    pools: Vec<DescriptorPool>,
}

impl VulkanSegments {
    /// `layout` must outlive every allocation made from these segments.
    pub fn new(device: Arc<Device>, layout: &DescriptorSetLayout) -> Self {
        Self {
            device,
            layout: layout.handle(),
            bindings_per_set: layout.pool_sizes(1),
            pools: Vec::new(),
        }
    }
}

impl SegmentAllocator for VulkanSegments {
    fn create_segment(&mut self, capacity: u32) -> Result<usize, CacheError> {
        let max_sets = capacity * FRAMES_IN_FLIGHT as u32;
        let sizes: Vec<vk::DescriptorPoolSize> = self
            .bindings_per_set
            .iter()
            .map(|size| {
                vk::DescriptorPoolSize::default()
                    .ty(size.ty)
                    .descriptor_count(size.descriptor_count * max_sets)
            })
            .collect();
        let pool = DescriptorPool::new(self.device.clone(), max_sets, &sizes)?;
        self.pools.push(pool);
        Ok(self.pools.len() - 1)
    }

    fn allocate(
        &mut self,
        segment: usize,
    ) -> Result<Option<[vk::DescriptorSet; FRAMES_IN_FLIGHT]>, CacheError> {
        let Some(pool) = self.pools.get(segment) else {
            return Ok(None);
        };
        let layouts = [self.layout; FRAMES_IN_FLIGHT];
        let Some(allocated) = pool.try_allocate(&layouts)? else {
            return Ok(None);
        };
        let mut sets = [vk::DescriptorSet::null(); FRAMES_IN_FLIGHT];
        for (set, allocated) in sets.iter_mut().zip(allocated) {
            *set = allocated;
        }
        Ok(Some(sets))
    }

    fn write(&mut self, sets: &[vk::DescriptorSet; FRAMES_IN_FLIGHT], images: &MaterialImages) {
        for set in sets.iter().filter(|s| !s.is_null()) {
            write_combined_images(&self.device, *set, images);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out sequential fake set handles and counts writes.
    #[derive(Default)]
    struct MockSegments {
        used: Vec<u32>,
        capacities: Vec<u32>,
        next_handle: u64,
        writes: usize,
        /// Segments that report themselves full immediately.
        broken_from: Option<usize>,
    }

    impl SegmentAllocator for MockSegments {
        fn create_segment(&mut self, capacity: u32) -> Result<usize, CacheError> {
            self.used.push(0);
            self.capacities.push(capacity);
            Ok(self.used.len() - 1)
        }

        fn allocate(
            &mut self,
            segment: usize,
        ) -> Result<Option<[vk::DescriptorSet; FRAMES_IN_FLIGHT]>, CacheError> {
            if self.broken_from.is_some_and(|b| segment >= b) {
                return Ok(None);
            }
            if self.used[segment] >= self.capacities[segment] {
                return Ok(None);
            }
            self.used[segment] += 1;
            let mut sets = [vk::DescriptorSet::null(); FRAMES_IN_FLIGHT];
            for set in &mut sets {
                self.next_handle += 1;
                *set = vk::DescriptorSet::from_raw(self.next_handle);
            }
            Ok(Some(sets))
        }

        fn write(
            &mut self,
            _sets: &[vk::DescriptorSet; FRAMES_IN_FLIGHT],
            _images: &MaterialImages,
        ) {
            self.writes += 1;
        }
    }

    fn material(i: usize) -> MaterialIdentity {
        MaterialIdentity::albedo(format!("textures/{i}.png"))
    }

    fn images() -> MaterialImages {
        [vk::DescriptorImageInfo::default(); 3]
    }

    #[test]
    fn test_hit_returns_identical_handle() {
        let mut cache = MaterialDescriptorCache::new(MockSegments::default(), 4);
        let first = cache.get_or_allocate(&material(0), images).unwrap();
        let mut resolved_again = false;
        let second = cache
            .get_or_allocate(&material(0), || {
                resolved_again = true;
                images()
            })
            .unwrap();

        assert_eq!(first, second);
        assert!(!resolved_again);
        assert_eq!(cache.allocator().writes, 1);
        assert_eq!(cache.get(&material(0)), Some(first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_plus_one_adds_exactly_one_segment() {
        const CAPACITY: u32 = 8;
        let mut cache = MaterialDescriptorCache::new(MockSegments::default(), CAPACITY);

        let handles: Vec<MaterialHandle> = (0..CAPACITY as usize)
            .map(|i| cache.get_or_allocate(&material(i), images).unwrap())
            .collect();
        assert_eq!(cache.segment_count(), 1);

        let extra = cache
            .get_or_allocate(&material(CAPACITY as usize), images)
            .unwrap();
        assert_eq!(cache.segment_count(), 2);
        assert_eq!(extra.segment(), 1);

        // Every earlier material is still cached and distinct.
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(cache.get(&material(i)), Some(*handle));
            assert_eq!(handle.segment(), 0);
        }
        let mut all_sets: Vec<u64> = handles
            .iter()
            .chain(std::iter::once(&extra))
            .flat_map(|h| (0..FRAMES_IN_FLIGHT).map(|slot| h.set(slot).as_raw()))
            .collect();
        all_sets.sort_unstable();
        all_sets.dedup();
        assert_eq!(all_sets.len(), (CAPACITY as usize + 1) * FRAMES_IN_FLIGHT);
        assert_eq!(cache.len(), CAPACITY as usize + 1);
    }

    #[test]
    fn test_exhausted_after_one_growth() {
        let mock = MockSegments {
            broken_from: Some(1),
            ..MockSegments::default()
        };
        let mut cache = MaterialDescriptorCache::new(mock, 1);
        cache.get_or_allocate(&material(0), images).unwrap();

        let err = cache.get_or_allocate(&material(1), images).unwrap_err();
        assert!(matches!(err, CacheError::Exhausted { .. }));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&material(1)).is_none());
    }

    #[test]
    fn test_retrying_exhausted_material_does_not_grow() {
        let mock = MockSegments {
            broken_from: Some(0),
            ..MockSegments::default()
        };
        let mut cache = MaterialDescriptorCache::new(mock, 2);

        for _ in 0..10 {
            let err = cache.get_or_allocate(&material(0), images).unwrap_err();
            assert!(matches!(err, CacheError::Exhausted { segments: 1, .. }));
        }
        assert_eq!(cache.segment_count(), 1);
        assert_eq!(cache.allocator().used.len(), 1);
        assert_eq!(cache.allocator().writes, 0);
    }

    #[test]
    fn test_premature_full_segment_grows_once() {
        let mock = MockSegments::default();
        let mut cache = MaterialDescriptorCache::new(mock, 4);
        cache.get_or_allocate(&material(0), images).unwrap();
        // Simulate fragmentation: the active segment reports full early.
        cache.allocator.capacities[0] = 1;

        let handle = cache.get_or_allocate(&material(1), images).unwrap();
        assert_eq!(handle.segment(), 1);
        assert_eq!(cache.segment_count(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = MaterialDescriptorCache::new(MockSegments::default(), 0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.is_empty());
    }
}
