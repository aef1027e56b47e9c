// Copyright (c) 2017 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{layout::DescriptorType, registry::DescriptorSetLayout};
use crate::{device::Device, VulkanError};
use ash::vk;
use smallvec::SmallVec;

/// Native descriptor pools that only hand out sets of one layout.
///
/// Sets are never freed individually. A set that is no longer needed is put back in the reserve
/// and handed out again by a later allocation. Every time the current pool is full, a new one
/// twice as large is created.
#[derive(Debug)]
pub(crate) struct LayoutPool {
    pools: Vec<vk::DescriptorPool>,
    reserve: Vec<vk::DescriptorSet>,
    set_count: u32,
}

impl LayoutPool {
    pub(crate) fn new(set_count: u32) -> Self {
        LayoutPool {
            pools: Vec::new(),
            reserve: Vec::new(),
            set_count: set_count.max(1),
        }
    }

    /// Returns a set from the reserve, or allocates a new one. The boolean is `true` if the set
    /// came from the reserve.
    pub(crate) fn allocate(
        &mut self,
        device: &dyn Device,
        layout: &DescriptorSetLayout,
    ) -> Result<(vk::DescriptorSet, bool), VulkanError> {
        if let Some(set) = self.reserve.pop() {
            return Ok((set, true));
        }

        if let Some(&pool) = self.pools.last() {
            match unsafe { device.allocate_descriptor_set(pool, layout.handle()) } {
                Ok(set) => return Ok((set, false)),
                Err(err) if err.is_pool_exhausted() => {}
                Err(err) => return Err(err),
            }

            self.set_count = self.set_count.saturating_mul(2);
        }

        let pool_sizes: SmallVec<[_; 4]> = layout
            .description()
            .descriptor_counts()
            .into_iter()
            .map(|(ty, count)| (ty, count.saturating_mul(self.set_count)))
            .collect();
        let pool = device.create_descriptor_pool(self.set_count, &pool_sizes)?;
        self.pools.push(pool);

        log::debug!(
            "created descriptor pool {:?} for {} sets of layout {:?}",
            pool,
            self.set_count,
            layout.handle(),
        );

        let set = unsafe { device.allocate_descriptor_set(pool, layout.handle()) }?;

        Ok((set, false))
    }

    /// Puts `set` back in the reserve.
    #[inline]
    pub(crate) fn recycle(&mut self, set: vk::DescriptorSet) {
        self.reserve.push(set);
    }

    #[cfg(test)]
    pub(crate) fn reserve_len(&self) -> usize {
        self.reserve.len()
    }

    /// Takes the native pools, leaving the pool empty.
    pub(crate) fn take_pools(&mut self) -> Vec<vk::DescriptorPool> {
        self.reserve.clear();

        std::mem::take(&mut self.pools)
    }
}

/// Native descriptor pools for the sets that one command buffer allocates while caching is
/// disabled. Every set lives until the pools are reset, which happens when the command buffer
/// is ready to be recorded again.
#[derive(Debug)]
pub(crate) struct TransientPool {
    pools: Vec<vk::DescriptorPool>,
    current: usize,
    set_count: u32,
}

impl TransientPool {
    pub(crate) fn new(set_count: u32) -> Self {
        TransientPool {
            pools: Vec::new(),
            current: 0,
            set_count: set_count.max(1),
        }
    }

    pub(crate) fn allocate(
        &mut self,
        device: &dyn Device,
        layout: &DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        while let Some(&pool) = self.pools.get(self.current) {
            match unsafe { device.allocate_descriptor_set(pool, layout.handle()) } {
                Ok(set) => return Ok(set),
                Err(err) if err.is_pool_exhausted() => self.current += 1,
                Err(err) => return Err(err),
            }
        }

        // Room for `set_count` sets of any type, and for at least one set of this layout.
        let mut pool_sizes: SmallVec<[(DescriptorType, u32); 9]> = ALL_DESCRIPTOR_TYPES
            .iter()
            .map(|&ty| (ty, self.set_count.saturating_mul(4)))
            .collect();

        for (ty, count) in layout.description().descriptor_counts() {
            if let Some((_, pool_count)) = pool_sizes.iter_mut().find(|(t, _)| *t == ty) {
                *pool_count = (*pool_count).max(count);
            }
        }

        let pool = device.create_descriptor_pool(self.set_count, &pool_sizes)?;
        self.pools.push(pool);
        self.current = self.pools.len() - 1;

        let set = unsafe { device.allocate_descriptor_set(pool, layout.handle()) }?;

        Ok(set)
    }

    /// Returns every allocated set to the pools.
    ///
    /// # Safety
    ///
    /// - No set allocated from the pools may still be in use.
    pub(crate) unsafe fn reset(&mut self, device: &dyn Device) -> Result<(), VulkanError> {
        for &pool in &self.pools[..(self.current + 1).min(self.pools.len())] {
            unsafe { device.reset_descriptor_pool(pool) }?;
        }

        self.current = 0;

        Ok(())
    }

    /// # Safety
    ///
    /// - No set allocated from the pools may still be in use.
    pub(crate) unsafe fn destroy(&mut self, device: &dyn Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool) };
        }

        self.current = 0;
    }
}

const ALL_DESCRIPTOR_TYPES: [DescriptorType; DescriptorType::COUNT] = [
    DescriptorType::UniformBuffer,
    DescriptorType::DynamicUniformBuffer,
    DescriptorType::StorageBuffer,
    DescriptorType::SampledImage,
    DescriptorType::StorageImage,
    DescriptorType::CombinedImageSampler,
    DescriptorType::UniformTexelBuffer,
    DescriptorType::StorageTexelBuffer,
    DescriptorType::InputAttachment,
];

#[cfg(test)]
mod tests {
    use super::{LayoutPool, TransientPool};
    use crate::{
        descriptor_set::{
            layout::{DescriptorType, SetLayoutBinding, SetLayoutDescription},
            registry::LayoutRegistry,
        },
        shader::ShaderStages,
    };

    fn uniform_layout() -> SetLayoutDescription {
        SetLayoutDescription::new(vec![SetLayoutBinding {
            binding: 0,
            descriptor_type: DescriptorType::UniformBuffer,
            descriptor_count: 1,
            stages: ShaderStages::VERTEX,
            immutable_sampler: None,
        }])
    }

    #[test]
    fn layout_pool_grows_when_exhausted() {
        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());
        let layout = registry.intern(&uniform_layout()).unwrap();
        let mut pool = LayoutPool::new(2);

        for _ in 0..2 {
            pool.allocate(&*device, &layout).unwrap();
        }
        assert_eq!(device.counters().descriptor_pools_created(), 1);

        // The third set doesn't fit in the first pool.
        pool.allocate(&*device, &layout).unwrap();
        assert_eq!(device.counters().descriptor_pools_created(), 2);
        assert_eq!(device.counters().descriptor_sets_allocated(), 3);

        let pools = pool.take_pools();
        assert_eq!(pools.len(), 2);
    }

    #[test]
    fn layout_pool_reuses_recycled_sets() {
        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());
        let layout = registry.intern(&uniform_layout()).unwrap();
        let mut pool = LayoutPool::new(8);

        let (set, recycled) = pool.allocate(&*device, &layout).unwrap();
        assert!(!recycled);
        pool.recycle(set);
        assert_eq!(pool.reserve_len(), 1);

        assert_eq!(pool.allocate(&*device, &layout).unwrap(), (set, true));
        assert_eq!(device.counters().descriptor_sets_allocated(), 1);
    }

    #[test]
    fn transient_pool_reset_reuses_pools() {
        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());
        let layout = registry.intern(&uniform_layout()).unwrap();
        let mut pool = TransientPool::new(1);

        pool.allocate(&*device, &layout).unwrap();
        pool.allocate(&*device, &layout).unwrap();
        assert_eq!(device.counters().descriptor_pools_created(), 2);

        unsafe { pool.reset(&*device) }.unwrap();
        pool.allocate(&*device, &layout).unwrap();
        assert_eq!(device.counters().descriptor_pools_created(), 2);

        unsafe { pool.destroy(&*device) };
        assert_eq!(device.counters().descriptor_pools_destroyed(), 2);
    }
}
