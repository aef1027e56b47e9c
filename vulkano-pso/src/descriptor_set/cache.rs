// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Reusing native descriptor sets by content.
//!
//! With caching enabled, every native set that was written is remembered together with its
//! content. When a writer resolves to a content that was seen before, the existing set is
//! returned without any call into the device. Sets that no command buffer used for a while are
//! put back in the reserve of their layout's pool by [`gc`](DescriptorSetCache::gc), once the
//! GPU is done with them.
//!
//! With caching disabled, every dirty writer gets a fresh set from the transient pool of the
//! command buffer being recorded.

use super::{
    pool::LayoutPool,
    update::{DescriptorSetError, DescriptorSetKey, DescriptorSetWriter},
};
use crate::{
    command_buffer::{CommandBuffer, CommandBufferState},
    device::Device,
    sync::{
        deferred::{DeferredDeletionQueue, DeferredObject},
        fence::FenceTracker,
    },
    NonExhaustive,
};
use ash::vk;
use foldhash::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{
    num::NonZero,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Parameters to create a new `DescriptorSetCache`.
#[derive(Clone, Debug)]
pub struct DescriptorSetCacheCreateInfo {
    /// Whether native sets are reused by content.
    ///
    /// The default value is `true`.
    pub enabled: bool,

    /// The number of frames a cached set must have gone unused before it is recycled.
    ///
    /// The default value is `8`.
    pub max_unused_frames: u64,

    /// The number of sets the first native pool of each layout has room for.
    ///
    /// The default value is `64`.
    pub sets_per_pool: u32,

    pub _ne: NonExhaustive,
}

impl Default for DescriptorSetCacheCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: true,
            max_unused_frames: 8,
            sets_per_pool: 64,
            _ne: NonExhaustive(()),
        }
    }
}

/// Counters describing how a `DescriptorSetCache` has been used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSetCacheStats {
    /// Lookups that found a set with the requested content.
    pub hits: u64,

    /// Lookups that had to write a set.
    pub misses: u64,

    /// Native sets allocated from a pool.
    pub allocations: u64,

    /// Sets put back in a reserve by [`gc`](DescriptorSetCache::gc).
    pub recycled: u64,
}

#[derive(Debug)]
struct CachedSet {
    set: vk::DescriptorSet,
    last_used_fence: u64,
    last_used_frame: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    sets: HashMap<DescriptorSetKey, CachedSet>,
    pools: HashMap<NonZero<u64>, LayoutPool>,
}

/// Maps descriptor set contents to native descriptor sets.
#[derive(Debug)]
pub struct DescriptorSetCache {
    device: Arc<dyn Device>,
    deferred: Arc<DeferredDeletionQueue>,
    fences: Arc<FenceTracker>,
    enabled: bool,
    max_unused_frames: u64,
    sets_per_pool: u32,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    allocations: AtomicU64,
    recycled: AtomicU64,
}

impl DescriptorSetCache {
    pub fn new(
        device: Arc<dyn Device>,
        deferred: Arc<DeferredDeletionQueue>,
        fences: Arc<FenceTracker>,
        create_info: DescriptorSetCacheCreateInfo,
    ) -> Self {
        let DescriptorSetCacheCreateInfo {
            enabled,
            max_unused_frames,
            sets_per_pool,
            _ne: _,
        } = create_info;

        DescriptorSetCache {
            device,
            deferred,
            fences,
            enabled,
            max_unused_frames,
            sets_per_pool,
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns a native set for the content of each writer, in order, for use by
    /// `command_buffer` during `frame`.
    ///
    /// A writer that is not dirty and was already resolved for this command buffer returns the
    /// same set again without any lookup.
    pub fn get_descriptor_sets(
        &self,
        command_buffer: &mut CommandBuffer,
        writers: &mut [DescriptorSetWriter],
        frame: u64,
    ) -> Result<SmallVec<[vk::DescriptorSet; 4]>, DescriptorSetError> {
        if command_buffer.state() != CommandBufferState::Recording {
            return Err(DescriptorSetError::NotRecording);
        }

        let fence_value = command_buffer.fence_value();
        let mut sets = SmallVec::new();

        for writer in writers.iter_mut() {
            if let Some(set) = writer.reusable_set(fence_value) {
                sets.push(set);
                continue;
            }

            writer.validate()?;

            let set = if self.enabled {
                self.cached_set(writer, fence_value, frame)?
            } else {
                self.transient_set(command_buffer, writer)?
            };

            writer.resolved(set, fence_value);
            sets.push(set);
        }

        Ok(sets)
    }

    fn cached_set(
        &self,
        writer: &mut DescriptorSetWriter,
        fence_value: u64,
        frame: u64,
    ) -> Result<vk::DescriptorSet, DescriptorSetError> {
        let key = writer.key();
        let mut state = self.state.lock();

        if let Some(cached) = state.sets.get_mut(&key) {
            cached.last_used_fence = cached.last_used_fence.max(fence_value);
            cached.last_used_frame = cached.last_used_frame.max(frame);
            self.hits.fetch_add(1, Ordering::Relaxed);

            return Ok(cached.set);
        }

        let layout = key.layout().clone();
        let (set, recycled) = state
            .pools
            .entry(layout.id())
            .or_insert_with(|| LayoutPool::new(self.sets_per_pool))
            .allocate(&*self.device, &layout)?;

        if !recycled {
            self.allocations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        unsafe { self.device.update_descriptor_set(set, &writer.writes()) };

        log::trace!(
            "wrote descriptor set {:?} for layout {:?}",
            set,
            layout.handle(),
        );

        state.sets.insert(
            key,
            CachedSet {
                set,
                last_used_fence: fence_value,
                last_used_frame: frame,
            },
        );

        Ok(set)
    }

    fn transient_set(
        &self,
        command_buffer: &mut CommandBuffer,
        writer: &DescriptorSetWriter,
    ) -> Result<vk::DescriptorSet, DescriptorSetError> {
        let set = command_buffer
            .descriptor_pool
            .allocate(&*self.device, writer.layout())?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);

        unsafe { self.device.update_descriptor_set(set, &writer.writes()) };

        Ok(set)
    }

    /// Recycles every cached set that the GPU is done with and that was not used during the last
    /// `max_unused_frames` frames. Returns the number of recycled sets.
    pub fn gc(&self, completed_fence: u64, current_frame: u64) -> usize {
        let mut state = self.state.lock();
        let CacheState { sets, pools } = &mut *state;
        let max_unused_frames = self.max_unused_frames;
        let mut recycled = 0;

        sets.retain(|key, cached| {
            let expired = cached.last_used_fence <= completed_fence
                && cached.last_used_frame + max_unused_frames <= current_frame;

            if expired {
                if let Some(pool) = pools.get_mut(&key.layout().id()) {
                    pool.recycle(cached.set);
                }
                recycled += 1;
            }

            !expired
        });

        if recycled != 0 {
            self.recycled.fetch_add(recycled as u64, Ordering::Relaxed);
            log::trace!(
                "recycled {} descriptor sets, {} remain cached",
                recycled,
                sets.len(),
            );
        }

        recycled
    }

    /// Returns the number of cached sets.
    #[inline]
    pub fn len(&self) -> usize {
        self.state.lock().sets.len()
    }

    #[inline]
    pub fn stats(&self) -> DescriptorSetCacheStats {
        DescriptorSetCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DescriptorSetCache {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let required_fence = self.fences.last_reserved();

        for pool in state.pools.values_mut() {
            for handle in pool.take_pools() {
                self.deferred
                    .push(DeferredObject::DescriptorPool(handle), required_fence);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DescriptorSetCache, DescriptorSetCacheCreateInfo};
    use crate::{
        command_buffer::{CommandBuffer, CommandBufferManager},
        descriptor_set::{
            layout::{DescriptorType, SetLayoutBinding, SetLayoutDescription},
            registry::{DescriptorSetLayout, LayoutRegistry},
            update::{DescriptorSetError, DescriptorSetWriter},
        },
        resource::Buffer,
        shader::ShaderStages,
        sync::{deferred::DeferredDeletionQueue, fence::FenceTracker},
        tests::MockDevice,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    struct Fixture {
        device: Arc<MockDevice>,
        registry: LayoutRegistry,
        manager: CommandBufferManager,
        cache: DescriptorSetCache,
    }

    impl Fixture {
        fn new(create_info: DescriptorSetCacheCreateInfo) -> Self {
            let device = mock_device!();
            let fences = Arc::new(FenceTracker::new());
            let deferred = Arc::new(DeferredDeletionQueue::new(device.clone()));

            Fixture {
                registry: LayoutRegistry::new(device.clone()),
                manager: CommandBufferManager::new(device.clone(), fences.clone(), 1, 4).unwrap(),
                cache: DescriptorSetCache::new(device.clone(), deferred, fences, create_info),
                device,
            }
        }

        fn layout(&self) -> Arc<DescriptorSetLayout> {
            self.registry
                .intern(&SetLayoutDescription::new(vec![SetLayoutBinding {
                    binding: 0,
                    descriptor_type: DescriptorType::UniformBuffer,
                    descriptor_count: 1,
                    stages: ShaderStages::VERTEX,
                    immutable_sampler: None,
                }]))
                .unwrap()
        }

        fn recording(&self) -> CommandBuffer {
            let mut command_buffer = self.manager.acquire().unwrap();
            self.manager.begin(&mut command_buffer).unwrap();

            command_buffer
        }

        fn writer(&self, buffer: &Arc<Buffer>) -> DescriptorSetWriter {
            let mut writer = DescriptorSetWriter::new(self.layout());
            writer.set_buffer(0, 0, buffer.clone(), 0, 64).unwrap();

            writer
        }

        fn finish(&self, mut command_buffer: CommandBuffer) -> u64 {
            self.manager.end(&mut command_buffer).unwrap();
            self.manager.submit(command_buffer).unwrap();
            self.device.signal_all();

            self.manager.poll().unwrap()
        }
    }

    fn buffer(raw: u64) -> Arc<Buffer> {
        unsafe { Buffer::from_handle(vk::Buffer::from_raw(raw), 1024) }
    }

    #[test]
    fn equal_content_shares_one_set() {
        let fixture = Fixture::new(Default::default());
        let mut command_buffer = fixture.recording();
        let x = buffer(1);

        let mut writers = [fixture.writer(&x)];
        let first = fixture
            .cache
            .get_descriptor_sets(&mut command_buffer, &mut writers, 0)
            .unwrap();

        // Committing again without changes does nothing.
        let again = fixture
            .cache
            .get_descriptor_sets(&mut command_buffer, &mut writers, 0)
            .unwrap();
        assert_eq!(first, again);

        // A different writer with the same content gets the same set.
        let mut other = [fixture.writer(&x)];
        let shared = fixture
            .cache
            .get_descriptor_sets(&mut command_buffer, &mut other, 0)
            .unwrap();
        assert_eq!(first, shared);

        let counters = fixture.device.counters();
        assert_eq!(counters.descriptor_sets_allocated(), 1);
        assert_eq!(counters.descriptor_updates(), 1);

        let stats = fixture.cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.allocations), (1, 1, 1));
        assert_eq!(fixture.cache.len(), 1);
    }

    #[test]
    fn requires_a_recording_command_buffer() {
        let fixture = Fixture::new(Default::default());
        let mut command_buffer = fixture.manager.acquire().unwrap();
        let mut writers = [fixture.writer(&buffer(1))];

        assert_eq!(
            fixture
                .cache
                .get_descriptor_sets(&mut command_buffer, &mut writers, 0),
            Err(DescriptorSetError::NotRecording),
        );
    }

    #[test]
    fn unbound_descriptors_are_rejected() {
        let fixture = Fixture::new(Default::default());
        let mut command_buffer = fixture.recording();
        let mut writers = [DescriptorSetWriter::new(fixture.layout())];

        assert_eq!(
            fixture
                .cache
                .get_descriptor_sets(&mut command_buffer, &mut writers, 0),
            Err(DescriptorSetError::Unbound {
                binding: 0,
                array_element: 0,
            }),
        );
        assert_eq!(fixture.device.counters().descriptor_sets_allocated(), 0);
    }

    #[test]
    fn gc_waits_for_gpu_and_idle_frames() {
        let fixture = Fixture::new(DescriptorSetCacheCreateInfo {
            max_unused_frames: 2,
            ..Default::default()
        });
        let mut command_buffer = fixture.recording();
        let mut writers = [fixture.writer(&buffer(1))];
        let sets = fixture
            .cache
            .get_descriptor_sets(&mut command_buffer, &mut writers, 0)
            .unwrap();

        // Still in use by the GPU.
        assert_eq!(fixture.cache.gc(0, 10), 0);

        let completed = fixture.finish(command_buffer);
        assert_eq!(completed, 1);

        // Used too recently.
        assert_eq!(fixture.cache.gc(completed, 1), 0);
        assert_eq!(fixture.cache.gc(completed, 2), 1);
        assert_eq!(fixture.cache.len(), 0);
        assert_eq!(fixture.cache.stats().recycled, 1);

        // New content reuses the recycled set.
        let mut command_buffer = fixture.recording();
        let mut writers = [fixture.writer(&buffer(2))];
        let reused = fixture
            .cache
            .get_descriptor_sets(&mut command_buffer, &mut writers, 3)
            .unwrap();

        assert_eq!(sets, reused);
        assert_eq!(fixture.device.counters().descriptor_sets_allocated(), 1);
        assert_eq!(fixture.device.counters().descriptor_updates(), 2);
    }

    #[test]
    fn disabled_cache_allocates_per_command_buffer() {
        let fixture = Fixture::new(DescriptorSetCacheCreateInfo {
            enabled: false,
            ..Default::default()
        });
        assert!(!fixture.cache.is_enabled());

        let x = buffer(1);
        let mut command_buffer = fixture.recording();

        for _ in 0..2 {
            let mut writers = [fixture.writer(&x)];
            fixture
                .cache
                .get_descriptor_sets(&mut command_buffer, &mut writers, 0)
                .unwrap();
        }

        assert_eq!(fixture.cache.len(), 0);
        assert_eq!(fixture.device.counters().descriptor_sets_allocated(), 2);

        fixture.finish(command_buffer);
        assert!(fixture.device.counters().descriptor_pool_resets() >= 1);
    }

    #[test]
    fn pools_are_released_on_drop() {
        let fixture = Fixture::new(Default::default());
        let mut command_buffer = fixture.recording();
        let mut writers = [fixture.writer(&buffer(1))];
        fixture
            .cache
            .get_descriptor_sets(&mut command_buffer, &mut writers, 0)
            .unwrap();
        fixture.finish(command_buffer);

        let Fixture { device, cache, .. } = fixture;
        drop(cache);

        assert_eq!(device.counters().descriptor_pools_destroyed(), 1);
    }
}
