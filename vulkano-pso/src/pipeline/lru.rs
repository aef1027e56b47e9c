//! Bounded residency of native pipelines.
//!
//! When enabled, every pipeline with a native object is tracked in least-recently-used order.
//! Once the tracked total exceeds the capacity, the least recently used pipelines have their
//! native object destroyed (through the deferred deletion queue) until the total fits again.
//! The [`Pipeline`] itself stays in the cache, so the next request rebuilds the native object
//! from the stored description.
//!
//! A pipeline is only evicted once the GPU has finished every command buffer that used it, and
//! once it has not been used for [`min_frames_unused`] frames.
//!
//! [`min_frames_unused`]: PipelineLruCreateInfo::min_frames_unused

use super::{LruState, NativeState, Pipeline};
use crate::{
    sync::deferred::{DeferredDeletionQueue, DeferredObject},
    NonExhaustive,
};
use lru::LruCache;
use std::{num::NonZero, sync::Arc};

/// How much the LRU policy keeps resident.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LruCapacity {
    /// At most this many native pipelines.
    Entries(usize),

    /// At most this many bytes of native pipelines, as estimated by
    /// [`Device::estimate_pipeline_size`](crate::device::Device::estimate_pipeline_size).
    Bytes(u64),
}

/// Parameters of the pipeline LRU policy.
#[derive(Clone, Debug)]
pub struct PipelineLruCreateInfo {
    /// The capacity above which pipelines are evicted.
    ///
    /// The default value is `LruCapacity::Entries(2048)`.
    pub capacity: LruCapacity,

    /// The number of frames a pipeline must have gone unused before it can be evicted.
    ///
    /// The default value is `3`.
    pub min_frames_unused: u64,

    pub _ne: NonExhaustive,
}

impl Default for PipelineLruCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            capacity: LruCapacity::Entries(2048),
            min_frames_unused: 3,
            _ne: NonExhaustive(()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct PipelineLru {
    capacity: LruCapacity,
    min_frames_unused: u64,
    order: LruCache<NonZero<u64>, Arc<Pipeline>>,
    total_size: u64,
}

impl PipelineLru {
    pub(crate) fn new(create_info: &PipelineLruCreateInfo) -> Self {
        PipelineLru {
            capacity: create_info.capacity,
            min_frames_unused: create_info.min_frames_unused,
            order: LruCache::unbounded(),
            total_size: 0,
        }
    }

    /// Marks `pipeline` as most recently used, registering it if needed. `state` must be the
    /// locked state of `pipeline`, and the pipeline must have a native object.
    pub(crate) fn touch(&mut self, pipeline: &Arc<Pipeline>, state: &mut NativeState) {
        if state.handle.is_none() {
            return;
        }

        if self.order.get(&pipeline.id()).is_none() {
            self.order.put(pipeline.id(), pipeline.clone());
            self.total_size += state.size;
            state.lru = LruState::Registered;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    fn is_over_capacity(&self) -> bool {
        match self.capacity {
            LruCapacity::Entries(max) => self.order.len() > max,
            LruCapacity::Bytes(max) => self.total_size > max,
        }
    }

    /// Evicts least recently used pipelines until the capacity is respected, skipping any that
    /// may still be in use. Returns the number of evicted pipelines.
    pub(crate) fn evict(
        &mut self,
        completed_fence: u64,
        current_frame: u64,
        deferred: &DeferredDeletionQueue,
    ) -> usize {
        if !self.is_over_capacity() {
            return 0;
        }

        let candidates: Vec<_> = self
            .order
            .iter()
            .rev()
            .map(|(id, pipeline)| (*id, pipeline.clone()))
            .collect();
        let mut evicted = 0;

        for (id, pipeline) in candidates {
            if !self.is_over_capacity() {
                break;
            }

            let mut state = pipeline.state.lock();
            let last_used_fence = pipeline.last_used_fence();

            if last_used_fence > completed_fence
                || pipeline.last_used_frame() + self.min_frames_unused > current_frame
            {
                continue;
            }

            if let Some(handle) = state.handle.take() {
                deferred.push(DeferredObject::Pipeline(handle), last_used_fence);
            }

            self.total_size -= state.size;
            state.size = 0;
            state.lru = LruState::Evicted;
            drop(state);

            self.order.pop(&id);
            evicted += 1;
        }

        if evicted != 0 {
            log::debug!(
                "evicted {} native pipelines, {} remain resident",
                evicted,
                self.order.len(),
            );
        }

        evicted
    }

    /// Stops tracking every pipeline.
    pub(crate) fn clear(&mut self) {
        for (_, pipeline) in self.order.iter() {
            let mut state = pipeline.state.lock();

            if state.lru == LruState::Registered {
                state.lru = LruState::Unregistered;
            }
        }

        self.order.clear();
        self.total_size = 0;
    }
}
