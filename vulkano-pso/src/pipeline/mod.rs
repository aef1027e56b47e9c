// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Pipelines and their descriptions.
//!
//! A [`PipelineEntry`] is the full, serializable description of a pipeline. Entries are compared
//! and hashed structurally, so two requests with the same description always resolve to the same
//! [`Pipeline`] object in the [`PipelineStateCache`](cache::PipelineStateCache).
//!
//! A `Pipeline` keeps its identity for as long as it is cached, even while it has no native
//! pipeline object: entries loaded from disk start out without one, and the LRU policy may
//! destroy it again later. The native object is (re)created on the next request.

use self::{compute::ComputePipelineDescription, graphics::GraphicsPipelineDescription};
use crate::{
    macros::{impl_id_counter, vulkan_enum},
    pipeline::layout::PipelineLayout,
    shader::{ShaderHash, ShaderStageInfo},
    sync::deferred::{DeferredDeletionQueue, DeferredObject},
};
use ash::vk;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    num::NonZero,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub mod cache;
pub mod compute;
pub mod graphics;
pub mod layout;
pub mod lru;

vulkan_enum! {
    /// The type of a pipeline.
    PipelineBindPoint = PipelineBindPoint(i32);

    Compute = COMPUTE,
    Graphics = GRAPHICS,
}

/// The full description of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineEntry {
    Graphics(GraphicsPipelineDescription),
    Compute(ComputePipelineDescription),
}

impl PipelineEntry {
    #[inline]
    pub fn bind_point(&self) -> PipelineBindPoint {
        match self {
            Self::Graphics(_) => PipelineBindPoint::Graphics,
            Self::Compute(_) => PipelineBindPoint::Compute,
        }
    }

    /// Returns the shader stages of the pipeline.
    #[inline]
    pub fn stages(&self) -> &[ShaderStageInfo] {
        match self {
            Self::Graphics(description) => &description.stages,
            Self::Compute(description) => std::slice::from_ref(&description.stage),
        }
    }

    /// Returns the content hashes of the shader bytecode the pipeline needs.
    pub fn shader_hashes(&self) -> impl Iterator<Item = ShaderHash> + '_ {
        self.stages().iter().map(|stage| stage.code)
    }

    /// Returns whether the entry can be written to a cache file.
    #[inline]
    pub(crate) fn is_persistable(&self) -> bool {
        !self.stages().iter().any(|stage| stage.has_immutable_samplers())
    }
}

impl From<GraphicsPipelineDescription> for PipelineEntry {
    #[inline]
    fn from(val: GraphicsPipelineDescription) -> Self {
        Self::Graphics(val)
    }
}

impl From<ComputePipelineDescription> for PipelineEntry {
    #[inline]
    fn from(val: ComputePipelineDescription) -> Self {
        Self::Compute(val)
    }
}

/// Where a pipeline stands with respect to the LRU policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LruState {
    /// The pipeline has never been tracked, or the policy is disabled.
    Unregistered,

    /// The pipeline has a native object and is tracked.
    Registered,

    /// The native object was destroyed to reclaim memory. It is recreated on next use.
    Evicted,
}

#[derive(Debug)]
pub(crate) struct NativeState {
    pub(crate) handle: Option<vk::Pipeline>,
    pub(crate) layout: Option<Arc<PipelineLayout>>,
    pub(crate) lru: LruState,
    pub(crate) size: u64,
}

/// A cached pipeline.
#[derive(Debug)]
pub struct Pipeline {
    entry: PipelineEntry,
    id: NonZero<u64>,
    from_disk: bool,
    pub(crate) state: Mutex<NativeState>,
    last_used_fence: AtomicU64,
    last_used_frame: AtomicU64,
    deferred: Arc<DeferredDeletionQueue>,
}

impl Pipeline {
    pub(crate) fn new(
        entry: PipelineEntry,
        from_disk: bool,
        deferred: Arc<DeferredDeletionQueue>,
    ) -> Self {
        Pipeline {
            entry,
            id: Self::next_id(),
            from_disk,
            state: Mutex::new(NativeState {
                handle: None,
                layout: None,
                lru: LruState::Unregistered,
                size: 0,
            }),
            last_used_fence: AtomicU64::new(0),
            last_used_frame: AtomicU64::new(0),
            deferred,
        }
    }

    #[inline]
    pub fn entry(&self) -> &PipelineEntry {
        &self.entry
    }

    #[inline]
    pub fn bind_point(&self) -> PipelineBindPoint {
        self.entry.bind_point()
    }

    /// Returns whether the entry was loaded from a cache file rather than requested in this run.
    #[inline]
    pub fn is_from_disk(&self) -> bool {
        self.from_disk
    }

    /// Returns the native pipeline, if one currently exists.
    #[inline]
    pub fn handle(&self) -> Option<vk::Pipeline> {
        self.state.lock().handle
    }

    /// Returns the pipeline layout. It exists once the native pipeline has been created, and
    /// survives eviction.
    #[inline]
    pub fn layout(&self) -> Option<Arc<PipelineLayout>> {
        self.state.lock().layout.clone()
    }

    #[inline]
    pub fn lru_state(&self) -> LruState {
        self.state.lock().lru
    }

    /// Returns the fence value of the last command buffer that used the pipeline, or 0.
    #[inline]
    pub fn last_used_fence(&self) -> u64 {
        self.last_used_fence.load(Ordering::Acquire)
    }

    #[inline]
    pub fn last_used_frame(&self) -> u64 {
        self.last_used_frame.load(Ordering::Acquire)
    }

    /// Records that the command buffer with `fence_value` uses the pipeline.
    #[inline]
    pub(crate) fn mark_used(&self, fence_value: u64, frame: u64) {
        self.last_used_fence.fetch_max(fence_value, Ordering::AcqRel);
        self.last_used_frame.fetch_max(frame, Ordering::AcqRel);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().handle.take() {
            self.deferred.push(
                DeferredObject::Pipeline(handle),
                *self.last_used_fence.get_mut(),
            );
        }
    }
}

impl_id_counter!(Pipeline);
