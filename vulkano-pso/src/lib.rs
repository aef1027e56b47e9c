// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Pipeline and descriptor set state caching beneath a Vulkan rendering interface.
//!
//! # Brief summary
//!
//! - A [`Device`](crate::device::Device) is the narrow seam through which every native Vulkan
//!   object is created and destroyed. [`AshDevice`](crate::device::ash_device::AshDevice)
//!   implements it on top of `ash`.
//!
//! - The [layout builder](crate::descriptor_set::layout::build_layout) turns the per-stage
//!   resource bindings declared by shaders into merged, normalized descriptor set layout
//!   descriptions. The [`LayoutRegistry`](crate::descriptor_set::registry::LayoutRegistry)
//!   interns those descriptions so that structurally equal layouts share one native object.
//!
//! - The [`PipelineStateCache`](crate::pipeline::cache::PipelineStateCache) turns a
//!   [`PipelineEntry`](crate::pipeline::PipelineEntry) into a native pipeline, creating it at
//!   most once, and persists the known entries to disk so that later runs can rebuild them
//!   lazily. An optional [LRU policy](crate::pipeline::lru) reclaims native pipelines under
//!   memory pressure.
//!
//! - [`DescriptorSetWriter`](crate::descriptor_set::update::DescriptorSetWriter)s record what is
//!   bound at every slot of a set. The
//!   [`DescriptorSetCache`](crate::descriptor_set::cache::DescriptorSetCache) maps the content of
//!   a writer to a previously written native descriptor set.
//!
//! - The [`CommandBufferManager`](crate::command_buffer::CommandBufferManager) and the
//!   [`FenceTracker`](crate::sync::fence::FenceTracker) decide when a cached object may be reused,
//!   and the [`DeferredDeletionQueue`](crate::sync::deferred::DeferredDeletionQueue) holds every
//!   native object whose destruction must wait for the GPU.
//!
//! - The [`RenderContext`](crate::context::RenderContext) ties everything together behind the
//!   three calls a draw layer needs: bind a pipeline, bind a resource, commit the bindings.

pub use ash::vk::{DeviceSize, Handle};
use std::{error::Error, fmt};

#[macro_use]
mod tests;
mod cache;
pub mod command_buffer;
pub mod context;
pub mod descriptor_set;
pub mod device;
mod macros;
pub mod pipeline;
pub mod resource;
pub mod shader;
pub mod sync;

/// Error type returned by most native device operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VulkanError {
    /// A fence or query has not yet completed.
    NotReady,

    /// A wait operation has not completed in the specified time.
    Timeout,

    /// A host memory allocation has failed.
    OutOfHostMemory,

    /// A device memory allocation has failed.
    OutOfDeviceMemory,

    /// Initialization of an object could not be completed for implementation-specific reasons.
    InitializationFailed,

    /// The logical or physical device has been lost.
    DeviceLost,

    /// A pool memory allocation has failed.
    OutOfPoolMemory,

    /// A pool allocation has failed due to fragmentation of the pool's memory.
    FragmentedPool,

    /// An error code without a dedicated variant.
    Unnamed(ash::vk::Result),
}

impl VulkanError {
    /// Returns whether the error only means that a descriptor pool is full, in which case
    /// allocating from a fresh pool is expected to succeed.
    #[inline]
    pub fn is_pool_exhausted(self) -> bool {
        matches!(self, Self::OutOfPoolMemory | Self::FragmentedPool)
    }
}

impl From<ash::vk::Result> for VulkanError {
    fn from(val: ash::vk::Result) -> Self {
        match val {
            ash::vk::Result::NOT_READY => Self::NotReady,
            ash::vk::Result::TIMEOUT => Self::Timeout,
            ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            ash::vk::Result::ERROR_INITIALIZATION_FAILED => Self::InitializationFailed,
            ash::vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::OutOfPoolMemory,
            ash::vk::Result::ERROR_FRAGMENTED_POOL => Self::FragmentedPool,
            other => Self::Unnamed(other),
        }
    }
}

impl Error for VulkanError {}

impl fmt::Display for VulkanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "a fence or query has not yet completed"),
            Self::Timeout => write!(f, "a wait operation has not completed in the specified time"),
            Self::OutOfHostMemory => write!(f, "a host memory allocation has failed"),
            Self::OutOfDeviceMemory => write!(f, "a device memory allocation has failed"),
            Self::InitializationFailed => write!(
                f,
                "initialization of an object could not be completed for \
                implementation-specific reasons",
            ),
            Self::DeviceLost => write!(f, "the logical or physical device has been lost"),
            Self::OutOfPoolMemory => write!(f, "a pool memory allocation has failed"),
            Self::FragmentedPool => write!(
                f,
                "a pool allocation has failed due to fragmentation of the pool's memory",
            ),
            Self::Unnamed(result) => write!(f, "unnamed error, VkResult value {}", result.as_raw()),
        }
    }
}

/// Used in create info structs to indicate that it is non-exhaustive and must be constructed
/// with `..Default::default()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());
