// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The interface through which every native object is created and destroyed.
//!
//! The caches in this crate never call into Vulkan directly. They go through the [`Device`]
//! trait, which the surrounding renderer implements, or which
//! [`AshDevice`](ash_device::AshDevice) implements on top of an `ash` logical device. This keeps
//! the caches testable without a GPU.
//!
//! Methods that take a handle are `unsafe`: the caller must pass a handle that was created by
//! the same device and that has not been destroyed yet. Destruction methods additionally require
//! that the GPU no longer uses the object.

use crate::{
    descriptor_set::layout::{DescriptorType, SetLayoutDescription},
    pipeline::{graphics::GraphicsPipelineDescription, PipelineBindPoint},
    shader::{ShaderCode, ShaderStage},
    DeviceSize, VulkanError,
};
use ash::vk;
use std::{fmt, time::Duration};

pub mod ash_device;

/// The size assumed for a native pipeline when the device cannot tell.
pub const DEFAULT_PIPELINE_SIZE: u64 = 20 * 1024;

/// The properties of a physical device that decide whether a driver pipeline cache blob can be
/// reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceProperties {
    pub vendor_id: u32,
    pub device_id: u32,
    pub pipeline_cache_uuid: [u8; vk::UUID_SIZE],
}

impl From<&vk::PhysicalDeviceProperties> for DeviceProperties {
    #[inline]
    fn from(val: &vk::PhysicalDeviceProperties) -> Self {
        DeviceProperties {
            vendor_id: val.vendor_id,
            device_id: val.device_id,
            pipeline_cache_uuid: val.pipeline_cache_uuid,
        }
    }
}

/// What gets written to one descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorWriteInfo {
    Buffer {
        buffer: vk::Buffer,
        offset: DeviceSize,
        range: DeviceSize,
    },
    Image {
        view: vk::ImageView,
        layout: vk::ImageLayout,
        sampler: vk::Sampler,
    },
    TexelBuffer(vk::BufferView),
}

/// A write to one descriptor of a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: DescriptorType,
    pub info: DescriptorWriteInfo,
}

/// Parameters to create a native graphics pipeline.
#[derive(Clone, Copy, Debug)]
pub struct GraphicsPipelineCreateInfo<'a> {
    pub layout: vk::PipelineLayout,
    pub stages: &'a [(ShaderStage, vk::ShaderModule)],
    pub description: &'a GraphicsPipelineDescription,
}

/// Parameters to create a native compute pipeline.
#[derive(Clone, Copy, Debug)]
pub struct ComputePipelineCreateInfo {
    pub layout: vk::PipelineLayout,
    pub module: vk::ShaderModule,
}

/// A logical device, as seen by the caches.
pub trait Device: Send + Sync + fmt::Debug {
    fn properties(&self) -> &DeviceProperties;

    fn create_descriptor_set_layout(
        &self,
        description: &SetLayoutDescription,
    ) -> Result<vk::DescriptorSetLayout, VulkanError>;

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    unsafe fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, VulkanError>;

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_shader_module(&self, code: &ShaderCode) -> Result<vk::ShaderModule, VulkanError>;

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Creates a driver pipeline cache, seeded with `initial_data` if it is not empty.
    fn create_pipeline_cache(&self, initial_data: &[u8]) -> Result<vk::PipelineCache, VulkanError>;

    unsafe fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> Result<Vec<u8>, VulkanError>;

    unsafe fn merge_pipeline_caches(
        &self,
        dst: vk::PipelineCache,
        src: &[vk::PipelineCache],
    ) -> Result<(), VulkanError>;

    unsafe fn destroy_pipeline_cache(&self, cache: vk::PipelineCache);

    unsafe fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        create_info: &GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline, VulkanError>;

    unsafe fn create_compute_pipeline(
        &self,
        cache: vk::PipelineCache,
        create_info: &ComputePipelineCreateInfo,
    ) -> Result<vk::Pipeline, VulkanError>;

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Returns how many bytes of memory `pipeline` is assumed to occupy, for size-bounded
    /// pipeline eviction.
    #[inline]
    fn estimate_pipeline_size(&self, pipeline: vk::Pipeline) -> u64 {
        let _ = pipeline;

        DEFAULT_PIPELINE_SIZE
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[(DescriptorType, u32)],
    ) -> Result<vk::DescriptorPool, VulkanError>;

    /// Returns every set allocated from `pool` to the pool.
    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), VulkanError>;

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError>;

    unsafe fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    fn create_fence(&self) -> Result<vk::Fence, VulkanError>;

    /// Returns whether `fence` is signaled.
    unsafe fn fence_status(&self, fence: vk::Fence) -> Result<bool, VulkanError>;

    /// Waits until all of `fences` are signaled. Returns [`VulkanError::Timeout`] if that didn't
    /// happen within `timeout`.
    unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        timeout: Duration,
    ) -> Result<(), VulkanError>;

    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<(), VulkanError>;

    unsafe fn destroy_fence(&self, fence: vk::Fence);

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer, VulkanError>;

    unsafe fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);

    /// Begins recording, discarding any previously recorded commands.
    unsafe fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError>;

    unsafe fn end_command_buffer(&self, command_buffer: vk::CommandBuffer)
        -> Result<(), VulkanError>;

    /// Submits `command_buffer` to the queue. `fence` is signaled when execution completes.
    unsafe fn queue_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> Result<(), VulkanError>;

    unsafe fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    );

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
}
