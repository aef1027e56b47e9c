// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![cfg(test)]

use crate::{
    descriptor_set::layout::{DescriptorType, SetLayoutDescription},
    device::{
        ComputePipelineCreateInfo, DescriptorWrite, Device, DeviceProperties,
        GraphicsPipelineCreateInfo,
    },
    pipeline::PipelineBindPoint,
    shader::ShaderCode,
    VulkanError,
};
use ash::vk::{self, Handle};
use foldhash::HashMap;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Creates a `MockDevice` and initializes logging for the test.
macro_rules! mock_device {
    () => {{
        let _ = env_logger::builder().is_test(true).try_init();

        $crate::tests::MockDevice::new()
    }};
}

macro_rules! counters {
    ($($name:ident,)+) => {
        /// How many times each kind of device call was made.
        #[derive(Debug, Default)]
        pub(crate) struct Counters {
            $($name: AtomicU64,)+
        }

        impl Counters {
            $(
                pub(crate) fn $name(&self) -> u64 {
                    self.$name.load(Ordering::SeqCst)
                }
            )+
        }
    };
}

counters! {
    set_layouts_created,
    set_layouts_destroyed,
    pipeline_layouts_created,
    pipeline_layouts_destroyed,
    shader_modules_created,
    shader_modules_destroyed,
    pipeline_caches_created,
    pipeline_caches_destroyed,
    pipeline_cache_merges,
    pipelines_created,
    pipelines_destroyed,
    descriptor_pools_created,
    descriptor_pools_destroyed,
    descriptor_pool_resets,
    descriptor_sets_allocated,
    descriptor_updates,
    descriptor_writes,
    fences_created,
    fences_destroyed,
    command_buffers_allocated,
    command_buffers_freed,
    submissions,
    pipeline_binds,
    descriptor_set_binds,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Which call fails for a fence passed to [`MockDevice::break_fence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FenceFailure {
    Status,
    Reset,
}

#[derive(Debug)]
struct PoolState {
    max_sets: u32,
    allocated: u32,
}

/// A `Device` that hands out fake handles and counts every call.
///
/// Fences are only signaled by [`signal_all`](Self::signal_all) or by waiting on them.
#[derive(Debug)]
pub(crate) struct MockDevice {
    properties: DeviceProperties,
    next_handle: AtomicU64,
    counters: Counters,
    pools: Mutex<HashMap<u64, PoolState>>,
    fences: Mutex<HashMap<u64, bool>>,
    broken_fences: Mutex<HashMap<u64, FenceFailure>>,
    hung: AtomicBool,
    fail_next_pipeline: AtomicBool,
}

impl MockDevice {
    pub(crate) const PROPERTIES: DeviceProperties = DeviceProperties {
        vendor_id: 0x1234,
        device_id: 0x5678,
        pipeline_cache_uuid: [0x42; vk::UUID_SIZE],
    };

    pub(crate) fn new() -> Arc<Self> {
        Self::with_properties(Self::PROPERTIES)
    }

    pub(crate) fn with_properties(properties: DeviceProperties) -> Arc<Self> {
        Arc::new(MockDevice {
            properties,
            next_handle: AtomicU64::new(1),
            counters: Counters::default(),
            pools: Mutex::default(),
            fences: Mutex::default(),
            broken_fences: Mutex::default(),
            hung: AtomicBool::new(false),
            fail_next_pipeline: AtomicBool::new(false),
        })
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Signals every fence, as if the GPU finished all submitted work.
    pub(crate) fn signal_all(&self) {
        for signaled in self.fences.lock().values_mut() {
            *signaled = true;
        }
    }

    /// Makes waits time out instead of completing.
    pub(crate) fn set_hung(&self, hung: bool) {
        self.hung.store(hung, Ordering::SeqCst);
    }

    /// Makes every `failure` call on `fence` fail with `DeviceLost`, until
    /// [`repair_fence`](Self::repair_fence) is called.
    pub(crate) fn break_fence(&self, fence: vk::Fence, failure: FenceFailure) {
        self.broken_fences.lock().insert(fence.as_raw(), failure);
    }

    pub(crate) fn repair_fence(&self, fence: vk::Fence) {
        self.broken_fences.lock().remove(&fence.as_raw());
    }

    fn check_fence(&self, fence: vk::Fence, failure: FenceFailure) -> Result<(), VulkanError> {
        if self.broken_fences.lock().get(&fence.as_raw()) == Some(&failure) {
            return Err(VulkanError::DeviceLost);
        }

        Ok(())
    }

    /// Makes the next pipeline creation fail.
    pub(crate) fn fail_next_pipeline(&self) {
        self.fail_next_pipeline.store(true, Ordering::SeqCst);
    }

    /// Returns a driver cache blob as a device with `properties` would produce it.
    pub(crate) fn driver_cache_blob(properties: &DeviceProperties) -> Vec<u8> {
        let header_size = 16 + vk::UUID_SIZE as u32;
        let header_version = vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32;
        let mut data = Vec::new();
        data.extend_from_slice(&header_size.to_le_bytes());
        data.extend_from_slice(&header_version.to_le_bytes());
        data.extend_from_slice(&properties.vendor_id.to_le_bytes());
        data.extend_from_slice(&properties.device_id.to_le_bytes());
        data.extend_from_slice(&properties.pipeline_cache_uuid);
        data.extend_from_slice(&[0xAB; 64]);

        data
    }

    fn next_handle<T: Handle>(&self) -> T {
        T::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn create_pipeline(&self) -> Result<vk::Pipeline, VulkanError> {
        if self.fail_next_pipeline.swap(false, Ordering::SeqCst) {
            return Err(VulkanError::InitializationFailed);
        }

        bump(&self.counters.pipelines_created);

        Ok(self.next_handle())
    }
}

impl Device for MockDevice {
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn create_descriptor_set_layout(
        &self,
        _description: &SetLayoutDescription,
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        bump(&self.counters.set_layouts_created);

        Ok(self.next_handle())
    }

    unsafe fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        bump(&self.counters.set_layouts_destroyed);
    }

    unsafe fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, VulkanError> {
        bump(&self.counters.pipeline_layouts_created);

        Ok(self.next_handle())
    }

    unsafe fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        bump(&self.counters.pipeline_layouts_destroyed);
    }

    fn create_shader_module(&self, _code: &ShaderCode) -> Result<vk::ShaderModule, VulkanError> {
        bump(&self.counters.shader_modules_created);

        Ok(self.next_handle())
    }

    unsafe fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        bump(&self.counters.shader_modules_destroyed);
    }

    fn create_pipeline_cache(
        &self,
        _initial_data: &[u8],
    ) -> Result<vk::PipelineCache, VulkanError> {
        bump(&self.counters.pipeline_caches_created);

        Ok(self.next_handle())
    }

    unsafe fn pipeline_cache_data(
        &self,
        _cache: vk::PipelineCache,
    ) -> Result<Vec<u8>, VulkanError> {
        Ok(Self::driver_cache_blob(&self.properties))
    }

    unsafe fn merge_pipeline_caches(
        &self,
        _dst: vk::PipelineCache,
        _src: &[vk::PipelineCache],
    ) -> Result<(), VulkanError> {
        bump(&self.counters.pipeline_cache_merges);

        Ok(())
    }

    unsafe fn destroy_pipeline_cache(&self, _cache: vk::PipelineCache) {
        bump(&self.counters.pipeline_caches_destroyed);
    }

    unsafe fn create_graphics_pipeline(
        &self,
        _cache: vk::PipelineCache,
        _create_info: &GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline, VulkanError> {
        self.create_pipeline()
    }

    unsafe fn create_compute_pipeline(
        &self,
        _cache: vk::PipelineCache,
        _create_info: &ComputePipelineCreateInfo,
    ) -> Result<vk::Pipeline, VulkanError> {
        self.create_pipeline()
    }

    unsafe fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        bump(&self.counters.pipelines_destroyed);
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        _pool_sizes: &[(DescriptorType, u32)],
    ) -> Result<vk::DescriptorPool, VulkanError> {
        bump(&self.counters.descriptor_pools_created);
        let pool: vk::DescriptorPool = self.next_handle();
        self.pools.lock().insert(
            pool.as_raw(),
            PoolState {
                max_sets,
                allocated: 0,
            },
        );

        Ok(pool)
    }

    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), VulkanError> {
        bump(&self.counters.descriptor_pool_resets);

        if let Some(state) = self.pools.lock().get_mut(&pool.as_raw()) {
            state.allocated = 0;
        }

        Ok(())
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        bump(&self.counters.descriptor_pools_destroyed);
        self.pools.lock().remove(&pool.as_raw());
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        let mut pools = self.pools.lock();
        let state = pools
            .get_mut(&pool.as_raw())
            .ok_or(VulkanError::OutOfPoolMemory)?;

        if state.allocated >= state.max_sets {
            return Err(VulkanError::OutOfPoolMemory);
        }

        state.allocated += 1;
        bump(&self.counters.descriptor_sets_allocated);

        Ok(self.next_handle())
    }

    unsafe fn update_descriptor_set(&self, _set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        bump(&self.counters.descriptor_updates);
        self.counters
            .descriptor_writes
            .fetch_add(writes.len() as u64, Ordering::SeqCst);
    }

    fn create_fence(&self) -> Result<vk::Fence, VulkanError> {
        bump(&self.counters.fences_created);
        let fence: vk::Fence = self.next_handle();
        self.fences.lock().insert(fence.as_raw(), false);

        Ok(fence)
    }

    unsafe fn fence_status(&self, fence: vk::Fence) -> Result<bool, VulkanError> {
        self.check_fence(fence, FenceFailure::Status)?;

        Ok(self
            .fences
            .lock()
            .get(&fence.as_raw())
            .copied()
            .unwrap_or(false))
    }

    unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        _timeout: Duration,
    ) -> Result<(), VulkanError> {
        if self.hung.load(Ordering::SeqCst) {
            return Err(VulkanError::Timeout);
        }

        let mut states = self.fences.lock();

        for fence in fences {
            states.insert(fence.as_raw(), true);
        }

        Ok(())
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<(), VulkanError> {
        self.check_fence(fence, FenceFailure::Reset)?;
        self.fences.lock().insert(fence.as_raw(), false);

        Ok(())
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        bump(&self.counters.fences_destroyed);
        self.fences.lock().remove(&fence.as_raw());
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer, VulkanError> {
        bump(&self.counters.command_buffers_allocated);

        Ok(self.next_handle())
    }

    unsafe fn free_command_buffer(&self, _command_buffer: vk::CommandBuffer) {
        bump(&self.counters.command_buffers_freed);
    }

    unsafe fn begin_command_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        Ok(())
    }

    unsafe fn end_command_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        Ok(())
    }

    unsafe fn queue_submit(
        &self,
        _command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> Result<(), VulkanError> {
        bump(&self.counters.submissions);
        self.fences.lock().insert(fence.as_raw(), false);

        Ok(())
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        _command_buffer: vk::CommandBuffer,
        _bind_point: PipelineBindPoint,
        _pipeline: vk::Pipeline,
    ) {
        bump(&self.counters.pipeline_binds);
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        _command_buffer: vk::CommandBuffer,
        _bind_point: PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _first_set: u32,
        _sets: &[vk::DescriptorSet],
        _dynamic_offsets: &[u32],
    ) {
        bump(&self.counters.descriptor_set_binds);
    }
}
