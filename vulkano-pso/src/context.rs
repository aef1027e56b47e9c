// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The entry point for a draw layer.
//!
//! A [`RenderContext`] owns every cache of the crate for one device. Drawing goes through a
//! [`BindPoint`], which holds the bound pipeline and what is bound to each of its descriptors:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vulkano_pso::{
//! #     context::{BindPoint, RenderContext},
//! #     descriptor_set::update::DescriptorResource,
//! #     pipeline::PipelineEntry,
//! #     resource::Buffer,
//! # };
//! # fn example(
//! #     context: &RenderContext,
//! #     entry: &PipelineEntry,
//! #     buffer: Arc<Buffer>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut command_buffer = context.command_buffers().acquire()?;
//! context.command_buffers().begin(&mut command_buffer)?;
//!
//! let mut bind_point = BindPoint::new();
//! context.bind_pipeline(&mut bind_point, entry)?;
//! bind_point.bind_resource(
//!     0,
//!     0,
//!     DescriptorResource::Buffer {
//!         buffer,
//!         offset: 0,
//!         range: 256,
//!     },
//! )?;
//! context.commit_bindings(&mut command_buffer, &mut bind_point)?;
//! // Record the draw here.
//!
//! context.command_buffers().end(&mut command_buffer)?;
//! context.command_buffers().submit(command_buffer)?;
//! context.end_frame()?;
//! # Ok(())
//! # }
//! ```

use crate::{
    command_buffer::{
        BoundDescriptorSets, CommandBuffer, CommandBufferError, CommandBufferManager,
    },
    descriptor_set::{
        cache::{DescriptorSetCache, DescriptorSetCacheCreateInfo},
        registry::LayoutRegistry,
        update::{DescriptorResource, DescriptorSetError, DescriptorSetWriter},
    },
    device::Device,
    pipeline::{
        cache::{PipelineCacheError, PipelineStateCache, PipelineStateCacheCreateInfo},
        layout::PipelineLayout,
        Pipeline, PipelineEntry,
    },
    shader::{ShaderCode, ShaderHash},
    sync::{deferred::DeferredDeletionQueue, fence::FenceTracker},
    NonExhaustive, VulkanError,
};
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Parameters to create a new `RenderContext`.
#[derive(Clone, Debug)]
pub struct RenderContextCreateInfo {
    pub pipeline_cache: PipelineStateCacheCreateInfo,

    pub descriptor_set_cache: DescriptorSetCacheCreateInfo,

    /// The number of command buffers to create up front. More are created when needed.
    ///
    /// The default value is `3`.
    pub command_buffer_count: usize,

    pub _ne: NonExhaustive,
}

impl Default for RenderContextCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            pipeline_cache: PipelineStateCacheCreateInfo::default(),
            descriptor_set_cache: DescriptorSetCacheCreateInfo::default(),
            command_buffer_count: 3,
            _ne: NonExhaustive(()),
        }
    }
}

/// Owns the caches and the command buffers of one device.
#[derive(Debug)]
pub struct RenderContext {
    device: Arc<dyn Device>,
    fences: Arc<FenceTracker>,
    deferred: Arc<DeferredDeletionQueue>,
    registry: Arc<LayoutRegistry>,
    pipelines: PipelineStateCache,
    descriptor_sets: DescriptorSetCache,
    command_buffers: CommandBufferManager,
    frame: AtomicU64,
}

impl RenderContext {
    pub fn new(
        device: Arc<dyn Device>,
        create_info: RenderContextCreateInfo,
    ) -> Result<Self, VulkanError> {
        let RenderContextCreateInfo {
            pipeline_cache,
            descriptor_set_cache,
            command_buffer_count,
            _ne: _,
        } = create_info;

        let fences = Arc::new(FenceTracker::new());
        let deferred = Arc::new(DeferredDeletionQueue::new(device.clone()));
        let registry = Arc::new(LayoutRegistry::new(device.clone()));
        let transient_sets_per_pool = descriptor_set_cache.sets_per_pool;

        let pipelines = PipelineStateCache::new(
            device.clone(),
            registry.clone(),
            deferred.clone(),
            fences.clone(),
            pipeline_cache,
        )?;
        let descriptor_sets = DescriptorSetCache::new(
            device.clone(),
            deferred.clone(),
            fences.clone(),
            descriptor_set_cache,
        );
        let command_buffers = CommandBufferManager::new(
            device.clone(),
            fences.clone(),
            command_buffer_count,
            transient_sets_per_pool,
        )?;

        Ok(RenderContext {
            device,
            fences,
            deferred,
            registry,
            pipelines,
            descriptor_sets,
            command_buffers,
            frame: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    #[inline]
    pub fn fences(&self) -> &Arc<FenceTracker> {
        &self.fences
    }

    #[inline]
    pub fn layout_registry(&self) -> &Arc<LayoutRegistry> {
        &self.registry
    }

    #[inline]
    pub fn pipeline_cache(&self) -> &PipelineStateCache {
        &self.pipelines
    }

    #[inline]
    pub fn descriptor_set_cache(&self) -> &DescriptorSetCache {
        &self.descriptor_sets
    }

    #[inline]
    pub fn command_buffers(&self) -> &CommandBufferManager {
        &self.command_buffers
    }

    /// Returns the number of frames ended so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Relaxed)
    }

    /// See [`PipelineStateCache::register_shader`].
    #[inline]
    pub fn register_shader(&self, code: ShaderCode) -> ShaderHash {
        self.pipelines.register_shader(code)
    }

    /// Binds the pipeline for `entry` to `bind_point`, creating it if needed.
    ///
    /// Resources bound to a set keep being bound if the new pipeline uses the same layout for
    /// that set.
    pub fn bind_pipeline(
        &self,
        bind_point: &mut BindPoint,
        entry: &PipelineEntry,
    ) -> Result<Arc<Pipeline>, RenderError> {
        if let Some(current) = &bind_point.pipeline {
            if current.entry() == entry {
                return Ok(current.clone());
            }
        }

        let pipeline = self.pipelines.get_or_create(entry)?;
        let layout = self.pipelines.layout_of(&pipeline)?;
        bind_point.set_pipeline(pipeline.clone(), layout);

        Ok(pipeline)
    }

    /// Records the binding of the pipeline and of descriptor sets holding the resources of
    /// `bind_point` into `command_buffer`. Nothing is recorded for state that is already bound
    /// in `command_buffer`, whichever bind point bound it.
    pub fn commit_bindings(
        &self,
        command_buffer: &mut CommandBuffer,
        bind_point: &mut BindPoint,
    ) -> Result<(), RenderError> {
        let pipeline = bind_point
            .pipeline
            .clone()
            .ok_or(DescriptorSetError::NoPipelineBound)?;
        let fence_value = command_buffer.fence_value();

        let (handle, layout) = self
            .pipelines
            .use_pipeline_with_layout(&pipeline, fence_value)?;
        let sets = self.descriptor_sets.get_descriptor_sets(
            command_buffer,
            &mut bind_point.writers,
            self.frame(),
        )?;
        let dynamic_offsets: SmallVec<[u32; 4]> = bind_point
            .writers
            .iter()
            .flat_map(|writer| writer.dynamic_offsets().iter().copied())
            .collect();

        let command_buffer_handle = command_buffer.handle();
        let bind_point_type = pipeline.bind_point();
        let bound = command_buffer.current_state.bind_point_mut(bind_point_type);

        if bound.pipeline != Some(handle) {
            unsafe {
                self.device
                    .cmd_bind_pipeline(command_buffer_handle, bind_point_type, handle)
            };
            bound.pipeline = Some(handle);
        }

        if !sets.is_empty() {
            let descriptor_sets = BoundDescriptorSets {
                layout: layout.handle(),
                sets,
                dynamic_offsets,
            };

            if bound.descriptor_sets.as_ref() != Some(&descriptor_sets) {
                unsafe {
                    self.device.cmd_bind_descriptor_sets(
                        command_buffer_handle,
                        bind_point_type,
                        descriptor_sets.layout,
                        0,
                        &descriptor_sets.sets,
                        &descriptor_sets.dynamic_offsets,
                    )
                };
                bound.descriptor_sets = Some(descriptor_sets);
            }
        }

        Ok(())
    }

    /// Ends the current frame: observes finished command buffers, applies the eviction and
    /// recycling policies, and destroys the objects the GPU is done with. Returns the completed
    /// fence value.
    pub fn end_frame(&self) -> Result<u64, RenderError> {
        let completed = self.command_buffers.poll()?;
        let frame = self.frame.fetch_add(1, Ordering::Relaxed);

        let evicted = self.pipelines.end_frame(completed);
        let recycled = self.descriptor_sets.gc(completed, frame);
        let destroyed = unsafe { self.deferred.drain(completed) };

        log::trace!(
            "ended frame {}: completed fence {}, {} pipelines evicted, {} descriptor sets \
            recycled, {} objects destroyed",
            frame,
            completed,
            evicted,
            recycled,
            destroyed,
        );

        Ok(completed)
    }

    /// Blocks until the GPU has finished every submitted command buffer, then destroys every
    /// object waiting for it.
    pub fn wait_idle(&self, timeout: Duration) -> Result<u64, RenderError> {
        let completed = self.command_buffers.wait_idle(timeout)?;
        unsafe { self.deferred.drain(completed) };

        Ok(completed)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(err) = self.command_buffers.wait_idle(Duration::MAX) {
            log::warn!("failed to wait for the device on teardown: {}", err);
        }
    }
}

/// A pipeline together with the resources bound to its descriptors.
///
/// A bind point is used by one recording thread at a time.
#[derive(Debug, Default)]
pub struct BindPoint {
    pipeline: Option<Arc<Pipeline>>,
    layout: Option<Arc<PipelineLayout>>,
    writers: SmallVec<[DescriptorSetWriter; 4]>,
}

impl BindPoint {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn pipeline(&self) -> Option<&Arc<Pipeline>> {
        self.pipeline.as_ref()
    }

    /// Returns the writer of set `set`.
    #[inline]
    pub fn writer(&self, set: u32) -> Option<&DescriptorSetWriter> {
        self.writers.get(set as usize)
    }

    fn set_pipeline(&mut self, pipeline: Arc<Pipeline>, layout: Arc<PipelineLayout>) {
        let same_layout = self
            .layout
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &layout));

        if !same_layout {
            let mut previous = std::mem::take(&mut self.writers).into_iter();

            for (set, set_layout) in layout.set_layouts().iter().enumerate() {
                let writer = match previous.next() {
                    Some(writer) if Arc::ptr_eq(writer.layout(), set_layout) => writer,
                    _ => DescriptorSetWriter::new(set_layout.clone()),
                };
                debug_assert_eq!(self.writers.len(), set);
                self.writers.push(writer);
            }

            self.layout = Some(layout);
        }

        self.pipeline = Some(pipeline);
    }

    /// Binds `resource` to element 0 of `binding` in set `set`.
    #[inline]
    pub fn bind_resource(
        &mut self,
        set: u32,
        binding: u32,
        resource: DescriptorResource,
    ) -> Result<(), DescriptorSetError> {
        self.bind_resource_element(set, binding, 0, resource)
    }

    /// Binds `resource` to element `array_element` of `binding` in set `set`.
    pub fn bind_resource_element(
        &mut self,
        set: u32,
        binding: u32,
        array_element: u32,
        resource: DescriptorResource,
    ) -> Result<(), DescriptorSetError> {
        if self.pipeline.is_none() {
            return Err(DescriptorSetError::NoPipelineBound);
        }

        let set_count = self.writers.len() as u32;
        let writer = self
            .writers
            .get_mut(set as usize)
            .ok_or(DescriptorSetError::SetNotInLayout { set, set_count })?;

        writer.bind(binding, array_element, resource)
    }
}

/// Error that can happen when binding state through a `RenderContext`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderError {
    PipelineCacheError(PipelineCacheError),
    DescriptorSetError(DescriptorSetError),
    CommandBufferError(CommandBufferError),
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PipelineCacheError(err) => Some(err),
            Self::DescriptorSetError(err) => Some(err),
            Self::CommandBufferError(err) => Some(err),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipelineCacheError(_) => write!(f, "the pipeline could not be provided"),
            Self::DescriptorSetError(_) => write!(f, "the descriptor sets could not be provided"),
            Self::CommandBufferError(_) => write!(f, "a command buffer operation failed"),
        }
    }
}

impl From<PipelineCacheError> for RenderError {
    #[inline]
    fn from(err: PipelineCacheError) -> Self {
        Self::PipelineCacheError(err)
    }
}

impl From<DescriptorSetError> for RenderError {
    #[inline]
    fn from(err: DescriptorSetError) -> Self {
        Self::DescriptorSetError(err)
    }
}

impl From<CommandBufferError> for RenderError {
    #[inline]
    fn from(err: CommandBufferError) -> Self {
        Self::CommandBufferError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{BindPoint, RenderContext, RenderContextCreateInfo, RenderError};
    use crate::{
        command_buffer::CommandBuffer,
        descriptor_set::{layout::DescriptorType, update::DescriptorSetError},
        pipeline::{
            cache::PipelineStateCacheCreateInfo,
            compute::ComputePipelineDescription,
            lru::{LruCapacity, PipelineLruCreateInfo},
            PipelineEntry,
        },
        resource::Buffer,
        shader::{ShaderBinding, ShaderCode, ShaderStage, ShaderStageInfo},
        tests::MockDevice,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn context(device: &Arc<MockDevice>) -> RenderContext {
        RenderContext::new(device.clone(), Default::default()).unwrap()
    }

    fn entry(context: &RenderContext, word: u32, ty: DescriptorType) -> PipelineEntry {
        let code = ShaderCode::from_words(vec![0x0723_0203, word]);
        context.register_shader(code.clone());

        ComputePipelineDescription::new(ShaderStageInfo::new(
            ShaderStage::Compute,
            &code,
            vec![ShaderBinding::new(0, 0, ty), ShaderBinding::new(0, 1, ty)],
        ))
        .into()
    }

    fn buffer(raw: u64) -> Arc<Buffer> {
        unsafe { Buffer::from_handle(vk::Buffer::from_raw(raw), 4096) }
    }

    fn bind(bind_point: &mut BindPoint, binding: u32, buffer: &Arc<Buffer>, offset: u64) {
        bind_point
            .bind_resource(
                0,
                binding,
                crate::descriptor_set::update::DescriptorResource::Buffer {
                    buffer: buffer.clone(),
                    offset,
                    range: 64,
                },
            )
            .unwrap();
    }

    fn recording(context: &RenderContext) -> CommandBuffer {
        let mut command_buffer = context.command_buffers().acquire().unwrap();
        context.command_buffers().begin(&mut command_buffer).unwrap();

        command_buffer
    }

    fn submit(context: &RenderContext, mut command_buffer: CommandBuffer) {
        context.command_buffers().end(&mut command_buffer).unwrap();
        context.command_buffers().submit(command_buffer).unwrap();
    }

    #[test]
    fn repeated_commits_record_nothing_new() {
        let device = mock_device!();
        let context = context(&device);
        let entry = entry(&context, 1, DescriptorType::StorageBuffer);
        let x = buffer(1);

        let mut command_buffer = recording(&context);
        let mut bind_point = BindPoint::new();
        context.bind_pipeline(&mut bind_point, &entry).unwrap();
        bind(&mut bind_point, 0, &x, 0);
        bind(&mut bind_point, 1, &x, 0);

        for _ in 0..4 {
            context
                .commit_bindings(&mut command_buffer, &mut bind_point)
                .unwrap();
        }

        let counters = device.counters();
        assert_eq!(counters.pipelines_created(), 1);
        assert_eq!(counters.pipeline_binds(), 1);
        assert_eq!(counters.descriptor_set_binds(), 1);
        assert_eq!(counters.descriptor_sets_allocated(), 1);
        assert_eq!(counters.descriptor_updates(), 1);
    }

    #[test]
    fn rebinding_the_same_resources_allocates_nothing() {
        let device = mock_device!();
        let context = context(&device);
        let entry = entry(&context, 1, DescriptorType::StorageBuffer);
        let (x, y) = (buffer(1), buffer(2));

        let mut command_buffer = recording(&context);
        let mut bind_point = BindPoint::new();
        context.bind_pipeline(&mut bind_point, &entry).unwrap();
        bind(&mut bind_point, 0, &x, 0);
        bind(&mut bind_point, 1, &x, 0);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();

        for binding in [0, 1, 0] {
            bind(&mut bind_point, binding, &x, 0);
            context
                .commit_bindings(&mut command_buffer, &mut bind_point)
                .unwrap();
        }
        assert_eq!(device.counters().descriptor_sets_allocated(), 1);
        assert_eq!(device.counters().descriptor_updates(), 1);

        bind(&mut bind_point, 0, &y, 0);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();
        assert_eq!(device.counters().descriptor_sets_allocated(), 2);

        // Going back to the first content finds the first set again.
        bind(&mut bind_point, 0, &x, 0);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();
        assert_eq!(device.counters().descriptor_sets_allocated(), 2);
        assert_eq!(device.counters().descriptor_updates(), 2);
        assert_eq!(context.descriptor_set_cache().stats().hits, 1);
        assert_eq!(device.counters().descriptor_set_binds(), 3);
    }

    #[test]
    fn dynamic_offsets_do_not_change_the_set() {
        let device = mock_device!();
        let context = context(&device);
        let entry = entry(&context, 1, DescriptorType::DynamicUniformBuffer);
        let x = buffer(1);

        let mut command_buffer = recording(&context);
        let mut bind_point = BindPoint::new();
        context.bind_pipeline(&mut bind_point, &entry).unwrap();
        bind(&mut bind_point, 0, &x, 0);
        bind(&mut bind_point, 1, &x, 0);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();

        bind(&mut bind_point, 1, &x, 256);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();

        assert_eq!(bind_point.writer(0).unwrap().dynamic_offsets(), &[0, 256]);
        assert_eq!(device.counters().descriptor_sets_allocated(), 1);
        assert_eq!(device.counters().descriptor_updates(), 1);
        assert_eq!(device.counters().descriptor_set_binds(), 2);
    }

    #[test]
    fn compatible_pipelines_keep_their_bindings() {
        let device = mock_device!();
        let context = context(&device);
        let first = entry(&context, 1, DescriptorType::StorageBuffer);
        let second = entry(&context, 2, DescriptorType::StorageBuffer);
        let x = buffer(1);

        let mut command_buffer = recording(&context);
        let mut bind_point = BindPoint::new();
        context.bind_pipeline(&mut bind_point, &first).unwrap();
        bind(&mut bind_point, 0, &x, 0);
        bind(&mut bind_point, 1, &x, 0);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();

        context.bind_pipeline(&mut bind_point, &second).unwrap();
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();

        assert_eq!(device.counters().pipeline_binds(), 2);
        assert_eq!(device.counters().descriptor_set_binds(), 1);
        assert_eq!(device.counters().descriptor_sets_allocated(), 1);
    }

    #[test]
    fn bind_points_sharing_a_command_buffer_rebind() {
        let device = mock_device!();
        let context = context(&device);
        let first = entry(&context, 1, DescriptorType::StorageBuffer);
        let second = entry(&context, 2, DescriptorType::StorageBuffer);
        let (x, y) = (buffer(1), buffer(2));

        let mut command_buffer = recording(&context);
        let mut a = BindPoint::new();
        context.bind_pipeline(&mut a, &first).unwrap();
        bind(&mut a, 0, &x, 0);
        bind(&mut a, 1, &x, 0);

        let mut b = BindPoint::new();
        context.bind_pipeline(&mut b, &second).unwrap();
        bind(&mut b, 0, &y, 0);
        bind(&mut b, 1, &y, 0);

        for bind_point in [&mut a, &mut b] {
            context
                .commit_bindings(&mut command_buffer, bind_point)
                .unwrap();
        }
        context
            .commit_bindings(&mut command_buffer, &mut a)
            .unwrap();

        assert_eq!(device.counters().pipeline_binds(), 3);
        assert_eq!(device.counters().descriptor_set_binds(), 3);
        assert_eq!(device.counters().descriptor_sets_allocated(), 2);
    }

    #[test]
    fn equal_state_from_another_bind_point_is_not_recorded_again() {
        let device = mock_device!();
        let context = context(&device);
        let entry = entry(&context, 1, DescriptorType::StorageBuffer);
        let x = buffer(1);

        let mut command_buffer = recording(&context);
        let mut bind_points = [BindPoint::new(), BindPoint::new()];

        for bind_point in &mut bind_points {
            context.bind_pipeline(bind_point, &entry).unwrap();
            bind(bind_point, 0, &x, 0);
            bind(bind_point, 1, &x, 0);
            context
                .commit_bindings(&mut command_buffer, bind_point)
                .unwrap();
        }

        assert_eq!(device.counters().pipeline_binds(), 1);
        assert_eq!(device.counters().descriptor_set_binds(), 1);
    }

    #[test]
    fn new_command_buffers_bind_again() {
        let device = mock_device!();
        let context = context(&device);
        let entry = entry(&context, 1, DescriptorType::StorageBuffer);
        let x = buffer(1);
        let mut bind_point = BindPoint::new();
        context.bind_pipeline(&mut bind_point, &entry).unwrap();
        bind(&mut bind_point, 0, &x, 0);
        bind(&mut bind_point, 1, &x, 0);

        for _ in 0..2 {
            let mut command_buffer = recording(&context);
            context
                .commit_bindings(&mut command_buffer, &mut bind_point)
                .unwrap();
            submit(&context, command_buffer);
        }

        assert_eq!(device.counters().pipeline_binds(), 2);
        assert_eq!(device.counters().descriptor_set_binds(), 2);
        assert_eq!(device.counters().descriptor_sets_allocated(), 1);
    }

    #[test]
    fn binding_needs_a_pipeline_and_a_valid_set() {
        let device = mock_device!();
        let context = context(&device);
        let entry = entry(&context, 1, DescriptorType::StorageBuffer);
        let mut bind_point = BindPoint::new();
        let x = buffer(1);
        let resource = || crate::descriptor_set::update::DescriptorResource::Buffer {
            buffer: x.clone(),
            offset: 0,
            range: 64,
        };

        assert_eq!(
            bind_point.bind_resource(0, 0, resource()),
            Err(DescriptorSetError::NoPipelineBound),
        );

        let mut command_buffer = recording(&context);
        assert_eq!(
            context.commit_bindings(&mut command_buffer, &mut bind_point),
            Err(RenderError::DescriptorSetError(
                DescriptorSetError::NoPipelineBound
            )),
        );

        context.bind_pipeline(&mut bind_point, &entry).unwrap();
        assert_eq!(
            bind_point.bind_resource(3, 0, resource()),
            Err(DescriptorSetError::SetNotInLayout {
                set: 3,
                set_count: 1,
            }),
        );
    }

    #[test]
    fn unfinished_work_keeps_objects_alive() {
        let device = mock_device!();
        let context = RenderContext::new(
            device.clone(),
            RenderContextCreateInfo {
                pipeline_cache: PipelineStateCacheCreateInfo {
                    lru: Some(PipelineLruCreateInfo {
                        capacity: LruCapacity::Entries(0),
                        min_frames_unused: 0,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();
        let entry = entry(&context, 1, DescriptorType::StorageBuffer);
        let x = buffer(1);

        let mut command_buffer = recording(&context);
        let mut bind_point = BindPoint::new();
        context.bind_pipeline(&mut bind_point, &entry).unwrap();
        bind(&mut bind_point, 0, &x, 0);
        bind(&mut bind_point, 1, &x, 0);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();
        submit(&context, command_buffer);

        for _ in 0..8 {
            assert_eq!(context.end_frame().unwrap(), 0);
        }
        assert_eq!(device.counters().pipelines_destroyed(), 0);

        device.signal_all();
        assert_eq!(context.end_frame().unwrap(), 1);
        assert_eq!(device.counters().pipelines_destroyed(), 1);
        assert_eq!(context.frame(), 9);

        // The evicted pipeline comes back on the next commit.
        let mut command_buffer = recording(&context);
        context
            .commit_bindings(&mut command_buffer, &mut bind_point)
            .unwrap();
        assert_eq!(device.counters().pipelines_created(), 2);
    }

    #[test]
    fn teardown_releases_everything() {
        let device = mock_device!();

        {
            let context = context(&device);
            let entry = entry(&context, 1, DescriptorType::StorageBuffer);
            let x = buffer(1);

            let mut command_buffer = recording(&context);
            let mut bind_point = BindPoint::new();
            context.bind_pipeline(&mut bind_point, &entry).unwrap();
            bind(&mut bind_point, 0, &x, 0);
            bind(&mut bind_point, 1, &x, 0);
            context
                .commit_bindings(&mut command_buffer, &mut bind_point)
                .unwrap();
            submit(&context, command_buffer);
        }

        let counters = device.counters();
        assert_eq!(counters.pipelines_created(), counters.pipelines_destroyed());
        assert_eq!(
            counters.pipeline_layouts_created(),
            counters.pipeline_layouts_destroyed(),
        );
        assert_eq!(counters.set_layouts_created(), counters.set_layouts_destroyed());
        assert_eq!(
            counters.descriptor_pools_created(),
            counters.descriptor_pools_destroyed(),
        );
        assert_eq!(
            counters.pipeline_caches_created(),
            counters.pipeline_caches_destroyed(),
        );
        assert_eq!(counters.fences_created(), counters.fences_destroyed());
    }
}
