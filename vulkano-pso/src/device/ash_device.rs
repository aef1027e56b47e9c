// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! A [`Device`] on top of an `ash` logical device.
//!
//! Graphics pipelines are created for dynamic rendering, so the device must have the
//! `dynamicRendering` feature enabled (core in Vulkan 1.3). The states in
//! [`DYNAMIC_STATES`] must be set while recording.

use super::{
    ComputePipelineCreateInfo, DescriptorWrite, DescriptorWriteInfo, Device, DeviceProperties,
    GraphicsPipelineCreateInfo,
};
use crate::{
    descriptor_set::layout::{DescriptorType, SetLayoutDescription},
    pipeline::{
        graphics::{PrimitiveTopology, BLEND_CONSTANTS, DYNAMIC_STATES},
        PipelineBindPoint,
    },
    shader::ShaderCode,
    VulkanError,
};
use ash::vk;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{fmt, slice, time::Duration};

/// Implements [`Device`] with an `ash::Device` and one queue.
///
/// Command buffers are allocated from a single command pool owned by the `AshDevice`. Recording
/// into them must therefore happen on one thread at a time.
pub struct AshDevice {
    device: ash::Device,
    properties: DeviceProperties,
    command_pool: Mutex<vk::CommandPool>,
    queue: Mutex<vk::Queue>,
}

impl AshDevice {
    /// Creates a new `AshDevice`.
    ///
    /// # Safety
    ///
    /// - `queue` must be a queue of `device` from the family `queue_family_index`.
    /// - `physical_properties` must be the properties of the physical device of `device`.
    /// - `device` must outlive the `AshDevice` and every object created through it.
    pub unsafe fn new(
        device: ash::Device,
        physical_properties: &vk::PhysicalDeviceProperties,
        queue_family_index: u32,
        queue: vk::Queue,
    ) -> Result<Self, VulkanError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&create_info, None) }?;

        log::debug!(
            "created device for {} (vendor {:#06x}, device {:#06x})",
            physical_properties
                .device_name_as_c_str()
                .unwrap_or_default()
                .to_string_lossy(),
            physical_properties.vendor_id,
            physical_properties.device_id,
        );

        Ok(AshDevice {
            device,
            properties: physical_properties.into(),
            command_pool: Mutex::new(command_pool),
            queue: Mutex::new(queue),
        })
    }

    /// Returns the underlying `ash` device.
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None)
        };
    }
}

impl fmt::Debug for AshDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AshDevice")
            .field("handle", &self.device.handle())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl Device for AshDevice {
    #[inline]
    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn create_descriptor_set_layout(
        &self,
        description: &SetLayoutDescription,
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        // Vulkan wants one sampler per descriptor.
        let immutable_samplers: SmallVec<[Vec<vk::Sampler>; 8]> = description
            .bindings()
            .iter()
            .map(|binding| match &binding.immutable_sampler {
                Some(sampler) => vec![sampler.handle(); binding.descriptor_count as usize],
                None => Vec::new(),
            })
            .collect();

        let bindings: SmallVec<[_; 8]> = description
            .bindings()
            .iter()
            .zip(&immutable_samplers)
            .map(|(binding, samplers)| {
                let mut info = vk::DescriptorSetLayoutBinding::default();

                if !samplers.is_empty() {
                    info = info.immutable_samplers(samplers);
                }

                info.binding(binding.binding)
                    .descriptor_type(binding.descriptor_type.into())
                    .descriptor_count(binding.descriptor_count)
                    .stage_flags(binding.stages.into())
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        Ok(unsafe { self.device.create_descriptor_set_layout(&create_info, None) }?)
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    unsafe fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, VulkanError> {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);

        Ok(unsafe { self.device.create_pipeline_layout(&create_info, None) }?)
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_shader_module(&self, code: &ShaderCode) -> Result<vk::ShaderModule, VulkanError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code.words());

        Ok(unsafe { self.device.create_shader_module(&create_info, None) }?)
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_pipeline_cache(&self, initial_data: &[u8]) -> Result<vk::PipelineCache, VulkanError> {
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);

        Ok(unsafe { self.device.create_pipeline_cache(&create_info, None) }?)
    }

    unsafe fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> Result<Vec<u8>, VulkanError> {
        Ok(unsafe { self.device.get_pipeline_cache_data(cache) }?)
    }

    unsafe fn merge_pipeline_caches(
        &self,
        dst: vk::PipelineCache,
        src: &[vk::PipelineCache],
    ) -> Result<(), VulkanError> {
        Ok(unsafe { self.device.merge_pipeline_caches(dst, src) }?)
    }

    unsafe fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        unsafe { self.device.destroy_pipeline_cache(cache, None) };
    }

    unsafe fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        create_info: &GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline, VulkanError> {
        let description = create_info.description;

        let stages: SmallVec<[_; 5]> = create_info
            .stages
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.into())
                    .module(module)
                    .name(c"main")
            })
            .collect();

        let vertex_bindings: SmallVec<[_; 4]> = description
            .vertex_input
            .bindings
            .iter()
            .map(|binding| {
                vk::VertexInputBindingDescription::default()
                    .binding(binding.binding)
                    .stride(binding.stride)
                    .input_rate(binding.input_rate.into())
            })
            .collect();
        let vertex_attributes: SmallVec<[_; 8]> = description
            .vertex_input
            .attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .location(attribute.location)
                    .binding(attribute.binding)
                    .format(attribute.format.into())
                    .offset(attribute.offset)
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(description.input_assembly.topology.into())
            .primitive_restart_enable(description.input_assembly.primitive_restart_enable);
        let tessellation = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(description.input_assembly.patch_control_points);

        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = &description.rasterization;
        let depth_bias = rasterization_state.depth_bias.unwrap_or_default();
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(rasterization_state.depth_clamp_enable)
            .polygon_mode(rasterization_state.polygon_mode.into())
            .cull_mode(rasterization_state.cull_mode.into())
            .front_face(rasterization_state.front_face.into())
            .depth_bias_enable(rasterization_state.depth_bias.is_some())
            .depth_bias_constant_factor(depth_bias.constant_factor)
            .depth_bias_clamp(depth_bias.clamp)
            .depth_bias_slope_factor(depth_bias.slope_factor)
            .line_width(rasterization_state.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(description.multisample.rasterization_samples.into())
            .alpha_to_coverage_enable(description.multisample.alpha_to_coverage_enable);

        let depth_stencil_state = &description.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_stencil_state.depth_test_enable)
            .depth_write_enable(depth_stencil_state.depth_write_enable)
            .depth_compare_op(depth_stencil_state.depth_compare_op.into())
            .depth_bounds_test_enable(depth_stencil_state.depth_bounds_test_enable)
            .stencil_test_enable(depth_stencil_state.stencil_test_enable)
            .front(depth_stencil_state.front.into())
            .back(depth_stencil_state.back.into());

        let attachments: SmallVec<[vk::PipelineColorBlendAttachmentState; 8]> = description
            .color_blend
            .iter()
            .map(|&attachment| attachment.into())
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&attachments)
            .blend_constants(BLEND_CONSTANTS);

        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let render_targets = &description.render_targets;
        let color_formats: SmallVec<[vk::Format; 8]> = render_targets
            .color_formats
            .iter()
            .map(|&format| format.into())
            .collect();
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .view_mask(render_targets.view_mask)
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(
                render_targets
                    .depth_format
                    .map_or(vk::Format::UNDEFINED, Into::into),
            )
            .stencil_attachment_format(
                render_targets
                    .stencil_format
                    .map_or(vk::Format::UNDEFINED, Into::into),
            );

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(create_info.layout)
            .push_next(&mut rendering);

        if description.input_assembly.topology == PrimitiveTopology::PatchList {
            pipeline_info = pipeline_info.tessellation_state(&tessellation);
        }

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(cache, slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, err)| VulkanError::from(err))?;

        pipelines
            .first()
            .copied()
            .ok_or(VulkanError::InitializationFailed)
    }

    unsafe fn create_compute_pipeline(
        &self,
        cache: vk::PipelineCache,
        create_info: &ComputePipelineCreateInfo,
    ) -> Result<vk::Pipeline, VulkanError> {
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(create_info.module)
            .name(c"main");
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(create_info.layout);

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(cache, slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, err)| VulkanError::from(err))?;

        pipelines
            .first()
            .copied()
            .ok_or(VulkanError::InitializationFailed)
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[(DescriptorType, u32)],
    ) -> Result<vk::DescriptorPool, VulkanError> {
        let mut sizes: SmallVec<[_; 9]> = pool_sizes
            .iter()
            .filter(|&&(_, count)| count != 0)
            .map(|&(ty, count)| {
                vk::DescriptorPoolSize::default()
                    .ty(ty.into())
                    .descriptor_count(count)
            })
            .collect();

        // At least one pool size is required, even for sets without bindings.
        if sizes.is_empty() {
            sizes.push(
                vk::DescriptorPoolSize::default()
                    .ty(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1),
            );
        }

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        Ok(unsafe { self.device.create_descriptor_pool(&create_info, None) }?)
    }

    unsafe fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> Result<(), VulkanError> {
        Ok(unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }?)
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(slice::from_ref(&layout));
        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }?;

        sets.first().copied().ok_or(VulkanError::OutOfPoolMemory)
    }

    unsafe fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let mut buffer_infos: SmallVec<[vk::DescriptorBufferInfo; 8]> = SmallVec::new();
        let mut image_infos: SmallVec<[vk::DescriptorImageInfo; 8]> = SmallVec::new();
        let mut texel_buffer_views: SmallVec<[vk::BufferView; 4]> = SmallVec::new();

        for write in writes {
            match write.info {
                DescriptorWriteInfo::Buffer {
                    buffer,
                    offset,
                    range,
                } => buffer_infos.push(
                    vk::DescriptorBufferInfo::default()
                        .buffer(buffer)
                        .offset(offset)
                        .range(range),
                ),
                DescriptorWriteInfo::Image {
                    view,
                    layout,
                    sampler,
                } => image_infos.push(
                    vk::DescriptorImageInfo::default()
                        .image_view(view)
                        .image_layout(layout)
                        .sampler(sampler),
                ),
                DescriptorWriteInfo::TexelBuffer(view) => texel_buffer_views.push(view),
            }
        }

        let (mut buffer_index, mut image_index, mut texel_index) = (0, 0, 0);
        let native_writes: SmallVec<[_; 8]> = writes
            .iter()
            .map(|write| {
                let native = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.descriptor_type.into());

                match write.info {
                    DescriptorWriteInfo::Buffer { .. } => {
                        buffer_index += 1;
                        native.buffer_info(slice::from_ref(&buffer_infos[buffer_index - 1]))
                    }
                    DescriptorWriteInfo::Image { .. } => {
                        image_index += 1;
                        native.image_info(slice::from_ref(&image_infos[image_index - 1]))
                    }
                    DescriptorWriteInfo::TexelBuffer(_) => {
                        texel_index += 1;
                        native.texel_buffer_view(slice::from_ref(
                            &texel_buffer_views[texel_index - 1],
                        ))
                    }
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&native_writes, &[]) };
    }

    fn create_fence(&self) -> Result<vk::Fence, VulkanError> {
        Ok(unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }?)
    }

    unsafe fn fence_status(&self, fence: vk::Fence) -> Result<bool, VulkanError> {
        Ok(unsafe { self.device.get_fence_status(fence) }?)
    }

    unsafe fn wait_for_fences(
        &self,
        fences: &[vk::Fence],
        timeout: Duration,
    ) -> Result<(), VulkanError> {
        if fences.is_empty() {
            return Ok(());
        }

        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

        Ok(unsafe { self.device.wait_for_fences(fences, true, timeout_ns) }?)
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<(), VulkanError> {
        Ok(unsafe { self.device.reset_fences(slice::from_ref(&fence)) }?)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer, VulkanError> {
        let command_pool = self.command_pool.lock();
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }?;

        command_buffers
            .first()
            .copied()
            .ok_or(VulkanError::OutOfHostMemory)
    }

    unsafe fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let command_pool = self.command_pool.lock();

        unsafe {
            self.device
                .free_command_buffers(*command_pool, slice::from_ref(&command_buffer))
        };
    }

    unsafe fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        Ok(unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }?)
    }

    unsafe fn end_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        Ok(unsafe { self.device.end_command_buffer(command_buffer) }?)
    }

    unsafe fn queue_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> Result<(), VulkanError> {
        let submit_info =
            vk::SubmitInfo::default().command_buffers(slice::from_ref(&command_buffer));
        let queue = self.queue.lock();

        Ok(unsafe {
            self.device
                .queue_submit(*queue, slice::from_ref(&submit_info), fence)
        }?)
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, bind_point.into(), pipeline)
        };
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                bind_point.into(),
                layout,
                first_set,
                sets,
                dynamic_offsets,
            )
        };
    }
}
