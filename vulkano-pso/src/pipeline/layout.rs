//! Pipeline layouts.
//!
//! A pipeline layout is derived from the shader stages of a pipeline: the stage bindings are
//! merged by [`build_layout`], every set layout is interned in the [`LayoutRegistry`], and a
//! native pipeline layout is created over the interned set layouts. Pipelines whose stages
//! declare the same bindings share one `PipelineLayout`.

use crate::{
    descriptor_set::{
        layout::{build_layout, LayoutError, PipelineDescriptorSetLayouts, RemappingInfo},
        registry::{DescriptorSetLayout, LayoutRegistry},
    },
    device::Device,
    macros::impl_id_counter,
    shader::{ShaderBinding, ShaderStage, ShaderStageInfo},
    sync::{
        deferred::{DeferredDeletionQueue, DeferredObject},
        fence::FenceTracker,
    },
    VulkanError,
};
use ash::vk;
use smallvec::SmallVec;
use std::{error::Error, fmt, num::NonZero, sync::Arc};

/// The part of a pipeline's stages that determines its layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineLayoutKey(SmallVec<[(ShaderStage, Vec<ShaderBinding>); 2]>);

impl PipelineLayoutKey {
    pub(crate) fn new(stages: &[ShaderStageInfo]) -> Self {
        let mut key: SmallVec<[_; 2]> = stages
            .iter()
            .map(|stage| (stage.stage, stage.bindings.clone()))
            .collect();
        key.sort_by_key(|(stage, _)| *stage as u32);

        PipelineLayoutKey(key)
    }
}

/// A native pipeline layout together with the set layouts it was created from.
#[derive(Debug)]
pub struct PipelineLayout {
    handle: vk::PipelineLayout,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    descriptions: PipelineDescriptorSetLayouts,
    remapping: RemappingInfo,
    id: NonZero<u64>,
    deferred: Arc<DeferredDeletionQueue>,
    fences: Arc<FenceTracker>,
}

impl PipelineLayout {
    /// Builds the layout for `stages`.
    pub(crate) fn new(
        device: &dyn Device,
        registry: &LayoutRegistry,
        stages: &[ShaderStageInfo],
        deferred: Arc<DeferredDeletionQueue>,
        fences: Arc<FenceTracker>,
    ) -> Result<Self, PipelineLayoutError> {
        let (descriptions, remapping) = build_layout(stages)?;

        let set_layouts = descriptions
            .set_layouts
            .iter()
            .map(|description| registry.intern(description))
            .collect::<Result<Vec<_>, _>>()?;
        let handles: SmallVec<[_; 4]> = set_layouts.iter().map(|l| l.handle()).collect();
        let handle = unsafe { device.create_pipeline_layout(&handles) }?;

        Ok(PipelineLayout {
            handle,
            set_layouts,
            descriptions,
            remapping,
            id: Self::next_id(),
            deferred,
            fences,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Returns the interned set layouts, indexed by set number.
    #[inline]
    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }

    #[inline]
    pub fn descriptions(&self) -> &PipelineDescriptorSetLayouts {
        &self.descriptions
    }

    #[inline]
    pub fn remapping(&self) -> &RemappingInfo {
        &self.remapping
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.deferred.push(
            DeferredObject::PipelineLayout(self.handle),
            self.fences.last_reserved(),
        );
    }
}

impl_id_counter!(PipelineLayout);

/// Error that can happen when creating a pipeline layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineLayoutError {
    /// The stage bindings could not be merged.
    Layout(LayoutError),

    /// The device failed to create a native object.
    VulkanError(VulkanError),
}

impl Error for PipelineLayoutError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Layout(err) => Some(err),
            Self::VulkanError(err) => Some(err),
        }
    }
}

impl fmt::Display for PipelineLayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(_) => write!(f, "the shader bindings could not be merged into a layout"),
            Self::VulkanError(_) => write!(f, "a runtime error occurred"),
        }
    }
}

impl From<LayoutError> for PipelineLayoutError {
    #[inline]
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}

impl From<VulkanError> for PipelineLayoutError {
    #[inline]
    fn from(err: VulkanError) -> Self {
        Self::VulkanError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::{PipelineLayout, PipelineLayoutKey};
    use crate::{
        descriptor_set::{layout::DescriptorType, registry::LayoutRegistry},
        shader::{ShaderBinding, ShaderCode, ShaderStage, ShaderStageInfo},
        sync::{deferred::DeferredDeletionQueue, fence::FenceTracker},
    };
    use std::sync::Arc;

    #[test]
    fn key_ignores_stage_order_and_bytecode() {
        let vs = ShaderCode::from_words(vec![1]);
        let fs = ShaderCode::from_words(vec![2]);
        let other_fs = ShaderCode::from_words(vec![3]);
        let bindings = vec![ShaderBinding::new(0, 0, DescriptorType::UniformBuffer)];

        let a = PipelineLayoutKey::new(&[
            ShaderStageInfo::new(ShaderStage::Vertex, &vs, bindings.clone()),
            ShaderStageInfo::new(ShaderStage::Fragment, &fs, vec![]),
        ]);
        let b = PipelineLayoutKey::new(&[
            ShaderStageInfo::new(ShaderStage::Fragment, &other_fs, vec![]),
            ShaderStageInfo::new(ShaderStage::Vertex, &vs, bindings),
        ]);

        assert_eq!(a, b);
    }

    #[test]
    fn layout_shares_interned_set_layouts() {
        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());
        let deferred = Arc::new(DeferredDeletionQueue::new(device.clone()));
        let fences = Arc::new(FenceTracker::new());
        let code = ShaderCode::from_words(vec![1]);

        let stages = [ShaderStageInfo::new(
            ShaderStage::Compute,
            &code,
            vec![
                ShaderBinding::new(0, 0, DescriptorType::StorageBuffer),
                ShaderBinding::new(1, 0, DescriptorType::StorageBuffer),
            ],
        )];

        let a = PipelineLayout::new(
            &*device,
            &registry,
            &stages,
            deferred.clone(),
            fences.clone(),
        )
        .unwrap();
        let b = PipelineLayout::new(&*device, &registry, &stages, deferred.clone(), fences)
            .unwrap();

        assert_ne!(a.handle(), b.handle());
        assert_eq!(a.set_layouts().len(), 2);
        assert!(Arc::ptr_eq(&a.set_layouts()[0], &b.set_layouts()[0]));
        assert_eq!(registry.len(), 1);

        drop(a);
        drop(b);
        assert_eq!(deferred.len(), 2);
    }
}
