//! Interning of descriptor set layouts.
//!
//! Structurally equal layout descriptions always map to the same native layout object. The
//! registry is the only owner of the native objects: they live until the registry is cleared or
//! dropped, no matter how many pipelines still refer to them.

use super::layout::SetLayoutDescription;
use crate::{device::Device, macros::impl_id_counter, VulkanError};
use ash::vk;
use foldhash::HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, num::NonZero, sync::Arc};

/// An interned descriptor set layout.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    description: SetLayoutDescription,
    id: NonZero<u64>,
}

impl DescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn description(&self) -> &SetLayoutDescription {
        &self.description
    }
}

impl_id_counter!(DescriptorSetLayout);

/// Maps layout descriptions to native descriptor set layouts.
#[derive(Debug)]
pub struct LayoutRegistry {
    device: Arc<dyn Device>,
    layouts: RwLock<HashMap<SetLayoutDescription, Arc<DescriptorSetLayout>>>,
}

impl LayoutRegistry {
    pub fn new(device: Arc<dyn Device>) -> Self {
        LayoutRegistry {
            device,
            layouts: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the layout for `description`, creating the native object if no equal
    /// description was interned before.
    ///
    /// If two threads race to intern the same new description, both create a native object but
    /// only one is kept. The other is destroyed before returning.
    pub fn intern(
        &self,
        description: &SetLayoutDescription,
    ) -> Result<Arc<DescriptorSetLayout>, VulkanError> {
        if let Some(layout) = self.layouts.read().get(description) {
            return Ok(layout.clone());
        }

        let handle = self.device.create_descriptor_set_layout(description)?;

        match self.layouts.write().entry(description.clone()) {
            Entry::Occupied(entry) => {
                // Someone else interned an equal description in the meantime. Nothing can have
                // seen our handle yet.
                unsafe { self.device.destroy_descriptor_set_layout(handle) };

                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                log::debug!(
                    "created descriptor set layout {:?} with {} bindings",
                    handle,
                    description.bindings().len(),
                );

                let layout = Arc::new(DescriptorSetLayout {
                    handle,
                    description: description.clone(),
                    id: DescriptorSetLayout::next_id(),
                });

                Ok(entry.insert(layout).clone())
            }
        }
    }

    /// Returns the number of interned layouts.
    pub fn len(&self) -> usize {
        self.layouts.read().len()
    }

    /// Destroys every native layout.
    ///
    /// # Safety
    ///
    /// - No pipeline layout, descriptor set or command buffer created with any of the layouts
    ///   may still be in use.
    pub unsafe fn clear(&self) {
        let layouts: Vec<_> = self.layouts.write().drain().map(|(_, l)| l).collect();

        for layout in layouts {
            unsafe { self.device.destroy_descriptor_set_layout(layout.handle) };
        }
    }
}

impl Drop for LayoutRegistry {
    fn drop(&mut self) {
        for (_, layout) in self.layouts.get_mut().drain() {
            unsafe { self.device.destroy_descriptor_set_layout(layout.handle) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LayoutRegistry;
    use crate::{
        descriptor_set::layout::{DescriptorType, SetLayoutBinding, SetLayoutDescription},
        device::Device,
        shader::ShaderStages,
    };
    use rand::{seq::SliceRandom, Rng};
    use std::sync::{Arc, Barrier};

    fn description(ty: DescriptorType) -> SetLayoutDescription {
        SetLayoutDescription::new(vec![SetLayoutBinding {
            binding: 0,
            descriptor_type: ty,
            descriptor_count: 1,
            stages: ShaderStages::FRAGMENT,
            immutable_sampler: None,
        }])
    }

    #[test]
    fn equal_descriptions_share_one_layout() {
        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());

        let a = registry.intern(&description(DescriptorType::UniformBuffer)).unwrap();
        let b = registry.intern(&description(DescriptorType::UniformBuffer)).unwrap();
        let c = registry.intern(&description(DescriptorType::StorageBuffer)).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_ne!(a.handle(), c.handle());
        assert_eq!(registry.len(), 2);
        assert_eq!(device.counters().set_layouts_created(), 2);
    }

    #[test]
    fn racing_interns_keep_one_layout() {
        let device = mock_device!();
        let registry = Arc::new(LayoutRegistry::new(device.clone() as Arc<dyn Device>));
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();

                std::thread::spawn(move || {
                    barrier.wait();
                    registry
                        .intern(&description(DescriptorType::SampledImage))
                        .unwrap()
                        .handle()
                })
            })
            .collect();

        let handles: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert!(handles.iter().all(|&h| h == handles[0]));
        assert_eq!(registry.len(), 1);

        let counters = device.counters();
        assert_eq!(
            counters.set_layouts_created() - counters.set_layouts_destroyed(),
            1,
        );
    }

    #[test]
    fn clear_destroys_everything() {
        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());

        registry.intern(&description(DescriptorType::UniformBuffer)).unwrap();
        registry.intern(&SetLayoutDescription::empty()).unwrap();
        unsafe { registry.clear() };

        assert_eq!(registry.len(), 0);
        assert_eq!(device.counters().set_layouts_destroyed(), 2);
    }

    #[test]
    fn interning_matches_structural_equality() {
        const TYPES: [DescriptorType; 4] = [
            DescriptorType::UniformBuffer,
            DescriptorType::StorageBuffer,
            DescriptorType::SampledImage,
            DescriptorType::StorageImage,
        ];

        let device = mock_device!();
        let registry = LayoutRegistry::new(device.clone());
        let mut rng = rand::thread_rng();
        let mut interned = Vec::new();

        for _ in 0..200 {
            let mut numbers = vec![0, 1, 2, 3];
            numbers.shuffle(&mut rng);
            let len = rng.gen_range(0..=2);

            let bindings = numbers[..len]
                .iter()
                .map(|&binding| SetLayoutBinding {
                    binding,
                    descriptor_type: *TYPES.choose(&mut rng).unwrap(),
                    descriptor_count: rng.gen_range(1..=2),
                    stages: if rng.gen_bool(0.5) {
                        ShaderStages::VERTEX
                    } else {
                        ShaderStages::FRAGMENT
                    },
                    immutable_sampler: None,
                })
                .collect();
            let description = SetLayoutDescription::new(bindings);
            let layout = registry.intern(&description).unwrap();

            interned.push((description, layout));
        }

        for (a, layout_a) in &interned {
            for (b, layout_b) in &interned {
                assert_eq!(a == b, Arc::ptr_eq(layout_a, layout_b));
            }
        }

        assert_eq!(device.counters().set_layouts_created(), registry.len() as u64);
    }
}
