//! Recording what is bound to the descriptors of a set.
//!
//! A [`DescriptorSetWriter`] holds one slot per descriptor of its layout (one per array element
//! of every binding). Writing a resource that is already in a slot is a no-op; any other write
//! marks the writer dirty. The content of a writer is identified by the ids of the bound
//! resources, never by their raw handles.
//!
//! Dynamic uniform buffers are special: the descriptor itself always points at offset 0, and the
//! offset is kept apart as a dynamic offset that is supplied when the set is bound. Changing only
//! the offset of a dynamic uniform buffer therefore doesn't require a different set.

use super::{layout::DescriptorType, registry::DescriptorSetLayout};
use crate::{
    device::{DescriptorWrite, DescriptorWriteInfo},
    macros::vulkan_enum,
    resource::{Buffer, BufferView, ImageView, Sampler},
    DeviceSize, VulkanError,
};
use ash::vk;
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
};

vulkan_enum! {
    /// The layout an image is in while a descriptor accesses it.
    ImageLayout = ImageLayout(i32);

    General = GENERAL,
    ShaderReadOnlyOptimal = SHADER_READ_ONLY_OPTIMAL,
    DepthStencilReadOnlyOptimal = DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    DepthReadOnlyOptimal = DEPTH_READ_ONLY_OPTIMAL,
    ReadOnlyOptimal = READ_ONLY_OPTIMAL,
}

/// A resource to bind to a descriptor.
#[derive(Clone, Debug)]
pub enum DescriptorResource {
    /// A range of a buffer, for uniform and storage buffer descriptors.
    Buffer {
        buffer: Arc<Buffer>,
        offset: DeviceSize,
        range: DeviceSize,
    },

    /// An image view, for image descriptors and for the image half of a combined image sampler.
    Image {
        view: Arc<ImageView>,
        layout: ImageLayout,
    },

    /// The sampler half of a combined image sampler.
    Sampler(Arc<Sampler>),

    /// A buffer view, for texel buffer descriptors.
    TexelBuffer(Arc<BufferView>),
}

/// What one descriptor currently holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum BoundDescriptor {
    Empty,
    Buffer {
        buffer: Arc<Buffer>,
        offset: DeviceSize,
        range: DeviceSize,
    },
    Image {
        view: Option<Arc<ImageView>>,
        layout: ImageLayout,
        sampler: Option<Arc<Sampler>>,
    },
    TexelBuffer(Arc<BufferView>),
}

/// The content of a writer, as used to look up a native set with that content.
///
/// The hash is computed once. Equality compares the full content, so two different contents
/// with colliding hashes are never confused.
#[derive(Clone, Debug)]
pub(crate) struct DescriptorSetKey {
    layout: Arc<DescriptorSetLayout>,
    hash: u64,
    descriptors: Arc<[BoundDescriptor]>,
}

impl DescriptorSetKey {
    fn new(layout: Arc<DescriptorSetLayout>, descriptors: Arc<[BoundDescriptor]>) -> Self {
        let hash =
            foldhash::fast::FixedState::with_seed(0).hash_one((layout.id(), &*descriptors));

        DescriptorSetKey {
            layout,
            hash,
            descriptors,
        }
    }

    #[inline]
    pub(crate) fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    #[cfg(test)]
    pub(crate) fn with_hash(&self, hash: u64) -> Self {
        DescriptorSetKey {
            hash,
            ..self.clone()
        }
    }
}

impl PartialEq for DescriptorSetKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.layout == other.layout
            && self.descriptors == other.descriptors
    }
}

impl Eq for DescriptorSetKey {}

impl Hash for DescriptorSetKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[derive(Clone, Copy, Debug)]
struct BindingSlots {
    first_slot: usize,
    first_dynamic_offset: usize,
}

/// Records what is bound to every descriptor of one set.
#[derive(Debug)]
pub struct DescriptorSetWriter {
    layout: Arc<DescriptorSetLayout>,
    bindings: SmallVec<[BindingSlots; 8]>,
    slots: Vec<BoundDescriptor>,
    dynamic_offsets: SmallVec<[u32; 4]>,
    dirty: bool,
    key: Option<DescriptorSetKey>,
    pub(crate) last_set: Option<(vk::DescriptorSet, u64)>,
}

impl DescriptorSetWriter {
    /// Creates a writer for `layout` with every descriptor unbound.
    pub fn new(layout: Arc<DescriptorSetLayout>) -> Self {
        let mut bindings = SmallVec::new();
        let mut slot_count = 0;
        let mut dynamic_offset_count = 0;

        for binding in layout.description().bindings() {
            bindings.push(BindingSlots {
                first_slot: slot_count,
                first_dynamic_offset: dynamic_offset_count,
            });
            slot_count += binding.descriptor_count as usize;

            if binding.descriptor_type == DescriptorType::DynamicUniformBuffer {
                dynamic_offset_count += binding.descriptor_count as usize;
            }
        }

        DescriptorSetWriter {
            layout,
            bindings,
            slots: vec![BoundDescriptor::Empty; slot_count],
            dynamic_offsets: SmallVec::from_elem(0, dynamic_offset_count),
            dirty: true,
            key: None,
            last_set: None,
        }
    }

    #[inline]
    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Returns whether the content changed since the writer was last resolved to a native set.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the dynamic offsets of the dynamic uniform buffers, in binding order.
    #[inline]
    pub fn dynamic_offsets(&self) -> &[u32] {
        &self.dynamic_offsets
    }

    /// Binds `resource` to element `array_element` of `binding`.
    pub fn bind(
        &mut self,
        binding: u32,
        array_element: u32,
        resource: DescriptorResource,
    ) -> Result<(), DescriptorSetError> {
        match resource {
            DescriptorResource::Buffer {
                buffer,
                offset,
                range,
            } => self.set_buffer(binding, array_element, buffer, offset, range),
            DescriptorResource::Image { view, layout } => {
                self.set_image(binding, array_element, view, layout)
            }
            DescriptorResource::Sampler(sampler) => {
                self.set_sampler(binding, array_element, sampler)
            }
            DescriptorResource::TexelBuffer(view) => {
                self.set_texel_buffer(binding, array_element, view)
            }
        }
    }

    pub fn set_buffer(
        &mut self,
        binding: u32,
        array_element: u32,
        buffer: Arc<Buffer>,
        offset: DeviceSize,
        range: DeviceSize,
    ) -> Result<(), DescriptorSetError> {
        let (descriptor_type, slot, slots) = self.locate(binding, array_element)?;

        if !descriptor_type.is_buffer() {
            return Err(type_mismatch(binding, descriptor_type, "a buffer"));
        }

        let offset = if descriptor_type == DescriptorType::DynamicUniformBuffer {
            let dynamic_offset = u32::try_from(offset)
                .map_err(|_| DescriptorSetError::DynamicOffsetOutOfRange { binding, offset })?;
            self.dynamic_offsets[slots.first_dynamic_offset + array_element as usize] =
                dynamic_offset;

            0
        } else {
            offset
        };

        self.write_slot(
            slot,
            BoundDescriptor::Buffer {
                buffer,
                offset,
                range,
            },
        );

        Ok(())
    }

    pub fn set_image(
        &mut self,
        binding: u32,
        array_element: u32,
        view: Arc<ImageView>,
        layout: ImageLayout,
    ) -> Result<(), DescriptorSetError> {
        let (descriptor_type, slot, _) = self.locate(binding, array_element)?;

        if !descriptor_type.is_image() {
            return Err(type_mismatch(binding, descriptor_type, "an image view"));
        }

        // The sampler half of a combined image sampler is kept.
        let sampler = match &self.slots[slot] {
            BoundDescriptor::Image { sampler, .. }
                if descriptor_type == DescriptorType::CombinedImageSampler =>
            {
                sampler.clone()
            }
            _ => None,
        };

        self.write_slot(
            slot,
            BoundDescriptor::Image {
                view: Some(view),
                layout,
                sampler,
            },
        );

        Ok(())
    }

    pub fn set_sampler(
        &mut self,
        binding: u32,
        array_element: u32,
        sampler: Arc<Sampler>,
    ) -> Result<(), DescriptorSetError> {
        let (descriptor_type, slot, _) = self.locate(binding, array_element)?;

        if descriptor_type != DescriptorType::CombinedImageSampler {
            return Err(type_mismatch(binding, descriptor_type, "a sampler"));
        }

        if self.has_immutable_sampler(binding) {
            return Err(DescriptorSetError::ImmutableSampler { binding });
        }

        let (view, layout) = match &self.slots[slot] {
            BoundDescriptor::Image { view, layout, .. } => (view.clone(), *layout),
            _ => (None, ImageLayout::ShaderReadOnlyOptimal),
        };

        self.write_slot(
            slot,
            BoundDescriptor::Image {
                view,
                layout,
                sampler: Some(sampler),
            },
        );

        Ok(())
    }

    pub fn set_texel_buffer(
        &mut self,
        binding: u32,
        array_element: u32,
        view: Arc<BufferView>,
    ) -> Result<(), DescriptorSetError> {
        let (descriptor_type, slot, _) = self.locate(binding, array_element)?;

        if !descriptor_type.is_texel_buffer() {
            return Err(type_mismatch(binding, descriptor_type, "a buffer view"));
        }

        self.write_slot(slot, BoundDescriptor::TexelBuffer(view));

        Ok(())
    }

    fn locate(
        &self,
        binding: u32,
        array_element: u32,
    ) -> Result<(DescriptorType, usize, BindingSlots), DescriptorSetError> {
        let description = self.layout.description();
        let index = description
            .binding_index(binding)
            .ok_or(DescriptorSetError::BindingNotInLayout { binding })?;
        let layout_binding = &description.bindings()[index];

        if array_element >= layout_binding.descriptor_count {
            return Err(DescriptorSetError::ArrayElementOutOfRange {
                binding,
                array_element,
                descriptor_count: layout_binding.descriptor_count,
            });
        }

        let slots = self.bindings[index];

        Ok((
            layout_binding.descriptor_type,
            slots.first_slot + array_element as usize,
            slots,
        ))
    }

    fn has_immutable_sampler(&self, binding: u32) -> bool {
        self.layout
            .description()
            .binding(binding)
            .is_some_and(|b| b.immutable_sampler.is_some())
    }

    fn write_slot(&mut self, slot: usize, descriptor: BoundDescriptor) {
        if self.slots[slot] != descriptor {
            self.slots[slot] = descriptor;
            self.dirty = true;
            self.key = None;
        }
    }

    /// Checks that every descriptor has something bound to it.
    pub(crate) fn validate(&self) -> Result<(), DescriptorSetError> {
        for (layout_binding, slots) in self
            .layout
            .description()
            .bindings()
            .iter()
            .zip(&self.bindings)
        {
            let needs_sampler = layout_binding.descriptor_type
                == DescriptorType::CombinedImageSampler
                && layout_binding.immutable_sampler.is_none();

            for array_element in 0..layout_binding.descriptor_count {
                let complete = match &self.slots[slots.first_slot + array_element as usize] {
                    BoundDescriptor::Empty => false,
                    BoundDescriptor::Image { view, sampler, .. } => {
                        view.is_some() && (sampler.is_some() || !needs_sampler)
                    }
                    BoundDescriptor::Buffer { .. } | BoundDescriptor::TexelBuffer(_) => true,
                };

                if !complete {
                    return Err(DescriptorSetError::Unbound {
                        binding: layout_binding.binding,
                        array_element,
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns the key of the current content, computing it if the content changed since the
    /// last call.
    pub(crate) fn key(&mut self) -> DescriptorSetKey {
        match &self.key {
            Some(key) => key.clone(),
            None => {
                let key = DescriptorSetKey::new(self.layout.clone(), self.slots.clone().into());
                self.key = Some(key.clone());

                key
            }
        }
    }

    /// Records that the current content now lives in `set`, for the command buffer with
    /// `fence_value`.
    pub(crate) fn resolved(&mut self, set: vk::DescriptorSet, fence_value: u64) {
        self.dirty = false;
        self.last_set = Some((set, fence_value));
    }

    /// Returns the set the current content was last resolved to, if that happened for the
    /// command buffer with `fence_value` and nothing changed since.
    pub(crate) fn reusable_set(&self, fence_value: u64) -> Option<vk::DescriptorSet> {
        match self.last_set {
            Some((set, value)) if !self.dirty && value == fence_value => Some(set),
            _ => None,
        }
    }

    /// Returns the native writes that give a set the current content.
    pub(crate) fn writes(&self) -> Vec<DescriptorWrite> {
        let mut writes = Vec::with_capacity(self.slots.len());

        for (layout_binding, slots) in self
            .layout
            .description()
            .bindings()
            .iter()
            .zip(&self.bindings)
        {
            for array_element in 0..layout_binding.descriptor_count {
                let info = match &self.slots[slots.first_slot + array_element as usize] {
                    BoundDescriptor::Empty => continue,
                    BoundDescriptor::Buffer {
                        buffer,
                        offset,
                        range,
                    } => DescriptorWriteInfo::Buffer {
                        buffer: buffer.handle(),
                        offset: *offset,
                        range: *range,
                    },
                    BoundDescriptor::Image {
                        view,
                        layout,
                        sampler,
                    } => DescriptorWriteInfo::Image {
                        view: view.as_ref().map_or(vk::ImageView::null(), |v| v.handle()),
                        layout: (*layout).into(),
                        sampler: sampler.as_ref().map_or(vk::Sampler::null(), |s| s.handle()),
                    },
                    BoundDescriptor::TexelBuffer(view) => {
                        DescriptorWriteInfo::TexelBuffer(view.handle())
                    }
                };

                writes.push(DescriptorWrite {
                    binding: layout_binding.binding,
                    array_element,
                    descriptor_type: layout_binding.descriptor_type,
                    info,
                });
            }
        }

        writes
    }
}

fn type_mismatch(
    binding: u32,
    descriptor_type: DescriptorType,
    provided: &'static str,
) -> DescriptorSetError {
    DescriptorSetError::TypeMismatch {
        binding,
        descriptor_type,
        provided,
    }
}

/// Error that can happen when binding resources or resolving descriptor sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorSetError {
    /// No pipeline is bound, so there is no layout to bind resources against.
    NoPipelineBound,

    /// The pipeline layout has no set with this number.
    SetNotInLayout { set: u32, set_count: u32 },

    /// The set layout has no binding with this number.
    BindingNotInLayout { binding: u32 },

    /// The binding has fewer descriptors than the array element requires.
    ArrayElementOutOfRange {
        binding: u32,
        array_element: u32,
        descriptor_count: u32,
    },

    /// The resource cannot be bound to a descriptor of this type.
    TypeMismatch {
        binding: u32,
        descriptor_type: DescriptorType,
        provided: &'static str,
    },

    /// A sampler was bound to a binding whose sampler is part of the layout.
    ImmutableSampler { binding: u32 },

    /// The offset of a dynamic uniform buffer doesn't fit in 32 bits.
    DynamicOffsetOutOfRange { binding: u32, offset: DeviceSize },

    /// A descriptor has nothing bound to it.
    Unbound { binding: u32, array_element: u32 },

    /// The command buffer is not recording.
    NotRecording,

    /// The device failed to allocate a native object.
    VulkanError(VulkanError),
}

impl Error for DescriptorSetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::VulkanError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for DescriptorSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPipelineBound => write!(f, "no pipeline is bound"),
            Self::SetNotInLayout { set, set_count } => write!(
                f,
                "set {} was used, but the pipeline layout only has {} sets",
                set, set_count,
            ),
            Self::BindingNotInLayout { binding } => {
                write!(f, "the set layout has no binding {}", binding)
            }
            Self::ArrayElementOutOfRange {
                binding,
                array_element,
                descriptor_count,
            } => write!(
                f,
                "array element {} of binding {} was used, but the binding only has {} \
                descriptors",
                array_element, binding, descriptor_count,
            ),
            Self::TypeMismatch {
                binding,
                descriptor_type,
                provided,
            } => write!(
                f,
                "{} was bound to binding {}, which has descriptor type {:?}",
                provided, binding, descriptor_type,
            ),
            Self::ImmutableSampler { binding } => write!(
                f,
                "a sampler was bound to binding {}, which has an immutable sampler",
                binding,
            ),
            Self::DynamicOffsetOutOfRange { binding, offset } => write!(
                f,
                "offset {} of the dynamic uniform buffer at binding {} doesn't fit in 32 bits",
                offset, binding,
            ),
            Self::Unbound {
                binding,
                array_element,
            } => write!(
                f,
                "array element {} of binding {} has nothing bound to it",
                array_element, binding,
            ),
            Self::NotRecording => write!(f, "the command buffer is not recording"),
            Self::VulkanError(_) => write!(f, "a runtime error occurred"),
        }
    }
}

impl From<VulkanError> for DescriptorSetError {
    #[inline]
    fn from(err: VulkanError) -> Self {
        Self::VulkanError(err)
    }
}
