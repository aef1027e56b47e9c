//! Building descriptor set layout descriptions from the bindings declared by shader stages.
//!
//! [`build_layout`] takes every stage of a pipeline, places each declared binding at its
//! physical `(set, binding)` slot, and merges bindings that several stages declare at the same
//! slot into one binding visible to all of those stages. The result is one normalized
//! [`SetLayoutDescription`] per set number, plus a [`RemappingInfo`] that tells each stage where
//! its resources ended up.
//!
//! Set numbers that no stage uses still get an (empty) description, so that set indices in the
//! pipeline layout match the set numbers the shaders were written against.

use crate::{
    macros::vulkan_enum,
    resource::Sampler,
    shader::{ShaderStage, ShaderStageInfo, ShaderStages},
};
use foldhash::HashMap;
use smallvec::SmallVec;
use std::{
    collections::{btree_map, BTreeMap},
    error::Error,
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
};

vulkan_enum! {
    /// Describes what kind of resource may later be bound to a descriptor.
    DescriptorType = DescriptorType(i32);

    /// Read-only uniform data at a fixed offset.
    UniformBuffer = UNIFORM_BUFFER,

    /// Read-only uniform data, where the offset is supplied when the set is bound.
    DynamicUniformBuffer = UNIFORM_BUFFER_DYNAMIC,

    /// Read-write storage data.
    StorageBuffer = STORAGE_BUFFER,

    /// An image that is sampled with a separately bound sampler.
    SampledImage = SAMPLED_IMAGE,

    /// An image that is read and written without a sampler.
    StorageImage = STORAGE_IMAGE,

    /// An image and the sampler used to read it.
    CombinedImageSampler = COMBINED_IMAGE_SAMPLER,

    /// Read-only formatted texel data in a buffer.
    UniformTexelBuffer = UNIFORM_TEXEL_BUFFER,

    /// Read-write formatted texel data in a buffer.
    StorageTexelBuffer = STORAGE_TEXEL_BUFFER,

    /// An attachment of the current render pass, read by fragment shaders.
    InputAttachment = INPUT_ATTACHMENT,
}

impl DescriptorType {
    /// Returns whether descriptors of this type hold a buffer range.
    #[inline]
    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            Self::UniformBuffer | Self::DynamicUniformBuffer | Self::StorageBuffer
        )
    }

    /// Returns whether descriptors of this type hold an image view.
    #[inline]
    pub fn is_image(self) -> bool {
        matches!(
            self,
            Self::SampledImage
                | Self::StorageImage
                | Self::CombinedImageSampler
                | Self::InputAttachment
        )
    }

    /// Returns whether descriptors of this type hold a buffer view.
    #[inline]
    pub fn is_texel_buffer(self) -> bool {
        matches!(self, Self::UniformTexelBuffer | Self::StorageTexelBuffer)
    }
}

/// One binding of a descriptor set layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub descriptor_count: u32,

    /// Every stage that can access the binding.
    pub stages: ShaderStages,

    pub immutable_sampler: Option<Arc<Sampler>>,
}

/// The normalized description of one descriptor set layout.
///
/// Bindings are kept sorted by binding number. Two descriptions compare equal exactly when
/// their bindings do, and the content hash is computed once on construction.
#[derive(Clone, Debug)]
pub struct SetLayoutDescription {
    bindings: Vec<SetLayoutBinding>,
    hash: u64,
}

impl SetLayoutDescription {
    /// Creates a description from `bindings`, sorting them by binding number.
    pub fn new(mut bindings: Vec<SetLayoutBinding>) -> Self {
        bindings.sort_by_key(|b| b.binding);
        let hash = foldhash::fast::FixedState::with_seed(0).hash_one(&bindings);

        SetLayoutDescription { bindings, hash }
    }

    /// Returns a description without any bindings.
    #[inline]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[inline]
    pub fn bindings(&self) -> &[SetLayoutBinding] {
        &self.bindings
    }

    /// Returns the binding with binding number `binding`.
    #[inline]
    pub fn binding(&self, binding: u32) -> Option<&SetLayoutBinding> {
        self.bindings
            .binary_search_by_key(&binding, |b| b.binding)
            .ok()
            .map(|index| &self.bindings[index])
    }

    /// Returns the index of binding number `binding` within [`bindings`](Self::bindings).
    #[inline]
    pub(crate) fn binding_index(&self, binding: u32) -> Option<usize> {
        self.bindings
            .binary_search_by_key(&binding, |b| b.binding)
            .ok()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The content hash. It depends on the order and content of every binding.
    #[inline]
    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    /// Returns the number of dynamic offsets a set with this layout consumes when bound.
    pub fn dynamic_offset_count(&self) -> u32 {
        self.bindings
            .iter()
            .filter(|b| b.descriptor_type == DescriptorType::DynamicUniformBuffer)
            .map(|b| b.descriptor_count)
            .sum()
    }

    /// Returns how many descriptors of each type one set with this layout needs.
    pub fn descriptor_counts(&self) -> SmallVec<[(DescriptorType, u32); 4]> {
        let mut counts: SmallVec<[(DescriptorType, u32); 4]> = SmallVec::new();

        for binding in &self.bindings {
            match counts
                .iter_mut()
                .find(|(ty, _)| *ty == binding.descriptor_type)
            {
                Some((_, count)) => *count += binding.descriptor_count,
                None => counts.push((binding.descriptor_type, binding.descriptor_count)),
            }
        }

        counts
    }
}

impl PartialEq for SetLayoutDescription {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bindings == other.bindings
    }
}

impl Eq for SetLayoutDescription {}

impl Hash for SetLayoutDescription {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// The set layouts of a pipeline, indexed by set number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineDescriptorSetLayouts {
    pub set_layouts: Vec<SetLayoutDescription>,

    /// The union of the stages of every binding.
    pub stages: ShaderStages,
}

/// Where a resource that a shader declared was placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RemappedBinding {
    pub descriptor_type: DescriptorType,

    /// The position of the resource among the stage's resources of the same descriptor type,
    /// in declaration order.
    pub parameter_index: u32,

    pub set: u32,
    pub binding: u32,
}

/// Maps each stage's declared resources to their physical `(set, binding)` slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemappingInfo {
    stages: SmallVec<[(ShaderStage, Vec<RemappedBinding>); 2]>,
}

impl RemappingInfo {
    /// Returns the physical `(set, binding)` slot of the `parameter_index`th resource of type
    /// `descriptor_type` declared by `stage`.
    pub fn get(
        &self,
        stage: ShaderStage,
        descriptor_type: DescriptorType,
        parameter_index: u32,
    ) -> Option<(u32, u32)> {
        self.stage(stage)
            .iter()
            .find(|r| r.descriptor_type == descriptor_type && r.parameter_index == parameter_index)
            .map(|r| (r.set, r.binding))
    }

    /// Returns every remapped resource of `stage`, in declaration order.
    pub fn stage(&self, stage: ShaderStage) -> &[RemappedBinding] {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, bindings)| bindings.as_slice())
            .unwrap_or_default()
    }
}

/// The number of descriptor sets a pipeline layout can have. Set numbers must be below this.
pub const MAX_DESCRIPTOR_SETS: u32 = 32;

/// Merges the bindings that `stages` declare into one description per set number.
///
/// Stage order does not affect the result. Descriptor types and counts are validated: a binding
/// must have at least one descriptor, a stage may declare each slot only once, and stages that
/// share a slot must agree on what it holds.
pub fn build_layout(
    stages: &[ShaderStageInfo],
) -> Result<(PipelineDescriptorSetLayouts, RemappingInfo), LayoutError> {
    let mut slots: BTreeMap<(u32, u32), SetLayoutBinding> = BTreeMap::new();
    let mut remapping = RemappingInfo::default();
    let mut all_stages = ShaderStages::empty();

    for stage_info in stages {
        let stage = stage_info.stage;

        if remapping.stages.iter().any(|(s, _)| *s == stage) {
            return Err(LayoutError::DuplicateStage { stage });
        }

        let mut parameter_counts: HashMap<DescriptorType, u32> = HashMap::default();
        let mut remapped = Vec::with_capacity(stage_info.bindings.len());

        for (index, shader_binding) in stage_info.bindings.iter().enumerate() {
            let slot = (shader_binding.set, shader_binding.binding);

            if slot.0 >= MAX_DESCRIPTOR_SETS {
                return Err(LayoutError::SetOutOfRange {
                    stage,
                    set: slot.0,
                    binding: slot.1,
                });
            }

            if shader_binding.descriptor_count == 0 {
                return Err(LayoutError::ZeroDescriptorCount {
                    stage,
                    set: slot.0,
                    binding: slot.1,
                });
            }

            if shader_binding.descriptor_type == DescriptorType::InputAttachment
                && stage != ShaderStage::Fragment
            {
                return Err(LayoutError::InputAttachmentOutsideFragment {
                    stage,
                    set: slot.0,
                    binding: slot.1,
                });
            }

            if shader_binding.immutable_sampler.is_some()
                && shader_binding.descriptor_type != DescriptorType::CombinedImageSampler
            {
                return Err(LayoutError::UnexpectedImmutableSampler {
                    set: slot.0,
                    binding: slot.1,
                    descriptor_type: shader_binding.descriptor_type,
                });
            }

            if stage_info.bindings[..index]
                .iter()
                .any(|b| (b.set, b.binding) == slot)
            {
                return Err(LayoutError::DuplicateBinding {
                    stage,
                    set: slot.0,
                    binding: slot.1,
                });
            }

            match slots.entry(slot) {
                btree_map::Entry::Occupied(entry) => {
                    let existing = entry.into_mut();

                    if existing.descriptor_type != shader_binding.descriptor_type
                        || existing.descriptor_count != shader_binding.descriptor_count
                        || existing.immutable_sampler != shader_binding.immutable_sampler
                    {
                        return Err(LayoutError::IncompatibleBinding {
                            set: slot.0,
                            binding: slot.1,
                            first: existing.descriptor_type,
                            second: shader_binding.descriptor_type,
                        });
                    }

                    existing.stages |= stage.into();
                }
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(SetLayoutBinding {
                        binding: slot.1,
                        descriptor_type: shader_binding.descriptor_type,
                        descriptor_count: shader_binding.descriptor_count,
                        stages: stage.into(),
                        immutable_sampler: shader_binding.immutable_sampler.clone(),
                    });
                }
            }

            let parameter_index = parameter_counts
                .entry(shader_binding.descriptor_type)
                .or_insert(0);
            remapped.push(RemappedBinding {
                descriptor_type: shader_binding.descriptor_type,
                parameter_index: *parameter_index,
                set: slot.0,
                binding: slot.1,
            });
            *parameter_index += 1;
        }

        all_stages |= stage.into();
        remapping.stages.push((stage, remapped));
    }

    let set_count = slots.keys().next_back().map_or(0, |&(set, _)| set as usize + 1);
    let mut per_set: Vec<Vec<SetLayoutBinding>> = vec![Vec::new(); set_count];

    for ((set, _), binding) in slots {
        per_set[set as usize].push(binding);
    }

    let layouts = PipelineDescriptorSetLayouts {
        set_layouts: per_set.into_iter().map(SetLayoutDescription::new).collect(),
        stages: all_stages,
    };

    Ok((layouts, remapping))
}

/// Error that can happen when building set layouts from shader bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The same stage was given twice.
    DuplicateStage { stage: ShaderStage },

    /// A stage declared the same slot more than once.
    DuplicateBinding {
        stage: ShaderStage,
        set: u32,
        binding: u32,
    },

    /// A binding was declared in a set at or above [`MAX_DESCRIPTOR_SETS`].
    SetOutOfRange {
        stage: ShaderStage,
        set: u32,
        binding: u32,
    },

    /// A binding has a descriptor count of zero.
    ZeroDescriptorCount {
        stage: ShaderStage,
        set: u32,
        binding: u32,
    },

    /// Two stages declared different resources at the same slot.
    IncompatibleBinding {
        set: u32,
        binding: u32,
        first: DescriptorType,
        second: DescriptorType,
    },

    /// An input attachment was declared by a stage other than the fragment stage.
    InputAttachmentOutsideFragment {
        stage: ShaderStage,
        set: u32,
        binding: u32,
    },

    /// An immutable sampler was given for a binding that doesn't hold a sampler.
    UnexpectedImmutableSampler {
        set: u32,
        binding: u32,
        descriptor_type: DescriptorType,
    },
}

impl Error for LayoutError {}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateStage { stage } => {
                write!(f, "the {:?} stage was provided more than once", stage)
            }
            Self::DuplicateBinding {
                stage,
                set,
                binding,
            } => write!(
                f,
                "the {:?} stage declared set {} binding {} more than once",
                stage, set, binding,
            ),
            Self::SetOutOfRange {
                stage,
                set,
                binding,
            } => write!(
                f,
                "the {:?} stage declared binding {} in set {}, but set numbers must be less than \
                {}",
                stage, binding, set, MAX_DESCRIPTOR_SETS,
            ),
            Self::ZeroDescriptorCount {
                stage,
                set,
                binding,
            } => write!(
                f,
                "the {:?} stage declared set {} binding {} with a descriptor count of zero",
                stage, set, binding,
            ),
            Self::IncompatibleBinding {
                set,
                binding,
                first,
                second,
            } => write!(
                f,
                "set {} binding {} was declared as {:?} and as an incompatible {:?}",
                set, binding, first, second,
            ),
            Self::InputAttachmentOutsideFragment {
                stage,
                set,
                binding,
            } => write!(
                f,
                "the {:?} stage declared an input attachment at set {} binding {}, but only the \
                fragment stage can read input attachments",
                stage, set, binding,
            ),
            Self::UnexpectedImmutableSampler {
                set,
                binding,
                descriptor_type,
            } => write!(
                f,
                "set {} binding {} has an immutable sampler, but its descriptor type {:?} does \
                not hold a sampler",
                set, binding, descriptor_type,
            ),
        }
    }
}
