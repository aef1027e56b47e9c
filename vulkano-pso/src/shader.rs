// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Shader bytecode and the resource bindings that shaders declare.
//!
//! Shader bytecode is identified by the hash of its content, never by the object that carried
//! it. Two shaders with byte-identical bytecode therefore count as the same shader everywhere in
//! this crate, including in pipeline entries and in the persisted cache file.

use crate::{
    cache::OnceCache,
    descriptor_set::layout::DescriptorType,
    macros::{vulkan_bitflags, vulkan_enum},
    resource::Sampler,
};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, sync::Arc};

vulkan_bitflags! {
    /// A set of [`ShaderStage`] values.
    ShaderStages impl {
        /// Returns a `ShaderStages` with all graphics stages set.
        #[inline]
        pub const fn all_graphics() -> ShaderStages {
            ShaderStages::VERTEX
                .union(ShaderStages::TESSELLATION_CONTROL)
                .union(ShaderStages::TESSELLATION_EVALUATION)
                .union(ShaderStages::GEOMETRY)
                .union(ShaderStages::FRAGMENT)
        }
    }
    = ShaderStageFlags(u32);

    VERTEX = VERTEX,
    TESSELLATION_CONTROL = TESSELLATION_CONTROL,
    TESSELLATION_EVALUATION = TESSELLATION_EVALUATION,
    GEOMETRY = GEOMETRY,
    FRAGMENT = FRAGMENT,
    COMPUTE = COMPUTE,
}

vulkan_enum! {
    /// A shader stage within a pipeline.
    ShaderStage = ShaderStageFlags(u32);

    Vertex = VERTEX,
    TessellationControl = TESSELLATION_CONTROL,
    TessellationEvaluation = TESSELLATION_EVALUATION,
    Geometry = GEOMETRY,
    Fragment = FRAGMENT,
    Compute = COMPUTE,
}

impl From<ShaderStage> for ShaderStages {
    #[inline]
    fn from(val: ShaderStage) -> Self {
        Self(val as u32)
    }
}

/// The content hash of a piece of shader bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShaderHash(pub u128);

impl ShaderHash {
    /// Hashes `words`.
    #[inline]
    pub fn of_words(words: &[u32]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(bytemuck::cast_slice(words)))
    }
}

impl fmt::Display for ShaderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// SPIR-V bytecode together with its content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderCode {
    hash: ShaderHash,
    words: Arc<[u32]>,
}

impl ShaderCode {
    const MAGIC: u32 = 0x0723_0203;

    /// Wraps SPIR-V words. The code is not validated.
    pub fn from_words(words: impl Into<Arc<[u32]>>) -> Self {
        let words = words.into();

        ShaderCode {
            hash: ShaderHash::of_words(&words),
            words,
        }
    }

    /// As `from_words`, but takes a slice of bytes. Code stored with the opposite endianness is
    /// byte-swapped.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShaderCodeError> {
        if bytes.len() % 4 != 0 {
            return Err(ShaderCodeError::UnalignedLength { len: bytes.len() });
        }

        let mut words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        match words.first() {
            Some(&Self::MAGIC) => (),
            Some(&word) if word.swap_bytes() == Self::MAGIC => {
                words.iter_mut().for_each(|word| *word = word.swap_bytes());
            }
            _ => return Err(ShaderCodeError::InvalidMagic),
        }

        Ok(Self::from_words(words))
    }

    #[inline]
    pub fn hash(&self) -> ShaderHash {
        self.hash
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// Error that can happen when wrapping shader bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderCodeError {
    /// The length of the bytecode is not a multiple of 4.
    UnalignedLength { len: usize },

    /// The bytecode does not start with the SPIR-V magic number.
    InvalidMagic,
}

impl Error for ShaderCodeError {}

impl fmt::Display for ShaderCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnalignedLength { len } => {
                write!(f, "the bytecode length {} is not a multiple of 4", len)
            }
            Self::InvalidMagic => write!(f, "the bytecode does not start with the SPIR-V magic"),
        }
    }
}

/// A resource binding declared by a shader stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderBinding {
    /// The descriptor set the shader expects the resource in.
    pub set: u32,

    /// The binding number within `set`.
    pub binding: u32,

    pub descriptor_type: DescriptorType,

    /// The number of descriptors in the binding. Must not be zero.
    pub descriptor_count: u32,

    /// A sampler baked into the layout. Only valid for combined image sampler bindings.
    ///
    /// Immutable samplers are runtime objects, so pipelines using them are never persisted.
    #[serde(skip)]
    pub immutable_sampler: Option<Arc<Sampler>>,
}

impl ShaderBinding {
    /// Returns a binding of one descriptor without an immutable sampler.
    #[inline]
    pub fn new(set: u32, binding: u32, descriptor_type: DescriptorType) -> Self {
        ShaderBinding {
            set,
            binding,
            descriptor_type,
            descriptor_count: 1,
            immutable_sampler: None,
        }
    }
}

/// One shader stage of a pipeline: which stage, which bytecode, and what the bytecode binds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderStageInfo {
    pub stage: ShaderStage,

    /// The content hash of the bytecode. The bytecode itself must be registered with the
    /// pipeline cache before a pipeline using it can be created.
    pub code: ShaderHash,

    pub bindings: Vec<ShaderBinding>,
}

impl ShaderStageInfo {
    #[inline]
    pub fn new(stage: ShaderStage, code: &ShaderCode, bindings: Vec<ShaderBinding>) -> Self {
        ShaderStageInfo {
            stage,
            code: code.hash(),
            bindings,
        }
    }

    #[inline]
    pub(crate) fn has_immutable_samplers(&self) -> bool {
        self.bindings.iter().any(|b| b.immutable_sampler.is_some())
    }
}

/// Bytecode known to a pipeline cache, keyed by content hash.
#[derive(Debug, Default)]
pub(crate) struct ShaderCodeCache {
    codes: OnceCache<ShaderHash, Arc<ShaderCode>>,
}

impl ShaderCodeCache {
    /// Registers `code`. Registering bytecode that is already known returns the stored copy.
    pub(crate) fn insert(&self, code: ShaderCode) -> Arc<ShaderCode> {
        self.codes.insert_if_vacant(code.hash(), Arc::new(code))
    }

    pub(crate) fn get(&self, hash: ShaderHash) -> Option<Arc<ShaderCode>> {
        self.codes.get(&hash)
    }

    pub(crate) fn len(&self) -> usize {
        self.codes.len()
    }

    pub(crate) fn values(&self) -> Vec<Arc<ShaderCode>> {
        self.codes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytecode_shares_hash() {
        let a = ShaderCode::from_words(vec![ShaderCode::MAGIC, 1, 2, 3]);
        let b = ShaderCode::from_words(vec![ShaderCode::MAGIC, 1, 2, 3]);
        let c = ShaderCode::from_words(vec![ShaderCode::MAGIC, 1, 2, 4]);

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());

        let cache = ShaderCodeCache::default();
        let first = cache.insert(a);
        let second = cache.insert(b);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn from_bytes_swaps_foreign_endianness() {
        let words = [ShaderCode::MAGIC, 0x1122_3344];
        let swapped: Vec<u8> = words
            .iter()
            .flat_map(|w| w.swap_bytes().to_ne_bytes())
            .collect();

        let code = ShaderCode::from_bytes(&swapped).unwrap();
        assert_eq!(code.words(), &words);
        assert_eq!(code.hash(), ShaderHash::of_words(&words));
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert_eq!(
            ShaderCode::from_bytes(&[1, 2, 3]),
            Err(ShaderCodeError::UnalignedLength { len: 3 }),
        );
        assert_eq!(
            ShaderCode::from_bytes(&[0; 8]),
            Err(ShaderCodeError::InvalidMagic),
        );
    }

    #[test]
    fn stage_converts_to_flags() {
        let stages = ShaderStages::from(ShaderStage::Vertex) | ShaderStage::Fragment.into();

        assert!(stages.contains(ShaderStages::VERTEX));
        assert!(stages.contains(ShaderStages::FRAGMENT));
        assert!(!stages.intersects(ShaderStages::COMPUTE));
        assert_eq!(
            ash::vk::ShaderStageFlags::from(stages),
            ash::vk::ShaderStageFlags::VERTEX | ash::vk::ShaderStageFlags::FRAGMENT,
        );
    }
}
