// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Resources that can be bound to descriptors.
//!
//! The objects here only wrap handles that are created and destroyed by the surrounding renderer.
//! Each wrapper carries an id that is unique within the process and increases in creation order.
//! Descriptor set content is keyed by these ids rather than by the raw handles, because a
//! driver may hand out the handle of a destroyed resource again.

use crate::{macros::impl_id_counter, DeviceSize};
use ash::vk;
use std::{num::NonZero, sync::Arc};

/// A buffer that descriptors can point into.
#[derive(Debug)]
pub struct Buffer {
    handle: vk::Buffer,
    size: DeviceSize,
    id: NonZero<u64>,
}

impl Buffer {
    /// Wraps a raw buffer handle.
    ///
    /// # Safety
    ///
    /// - `handle` must be a valid buffer of at least `size` bytes, and it must outlive every
    ///   descriptor set and command buffer that refers to it.
    #[inline]
    pub unsafe fn from_handle(handle: vk::Buffer, size: DeviceSize) -> Arc<Self> {
        Arc::new(Buffer {
            handle,
            size,
            id: Self::next_id(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }
}

impl_id_counter!(Buffer);

/// A view into an image.
#[derive(Debug)]
pub struct ImageView {
    handle: vk::ImageView,
    id: NonZero<u64>,
}

impl ImageView {
    /// Wraps a raw image view handle.
    ///
    /// # Safety
    ///
    /// - `handle` must be a valid image view that outlives every descriptor set and command
    ///   buffer that refers to it.
    #[inline]
    pub unsafe fn from_handle(handle: vk::ImageView) -> Arc<Self> {
        Arc::new(ImageView {
            handle,
            id: Self::next_id(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

impl_id_counter!(ImageView);

/// A sampler.
#[derive(Debug)]
pub struct Sampler {
    handle: vk::Sampler,
    id: NonZero<u64>,
}

impl Sampler {
    /// Wraps a raw sampler handle.
    ///
    /// # Safety
    ///
    /// - `handle` must be a valid sampler that outlives every descriptor set, descriptor set
    ///   layout and command buffer that refers to it.
    #[inline]
    pub unsafe fn from_handle(handle: vk::Sampler) -> Arc<Self> {
        Arc::new(Sampler {
            handle,
            id: Self::next_id(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl_id_counter!(Sampler);

/// A typed view into a buffer, for texel buffer descriptors.
#[derive(Debug)]
pub struct BufferView {
    handle: vk::BufferView,
    id: NonZero<u64>,
}

impl BufferView {
    /// Wraps a raw buffer view handle.
    ///
    /// # Safety
    ///
    /// - `handle` must be a valid buffer view that outlives every descriptor set and command
    ///   buffer that refers to it.
    #[inline]
    pub unsafe fn from_handle(handle: vk::BufferView) -> Arc<Self> {
        Arc::new(BufferView {
            handle,
            id: Self::next_id(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::BufferView {
        self.handle
    }
}

impl_id_counter!(BufferView);

#[cfg(test)]
mod tests {
    use super::{Buffer, Sampler};
    use ash::vk::{self, Handle};

    #[test]
    fn ids_follow_creation_order() {
        let a = unsafe { Buffer::from_handle(vk::Buffer::from_raw(5), 256) };
        let b = unsafe { Buffer::from_handle(vk::Buffer::from_raw(5), 256) };

        assert!(a.id() < b.id());
        assert_ne!(a, b);
        assert_eq!(a.handle(), b.handle());
    }

    #[test]
    fn equality_goes_through_id() {
        let s = unsafe { Sampler::from_handle(vk::Sampler::from_raw(9)) };
        let t = s.clone();

        assert_eq!(s, t);
    }
}
