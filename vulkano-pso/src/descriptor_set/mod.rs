// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Descriptor sets and their layouts.
//!
//! Resources are bound to shaders through descriptor sets. The layout of every set a pipeline
//! uses is derived from the bindings its shader stages declare (see [`layout`]), and interned in
//! the [`LayoutRegistry`](registry::LayoutRegistry) so that equal layouts share one native object.
//!
//! What is bound to each set is recorded by a [`DescriptorSetWriter`](update::DescriptorSetWriter).
//! When a draw needs the sets, the [`DescriptorSetCache`](cache::DescriptorSetCache) returns a
//! native set with exactly that content: either one that was written before, or a freshly
//! allocated one. Native sets are allocated from per-layout pools and recycled once
//! the GPU no longer uses them.

pub mod cache;
pub mod layout;
pub(crate) mod pool;
pub mod registry;
pub mod update;
