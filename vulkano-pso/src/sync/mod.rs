// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tracking GPU progress, and deferring work until the GPU has caught up.
//!
//! Every recording of a command buffer is given a fence value, taken from one monotonically
//! increasing sequence per device. The [`FenceTracker`](fence::FenceTracker) knows the highest
//! value up to which every command buffer has finished executing. Any object that a command
//! buffer may reference records the value of that command buffer, and can only be reused or
//! destroyed once that value is complete.

pub mod deferred;
pub mod fence;
