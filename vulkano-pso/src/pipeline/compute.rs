// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::shader::ShaderStageInfo;
use serde::{Deserialize, Serialize};

/// Everything that identifies a compute pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputePipelineDescription {
    /// The compute stage. Its `stage` must be [`ShaderStage::Compute`].
    ///
    /// [`ShaderStage::Compute`]: crate::shader::ShaderStage::Compute
    pub stage: ShaderStageInfo,
}

impl ComputePipelineDescription {
    #[inline]
    pub fn new(stage: ShaderStageInfo) -> Self {
        ComputePipelineDescription { stage }
    }
}
