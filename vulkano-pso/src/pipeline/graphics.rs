// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The full description of a graphics pipeline.
//!
//! Everything that influences the compiled pipeline is part of [`GraphicsPipelineDescription`]:
//! the shader stages (by content hash), the fixed-function state and the formats of the render
//! targets. Viewport, scissor, stencil reference and depth bounds are always dynamic state, so
//! they are not part of the description. Blend constants are fixed to `1.0`.
//!
//! Floating-point fields compare and hash by their bit pattern, so that descriptions can be used
//! as map keys.

use crate::{
    macros::{vulkan_bitflags, vulkan_enum},
    shader::{ShaderStage, ShaderStageInfo},
};
use ash::vk;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// The dynamic states that every graphics pipeline is created with.
pub const DYNAMIC_STATES: [vk::DynamicState; 4] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::STENCIL_REFERENCE,
    vk::DynamicState::DEPTH_BOUNDS,
];

/// The blend constants that every graphics pipeline is created with.
pub const BLEND_CONSTANTS: [f32; 4] = [1.0; 4];

/// A raw Vulkan format value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Format(pub i32);

impl From<vk::Format> for Format {
    #[inline]
    fn from(val: vk::Format) -> Self {
        Format(val.as_raw())
    }
}

impl From<Format> for vk::Format {
    #[inline]
    fn from(val: Format) -> Self {
        vk::Format::from_raw(val.0)
    }
}

vulkan_enum! {
    /// How vertices are assembled into primitives.
    PrimitiveTopology = PrimitiveTopology(i32);

    PointList = POINT_LIST,
    LineList = LINE_LIST,
    LineStrip = LINE_STRIP,
    TriangleList = TRIANGLE_LIST,
    TriangleStrip = TRIANGLE_STRIP,
    TriangleFan = TRIANGLE_FAN,
    PatchList = PATCH_LIST,
}

vulkan_enum! {
    /// Whether vertex attributes advance per vertex or per instance.
    VertexInputRate = VertexInputRate(i32);

    Vertex = VERTEX,
    Instance = INSTANCE,
}

vulkan_enum! {
    /// How polygons are rasterized.
    PolygonMode = PolygonMode(i32);

    Fill = FILL,
    Line = LINE,
    Point = POINT,
}

vulkan_enum! {
    /// Which faces are culled.
    CullMode = CullModeFlags(u32);

    None = NONE,
    Front = FRONT,
    Back = BACK,
    FrontAndBack = FRONT_AND_BACK,
}

vulkan_enum! {
    /// The winding order of front-facing triangles.
    FrontFace = FrontFace(i32);

    CounterClockwise = COUNTER_CLOCKWISE,
    Clockwise = CLOCKWISE,
}

vulkan_enum! {
    /// The number of samples per pixel.
    SampleCount = SampleCountFlags(u32);

    Sample1 = TYPE_1,
    Sample2 = TYPE_2,
    Sample4 = TYPE_4,
    Sample8 = TYPE_8,
    Sample16 = TYPE_16,
    Sample32 = TYPE_32,
    Sample64 = TYPE_64,
}

vulkan_enum! {
    /// A comparison between a new value and a stored value.
    CompareOp = CompareOp(i32);

    Never = NEVER,
    Less = LESS,
    Equal = EQUAL,
    LessOrEqual = LESS_OR_EQUAL,
    Greater = GREATER,
    NotEqual = NOT_EQUAL,
    GreaterOrEqual = GREATER_OR_EQUAL,
    Always = ALWAYS,
}

vulkan_enum! {
    /// What happens to the stored stencil value.
    StencilOp = StencilOp(i32);

    Keep = KEEP,
    Zero = ZERO,
    Replace = REPLACE,
    IncrementAndClamp = INCREMENT_AND_CLAMP,
    DecrementAndClamp = DECREMENT_AND_CLAMP,
    Invert = INVERT,
    IncrementAndWrap = INCREMENT_AND_WRAP,
    DecrementAndWrap = DECREMENT_AND_WRAP,
}

vulkan_enum! {
    /// The factor a blend input is multiplied with.
    BlendFactor = BlendFactor(i32);

    Zero = ZERO,
    One = ONE,
    SrcColor = SRC_COLOR,
    OneMinusSrcColor = ONE_MINUS_SRC_COLOR,
    DstColor = DST_COLOR,
    OneMinusDstColor = ONE_MINUS_DST_COLOR,
    SrcAlpha = SRC_ALPHA,
    OneMinusSrcAlpha = ONE_MINUS_SRC_ALPHA,
    DstAlpha = DST_ALPHA,
    OneMinusDstAlpha = ONE_MINUS_DST_ALPHA,
    ConstantColor = CONSTANT_COLOR,
    OneMinusConstantColor = ONE_MINUS_CONSTANT_COLOR,
    SrcAlphaSaturate = SRC_ALPHA_SATURATE,
}

vulkan_enum! {
    /// The operation that combines the weighted blend inputs.
    BlendOp = BlendOp(i32);

    Add = ADD,
    Subtract = SUBTRACT,
    ReverseSubtract = REVERSE_SUBTRACT,
    Min = MIN,
    Max = MAX,
}

vulkan_bitflags! {
    /// A mask specifying color components that can be written to an attachment.
    ColorComponents = ColorComponentFlags(u32);

    R = R,
    G = G,
    B = B,
    A = A,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexInputAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexInputState {
    pub bindings: SmallVec<[VertexInputBinding; 4]>,
    pub attributes: SmallVec<[VertexInputAttribute; 8]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart_enable: bool,

    /// Only used when `topology` is [`PrimitiveTopology::PatchList`].
    pub patch_control_points: u32,
}

impl Default for InputAssemblyState {
    #[inline]
    fn default() -> Self {
        InputAssemblyState {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart_enable: false,
            patch_control_points: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

impl DepthBias {
    fn bits(&self) -> [u32; 3] {
        [
            self.constant_factor.to_bits(),
            self.clamp.to_bits(),
            self.slope_factor.to_bits(),
        ]
    }
}

impl PartialEq for DepthBias {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for DepthBias {}

impl Hash for DepthBias {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RasterizationState {
    pub depth_clamp_enable: bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: Option<DepthBias>,
    pub line_width: f32,
}

impl Default for RasterizationState {
    #[inline]
    fn default() -> Self {
        RasterizationState {
            depth_clamp_enable: false,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

impl PartialEq for RasterizationState {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.depth_clamp_enable == other.depth_clamp_enable
            && self.polygon_mode == other.polygon_mode
            && self.cull_mode == other.cull_mode
            && self.front_face == other.front_face
            && self.depth_bias == other.depth_bias
            && self.line_width.to_bits() == other.line_width.to_bits()
    }
}

impl Eq for RasterizationState {}

impl Hash for RasterizationState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth_clamp_enable.hash(state);
        self.polygon_mode.hash(state);
        self.cull_mode.hash(state);
        self.front_face.hash(state);
        self.depth_bias.hash(state);
        self.line_width.to_bits().hash(state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultisampleState {
    pub rasterization_samples: SampleCount,
    pub alpha_to_coverage_enable: bool,
}

impl Default for MultisampleState {
    #[inline]
    fn default() -> Self {
        MultisampleState {
            rasterization_samples: SampleCount::Sample1,
            alpha_to_coverage_enable: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
}

impl Default for StencilOpState {
    #[inline]
    fn default() -> Self {
        StencilOpState {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: u32::MAX,
            write_mask: u32::MAX,
        }
    }
}

impl From<StencilOpState> for vk::StencilOpState {
    #[inline]
    fn from(val: StencilOpState) -> Self {
        vk::StencilOpState {
            fail_op: val.fail_op.into(),
            pass_op: val.pass_op.into(),
            depth_fail_op: val.depth_fail_op.into(),
            compare_op: val.compare_op.into(),
            compare_mask: val.compare_mask,
            write_mask: val.write_mask,
            reference: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    #[inline]
    fn default() -> Self {
        DepthStencilState {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::LessOrEqual,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorComponents,
}

impl Default for ColorBlendAttachment {
    /// Returns an attachment that writes every component without blending.
    #[inline]
    fn default() -> Self {
        ColorBlendAttachment {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorComponents::all(),
        }
    }
}

impl From<ColorBlendAttachment> for vk::PipelineColorBlendAttachmentState {
    #[inline]
    fn from(val: ColorBlendAttachment) -> Self {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: val.blend_enable.into(),
            src_color_blend_factor: val.src_color_blend_factor.into(),
            dst_color_blend_factor: val.dst_color_blend_factor.into(),
            color_blend_op: val.color_blend_op.into(),
            src_alpha_blend_factor: val.src_alpha_blend_factor.into(),
            dst_alpha_blend_factor: val.dst_alpha_blend_factor.into(),
            alpha_blend_op: val.alpha_blend_op.into(),
            color_write_mask: val.color_write_mask.into(),
        }
    }
}

/// The formats of the attachments a pipeline renders to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTargetLayout {
    pub color_formats: SmallVec<[Format; 8]>,
    pub depth_format: Option<Format>,
    pub stencil_format: Option<Format>,
    pub view_mask: u32,
}

/// Everything that identifies a graphics pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphicsPipelineDescription {
    pub stages: SmallVec<[ShaderStageInfo; 2]>,
    pub vertex_input: VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,

    /// One entry per color attachment in `render_targets`.
    pub color_blend: SmallVec<[ColorBlendAttachment; 8]>,

    pub render_targets: RenderTargetLayout,
}

impl GraphicsPipelineDescription {
    /// Returns a description with default fixed-function state for `stages`.
    pub fn new(stages: impl IntoIterator<Item = ShaderStageInfo>) -> Self {
        GraphicsPipelineDescription {
            stages: stages.into_iter().collect(),
            vertex_input: VertexInputState::default(),
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: SmallVec::new(),
            render_targets: RenderTargetLayout::default(),
        }
    }

    /// Returns the shader stage for `stage`, if any.
    #[inline]
    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderStageInfo> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderCode;
    use foldhash::HashSet;

    fn description() -> GraphicsPipelineDescription {
        let vs = ShaderCode::from_words(vec![1, 2]);
        let fs = ShaderCode::from_words(vec![3, 4]);

        GraphicsPipelineDescription::new([
            ShaderStageInfo::new(ShaderStage::Vertex, &vs, vec![]),
            ShaderStageInfo::new(ShaderStage::Fragment, &fs, vec![]),
        ])
    }

    #[test]
    fn float_state_is_part_of_identity() {
        let a = description();
        let mut b = description();
        b.rasterization.line_width = 2.0;
        let mut c = description();
        c.rasterization.depth_bias = Some(DepthBias {
            constant_factor: 1.0,
            ..Default::default()
        });

        let set: HashSet<_> = [a.clone(), a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn converts_to_native_state() {
        let attachment = vk::PipelineColorBlendAttachmentState::from(ColorBlendAttachment {
            blend_enable: true,
            src_color_blend_factor: BlendFactor::SrcAlpha,
            dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        });

        assert_eq!(attachment.blend_enable, vk::TRUE);
        assert_eq!(attachment.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            attachment.color_write_mask,
            vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        );
        assert_eq!(
            vk::Format::from(Format::from(vk::Format::D32_SFLOAT)),
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(
            vk::SampleCountFlags::from(SampleCount::Sample4),
            vk::SampleCountFlags::TYPE_4,
        );
    }
}
