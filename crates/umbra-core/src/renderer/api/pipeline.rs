// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Render pipeline state descriptors.

use crate::renderer::api::bind_group::BindGroupLayoutId;
use crate::renderer::api::resource::{IndexFormat, ShaderModuleId, TextureFormat};
use bitflags::bitflags;
use std::borrow::Cow;

/// An opaque handle to a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub usize);

// --- Vertex input ---

/// The format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Four unsigned bytes.
    Uint8x4,
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
}

impl VertexFormat {
    /// Size of the attribute in bytes.
    pub const fn size(self) -> u64 {
        match self {
            VertexFormat::Uint8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// How often a vertex buffer advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Once per vertex.
    #[default]
    Vertex,
    /// Once per instance.
    Instance,
}

/// One attribute inside a vertex buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescriptor {
    /// The shader input location.
    pub shader_location: u32,
    /// The attribute format.
    pub format: VertexFormat,
    /// Byte offset from the start of the vertex.
    pub offset: u64,
}

/// The memory layout of one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayoutDescriptor<'a> {
    /// Bytes between consecutive vertices.
    pub array_stride: u64,
    /// How the buffer advances.
    pub step_mode: VertexStepMode,
    /// The attributes of each element.
    pub attributes: Cow<'a, [VertexAttributeDescriptor]>,
}

// --- Primitive state ---

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    TriangleList,
    /// A triangle strip.
    TriangleStrip,
}

/// Winding order of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// Primitive assembly and rasterization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveStateDescriptor {
    /// Topology.
    pub topology: PrimitiveTopology,
    /// Strip index format.
    pub strip_index_format: Option<IndexFormat>,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Culling.
    pub cull_mode: Option<CullMode>,
}

// --- Depth / stencil ---

/// Comparison function for depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if new < old.
    Less,
    /// Passes if new == old.
    Equal,
    /// Passes if new <= old.
    LessEqual,
    /// Passes if new > old.
    Greater,
    /// Passes if new != old.
    NotEqual,
    /// Passes if new >= old.
    GreaterEqual,
    /// Always passes.
    #[default]
    Always,
}

impl CompareFunction {
    /// Evaluates the comparison the way the GPU does: `reference <op> stored`.
    pub fn passes<T: PartialOrd>(self, reference: T, stored: T) -> bool {
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => reference < stored,
            CompareFunction::Equal => reference == stored,
            CompareFunction::LessEqual => reference <= stored,
            CompareFunction::Greater => reference > stored,
            CompareFunction::NotEqual => reference != stored,
            CompareFunction::GreaterEqual => reference >= stored,
            CompareFunction::Always => true,
        }
    }
}

/// Operation applied to the stencil value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the stored value.
    #[default]
    Keep,
    /// Set to zero.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Bitwise invert.
    Invert,
    /// Increment, clamping.
    IncrementClamp,
    /// Decrement, clamping.
    DecrementClamp,
}

/// Stencil state for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilFaceState {
    /// The stencil comparison.
    pub compare: CompareFunction,
    /// Applied when the stencil test fails.
    pub fail_op: StencilOperation,
    /// Applied when the stencil test passes and the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// Applied when both tests pass.
    pub pass_op: StencilOperation,
}

/// Depth and stencil test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDescriptor {
    /// Attachment format.
    pub format: TextureFormat,
    /// Whether depth is written.
    pub depth_write_enabled: bool,
    /// Depth comparison.
    pub depth_compare: CompareFunction,
    /// Stencil state for front faces.
    pub stencil_front: StencilFaceState,
    /// Stencil state for back faces.
    pub stencil_back: StencilFaceState,
    /// Mask applied to stored and reference values before comparing.
    pub stencil_read_mask: u32,
    /// Mask applied when writing stencil values.
    pub stencil_write_mask: u32,
}

// --- Color targets ---

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0.
    Zero,
    /// 1.
    One,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
}

/// Blend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// src + dst.
    #[default]
    Add,
}

/// Blend equation for one component group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentDescriptor {
    /// Source factor.
    pub src_factor: BlendFactor,
    /// Destination factor.
    pub dst_factor: BlendFactor,
    /// Operation.
    pub operation: BlendOperation,
}

/// Blend state for one color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateDescriptor {
    /// Color equation.
    pub color: BlendComponentDescriptor,
    /// Alpha equation.
    pub alpha: BlendComponentDescriptor,
}

impl BlendStateDescriptor {
    /// Straight (non-premultiplied) alpha blending.
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponentDescriptor {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponentDescriptor {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
    };
}

bitflags! {
    /// Color channels a target writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        /// Red.
        const R = 0b0001;
        /// Green.
        const G = 0b0010;
        /// Blue.
        const B = 0b0100;
        /// Alpha.
        const A = 0b1000;
        /// All channels.
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

/// State of one color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetStateDescriptor {
    /// Target format.
    pub format: TextureFormat,
    /// Blending, replace when `None`.
    pub blend: Option<BlendStateDescriptor>,
    /// Written channels.
    pub write_mask: ColorWrites,
}

impl ColorTargetStateDescriptor {
    /// A target that replaces every channel.
    pub const fn replace(format: TextureFormat) -> Self {
        Self {
            format,
            blend: None,
            write_mask: ColorWrites::ALL,
        }
    }
}

/// Describes a complete render pipeline.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// Bind group layouts, indexed by group number.
    pub bind_group_layouts: Cow<'a, [BindGroupLayoutId]>,
    /// The vertex shader module.
    pub vertex_shader_module: ShaderModuleId,
    /// The vertex entry point.
    pub vertex_entry_point: Cow<'a, str>,
    /// The fragment shader module.
    pub fragment_shader_module: Option<ShaderModuleId>,
    /// The fragment entry point.
    pub fragment_entry_point: Option<Cow<'a, str>>,
    /// Vertex buffer layouts, indexed by slot.
    pub vertex_buffers_layout: Cow<'a, [VertexBufferLayoutDescriptor<'a>]>,
    /// Primitive state.
    pub primitive_state: PrimitiveStateDescriptor,
    /// Depth/stencil state, no depth attachment when `None`.
    pub depth_stencil_state: Option<DepthStencilStateDescriptor>,
    /// Color targets, in attachment order.
    pub color_target_states: Cow<'a, [ColorTargetStateDescriptor]>,
}
