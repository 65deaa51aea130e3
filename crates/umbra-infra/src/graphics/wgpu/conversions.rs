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

use umbra_core::math::{Extent3D, LinearRgba, Origin3D};
use umbra_core::renderer::api::bind_group::{
    BindingType, BufferBindingType, SamplerBindingType, ShaderStageFlags, TextureSampleType,
};
use umbra_core::renderer::api::command::{LoadOp, Operations, StoreOp};
use umbra_core::renderer::api::pipeline::{
    BlendComponentDescriptor, BlendFactor, BlendOperation, BlendStateDescriptor, ColorWrites,
    CompareFunction, CullMode, FrontFace, PrimitiveTopology, StencilFaceState, StencilOperation,
    VertexFormat, VertexStepMode,
};
use umbra_core::renderer::api::resource::{
    AddressMode, BufferUsage, FilterMode, ImageAspect, IndexFormat, TextureDimension,
    TextureFormat, TextureUsage, TextureViewDimension,
};

/// A local extension trait to convert Umbra's types into WGPU-compatible types.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_wgpu()` syntax.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a WGPU-compatible type.
    fn into_wgpu(self) -> T;
}

// --- Dimensions and Origins ---

impl IntoWgpu<wgpu::Extent3d> for Extent3D {
    fn into_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth_or_array_layers,
        }
    }
}

impl IntoWgpu<wgpu::Origin3d> for Origin3D {
    fn into_wgpu(self) -> wgpu::Origin3d {
        wgpu::Origin3d {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }
}

impl IntoWgpu<wgpu::Color> for LinearRgba {
    fn into_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

// --- Textures ---

impl IntoWgpu<wgpu::TextureDimension> for TextureDimension {
    fn into_wgpu(self) -> wgpu::TextureDimension {
        match self {
            TextureDimension::D1 => wgpu::TextureDimension::D1,
            TextureDimension::D2 => wgpu::TextureDimension::D2,
            TextureDimension::D3 => wgpu::TextureDimension::D3,
        }
    }
}

impl IntoWgpu<wgpu::TextureViewDimension> for TextureViewDimension {
    fn into_wgpu(self) -> wgpu::TextureViewDimension {
        match self {
            TextureViewDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureViewDimension::D2Array => wgpu::TextureViewDimension::D2Array,
            TextureViewDimension::Cube => wgpu::TextureViewDimension::Cube,
        }
    }
}

impl IntoWgpu<wgpu::TextureAspect> for ImageAspect {
    fn into_wgpu(self) -> wgpu::TextureAspect {
        match self {
            ImageAspect::All => wgpu::TextureAspect::All,
            ImageAspect::StencilOnly => wgpu::TextureAspect::StencilOnly,
            ImageAspect::DepthOnly => wgpu::TextureAspect::DepthOnly,
        }
    }
}

impl IntoWgpu<wgpu::TextureFormat> for TextureFormat {
    fn into_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

/// Maps a wgpu format back to Umbra's, for externally owned presentation
/// textures. Formats the pipeline never renders to yield `None`.
pub fn from_wgpu_texture_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    Some(match format {
        wgpu::TextureFormat::R8Unorm => TextureFormat::R8Unorm,
        wgpu::TextureFormat::R16Float => TextureFormat::R16Float,
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
        wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
        wgpu::TextureFormat::Depth24PlusStencil8 => TextureFormat::Depth24PlusStencil8,
        _ => return None,
    })
}

// Usage flags share their bit layout with wgpu.

impl IntoWgpu<wgpu::TextureUsages> for TextureUsage {
    fn into_wgpu(self) -> wgpu::TextureUsages {
        wgpu::TextureUsages::from_bits_truncate(self.bits())
    }
}

impl IntoWgpu<wgpu::BufferUsages> for BufferUsage {
    fn into_wgpu(self) -> wgpu::BufferUsages {
        wgpu::BufferUsages::from_bits_truncate(self.bits())
    }
}

// --- Samplers ---

impl IntoWgpu<wgpu::AddressMode> for AddressMode {
    fn into_wgpu(self) -> wgpu::AddressMode {
        match self {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

impl IntoWgpu<wgpu::FilterMode> for FilterMode {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl IntoWgpu<wgpu::MipmapFilterMode> for FilterMode {
    fn into_wgpu(self) -> wgpu::MipmapFilterMode {
        match self {
            FilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
            FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
        }
    }
}

// --- Pipeline state ---

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

impl IntoWgpu<wgpu::VertexFormat> for VertexFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexFormat::Uint8x4 => wgpu::VertexFormat::Uint8x4,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl IntoWgpu<wgpu::VertexStepMode> for VertexStepMode {
    fn into_wgpu(self) -> wgpu::VertexStepMode {
        match self {
            VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
            VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
        }
    }
}

impl IntoWgpu<wgpu::PrimitiveTopology> for PrimitiveTopology {
    fn into_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

impl IntoWgpu<wgpu::FrontFace> for FrontFace {
    fn into_wgpu(self) -> wgpu::FrontFace {
        match self {
            FrontFace::Ccw => wgpu::FrontFace::Ccw,
            FrontFace::Cw => wgpu::FrontFace::Cw,
        }
    }
}

impl IntoWgpu<wgpu::Face> for CullMode {
    fn into_wgpu(self) -> wgpu::Face {
        match self {
            CullMode::Front => wgpu::Face::Front,
            CullMode::Back => wgpu::Face::Back,
        }
    }
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunction {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

impl IntoWgpu<wgpu::StencilOperation> for StencilOperation {
    fn into_wgpu(self) -> wgpu::StencilOperation {
        match self {
            StencilOperation::Keep => wgpu::StencilOperation::Keep,
            StencilOperation::Zero => wgpu::StencilOperation::Zero,
            StencilOperation::Replace => wgpu::StencilOperation::Replace,
            StencilOperation::Invert => wgpu::StencilOperation::Invert,
            StencilOperation::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
            StencilOperation::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        }
    }
}

impl IntoWgpu<wgpu::StencilFaceState> for StencilFaceState {
    fn into_wgpu(self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.compare.into_wgpu(),
            fail_op: self.fail_op.into_wgpu(),
            depth_fail_op: self.depth_fail_op.into_wgpu(),
            pass_op: self.pass_op.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::BlendFactor> for BlendFactor {
    fn into_wgpu(self) -> wgpu::BlendFactor {
        match self {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        }
    }
}

impl IntoWgpu<wgpu::BlendOperation> for BlendOperation {
    fn into_wgpu(self) -> wgpu::BlendOperation {
        match self {
            BlendOperation::Add => wgpu::BlendOperation::Add,
        }
    }
}

impl IntoWgpu<wgpu::BlendComponent> for BlendComponentDescriptor {
    fn into_wgpu(self) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: self.src_factor.into_wgpu(),
            dst_factor: self.dst_factor.into_wgpu(),
            operation: self.operation.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::BlendState> for BlendStateDescriptor {
    fn into_wgpu(self) -> wgpu::BlendState {
        wgpu::BlendState {
            color: self.color.into_wgpu(),
            alpha: self.alpha.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::ColorWrites> for ColorWrites {
    fn into_wgpu(self) -> wgpu::ColorWrites {
        wgpu::ColorWrites::from_bits_truncate(self.bits() as u32)
    }
}

// --- Bindings ---

impl IntoWgpu<wgpu::ShaderStages> for ShaderStageFlags {
    fn into_wgpu(self) -> wgpu::ShaderStages {
        let mut stages = wgpu::ShaderStages::NONE;
        if self.contains(ShaderStageFlags::VERTEX) {
            stages |= wgpu::ShaderStages::VERTEX;
        }
        if self.contains(ShaderStageFlags::FRAGMENT) {
            stages |= wgpu::ShaderStages::FRAGMENT;
        }
        if self.contains(ShaderStageFlags::COMPUTE) {
            stages |= wgpu::ShaderStages::COMPUTE;
        }
        stages
    }
}

impl IntoWgpu<wgpu::BindingType> for BindingType {
    fn into_wgpu(self) -> wgpu::BindingType {
        match self {
            BindingType::Buffer {
                ty,
                has_dynamic_offset,
                min_binding_size,
            } => wgpu::BindingType::Buffer {
                ty: match ty {
                    BufferBindingType::Uniform => wgpu::BufferBindingType::Uniform,
                    BufferBindingType::Storage { read_only } => {
                        wgpu::BufferBindingType::Storage { read_only }
                    }
                },
                has_dynamic_offset,
                min_binding_size,
            },
            BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled,
            } => wgpu::BindingType::Texture {
                sample_type: match sample_type {
                    TextureSampleType::Float { filterable } => {
                        wgpu::TextureSampleType::Float { filterable }
                    }
                    TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
                    TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
                },
                view_dimension: view_dimension.into_wgpu(),
                multisampled,
            },
            BindingType::Sampler(kind) => wgpu::BindingType::Sampler(match kind {
                SamplerBindingType::Filtering => wgpu::SamplerBindingType::Filtering,
                SamplerBindingType::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
            }),
        }
    }
}

// --- Pass operations ---

impl IntoWgpu<wgpu::StoreOp> for StoreOp {
    fn into_wgpu(self) -> wgpu::StoreOp {
        match self {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }
}

impl IntoWgpu<wgpu::Operations<wgpu::Color>> for Operations<LinearRgba> {
    fn into_wgpu(self) -> wgpu::Operations<wgpu::Color> {
        wgpu::Operations {
            load: match self.load {
                LoadOp::Load => wgpu::LoadOp::Load,
                LoadOp::Clear(color) => wgpu::LoadOp::Clear(color.into_wgpu()),
            },
            store: self.store.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::Operations<f32>> for Operations<f32> {
    fn into_wgpu(self) -> wgpu::Operations<f32> {
        wgpu::Operations {
            load: match self.load {
                LoadOp::Load => wgpu::LoadOp::Load,
                LoadOp::Clear(depth) => wgpu::LoadOp::Clear(depth),
            },
            store: self.store.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::Operations<u32>> for Operations<u32> {
    fn into_wgpu(self) -> wgpu::Operations<u32> {
        wgpu::Operations {
            load: match self.load {
                LoadOp::Load => wgpu::LoadOp::Load,
                LoadOp::Clear(stencil) => wgpu::LoadOp::Clear(stencil),
            },
            store: self.store.into_wgpu(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    #[test]
    fn test_extent3d_to_wgpu_extent3d() {
        let extent = Extent3D {
            width: 1,
            height: 2,
            depth_or_array_layers: 3,
        };
        let w: wgpu::Extent3d = extent.into_wgpu();
        assert_eq!(w.width, 1);
        assert_eq!(w.height, 2);
        assert_eq!(w.depth_or_array_layers, 3);
    }

    #[test]
    fn test_origin3d_to_wgpu_origin3d() {
        let origin = Origin3D { x: 4, y: 5, z: 6 };
        let w: wgpu::Origin3d = origin.into_wgpu();
        assert_eq!((w.x, w.y, w.z), (4, 5, 6));
    }

    #[test]
    fn test_usage_bits_match_wgpu() {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        assert_eq!(
            usage.into_wgpu(),
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        );
        assert_eq!(
            TextureUsage::COPY_SRC.into_wgpu(),
            wgpu::TextureUsages::COPY_SRC
        );

        let usage = BufferUsage::UNIFORM | BufferUsage::COPY_DST;
        assert_eq!(
            usage.into_wgpu(),
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
        );
        assert_eq!(
            BufferUsage::QUERY_RESOLVE.into_wgpu(),
            wgpu::BufferUsages::QUERY_RESOLVE
        );
        assert_eq!(BufferUsage::INDEX.into_wgpu(), wgpu::BufferUsages::INDEX);
    }

    #[test]
    fn test_texture_format_round_trip() {
        for format in [
            TextureFormat::R8Unorm,
            TextureFormat::Rgba16Float,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth24PlusStencil8,
        ] {
            assert_eq!(from_wgpu_texture_format(format.into_wgpu()), Some(format));
        }
        assert_eq!(
            from_wgpu_texture_format(wgpu::TextureFormat::Rgba32Float),
            None
        );
    }

    #[test]
    fn test_stencil_face_conversion() {
        let face = StencilFaceState {
            compare: CompareFunction::Equal,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Replace,
        };
        let w: wgpu::StencilFaceState = face.into_wgpu();
        assert_eq!(w.compare, wgpu::CompareFunction::Equal);
        assert_eq!(w.pass_op, wgpu::StencilOperation::Replace);
    }

    #[test]
    fn test_shader_stage_flags() {
        let stages: wgpu::ShaderStages =
            (ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT).into_wgpu();
        assert_eq!(stages, wgpu::ShaderStages::VERTEX_FRAGMENT);
    }

    #[test]
    fn test_binding_type_conversion() {
        let uniform = BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(256),
        };
        match uniform.into_wgpu() {
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset,
                min_binding_size,
            } => {
                assert!(has_dynamic_offset);
                assert_eq!(min_binding_size, NonZeroU64::new(256));
            }
            other => panic!("unexpected binding type {other:?}"),
        }

        let stencil = BindingType::Texture {
            sample_type: TextureSampleType::Uint,
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        };
        assert!(matches!(
            stencil.into_wgpu(),
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Uint,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            }
        ));
    }

    #[test]
    fn test_clear_operations() {
        let ops: wgpu::Operations<wgpu::Color> = Operations::clear(LinearRgba::BLACK).into_wgpu();
        assert_eq!(ops.load, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        assert_eq!(ops.store, wgpu::StoreOp::Store);

        let ops: wgpu::Operations<f32> = Operations::<f32>::load().into_wgpu();
        assert_eq!(ops.load, wgpu::LoadOp::Load);

        let discard = Operations {
            load: LoadOp::Clear(0u32),
            store: StoreOp::Discard,
        };
        let ops: wgpu::Operations<u32> = discard.into_wgpu();
        assert_eq!(ops.load, wgpu::LoadOp::Clear(0));
        assert_eq!(ops.store, wgpu::StoreOp::Discard);
    }
}
