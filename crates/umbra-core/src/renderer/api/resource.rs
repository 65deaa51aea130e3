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

//! GPU resource handles and their descriptors.

use crate::math::{Extent3D, Origin3D};
use bitflags::bitflags;
use std::borrow::Cow;

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// An opaque handle to a view over a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub usize);

/// An opaque handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleId(pub usize);

// --- Buffers ---

bitflags! {
    /// How a buffer may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// The buffer can be mapped for reading.
        const MAP_READ = 1 << 0;
        /// The buffer can be mapped for writing.
        const MAP_WRITE = 1 << 1;
        /// The buffer can be the source of a copy.
        const COPY_SRC = 1 << 2;
        /// The buffer can be the destination of a copy or a queue write.
        const COPY_DST = 1 << 3;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 4;
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 5;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 6;
        /// The buffer can be bound as a storage buffer.
        const STORAGE = 1 << 7;
        /// The buffer can receive resolved query results.
        const QUERY_RESOLVE = 1 << 8;
    }
}

/// Describes a buffer to create.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
    /// Whether the buffer starts mapped.
    pub mapped_at_creation: bool,
}

/// The format of index data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

// --- Textures ---

/// Pixel formats used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureFormat {
    /// One 8-bit unsigned normalized channel.
    R8Unorm,
    /// One 16-bit float channel.
    R16Float,
    /// Four 8-bit unsigned normalized channels.
    Rgba8Unorm,
    /// Four 8-bit unsigned normalized channels, sRGB encoded.
    Rgba8UnormSrgb,
    /// Four 8-bit channels in BGRA order.
    Bgra8Unorm,
    /// Four 8-bit channels in BGRA order, sRGB encoded.
    Bgra8UnormSrgb,
    /// Four 16-bit float channels.
    Rgba16Float,
    /// 32-bit float depth.
    Depth32Float,
    /// Depth with at least 24 bits plus an 8-bit stencil plane.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Approximate bytes per texel, used for VRAM accounting.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::R16Float => 2,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8 => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }

    /// Whether the format has a depth aspect.
    pub fn has_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    /// Whether the format has a stencil aspect.
    pub fn has_stencil(self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }
}

bitflags! {
    /// How a texture may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// The texture can be the source of a copy.
        const COPY_SRC = 1 << 0;
        /// The texture can be the destination of a copy or a queue write.
        const COPY_DST = 1 << 1;
        /// The texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// The texture can be used as a storage texture.
        const STORAGE_BINDING = 1 << 3;
        /// The texture can be a color or depth/stencil attachment.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// A 1D texture.
    D1,
    /// A 2D texture (or 2D array / cube source).
    D2,
    /// A 3D texture.
    D3,
}

/// Describes a texture to create.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size of the texture.
    pub size: Extent3D,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Samples per texel.
    pub sample_count: u32,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Texel format.
    pub format: TextureFormat,
    /// Allowed usages.
    pub usage: TextureUsage,
}

/// The dimensionality a view presents to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    /// A 2D view.
    D2,
    /// A 2D array view.
    D2Array,
    /// A cube view over six array layers.
    Cube,
}

/// Which aspect of a texture a view exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageAspect {
    /// Every aspect.
    #[default]
    All,
    /// Only the stencil aspect.
    StencilOnly,
    /// Only the depth aspect.
    DepthOnly,
}

/// Describes a view over a texture.
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// View format override.
    pub format: Option<TextureFormat>,
    /// View dimension override.
    pub dimension: Option<TextureViewDimension>,
    /// Which aspect the view exposes.
    pub aspect: ImageAspect,
    /// First visible mip level.
    pub base_mip_level: u32,
    /// Number of visible mip levels, all remaining when `None`.
    pub mip_level_count: Option<u32>,
    /// First visible array layer.
    pub base_array_layer: u32,
    /// Number of visible array layers, all remaining when `None`.
    pub array_layer_count: Option<u32>,
}

/// Describes a CPU-to-texture upload region.
#[derive(Debug, Clone, Copy)]
pub struct ImageDataLayout {
    /// Offset of the first texel in the source data.
    pub offset: u64,
    /// Bytes between rows.
    pub bytes_per_row: Option<u32>,
    /// Rows between images.
    pub rows_per_image: Option<u32>,
}

/// The destination of a texture write.
#[derive(Debug, Clone, Copy)]
pub struct TextureCopyTarget {
    /// The texture written to.
    pub texture: TextureId,
    /// The mip level written to.
    pub mip_level: u32,
    /// The texel origin of the write.
    pub origin: Origin3D,
}

// --- Samplers ---

/// Out-of-range texture coordinate behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Repeat the texture.
    Repeat,
    /// Repeat with mirroring.
    MirrorRepeat,
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    #[default]
    Nearest,
    /// Linear interpolation.
    Linear,
}

/// Describes a sampler.
#[derive(Debug, Clone, Default)]
pub struct SamplerDescriptor<'a> {
    /// A debug label.
    pub label: Option<Cow<'a, str>>,
    /// Address mode for U.
    pub address_mode_u: AddressMode,
    /// Address mode for V.
    pub address_mode_v: AddressMode,
    /// Address mode for W.
    pub address_mode_w: AddressMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Filter between mip levels.
    pub mipmap_filter: FilterMode,
}

// --- Shaders ---

/// Shader source handed to the device. Compilation is the backend's job.
#[derive(Debug, Clone)]
pub enum ShaderSourceData<'a> {
    /// WGSL source text.
    Wgsl(Cow<'a, str>),
}

/// Describes a shader module.
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// A debug label.
    pub label: Option<&'a str>,
    /// The source of the module.
    pub source: ShaderSourceData<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_stencil_format_aspects() {
        assert!(TextureFormat::Depth24PlusStencil8.has_depth());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert!(TextureFormat::Depth32Float.has_depth());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(!TextureFormat::Rgba16Float.has_depth());
    }

    #[test]
    fn test_usage_flags_combine() {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        assert!(usage.contains(TextureUsage::TEXTURE_BINDING));
        assert!(!usage.contains(TextureUsage::COPY_DST));
    }
}
