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

//! Bind group layouts and bind groups.

use crate::renderer::api::resource::{BufferId, SamplerId, TextureViewId, TextureViewDimension};
use bitflags::bitflags;
use std::num::NonZeroU64;

/// An opaque handle to a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupLayoutId(pub usize);

/// An opaque handle to a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupId(pub usize);

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// The vertex stage.
        const VERTEX = 1 << 0;
        /// The fragment stage.
        const FRAGMENT = 1 << 1;
        /// The compute stage.
        const COMPUTE = 1 << 2;
    }
}

/// The kind of buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBindingType {
    /// A uniform buffer.
    Uniform,
    /// A storage buffer.
    Storage {
        /// Whether the shader may only read from it.
        read_only: bool,
    },
}

/// The sample type a shader expects from a texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    /// Float texels.
    Float {
        /// Whether a filtering sampler may be used.
        filterable: bool,
    },
    /// Depth texels.
    Depth,
    /// Unsigned integer texels.
    Uint,
}

/// The kind of sampler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBindingType {
    /// A filtering sampler.
    Filtering,
    /// A non-filtering sampler.
    NonFiltering,
}

/// The type of a single binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A buffer binding.
    Buffer {
        /// Uniform or storage.
        ty: BufferBindingType,
        /// Whether the bind call supplies an offset.
        has_dynamic_offset: bool,
        /// The minimum size the bound range must have.
        min_binding_size: Option<NonZeroU64>,
    },
    /// A sampled texture.
    Texture {
        /// The expected sample type.
        sample_type: TextureSampleType,
        /// The expected view dimension.
        view_dimension: TextureViewDimension,
        /// Whether the texture is multisampled.
        multisampled: bool,
    },
    /// A sampler.
    Sampler(SamplerBindingType),
}

/// One entry of a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// The binding index in the shader.
    pub binding: u32,
    /// Visible stages.
    pub visibility: ShaderStageFlags,
    /// The binding type.
    pub ty: BindingType,
}

/// Describes a bind group layout.
#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// A debug label.
    pub label: Option<&'a str>,
    /// The entries of the layout.
    pub entries: &'a [BindGroupLayoutEntry],
}

/// A range of a buffer bound to a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// The bound buffer.
    pub buffer: BufferId,
    /// Start of the range.
    pub offset: u64,
    /// Size of the range, the rest of the buffer when `None`.
    pub size: Option<NonZeroU64>,
}

/// A resource bound at one binding index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    /// A buffer range.
    Buffer(BufferBinding),
    /// A texture view.
    TextureView(TextureViewId),
    /// A sampler.
    Sampler(SamplerId),
}

/// One entry of a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    /// The binding index.
    pub binding: u32,
    /// The bound resource.
    pub resource: BindingResource,
}

/// Describes a bind group.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// A debug label.
    pub label: Option<&'a str>,
    /// The layout the group conforms to.
    pub layout: BindGroupLayoutId,
    /// The bound resources.
    pub entries: &'a [BindGroupEntry],
}

impl BindGroupLayoutEntry {
    /// A uniform buffer visible to the given stages.
    pub const fn uniform(binding: u32, visibility: ShaderStageFlags, dynamic: bool) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
        }
    }

    /// A read-only storage buffer visible to the given stages.
    pub const fn storage(binding: u32, visibility: ShaderStageFlags) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    /// A 2D texture visible to the fragment stage.
    pub const fn texture_2d(binding: u32, sample_type: TextureSampleType) -> Self {
        Self::texture(binding, sample_type, TextureViewDimension::D2)
    }

    /// A texture of any view dimension visible to the fragment stage.
    pub const fn texture(
        binding: u32,
        sample_type: TextureSampleType,
        view_dimension: TextureViewDimension,
    ) -> Self {
        Self {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled: false,
            },
        }
    }

    /// A sampler visible to the fragment stage.
    pub const fn sampler(binding: u32, ty: SamplerBindingType) -> Self {
        Self {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler(ty),
        }
    }
}

impl BindGroupEntry {
    /// Binds a whole buffer, or a `size`-byte window starting at `offset`.
    pub fn buffer(binding: u32, buffer: BufferId, offset: u64, size: Option<u64>) -> Self {
        Self {
            binding,
            resource: BindingResource::Buffer(BufferBinding {
                buffer,
                offset,
                size: size.and_then(NonZeroU64::new),
            }),
        }
    }

    /// Binds a texture view.
    pub fn texture(binding: u32, view: TextureViewId) -> Self {
        Self {
            binding,
            resource: BindingResource::TextureView(view),
        }
    }

    /// Binds a sampler.
    pub fn sampler(binding: u32, sampler: SamplerId) -> Self {
        Self {
            binding,
            resource: BindingResource::Sampler(sampler),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_buffer_binding_means_whole_buffer() {
        let entry = BindGroupEntry::buffer(0, BufferId(3), 0, Some(0));
        match entry.resource {
            BindingResource::Buffer(binding) => assert!(binding.size.is_none()),
            other => panic!("unexpected resource {other:?}"),
        }
    }

    #[test]
    fn test_texture_layout_entry_is_fragment_only() {
        let entry = BindGroupLayoutEntry::texture_2d(2, TextureSampleType::Depth);
        assert_eq!(entry.visibility, ShaderStageFlags::FRAGMENT);
        assert_eq!(entry.binding, 2);
    }
}
