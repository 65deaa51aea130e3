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

//! The closed set of vertex layouts the geometry stage can rasterize.
//!
//! Static meshes carry a raw layout tag assigned by the asset pipeline. The
//! registry maps every recognized tag to its vertex buffer layout, the draw
//! queue bucket it sorts into, and the vertex entry point of the geometry
//! shader. Unknown tags have no entry and are never drawn.

use umbra_core::renderer::api::{
    VertexAttributeDescriptor, VertexBufferLayoutDescriptor, VertexFormat, VertexStepMode,
};
use std::borrow::Cow;

/// A recognized static vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexLayoutTag {
    /// Position, normal, texture coordinates.
    Basic,
    /// Position, normal, tangent, texture coordinates.
    Tangent,
    /// Position, normal, texture coordinates, lightmap coordinates.
    Lightmapped,
}

impl VertexLayoutTag {
    /// Number of recognized layouts.
    pub const COUNT: usize = 3;

    /// Every layout, in bucket order.
    pub const ALL: [VertexLayoutTag; Self::COUNT] = [
        VertexLayoutTag::Basic,
        VertexLayoutTag::Tangent,
        VertexLayoutTag::Lightmapped,
    ];

    /// Resolves a raw tag. Returns `None` for unrecognized values.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(VertexLayoutTag::Basic),
            1 => Some(VertexLayoutTag::Tangent),
            2 => Some(VertexLayoutTag::Lightmapped),
            _ => None,
        }
    }

    /// The raw tag stored on meshes.
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// A short label for pipeline names.
    pub const fn label(self) -> &'static str {
        match self {
            VertexLayoutTag::Basic => "basic",
            VertexLayoutTag::Tangent => "tangent",
            VertexLayoutTag::Lightmapped => "lightmapped",
        }
    }
}

/// Everything the lane needs to know about one vertex layout.
#[derive(Debug)]
pub struct LayoutEntry {
    /// The layout this entry describes.
    pub tag: VertexLayoutTag,
    /// Index of the draw queue bucket holding meshes of this layout.
    pub bucket: usize,
    /// The matching vertex entry point of the geometry shader.
    pub vertex_entry_point: &'static str,
    /// The vertex buffer layout bound at slot 0.
    pub vertex_layout: VertexBufferLayoutDescriptor<'static>,
}

const fn attribute(
    shader_location: u32,
    format: VertexFormat,
    offset: u64,
) -> VertexAttributeDescriptor {
    VertexAttributeDescriptor {
        shader_location,
        format,
        offset,
    }
}

const BASIC_ATTRIBUTES: [VertexAttributeDescriptor; 3] = [
    attribute(0, VertexFormat::Float32x3, 0),
    attribute(1, VertexFormat::Float32x3, 12),
    attribute(2, VertexFormat::Float32x2, 24),
];

const TANGENT_ATTRIBUTES: [VertexAttributeDescriptor; 4] = [
    attribute(0, VertexFormat::Float32x3, 0),
    attribute(1, VertexFormat::Float32x3, 12),
    attribute(2, VertexFormat::Float32x4, 24),
    attribute(3, VertexFormat::Float32x2, 40),
];

const LIGHTMAPPED_ATTRIBUTES: [VertexAttributeDescriptor; 4] = [
    attribute(0, VertexFormat::Float32x3, 0),
    attribute(1, VertexFormat::Float32x3, 12),
    attribute(2, VertexFormat::Float32x2, 24),
    attribute(3, VertexFormat::Float32x2, 32),
];

const SKINNED_ATTRIBUTES: [VertexAttributeDescriptor; 5] = [
    attribute(0, VertexFormat::Float32x3, 0),
    attribute(1, VertexFormat::Float32x3, 12),
    attribute(2, VertexFormat::Float32x2, 24),
    attribute(3, VertexFormat::Uint8x4, 32),
    attribute(4, VertexFormat::Float32x4, 36),
];

const POSITION_ATTRIBUTES: [VertexAttributeDescriptor; 1] =
    [attribute(0, VertexFormat::Float32x3, 0)];

static STANDARD_LAYOUTS: [LayoutEntry; VertexLayoutTag::COUNT] = [
    LayoutEntry {
        tag: VertexLayoutTag::Basic,
        bucket: 0,
        vertex_entry_point: "vs_basic",
        vertex_layout: VertexBufferLayoutDescriptor {
            array_stride: 32,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&BASIC_ATTRIBUTES),
        },
    },
    LayoutEntry {
        tag: VertexLayoutTag::Tangent,
        bucket: 1,
        vertex_entry_point: "vs_tangent",
        vertex_layout: VertexBufferLayoutDescriptor {
            array_stride: 48,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&TANGENT_ATTRIBUTES),
        },
    },
    LayoutEntry {
        tag: VertexLayoutTag::Lightmapped,
        bucket: 2,
        vertex_entry_point: "vs_lightmapped",
        vertex_layout: VertexBufferLayoutDescriptor {
            array_stride: 40,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&LIGHTMAPPED_ATTRIBUTES),
        },
    },
];

/// Layout of skinned vertices: position, normal, uv, four joint indices and
/// four joint weights.
pub static SKINNED_VERTEX_LAYOUT: VertexBufferLayoutDescriptor<'static> =
    VertexBufferLayoutDescriptor {
        array_stride: 52,
        step_mode: VertexStepMode::Vertex,
        attributes: Cow::Borrowed(&SKINNED_ATTRIBUTES),
    };

/// Position-only layout of the decal volume.
pub static DECAL_VOLUME_LAYOUT: VertexBufferLayoutDescriptor<'static> =
    VertexBufferLayoutDescriptor {
        array_stride: 12,
        step_mode: VertexStepMode::Vertex,
        attributes: Cow::Borrowed(&POSITION_ATTRIBUTES),
    };

/// A table of recognized vertex layouts.
#[derive(Debug)]
pub struct LayoutRegistry {
    entries: &'static [LayoutEntry],
}

/// The registry of every built-in layout.
pub static STANDARD_LAYOUT_REGISTRY: LayoutRegistry = LayoutRegistry {
    entries: &STANDARD_LAYOUTS,
};

impl LayoutRegistry {
    /// The built-in registry.
    pub fn standard() -> &'static LayoutRegistry {
        &STANDARD_LAYOUT_REGISTRY
    }

    /// Looks up the entry for a raw tag.
    pub fn lookup(&self, raw_tag: u32) -> Option<&LayoutEntry> {
        let tag = VertexLayoutTag::from_raw(raw_tag)?;
        self.entry(tag)
    }

    /// The entry of a recognized layout.
    pub fn entry(&self, tag: VertexLayoutTag) -> Option<&LayoutEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    /// All entries, in bucket order.
    pub fn entries(&self) -> &[LayoutEntry] {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tags_have_no_entry() {
        let registry = LayoutRegistry::standard();
        assert!(registry.lookup(3).is_none());
        assert!(registry.lookup(u32::MAX).is_none());
        assert_eq!(
            registry.lookup(1).map(|entry| entry.tag),
            Some(VertexLayoutTag::Tangent)
        );
    }

    #[test]
    fn test_buckets_are_dense_and_ordered() {
        let registry = LayoutRegistry::standard();
        for (index, entry) in registry.entries().iter().enumerate() {
            assert_eq!(entry.bucket, index);
            assert_eq!(VertexLayoutTag::ALL[index], entry.tag);
            assert_eq!(VertexLayoutTag::from_raw(entry.tag.raw()), Some(entry.tag));
        }
    }

    #[test]
    fn test_strides_cover_attributes() {
        let layouts = LayoutRegistry::standard()
            .entries()
            .iter()
            .map(|entry| &entry.vertex_layout)
            .chain([&SKINNED_VERTEX_LAYOUT, &DECAL_VOLUME_LAYOUT]);
        for layout in layouts {
            let end = layout
                .attributes
                .iter()
                .map(|attr| attr.offset + attr.format.size())
                .max()
                .unwrap();
            assert_eq!(end, layout.array_stride);
        }
    }
}
