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

//! Per-frame collection of everything the deferred lane draws.
//!
//! Producers push items during the frame; the lane consumes the queue once
//! and the caller clears it. Static meshes are bucketed by vertex layout and
//! split by opacity at insertion time so the geometry stage walks
//! contiguous, already-sorted lists.

use super::layout_registry::{LayoutRegistry, VertexLayoutTag};
use super::post_chain::PostProcessStage;
use super::scene::PointLight;
use umbra_core::{
    math::Mat4,
    renderer::api::{BufferId, IndexFormat, TextureViewId},
};

/// An 8-bit surface-group mask written to the stencil plane.
///
/// Decals only land on pixels whose stored value equals their filter
/// exactly; there is no partial bit matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilMask(pub u8);

impl StencilMask {
    /// The value used as a stencil reference.
    pub fn reference(self) -> u32 {
        self.0 as u32
    }
}

/// Whether an item is drawn in the opaque or the stippled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opacity {
    /// Alpha of at least 1.
    Opaque,
    /// Any other alpha, NaN included.
    Transparent,
}

impl Opacity {
    /// Classifies an alpha value.
    pub fn from_alpha(alpha: f32) -> Self {
        if alpha >= 1.0 {
            Opacity::Opaque
        } else {
            Opacity::Transparent
        }
    }
}

/// GPU geometry of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    /// Vertex buffer, bound at slot 0.
    pub vertex_buffer: BufferId,
    /// Index buffer.
    pub index_buffer: BufferId,
    /// Index element format.
    pub index_format: IndexFormat,
    /// Number of indices.
    pub index_count: u32,
    /// Raw vertex layout tag, see [`VertexLayoutTag`].
    pub layout_tag: u32,
}

/// A static mesh instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticDrawItem {
    /// The mesh.
    pub mesh: GpuMesh,
    /// Object to world.
    pub transform: Mat4,
    /// Surface group written to the stencil plane.
    pub group_mask: StencilMask,
    /// Opacity, 1 and above is opaque.
    pub alpha: f32,
}

/// Bone matrices of a skinned item, optionally blended between two frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneFrames {
    /// Storage buffer with the bone matrices of the primary frame.
    pub primary: BufferId,
    /// Storage buffer with the bone matrices of the secondary frame.
    pub secondary: Option<BufferId>,
    /// Blend factor toward `secondary`, in `[0, 1]`.
    pub blend: f32,
}

impl BoneFrames {
    /// A single frame, no blending.
    pub fn single(primary: BufferId) -> Self {
        Self {
            primary,
            secondary: None,
            blend: 0.0,
        }
    }

    /// The buffer bound as the secondary frame; the primary one when there is
    /// no secondary.
    pub fn secondary_or_primary(&self) -> BufferId {
        self.secondary.unwrap_or(self.primary)
    }

    /// The effective blend factor.
    pub fn effective_blend(&self) -> f32 {
        match self.secondary {
            Some(_) => self.blend.clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}

/// A skinned mesh instance. Skinned meshes always use the skinned vertex
/// layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinnedItem {
    /// The mesh.
    pub mesh: GpuMesh,
    /// Object to world.
    pub transform: Mat4,
    /// Surface group written to the stencil plane.
    pub group_mask: StencilMask,
    /// Opacity.
    pub alpha: f32,
    /// Bone matrices.
    pub bone_frames: BoneFrames,
}

/// A projected decal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecalItem {
    /// Albedo texture, blended with straight alpha.
    pub albedo: TextureViewId,
    /// Normal map texture.
    pub normal_map: TextureViewId,
    /// Maps the unit cube to the decal volume in world space.
    pub transform: Mat4,
    /// Only pixels whose stencil value equals this mask receive the decal.
    pub filter: StencilMask,
}

/// Items queued for one frame.
#[derive(Debug, Default)]
pub struct DrawQueue {
    static_opaque: [Vec<StaticDrawItem>; VertexLayoutTag::COUNT],
    static_transparent: [Vec<StaticDrawItem>; VertexLayoutTag::COUNT],
    skinned_opaque: Vec<SkinnedItem>,
    skinned_transparent: Vec<SkinnedItem>,
    decals: Vec<DecalItem>,
    post_stages: Vec<PostProcessStage>,
    point_lights: Vec<PointLight>,
    rejected_static: usize,
}

impl DrawQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a static mesh.
    ///
    /// Returns `false`, and drops the item, when its layout tag is not
    /// recognized.
    pub fn push_static_mesh(
        &mut self,
        mesh: GpuMesh,
        transform: Mat4,
        group_mask: StencilMask,
        alpha: f32,
    ) -> bool {
        let Some(entry) = LayoutRegistry::standard().lookup(mesh.layout_tag) else {
            log::trace!(
                "Dropping static mesh with unrecognized layout tag {}",
                mesh.layout_tag
            );
            self.rejected_static += 1;
            return false;
        };
        let item = StaticDrawItem {
            mesh,
            transform,
            group_mask,
            alpha,
        };
        match Opacity::from_alpha(item.alpha) {
            Opacity::Opaque => self.static_opaque[entry.bucket].push(item),
            Opacity::Transparent => self.static_transparent[entry.bucket].push(item),
        }
        true
    }

    /// Queues a skinned mesh.
    pub fn push_skinned_item(&mut self, item: SkinnedItem) {
        match Opacity::from_alpha(item.alpha) {
            Opacity::Opaque => self.skinned_opaque.push(item),
            Opacity::Transparent => self.skinned_transparent.push(item),
        }
    }

    /// Queues a decal.
    pub fn push_decal(
        &mut self,
        albedo: TextureViewId,
        normal_map: TextureViewId,
        transform: Mat4,
        filter: StencilMask,
    ) {
        self.decals.push(DecalItem {
            albedo,
            normal_map,
            transform,
            filter,
        });
    }

    /// Appends a post-process stage. Stages run in insertion order.
    pub fn push_post_process_stage(&mut self, stage: PostProcessStage) {
        self.post_stages.push(stage);
    }

    /// Queues a point light.
    pub fn push_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    /// Empties every list. Capacity is kept for the next frame.
    pub fn clear(&mut self) {
        for bucket in self
            .static_opaque
            .iter_mut()
            .chain(self.static_transparent.iter_mut())
        {
            bucket.clear();
        }
        self.skinned_opaque.clear();
        self.skinned_transparent.clear();
        self.decals.clear();
        self.post_stages.clear();
        self.point_lights.clear();
        self.rejected_static = 0;
    }

    /// Static meshes of one layout and opacity.
    pub fn static_items(&self, tag: VertexLayoutTag, opacity: Opacity) -> &[StaticDrawItem] {
        let bucket = tag as usize;
        match opacity {
            Opacity::Opaque => &self.static_opaque[bucket],
            Opacity::Transparent => &self.static_transparent[bucket],
        }
    }

    /// Skinned meshes of one opacity.
    pub fn skinned_items(&self, opacity: Opacity) -> &[SkinnedItem] {
        match opacity {
            Opacity::Opaque => &self.skinned_opaque,
            Opacity::Transparent => &self.skinned_transparent,
        }
    }

    /// Decals, in insertion order.
    pub fn decals(&self) -> &[DecalItem] {
        &self.decals
    }

    /// Post-process stages, in execution order.
    pub fn post_stages(&self) -> &[PostProcessStage] {
        &self.post_stages
    }

    /// Point lights.
    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    /// Number of static meshes dropped this frame for an unknown layout.
    pub fn rejected_static_count(&self) -> usize {
        self.rejected_static
    }

    /// Total number of static meshes queued.
    pub fn static_count(&self) -> usize {
        self.static_opaque
            .iter()
            .chain(self.static_transparent.iter())
            .map(Vec::len)
            .sum()
    }

    /// Total number of queued entries of every category.
    pub fn len(&self) -> usize {
        self.static_count()
            + self.skinned_opaque.len()
            + self.skinned_transparent.len()
            + self.decals.len()
            + self.post_stages.len()
            + self.point_lights.len()
    }

    /// Whether nothing at all is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(layout_tag: u32) -> GpuMesh {
        GpuMesh {
            vertex_buffer: BufferId(1),
            index_buffer: BufferId(2),
            index_format: IndexFormat::Uint16,
            index_count: 6,
            layout_tag,
        }
    }

    fn push(queue: &mut DrawQueue, layout_tag: u32, alpha: f32) -> bool {
        queue.push_static_mesh(mesh(layout_tag), Mat4::IDENTITY, StencilMask(1), alpha)
    }

    #[test]
    fn test_opacity_boundary() {
        assert_eq!(Opacity::from_alpha(1.0), Opacity::Opaque);
        assert_eq!(Opacity::from_alpha(2.0), Opacity::Opaque);
        assert_eq!(Opacity::from_alpha(0.999), Opacity::Transparent);
        assert_eq!(Opacity::from_alpha(f32::NAN), Opacity::Transparent);
    }

    #[test]
    fn test_static_items_are_bucketed_by_layout_and_opacity() {
        let mut queue = DrawQueue::new();
        assert!(push(&mut queue, 0, 1.0));
        assert!(push(&mut queue, 2, 0.5));
        assert!(push(&mut queue, 2, 1.0));

        assert_eq!(queue.static_items(VertexLayoutTag::Basic, Opacity::Opaque).len(), 1);
        assert_eq!(
            queue.static_items(VertexLayoutTag::Lightmapped, Opacity::Transparent).len(),
            1
        );
        assert_eq!(
            queue.static_items(VertexLayoutTag::Lightmapped, Opacity::Opaque).len(),
            1
        );
        assert!(queue.static_items(VertexLayoutTag::Tangent, Opacity::Opaque).is_empty());
        assert_eq!(queue.static_count(), 3);
    }

    #[test]
    fn test_unrecognized_layout_is_dropped() {
        let mut queue = DrawQueue::new();
        assert!(!push(&mut queue, 42, 1.0));
        assert_eq!(queue.static_count(), 0);
        assert_eq!(queue.rejected_static_count(), 1);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut queue = DrawQueue::new();
        push(&mut queue, 1, 0.2);
        queue.push_skinned_item(SkinnedItem {
            mesh: mesh(0),
            transform: Mat4::IDENTITY,
            group_mask: StencilMask(2),
            alpha: 1.0,
            bone_frames: BoneFrames::single(BufferId(9)),
        });
        queue.push_decal(
            TextureViewId(1),
            TextureViewId(2),
            Mat4::IDENTITY,
            StencilMask(2),
        );
        assert_eq!(queue.len(), 3);
        assert!(!queue.is_empty());
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bone_frames_without_secondary_never_blend() {
        let frames = BoneFrames {
            primary: BufferId(3),
            secondary: None,
            blend: 0.7,
        };
        assert_eq!(frames.effective_blend(), 0.0);
        assert_eq!(frames.secondary_or_primary(), BufferId(3));

        let blended = BoneFrames {
            secondary: Some(BufferId(4)),
            blend: 1.5,
            ..frames
        };
        assert_eq!(blended.effective_blend(), 1.0);
    }
}
