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

//! Built-in WGSL sources of the deferred pipeline.
//!
//! Every module that reads the scene constants is prefixed with
//! `common.wgsl`; geometry modules also carry the per-draw declarations of
//! `draw.wgsl`. The prefixing happens at compile time with `concat!`, so each
//! constant is a complete, self-contained module.
//!
//! # Available Shaders
//!
//! - [`FULLSCREEN_WGSL`] - Full-screen triangle vertex stage
//! - [`GEOMETRY_WGSL`] - Static geometry, one vertex entry point per layout
//! - [`SKINNED_GEOMETRY_WGSL`] - Skinned geometry with two blended bone frames
//! - [`DECAL_WGSL`] - Projected decal volumes
//! - [`AMBIENT_OCCLUSION_WGSL`] - Hemisphere ambient occlusion
//! - [`AMBIENT_OCCLUSION_BLUR_WGSL`] - Ambient occlusion smoothing
//! - [`LIGHTING_WGSL`] - The eight lighting resolve variants
//! - [`TONEMAP_WGSL`] - Tone mapping post stage
//! - [`FOG_WGSL`] - Distance fog post stage

/// Vertex stage shared by every full-screen pass (`vs_fullscreen`).
pub const FULLSCREEN_WGSL: &str = include_str!("fullscreen.wgsl");

/// Static geometry: `vs_basic`, `vs_tangent`, `vs_lightmapped`, plus the
/// `fs_opaque` and alpha-stippled `fs_stippled` fragment stages.
pub const GEOMETRY_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("draw.wgsl"),
    include_str!("geometry.wgsl")
);

/// Skinned geometry: `vs_skinned` with the shared fragment stages.
pub const SKINNED_GEOMETRY_WGSL: &str = concat!(
    include_str!("common.wgsl"),
    include_str!("draw.wgsl"),
    include_str!("skinned.wgsl")
);

/// Decal volumes: `vs_decal` and `fs_decal`.
pub const DECAL_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("decal.wgsl"));

/// Ambient occlusion: `fs_ambient_occlusion`.
pub const AMBIENT_OCCLUSION_WGSL: &str =
    concat!(include_str!("common.wgsl"), include_str!("ao.wgsl"));

/// Ambient occlusion smoothing: `fs_ambient_occlusion_blur`.
pub const AMBIENT_OCCLUSION_BLUR_WGSL: &str = include_str!("ao_blur.wgsl");

/// Lighting resolve. Entry points follow `fs_lighting_<tier>[_ao]`.
pub const LIGHTING_WGSL: &str =
    concat!(include_str!("common.wgsl"), include_str!("lighting.wgsl"));

/// ACES tone mapping post stage: `fs_tonemap`. Constants: exposure.
pub const TONEMAP_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("tonemap.wgsl"));

/// Exponential fog post stage: `fs_fog`. Constants: color, density, start.
pub const FOG_WGSL: &str = concat!(include_str!("common.wgsl"), include_str!("fog.wgsl"));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::{quality::LightingVariant, LayoutRegistry};

    #[test]
    fn test_fullscreen_shader_valid() {
        assert!(FULLSCREEN_WGSL.contains("@vertex"));
        assert!(FULLSCREEN_WGSL.contains("fn vs_fullscreen"));
    }

    #[test]
    fn test_geometry_shader_has_every_layout_entry_point() {
        assert!(GEOMETRY_WGSL.contains("@vertex"));
        assert!(GEOMETRY_WGSL.contains("@fragment"));
        for entry in LayoutRegistry::standard().entries() {
            assert!(
                GEOMETRY_WGSL.contains(&format!("fn {}(", entry.vertex_entry_point)),
                "missing {}",
                entry.vertex_entry_point
            );
        }
        assert!(GEOMETRY_WGSL.contains("fn fs_opaque("));
        assert!(GEOMETRY_WGSL.contains("fn fs_stippled("));
    }

    #[test]
    fn test_skinned_shader_valid() {
        assert!(SKINNED_GEOMETRY_WGSL.contains("@vertex"));
        assert!(SKINNED_GEOMETRY_WGSL.contains("fn vs_skinned("));
        assert!(SKINNED_GEOMETRY_WGSL.contains("secondary_bones"));
    }

    #[test]
    fn test_decal_shader_valid() {
        assert!(DECAL_WGSL.contains("@vertex"));
        assert!(DECAL_WGSL.contains("@fragment"));
        assert!(DECAL_WGSL.contains("struct SceneConstants"));
    }

    #[test]
    fn test_ambient_occlusion_shaders_valid() {
        assert!(AMBIENT_OCCLUSION_WGSL.contains("fn fs_ambient_occlusion("));
        assert!(AMBIENT_OCCLUSION_BLUR_WGSL.contains("fn fs_ambient_occlusion_blur("));
    }

    #[test]
    fn test_lighting_shader_has_every_variant() {
        for variant in LightingVariant::ALL {
            assert!(
                LIGHTING_WGSL.contains(&format!("fn {}(", variant.entry_point())),
                "missing {}",
                variant.entry_point()
            );
        }
    }

    #[test]
    fn test_post_shaders_valid() {
        assert!(TONEMAP_WGSL.contains("fn fs_tonemap("));
        assert!(FOG_WGSL.contains("fn fs_fog("));
    }
}
