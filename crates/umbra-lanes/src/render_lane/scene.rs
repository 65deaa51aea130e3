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

//! Per-frame and per-draw shader constants, camera state and scene inputs.

use bytemuck::{Pod, Zeroable};
use umbra_core::math::{LinearRgba, Mat4, Vec2, Vec3, Vec4};
use umbra_core::renderer::api::TextureViewId;

/// Number of distinct jitter offsets before the sequence repeats.
pub const JITTER_SEQUENCE_LENGTH: u64 = 8;

/// `SceneConstants::flags` bit set when ambient occlusion is applied.
pub const SCENE_FLAG_AMBIENT_OCCLUSION: u32 = 1 << 0;
/// `SceneConstants::flags` bit set when anti-aliasing history is active.
pub const SCENE_FLAG_ANTI_ALIASING: u32 = 1 << 1;

/// The camera the frame is rendered from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform, before jitter.
    pub projection: Mat4,
    /// World-space camera position.
    pub position: Vec3,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

impl CameraState {
    /// Builds a camera, deriving the position from the view transform.
    pub fn from_view(view: Mat4, projection: Mat4) -> Self {
        Self {
            view,
            projection,
            position: view.inverse().w_axis.truncate(),
        }
    }
}

/// Radical inverse of `index` in `base`, the Halton low-discrepancy sequence.
pub(crate) fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut fraction = 1.0f32 / base as f32;
    while index > 0 {
        result += (index % base) as f32 * fraction;
        index /= base;
        fraction /= base as f32;
    }
    result
}

/// Sub-pixel projection offset for `frame_index`, in normalized device
/// coordinates.
pub fn jitter_offset(frame_index: u64, width: u32, height: u32) -> Vec2 {
    let sample = (frame_index % JITTER_SEQUENCE_LENGTH) as u32 + 1;
    let pixel = Vec2::new(halton(sample, 2) - 0.5, halton(sample, 3) - 0.5);
    Vec2::new(
        pixel.x * 2.0 / width.max(1) as f32,
        pixel.y * 2.0 / height.max(1) as f32,
    )
}

/// Applies a clip-space offset to `projection`.
pub fn jittered_projection(projection: Mat4, jitter: Vec2) -> Mat4 {
    Mat4::from_translation(Vec3::new(jitter.x, jitter.y, 0.0)) * projection
}

/// Frame-wide shader constants, bound at group 0 of every stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneConstants {
    /// World to view.
    pub view: [[f32; 4]; 4],
    /// Jittered view to clip.
    pub projection: [[f32; 4]; 4],
    /// Jittered world to clip.
    pub view_projection: [[f32; 4]; 4],
    /// Clip to world, used to rebuild positions from depth.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Camera position, `w` is 1.
    pub camera_position: [f32; 4],
    /// Width, height, 1/width, 1/height of the output.
    pub viewport: [f32; 4],
    /// The jitter applied this frame.
    pub jitter: [f32; 2],
    /// Number of mip levels of the reflection environment.
    pub convolution_steps: u32,
    /// `SCENE_FLAG_*` bits.
    pub flags: u32,
}

impl SceneConstants {
    /// Builds the constants for one frame.
    pub fn new(
        camera: &CameraState,
        width: u32,
        height: u32,
        jitter: Vec2,
        convolution_steps: u32,
        flags: u32,
    ) -> Self {
        let projection = jittered_projection(camera.projection, jitter);
        let view_projection = projection * camera.view;
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view: camera.view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
            inverse_view_projection: view_projection.inverse().to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            viewport: [w, h, 1.0 / w, 1.0 / h],
            jitter: jitter.to_array(),
            convolution_steps,
            flags,
        }
    }
}

/// Per-draw shader constants, bound at group 1 with a dynamic offset.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawConstants {
    /// Object to world.
    pub world: [[f32; 4]; 4],
    /// World to object, used by decal projection.
    pub inverse_world: [[f32; 4]; 4],
    /// Alpha, bone frame blend, stencil value, unused.
    pub params: [f32; 4],
}

impl DrawConstants {
    /// Builds the constants of one draw.
    pub fn new(world: Mat4, alpha: f32, bone_blend: f32, stencil: u8) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            inverse_world: world.inverse().to_cols_array_2d(),
            params: [alpha, bone_blend, stencil as f32, 0.0],
        }
    }

    /// The object to world transform.
    pub fn world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world)
    }

    /// The draw's alpha.
    pub fn alpha(&self) -> f32 {
        self.params[0]
    }
}

/// A point light submitted with the scene.
///
/// Point lights are accepted by the draw queue and counted in the frame
/// report, but the lighting resolve only evaluates the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World-space position.
    pub position: Vec3,
    /// Influence radius.
    pub radius: f32,
    /// Linear color.
    pub color: LinearRgba,
    /// Intensity multiplier.
    pub intensity: f32,
}

impl PointLight {
    /// Packs the light as `(position, radius)`, for debug overlays.
    pub fn position_radius(&self) -> Vec4 {
        self.position.extend(self.radius)
    }
}

/// The image-based lighting inputs of the lighting resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentMaps {
    /// Diffuse irradiance cube view.
    pub irradiance: TextureViewId,
    /// Prefiltered specular reflection cube view.
    pub reflection: TextureViewId,
    /// Mip levels of the reflection cube.
    pub convolution_steps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_block_sizes() {
        assert_eq!(std::mem::size_of::<SceneConstants>(), 304);
        assert_eq!(std::mem::size_of::<DrawConstants>(), 144);
    }

    #[test]
    fn test_halton_sequence() {
        assert_relative_eq!(halton(1, 2), 0.5);
        assert_relative_eq!(halton(2, 2), 0.25);
        assert_relative_eq!(halton(3, 2), 0.75);
        assert_relative_eq!(halton(1, 3), 1.0 / 3.0);
    }

    #[test]
    fn test_jitter_stays_within_one_pixel() {
        for frame in 0..2 * JITTER_SEQUENCE_LENGTH {
            let jitter = jitter_offset(frame, 64, 32);
            assert!(jitter.x.abs() <= 1.0 / 64.0);
            assert!(jitter.y.abs() <= 1.0 / 32.0);
        }
        assert_eq!(
            jitter_offset(3, 64, 32),
            jitter_offset(3 + JITTER_SEQUENCE_LENGTH, 64, 32)
        );
    }

    #[test]
    fn test_camera_position_from_view() {
        let camera = CameraState::from_view(
            Mat4::look_at_rh(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y),
            Mat4::IDENTITY,
        );
        let position = camera.position;
        assert_relative_eq!(position.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(position.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(position.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_draw_constants_round_trip_world() {
        let world = Mat4::from_translation(Vec3::new(4.0, 5.0, 0.0));
        let constants = DrawConstants::new(world, 0.5, 0.0, 0x02);
        assert_eq!(constants.world(), world);
        assert_eq!(constants.params[2], 2.0);
        assert_eq!(constants.alpha(), 0.5);
    }
}
