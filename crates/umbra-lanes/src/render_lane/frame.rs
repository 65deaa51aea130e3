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

//! State shared by the stages of one frame while it is being recorded.

use super::hazards::BindingTracker;
use umbra_core::renderer::{
    api::{
        BindGroupDescriptor, BindGroupId, GpuHook, TextureFormat, TextureViewId,
        WriteDiscardRegion,
    },
    traits::{CommandEncoder, GpuProfiler, GraphicsDevice},
    RenderError,
};

/// The caller-owned image a frame ends in. The lane never presents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentTarget {
    /// View rendered to by the last pass of the frame.
    pub view: TextureViewId,
    /// Format of that view.
    pub format: TextureFormat,
}

/// Counters gathered while recording a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Render passes begun.
    pub render_passes: u32,
    /// Draw calls issued, every stage included.
    pub draw_calls: u32,
    /// Opaque static mesh draws.
    pub static_draws: u32,
    /// Opaque skinned mesh draws.
    pub skinned_draws: u32,
    /// Alpha-stippled draws, static and skinned.
    pub stippled_draws: u32,
    /// Decal volumes drawn.
    pub decals_drawn: u32,
    /// Post-process stages executed.
    pub post_stages: u32,
    /// Point lights queued but not evaluated.
    pub point_lights_skipped: u32,
    /// Whether the ambient occlusion stage ran.
    pub ambient_occlusion_ran: bool,
    /// Whether the anti-aliasing history received this frame's image.
    pub history_updated: bool,
    /// Transient bind groups destroyed at the end of the frame.
    pub bind_groups_released: u32,
}

/// A write-discard region bound through its chunk's bind group and a
/// dynamic offset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DynamicBinding {
    pub bind_group: BindGroupId,
    pub offset: u32,
}

impl DynamicBinding {
    pub(crate) fn from_region(region: WriteDiscardRegion, what: &str) -> Result<Self, RenderError> {
        let bind_group = region.bind_group.ok_or_else(|| {
            RenderError::RenderingFailed(format!("{what} region has no bind group"))
        })?;
        Ok(Self {
            bind_group,
            offset: region.offset,
        })
    }
}

pub(crate) struct FrameContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub encoder: &'a mut dyn CommandEncoder,
    pub profiler: Option<&'a dyn GpuProfiler>,
    pub hazards: BindingTracker,
    pub transient: Vec<BindGroupId>,
    pub stats: FrameStats,
    pub scene: Option<DynamicBinding>,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        device: &'a dyn GraphicsDevice,
        encoder: &'a mut dyn CommandEncoder,
        profiler: Option<&'a dyn GpuProfiler>,
    ) -> Self {
        Self {
            device,
            encoder,
            profiler,
            hazards: BindingTracker::new(),
            transient: Vec::new(),
            stats: FrameStats::default(),
            scene: None,
        }
    }

    pub(crate) fn scene(&self) -> Result<DynamicBinding, RenderError> {
        self.scene.ok_or_else(|| {
            RenderError::RenderingFailed("scene constants were not uploaded".into())
        })
    }

    /// Creates a bind group destroyed when the frame ends.
    pub(crate) fn transient_bind_group(
        &mut self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, RenderError> {
        let bind_group = self
            .device
            .create_bind_group(descriptor)
            .map_err(frame_error)?;
        self.transient.push(bind_group);
        Ok(bind_group)
    }

    pub(crate) fn hook(&mut self, hook: GpuHook) {
        if let Some(profiler) = self.profiler {
            self.encoder.write_timestamp(profiler, hook);
        }
    }

    /// Releases every shader binding of the frame: transient bind groups are
    /// destroyed and the hazard tracker forgets all inputs.
    pub(crate) fn release_bindings(&mut self) {
        let mut released = 0;
        for bind_group in self.transient.drain(..) {
            match self.device.destroy_bind_group(bind_group) {
                Ok(()) => released += 1,
                Err(e) => log::warn!("Failed to destroy transient bind group {bind_group:?}: {e:?}"),
            }
        }
        let inputs = self.hazards.release_frame_inputs();
        self.stats.bind_groups_released = released;
        log::debug!("Released {released} transient bind groups and {inputs} frame inputs");
    }
}

/// Maps a device failure during recording to a frame-aborting error.
pub(crate) fn frame_error(err: umbra_core::renderer::ResourceError) -> RenderError {
    match err {
        umbra_core::renderer::ResourceError::DeviceLost => RenderError::DeviceLost,
        other => RenderError::RenderingFailed(other.to_string()),
    }
}
