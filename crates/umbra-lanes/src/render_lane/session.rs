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

//! The rendering session: the shared GPU context threaded through every call.

use std::sync::Arc;
use umbra_core::renderer::{
    api::TimestampReadback,
    traits::{GpuProfiler, GraphicsDevice},
    RenderError,
};

/// Owns the graphics device handle, the optional GPU profiler and the frame
/// counter.
///
/// Every frame borrows the session mutably, so two frames can never be
/// recorded at the same time.
pub struct RenderSession {
    device: Arc<dyn GraphicsDevice>,
    profiler: Option<Box<dyn GpuProfiler>>,
    frame_index: u64,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("device", &self.device)
            .field("profiler", &self.profiler.is_some())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl RenderSession {
    /// Creates a session without GPU timing.
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            profiler: None,
            frame_index: 0,
        }
    }

    /// Attaches a GPU profiler.
    pub fn with_profiler(mut self, profiler: Box<dyn GpuProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// The graphics device.
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// The GPU profiler, if one is attached.
    pub fn profiler(&self) -> Option<&dyn GpuProfiler> {
        self.profiler.as_deref()
    }

    /// Mutable access to the GPU profiler, for backend-specific teardown.
    pub fn profiler_mut(&mut self) -> Option<&mut dyn GpuProfiler> {
        self.profiler.as_deref_mut()
    }

    /// Index of the next frame to be rendered.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Fails with [`RenderError::DeviceLost`] once the device is gone.
    pub fn ensure_device(&self) -> Result<(), RenderError> {
        if self.device.is_lost() {
            log::error!("Graphics device lost");
            return Err(RenderError::DeviceLost);
        }
        Ok(())
    }

    /// Reads back the timestamps of the previous frame without blocking.
    pub(crate) fn read_previous_timings(&mut self) -> TimestampReadback {
        match self.profiler.as_deref_mut() {
            Some(profiler) => profiler.try_read_previous_frame(),
            None => TimestampReadback::Disabled,
        }
    }

    /// Completes a submitted frame: maps its timestamps when the frame wrote
    /// any, then advances the frame counter.
    pub(crate) fn finish_frame(&mut self, timestamps_written: bool) {
        if timestamps_written {
            if let Some(profiler) = self.profiler.as_deref_mut() {
                profiler.schedule_map_after_submit(self.frame_index);
            }
        }
        self.frame_index += 1;
    }
}
