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

//! Rendering lane: the deferred pipeline hot path.

use umbra_core::renderer::RenderError;

mod config;
mod deferred_lane;
mod draw_queue;
mod frame;
mod frame_buffers;
mod hazards;
mod lane_resources;
mod layout_registry;
mod post_chain;
mod quality;
mod scene;
mod session;
mod shader_library;
pub mod shaders;

pub use config::*;
pub use deferred_lane::*;
pub use draw_queue::*;
pub use frame::{FrameStats, PresentTarget};
pub use frame_buffers::*;
pub use hazards::*;
pub use lane_resources::NOISE_TILE_SIZE;
pub use layout_registry::*;
pub use post_chain::*;
pub use quality::*;
pub use scene::*;
pub use session::*;
pub use shader_library::*;

/// A rendering strategy.
///
/// A lane records every GPU command of a frame into the session's device.
/// It never acquires or presents the target image; the caller owns both.
pub trait RenderLane: Send + Sync {
    /// Returns a human-readable identifier for this rendering strategy.
    fn strategy_name(&self) -> &'static str;

    /// Records and submits one frame into `target`.
    fn render(
        &mut self,
        session: &mut RenderSession,
        queue: &DrawQueue,
        buffers: &mut FrameBufferSet,
        target: &PresentTarget,
    ) -> Result<FrameReport, RenderError>;
}
