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

use crate::math::Extent3D;
use crate::renderer::api::bind_group::BindGroupId;
use crate::renderer::api::command::{CommandBufferId, RenderPassDescriptor};
use crate::renderer::api::core::GpuHook;
use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::resource::{BufferId, IndexFormat, TextureId};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GpuProfiler;
use std::any::Any;
use std::ops::Range;

/// An active render pass, used for recording draw commands.
///
/// Obtained from a [`CommandEncoder`]; the `'pass` lifetime keeps the pass
/// from outliving the encoder that created it. The pass ends when dropped.
pub trait RenderPass<'pass> {
    /// Sets the active render pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a bind group at `index`, with one offset per dynamic binding.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]);

    /// Binds a vertex buffer to a slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Sets the stencil reference used by subsequent draws.
    fn set_stencil_reference(&mut self, reference: u32);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

/// Records a sequence of GPU commands into a command buffer.
///
/// Only one pass can be active at a time: the returned [`RenderPass`]
/// borrows the encoder mutably.
pub trait CommandEncoder: Send {
    /// Begins a new render pass.
    ///
    /// ## Errors
    /// Fails when an attachment view is unknown to the device, or when the
    /// device was lost.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn RenderPass<'encoder> + 'encoder>, ResourceError>;

    /// Copies the first mip level of `source` into `destination`.
    fn copy_texture_to_texture(
        &mut self,
        source: TextureId,
        destination: TextureId,
        size: Extent3D,
    ) -> Result<(), ResourceError>;

    /// Writes the timestamp of `hook` through `profiler`.
    ///
    /// Backends that cannot honour the request skip it.
    fn write_timestamp(&mut self, profiler: &dyn GpuProfiler, hook: GpuHook);

    /// Finalizes recording and returns the command buffer handle to submit.
    fn finish(self: Box<Self>) -> Result<CommandBufferId, ResourceError>;

    /// Returns the encoder as `Any` for backend-specific downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
