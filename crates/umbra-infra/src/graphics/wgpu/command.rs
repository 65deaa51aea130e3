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

use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

use umbra_core::math::Extent3D;
use umbra_core::renderer::api::bind_group::BindGroupId;
use umbra_core::renderer::api::command::{CommandBufferId, RenderPassDescriptor};
use umbra_core::renderer::api::core::GpuHook;
use umbra_core::renderer::api::pipeline::RenderPipelineId;
use umbra_core::renderer::api::resource::{BufferId, IndexFormat, TextureId, TextureViewId};
use umbra_core::renderer::traits::{CommandEncoder, GpuProfiler, RenderPass};
use umbra_core::renderer::ResourceError;

use super::conversions::IntoWgpu;
use super::device::WgpuDevice;
use super::profiler::WgpuTimestampProfiler;

/// A recording render pass. Handles are resolved against the device
/// registry as commands are recorded.
pub struct WgpuRenderPass<'a> {
    pub(crate) pass: wgpu::RenderPass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl<'pass> RenderPass<'pass> for WgpuRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline_id: RenderPipelineId) {
        if let Some(pipeline) = self.device.get_wgpu_render_pipeline(pipeline_id) {
            self.pass.set_pipeline(&pipeline);
        } else {
            log::warn!("WgpuRenderPass: RenderPipelineId {pipeline_id:?} not found.");
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group_id: BindGroupId, offsets: &[u32]) {
        if let Some(bind_group) = self.device.get_wgpu_bind_group(bind_group_id) {
            self.pass.set_bind_group(index, bind_group.as_ref(), offsets);
        } else {
            log::warn!("WgpuRenderPass: BindGroupId {bind_group_id:?} not found.");
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer_id: BufferId, offset: u64) {
        if let Some(buffer) = self.device.get_wgpu_buffer(buffer_id) {
            self.pass.set_vertex_buffer(slot, buffer.slice(offset..));
        } else {
            log::warn!("WgpuRenderPass: Vertex BufferId {buffer_id:?} not found.");
        }
    }

    fn set_index_buffer(&mut self, buffer_id: BufferId, offset: u64, index_format: IndexFormat) {
        if let Some(buffer) = self.device.get_wgpu_buffer(buffer_id) {
            self.pass
                .set_index_buffer(buffer.slice(offset..), index_format.into_wgpu());
        } else {
            log::warn!("WgpuRenderPass: Index BufferId {buffer_id:?} not found.");
        }
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.pass.set_stencil_reference(reference);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.draw(vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }
}

/// Records commands into a `wgpu::CommandEncoder`.
pub struct WgpuCommandEncoder {
    pub(crate) encoder: Option<wgpu::CommandEncoder>,
    pub(crate) device: WgpuDevice,
}

impl WgpuCommandEncoder {
    /// Provides mutable access to the underlying `wgpu::CommandEncoder`, for
    /// backend work such as resolving timestamp queries.
    /// Returns `None` if the encoder has already been consumed by `finish()`.
    pub fn wgpu_encoder_mut(&mut self) -> Option<&mut wgpu::CommandEncoder> {
        self.encoder.as_mut()
    }

    fn view(&self, id: TextureViewId) -> Result<Arc<wgpu::TextureView>, ResourceError> {
        self.device.get_wgpu_texture_view(id).ok_or_else(|| {
            log::error!("WgpuCommandEncoder: TextureViewId {id:?} not found.");
            ResourceError::NotFound
        })
    }
}

fn consumed() -> ResourceError {
    ResourceError::BackendError("command encoder already finished".to_string())
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn RenderPass<'encoder> + 'encoder>, ResourceError> {
        if self.device.context().is_lost() {
            return Err(ResourceError::DeviceLost);
        }

        // Resolve every view first so the borrowed descriptor can outlive the lookups.
        let color_views = descriptor
            .color_attachments
            .iter()
            .map(|att| self.view(att.view))
            .collect::<Result<Vec<_>, _>>()?;
        let depth_view = descriptor
            .depth_stencil_attachment
            .as_ref()
            .map(|ds| self.view(ds.view))
            .transpose()?;

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = descriptor
            .color_attachments
            .iter()
            .zip(color_views.iter())
            .map(|(att, view)| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    resolve_target: None,
                    ops: att.ops.into_wgpu(),
                    depth_slice: None,
                })
            })
            .collect();

        let depth_stencil_attachment = descriptor
            .depth_stencil_attachment
            .as_ref()
            .zip(depth_view.as_ref())
            .map(|(ds, view)| wgpu::RenderPassDepthStencilAttachment {
                view: view.as_ref(),
                depth_ops: ds.depth_ops.map(|ops| ops.into_wgpu()),
                stencil_ops: ds.stencil_ops.map(|ops| ops.into_wgpu()),
            });

        let wgpu_descriptor = wgpu::RenderPassDescriptor {
            label: descriptor.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        };

        let encoder = self.encoder.as_mut().ok_or_else(consumed)?;
        let pass = encoder.begin_render_pass(&wgpu_descriptor);

        Ok(Box::new(WgpuRenderPass {
            pass,
            device: &self.device,
        }))
    }

    fn copy_texture_to_texture(
        &mut self,
        source: TextureId,
        destination: TextureId,
        size: Extent3D,
    ) -> Result<(), ResourceError> {
        let (Some(src), Some(dst)) = (
            self.device.get_wgpu_texture(source),
            self.device.get_wgpu_texture(destination),
        ) else {
            return Err(ResourceError::NotFound);
        };
        let encoder = self.encoder.as_mut().ok_or_else(consumed)?;
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size.into_wgpu(),
        );
        Ok(())
    }

    fn write_timestamp(&mut self, profiler: &dyn GpuProfiler, hook: GpuHook) {
        let Some(concrete_profiler) = profiler.as_any().downcast_ref::<WgpuTimestampProfiler>()
        else {
            log::warn!("Timestamp skipped: profiler is not a WgpuTimestampProfiler");
            return;
        };
        if let Some(encoder) = self.encoder.as_mut() {
            concrete_profiler.write(encoder, hook);
        }
    }

    fn finish(mut self: Box<Self>) -> Result<CommandBufferId, ResourceError> {
        let finished_encoder = self.encoder.take().ok_or_else(consumed)?;
        self.device.register_command_buffer(finished_encoder.finish())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
