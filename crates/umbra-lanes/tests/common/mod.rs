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

//! A recording graphics device for the lane integration tests.
//!
//! Commands are captured per encoder and replayed on submit against a coarse
//! per-pixel model: every indexed draw covers the rectangle its world
//! transform maps the unit square to (x/y scale and translation, in clip
//! space), goes through the pipeline's stencil test and writes a tag into
//! each color attachment whose write mask is not empty. Non-indexed draws
//! are full-screen triangles and cover every pixel.

#![allow(dead_code)]

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};
use umbra_core::math::{Extent3D, LinearRgba, Mat4};
use umbra_core::renderer::api::*;
use umbra_core::renderer::traits::{CommandEncoder, GpuProfiler, GraphicsDevice, RenderPass};
use umbra_core::renderer::ResourceError;
use umbra_lanes::{PresentTarget, RenderSession};

/// Tag written by draws whose pipeline writes the stencil plane, plus the
/// stencil reference.
pub const GEOMETRY_TAG: u32 = 100;
/// Tag written by draws whose pipeline tests the stencil for equality, plus
/// the stencil reference.
pub const DECAL_TAG: u32 = 200;
/// Tag written by full-screen triangles.
pub const FULLSCREEN_TAG: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    ShaderModule,
    BindGroupLayout,
    BindGroup,
    RenderPipeline,
    Buffer,
    Texture,
    TextureView,
    Sampler,
}

#[derive(Debug, Clone)]
pub struct PipelineInfo {
    pub label: String,
    pub fragment_entry: Option<String>,
    pub stencil: Option<(StencilFaceState, u32, u32)>,
    pub write_masks: Vec<ColorWrites>,
}

#[derive(Debug)]
struct TextureInfo {
    label: String,
    extent: Extent3D,
    format: TextureFormat,
    texels: Vec<u32>,
    stencil: Vec<u32>,
}

/// One render pass of a submitted frame.
#[derive(Debug, Clone, Default)]
pub struct PassRecord {
    pub label: String,
    pub color_textures: Vec<TextureId>,
    pub cleared: Vec<bool>,
    pub clear_colors: Vec<Option<LinearRgba>>,
    pub depth_texture: Option<TextureId>,
    pub depth_read_only: bool,
    pub pipelines: Vec<String>,
    pub draws: u32,
    pub stencil_references: Vec<u32>,
    pub sampled_textures: Vec<TextureId>,
    /// Bytes of the uniform bound at group 0, at its dynamic offset.
    pub scene_constants: Option<Vec<u8>>,
}

/// Everything one submitted command buffer did.
#[derive(Debug, Clone, Default)]
pub struct SubmittedFrame {
    pub passes: Vec<PassRecord>,
    pub hooks: Vec<GpuHook>,
    pub copies: Vec<(TextureId, TextureId)>,
}

impl SubmittedFrame {
    pub fn pass_labels(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.label.as_str()).collect()
    }

    pub fn pass(&self, label: &str) -> Option<&PassRecord> {
        self.passes.iter().find(|pass| pass.label == label)
    }
}

#[derive(Debug, Clone)]
enum Command {
    BeginPass {
        label: String,
        colors: Vec<(TextureViewId, Option<LinearRgba>)>,
        depth: Option<RenderPassDepthStencilAttachment>,
    },
    SetPipeline(RenderPipelineId),
    SetBindGroup {
        index: u32,
        entries: Vec<BindGroupEntry>,
        offsets: Vec<u32>,
    },
    SetStencilReference(u32),
    Draw,
    DrawIndexed,
    EndPass,
    Copy(TextureId, TextureId),
    Timestamp(GpuHook),
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    live: HashMap<ObjectKind, HashSet<usize>>,
    buffers: HashMap<usize, Vec<u8>>,
    bind_groups: HashMap<usize, Vec<BindGroupEntry>>,
    pipelines: HashMap<usize, PipelineInfo>,
    textures: HashMap<usize, TextureInfo>,
    views: HashMap<usize, TextureId>,
    pending: HashMap<u64, Vec<Command>>,
    next_command_buffer: u64,
    submitted: Vec<SubmittedFrame>,
    pipeline_calls: usize,
    fail_pipeline_at: Option<usize>,
    lost: bool,
}

impl MockState {
    fn check(&self) -> Result<(), ResourceError> {
        if self.lost {
            return Err(ResourceError::DeviceLost);
        }
        Ok(())
    }

    fn register(&mut self, kind: ObjectKind) -> usize {
        self.next_id += 1;
        self.live.entry(kind).or_default().insert(self.next_id);
        self.next_id
    }

    fn release(&mut self, kind: ObjectKind, id: usize) -> Result<(), ResourceError> {
        match self.live.get_mut(&kind).map(|ids| ids.remove(&id)) {
            Some(true) => Ok(()),
            _ => Err(ResourceError::InvalidHandle),
        }
    }
}

/// The recording device. Cheap to share: every clone of the `Arc` sees the
/// same state.
#[derive(Debug, Default)]
pub struct MockGraphicsDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockGraphicsDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state().live.get(&kind).map_or(0, HashSet::len)
    }

    pub fn live_total(&self) -> usize {
        self.state().live.values().map(HashSet::len).sum()
    }

    pub fn buffer_bytes(&self, buffer: BufferId) -> Vec<u8> {
        self.state().buffers.get(&buffer.0).cloned().unwrap_or_default()
    }

    pub fn submitted_frames(&self) -> Vec<SubmittedFrame> {
        self.state().submitted.clone()
    }

    pub fn last_frame(&self) -> SubmittedFrame {
        self.state().submitted.last().cloned().unwrap_or_default()
    }

    pub fn submitted_count(&self) -> usize {
        self.state().submitted.len()
    }

    pub fn texel(&self, texture: TextureId, x: u32, y: u32) -> u32 {
        let state = self.state();
        let info = &state.textures[&texture.0];
        info.texels[(y * info.extent.width + x) as usize]
    }

    pub fn stencil(&self, texture: TextureId, x: u32, y: u32) -> u32 {
        let state = self.state();
        let info = &state.textures[&texture.0];
        info.stencil[(y * info.extent.width + x) as usize]
    }

    pub fn texture_label(&self, texture: TextureId) -> String {
        self.state().textures[&texture.0].label.clone()
    }

    pub fn pipelines(&self) -> Vec<PipelineInfo> {
        let state = self.state();
        let live = state.live.get(&ObjectKind::RenderPipeline).cloned().unwrap_or_default();
        let mut ids: Vec<usize> = live.into_iter().collect();
        ids.sort_unstable();
        ids.iter().map(|id| state.pipelines[id].clone()).collect()
    }

    pub fn set_lost(&self, lost: bool) {
        self.state().lost = lost;
    }

    /// Makes the `n`-th render pipeline creation from now fail.
    pub fn fail_render_pipeline_after(&self, n: usize) {
        let mut state = self.state();
        state.fail_pipeline_at = Some(state.pipeline_calls + n);
    }

    /// Creates a presentation target of the given size.
    pub fn create_present_target(&self, width: u32, height: u32, format: TextureFormat) -> PresentTarget {
        let texture = self
            .create_texture(&TextureDescriptor {
                label: Some("Present Target".into()),
                size: Extent3D::d2(width, height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format,
                usage: TextureUsage::RENDER_ATTACHMENT,
            })
            .unwrap();
        let view = self
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();
        PresentTarget { view, format }
    }

    pub fn view_texture(&self, view: TextureViewId) -> TextureId {
        self.state().views[&view.0]
    }
}

/// Builds a session over a shared mock device.
pub fn session(device: &Arc<MockGraphicsDevice>) -> RenderSession {
    RenderSession::new(device.clone())
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_shader_module(
        &self,
        _descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        Ok(ShaderModuleId(state.register(ObjectKind::ShaderModule)))
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.state().release(ObjectKind::ShaderModule, id.0)
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        Ok(BindGroupLayoutId(state.register(ObjectKind::BindGroupLayout)))
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        self.state().release(ObjectKind::BindGroupLayout, id.0)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        let id = state.register(ObjectKind::BindGroup);
        state.bind_groups.insert(id, descriptor.entries.to_vec());
        Ok(BindGroupId(id))
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.bind_groups.remove(&id.0);
        state.release(ObjectKind::BindGroup, id.0)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        let call = state.pipeline_calls;
        state.pipeline_calls += 1;
        if state.fail_pipeline_at == Some(call) {
            return Err(ResourceError::BackendError("injected pipeline failure".into()));
        }
        let id = state.register(ObjectKind::RenderPipeline);
        state.pipelines.insert(
            id,
            PipelineInfo {
                label: descriptor.label.as_deref().unwrap_or_default().to_string(),
                fragment_entry: descriptor.fragment_entry_point.as_deref().map(str::to_string),
                stencil: descriptor.depth_stencil_state.map(|depth| {
                    (
                        depth.stencil_front,
                        depth.stencil_read_mask,
                        depth.stencil_write_mask,
                    )
                }),
                write_masks: descriptor
                    .color_target_states
                    .iter()
                    .map(|target| target.write_mask)
                    .collect(),
            },
        );
        Ok(RenderPipelineId(id))
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.state().release(ObjectKind::RenderPipeline, id.0)
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        let id = state.register(ObjectKind::Buffer);
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        Ok(BufferId(id))
    }

    fn create_buffer_with_data(
        &self,
        _descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        let id = state.register(ObjectKind::Buffer);
        state.buffers.insert(id, data.to_vec());
        Ok(BufferId(id))
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.buffers.remove(&id.0);
        state.release(ObjectKind::Buffer, id.0)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.check()?;
        let buffer = state.buffers.get_mut(&id.0).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        let id = state.register(ObjectKind::Texture);
        let texels = (descriptor.size.width * descriptor.size.height) as usize;
        state.textures.insert(
            id,
            TextureInfo {
                label: descriptor.label.as_deref().unwrap_or_default().to_string(),
                extent: descriptor.size,
                format: descriptor.format,
                texels: vec![0; texels],
                stencil: vec![0; texels],
            },
        );
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.textures.remove(&id.0);
        state.release(ObjectKind::Texture, id.0)
    }

    fn write_texture(
        &self,
        target: &TextureCopyTarget,
        _data: &[u8],
        _layout: ImageDataLayout,
        _size: Extent3D,
    ) -> Result<(), ResourceError> {
        let state = self.state();
        state.check()?;
        if !state.textures.contains_key(&target.texture.0) {
            return Err(ResourceError::NotFound);
        }
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture: TextureId,
        _descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        if !state.textures.contains_key(&texture.0) {
            return Err(ResourceError::NotFound);
        }
        let id = state.register(ObjectKind::TextureView);
        state.views.insert(id, texture);
        Ok(TextureViewId(id))
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.views.remove(&id.0);
        state.release(ObjectKind::TextureView, id.0)
    }

    fn create_sampler(&self, _descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let mut state = self.state();
        state.check()?;
        Ok(SamplerId(state.register(ObjectKind::Sampler)))
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        self.state().release(ObjectKind::Sampler, id.0)
    }

    fn create_command_encoder(
        &self,
        _label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError> {
        self.state().check()?;
        Ok(Box::new(MockCommandEncoder {
            state: Arc::clone(&self.state),
            commands: Vec::new(),
        }))
    }

    fn submit_command_buffer(&self, id: CommandBufferId) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.check()?;
        let commands = state.pending.remove(&id.0).ok_or(ResourceError::InvalidHandle)?;
        let frame = replay(&mut state, &commands);
        state.submitted.push(frame);
        Ok(())
    }

    fn supports_feature(&self, feature_name: &str) -> bool {
        feature_name == umbra_core::renderer::traits::FEATURE_TIMESTAMP_QUERY
    }

    fn is_lost(&self) -> bool {
        self.state().lost
    }
}

struct MockCommandEncoder {
    state: Arc<Mutex<MockState>>,
    commands: Vec<Command>,
}

struct MockRenderPass<'a> {
    state: Arc<Mutex<MockState>>,
    commands: &'a mut Vec<Command>,
}

impl Drop for MockRenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::EndPass);
    }
}

impl RenderPass<'_> for MockRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]) {
        let entries = self
            .state
            .lock()
            .unwrap()
            .bind_groups
            .get(&bind_group.0)
            .cloned()
            .unwrap_or_default();
        self.commands.push(Command::SetBindGroup {
            index,
            entries,
            offsets: offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: BufferId, _offset: u64) {}

    fn set_index_buffer(&mut self, _buffer: BufferId, _offset: u64, _index_format: IndexFormat) {}

    fn set_stencil_reference(&mut self, reference: u32) {
        self.commands.push(Command::SetStencilReference(reference));
    }

    fn draw(&mut self, _vertices: Range<u32>, _instances: Range<u32>) {
        self.commands.push(Command::Draw);
    }

    fn draw_indexed(&mut self, _indices: Range<u32>, _base_vertex: i32, _instances: Range<u32>) {
        self.commands.push(Command::DrawIndexed);
    }
}

impl CommandEncoder for MockCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Result<Box<dyn RenderPass<'encoder> + 'encoder>, ResourceError> {
        self.state.lock().unwrap().check()?;
        self.commands.push(Command::BeginPass {
            label: descriptor.label.unwrap_or_default().to_string(),
            colors: descriptor
                .color_attachments
                .iter()
                .map(|attachment| match attachment.ops.load {
                    LoadOp::Clear(color) => (attachment.view, Some(color)),
                    LoadOp::Load => (attachment.view, None),
                })
                .collect(),
            depth: descriptor.depth_stencil_attachment,
        });
        Ok(Box::new(MockRenderPass {
            state: Arc::clone(&self.state),
            commands: &mut self.commands,
        }))
    }

    fn copy_texture_to_texture(
        &mut self,
        source: TextureId,
        destination: TextureId,
        _size: Extent3D,
    ) -> Result<(), ResourceError> {
        self.commands.push(Command::Copy(source, destination));
        Ok(())
    }

    fn write_timestamp(&mut self, _profiler: &dyn GpuProfiler, hook: GpuHook) {
        self.commands.push(Command::Timestamp(hook));
    }

    fn finish(self: Box<Self>) -> Result<CommandBufferId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        state.next_command_buffer += 1;
        let id = state.next_command_buffer;
        state.pending.insert(id, self.commands);
        Ok(CommandBufferId(id))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Reads the world transform of the draw constants bound at group 1.
fn draw_world(state: &MockState, group: Option<&(Vec<BindGroupEntry>, Vec<u32>)>) -> Option<Mat4> {
    let (entries, offsets) = group?;
    let binding = entries.iter().find_map(|entry| match entry.resource {
        BindingResource::Buffer(binding) => Some(binding),
        _ => None,
    })?;
    let data = state.buffers.get(&binding.buffer.0)?;
    let start = binding.offset as usize + *offsets.first().unwrap_or(&0) as usize;
    let bytes = data.get(start..start + 64)?;
    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Some(Mat4::from_cols_slice(&floats))
}

/// Copies the bytes a uniform binding exposes at its dynamic offset.
fn bound_uniform(state: &MockState, entries: &[BindGroupEntry], offsets: &[u32]) -> Option<Vec<u8>> {
    let binding = entries.iter().find_map(|entry| match entry.resource {
        BindingResource::Buffer(binding) => Some(binding),
        _ => None,
    })?;
    let data = state.buffers.get(&binding.buffer.0)?;
    let start = binding.offset as usize + *offsets.first().unwrap_or(&0) as usize;
    let end = match binding.size {
        Some(size) => start + size.get() as usize,
        None => data.len(),
    };
    data.get(start..end.min(data.len())).map(<[u8]>::to_vec)
}

fn covered(world: Option<Mat4>, x: u32, y: u32, extent: Extent3D) -> bool {
    let Some(world) = world else {
        return true;
    };
    let ndc_x = (x as f32 + 0.5) / extent.width as f32 * 2.0 - 1.0;
    let ndc_y = 1.0 - (y as f32 + 0.5) / extent.height as f32 * 2.0;
    let center = world.w_axis;
    let half_x = world.x_axis.x.abs() * 0.5;
    let half_y = world.y_axis.y.abs() * 0.5;
    (ndc_x - center.x).abs() <= half_x && (ndc_y - center.y).abs() <= half_y
}

struct PassState {
    record: PassRecord,
    depth_writes_stencil: bool,
    pipeline: Option<PipelineInfo>,
    groups: HashMap<u32, (Vec<BindGroupEntry>, Vec<u32>)>,
    reference: u32,
}

fn replay(state: &mut MockState, commands: &[Command]) -> SubmittedFrame {
    let mut frame = SubmittedFrame::default();
    let mut pass: Option<PassState> = None;
    for command in commands {
        match command {
            Command::BeginPass {
                label,
                colors,
                depth,
            } => {
                let mut record = PassRecord {
                    label: label.clone(),
                    ..Default::default()
                };
                for (view, clear) in colors {
                    let texture = state.views[&view.0];
                    if clear.is_some() {
                        if let Some(info) = state.textures.get_mut(&texture.0) {
                            info.texels.fill(0);
                        }
                    }
                    record.color_textures.push(texture);
                    record.cleared.push(clear.is_some());
                    record.clear_colors.push(*clear);
                }
                let mut depth_writes_stencil = false;
                if let Some(depth) = depth {
                    let texture = state.views[&depth.view.0];
                    record.depth_texture = Some(texture);
                    record.depth_read_only = depth.is_read_only();
                    if let Some(ops) = depth.stencil_ops {
                        depth_writes_stencil = true;
                        if let LoadOp::Clear(value) = ops.load {
                            if let Some(info) = state.textures.get_mut(&texture.0) {
                                info.stencil.fill(value);
                            }
                        }
                    }
                }
                pass = Some(PassState {
                    record,
                    depth_writes_stencil,
                    pipeline: None,
                    groups: HashMap::new(),
                    reference: 0,
                });
            }
            Command::SetPipeline(id) => {
                if let Some(pass) = pass.as_mut() {
                    let info = state.pipelines.get(&id.0).cloned();
                    if let Some(info) = &info {
                        pass.record.pipelines.push(info.label.clone());
                    }
                    pass.pipeline = info;
                }
            }
            Command::SetBindGroup {
                index,
                entries,
                offsets,
            } => {
                if let Some(pass) = pass.as_mut() {
                    for entry in entries {
                        if let BindingResource::TextureView(view) = entry.resource {
                            if let Some(texture) = state.views.get(&view.0) {
                                pass.record.sampled_textures.push(*texture);
                            }
                        }
                    }
                    if *index == 0 {
                        pass.record.scene_constants = bound_uniform(state, entries, offsets);
                    }
                    pass.groups.insert(*index, (entries.clone(), offsets.clone()));
                }
            }
            Command::SetStencilReference(reference) => {
                if let Some(pass) = pass.as_mut() {
                    pass.reference = *reference;
                    pass.record.stencil_references.push(*reference);
                }
            }
            Command::Draw => {
                if let Some(pass) = pass.as_mut() {
                    pass.record.draws += 1;
                    for texture in &pass.record.color_textures {
                        if let Some(info) = state.textures.get_mut(&texture.0) {
                            info.texels.fill(FULLSCREEN_TAG);
                        }
                    }
                }
            }
            Command::DrawIndexed => {
                if let Some(pass) = pass.as_mut() {
                    pass.record.draws += 1;
                    rasterize(state, pass);
                }
            }
            Command::EndPass => {
                if let Some(pass) = pass.take() {
                    frame.passes.push(pass.record);
                }
            }
            Command::Copy(source, destination) => frame.copies.push((*source, *destination)),
            Command::Timestamp(hook) => frame.hooks.push(*hook),
        }
    }
    frame
}

fn rasterize(state: &mut MockState, pass: &PassState) {
    let Some(pipeline) = &pass.pipeline else {
        return;
    };
    let Some(first) = pass.record.color_textures.first() else {
        return;
    };
    let extent = state.textures[&first.0].extent;
    let world = draw_world(state, pass.groups.get(&1));
    let stencil_test = pipeline.stencil;
    let tests_equality = matches!(stencil_test, Some((face, _, _)) if face.compare == CompareFunction::Equal);
    let tag = if tests_equality { DECAL_TAG } else { GEOMETRY_TAG } + pass.reference;

    for y in 0..extent.height {
        for x in 0..extent.width {
            if !covered(world, x, y, extent) {
                continue;
            }
            let index = (y * extent.width + x) as usize;
            if let (Some((face, read_mask, write_mask)), Some(depth)) =
                (stencil_test, pass.record.depth_texture)
            {
                let Some(info) = state.textures.get_mut(&depth.0) else {
                    continue;
                };
                let stored = info.stencil[index];
                if !face.compare.passes(pass.reference & read_mask, stored & read_mask) {
                    continue;
                }
                if pass.depth_writes_stencil && face.pass_op == StencilOperation::Replace {
                    info.stencil[index] = pass.reference & write_mask;
                }
            }
            for (slot, texture) in pass.record.color_textures.iter().enumerate() {
                let writes = pipeline
                    .write_masks
                    .get(slot)
                    .is_some_and(|mask| !mask.is_empty());
                if writes {
                    if let Some(info) = state.textures.get_mut(&texture.0) {
                        info.texels[index] = tag;
                    }
                }
            }
        }
    }
}

/// Profiler log shared between a [`MockProfiler`] and the test.
#[derive(Debug, Default)]
pub struct ProfilerLog {
    pub reads: u32,
    pub resolved: Vec<u64>,
    pub mapped: Vec<u64>,
}

/// A profiler that reports fixed timings once a frame has been mapped.
#[derive(Debug, Default)]
pub struct MockProfiler {
    pub log: Arc<Mutex<ProfilerLog>>,
}

impl GpuProfiler for MockProfiler {
    fn try_read_previous_frame(&mut self) -> TimestampReadback {
        let mut log = self.log.lock().unwrap();
        log.reads += 1;
        if log.mapped.is_empty() {
            TimestampReadback::Unavailable
        } else {
            TimestampReadback::Ready(StageTimings {
                stage_ms: [1.0; 6],
                frame_total_ms: 6.0,
            })
        }
    }

    fn resolve_and_copy(&self, _encoder: &mut dyn CommandEncoder, frame_index: u64) {
        self.log.lock().unwrap().resolved.push(frame_index);
    }

    fn schedule_map_after_submit(&mut self, frame_index: u64) {
        self.log.lock().unwrap().mapped.push(frame_index);
    }

    fn smoothed_timings(&self) -> StageTimings {
        StageTimings::default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An opaque color with the given red channel, for clear colors.
pub fn red(r: f32) -> LinearRgba {
    LinearRgba::rgb(r, 0.0, 0.0)
}
