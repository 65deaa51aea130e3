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

//! The dynamic post-process chain.
//!
//! Stages run in queue order after the lighting resolve. Every stage but the
//! last reads the current post buffer and writes the other one, then the
//! pair swaps; the last stage writes the presentation target. The routing is
//! computed up front by [`plan_post_chain`], a pure function, and the
//! executor only follows it.
//!
//! # Binding contract
//!
//! A post stage fragment shader sees:
//! - group 0: the scene constants (dynamic uniform, binding 0)
//! - group 1: its textures, at the slots chosen by the stage
//! - group 2: a filtering sampler at binding 0 and, when the stage carries a
//!   constant blob, a uniform at binding 1

use super::{
    frame::{frame_error, FrameContext, PresentTarget},
    frame_buffers::{AttributeChannel, FrameBufferSet},
    hazards::InputScope,
};
use ahash::AHashMap;
use std::borrow::Cow;
use umbra_core::{
    math::LinearRgba,
    renderer::{
        api::{
            BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
            BindGroupLayoutEntry, BindGroupLayoutId, ColorTargetStateDescriptor, Operations,
            PrimitiveStateDescriptor, RenderPassColorAttachment, RenderPassDescriptor,
            RenderPipelineDescriptor, RenderPipelineId, SamplerBindingType, SamplerId,
            ShaderModuleId, ShaderStageFlags, TextureFormat, TextureId, TextureSampleType,
            TextureViewId, WriteDiscardBuffer,
        },
        traits::GraphicsDevice,
        RenderError, ResourceError,
    },
};

/// Which half of the anti-aliasing history a stage samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryRole {
    /// The buffer that receives this frame's image once the chain completes.
    Current,
    /// The image of the previous frame.
    Previous,
}

/// Where an extra stage input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostInputSource {
    /// A texture view owned by the caller.
    External(TextureViewId),
    /// A channel of the frame buffer set.
    Channel(AttributeChannel),
    /// One of the history buffers.
    History(HistoryRole),
}

/// An extra texture bound to a post stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBinding {
    /// Name used in logs and errors.
    pub name: Cow<'static, str>,
    /// Binding index inside group 1.
    pub slot: u32,
    /// The bound texture.
    pub source: PostInputSource,
}

/// One screen-space effect of the post chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessStage {
    /// Pass label.
    pub label: Cow<'static, str>,
    /// Fragment shader module.
    pub shader: ShaderModuleId,
    /// Fragment entry point.
    pub entry_point: Cow<'static, str>,
    /// Opaque uniform data, uploaded once per frame.
    pub constants: Option<Vec<u8>>,
    /// Slot receiving the output of the previous stage.
    pub scene_input_slot: u32,
    /// Slot receiving the sampled depth.
    pub depth_input_slot: u32,
    /// Additional inputs.
    pub extra_bindings: Vec<NamedBinding>,
}

impl PostProcessStage {
    /// A stage with the scene input at slot 0 and depth at slot 1.
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        shader: ShaderModuleId,
        entry_point: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            label: label.into(),
            shader,
            entry_point: entry_point.into(),
            constants: None,
            scene_input_slot: 0,
            depth_input_slot: 1,
            extra_bindings: Vec::new(),
        }
    }

    /// Attaches a constant blob.
    pub fn with_constants(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.constants = Some(data.into());
        self
    }

    /// Moves the scene and depth inputs.
    pub fn with_input_slots(mut self, scene: u32, depth: u32) -> Self {
        self.scene_input_slot = scene;
        self.depth_input_slot = depth;
        self
    }

    /// Adds an extra input.
    pub fn with_binding(
        mut self,
        name: impl Into<Cow<'static, str>>,
        slot: u32,
        source: PostInputSource,
    ) -> Self {
        self.extra_bindings.push(NamedBinding {
            name: name.into(),
            slot,
            source,
        });
        self
    }

    /// Checks that no two inputs share a slot.
    pub fn validate_slots(&self) -> Result<(), RenderError> {
        let mut used: Vec<(u32, &str)> = vec![
            (self.scene_input_slot, "scene input"),
            (self.depth_input_slot, "depth input"),
        ];
        for binding in &self.extra_bindings {
            used.push((binding.slot, binding.name.as_ref()));
        }
        for (i, (slot, name)) in used.iter().enumerate() {
            if let Some((_, other)) = used[..i].iter().find(|(s, _)| s == slot) {
                return Err(RenderError::InvalidConfiguration(format!(
                    "post stage '{}' binds '{}' and '{}' to slot {}",
                    self.label, other, name, slot
                )));
            }
        }
        Ok(())
    }
}

/// Where a pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTarget {
    /// The post buffer at this physical index.
    PostBuffer(usize),
    /// The caller's presentation target.
    Presentation,
}

/// Input and output of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRoute {
    /// Physical index of the post buffer read as the scene input.
    pub input: usize,
    /// The stage output.
    pub output: ChainTarget,
}

/// The routing of the lighting resolve and every post stage of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    /// Where the lighting resolve writes.
    pub lighting_output: ChainTarget,
    /// One route per stage, in execution order.
    pub routes: Vec<StageRoute>,
    /// Physical index of the current post buffer once the chain completes.
    pub final_current: usize,
}

/// Routes a chain of `stage_count` stages, starting with the post buffer at
/// physical index `current` as the current one.
pub fn plan_post_chain(stage_count: usize, current: usize) -> ChainPlan {
    let mut current = current & 1;
    if stage_count == 0 {
        return ChainPlan {
            lighting_output: ChainTarget::Presentation,
            routes: Vec::new(),
            final_current: current,
        };
    }
    let lighting_output = ChainTarget::PostBuffer(current);
    let mut routes = Vec::with_capacity(stage_count);
    for index in 0..stage_count {
        if index + 1 == stage_count {
            routes.push(StageRoute {
                input: current,
                output: ChainTarget::Presentation,
            });
        } else {
            routes.push(StageRoute {
                input: current,
                output: ChainTarget::PostBuffer(1 - current),
            });
            current = 1 - current;
        }
    }
    ChainPlan {
        lighting_output,
        routes,
        final_current: current,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum SlotKind {
    Color,
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PostPipelineKey {
    shader: ShaderModuleId,
    entry_point: String,
    textures: Vec<(u32, SlotKind)>,
    constants: bool,
    format: TextureFormat,
}

struct ResolvedInput {
    slot: u32,
    view: TextureViewId,
    texture: Option<TextureId>,
    kind: SlotKind,
    scope: InputScope,
}

/// Builds and caches the pipelines of post stages and records the chain.
#[derive(Debug)]
pub struct PostChainExecutor {
    fullscreen_module: ShaderModuleId,
    scene_layout: BindGroupLayoutId,
    sampler: SamplerId,
    sampler_layout: BindGroupLayoutId,
    sampler_constants_layout: BindGroupLayoutId,
    texture_layouts: AHashMap<Vec<(u32, SlotKind)>, BindGroupLayoutId>,
    pipelines: AHashMap<PostPipelineKey, RenderPipelineId>,
}

impl PostChainExecutor {
    /// Creates the executor and its fixed layouts.
    pub fn new(
        device: &dyn GraphicsDevice,
        fullscreen_module: ShaderModuleId,
        scene_layout: BindGroupLayoutId,
        sampler: SamplerId,
    ) -> Result<Self, ResourceError> {
        let sampler_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Post Sampler Layout"),
            entries: &[BindGroupLayoutEntry::sampler(0, SamplerBindingType::Filtering)],
        })?;
        let sampler_constants_layout =
            device.create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("Post Sampler+Constants Layout"),
                entries: &[
                    BindGroupLayoutEntry::sampler(0, SamplerBindingType::Filtering),
                    BindGroupLayoutEntry::uniform(1, ShaderStageFlags::FRAGMENT, false),
                ],
            })?;
        Ok(Self {
            fullscreen_module,
            scene_layout,
            sampler,
            sampler_layout,
            sampler_constants_layout,
            texture_layouts: AHashMap::new(),
            pipelines: AHashMap::new(),
        })
    }

    fn texture_layout(
        &mut self,
        device: &dyn GraphicsDevice,
        signature: &[(u32, SlotKind)],
    ) -> Result<BindGroupLayoutId, RenderError> {
        if let Some(layout) = self.texture_layouts.get(signature) {
            return Ok(*layout);
        }
        let entries: Vec<BindGroupLayoutEntry> = signature
            .iter()
            .map(|(slot, kind)| match kind {
                SlotKind::Color => BindGroupLayoutEntry::texture_2d(
                    *slot,
                    TextureSampleType::Float { filterable: true },
                ),
                SlotKind::Depth => BindGroupLayoutEntry::texture_2d(*slot, TextureSampleType::Depth),
            })
            .collect();
        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("Post Texture Layout"),
                entries: &entries,
            })
            .map_err(frame_error)?;
        log::debug!("Created post texture layout for slots {signature:?}");
        self.texture_layouts.insert(signature.to_vec(), layout);
        Ok(layout)
    }

    fn pipeline(
        &mut self,
        device: &dyn GraphicsDevice,
        stage: &PostProcessStage,
        signature: &[(u32, SlotKind)],
        format: TextureFormat,
    ) -> Result<RenderPipelineId, RenderError> {
        let key = PostPipelineKey {
            shader: stage.shader,
            entry_point: stage.entry_point.to_string(),
            textures: signature.to_vec(),
            constants: stage.constants.is_some(),
            format,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(*pipeline);
        }
        let texture_layout = self.texture_layout(device, signature)?;
        let params_layout = if key.constants {
            self.sampler_constants_layout
        } else {
            self.sampler_layout
        };
        let color_targets = [ColorTargetStateDescriptor::replace(format)];
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(Cow::Owned(format!("Post Pipeline '{}'", stage.label))),
                bind_group_layouts: Cow::Owned(vec![
                    self.scene_layout,
                    texture_layout,
                    params_layout,
                ]),
                vertex_shader_module: self.fullscreen_module,
                vertex_entry_point: Cow::Borrowed("vs_fullscreen"),
                fragment_shader_module: Some(stage.shader),
                fragment_entry_point: Some(Cow::Borrowed(stage.entry_point.as_ref())),
                vertex_buffers_layout: Cow::Borrowed(&[]),
                primitive_state: PrimitiveStateDescriptor::default(),
                depth_stencil_state: None,
                color_target_states: Cow::Borrowed(&color_targets),
            })
            .map_err(frame_error)?;
        log::info!(
            "Created post pipeline '{}' ({}, {:?})",
            stage.label,
            stage.entry_point,
            format
        );
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    fn resolve_inputs(
        stage: &PostProcessStage,
        route: StageRoute,
        buffers: &FrameBufferSet,
    ) -> Vec<ResolvedInput> {
        let scene_input = buffers.post_buffers().member(route.input);
        let depth = buffers.depth_stencil();
        let mut inputs = vec![
            ResolvedInput {
                slot: stage.scene_input_slot,
                view: scene_input.sampled_view,
                texture: Some(scene_input.texture),
                kind: SlotKind::Color,
                scope: InputScope::Pass,
            },
            ResolvedInput {
                slot: stage.depth_input_slot,
                view: depth.sampled.view(),
                texture: Some(depth.texture),
                kind: SlotKind::Depth,
                scope: InputScope::Frame,
            },
        ];
        for binding in &stage.extra_bindings {
            let input = match binding.source {
                PostInputSource::External(view) => ResolvedInput {
                    slot: binding.slot,
                    view,
                    texture: None,
                    kind: SlotKind::Color,
                    scope: InputScope::Pass,
                },
                PostInputSource::Channel(channel) => ResolvedInput {
                    slot: binding.slot,
                    view: buffers.sampled_view(channel),
                    texture: Some(buffers.texture(channel)),
                    kind: match channel {
                        AttributeChannel::DepthStencil => SlotKind::Depth,
                        _ => SlotKind::Color,
                    },
                    scope: InputScope::Frame,
                },
                PostInputSource::History(role) => {
                    let history = buffers.history_buffers();
                    let target = match role {
                        HistoryRole::Current => history.current(),
                        HistoryRole::Previous => history.other(),
                    };
                    ResolvedInput {
                        slot: binding.slot,
                        view: target.sampled_view,
                        texture: Some(target.texture),
                        kind: SlotKind::Color,
                        scope: InputScope::Pass,
                    }
                }
            };
            inputs.push(input);
        }
        inputs.sort_by_key(|input| input.slot);
        inputs
    }

    /// Records every stage of `plan`, then updates the post and history
    /// buffer roles.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn execute(
        &mut self,
        ctx: &mut FrameContext<'_>,
        stages: &[PostProcessStage],
        plan: &ChainPlan,
        buffers: &mut FrameBufferSet,
        target: &PresentTarget,
        constants: &mut WriteDiscardBuffer,
        anti_aliasing: bool,
    ) -> Result<(), RenderError> {
        let scene = ctx.scene()?;
        for (stage, route) in stages.iter().zip(plan.routes.iter().copied()) {
            let (output_view, output_texture, format) = match route.output {
                ChainTarget::PostBuffer(index) => {
                    let output = buffers.post_buffers().member(index);
                    (output.render_view, Some(output.texture), output.format)
                }
                ChainTarget::Presentation => (target.view, None, target.format),
            };

            let inputs = Self::resolve_inputs(stage, route, buffers);
            let signature: Vec<(u32, SlotKind)> =
                inputs.iter().map(|input| (input.slot, input.kind)).collect();
            let pipeline = self.pipeline(ctx.device, stage, &signature, format)?;
            let texture_layout = self.texture_layout(ctx.device, &signature)?;

            let outputs: Vec<TextureId> = output_texture.into_iter().collect();
            ctx.hazards.begin_pass("post_process", &outputs, None)?;
            for input in &inputs {
                if let Some(texture) = input.texture {
                    ctx.hazards.bind_input(texture, input.scope)?;
                }
            }

            let texture_entries: Vec<BindGroupEntry> = inputs
                .iter()
                .map(|input| BindGroupEntry::texture(input.slot, input.view))
                .collect();
            let textures = ctx.transient_bind_group(&BindGroupDescriptor {
                label: Some("Post Textures"),
                layout: texture_layout,
                entries: &texture_entries,
            })?;

            let params = match &stage.constants {
                Some(data) => {
                    let region = constants.write(ctx.device, data).map_err(frame_error)?;
                    let binding_size = (region.size as u64).max(16).next_multiple_of(16);
                    ctx.transient_bind_group(&BindGroupDescriptor {
                        label: Some("Post Params"),
                        layout: self.sampler_constants_layout,
                        entries: &[
                            BindGroupEntry::sampler(0, self.sampler),
                            BindGroupEntry::buffer(
                                1,
                                region.buffer,
                                region.offset as u64,
                                Some(binding_size),
                            ),
                        ],
                    })?
                }
                None => ctx.transient_bind_group(&BindGroupDescriptor {
                    label: Some("Post Params"),
                    layout: self.sampler_layout,
                    entries: &[BindGroupEntry::sampler(0, self.sampler)],
                })?,
            };

            let color_attachments = [RenderPassColorAttachment {
                view: output_view,
                ops: Operations::clear(LinearRgba::TRANSPARENT),
            }];
            {
                let mut pass = ctx
                    .encoder
                    .begin_render_pass(&RenderPassDescriptor {
                        label: Some(stage.label.as_ref()),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment: None,
                    })
                    .map_err(frame_error)?;
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, scene.bind_group, &[scene.offset]);
                pass.set_bind_group(1, textures, &[]);
                pass.set_bind_group(2, params, &[]);
                pass.draw(0..3, 0..1);
            }
            ctx.hazards.end_pass();
            ctx.stats.render_passes += 1;
            ctx.stats.draw_calls += 1;
            ctx.stats.post_stages += 1;
            log::trace!("Post stage '{}' routed {:?}", stage.label, route);
        }

        buffers.post_buffers_mut().set_current_index(plan.final_current);

        if anti_aliasing {
            if let Some(last) = plan.routes.last() {
                let source = buffers.post_buffers().member(last.input).texture;
                let destination = buffers.history_buffers().current().texture;
                ctx.encoder
                    .copy_texture_to_texture(source, destination, buffers.extent())
                    .map_err(frame_error)?;
                buffers.history_buffers_mut().swap();
                ctx.stats.history_updated = true;
            }
        }
        Ok(())
    }

    /// Releases every layout and cached pipeline.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for (_, pipeline) in self.pipelines.drain() {
            if let Err(e) = device.destroy_render_pipeline(pipeline) {
                log::warn!("Failed to destroy post pipeline {pipeline:?}: {e:?}");
            }
        }
        let layouts = self
            .texture_layouts
            .drain()
            .map(|(_, layout)| layout)
            .chain([self.sampler_layout, self.sampler_constants_layout]);
        for layout in layouts {
            if let Err(e) = device.destroy_bind_group_layout(layout) {
                log::warn!("Failed to destroy post layout {layout:?}: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chain_lights_into_presentation() {
        let plan = plan_post_chain(0, 1);
        assert_eq!(plan.lighting_output, ChainTarget::Presentation);
        assert!(plan.routes.is_empty());
        assert_eq!(plan.final_current, 1);
    }

    #[test]
    fn test_single_stage_writes_presentation() {
        let plan = plan_post_chain(1, 0);
        assert_eq!(plan.lighting_output, ChainTarget::PostBuffer(0));
        assert_eq!(
            plan.routes,
            vec![StageRoute {
                input: 0,
                output: ChainTarget::Presentation
            }]
        );
        assert_eq!(plan.final_current, 0);
    }

    #[test]
    fn test_three_stages_ping_pong() {
        let plan = plan_post_chain(3, 0);
        assert_eq!(plan.lighting_output, ChainTarget::PostBuffer(0));
        assert_eq!(
            plan.routes,
            vec![
                StageRoute {
                    input: 0,
                    output: ChainTarget::PostBuffer(1)
                },
                StageRoute {
                    input: 1,
                    output: ChainTarget::PostBuffer(0)
                },
                StageRoute {
                    input: 0,
                    output: ChainTarget::Presentation
                },
            ]
        );
        assert_eq!(plan.final_current, 0);
    }

    #[test]
    fn test_plan_starts_from_the_current_buffer() {
        let plan = plan_post_chain(2, 1);
        assert_eq!(plan.lighting_output, ChainTarget::PostBuffer(1));
        assert_eq!(plan.routes[0].output, ChainTarget::PostBuffer(0));
        assert_eq!(plan.routes[1].input, 0);
        assert_eq!(plan.final_current, 0);
    }

    #[test]
    fn test_duplicate_slots_are_rejected() {
        let stage = PostProcessStage::new("fog", ShaderModuleId(1), "fs_fog");
        assert!(stage.validate_slots().is_ok());

        let clash = stage
            .clone()
            .with_binding("ao", 1, PostInputSource::Channel(AttributeChannel::AoPing));
        assert!(matches!(
            clash.validate_slots(),
            Err(RenderError::InvalidConfiguration(_))
        ));

        let same_inputs = stage.with_input_slots(2, 2);
        assert!(same_inputs.validate_slots().is_err());
    }
}
