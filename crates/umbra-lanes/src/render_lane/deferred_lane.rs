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

//! The deferred pipeline orchestrator.
//!
//! [`DeferredLane::render`] records one frame as six fixed stages in one
//! command buffer:
//!
//! 1. scene constants upload
//! 2. geometry into the attribute channels, depth and stencil
//! 3. stencil-filtered decals over a read-only depth attachment
//! 4. ambient occlusion and its smoothing pass, when the post tier asks for it
//! 5. the lighting resolve
//! 6. the post-process chain
//!
//! A failing stage aborts the frame. The frame's transient bind groups are
//! released whether it succeeds or not.

use super::{
    config::RendererConfig,
    draw_queue::{DrawQueue, GpuMesh, Opacity},
    frame::{frame_error, DynamicBinding, FrameContext, FrameStats, PresentTarget},
    frame_buffers::{FrameBufferSet, HDR_FORMAT},
    hazards::{DepthAccess, InputScope},
    lane_resources::{
        fullscreen_pipeline_descriptor, release_objects, AoResources, GpuObject, LaneResources,
        UNIT_CUBE_INDICES,
    },
    layout_registry::LayoutRegistry,
    post_chain::{plan_post_chain, ChainPlan, ChainTarget, PostChainExecutor},
    quality::{AoSettings, LightingVariant, QualitySelector},
    scene::{
        jitter_offset, DrawConstants, EnvironmentMaps, SceneConstants,
        SCENE_FLAG_AMBIENT_OCCLUSION, SCENE_FLAG_ANTI_ALIASING,
    },
    session::RenderSession,
    shader_library::ShaderLibrary,
    RenderLane,
};
use ahash::AHashMap;
use umbra_core::{
    math::{LinearRgba, Vec2},
    renderer::{
        api::{
            BindGroupDescriptor, BindGroupEntry, BindGroupId, ColorTargetStateDescriptor,
            FrameStage, GpuHook, IndexFormat, Operations, RenderPassColorAttachment,
            RenderPassDescriptor, RenderPipelineId, SamplerId, StageTimings, TextureFormat, TextureId,
            TextureViewId, TimestampReadback, UniformBindingTemplate, WriteDiscardBuffer,
            MIN_UNIFORM_ALIGNMENT,
        },
        traits::{GraphicsDevice, RenderPass},
        RenderError, ResourceError,
    },
};

/// Initial per-slot capacity of the draw constants ring, in draws.
const DRAW_CONSTANTS_PER_CHUNK: u32 = 256;

/// What one rendered frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Index of the frame.
    pub frame_index: u64,
    /// The lighting variant the frame was resolved with.
    pub variant: LightingVariant,
    /// Counters gathered while recording.
    pub stats: FrameStats,
    /// GPU timings of the previous frame, read back when this one started.
    pub gpu_timings: TimestampReadback,
}

impl FrameReport {
    /// Draw calls issued, every stage included.
    pub fn draw_calls(&self) -> u32 {
        self.stats.draw_calls
    }

    /// Render passes begun.
    pub fn render_passes(&self) -> u32 {
        self.stats.render_passes
    }

    /// Post-process stages executed.
    pub fn post_stages(&self) -> u32 {
        self.stats.post_stages
    }

    /// Per-stage GPU durations of the previous frame, when available.
    pub fn stage_timings(&self) -> Option<&StageTimings> {
        self.gpu_timings.timings()
    }
}

#[derive(Debug)]
struct FrameUploads {
    scene: WriteDiscardBuffer,
    draw: WriteDiscardBuffer,
    post_constants: WriteDiscardBuffer,
}

impl FrameUploads {
    fn create(device: &dyn GraphicsDevice, resources: &LaneResources) -> Result<Self, ResourceError> {
        let scene = WriteDiscardBuffer::new(
            device,
            "Scene Constants",
            4 * MIN_UNIFORM_ALIGNMENT,
            Some(UniformBindingTemplate {
                layout: resources.scene_layout,
                binding: 0,
                element_size: std::mem::size_of::<SceneConstants>() as u32,
            }),
        )?;
        let draw = match WriteDiscardBuffer::new(
            device,
            "Draw Constants",
            DRAW_CONSTANTS_PER_CHUNK * MIN_UNIFORM_ALIGNMENT,
            Some(UniformBindingTemplate {
                layout: resources.draw_layout,
                binding: 0,
                element_size: std::mem::size_of::<DrawConstants>() as u32,
            }),
        ) {
            Ok(draw) => draw,
            Err(e) => {
                scene.destroy(device);
                return Err(e);
            }
        };
        let post_constants =
            match WriteDiscardBuffer::new(device, "Post Constants", 16 * MIN_UNIFORM_ALIGNMENT, None)
            {
                Ok(post_constants) => post_constants,
                Err(e) => {
                    scene.destroy(device);
                    draw.destroy(device);
                    return Err(e);
                }
            };
        Ok(Self {
            scene,
            draw,
            post_constants,
        })
    }

    fn advance(&mut self) {
        self.scene.advance();
        self.draw.advance();
        self.post_constants.advance();
    }

    fn draw_binding(
        &mut self,
        device: &dyn GraphicsDevice,
        constants: &DrawConstants,
    ) -> Result<DynamicBinding, RenderError> {
        let region = self.draw.write_pod(device, constants).map_err(frame_error)?;
        DynamicBinding::from_region(region, "draw constants")
    }

    fn destroy(&self, device: &dyn GraphicsDevice) {
        self.scene.destroy(device);
        self.draw.destroy(device);
        self.post_constants.destroy(device);
    }
}

#[derive(Debug, Clone, Copy)]
struct SurfaceDraw {
    pipeline: RenderPipelineId,
    mesh: GpuMesh,
    constants: DynamicBinding,
    stencil: u32,
    bones: Option<BindGroupId>,
}

#[derive(Debug, Clone, Copy)]
struct DecalDraw {
    constants: DynamicBinding,
    textures: BindGroupId,
    stencil: u32,
}

/// The deferred rendering pipeline.
///
/// Owns every object created at construction: layouts, shader modules, the
/// geometry and decal pipelines, the lighting pipeline of the selected
/// variant, the ambient occlusion kernel and noise, and the upload rings.
/// Frame targets live in a separate [`FrameBufferSet`] so they can be
/// reallocated on resize without rebuilding the lane.
#[derive(Debug)]
pub struct DeferredLane {
    resources: LaneResources,
    objects: Vec<GpuObject>,
    uploads: FrameUploads,
    post_chain: PostChainExecutor,
    lighting_pipelines: AHashMap<TextureFormat, RenderPipelineId>,
    selector: QualitySelector,
    anti_aliasing: bool,
    gpu_timestamps: bool,
    clear_color: LinearRgba,
    environment: Option<EnvironmentMaps>,
    last_report: Option<FrameReport>,
}

impl DeferredLane {
    /// Builds the lane for the quality tiers of `config`.
    ///
    /// The lighting variant is chosen here and fixed for the lifetime of the
    /// lane.
    ///
    /// ## Errors
    /// - [`RenderError::ConfigurationOverflow`] for more ambient occlusion
    ///   samples than the kernel holds, [`RenderError::InvalidConfiguration`]
    ///   for a bad radius.
    /// - [`RenderError::ResourceCreationFailure`] when a shader, layout or
    ///   pipeline cannot be created. Objects created before the failure are
    ///   released.
    /// - [`RenderError::DeviceLost`] when the device is gone.
    pub fn new(
        session: &RenderSession,
        config: &RendererConfig,
        shaders: &ShaderLibrary,
    ) -> Result<Self, RenderError> {
        session.ensure_device()?;
        let selector = QualitySelector::from_config(&config.quality)?;
        let device = session.device();

        let gpu_timestamps = config.gpu_timestamps && session.profiler().is_some();
        if config.gpu_timestamps && !gpu_timestamps {
            log::debug!("GPU timestamps requested but the session has no profiler");
        }

        let mut objects = Vec::new();
        let (resources, uploads, post_chain) =
            match Self::create_parts(device, shaders, &selector, &mut objects) {
                Ok(parts) => parts,
                Err(e) => {
                    log::error!("Failed to build the deferred lane: {e}");
                    release_objects(device, &mut objects);
                    return Err(e.into());
                }
            };

        let mut lane = Self {
            resources,
            objects,
            uploads,
            post_chain,
            lighting_pipelines: AHashMap::new(),
            selector,
            anti_aliasing: selector.anti_aliasing(),
            gpu_timestamps,
            clear_color: config.clear_color,
            environment: None,
            last_report: None,
        };
        if let Err(e) = lane.lighting_pipeline(device, HDR_FORMAT) {
            lane.destroy(session);
            return Err(e.into());
        }

        log::info!(
            "Deferred lane ready: lighting '{}', post effects {:?}, anti-aliasing {}",
            selector.variant().entry_point(),
            selector.post_effects(),
            lane.anti_aliasing
        );
        Ok(lane)
    }

    fn create_parts(
        device: &dyn GraphicsDevice,
        shaders: &ShaderLibrary,
        selector: &QualitySelector,
        objects: &mut Vec<GpuObject>,
    ) -> Result<(LaneResources, FrameUploads, PostChainExecutor), ResourceError> {
        let resources = LaneResources::create(
            device,
            shaders,
            selector.variant(),
            selector.ao_settings(),
            objects,
        )?;
        let uploads = FrameUploads::create(device, &resources)?;
        match PostChainExecutor::new(
            device,
            resources.fullscreen_module,
            resources.scene_layout,
            resources.linear_sampler,
        ) {
            Ok(post_chain) => Ok((resources, uploads, post_chain)),
            Err(e) => {
                uploads.destroy(device);
                Err(e)
            }
        }
    }

    /// The lighting variant selected at construction.
    pub fn variant(&self) -> LightingVariant {
        self.selector.variant()
    }

    /// The quality selection of the lane.
    pub fn quality(&self) -> &QualitySelector {
        &self.selector
    }

    /// The current ambient occlusion settings.
    pub fn ao_settings(&self) -> AoSettings {
        self.selector.ao_settings()
    }

    /// Whether the post chain feeds the anti-aliasing history.
    pub fn anti_aliasing(&self) -> bool {
        self.anti_aliasing
    }

    /// Enables or disables the anti-aliasing history and jitter.
    pub fn set_anti_aliasing(&mut self, enabled: bool) {
        if self.anti_aliasing != enabled {
            log::debug!("Anti-aliasing {}", if enabled { "enabled" } else { "disabled" });
        }
        self.anti_aliasing = enabled;
    }

    /// Sets the image-based lighting inputs. Without them the resolve samples
    /// a neutral grey environment.
    pub fn set_environment(&mut self, maps: Option<EnvironmentMaps>) {
        self.environment = maps;
    }

    /// Background color of the attribute channels.
    pub fn set_clear_color(&mut self, color: LinearRgba) {
        self.clear_color = color;
    }

    /// The report of the last successful frame.
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Changes the ambient occlusion sample count and radius.
    ///
    /// The lighting variant is kept, even when it does not sample ambient
    /// occlusion. The new kernel is used from the next frame.
    ///
    /// ## Errors
    /// [`RenderError::ConfigurationOverflow`] for a sample count outside
    /// `1..=MAX_AO_SAMPLES`, [`RenderError::InvalidConfiguration`] for a bad
    /// radius. The settings are unchanged on error.
    pub fn reconfigure_ambient_occlusion(
        &mut self,
        session: &RenderSession,
        sample_count: u32,
        radius: f32,
    ) -> Result<(), RenderError> {
        let settings = AoSettings::new(sample_count, radius)?;
        session.ensure_device()?;
        if let Some(ao) = &self.resources.ao {
            session
                .device()
                .write_buffer(ao.kernel, 0, bytemuck::bytes_of(&settings.kernel()))
                .map_err(frame_error)?;
        }
        self.selector.set_ao_settings(settings);
        log::debug!(
            "Ambient occlusion set to {} samples, radius {}; lighting '{}' kept",
            settings.sample_count(),
            settings.radius(),
            self.variant().entry_point()
        );
        Ok(())
    }

    /// Records and submits one frame into `target`.
    ///
    /// `buffers` must have been allocated on the same session. Its camera is
    /// the one the frame renders from, and its post, history and ambient
    /// occlusion roles are updated by the frame.
    ///
    /// ## Errors
    /// - [`RenderError::DeviceLost`] when the device is gone.
    /// - [`RenderError::BindingHazard`] when a pass would sample one of its
    ///   own attachments.
    /// - [`RenderError::InvalidConfiguration`] for a post stage that uses one
    ///   slot twice.
    /// - [`RenderError::RenderingFailed`] when recording or submission fails.
    ///
    /// A failed frame is not submitted and does not advance the frame index.
    pub fn render(
        &mut self,
        session: &mut RenderSession,
        queue: &DrawQueue,
        buffers: &mut FrameBufferSet,
        target: &PresentTarget,
    ) -> Result<FrameReport, RenderError> {
        session.ensure_device()?;
        for stage in queue.post_stages() {
            stage.validate_slots()?;
        }

        let gpu_timings = if self.gpu_timestamps {
            session.read_previous_timings()
        } else {
            TimestampReadback::Disabled
        };
        let frame_index = session.frame_index();
        self.uploads.advance();
        let plan = plan_post_chain(
            queue.post_stages().len(),
            buffers.post_buffers().current_index(),
        );

        let device = session.device();
        let profiler = if self.gpu_timestamps {
            session.profiler()
        } else {
            None
        };
        let mut encoder = device
            .create_command_encoder(Some("Deferred Frame"))
            .map_err(frame_error)?;
        let (recorded, stats) = {
            let mut ctx = FrameContext::new(device, encoder.as_mut(), profiler);
            let recorded = self.record(&mut ctx, queue, buffers, target, &plan, frame_index);
            ctx.release_bindings();
            (recorded, ctx.stats)
        };
        if let Err(e) = recorded {
            log::error!("Frame {frame_index} aborted: {e}");
            return Err(e);
        }

        if let Some(profiler) = profiler {
            profiler.resolve_and_copy(encoder.as_mut(), frame_index);
        }
        let command_buffer = encoder.finish().map_err(frame_error)?;
        device
            .submit_command_buffer(command_buffer)
            .map_err(frame_error)?;
        session.finish_frame(self.gpu_timestamps);

        let report = FrameReport {
            frame_index,
            variant: self.selector.variant(),
            stats,
            gpu_timings,
        };
        log::debug!(
            "Frame {}: {} passes, {} draws, {} decals, {} post stages",
            frame_index,
            stats.render_passes,
            stats.draw_calls,
            stats.decals_drawn,
            stats.post_stages
        );
        self.last_report = Some(report);
        Ok(report)
    }

    fn record(
        &mut self,
        ctx: &mut FrameContext<'_>,
        queue: &DrawQueue,
        buffers: &mut FrameBufferSet,
        target: &PresentTarget,
        plan: &ChainPlan,
        frame_index: u64,
    ) -> Result<(), RenderError> {
        ctx.hook(GpuHook::FrameStart);

        self.upload_scene(ctx, buffers, frame_index)?;
        ctx.hook(GpuHook::StageEnd(FrameStage::SceneConstants));

        self.geometry_stage(ctx, queue, buffers)?;
        ctx.hook(GpuHook::StageEnd(FrameStage::Geometry));

        self.decal_stage(ctx, queue, buffers)?;
        ctx.hook(GpuHook::StageEnd(FrameStage::Decals));

        if let Some(ao) = self.resources.ao {
            Self::ambient_occlusion_stage(ctx, &ao, self.resources.linear_sampler, buffers)?;
        }
        ctx.hook(GpuHook::StageEnd(FrameStage::AmbientOcclusion));

        self.lighting_stage(ctx, buffers, target, plan)?;
        ctx.stats.point_lights_skipped = queue.point_lights().len() as u32;
        if !queue.point_lights().is_empty() {
            log::trace!(
                "{} point lights queued, the resolve only evaluates the environment",
                queue.point_lights().len()
            );
        }
        ctx.hook(GpuHook::StageEnd(FrameStage::Lighting));

        self.post_chain.execute(
            ctx,
            queue.post_stages(),
            plan,
            buffers,
            target,
            &mut self.uploads.post_constants,
            self.anti_aliasing,
        )?;
        ctx.hook(GpuHook::StageEnd(FrameStage::PostProcess));
        Ok(())
    }

    fn upload_scene(
        &mut self,
        ctx: &mut FrameContext<'_>,
        buffers: &FrameBufferSet,
        frame_index: u64,
    ) -> Result<(), RenderError> {
        let extent = buffers.extent();
        let jitter = if self.anti_aliasing {
            jitter_offset(frame_index, extent.width, extent.height)
        } else {
            Vec2::ZERO
        };
        let convolution_steps = self
            .environment
            .map(|maps| maps.convolution_steps.max(1))
            .unwrap_or(1);
        let mut flags = 0;
        if self.selector.ambient_occlusion_enabled() {
            flags |= SCENE_FLAG_AMBIENT_OCCLUSION;
        }
        if self.anti_aliasing {
            flags |= SCENE_FLAG_ANTI_ALIASING;
        }
        let constants = SceneConstants::new(
            buffers.camera(),
            extent.width,
            extent.height,
            jitter,
            convolution_steps,
            flags,
        );
        let region = self
            .uploads
            .scene
            .write_pod(ctx.device, &constants)
            .map_err(frame_error)?;
        ctx.scene = Some(DynamicBinding::from_region(region, "scene constants")?);
        Ok(())
    }

    fn geometry_stage(
        &mut self,
        ctx: &mut FrameContext<'_>,
        queue: &DrawQueue,
        buffers: &FrameBufferSet,
    ) -> Result<(), RenderError> {
        let scene = ctx.scene()?;
        let mut draws = Vec::with_capacity(queue.len());

        // Opaque before stippled, static layouts in registry order, then skinned.
        for opacity in [Opacity::Opaque, Opacity::Transparent] {
            for entry in LayoutRegistry::standard().entries() {
                let pipeline = self.resources.static_pipelines[entry.bucket].select(opacity);
                for item in queue.static_items(entry.tag, opacity) {
                    let constants = self.uploads.draw_binding(
                        ctx.device,
                        &DrawConstants::new(item.transform, item.alpha, 0.0, item.group_mask.0),
                    )?;
                    draws.push(SurfaceDraw {
                        pipeline,
                        mesh: item.mesh,
                        constants,
                        stencil: item.group_mask.reference(),
                        bones: None,
                    });
                    match opacity {
                        Opacity::Opaque => ctx.stats.static_draws += 1,
                        Opacity::Transparent => ctx.stats.stippled_draws += 1,
                    }
                }
            }

            let pipeline = self.resources.skinned_pipelines.select(opacity);
            for item in queue.skinned_items(opacity) {
                let frames = item.bone_frames;
                let constants = self.uploads.draw_binding(
                    ctx.device,
                    &DrawConstants::new(
                        item.transform,
                        item.alpha,
                        frames.effective_blend(),
                        item.group_mask.0,
                    ),
                )?;
                let bones = ctx.transient_bind_group(&BindGroupDescriptor {
                    label: Some("Bone Frames"),
                    layout: self.resources.skin_layout,
                    entries: &[
                        BindGroupEntry::buffer(0, frames.primary, 0, None),
                        BindGroupEntry::buffer(1, frames.secondary_or_primary(), 0, None),
                    ],
                })?;
                draws.push(SurfaceDraw {
                    pipeline,
                    mesh: item.mesh,
                    constants,
                    stencil: item.group_mask.reference(),
                    bones: Some(bones),
                });
                match opacity {
                    Opacity::Opaque => ctx.stats.skinned_draws += 1,
                    Opacity::Transparent => ctx.stats.stippled_draws += 1,
                }
            }
        }

        let [color, normal, specular] = buffers.geometry_channels();
        let depth = buffers.depth_stencil();
        ctx.hazards.begin_pass(
            "geometry",
            &[color.texture, normal.texture, specular.texture],
            Some((depth.texture, DepthAccess::ReadWrite)),
        )?;
        let color_attachments = [
            RenderPassColorAttachment {
                view: color.render_view,
                ops: Operations::clear(self.clear_color),
            },
            RenderPassColorAttachment {
                view: normal.render_view,
                ops: Operations::clear(LinearRgba::TRANSPARENT),
            },
            RenderPassColorAttachment {
                view: specular.render_view,
                ops: Operations::clear(LinearRgba::TRANSPARENT),
            },
        ];
        {
            let mut pass = ctx
                .encoder
                .begin_render_pass(&RenderPassDescriptor {
                    label: Some("Geometry"),
                    color_attachments: &color_attachments,
                    depth_stencil_attachment: Some(depth.read_write.clearing_attachment(1.0, 0)),
                })
                .map_err(frame_error)?;
            record_surface_draws(&mut *pass, scene, &draws);
        }
        ctx.hazards.end_pass();
        ctx.stats.render_passes += 1;
        ctx.stats.draw_calls += draws.len() as u32;
        log::trace!("Geometry stage recorded {} draws", draws.len());
        Ok(())
    }

    fn decal_stage(
        &mut self,
        ctx: &mut FrameContext<'_>,
        queue: &DrawQueue,
        buffers: &FrameBufferSet,
    ) -> Result<(), RenderError> {
        let scene = ctx.scene()?;
        let [color, normal, specular] = buffers.geometry_channels();
        let depth = buffers.depth_stencil();
        ctx.hazards.begin_pass(
            "decals",
            &[color.texture, normal.texture, specular.texture],
            Some((depth.texture, DepthAccess::ReadOnly)),
        )?;

        let mut draws = Vec::with_capacity(queue.decals().len());
        if !queue.decals().is_empty() {
            ctx.hazards.bind_input(depth.texture, InputScope::Frame)?;
        }
        for decal in queue.decals() {
            let constants = self.uploads.draw_binding(
                ctx.device,
                &DrawConstants::new(decal.transform, 1.0, 0.0, decal.filter.0),
            )?;
            let textures = ctx.transient_bind_group(&BindGroupDescriptor {
                label: Some("Decal Textures"),
                layout: self.resources.decal_layout,
                entries: &[
                    BindGroupEntry::texture(0, decal.albedo),
                    BindGroupEntry::texture(1, decal.normal_map),
                    BindGroupEntry::texture(2, depth.sampled.view()),
                    BindGroupEntry::sampler(3, self.resources.linear_sampler),
                ],
            })?;
            draws.push(DecalDraw {
                constants,
                textures,
                stencil: decal.filter.reference(),
            });
        }

        let color_attachments = [
            RenderPassColorAttachment {
                view: color.render_view,
                ops: Operations::load(),
            },
            RenderPassColorAttachment {
                view: normal.render_view,
                ops: Operations::load(),
            },
            RenderPassColorAttachment {
                view: specular.render_view,
                ops: Operations::load(),
            },
        ];
        {
            let mut pass = ctx
                .encoder
                .begin_render_pass(&RenderPassDescriptor {
                    label: Some("Decals"),
                    color_attachments: &color_attachments,
                    depth_stencil_attachment: Some(depth.read_only.attachment()),
                })
                .map_err(frame_error)?;
            if !draws.is_empty() {
                pass.set_pipeline(self.resources.decal_pipeline);
                pass.set_bind_group(0, scene.bind_group, &[scene.offset]);
                pass.set_vertex_buffer(0, self.resources.unit_cube_vertices, 0);
                pass.set_index_buffer(self.resources.unit_cube_indices, 0, IndexFormat::Uint16);
                for draw in &draws {
                    pass.set_bind_group(1, draw.constants.bind_group, &[draw.constants.offset]);
                    pass.set_bind_group(2, draw.textures, &[]);
                    pass.set_stencil_reference(draw.stencil);
                    pass.draw_indexed(0..UNIT_CUBE_INDICES.len() as u32, 0, 0..1);
                }
            }
        }
        ctx.hazards.end_pass();
        ctx.stats.render_passes += 1;
        ctx.stats.draw_calls += draws.len() as u32;
        ctx.stats.decals_drawn += draws.len() as u32;
        Ok(())
    }

    fn ambient_occlusion_stage(
        ctx: &mut FrameContext<'_>,
        ao: &AoResources,
        sampler: SamplerId,
        buffers: &mut FrameBufferSet,
    ) -> Result<(), RenderError> {
        let scene = ctx.scene()?;
        let normal = *buffers.geometry_channels()[1];
        let depth = *buffers.depth_stencil();
        let raw = *buffers.ao_buffers().current();
        let smoothed = *buffers.ao_buffers().other();

        ctx.hazards.begin_pass("ambient_occlusion", &[raw.texture], None)?;
        ctx.hazards.bind_input(normal.texture, InputScope::Frame)?;
        ctx.hazards.bind_input(depth.texture, InputScope::Frame)?;
        let inputs = ctx.transient_bind_group(&BindGroupDescriptor {
            label: Some("Ambient Occlusion Inputs"),
            layout: ao.layout,
            entries: &[
                BindGroupEntry::texture(0, normal.sampled_view),
                BindGroupEntry::texture(1, depth.sampled.view()),
                BindGroupEntry::texture(2, ao.noise),
                BindGroupEntry::buffer(3, ao.kernel, 0, None),
            ],
        })?;
        fullscreen_pass(
            ctx,
            "Ambient Occlusion",
            raw.render_view,
            LinearRgba::WHITE,
            ao.pipeline,
            scene,
            inputs,
        )?;
        ctx.hazards.end_pass();

        ctx.hazards.begin_pass("ambient_occlusion_blur", &[smoothed.texture], None)?;
        ctx.hazards.bind_input(raw.texture, InputScope::Pass)?;
        let blur_inputs = ctx.transient_bind_group(&BindGroupDescriptor {
            label: Some("Ambient Occlusion Blur Inputs"),
            layout: ao.blur_layout,
            entries: &[
                BindGroupEntry::texture(0, raw.sampled_view),
                BindGroupEntry::sampler(1, sampler),
            ],
        })?;
        fullscreen_pass(
            ctx,
            "Ambient Occlusion Blur",
            smoothed.render_view,
            LinearRgba::WHITE,
            ao.blur_pipeline,
            scene,
            blur_inputs,
        )?;
        ctx.hazards.end_pass();

        buffers.ao_buffers_mut().swap();
        ctx.stats.ambient_occlusion_ran = true;
        Ok(())
    }

    fn lighting_stage(
        &mut self,
        ctx: &mut FrameContext<'_>,
        buffers: &FrameBufferSet,
        target: &PresentTarget,
        plan: &ChainPlan,
    ) -> Result<(), RenderError> {
        let scene = ctx.scene()?;
        let (view, output, format): (TextureViewId, Option<TextureId>, TextureFormat) =
            match plan.lighting_output {
                ChainTarget::PostBuffer(index) => {
                    let output = buffers.post_buffers().member(index);
                    (output.render_view, Some(output.texture), output.format)
                }
                ChainTarget::Presentation => (target.view, None, target.format),
            };
        let pipeline = self
            .lighting_pipeline(ctx.device, format)
            .map_err(frame_error)?;

        let outputs: Vec<TextureId> = output.into_iter().collect();
        ctx.hazards.begin_pass("lighting", &outputs, None)?;
        let [color, normal, specular] = buffers.geometry_channels();
        let depth = buffers.depth_stencil();
        for texture in [color.texture, normal.texture, specular.texture, depth.texture] {
            ctx.hazards.bind_input(texture, InputScope::Frame)?;
        }

        let (irradiance, reflection) = match self.environment {
            Some(maps) => (maps.irradiance, maps.reflection),
            None => (
                self.resources.neutral_environment,
                self.resources.neutral_environment,
            ),
        };
        let mut entries = vec![
            BindGroupEntry::texture(0, color.sampled_view),
            BindGroupEntry::texture(1, normal.sampled_view),
            BindGroupEntry::texture(2, specular.sampled_view),
            BindGroupEntry::texture(3, depth.sampled.view()),
            BindGroupEntry::texture(4, irradiance),
            BindGroupEntry::texture(5, reflection),
            BindGroupEntry::sampler(6, self.resources.linear_sampler),
        ];
        if self.selector.variant().ambient_occlusion {
            let ao = buffers.ao_buffers().current();
            ctx.hazards.bind_input(ao.texture, InputScope::Frame)?;
            entries.push(BindGroupEntry::texture(7, ao.sampled_view));
        }
        let inputs = ctx.transient_bind_group(&BindGroupDescriptor {
            label: Some("Lighting Inputs"),
            layout: self.resources.lighting_layout,
            entries: &entries,
        })?;
        fullscreen_pass(
            ctx,
            "Lighting",
            view,
            LinearRgba::TRANSPARENT,
            pipeline,
            scene,
            inputs,
        )?;
        ctx.hazards.end_pass();
        Ok(())
    }

    /// The lighting pipeline writing `format`, created on first use.
    fn lighting_pipeline(
        &mut self,
        device: &dyn GraphicsDevice,
        format: TextureFormat,
    ) -> Result<RenderPipelineId, ResourceError> {
        if let Some(pipeline) = self.lighting_pipelines.get(&format) {
            return Ok(*pipeline);
        }
        let variant = self.selector.variant();
        let layouts = [self.resources.scene_layout, self.resources.lighting_layout];
        let targets = [ColorTargetStateDescriptor::replace(format)];
        let pipeline = device.create_render_pipeline(&fullscreen_pipeline_descriptor(
            format!("Lighting Pipeline ({} to {:?})", variant.entry_point(), format),
            &layouts,
            self.resources.fullscreen_module,
            self.resources.lighting_module,
            variant.entry_point(),
            &targets,
        ))?;
        log::debug!(
            "Created lighting pipeline '{}' for {:?}",
            variant.entry_point(),
            format
        );
        self.lighting_pipelines.insert(format, pipeline);
        Ok(pipeline)
    }

    /// Releases every object the lane created.
    pub fn destroy(mut self, session: &RenderSession) {
        let device = session.device();
        for (_, pipeline) in self.lighting_pipelines.drain() {
            if let Err(e) = device.destroy_render_pipeline(pipeline) {
                log::warn!("Failed to destroy lighting pipeline {pipeline:?}: {e:?}");
            }
        }
        self.post_chain.destroy(device);
        self.uploads.destroy(device);
        release_objects(device, &mut self.objects);
        log::info!("Deferred lane destroyed");
    }
}

impl RenderLane for DeferredLane {
    fn strategy_name(&self) -> &'static str {
        "Deferred"
    }

    fn render(
        &mut self,
        session: &mut RenderSession,
        queue: &DrawQueue,
        buffers: &mut FrameBufferSet,
        target: &PresentTarget,
    ) -> Result<FrameReport, RenderError> {
        DeferredLane::render(self, session, queue, buffers, target)
    }
}

fn record_surface_draws(pass: &mut dyn RenderPass<'_>, scene: DynamicBinding, draws: &[SurfaceDraw]) {
    let mut bound_pipeline = None;
    for draw in draws {
        if bound_pipeline != Some(draw.pipeline) {
            pass.set_pipeline(draw.pipeline);
            pass.set_bind_group(0, scene.bind_group, &[scene.offset]);
            bound_pipeline = Some(draw.pipeline);
        }
        pass.set_bind_group(1, draw.constants.bind_group, &[draw.constants.offset]);
        if let Some(bones) = draw.bones {
            pass.set_bind_group(2, bones, &[]);
        }
        pass.set_stencil_reference(draw.stencil);
        pass.set_vertex_buffer(0, draw.mesh.vertex_buffer, 0);
        pass.set_index_buffer(draw.mesh.index_buffer, 0, draw.mesh.index_format);
        pass.draw_indexed(0..draw.mesh.index_count, 0, 0..1);
    }
}

/// Records a pass drawing the full-screen triangle into one cleared target.
fn fullscreen_pass(
    ctx: &mut FrameContext<'_>,
    label: &str,
    view: TextureViewId,
    clear: LinearRgba,
    pipeline: RenderPipelineId,
    scene: DynamicBinding,
    inputs: BindGroupId,
) -> Result<(), RenderError> {
    let color_attachments = [RenderPassColorAttachment {
        view,
        ops: Operations::clear(clear),
    }];
    {
        let mut pass = ctx
            .encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: Some(label),
                color_attachments: &color_attachments,
                depth_stencil_attachment: None,
            })
            .map_err(frame_error)?;
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, scene.bind_group, &[scene.offset]);
        pass.set_bind_group(1, inputs, &[]);
        pass.draw(0..3, 0..1);
    }
    ctx.stats.render_passes += 1;
    ctx.stats.draw_calls += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_exposes_stats() {
        let report = FrameReport {
            frame_index: 3,
            variant: LightingVariant::ALL[5],
            stats: FrameStats {
                render_passes: 6,
                draw_calls: 9,
                post_stages: 2,
                ..Default::default()
            },
            gpu_timings: TimestampReadback::Disabled,
        };
        assert_eq!(report.render_passes(), 6);
        assert_eq!(report.draw_calls(), 9);
        assert_eq!(report.post_stages(), 2);
        assert!(report.stage_timings().is_none());
    }

    #[test]
    fn test_draw_constants_fit_one_aligned_window() {
        assert!(std::mem::size_of::<DrawConstants>() as u32 <= MIN_UNIFORM_ALIGNMENT);
        assert!(std::mem::size_of::<SceneConstants>() as u32 <= 2 * MIN_UNIFORM_ALIGNMENT);
    }
}
