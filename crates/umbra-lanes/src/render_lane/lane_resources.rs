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

//! Construction-time GPU objects of the deferred lane: bind group layouts,
//! shader modules, pipelines, samplers and the small fixed textures and
//! buffers every frame reuses.

use super::{
    draw_queue::Opacity,
    frame_buffers::{
        AO_FORMAT, COLOR_FORMAT, DEPTH_STENCIL_FORMAT, NORMAL_FORMAT, SPECULAR_FORMAT,
    },
    layout_registry::{LayoutRegistry, DECAL_VOLUME_LAYOUT, SKINNED_VERTEX_LAYOUT},
    quality::{AoSettings, LightingVariant},
    scene::halton,
    shader_library::{ShaderKey, ShaderLibrary},
};
use std::borrow::Cow;
use umbra_core::{
    math::{Extent3D, Origin3D},
    renderer::{
        api::{
            BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindGroupLayoutId,
            BlendStateDescriptor, BufferDescriptor, BufferId, BufferUsage, ColorTargetStateDescriptor,
            ColorWrites, CompareFunction, CullMode, DepthStencilStateDescriptor, FilterMode,
            ImageDataLayout, PrimitiveStateDescriptor, RenderPipelineDescriptor, RenderPipelineId,
            SamplerBindingType, SamplerDescriptor, SamplerId, ShaderModuleId, ShaderStageFlags,
            StencilFaceState, StencilOperation, TextureCopyTarget, TextureDescriptor,
            TextureDimension, TextureFormat, TextureId, TextureSampleType, TextureUsage,
            TextureViewDescriptor, TextureViewDimension, TextureViewId, VertexBufferLayoutDescriptor,
        },
        traits::GraphicsDevice,
        ResourceError,
    },
};

/// Side of the tiled ambient occlusion noise texture.
pub const NOISE_TILE_SIZE: u32 = 4;

const NEUTRAL_TEXEL: [u8; 4] = [128, 128, 128, 255];

/// Corners of the decal unit cube, centered on the origin.
const UNIT_CUBE_VERTICES: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [-0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5],
];

/// Outward-facing, counter-clockwise triangles of the unit cube.
pub(crate) const UNIT_CUBE_INDICES: [u16; 36] = [
    0, 2, 1, 1, 2, 3, // -Z
    4, 5, 6, 5, 7, 6, // +Z
    0, 4, 2, 2, 4, 6, // -X
    1, 3, 5, 3, 7, 5, // +X
    0, 1, 4, 1, 5, 4, // -Y
    2, 6, 3, 3, 6, 7, // +Y
];

/// Any object created by the lane. Kept in creation order so the lane can
/// release everything, or everything created so far when construction
/// fails part-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GpuObject {
    ShaderModule(ShaderModuleId),
    BindGroupLayout(BindGroupLayoutId),
    RenderPipeline(RenderPipelineId),
    Sampler(SamplerId),
    Texture(TextureId),
    TextureView(TextureViewId),
    Buffer(BufferId),
}

/// Destroys `objects` in reverse creation order.
pub(crate) fn release_objects(device: &dyn GraphicsDevice, objects: &mut Vec<GpuObject>) {
    while let Some(object) = objects.pop() {
        let result = match object {
            GpuObject::ShaderModule(id) => device.destroy_shader_module(id),
            GpuObject::BindGroupLayout(id) => device.destroy_bind_group_layout(id),
            GpuObject::RenderPipeline(id) => device.destroy_render_pipeline(id),
            GpuObject::Sampler(id) => device.destroy_sampler(id),
            GpuObject::Texture(id) => device.destroy_texture(id),
            GpuObject::TextureView(id) => device.destroy_texture_view(id),
            GpuObject::Buffer(id) => device.destroy_buffer(id),
        };
        if let Err(e) = result {
            log::warn!("Failed to destroy {object:?}: {e:?}");
        }
    }
}

/// Creates objects on a device and remembers them.
pub(crate) struct Tracked<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub objects: &'a mut Vec<GpuObject>,
}

impl Tracked<'_> {
    pub fn layout(
        &mut self,
        label: &str,
        entries: &[BindGroupLayoutEntry],
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let id = self.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        })?;
        self.objects.push(GpuObject::BindGroupLayout(id));
        Ok(id)
    }

    pub fn module(
        &mut self,
        shaders: &ShaderLibrary,
        key: ShaderKey,
    ) -> Result<ShaderModuleId, ResourceError> {
        let id = shaders.load(self.device, key)?;
        self.objects.push(GpuObject::ShaderModule(id));
        Ok(id)
    }

    pub fn pipeline(
        &mut self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let id = self.device.create_render_pipeline(descriptor)?;
        self.objects.push(GpuObject::RenderPipeline(id));
        Ok(id)
    }

    pub fn sampler(&mut self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let id = self.device.create_sampler(descriptor)?;
        self.objects.push(GpuObject::Sampler(id));
        Ok(id)
    }

    pub fn buffer(
        &mut self,
        label: &'static str,
        usage: BufferUsage,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let id = self.device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed(label)),
                size: data.len() as u64,
                usage,
                mapped_at_creation: false,
            },
            data,
        )?;
        self.objects.push(GpuObject::Buffer(id));
        Ok(id)
    }

    /// Creates a texture filled with `data` and a view over it.
    pub fn filled_texture(
        &mut self,
        label: &'static str,
        size: Extent3D,
        format: TextureFormat,
        data: &[u8],
        view_dimension: TextureViewDimension,
    ) -> Result<TextureViewId, ResourceError> {
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed(label)),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        self.objects.push(GpuObject::Texture(texture));
        self.device.write_texture(
            &TextureCopyTarget {
                texture,
                mip_level: 0,
                origin: Origin3D::default(),
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * format.bytes_per_pixel()),
                rows_per_image: Some(size.height),
            },
            size,
        )?;
        let view = self.device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Borrowed(label)),
                dimension: Some(view_dimension),
                array_layer_count: Some(size.depth_or_array_layers),
                ..Default::default()
            },
        )?;
        self.objects.push(GpuObject::TextureView(view));
        Ok(view)
    }
}

/// Opaque and alpha-stippled pipelines of one geometry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfacePipelines {
    pub opaque: RenderPipelineId,
    pub stippled: RenderPipelineId,
}

impl SurfacePipelines {
    pub fn select(&self, opacity: Opacity) -> RenderPipelineId {
        match opacity {
            Opacity::Opaque => self.opaque,
            Opacity::Transparent => self.stippled,
        }
    }
}

/// Objects used only when the ambient occlusion stage runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AoResources {
    pub layout: BindGroupLayoutId,
    pub blur_layout: BindGroupLayoutId,
    pub pipeline: RenderPipelineId,
    pub blur_pipeline: RenderPipelineId,
    pub noise: TextureViewId,
    pub kernel: BufferId,
}

/// Everything the lane creates once.
#[derive(Debug)]
pub(crate) struct LaneResources {
    pub scene_layout: BindGroupLayoutId,
    pub draw_layout: BindGroupLayoutId,
    pub skin_layout: BindGroupLayoutId,
    pub decal_layout: BindGroupLayoutId,
    pub lighting_layout: BindGroupLayoutId,
    pub fullscreen_module: ShaderModuleId,
    pub lighting_module: ShaderModuleId,
    /// Indexed by [`LayoutEntry::bucket`](super::layout_registry::LayoutEntry).
    pub static_pipelines: Vec<SurfacePipelines>,
    pub skinned_pipelines: SurfacePipelines,
    pub decal_pipeline: RenderPipelineId,
    pub linear_sampler: SamplerId,
    pub unit_cube_vertices: BufferId,
    pub unit_cube_indices: BufferId,
    pub neutral_environment: TextureViewId,
    pub ao: Option<AoResources>,
}

fn geometry_depth_state() -> DepthStencilStateDescriptor {
    let face = StencilFaceState {
        compare: CompareFunction::Always,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Replace,
    };
    DepthStencilStateDescriptor {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: true,
        depth_compare: CompareFunction::Less,
        stencil_front: face,
        stencil_back: face,
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0xFF,
    }
}

/// Decals test the stencil value for exact equality and never write depth
/// or stencil.
fn decal_depth_state() -> DepthStencilStateDescriptor {
    let face = StencilFaceState {
        compare: CompareFunction::Equal,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Keep,
    };
    DepthStencilStateDescriptor {
        format: DEPTH_STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: CompareFunction::Always,
        stencil_front: face,
        stencil_back: face,
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0x00,
    }
}

const GEOMETRY_TARGETS: [ColorTargetStateDescriptor; 3] = [
    ColorTargetStateDescriptor::replace(COLOR_FORMAT),
    ColorTargetStateDescriptor::replace(NORMAL_FORMAT),
    ColorTargetStateDescriptor::replace(SPECULAR_FORMAT),
];

const DECAL_TARGETS: [ColorTargetStateDescriptor; 3] = [
    ColorTargetStateDescriptor {
        format: COLOR_FORMAT,
        blend: Some(BlendStateDescriptor::ALPHA_BLENDING),
        write_mask: ColorWrites::ALL,
    },
    ColorTargetStateDescriptor {
        format: NORMAL_FORMAT,
        blend: Some(BlendStateDescriptor::ALPHA_BLENDING),
        write_mask: ColorWrites::ALL,
    },
    ColorTargetStateDescriptor {
        format: SPECULAR_FORMAT,
        blend: None,
        write_mask: ColorWrites::empty(),
    },
];

fn surface_pipelines(
    tracked: &mut Tracked<'_>,
    label: &str,
    layouts: &[BindGroupLayoutId],
    module: ShaderModuleId,
    vertex_entry_point: &'static str,
    vertex_layout: &VertexBufferLayoutDescriptor<'static>,
) -> Result<SurfacePipelines, ResourceError> {
    let mut build = |variant: &str, fragment_entry_point: &'static str| {
        tracked.pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Owned(format!("{label} ({variant})"))),
            bind_group_layouts: Cow::Borrowed(layouts),
            vertex_shader_module: module,
            vertex_entry_point: Cow::Borrowed(vertex_entry_point),
            fragment_shader_module: Some(module),
            fragment_entry_point: Some(Cow::Borrowed(fragment_entry_point)),
            vertex_buffers_layout: Cow::Owned(vec![vertex_layout.clone()]),
            primitive_state: PrimitiveStateDescriptor {
                cull_mode: Some(CullMode::Back),
                ..Default::default()
            },
            depth_stencil_state: Some(geometry_depth_state()),
            color_target_states: Cow::Borrowed(&GEOMETRY_TARGETS),
        })
    };
    Ok(SurfacePipelines {
        opaque: build("opaque", "fs_opaque")?,
        stippled: build("stippled", "fs_stippled")?,
    })
}

/// Builds a pipeline drawing the full-screen triangle into one target.
pub(crate) fn fullscreen_pipeline_descriptor<'a>(
    label: String,
    layouts: &'a [BindGroupLayoutId],
    vertex_module: ShaderModuleId,
    fragment_module: ShaderModuleId,
    fragment_entry_point: &'a str,
    targets: &'a [ColorTargetStateDescriptor],
) -> RenderPipelineDescriptor<'a> {
    RenderPipelineDescriptor {
        label: Some(Cow::Owned(label)),
        bind_group_layouts: Cow::Borrowed(layouts),
        vertex_shader_module: vertex_module,
        vertex_entry_point: Cow::Borrowed("vs_fullscreen"),
        fragment_shader_module: Some(fragment_module),
        fragment_entry_point: Some(Cow::Borrowed(fragment_entry_point)),
        vertex_buffers_layout: Cow::Borrowed(&[]),
        primitive_state: PrimitiveStateDescriptor::default(),
        depth_stencil_state: None,
        color_target_states: Cow::Borrowed(targets),
    }
}

/// Layout entries of the lighting inputs. Binding 7 carries the ambient
/// occlusion result and exists only for the variants that read it.
pub(crate) fn lighting_layout_entries(ambient_occlusion: bool) -> Vec<BindGroupLayoutEntry> {
    let color = TextureSampleType::Float { filterable: true };
    let mut entries = vec![
        BindGroupLayoutEntry::texture_2d(0, color),
        BindGroupLayoutEntry::texture_2d(1, color),
        BindGroupLayoutEntry::texture_2d(2, color),
        BindGroupLayoutEntry::texture_2d(3, TextureSampleType::Depth),
        BindGroupLayoutEntry::texture(4, color, TextureViewDimension::Cube),
        BindGroupLayoutEntry::texture(5, color, TextureViewDimension::Cube),
        BindGroupLayoutEntry::sampler(6, SamplerBindingType::Filtering),
    ];
    if ambient_occlusion {
        entries.push(BindGroupLayoutEntry::texture_2d(7, color));
    }
    entries
}

/// Deterministic rotation vectors, encoded in rg.
fn noise_texels() -> Vec<u8> {
    let count = NOISE_TILE_SIZE * NOISE_TILE_SIZE;
    (0..count)
        .flat_map(|i| {
            let angle = halton(i + 1, 2) * std::f32::consts::TAU;
            let encode = |v: f32| ((v * 0.5 + 0.5) * 255.0).round() as u8;
            [encode(angle.cos()), encode(angle.sin()), 128, 255]
        })
        .collect()
}

impl LaneResources {
    /// Creates every construction-time object. Objects are appended to
    /// `objects` as they are created.
    pub(crate) fn create(
        device: &dyn GraphicsDevice,
        shaders: &ShaderLibrary,
        variant: LightingVariant,
        ao_settings: AoSettings,
        objects: &mut Vec<GpuObject>,
    ) -> Result<Self, ResourceError> {
        let mut tracked = Tracked { device, objects };
        let both = ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        let color = TextureSampleType::Float { filterable: true };

        let scene_layout =
            tracked.layout("Scene Constants Layout", &[BindGroupLayoutEntry::uniform(0, both, true)])?;
        let draw_layout =
            tracked.layout("Draw Constants Layout", &[BindGroupLayoutEntry::uniform(0, both, true)])?;
        let skin_layout = tracked.layout(
            "Bone Frames Layout",
            &[
                BindGroupLayoutEntry::storage(0, ShaderStageFlags::VERTEX),
                BindGroupLayoutEntry::storage(1, ShaderStageFlags::VERTEX),
            ],
        )?;
        let decal_layout = tracked.layout(
            "Decal Layout",
            &[
                BindGroupLayoutEntry::texture_2d(0, color),
                BindGroupLayoutEntry::texture_2d(1, color),
                BindGroupLayoutEntry::texture_2d(2, TextureSampleType::Depth),
                BindGroupLayoutEntry::sampler(3, SamplerBindingType::Filtering),
            ],
        )?;
        let lighting_layout = tracked.layout(
            "Lighting Layout",
            &lighting_layout_entries(variant.ambient_occlusion),
        )?;

        let fullscreen_module = tracked.module(shaders, ShaderKey::FullscreenVertex)?;
        let geometry_module = tracked.module(shaders, ShaderKey::Geometry)?;
        let skinned_module = tracked.module(shaders, ShaderKey::SkinnedGeometry)?;
        let decal_module = tracked.module(shaders, ShaderKey::Decal)?;
        let lighting_module = tracked.module(shaders, ShaderKey::Lighting(variant))?;

        let static_layouts = [scene_layout, draw_layout];
        let mut static_pipelines = Vec::with_capacity(LayoutRegistry::standard().entries().len());
        for entry in LayoutRegistry::standard().entries() {
            debug_assert_eq!(entry.bucket, static_pipelines.len());
            static_pipelines.push(surface_pipelines(
                &mut tracked,
                &format!("Geometry [{}]", entry.tag.label()),
                &static_layouts,
                geometry_module,
                entry.vertex_entry_point,
                &entry.vertex_layout,
            )?);
        }
        let skinned_pipelines = surface_pipelines(
            &mut tracked,
            "Geometry [skinned]",
            &[scene_layout, draw_layout, skin_layout],
            skinned_module,
            "vs_skinned",
            &SKINNED_VERTEX_LAYOUT,
        )?;

        let decal_pipeline = tracked.pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Borrowed("Decal Pipeline")),
            bind_group_layouts: Cow::Owned(vec![scene_layout, draw_layout, decal_layout]),
            vertex_shader_module: decal_module,
            vertex_entry_point: Cow::Borrowed("vs_decal"),
            fragment_shader_module: Some(decal_module),
            fragment_entry_point: Some(Cow::Borrowed("fs_decal")),
            vertex_buffers_layout: Cow::Owned(vec![DECAL_VOLUME_LAYOUT.clone()]),
            primitive_state: PrimitiveStateDescriptor {
                cull_mode: Some(CullMode::Front),
                ..Default::default()
            },
            depth_stencil_state: Some(decal_depth_state()),
            color_target_states: Cow::Borrowed(&DECAL_TARGETS),
        })?;

        let linear_sampler = tracked.sampler(&SamplerDescriptor {
            label: Some(Cow::Borrowed("Linear Clamp Sampler")),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            ..Default::default()
        })?;

        let unit_cube_vertices = tracked.buffer(
            "Decal Volume Vertices",
            BufferUsage::VERTEX,
            bytemuck::cast_slice(&UNIT_CUBE_VERTICES),
        )?;
        let unit_cube_indices = tracked.buffer(
            "Decal Volume Indices",
            BufferUsage::INDEX,
            bytemuck::cast_slice(&UNIT_CUBE_INDICES),
        )?;

        let neutral_environment = tracked.filled_texture(
            "Neutral Environment",
            Extent3D {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
            TextureFormat::Rgba8Unorm,
            &NEUTRAL_TEXEL.repeat(6),
            TextureViewDimension::Cube,
        )?;

        let ao = if variant.ambient_occlusion {
            let layout = tracked.layout(
                "Ambient Occlusion Layout",
                &[
                    BindGroupLayoutEntry::texture_2d(0, color),
                    BindGroupLayoutEntry::texture_2d(1, TextureSampleType::Depth),
                    BindGroupLayoutEntry::texture_2d(2, color),
                    BindGroupLayoutEntry::uniform(3, ShaderStageFlags::FRAGMENT, false),
                ],
            )?;
            let blur_layout = tracked.layout(
                "Ambient Occlusion Blur Layout",
                &[
                    BindGroupLayoutEntry::texture_2d(0, color),
                    BindGroupLayoutEntry::sampler(1, SamplerBindingType::Filtering),
                ],
            )?;
            let ao_module = tracked.module(shaders, ShaderKey::AmbientOcclusion)?;
            let blur_module = tracked.module(shaders, ShaderKey::AmbientOcclusionBlur)?;
            let targets = [ColorTargetStateDescriptor::replace(AO_FORMAT)];
            let pipeline = tracked.pipeline(&fullscreen_pipeline_descriptor(
                "Ambient Occlusion Pipeline".to_string(),
                &[scene_layout, layout],
                fullscreen_module,
                ao_module,
                "fs_ambient_occlusion",
                &targets,
            ))?;
            let blur_pipeline = tracked.pipeline(&fullscreen_pipeline_descriptor(
                "Ambient Occlusion Blur Pipeline".to_string(),
                &[scene_layout, blur_layout],
                fullscreen_module,
                blur_module,
                "fs_ambient_occlusion_blur",
                &targets,
            ))?;
            let noise = tracked.filled_texture(
                "Ambient Occlusion Noise",
                Extent3D::d2(NOISE_TILE_SIZE, NOISE_TILE_SIZE),
                TextureFormat::Rgba8Unorm,
                &noise_texels(),
                TextureViewDimension::D2,
            )?;
            let kernel = tracked.buffer(
                "Ambient Occlusion Kernel",
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                bytemuck::bytes_of(&ao_settings.kernel()),
            )?;
            Some(AoResources {
                layout,
                blur_layout,
                pipeline,
                blur_pipeline,
                noise,
                kernel,
            })
        } else {
            None
        };

        log::info!(
            "Created deferred lane resources: {} static layouts, ambient occlusion {}",
            static_pipelines.len(),
            if ao.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            scene_layout,
            draw_layout,
            skin_layout,
            decal_layout,
            lighting_layout,
            fullscreen_module,
            lighting_module,
            static_pipelines,
            skinned_pipelines,
            decal_pipeline,
            linear_sampler,
            unit_cube_vertices,
            unit_cube_indices,
            neutral_environment,
            ao,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_core::math::Vec3;

    #[test]
    fn test_unit_cube_faces_point_outward() {
        for triangle in UNIT_CUBE_INDICES.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(UNIT_CUBE_VERTICES[triangle[i] as usize]));
            let normal = (b - a).cross(c - a);
            let center = (a + b + c) / 3.0;
            assert!(normal.dot(center) > 0.0, "triangle {triangle:?} faces inward");
        }
    }

    #[test]
    fn test_lighting_layout_has_ao_binding_only_for_ao_variants() {
        assert_eq!(lighting_layout_entries(false).len(), 7);
        let with_ao = lighting_layout_entries(true);
        assert_eq!(with_ao.len(), 8);
        assert_eq!(with_ao[7].binding, 7);
    }

    #[test]
    fn test_noise_tile_is_deterministic() {
        let texels = noise_texels();
        assert_eq!(texels.len(), (NOISE_TILE_SIZE * NOISE_TILE_SIZE * 4) as usize);
        assert_eq!(texels, noise_texels());
    }

    #[test]
    fn test_decal_state_tests_stencil_for_equality_without_writing() {
        let state = decal_depth_state();
        assert_eq!(state.stencil_front.compare, CompareFunction::Equal);
        assert_eq!(state.stencil_read_mask, 0xFF);
        assert_eq!(state.stencil_write_mask, 0);
        assert!(!state.depth_write_enabled);
        assert!(DECAL_TARGETS[2].write_mask.is_empty());
    }
}
