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

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use wgpu::util::DeviceExt;

use umbra_core::math::Extent3D;
use umbra_core::renderer::api::bind_group::{
    BindGroupDescriptor, BindGroupId, BindGroupLayoutDescriptor, BindGroupLayoutId,
    BindingResource,
};
use umbra_core::renderer::api::command::CommandBufferId;
use umbra_core::renderer::api::pipeline::{RenderPipelineDescriptor, RenderPipelineId};
use umbra_core::renderer::api::resource::{
    BufferDescriptor, BufferId, ImageDataLayout, SamplerDescriptor, SamplerId,
    ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData, TextureCopyTarget,
    TextureDescriptor, TextureFormat, TextureId, TextureViewDescriptor, TextureViewId,
};
use umbra_core::renderer::traits::{CommandEncoder, GraphicsDevice, FEATURE_TIMESTAMP_QUERY};
use umbra_core::renderer::{PipelineError, ResourceError, ShaderError};

use super::command::WgpuCommandEncoder;
use super::context::WgpuGraphicsContext;
use super::conversions::{from_wgpu_texture_format, IntoWgpu};

#[derive(Debug)]
pub(crate) struct WgpuBufferEntry {
    pub(crate) wgpu_buffer: Arc<wgpu::Buffer>,
    pub(crate) size: u64, // To track VRAM accurately on destruction
}

#[derive(Debug)]
pub(crate) struct WgpuTextureEntry {
    pub(crate) wgpu_texture: Arc<wgpu::Texture>,
    pub(crate) size: u64,
}

/// The internal, non-clonable state of the WgpuDevice.
/// Every registry maps an abstract handle to the native object behind it.
#[derive(Debug)]
struct WgpuDeviceInternal {
    context: Arc<WgpuGraphicsContext>,
    shader_modules: Mutex<HashMap<ShaderModuleId, Arc<wgpu::ShaderModule>>>,
    bind_group_layouts: Mutex<HashMap<BindGroupLayoutId, Arc<wgpu::BindGroupLayout>>>,
    bind_groups: Mutex<HashMap<BindGroupId, Arc<wgpu::BindGroup>>>,
    pipelines: Mutex<HashMap<RenderPipelineId, Arc<wgpu::RenderPipeline>>>,
    buffers: Mutex<HashMap<BufferId, WgpuBufferEntry>>,
    textures: Mutex<HashMap<TextureId, WgpuTextureEntry>>,
    texture_views: Mutex<HashMap<TextureViewId, Arc<wgpu::TextureView>>>,
    samplers: Mutex<HashMap<SamplerId, Arc<wgpu::Sampler>>>,

    next_shader_id: AtomicUsize,
    next_bind_group_layout_id: AtomicUsize,
    next_bind_group_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_texture_view_id: AtomicUsize,
    next_sampler_id: AtomicUsize,

    // VRAM Tracking
    vram_allocated_bytes: AtomicUsize,
    vram_peak_bytes: AtomicU64,

    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, wgpu::CommandBuffer>>,
    command_buffer_id_counter: AtomicU64,
}

/// A clonable, thread-safe handle to the WGPU graphics device.
/// It wraps the actual device state in an Arc, allowing it to be shared
/// across threads and with command encoders.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

/// A resolved bind group resource, kept alive while the group is built.
enum ResolvedBinding {
    Buffer(Arc<wgpu::Buffer>, u64, Option<NonZeroU64>),
    TextureView(Arc<wgpu::TextureView>),
    Sampler(Arc<wgpu::Sampler>),
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ResourceError> {
    mutex
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned ({what}): {e}")))
}

fn next_id(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::Relaxed)
}

impl WgpuDevice {
    pub fn new(context: Arc<WgpuGraphicsContext>) -> Self {
        Self {
            internal: Arc::new(WgpuDeviceInternal {
                context,
                shader_modules: Mutex::new(HashMap::new()),
                bind_group_layouts: Mutex::new(HashMap::new()),
                bind_groups: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                samplers: Mutex::new(HashMap::new()),
                next_shader_id: AtomicUsize::new(0),
                next_bind_group_layout_id: AtomicUsize::new(0),
                next_bind_group_id: AtomicUsize::new(0),
                next_pipeline_id: AtomicUsize::new(0),
                next_buffer_id: AtomicUsize::new(0),
                next_texture_id: AtomicUsize::new(0),
                next_texture_view_id: AtomicUsize::new(0),
                next_sampler_id: AtomicUsize::new(0),
                vram_allocated_bytes: AtomicUsize::new(0),
                vram_peak_bytes: AtomicU64::new(0),
                pending_command_buffers: Mutex::new(HashMap::new()),
                command_buffer_id_counter: AtomicU64::new(0),
            }),
        }
    }

    /// The graphics context this device records into.
    pub fn context(&self) -> &WgpuGraphicsContext {
        &self.internal.context
    }

    fn wgpu_device(&self) -> &wgpu::Device {
        &self.internal.context.device
    }

    fn ensure_alive(&self) -> Result<(), ResourceError> {
        if self.internal.context.is_lost() {
            Err(ResourceError::DeviceLost)
        } else {
            Ok(())
        }
    }

    /// Helper to calculate texture size in bytes
    fn calculate_texture_size_in_bytes(descriptor: &TextureDescriptor) -> u64 {
        let bytes_per_pixel = descriptor.format.bytes_per_pixel();
        let num_pixels = descriptor.size.width as u64
            * descriptor.size.height as u64
            * descriptor.size.depth_or_array_layers as u64;
        num_pixels * bytes_per_pixel as u64 * descriptor.sample_count.max(1) as u64
    }

    fn track_allocation(&self, bytes: u64) {
        let current = self
            .internal
            .vram_allocated_bytes
            .fetch_add(bytes as usize, Ordering::Relaxed) as u64
            + bytes;
        self.internal
            .vram_peak_bytes
            .fetch_max(current, Ordering::Relaxed);
    }

    fn track_release(&self, bytes: u64) {
        self.internal
            .vram_allocated_bytes
            .fetch_sub(bytes as usize, Ordering::Relaxed);
    }

    /// Bytes currently held by buffers and textures.
    pub fn vram_allocated_bytes(&self) -> usize {
        self.internal.vram_allocated_bytes.load(Ordering::Relaxed)
    }

    /// Highest value [`Self::vram_allocated_bytes`] ever reached.
    pub fn vram_peak_bytes(&self) -> u64 {
        self.internal.vram_peak_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn get_wgpu_render_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<Arc<wgpu::RenderPipeline>> {
        let pipelines = lock(&self.internal.pipelines, "pipelines").ok()?;
        pipelines.get(&id).cloned()
    }

    pub(crate) fn get_wgpu_bind_group(&self, id: BindGroupId) -> Option<Arc<wgpu::BindGroup>> {
        let groups = lock(&self.internal.bind_groups, "bind_groups").ok()?;
        groups.get(&id).cloned()
    }

    pub(crate) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        let buffers = lock(&self.internal.buffers, "buffers").ok()?;
        buffers.get(&id).map(|entry| Arc::clone(&entry.wgpu_buffer))
    }

    pub(crate) fn get_wgpu_texture(&self, id: TextureId) -> Option<Arc<wgpu::Texture>> {
        let textures = lock(&self.internal.textures, "textures").ok()?;
        textures.get(&id).map(|entry| Arc::clone(&entry.wgpu_texture))
    }

    pub(crate) fn get_wgpu_texture_view(
        &self,
        id: TextureViewId,
    ) -> Option<Arc<wgpu::TextureView>> {
        let views = lock(&self.internal.texture_views, "texture_views").ok()?;
        views.get(&id).cloned()
    }

    /// Polls the underlying device until all submitted work completed.
    pub fn poll_device_blocking(&self) {
        if let Err(e) = self.wgpu_device().poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("Failed to poll device: {:?}", e);
        }
    }

    /// Processes completed work and pending `map_async` callbacks without
    /// waiting.
    pub fn poll_device_non_blocking(&self) {
        if let Err(e) = self.wgpu_device().poll(wgpu::PollType::Poll) {
            log::warn!("Failed to poll device (non-blocking): {:?}", e);
        }
    }

    /// Registers a view over a texture the renderer does not own, such as a
    /// swapchain image, and returns the handle to present into.
    ///
    /// The returned format is `None` when the pipeline cannot render to it.
    pub fn create_texture_view_for_texture(
        &self,
        texture: &wgpu::Texture,
        label: Option<&str>,
    ) -> Result<(TextureViewId, Option<TextureFormat>), ResourceError> {
        self.ensure_alive()?;
        let wgpu_view = Arc::new(texture.create_view(&wgpu::TextureViewDescriptor {
            label,
            ..Default::default()
        }));
        let id = TextureViewId(next_id(&self.internal.next_texture_view_id));
        lock(&self.internal.texture_views, "texture_views")?.insert(id, wgpu_view);
        Ok((id, from_wgpu_texture_format(texture.format())))
    }

    /// Stores a finished command buffer until it is submitted.
    pub(crate) fn register_command_buffer(
        &self,
        buffer: wgpu::CommandBuffer,
    ) -> Result<CommandBufferId, ResourceError> {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::SeqCst),
        );
        lock(&self.internal.pending_command_buffers, "command_buffers")?.insert(id, buffer);
        Ok(id)
    }

    fn resolve_binding(
        &self,
        resource: &BindingResource,
    ) -> Result<ResolvedBinding, ResourceError> {
        match *resource {
            BindingResource::Buffer(binding) => {
                let buffer = self
                    .get_wgpu_buffer(binding.buffer)
                    .ok_or(ResourceError::NotFound)?;
                Ok(ResolvedBinding::Buffer(buffer, binding.offset, binding.size))
            }
            BindingResource::TextureView(id) => self
                .get_wgpu_texture_view(id)
                .map(ResolvedBinding::TextureView)
                .ok_or(ResourceError::NotFound),
            BindingResource::Sampler(id) => {
                let sampler = lock(&self.internal.samplers, "samplers")?.get(&id).cloned();
                sampler
                    .map(ResolvedBinding::Sampler)
                    .ok_or(ResourceError::NotFound)
            }
        }
    }

    fn remove<K, V>(
        &self,
        registry: &Mutex<HashMap<K, V>>,
        what: &str,
        id: K,
    ) -> Result<V, ResourceError>
    where
        K: std::hash::Hash + Eq + std::fmt::Debug,
    {
        let mut guard = lock(registry, what)?;
        let entry = guard.remove(&id).ok_or(ResourceError::NotFound)?;
        log::debug!("WgpuDevice: Destroyed {what} entry {id:?}");
        Ok(entry)
    }
}

impl GraphicsDevice for WgpuDevice {
    // --- Shader Module Operations ---

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        self.ensure_alive()?;
        let wgpu_source = match &descriptor.source {
            ShaderSourceData::Wgsl(cow_str) => wgpu::ShaderSource::Wgsl(cow_str.clone()),
        };
        let label = descriptor.label;

        let module = self
            .wgpu_device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label,
                source: wgpu_source,
            });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(ShaderError::CompilationError {
                label: label.unwrap_or("unnamed").to_string(),
                details: errors.join("\n"),
            }
            .into());
        }

        let id = ShaderModuleId(next_id(&self.internal.next_shader_id));
        lock(&self.internal.shader_modules, "shader_modules")?.insert(id, Arc::new(module));

        log::info!(
            "WgpuDevice: Created shader module '{}' with ID: {:?}",
            label.unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.remove(&self.internal.shader_modules, "shader_modules", id)
            .map(drop)
            .map_err(|_| ShaderError::NotFound { id }.into())
    }

    // --- Bind Group Operations ---

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        self.ensure_alive()?;
        let entries: Vec<wgpu::BindGroupLayoutEntry> = descriptor
            .entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.into_wgpu(),
                ty: entry.ty.into_wgpu(),
                count: None,
            })
            .collect();

        let layout = self
            .wgpu_device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: descriptor.label,
                entries: &entries,
            });

        let id = BindGroupLayoutId(next_id(&self.internal.next_bind_group_layout_id));
        lock(&self.internal.bind_group_layouts, "bind_group_layouts")?
            .insert(id, Arc::new(layout));
        log::debug!(
            "WgpuDevice: Created bind group layout '{}' with ID: {:?}",
            descriptor.label.unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        self.remove(&self.internal.bind_group_layouts, "bind_group_layouts", id)
            .map(drop)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        self.ensure_alive()?;
        let layout = lock(&self.internal.bind_group_layouts, "bind_group_layouts")?
            .get(&descriptor.layout)
            .cloned()
            .ok_or(ResourceError::NotFound)?;

        let resolved = descriptor
            .entries
            .iter()
            .map(|entry| Ok((entry.binding, self.resolve_binding(&entry.resource)?)))
            .collect::<Result<Vec<_>, ResourceError>>()?;

        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    ResolvedBinding::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: buffer.as_ref(),
                            offset: *offset,
                            size: *size,
                        })
                    }
                    ResolvedBinding::TextureView(view) => {
                        wgpu::BindingResource::TextureView(view.as_ref())
                    }
                    ResolvedBinding::Sampler(sampler) => {
                        wgpu::BindingResource::Sampler(sampler.as_ref())
                    }
                },
            })
            .collect();

        let group = self
            .wgpu_device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: descriptor.label,
                layout: layout.as_ref(),
                entries: &entries,
            });

        let id = BindGroupId(next_id(&self.internal.next_bind_group_id));
        lock(&self.internal.bind_groups, "bind_groups")?.insert(id, Arc::new(group));
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        self.remove(&self.internal.bind_groups, "bind_groups", id)
            .map(drop)
    }

    // --- Render Pipeline Operations ---

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        self.ensure_alive()?;
        log::debug!(
            "WgpuDevice: Creating render pipeline with label: {:?}",
            descriptor.label
        );
        let pipeline_label = || descriptor.label.as_deref().map(String::from);

        // 1. Resolve shader modules and bind group layouts
        let (vs_module, fs_module) = {
            let modules = lock(&self.internal.shader_modules, "shader_modules")?;
            let find = |id: ShaderModuleId| {
                modules.get(&id).cloned().ok_or_else(|| {
                    ResourceError::Pipeline(PipelineError::InvalidShaderModuleForPipeline {
                        id,
                        pipeline_label: pipeline_label(),
                    })
                })
            };
            let vs = find(descriptor.vertex_shader_module)?;
            let fs = descriptor.fragment_shader_module.map(find).transpose()?;
            (vs, fs)
        };

        let layouts: Vec<Arc<wgpu::BindGroupLayout>> = {
            let registry = lock(&self.internal.bind_group_layouts, "bind_group_layouts")?;
            descriptor
                .bind_group_layouts
                .iter()
                .map(|id| {
                    registry.get(id).cloned().ok_or_else(|| {
                        ResourceError::Pipeline(PipelineError::InvalidBindGroupLayout {
                            pipeline_label: pipeline_label(),
                        })
                    })
                })
                .collect::<Result<_, _>>()?
        };
        let layout_refs: Vec<Option<&wgpu::BindGroupLayout>> =
            layouts.iter().map(|l| Some(l.as_ref())).collect();

        // 2. Convert vertex buffers layout
        let attributes_storage: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers_layout
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: attr.format.into_wgpu(),
                        offset: attr.offset,
                        shader_location: attr.shader_location,
                    })
                    .collect()
            })
            .collect();

        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers_layout
            .iter()
            .zip(attributes_storage.iter())
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();

        // 3. Fixed-function state
        let primitive = wgpu::PrimitiveState {
            topology: descriptor.primitive_state.topology.into_wgpu(),
            strip_index_format: descriptor
                .primitive_state
                .strip_index_format
                .map(|f| f.into_wgpu()),
            front_face: descriptor.primitive_state.front_face.into_wgpu(),
            cull_mode: descriptor.primitive_state.cull_mode.map(|m| m.into_wgpu()),
            ..Default::default()
        };

        let depth_stencil = descriptor
            .depth_stencil_state
            .as_ref()
            .map(|ds| wgpu::DepthStencilState {
                format: ds.format.into_wgpu(),
                depth_write_enabled: Some(ds.depth_write_enabled),
                depth_compare: Some(ds.depth_compare.into_wgpu()),
                stencil: wgpu::StencilState {
                    front: ds.stencil_front.into_wgpu(),
                    back: ds.stencil_back.into_wgpu(),
                    read_mask: ds.stencil_read_mask,
                    write_mask: ds.stencil_write_mask,
                },
                bias: wgpu::DepthBiasState::default(),
            });

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_target_states
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: target.format.into_wgpu(),
                    blend: target.blend.map(|b| b.into_wgpu()),
                    write_mask: target.write_mask.into_wgpu(),
                })
            })
            .collect();

        let fragment_entry_point = descriptor.fragment_entry_point.as_deref();
        if fs_module.is_some() && fragment_entry_point.is_none() {
            return Err(PipelineError::CompilationFailed {
                label: pipeline_label(),
                details: "fragment module given without an entry point".to_string(),
            }
            .into());
        }

        // 4. Create pipeline layout and render pipeline
        let device = self.wgpu_device();
        let layout_label = descriptor.label.as_deref().map(|s| format!("{s}_Layout"));
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: layout_label.as_deref(),
            bind_group_layouts: &layout_refs,
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: descriptor.label.as_deref(),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: vs_module.as_ref(),
                entry_point: Some(descriptor.vertex_entry_point.as_ref()),
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: fs_module.as_ref().map(|module| wgpu::FragmentState {
                module: module.as_ref(),
                entry_point: fragment_entry_point,
                targets: &color_targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive,
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let id = RenderPipelineId(next_id(&self.internal.next_pipeline_id));
        lock(&self.internal.pipelines, "pipelines")?.insert(id, Arc::new(pipeline));

        log::info!(
            "WgpuDevice: Created render pipeline '{}' with ID: {:?}",
            descriptor.label.as_deref().unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.remove(&self.internal.pipelines, "pipelines", id)
            .map(drop)
            .map_err(|_| PipelineError::InvalidRenderPipeline { id }.into())
    }

    // --- Buffer Operations ---

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.ensure_alive()?;
        let wgpu_buffer = self.wgpu_device().create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: descriptor.usage.into_wgpu(),
            mapped_at_creation: descriptor.mapped_at_creation,
        });
        let id = BufferId(next_id(&self.internal.next_buffer_id));
        self.track_allocation(descriptor.size);

        lock(&self.internal.buffers, "buffers")?.insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(wgpu_buffer),
                size: descriptor.size,
            },
        );

        log::debug!(
            "WgpuDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        self.ensure_alive()?;
        let wgpu_buffer = self
            .wgpu_device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: descriptor.label.as_deref(),
                contents: data,
                usage: descriptor.usage.into_wgpu(),
            });

        let id = BufferId(next_id(&self.internal.next_buffer_id));
        let buffer_size = wgpu_buffer.size();
        self.track_allocation(buffer_size);

        lock(&self.internal.buffers, "buffers")?.insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(wgpu_buffer),
                size: buffer_size,
            },
        );

        log::debug!(
            "WgpuDevice: Created buffer '{}' with initial data. ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            buffer_size
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let entry = self.remove(&self.internal.buffers, "buffers", id)?;
        self.track_release(entry.size);
        Ok(())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.ensure_alive()?;
        let buffer = self.get_wgpu_buffer(id).ok_or(ResourceError::NotFound)?;

        let end_offset = offset + data.len() as u64;
        if end_offset > buffer.size() {
            return Err(ResourceError::OutOfBounds);
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
            || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0
        {
            return Err(ResourceError::BackendError(format!(
                "Unaligned write of {} bytes at offset {offset} into buffer {id:?}",
                data.len()
            )));
        }

        self.internal.context.queue.write_buffer(&buffer, offset, data);
        Ok(())
    }

    // --- Texture Operations ---

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        self.ensure_alive()?;
        let wgpu_texture = self.wgpu_device().create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size.into_wgpu(),
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            dimension: descriptor.dimension.into_wgpu(),
            format: descriptor.format.into_wgpu(),
            usage: descriptor.usage.into_wgpu(),
            view_formats: &[],
        });
        let id = TextureId(next_id(&self.internal.next_texture_id));
        let size_in_bytes = Self::calculate_texture_size_in_bytes(descriptor);
        self.track_allocation(size_in_bytes);

        lock(&self.internal.textures, "textures")?.insert(
            id,
            WgpuTextureEntry {
                wgpu_texture: Arc::new(wgpu_texture),
                size: size_in_bytes,
            },
        );

        log::info!(
            "WgpuDevice: Created texture '{}' with ID: {:?}, size: {} bytes (VRAM)",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            size_in_bytes
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let entry = self.remove(&self.internal.textures, "textures", id)?;
        entry.wgpu_texture.destroy();
        self.track_release(entry.size);
        Ok(())
    }

    fn write_texture(
        &self,
        target: &TextureCopyTarget,
        data: &[u8],
        layout: ImageDataLayout,
        size: Extent3D,
    ) -> Result<(), ResourceError> {
        self.ensure_alive()?;
        let texture = self
            .get_wgpu_texture(target.texture)
            .ok_or(ResourceError::NotFound)?;

        self.internal.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: target.mip_level,
                origin: target.origin.into_wgpu(),
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: layout.offset,
                bytes_per_row: layout.bytes_per_row,
                rows_per_image: layout.rows_per_image,
            },
            size.into_wgpu(),
        );
        log::debug!(
            "WgpuDevice: Wrote {} bytes to texture ID: {:?}",
            data.len(),
            target.texture
        );
        Ok(())
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        self.ensure_alive()?;
        let texture = self
            .get_wgpu_texture(texture_id)
            .ok_or(ResourceError::NotFound)?;

        let wgpu_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            format: descriptor.format.map(|f| f.into_wgpu()),
            dimension: descriptor.dimension.map(|d| d.into_wgpu()),
            usage: None,
            aspect: descriptor.aspect.into_wgpu(),
            base_mip_level: descriptor.base_mip_level,
            mip_level_count: descriptor.mip_level_count,
            base_array_layer: descriptor.base_array_layer,
            array_layer_count: descriptor.array_layer_count,
        });

        let id = TextureViewId(next_id(&self.internal.next_texture_view_id));
        lock(&self.internal.texture_views, "texture_views")?.insert(id, Arc::new(wgpu_view));
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.remove(&self.internal.texture_views, "texture_views", id)
            .map(drop)
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        self.ensure_alive()?;
        let sampler = self.wgpu_device().create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: descriptor.address_mode_u.into_wgpu(),
            address_mode_v: descriptor.address_mode_v.into_wgpu(),
            address_mode_w: descriptor.address_mode_w.into_wgpu(),
            mag_filter: descriptor.mag_filter.into_wgpu(),
            min_filter: descriptor.min_filter.into_wgpu(),
            mipmap_filter: descriptor.mipmap_filter.into_wgpu(),
            ..Default::default()
        });

        let id = SamplerId(next_id(&self.internal.next_sampler_id));
        lock(&self.internal.samplers, "samplers")?.insert(id, Arc::new(sampler));
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        self.remove(&self.internal.samplers, "samplers", id)
            .map(drop)
    }

    // --- Command Operations ---

    fn create_command_encoder(
        &self,
        label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError> {
        self.ensure_alive()?;
        let encoder = self
            .wgpu_device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        Ok(Box::new(WgpuCommandEncoder {
            encoder: Some(encoder),
            device: self.clone(),
        }))
    }

    fn submit_command_buffer(&self, id: CommandBufferId) -> Result<(), ResourceError> {
        self.ensure_alive()?;
        let buffer = lock(&self.internal.pending_command_buffers, "command_buffers")?
            .remove(&id)
            .ok_or_else(|| {
                log::warn!("Attempted to submit a CommandBufferId ({id:?}) that does not exist.");
                ResourceError::NotFound
            })?;
        self.internal.context.queue.submit(std::iter::once(buffer));
        Ok(())
    }

    // --- Capabilities ---

    fn supports_feature(&self, feature_name: &str) -> bool {
        match feature_name {
            FEATURE_TIMESTAMP_QUERY => self.internal.context.supports_timestamps(),
            "depth32float_stencil8" => self
                .internal
                .context
                .active_device_features
                .contains(wgpu::Features::DEPTH32FLOAT_STENCIL8),
            _ => {
                log::debug!("Unknown feature queried: {feature_name}");
                false
            }
        }
    }

    fn is_lost(&self) -> bool {
        self.internal.context.is_lost()
    }
}
