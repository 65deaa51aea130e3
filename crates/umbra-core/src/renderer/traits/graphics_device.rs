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
use crate::renderer::api::bind_group::{
    BindGroupDescriptor, BindGroupId, BindGroupLayoutDescriptor, BindGroupLayoutId,
};
use crate::renderer::api::command::CommandBufferId;
use crate::renderer::api::pipeline::{RenderPipelineDescriptor, RenderPipelineId};
use crate::renderer::api::resource::{
    BufferDescriptor, BufferId, ImageDataLayout, SamplerDescriptor, SamplerId,
    ShaderModuleDescriptor, ShaderModuleId, TextureCopyTarget, TextureDescriptor, TextureId,
    TextureViewDescriptor, TextureViewId,
};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// Feature name queried through [`GraphicsDevice::supports_feature`] for GPU
/// timestamp queries.
pub const FEATURE_TIMESTAMP_QUERY: &str = "timestamp_query";

/// The main device abstraction: creates and manages GPU resources.
///
/// This is the capability surface the deferred pipeline consumes. Every call
/// may report [`ResourceError::DeviceLost`] once the backend noticed that the
/// device is gone.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    // --- Shader modules ---

    /// Creates a shader module from source.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys a shader module.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    // --- Bind groups ---

    /// Creates a bind group layout.
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Destroys a bind group layout.
    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError>;

    /// Creates a bind group.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group. Any shader bindings it held are released.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    // --- Pipelines ---

    /// Creates a render pipeline.
    ///
    /// ## Errors
    /// Fails when a referenced shader module or bind group layout is unknown.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys a render pipeline.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    // --- Buffers ---

    /// Creates an uninitialized buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a buffer initialized with `data`.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes `data` into a buffer at `offset` through the queue.
    ///
    /// The write is staged: it never waits for in-flight GPU work reading
    /// the same buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    // --- Textures ---

    /// Creates a texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a texture. Views over it must be destroyed separately.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Uploads texel data into a texture region.
    fn write_texture(
        &self,
        target: &TextureCopyTarget,
        data: &[u8],
        layout: ImageDataLayout,
        size: Extent3D,
    ) -> Result<(), ResourceError>;

    /// Creates a view over a texture.
    fn create_texture_view(
        &self,
        texture: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError>;

    /// Destroys a sampler.
    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError>;

    // --- Commands ---

    /// Creates a command encoder.
    fn create_command_encoder(
        &self,
        label: Option<&str>,
    ) -> Result<Box<dyn CommandEncoder>, ResourceError>;

    /// Submits a finished command buffer to the queue.
    fn submit_command_buffer(&self, id: CommandBufferId) -> Result<(), ResourceError>;

    // --- Capabilities ---

    /// Whether an optional feature is enabled on this device.
    fn supports_feature(&self, feature_name: &str) -> bool;

    /// Whether the backend has observed the loss of the device.
    fn is_lost(&self) -> bool;
}
