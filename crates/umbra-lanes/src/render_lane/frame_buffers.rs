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

//! The screen-sized render targets of the deferred pipeline.
//!
//! A [`FrameBufferSet`] owns the attribute channels written by the geometry
//! stage, the combined depth/stencil target with its three views, and the
//! ping-pong pairs used by ambient occlusion, the post-process chain and the
//! anti-aliasing history. All of them are reallocated together on resize.

use umbra_core::{
    math::{Extent3D, Mat4, Vec3},
    renderer::{
        api::{
            ImageAspect, Operations, RenderPassDepthStencilAttachment, TextureDescriptor,
            TextureDimension, TextureFormat, TextureId, TextureUsage, TextureViewDescriptor,
            TextureViewId,
        },
        traits::GraphicsDevice,
        RenderError, ResourceError,
    },
};
use super::scene::CameraState;
use super::session::RenderSession;
use std::borrow::Cow;

/// Format of the color/emissive channel.
pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// Format of the normal channel.
pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Format of the specular/roughness channel.
pub const SPECULAR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// Format of the ambient occlusion ping-pong pair.
pub const AO_FORMAT: TextureFormat = TextureFormat::R8Unorm;
/// Format of the depth/stencil target.
pub const DEPTH_STENCIL_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;
/// Format of the post-process and history ping-pong pairs.
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// The screen-space channels of the frame buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeChannel {
    /// Albedo in rgb, emissive strength in a.
    ColorEmissive,
    /// View-independent world normal.
    Normal,
    /// Specular color and roughness.
    SpecularRoughness,
    /// The ambient occlusion target written first each frame.
    AoPing,
    /// The ambient occlusion target written by the smoothing pass.
    AoPong,
    /// Depth and stencil, sampled through the depth-only view.
    DepthStencil,
}

impl AttributeChannel {
    /// Every channel.
    pub const ALL: [AttributeChannel; 6] = [
        AttributeChannel::ColorEmissive,
        AttributeChannel::Normal,
        AttributeChannel::SpecularRoughness,
        AttributeChannel::AoPing,
        AttributeChannel::AoPong,
        AttributeChannel::DepthStencil,
    ];

    /// Storage format of the channel.
    pub const fn format(self) -> TextureFormat {
        match self {
            AttributeChannel::ColorEmissive => COLOR_FORMAT,
            AttributeChannel::Normal => NORMAL_FORMAT,
            AttributeChannel::SpecularRoughness => SPECULAR_FORMAT,
            AttributeChannel::AoPing | AttributeChannel::AoPong => AO_FORMAT,
            AttributeChannel::DepthStencil => DEPTH_STENCIL_FORMAT,
        }
    }
}

/// Two interchangeable members with a current/other role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingPong<T> {
    members: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    /// Creates a pair where `first` is current.
    pub fn new(first: T, second: T) -> Self {
        Self {
            members: [first, second],
            current: 0,
        }
    }

    /// The member currently holding valid data.
    pub fn current(&self) -> &T {
        &self.members[self.current]
    }

    /// The member free to be written.
    pub fn other(&self) -> &T {
        &self.members[1 - self.current]
    }

    /// Exchanges the roles of the two members.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Physical index of the current member.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Makes the member at physical `index` current.
    pub fn set_current_index(&mut self, index: usize) {
        self.current = index & 1;
    }

    /// A member by physical index.
    pub fn member(&self, index: usize) -> &T {
        &self.members[index & 1]
    }

    /// Both members, in physical order.
    pub fn members(&self) -> &[T; 2] {
        &self.members
    }
}

/// A color render target with its attachment and sampling views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    /// The texture.
    pub texture: TextureId,
    /// View used as a color attachment.
    pub render_view: TextureViewId,
    /// View used for sampling.
    pub sampled_view: TextureViewId,
    /// Storage format.
    pub format: TextureFormat,
    /// Size in texels.
    pub extent: Extent3D,
}

/// Depth/stencil view that may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWriteDepthView(TextureViewId);

/// Depth/stencil view for passes that only test against depth and stencil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOnlyDepthView(TextureViewId);

/// Depth-only view for shader sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledDepthView(TextureViewId);

impl ReadWriteDepthView {
    /// An attachment clearing depth to `depth` and stencil to `stencil`.
    pub fn clearing_attachment(&self, depth: f32, stencil: u32) -> RenderPassDepthStencilAttachment {
        RenderPassDepthStencilAttachment {
            view: self.0,
            depth_ops: Some(Operations::clear(depth)),
            stencil_ops: Some(Operations::clear(stencil)),
        }
    }

    /// The underlying view.
    pub fn view(&self) -> TextureViewId {
        self.0
    }
}

impl ReadOnlyDepthView {
    /// An attachment that tests but never writes.
    pub fn attachment(&self) -> RenderPassDepthStencilAttachment {
        RenderPassDepthStencilAttachment {
            view: self.0,
            depth_ops: None,
            stencil_ops: None,
        }
    }

    /// The underlying view.
    pub fn view(&self) -> TextureViewId {
        self.0
    }
}

impl SampledDepthView {
    /// The underlying view.
    pub fn view(&self) -> TextureViewId {
        self.0
    }
}

/// The combined depth/stencil target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilTarget {
    /// The texture.
    pub texture: TextureId,
    /// Written by the geometry stage.
    pub read_write: ReadWriteDepthView,
    /// Attached by the decal stage.
    pub read_only: ReadOnlyDepthView,
    /// Sampled by decals, ambient occlusion, lighting and post stages.
    pub sampled: SampledDepthView,
    /// Size in texels.
    pub extent: Extent3D,
}

/// One allocated resource, as reported by [`FrameBufferSet::describe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetShape {
    /// Role of the resource.
    pub label: &'static str,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Storage format.
    pub format: TextureFormat,
}

/// Snapshot of the dimensions and formats of a [`FrameBufferSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferLayout {
    /// One entry per allocated texture.
    pub targets: Vec<TargetShape>,
}

impl FrameBufferLayout {
    /// The entry with the given label.
    pub fn get(&self, label: &str) -> Option<&TargetShape> {
        self.targets.iter().find(|shape| shape.label == label)
    }
}

/// Tracks every texture and view created during an allocation so that a
/// failure part-way releases what was already created.
struct Allocation<'a> {
    device: &'a dyn GraphicsDevice,
    textures: Vec<TextureId>,
    views: Vec<TextureViewId>,
}

impl<'a> Allocation<'a> {
    fn new(device: &'a dyn GraphicsDevice) -> Self {
        Self {
            device,
            textures: Vec::new(),
            views: Vec::new(),
        }
    }

    fn texture(
        &mut self,
        label: &'static str,
        extent: Extent3D,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Result<TextureId, ResourceError> {
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed(label)),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
        })?;
        self.textures.push(texture);
        Ok(texture)
    }

    fn view(
        &mut self,
        texture: TextureId,
        label: &'static str,
        aspect: ImageAspect,
    ) -> Result<TextureViewId, ResourceError> {
        let view = self.device.create_texture_view(
            texture,
            &TextureViewDescriptor {
                label: Some(Cow::Borrowed(label)),
                aspect,
                ..Default::default()
            },
        )?;
        self.views.push(view);
        Ok(view)
    }

    fn channel(
        &mut self,
        label: &'static str,
        extent: Extent3D,
        format: TextureFormat,
        extra_usage: TextureUsage,
    ) -> Result<ChannelTarget, ResourceError> {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | extra_usage;
        let texture = self.texture(label, extent, format, usage)?;
        let render_view = self.view(texture, label, ImageAspect::All)?;
        let sampled_view = self.view(texture, label, ImageAspect::All)?;
        Ok(ChannelTarget {
            texture,
            render_view,
            sampled_view,
            format,
            extent,
        })
    }

    fn abort(self) {
        release(self.device, &self.textures, &self.views);
    }
}

fn release(device: &dyn GraphicsDevice, textures: &[TextureId], views: &[TextureViewId]) {
    for view in views {
        if let Err(e) = device.destroy_texture_view(*view) {
            log::warn!("Failed to destroy frame buffer view {view:?}: {e:?}");
        }
    }
    for texture in textures {
        if let Err(e) = device.destroy_texture(*texture) {
            log::warn!("Failed to destroy frame buffer texture {texture:?}: {e:?}");
        }
    }
}

#[derive(Debug)]
struct Targets {
    color: ChannelTarget,
    normal: ChannelTarget,
    specular: ChannelTarget,
    ao: PingPong<ChannelTarget>,
    depth: DepthStencilTarget,
    post: PingPong<ChannelTarget>,
    // Not tied to `post`: the routing plan sets the post member each frame,
    // history flips only on frames that write it.
    history: PingPong<ChannelTarget>,
    textures: Vec<TextureId>,
    views: Vec<TextureViewId>,
}

impl Targets {
    fn allocate(
        device: &dyn GraphicsDevice,
        extent: Extent3D,
        ao_extent: Extent3D,
    ) -> Result<Self, ResourceError> {
        let mut allocation = Allocation::new(device);
        match Self::allocate_into(&mut allocation, extent, ao_extent) {
            Ok(targets) => Ok(Self {
                textures: std::mem::take(&mut allocation.textures),
                views: std::mem::take(&mut allocation.views),
                ..targets
            }),
            Err(e) => {
                allocation.abort();
                Err(e)
            }
        }
    }

    fn allocate_into(
        allocation: &mut Allocation<'_>,
        extent: Extent3D,
        ao_extent: Extent3D,
    ) -> Result<Self, ResourceError> {
        let none = TextureUsage::empty();
        let color = allocation.channel("Color/Emissive Channel", extent, COLOR_FORMAT, none)?;
        let normal = allocation.channel("Normal Channel", extent, NORMAL_FORMAT, none)?;
        let specular =
            allocation.channel("Specular/Roughness Channel", extent, SPECULAR_FORMAT, none)?;
        let ao = PingPong::new(
            allocation.channel("AO Ping", ao_extent, AO_FORMAT, none)?,
            allocation.channel("AO Pong", ao_extent, AO_FORMAT, none)?,
        );

        let depth_texture = allocation.texture(
            "Depth/Stencil",
            extent,
            DEPTH_STENCIL_FORMAT,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )?;
        let depth = DepthStencilTarget {
            texture: depth_texture,
            read_write: ReadWriteDepthView(allocation.view(
                depth_texture,
                "Depth/Stencil Read-Write",
                ImageAspect::All,
            )?),
            read_only: ReadOnlyDepthView(allocation.view(
                depth_texture,
                "Depth/Stencil Read-Only",
                ImageAspect::All,
            )?),
            sampled: SampledDepthView(allocation.view(
                depth_texture,
                "Depth Sampled",
                ImageAspect::DepthOnly,
            )?),
            extent,
        };

        let post = PingPong::new(
            allocation.channel("Post A", extent, HDR_FORMAT, TextureUsage::COPY_SRC)?,
            allocation.channel("Post B", extent, HDR_FORMAT, TextureUsage::COPY_SRC)?,
        );
        let history = PingPong::new(
            allocation.channel("History A", extent, HDR_FORMAT, TextureUsage::COPY_DST)?,
            allocation.channel("History B", extent, HDR_FORMAT, TextureUsage::COPY_DST)?,
        );

        Ok(Self {
            color,
            normal,
            specular,
            ao,
            depth,
            post,
            history,
            textures: Vec::new(),
            views: Vec::new(),
        })
    }
}

/// Size of the ambient occlusion targets for an output of `width` x `height`.
pub fn ao_extent(width: u32, height: u32, high_res_effects: bool) -> Extent3D {
    if high_res_effects {
        Extent3D::d2(width, height)
    } else {
        Extent3D::d2(width.div_ceil(2).max(1), height.div_ceil(2).max(1))
    }
}

/// Every screen-sized target of the deferred pipeline, plus the camera the
/// next frame renders from.
#[derive(Debug)]
pub struct FrameBufferSet {
    targets: Targets,
    extent: Extent3D,
    high_res_effects: bool,
    camera: CameraState,
}

impl FrameBufferSet {
    /// Allocates every target for a `width` x `height` output.
    ///
    /// Ambient occlusion targets are half resolution (rounded up) unless
    /// `high_res_effects` is set.
    ///
    /// ## Errors
    /// [`RenderError::InvalidConfiguration`] for a zero dimension,
    /// [`RenderError::ResourceCreationFailure`] when the device rejects a
    /// texture or view. Nothing stays allocated on failure.
    pub fn new(
        session: &RenderSession,
        width: u32,
        height: u32,
        high_res_effects: bool,
    ) -> Result<Self, RenderError> {
        session.ensure_device()?;
        let device = session.device();
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidConfiguration(format!(
                "frame buffer size must be non-zero, got {width}x{height}"
            )));
        }
        let extent = Extent3D::d2(width, height);
        let targets = Targets::allocate(device, extent, ao_extent(width, height, high_res_effects))?;
        log::info!(
            "Allocated frame buffer set {}x{} (high-res effects: {})",
            width,
            height,
            high_res_effects
        );
        Ok(Self {
            targets,
            extent,
            high_res_effects,
            camera: CameraState::default(),
        })
    }

    /// Reallocates every target at a new size.
    ///
    /// A zero dimension is ignored with a warning (minimized window). The
    /// new targets are allocated before the old ones are released, so a
    /// failure leaves the set unchanged.
    pub fn resize(
        &mut self,
        session: &RenderSession,
        width: u32,
        height: u32,
        high_res_effects: bool,
    ) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            log::warn!("Ignoring frame buffer resize to {width}x{height}");
            return Ok(());
        }
        session.ensure_device()?;
        let device = session.device();
        let extent = Extent3D::d2(width, height);
        let targets = Targets::allocate(
            device,
            extent,
            ao_extent(width, height, high_res_effects),
        )?;
        let old = std::mem::replace(&mut self.targets, targets);
        release(device, &old.textures, &old.views);
        self.extent = extent;
        self.high_res_effects = high_res_effects;
        log::info!(
            "Resized frame buffer set to {}x{} (high-res effects: {})",
            width,
            height,
            high_res_effects
        );
        Ok(())
    }

    /// Releases every target.
    pub fn destroy(self, session: &RenderSession) {
        release(session.device(), &self.targets.textures, &self.targets.views);
    }

    /// Sets the camera of the next frame.
    pub fn set_camera(&mut self, view: Mat4, projection: Mat4, position: Vec3) {
        self.camera = CameraState {
            view,
            projection,
            position,
        };
    }

    /// The camera of the next frame.
    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    /// Output size.
    pub fn extent(&self) -> Extent3D {
        self.extent
    }

    /// Size of the ambient occlusion targets.
    pub fn ao_extent(&self) -> Extent3D {
        self.targets.ao.current().extent
    }

    /// Whether screen-space effects run at full resolution.
    pub fn high_res_effects(&self) -> bool {
        self.high_res_effects
    }

    /// A color channel. Ambient occlusion channels resolve through the
    /// current ping-pong roles. Returns `None` for
    /// [`AttributeChannel::DepthStencil`], see [`FrameBufferSet::depth_stencil`].
    pub fn channel(&self, channel: AttributeChannel) -> Option<&ChannelTarget> {
        match channel {
            AttributeChannel::ColorEmissive => Some(&self.targets.color),
            AttributeChannel::Normal => Some(&self.targets.normal),
            AttributeChannel::SpecularRoughness => Some(&self.targets.specular),
            AttributeChannel::AoPing => Some(self.targets.ao.current()),
            AttributeChannel::AoPong => Some(self.targets.ao.other()),
            AttributeChannel::DepthStencil => None,
        }
    }

    /// The texture view shaders sample for `channel`.
    pub fn sampled_view(&self, channel: AttributeChannel) -> TextureViewId {
        match self.channel(channel) {
            Some(target) => target.sampled_view,
            None => self.targets.depth.sampled.view(),
        }
    }

    /// The texture backing `channel`.
    pub fn texture(&self, channel: AttributeChannel) -> TextureId {
        match self.channel(channel) {
            Some(target) => target.texture,
            None => self.targets.depth.texture,
        }
    }

    /// The three geometry channels, in attachment order.
    pub fn geometry_channels(&self) -> [&ChannelTarget; 3] {
        [&self.targets.color, &self.targets.normal, &self.targets.specular]
    }

    /// The depth/stencil target.
    pub fn depth_stencil(&self) -> &DepthStencilTarget {
        &self.targets.depth
    }

    /// The ambient occlusion pair.
    pub fn ao_buffers(&self) -> &PingPong<ChannelTarget> {
        &self.targets.ao
    }

    /// The ambient occlusion pair, mutably.
    pub fn ao_buffers_mut(&mut self) -> &mut PingPong<ChannelTarget> {
        &mut self.targets.ao
    }

    /// The post-process pair.
    pub fn post_buffers(&self) -> &PingPong<ChannelTarget> {
        &self.targets.post
    }

    /// The post-process pair, mutably.
    pub fn post_buffers_mut(&mut self) -> &mut PingPong<ChannelTarget> {
        &mut self.targets.post
    }

    /// The anti-aliasing history pair.
    ///
    /// Its current index moves independently of [`Self::post_buffers`]: it
    /// flips once per frame that copies into history, and keeps its role on
    /// frames that skip the copy.
    pub fn history_buffers(&self) -> &PingPong<ChannelTarget> {
        &self.targets.history
    }

    /// The anti-aliasing history pair, mutably.
    pub fn history_buffers_mut(&mut self) -> &mut PingPong<ChannelTarget> {
        &mut self.targets.history
    }

    /// Lists the shape of every allocated resource, for comparisons across
    /// resizes.
    pub fn describe(&self) -> FrameBufferLayout {
        let shape = |label, target: &ChannelTarget| TargetShape {
            label,
            width: target.extent.width,
            height: target.extent.height,
            format: target.format,
        };
        let t = &self.targets;
        let targets = vec![
            shape("color_emissive", &t.color),
            shape("normal", &t.normal),
            shape("specular_roughness", &t.specular),
            shape("ao_a", t.ao.member(0)),
            shape("ao_b", t.ao.member(1)),
            TargetShape {
                label: "depth_stencil",
                width: t.depth.extent.width,
                height: t.depth.extent.height,
                format: DEPTH_STENCIL_FORMAT,
            },
            shape("post_a", t.post.member(0)),
            shape("post_b", t.post.member(1)),
            shape("history_a", t.history.member(0)),
            shape("history_b", t.history.member(1)),
        ];
        FrameBufferLayout { targets }
    }

    /// Number of textures currently owned.
    pub fn texture_count(&self) -> usize {
        self.targets.textures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_swaps_roles() {
        let mut pair = PingPong::new('a', 'b');
        assert_eq!((*pair.current(), *pair.other()), ('a', 'b'));
        pair.swap();
        assert_eq!((*pair.current(), *pair.other()), ('b', 'a'));
        assert_eq!(pair.current_index(), 1);
        pair.swap();
        assert_eq!(pair.current_index(), 0);
    }

    #[test]
    fn test_ao_extent_rounds_up() {
        assert_eq!(ao_extent(64, 32, false), Extent3D::d2(32, 16));
        assert_eq!(ao_extent(63, 31, false), Extent3D::d2(32, 16));
        assert_eq!(ao_extent(1, 1, false), Extent3D::d2(1, 1));
        assert_eq!(ao_extent(63, 31, true), Extent3D::d2(63, 31));
    }

    #[test]
    fn test_channel_formats() {
        assert_eq!(AttributeChannel::Normal.format(), TextureFormat::Rgba16Float);
        assert_eq!(AttributeChannel::AoPong.format(), TextureFormat::R8Unorm);
        assert!(AttributeChannel::DepthStencil.format().has_stencil());
    }
}
