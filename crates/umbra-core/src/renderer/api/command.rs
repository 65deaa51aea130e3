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

//! Render pass descriptors and attachments.

use crate::math::LinearRgba;
use crate::renderer::api::resource::TextureViewId;

/// An opaque handle to a finished command buffer awaiting submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// What happens to an attachment when a pass begins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// Keep the existing contents.
    Load,
    /// Clear to the given value.
    Clear(V),
}

/// What happens to an attachment when a pass ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// Keep the results.
    Store,
    /// Discard the results.
    Discard,
}

/// Load and store operations for one attachment aspect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operations<V> {
    /// Operation at pass start.
    pub load: LoadOp<V>,
    /// Operation at pass end.
    pub store: StoreOp,
}

impl<V> Operations<V> {
    /// Clears to `value` and stores.
    pub fn clear(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Store,
        }
    }

    /// Loads and stores.
    pub fn load() -> Self {
        Self {
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassColorAttachment {
    /// The view rendered to.
    pub view: TextureViewId,
    /// Load and store operations.
    pub ops: Operations<LinearRgba>,
}

/// The depth/stencil attachment of a render pass.
///
/// An aspect whose operations are `None` is attached read-only: it can still
/// be tested against, but nothing is written to it.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDepthStencilAttachment {
    /// The depth/stencil view.
    pub view: TextureViewId,
    /// Depth aspect operations.
    pub depth_ops: Option<Operations<f32>>,
    /// Stencil aspect operations.
    pub stencil_ops: Option<Operations<u32>>,
}

impl RenderPassDepthStencilAttachment {
    /// Whether neither aspect is written by the pass.
    pub fn is_read_only(&self) -> bool {
        self.depth_ops.is_none() && self.stencil_ops.is_none()
    }
}

/// Describes a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// A debug label.
    pub label: Option<&'a str>,
    /// Color attachments, in shader output order.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// The single depth/stencil attachment, if any.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_depth_attachment() {
        let attachment = RenderPassDepthStencilAttachment {
            view: TextureViewId(1),
            depth_ops: None,
            stencil_ops: None,
        };
        assert!(attachment.is_read_only());

        let writable = RenderPassDepthStencilAttachment {
            stencil_ops: Some(Operations::clear(0)),
            ..attachment
        };
        assert!(!writable.is_read_only());
    }

    #[test]
    fn test_operations_helpers() {
        let ops = Operations::clear(1.0f32);
        assert_eq!(ops.load, LoadOp::Clear(1.0));
        assert_eq!(ops.store, StoreOp::Store);
        assert_eq!(Operations::<f32>::load().load, LoadOp::Load);
    }
}
