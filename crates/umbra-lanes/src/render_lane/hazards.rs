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

//! Input/output hazard tracking for the frame's render passes.
//!
//! Every texture bound for sampling is registered with a scope: pass-scoped
//! inputs are released when the pass that bound them ends, frame-scoped
//! inputs stay bound until the frame's explicit release. A pass may not
//! render to a texture that is currently bound as an input, and a texture
//! cannot be bound as an input while attached as an output. A depth/stencil
//! texture attached read-only can be sampled at the same time.

use ahash::AHashMap;
use umbra_core::renderer::{api::TextureId, RenderError};

/// How long an input binding stays alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InputScope {
    /// Released when the current pass ends.
    Pass,
    /// Released by [`BindingTracker::release_frame_inputs`].
    Frame,
}

/// How the depth/stencil texture is attached to a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthAccess {
    /// Depth or stencil is written.
    ReadWrite,
    /// Tested only.
    ReadOnly,
}

/// Tracks which textures are bound as inputs and outputs.
#[derive(Debug, Default)]
pub struct BindingTracker {
    inputs: AHashMap<TextureId, InputScope>,
    color_outputs: Vec<TextureId>,
    depth_output: Option<(TextureId, DepthAccess)>,
    pass_label: Option<&'static str>,
}

impl BindingTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the attachments of a pass.
    ///
    /// ## Errors
    /// [`RenderError::BindingHazard`] when an attachment is bound as an input,
    /// unless it is a depth attachment used read-only.
    pub fn begin_pass(
        &mut self,
        label: &'static str,
        color_outputs: &[TextureId],
        depth_output: Option<(TextureId, DepthAccess)>,
    ) -> Result<(), RenderError> {
        for texture in color_outputs {
            if self.inputs.contains_key(texture) {
                return Err(RenderError::BindingHazard(format!(
                    "pass '{label}' renders to {texture:?}, which is bound as an input"
                )));
            }
        }
        if let Some((texture, DepthAccess::ReadWrite)) = depth_output {
            if self.inputs.contains_key(&texture) {
                return Err(RenderError::BindingHazard(format!(
                    "pass '{label}' writes depth {texture:?}, which is bound as an input"
                )));
            }
        }
        self.color_outputs.clear();
        self.color_outputs.extend_from_slice(color_outputs);
        self.depth_output = depth_output;
        self.pass_label = Some(label);
        Ok(())
    }

    /// Registers a texture sampled by the current pass.
    ///
    /// Binding an already bound texture keeps the longer of the two scopes.
    pub fn bind_input(&mut self, texture: TextureId, scope: InputScope) -> Result<(), RenderError> {
        let label = self.pass_label.unwrap_or("<none>");
        if self.color_outputs.contains(&texture) {
            return Err(RenderError::BindingHazard(format!(
                "pass '{label}' samples {texture:?} while rendering to it"
            )));
        }
        if self.depth_output == Some((texture, DepthAccess::ReadWrite)) {
            return Err(RenderError::BindingHazard(format!(
                "pass '{label}' samples depth {texture:?} while writing it"
            )));
        }
        let entry = self.inputs.entry(texture).or_insert(scope);
        *entry = (*entry).max(scope);
        Ok(())
    }

    /// Ends the current pass: its attachments and pass-scoped inputs are
    /// released.
    pub fn end_pass(&mut self) {
        self.color_outputs.clear();
        self.depth_output = None;
        self.pass_label = None;
        self.inputs.retain(|_, scope| *scope == InputScope::Frame);
    }

    /// Releases every remaining input. Returns how many were bound.
    pub fn release_frame_inputs(&mut self) -> usize {
        let released = self.inputs.len();
        self.inputs.clear();
        self.color_outputs.clear();
        self.depth_output = None;
        self.pass_label = None;
        released
    }

    /// Whether `texture` is currently bound as an input.
    pub fn is_bound_input(&self, texture: TextureId) -> bool {
        self.inputs.contains_key(&texture)
    }

    /// Number of bound inputs.
    pub fn bound_input_count(&self) -> usize {
        self.inputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: TextureId = TextureId(1);
    const B: TextureId = TextureId(2);
    const DEPTH: TextureId = TextureId(3);

    #[test]
    fn test_rendering_to_a_bound_input_is_a_hazard() {
        let mut tracker = BindingTracker::new();
        tracker.begin_pass("first", &[B], None).unwrap();
        tracker.bind_input(A, InputScope::Frame).unwrap();
        tracker.end_pass();
        assert!(matches!(
            tracker.begin_pass("second", &[A], None),
            Err(RenderError::BindingHazard(_))
        ));
    }

    #[test]
    fn test_pass_scoped_inputs_are_released_at_pass_end() {
        let mut tracker = BindingTracker::new();
        tracker.begin_pass("blur", &[B], None).unwrap();
        tracker.bind_input(A, InputScope::Pass).unwrap();
        tracker.end_pass();
        assert!(!tracker.is_bound_input(A));
        assert!(tracker.begin_pass("next", &[A], None).is_ok());
    }

    #[test]
    fn test_sampling_the_output_is_a_hazard() {
        let mut tracker = BindingTracker::new();
        tracker.begin_pass("pass", &[A], None).unwrap();
        assert!(tracker.bind_input(A, InputScope::Pass).is_err());
    }

    #[test]
    fn test_read_only_depth_can_be_sampled() {
        let mut tracker = BindingTracker::new();
        tracker
            .begin_pass("decals", &[A], Some((DEPTH, DepthAccess::ReadOnly)))
            .unwrap();
        assert!(tracker.bind_input(DEPTH, InputScope::Frame).is_ok());
        tracker.end_pass();

        assert!(tracker
            .begin_pass("geometry", &[B], Some((DEPTH, DepthAccess::ReadWrite)))
            .is_err());
        assert!(tracker
            .begin_pass("decals again", &[B], Some((DEPTH, DepthAccess::ReadOnly)))
            .is_ok());
    }

    #[test]
    fn test_writable_depth_cannot_be_sampled() {
        let mut tracker = BindingTracker::new();
        tracker
            .begin_pass("geometry", &[A], Some((DEPTH, DepthAccess::ReadWrite)))
            .unwrap();
        assert!(tracker.bind_input(DEPTH, InputScope::Frame).is_err());
    }

    #[test]
    fn test_frame_release_clears_everything() {
        let mut tracker = BindingTracker::new();
        tracker.begin_pass("pass", &[B], None).unwrap();
        tracker.bind_input(A, InputScope::Pass).unwrap();
        tracker.bind_input(A, InputScope::Frame).unwrap();
        tracker.bind_input(DEPTH, InputScope::Frame).unwrap();
        tracker.end_pass();
        assert!(tracker.is_bound_input(A));
        assert_eq!(tracker.release_frame_inputs(), 2);
        assert_eq!(tracker.bound_input_count(), 0);
    }
}
