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

//! # Umbra Lanes
//!
//! The deferred rendering pipeline. A [`render_lane::DeferredLane`] executes six
//! fixed stages per frame (scene constants, geometry, decals, ambient
//! occlusion, lighting resolve, post-process chain) against a
//! [`render_lane::FrameBufferSet`] and a caller-populated
//! [`render_lane::DrawQueue`], through any `umbra_core` graphics device.

#![warn(missing_docs)]

pub mod render_lane;

pub use render_lane::*;
