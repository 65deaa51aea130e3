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

//! Backend-agnostic rendering contracts.
//!
//! This module defines the common language shared by the deferred pipeline
//! and the backends: the abstract [`GraphicsDevice`] and command-recording
//! traits, resource descriptors and handles, and the error types. The wgpu
//! implementation of these traits lives in `umbra-infra`; `umbra-lanes`
//! drives them without knowing which backend sits underneath.

pub mod api;
pub mod error;
pub mod traits;

pub use self::api::*;
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::traits::{CommandEncoder, GpuProfiler, GraphicsDevice, RenderPass};
