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

//! Error hierarchy for the rendering subsystem.
//!
//! Device-level failures are reported as [`ResourceError`]; the deferred
//! pipeline surfaces everything to its caller as a frame-aborting
//! [`RenderError`]. No stage recovers locally.

use crate::renderer::api::pipeline::RenderPipelineId;
use crate::renderer::api::resource::ShaderModuleId;
use std::fmt;

/// An error related to the creation of a shader module.
#[derive(Debug)]
pub enum ShaderError {
    /// The backend rejected the shader source.
    CompilationError {
        /// A descriptive label for the shader.
        label: String,
        /// Messages reported by the shader compiler.
        details: String,
    },
    /// The requested shader module could not be found.
    NotFound {
        /// The ID of the shader module that was not found.
        id: ShaderModuleId,
    },
    /// No shader blob was registered for the requested pipeline stage.
    MissingBlob {
        /// The key that was looked up.
        key: String,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader compilation failed for '{label}': {details}")
            }
            ShaderError::NotFound { id } => {
                write!(f, "Shader module not found for ID: {id:?}")
            }
            ShaderError::MissingBlob { key } => {
                write!(f, "No shader blob registered for '{key}'")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation or use of a render pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// A shader module referenced by the pipeline is unknown to the device.
    InvalidShaderModuleForPipeline {
        /// The ID of the invalid shader module.
        id: ShaderModuleId,
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
    },
    /// The specified render pipeline ID is not valid.
    InvalidRenderPipeline {
        /// The ID of the invalid render pipeline.
        id: RenderPipelineId,
    },
    /// A bind group layout referenced by the pipeline is unknown to the device.
    InvalidBindGroupLayout {
        /// The label of the pipeline being created.
        pipeline_label: Option<String>,
    },
    /// The backend failed to build the pipeline state object.
    CompilationFailed {
        /// A descriptive label for the pipeline.
        label: Option<String>,
        /// Messages reported by the backend.
        details: String,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidShaderModuleForPipeline { id, pipeline_label } => write!(
                f,
                "Invalid shader module {:?} for pipeline '{}'",
                id,
                pipeline_label.as_deref().unwrap_or("Unknown")
            ),
            PipelineError::InvalidRenderPipeline { id } => {
                write!(f, "Invalid render pipeline ID: {id:?}")
            }
            PipelineError::InvalidBindGroupLayout { pipeline_label } => write!(
                f,
                "Invalid bind group layout for pipeline '{}'",
                pipeline_label.as_deref().unwrap_or("Unknown")
            ),
            PipelineError::CompilationFailed { label, details } => write!(
                f,
                "Pipeline compilation failed for '{}': {}",
                label.as_deref().unwrap_or("Unknown"),
                details
            ),
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A resource could not be found.
    NotFound,
    /// The handle used to reference a resource is invalid.
    InvalidHandle,
    /// An error originating from the backend implementation.
    BackendError(String),
    /// An access went past the end of a resource.
    OutOfBounds,
    /// The device was lost; every later call fails with this error.
    DeviceLost,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds."),
            ResourceError::DeviceLost => write!(f, "The graphics device was lost."),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A frame-aborting error returned by the deferred pipeline.
#[derive(Debug)]
pub enum RenderError {
    /// A GPU resource could not be created at construction or resize time.
    ResourceCreationFailure(ResourceError),
    /// The graphics device was lost. Reinitialization is required.
    DeviceLost,
    /// A runtime setting exceeds a fixed-capacity storage.
    ConfigurationOverflow {
        /// The setting that overflowed.
        what: &'static str,
        /// The requested value.
        requested: usize,
        /// The largest accepted value.
        capacity: usize,
    },
    /// A configuration value is malformed (bad radius, duplicate bind slots...).
    InvalidConfiguration(String),
    /// A texture was requested as an input and an output at the same time.
    BindingHazard(String),
    /// A device call failed while recording or submitting a frame.
    RenderingFailed(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ResourceCreationFailure(err) => {
                write!(f, "Failed to create a GPU resource: {err}")
            }
            RenderError::DeviceLost => write!(
                f,
                "The graphics device was lost and needs to be reinitialized."
            ),
            RenderError::ConfigurationOverflow {
                what,
                requested,
                capacity,
            } => write!(
                f,
                "Configuration overflow: {what} = {requested} exceeds capacity {capacity}"
            ),
            RenderError::InvalidConfiguration(msg) => {
                write!(f, "Invalid renderer configuration: {msg}")
            }
            RenderError::BindingHazard(msg) => write!(f, "Binding hazard: {msg}"),
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceCreationFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::DeviceLost => RenderError::DeviceLost,
            other => RenderError::ResourceCreationFailure(other),
        }
    }
}
