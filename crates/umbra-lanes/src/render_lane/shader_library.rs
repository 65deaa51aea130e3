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

//! Shader blobs keyed by the pipeline stage that consumes them.

use super::{quality::LightingVariant, shaders};
use ahash::AHashMap;
use std::borrow::Cow;
use umbra_core::renderer::{
    api::{ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData},
    traits::GraphicsDevice,
    ResourceError, ShaderError,
};

/// Identifies the shader module of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKey {
    /// The full-screen triangle vertex stage.
    FullscreenVertex,
    /// Static geometry.
    Geometry,
    /// Skinned geometry.
    SkinnedGeometry,
    /// Decal volumes.
    Decal,
    /// Ambient occlusion.
    AmbientOcclusion,
    /// Ambient occlusion smoothing.
    AmbientOcclusionBlur,
    /// One lighting resolve variant.
    Lighting(LightingVariant),
}

impl ShaderKey {
    /// A human-readable name, used as module label.
    pub fn label(&self) -> Cow<'static, str> {
        match self {
            ShaderKey::FullscreenVertex => Cow::Borrowed("fullscreen"),
            ShaderKey::Geometry => Cow::Borrowed("geometry"),
            ShaderKey::SkinnedGeometry => Cow::Borrowed("skinned_geometry"),
            ShaderKey::Decal => Cow::Borrowed("decal"),
            ShaderKey::AmbientOcclusion => Cow::Borrowed("ambient_occlusion"),
            ShaderKey::AmbientOcclusionBlur => Cow::Borrowed("ambient_occlusion_blur"),
            ShaderKey::Lighting(variant) => {
                Cow::Owned(format!("lighting[{}]", variant.entry_point()))
            }
        }
    }
}

/// A WGSL source handed to the device as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlob {
    /// Module label.
    pub label: Cow<'static, str>,
    /// WGSL text.
    pub source: Cow<'static, str>,
}

impl ShaderBlob {
    /// A blob over a static source.
    pub const fn from_static(label: &'static str, source: &'static str) -> Self {
        Self {
            label: Cow::Borrowed(label),
            source: Cow::Borrowed(source),
        }
    }
}

/// The shader blobs a deferred lane compiles at construction.
///
/// All lighting variants may share one blob: the variant only picks the
/// entry point.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    blobs: AHashMap<ShaderKey, ShaderBlob>,
}

impl ShaderLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in WGSL sources for every key.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        library.insert(
            ShaderKey::FullscreenVertex,
            ShaderBlob::from_static("fullscreen", shaders::FULLSCREEN_WGSL),
        );
        library.insert(
            ShaderKey::Geometry,
            ShaderBlob::from_static("geometry", shaders::GEOMETRY_WGSL),
        );
        library.insert(
            ShaderKey::SkinnedGeometry,
            ShaderBlob::from_static("skinned_geometry", shaders::SKINNED_GEOMETRY_WGSL),
        );
        library.insert(
            ShaderKey::Decal,
            ShaderBlob::from_static("decal", shaders::DECAL_WGSL),
        );
        library.insert(
            ShaderKey::AmbientOcclusion,
            ShaderBlob::from_static("ambient_occlusion", shaders::AMBIENT_OCCLUSION_WGSL),
        );
        library.insert(
            ShaderKey::AmbientOcclusionBlur,
            ShaderBlob::from_static(
                "ambient_occlusion_blur",
                shaders::AMBIENT_OCCLUSION_BLUR_WGSL,
            ),
        );
        for variant in LightingVariant::ALL {
            library.insert(
                ShaderKey::Lighting(variant),
                ShaderBlob::from_static("lighting", shaders::LIGHTING_WGSL),
            );
        }
        library
    }

    /// Adds or replaces a blob, returning the previous one.
    pub fn insert(&mut self, key: ShaderKey, blob: ShaderBlob) -> Option<ShaderBlob> {
        self.blobs.insert(key, blob)
    }

    /// The blob registered for `key`.
    ///
    /// ## Errors
    /// [`ShaderError::MissingBlob`] when nothing is registered.
    pub fn get(&self, key: ShaderKey) -> Result<&ShaderBlob, ShaderError> {
        self.blobs.get(&key).ok_or_else(|| ShaderError::MissingBlob {
            key: key.label().into_owned(),
        })
    }

    /// Whether a blob is registered for `key`.
    pub fn contains(&self, key: ShaderKey) -> bool {
        self.blobs.contains_key(&key)
    }

    /// Number of registered blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the library holds no blob.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Compiles the blob of `key` into a shader module.
    pub fn load(
        &self,
        device: &dyn GraphicsDevice,
        key: ShaderKey,
    ) -> Result<ShaderModuleId, ResourceError> {
        let blob = self.get(key)?;
        let module = device.create_shader_module(&ShaderModuleDescriptor {
            label: Some(blob.label.as_ref()),
            source: ShaderSourceData::Wgsl(Cow::Borrowed(blob.source.as_ref())),
        })?;
        log::debug!("Compiled shader module '{}' for {:?}", blob.label, key);
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::quality::{LightingQuality, PostEffectQuality};

    #[test]
    fn test_builtin_covers_every_key() {
        let library = ShaderLibrary::builtin();
        assert_eq!(library.len(), 6 + LightingVariant::ALL.len());
        for variant in LightingVariant::ALL {
            assert!(library.contains(ShaderKey::Lighting(variant)));
        }
        assert!(library.contains(ShaderKey::Decal));
    }

    #[test]
    fn test_missing_blob_names_the_key() {
        let library = ShaderLibrary::new();
        let variant = LightingVariant::select(LightingQuality::High, PostEffectQuality::High);
        match library.get(ShaderKey::Lighting(variant)) {
            Err(ShaderError::MissingBlob { key }) => assert!(key.contains("fs_lighting_high_ao")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_insert_replaces_a_blob() {
        let mut library = ShaderLibrary::builtin();
        let previous = library.insert(
            ShaderKey::Decal,
            ShaderBlob::from_static("custom_decal", "// custom"),
        );
        assert_eq!(previous.map(|b| b.label), Some(Cow::Borrowed("decal")));
        assert_eq!(library.get(ShaderKey::Decal).unwrap().source, "// custom");
    }
}
