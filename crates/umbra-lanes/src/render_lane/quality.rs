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

//! Quality tiers, lighting shader variant selection and ambient occlusion
//! settings.
//!
//! The lighting variant is picked once, when the lane is constructed: the
//! lighting tier selects the BRDF and the post-effect tier decides whether
//! the resolve samples the ambient occlusion channel.

use super::scene::halton;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use umbra_core::renderer::RenderError;

/// Largest ambient occlusion kernel the fixed-size uniform can hold.
pub const MAX_AO_SAMPLES: usize = 64;

/// Default number of ambient occlusion kernel samples.
pub const DEFAULT_AO_SAMPLES: u32 = 16;

/// Default ambient occlusion radius, in world units.
pub const DEFAULT_AO_RADIUS: f32 = 0.5;

/// Lighting quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LightingQuality {
    /// Lambert diffuse from the irradiance map only.
    Low,
    /// Adds a Blinn-Phong specular term.
    #[default]
    Medium,
    /// Cook-Torrance specular with prefiltered reflections.
    High,
    /// `High` plus a multi-scattering energy term.
    Ultra,
}

impl LightingQuality {
    /// Every tier, lowest first.
    pub const ALL: [LightingQuality; 4] = [
        LightingQuality::Low,
        LightingQuality::Medium,
        LightingQuality::High,
        LightingQuality::Ultra,
    ];

    /// Lower-case name used in entry points and logs.
    pub const fn name(self) -> &'static str {
        match self {
            LightingQuality::Low => "low",
            LightingQuality::Medium => "medium",
            LightingQuality::High => "high",
            LightingQuality::Ultra => "ultra",
        }
    }
}

/// Post-effect quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PostEffectQuality {
    /// No screen-space effects.
    Off,
    /// Cheap effects, no ambient occlusion.
    Low,
    /// Ambient occlusion enabled.
    #[default]
    Medium,
    /// Ambient occlusion enabled.
    High,
}

impl PostEffectQuality {
    /// Every tier, lowest first.
    pub const ALL: [PostEffectQuality; 4] = [
        PostEffectQuality::Off,
        PostEffectQuality::Low,
        PostEffectQuality::Medium,
        PostEffectQuality::High,
    ];

    /// Whether this tier runs the ambient occlusion stage.
    pub const fn requires_ambient_occlusion(self) -> bool {
        matches!(self, PostEffectQuality::Medium | PostEffectQuality::High)
    }
}

/// The quality section of the renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Lighting tier.
    pub lighting: LightingQuality,
    /// Post-effect tier.
    pub post_effects: PostEffectQuality,
    /// Number of ambient occlusion kernel samples, 1 to [`MAX_AO_SAMPLES`].
    pub ao_sample_count: u32,
    /// Ambient occlusion radius in world units.
    pub ao_radius: f32,
    /// Whether the anti-aliasing history is maintained.
    pub anti_aliasing: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            lighting: LightingQuality::default(),
            post_effects: PostEffectQuality::default(),
            ao_sample_count: DEFAULT_AO_SAMPLES,
            ao_radius: DEFAULT_AO_RADIUS,
            anti_aliasing: true,
        }
    }
}

/// A compiled form of the lighting resolve.
///
/// There are exactly eight variants: four tiers, each with and without
/// ambient occlusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightingVariant {
    /// The BRDF tier.
    pub tier: LightingQuality,
    /// Whether the resolve samples the ambient occlusion channel.
    pub ambient_occlusion: bool,
}

impl LightingVariant {
    /// Every variant, ordered by [`LightingVariant::id`].
    pub const ALL: [LightingVariant; 8] = {
        let mut all = [LightingVariant {
            tier: LightingQuality::Low,
            ambient_occlusion: false,
        }; 8];
        let mut i = 0;
        while i < 8 {
            all[i] = LightingVariant {
                tier: LightingQuality::ALL[i / 2],
                ambient_occlusion: i % 2 == 1,
            };
            i += 1;
        }
        all
    };

    /// Selects the variant for a pair of quality tiers.
    pub const fn select(lighting: LightingQuality, post_effects: PostEffectQuality) -> Self {
        Self {
            tier: lighting,
            ambient_occlusion: post_effects.requires_ambient_occlusion(),
        }
    }

    /// A dense identifier in `0..8`.
    pub const fn id(self) -> u8 {
        (self.tier as u8) * 2 + self.ambient_occlusion as u8
    }

    /// Fragment entry point of the lighting shader.
    pub const fn entry_point(self) -> &'static str {
        match (self.tier, self.ambient_occlusion) {
            (LightingQuality::Low, false) => "fs_lighting_low",
            (LightingQuality::Low, true) => "fs_lighting_low_ao",
            (LightingQuality::Medium, false) => "fs_lighting_medium",
            (LightingQuality::Medium, true) => "fs_lighting_medium_ao",
            (LightingQuality::High, false) => "fs_lighting_high",
            (LightingQuality::High, true) => "fs_lighting_high_ao",
            (LightingQuality::Ultra, false) => "fs_lighting_ultra",
            (LightingQuality::Ultra, true) => "fs_lighting_ultra_ao",
        }
    }
}

/// Validated ambient occlusion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoSettings {
    sample_count: u32,
    radius: f32,
}

impl Default for AoSettings {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_AO_SAMPLES,
            radius: DEFAULT_AO_RADIUS,
        }
    }
}

impl AoSettings {
    /// Validates a sample count and radius.
    ///
    /// ## Errors
    /// [`RenderError::ConfigurationOverflow`] when `sample_count` is zero or
    /// above [`MAX_AO_SAMPLES`], [`RenderError::InvalidConfiguration`] when
    /// the radius is not a positive finite number.
    pub fn new(sample_count: u32, radius: f32) -> Result<Self, RenderError> {
        if sample_count == 0 || sample_count as usize > MAX_AO_SAMPLES {
            return Err(RenderError::ConfigurationOverflow {
                what: "ambient occlusion sample count",
                requested: sample_count as usize,
                capacity: MAX_AO_SAMPLES,
            });
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(RenderError::InvalidConfiguration(format!(
                "ambient occlusion radius must be positive, got {radius}"
            )));
        }
        Ok(Self {
            sample_count,
            radius,
        })
    }

    /// Like [`AoSettings::new`], but clamps out-of-range values instead of
    /// rejecting them.
    pub fn clamped(sample_count: u32, radius: f32) -> Self {
        let radius = if radius.is_finite() && radius > 0.0 {
            radius
        } else {
            DEFAULT_AO_RADIUS
        };
        Self {
            sample_count: sample_count.clamp(1, MAX_AO_SAMPLES as u32),
            radius,
        }
    }

    /// Number of kernel samples.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Sampling radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Builds the kernel uniform.
    ///
    /// Samples lie in the +Z hemisphere and are denser near the origin; the
    /// sequence is deterministic so frames are reproducible.
    pub fn kernel(&self) -> AoKernelUniform {
        let mut samples = [[0.0f32; 4]; MAX_AO_SAMPLES];
        let count = self.sample_count as usize;
        for (i, sample) in samples.iter_mut().take(count).enumerate() {
            let u = halton(i as u32 + 1, 2);
            let v = halton(i as u32 + 1, 3);
            let w = halton(i as u32 + 1, 5);
            let phi = u * std::f32::consts::TAU;
            let cos_theta = 1.0 - v;
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let t = (i as f32 + 1.0) / count as f32;
            let scale = (0.1 + 0.9 * t * t) * w.max(0.1);
            *sample = [
                sin_theta * phi.cos() * scale,
                sin_theta * phi.sin() * scale,
                cos_theta * scale,
                0.0,
            ];
        }
        AoKernelUniform {
            samples,
            params: [self.radius, self.sample_count as f32, 0.025, 0.0],
        }
    }
}

/// GPU layout of the ambient occlusion kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AoKernelUniform {
    /// Hemisphere offsets, only the first `params[1]` are used.
    pub samples: [[f32; 4]; MAX_AO_SAMPLES],
    /// Radius, sample count, depth bias, unused.
    pub params: [f32; 4],
}

/// The active quality state of a lane.
///
/// The lighting variant and whether ambient occlusion runs are fixed at
/// construction. Only the ambient occlusion parameters can change later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySelector {
    variant: LightingVariant,
    post_effects: PostEffectQuality,
    ao: AoSettings,
    anti_aliasing: bool,
}

impl QualitySelector {
    /// Validates a quality configuration and selects the lighting variant.
    pub fn from_config(config: &QualityConfig) -> Result<Self, RenderError> {
        let ao = AoSettings::new(config.ao_sample_count, config.ao_radius)?;
        let variant = LightingVariant::select(config.lighting, config.post_effects);
        log::info!(
            "Selected lighting variant '{}' (id {})",
            variant.entry_point(),
            variant.id()
        );
        Ok(Self {
            variant,
            post_effects: config.post_effects,
            ao,
            anti_aliasing: config.anti_aliasing,
        })
    }

    /// The lighting variant chosen at construction.
    pub fn variant(&self) -> LightingVariant {
        self.variant
    }

    /// The post-effect tier chosen at construction.
    pub fn post_effects(&self) -> PostEffectQuality {
        self.post_effects
    }

    /// Whether the ambient occlusion stage runs.
    pub fn ambient_occlusion_enabled(&self) -> bool {
        self.variant.ambient_occlusion
    }

    /// Current ambient occlusion settings.
    pub fn ao_settings(&self) -> AoSettings {
        self.ao
    }

    /// Whether the anti-aliasing history is maintained.
    pub fn anti_aliasing(&self) -> bool {
        self.anti_aliasing
    }

    /// Replaces the ambient occlusion settings. The lighting variant is kept.
    pub fn set_ao_settings(&mut self, settings: AoSettings) {
        self.ao = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_tier_combinations_map_to_eight_variants() {
        let mut ids = HashSet::new();
        for lighting in LightingQuality::ALL {
            for post in PostEffectQuality::ALL {
                let variant = LightingVariant::select(lighting, post);
                assert_eq!(variant.tier, lighting);
                assert_eq!(variant.ambient_occlusion, post.requires_ambient_occlusion());
                assert_eq!(LightingVariant::ALL[variant.id() as usize], variant);
                ids.insert(variant.id());
            }
        }
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_entry_points_are_distinct() {
        let names: HashSet<_> = LightingVariant::ALL
            .iter()
            .map(|variant| variant.entry_point())
            .collect();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_ao_sample_count_bounds() {
        assert!(AoSettings::new(1, 0.5).is_ok());
        assert!(AoSettings::new(MAX_AO_SAMPLES as u32, 0.5).is_ok());
        assert!(matches!(
            AoSettings::new(MAX_AO_SAMPLES as u32 + 1, 0.5),
            Err(RenderError::ConfigurationOverflow { requested: 65, capacity: 64, .. })
        ));
        assert!(matches!(
            AoSettings::new(0, 0.5),
            Err(RenderError::ConfigurationOverflow { .. })
        ));
        assert!(matches!(
            AoSettings::new(8, f32::NAN),
            Err(RenderError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_clamped_settings() {
        let settings = AoSettings::clamped(500, -1.0);
        assert_eq!(settings.sample_count(), MAX_AO_SAMPLES as u32);
        assert_eq!(settings.radius(), DEFAULT_AO_RADIUS);
        assert_eq!(AoSettings::clamped(0, 1.0).sample_count(), 1);
    }

    #[test]
    fn test_kernel_fills_only_requested_samples() {
        let kernel = AoSettings::new(4, 1.0).unwrap().kernel();
        assert_eq!(std::mem::size_of::<AoKernelUniform>(), 1040);
        for sample in &kernel.samples[..4] {
            assert!(sample[2] >= 0.0);
            let length = (sample[0] * sample[0] + sample[1] * sample[1] + sample[2] * sample[2]).sqrt();
            assert!(length <= 1.0 + 1e-5);
        }
        assert!(kernel.samples[4..].iter().all(|s| *s == [0.0; 4]));
        assert_eq!(kernel.params[1], 4.0);
    }

    #[test]
    fn test_selector_keeps_variant_on_new_ao_settings() {
        let config = QualityConfig {
            lighting: LightingQuality::High,
            post_effects: PostEffectQuality::High,
            ..Default::default()
        };
        let mut selector = QualitySelector::from_config(&config).unwrap();
        let before = selector.variant();
        selector.set_ao_settings(AoSettings::new(32, 2.0).unwrap());
        assert_eq!(selector.variant(), before);
        assert_eq!(selector.ao_settings().sample_count(), 32);
    }
}
