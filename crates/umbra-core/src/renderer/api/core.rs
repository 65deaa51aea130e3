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

//! Frame-level constants, the fixed frame stages and GPU timing hooks.

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// The six fixed stages of a deferred frame, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStage {
    /// Camera and viewport constants upload.
    SceneConstants,
    /// Rasterization of static and skinned geometry into the attribute channels.
    Geometry,
    /// Stencil-filtered decal projection.
    Decals,
    /// Ambient occlusion and its smoothing pass.
    AmbientOcclusion,
    /// Full-screen lighting resolve.
    Lighting,
    /// The post-process chain.
    PostProcess,
}

impl FrameStage {
    /// Every stage, in execution order.
    pub const ALL: [FrameStage; 6] = [
        FrameStage::SceneConstants,
        FrameStage::Geometry,
        FrameStage::Decals,
        FrameStage::AmbientOcclusion,
        FrameStage::Lighting,
        FrameStage::PostProcess,
    ];

    /// Position of the stage in [`FrameStage::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// A short label for logs and pass names.
    pub const fn label(self) -> &'static str {
        match self {
            FrameStage::SceneConstants => "scene_constants",
            FrameStage::Geometry => "geometry",
            FrameStage::Decals => "decals",
            FrameStage::AmbientOcclusion => "ambient_occlusion",
            FrameStage::Lighting => "lighting",
            FrameStage::PostProcess => "post_process",
        }
    }
}

/// A point in a frame's GPU execution where a timestamp is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuHook {
    /// Before any work of the frame.
    FrameStart,
    /// After the last command of a stage.
    StageEnd(FrameStage),
}

impl GpuHook {
    /// Number of hooks written per frame.
    pub const COUNT: u32 = 1 + FrameStage::ALL.len() as u32;

    /// The query slot this hook writes.
    pub const fn query_index(self) -> u32 {
        match self {
            GpuHook::FrameStart => 0,
            GpuHook::StageEnd(stage) => 1 + stage as u32,
        }
    }
}

/// GPU durations of one frame, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageTimings {
    /// Duration of each stage, indexed by [`FrameStage::index`].
    pub stage_ms: [f32; 6],
    /// From the frame start hook to the end of the post chain.
    pub frame_total_ms: f32,
}

impl StageTimings {
    /// Builds timings from raw timestamps (one per [`GpuHook`]) and the
    /// timestamp period in nanoseconds.
    ///
    /// Returns `None` when the timestamps are not monotonic, which happens
    /// when a query was never written.
    pub fn from_raw(raw: &[u64], period_ns: f32) -> Option<Self> {
        if raw.len() < GpuHook::COUNT as usize {
            return None;
        }
        if raw.windows(2).any(|pair| pair[1] < pair[0]) {
            return None;
        }
        let to_ms = |ticks: u64| (ticks as f64 * period_ns as f64 / 1_000_000.0) as f32;
        let mut stage_ms = [0.0; 6];
        for stage in FrameStage::ALL {
            let i = stage.index();
            stage_ms[i] = to_ms(raw[i + 1] - raw[i]);
        }
        Some(Self {
            stage_ms,
            frame_total_ms: to_ms(raw[GpuHook::COUNT as usize - 1] - raw[0]),
        })
    }

    /// Duration of one stage.
    pub fn stage(&self, stage: FrameStage) -> f32 {
        self.stage_ms[stage.index()]
    }

    /// Exponential moving average toward `sample`.
    pub fn smoothed(&self, sample: &StageTimings, alpha: f32) -> StageTimings {
        if self.frame_total_ms == 0.0 {
            return *sample;
        }
        let mix = |old: f32, new: f32| alpha * new + (1.0 - alpha) * old;
        let mut stage_ms = [0.0; 6];
        for (i, value) in stage_ms.iter_mut().enumerate() {
            *value = mix(self.stage_ms[i], sample.stage_ms[i]);
        }
        StageTimings {
            stage_ms,
            frame_total_ms: mix(self.frame_total_ms, sample.frame_total_ms),
        }
    }
}

/// Outcome of trying to read back the previous frame's timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestampReadback {
    /// The results arrived within the poll budget.
    Ready(StageTimings),
    /// The results were not available this frame; they stay pending.
    Unavailable,
    /// No profiler is active.
    Disabled,
}

impl TimestampReadback {
    /// The timings, if any arrived.
    pub fn timings(&self) -> Option<&StageTimings> {
        match self {
            TimestampReadback::Ready(timings) => Some(timings),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hook_indices_are_dense() {
        assert_eq!(GpuHook::FrameStart.query_index(), 0);
        assert_eq!(
            GpuHook::StageEnd(FrameStage::PostProcess).query_index(),
            GpuHook::COUNT - 1
        );
    }

    #[test]
    fn test_stage_timings_from_raw() {
        let raw = [0, 0, 2_000_000, 3_000_000, 3_000_000, 5_000_000, 6_000_000];
        let timings = StageTimings::from_raw(&raw, 1.0).unwrap();
        assert_relative_eq!(timings.stage(FrameStage::Geometry), 2.0);
        assert_relative_eq!(timings.stage(FrameStage::Decals), 1.0);
        assert_relative_eq!(timings.stage(FrameStage::AmbientOcclusion), 0.0);
        assert_relative_eq!(timings.frame_total_ms, 6.0);
    }

    #[test]
    fn test_non_monotonic_timestamps_are_rejected() {
        let raw = [10, 5, 20, 30, 40, 50, 60];
        assert!(StageTimings::from_raw(&raw, 1.0).is_none());
        assert!(StageTimings::from_raw(&raw[..3], 1.0).is_none());
    }

    #[test]
    fn test_smoothing_starts_from_first_sample() {
        let sample = StageTimings {
            stage_ms: [1.0; 6],
            frame_total_ms: 6.0,
        };
        let first = StageTimings::default().smoothed(&sample, 0.2);
        assert_eq!(first, sample);

        let doubled = StageTimings {
            stage_ms: [2.0; 6],
            frame_total_ms: 12.0,
        };
        let second = first.smoothed(&doubled, 0.5);
        assert_relative_eq!(second.frame_total_ms, 9.0);
    }
}
