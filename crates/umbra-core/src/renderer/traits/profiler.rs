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

use super::command_recorder::CommandEncoder;
use crate::renderer::api::core::{StageTimings, TimestampReadback};
use std::any::Any;

/// A GPU profiler built on timestamp queries.
///
/// Implementations double-buffer their readback: frame N's timestamps are
/// copied to a staging buffer, mapped after submission, and read at the
/// start of frame N+1. The read never blocks indefinitely.
///
/// It must also implement `Any` so that backend encoders can downcast it.
pub trait GpuProfiler: Any + Send + Sync {
    /// Tries to read the previous frame's results.
    ///
    /// Polls the device a bounded number of times. Reports
    /// [`TimestampReadback::Unavailable`] when the results did not arrive,
    /// in which case they stay pending for a later frame.
    fn try_read_previous_frame(&mut self) -> TimestampReadback;

    /// Records the commands that resolve this frame's queries and copy them
    /// into the staging buffer for `frame_index`.
    fn resolve_and_copy(&self, encoder: &mut dyn CommandEncoder, frame_index: u64);

    /// Schedules the asynchronous mapping of `frame_index`'s staging buffer.
    /// Must be called after the frame's command buffer was submitted.
    fn schedule_map_after_submit(&mut self, frame_index: u64);

    /// The smoothed timings of the most recent frames.
    fn smoothed_timings(&self) -> StageTimings;

    /// Returns the profiler as `Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns the profiler as mutable `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
