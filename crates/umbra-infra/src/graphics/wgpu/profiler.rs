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

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use umbra_core::renderer::api::core::{
    GpuHook, StageTimings, TimestampReadback, MAX_FRAMES_IN_FLIGHT,
};
use umbra_core::renderer::traits::{CommandEncoder, GpuProfiler};

use super::command::WgpuCommandEncoder;
use super::context::WgpuGraphicsContext;

const QUERY_COUNT: u32 = GpuHook::COUNT;
const RESOLVE_BUFFER_SIZE: u64 = QUERY_COUNT as u64 * std::mem::size_of::<u64>() as u64;
const EMA_ALPHA: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Free to receive the next copy.
    Idle,
    /// `map_async` was issued for the given frame.
    Mapping(u64),
}

#[derive(Debug)]
struct StagingSlot {
    buffer: wgpu::Buffer,
    ready: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    state: SlotState,
}

/// GPU timestamp profiler with one query per [`GpuHook`].
///
/// Frame N resolves its queries and copies them into staging slot
/// `N % MAX_FRAMES_IN_FLIGHT`; the slot is mapped once the frame was
/// submitted and read at the start of frame N+1. A slot still being mapped
/// is never overwritten: that frame's timings are dropped instead.
#[derive(Debug)]
pub struct WgpuTimestampProfiler {
    device: wgpu::Device,
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    slots: [StagingSlot; MAX_FRAMES_IN_FLIGHT],
    period_ns: f32,
    poll_budget: u32,
    smoothed: StageTimings,
    last_raw: Option<[u64; QUERY_COUNT as usize]>,
}

impl WgpuTimestampProfiler {
    /// Checks if the required features for timestamp queries are available.
    pub fn feature_available(features: wgpu::Features) -> bool {
        features.contains(wgpu::Features::TIMESTAMP_QUERY)
            && features.contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS)
    }

    /// Creates a profiler for the context's device.
    ///
    /// Returns `None` when the device cannot write timestamps from inside a
    /// command encoder. `poll_budget` bounds the non-blocking polls spent on
    /// each readback.
    pub fn new(context: &WgpuGraphicsContext, poll_budget: u32) -> Option<Self> {
        if !Self::feature_available(context.active_device_features) {
            log::info!("Timestamp queries unavailable, GPU profiler disabled");
            return None;
        }
        let device = context.device.clone();

        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Umbra GPU Timestamp QuerySet"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });

        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Umbra GPU Timestamp Resolve Buffer"),
            size: RESOLVE_BUFFER_SIZE,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let slots = std::array::from_fn(|i| StagingSlot {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Umbra GPU Timestamp Staging Buffer {i}")),
                size: RESOLVE_BUFFER_SIZE,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            ready: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            state: SlotState::Idle,
        });

        let period_ns = context.queue.get_timestamp_period();
        log::info!("GPU Timestamp Profiler period set to {period_ns:.3} ns.");

        Some(Self {
            device,
            query_set,
            resolve_buffer,
            slots,
            period_ns,
            poll_budget: poll_budget.max(1),
            smoothed: StageTimings::default(),
            last_raw: None,
        })
    }

    /// The raw timestamps of the most recently read frame.
    pub fn last_raw(&self) -> Option<&[u64]> {
        self.last_raw.as_ref().map(|raw| raw.as_slice())
    }

    /// Records the timestamp of `hook` into `encoder`.
    pub(crate) fn write(&self, encoder: &mut wgpu::CommandEncoder, hook: GpuHook) {
        encoder.write_timestamp(&self.query_set, hook.query_index());
    }

    fn slot_index(frame_index: u64) -> usize {
        (frame_index % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    fn any_ready(&self) -> bool {
        self.slots.iter().any(|slot| {
            matches!(slot.state, SlotState::Mapping(_)) && slot.ready.load(Ordering::SeqCst)
        })
    }

    /// Reads and unmaps a slot whose mapping completed.
    fn read_slot(&mut self, index: usize) -> Option<StageTimings> {
        let slot = &mut self.slots[index];
        slot.ready.store(false, Ordering::SeqCst);
        if slot.failed.swap(false, Ordering::SeqCst) {
            slot.state = SlotState::Idle;
            return None;
        }
        let slice = slot.buffer.slice(..);
        let data = slice.get_mapped_range();
        let raw: [u64; QUERY_COUNT as usize] =
            bytemuck::pod_read_unaligned(&data[..RESOLVE_BUFFER_SIZE as usize]);
        drop(data);
        slot.buffer.unmap();
        slot.state = SlotState::Idle;

        self.last_raw = Some(raw);
        let sample = StageTimings::from_raw(&raw, self.period_ns);
        if sample.is_none() {
            log::debug!("Discarding non-monotonic GPU timestamps: {raw:?}");
        }
        sample
    }

    /// Waits for every pending mapping and releases the staging buffers.
    /// Dropping a buffer mid-mapping is a validation error.
    pub fn shutdown(&mut self) {
        log::debug!("Shutting down WgpuTimestampProfiler...");
        if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("Failed to poll device during shutdown: {:?}", e);
        }
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let SlotState::Mapping(frame) = slot.state {
                log::debug!("Profiler slot {i} still mapped for frame {frame}, unmapping");
                slot.buffer.unmap();
                slot.state = SlotState::Idle;
            }
        }
    }
}

impl GpuProfiler for WgpuTimestampProfiler {
    fn try_read_previous_frame(&mut self) -> TimestampReadback {
        if self.slots.iter().all(|slot| slot.state == SlotState::Idle) {
            return TimestampReadback::Unavailable;
        }

        let mut polls = 0;
        while !self.any_ready() && polls < self.poll_budget {
            if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
                log::warn!("Failed to poll device for timestamps: {:?}", e);
                break;
            }
            polls += 1;
        }

        // Oldest frame first so the newest sample is the one reported.
        let mut ready: Vec<(u64, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot.state {
                SlotState::Mapping(frame) if slot.ready.load(Ordering::SeqCst) => {
                    Some((frame, i))
                }
                _ => None,
            })
            .collect();
        ready.sort_unstable();

        let mut latest = None;
        for (_, index) in ready {
            if let Some(sample) = self.read_slot(index) {
                self.smoothed = self.smoothed.smoothed(&sample, EMA_ALPHA);
                latest = Some(sample);
            }
        }

        match latest {
            Some(sample) => TimestampReadback::Ready(sample),
            None => {
                log::trace!("GPU timestamps not ready after {polls} polls");
                TimestampReadback::Unavailable
            }
        }
    }

    fn resolve_and_copy(&self, encoder: &mut dyn CommandEncoder, frame_index: u64) {
        let slot = &self.slots[Self::slot_index(frame_index)];
        if slot.state != SlotState::Idle {
            log::warn!(
                "GPU timestamp staging slot for frame {frame_index} is still pending, skipping."
            );
            return;
        }

        let Some(concrete_encoder) = encoder.as_any_mut().downcast_mut::<WgpuCommandEncoder>()
        else {
            log::warn!("Timestamp resolve skipped: encoder is not a WgpuCommandEncoder");
            return;
        };

        if let Some(wgpu_encoder) = concrete_encoder.wgpu_encoder_mut() {
            wgpu_encoder.resolve_query_set(
                &self.query_set,
                0..QUERY_COUNT,
                &self.resolve_buffer,
                0,
            );
            wgpu_encoder.copy_buffer_to_buffer(
                &self.resolve_buffer,
                0,
                &slot.buffer,
                0,
                RESOLVE_BUFFER_SIZE,
            );
        }
    }

    fn schedule_map_after_submit(&mut self, frame_index: u64) {
        let slot = &mut self.slots[Self::slot_index(frame_index)];
        // A busy slot skipped its copy in `resolve_and_copy`.
        if slot.state != SlotState::Idle {
            return;
        }

        let flag = Arc::clone(&slot.ready);
        let failed = Arc::clone(&slot.failed);
        flag.store(false, Ordering::SeqCst);
        slot.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |res| {
                if let Err(e) = res {
                    log::error!("GPU timestamp staging map_async failed: {:?}", e);
                    failed.store(true, Ordering::SeqCst);
                }
                flag.store(true, Ordering::SeqCst);
            });
        slot.state = SlotState::Mapping(frame_index);
    }

    fn smoothed_timings(&self) -> StageTimings {
        self.smoothed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::WgpuTimestampProfiler;
    use crate::graphics::wgpu::context::WgpuGraphicsContext;
    use umbra_core::renderer::api::core::{StageTimings, TimestampReadback};
    use umbra_core::renderer::traits::GpuProfiler;

    // Returns None if a suitable adapter cannot be found.
    fn create_test_context() -> Option<WgpuGraphicsContext> {
        pollster::block_on(WgpuGraphicsContext::new_headless()).ok()
    }

    #[test]
    fn test_feature_detection_needs_both_flags() {
        assert!(!WgpuTimestampProfiler::feature_available(
            wgpu::Features::TIMESTAMP_QUERY
        ));
        assert!(WgpuTimestampProfiler::feature_available(
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
        ));
    }

    #[test]
    fn gpu_timestamp_profiler_initializes_correctly_or_skips() {
        // This test requires a physical device, so it might be skipped on CI without one.
        let Some(context) = create_test_context() else {
            println!("Skipping profiler test: could not create test device.");
            return;
        };
        let Some(mut profiler) = WgpuTimestampProfiler::new(&context, 4) else {
            println!("Skipping profiler test: timestamp queries not available.");
            return;
        };

        assert_eq!(profiler.smoothed_timings(), StageTimings::default());
        assert!(profiler.last_raw().is_none());
        // Nothing was scheduled, so the readback must not wait.
        assert_eq!(
            profiler.try_read_previous_frame(),
            TimestampReadback::Unavailable
        );
        profiler.shutdown();
    }
}
