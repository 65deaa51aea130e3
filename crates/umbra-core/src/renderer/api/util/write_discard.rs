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

//! Write-discard constant buffer.
//!
//! Every [`WriteDiscardBuffer::write`] lands in a fresh, aligned region of the
//! current frame slot instead of overwriting memory the GPU may still be
//! reading, so the CPU never waits on per-draw constant updates. Regions are
//! handed out by value; there is no write pointer to retain across calls.

use crate::renderer::{
    api::{
        bind_group::{BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutId},
        core::MAX_FRAMES_IN_FLIGHT,
        resource::{BufferDescriptor, BufferId, BufferUsage},
    },
    error::ResourceError,
    traits::GraphicsDevice,
};
use std::borrow::Cow;

/// Minimum dynamic uniform offset alignment guaranteed by every backend.
pub const MIN_UNIFORM_ALIGNMENT: u32 = 256;

/// Describes the bind group created for each backing chunk, so that regions
/// can be bound with a dynamic offset.
#[derive(Debug, Clone, Copy)]
pub struct UniformBindingTemplate {
    /// Layout of the per-chunk bind group.
    pub layout: BindGroupLayoutId,
    /// Binding index of the uniform inside that layout.
    pub binding: u32,
    /// Size of the window the shader sees at each dynamic offset.
    pub element_size: u32,
}

/// A region written by [`WriteDiscardBuffer::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteDiscardRegion {
    /// The backing buffer.
    pub buffer: BufferId,
    /// Byte offset of the region, aligned to [`MIN_UNIFORM_ALIGNMENT`].
    pub offset: u32,
    /// Number of bytes written.
    pub size: u32,
    /// The chunk's bind group, when the buffer was created with a template.
    pub bind_group: Option<BindGroupId>,
}

#[derive(Debug)]
struct Chunk {
    buffer: BufferId,
    bind_group: Option<BindGroupId>,
    capacity: u32,
    cursor: u32,
}

#[derive(Debug)]
struct FrameSlot {
    chunks: Vec<Chunk>,
    active: usize,
}

/// A per-frame ring of growable uniform chunks.
#[derive(Debug)]
pub struct WriteDiscardBuffer {
    slots: Vec<FrameSlot>,
    current: usize,
    template: Option<UniformBindingTemplate>,
    label: &'static str,
}

impl WriteDiscardBuffer {
    /// Creates one chunk of `initial_capacity` bytes per frame in flight.
    ///
    /// ## Errors
    /// Propagates buffer or bind group creation failures.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &'static str,
        initial_capacity: u32,
        template: Option<UniformBindingTemplate>,
    ) -> Result<Self, ResourceError> {
        let capacity = align(initial_capacity.max(MIN_UNIFORM_ALIGNMENT));
        let mut buffer = Self {
            slots: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            current: 0,
            template,
            label,
        };
        for slot_index in 0..MAX_FRAMES_IN_FLIGHT {
            let chunk = buffer.create_chunk(device, slot_index, 0, capacity)?;
            buffer.slots.push(FrameSlot {
                chunks: vec![chunk],
                active: 0,
            });
        }
        log::debug!(
            "WriteDiscardBuffer({}): created with {} bytes per frame slot",
            label,
            capacity
        );
        Ok(buffer)
    }

    fn create_chunk(
        &self,
        device: &dyn GraphicsDevice,
        slot_index: usize,
        chunk_index: usize,
        capacity: u32,
    ) -> Result<Chunk, ResourceError> {
        let label = Cow::Owned(format!(
            "{} [slot {} chunk {}]",
            self.label, slot_index, chunk_index
        ));
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: capacity as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;

        let bind_group = match self.template {
            Some(template) => Some(device.create_bind_group(&BindGroupDescriptor {
                label: Some(self.label),
                layout: template.layout,
                entries: &[BindGroupEntry::buffer(
                    template.binding,
                    buffer,
                    0,
                    Some(template.element_size as u64),
                )],
            })?),
            None => None,
        };

        Ok(Chunk {
            buffer,
            bind_group,
            capacity,
            cursor: 0,
        })
    }

    /// Moves to the next frame slot and recycles its chunks.
    ///
    /// Call once per frame, before the first write.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
        let slot = &mut self.slots[self.current];
        for chunk in &mut slot.chunks {
            chunk.cursor = 0;
        }
        slot.active = 0;
    }

    /// Writes `data` into a fresh region of the current frame slot.
    ///
    /// Grows the slot with a new chunk when the active one is full; previous
    /// regions of this frame are never overwritten.
    pub fn write(
        &mut self,
        device: &dyn GraphicsDevice,
        data: &[u8],
    ) -> Result<WriteDiscardRegion, ResourceError> {
        let aligned_size = align((data.len() as u32).max(1));

        if !self.active_chunk_fits(aligned_size) {
            let slot = &self.slots[self.current];
            // Chunks past the active one are untouched this frame.
            let spare = (slot.active + 1..slot.chunks.len())
                .find(|&i| slot.chunks[i].capacity >= aligned_size);
            if let Some(index) = spare {
                self.slots[self.current].active = index;
            } else {
                let grown = (slot.chunks[slot.active].capacity * 2).max(aligned_size * 16);
                let chunk_index = slot.chunks.len();
                let chunk = self.create_chunk(device, self.current, chunk_index, grown)?;
                log::debug!(
                    "WriteDiscardBuffer({}): grew slot {} with a {} byte chunk",
                    self.label,
                    self.current,
                    grown
                );
                let slot = &mut self.slots[self.current];
                slot.chunks.push(chunk);
                slot.active = chunk_index;
            }
        }

        let slot = &mut self.slots[self.current];
        let chunk = &mut slot.chunks[slot.active];
        let offset = chunk.cursor;
        device.write_buffer(chunk.buffer, offset as u64, data)?;
        chunk.cursor += aligned_size;

        Ok(WriteDiscardRegion {
            buffer: chunk.buffer,
            offset,
            size: data.len() as u32,
            bind_group: chunk.bind_group,
        })
    }

    /// Writes a plain-old-data value.
    pub fn write_pod<T: bytemuck::Pod>(
        &mut self,
        device: &dyn GraphicsDevice,
        value: &T,
    ) -> Result<WriteDiscardRegion, ResourceError> {
        self.write(device, bytemuck::bytes_of(value))
    }

    fn active_chunk_fits(&self, aligned_size: u32) -> bool {
        let slot = &self.slots[self.current];
        let chunk = &slot.chunks[slot.active];
        chunk.cursor + aligned_size <= chunk.capacity
    }

    /// Number of backing chunks across every frame slot.
    pub fn chunk_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.chunks.len()).sum()
    }

    /// The index of the frame slot currently written.
    pub fn current_slot_index(&self) -> usize {
        self.current
    }

    /// Releases every chunk. Failures are logged, not returned.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for chunk in self.slots.iter().flat_map(|slot| slot.chunks.iter()) {
            if let Some(bind_group) = chunk.bind_group {
                if let Err(e) = device.destroy_bind_group(bind_group) {
                    log::warn!(
                        "WriteDiscardBuffer({}): Failed to destroy bind group: {:?}",
                        self.label,
                        e
                    );
                }
            }
            if let Err(e) = device.destroy_buffer(chunk.buffer) {
                log::warn!(
                    "WriteDiscardBuffer({}): Failed to destroy buffer: {:?}",
                    self.label,
                    e
                );
            }
        }
    }
}

fn align(size: u32) -> u32 {
    (size + MIN_UNIFORM_ALIGNMENT - 1) & !(MIN_UNIFORM_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::align;

    #[test]
    fn test_align_rounds_up_to_uniform_alignment() {
        assert_eq!(align(1), 256);
        assert_eq!(align(256), 256);
        assert_eq!(align(257), 512);
    }
}
