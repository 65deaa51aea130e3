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

mod common;

use common::*;
use umbra_core::renderer::api::core::MAX_FRAMES_IN_FLIGHT;
use umbra_core::renderer::api::{WriteDiscardBuffer, MIN_UNIFORM_ALIGNMENT};

fn back_to_same_slot(ring: &mut WriteDiscardBuffer) {
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        ring.advance();
    }
}

#[test]
fn test_each_write_gets_a_fresh_region() {
    let device = MockGraphicsDevice::new();
    let mut ring = WriteDiscardBuffer::new(device.as_ref(), "Constants", 4096, None).unwrap();

    let regions: Vec<_> = (1u8..=3)
        .map(|value| ring.write(device.as_ref(), &[value; 16]).unwrap())
        .collect();

    assert!(regions.iter().all(|r| r.buffer == regions[0].buffer));
    let offsets: Vec<u32> = regions.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, MIN_UNIFORM_ALIGNMENT, 2 * MIN_UNIFORM_ALIGNMENT]);
    assert!(regions.iter().all(|r| r.size == 16));

    // Earlier writes of the frame are still intact.
    let bytes = device.buffer_bytes(regions[0].buffer);
    for (i, region) in regions.iter().enumerate() {
        let start = region.offset as usize;
        assert!(bytes[start..start + 16].iter().all(|&b| b == i as u8 + 1));
    }
}

#[test]
fn test_full_chunk_grows_the_slot() {
    let device = MockGraphicsDevice::new();
    let mut ring = WriteDiscardBuffer::new(device.as_ref(), "Constants", 512, None).unwrap();
    assert_eq!(ring.chunk_count(), MAX_FRAMES_IN_FLIGHT);

    let first = ring.write(device.as_ref(), &[0; 256]).unwrap();
    let second = ring.write(device.as_ref(), &[0; 256]).unwrap();
    assert_eq!(ring.chunk_count(), MAX_FRAMES_IN_FLIGHT);
    assert_eq!(first.buffer, second.buffer);

    let third = ring.write(device.as_ref(), &[0; 256]).unwrap();
    assert_eq!(ring.chunk_count(), MAX_FRAMES_IN_FLIGHT + 1);
    assert_ne!(third.buffer, first.buffer);
    assert_eq!(third.offset, 0);
    assert_eq!(
        device.live_count(ObjectKind::Buffer),
        MAX_FRAMES_IN_FLIGHT + 1
    );
}

#[test]
fn test_advance_recycles_the_slot_without_new_chunks() {
    let device = MockGraphicsDevice::new();
    let mut ring = WriteDiscardBuffer::new(device.as_ref(), "Constants", 512, None).unwrap();

    let frame = |ring: &mut WriteDiscardBuffer| {
        (0..3)
            .map(|_| ring.write(device.as_ref(), &[7; 200]).unwrap())
            .collect::<Vec<_>>()
    };
    let slot = ring.current_slot_index();
    let before = frame(&mut ring);
    let chunks = ring.chunk_count();

    back_to_same_slot(&mut ring);
    assert_eq!(ring.current_slot_index(), slot);
    let after = frame(&mut ring);

    assert_eq!(ring.chunk_count(), chunks);
    assert_eq!(before, after);
}

#[test]
fn test_repeated_frames_reuse_a_larger_spare_chunk() {
    let device = MockGraphicsDevice::new();
    let mut ring = WriteDiscardBuffer::new(device.as_ref(), "Post Constants", 4096, None).unwrap();

    // Two writes that overflow the first chunk leave a spare chunk behind.
    ring.write(device.as_ref(), &[0; 3000]).unwrap();
    ring.write(device.as_ref(), &[0; 3000]).unwrap();

    let large = vec![1u8; 60_000];
    let mut live = Vec::new();
    for _ in 0..10 {
        back_to_same_slot(&mut ring);
        ring.write(device.as_ref(), &large).unwrap();
        live.push(device.live_count(ObjectKind::Buffer));
    }
    assert_eq!(live.first(), live.last());
    assert_eq!(ring.chunk_count(), *live.last().unwrap());

    ring.destroy(device.as_ref());
    assert_eq!(device.live_count(ObjectKind::Buffer), 0);
}
