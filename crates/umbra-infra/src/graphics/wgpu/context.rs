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

use anyhow::anyhow;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wgpu::Features;

/// Features the timestamp profiler needs: queries written from inside a
/// command encoder, between passes.
pub(crate) fn timestamp_features() -> Features {
    Features::TIMESTAMP_QUERY | Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
}

/// Holds the wgpu device and queue the renderer records into.
///
/// The context never creates a surface. Presentation images are owned by the
/// caller, which either hands over a device it already created
/// ([`WgpuGraphicsContext::from_existing`]) or asks for a headless one.
#[derive(Debug)]
pub struct WgpuGraphicsContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    // Store info for easy access
    pub adapter_name: String,
    pub adapter_backend: wgpu::Backend,
    pub active_device_features: wgpu::Features,
    pub device_limits: wgpu::Limits,

    lost: Arc<AtomicBool>,
}

impl WgpuGraphicsContext {
    /// Wraps a device and queue created elsewhere.
    pub fn from_existing(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: &wgpu::AdapterInfo,
    ) -> Self {
        log::info!(
            "Using external device on \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );
        Self::assemble(device, queue, adapter_info)
    }

    /// Requests a device on the default adapter, without any surface.
    ///
    /// Timestamp queries are enabled when the adapter offers them.
    pub async fn new_headless() -> Result<Self> {
        log::info!("Initializing headless WGPU Graphics Context...");

        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("No suitable graphics adapter: {}", e))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let features_to_enable: Features = adapter.features() & timestamp_features();
        if features_to_enable != timestamp_features() {
            log::info!("Adapter lacks in-encoder timestamp queries, GPU timings disabled");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Umbra Logical Device"),
                required_features: features_to_enable,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::info!("Logical device and command queue created.");

        Ok(Self::assemble(device, queue, &adapter_info))
    }

    fn assemble(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: &wgpu::AdapterInfo,
    ) -> Self {
        device.on_uncaptured_error(Arc::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("WGPU device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });

        let active_device_features = device.features();
        let device_limits = device.limits();
        log::info!("Active device features: {active_device_features:?}");
        log::debug!("Device limits: {device_limits:?}");

        Self {
            device,
            queue,
            adapter_name: adapter_info.name.clone(),
            adapter_backend: adapter_info.backend,
            active_device_features,
            device_limits,
            lost,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Whether the device-lost callback fired.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Whether the device can write timestamps between passes.
    pub fn supports_timestamps(&self) -> bool {
        self.active_device_features.contains(timestamp_features())
    }
}
