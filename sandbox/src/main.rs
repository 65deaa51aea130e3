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

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use umbra_core::math::{Extent3D, LinearRgba, Mat4, Vec3};
use umbra_core::renderer::api::core::FrameStage;
use umbra_core::renderer::api::resource::{
    BufferDescriptor, BufferUsage, IndexFormat, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsage, TextureViewDescriptor,
};
use umbra_core::renderer::GraphicsDevice;
use umbra_infra::{WgpuDevice, WgpuGraphicsContext, WgpuTimestampProfiler};
use umbra_lanes::{
    DeferredLane, DrawQueue, FrameBufferSet, GpuMesh, PointLight, PresentTarget, RenderSession,
    RendererConfig, ShaderLibrary, StencilMask, VertexLayoutTag,
};

const CONFIG_PATH: &str = "sandbox/assets/renderer.ron";
const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAMES: u32 = 8;

fn load_config() -> RendererConfig {
    if !Path::new(CONFIG_PATH).exists() {
        log::info!("No config at '{CONFIG_PATH}', using defaults");
        return RendererConfig::default();
    }
    match RendererConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{e}, using defaults");
            RendererConfig::default()
        }
    }
}

fn create_target(device: &WgpuDevice) -> Result<PresentTarget> {
    let format = TextureFormat::Bgra8UnormSrgb;
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("Sandbox Offscreen Target".into()),
        size: Extent3D::d2(WIDTH, HEIGHT),
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
    })?;
    let view = device.create_texture_view(texture, &TextureViewDescriptor::default())?;
    Ok(PresentTarget { view, format })
}

fn create_ground(device: &WgpuDevice) -> Result<GpuMesh> {
    #[rustfmt::skip]
    let vertices: [f32; 32] = [
        -4.0, 0.0,  4.0,  0.0, 1.0, 0.0,  0.0, 1.0,
         4.0, 0.0,  4.0,  0.0, 1.0, 0.0,  1.0, 1.0,
         4.0, 0.0, -4.0,  0.0, 1.0, 0.0,  1.0, 0.0,
        -4.0, 0.0, -4.0,  0.0, 1.0, 0.0,  0.0, 0.0,
    ];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

    let vertex_buffer = device.create_buffer_with_data(
        &BufferDescriptor {
            label: Some("Ground Vertices".into()),
            size: std::mem::size_of_val(&vertices) as u64,
            usage: BufferUsage::VERTEX,
            mapped_at_creation: false,
        },
        bytemuck::cast_slice(&vertices),
    )?;
    let index_buffer = device.create_buffer_with_data(
        &BufferDescriptor {
            label: Some("Ground Indices".into()),
            size: std::mem::size_of_val(&indices) as u64,
            usage: BufferUsage::INDEX,
            mapped_at_creation: false,
        },
        bytemuck::cast_slice(&indices),
    )?;

    Ok(GpuMesh {
        vertex_buffer,
        index_buffer,
        index_format: IndexFormat::Uint16,
        index_count: indices.len() as u32,
        layout_tag: VertexLayoutTag::Basic.raw(),
    })
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .init();

    let config = load_config();
    let context = pollster::block_on(WgpuGraphicsContext::new_headless())
        .context("no usable GPU adapter")?;
    log::info!(
        "Using adapter '{}' ({:?})",
        context.adapter_name,
        context.adapter_backend
    );
    let device = WgpuDevice::new(Arc::new(context));

    let mut session = RenderSession::new(Arc::new(device.clone()));
    if config.gpu_timestamps {
        if let Some(profiler) =
            WgpuTimestampProfiler::new(device.context(), config.readback_poll_budget)
        {
            session = session.with_profiler(Box::new(profiler));
        }
    }

    let mut lane = DeferredLane::new(&session, &config, &ShaderLibrary::builtin())?;
    let mut buffers = FrameBufferSet::new(&session, WIDTH, HEIGHT, config.high_res_effects)?;
    let target = create_target(&device)?;

    let mut queue = DrawQueue::new();
    queue.push_static_mesh(create_ground(&device)?, Mat4::IDENTITY, StencilMask(1), 1.0);
    queue.push_point_light(PointLight {
        position: Vec3::new(0.0, 2.0, 0.0),
        radius: 6.0,
        color: LinearRgba::rgb(1.0, 0.9, 0.8),
        intensity: 2.0,
    });

    let projection = Mat4::perspective_rh(
        60f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    );
    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.25;
        let eye = Vec3::new(6.0 * angle.cos(), 3.0, 6.0 * angle.sin());
        buffers.set_camera(Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y), projection, eye);

        let report = lane.render(&mut session, &queue, &mut buffers, &target)?;
        log::info!(
            "Frame {}: {} passes, {} draws, variant {:?}",
            report.frame_index,
            report.render_passes(),
            report.draw_calls(),
            report.variant
        );
        if let Some(timings) = report.stage_timings() {
            for stage in FrameStage::ALL {
                log::info!("  {:>18}: {:.3} ms", stage.label(), timings.stage(stage));
            }
            log::info!("  {:>18}: {:.3} ms", "total", timings.frame_total_ms);
        }
    }

    device.poll_device_blocking();
    lane.destroy(&session);
    buffers.destroy(&session);
    if let Some(profiler) = session
        .profiler_mut()
        .and_then(|p| p.as_any_mut().downcast_mut::<WgpuTimestampProfiler>())
    {
        profiler.shutdown();
    }
    log::info!(
        "Done, peak VRAM {:.2} MiB",
        device.vram_peak_bytes() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
