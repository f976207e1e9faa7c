//! Windowed terrain viewer: create or load a map on disk, upload every patch
//! into the shared GPU stores, and orbit a camera over the result. Exercises
//! the whole data path end to end.
//!
//! Usage: `terrain_viewer [map_dir]`; the directory is created with demo
//! hills on first run and loaded on later runs.

use anyhow::{Context, Result};
use glam::Vec3;
use std::path::{Path, PathBuf};
use std::time::Instant;
use wgpu::{rwh::HasDisplayHandle, rwh::HasWindowHandle, SurfaceTargetUnsafe};
use winit::{dpi::PhysicalSize, event::*, event_loop::EventLoop, window::WindowAttributes};

use terragrid::gfx::camera::Camera;
use terragrid::gfx::util::{create_depth_view, scale_to_max};
use terragrid::gfx::GpuCaps;
use terragrid::terrain::{CELL_SIZE, HEIGHTFIELD_RAW_SIZE, TERRAIN_EDGE};
use terragrid::{TerrainMap, TerrainRenderer, TerrainRendererInfo};

fn main() -> Result<()> {
    // Developer-friendly default logging (info+) unless RUST_LOG overrides;
    // GPU backend chatter off by default.
    let default = "info,wgpu_hal=off,wgpu_core=off,wgpu=off,naga=off";
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_secs()
        .try_init();
    pollster::block_on(run())
}

fn open_or_create_map(dir: &Path) -> Result<TerrainMap> {
    if dir.join(terragrid::terrain::map::MAP_SETTINGS_FILE).exists() {
        return TerrainMap::load(dir).with_context(|| format!("load map {}", dir.display()));
    }
    let mut map = TerrainMap::create(dir, "demo", 2, 2)
        .with_context(|| format!("create map {}", dir.display()))?;
    sculpt_demo_hills(&mut map);
    map.save().context("save demo map")?;
    Ok(map)
}

/// Gentle deterministic hills, continuous across terrain seams because they
/// are a function of the global sample position.
fn sculpt_demo_hills(map: &mut TerrainMap) {
    for terrain in map.terrains_mut() {
        let (tx, tz) = terrain.coords();
        let field = terrain.heightfield_mut();
        for r in 0..HEIGHTFIELD_RAW_SIZE {
            for c in 0..HEIGHTFIELD_RAW_SIZE {
                // Padded cell (c, r) samples global position (edge*t + c - 1).
                let gx = (tx * TERRAIN_EDGE as i32 + c as i32 - 1) as f32 * CELL_SIZE;
                let gz = (tz * TERRAIN_EDGE as i32 + r as i32 - 1) as f32 * CELL_SIZE;
                let h = 3.0 * (gx * 0.08).sin() * (gz * 0.05).cos()
                    + 1.2 * (gx * 0.021 + gz * 0.017).sin();
                field.set(i64::from(c), i64::from(r), h);
            }
        }
        terrain.generate_patches();
    }
}

// NOTE: Uses deprecated EventLoop APIs for simplicity in this viewer.
#[allow(deprecated)]
async fn run() -> Result<()> {
    let map_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/maps/demo"));
    let mut map = open_or_create_map(&map_dir)?;

    let event_loop = EventLoop::new().context("create event loop")?;
    let window = event_loop
        .create_window(
            WindowAttributes::default()
                .with_title("terragrid viewer")
                .with_inner_size(PhysicalSize::new(1280, 720)),
        )
        .context("create window")?;

    let instance = wgpu::Instance::default();
    let raw_display = window.display_handle()?.as_raw();
    let raw_window = window.window_handle()?.as_raw();
    let surface = unsafe {
        instance.create_surface_unsafe(SurfaceTargetUnsafe::RawHandle {
            raw_display_handle: raw_display,
            raw_window_handle: raw_window,
        })
    }?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: Some(&surface),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        })
        .await
        .context("request adapter")?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("terrain-viewer-device"),
            required_features: GpuCaps::desired_features(&adapter),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        })
        .await
        .context("request device")?;
    let caps = GpuCaps::probe(&device);

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let format = surface_caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(surface_caps.formats[0]);
    let max_dim = device.limits().max_texture_dimension_2d.max(1);
    let (width, height) = scale_to_max((size.width, size.height), max_dim);
    let mut config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width,
        height,
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);
    let mut depth_view = create_depth_view(&device, config.width, config.height);

    let mut renderer = TerrainRenderer::new(
        &device,
        caps,
        &TerrainRendererInfo {
            color_format: format,
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
            max_patches: map.patch_total(),
            ..Default::default()
        },
    )
    .context("create terrain renderer")?;
    let uploaded = renderer
        .upload_gpu_data(&device, &queue, &mut map)
        .context("upload terrain")?;
    log::info!("viewer ready: {uploaded} patches resident");

    let extent = map.settings().width as f32 * TERRAIN_EDGE as f32 * CELL_SIZE;
    let target = Vec3::new(extent * 0.5, 0.0, extent * 0.5);
    let start = Instant::now();

    Ok(event_loop.run(move |event, elwt| match event {
        Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            ..
        } => elwt.exit(),
        Event::WindowEvent {
            event: WindowEvent::Resized(new_size),
            ..
        } => {
            let (w, h) = scale_to_max((new_size.width, new_size.height), max_dim);
            config.width = w.max(1);
            config.height = h.max(1);
            surface.configure(&device, &config);
            depth_view = create_depth_view(&device, config.width, config.height);
        }
        Event::AboutToWait => {
            let t = start.elapsed().as_secs_f32();
            let camera = Camera::orbit(
                target,
                extent * 1.1,
                t * 0.15,
                config.width as f32 / config.height as f32,
            );
            renderer.set_globals(&queue, camera.view_proj(), t);

            let frame = match surface.get_current_texture() {
                Ok(f) => f,
                Err(_) => {
                    surface.configure(&device, &config);
                    surface.get_current_texture().expect("acquire frame")
                }
            };
            let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("terrain-viewer-encoder"),
            });
            {
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("terrain-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: 0.25,
                                g: 0.45,
                                b: 0.65,
                                a: 1.0,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &depth_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                if let Err(e) = renderer.render(&mut rpass, &device, &queue) {
                    log::error!("terrain render: {e}");
                }
            }
            queue.submit(Some(encoder.finish()));
            frame.present();
        }
        _ => {}
    })?)
}
