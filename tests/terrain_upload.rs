//! End-to-end GPU tests for the terrain upload path.
//!
//! These need a real adapter; when the machine has none (bare CI), each test
//! prints a skip notice and passes.

use terragrid::gfx::{
    DrawIndexedIndirectCommand, GpuCaps, GrowableGeometryBuffer, IndirectDrawBatch, PatchVertex,
};
use terragrid::terrain::{INDICES_PER_PATCH, PATCHES_PER_TERRAIN, VERTICES_PER_PATCH};
use terragrid::{TerrainError, TerrainMap, TerrainRenderer, TerrainRendererInfo};

fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok()?;
    let features = GpuCaps::desired_features(&adapter);
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("terrain-test-device"),
        required_features: features,
        required_limits: wgpu::Limits::downlevel_defaults(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::default(),
    }))
    .ok()
}

fn read_back(device: &wgpu::Device, queue: &wgpu::Queue, src: &wgpu::Buffer, bytes: u64) -> Vec<u8> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test-readback"),
        size: bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder =
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_buffer_to_buffer(src, 0, &staging, 0, bytes);
    queue.submit(Some(encoder.finish()));
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    device.poll(wgpu::PollType::Wait).expect("poll");
    rx.recv().expect("map callback").expect("map readback");
    let out = slice.get_mapped_range().to_vec();
    staging.unmap();
    out
}

/// Distinct vertices so byte comparisons catch any misplaced slice.
fn tagged_vertices(tag: f32, count: usize) -> Vec<PatchVertex> {
    (0..count)
        .map(|i| PatchVertex {
            pos: [tag, i as f32, tag + i as f32],
            color: [tag, tag, tag, 1.0],
            ..Default::default()
        })
        .collect()
}

#[test]
fn append_grows_and_preserves_prior_data() {
    let Some((device, queue)) = gpu() else {
        eprintln!("gpu test skipped: no adapter");
        return;
    };
    let caps = GpuCaps::probe(&device);
    // Room for one batch only; later appends must force reallocation.
    let mut geometry = GrowableGeometryBuffer::new(&device, &caps, 8, 12).expect("create");

    let mut all_vertices: Vec<PatchVertex> = Vec::new();
    let mut all_indices: Vec<u32> = Vec::new();
    let mut expected_offsets = Vec::new();
    for batch in 0..5u32 {
        let verts = tagged_vertices(batch as f32 + 1.0, 6);
        let idx: Vec<u32> = (0..9u32).map(|i| i + batch * 100).collect();
        let offsets = geometry
            .append(&device, &queue, &caps, &verts, &idx)
            .expect("append");
        expected_offsets.push(offsets);
        all_vertices.extend_from_slice(&verts);
        all_indices.extend_from_slice(&idx);
    }

    // Offsets are monotonic and non-overlapping.
    for (i, (vo, io)) in expected_offsets.iter().enumerate() {
        assert_eq!(*vo, i as u32 * 6);
        assert_eq!(*io, i as u32 * 9);
    }
    assert_eq!(geometry.vertex_count(), 30);
    assert_eq!(geometry.index_count(), 45);
    assert!(geometry.vertex_capacity() >= 30);

    // Every previously appended byte is unchanged at its original offset.
    let vb = read_back(
        &device,
        &queue,
        geometry.vertex_buffer(),
        u64::from(geometry.vertex_count()) * std::mem::size_of::<PatchVertex>() as u64,
    );
    assert_eq!(vb, bytemuck::cast_slice::<_, u8>(&all_vertices));
    let ib = read_back(
        &device,
        &queue,
        geometry.index_buffer(),
        u64::from(geometry.index_count()) * 4,
    );
    assert_eq!(ib, bytemuck::cast_slice::<_, u8>(&all_indices));
}

#[test]
fn reallocate_never_shrinks_silently() {
    let Some((device, queue)) = gpu() else {
        eprintln!("gpu test skipped: no adapter");
        return;
    };
    let caps = GpuCaps::probe(&device);
    let mut geometry = GrowableGeometryBuffer::new(&device, &caps, 64, 64).expect("create");
    let verts = tagged_vertices(7.0, 10);
    let idx: Vec<u32> = (0..10).collect();
    geometry
        .append(&device, &queue, &caps, &verts, &idx)
        .expect("append");

    let result = geometry.reallocate(&device, &queue, &caps, 32, 64, true);
    assert!(matches!(result, Err(TerrainError::Capacity(_))));
    // Capacity and contents untouched.
    assert_eq!(geometry.vertex_capacity(), 64);
    assert_eq!(geometry.index_capacity(), 64);
    assert_eq!(geometry.vertex_count(), 10);
    let vb = read_back(
        &device,
        &queue,
        geometry.vertex_buffer(),
        10 * std::mem::size_of::<PatchVertex>() as u64,
    );
    assert_eq!(vb, bytemuck::cast_slice::<_, u8>(&verts));
}

#[test]
fn empty_append_is_a_dropped_write() {
    let Some((device, queue)) = gpu() else {
        eprintln!("gpu test skipped: no adapter");
        return;
    };
    let caps = GpuCaps::probe(&device);
    let mut geometry = GrowableGeometryBuffer::new(&device, &caps, 16, 16).expect("create");
    let err = geometry.append(&device, &queue, &caps, &[], &[0, 1, 2]);
    assert!(matches!(err, Err(TerrainError::Validation(_))));
    assert_eq!(geometry.vertex_count(), 0);
    assert_eq!(geometry.index_count(), 0);
}

#[test]
fn indirect_batch_uploads_byte_identical_commands() {
    let Some((device, queue)) = gpu() else {
        eprintln!("gpu test skipped: no adapter");
        return;
    };
    let caps = GpuCaps::probe(&device);
    let mut batch = IndirectDrawBatch::new(&device, &caps, 2).expect("create");
    for i in 0..6u32 {
        batch.add_command(DrawIndexedIndirectCommand {
            index_count: 6 * (i + 1),
            instance_count: 1,
            first_index: i * 100,
            base_vertex: (i * 37) as i32,
            first_instance: i,
        });
    }
    assert!(batch
        .set_command(
            2,
            DrawIndexedIndirectCommand {
                index_count: 6,
                instance_count: 1,
                first_index: 999,
                base_vertex: -3,
                first_instance: 2,
            },
        )
        .is_ok());
    assert!(batch.set_command(6, DrawIndexedIndirectCommand::default()).is_err());

    batch.upload(&device, &queue, &caps).expect("upload");
    assert_eq!(batch.len(), 6);
    let bytes = read_back(
        &device,
        &queue,
        batch.buffer(),
        u64::from(batch.len()) * std::mem::size_of::<DrawIndexedIndirectCommand>() as u64,
    );
    assert_eq!(bytes, bytemuck::cast_slice::<_, u8>(batch.commands()));
}

/// Full-map scenario: every patch uploaded into stores too small for
/// it, forcing at least one grow-with-copy, with the command list
/// partitioning the stores into disjoint, ordered ranges.
#[test]
fn map_upload_end_to_end() {
    let Some((device, queue)) = gpu() else {
        eprintln!("gpu test skipped: no adapter");
        return;
    };
    let caps = GpuCaps::probe(&device);
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut map = TerrainMap::create(&tmp.path().join("flat"), "flat", 1, 1).expect("create map");
    assert!(map.is_ready());

    let mut renderer = TerrainRenderer::new(
        &device,
        caps,
        &TerrainRendererInfo {
            max_patches: map.patch_total(),
            // Half a patch: the very first append must reallocate.
            initial_vertex_capacity: VERTICES_PER_PATCH / 2,
            initial_index_capacity: INDICES_PER_PATCH / 2,
            ..Default::default()
        },
    )
    .expect("renderer");

    let uploaded = renderer
        .upload_gpu_data(&device, &queue, &mut map)
        .expect("upload");
    assert_eq!(uploaded, PATCHES_PER_TERRAIN);
    assert_eq!(
        renderer.geometry().vertex_count(),
        PATCHES_PER_TERRAIN * VERTICES_PER_PATCH
    );
    assert_eq!(
        renderer.geometry().index_count(),
        PATCHES_PER_TERRAIN * INDICES_PER_PATCH
    );

    let commands = renderer.batch().commands();
    assert_eq!(commands.len() as u32, PATCHES_PER_TERRAIN);
    for (i, cmd) in commands.iter().enumerate() {
        assert_eq!(cmd.index_count, INDICES_PER_PATCH);
        assert_eq!(cmd.instance_count, 1);
        assert_eq!(cmd.first_instance, i as u32);
        // Disjoint, ordered partition of the shared stores.
        assert_eq!(cmd.first_index, i as u32 * INDICES_PER_PATCH);
        assert_eq!(cmd.base_vertex, (i as u32 * VERTICES_PER_PATCH) as i32);
    }

    // Patch offsets recorded back into the terrain match the command list.
    let terrain = &map.terrains()[0];
    assert_eq!(terrain.base_patch_index(), 0);
    for (i, patch) in terrain.patches().iter().enumerate() {
        assert_eq!(patch.vertex_offset, i as u32 * VERTICES_PER_PATCH);
        assert_eq!(patch.index_offset, i as u32 * INDICES_PER_PATCH);
    }
}

/// Whole-pipeline smoke test: upload a map, record the terrain into an
/// offscreen pass, submit, and wait for the GPU to drain.
#[test]
fn render_records_into_offscreen_pass() {
    let Some((device, queue)) = gpu() else {
        eprintln!("gpu test skipped: no adapter");
        return;
    };
    let caps = GpuCaps::probe(&device);
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut map =
        TerrainMap::create(&tmp.path().join("smoke"), "smoke", 1, 1).expect("create map");
    // Non-flat geometry so the draw covers real triangles.
    map.terrains_mut()[0].heightfield_mut().set(20, 20, 6.0);
    map.terrains_mut()[0].generate_patches();

    let info = TerrainRendererInfo {
        max_patches: map.patch_total(),
        ..Default::default()
    };
    let mut renderer = TerrainRenderer::new(&device, caps, &info).expect("renderer");
    renderer
        .upload_gpu_data(&device, &queue, &mut map)
        .expect("upload");

    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test-color"),
        size: wgpu::Extent3d {
            width: 256,
            height: 256,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: info.color_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
    let depth_view = terragrid::gfx::util::create_depth_view(&device, 256, 256);

    let camera = terragrid::gfx::camera::Camera::orbit(glam::Vec3::new(32.0, 0.0, 32.0), 80.0, 0.7, 1.0);
    renderer.set_globals(&queue, camera.view_proj(), 0.0);

    let mut encoder =
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("test-terrain-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
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
        renderer
            .render(&mut rpass, &device, &queue)
            .expect("record terrain draw");
    }
    queue.submit(Some(encoder.finish()));
    device.poll(wgpu::PollType::Wait).expect("drain gpu");
}
