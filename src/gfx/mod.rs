//! gfx: GPU residency and submission for the terrain subsystem.
//!
//! The renderer owns one shared geometry store, one indirect command batch,
//! and one instance table; every patch of every terrain becomes a slice of
//! the store plus one command plus one table row, and the whole map renders
//! in a single multi-draw submission (or the per-command fallback).
//!
//! Files
//! - caps.rs: capability probe, resolved once at device creation
//! - types.rs: POD buffer structs and vertex layouts (Globals/PatchVertex/
//!   InstanceRecord/DrawIndexedIndirectCommand)
//! - geometry.rs: GrowableGeometryBuffer (bump-allocated, grow-with-copy)
//! - indirect.rs: IndirectDrawBatch (dirty-tracked command mirror)
//! - instances.rs: InstanceDataTable (mapped or staged SSBO writes)
//! - pipeline.rs: pipeline and bind-group creation (WGSL in terrain.wgsl)
//! - camera.rs: orbit camera for the viewer binary
//! - util.rs: small helpers (depth view, surface clamping)

pub mod camera;
pub mod caps;
pub mod geometry;
pub mod indirect;
pub mod instances;
pub mod pipeline;
pub mod types;
pub mod util;

pub use caps::{DrawPath, GpuCaps, TableWritePath};
pub use geometry::GrowableGeometryBuffer;
pub use indirect::IndirectDrawBatch;
pub use instances::InstanceDataTable;
pub use types::{DrawIndexedIndirectCommand, Globals, InstanceRecord, PatchVertex};

use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::error::TerrainError;
use crate::terrain::{TerrainMap, CELL_SIZE, UV_TILING};

pub struct TerrainRendererInfo {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    /// Rows in the instance table; size this to the map's `patch_total()`.
    pub max_patches: u32,
    pub initial_vertex_capacity: u32,
    pub initial_index_capacity: u32,
}

impl Default for TerrainRendererInfo {
    fn default() -> Self {
        use crate::terrain::{INDICES_PER_PATCH, PATCHES_PER_TERRAIN, VERTICES_PER_PATCH};
        Self {
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth_format: Some(wgpu::TextureFormat::Depth32Float),
            max_patches: PATCHES_PER_TERRAIN,
            initial_vertex_capacity: VERTICES_PER_PATCH * 4,
            initial_index_capacity: INDICES_PER_PATCH * 4,
        }
    }
}

/// Owns the GPU side of the terrain: geometry store, command batch, instance
/// table, pipeline. Constructed once per device; `upload_gpu_data` runs when
/// the map reports ready, `render` once per frame.
pub struct TerrainRenderer {
    caps: GpuCaps,
    pipeline: wgpu::RenderPipeline,
    globals_buf: wgpu::Buffer,
    globals_bg: wgpu::BindGroup,
    instances_bg: wgpu::BindGroup,
    geometry: GrowableGeometryBuffer,
    batch: IndirectDrawBatch,
    instances: InstanceDataTable,
    uploaded: bool,
}

impl TerrainRenderer {
    /// Build every GPU resource up front. Any failing sub-step drops the
    /// resources created before it on the way out.
    pub fn new(
        device: &wgpu::Device,
        caps: GpuCaps,
        info: &TerrainRendererInfo,
    ) -> Result<Self, TerrainError> {
        let shader = pipeline::create_shader(device);
        let globals_bgl = pipeline::create_globals_bgl(device);
        let instances_bgl = pipeline::create_instances_bgl(device);
        let render_pipeline = pipeline::create_terrain_pipeline(
            device,
            &shader,
            &globals_bgl,
            &instances_bgl,
            info.color_format,
            info.depth_format,
        );

        let geometry = GrowableGeometryBuffer::new(
            device,
            &caps,
            info.initial_vertex_capacity,
            info.initial_index_capacity,
        )?;
        let batch = IndirectDrawBatch::new(device, &caps, info.max_patches)?;
        let instances = InstanceDataTable::new(device, &caps, info.max_patches)?;

        let globals_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("terrain-globals"),
            contents: bytemuck::bytes_of(&Globals {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                time_pad: [0.0; 4],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let globals_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("terrain-globals-bg"),
            layout: &globals_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            }],
        });
        let instances_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("terrain-instances-bg"),
            layout: &instances_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: instances.buffer().as_entire_binding(),
            }],
        });

        Ok(Self {
            caps,
            pipeline: render_pipeline,
            globals_buf,
            globals_bg,
            instances_bg,
            geometry,
            batch,
            instances,
            uploaded: false,
        })
    }

    pub fn set_globals(&self, queue: &wgpu::Queue, view_proj: Mat4, time: f32) {
        let globals = Globals {
            view_proj: view_proj.to_cols_array_2d(),
            time_pad: [time, 0.0, 0.0, 0.0],
        };
        queue.write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&globals));
    }

    /// Push every patch of every terrain into the shared stores and rebuild
    /// the command batch + instance table. Row-major over terrains, then
    /// patches. A patch whose append fails is logged and skipped; it simply
    /// never appears; the stores stay consistent.
    ///
    /// Returns the number of patches uploaded.
    pub fn upload_gpu_data(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        map: &mut TerrainMap,
    ) -> Result<u32, TerrainError> {
        if !map.is_ready() {
            return Err(TerrainError::Validation(
                "upload requested before the terrain map was ready".into(),
            ));
        }

        self.geometry.reset();
        self.batch.clear();
        let mut records: Vec<InstanceRecord> = Vec::with_capacity(map.patch_total() as usize);
        let mut next_instance: u32 = 0;

        for (terrain_slot, terrain) in map.terrains_mut().iter_mut().enumerate() {
            terrain.set_base_patch_index(next_instance);
            let models: Vec<Mat4> = terrain
                .patches()
                .iter()
                .map(|p| terrain.patch_world_transform(p.patch_x, p.patch_z))
                .collect();
            for (patch, model) in terrain.patches_mut().iter_mut().zip(models) {
                let (vertex_offset, index_offset) = match self.geometry.append(
                    device,
                    queue,
                    &self.caps,
                    &patch.mesh.vertices,
                    &patch.mesh.indices,
                ) {
                    Ok(offsets) => offsets,
                    Err(e) => {
                        log::error!(
                            "skipping patch ({}, {}) of terrain {terrain_slot}: {e}",
                            patch.patch_x,
                            patch.patch_z
                        );
                        continue;
                    }
                };
                patch.vertex_offset = vertex_offset;
                patch.index_offset = index_offset;
                records.push(InstanceRecord {
                    model: model.to_cols_array_2d(),
                    heightmap_slot: terrain_slot as u32,
                    cell_size: CELL_SIZE,
                    uv_tiling: UV_TILING,
                    _pad: 0.0,
                });
                self.batch.add_command(DrawIndexedIndirectCommand {
                    index_count: patch.mesh.indices.len() as u32,
                    instance_count: 1,
                    first_index: index_offset,
                    base_vertex: vertex_offset as i32,
                    first_instance: next_instance,
                });
                next_instance += 1;
            }
        }

        self.instances.write(device, queue, 0, &records)?;
        self.batch.upload(device, queue, &self.caps)?;
        self.uploaded = true;
        log::info!(
            "terrain upload: {next_instance} patches, {} vertices, {} indices",
            self.geometry.vertex_count(),
            self.geometry.index_count()
        );
        Ok(next_instance)
    }

    /// Record the terrain into an already-open pass. One pipeline bind, one
    /// batch submission; the pass must target the formats the renderer was
    /// created with.
    pub fn render(
        &mut self,
        rpass: &mut wgpu::RenderPass<'_>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<(), TerrainError> {
        if !self.uploaded || self.batch.is_empty() {
            return Ok(());
        }
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.globals_bg, &[]);
        rpass.set_bind_group(1, &self.instances_bg, &[]);
        rpass.set_vertex_buffer(0, self.geometry.vertex_buffer().slice(..));
        rpass.set_index_buffer(
            self.geometry.index_buffer().slice(..),
            wgpu::IndexFormat::Uint32,
        );
        self.batch.draw(rpass, device, queue, &self.caps)
    }

    pub fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    pub fn geometry(&self) -> &GrowableGeometryBuffer {
        &self.geometry
    }

    pub fn batch(&self) -> &IndirectDrawBatch {
        &self.batch
    }

    pub fn instances(&self) -> &InstanceDataTable {
        &self.instances
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }
}
