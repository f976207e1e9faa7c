//! Buffer/vertex types shared across the terrain pipeline.
//!
//! All types here are `#[repr(C)]` and `bytemuck`-safe so they can be uploaded
//! to GPU buffers without extra copies. `PatchVertex` and `InstanceRecord`
//! carry explicit padding so their byte layout matches the WGSL structs in
//! `terrain.wgsl`; the const assertions below pin the layout at compile time.

use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Globals {
    pub view_proj: [[f32; 4]; 4],
    pub time_pad: [f32; 4],
}

/// One interleaved terrain vertex: 16-byte-aligned attribute slots.
///
/// position: 3 floats at byte 0, normal: 3 floats at byte 16,
/// uv: 2 floats at byte 32, color: 4 floats at byte 48; 64-byte stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PatchVertex {
    pub pos: [f32; 3],
    pub _pad0: f32,
    pub nrm: [f32; 3],
    pub _pad1: f32,
    pub uv: [f32; 2],
    pub _pad2: [f32; 2],
    pub color: [f32; 4],
}

pub const VERTEX_STRIDE: u64 = std::mem::size_of::<PatchVertex>() as u64;
pub const VERTEX_OFFSET_POS: u64 = 0;
pub const VERTEX_OFFSET_NRM: u64 = 16;
pub const VERTEX_OFFSET_UV: u64 = 32;
pub const VERTEX_OFFSET_COLOR: u64 = 48;

const _: () = assert!(std::mem::size_of::<PatchVertex>() == 64);
const _: () = assert!(std::mem::offset_of!(PatchVertex, nrm) == VERTEX_OFFSET_NRM as usize);
const _: () = assert!(std::mem::offset_of!(PatchVertex, uv) == VERTEX_OFFSET_UV as usize);
const _: () = assert!(std::mem::offset_of!(PatchVertex, color) == VERTEX_OFFSET_COLOR as usize);

impl PatchVertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: VERTEX_OFFSET_POS,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: VERTEX_OFFSET_NRM,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: VERTEX_OFFSET_UV,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: VERTEX_OFFSET_COLOR,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    };
}

/// One indexed-indirect draw command, byte-compatible with the layout
/// `multi_draw_indexed_indirect` consumes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    /// Added to every index before it addresses the vertex buffer.
    pub base_vertex: i32,
    /// Row index into the instance data table.
    pub first_instance: u32,
}

pub const INDIRECT_COMMAND_SIZE: u64 = std::mem::size_of::<DrawIndexedIndirectCommand>() as u64;

const _: () = assert!(std::mem::size_of::<DrawIndexedIndirectCommand>() == 20);

/// One instance-table record per draw command, addressed by the command's
/// `first_instance`. Scalar tail keeps the WGSL struct at the same 80 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct InstanceRecord {
    pub model: [[f32; 4]; 4],
    /// Table slot of the owning terrain's heightmap (external resource handle).
    pub heightmap_slot: u32,
    pub cell_size: f32,
    pub uv_tiling: f32,
    pub _pad: f32,
}

pub const INSTANCE_RECORD_SIZE: u64 = std::mem::size_of::<InstanceRecord>() as u64;

const _: () = assert!(std::mem::size_of::<InstanceRecord>() == 80);
const _: () = assert!(std::mem::align_of::<InstanceRecord>() == 4);
