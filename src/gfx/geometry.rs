//! Growable unified geometry store.
//!
//! All terrain patches share one interleaved vertex buffer and one 32-bit
//! index buffer. Appends bump two cursors; when an append would overflow,
//! both stores are reallocated and the live bytes are copied GPU-to-GPU
//! (`copy_buffer_to_buffer`) before the old handles drop, with no CPU round-trip.
//! Draw commands address slices of the stores via `base_vertex`/`first_index`.

use crate::error::TerrainError;
use crate::gfx::caps::GpuCaps;
use crate::gfx::types::{PatchVertex, VERTEX_STRIDE};

const INDEX_SIZE: u64 = std::mem::size_of::<u32>() as u64;

pub struct GrowableGeometryBuffer {
    vertex_buf: wgpu::Buffer,
    index_buf: wgpu::Buffer,
    /// Allocated slots, in elements.
    vertex_capacity: u32,
    index_capacity: u32,
    /// Next free write position (bump cursor), in elements.
    vertex_offset: u32,
    index_offset: u32,
}

/// Grow to at least `required`, and by at least half the current capacity so
/// repeated appends amortize.
fn grown_capacity(current: u32, required: u32) -> u32 {
    required.max(current.saturating_mul(3) / 2)
}

fn create_stores(
    device: &wgpu::Device,
    caps: &GpuCaps,
    vertex_capacity: u32,
    index_capacity: u32,
) -> Result<(wgpu::Buffer, wgpu::Buffer), TerrainError> {
    let vertex_bytes = u64::from(vertex_capacity) * VERTEX_STRIDE;
    let index_bytes = u64::from(index_capacity) * INDEX_SIZE;
    if vertex_bytes > caps.max_buffer_size || index_bytes > caps.max_buffer_size {
        return Err(TerrainError::Capacity(format!(
            "requested stores ({} vB / {} iB) exceed max_buffer_size {}",
            vertex_bytes, index_bytes, caps.max_buffer_size
        )));
    }

    // wgpu reports OOM through error scopes rather than return codes; a
    // popped error means both handles below are invalid and must drop.
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let vertex_buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("terrain-geometry-vb"),
        size: vertex_bytes,
        usage: wgpu::BufferUsages::VERTEX
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let index_buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("terrain-geometry-ib"),
        size: index_bytes,
        usage: wgpu::BufferUsages::INDEX
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(TerrainError::Allocation(format!(
            "geometry store allocation ({} vB / {} iB): {err}",
            vertex_bytes, index_bytes
        )));
    }
    Ok((vertex_buf, index_buf))
}

impl GrowableGeometryBuffer {
    pub fn new(
        device: &wgpu::Device,
        caps: &GpuCaps,
        vertex_capacity: u32,
        index_capacity: u32,
    ) -> Result<Self, TerrainError> {
        let (vertex_buf, index_buf) = create_stores(device, caps, vertex_capacity, index_capacity)?;
        Ok(Self {
            vertex_buf,
            index_buf,
            vertex_capacity,
            index_capacity,
            vertex_offset: 0,
            index_offset: 0,
        })
    }

    /// Append one patch worth of geometry; returns the element offsets the
    /// slice landed at, which callers need for their draw command.
    ///
    /// Empty input is rejected as a dropped write (logged, no state change),
    /// never a panic; a long-running render loop must survive a bad patch.
    pub fn append(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        caps: &GpuCaps,
        vertices: &[PatchVertex],
        indices: &[u32],
    ) -> Result<(u32, u32), TerrainError> {
        if vertices.is_empty() || indices.is_empty() {
            log::error!(
                "geometry append dropped: {} vertices / {} indices",
                vertices.len(),
                indices.len()
            );
            return Err(TerrainError::Validation(
                "append with empty vertex or index data".into(),
            ));
        }

        let vertex_count = vertices.len() as u32;
        let index_count = indices.len() as u32;
        let required_vertices = self.vertex_offset + vertex_count;
        let required_indices = self.index_offset + index_count;
        if required_vertices > self.vertex_capacity || required_indices > self.index_capacity {
            self.reallocate(
                device,
                queue,
                caps,
                grown_capacity(self.vertex_capacity, required_vertices),
                grown_capacity(self.index_capacity, required_indices),
                true,
            )?;
        }

        let vertex_offset = self.vertex_offset;
        let index_offset = self.index_offset;
        queue.write_buffer(
            &self.vertex_buf,
            u64::from(vertex_offset) * VERTEX_STRIDE,
            bytemuck::cast_slice(vertices),
        );
        queue.write_buffer(
            &self.index_buf,
            u64::from(index_offset) * INDEX_SIZE,
            bytemuck::cast_slice(indices),
        );
        self.vertex_offset += vertex_count;
        self.index_offset += index_count;
        Ok((vertex_offset, index_offset))
    }

    /// Swap in brand-new stores at the given capacities. With `copy_old`,
    /// `min(old, new)` bytes of each store are copied on the GPU timeline
    /// before the old handles drop; shrinking under `copy_old` would truncate
    /// live data and is rejected with the buffer untouched.
    pub fn reallocate(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        caps: &GpuCaps,
        new_vertex_capacity: u32,
        new_index_capacity: u32,
        copy_old: bool,
    ) -> Result<(), TerrainError> {
        if copy_old
            && (new_vertex_capacity < self.vertex_capacity
                || new_index_capacity < self.index_capacity)
        {
            return Err(TerrainError::Capacity(format!(
                "shrinking {}→{} vertices / {}→{} indices would truncate live data",
                self.vertex_capacity, new_vertex_capacity, self.index_capacity, new_index_capacity
            )));
        }

        let (vertex_buf, index_buf) =
            create_stores(device, caps, new_vertex_capacity, new_index_capacity)?;

        if copy_old {
            let vertex_bytes = u64::from(self.vertex_capacity.min(new_vertex_capacity)) * VERTEX_STRIDE;
            let index_bytes = u64::from(self.index_capacity.min(new_index_capacity)) * INDEX_SIZE;
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("terrain-geometry-grow-copy"),
            });
            if vertex_bytes > 0 {
                encoder.copy_buffer_to_buffer(&self.vertex_buf, 0, &vertex_buf, 0, vertex_bytes);
            }
            if index_bytes > 0 {
                encoder.copy_buffer_to_buffer(&self.index_buf, 0, &index_buf, 0, index_bytes);
            }
            queue.submit(Some(encoder.finish()));
        } else {
            self.vertex_offset = 0;
            self.index_offset = 0;
        }

        log::debug!(
            "geometry stores reallocated: {}→{} vertices, {}→{} indices (copy_old={})",
            self.vertex_capacity,
            new_vertex_capacity,
            self.index_capacity,
            new_index_capacity,
            copy_old
        );
        self.vertex_buf = vertex_buf;
        self.index_buf = index_buf;
        self.vertex_capacity = new_vertex_capacity;
        self.index_capacity = new_index_capacity;
        Ok(())
    }

    /// Logical clear: rewind the bump cursors, keep the GPU memory.
    pub fn reset(&mut self) {
        self.vertex_offset = 0;
        self.index_offset = 0;
    }

    /// `reset` plus a GPU-side zero fill of both stores. Costs a submit;
    /// debug paths only.
    pub fn clear(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.reset();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("terrain-geometry-clear"),
        });
        encoder.clear_buffer(&self.vertex_buf, 0, None);
        encoder.clear_buffer(&self.index_buf, 0, None);
        queue.submit(Some(encoder.finish()));
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buf
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buf
    }

    /// Elements written so far (what a full-buffer draw would cover).
    pub fn vertex_count(&self) -> u32 {
        self.vertex_offset
    }

    pub fn index_count(&self) -> u32 {
        self.index_offset
    }

    pub fn vertex_capacity(&self) -> u32 {
        self.vertex_capacity
    }

    pub fn index_capacity(&self) -> u32 {
        self.index_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_covers_required() {
        assert_eq!(grown_capacity(100, 101), 150);
        assert_eq!(grown_capacity(100, 400), 400);
        assert_eq!(grown_capacity(0, 64), 64);
    }

    #[test]
    fn growth_is_monotonic() {
        let mut cap = 16u32;
        for need in [20u32, 25, 40, 200, 201] {
            let next = grown_capacity(cap, need);
            assert!(next >= need);
            assert!(next >= cap);
            cap = next;
        }
    }
}
