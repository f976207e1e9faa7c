//! Per-instance data table.
//!
//! A shader-storage buffer holding one `InstanceRecord` per draw command,
//! addressed in the shader by `instance_index` (the command's
//! `first_instance`). The table is sized once, at renderer creation, to the
//! maximum expected instance count; writes go through the strategy the
//! capability probe picked: mapped ranges when the device can map primary
//! buffers, explicit sub-range uploads otherwise.

use crate::error::TerrainError;
use crate::gfx::caps::{GpuCaps, TableWritePath};
use crate::gfx::types::{InstanceRecord, INSTANCE_RECORD_SIZE};

pub struct InstanceDataTable {
    buffer: wgpu::Buffer,
    capacity: u32,
    write_path: TableWritePath,
}

fn check_range(first_index: u32, count: usize, capacity: u32) -> Result<(), TerrainError> {
    let end = u64::from(first_index) + count as u64;
    if end > u64::from(capacity) {
        return Err(TerrainError::Validation(format!(
            "instance write [{first_index}, {end}) exceeds table capacity {capacity}"
        )));
    }
    Ok(())
}

impl InstanceDataTable {
    pub fn new(device: &wgpu::Device, caps: &GpuCaps, capacity: u32) -> Result<Self, TerrainError> {
        let capacity = capacity.max(1);
        let bytes = u64::from(capacity) * INSTANCE_RECORD_SIZE;
        if bytes > caps.max_storage_binding_size {
            return Err(TerrainError::Capacity(format!(
                "instance table ({bytes} B) exceeds max storage binding size {}",
                caps.max_storage_binding_size
            )));
        }
        let mut usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        if caps.table_write_path == TableWritePath::DirectMapped {
            usage |= wgpu::BufferUsages::MAP_WRITE;
        }
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("terrain-instance-table"),
            size: bytes,
            usage,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(TerrainError::Allocation(format!(
                "instance table ({bytes} B): {err}"
            )));
        }
        Ok(Self {
            buffer,
            capacity,
            write_path: caps.table_write_path,
        })
    }

    /// Write `records` starting at table row `first_index`.
    pub fn write(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        first_index: u32,
        records: &[InstanceRecord],
    ) -> Result<(), TerrainError> {
        if records.is_empty() {
            return Ok(());
        }
        check_range(first_index, records.len(), self.capacity)?;
        let byte_offset = u64::from(first_index) * INSTANCE_RECORD_SIZE;
        match self.write_path {
            TableWritePath::Staged => {
                queue.write_buffer(&self.buffer, byte_offset, bytemuck::cast_slice(records));
            }
            TableWritePath::DirectMapped => {
                self.write_mapped(device, byte_offset, records)?;
            }
        }
        Ok(())
    }

    /// Zero-copy path: map the target range, write through it, unmap. The
    /// upload pass runs before any draw references the table, so the buffer
    /// is never mapped while the GPU reads it.
    fn write_mapped(
        &self,
        device: &wgpu::Device,
        byte_offset: u64,
        records: &[InstanceRecord],
    ) -> Result<(), TerrainError> {
        let byte_len = records.len() as u64 * INSTANCE_RECORD_SIZE;
        let slice = self.buffer.slice(byte_offset..byte_offset + byte_len);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Write, move |res| {
            let _ = tx.send(res);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| TerrainError::Allocation(format!("poll for instance map: {e}")))?;
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(TerrainError::Allocation(format!("map instance table: {e}")));
            }
            Err(_) => {
                return Err(TerrainError::Allocation(
                    "instance table map callback dropped".into(),
                ));
            }
        }
        {
            let mut view = slice.get_mapped_range_mut();
            view.copy_from_slice(bytemuck::cast_slice(records));
        }
        self.buffer.unmap();
        Ok(())
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_check_accepts_full_table() {
        assert!(check_range(0, 64, 64).is_ok());
        assert!(check_range(63, 1, 64).is_ok());
    }

    #[test]
    fn range_check_rejects_overflow() {
        assert!(check_range(0, 65, 64).is_err());
        assert!(check_range(64, 1, 64).is_err());
        // Large first_index must not wrap.
        assert!(check_range(u32::MAX, 2, 64).is_err());
    }
}
