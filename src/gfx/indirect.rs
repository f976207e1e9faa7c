//! Indirect draw batching.
//!
//! The CPU side builds a flat list of `DrawIndexedIndirectCommand`s; the GPU
//! side holds a mirror buffer that is re-uploaded only while the list is
//! dirty, and only the bytes actually in use. One `multi_draw_indexed_indirect`
//! then renders every patch of every terrain in a single submission; the
//! per-command fallback loops `draw_indexed` with the same offsets.

use crate::error::TerrainError;
use crate::gfx::caps::{DrawPath, GpuCaps};
use crate::gfx::types::{DrawIndexedIndirectCommand, INDIRECT_COMMAND_SIZE};

pub struct IndirectDrawBatch {
    commands: Vec<DrawIndexedIndirectCommand>,
    buffer: wgpu::Buffer,
    /// Commands the GPU buffer can hold.
    buffer_capacity: u32,
    dirty: bool,
}

fn create_command_buffer(
    device: &wgpu::Device,
    caps: &GpuCaps,
    capacity: u32,
) -> Result<wgpu::Buffer, TerrainError> {
    let bytes = u64::from(capacity) * INDIRECT_COMMAND_SIZE;
    if bytes > caps.max_buffer_size {
        return Err(TerrainError::Capacity(format!(
            "indirect command buffer ({bytes} B) exceeds max_buffer_size {}",
            caps.max_buffer_size
        )));
    }
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("terrain-indirect-commands"),
        size: bytes,
        usage: wgpu::BufferUsages::INDIRECT
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(TerrainError::Allocation(format!(
            "indirect command buffer ({bytes} B): {err}"
        )));
    }
    Ok(buffer)
}

impl IndirectDrawBatch {
    pub fn new(
        device: &wgpu::Device,
        caps: &GpuCaps,
        initial_capacity: u32,
    ) -> Result<Self, TerrainError> {
        let capacity = initial_capacity.max(1);
        let buffer = create_command_buffer(device, caps, capacity)?;
        Ok(Self {
            commands: Vec::with_capacity(capacity as usize),
            buffer,
            buffer_capacity: capacity,
            dirty: false,
        })
    }

    /// Empty the command list. The backing GPU buffer keeps its capacity.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.dirty = true;
    }

    pub fn add_command(&mut self, command: DrawIndexedIndirectCommand) {
        self.commands.push(command);
        self.dirty = true;
    }

    /// In-place mutation of one command (e.g. instance count changes).
    pub fn set_command(
        &mut self,
        index: usize,
        command: DrawIndexedIndirectCommand,
    ) -> Result<(), TerrainError> {
        let Some(slot) = self.commands.get_mut(index) else {
            return Err(TerrainError::Validation(format!(
                "set_command index {index} out of range ({} commands)",
                self.commands.len()
            )));
        };
        *slot = command;
        self.dirty = true;
        Ok(())
    }

    pub fn len(&self) -> u32 {
        self.commands.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[DrawIndexedIndirectCommand] {
        &self.commands
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Mirror the command list into the GPU buffer if it changed. The full
    /// list is always re-uploaded together, so regrowth never needs a
    /// data-preserving copy; only `len * command_size` bytes move.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, caps: &GpuCaps) -> Result<(), TerrainError> {
        if !self.dirty {
            return Ok(());
        }
        if self.commands.is_empty() {
            self.dirty = false;
            return Ok(());
        }
        let needed = self.commands.len() as u32;
        if needed > self.buffer_capacity {
            let grown = needed.max(self.buffer_capacity.saturating_mul(3) / 2);
            self.buffer = create_command_buffer(device, caps, grown)?;
            self.buffer_capacity = grown;
            log::debug!("indirect command buffer regrown to {grown} commands");
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.commands));
        self.dirty = false;
        Ok(())
    }

    /// Upload if dirty, then issue the batch on the active pass: either one
    /// multi-draw covering `len()` tightly packed commands from offset 0, or
    /// the per-command loop when the capability is missing.
    pub fn draw(
        &mut self,
        rpass: &mut wgpu::RenderPass<'_>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        caps: &GpuCaps,
    ) -> Result<(), TerrainError> {
        self.upload(device, queue, caps)?;
        if self.commands.is_empty() {
            return Ok(());
        }
        match caps.draw_path {
            DrawPath::MultiDrawIndirect => {
                rpass.multi_draw_indexed_indirect(&self.buffer, 0, self.len());
            }
            DrawPath::PerCommand => {
                for cmd in &self.commands {
                    rpass.draw_indexed(
                        cmd.first_index..cmd.first_index + cmd.index_count,
                        cmd.base_vertex,
                        cmd.first_instance..cmd.first_instance + cmd.instance_count,
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(first_index: u32, base_vertex: i32, first_instance: u32) -> DrawIndexedIndirectCommand {
        DrawIndexedIndirectCommand {
            index_count: 6,
            instance_count: 1,
            first_index,
            base_vertex,
            first_instance,
        }
    }

    #[test]
    fn commands_accumulate_in_order() {
        let mut batch_cmds: Vec<DrawIndexedIndirectCommand> = Vec::new();
        for i in 0..4u32 {
            batch_cmds.push(cmd(i * 6, (i * 9) as i32, i));
        }
        // Byte image is what upload() would write: commands back to back.
        let bytes: &[u8] = bytemuck::cast_slice(&batch_cmds);
        assert_eq!(bytes.len(), 4 * INDIRECT_COMMAND_SIZE as usize);
        let round: &[DrawIndexedIndirectCommand] = bytemuck::cast_slice(bytes);
        assert_eq!(round, batch_cmds.as_slice());
    }

    #[test]
    fn command_layout_matches_indirect_args() {
        // Field order must match what the GPU reads from the indirect buffer.
        let c = cmd(12, 34, 5);
        let bytes = bytemuck::bytes_of(&c);
        assert_eq!(&bytes[0..4], &6u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &12u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &34i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &5u32.to_le_bytes());
    }
}
