//! GPU capability probe.
//!
//! The adapter is inspected exactly once, at device creation; everything
//! downstream branches on the cached strategy values instead of re-querying
//! the driver per call.

/// How draw commands reach the GPU.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DrawPath {
    /// One `multi_draw_indexed_indirect` submission for the whole batch.
    MultiDrawIndirect,
    /// Per-command `draw_indexed` loop. Functionally equivalent, strictly
    /// slower; the instance range still carries the table row.
    PerCommand,
}

/// How instance-table records are written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TableWritePath {
    /// Map the storage buffer and write records through the mapped range.
    DirectMapped,
    /// `Queue::write_buffer` sub-range uploads keyed by `index * record_size`.
    Staged,
}

#[derive(Copy, Clone, Debug)]
pub struct GpuCaps {
    pub draw_path: DrawPath,
    pub table_write_path: TableWritePath,
    pub max_buffer_size: u64,
    pub max_storage_binding_size: u64,
}

impl GpuCaps {
    /// Features worth requesting from this adapter. Call before
    /// `request_device` so the probed paths are actually usable.
    pub fn desired_features(adapter: &wgpu::Adapter) -> wgpu::Features {
        let supported = adapter.features();
        let mut wanted = wgpu::Features::empty();
        if supported.contains(wgpu::Features::MULTI_DRAW_INDIRECT) {
            wanted |= wgpu::Features::MULTI_DRAW_INDIRECT;
        }
        if supported.contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS) {
            wanted |= wgpu::Features::MAPPABLE_PRIMARY_BUFFERS;
        }
        wanted
    }

    /// Resolve the strategy once from a created device.
    pub fn probe(device: &wgpu::Device) -> Self {
        let features = device.features();
        let limits = device.limits();
        let draw_path = if features.contains(wgpu::Features::MULTI_DRAW_INDIRECT) {
            DrawPath::MultiDrawIndirect
        } else {
            DrawPath::PerCommand
        };
        let table_write_path = if features.contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS) {
            TableWritePath::DirectMapped
        } else {
            TableWritePath::Staged
        };
        log::info!(
            "terrain gpu caps: draw={:?} table_write={:?} max_buffer={}",
            draw_path,
            table_write_path,
            limits.max_buffer_size
        );
        Self {
            draw_path,
            table_write_path,
            max_buffer_size: limits.max_buffer_size,
            max_storage_binding_size: u64::from(limits.max_storage_buffer_binding_size),
        }
    }
}
