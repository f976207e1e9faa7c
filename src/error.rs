//! Central error taxonomy for the terrain subsystem.
//!
//! Low-level GPU and file operations return these instead of logging-and-
//! aborting; callers decide whether a failure is fatal. Logging stays at the
//! call site so "what failed" and "how it's reported" remain separate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerrainError {
    /// GPU buffer or resource allocation failed. Partial state has already
    /// been torn down when this is returned.
    #[error("gpu allocation failed: {0}")]
    Allocation(String),

    /// An operation would shrink a live buffer or exceed a hardware limit.
    /// The pre-existing state is left untouched.
    #[error("capacity violation: {0}")]
    Capacity(String),

    /// Empty slices, out-of-range indices, or bad grid coordinates. The
    /// operation becomes a no-op for the caller.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Magic/version mismatch, truncation, or dimension mismatch in a
    /// persisted heightmap or map settings file.
    #[error("bad file format: {0}")]
    FileFormat(String),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("settings parse error")]
    Settings(#[from] serde_json::Error),
}
