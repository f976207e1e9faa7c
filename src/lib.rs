//! terragrid: heightmap terrain streaming and GPU-driven rendering.
//!
//! The data path: a persisted [`terrain::HeightField`] feeds
//! [`terrain::generate_patch`], patch meshes append into one
//! [`gfx::GrowableGeometryBuffer`], and one [`gfx::IndirectDrawBatch`] plus
//! one [`gfx::InstanceDataTable`] render every patch of every terrain in a
//! single multi-draw submission.

pub mod error;
pub mod gfx;
pub mod terrain;

pub use error::TerrainError;
pub use gfx::{TerrainRenderer, TerrainRendererInfo};
pub use terrain::{HeightField, Terrain, TerrainMap, TerrainPatch};
