//! Terrain domain model: patches, terrains, and the on-disk map.
//!
//! Files
//! - heightfield.rs: padded elevation grid + binary persistence
//! - patch_mesh.rs: heightfield region -> vertex/index grid
//! - map.rs: map directory layout + settings manifest
//!
//! A Terrain is a fixed `PATCH_COUNT_X x PATCH_COUNT_Z` grid of patches
//! sharing one heightfield; a TerrainMap is a 2D array of Terrains. Patch
//! meshes live here on the CPU; the renderer owns everything GPU-side.

pub mod heightfield;
pub mod map;
pub mod patch_mesh;

pub use heightfield::HeightField;
pub use map::{MapSettings, TerrainMap};
pub use patch_mesh::{generate_patch, PatchMesh, UV_TILING};

use glam::{Mat4, Vec3};

use crate::error::TerrainError;

/// Patches per terrain, each axis.
pub const PATCH_COUNT_X: u32 = 4;
pub const PATCH_COUNT_Z: u32 = 4;
/// Quads per patch, each axis.
pub const PATCH_QUADS_X: u32 = 16;
pub const PATCH_QUADS_Z: u32 = 16;
/// Quads per terrain edge.
pub const TERRAIN_EDGE: u32 = PATCH_COUNT_X * PATCH_QUADS_X;
/// Heightfield allocation per axis: terrain edge plus one shared sample row
/// plus the 2-cell padding the normal taps need.
pub const HEIGHTFIELD_RAW_SIZE: u32 = TERRAIN_EDGE + 3;
/// World meters per heightfield cell.
pub const CELL_SIZE: f32 = 1.0;
pub const PATCHES_PER_TERRAIN: u32 = PATCH_COUNT_X * PATCH_COUNT_Z;
/// Mesh sizes per patch; renderers size the shared stores from these.
pub const VERTICES_PER_PATCH: u32 = (PATCH_QUADS_X + 1) * (PATCH_QUADS_Z + 1);
pub const INDICES_PER_PATCH: u32 = PATCH_QUADS_X * PATCH_QUADS_Z * 6;

/// One rectangular slice of a terrain: its generated mesh plus the slice
/// boundaries it was assigned inside the shared geometry buffer.
pub struct TerrainPatch {
    pub patch_x: u32,
    pub patch_z: u32,
    pub mesh: PatchMesh,
    /// Element offsets into the shared geometry stores; written at upload.
    pub vertex_offset: u32,
    pub index_offset: u32,
}

impl TerrainPatch {
    pub fn height_bounds(&self) -> (f32, f32) {
        (self.mesh.height_min, self.mesh.height_max)
    }
}

pub struct Terrain {
    coord_x: i32,
    coord_z: i32,
    /// Row-major: `patch_z * PATCH_COUNT_X + patch_x`.
    patches: Vec<TerrainPatch>,
    heightfield: HeightField,
    transform: Mat4,
    /// Offset into the global instance table, assigned at upload.
    base_patch_index: u32,
}

impl Terrain {
    /// Build a terrain from an already-loaded heightfield. Patch meshes are
    /// generated immediately, since geometry generation reads height samples, so
    /// the field must exist first.
    pub fn new(coord_x: i32, coord_z: i32, heightfield: HeightField) -> Result<Self, TerrainError> {
        if coord_x < 0 || coord_z < 0 {
            return Err(TerrainError::Validation(format!(
                "terrain grid coordinates must be non-negative, got ({coord_x}, {coord_z})"
            )));
        }
        let transform = Mat4::from_translation(Vec3::new(
            coord_x as f32 * TERRAIN_EDGE as f32 * CELL_SIZE,
            0.0,
            coord_z as f32 * TERRAIN_EDGE as f32 * CELL_SIZE,
        ));
        let mut terrain = Self {
            coord_x,
            coord_z,
            patches: Vec::with_capacity(PATCHES_PER_TERRAIN as usize),
            heightfield,
            transform,
            base_patch_index: 0,
        };
        terrain.generate_patches();
        Ok(terrain)
    }

    /// (Re)generate every patch mesh from the current heightfield. Replaces
    /// the previous meshes wholesale; safe to call any number of times.
    pub fn generate_patches(&mut self) {
        self.patches.clear();
        for pz in 0..PATCH_COUNT_Z {
            for px in 0..PATCH_COUNT_X {
                self.patches.push(self.build_patch(px, pz));
            }
        }
    }

    /// Rebuild a single patch after a height edit.
    pub fn regenerate_patch(&mut self, px: u32, pz: u32) -> Result<(), TerrainError> {
        if px >= PATCH_COUNT_X || pz >= PATCH_COUNT_Z {
            return Err(TerrainError::Validation(format!(
                "patch ({px}, {pz}) outside {PATCH_COUNT_X}x{PATCH_COUNT_Z} grid"
            )));
        }
        let rebuilt = self.build_patch(px, pz);
        self.patches[(pz * PATCH_COUNT_X + px) as usize] = rebuilt;
        Ok(())
    }

    fn build_patch(&self, px: u32, pz: u32) -> TerrainPatch {
        // Meshes are patch-local; placement lives in the per-instance
        // transform so the mesh never has to regenerate on terrain moves.
        let mesh = generate_patch(
            &self.heightfield,
            px,
            pz,
            PATCH_QUADS_X,
            PATCH_QUADS_Z,
            CELL_SIZE,
            Mat4::IDENTITY,
            patch_debug_color(px, pz),
        );
        TerrainPatch {
            patch_x: px,
            patch_z: pz,
            mesh,
            vertex_offset: 0,
            index_offset: 0,
        }
    }

    /// World transform for one patch: terrain placement times the patch's
    /// grid offset inside the terrain.
    pub fn patch_world_transform(&self, px: u32, pz: u32) -> Mat4 {
        self.transform
            * Mat4::from_translation(Vec3::new(
                px as f32 * PATCH_QUADS_X as f32 * CELL_SIZE,
                0.0,
                pz as f32 * PATCH_QUADS_Z as f32 * CELL_SIZE,
            ))
    }

    pub fn coords(&self) -> (i32, i32) {
        (self.coord_x, self.coord_z)
    }

    pub fn patches(&self) -> &[TerrainPatch] {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut [TerrainPatch] {
        &mut self.patches
    }

    pub fn heightfield(&self) -> &HeightField {
        &self.heightfield
    }

    pub fn heightfield_mut(&mut self) -> &mut HeightField {
        &mut self.heightfield
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn base_patch_index(&self) -> u32 {
        self.base_patch_index
    }

    pub fn set_base_patch_index(&mut self, index: u32) {
        self.base_patch_index = index;
    }
}

/// Deterministic per-patch tint so adjacent patches are tellable apart in
/// debug views. Integer hash of the grid coordinates, mapped into mid-range
/// RGB.
fn patch_debug_color(px: u32, pz: u32) -> [f32; 4] {
    let mut x = u64::from(px).wrapping_mul(0x27d4_eb2d);
    x ^= u64::from(pz).wrapping_mul(0x1656_6791_9e37_79f9);
    let u = x ^ (x >> 33);
    let channel = |shift: u32| ((u >> shift) & 0xff) as f32 / 255.0 * 0.5 + 0.4;
    [channel(0), channel(8), channel(16), 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_rejects_negative_coords() {
        let field = HeightField::new(HEIGHTFIELD_RAW_SIZE, HEIGHTFIELD_RAW_SIZE);
        assert!(matches!(
            Terrain::new(-1, 0, field),
            Err(TerrainError::Validation(_))
        ));
    }

    #[test]
    fn terrain_generates_full_patch_grid() {
        let field = HeightField::new(HEIGHTFIELD_RAW_SIZE, HEIGHTFIELD_RAW_SIZE);
        let terrain = Terrain::new(0, 0, field).expect("terrain");
        assert_eq!(terrain.patches().len() as u32, PATCHES_PER_TERRAIN);
        // Row-major order.
        let p = &terrain.patches()[(PATCH_COUNT_X + 1) as usize];
        assert_eq!((p.patch_x, p.patch_z), (1, 1));
        for patch in terrain.patches() {
            assert_eq!(
                patch.mesh.vertices.len() as u32,
                (PATCH_QUADS_X + 1) * (PATCH_QUADS_Z + 1)
            );
            assert_eq!(patch.mesh.indices.len() as u32, PATCH_QUADS_X * PATCH_QUADS_Z * 6);
        }
    }

    #[test]
    fn regenerate_patch_overwrites_in_place() {
        let field = HeightField::new(HEIGHTFIELD_RAW_SIZE, HEIGHTFIELD_RAW_SIZE);
        let mut terrain = Terrain::new(0, 0, field).expect("terrain");
        terrain.heightfield_mut().set(5, 5, 9.0);
        let before = terrain.patches().len();
        terrain.regenerate_patch(0, 0).expect("regenerate");
        assert_eq!(terrain.patches().len(), before);
        let (_, max) = terrain.patches()[0].height_bounds();
        assert_eq!(max, 9.0);
        assert!(terrain.regenerate_patch(PATCH_COUNT_X, 0).is_err());
    }

    #[test]
    fn patch_world_transforms_tile_the_terrain() {
        let field = HeightField::new(HEIGHTFIELD_RAW_SIZE, HEIGHTFIELD_RAW_SIZE);
        let terrain = Terrain::new(2, 1, field).expect("terrain");
        let edge = TERRAIN_EDGE as f32 * CELL_SIZE;
        let origin = terrain.patch_world_transform(0, 0).transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::new(2.0 * edge, 0.0, edge));
        let next = terrain.patch_world_transform(1, 0).transform_point3(Vec3::ZERO);
        assert_eq!(
            next,
            Vec3::new(2.0 * edge + PATCH_QUADS_X as f32 * CELL_SIZE, 0.0, edge)
        );
    }
}
