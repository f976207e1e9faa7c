//! Map directory layout and settings manifest.
//!
//! One directory per map:
//! - `settings.json`: schema tag, version, name, grid dimensions
//! - one numbered subdirectory per terrain cell (`index = z * 1000 + x`)
//!   holding that cell's `heightmap.hgt`
//!
//! Terrains load row-major; the map only reports ready (and therefore
//! uploadable) once every cell's heightfield is in memory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TerrainError;
use crate::terrain::heightfield::HeightField;
use crate::terrain::{Terrain, HEIGHTFIELD_RAW_SIZE, PATCHES_PER_TERRAIN};

pub const MAP_SETTINGS_FILE: &str = "settings.json";
pub const MAP_SETTINGS_SCHEMA: &str = "terragrid.map.v1";
pub const MAP_SETTINGS_VERSION: u32 = 1;
pub const HEIGHTMAP_FILE: &str = "heightmap.hgt";

/// Settings manifest persisted beside the terrain cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapSettings {
    /// Schema tag; rejected on mismatch so stale tooling fails loudly.
    pub schema: String,
    pub version: u32,
    pub name: String,
    /// Directory name the map was created under (informational).
    pub map_dir: String,
    /// Terrain cells along X / Z.
    pub width: u32,
    pub height: u32,
}

pub struct TerrainMap {
    dir: PathBuf,
    settings: MapSettings,
    /// Row-major: `z * width + x`.
    terrains: Vec<Terrain>,
    ready: bool,
}

fn cell_dir(dir: &Path, x: u32, z: u32) -> PathBuf {
    dir.join(format!("{}", z * 1000 + x))
}

impl TerrainMap {
    /// Create a fresh map on disk: settings manifest, one flat heightfield
    /// per cell, all saved before the call returns.
    pub fn create(dir: &Path, name: &str, width: u32, height: u32) -> Result<Self, TerrainError> {
        if width == 0 || height == 0 {
            return Err(TerrainError::Validation(format!(
                "map dimensions must be non-zero, got {width}x{height}"
            )));
        }
        fs::create_dir_all(dir)?;
        let settings = MapSettings {
            schema: MAP_SETTINGS_SCHEMA.to_string(),
            version: MAP_SETTINGS_VERSION,
            name: name.to_string(),
            map_dir: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            width,
            height,
        };

        let mut terrains = Vec::with_capacity((width * height) as usize);
        for z in 0..height {
            for x in 0..width {
                let cell = cell_dir(dir, x, z);
                fs::create_dir_all(&cell)?;
                let field = HeightField::new(HEIGHTFIELD_RAW_SIZE, HEIGHTFIELD_RAW_SIZE);
                field.save(&cell.join(HEIGHTMAP_FILE))?;
                terrains.push(Terrain::new(x as i32, z as i32, field)?);
            }
        }

        let map = Self {
            dir: dir.to_path_buf(),
            settings,
            terrains,
            ready: true,
        };
        map.save_settings()?;
        log::info!("created map '{name}' ({width}x{height}) at {}", dir.display());
        Ok(map)
    }

    /// Load an existing map directory: settings first, then every cell's
    /// heightmap, generating patch meshes as each terrain comes up.
    pub fn load(dir: &Path) -> Result<Self, TerrainError> {
        let settings_path = dir.join(MAP_SETTINGS_FILE);
        let txt = fs::read_to_string(&settings_path)?;
        let settings: MapSettings = serde_json::from_str(&txt)?;
        if settings.schema != MAP_SETTINGS_SCHEMA {
            return Err(TerrainError::FileFormat(format!(
                "{}: schema '{}' (expected '{MAP_SETTINGS_SCHEMA}')",
                settings_path.display(),
                settings.schema
            )));
        }
        if settings.version != MAP_SETTINGS_VERSION {
            return Err(TerrainError::FileFormat(format!(
                "{}: version {} (expected {MAP_SETTINGS_VERSION})",
                settings_path.display(),
                settings.version
            )));
        }

        let mut terrains = Vec::with_capacity((settings.width * settings.height) as usize);
        for z in 0..settings.height {
            for x in 0..settings.width {
                let path = cell_dir(dir, x, z).join(HEIGHTMAP_FILE);
                let field = HeightField::load(&path)?;
                if field.width() != HEIGHTFIELD_RAW_SIZE || field.height() != HEIGHTFIELD_RAW_SIZE {
                    return Err(TerrainError::FileFormat(format!(
                        "{}: cell heightfield is {}x{} (expected {HEIGHTFIELD_RAW_SIZE}^2)",
                        path.display(),
                        field.width(),
                        field.height()
                    )));
                }
                terrains.push(Terrain::new(x as i32, z as i32, field)?);
            }
        }
        log::info!(
            "loaded map '{}' ({}x{}) from {}",
            settings.name,
            settings.width,
            settings.height,
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            settings,
            terrains,
            ready: true,
        })
    }

    /// Persist the settings manifest and every cell's heightfield.
    pub fn save(&self) -> Result<(), TerrainError> {
        self.save_settings()?;
        for terrain in &self.terrains {
            let (x, z) = terrain.coords();
            let cell = cell_dir(&self.dir, x as u32, z as u32);
            fs::create_dir_all(&cell)?;
            terrain.heightfield().save(&cell.join(HEIGHTMAP_FILE))?;
        }
        Ok(())
    }

    fn save_settings(&self) -> Result<(), TerrainError> {
        let path = self.dir.join(MAP_SETTINGS_FILE);
        let bak = self.dir.join(format!("{MAP_SETTINGS_FILE}.bak"));
        let txt = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&bak, txt)?;
        fs::rename(&bak, &path)?;
        Ok(())
    }

    /// Upload gate: all terrains present with loaded heightfields.
    pub fn is_ready(&self) -> bool {
        self.ready && self.terrains.len() == (self.settings.width * self.settings.height) as usize
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn terrains(&self) -> &[Terrain] {
        &self.terrains
    }

    pub fn terrains_mut(&mut self) -> &mut [Terrain] {
        &mut self.terrains
    }

    pub fn terrain_at(&self, x: u32, z: u32) -> Option<&Terrain> {
        if x >= self.settings.width || z >= self.settings.height {
            return None;
        }
        self.terrains.get((z * self.settings.width + x) as usize)
    }

    /// Total patch count across the map; sizes the instance table.
    pub fn patch_total(&self) -> u32 {
        self.settings.width * self.settings.height * PATCHES_PER_TERRAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_load_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("coast");
        let map = TerrainMap::create(&dir, "coast", 2, 3).expect("create");
        assert!(map.is_ready());
        assert_eq!(map.patch_total(), 2 * 3 * PATCHES_PER_TERRAIN);
        // Cell directories follow the z*1000+x numbering.
        assert!(dir.join("0").is_dir());
        assert!(dir.join("1").is_dir());
        assert!(dir.join("2001").is_dir());

        let loaded = TerrainMap::load(&dir).expect("load");
        assert_eq!(loaded.settings().name, "coast");
        assert_eq!(loaded.settings().width, 2);
        assert_eq!(loaded.settings().height, 3);
        assert_eq!(loaded.terrains().len(), 6);
        assert_eq!(loaded.terrain_at(1, 2).unwrap().coords(), (1, 2));
        assert!(loaded.terrain_at(2, 0).is_none());
    }

    #[test]
    fn edits_survive_save_and_reload() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("edit");
        let mut map = TerrainMap::create(&dir, "edit", 1, 1).expect("create");
        map.terrains_mut()[0].heightfield_mut().set(10, 12, 4.25);
        map.save().expect("save");

        let loaded = TerrainMap::load(&dir).expect("load");
        assert_eq!(loaded.terrains()[0].heightfield().get(10, 12), 4.25);
    }

    #[test]
    fn load_rejects_wrong_schema() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("bad");
        TerrainMap::create(&dir, "bad", 1, 1).expect("create");
        let path = dir.join(MAP_SETTINGS_FILE);
        let txt = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, txt.replace(MAP_SETTINGS_SCHEMA, "other.schema.v9")).unwrap();
        assert!(matches!(
            TerrainMap::load(&dir),
            Err(TerrainError::FileFormat(_))
        ));
    }

    #[test]
    fn create_rejects_empty_grid() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            TerrainMap::create(&tmp.path().join("zero"), "zero", 0, 4),
            Err(TerrainError::Validation(_))
        ));
    }
}
