//! Tile and elevation grids read from shapefiles

use crate::io::naming::TileCode;
use crate::types::{TilingError, TilingResult};
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use std::path::Path;

/// Attribute holding the MGRS code in the tiles shapefile
pub const TILE_NAME_FIELD: &str = "NAME";
/// Attribute holding the elevation file name in the SRTM shapefile
pub const ELEVATION_FILE_FIELD: &str = "FILE";

/// Output tile with its lon/lat footprint
#[derive(Clone)]
pub struct Tile {
    pub code: TileCode,
    pub footprint: Geometry,
}

/// Auxiliary elevation cell, named by its file in the elevation directory
#[derive(Clone)]
pub struct ElevationTile {
    pub name: String,
    pub footprint: Geometry,
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile").field("code", &self.code).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ElevationTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationTile").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Every tile of the output grid
#[derive(Debug, Clone, Default)]
pub struct TileGrid {
    pub tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn find(&self, code: &TileCode) -> Option<&Tile> {
        self.tiles.iter().find(|tile| &tile.code == code)
    }
}

/// Read `(name, geometry)` pairs from the first layer of a vector file
fn read_named_features(path: &Path, field: &str) -> TilingResult<Vec<(String, Geometry)>> {
    log::debug!("Reading grid {} (field {})", path.display(), field);

    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;
    let mut features = Vec::new();

    for feature in layer.features() {
        let Some(name) = feature.field_as_string_by_name(field)? else {
            continue;
        };
        let geometry = feature.geometry_by_index(0)?;
        features.push((name.trim().to_string(), geometry.clone()));
    }

    if features.is_empty() {
        return Err(TilingError::Config(format!(
            "No features with a '{}' attribute in {}",
            field,
            path.display()
        )));
    }
    Ok(features)
}

/// Load the MGRS tiles shapefile
pub fn load_tile_grid(path: &Path) -> TilingResult<TileGrid> {
    let mut tiles = Vec::new();
    for (name, footprint) in read_named_features(path, TILE_NAME_FIELD)? {
        match name.parse::<TileCode>() {
            Ok(code) => tiles.push(Tile { code, footprint }),
            Err(e) => log::debug!("Ignoring grid feature: {}", e),
        }
    }
    log::info!("Loaded {} tiles from {}", tiles.len(), path.display());
    Ok(TileGrid { tiles })
}

/// Load the elevation tiles shapefile
pub fn load_elevation_grid(path: &Path) -> TilingResult<Vec<ElevationTile>> {
    let cells: Vec<ElevationTile> = read_named_features(path, ELEVATION_FILE_FIELD)?
        .into_iter()
        .map(|(name, footprint)| ElevationTile { name, footprint })
        .collect();
    log::info!("Loaded {} elevation tiles from {}", cells.len(), path.display());
    Ok(cells)
}
