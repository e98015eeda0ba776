//! Footprint arithmetic: elevation coverage of tiles and tile selection

use crate::config::{TileSelection, ALL_TILES};
use crate::io::grid::{ElevationTile, Tile, TileGrid};
use crate::io::naming::TileCode;
use crate::io::product::RasterProduct;
use crate::types::{TilingError, TilingResult};
use gdal::vector::Geometry;
use std::collections::BTreeSet;

/// Elevation tiles intersecting one output tile
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationCoverage {
    pub tile: TileCode,
    /// `(elevation tile name, fraction of the tile area it covers)`
    pub contributions: Vec<(String, f64)>,
    /// Sum of the fractions
    pub ratio: f64,
}

impl ElevationCoverage {
    pub fn is_complete(&self) -> bool {
        self.ratio >= 1.0
    }

    pub fn tile_names(&self) -> Vec<String> {
        self.contributions.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Fraction of `tile` covered by `other`, 0.0 when they do not intersect
fn overlap_fraction(tile: &Geometry, other: &Geometry) -> f64 {
    let tile_area = tile.area();
    if tile_area <= 0.0 || !tile.intersects(other) {
        return 0.0;
    }
    tile.intersection(other).map_or(0.0, |shared| shared.area() / tile_area)
}

/// Coverage of `tile` by the elevation catalogue
pub fn elevation_coverage(tile: &Tile, elevation: &[ElevationTile]) -> ElevationCoverage {
    let contributions: Vec<(String, f64)> = elevation
        .iter()
        .filter_map(|cell| {
            let fraction = overlap_fraction(&tile.footprint, &cell.footprint);
            (fraction > 0.0).then(|| (cell.name.clone(), fraction))
        })
        .collect();
    let ratio: f64 = contributions.iter().map(|(_, fraction)| fraction).sum();

    ElevationCoverage {
        tile: tile.code.clone(),
        contributions,
        ratio,
    }
}

/// Coverage of every tile plus the union of the elevation tiles they need.
///
/// Incomplete coverage is logged and the tile is kept.
pub fn needed_elevation_tiles(
    tiles: &[Tile],
    elevation: &[ElevationTile],
) -> (Vec<ElevationCoverage>, BTreeSet<String>) {
    let mut needed = BTreeSet::new();
    let mut coverages = Vec::with_capacity(tiles.len());

    for tile in tiles {
        let coverage = elevation_coverage(tile, elevation);
        if coverage.is_complete() {
            log::info!("{} is fully covered by elevation tiles", tile.code);
        } else {
            log::warn!(
                "{} is only covered at {:.1}% by elevation tiles",
                tile.code,
                coverage.ratio * 100.0
            );
        }
        needed.extend(coverage.tile_names());
        coverages.push(coverage);
    }

    (coverages, needed)
}

/// `Tiles: ALL` cannot be combined with a download over `ROI_by_tiles: ALL`
pub fn check_selection_compatibility(
    selection: &TileSelection,
    roi_by_tiles: &[String],
    download: bool,
) -> TilingResult<()> {
    let roi_all = roi_by_tiles.iter().any(|t| t == ALL_TILES);
    if *selection == TileSelection::All && roi_all && download {
        return Err(TilingError::Config(
            "Cannot download with Tiles=ALL and ROI_by_tiles=ALL; list the tiles to process".to_string(),
        ));
    }
    Ok(())
}

/// Product footprints as geometries, skipping unreadable ones
fn product_geometries(products: &[RasterProduct]) -> Vec<(usize, Geometry)> {
    products
        .iter()
        .enumerate()
        .filter_map(|(i, product)| match Geometry::from_wkt(&product.footprint_wkt()) {
            Ok(geometry) => Some((i, geometry)),
            Err(e) => {
                log::warn!("Invalid footprint for {}: {}", product.name(), e);
                None
            }
        })
        .collect()
}

/// Grid tiles overlapped by at least one product by more than `min_ratio` of their area
pub fn tiles_covered_by_products(grid: &TileGrid, products: &[RasterProduct], min_ratio: f64) -> Vec<Tile> {
    let footprints = product_geometries(products);
    grid.tiles
        .iter()
        .filter(|tile| {
            footprints
                .iter()
                .any(|(_, footprint)| overlap_fraction(&tile.footprint, footprint) > min_ratio)
        })
        .cloned()
        .collect()
}

/// Tiles to process, in configuration order; unknown codes are skipped with a warning
pub fn select_tiles(
    selection: &TileSelection,
    grid: &TileGrid,
    products: &[RasterProduct],
    min_ratio: f64,
) -> Vec<Tile> {
    match selection {
        TileSelection::All => {
            let tiles = tiles_covered_by_products(grid, products, min_ratio);
            log::info!("{} tiles covered by the available products", tiles.len());
            tiles
        }
        TileSelection::Listed(names) => names
            .iter()
            .filter_map(|name| {
                let tile = name.parse::<TileCode>().ok().and_then(|code| grid.find(&code));
                if tile.is_none() {
                    log::warn!("Tile {} does not exist, skipping", name);
                }
                tile.cloned()
            })
            .collect(),
    }
}

/// Products whose footprint intersects `tile`
pub fn products_intersecting<'a>(tile: &Tile, products: &'a [RasterProduct]) -> Vec<&'a RasterProduct> {
    product_geometries(products)
        .into_iter()
        .filter(|(_, footprint)| tile.footprint.intersects(footprint))
        .map(|(i, _)| &products[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, size: f64) -> Geometry {
        let wkt = format!(
            "POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
            x0 = x0,
            y0 = y0,
            x1 = x0 + size,
            y1 = y0 + size
        );
        Geometry::from_wkt(&wkt).unwrap()
    }

    fn tile(code: &str, x0: f64, y0: f64) -> Tile {
        Tile {
            code: code.parse().unwrap(),
            footprint: square(x0, y0, 1.0),
        }
    }

    fn cell(name: &str, x0: f64, y0: f64, size: f64) -> ElevationTile {
        ElevationTile {
            name: name.to_string(),
            footprint: square(x0, y0, size),
        }
    }

    #[test]
    fn test_full_coverage_by_one_tile() {
        let t = tile("31TCJ", 1.2, 43.2);
        let coverage = elevation_coverage(&t, &[cell("N43E001.hgt", 1.0, 43.0, 2.0)]);
        assert_relative_eq!(coverage.ratio, 1.0, epsilon = 1e-9);
        assert_eq!(coverage.tile_names(), vec!["N43E001.hgt".to_string()]);
        assert!(coverage.is_complete());
    }

    #[test]
    fn test_no_coverage() {
        let t = tile("31TCJ", 1.2, 43.2);
        let coverage = elevation_coverage(&t, &[cell("S10W070.hgt", -70.0, -10.0, 1.0)]);
        assert_eq!(coverage.ratio, 0.0);
        assert!(coverage.contributions.is_empty());
    }

    #[test]
    fn test_partial_coverage_is_kept_and_accumulated() {
        let tiles = vec![tile("31TCJ", 1.5, 43.0), tile("31TCK", 10.0, 10.0)];
        let cells = vec![
            cell("N43E001.hgt", 1.0, 43.0, 1.0),
            cell("N43E002.hgt", 2.0, 43.0, 1.0),
            cell("N10E010.hgt", 10.0, 10.0, 0.5),
        ];
        let (coverages, needed) = needed_elevation_tiles(&tiles, &cells);

        assert_relative_eq!(coverages[0].ratio, 1.0, epsilon = 1e-9);
        assert_relative_eq!(coverages[0].contributions[0].1, 0.5, epsilon = 1e-9);
        assert_relative_eq!(coverages[1].ratio, 0.25, epsilon = 1e-9);
        assert_eq!(needed.len(), 3);
    }

    #[test]
    fn test_all_with_download_is_rejected() {
        let roi = vec![ALL_TILES.to_string()];
        assert!(check_selection_compatibility(&TileSelection::All, &roi, true).is_err());
        assert!(check_selection_compatibility(&TileSelection::All, &roi, false).is_ok());
        let listed = TileSelection::Listed(vec!["31TCJ".to_string()]);
        assert!(check_selection_compatibility(&listed, &roi, true).is_ok());
    }

    #[test]
    fn test_listed_selection_skips_unknown_tiles() {
        let grid = TileGrid {
            tiles: vec![tile("31TCJ", 0.0, 0.0), tile("31TCK", 1.0, 0.0)],
        };
        let selection = TileSelection::Listed(vec!["31TCK".to_string(), "99ZZZ".to_string(), "32ABC".to_string()]);
        let selected = select_tiles(&selection, &grid, &[], 0.5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].code.as_str(), "31TCK");
    }

    #[test]
    fn test_all_selection_uses_per_product_overlap() {
        let grid = TileGrid {
            tiles: vec![tile("31TCJ", 0.0, 0.0), tile("31TCK", 1.0, 0.0), tile("31TDJ", 5.0, 5.0)],
        };
        let product = |x0: f64| RasterProduct {
            safe_dir: std::path::PathBuf::from("S1A_IW_GRDH.SAFE"),
            platform: "s1a".to_string(),
            orbit_direction: crate::types::OrbitDirection::Descending,
            relative_orbit: 8,
            acquisition_start: chrono::NaiveDate::from_ymd_opt(2020, 1, 3)
                .unwrap()
                .and_hms_opt(17, 8, 15)
                .unwrap(),
            footprint: vec![(x0, 0.0), (x0 + 1.0, 0.0), (x0 + 1.0, 1.0), (x0, 1.0)],
            bands: Vec::new(),
        };
        // 31TCJ: 70% by one product; 31TCK: 30% + 30% by two products
        let products = vec![product(0.3), product(1.7)];

        let selected = select_tiles(&TileSelection::All, &grid, &products, 0.5);
        let codes: Vec<&str> = selected.iter().map(|t| t.code.as_str()).collect();
        assert_eq!(codes, vec!["31TCJ"]);

        let intersecting = products_intersecting(&grid.tiles[1], &products);
        assert_eq!(intersecting.len(), 2);
    }
}
