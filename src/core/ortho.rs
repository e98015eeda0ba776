//! Orthorectification onto the tile's UTM grid and metadata tagging

use crate::core::command::{CommandUnit, OtbCommand, OtbResources};
use crate::core::index::OutputIndex;
use crate::core::scheduler::{PoolReport, ProcessPool};
use crate::io::grid::Tile;
use crate::io::naming::{AcquisitionStamp, ImageKind, TileCode, TileImageName};
use crate::io::product::{BandFile, RasterProduct};
use crate::io::raster::set_metadata_items;
use crate::types::{CalibrationType, TilingResult};
use chrono::NaiveDate;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use std::path::{Path, PathBuf};

const TITLE: &str = "Orthorectification";

/// False northing of southern UTM zones
const SOUTH_FALSE_NORTHING: f64 = 10_000_000.0;

/// Output grid of one tile in its UTM zone
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGrid {
    pub ulx: f64,
    pub uly: f64,
    pub size_x: usize,
    pub size_y: usize,
    pub spacing: f64,
    pub utm_zone: u32,
    pub northern: bool,
}

impl OutputGrid {
    /// Grid from the UTM envelope `(min_x, max_x, min_y, max_y)` of the tile
    pub fn from_envelope(code: &TileCode, envelope: (f64, f64, f64, f64), spacing: f64) -> Self {
        let (min_x, max_x, mut min_y, mut max_y) = envelope;
        let northern = code.is_northern();
        if !northern {
            if min_y < 0.0 {
                min_y += SOUTH_FALSE_NORTHING;
            }
            if max_y < 0.0 {
                max_y += SOUTH_FALSE_NORTHING;
            }
        }
        let (ulx, uly, lrx, lry) = (min_x, max_y, max_x, min_y);

        Self {
            ulx,
            uly,
            size_x: ((lrx - ulx).abs() / spacing).round() as usize,
            size_y: ((lry - uly).abs() / spacing).round() as usize,
            spacing,
            utm_zone: code.utm_zone(),
            northern,
        }
    }

    /// Reproject the tile footprint from lon/lat to its UTM zone
    pub fn for_tile(tile: &Tile, spacing: f64) -> TilingResult<Self> {
        let source = SpatialRef::from_epsg(4326)?;
        source.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        let target = SpatialRef::from_epsg(tile.code.utm_epsg())?;
        let transform = CoordTransform::new(&source, &target)?;

        let projected = tile.footprint.transform(&transform)?;
        let envelope = projected.envelope();
        Ok(Self::from_envelope(
            &tile.code,
            (envelope.MinX, envelope.MaxX, envelope.MinY, envelope.MaxY),
            spacing,
        ))
    }
}

/// Orthorectification parameters
#[derive(Debug, Clone, PartialEq)]
pub struct OrthoParams {
    pub resolution: f64,
    pub grid_spacing: f64,
    pub geoid_file: PathBuf,
}

/// Canonical tile image name of a band once orthorectified on `tile`
pub fn output_name(product: &RasterProduct, band: &BandFile, tile: &TileCode) -> TileImageName {
    TileImageName {
        platform: band.name.platform.clone(),
        tile: tile.clone(),
        polarization: band.polarization(),
        orbit_direction: product.orbit_direction,
        relative_orbit: product.relative_orbit,
        stamp: AcquisitionStamp::Instant(band.name.start),
        kind: ImageKind::Backscatter,
    }
}

/// Projects `_OrthoReady` bands onto the tile grid
pub struct Orthorectifier {
    params: OrthoParams,
    resources: OtbResources,
}

impl Orthorectifier {
    pub fn new(params: OrthoParams, resources: OtbResources) -> Self {
        Self { params, resources }
    }

    pub fn command_for(&self, input: &Path, output: &Path, grid: &OutputGrid, elevation_dir: &Path) -> CommandUnit {
        OtbCommand::new("otbcli_OrthoRectification", self.resources)
            .ram_flag("-opt.ram")
            .arg("-io.in", input.to_string_lossy())
            .arg("-io.out", format!("{}?&writegeom=false", output.to_string_lossy()))
            .arg("-interpolator", "nn")
            .arg("-outputs.spacingx", self.params.resolution)
            .arg("-outputs.spacingy", -self.params.resolution)
            .arg("-outputs.sizex", grid.size_x)
            .arg("-outputs.sizey", grid.size_y)
            .arg("-opt.gridspacing", self.params.grid_spacing)
            .arg("-map", "utm")
            .arg("-map.utm.zone", grid.utm_zone)
            .arg("-map.utm.northhem", grid.northern)
            .arg("-outputs.ulx", grid.ulx)
            .arg("-outputs.uly", grid.uly)
            .path("-elev.dem", elevation_dir)
            .path("-elev.geoid", &self.params.geoid_file)
            .build(TITLE)
    }

    /// Commands for every trimmed band without an output (or composite) in the tile
    pub fn commands(
        &self,
        tile: &TileCode,
        grid: &OutputGrid,
        products: &[&RasterProduct],
        index: &OutputIndex,
        elevation_dir: &Path,
    ) -> Vec<CommandUnit> {
        let mut commands = Vec::new();
        for product in products {
            for band in &product.bands {
                let input = band.ortho_ready_path();
                if !input.exists() {
                    continue;
                }
                let name = output_name(product, band, tile);
                if index.has_output_for(&name) {
                    log::debug!("{} already orthorectified", name);
                    continue;
                }
                commands.push(self.command_for(&input, &index.path_of(&name), grid, elevation_dir));
            }
        }
        commands
    }

    pub fn run(
        &self,
        pool: &ProcessPool,
        tile: &Tile,
        products: &[&RasterProduct],
        tile_dir: &Path,
        elevation_dir: &Path,
    ) -> TilingResult<PoolReport> {
        let grid = OutputGrid::for_tile(tile, self.params.resolution)?;
        log::debug!("Output grid for {}: {:?}", tile.code, grid);

        let index = OutputIndex::scan(tile_dir)?;
        let commands = self.commands(&tile.code, &grid, products, &index, elevation_dir);
        log::info!("Orthorectifying {} bands onto {}", commands.len(), tile.code);
        pool.run(&commands)
    }
}

/// Metadata items of a canonical tile image, all derived from its name
pub fn metadata_items(
    image: &TileImageName,
    calibration: CalibrationType,
    resolution: f64,
    processed: NaiveDate,
) -> Vec<(&'static str, String)> {
    vec![
        ("S2_TILE_CORRESPONDING_CODE", image.tile.to_string()),
        ("PROCESSED_DATETIME", processed.format("%Y:%m:%d").to_string()),
        ("ORTHORECTIFIED", "true".to_string()),
        ("CALIBRATION", calibration.lut_name().to_string()),
        ("SPATIAL_RESOLUTION", resolution.to_string()),
        ("IMAGE_TYPE", "GRD".to_string()),
        ("FLYING_UNIT_CODE", image.platform.clone()),
        ("POLARIZATION", image.polarization.file_token().to_string()),
        ("ORBIT", format!("{:03}", image.relative_orbit)),
        ("ORBIT_DIRECTION", image.orbit_direction.code().to_string()),
        ("ACQUISITION_DATETIME", image.stamp.metadata_value()),
    ]
}

/// Tag every canonical image of the tile directory, border masks included,
/// returning how many were tagged
pub fn tag_tile_images(tile_dir: &Path, calibration: CalibrationType, resolution: f64) -> TilingResult<usize> {
    let index = OutputIndex::scan(tile_dir)?;
    let today = chrono::Local::now().date_naive();
    let mut tagged = 0;

    for image in index.images() {
        let path = index.path_of(image);
        match set_metadata_items(&path, &metadata_items(image, calibration, resolution, today)) {
            Ok(()) => tagged += 1,
            Err(e) => log::warn!("Cannot tag {}: {}", path.display(), e),
        }
    }
    log::info!("Tagged {} images in {}", tagged, tile_dir.display());
    Ok(tagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_from_northern_envelope() {
        let code: TileCode = "31TCJ".parse().unwrap();
        let grid = OutputGrid::from_envelope(&code, (300000.0, 409800.0, 4790200.0, 4900000.0), 10.0);

        assert_relative_eq!(grid.ulx, 300000.0);
        assert_relative_eq!(grid.uly, 4900000.0);
        assert_eq!(grid.size_x, 10980);
        assert_eq!(grid.size_y, 10980);
        assert_eq!(grid.utm_zone, 31);
        assert!(grid.northern);
    }

    #[test]
    fn test_grid_from_southern_envelope() {
        let code: TileCode = "55HBU".parse().unwrap();
        let grid = OutputGrid::from_envelope(&code, (199980.0, 309780.0, -4200000.0, -4090200.0), 20.0);

        assert!(!grid.northern);
        assert_relative_eq!(grid.uly, 5909800.0);
        assert_eq!(grid.size_x, 5490);
        assert_eq!(grid.size_y, 5490);
    }

    #[test]
    fn test_ortho_command_flags() {
        let params = OrthoParams {
            resolution: 10.0,
            grid_spacing: 40.0,
            geoid_file: PathBuf::from("/geoid/egm96.grd"),
        };
        let grid = OutputGrid {
            ulx: 300000.0,
            uly: 4900000.0,
            size_x: 10980,
            size_y: 10980,
            spacing: 10.0,
            utm_zone: 31,
            northern: true,
        };
        let unit = Orthorectifier::new(params, OtbResources::default()).command_for(
            Path::new("/raw/band_OrthoReady.tiff"),
            Path::new("/out/31TCJ/s1a_31TCJ_vv_DES_008_20200103t170815.tif"),
            &grid,
            Path::new("/tmp/srtm_x"),
        );
        let line = unit.command_line;

        assert!(line.contains("otbcli_OrthoRectification -opt.ram 4096"));
        assert!(line.contains("-io.out '/out/31TCJ/s1a_31TCJ_vv_DES_008_20200103t170815.tif?&writegeom=false'"));
        assert!(line.contains("-outputs.spacingx 10 -outputs.spacingy -10"));
        assert!(line.contains("-outputs.sizex 10980 -outputs.sizey 10980 -opt.gridspacing 40"));
        assert!(line.contains("-map utm -map.utm.zone 31 -map.utm.northhem true"));
        assert!(line.contains("-outputs.ulx 300000 -outputs.uly 4900000"));
        assert!(line.ends_with("-elev.dem /tmp/srtm_x -elev.geoid /geoid/egm96.grd"));
    }

    #[test]
    fn test_metadata_items_from_name() {
        let image: TileImageName = "s1b_31TCJ_vh_ASC_030_20200104txxxxxx.tif".parse().unwrap();
        let processed = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        let items = metadata_items(&image, CalibrationType::Sigma0, 10.0, processed);
        let get = |key: &str| items.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());

        assert_eq!(get("S2_TILE_CORRESPONDING_CODE"), Some("31TCJ"));
        assert_eq!(get("PROCESSED_DATETIME"), Some("2021:06:01"));
        assert_eq!(get("CALIBRATION"), Some("sigma"));
        assert_eq!(get("FLYING_UNIT_CODE"), Some("s1b"));
        assert_eq!(get("POLARIZATION"), Some("vh"));
        assert_eq!(get("ORBIT"), Some("030"));
        assert_eq!(get("ORBIT_DIRECTION"), Some("ASC"));
        assert_eq!(get("ACQUISITION_DATETIME"), Some("2020:01:04 00:00:00"));
    }

    #[test]
    fn test_tagging_includes_border_masks() {
        use gdal::{Dataset, DriverManager, Metadata};

        let dir = tempfile::tempdir().unwrap();
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        for name in [
            "s1a_31TCJ_vv_DES_008_20200103t170815.tif",
            "s1a_31TCJ_vv_DES_008_20200103t170815_BorderMask.tif",
        ] {
            driver
                .create_with_band_type::<u8, _>(dir.path().join(name), 4, 4, 1)
                .unwrap();
        }

        let tagged = tag_tile_images(dir.path(), CalibrationType::Gamma0, 10.0).unwrap();
        assert_eq!(tagged, 2);

        let mask = Dataset::open(dir.path().join("s1a_31TCJ_vv_DES_008_20200103t170815_BorderMask.tif")).unwrap();
        assert_eq!(mask.metadata_item("POLARIZATION", ""), Some("vv".to_string()));
        assert_eq!(mask.metadata_item("ORBIT_DIRECTION", ""), Some("DES".to_string()));
        assert_eq!(mask.metadata_item("S2_TILE_CORRESPONDING_CODE", ""), Some("31TCJ".to_string()));
    }
}
