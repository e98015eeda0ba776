//! Run orchestration: tile selection, auxiliary data checks and the per-tile
//! stage sequence.
//!
//! ```text
//! SELECT_TILES -> CHECK_AUX_COVERAGE -> for each tile {
//!     ACQUIRE_INPUTS -> CALIBRATE -> TRIM -> ORTHORECTIFY -> TAG_METADATA
//!     -> [BORDER_MASK] -> CONCATENATE -> [FILTER] -> CLEAN_SCRATCH }
//! ```
//!
//! Stages only communicate through the filesystem; each one skips the work
//! whose outputs already exist, so an interrupted run can simply be restarted.

use crate::config::Configuration;
use crate::core::border::{BorderMaskGenerator, BorderTrimParams, BorderTrimmer};
use crate::core::calibrate::{CalibrationParams, Calibrator};
use crate::core::concat::Concatenator;
use crate::core::coverage::{
    check_selection_compatibility, needed_elevation_tiles, products_intersecting, select_tiles, ElevationCoverage,
};
use crate::core::filter::TemporalFilter;
use crate::core::ortho::{tag_tile_images, OrthoParams, Orthorectifier};
use crate::core::scheduler::ProcessPool;
use crate::io::dem::{missing_elevation_tiles, ElevationArena};
use crate::io::grid::{load_elevation_grid, load_tile_grid, Tile};
use crate::io::naming::TileCode;
use crate::io::product::{extract_archives, prune_raw_directory, scan_products, ProductFilter};
use crate::types::{TilingError, TilingResult};
use std::path::{Path, PathBuf};

/// Options of one run that do not come from the configuration file
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Extract `*.zip` archives of the raw directory first
    pub extract_archives: bool,
}

/// What happened to one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutcome {
    pub tile: TileCode,
    pub products: usize,
    pub elevation_ratio: f64,
    /// No intersecting product
    pub skipped: bool,
    /// Error that stopped the tile; the run went on with the next one
    pub error: Option<String>,
}

impl TileOutcome {
    fn new(tile: &Tile, coverage: &ElevationCoverage) -> Self {
        Self {
            tile: tile.code.clone(),
            products: 0,
            elevation_ratio: coverage.ratio,
            skipped: true,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.skipped && self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub tiles: Vec<TileOutcome>,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.tiles.iter().filter(|t| t.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.tiles.iter().filter(|t| t.error.is_some()).count()
    }
}

/// Drives every stage of the chain for the configured tiles
pub struct Pipeline {
    config: Configuration,
    pool: ProcessPool,
}

impl Pipeline {
    pub fn new(config: Configuration) -> Self {
        let pool = ProcessPool::new(config.max_parallel, config.mode, &config.log_dir);
        Self { config, pool }
    }

    /// Interpret command lines with another shell
    pub fn with_shell(mut self, shell: &Path) -> Self {
        self.pool = self.pool.with_shell(shell);
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    fn product_filter(&self) -> ProductFilter {
        ProductFilter {
            first_date: self.config.first_date,
            last_date: self.config.last_date,
            polarizations: self.config.polarizations.clone(),
        }
    }

    /// Checks done before any tile is touched
    fn select(&self) -> TilingResult<Vec<Tile>> {
        let config = &self.config;
        check_selection_compatibility(&config.tiles, &config.roi_by_tiles, config.download)?;

        let grid = load_tile_grid(&config.tiles_shapefile)?;
        let products = scan_products(&config.raw_dir, &self.product_filter())?;
        let tiles = select_tiles(&config.tiles, &grid, &products, config.tile_overlap_ratio);
        if tiles.is_empty() {
            return Err(TilingError::Config("No existing tiles found, exiting".to_string()));
        }
        Ok(tiles)
    }

    /// Elevation coverage of every tile; missing elevation data or geoid is fatal
    fn check_auxiliary_data(&self, tiles: &[Tile]) -> TilingResult<Vec<ElevationCoverage>> {
        let config = &self.config;
        let elevation_grid = load_elevation_grid(&config.elevation_shapefile)?;
        let (coverages, needed) = needed_elevation_tiles(tiles, &elevation_grid);

        let missing = missing_elevation_tiles(&config.elevation_dir, &needed);
        if !missing.is_empty() {
            return Err(TilingError::MissingElevation(format!(
                "{} tiles missing from {}: {}",
                missing.len(),
                config.elevation_dir.display(),
                missing.join(", ")
            )));
        }
        log::info!("Required elevation tiles: {}", needed.iter().cloned().collect::<Vec<_>>().join(" "));

        if !config.geoid_file.exists() {
            return Err(TilingError::Config(format!(
                "Geoid file does not exist: {}",
                config.geoid_file.display()
            )));
        }
        Ok(coverages)
    }

    /// Run the whole chain
    pub fn run(&self, options: RunOptions) -> TilingResult<RunSummary> {
        std::fs::create_dir_all(&self.config.log_dir)?;
        if options.extract_archives {
            let count = extract_archives(&self.config.raw_dir)?;
            log::info!("Extracted {} archives", count);
        }

        let tiles = self.select()?;
        let coverages = self.check_auxiliary_data(&tiles)?;

        let mut summary = RunSummary::default();
        let total = tiles.len();
        for (i, (tile, coverage)) in tiles.iter().zip(&coverages).enumerate() {
            log::info!("Tile: {} ({}/{})", tile.code, i + 1, total);
            let outcome = match self.process_tile(tile, coverage) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Tile {} failed: {}", tile.code, e);
                    TileOutcome {
                        skipped: false,
                        error: Some(e.to_string()),
                        ..TileOutcome::new(tile, coverage)
                    }
                }
            };
            summary.tiles.push(outcome);
        }

        log::info!("Processed {} of {} tiles", summary.processed(), total);
        if summary.failed() > 0 {
            log::warn!("{} tiles failed", summary.failed());
        }
        Ok(summary)
    }

    fn tile_dir(&self, tile: &Tile) -> PathBuf {
        self.config.output_dir.join(tile.code.as_str())
    }

    fn process_tile(&self, tile: &Tile, coverage: &ElevationCoverage) -> TilingResult<TileOutcome> {
        let config = &self.config;
        let mut outcome = TileOutcome::new(tile, coverage);

        let removed = prune_raw_directory(&config.raw_dir, config.raw_retention)?;
        if !removed.is_empty() {
            log::info!("Removed {} old raw products", removed.len());
        }

        let products = scan_products(&config.raw_dir, &self.product_filter())?;
        let intersecting = products_intersecting(tile, &products);
        if intersecting.is_empty() {
            log::warn!("No product intersects tile {}, skipping", tile.code);
            return Ok(outcome);
        }
        outcome.products = intersecting.len();
        for product in &intersecting {
            log::info!("Using {}", product.name());
        }

        let tile_dir = self.tile_dir(tile);
        std::fs::create_dir_all(&tile_dir)?;
        // stage commands may run from another directory
        let tile_dir = std::fs::canonicalize(&tile_dir)?;
        let resources = config.resources;

        let calibration = CalibrationParams {
            calibration: config.calibration,
            remove_thermal_noise: config.remove_thermal_noise,
        };
        Calibrator::new(calibration, resources).run(&self.pool, &intersecting)?;
        BorderTrimmer::new(BorderTrimParams::default(), resources).run(&self.pool, &intersecting)?;

        // dropped on early return
        let arena = ElevationArena::populate(&config.scratch_dir, &config.elevation_dir, &coverage.tile_names())?;

        let ortho = OrthoParams {
            resolution: config.output_resolution,
            grid_spacing: config.grid_spacing,
            geoid_file: config.geoid_file.clone(),
        };
        Orthorectifier::new(ortho, resources).run(&self.pool, tile, &intersecting, &tile_dir, arena.path())?;
        tag_tile_images(&tile_dir, config.calibration, config.output_resolution)?;

        if config.border_mask {
            BorderMaskGenerator::new(resources).run(&self.pool, &tile_dir)?;
        }
        Concatenator::new(config.border_mask, resources).run(&self.pool, &tile_dir)?;
        // composites written by the concatenation
        tag_tile_images(&tile_dir, config.calibration, config.output_resolution)?;

        if config.filtering.enabled {
            TemporalFilter::new(config.filtering.clone(), resources).run(&self.pool, &tile_dir)?;
        }

        arena.release()?;
        outcome.skipped = false;
        Ok(outcome)
    }
}

/// Load, validate and run a configuration file
pub fn run_from_file(config_path: &Path, options: RunOptions) -> TilingResult<RunSummary> {
    let config = Configuration::from_file(config_path)?;
    Pipeline::new(config).run(options)
}
