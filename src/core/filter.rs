//! Multi-temporal speckle filtering of a tile's time series

use crate::config::FilteringSettings;
use crate::core::command::{shell_quote, CommandUnit, OtbCommand, OtbResources};
use crate::core::index::OutputIndex;
use crate::core::scheduler::ProcessPool;
use crate::io::naming::TileImageName;
use crate::types::{OrbitDirection, Polarization, TilingResult};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sub-directory of the tile directory receiving filtered images
pub const FILTERED_DIR: &str = "filtered";

/// Images sharing polarization and pass are filtered together
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesKey {
    pub polarization: Polarization,
    pub orbit_direction: OrbitDirection,
    pub relative_orbit: u16,
}

impl SeriesKey {
    fn of(image: &TileImageName) -> Self {
        Self {
            polarization: image.polarization,
            orbit_direction: image.orbit_direction,
            relative_orbit: image.relative_orbit,
        }
    }

    fn suffix(&self) -> String {
        format!(
            "{}_{}_{:03}",
            self.polarization.file_token(),
            self.orbit_direction.code(),
            self.relative_orbit
        )
    }

    pub fn outcore_path(&self, filtered_dir: &Path) -> PathBuf {
        filtered_dir.join(format!("Outcore_{}.tif", self.suffix()))
    }

    pub fn enl_path(&self, filtered_dir: &Path) -> PathBuf {
        filtered_dir.join(format!("enl_{}.tif", self.suffix()))
    }
}

/// The tile's time series: composites plus acquisitions left unmerged, oldest first
pub fn time_series(index: &OutputIndex) -> BTreeMap<SeriesKey, Vec<PathBuf>> {
    let mut dated: BTreeMap<SeriesKey, Vec<(NaiveDate, String)>> = BTreeMap::new();
    for image in index.backscatter_images() {
        dated
            .entry(SeriesKey::of(image))
            .or_default()
            .push((image.stamp.date(), image.to_string()));
    }
    dated
        .into_iter()
        .map(|(key, mut images)| {
            images.sort();
            let paths = images
                .into_iter()
                .map(|(_, file_name)| index.tile_dir().join(file_name))
                .collect();
            (key, paths)
        })
        .collect()
}

pub struct TemporalFilter {
    settings: FilteringSettings,
    resources: OtbResources,
}

impl TemporalFilter {
    pub fn new(settings: FilteringSettings, resources: OtbResources) -> Self {
        Self { settings, resources }
    }

    pub fn outcore_command(&self, key: &SeriesKey, images: &[PathBuf], filtered_dir: &Path) -> CommandUnit {
        OtbCommand::new("otbcli_MultitempFilteringOutcore", self.resources)
            .paths("-inl", images)
            .arg("-wr", self.settings.window_radius)
            .path("-oc", &key.outcore_path(filtered_dir))
            .build("Outcore")
    }

    /// Filtered images are written to the working directory of the command,
    /// so every path given here must be absolute
    pub fn filter_command(&self, key: &SeriesKey, images: &[PathBuf], filtered_dir: &Path) -> CommandUnit {
        let otb = OtbCommand::new("otbcli_MultitempFilteringFilter", self.resources)
            .paths("-inl", images)
            .path("-inoc", &key.outcore_path(filtered_dir))
            .arg("-wr", self.settings.window_radius)
            .path("-enl", &key.enl_path(filtered_dir));
        CommandUnit::new(
            "Filtering",
            format!(
                "cd {} && {{ {}; }}",
                shell_quote(&filtered_dir.to_string_lossy()),
                otb.command_line()
            ),
        )
    }

    pub fn run(&self, pool: &ProcessPool, tile_dir: &Path) -> TilingResult<()> {
        // the filter command changes directory
        let tile_dir = std::fs::canonicalize(tile_dir)?;
        let tile_dir = tile_dir.as_path();
        let index = OutputIndex::scan(tile_dir)?;
        let series = time_series(&index);
        if series.is_empty() {
            return Ok(());
        }
        let filtered_dir = tile_dir.join(FILTERED_DIR);
        std::fs::create_dir_all(&filtered_dir)?;

        let outcores: Vec<CommandUnit> = series
            .iter()
            .filter(|(key, _)| self.settings.reset_outcore || !key.outcore_path(&filtered_dir).exists())
            .map(|(key, images)| self.outcore_command(key, images, &filtered_dir))
            .collect();
        log::info!("Computing {} outcore images", outcores.len());
        pool.run(&outcores)?;

        let filters: Vec<CommandUnit> = series
            .iter()
            .filter(|(key, _)| key.outcore_path(&filtered_dir).exists())
            .map(|(key, images)| self.filter_command(key, images, &filtered_dir))
            .collect();
        log::info!("Filtering {} time series", filters.len());
        pool.run(&filters)?;
        Ok(())
    }
}
