//! Run configuration loaded from an INI file.
//!
//! Section and key names follow the historical `S1Processor.cfg` layout;
//! lookups are case-insensitive. [`parse_ini`] is the single place where keys
//! are mapped to fields, [`Configuration::validate`] performs the filesystem
//! checks that make a run fatal.

use crate::core::command::OtbResources;
use crate::types::{CalibrationType, Polarization, TilingError, TilingResult};
use chrono::NaiveDate;
use ini::{Ini, Properties};
use std::path::{Path, PathBuf};

/// Sentinel value selecting every tile covered by the available products
pub const ALL_TILES: &str = "ALL";

pub const DEFAULT_OUTPUT_RESOLUTION: f64 = 10.0;
pub const DEFAULT_GRID_SPACING: f64 = 40.0;
pub const DEFAULT_TILE_OVERLAP_RATIO: f64 = 0.5;
pub const DEFAULT_PARALLEL_PROCESSES: usize = 2;
pub const DEFAULT_RAM_PER_PROCESS: u32 = 4096;
pub const DEFAULT_RAW_RETENTION: usize = 500;
pub const DEFAULT_WINDOW_RADIUS: u32 = 2;

/// Where child processes write their standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// stdout discarded, stderr appended to the error log
    #[default]
    Quiet,
    /// stdout and stderr appended to log files
    Logging,
    /// streams inherited from the parent
    Debug,
}

impl OutputMode {
    /// `Mode` is matched by substring, `debug` winning over `logging`
    pub fn from_mode_string(mode: &str) -> Self {
        let mode = mode.to_lowercase();
        if mode.contains("debug") {
            OutputMode::Debug
        } else if mode.contains("logging") {
            OutputMode::Logging
        } else {
            OutputMode::Quiet
        }
    }
}

/// Which tiles to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSelection {
    /// Every grid tile sufficiently covered by the available products
    All,
    Listed(Vec<String>),
}

impl TileSelection {
    fn from_names(names: Vec<String>) -> Self {
        if names.iter().any(|n| n == ALL_TILES) {
            TileSelection::All
        } else {
            TileSelection::Listed(names)
        }
    }
}

/// Multi-temporal filtering settings
#[derive(Debug, Clone, PartialEq)]
pub struct FilteringSettings {
    pub enabled: bool,
    pub reset_outcore: bool,
    pub window_radius: u32,
}

impl Default for FilteringSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            reset_outcore: true,
            window_radius: DEFAULT_WINDOW_RADIUS,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    pub output_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub elevation_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub geoid_file: PathBuf,
    pub log_dir: PathBuf,

    pub download: bool,
    pub roi_by_tiles: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub polarizations: Vec<Polarization>,

    pub border_mask: bool,

    pub calibration: CalibrationType,
    pub remove_thermal_noise: bool,
    pub output_resolution: f64,
    pub grid_spacing: f64,
    pub tiles_shapefile: PathBuf,
    pub elevation_shapefile: PathBuf,
    pub tiles: TileSelection,
    pub tile_overlap_ratio: f64,
    pub mode: OutputMode,
    pub max_parallel: usize,
    pub resources: OtbResources,
    pub raw_retention: usize,

    pub filtering: FilteringSettings,
}

impl Configuration {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> TilingResult<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| TilingError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = parse_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that make the whole run fatal when they fail
    pub fn validate(&self) -> TilingResult<()> {
        for (label, path) in [
            ("tmp", &self.scratch_dir),
            ("S1Images", &self.raw_dir),
            ("TilesShapefile", &self.tiles_shapefile),
            ("SRTMShapefile", &self.elevation_shapefile),
        ] {
            if !path.exists() {
                return Err(TilingError::Config(format!("{} is a wrong path ({})", path.display(), label)));
            }
        }

        if let (Some(first), Some(last)) = (self.first_date, self.last_date) {
            if first > last {
                return Err(TilingError::Config(format!(
                    "first_date {} is after last_date {}",
                    first, last
                )));
            }
        }
        if !(self.tile_overlap_ratio > 0.0 && self.tile_overlap_ratio <= 1.0) {
            return Err(TilingError::Config(format!(
                "TileToProductOverlapRatio must be in (0, 1], got {}",
                self.tile_overlap_ratio
            )));
        }
        if self.output_resolution <= 0.0 || self.grid_spacing <= 0.0 {
            return Err(TilingError::Config(
                "OutputSpatialResolution and Orthorectification_gridspacing must be positive".to_string(),
            ));
        }
        if self.max_parallel == 0 {
            return Err(TilingError::Config("NbParallelProcesses must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn lookup<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    let properties: &Properties = ini
        .iter()
        .find(|(name, _)| name.map_or(false, |n| n.eq_ignore_ascii_case(section)))
        .map(|(_, props)| props)?;
    properties
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

fn required<'a>(ini: &'a Ini, section: &str, key: &str) -> TilingResult<&'a str> {
    lookup(ini, section, key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TilingError::Config(format!("Missing required option {}.{}", section, key)))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> TilingError {
    TilingError::Config(format!("Invalid {}.{} = '{}': {}", section, key, value, reason))
}

fn parse_value<T: std::str::FromStr>(ini: &Ini, section: &str, key: &str, default: T) -> TilingResult<T> {
    match lookup(ini, section, key) {
        Some(v) if !v.is_empty() => v.parse().map_err(|_| invalid(section, key, v, "not a valid number")),
        _ => Ok(default),
    }
}

fn parse_bool(ini: &Ini, section: &str, key: &str, default: bool) -> TilingResult<bool> {
    match lookup(ini, section, key) {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            "" => Ok(default),
            _ => Err(invalid(section, key, v, "expected true or false")),
        },
    }
}

fn parse_date(ini: &Ini, section: &str, key: &str) -> TilingResult<Option<NaiveDate>> {
    match lookup(ini, section, key) {
        Some(v) if !v.is_empty() => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, v, "invalid date, expected YYYY-MM-DD")),
        _ => Ok(None),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_tiles(ini: &Ini) -> TilingResult<TileSelection> {
    if let Some(list_file) = lookup(ini, "Processing", "TilesListInFile").filter(|v| !v.is_empty()) {
        let content = std::fs::read_to_string(list_file)
            .map_err(|e| TilingError::Config(format!("Cannot read tiles list {}: {}", list_file, e)))?;
        let names = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        return Ok(TileSelection::from_names(names));
    }
    let tiles = required(ini, "Processing", "Tiles")?;
    Ok(TileSelection::from_names(split_list(tiles)))
}

/// Map an `Ini` onto a [`Configuration`], without filesystem validation
pub fn parse_ini(ini: &Ini) -> TilingResult<Configuration> {
    let calibration_value = lookup(ini, "Processing", "Calibration").unwrap_or("sigma");
    let calibration = calibration_value
        .parse::<CalibrationType>()
        .map_err(|_| invalid("Processing", "Calibration", calibration_value, "expected sigma, beta, gamma or dn"))?;

    let polarizations = match lookup(ini, "PEPS", "Polarisation") {
        Some(v) => split_list(v)
            .iter()
            .map(|p| p.parse::<Polarization>())
            .collect::<TilingResult<Vec<_>>>()
            .map_err(|_| invalid("PEPS", "Polarisation", v, "expected VV, VH, HV or HH"))?,
        None => Vec::new(),
    };

    let first_date = parse_date(ini, "PEPS", "first_date")?;
    let last_date = parse_date(ini, "PEPS", "last_date")?;

    Ok(Configuration {
        output_dir: PathBuf::from(required(ini, "Paths", "Output")?),
        raw_dir: PathBuf::from(required(ini, "Paths", "S1Images")?),
        elevation_dir: PathBuf::from(required(ini, "Paths", "SRTM")?),
        scratch_dir: PathBuf::from(required(ini, "Paths", "tmp")?),
        geoid_file: PathBuf::from(required(ini, "Paths", "GeoidFile")?),
        log_dir: PathBuf::from(lookup(ini, "Paths", "LogDirectory").unwrap_or(".")),

        download: parse_bool(ini, "PEPS", "Download", false)?,
        roi_by_tiles: split_list(lookup(ini, "PEPS", "ROI_by_tiles").unwrap_or(ALL_TILES)),
        first_date,
        last_date,
        polarizations,

        border_mask: parse_bool(ini, "Mask", "Generate_border_mask", false)?,

        calibration,
        remove_thermal_noise: parse_bool(ini, "Processing", "Remove_thermal_noise", false)?,
        output_resolution: parse_value(ini, "Processing", "OutputSpatialResolution", DEFAULT_OUTPUT_RESOLUTION)?,
        grid_spacing: parse_value(ini, "Processing", "Orthorectification_gridspacing", DEFAULT_GRID_SPACING)?,
        tiles_shapefile: PathBuf::from(required(ini, "Processing", "TilesShapefile")?),
        elevation_shapefile: PathBuf::from(required(ini, "Processing", "SRTMShapefile")?),
        tiles: parse_tiles(ini)?,
        tile_overlap_ratio: parse_value(ini, "Processing", "TileToProductOverlapRatio", DEFAULT_TILE_OVERLAP_RATIO)?,
        mode: OutputMode::from_mode_string(lookup(ini, "Processing", "Mode").unwrap_or("")),
        max_parallel: parse_value(ini, "Processing", "NbParallelProcesses", DEFAULT_PARALLEL_PROCESSES)?,
        resources: OtbResources {
            ram_mb: parse_value(ini, "Processing", "RAMPerProcess", DEFAULT_RAM_PER_PROCESS)?,
            threads: parse_value(ini, "Processing", "OTBNbThreads", 1)?,
        },
        raw_retention: parse_value(ini, "Processing", "RawRetention", DEFAULT_RAW_RETENTION)?,

        filtering: FilteringSettings {
            enabled: parse_bool(ini, "Filtering", "Filtering_activated", false)?,
            reset_outcore: parse_bool(ini, "Filtering", "Reset_outcore", true)?,
            window_radius: parse_value(ini, "Filtering", "Window_radius", DEFAULT_WINDOW_RADIUS)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[Paths]
Output = /data/out
S1Images = /data/raw
SRTM = /data/srtm
tmp = /data/tmp
GeoidFile = /data/egm96.grd

[PEPS]
Download = False
ROI_by_tiles = ALL
first_date = 2020-01-01
last_date = 2020-03-01
Polarisation = VV VH

[Mask]
Generate_border_mask = True

[Processing]
Calibration = gamma
Remove_thermal_noise = True
OutputSpatialResolution = 20.
Orthorectification_gridspacing = 80
TilesShapefile = /data/Features.shp
SRTMShapefile = /data/srtm.shp
Tiles = 31TCJ, 31TCK
TileToProductOverlapRatio = 0.7
Mode = logging
NbParallelProcesses = 6
RAMPerProcess = 2048
OTBNbThreads = 4

[Filtering]
Filtering_activated = false
Reset_outcore = False
Window_radius = 3
"#;

    #[test]
    fn test_parse_sample_configuration() {
        let ini = Ini::load_from_str(SAMPLE).unwrap();
        let config = parse_ini(&ini).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/data/out"));
        assert_eq!(config.calibration, CalibrationType::Gamma0);
        assert!(config.remove_thermal_noise);
        assert!(config.border_mask);
        assert_eq!(config.output_resolution, 20.0);
        assert_eq!(config.grid_spacing, 80.0);
        assert_eq!(
            config.tiles,
            TileSelection::Listed(vec!["31TCJ".to_string(), "31TCK".to_string()])
        );
        assert_eq!(config.polarizations, vec![Polarization::VV, Polarization::VH]);
        assert_eq!(config.first_date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(config.mode, OutputMode::Logging);
        assert_eq!(config.max_parallel, 6);
        assert_eq!(config.resources, OtbResources { ram_mb: 2048, threads: 4 });
        assert_eq!(config.raw_retention, DEFAULT_RAW_RETENTION);
        assert_eq!(config.roi_by_tiles, vec![ALL_TILES.to_string()]);
        assert!(!config.filtering.reset_outcore);
        assert_eq!(config.filtering.window_radius, 3);
    }

    #[test]
    fn test_all_tiles_and_modes() {
        let ini = Ini::load_from_str(&SAMPLE.replace("Tiles = 31TCJ, 31TCK", "Tiles = ALL")).unwrap();
        assert_eq!(parse_ini(&ini).unwrap().tiles, TileSelection::All);

        assert_eq!(OutputMode::from_mode_string("debug logging"), OutputMode::Debug);
        assert_eq!(OutputMode::from_mode_string("Normal"), OutputMode::Quiet);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_date = SAMPLE.replace("first_date = 2020-01-01", "first_date = 2020-13-45");
        assert!(parse_ini(&Ini::load_from_str(&bad_date).unwrap()).is_err());

        let bad_lut = SAMPLE.replace("Calibration = gamma", "Calibration = lambda");
        assert!(parse_ini(&Ini::load_from_str(&bad_lut).unwrap()).is_err());

        let missing_output = SAMPLE.replace("Output = /data/out", "");
        assert!(parse_ini(&Ini::load_from_str(&missing_output).unwrap()).is_err());
    }

    #[test]
    fn test_validation_of_paths_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let shapefile = dir.path().join("grid.shp");
        std::fs::write(&shapefile, b"").unwrap();

        let ini = Ini::load_from_str(SAMPLE).unwrap();
        let mut config = parse_ini(&ini).unwrap();
        assert!(config.validate().is_err());

        config.scratch_dir = dir.path().to_path_buf();
        config.raw_dir = dir.path().to_path_buf();
        config.tiles_shapefile = shapefile.clone();
        config.elevation_shapefile = shapefile;
        config.validate().unwrap();

        config.last_date = NaiveDate::from_ymd_opt(2019, 12, 31);
        assert!(config.validate().is_err());
    }
}
