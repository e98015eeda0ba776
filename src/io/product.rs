use crate::io::naming::MeasurementName;
use crate::types::{OrbitDirection, Polarization, TilingError, TilingResult};
use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const MANIFEST_FILE: &str = "manifest.safe";
const MEASUREMENT_DIR: &str = "measurement";

/// Suffixes of the per-band derivatives written next to the raw band
pub const CALIBRATED_SUFFIX: &str = "_calOk";
pub const TRIM_MASK_SUFFIX: &str = "_mask";
pub const ORTHO_READY_SUFFIX: &str = "_OrthoReady";

const DERIVATIVE_SUFFIXES: [&str; 3] = [CALIBRATED_SUFFIX, TRIM_MASK_SUFFIX, ORTHO_READY_SUFFIX];

/// One measurement band of a product, plus the paths of its derivatives
#[derive(Debug, Clone, PartialEq)]
pub struct BandFile {
    pub path: PathBuf,
    pub name: MeasurementName,
}

impl BandFile {
    fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.path.with_file_name(format!("{}{}.tiff", stem, suffix))
    }

    /// Radiometrically calibrated band
    pub fn calibrated_path(&self) -> PathBuf {
        self.sibling(CALIBRATED_SUFFIX)
    }

    /// Temporary border-trim mask
    pub fn trim_mask_path(&self) -> PathBuf {
        self.sibling(TRIM_MASK_SUFFIX)
    }

    /// Border-trimmed band, input of orthorectification
    pub fn ortho_ready_path(&self) -> PathBuf {
        self.sibling(ORTHO_READY_SUFFIX)
    }

    pub fn polarization(&self) -> Polarization {
        self.name.polarization
    }
}

/// Orbit and footprint information read from `manifest.safe`
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestInfo {
    pub orbit_direction: OrbitDirection,
    pub relative_orbit: u16,
    pub start_time: Option<NaiveDateTime>,
    /// Footprint ring as (lon, lat) pairs
    pub footprint: Vec<(f64, f64)>,
}

/// A Sentinel-1 GRD product (`.SAFE` directory) and its bands
#[derive(Debug, Clone)]
pub struct RasterProduct {
    pub safe_dir: PathBuf,
    pub platform: String,
    pub orbit_direction: OrbitDirection,
    pub relative_orbit: u16,
    pub acquisition_start: NaiveDateTime,
    pub footprint: Vec<(f64, f64)>,
    pub bands: Vec<BandFile>,
}

impl RasterProduct {
    /// Product name, i.e. the `.SAFE` directory name
    pub fn name(&self) -> String {
        self.safe_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Footprint as closed WKT polygon in lon/lat order
    pub fn footprint_wkt(&self) -> String {
        let mut points: Vec<String> = self
            .footprint
            .iter()
            .map(|(lon, lat)| format!("{} {}", lon, lat))
            .collect();
        if let (Some(first), Some(last)) = (self.footprint.first(), self.footprint.last()) {
            if first != last {
                points.push(format!("{} {}", first.0, first.1));
            }
        }
        format!("POLYGON(({}))", points.join(", "))
    }
}

/// Restricts which products and bands are considered
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Empty means every polarization
    pub polarizations: Vec<Polarization>,
}

impl ProductFilter {
    fn accepts_date(&self, date: NaiveDate) -> bool {
        self.first_date.map_or(true, |first| date >= first) && self.last_date.map_or(true, |last| date <= last)
    }

    fn accepts_polarization(&self, pol: Polarization) -> bool {
        self.polarizations.is_empty() || self.polarizations.contains(&pol)
    }
}

/// Parse the parts of `manifest.safe` the chain needs
pub fn parse_manifest(xml_content: &str) -> TilingResult<ManifestInfo> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut current_tag: Option<Vec<u8>> = None;
    let mut orbit_direction = None;
    let mut relative_orbit = None;
    let mut start_time = None;
    let mut footprint = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => current_tag = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::Text(text)) => {
                let Some(tag) = current_tag.as_deref() else { continue };
                let value = text
                    .unescape()
                    .map_err(|e| TilingError::Manifest(format!("Bad text in manifest: {}", e)))?;
                match tag {
                    b"pass" if orbit_direction.is_none() => {
                        orbit_direction = Some(value.parse::<OrbitDirection>()?);
                    }
                    b"relativeOrbitNumber" if relative_orbit.is_none() => {
                        relative_orbit = Some(value.trim().parse::<u16>().map_err(|e| {
                            TilingError::Manifest(format!("Bad relative orbit '{}': {}", value, e))
                        })?);
                    }
                    b"startTime" if start_time.is_none() => {
                        start_time = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S%.f").ok();
                    }
                    b"coordinates" if footprint.is_empty() => {
                        footprint = parse_gml_coordinates(&value)?;
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current_tag = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TilingError::Manifest(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    let orbit_direction =
        orbit_direction.ok_or_else(|| TilingError::Manifest("No orbit pass in manifest".to_string()))?;
    let relative_orbit =
        relative_orbit.ok_or_else(|| TilingError::Manifest("No relative orbit number in manifest".to_string()))?;
    if footprint.len() < 3 {
        return Err(TilingError::Manifest("Footprint has fewer than 3 points".to_string()));
    }

    Ok(ManifestInfo {
        orbit_direction,
        relative_orbit,
        start_time,
        footprint,
    })
}

/// `lat,lon lat,lon ...` to (lon, lat) pairs
fn parse_gml_coordinates(text: &str) -> TilingResult<Vec<(f64, f64)>> {
    text.split_whitespace()
        .map(|pair| {
            let (lat, lon) = pair
                .split_once(',')
                .ok_or_else(|| TilingError::Manifest(format!("Bad coordinate pair: {}", pair)))?;
            let lat: f64 = lat
                .parse()
                .map_err(|_| TilingError::Manifest(format!("Bad latitude: {}", lat)))?;
            let lon: f64 = lon
                .parse()
                .map_err(|_| TilingError::Manifest(format!("Bad longitude: {}", lon)))?;
            Ok((lon, lat))
        })
        .collect()
}

fn is_derivative(path: &Path) -> bool {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    DERIVATIVE_SUFFIXES.iter().any(|suffix| stem.ends_with(suffix))
}

/// Read one `.SAFE` directory
pub fn read_product(safe_dir: &Path, filter: &ProductFilter) -> TilingResult<RasterProduct> {
    let manifest = std::fs::read_to_string(safe_dir.join(MANIFEST_FILE))?;
    let info = parse_manifest(&manifest)?;

    let mut bands = Vec::new();
    let measurement_dir = safe_dir.join(MEASUREMENT_DIR);
    if measurement_dir.is_dir() {
        for entry in std::fs::read_dir(&measurement_dir)? {
            let path = entry?.path();
            if is_derivative(&path) {
                continue;
            }
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            match file_name.parse::<MeasurementName>() {
                Ok(name) if filter.accepts_polarization(name.polarization) => bands.push(BandFile { path, name }),
                Ok(_) => log::debug!("Skipping band with unrequested polarization: {}", file_name),
                Err(_) => log::debug!("Ignoring non-measurement file: {}", file_name),
            }
        }
    }
    bands.sort_by(|a, b| a.path.cmp(&b.path));

    let first_band = bands
        .first()
        .ok_or_else(|| TilingError::Manifest(format!("No measurement bands in {}", safe_dir.display())))?;
    let platform = first_band.name.platform.clone();
    let acquisition_start = info.start_time.unwrap_or(first_band.name.start);

    Ok(RasterProduct {
        safe_dir: safe_dir.to_path_buf(),
        platform,
        orbit_direction: info.orbit_direction,
        relative_orbit: info.relative_orbit,
        acquisition_start,
        footprint: info.footprint,
        bands,
    })
}

/// All usable products in the raw directory, sorted by name
pub fn scan_products(raw_dir: &Path, filter: &ProductFilter) -> TilingResult<Vec<RasterProduct>> {
    let mut products = Vec::new();

    for entry in std::fs::read_dir(raw_dir)? {
        let path = entry?.path();
        let is_safe = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("safe"))
            .unwrap_or(false);
        if !path.is_dir() || !is_safe {
            continue;
        }
        match read_product(&path, filter) {
            Ok(product) if filter.accepts_date(product.acquisition_start.date()) => products.push(product),
            Ok(product) => log::debug!("Product outside date window: {}", product.name()),
            Err(e) => log::warn!("Skipping product {}: {}", path.display(), e),
        }
    }

    products.sort_by(|a, b| a.safe_dir.cmp(&b.safe_dir));
    log::info!("Found {} products in {}", products.len(), raw_dir.display());
    Ok(products)
}

/// Extract every `*.zip` archive of the raw directory in place
pub fn extract_archives(raw_dir: &Path) -> TilingResult<usize> {
    let mut extracted = 0;

    for entry in std::fs::read_dir(raw_dir)? {
        let path = entry?.path();
        let is_zip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if !is_zip {
            continue;
        }

        log::info!("Extracting {}", path.display());
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| TilingError::Archive(format!("Failed to open {}: {}", path.display(), e)))?;
        archive
            .extract(raw_dir)
            .map_err(|e| TilingError::Archive(format!("Failed to extract {}: {}", path.display(), e)))?;
        extracted += 1;
    }

    Ok(extracted)
}

/// Keep only the `keep` most recently modified entries of the raw directory.
///
/// Returns the removed paths.
pub fn prune_raw_directory(raw_dir: &Path, keep: usize) -> TilingResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(raw_dir)? {
        let entry = entry?;
        let modified = entry.metadata()?.modified()?;
        entries.push((modified, entry.path()));
    }
    if entries.len() <= keep {
        return Ok(Vec::new());
    }

    // newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    let mut removed = Vec::new();
    for (_, path) in entries.into_iter().skip(keep) {
        log::info!("Remove: {}", path.display());
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed.push(path);
    }
    Ok(removed)
}
