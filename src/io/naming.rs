//! File name grammar shared by every stage.
//!
//! Tile images are named
//! `<platform>_<tile>_<pol>_<dir>_<orbit:03>_<YYYYMMDD>t<HHMMSS>.tif`.
//! Same-day composites replace the time of day with [`COMPOSITE_PLACEHOLDER`],
//! and border masks append [`BORDER_MASK_SUFFIX`] to the stem. The metadata
//! tagger and the concatenation grouping both read names back through
//! [`TileImageName::from_str`], so this is the only place the layout lives.

use crate::types::{OrbitDirection, Polarization, TilingError};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Stands in for the time of day in same-day composites
pub const COMPOSITE_PLACEHOLDER: &str = "xxxxxx";

/// Appended to an image stem to name its border mask
pub const BORDER_MASK_SUFFIX: &str = "_BorderMask";

/// Length of a single-acquisition image name for a 5-character tile code
pub const SINGLE_ACQUISITION_NAME_LEN: usize = 40;

const IMAGE_EXTENSION: &str = ".tif";

/// MGRS tile code, e.g. `31TCJ`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCode(String);

impl TileCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTM zone number (first two characters)
    pub fn utm_zone(&self) -> u32 {
        // validated on construction
        self.0[0..2].parse().unwrap_or(0)
    }

    /// Latitude bands `N` to `X` are in the northern hemisphere
    pub fn is_northern(&self) -> bool {
        self.0.as_bytes()[2] >= b'N'
    }

    /// EPSG code of the tile's UTM projection
    pub fn utm_epsg(&self) -> u32 {
        let base = if self.is_northern() { 32600 } else { 32700 };
        base + self.utm_zone()
    }
}

impl FromStr for TileCode {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        let bytes = code.as_bytes();
        let valid = bytes.len() == 5
            && bytes[0..2].iter().all(u8::is_ascii_digit)
            && bytes[2..].iter().all(u8::is_ascii_uppercase);
        if !valid {
            return Err(TilingError::InvalidName(format!("Invalid MGRS tile code: {}", s)));
        }
        let zone: u32 = code[0..2].parse().unwrap_or(0);
        if !(1..=60).contains(&zone) {
            return Err(TilingError::InvalidName(format!("UTM zone out of range in tile code: {}", s)));
        }
        Ok(TileCode(code))
    }
}

impl fmt::Display for TileCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acquisition part of a tile image name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AcquisitionStamp {
    /// One acquisition
    Instant(NaiveDateTime),
    /// Same-day composite of several acquisitions
    Day(NaiveDate),
}

impl AcquisitionStamp {
    pub fn date(&self) -> NaiveDate {
        match self {
            AcquisitionStamp::Instant(t) => t.date(),
            AcquisitionStamp::Day(d) => *d,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, AcquisitionStamp::Day(_))
    }

    /// `YYYY:MM:DD HH:MM:SS`, midnight for composites
    pub fn metadata_value(&self) -> String {
        match self {
            AcquisitionStamp::Instant(t) => t.format("%Y:%m:%d %H:%M:%S").to_string(),
            AcquisitionStamp::Day(d) => format!("{} 00:00:00", d.format("%Y:%m:%d")),
        }
    }
}

impl fmt::Display for AcquisitionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStamp::Instant(t) => write!(f, "{}", t.format("%Y%m%dt%H%M%S")),
            AcquisitionStamp::Day(d) => write!(f, "{}t{}", d.format("%Y%m%d"), COMPOSITE_PLACEHOLDER),
        }
    }
}

impl FromStr for AcquisitionStamp {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TilingError::InvalidName(format!("Invalid acquisition stamp: {}", s));
        let (day, time) = s.split_once('t').ok_or_else(invalid)?;
        let date = NaiveDate::parse_from_str(day, "%Y%m%d").map_err(|_| invalid())?;
        if day.len() != 8 || time.len() != 6 {
            return Err(invalid());
        }
        if time == COMPOSITE_PLACEHOLDER {
            return Ok(AcquisitionStamp::Day(date));
        }
        let instant = NaiveDateTime::parse_from_str(s, "%Y%m%dt%H%M%S").map_err(|_| invalid())?;
        Ok(AcquisitionStamp::Instant(instant))
    }
}

/// What a tile image file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageKind {
    Backscatter,
    BorderMask,
}

/// Structured form of an orthorectified tile image file name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileImageName {
    pub platform: String,
    pub tile: TileCode,
    pub polarization: Polarization,
    pub orbit_direction: OrbitDirection,
    pub relative_orbit: u16,
    pub stamp: AcquisitionStamp,
    pub kind: ImageKind,
}

impl TileImageName {
    /// Same-day composite this image contributes to
    pub fn composite(&self) -> TileImageName {
        TileImageName {
            stamp: AcquisitionStamp::Day(self.stamp.date()),
            ..self.clone()
        }
    }

    /// Border mask sharing this image's stem
    pub fn border_mask(&self) -> TileImageName {
        TileImageName {
            kind: ImageKind::BorderMask,
            ..self.clone()
        }
    }

    /// Backscatter image this name refers to (identity for images)
    pub fn backscatter(&self) -> TileImageName {
        TileImageName {
            kind: ImageKind::Backscatter,
            ..self.clone()
        }
    }

    pub fn is_single_acquisition(&self) -> bool {
        self.kind == ImageKind::Backscatter && !self.stamp.is_composite()
    }

    /// Name without extension
    pub fn stem(&self) -> String {
        let name = self.to_string();
        name[..name.len() - IMAGE_EXTENSION.len()].to_string()
    }
}

impl fmt::Display for TileImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{:03}_{}",
            self.platform,
            self.tile,
            self.polarization.file_token(),
            self.orbit_direction.code(),
            self.relative_orbit,
            self.stamp
        )?;
        if self.kind == ImageKind::BorderMask {
            f.write_str(BORDER_MASK_SUFFIX)?;
        }
        f.write_str(IMAGE_EXTENSION)
    }
}

impl FromStr for TileImageName {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| TilingError::InvalidName(format!("{}: {}", why, s));
        let stem = s
            .strip_suffix(IMAGE_EXTENSION)
            .ok_or_else(|| invalid("missing .tif extension"))?;
        let (stem, kind) = match stem.strip_suffix(BORDER_MASK_SUFFIX) {
            Some(base) => (base, ImageKind::BorderMask),
            None => (stem, ImageKind::Backscatter),
        };

        let fields: Vec<&str> = stem.split('_').collect();
        if fields.len() != 6 {
            return Err(invalid("expected 6 underscore-separated fields"));
        }
        let platform = fields[0];
        if platform.is_empty() || !platform.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(invalid("invalid platform code"));
        }
        // the polarization token is always lower case in file names
        if fields[2] != fields[2].to_lowercase() {
            return Err(invalid("polarization must be lower case"));
        }
        if fields[4].len() != 3 {
            return Err(invalid("relative orbit must have 3 digits"));
        }
        let relative_orbit = fields[4]
            .parse::<u16>()
            .map_err(|_| invalid("relative orbit is not a number"))?;
        if fields[3] != "ASC" && fields[3] != "DES" {
            return Err(invalid("orbit direction must be ASC or DES"));
        }

        Ok(TileImageName {
            platform: platform.to_string(),
            tile: fields[1].parse()?,
            polarization: fields[2].parse()?,
            orbit_direction: fields[3].parse()?,
            relative_orbit,
            stamp: fields[5].parse()?,
            kind,
        })
    }
}

/// Fields of a Sentinel-1 measurement file name such as
/// `s1a-iw-grd-vv-20200103t170815-20200103t170840-030639-0382d5-001.tiff`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementName {
    pub platform: String,
    pub mode: String,
    pub product_type: String,
    pub polarization: Polarization,
    pub start: NaiveDateTime,
}

fn measurement_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(s1[a-d])-([a-z0-9]+)-([a-z]+)-(vv|vh|hv|hh)-(\d{8}t\d{6})-(\d{8}t\d{6})-.*\.tiff?$")
            .expect("measurement name pattern is valid")
    })
}

impl FromStr for MeasurementName {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        let caps = measurement_regex()
            .captures(&name)
            .ok_or_else(|| TilingError::InvalidName(format!("Not a Sentinel-1 measurement file: {}", s)))?;
        let start = NaiveDateTime::parse_from_str(&caps[5], "%Y%m%dt%H%M%S")
            .map_err(|e| TilingError::InvalidName(format!("Bad start time in {}: {}", s, e)))?;
        Ok(MeasurementName {
            platform: caps[1].to_string(),
            mode: caps[2].to_string(),
            product_type: caps[3].to_string(),
            polarization: caps[4].parse()?,
            start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_image_name_round_trip() {
        let name = "s1a_31TCJ_vv_DES_008_20200103t170815.tif";
        let parsed: TileImageName = name.parse().unwrap();

        assert_eq!(parsed.platform, "s1a");
        assert_eq!(parsed.tile.as_str(), "31TCJ");
        assert_eq!(parsed.polarization, Polarization::VV);
        assert_eq!(parsed.orbit_direction, OrbitDirection::Descending);
        assert_eq!(parsed.relative_orbit, 8);
        assert!(parsed.is_single_acquisition());
        assert_eq!(parsed.to_string(), name);
        assert_eq!(name.len(), SINGLE_ACQUISITION_NAME_LEN);
    }

    #[test]
    fn test_composite_and_mask_names() {
        let parsed: TileImageName = "s1b_33NTB_vh_ASC_117_20191231t235959.tif".parse().unwrap();
        let composite = parsed.composite();
        assert_eq!(composite.to_string(), "s1b_33NTB_vh_ASC_117_20191231txxxxxx.tif");
        assert!(!composite.is_single_acquisition());

        let mask = parsed.border_mask();
        assert_eq!(mask.to_string(), "s1b_33NTB_vh_ASC_117_20191231t235959_BorderMask.tif");
        let reparsed: TileImageName = mask.to_string().parse().unwrap();
        assert_eq!(reparsed, mask);
        assert_eq!(reparsed.backscatter(), parsed);

        let composite_mask: TileImageName =
            "s1b_33NTB_vh_ASC_117_20191231txxxxxx_BorderMask.tif".parse().unwrap();
        assert_eq!(composite_mask, composite.border_mask());
    }

    #[test]
    fn test_metadata_datetime() {
        let single: TileImageName = "s1a_31TCJ_vv_DES_008_20200103t170815.tif".parse().unwrap();
        assert_eq!(single.stamp.metadata_value(), "2020:01:03 17:08:15");
        assert_eq!(single.composite().stamp.metadata_value(), "2020:01:03 00:00:00");
    }

    #[test]
    fn test_rejects_malformed_names() {
        for bad in [
            "s1a_31TCJ_vv_DES_8_20200103t170815.tif",
            "s1a_31TCJ_vv_DES_008_20200103t170815.tiff",
            "s1a_31TCJ_VV_DES_008_20200103t170815.tif",
            "s1a_31TCJ_vv_NORTH_008_20200103t170815.tif",
            "s1a_31TCJ_vv_DES_008_20200103.tif",
            "s1a_3TCJ_vv_DES_008_20200103t170815.tif",
            "Outcore_vv_DES_008.tif",
        ] {
            assert!(bad.parse::<TileImageName>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_tile_code_projection() {
        let north: TileCode = "31TCJ".parse().unwrap();
        assert_eq!(north.utm_zone(), 31);
        assert!(north.is_northern());
        assert_eq!(north.utm_epsg(), 32631);

        let south: TileCode = "55HBU".parse().unwrap();
        assert!(!south.is_northern());
        assert_eq!(south.utm_epsg(), 32755);

        assert!("99ABC".parse::<TileCode>().is_err());
        assert!("ALL".parse::<TileCode>().is_err());
    }

    #[test]
    fn test_measurement_name_parsing() {
        let m: MeasurementName = "s1a-iw-grd-vh-20200103t170815-20200103t170840-030639-0382d5-002.tiff"
            .parse()
            .unwrap();
        assert_eq!(m.platform, "s1a");
        assert_eq!(m.mode, "iw");
        assert_eq!(m.polarization, Polarization::VH);
        assert_eq!(m.start.format("%Y%m%dt%H%M%S").to_string(), "20200103t170815");

        assert!("s1a-iw-grd-vh-20200103t170815-002_calOk.tiff".parse::<MeasurementName>().is_err());
    }
}
