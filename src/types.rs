use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Binary keep/drop mask (1 = keep, 0 = drop)
pub type BorderMask = Array2<u8>;

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    /// Lower-case token used in product and tile image file names
    pub fn file_token(&self) -> &'static str {
        match self {
            Polarization::VV => "vv",
            Polarization::VH => "vh",
            Polarization::HV => "hv",
            Polarization::HH => "hh",
        }
    }

    /// Co-polarized channels carry the border masks
    pub fn is_co_polarized(&self) -> bool {
        matches!(self, Polarization::VV | Polarization::HH)
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl FromStr for Polarization {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(TilingError::InvalidName(format!("Invalid polarization: {}", s))),
        }
    }
}

/// Satellite pass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrbitDirection {
    Ascending,
    Descending,
}

impl OrbitDirection {
    /// Three-letter code used in tile image names
    pub fn code(&self) -> &'static str {
        match self {
            OrbitDirection::Ascending => "ASC",
            OrbitDirection::Descending => "DES",
        }
    }
}

impl std::fmt::Display for OrbitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for OrbitDirection {
    type Err = TilingError;

    /// Accepts both the short codes and the manifest's `ASCENDING`/`DESCENDING`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" | "ASCENDING" => Ok(OrbitDirection::Ascending),
            "DES" | "DESCENDING" => Ok(OrbitDirection::Descending),
            _ => Err(TilingError::InvalidName(format!("Invalid orbit direction: {}", s))),
        }
    }
}

/// Radiometric calibration look-up table applied by the calibration stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationType {
    Sigma0,
    Beta0,
    Gamma0,
    Dn,
}

impl CalibrationType {
    /// Value of the `-lut` parameter of `otbcli_SARCalibration`
    pub fn lut_name(&self) -> &'static str {
        match self {
            CalibrationType::Sigma0 => "sigma",
            CalibrationType::Beta0 => "beta",
            CalibrationType::Gamma0 => "gamma",
            CalibrationType::Dn => "dn",
        }
    }
}

impl std::fmt::Display for CalibrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.lut_name())
    }
}

impl FromStr for CalibrationType {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sigma" | "sigma0" => Ok(CalibrationType::Sigma0),
            "beta" | "beta0" => Ok(CalibrationType::Beta0),
            "gamma" | "gamma0" => Ok(CalibrationType::Gamma0),
            "dn" => Ok(CalibrationType::Dn),
            _ => Err(TilingError::Config(format!("Unknown calibration type: {}", s))),
        }
    }
}

/// Error types for the tiling chain
#[derive(Debug, thiserror::Error)]
pub enum TilingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Missing elevation data: {0}")]
    MissingElevation(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for tiling operations
pub type TilingResult<T> = Result<T, TilingError>;
