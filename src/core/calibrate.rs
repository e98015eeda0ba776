use crate::core::command::{CommandUnit, OtbCommand, OtbResources};
use crate::core::scheduler::{PoolReport, ProcessPool};
use crate::io::product::{BandFile, RasterProduct};
use crate::types::{CalibrationType, TilingResult};

const TITLE: &str = "Calibration";

/// Radiometric calibration parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParams {
    pub calibration: CalibrationType,
    pub remove_thermal_noise: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            calibration: CalibrationType::Sigma0,
            remove_thermal_noise: false,
        }
    }
}

/// Emits one `otbcli_SARCalibration` per band still lacking a calibrated sibling
pub struct Calibrator {
    params: CalibrationParams,
    resources: OtbResources,
}

impl Calibrator {
    pub fn new(params: CalibrationParams, resources: OtbResources) -> Self {
        Self { params, resources }
    }

    /// A band is done once calibrated, or once trimmed (the calibrated file is
    /// removed after trimming)
    fn needs_calibration(band: &BandFile) -> bool {
        !band.calibrated_path().exists() && !band.ortho_ready_path().exists()
    }

    pub fn command_for(&self, band: &BandFile) -> CommandUnit {
        OtbCommand::new("otbcli_SARCalibration", self.resources)
            .arg("-progress", "false")
            .path("-in", &band.path)
            .path("-out", &band.calibrated_path())
            .arg("-lut", self.params.calibration.lut_name())
            .arg("-noise", self.params.remove_thermal_noise)
            .build(TITLE)
    }

    pub fn commands(&self, products: &[&RasterProduct]) -> Vec<CommandUnit> {
        products
            .iter()
            .flat_map(|product| product.bands.iter())
            .filter(|band| Self::needs_calibration(band))
            .map(|band| self.command_for(band))
            .collect()
    }

    pub fn run(&self, pool: &ProcessPool, products: &[&RasterProduct]) -> TilingResult<PoolReport> {
        let commands = self.commands(products);
        log::info!("Calibrating {} bands ({})", commands.len(), self.params.calibration);
        pool.run(&commands)
    }
}
