//! Border trimming of calibrated bands and border-mask generation of tile images.
//!
//! GRD products carry burned, partly-zero lines along their first and last
//! rows and low-quality columns on both sides. Trimming zeroes those areas with
//! a multiplicative mask before orthorectification; border masks then record
//! the valid-data area of each orthorectified co-polarized image.

use crate::core::command::{CommandUnit, OtbCommand, OtbResources};
use crate::core::index::OutputIndex;
use crate::core::scheduler::{PoolReport, ProcessPool};
use crate::io::naming::TileImageName;
use crate::io::product::{BandFile, RasterProduct};
use crate::io::raster::{count_zero_pixels_in_row, write_mask_like};
use crate::types::{BorderMask, TilingResult};
use gdal::Dataset;
use ndarray::{s, Array2};
use std::path::{Path, PathBuf};

const TRIM_TITLE: &str = "Border trimming";
const MASK_TITLE: &str = "Border mask";
const MORPHOLOGY_TITLE: &str = "Border mask opening";

/// Radius of the ball used to open border masks
pub const OPENING_RADIUS: u32 = 5;

/// Border trimming parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderTrimParams {
    /// Distance of the sampled strips from the top and bottom edges
    pub strip_offset: usize,
    /// A strip with more zero pixels than this marks its edge as burned
    pub zero_threshold: usize,
    /// Columns always removed on each side
    pub side_margin: usize,
    /// Rows removed at a burned edge
    pub edge_rows: usize,
}

impl Default for BorderTrimParams {
    fn default() -> Self {
        Self {
            strip_offset: 100,
            zero_threshold: 2 * 1000,
            side_margin: 1000,
            edge_rows: 1600,
        }
    }
}

/// Which edges of a band are cut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimPlan {
    pub cut_top: bool,
    pub cut_bottom: bool,
}

impl BorderTrimParams {
    /// Rows of the top and bottom strips, clamped to the raster
    pub fn strip_rows(&self, height: usize) -> (usize, usize) {
        let last = height.saturating_sub(1);
        let top = self.strip_offset.min(last);
        let bottom = height.saturating_sub(self.strip_offset).min(last);
        (top, bottom)
    }

    pub fn plan(&self, top_zeros: usize, bottom_zeros: usize) -> TrimPlan {
        TrimPlan {
            cut_top: top_zeros > self.zero_threshold,
            cut_bottom: bottom_zeros > self.zero_threshold,
        }
    }

    /// Keep/drop mask for a `width` x `height` band
    pub fn build_mask(&self, width: usize, height: usize, plan: TrimPlan) -> BorderMask {
        let mut mask = Array2::<u8>::ones((height, width));
        let side = self.side_margin.min(width);
        mask.slice_mut(s![.., ..side]).fill(0);
        mask.slice_mut(s![.., width - side..]).fill(0);

        let rows = self.edge_rows.min(height);
        if plan.cut_top {
            mask.slice_mut(s![..rows, ..]).fill(0);
        }
        if plan.cut_bottom {
            mask.slice_mut(s![height - rows.., ..]).fill(0);
        }
        mask
    }
}

/// Cuts burned borders of calibrated bands into `_OrthoReady` rasters
pub struct BorderTrimmer {
    params: BorderTrimParams,
    resources: OtbResources,
}

impl BorderTrimmer {
    pub fn new(params: BorderTrimParams, resources: OtbResources) -> Self {
        Self { params, resources }
    }

    /// Sample the band, write its mask and return the multiplication command
    fn prepare_band(&self, band: &BandFile) -> TilingResult<CommandUnit> {
        let calibrated = band.calibrated_path();
        let dataset = Dataset::open(&calibrated)?;
        let (width, height) = dataset.raster_size();

        let (top_row, bottom_row) = self.params.strip_rows(height);
        let plan = self.params.plan(
            count_zero_pixels_in_row(&dataset, top_row)?,
            count_zero_pixels_in_row(&dataset, bottom_row)?,
        );
        log::debug!(
            "{}: cut top {}, cut bottom {}",
            calibrated.display(),
            plan.cut_top,
            plan.cut_bottom
        );

        let mask = self.params.build_mask(width, height, plan);
        write_mask_like(&dataset, &mask, &band.trim_mask_path())?;

        Ok(OtbCommand::new("otbcli_BandMath", self.resources)
            .paths("-il", &[calibrated, band.trim_mask_path()])
            .path("-out", &band.ortho_ready_path())
            .arg("-exp", "im1b1*im2b1")
            .build(TRIM_TITLE))
    }

    /// Bands with a calibrated file and no `_OrthoReady` output
    fn pending<'a>(products: &[&'a RasterProduct]) -> Vec<&'a BandFile> {
        products
            .iter()
            .flat_map(|product| product.bands.iter())
            .filter(|band| !band.ortho_ready_path().exists() && band.calibrated_path().exists())
            .collect()
    }

    pub fn run(&self, pool: &ProcessPool, products: &[&RasterProduct]) -> TilingResult<PoolReport> {
        let bands = Self::pending(products);
        let mut commands = Vec::with_capacity(bands.len());
        for band in &bands {
            match self.prepare_band(band) {
                Ok(command) => commands.push(command),
                Err(e) => log::error!("Cannot trim {}: {}", band.path.display(), e),
            }
        }

        log::info!("Trimming borders of {} bands", commands.len());
        let report = pool.run(&commands)?;
        remove_trim_intermediates(&bands);
        Ok(report)
    }
}

/// Delete masks and calibrated files of bands whose `_OrthoReady` output exists
fn remove_trim_intermediates(bands: &[&BandFile]) {
    for band in bands {
        if !band.ortho_ready_path().exists() {
            continue;
        }
        for path in [band.trim_mask_path(), band.calibrated_path()] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Cannot remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// `<stem>_BorderMask_TMP.tif`, the binarized image before opening
fn binarized_path(index: &OutputIndex, image: &TileImageName) -> PathBuf {
    index
        .tile_dir()
        .join(format!("{}_TMP.tif", image.border_mask().stem()))
}

/// Builds border masks of the co-polarized images of a tile
pub struct BorderMaskGenerator {
    resources: OtbResources,
}

impl BorderMaskGenerator {
    pub fn new(resources: OtbResources) -> Self {
        Self { resources }
    }

    /// Co-polarized single-acquisition images without a border mask yet
    pub fn pending(index: &OutputIndex) -> Vec<TileImageName> {
        index
            .single_acquisitions()
            .filter(|image| image.polarization.is_co_polarized())
            .filter(|image| !index.contains(&image.border_mask()))
            .cloned()
            .collect()
    }

    pub fn binarize_command(&self, index: &OutputIndex, image: &TileImageName) -> CommandUnit {
        OtbCommand::new("otbcli_BandMath", self.resources)
            .paths("-il", &[index.path_of(image)])
            .path("-out", &binarized_path(index, image))
            .word("uint8")
            .arg("-exp", "im1b1==0?0:1")
            .build(MASK_TITLE)
    }

    pub fn opening_command(&self, index: &OutputIndex, image: &TileImageName) -> CommandUnit {
        OtbCommand::new("otbcli_BinaryMorphologicalOperation", self.resources)
            .path("-in", &binarized_path(index, image))
            .path("-out", &index.path_of(&image.border_mask()))
            .word("uint8")
            .arg("-structype", "ball")
            .arg("-structype.ball.xradius", OPENING_RADIUS)
            .arg("-structype.ball.yradius", OPENING_RADIUS)
            .arg("-filter", "opening")
            .build(MORPHOLOGY_TITLE)
    }

    pub fn run(&self, pool: &ProcessPool, tile_dir: &Path) -> TilingResult<()> {
        let index = OutputIndex::scan(tile_dir)?;
        let images = Self::pending(&index);
        if images.is_empty() {
            return Ok(());
        }
        log::info!("Generating {} border masks", images.len());

        let binarize: Vec<CommandUnit> = images.iter().map(|i| self.binarize_command(&index, i)).collect();
        pool.run(&binarize)?;

        let opening: Vec<CommandUnit> = images
            .iter()
            .filter(|image| binarized_path(&index, image).exists())
            .map(|image| self.opening_command(&index, image))
            .collect();
        pool.run(&opening)?;

        for image in &images {
            let temporary = binarized_path(&index, image);
            if temporary.exists() {
                if let Err(e) = std::fs::remove_file(&temporary) {
                    log::warn!("Cannot remove {}: {}", temporary.display(), e);
                }
            }
        }
        Ok(())
    }
}
