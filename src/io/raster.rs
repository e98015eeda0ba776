use crate::types::{BorderMask, TilingError, TilingResult};
use gdal::raster::Buffer;
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags, Metadata};
use std::path::Path;

/// Width and height of a raster
pub fn raster_size(path: &Path) -> TilingResult<(usize, usize)> {
    let dataset = Dataset::open(path)?;
    Ok(dataset.raster_size())
}

/// Count zero (or no-data) pixels of one full-width row of band 1
pub fn count_zero_pixels_in_row(dataset: &Dataset, row: usize) -> TilingResult<usize> {
    let (width, height) = dataset.raster_size();
    if row >= height {
        return Err(TilingError::Processing(format!(
            "Row {} outside raster of height {}",
            row, height
        )));
    }

    let band = dataset.rasterband(1)?;
    let no_data = band.no_data_value();
    let strip = band.read_as::<f64>((0, row as isize), (width, 1), (width, 1), None)?;

    let count = strip
        .data
        .iter()
        .filter(|&&v| v == 0.0 || no_data.map_or(false, |nd| v == nd))
        .count();
    Ok(count)
}

/// Write a byte mask with the georeferencing of `reference`.
///
/// Geotransform and projection are copied when present; GCPs are copied
/// as well since calibrated GRD bands are only GCP-referenced.
pub fn write_mask_like(reference: &Dataset, mask: &BorderMask, output_path: &Path) -> TilingResult<()> {
    let (height, width) = mask.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<u8, _>(output_path, width as isize, height as isize, 1)?;

    if let Ok(gt) = reference.geo_transform() {
        dataset.set_geo_transform(&gt)?;
    }
    let projection = reference.projection();
    if !projection.is_empty() {
        dataset.set_projection(&projection)?;
    }
    copy_gcps(reference, &dataset)?;

    let mut band = dataset.rasterband(1)?;
    let flat: Vec<u8> = mask.iter().copied().collect();
    let buffer = Buffer::new((width, height), flat);
    band.write((0, 0), (width, height), &buffer)?;

    log::debug!("Mask written: {}", output_path.display());
    Ok(())
}

fn copy_gcps(source: &Dataset, target: &Dataset) -> TilingResult<()> {
    // SAFETY: both handles are live for the duration of the call and GDAL
    // copies the GCP array and projection string.
    unsafe {
        let source_handle = source.c_dataset();
        let count = gdal_sys::GDALGetGCPCount(source_handle);
        if count == 0 {
            return Ok(());
        }
        let gcps = gdal_sys::GDALGetGCPs(source_handle);
        let projection = gdal_sys::GDALGetGCPProjection(source_handle);
        let status = gdal_sys::GDALSetGCPs(target.c_dataset(), count, gcps, projection);
        if status != gdal_sys::CPLErr::CE_None {
            return Err(TilingError::Processing(format!("Failed to copy {} GCPs", count)));
        }
    }
    Ok(())
}

/// Set dataset-level metadata items, opening the raster in update mode
pub fn set_metadata_items(path: &Path, items: &[(&str, String)]) -> TilingResult<()> {
    let options = DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
        ..DatasetOptions::default()
    };
    let mut dataset = Dataset::open_ex(path, options)?;
    for (key, value) in items {
        dataset.set_metadata_item(key, value, "")?;
    }
    Ok(())
}
