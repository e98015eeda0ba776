use chrono::NaiveDate;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use s1tiling::config::OutputMode;
use s1tiling::core::border::{BorderTrimParams, BorderTrimmer};
use s1tiling::core::{OtbResources, ProcessPool};
use s1tiling::io::naming::MeasurementName;
use s1tiling::io::product::{BandFile, RasterProduct};
use s1tiling::OrbitDirection;
use std::path::Path;

const BAND: &str = "s1a-iw-grd-vv-20200103t170815-20200103t170840-030639-0382d5-001.tiff";

fn write_calibrated(path: &Path, width: usize, height: usize, data: Vec<f32>) {
    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver");
    let dataset = driver
        .create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)
        .expect("Failed to create raster");
    let mut band = dataset.rasterband(1).expect("band 1");
    band.write((0, 0), (width, height), &Buffer::new((width, height), data))
        .expect("Failed to write raster");
}

#[test]
fn test_trim_mask_from_calibrated_band() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let band = BandFile {
        path: dir.path().join(BAND),
        name: BAND.parse::<MeasurementName>().expect("measurement name"),
    };
    let product = RasterProduct {
        safe_dir: dir.path().to_path_buf(),
        platform: "s1a".to_string(),
        orbit_direction: OrbitDirection::Descending,
        relative_orbit: 8,
        acquisition_start: NaiveDate::from_ymd_opt(2020, 1, 3)
            .unwrap()
            .and_hms_opt(17, 8, 15)
            .unwrap(),
        footprint: Vec::new(),
        bands: vec![band.clone()],
    };

    // 20 x 12 band whose top strip (row 2) is all zero
    let (width, height) = (20, 12);
    let mut data = vec![1.0f32; width * height];
    for value in &mut data[2 * width..3 * width] {
        *value = 0.0;
    }
    write_calibrated(&band.calibrated_path(), width, height, data);

    let params = BorderTrimParams {
        strip_offset: 2,
        zero_threshold: 10,
        side_margin: 3,
        edge_rows: 4,
    };
    // `true -c ...` ignores the command, so no multiplication runs and the mask stays
    let pool = ProcessPool::new(1, OutputMode::Quiet, dir.path()).with_shell(Path::new("true"));
    let report = BorderTrimmer::new(params, OtbResources::default())
        .run(&pool, &[&product])
        .expect("Trimming failed");
    assert_eq!(report.launched, 1);

    let mask = Dataset::open(&band.trim_mask_path()).expect("mask written");
    assert_eq!(mask.raster_size(), (width, height));
    let values = mask
        .rasterband(1)
        .unwrap()
        .read_as::<u8>((0, 0), (width, height), (width, height), None)
        .unwrap()
        .data;
    let at = |row: usize, col: usize| values[row * width + col];

    // top rows cut
    assert!((0..4).all(|row| (0..width).all(|col| at(row, col) == 0)));
    // sides always cut
    assert!((0..height).all(|row| at(row, 0) == 0 && at(row, width - 1) == 0));
    // bottom rows kept inside the side margins
    assert!((4..height).all(|row| (3..width - 3).all(|col| at(row, col) == 1)));

    // the calibrated band is kept until its trimmed output exists
    assert!(band.calibrated_path().exists());
    assert!(!band.ortho_ready_path().exists());
}
