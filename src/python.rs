use crate::io::naming::TileImageName;
use crate::pipeline::{run_from_file, RunOptions};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::Path;

/// Python module definition
#[pymodule]
fn _s1tiling(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    m.add_function(wrap_pyfunction!(parse_image_name, m)?)?;
    Ok(())
}

/// Run the chain for a configuration file; returns the processed tile codes
#[pyfunction]
#[pyo3(signature = (config_path, extract_archives = false))]
fn run_pipeline(py: Python, config_path: String, extract_archives: bool) -> PyResult<Vec<String>> {
    let options = RunOptions { extract_archives };
    let summary = py
        .allow_threads(|| run_from_file(Path::new(&config_path), options))
        .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("{}", e)))?;

    Ok(summary
        .tiles
        .iter()
        .filter(|t| t.succeeded())
        .map(|t| t.tile.to_string())
        .collect())
}

/// Fields of a tile image file name as a dict
#[pyfunction]
fn parse_image_name(py: Python, name: String) -> PyResult<PyObject> {
    let parsed: TileImageName = name
        .parse()
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("{}", e)))?;

    let dict = PyDict::new(py);
    dict.set_item("platform", &parsed.platform)?;
    dict.set_item("tile", parsed.tile.as_str())?;
    dict.set_item("polarization", parsed.polarization.file_token())?;
    dict.set_item("orbit_direction", parsed.orbit_direction.code())?;
    dict.set_item("relative_orbit", parsed.relative_orbit)?;
    dict.set_item("acquisition_date", parsed.stamp.date().format("%Y-%m-%d").to_string())?;
    dict.set_item("acquisition_datetime", parsed.stamp.metadata_value())?;
    dict.set_item("composite", parsed.stamp.is_composite())?;
    dict.set_item("border_mask", parsed.kind == crate::io::naming::ImageKind::BorderMask)?;
    Ok(dict.into())
}
