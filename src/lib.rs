//! s1tiling: Sentinel-1 GRD products onto MGRS tiles
//!
//! Calibrates, trims, orthorectifies and mosaics Sentinel-1 GRD products onto
//! a fixed grid of output tiles. Raster work is done by OTB applications run
//! as child processes through a bounded process pool; this crate decides what
//! to run, in which order, and what is already done.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{CalibrationType, OrbitDirection, Polarization, TilingError, TilingResult};
pub use config::{Configuration, OutputMode, TileSelection};
pub use io::{TileCode, TileImageName};
pub use crate::core::{CommandUnit, PoolReport, ProcessPool};
pub use pipeline::{Pipeline, RunOptions, RunSummary};
