//! I/O modules: file naming, products, grids, rasters and elevation data

pub mod naming;
pub mod product;
pub mod grid;
pub mod raster;
pub mod dem;

pub use naming::{AcquisitionStamp, ImageKind, MeasurementName, TileCode, TileImageName};
pub use product::{BandFile, ProductFilter, RasterProduct};
pub use grid::{ElevationTile, Tile, TileGrid};
pub use dem::ElevationArena;
