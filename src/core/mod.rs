//! Processing stages and the process pool that runs them

pub mod command;
pub mod scheduler;
pub mod index;
pub mod coverage;
pub mod calibrate;
pub mod border;
pub mod ortho;
pub mod concat;
pub mod filter;

// Re-export main types
pub use command::{CommandUnit, OtbCommand, OtbResources};
pub use scheduler::{CommandFailure, PoolReport, ProcessPool};
pub use index::OutputIndex;
pub use coverage::{ElevationCoverage, elevation_coverage, select_tiles};
pub use calibrate::{CalibrationParams, Calibrator};
pub use border::{BorderMaskGenerator, BorderTrimParams, BorderTrimmer, TrimPlan};
pub use ortho::{OrthoParams, Orthorectifier, OutputGrid};
pub use concat::{Concatenator, FirstNonZero};
pub use filter::TemporalFilter;
