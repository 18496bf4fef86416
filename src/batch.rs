//! Batch conversion.
//!
//! A batch turns an input path (one file or a directory tree) into one
//! conversion task per SAS file, then runs the tasks:
//!
//! ```no_run
//! use datasetjson::batch::{self, BatchOptions};
//! use std::path::Path;
//!
//! let options = BatchOptions {
//!     workers: Some(4),
//!     ..Default::default()
//! };
//! let report = batch::run(Path::new("sdtm"), Path::new("json"), &options)?;
//! println!("{}", report.summary());
//! # Ok::<(), datasetjson::error::ConvertError>(())
//! ```
//!
//! The output directory is created before any task starts. Per-file failures
//! are recorded in the [`BatchReport`] and never abort the batch.

pub mod discovery;
pub mod scheduler;

pub use discovery::{ConversionTask, OUTPUT_EXTENSION, build_tasks, discover, prepare_output_dir};
pub use scheduler::{BatchReport, FileOutcome, TaskStatus, effective_workers, run_tasks};

use crate::dataset::ConversionOptions;
use crate::error::Result;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Requested pool size; unset, zero or negative runs sequentially
    pub workers: Option<i64>,
    pub conversion: ConversionOptions,
}

/// Converts every SAS file under `input_root` into `output_dir`.
///
/// Only setup failures (output directory, discovery) are returned as errors.
pub fn run(input_root: &Path, output_dir: &Path, options: &BatchOptions) -> Result<BatchReport> {
    prepare_output_dir(output_dir)?;
    let tasks = build_tasks(input_root, output_dir)?;
    if tasks.is_empty() {
        tracing::warn!("No .sas7bdat or .xpt files found at {}", input_root.display());
    } else {
        tracing::info!("Found {} file(s) to convert", tasks.len());
    }
    run_tasks(&tasks, options.workers, &options.conversion)
}
