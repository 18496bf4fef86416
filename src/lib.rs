//! # datasetjson - SAS datasets to Dataset-JSON
//!
//! Converts SAS transport (`.xpt`) and SAS7BDAT (`.sas7bdat`) files into
//! Dataset-JSON documents, one document per input file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use datasetjson::dataset::{self, ConversionOptions};
//! use datasetjson::source::SourceFormat;
//! use std::path::Path;
//!
//! let report = dataset::convert_file(
//!     Path::new("dm.xpt"),
//!     Path::new("dm.json"),
//!     SourceFormat::Xport,
//!     &ConversionOptions::default(),
//! )?;
//! println!("{}", report.summary());
//! # Ok::<(), datasetjson::error::ConvertError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`source`]: decoders producing a polars `DataFrame` plus source metadata
//! - [`dataset`]: type inference, metadata normalization, assembly, serialization
//! - [`batch`]: discovery and the sequential or pooled batch scheduler
//! - [`config`]: settings file handling
//! - [`error`]: error types and handling utilities
//! - [`logging`]: tracing subscriber setup
//!
//! ## Output
//!
//! Every document carries format version `1.0.0`. Rows are embedded inline
//! by default; in external mode they are written to `<name>-data.jsonl` next
//! to the document and referenced by a relative `location`. Empty strings,
//! NaN and infinities are written as `null`.

#![warn(clippy::all, rust_2018_idioms)]

pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod source;
