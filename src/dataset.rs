//! Dataset-JSON conversion.
//!
//! Turns one decoded SAS file into a Dataset-JSON document:
//!
//! 1. [`normalize`](normalize::normalize) prunes the source metadata
//! 2. [`assemble`](assemble::assemble) derives column types and produces rows
//! 3. [`serialize`] writes the document and, in external mode, the row file
//!
//! [`convert_file`] runs the whole pipeline for one input path.

pub mod assemble;
pub mod inference;
pub mod model;
pub mod normalize;
pub mod serialize;

pub use assemble::{AssembledDataset, OutputMode};
pub use inference::{TypeTag, ValueCategory, ValueKind};
pub use model::{Cell, Document, Row, FORMAT_VERSION};
pub use serialize::Formatting;

use crate::error::{ConvertError, Result, ResultExt as _};
use crate::source::{DecodedFile, SourceFormat};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Suffix appended to the output stem to name the external row file.
pub const DEFAULT_DATA_FILE_SUFFIX: &str = "-data.jsonl";

/// Per-conversion settings shared by every file of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    pub formatting: Formatting,
    /// Write rows to a sibling JSON-Lines file instead of inline
    pub external: bool,
    pub data_file_suffix: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            formatting: Formatting::Compact,
            external: false,
            data_file_suffix: DEFAULT_DATA_FILE_SUFFIX.to_owned(),
        }
    }
}

/// What a single conversion produced.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub rows: usize,
    pub columns: usize,
    /// Files written, metadata document first
    pub written: Vec<PathBuf>,
    pub duration: Duration,
}

impl ConversionReport {
    pub fn summary(&self) -> String {
        format!(
            "{} rows, {} columns, {} file(s) in {:.2}s",
            self.rows,
            self.columns,
            self.written.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// File name of the external row file for the metadata file `output`.
///
/// `out/dm.json` with suffix `-data.jsonl` gives `dm-data.jsonl`.
pub fn external_data_file_name(output: &Path, suffix: &str) -> Result<String> {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConvertError::InvalidPath(output.display().to_string()))?;
    Ok(format!("{stem}{suffix}"))
}

/// Builds the document for `decoded`, stamping file-level times with `converted_at`.
///
/// In external mode the rows come back alongside the document.
pub fn build_document(
    decoded: &DecodedFile,
    mode: &OutputMode,
    converted_at: NaiveDateTime,
) -> Result<(Document, Option<Vec<Row>>)> {
    let normalized = normalize::normalize(&decoded.metadata, decoded.table.height(), converted_at);
    let AssembledDataset {
        entry,
        external_rows,
    } = assemble::assemble(&decoded.table, &normalized, mode)?;
    Ok((Document::new(normalized.file, vec![entry]), external_rows))
}

/// Converts an already decoded file and writes it to `output`.
pub fn convert_decoded(
    decoded: &DecodedFile,
    output: &Path,
    options: &ConversionOptions,
) -> Result<ConversionReport> {
    let start = Instant::now();
    let mode = if options.external {
        OutputMode::External {
            data_file_name: external_data_file_name(output, &options.data_file_suffix)?,
        }
    } else {
        OutputMode::Inline
    };

    let converted_at = chrono::Local::now().naive_local();
    let (document, external_rows) = build_document(decoded, &mode, converted_at)?;

    let data_path = match &mode {
        OutputMode::Inline => None,
        OutputMode::External { data_file_name } => {
            let dir = output.parent().unwrap_or_else(|| Path::new(""));
            Some(dir.join(data_file_name))
        }
    };
    let external = data_path.as_deref().zip(external_rows.as_deref());

    let written = serialize::write_files(output, &document, external, options.formatting)?;

    Ok(ConversionReport {
        rows: decoded.table.height(),
        columns: decoded.table.width(),
        written,
        duration: start.elapsed(),
    })
}

/// Decodes `input` with the decoder for `format` and writes the document to `output`.
pub fn convert_file(
    input: &Path,
    output: &Path,
    format: SourceFormat,
    options: &ConversionOptions,
) -> Result<ConversionReport> {
    let decoded = format
        .decoder()
        .decode(input)
        .with_context(|| format!("Failed to decode {}", input.display()))?;
    tracing::debug!(
        "Decoded {}: {} rows, {} columns",
        input.display(),
        decoded.table.height(),
        decoded.table.width()
    );

    let report = convert_decoded(&decoded, output, options)?;
    tracing::info!(
        "Converted {} -> {} ({})",
        input.display(),
        output.display(),
        report.summary()
    );
    Ok(report)
}
