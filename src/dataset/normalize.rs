//! Metadata normalization.
//!
//! Prunes the decoder's metadata down to the optional fields of the target
//! schema. Descriptive text is kept only when it has content; a field that is
//! absent, empty, or only trailing whitespace is dropped rather than written
//! as an empty string.

use super::inference::ValueCategory;
use super::model::{ColumnMetadata, DatasetMetadata, FileMetadata};
use crate::source::{DeclaredType, SourceMetadata};
use chrono::NaiveDateTime;

/// ISO-8601 without offset; fractional seconds only when non-zero.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Source metadata reduced to what the assembler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetadata {
    pub file: FileMetadata,
    pub dataset_name: String,
    pub dataset: Option<DatasetMetadata>,
    pub columns: Vec<NormalizedColumn>,
}

impl NormalizedMetadata {
    pub fn column(&self, name: &str) -> Option<&NormalizedColumn> {
        self.columns.iter().find(|column| column.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedColumn {
    pub name: String,
    pub label: Option<String>,
    pub length: Option<u32>,
    /// Used for inference only; not written to the output
    pub format: Option<String>,
    /// Used for inference only; not written to the output
    pub category: Option<ValueCategory>,
}

impl NormalizedColumn {
    /// The persisted part: label and length.
    pub fn metadata(&self) -> Option<ColumnMetadata> {
        ColumnMetadata {
            label: self.label.clone(),
            length: self.length,
        }
        .non_empty()
    }
}

/// True for `None` and for strings that are empty after trimming trailing whitespace.
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim_end().is_empty())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !is_blank(Some(v.as_str()))).cloned()
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Maps a declared SAS type onto the inference fallback category.
pub fn category(declared: Option<DeclaredType>) -> Option<ValueCategory> {
    declared.map(|t| {
        if t.type_name() == "double" {
            ValueCategory::Number
        } else {
            ValueCategory::String
        }
    })
}

/// Normalizes `source` for a table that materialized `table_rows` rows.
///
/// `converted_at` stamps the file-level creation and modification times.
pub fn normalize(
    source: &SourceMetadata,
    table_rows: usize,
    converted_at: NaiveDateTime,
) -> NormalizedMetadata {
    let now = format_timestamp(converted_at);
    let record_count = source.row_count.unwrap_or(table_rows as u64);

    let dataset = DatasetMetadata {
        label: non_blank(source.file_label.as_ref()),
        record_count: Some(record_count),
        creation_date_time: source.created.map(format_timestamp),
        modification_date_time: source.modified.map(format_timestamp),
    }
    .non_empty();

    let columns = source
        .variables
        .iter()
        .map(|variable| NormalizedColumn {
            name: variable.name.clone(),
            label: non_blank(variable.label.as_ref()),
            length: variable.length,
            format: non_blank(variable.format.as_ref()),
            category: category(variable.declared_type),
        })
        .collect();

    NormalizedMetadata {
        file: FileMetadata {
            creation_date_time: now.clone(),
            modification_date_time: now,
        },
        dataset_name: source.table_name.clone(),
        dataset,
        columns,
    }
}
