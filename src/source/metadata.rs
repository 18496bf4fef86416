//! Decoder output: the materialized table plus the source's descriptive metadata.

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;

/// Storage class a variable was declared with in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    /// SAS numeric (stored as a double)
    Numeric,
    /// SAS character
    Character,
}

impl DeclaredType {
    /// The type name the SAS readers report for this class.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Numeric => "double",
            Self::Character => "string",
        }
    }
}

/// Per-variable metadata, in table column order.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub declared_type: Option<DeclaredType>,
    pub label: Option<String>,
    /// Declared storage width in bytes
    pub length: Option<u32>,
    pub format: Option<String>,
}

impl VariableInfo {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type: Some(declared_type),
            label: None,
            length: None,
            format: None,
        }
    }
}

/// File-level metadata exposed by a decoder.
///
/// Absent attributes are `None`; decoders never substitute sentinel values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMetadata {
    pub table_name: String,
    pub file_label: Option<String>,
    /// Row count recorded in the file header, when the format has one
    pub row_count: Option<u64>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub variables: Vec<VariableInfo>,
}

/// Everything a decoder hands to the conversion pipeline for one file.
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub table: DataFrame,
    pub metadata: SourceMetadata,
}
