//! Dataset-JSON document model.
//!
//! Field order in these structs is the order keys appear in the output.

use super::inference::TypeTag;
use serde::Serialize;

/// Format version written into every document.
pub const FORMAT_VERSION: &str = "1.0.0";

/// One converted file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub version: &'static str,
    pub metadata: FileMetadata,
    pub datasets: Vec<DatasetEntry>,
}

impl Document {
    pub fn new(metadata: FileMetadata, datasets: Vec<DatasetEntry>) -> Self {
        Self {
            version: FORMAT_VERSION,
            metadata,
            datasets,
        }
    }
}

/// When the document itself was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub creation_date_time: String,
    pub modification_date_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DatasetMetadata>,
    pub columns: Vec<ColumnEntry>,
    #[serde(flatten)]
    pub data: RowStorage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<String>,
}

impl DatasetMetadata {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.record_count.is_none()
            && self.creation_date_time.is_none()
            && self.modification_date_time.is_none()
    }

    /// `None` when no field is set, so an empty object is never written.
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ColumnMetadata>,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
    pub nullable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl ColumnMetadata {
    /// `None` when neither label nor length is known.
    pub fn non_empty(self) -> Option<Self> {
        (self.label.is_some() || self.length.is_some()).then_some(self)
    }
}

/// Where a dataset's rows live: exactly one of the two, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RowStorage {
    /// Rows embedded in the document as `"rows": [[...], ...]`
    Rows(Vec<Row>),
    /// Rows in a sibling JSON-Lines file, as `"external": {"location": ...}`
    External(ExternalLocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalLocation {
    pub location: String,
}

/// One output cell. Missing values of every kind are [`Cell::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

pub type Row = Vec<Cell>;
