//! Dataset assembly.
//!
//! Runs in two phases over the decoded table. The first phase only reads the
//! original values: it derives each column's type and whether the column
//! holds any missing value. The second phase produces a fresh row matrix in
//! which every missing value is [`Cell::Null`]. The table is never mutated.
//!
//! Missing means any of: null, the empty string, NaN, +Infinity, -Infinity.
//! This substitution is the only implicit change made to the data.

use super::inference::{TypeTag, derive_type};
use super::model::{Cell, ColumnEntry, DatasetEntry, ExternalLocation, Row, RowStorage};
use super::normalize::NormalizedMetadata;
use crate::error::{ConvertError, Result, ResultExt as _};
use polars::prelude::*;

/// Where the assembled rows should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Embed rows in the document
    Inline,
    /// Reference a sibling JSON-Lines file by this file name
    External { data_file_name: String },
}

/// An entry ready for serialization, plus the rows for the external file.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDataset {
    pub entry: DatasetEntry,
    /// `Some` only in external mode
    pub external_rows: Option<Vec<Row>>,
}

impl AssembledDataset {
    pub fn row_count(&self) -> usize {
        match (&self.entry.data, &self.external_rows) {
            (RowStorage::Rows(rows), _) => rows.len(),
            (RowStorage::External(_), Some(rows)) => rows.len(),
            (RowStorage::External(_), None) => 0,
        }
    }
}

/// Builds the dataset entry for `table`.
pub fn assemble(
    table: &DataFrame,
    metadata: &NormalizedMetadata,
    mode: &OutputMode,
) -> Result<AssembledDataset> {
    for column in &metadata.columns {
        if table.column(&column.name).is_err() {
            return Err(ConvertError::Conversion(format!(
                "Column {} is described in the metadata but missing from the table",
                column.name
            )));
        }
    }

    // Phase one: read the original values.
    let mut columns = Vec::with_capacity(table.width());
    for column in table.get_columns() {
        let name = column.name().as_str();
        let described = metadata.column(name);
        let type_tag = derive_type(described.and_then(|c| c.category), column)
            .with_context(|| format!("Failed to derive the type of column {name}"))?;
        columns.push(ColumnEntry {
            name: name.to_owned(),
            metadata: described.and_then(|c| c.metadata()),
            type_tag,
            nullable: has_missing(column)?,
        });
    }

    // Phase two: produce the output rows.
    let cells = table
        .get_columns()
        .iter()
        .zip(&columns)
        .map(|(column, entry)| column_cells(column, entry.type_tag))
        .collect::<Result<Vec<_>>>()?;
    let rows = transpose(cells, table.height());

    let (data, external_rows) = match mode {
        OutputMode::Inline => (RowStorage::Rows(rows), None),
        OutputMode::External { data_file_name } => (
            RowStorage::External(ExternalLocation {
                location: format!("./{data_file_name}"),
            }),
            Some(rows),
        ),
    };

    Ok(AssembledDataset {
        entry: DatasetEntry {
            name: metadata.dataset_name.clone(),
            metadata: metadata.dataset.clone(),
            columns,
            data,
        },
        external_rows,
    })
}

/// True when any value in the column is null, empty, NaN or infinite.
fn has_missing(column: &Column) -> Result<bool> {
    let series = column.as_materialized_series();
    if series.null_count() > 0 {
        return Ok(true);
    }
    let missing = match series.dtype() {
        DataType::String => series.str()?.into_iter().any(|v| v == Some("")),
        DataType::Float32 | DataType::Float64 => {
            let values = series.cast(&DataType::Float64)?;
            values
                .f64()?
                .into_iter()
                .any(|v| v.is_some_and(|x| !x.is_finite()))
        }
        _ => false,
    };
    Ok(missing)
}

/// Converts one column to output cells according to its derived type.
fn column_cells(column: &Column, type_tag: TypeTag) -> Result<Vec<Cell>> {
    let series = column.as_materialized_series();
    let cells = match type_tag {
        TypeTag::I8 | TypeTag::I16 | TypeTag::I32 | TypeTag::I64 => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Int))
            .collect(),
        TypeTag::U8 | TypeTag::U16 | TypeTag::U32 | TypeTag::U64 => series
            .cast(&DataType::UInt64)?
            .u64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::UInt))
            .collect(),
        TypeTag::F32 | TypeTag::F64 => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) if x.is_finite() => Cell::Float(x),
                _ => Cell::Null,
            })
            .collect(),
        TypeTag::Bool => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Bool))
            .collect(),
        TypeTag::String { .. } => string_cells(series)?,
    };
    Ok(cells)
}

fn string_cells(series: &Series) -> Result<Vec<Cell>> {
    if series.dtype().is_float() {
        // Rendering NaN or inf as text would hide a missing value.
        let values = series.cast(&DataType::Float64)?;
        let text = values.cast(&DataType::String)?;
        return Ok(values
            .f64()?
            .into_iter()
            .zip(text.str()?)
            .map(|(number, text)| match (number, text) {
                (Some(x), Some(t)) if x.is_finite() => Cell::Str(t.to_owned()),
                _ => Cell::Null,
            })
            .collect());
    }
    let text = series.cast(&DataType::String)?;
    let cells = text
        .str()?
        .into_iter()
        .map(|v| match v {
            Some(s) if !s.is_empty() => Cell::Str(s.to_owned()),
            _ => Cell::Null,
        })
        .collect();
    Ok(cells)
}

/// Turns per-column cells into row-major order, keeping column order.
fn transpose(columns: Vec<Vec<Cell>>, height: usize) -> Vec<Row> {
    let mut iters: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    (0..height)
        .map(|_| {
            iters
                .iter_mut()
                .map(|cells| cells.next().unwrap_or(Cell::Null))
                .collect()
        })
        .collect()
}
