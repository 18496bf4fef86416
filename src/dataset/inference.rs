//! Column type inference.
//!
//! The output type of a column is derived from what the decoder actually
//! materialized, not from what the file declared. The declared storage class
//! is only consulted when the runtime kind has no direct counterpart in the
//! target type set.

use crate::error::Result;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;

/// Runtime value kinds a decoded column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Boolean,
    String,
}

impl ValueKind {
    /// `None` for dtypes outside the primitive set (temporal, nested, null, ...).
    pub fn from_dtype(dtype: &DataType) -> Option<Self> {
        let kind = match dtype {
            DataType::Int8 => Self::Int8,
            DataType::Int16 => Self::Int16,
            DataType::Int32 => Self::Int32,
            DataType::Int64 => Self::Int64,
            DataType::UInt8 => Self::UInt8,
            DataType::UInt16 => Self::UInt16,
            DataType::UInt32 => Self::UInt32,
            DataType::UInt64 => Self::UInt64,
            DataType::Float32 => Self::Float32,
            DataType::Float64 => Self::Float64,
            DataType::Boolean => Self::Boolean,
            DataType::String => Self::String,
            _ => return None,
        };
        Some(kind)
    }
}

/// Coarse class of a declared source type; feeds the inference fallback only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    Number,
    String,
}

/// Output column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    /// `string(n)` when a maximum length is known, plain `string` otherwise
    String { max_length: Option<usize> },
}

impl TypeTag {
    pub fn is_string(self) -> bool {
        matches!(self, Self::String { .. })
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I8 => f.write_str("i8"),
            Self::I16 => f.write_str("i16"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::U8 => f.write_str("u8"),
            Self::U16 => f.write_str("u16"),
            Self::U32 => f.write_str("u32"),
            Self::U64 => f.write_str("u64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::Bool => f.write_str("bool"),
            Self::String { max_length: None } => f.write_str("string"),
            Self::String {
                max_length: Some(n),
            } => write!(f, "string({n})"),
        }
    }
}

impl Serialize for TypeTag {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Derives the output type of `column`.
///
/// Runtime kinds map directly; string columns are annotated with the longest
/// value in characters. Anything else falls back to the declared category:
/// numbers become `f64`, everything else is rendered as text.
pub fn derive_type(declared: Option<ValueCategory>, column: &Column) -> Result<TypeTag> {
    let series = column.as_materialized_series();
    let tag = match ValueKind::from_dtype(series.dtype()) {
        Some(ValueKind::Int8) => TypeTag::I8,
        Some(ValueKind::Int16) => TypeTag::I16,
        Some(ValueKind::Int32) => TypeTag::I32,
        Some(ValueKind::Int64) => TypeTag::I64,
        Some(ValueKind::UInt8) => TypeTag::U8,
        Some(ValueKind::UInt16) => TypeTag::U16,
        Some(ValueKind::UInt32) => TypeTag::U32,
        Some(ValueKind::UInt64) => TypeTag::U64,
        Some(ValueKind::Float32) => TypeTag::F32,
        Some(ValueKind::Float64) => TypeTag::F64,
        Some(ValueKind::Boolean) => TypeTag::Bool,
        Some(ValueKind::String) => TypeTag::String {
            max_length: max_char_length(series.str()?),
        },
        None if declared == Some(ValueCategory::Number) => TypeTag::F64,
        None => {
            let text = series.cast(&DataType::String)?;
            TypeTag::String {
                max_length: max_char_length(text.str()?),
            }
        }
    };
    Ok(tag)
}

/// Longest non-empty value in characters; `None` when every value is null or empty.
pub fn max_char_length(values: &StringChunked) -> Option<usize> {
    values
        .into_iter()
        .flatten()
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().count())
        .max()
}
