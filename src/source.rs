//! Source file decoders.
//!
//! A decoder turns one SAS file into a [`DecodedFile`]: a fully materialized
//! polars `DataFrame` plus a [`SourceMetadata`] record. Two formats are
//! supported:
//!
//! - [`SourceFormat::Xport`]: SAS transport v5 (`.xpt`)
//! - [`SourceFormat::Sas7bdat`]: native SAS datasets (`.sas7bdat`)
//!
//! Both decoders share the same contract:
//!
//! - numeric variables become `Float64` columns, SAS missing values become nulls
//! - character variables become `String` columns with trailing blanks removed
//! - date/time variables are left as raw numbers (no temporal conversion)
//! - text is decoded as UTF-8; anything else is a [`ConvertError::Decode`]
//!
//! ```no_run
//! use datasetjson::source::SourceFormat;
//! use std::path::Path;
//!
//! let path = Path::new("dm.xpt");
//! let format = SourceFormat::from_path(path).expect("not a SAS file");
//! let decoded = format.decoder().decode(path)?;
//! println!("{} rows", decoded.table.height());
//! # Ok::<(), datasetjson::error::ConvertError>(())
//! ```
//!
//! [`ConvertError::Decode`]: crate::error::ConvertError::Decode

pub mod metadata;
pub mod sas7bdat;
pub mod xport;

pub use metadata::{DecodedFile, DeclaredType, SourceMetadata, VariableInfo};
pub use sas7bdat::Sas7bdatDecoder;
pub use xport::XportDecoder;

use crate::error::{ConvertError, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::path::Path;

/// Reads one source file into memory.
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedFile>;
}

/// The source formats the converter discovers and decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Sas7bdat,
    Xport,
}

impl SourceFormat {
    /// Every supported format, in discovery order.
    pub const ALL: [Self; 2] = [Self::Sas7bdat, Self::Xport];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Sas7bdat => "sas7bdat",
            Self::Xport => "xpt",
        }
    }

    /// Matches the path's extension case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    pub fn decoder(self) -> &'static dyn Decoder {
        match self {
            Self::Sas7bdat => &Sas7bdatDecoder,
            Self::Xport => &XportDecoder,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sas7bdat => write!(f, "SAS7BDAT"),
            Self::Xport => write!(f, "XPORT"),
        }
    }
}

/// Decodes a fixed-width text field, dropping trailing blanks and NUL padding.
pub(crate) fn decode_text(bytes: &[u8], what: &str) -> Result<String> {
    let end = bytes
        .iter()
        .rposition(|b| *b != b' ' && *b != 0)
        .map_or(0, |pos| pos + 1);
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|e| ConvertError::Decode(format!("{what} is not valid UTF-8: {e}")))
}

/// Converts seconds since the SAS epoch (1960-01-01T00:00:00) to a timestamp.
pub(crate) fn sas_datetime(seconds: f64) -> Option<NaiveDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1960, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as i64;
    let delta = TimeDelta::try_seconds(whole as i64)? + TimeDelta::nanoseconds(nanos);
    epoch.checked_add_signed(delta)
}
