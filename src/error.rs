//! Centralized error handling for the converter library.
//!
//! Every fallible library operation returns [`Result<T>`], whose error type
//! [`ConvertError`] groups failures by the stage that produced them:
//!
//! ```
//! use datasetjson::error::ConvertError;
//!
//! fn describe(err: &ConvertError) -> &'static str {
//!     match err {
//!         ConvertError::Io(_) => "filesystem",
//!         ConvertError::Decode(_) => "source file",
//!         ConvertError::Serialization(_) => "output file",
//!         _ => "other",
//!     }
//! }
//! ```
//!
//! ## Context Extension Trait
//!
//! [`ResultExt`] adds `.context()` to any `Result` whose error converts into
//! [`ConvertError`], so call sites can say what they were doing:
//!
//! ```no_run
//! use datasetjson::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_header() -> datasetjson::error::Result<Vec<u8>> {
//!     let bytes = fs::read("dm.xpt").context("Failed to read transport file")?;
//!     Ok(bytes)
//! }
//! ```
//!
//! The binary works with `anyhow` and converts these errors at the boundary.

use std::fmt;

/// Main error type for conversion operations.
#[derive(Debug)]
pub enum ConvertError {
    /// I/O errors (opening inputs, writing outputs)
    Io(std::io::Error),

    /// The source file could not be decoded (malformed, truncated, bad text encoding)
    Decode(String),

    /// The decoded table could not be turned into a dataset (shape mismatches, polars errors)
    Conversion(String),

    /// JSON encoding failures
    Serialization(String),

    /// Configuration errors
    Config(String),

    /// File not found or invalid path
    InvalidPath(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
            Self::Conversion(msg) => write!(f, "Conversion error: {msg}"),
            Self::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::InvalidPath(msg) => write!(f, "Invalid path: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for ConvertError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.into())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

impl From<polars::error::PolarsError> for ConvertError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Conversion(err.to_string())
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ConvertError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: ConvertError = e.into();
            ConvertError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: ConvertError = e.into();
            ConvertError::Other(format!("{}: {}", f(), err))
        })
    }
}
