//! Document serialization.
//!
//! The metadata document is written either compact or pretty (2-space indent).
//! External row files are always JSON Lines: one compact array per row, each
//! terminated by `\n`, with no surrounding array.

use super::model::{Document, Row};
use crate::error::{ConvertError, Result, ResultExt as _};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Whitespace style of the metadata document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Formatting {
    #[default]
    Compact,
    Pretty,
}

impl Formatting {
    pub fn from_pretty(pretty: bool) -> Self {
        if pretty { Self::Pretty } else { Self::Compact }
    }
}

/// Writes `document` followed by a newline.
pub fn write_document<W: Write>(
    mut writer: W,
    document: &Document,
    formatting: Formatting,
) -> Result<()> {
    match formatting {
        Formatting::Compact => serde_json::to_writer(&mut writer, document)?,
        Formatting::Pretty => serde_json::to_writer_pretty(&mut writer, document)?,
    }
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes one JSON array per line.
pub fn write_rows<W: Write>(mut writer: W, rows: &[Row]) -> Result<()> {
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Writes the metadata document to `output` and, when given, the row file.
///
/// The row file is written first so a document never references rows that
/// failed to land. On any error the files written by this call are removed.
/// Returns the paths written, metadata document first.
pub fn write_files(
    output: &Path,
    document: &Document,
    external: Option<(&Path, &[Row])>,
    formatting: Formatting,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(2);

    if let Some((data_path, rows)) = external {
        if data_path == output {
            return Err(ConvertError::InvalidPath(format!(
                "Data file {} would overwrite the metadata document",
                data_path.display()
            )));
        }
        write_with(data_path, "data file", |writer| write_rows(writer, rows))?;
    }

    if let Err(err) = write_with(output, "output file", |writer| {
        write_document(writer, document, formatting)
    }) {
        if let Some((data_path, _)) = external {
            remove_partial(data_path);
        }
        return Err(err);
    }
    written.push(output.to_path_buf());
    if let Some((data_path, _)) = external {
        written.push(data_path.to_path_buf());
    }

    Ok(written)
}

/// Creates `path`, fills it through a buffered writer and flushes it.
/// A file left half-written by a failure is removed.
fn write_with<F>(path: &Path, what: &str, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = File::create(path)
        .with_context(|| format!("Failed to create {what} {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let result = fill(&mut writer).and_then(|()| {
        writer
            .flush()
            .with_context(|| format!("Failed to write {what} {}", path.display()))
    });
    if result.is_err() {
        drop(writer);
        remove_partial(path);
    }
    result
}

fn remove_partial(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        tracing::warn!("Could not remove partial file {}: {err}", path.display());
    }
}
